use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::xml_utils::XmlWriter;
use super::{QUERY_ACTION, REGISTRATION_ACTION, ns};
use crate::chain::PendingSubmission;
use crate::core::*;

/// Protocol version carried in `IDVersion`.
const ID_VERSION: &str = "1.0";
/// `TipoHuella` for SHA-256.
const FINGERPRINT_TYPE: &str = "01";

/// A ready-to-post SOAP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapEnvelope {
    /// Value of the `SOAPAction` header.
    pub action: String,
    pub xml: String,
}

/// The invoicing software producing the records (SistemaInformatico).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareInfo {
    /// Name of the software producer.
    pub vendor_name: String,
    /// NIF of the software producer.
    pub vendor_tax_id: String,
    pub name: String,
    /// Two-character system identifier assigned by the producer.
    pub id: String,
    pub version: String,
    pub installation_number: String,
    /// The software can only operate in Verifactu mode.
    pub verifactu_only: bool,
    /// The software can keep books for several taxpayers.
    pub multi_taxpayer: bool,
    /// The installation currently serves several taxpayers.
    pub serves_multiple_taxpayers: bool,
}

impl Default for SoftwareInfo {
    fn default() -> Self {
        Self {
            vendor_name: "verifactu-rs".into(),
            vendor_tax_id: "B12345674".into(),
            name: "verifactu".into(),
            id: "VR".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            installation_number: "1".into(),
            verifactu_only: true,
            multi_taxpayer: true,
            serves_multiple_taxpayers: false,
        }
    }
}

/// Filter for a record status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusQuery {
    pub issuer: Issuer,
    /// Ejercicio.
    pub year: i32,
    /// Periodo, 1–12.
    pub month: u32,
    /// Restrict to one NumSerieFactura.
    pub number: Option<String>,
}

impl StatusQuery {
    /// All records of an issuer in one month.
    pub fn for_period(issuer: Issuer, year: i32, month: u32) -> Self {
        Self {
            issuer,
            year,
            month,
            number: None,
        }
    }

    /// One record, looked up in the month of its issue date.
    pub fn for_record(issuer: Issuer, number: impl Into<String>, issue_date: NaiveDate) -> Self {
        Self {
            issuer,
            year: issue_date.year(),
            month: issue_date.month(),
            number: Some(number.into()),
        }
    }
}

/// Build the `RegFactuSistemaFacturacion` request for a chained record.
///
/// Everything chain-related (`Encadenamiento`, `Huella`) comes from the
/// pending link, so the same pending submission always yields the same XML.
pub fn registration_envelope(
    pending: &PendingSubmission,
    software: &SoftwareInfo,
) -> Result<SoapEnvelope, VerifactuError> {
    let record = pending.record();
    let issuer = record.issuer();
    let mut w = XmlWriter::new()?;

    open_envelope(&mut w, &[("xmlns:sum", ns::SUMINISTRO_LR)])?;
    w.start_element("sum:RegFactuSistemaFacturacion")?;

    w.start_element("sum:Cabecera")?;
    write_obligado(&mut w, issuer)?;
    w.end_element("sum:Cabecera")?;

    w.start_element("sum:RegistroFactura")?;
    match record {
        Record::Registration(r) => write_alta(&mut w, r, pending, software)?,
        Record::Cancellation(c) => write_anulacion(&mut w, c, pending, software)?,
    }
    w.end_element("sum:RegistroFactura")?;

    w.end_element("sum:RegFactuSistemaFacturacion")?;
    close_envelope(&mut w)?;

    Ok(SoapEnvelope {
        action: REGISTRATION_ACTION.into(),
        xml: w.into_string()?,
    })
}

/// Build the `ConsultaFactuSistemaFacturacion` request.
pub fn query_envelope(query: &StatusQuery) -> Result<SoapEnvelope, VerifactuError> {
    if !(1..=12).contains(&query.month) {
        return Err(VerifactuError::Validation(vec![ValidationError::new(
            "month",
            format!("{} is not a month", query.month),
        )]));
    }

    let mut w = XmlWriter::new()?;
    open_envelope(&mut w, &[("xmlns:con", ns::CONSULTA_LR)])?;
    w.start_element("con:ConsultaFactuSistemaFacturacion")?;

    w.start_element("con:Cabecera")?;
    w.text_element("sum1:IDVersion", ID_VERSION)?;
    write_obligado(&mut w, &query.issuer)?;
    w.end_element("con:Cabecera")?;

    w.start_element("con:FiltroConsulta")?;
    w.start_element("con:PeriodoImputacion")?;
    w.text_element("sum1:Ejercicio", &query.year.to_string())?;
    w.text_element("sum1:Periodo", &format!("{:02}", query.month))?;
    w.end_element("con:PeriodoImputacion")?;
    if let Some(number) = &query.number {
        w.text_element("con:NumSerieFactura", number)?;
    }
    w.end_element("con:FiltroConsulta")?;

    w.end_element("con:ConsultaFactuSistemaFacturacion")?;
    close_envelope(&mut w)?;

    Ok(SoapEnvelope {
        action: QUERY_ACTION.into(),
        xml: w.into_string()?,
    })
}

fn open_envelope(w: &mut XmlWriter, extra_ns: &[(&str, &str)]) -> Result<(), VerifactuError> {
    let mut attrs = vec![("xmlns:soapenv", ns::SOAP_ENV)];
    attrs.extend_from_slice(extra_ns);
    attrs.push(("xmlns:sum1", ns::SUMINISTRO_INFO));
    w.start_element_with_attrs("soapenv:Envelope", &attrs)?;
    w.empty_element("soapenv:Header")?;
    w.start_element("soapenv:Body")?;
    Ok(())
}

fn close_envelope(w: &mut XmlWriter) -> Result<(), VerifactuError> {
    w.end_element("soapenv:Body")?;
    w.end_element("soapenv:Envelope")?;
    Ok(())
}

fn write_obligado(w: &mut XmlWriter, issuer: &Issuer) -> Result<(), VerifactuError> {
    w.start_element("sum1:ObligadoEmision")?;
    w.text_element("sum1:NombreRazon", &issuer.name)?;
    w.text_element("sum1:NIF", &normalize_tax_id(&issuer.tax_id))?;
    w.end_element("sum1:ObligadoEmision")?;
    Ok(())
}

fn write_alta(
    w: &mut XmlWriter,
    r: &InvoiceRecord,
    pending: &PendingSubmission,
    software: &SoftwareInfo,
) -> Result<(), VerifactuError> {
    w.start_element("sum1:RegistroAlta")?;
    w.text_element("sum1:IDVersion", ID_VERSION)?;

    w.start_element("sum1:IDFactura")?;
    w.text_element("sum1:IDEmisorFactura", &pending.link().issuer)?;
    w.text_element("sum1:NumSerieFactura", r.number.trim())?;
    w.text_element("sum1:FechaExpedicionFactura", &format_date(&r.issue_date))?;
    w.end_element("sum1:IDFactura")?;

    w.text_element("sum1:NombreRazonEmisor", &r.issuer.name)?;
    w.text_element("sum1:TipoFactura", r.invoice_type.code())?;
    w.text_element("sum1:DescripcionOperacion", &r.description)?;

    if let Some(recipient) = &r.recipient {
        w.start_element("sum1:Destinatarios")?;
        w.start_element("sum1:IDDestinatario")?;
        w.text_element("sum1:NombreRazon", &recipient.name)?;
        w.text_element("sum1:NIF", &recipient.tax_id)?;
        w.end_element("sum1:IDDestinatario")?;
        w.end_element("sum1:Destinatarios")?;
    }

    w.start_element("sum1:Desglose")?;
    for line in &r.lines {
        w.start_element("sum1:DetalleDesglose")?;
        w.text_element("sum1:ClaveRegimen", &line.regime)?;
        w.text_element("sum1:CalificacionOperacion", &line.operation)?;
        w.text_element("sum1:TipoImpositivo", &format_amount(line.rate))?;
        w.text_element("sum1:BaseImponibleOimporteNoSujeto", &format_amount(line.base))?;
        w.text_element("sum1:CuotaRepercutida", &format_amount(line.tax))?;
        w.end_element("sum1:DetalleDesglose")?;
    }
    w.end_element("sum1:Desglose")?;

    w.text_element("sum1:CuotaTotal", &format_amount(r.total_tax))?;
    w.text_element("sum1:ImporteTotal", &format_amount(r.total_amount))?;

    write_chain_fields(w, pending, software)?;
    w.end_element("sum1:RegistroAlta")?;
    Ok(())
}

fn write_anulacion(
    w: &mut XmlWriter,
    c: &CancellationRecord,
    pending: &PendingSubmission,
    software: &SoftwareInfo,
) -> Result<(), VerifactuError> {
    w.start_element("sum1:RegistroAnulacion")?;
    w.text_element("sum1:IDVersion", ID_VERSION)?;

    w.start_element("sum1:IDFactura")?;
    w.text_element("sum1:IDEmisorFacturaAnulada", &pending.link().issuer)?;
    w.text_element("sum1:NumSerieFacturaAnulada", c.number.trim())?;
    w.text_element("sum1:FechaExpedicionFacturaAnulada", &format_date(&c.issue_date))?;
    w.end_element("sum1:IDFactura")?;

    write_chain_fields(w, pending, software)?;
    w.end_element("sum1:RegistroAnulacion")?;
    Ok(())
}

/// Encadenamiento, SistemaInformatico, timestamp and fingerprint — the
/// tail shared by both record kinds.
fn write_chain_fields(
    w: &mut XmlWriter,
    pending: &PendingSubmission,
    software: &SoftwareInfo,
) -> Result<(), VerifactuError> {
    let link = pending.link();

    w.start_element("sum1:Encadenamiento")?;
    match pending.previous_record() {
        None => {
            w.text_element("sum1:PrimerRegistro", "S")?;
        }
        Some(prev) => {
            w.start_element("sum1:RegistroAnterior")?;
            w.text_element("sum1:IDEmisorFactura", &link.issuer)?;
            w.text_element("sum1:NumSerieFactura", &prev.number)?;
            w.text_element("sum1:FechaExpedicionFactura", &format_date(&prev.issue_date))?;
            w.text_element("sum1:Huella", link.previous_fingerprint.as_str())?;
            w.end_element("sum1:RegistroAnterior")?;
        }
    }
    w.end_element("sum1:Encadenamiento")?;

    w.start_element("sum1:SistemaInformatico")?;
    w.text_element("sum1:NombreRazon", &software.vendor_name)?;
    w.text_element("sum1:NIF", &software.vendor_tax_id)?;
    w.text_element("sum1:NombreSistemaInformatico", &software.name)?;
    w.text_element("sum1:IdSistemaInformatico", &software.id)?;
    w.text_element("sum1:Version", &software.version)?;
    w.text_element("sum1:NumeroInstalacion", &software.installation_number)?;
    w.text_element("sum1:TipoUsoPosibleSoloVerifactu", yes_no(software.verifactu_only))?;
    w.text_element("sum1:TipoUsoPosibleMultiOT", yes_no(software.multi_taxpayer))?;
    w.text_element(
        "sum1:IndicadorMultiplesOT",
        yes_no(software.serves_multiple_taxpayers),
    )?;
    w.end_element("sum1:SistemaInformatico")?;

    w.text_element("sum1:FechaHoraHusoGenRegistro", &format_timestamp(&link.timestamp))?;
    w.text_element("sum1:TipoHuella", FINGERPRINT_TYPE)?;
    w.text_element("sum1:Huella", link.fingerprint.as_str())?;
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "S" } else { "N" }
}
