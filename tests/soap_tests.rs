//! Envelope and response tests.
//!
//! Run with: `cargo test --test soap_tests`

#![cfg(feature = "soap")]

use chrono::{FixedOffset, NaiveDate, TimeZone};
use rust_decimal_macros::dec;
use verifactu::chain::{ChainManager, ChainSeed};
use verifactu::core::*;
use verifactu::soap::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn invoice(number: &str) -> InvoiceRecord {
    let generated = FixedOffset::east_opt(7200)
        .unwrap()
        .with_ymd_and_hms(2024, 7, 1, 9, 15, 0)
        .unwrap();
    InvoiceRecord::new(
        Issuer::new("B12345674", "Empresa & Hijos SL"),
        number,
        date(2024, 7, 1),
        "Reparación <urgente>",
        generated,
    )
    .recipient("12345678Z", "Cliente SA")
    .add_line(TaxLine::general(dec!(21), dec!(200), dec!(42)))
    .add_line(TaxLine::general(dec!(10), dec!(50), dec!(5)))
}

#[test]
fn registration_envelope_carries_the_link() {
    let chain = ChainManager::new();
    chain.seed("B12345674", ChainSeed::Genesis).unwrap();
    let first = chain.tentative_advance(invoice("A-001").into()).unwrap();
    chain.commit(&first).unwrap();
    let second = chain.tentative_advance(invoice("A-002").into()).unwrap();

    let envelope = registration_envelope(&second, &SoftwareInfo::default()).unwrap();
    assert_eq!(envelope.action, REGISTRATION_ACTION);

    let doc = parse(&envelope.xml).unwrap();
    assert!(doc.find("Envelope").is_some());
    assert_eq!(doc.find_text("NombreRazon"), Some("Empresa & Hijos SL"));

    let alta = doc.find("RegistroAlta").unwrap();
    assert_eq!(alta.find_text("NumSerieFactura"), Some("A-002"));
    assert_eq!(alta.find_text("FechaExpedicionFactura"), Some("01-07-2024"));
    assert_eq!(alta.find_text("DescripcionOperacion"), Some("Reparación <urgente>"));
    assert_eq!(alta.find_text("CuotaTotal"), Some("47.00"));
    assert_eq!(alta.find_text("ImporteTotal"), Some("297.00"));
    assert_eq!(
        alta.find_text("FechaHoraHusoGenRegistro"),
        Some("2024-07-01T09:15:00+02:00")
    );
    assert_eq!(alta.find_text("TipoHuella"), Some("01"));
    assert_eq!(alta.child_text("Huella"), Some(second.link().fingerprint.as_str()));

    let previous = alta.find("RegistroAnterior").unwrap();
    assert_eq!(previous.child_text("NumSerieFactura"), Some("A-001"));
    assert_eq!(
        previous.child_text("Huella"),
        Some(first.link().fingerprint.as_str())
    );
}

#[test]
fn envelope_is_stable_for_the_same_pending_link() {
    let chain = ChainManager::new();
    chain.seed("B12345674", ChainSeed::Genesis).unwrap();
    let pending = chain.tentative_advance(invoice("A-001").into()).unwrap();
    let software = SoftwareInfo::default();
    assert_eq!(
        registration_envelope(&pending, &software).unwrap(),
        registration_envelope(&pending, &software).unwrap()
    );
}

#[test]
fn status_query_envelope() {
    let query = StatusQuery::for_record(
        Issuer::new("B12345674", "Empresa SL"),
        "A-001",
        date(2024, 7, 1),
    );
    let envelope = query_envelope(&query).unwrap();
    assert_eq!(envelope.action, QUERY_ACTION);
    let doc = parse(&envelope.xml).unwrap();
    assert_eq!(doc.find_text("Ejercicio"), Some("2024"));
    assert_eq!(doc.find_text("Periodo"), Some("07"));
    assert_eq!(doc.find_text("NumSerieFactura"), Some("A-001"));
}

#[test]
fn fault_in_http_200_is_not_a_rejection() {
    let body = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Body>
    <soapenv:Fault>
      <faultcode>soapenv:Server</faultcode>
      <faultstring>Error interno</faultstring>
    </soapenv:Fault>
  </soapenv:Body>
</soapenv:Envelope>"#;
    let err = interpret_http(200, body.into()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolFault);
    assert!(matches!(err, VerifactuError::SoapFault { ref code, .. } if code == "soapenv:Server"));
}

#[test]
fn business_rejection_is_a_verdict() {
    let body = r#"<env:Envelope xmlns:env="http://schemas.xmlsoap.org/soap/envelope/"><env:Body>
<tikR:RespuestaRegFactuSistemaFacturacion xmlns:tikR="urn:r">
  <tikR:EstadoEnvio>Incorrecto</tikR:EstadoEnvio>
  <tikR:RespuestaLinea>
    <tikR:EstadoRegistro>Incorrecto</tikR:EstadoRegistro>
    <tikR:CodigoErrorRegistro>1110</tikR:CodigoErrorRegistro>
    <tikR:DescripcionErrorRegistro>El NIF no está identificado.</tikR:DescripcionErrorRegistro>
  </tikR:RespuestaLinea>
</tikR:RespuestaRegFactuSistemaFacturacion></env:Body></env:Envelope>"#;
    let response = interpret_http(200, body.into()).unwrap();
    let parsed = parse_registration_response(&response.document).unwrap();
    assert_eq!(parsed.status, SubmissionStatus::Incorrect);
    assert_eq!(parsed.lines[0].status, RecordStatus::Incorrect);
    assert_eq!(
        parsed.verdict().unwrap(),
        Verdict::Rejected {
            code: "1110".into(),
            description: "El NIF no está identificado.".into()
        }
    );
}

#[test]
fn http_status_mapping() {
    let cases = [
        (401, ErrorKind::AuthenticationFailed),
        (403, ErrorKind::AuthenticationFailed),
        (502, ErrorKind::ServiceUnavailable),
        (503, ErrorKind::ServiceUnavailable),
        (504, ErrorKind::ServiceUnavailable),
        (500, ErrorKind::ServiceUnavailable),
        (400, ErrorKind::ProtocolFault),
    ];
    for (status, kind) in cases {
        let err = interpret_http(status, "<html>error</html>".into()).unwrap_err();
        assert_eq!(err.kind(), kind, "HTTP {status}");
    }
}
