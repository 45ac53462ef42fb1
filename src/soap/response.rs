use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate};

use super::xml_utils::{XmlNode, parse};
use crate::chain::Fingerprint;
use crate::core::VerifactuError;

/// AEAT code for "record already registered".
pub const DUPLICATE_RECORD_CODE: &str = "3000";

/// Longest body excerpt carried in error messages.
const SNIPPET_LEN: usize = 200;

/// A fault-free, parsed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapResponse {
    pub status: u16,
    pub body: String,
    pub document: XmlNode,
}

/// SOAP-level fault extracted from a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub code: String,
    pub message: String,
}

impl From<SoapFault> for VerifactuError {
    fn from(f: SoapFault) -> Self {
        VerifactuError::SoapFault {
            code: f.code,
            message: f.message,
        }
    }
}

/// Find a `Fault` element and pull its code and string (SOAP 1.1 or 1.2 layout).
pub fn detect_fault(document: &XmlNode) -> Option<SoapFault> {
    let fault = document.find("Fault")?;
    let code = fault
        .child_text("faultcode")
        .or_else(|| fault.child("Code").and_then(|c| c.find_text("Value")))
        .unwrap_or("unknown");
    let message = fault
        .child_text("faultstring")
        .or_else(|| fault.child("Reason").and_then(|r| r.find_text("Text")))
        .unwrap_or("");
    Some(SoapFault {
        code: code.to_string(),
        message: message.to_string(),
    })
}

/// Turn a buffered HTTP exchange into a parsed response or a typed failure.
///
/// A SOAP fault is always reported as [`VerifactuError::SoapFault`], even
/// when it arrives with HTTP 200.
pub fn interpret_http(status: u16, body: String) -> Result<SoapResponse, VerifactuError> {
    match status {
        401 | 403 => {
            return Err(VerifactuError::AuthenticationFailed {
                status,
                message: snippet(&body),
            });
        }
        502..=504 => {
            return Err(VerifactuError::ServiceUnavailable {
                status,
                message: snippet(&body),
            });
        }
        _ => {}
    }

    let parsed = parse(&body);
    if let Ok(document) = &parsed {
        if let Some(fault) = detect_fault(document) {
            return Err(fault.into());
        }
    }

    if !(200..300).contains(&status) {
        return Err(if status >= 500 {
            VerifactuError::ServiceUnavailable {
                status,
                message: snippet(&body),
            }
        } else {
            VerifactuError::SoapFault {
                code: format!("HTTP {status}"),
                message: snippet(&body),
            }
        });
    }

    let document = parsed?;
    Ok(SoapResponse {
        status,
        body,
        document,
    })
}

fn snippet(body: &str) -> String {
    body.trim().chars().take(SNIPPET_LEN).collect()
}

/// EstadoEnvio — outcome of the whole submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Correct,
    PartiallyCorrect,
    Incorrect,
}

impl SubmissionStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "Correcto" => Some(Self::Correct),
            "ParcialmenteCorrecto" => Some(Self::PartiallyCorrect),
            "Incorrecto" => Some(Self::Incorrect),
            _ => None,
        }
    }
}

/// EstadoRegistro — outcome of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Correct,
    AcceptedWithErrors,
    Incorrect,
}

impl RecordStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "Correcto" | "Correcta" => Some(Self::Correct),
            "AceptadoConErrores" | "AceptadaConErrores" => Some(Self::AcceptedWithErrors),
            "Incorrecto" | "Incorrecta" => Some(Self::Incorrect),
            _ => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Incorrect)
    }
}

/// One `RespuestaLinea`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordResult {
    pub number: Option<String>,
    pub status: RecordStatus,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
}

/// Parsed `RespuestaRegFactuSistemaFacturacion`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationResponse {
    /// Código Seguro de Verificación of the submission.
    pub csv: Option<String>,
    pub status: SubmissionStatus,
    /// TiempoEsperaEnvio: how long to wait before the next submission.
    pub wait: Option<Duration>,
    pub lines: Vec<RecordResult>,
}

/// The authority's verdict on a single-record submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted {
        /// Code and description when accepted with errors.
        warning: Option<(String, String)>,
    },
    Rejected {
        code: String,
        description: String,
    },
}

impl RegistrationResponse {
    /// Verdict on the first (only) record of the submission.
    pub fn verdict(&self) -> Result<Verdict, VerifactuError> {
        match self.lines.first() {
            Some(line) if line.status.is_accepted() => Ok(Verdict::Accepted {
                warning: line.error_code.clone().map(|code| {
                    (code, line.error_description.clone().unwrap_or_default())
                }),
            }),
            Some(line) => Ok(Verdict::Rejected {
                code: line.error_code.clone().unwrap_or_default(),
                description: line.error_description.clone().unwrap_or_default(),
            }),
            None if self.status == SubmissionStatus::Correct => {
                Ok(Verdict::Accepted { warning: None })
            }
            None => Err(VerifactuError::Xml(
                "rejected submission carries no RespuestaLinea".into(),
            )),
        }
    }
}

pub fn parse_registration_response(
    document: &XmlNode,
) -> Result<RegistrationResponse, VerifactuError> {
    let resp = document
        .find("RespuestaRegFactuSistemaFacturacion")
        .ok_or_else(|| {
            VerifactuError::Xml("missing RespuestaRegFactuSistemaFacturacion".into())
        })?;

    let status_text = resp
        .child_text("EstadoEnvio")
        .ok_or_else(|| VerifactuError::Xml("missing EstadoEnvio".into()))?;
    let status = SubmissionStatus::parse(status_text)
        .ok_or_else(|| VerifactuError::Xml(format!("unknown EstadoEnvio '{status_text}'")))?;

    let wait = resp
        .child_text("TiempoEsperaEnvio")
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let mut lines = Vec::new();
    for line in resp.find_all("RespuestaLinea") {
        let state = line
            .find_text("EstadoRegistro")
            .ok_or_else(|| VerifactuError::Xml("RespuestaLinea without EstadoRegistro".into()))?;
        let status = RecordStatus::parse(state)
            .ok_or_else(|| VerifactuError::Xml(format!("unknown EstadoRegistro '{state}'")))?;
        lines.push(RecordResult {
            number: line.find_text("NumSerieFactura").map(str::to_string),
            status,
            error_code: line.find_text("CodigoErrorRegistro").map(str::to_string),
            error_description: line.find_text("DescripcionErrorRegistro").map(str::to_string),
        });
    }

    Ok(RegistrationResponse {
        csv: resp.child_text("CSV").map(str::to_string),
        status,
        wait,
        lines,
    })
}

/// A record as the authority has it on file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredRecord {
    pub number: String,
    pub issue_date: Option<NaiveDate>,
    pub fingerprint: Option<Fingerprint>,
    pub generated_at: Option<DateTime<FixedOffset>>,
    /// EstadoRegistro as reported (e.g. "Correcta", "Anulada").
    pub status: Option<String>,
}

/// Parsed `RespuestaConsultaFactuSistemaFacturacion`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    pub records: Vec<RegisteredRecord>,
    /// More pages are available.
    pub has_more: bool,
}

pub fn parse_query_response(document: &XmlNode) -> Result<QueryResponse, VerifactuError> {
    let resp = document
        .find("RespuestaConsultaFactuSistemaFacturacion")
        .ok_or_else(|| {
            VerifactuError::Xml("missing RespuestaConsultaFactuSistemaFacturacion".into())
        })?;

    let has_more = resp.find_text("IndicadorPaginacion") == Some("S");
    if resp.find_text("ResultadoConsulta") == Some("SinDatos") {
        return Ok(QueryResponse {
            records: Vec::new(),
            has_more,
        });
    }

    let mut records = Vec::new();
    for item in resp.find_all("RegistroRespuestaConsultaFactuSistemaFacturacion") {
        let Some(number) = item.find_text("NumSerieFactura") else {
            continue;
        };
        records.push(RegisteredRecord {
            number: number.to_string(),
            issue_date: item
                .find_text("FechaExpedicionFactura")
                .and_then(|d| NaiveDate::parse_from_str(d, "%d-%m-%Y").ok()),
            fingerprint: item
                .find_text("Huella")
                .and_then(|h| Fingerprint::from_hex(h).ok()),
            generated_at: item
                .find_text("FechaHoraHusoGenRegistro")
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok()),
            status: item.find_text("EstadoRegistro").map(str::to_string),
        });
    }

    Ok(QueryResponse { records, has_more })
}
