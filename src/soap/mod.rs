//! SOAP 1.1 wire layer for the AEAT Verifactu web service.
//!
//! - [`registration_envelope`] / [`query_envelope`] build the request XML
//! - [`interpret_http`] turns a buffered HTTP response into a parsed
//!   [`SoapResponse`] or a typed failure (SOAP faults included)
//! - [`HttpTransport`] posts envelopes over mutual TLS, one attempt per call
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> Result<(), verifactu::VerifactuError> {
//! use std::time::Duration;
//! use verifactu::soap::*;
//!
//! let identity = ClientIdentity::from_pem_file("certs/representante.pem")?;
//! let transport = HttpTransport::new(Endpoint::Sandbox.url(), &identity)?;
//! # let envelope: SoapEnvelope = todo!();
//! let response = transport.send(&envelope, Duration::from_secs(30)).await?;
//! let parsed = parse_registration_response(&response.document)?;
//! # Ok(()) }
//! ```

mod envelope;
mod response;
mod transport;
pub(crate) mod xml_utils;

use serde::{Deserialize, Serialize};

pub use envelope::{SoapEnvelope, SoftwareInfo, StatusQuery, query_envelope, registration_envelope};
pub use response::{
    DUPLICATE_RECORD_CODE, QueryResponse, RecordResult, RecordStatus, RegisteredRecord,
    RegistrationResponse, SoapFault, SoapResponse, SubmissionStatus, Verdict, detect_fault,
    interpret_http, parse_query_response, parse_registration_response,
};
pub use transport::{ClientIdentity, HttpTransport, Transport};
pub use xml_utils::{XmlNode, parse};

/// AEAT production endpoint.
pub const PRODUCTION_URL: &str =
    "https://www1.agenciatributaria.gob.es/wlpl/TIKE-CONT/ws/SistemaFacturacion/VerifactuSOAP";

/// AEAT pre-production (testing) endpoint.
pub const SANDBOX_URL: &str =
    "https://prewww1.aeat.es/wlpl/TIKE-CONT/ws/SistemaFacturacion/VerifactuSOAP";

/// `SOAPAction` of record registration / cancellation requests.
pub const REGISTRATION_ACTION: &str = "RegFactuSistemaFacturacion";

/// `SOAPAction` of record queries.
pub const QUERY_ACTION: &str = "ConsultaFactuSistemaFacturacion";

/// Namespace URIs.
pub mod ns {
    pub const SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
    pub const SUMINISTRO_LR: &str = "https://www2.agenciatributaria.gob.es/static_files/common/internet/dep/aplicaciones/es/aeat/tike/cont/ws/SuministroLR.xsd";
    pub const SUMINISTRO_INFO: &str = "https://www2.agenciatributaria.gob.es/static_files/common/internet/dep/aplicaciones/es/aeat/tike/cont/ws/SuministroInformacion.xsd";
    pub const CONSULTA_LR: &str = "https://www2.agenciatributaria.gob.es/static_files/common/internet/dep/aplicaciones/es/aeat/tike/cont/ws/ConsultaLR.xsd";
}

/// Which AEAT environment to talk to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Production,
    #[default]
    Sandbox,
    Custom(String),
}

impl Endpoint {
    pub fn url(&self) -> &str {
        match self {
            Self::Production => PRODUCTION_URL,
            Self::Sandbox => SANDBOX_URL,
            Self::Custom(url) => url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_https() {
        assert!(PRODUCTION_URL.starts_with("https://"));
        assert!(SANDBOX_URL.starts_with("https://"));
        assert_eq!(Endpoint::Custom("https://x".into()).url(), "https://x");
    }
}
