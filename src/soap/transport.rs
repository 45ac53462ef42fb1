use std::error::Error as StdError;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::envelope::SoapEnvelope;
use super::response::{SoapResponse, interpret_http};
use crate::core::VerifactuError;

/// One HTTP exchange with the authority.
///
/// Implementations perform exactly one attempt per call and never retry;
/// retries belong to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        envelope: &SoapEnvelope,
        timeout: Duration,
    ) -> Result<SoapResponse, VerifactuError>;
}

/// Client certificate and private key, PEM encoded.
#[derive(Clone)]
pub struct ClientIdentity {
    pem: Vec<u8>,
}

impl ClientIdentity {
    /// A single PEM bundle holding the certificate chain and the private key.
    pub fn from_pem(pem: impl Into<Vec<u8>>) -> Self {
        Self { pem: pem.into() }
    }

    /// Separate certificate and key PEM blocks.
    pub fn from_parts(cert_pem: &[u8], key_pem: &[u8]) -> Self {
        let mut pem = cert_pem.to_vec();
        if !pem.ends_with(b"\n") {
            pem.push(b'\n');
        }
        pem.extend_from_slice(key_pem);
        Self { pem }
    }

    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, VerifactuError> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|e| {
            VerifactuError::Config(format!("cannot read identity {}: {e}", path.display()))
        })?;
        Ok(Self::from_pem(pem))
    }

    fn to_reqwest(&self) -> Result<reqwest::Identity, VerifactuError> {
        reqwest::Identity::from_pem(&self.pem)
            .map_err(|e| VerifactuError::Config(format!("invalid client identity: {e}")))
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("pem", &format_args!("<{} bytes redacted>", self.pem.len()))
            .finish()
    }
}

/// Mutual-TLS HTTPS transport built on `reqwest` + rustls.
pub struct HttpTransport {
    endpoint: String,
    root_ca: Option<reqwest::Certificate>,
    client: RwLock<reqwest::Client>,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, identity: &ClientIdentity) -> Result<Self, VerifactuError> {
        let client = build_client(identity, None)?;
        Ok(Self {
            endpoint: endpoint.into(),
            root_ca: None,
            client: RwLock::new(client),
        })
    }

    /// Trust an extra root CA (PEM), e.g. for a test authority.
    pub fn with_root_certificate(
        mut self,
        pem: &[u8],
        identity: &ClientIdentity,
    ) -> Result<Self, VerifactuError> {
        let cert = reqwest::Certificate::from_pem(pem)
            .map_err(|e| VerifactuError::Config(format!("invalid root certificate: {e}")))?;
        *self.client.get_mut() = build_client(identity, Some(&cert))?;
        self.root_ca = Some(cert);
        Ok(self)
    }

    /// Swap the client certificate. In-flight requests finish on the old one.
    pub fn replace_identity(&self, identity: &ClientIdentity) -> Result<(), VerifactuError> {
        let client = build_client(identity, self.root_ca.as_ref())?;
        *self.client.write() = client;
        debug!(endpoint = %self.endpoint, "client identity replaced");
        Ok(())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn build_client(
    identity: &ClientIdentity,
    root_ca: Option<&reqwest::Certificate>,
) -> Result<reqwest::Client, VerifactuError> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .identity(identity.to_reqwest()?);
    if let Some(cert) = root_ca {
        builder = builder.add_root_certificate(cert.clone());
    }
    builder
        .build()
        .map_err(|e| VerifactuError::Config(format!("cannot build HTTP client: {e}")))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        envelope: &SoapEnvelope,
        timeout: Duration,
    ) -> Result<SoapResponse, VerifactuError> {
        // reqwest::Client is a cheap handle; don't hold the lock across await
        let client = self.client.read().clone();

        debug!(
            endpoint = %self.endpoint,
            action = %envelope.action,
            bytes = envelope.xml.len(),
            "posting SOAP envelope"
        );

        let response = client
            .post(&self.endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", envelope.action.as_str())
            .timeout(timeout)
            .body(envelope.xml.clone())
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                VerifactuError::Timeout { after: timeout }
            } else {
                VerifactuError::Network(format!("reading response body: {e}"))
            }
        })?;

        debug!(status, bytes = body.len(), "SOAP response received");
        interpret_http(status, body)
    }
}

fn map_send_error(e: reqwest::Error, timeout: Duration) -> VerifactuError {
    if e.is_timeout() {
        return VerifactuError::Timeout { after: timeout };
    }
    let chain = error_chain(&e);
    if looks_like_tls(&chain) {
        return VerifactuError::Tls(chain);
    }
    if e.is_connect() {
        return VerifactuError::Connection(chain);
    }
    VerifactuError::Network(chain)
}

fn error_chain(e: &(dyn StdError + 'static)) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn looks_like_tls(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["tls", "certificate", "handshake", "alert"]
        .iter()
        .any(|needle| lower.contains(needle))
}
