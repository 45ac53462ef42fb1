use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while chaining, transmitting, or interpreting records.
///
/// Every variant carries the data needed to act on it; [`VerifactuError::kind`]
/// collapses them into the coarse [`ErrorKind`] the retry policy works with.
#[derive(Debug, Clone, Error, PartialEq)]
#[non_exhaustive]
pub enum VerifactuError {
    /// Connection could not be established (DNS failure, refused, unreachable).
    #[error("connection error: {0}")]
    Connection(String),

    /// Connection broke while the request or response was in flight.
    #[error("network error: {0}")]
    Network(String),

    /// The attempt exceeded its deadline.
    #[error("request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// TLS handshake or certificate failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The service answered with a SOAP fault.
    #[error("SOAP fault [{code}]: {message}")]
    SoapFault { code: String, message: String },

    /// The service is temporarily unable to process requests.
    #[error("service unavailable (HTTP {status}): {message}")]
    ServiceUnavailable { status: u16, message: String },

    /// The client certificate was not accepted.
    #[error("authentication failed (HTTP {status}): {message}")]
    AuthenticationFailed { status: u16, message: String },

    /// The authority rejected the record's content.
    #[error("record rejected [{code}]: {description}")]
    Rejected { code: String, description: String },

    /// The record failed pre-submission checks.
    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    /// No seed or recovered checkpoint was supplied for the issuer.
    #[error("chain not initialized for issuer {issuer}")]
    ChainNotInitialized { issuer: String },

    /// The issuer's chain advanced past the pending link's predecessor.
    #[error("chain conflict for issuer {issuer}: expected head {expected}, found {actual}")]
    ChainConflict {
        issuer: String,
        expected: u64,
        actual: u64,
    },

    /// XML generation or parsing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// Invalid client configuration or TLS material.
    #[error("configuration error: {0}")]
    Config(String),

    /// The chain store failed to load or save a checkpoint.
    #[error("chain store error: {0}")]
    Store(String),
}

/// Coarse failure classes used by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TransientNetwork,
    Timeout,
    Tls,
    ProtocolFault,
    ApplicationRejected,
    ServiceUnavailable,
    AuthenticationFailed,
    Validation,
    Chain,
    Configuration,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::Timeout => "timeout",
            Self::Tls => "tls",
            Self::ProtocolFault => "protocol_fault",
            Self::ApplicationRejected => "application_rejected",
            Self::ServiceUnavailable => "service_unavailable",
            Self::AuthenticationFailed => "authentication_failed",
            Self::Validation => "validation",
            Self::Chain => "chain",
            Self::Configuration => "configuration",
            Self::Persistence => "persistence",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VerifactuError {
    /// The failure class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) | Self::Network(_) => ErrorKind::TransientNetwork,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Tls(_) => ErrorKind::Tls,
            Self::SoapFault { .. } | Self::Xml(_) => ErrorKind::ProtocolFault,
            Self::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            Self::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
            Self::Rejected { .. } => ErrorKind::ApplicationRejected,
            Self::Validation(_) => ErrorKind::Validation,
            Self::ChainNotInitialized { .. } | Self::ChainConflict { .. } => ErrorKind::Chain,
            Self::Config(_) => ErrorKind::Configuration,
            Self::Store(_) => ErrorKind::Persistence,
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dot-separated path to the invalid field (e.g. "issuer.tax_id").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
    /// AEAT validation code if applicable (e.g. "1100").
    pub rule: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "[{}] {}: {}", rule, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

impl ValidationError {
    /// Create a validation error without a rule code.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: None,
        }
    }

    /// Create a validation error with an AEAT rule code.
    pub fn with_rule(
        field: impl Into<String>,
        message: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: Some(rule.into()),
        }
    }
}
