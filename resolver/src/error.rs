//! Unified resolver error type used across all components.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced pipeline or workflow does not exist.
    NotFound,
    /// The request is inconsistent or malformed.
    InvalidRequest,
    /// A JSON document could not be decoded.
    Parse,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "NotFound"),
            ErrorKind::InvalidRequest => write!(f, "InvalidRequest"),
            ErrorKind::Parse => write!(f, "Parse"),
        }
    }
}

/// User-facing error. `Display` renders the message only; the kind and
/// stage are available to callers that want to branch on them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ResolveError {
    pub kind: ErrorKind,
    pub message: String,
    /// Name of the pipeline stage element the error was raised for, if any.
    pub stage: Option<String>,
}

pub type Result<T> = std::result::Result<T, ResolveError>;

impl ResolveError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ResolveError {
            kind: ErrorKind::NotFound,
            message: message.into(),
            stage: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        ResolveError {
            kind: ErrorKind::InvalidRequest,
            message: message.into(),
            stage: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        ResolveError {
            kind: ErrorKind::Parse,
            message: message.into(),
            stage: None,
        }
    }

    /// Attach the stage element name, keeping one already set closer to the source.
    pub fn at_stage(mut self, stage: impl Into<String>) -> Self {
        if self.stage.is_none() {
            self.stage = Some(stage.into());
        }
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_invalid_request(&self) -> bool {
        self.kind == ErrorKind::InvalidRequest
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(e: serde_json::Error) -> Self {
        ResolveError::parse(format!("Failed to parse JSON: {}", e))
    }
}
