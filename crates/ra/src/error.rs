//! Error types for the remote-access layer.
//!
//! Errors are values with a stable kind tag (see [`RaError::kind`]), a
//! human-readable message, and an optional wrapped cause. Nothing here
//! aborts the process; callers decide what is fatal.

use subdav_delta::DeltaError;
use thiserror::Error;

/// Errors from the DAV remote-access layer.
#[derive(Debug, Error)]
pub enum RaError {
    // -- transport ----------------------------------------------------------
    #[error("could not connect to server: {0}")]
    ConnectionFailed(String),

    #[error("timed out waiting for server")]
    ConnectionTimedOut,

    #[error("could not create a request ({method} '{url}')")]
    RequestCreation { method: String, url: String },

    #[error("{context}: {message}")]
    RequestFailed {
        context: String,
        status: Option<u16>,
        message: String,
    },

    #[error("repository moved to '{location}'; please relocate")]
    Relocated { location: String },

    #[error("authorization failed")]
    NotAuthorized,

    #[error("authentication failed after {attempts} attempts")]
    AuthnFailed { attempts: u32 },

    // -- protocol / XML -----------------------------------------------------
    #[error("malformed XML in server response: {0}")]
    MalformedXml(String),

    #[error("unexpected element '{0}' in server response")]
    UnexpectedElement(String),

    #[error("incomplete data in server response: {0}")]
    IncompleteData(String),

    #[error("server does not support {0}")]
    UnsupportedFeature(String),

    #[error("REPORT response handling failed to complete the editor drive")]
    IncompleteEdit,

    // -- tree state ---------------------------------------------------------
    #[error("'{0}' path not found")]
    PathNotFound(String),

    #[error("item is out of date: {0}")]
    OutOfDate(String),

    #[error("'{0}' already exists")]
    AlreadyExists(String),

    #[error("no lock token available for '{0}'")]
    NoLockToken(String),

    #[error("method not allowed ({method} '{url}')")]
    MethodNotAllowed { method: String, url: String },

    #[error("access forbidden ('{0}')")]
    Forbidden(String),

    // -- policy -------------------------------------------------------------
    #[error("operation cancelled")]
    Cancelled,

    #[error("illegal repository URL '{0}'")]
    BadUrl(String),

    #[error("invalid filename: {0}")]
    BadFilename(String),

    // -- composition --------------------------------------------------------
    /// A commit failed and the activity teardown failed too; the original
    /// failure stays primary, the cleanup failure rides along.
    #[error("{original} (cleanup also failed: {cleanup})")]
    CommitCleanup {
        original: Box<RaError>,
        cleanup: Box<RaError>,
    },

    /// Context wrapper, the `.context("...")` of this crate.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<RaError>,
    },

    #[error(transparent)]
    Delta(#[from] DeltaError),

    #[error("working copy error: {0}")]
    WorkingCopy(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RaError {
    /// Wrap with a human-readable context line, preserving the cause chain.
    pub fn context(self, context: impl Into<String>) -> RaError {
        RaError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The stable kind tag of this error, reaching through context wrappers.
    pub fn kind(&self) -> &'static str {
        match self {
            RaError::ConnectionFailed(_) => "connection-failed",
            RaError::ConnectionTimedOut => "connection-timed-out",
            RaError::RequestCreation { .. } => "request-creation-failed",
            RaError::RequestFailed { .. } => "request-failed",
            RaError::Relocated { .. } => "relocated",
            RaError::NotAuthorized => "not-authorized",
            RaError::AuthnFailed { .. } => "authn-failed",
            RaError::MalformedXml(_) => "malformed-xml",
            RaError::UnexpectedElement(_) => "unexpected-element",
            RaError::IncompleteData(_) => "incomplete-data",
            RaError::UnsupportedFeature(_) => "unsupported-feature",
            RaError::IncompleteEdit => "incomplete-edit",
            RaError::PathNotFound(_) => "path-not-found",
            RaError::OutOfDate(_) => "out-of-date",
            RaError::AlreadyExists(_) => "already-exists",
            RaError::NoLockToken(_) => "no-lock-token",
            RaError::MethodNotAllowed { .. } => "method-not-allowed",
            RaError::Forbidden(_) => "forbidden",
            RaError::Cancelled => "cancelled",
            RaError::BadUrl(_) => "bad-url",
            RaError::BadFilename(_) => "bad-filename",
            RaError::CommitCleanup { original, .. } => original.kind(),
            RaError::Context { source, .. } => source.kind(),
            RaError::Delta(e) => match e {
                DeltaError::MalformedSvndiff(_) => "malformed-svndiff",
                DeltaError::UnsupportedVersion(_) => "unsupported-version",
                DeltaError::ChecksumMismatch { .. } => "checksum-mismatch",
                DeltaError::UnexpectedEof => "stream-unexpected-eof",
                _ => "delta",
            },
            RaError::WorkingCopy(_) => "working-copy",
            RaError::Io(_) => "io",
        }
    }
}

impl From<RaError> for DeltaError {
    fn from(err: RaError) -> DeltaError {
        match err {
            RaError::Delta(inner) => inner,
            other => DeltaError::external(other),
        }
    }
}

impl From<reqwest::Error> for RaError {
    fn from(err: reqwest::Error) -> RaError {
        if err.is_timeout() {
            RaError::ConnectionTimedOut
        } else if err.is_connect() {
            RaError::ConnectionFailed(err.to_string())
        } else {
            RaError::RequestFailed {
                context: "HTTP transport".to_string(),
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}
