//! Errors produced by the delta codec and editor drives.

use thiserror::Error;

/// Errors from svndiff coding, window application, and editor drives.
#[derive(Debug, Error)]
pub enum DeltaError {
    /// The svndiff byte stream violates the wire format.
    #[error("malformed svndiff data: {0}")]
    MalformedSvndiff(String),

    /// The stream announces an svndiff version this implementation does not
    /// speak.
    #[error("unsupported svndiff version {0}")]
    UnsupportedVersion(u8),

    /// A produced text does not carry the announced MD5 digest.
    #[error("checksum mismatch: expected {expected}, actual {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The stream ended in the middle of a window.
    #[error("unexpected end of svndiff stream")]
    UnexpectedEof,

    /// A driver violated the editor protocol (out-of-order close, operation
    /// after `close_edit`, delta after delta, ...).
    #[error("editor drive violation: {0}")]
    EditOrder(String),

    #[error("delta I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error raised by a concrete editor implementation (for example the
    /// commit editor's network layer).
    #[error("editor error: {source}")]
    External {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl DeltaError {
    /// Wrap an implementation-specific error for transport through the
    /// editor interface.
    pub fn external<E>(err: E) -> DeltaError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DeltaError::External {
            source: Box::new(err),
        }
    }
}

pub(crate) fn malformed(msg: impl Into<String>) -> DeltaError {
    DeltaError::MalformedSvndiff(msg.into())
}
