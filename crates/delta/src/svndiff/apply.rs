//! Applying delta windows against a random-access source.

use std::io::{Read, Seek, SeekFrom, Write};

use subdav_types::checksum::Md5Accum;
use subdav_types::Md5;

use crate::error::DeltaError;
use crate::window::DeltaWindow;

/// Consumes delta windows, materializing each source view from a seekable
/// source and writing the produced target bytes to a sink.
///
/// The running MD5 of the target is verified against the expected digest, if
/// one was announced, when the stream ends.
pub struct WindowApplier<S, W> {
    source: S,
    target: W,
    expected: Option<Md5>,
    digest: Md5Accum,
    scratch: Vec<u8>,
    produced: u64,
}

impl<S: Read + Seek, W: Write> WindowApplier<S, W> {
    pub fn new(source: S, target: W, expected: Option<Md5>) -> WindowApplier<S, W> {
        WindowApplier {
            source,
            target,
            expected,
            digest: Md5Accum::new(),
            scratch: Vec::new(),
            produced: 0,
        }
    }

    pub fn apply_window(&mut self, window: &DeltaWindow) -> Result<(), DeltaError> {
        self.scratch.clear();
        if window.source_len > 0 {
            self.scratch.resize(window.source_len, 0);
            self.source.seek(SeekFrom::Start(window.source_offset))?;
            self.source
                .read_exact(&mut self.scratch)
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::UnexpectedEof => DeltaError::UnexpectedEof,
                    _ => DeltaError::Io(e),
                })?;
        }
        let out = window.apply(&self.scratch)?;
        self.digest.update(&out);
        self.target.write_all(&out)?;
        self.produced += out.len() as u64;
        Ok(())
    }

    /// Total bytes produced so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// End of stream: flush, verify, and return the actual digest.
    pub fn finish(mut self) -> Result<Md5, DeltaError> {
        self.target.flush()?;
        let actual = self.digest.finish();
        if let Some(expected) = self.expected {
            if !expected.matches(&actual) {
                return Err(DeltaError::ChecksumMismatch {
                    expected: expected.to_hex(),
                    actual: actual.to_hex(),
                });
            }
        }
        Ok(actual)
    }
}

/// Apply a complete window sequence to an in-memory source.
pub fn apply_delta(
    source: &[u8],
    windows: &[DeltaWindow],
    expected: Option<Md5>,
) -> Result<Vec<u8>, DeltaError> {
    let mut out = Vec::new();
    let mut applier = WindowApplier::new(std::io::Cursor::new(source), &mut out, expected);
    for w in windows {
        applier.apply_window(w)?;
    }
    applier.finish()?;
    Ok(out)
}
