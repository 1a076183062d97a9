//! MD5 content fingerprints.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a hex digest string cannot be parsed.
#[derive(Debug, Error)]
#[error("invalid MD5 digest '{0}'")]
pub struct InvalidChecksum(pub String);

/// A 16-byte MD5 content fingerprint.
///
/// The all-zero digest is the conventional "unknown" value. Two digests
/// *match* iff either side is unknown or they are byte-equal; use
/// [`Md5::matches`] rather than `==` whenever one side may be unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Md5(pub [u8; 16]);

impl Md5 {
    /// The "unknown checksum" value.
    pub const ZERO: Md5 = Md5([0; 16]);

    /// Digest a complete byte buffer.
    pub fn digest(data: &[u8]) -> Md5 {
        Md5(md5::compute(data).0)
    }

    pub fn from_hex(s: &str) -> Result<Md5, InvalidChecksum> {
        let bytes = hex::decode(s.trim()).map_err(|_| InvalidChecksum(s.to_string()))?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| InvalidChecksum(s.to_string()))?;
        Ok(Md5(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_unknown(&self) -> bool {
        *self == Md5::ZERO
    }

    /// The protocol matching rule: unknown matches anything.
    pub fn matches(&self, other: &Md5) -> bool {
        self.is_unknown() || other.is_unknown() || self == other
    }
}

impl std::fmt::Display for Md5 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Incremental MD5 accumulation over streamed content.
pub struct Md5Accum {
    ctx: md5::Context,
}

impl Md5Accum {
    pub fn new() -> Md5Accum {
        Md5Accum {
            ctx: md5::Context::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.ctx.consume(data);
    }

    pub fn finish(self) -> Md5 {
        Md5(self.ctx.compute().0)
    }
}
