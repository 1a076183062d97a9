//! Session configuration.

use serde::{Deserialize, Serialize};

/// Tunables for one RA session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds without data on a response before the request fails with
    /// `connection-timed-out` (default 3600, matching long REPORT drives).
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Seconds allowed for the TCP/TLS handshake (default 30).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Accept compressed response bodies.
    #[serde(default = "default_true")]
    pub compression: bool,

    /// How many credential rounds to attempt after a 401 (default 4).
    #[serde(default = "default_auth_attempts")]
    pub auth_attempts: u32,

    /// Treat a 404 on a commit-time DELETE as success. Off by default: the
    /// merge-on-the-fly server model makes such deletes idempotent, but that
    /// interacts badly with concurrent server-side deletions, so callers
    /// must ask for it.
    #[serde(default)]
    pub idempotent_delete: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            read_timeout_secs: default_read_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            compression: true,
            auth_attempts: default_auth_attempts(),
            idempotent_delete: false,
        }
    }
}

fn default_read_timeout() -> u64 {
    3600
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_auth_attempts() -> u32 {
    4
}

fn default_true() -> bool {
    true
}
