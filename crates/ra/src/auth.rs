//! Credential sources for HTTP authentication.

use std::sync::Mutex;

/// One set of HTTP credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Supplies credentials when the server challenges.
///
/// The session asks once per 401, passing the zero-based attempt number;
/// returning `None` ends the iteration and surfaces `not-authorized`. After
/// the first successful response following a challenge, the session calls
/// [`AuthProvider::save`] so interactive providers can persist what worked.
pub trait AuthProvider: Send + Sync {
    fn credentials(&self, realm: &str, attempt: u32) -> Option<Credentials>;

    fn save(&self, _credentials: &Credentials) {}
}

/// Fixed username/password credentials.
pub struct StaticAuth {
    credentials: Credentials,
    saved: Mutex<bool>,
}

impl StaticAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> StaticAuth {
        StaticAuth {
            credentials: Credentials {
                username: username.into(),
                password: password.into(),
            },
            saved: Mutex::new(false),
        }
    }

    /// Whether the session reported these credentials as working.
    pub fn was_saved(&self) -> bool {
        *self.saved.lock().unwrap()
    }
}

impl AuthProvider for StaticAuth {
    fn credentials(&self, _realm: &str, _attempt: u32) -> Option<Credentials> {
        Some(self.credentials.clone())
    }

    fn save(&self, _credentials: &Credentials) {
        *self.saved.lock().unwrap() = true;
    }
}

/// A provider with nothing to offer; anonymous access only.
pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn credentials(&self, _realm: &str, _attempt: u32) -> Option<Credentials> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_auth() {
        let auth = StaticAuth::new("alice", "secret");
        let creds = auth.credentials("realm", 0).unwrap();
        assert_eq!(creds.username, "alice");
        assert!(!auth.was_saved());
        auth.save(&creds);
        assert!(auth.was_saved());
    }

    #[test]
    fn test_no_auth() {
        assert!(NoAuth.credentials("realm", 0).is_none());
    }
}
