//! Tenant domain validation.
//!
//! A [`Domain`] doubles as the cache key and the secret file name, so the
//! raw string is validated on every call path before it may touch either.

use std::fmt;

use serde::Serialize;

use crate::error::ServerError;

/// Development-only tenant, policy-gated in production.
pub const LOCALHOST: &str = "localhost";

/// A validated hostname identifying a tenant application.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Domain(String);

impl Domain {
    /// Validate a raw string as a tenant domain.
    ///
    /// Fails closed on anything that could escape the secrets directory:
    /// path separators, parent-directory sequences, NUL bytes, or
    /// characters outside the hostname charset. The rejected rule is
    /// logged, never surfaced.
    pub fn parse(raw: &str) -> Result<Self, ServerError> {
        if raw.is_empty()
            || raw.contains('/')
            || raw.contains('\\')
            || raw.contains("..")
            || raw.contains('\0')
        {
            tracing::warn!(domain = raw, "rejected domain with unsafe characters");
            return Err(ServerError::InvalidDomain);
        }

        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            tracing::warn!(domain = raw, "rejected domain outside hostname charset");
            return Err(ServerError::InvalidDomain);
        }

        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the development tenant.
    pub fn is_localhost(&self) -> bool {
        self.0 == LOCALHOST
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_hostnames() {
        for raw in [
            "app.example.com",
            "compta.nicefox.net",
            "a-b.c-d.io",
            "localhost",
            "127.0.0.1",
        ] {
            assert_eq!(Domain::parse(raw).unwrap().as_str(), raw);
        }
    }

    #[test]
    fn test_rejects_traversal() {
        for raw in [
            "",
            "../etc/passwd",
            "..",
            "a/b",
            "a\\b",
            "evil\0",
            "foo..bar",
        ] {
            assert!(Domain::parse(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn test_rejects_non_hostname_charset() {
        for raw in ["a b", "host_name", "héllo.com", "a:8080", "a@b", "a;b"] {
            assert!(Domain::parse(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn test_localhost() {
        assert!(Domain::parse("localhost").unwrap().is_localhost());
        assert!(!Domain::parse("example.com").unwrap().is_localhost());
    }
}
