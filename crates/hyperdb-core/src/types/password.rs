//! # Password Values
//!
//! Passwords are stored as `{SCHEME}digest` only. The plaintext is hashed on
//! construction and never kept.

use super::HyperdbError;
use std::fmt;
use std::str::FromStr;

/// Scheme tag of the default digest.
pub const DEFAULT_SCHEME: &str = "BLAKE3";

/// A one-way hashed secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Password {
    scheme: String,
    digest: String,
}

impl Password {
    /// Hash `plaintext` with the default scheme.
    #[must_use]
    pub fn new(plaintext: &str) -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            digest: digest(plaintext),
        }
    }

    /// Rebuild a stored password. Unknown schemes are rejected.
    pub fn from_parts(scheme: &str, digest: &str) -> Result<Self, HyperdbError> {
        if scheme != DEFAULT_SCHEME {
            return Err(HyperdbError::Value(format!(
                "unknown password scheme '{}'",
                scheme
            )));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            digest: digest.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// True if `plaintext` hashes to this password's digest.
    #[must_use]
    pub fn matches(&self, plaintext: &str) -> bool {
        self.digest == digest(plaintext)
    }
}

fn digest(plaintext: &str) -> String {
    blake3::hash(plaintext.as_bytes()).to_hex().to_string()
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.scheme, self.digest)
    }
}

/// Parses the stored `{SCHEME}digest` form, not plaintext.
impl FromStr for Password {
    type Err = HyperdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix('{')
            .and_then(|rest| rest.split_once('}'))
            .ok_or_else(|| HyperdbError::Value(format!("'{}' is not a stored password", s)))?;
        Self::from_parts(body.0, body.1)
    }
}
