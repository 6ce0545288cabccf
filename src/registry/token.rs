//! Name reclaim tokens

use sha2::{Digest, Sha256};

/// Opaque credential proving continuity of a registered name
///
/// A fresh token is issued on every successful registration. Presenting the
/// token currently on file for a name is the only way to take that name
/// over from the connection holding it.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Generate a new random token
    ///
    /// 8 bytes from the thread RNG hashed with SHA-256, hex encoded.
    pub fn generate() -> Self {
        let seed: [u8; 8] = rand::random();
        Self(hex::encode(Sha256::digest(seed)))
    }

    /// Check a client-supplied token against this one
    ///
    /// An absent candidate never matches.
    pub fn matches(&self, candidate: Option<&str>) -> bool {
        candidate.is_some_and(|candidate| candidate == self.0)
    }

    /// Token text as sent to the client
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep tokens out of logs.
impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(..)")
    }
}
