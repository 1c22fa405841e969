//! Content digests used as cache identity for runnable code blocks.
//!
//! The digest depends on the raw block text only. Two blocks with the same
//! content share a digest (and therefore a cache slot) no matter which document
//! or language tag they appear under.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a code block's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Length of the hex-encoded digest.
    pub const LEN: usize = 64;

    /// Hash `content`. Total over all inputs, including the empty string.
    pub fn of(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentDigest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Shorthand for [`ContentDigest::of`].
pub fn digest(content: &str) -> ContentDigest {
    ContentDigest::of(content)
}
