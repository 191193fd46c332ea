//! Cache Key Module
//!
//! Derives fixed-length cache keys from a query template and its parameters.

use std::fmt::{self, Display, Write as _};

use sha2::{Digest, Sha256};

// == Cache Key ==
/// Hex-encoded SHA-256 digest identifying one cached query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Length of every derived key in hex characters.
    pub const LEN: usize = 64;

    /// Wraps an already derived hex digest.
    ///
    /// Returns `None` unless `hex` is exactly 64 lowercase hex characters.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == Self::LEN
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One query parameter, rendered through its `Display` impl.
pub type Param<'a> = &'a (dyn Display + Sync);

// == Derive Key ==
/// Derives the cache key for `query` executed with `params`.
///
/// The query and every parameter (rendered with its `Display` impl) are
/// each framed as `<byte length>:<text>`, so neither the query text nor a
/// parameter can forge a boundary. Parameter order is significant.
pub fn derive_key(query: &str, params: &[Param<'_>]) -> CacheKey {
    let mut material = String::with_capacity(query.len() + params.len() * 8 + 8);
    // Writing into a String never fails.
    let _ = write!(material, "{}:{}", query.len(), query);

    let mut rendered = String::new();
    for param in params {
        rendered.clear();
        let _ = write!(rendered, "{}", param);
        let _ = write!(material, ":{}:{}", rendered.len(), rendered);
    }

    let digest = Sha256::digest(material.as_bytes());
    CacheKey(hex::encode(digest))
}
