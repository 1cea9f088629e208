//! Content keys for compiled artifacts.
//!
//! An artifact is named after the SHA-1 digest of its templated Typst
//! document:
//! ```text
//! content_key = hex(SHA1(render_document(lines)))
//! ```
//! SHA-1 is used as a fast content fingerprint, not for security. No
//! normalization happens before hashing, so `x+y` and `x + y` produce
//! different keys.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

use crate::format::OutputFormat;
use crate::template::render_document;

/// Length of a content key in hex characters.
pub const CONTENT_KEY_LEN: usize = 40;

/// Hex digest identifying one templated document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKey(String);

impl ContentKey {
    /// Computes the key of an already templated document.
    pub fn of_document(document: &str) -> Self {
        let digest = Sha1::digest(document.as_bytes());
        Self(hex::encode(digest))
    }

    /// Templates the expression lines and computes the key of the result.
    pub fn of_expression<S: AsRef<str>>(lines: &[S]) -> Self {
        Self::of_document(&render_document(lines))
    }

    /// Parses a key from a hex string, e.g. an artifact file stem.
    ///
    /// Returns `None` unless `s` is exactly 40 lowercase hex characters.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == CONTENT_KEY_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(s.to_string()))
    }

    /// Returns the lowercase hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the artifact file name for the given format.
    pub fn file_name(&self, format: OutputFormat) -> String {
        format!("{}.{}", self.0, format.extension())
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
