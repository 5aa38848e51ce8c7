//! View-token fingerprints used as redemption record keys

use md5::{Digest, Md5};
use std::fmt;

/// 128-bit digest of a view token, hex encoded (32 lowercase chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn digest(view_token: &str) -> Self {
        let mut hasher = Md5::new();
        hasher.update(view_token.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
