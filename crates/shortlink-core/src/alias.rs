//! Random alias generation

use chrono::Utc;
use sha2::{Digest, Sha256};

const ALIAS_LEN: usize = 5;

/// Derive a short alias for `target` from a hash of the target and the current time
pub fn generate_alias(target: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}/{}", target, Utc::now().to_rfc3339()).as_bytes());
    let mut alias = hex::encode(hasher.finalize());
    alias.truncate(ALIAS_LEN);
    alias
}
