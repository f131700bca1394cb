//! Cache key derivation.
//!
//! A bundle is cached per verse *and* per audience: the same reference
//! generates different content for a teen than for an adult in a hard
//! season, so the profile fields that shape content are part of the key.

use crate::types::Profile;
use sha2::{Digest, Sha256};

/// Lowercase and collapse whitespace runs to underscores.
fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for ch in s.trim().chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push('_');
                in_space = true;
            }
        } else {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            in_space = false;
        }
    }
    out
}

/// Derive the cache key for a verse reference and profile. Deterministic and
/// stable across calls with identical inputs.
pub fn cache_key(reference: &str, profile: &Profile) -> String {
    let audience = normalize(&format!(
        "{}_{}_{}",
        profile.age_range,
        profile.stage_situation,
        profile.content_mode.as_str()
    ));
    format!("{}_{}", normalize(reference), audience)
}

/// Hash a cache key into a filesystem-safe entry filename stem.
pub fn key_hash(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
