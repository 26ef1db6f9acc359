//! Deterministic idempotency-key derivation.

use sha2::{Digest, Sha256};

use matterflow_core::MatterId;

/// Derive the idempotency key for one logical unit of work.
///
/// The key identifies the *logical* job, never the physical delivery:
/// re-enqueuing the same work yields the same key, and a new content
/// version yields a new one. SHA-256 over the job type, subject, and
/// content version, hex-encoded.
pub fn derive_idempotency_key(job_type: &str, subject: MatterId, content_version: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(job_type.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(subject.as_uuid().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(content_version.to_be_bytes());
    let digest = hasher.finalize();
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use core::fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_redelivery() {
        let subject = MatterId::new();
        let a = derive_idempotency_key("profile_summary", subject, 3);
        let b = derive_idempotency_key("profile_summary", subject, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_per_type_subject_and_version() {
        let subject = MatterId::new();
        let base = derive_idempotency_key("profile_summary", subject, 3);
        assert_ne!(base, derive_idempotency_key("rag_indexing", subject, 3));
        assert_ne!(base, derive_idempotency_key("profile_summary", MatterId::new(), 3));
        assert_ne!(base, derive_idempotency_key("profile_summary", subject, 4));
    }

    #[test]
    fn key_is_lower_hex() {
        let key = derive_idempotency_key("profile_summary", MatterId::new(), 1);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
