//! SHA-256 hashing.
//!
//! Used for the message layer's `content-digest` component and anywhere
//! else a plain content hash is needed. Distinct from `hmac`, which is
//! keyed.

use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// `Content-Digest` value for a message body: `sha-256=:<base64 of sha256(body)>:`,
/// per RFC 9421's structured-field digest convention.
pub fn content_digest(body: &[u8]) -> String {
    use base64::Engine;
    let digest = sha256(body);
    format!(
        "sha-256=:{}:",
        base64::engine::general_purpose::STANDARD.encode(digest)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_answer() {
        // sha256("") per FIPS 180-4 test vectors
        let digest = sha256(b"");
        assert_eq!(
            hex::encode(digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn content_digest_format() {
        let d = content_digest(b"hello");
        assert!(d.starts_with("sha-256=:"));
        assert!(d.ends_with(':'));
    }
}
