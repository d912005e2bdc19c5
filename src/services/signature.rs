use ring::hmac;

#[derive(thiserror::Error, Debug)]
pub enum SignatureError {
    #[error("Signature is not valid hex")]
    MalformedSignature,

    #[error("Signature does not match payload")]
    Mismatch,
}

/// Signs a payload with HMAC-SHA256 and returns the tag as lowercase hex.
pub fn sign(payload: &str, key: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let tag = hmac::sign(&key, payload.as_bytes());
    hex::encode(tag.as_ref())
}

/// Verifies a hex HMAC-SHA256 tag in constant time.
pub fn verify(payload: &str, signature: &str, key: &[u8]) -> Result<(), SignatureError> {
    let tag = hex::decode(signature).map_err(|_| SignatureError::MalformedSignature)?;
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, payload.as_bytes(), &tag).map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_hex() {
        let signature = sign("payload", b"test-signing-key");
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_accepts_own_signature() {
        let key = b"test-signing-key";
        let signature = sign("payload", key);
        assert!(verify("payload", &signature, key).is_ok());
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let key = b"test-signing-key";
        let signature = sign("payload", key);
        assert!(matches!(
            verify("payload!", &signature, key),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn test_verify_rejects_non_hex() {
        assert!(matches!(
            verify("payload", "not-hex", b"key"),
            Err(SignatureError::MalformedSignature)
        ));
    }
}
