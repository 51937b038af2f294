use ring::hmac;

/// HMAC-SHA256 of `payload`, hex encoded
pub fn sign(payload: &str, key: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hex::encode(hmac::sign(&key, payload.as_bytes()).as_ref())
}

/// Constant-time check of a hex signature produced by [`sign`]
pub fn verify(payload: &str, signature: &str, key: &[u8]) -> bool {
    let Ok(tag) = hex::decode(signature) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, payload.as_bytes(), &tag).is_ok()
}

/// SHA-256 hex digest, used to store login tokens without keeping the token itself
pub fn sha256_hex(value: &str) -> String {
    use ring::digest;

    hex::encode(digest::digest(&digest::SHA256, value.as_bytes()).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = b"qr-signing-key";
        let sig = sign("PP000001", key);

        assert_eq!(sig.len(), 64);
        assert!(verify("PP000001", &sig, key));
        assert!(!verify("PP000002", &sig, key));
        assert!(!verify("PP000001", &sig, b"other-key"));
        assert!(!verify("PP000001", "not-hex", key));
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
