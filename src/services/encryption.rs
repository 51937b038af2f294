use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

#[derive(thiserror::Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Invalid encrypted data format")]
    InvalidFormat,

    #[error("Invalid key")]
    InvalidKey,
}

/// AES-256-GCM sealing of short text payloads into URL-safe tokens.
///
/// Token layout before base64: `[nonce (12 bytes)][ciphertext + tag]`.
pub struct PayloadCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl PayloadCipher {
    /// Builds a cipher from a configured secret of any length
    pub fn from_secret(secret: &str) -> Result<Self, EncryptionError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &derive_key(secret))
            .map_err(|_| EncryptionError::InvalidKey)?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| EncryptionError::EncryptionFailed)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| EncryptionError::EncryptionFailed)?;

        let mut token = Vec::with_capacity(NONCE_LEN + in_out.len());
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&in_out);

        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    pub fn open(&self, token: &str) -> Result<String, EncryptionError> {
        let data = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| EncryptionError::InvalidFormat)?;
        if data.len() < NONCE_LEN {
            return Err(EncryptionError::InvalidFormat);
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| EncryptionError::InvalidFormat)?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| EncryptionError::DecryptionFailed)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| EncryptionError::DecryptionFailed)
    }
}

/// SHA-256 of the configured secret, so any length of secret gives a 32-byte key
pub fn derive_key(secret: &str) -> [u8; 32] {
    let hash = digest::digest(&digest::SHA256, secret.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(hash.as_ref());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let cipher = PayloadCipher::from_secret("qr-encryption-key").unwrap();
        let token = cipher.seal("PP000042").unwrap();

        assert!(!token.contains('+') && !token.contains('/'));
        assert_eq!(cipher.open(&token).unwrap(), "PP000042");
    }

    #[test]
    fn test_sealing_is_non_deterministic() {
        let cipher = PayloadCipher::from_secret("qr-encryption-key").unwrap();

        let first = cipher.seal("same").unwrap();
        let second = cipher.seal("same").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_wrong_key_fails() {
        let token = PayloadCipher::from_secret("key-one").unwrap().seal("secret").unwrap();
        let result = PayloadCipher::from_secret("key-two").unwrap().open(&token);

        assert!(matches!(result, Err(EncryptionError::DecryptionFailed)));
    }

    #[test]
    fn test_garbage_token_is_invalid_format() {
        let cipher = PayloadCipher::from_secret("key").unwrap();
        assert!(matches!(cipher.open("@@@"), Err(EncryptionError::InvalidFormat)));
        assert!(matches!(cipher.open("AAAA"), Err(EncryptionError::InvalidFormat)));
    }
}
