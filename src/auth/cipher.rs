use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Separates the hex-encoded nonce from the hex-encoded ciphertext.
/// A stored value containing this character is treated as ciphered.
const DELIMITER: char = ':';

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("malformed ciphertext")]
    Malformed,

    #[error("invalid hex encoding: {0}")]
    Encoding(#[from] hex::FromHexError),

    #[error("decryption failed")]
    Aead,

    #[error("decrypted value is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Symmetric cipher for sensitive user columns.
///
/// Values are stored as `hex(nonce):hex(ciphertext)` with a fresh random
/// nonce per encryption. The key is derived from the configured secret
/// with SHA-256.
pub struct FieldCipher {
    key: [u8; 32],
}

impl FieldCipher {
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Whether a stored value looks ciphered (contains the delimiter).
    pub fn is_ciphered(&self, value: &str) -> bool {
        value.contains(DELIMITER)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Aead)?;

        Ok(format!(
            "{}{}{}",
            hex::encode(nonce_bytes),
            DELIMITER,
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, value: &str) -> Result<String, CipherError> {
        let (nonce_hex, ciphertext_hex) = value.split_once(DELIMITER).ok_or(CipherError::Malformed)?;

        let nonce_bytes = hex::decode(nonce_hex)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CipherError::Malformed);
        }
        let ciphertext = hex::decode(ciphertext_hex)?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CipherError::Aead)?;

        Ok(String::from_utf8(plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cipher = FieldCipher::new("test-secret");
        let stored = cipher.encrypt("Juana Pérez").unwrap();

        assert!(cipher.is_ciphered(&stored));
        assert_eq!(cipher.decrypt(&stored).unwrap(), "Juana Pérez");
    }

    #[test]
    fn plain_values_are_not_ciphered() {
        let cipher = FieldCipher::new("test-secret");
        assert!(!cipher.is_ciphered("Juana"));
        assert!(!cipher.is_ciphered(""));
    }

    #[test]
    fn nonces_are_fresh_per_encryption() {
        let cipher = FieldCipher::new("test-secret");
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_missing_delimiter() {
        let cipher = FieldCipher::new("test-secret");
        assert!(matches!(cipher.decrypt("deadbeef"), Err(CipherError::Malformed)));
    }

    #[test]
    fn rejects_bad_hex() {
        let cipher = FieldCipher::new("test-secret");
        assert!(matches!(
            cipher.decrypt("zz:zz"),
            Err(CipherError::Encoding(_))
        ));
    }

    #[test]
    fn rejects_wrong_key() {
        let stored = FieldCipher::new("key-a").encrypt("secret").unwrap();
        assert!(matches!(
            FieldCipher::new("key-b").decrypt(&stored),
            Err(CipherError::Aead)
        ));
    }
}
