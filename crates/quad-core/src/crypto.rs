//! Encryption at rest for stored connection passwords
//!
//! Passwords are sealed with AES-256-GCM under a key derived once from the
//! configured secret with HKDF-SHA256. Every encryption draws a fresh random
//! 12-byte IV, and the stored form is self-contained:
//!
//! ```text
//! hex(iv) ":" hex(ciphertext || tag)
//! ```

use crate::{Error, Result};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::hkdf::{Salt, HKDF_SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;

/// AES-256 key size in bytes
const KEY_SIZE: usize = 32;

const KDF_SALT: &[u8] = b"quad-admin-credentials-v1";
const KDF_INFO: &[u8] = b"connection-password";

/// HKDF output length marker
struct DerivedKeyLen;

impl ring::hkdf::KeyType for DerivedKeyLen {
    fn len(&self) -> usize {
        KEY_SIZE
    }
}

/// Symmetric cipher for connection passwords
pub struct CredentialCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl CredentialCipher {
    /// Derive the cipher key from a configured secret
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Crypto("encryption secret is empty".into()));
        }

        let prk = Salt::new(HKDF_SHA256, KDF_SALT).extract(secret.as_bytes());
        let okm = prk
            .expand(&[KDF_INFO], DerivedKeyLen)
            .map_err(|_| Error::Crypto("key derivation failed".into()))?;

        let mut key_bytes = [0u8; KEY_SIZE];
        okm.fill(&mut key_bytes)
            .map_err(|_| Error::Crypto("key expansion failed".into()))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| Error::Crypto("invalid key".into()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut iv = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut iv)
            .map_err(|_| Error::Crypto("failed to generate IV".into()))?;

        let mut buffer = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut buffer)
            .map_err(|_| Error::Crypto("seal failed".into()))?;

        Ok(format!("{}:{}", hex::encode(iv), hex::encode(buffer)))
    }

    /// Split on the first colon, rebuild the IV and open the ciphertext
    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let (iv_hex, ciphertext_hex) = stored
            .split_once(':')
            .ok_or_else(|| Error::Crypto("invalid format: missing IV separator".into()))?;

        let iv_bytes = hex::decode(iv_hex)
            .map_err(|e| Error::Crypto(format!("invalid IV encoding: {}", e)))?;
        let iv: [u8; NONCE_LEN] = iv_bytes
            .try_into()
            .map_err(|_| Error::Crypto("invalid IV length".into()))?;

        let mut buffer = hex::decode(ciphertext_hex)
            .map_err(|e| Error::Crypto(format!("invalid ciphertext encoding: {}", e)))?;

        let plaintext = self
            .key
            .open_in_place(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut buffer)
            .map_err(|_| Error::Crypto("authentication failed".into()))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| Error::Crypto("decrypted password is not valid UTF-8".into()))
    }
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("algorithm", &"AES-256-GCM")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
