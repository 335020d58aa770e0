//! 会话负载加解密
//!
//! AES-256-GCM，密钥为应用密钥的 SHA-256，输出 base64(nonce || 密文)。

use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng, rand_core::RngCore},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};

use super::SessionError;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

#[derive(Clone)]
pub struct SessionCipher {
    key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}

impl SessionCipher {
    pub fn new(app_secret: &str) -> Self {
        let digest = Sha256::digest(app_secret.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, SessionError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| SessionError::Cipher(format!("cipher init failed: {e}")))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| SessionError::Cipher(format!("encryption failed: {e}")))?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(output))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, SessionError> {
        let data = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SessionError::Cipher(format!("invalid base64: {e}")))?;
        if data.len() < NONCE_SIZE {
            return Err(SessionError::Cipher("payload too short".into()));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| SessionError::Cipher(format!("cipher init failed: {e}")))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| SessionError::Cipher(format!("decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| SessionError::Cipher(format!("invalid utf-8: {e}")))
    }
}
