use aes_gcm::aead::{rand_core::RngCore, Aead, OsRng};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 200_000;
const TAG_LEN: usize = 16;
const IV_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("cipher failure")]
    Cipher,
    #[error("encryption output too short")]
    ShortOutput,
}

/// Encrypted payload as written to disk. `tag` is kept apart from `data` so the
/// envelope stays readable by tools that expect the split layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoEnvelope {
    pub v: u8,
    pub salt: String,
    pub iv: String,
    pub tag: String,
    pub data: String,
}

impl CryptoEnvelope {
    pub fn salt_bytes(&self) -> Option<Vec<u8>> {
        decode_b64(self.salt.as_str()).ok().filter(|salt| !salt.is_empty())
    }
}

pub fn random_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    salt
}

pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations.max(1), &mut key);
    key
}

pub fn encrypt_with_key(text: &str, salt: &[u8], key: &[u8; 32]) -> Result<CryptoEnvelope, CryptoError> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| CryptoError::Cipher)?;
    let nonce = Nonce::from_slice(&iv);
    let encrypted = cipher
        .encrypt(nonce, text.as_bytes())
        .map_err(|_| CryptoError::Cipher)?;

    if encrypted.len() < TAG_LEN {
        return Err(CryptoError::ShortOutput);
    }
    let (data, tag) = encrypted.split_at(encrypted.len() - TAG_LEN);

    Ok(CryptoEnvelope {
        v: 1,
        salt: encode_b64(salt),
        iv: encode_b64(&iv),
        tag: encode_b64(tag),
        data: encode_b64(data),
    })
}

/// Returns `None` when the envelope is malformed or the key does not open it.
pub fn decrypt_with_key(payload: &CryptoEnvelope, key: &[u8; 32]) -> Option<String> {
    let iv = decode_b64(payload.iv.as_str()).ok()?;
    let tag = decode_b64(payload.tag.as_str()).ok()?;
    let data = decode_b64(payload.data.as_str()).ok()?;
    if iv.len() != IV_LEN || tag.is_empty() {
        return None;
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).ok()?;
    let nonce = Nonce::from_slice(iv.as_slice());
    let mut combined = Vec::with_capacity(data.len() + tag.len());
    combined.extend_from_slice(data.as_slice());
    combined.extend_from_slice(tag.as_slice());

    let decrypted = cipher.decrypt(nonce, combined.as_slice()).ok()?;
    String::from_utf8(decrypted).ok()
}

pub fn decode_b64(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    B64.decode(value)
}

pub fn encode_b64(bytes: &[u8]) -> String {
    B64.encode(bytes)
}
