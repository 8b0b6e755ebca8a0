//! API key storage.
//!
//! [`FileCredentialStore`] keeps the key in a small JSON file, encrypted with
//! AES-256-GCM under a PBKDF2-derived key:
//!
//! ```json
//! {"apiKey": "base64([12-byte IV][ciphertext with auth tag])", "useApiKey": true}
//! ```

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

const CREDENTIAL_SALT: &str = "bdrow-credential-salt-v1";
const PBKDF2_ITERATIONS: u32 = 100_000;
const IV_LENGTH: usize = 12;
const KEY_LENGTH: usize = 32; // 256 bits

/// Credential store errors
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Credential file is malformed: {0}")]
    Format(#[from] serde_json::Error),
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Encryption failed: {0}")]
    Crypto(String),
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<aes_gcm::Error> for CredentialError {
    fn from(e: aes_gcm::Error) -> Self {
        CredentialError::Crypto(e.to_string())
    }
}

/// Persistence for the API key and its "use this key" flag.
pub trait CredentialStore: Send + Sync {
    fn api_key(&self) -> Result<Option<String>, CredentialError>;

    /// Stores `api_key` trimmed. A blank key clears the stored one.
    fn save_api_key(&self, api_key: &str) -> Result<(), CredentialError>;

    fn clear_api_key(&self) -> Result<(), CredentialError>;

    fn use_api_key(&self) -> Result<bool, CredentialError>;

    fn set_use_api_key(&self, enabled: bool) -> Result<(), CredentialError>;
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<StoredCredential>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredential {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    use_api_key: bool,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(api_key: &str) -> Self {
        let store = Self::default();
        store.lock().api_key = normalize(api_key);
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoredCredential> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn api_key(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.lock().api_key.clone())
    }

    fn save_api_key(&self, api_key: &str) -> Result<(), CredentialError> {
        self.lock().api_key = normalize(api_key);
        Ok(())
    }

    fn clear_api_key(&self) -> Result<(), CredentialError> {
        self.lock().api_key = None;
        Ok(())
    }

    fn use_api_key(&self) -> Result<bool, CredentialError> {
        Ok(self.lock().use_api_key)
    }

    fn set_use_api_key(&self, enabled: bool) -> Result<(), CredentialError> {
        self.lock().use_api_key = enabled;
        Ok(())
    }
}

/// Encrypted JSON file store.
pub struct FileCredentialStore {
    path: PathBuf,
    key: [u8; KEY_LENGTH],
    /// Serializes read-modify-write cycles on the file.
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for FileCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCredentialStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileCredentialStore {
    /// Opens (lazily) the store at `path`, encrypting under `secret`.
    pub fn new(path: impl Into<PathBuf>, secret: &str) -> Self {
        Self {
            path: path.into(),
            key: derive_key(secret),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoredCredential, CredentialError> {
        if !self.path.exists() {
            return Ok(StoredCredential::default());
        }
        let text = std::fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(StoredCredential::default());
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn write(&self, stored: &StoredCredential) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(stored)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<(), CredentialError>
    where
        F: FnOnce(&mut StoredCredential) -> Result<(), CredentialError>,
    {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut stored = self.read()?;
        f(&mut stored)?;
        self.write(&stored)
    }
}

impl CredentialStore for FileCredentialStore {
    fn api_key(&self) -> Result<Option<String>, CredentialError> {
        match self.read()?.api_key {
            Some(encrypted) => Ok(Some(decrypt(&encrypted, &self.key)?)),
            None => Ok(None),
        }
    }

    fn save_api_key(&self, api_key: &str) -> Result<(), CredentialError> {
        let encrypted = match normalize(api_key) {
            Some(key) => Some(encrypt(&key, &self.key)?),
            None => None,
        };
        self.update(|stored| {
            stored.api_key = encrypted;
            Ok(())
        })?;
        tracing::info!(path = %self.path.display(), "api key saved");
        Ok(())
    }

    fn clear_api_key(&self) -> Result<(), CredentialError> {
        self.update(|stored| {
            stored.api_key = None;
            Ok(())
        })?;
        tracing::info!(path = %self.path.display(), "api key cleared");
        Ok(())
    }

    fn use_api_key(&self) -> Result<bool, CredentialError> {
        Ok(self.read()?.use_api_key)
    }

    fn set_use_api_key(&self, enabled: bool) -> Result<(), CredentialError> {
        self.update(|stored| {
            stored.use_api_key = enabled;
            Ok(())
        })
    }
}

fn normalize(api_key: &str) -> Option<String> {
    let trimmed = api_key.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Derive encryption key using PBKDF2
///
/// Key material format: "{secret}:{salt}"
fn derive_key(secret: &str) -> [u8; KEY_LENGTH] {
    let key_material = format!("{}:{}", secret, CREDENTIAL_SALT);

    let mut derived_key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(
        key_material.as_bytes(),
        CREDENTIAL_SALT.as_bytes(),
        PBKDF2_ITERATIONS,
        &mut derived_key,
    );

    derived_key
}

/// Output format: base64([12-byte IV][ciphertext with auth tag])
fn encrypt(plaintext: &str, key: &[u8; KEY_LENGTH]) -> Result<String, CredentialError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher.encrypt(&nonce, plaintext.as_bytes())?;

    let mut combined = Vec::with_capacity(IV_LENGTH + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(combined))
}

fn decrypt(encrypted_base64: &str, key: &[u8; KEY_LENGTH]) -> Result<String, CredentialError> {
    let combined = BASE64.decode(encrypted_base64)?;

    if combined.len() < IV_LENGTH {
        return Err(CredentialError::InvalidData(format!(
            "Data too short for IV: {} bytes",
            combined.len()
        )));
    }

    let (iv, ciphertext) = combined.split_at(IV_LENGTH);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher.decrypt(Nonce::from_slice(iv), ciphertext)?;

    String::from_utf8(plaintext).map_err(CredentialError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_derivation_deterministic() {
        assert_eq!(derive_key("secret"), derive_key("secret"));
        assert_ne!(derive_key("secret"), derive_key("other"));
    }

    #[test]
    fn test_encrypt_uses_fresh_iv() {
        let key = derive_key("secret");
        let a = encrypt("AIzaSy-test", &key).unwrap();
        let b = encrypt("AIzaSy-test", &key).unwrap();
        assert_ne!(a, b);
        assert_eq!(decrypt(&a, &key).unwrap(), "AIzaSy-test");
    }

    #[test]
    fn test_decrypt_with_wrong_secret_fails() {
        let encrypted = encrypt("AIzaSy-test", &derive_key("secret")).unwrap();
        assert!(matches!(
            decrypt(&encrypted, &derive_key("wrong")),
            Err(CredentialError::Crypto(_))
        ));
    }

    #[test]
    fn test_decrypt_data_too_short() {
        let short_data = BASE64.encode([0u8; 8]);
        let result = decrypt(&short_data, &derive_key("secret"));
        assert!(matches!(result, Err(CredentialError::InvalidData(_))));
    }

    #[test]
    fn test_file_store_persists_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");
        let store = FileCredentialStore::new(&path, "secret");

        assert_eq!(store.api_key().unwrap(), None);
        assert!(!store.use_api_key().unwrap());

        store.save_api_key("  AIzaSy-test  ").unwrap();
        store.set_use_api_key(true).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("AIzaSy-test"));
        assert!(raw.contains("\"useApiKey\": true"));

        let reopened = FileCredentialStore::new(&path, "secret");
        assert_eq!(reopened.api_key().unwrap().as_deref(), Some("AIzaSy-test"));
        assert!(reopened.use_api_key().unwrap());

        reopened.clear_api_key().unwrap();
        assert_eq!(store.api_key().unwrap(), None);
        assert!(store.use_api_key().unwrap());
    }

    #[test]
    fn test_file_store_wrong_secret_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        FileCredentialStore::new(&path, "secret")
            .save_api_key("AIzaSy-test")
            .unwrap();
        assert!(FileCredentialStore::new(&path, "other").api_key().is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCredentialStore::with_key("k1");
        assert_eq!(store.api_key().unwrap().as_deref(), Some("k1"));
        store.save_api_key("   ").unwrap();
        assert_eq!(store.api_key().unwrap(), None);
        store.set_use_api_key(true).unwrap();
        assert!(store.use_api_key().unwrap());
    }
}
