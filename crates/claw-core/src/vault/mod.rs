//! Secret vault for provider credentials.
//!
//! A passphrase unlocks an AES-256-GCM key derived with PBKDF2-HMAC-SHA256.
//! The key lives only in memory. What is persisted (in the `settings`
//! table) is a check record: the salt plus the sentinel encrypted under the
//! key, which lets a later `unlock` verify the passphrase.
//!
//! Losing the passphrase makes every stored provider environment
//! unrecoverable.

use std::collections::HashMap;
use std::sync::RwLock;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::ClawError;
use crate::store::SettingsStore;

const CHECK_KEY: &str = "unlock_check";
const CHECK_VALUE: &str = "workflow-claw";
const KDF_ITERATIONS: u32 = 120_000;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

type VaultKey = [u8; 32];

/// Encrypted payload, all fields base64.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    nonce: String,
    tag: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckRecord {
    salt: String,
    #[serde(flatten)]
    sealed: Envelope,
}

pub struct Vault {
    settings: SettingsStore,
    key: RwLock<Option<VaultKey>>,
    iterations: u32,
}

impl Vault {
    pub fn new(settings: SettingsStore) -> Self {
        Self::with_iterations(settings, KDF_ITERATIONS)
    }

    /// A vault deriving its key with `iterations` PBKDF2 rounds.
    pub(crate) fn with_iterations(settings: SettingsStore, iterations: u32) -> Self {
        Self {
            settings,
            key: RwLock::new(None),
            iterations,
        }
    }

    /// Unlock with `passphrase`.
    ///
    /// The first unlock ever sets the passphrase. Afterwards only the same
    /// passphrase unlocks; anything else returns `Ok(false)` and leaves the
    /// vault locked. Storage failures are the only errors.
    pub async fn unlock(&self, passphrase: &str) -> Result<bool, ClawError> {
        let existing = self.settings.get(CHECK_KEY).await?;

        let Some(raw) = existing else {
            let mut salt = [0u8; SALT_LEN];
            rand::thread_rng().fill_bytes(&mut salt);
            let key = self.derive(passphrase, salt.to_vec()).await?;
            let record = CheckRecord {
                salt: BASE64.encode(salt),
                sealed: seal(&key, CHECK_VALUE.as_bytes())?,
            };
            let payload = serde_json::to_string(&record)
                .map_err(|e| ClawError::Internal(e.to_string()))?;
            self.settings.set(CHECK_KEY, &payload).await?;
            self.set_key(Some(key));
            tracing::info!("[Vault] Initialized vault passphrase");
            return Ok(true);
        };

        let record: CheckRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("[Vault] Unreadable unlock record: {}", e);
                return Ok(false);
            }
        };
        let salt = match BASE64.decode(&record.salt) {
            Ok(salt) => salt,
            Err(_) => return Ok(false),
        };

        let key = self.derive(passphrase, salt).await?;
        match open(&key, &record.sealed) {
            Ok(plain) if plain == CHECK_VALUE.as_bytes() => {
                self.set_key(Some(key));
                tracing::info!("[Vault] Unlocked");
                Ok(true)
            }
            _ => {
                tracing::warn!("[Vault] Unlock rejected");
                Ok(false)
            }
        }
    }

    /// Whether a passphrase has been set.
    pub async fn is_initialized(&self) -> Result<bool, ClawError> {
        Ok(self.settings.get(CHECK_KEY).await?.is_some())
    }

    /// Forget the key. Always succeeds.
    pub fn lock(&self) {
        self.set_key(None);
    }

    pub fn is_unlocked(&self) -> bool {
        self.active_key().is_some()
    }

    /// Encrypt `plaintext` into a JSON envelope `{nonce, tag, data}`.
    pub fn encrypt_secret(&self, plaintext: &str) -> Result<String, ClawError> {
        let key = self.active_key().ok_or(ClawError::VaultLocked)?;
        let envelope = seal(&key, plaintext.as_bytes())?;
        serde_json::to_string(&envelope).map_err(|e| ClawError::Internal(e.to_string()))
    }

    pub fn decrypt_secret(&self, ciphertext: &str) -> Result<String, ClawError> {
        let key = self.active_key().ok_or(ClawError::VaultLocked)?;
        let envelope: Envelope = serde_json::from_str(ciphertext)
            .map_err(|e| ClawError::Vault(format!("Malformed envelope: {}", e)))?;
        let plain = open(&key, &envelope)?;
        String::from_utf8(plain).map_err(|e| ClawError::Vault(e.to_string()))
    }

    /// Encrypt a provider environment map.
    pub fn encrypt_env(&self, env: &HashMap<String, String>) -> Result<String, ClawError> {
        let raw = serde_json::to_string(env).map_err(|e| ClawError::Internal(e.to_string()))?;
        self.encrypt_secret(&raw)
    }

    pub fn decrypt_env(&self, ciphertext: &str) -> Result<HashMap<String, String>, ClawError> {
        let raw = self.decrypt_secret(ciphertext)?;
        serde_json::from_str(&raw)
            .map_err(|e| ClawError::Vault(format!("Malformed environment: {}", e)))
    }

    fn active_key(&self) -> Option<VaultKey> {
        self.key.read().ok().and_then(|k| *k)
    }

    fn set_key(&self, key: Option<VaultKey>) {
        match self.key.write() {
            Ok(mut guard) => *guard = key,
            Err(poisoned) => *poisoned.into_inner() = key,
        }
    }

    async fn derive(&self, passphrase: &str, salt: Vec<u8>) -> Result<VaultKey, ClawError> {
        let passphrase = passphrase.to_string();
        let iterations = self.iterations;
        tokio::task::spawn_blocking(move || {
            let mut key = [0u8; 32];
            pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), &salt, iterations, &mut key);
            key
        })
        .await
        .map_err(|e| ClawError::Internal(format!("Key derivation failed: {}", e)))
    }
}

fn seal(key: &VaultKey, plaintext: &[u8]) -> Result<Envelope, ClawError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    // aes-gcm appends the tag to the ciphertext.
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| ClawError::Vault("Encryption failed".to_string()))?;
    let (data, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok(Envelope {
        nonce: BASE64.encode(nonce),
        tag: BASE64.encode(tag),
        data: BASE64.encode(data),
    })
}

fn open(key: &VaultKey, envelope: &Envelope) -> Result<Vec<u8>, ClawError> {
    let decode = |field: &str| {
        BASE64
            .decode(field)
            .map_err(|e| ClawError::Vault(format!("Malformed envelope: {}", e)))
    };
    let nonce = decode(&envelope.nonce)?;
    let tag = decode(&envelope.tag)?;
    let mut sealed = decode(&envelope.data)?;
    if nonce.len() != NONCE_LEN || tag.len() != TAG_LEN {
        return Err(ClawError::Vault("Malformed envelope".to_string()));
    }
    sealed.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(&nonce), sealed.as_ref())
        .map_err(|_| ClawError::Vault("Decryption failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use rand::distributions::{Alphanumeric, DistString};
    use rand::Rng;

    fn fast_vault(db: &Database) -> Vault {
        Vault::with_iterations(SettingsStore::new(db.clone()), 1_000)
    }

    #[tokio::test]
    async fn test_round_trip_random_strings() {
        let db = Database::open_in_memory().unwrap();
        let vault = fast_vault(&db);
        assert!(vault.unlock("correct horse").await.unwrap());

        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let len = rng.gen_range(0..200);
            let plain = Alphanumeric.sample_string(&mut rng, len);
            let sealed = vault.encrypt_secret(&plain).unwrap();
            assert_eq!(vault.decrypt_secret(&sealed).unwrap(), plain);
        }

        let unicode = "clé secrète 🔑";
        let sealed = vault.encrypt_secret(unicode).unwrap();
        assert_eq!(vault.decrypt_secret(&sealed).unwrap(), unicode);
    }

    #[tokio::test]
    async fn test_relock_and_unlock_again() {
        let db = Database::open_in_memory().unwrap();
        let vault = fast_vault(&db);
        assert!(!vault.is_initialized().await.unwrap());
        assert!(vault.unlock("pass").await.unwrap());
        assert!(vault.is_initialized().await.unwrap());
        let sealed = vault.encrypt_secret("token").unwrap();

        vault.lock();
        vault.lock();
        assert!(!vault.is_unlocked());

        assert!(vault.unlock("pass").await.unwrap());
        assert!(vault.is_unlocked());
        assert_eq!(vault.decrypt_secret(&sealed).unwrap(), "token");

        // A second vault over the same database accepts the same passphrase.
        let other = fast_vault(&db);
        assert!(other.unlock("pass").await.unwrap());
        assert_eq!(other.decrypt_secret(&sealed).unwrap(), "token");
    }

    #[tokio::test]
    async fn test_wrong_passphrase_stays_locked() {
        let db = Database::open_in_memory().unwrap();
        let vault = fast_vault(&db);
        assert!(vault.unlock("right").await.unwrap());
        vault.lock();

        assert!(!vault.unlock("wrong").await.unwrap());
        assert!(!vault.is_unlocked());
    }

    #[tokio::test]
    async fn test_locked_vault_operations_fail() {
        let db = Database::open_in_memory().unwrap();
        let vault = fast_vault(&db);

        assert!(matches!(vault.encrypt_secret("x"), Err(ClawError::VaultLocked)));
        assert!(matches!(
            vault.decrypt_secret(r#"{"nonce":"","tag":"","data":""}"#),
            Err(ClawError::VaultLocked)
        ));
        assert!(matches!(
            vault.encrypt_env(&HashMap::new()),
            Err(ClawError::VaultLocked)
        ));
    }

    #[tokio::test]
    async fn test_tampered_envelope_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let vault = fast_vault(&db);
        assert!(vault.unlock("pass").await.unwrap());

        let sealed = vault.encrypt_secret("secret").unwrap();
        let mut envelope: serde_json::Value = serde_json::from_str(&sealed).unwrap();
        envelope["tag"] = serde_json::Value::String(BASE64.encode([0u8; TAG_LEN]));

        let result = vault.decrypt_secret(&envelope.to_string());
        assert!(matches!(result, Err(ClawError::Vault(_))));
        assert!(matches!(
            vault.decrypt_secret("not json"),
            Err(ClawError::Vault(_))
        ));
    }

    #[tokio::test]
    async fn test_env_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let vault = fast_vault(&db);
        assert!(vault.unlock("pass").await.unwrap());

        let mut env = HashMap::new();
        env.insert("OPENAI_API_KEY".to_string(), "sk-test".to_string());
        env.insert("PATH".to_string(), "/opt/bin".to_string());

        let sealed = vault.encrypt_env(&env).unwrap();
        assert!(!sealed.contains("sk-test"));
        assert_eq!(vault.decrypt_env(&sealed).unwrap(), env);
    }

    #[tokio::test]
    async fn test_corrupt_check_record_rejects_unlock() {
        let db = Database::open_in_memory().unwrap();
        let settings = SettingsStore::new(db.clone());
        settings.set(CHECK_KEY, "{broken").await.unwrap();

        let vault = fast_vault(&db);
        assert!(!vault.unlock("anything").await.unwrap());
        assert!(!vault.is_unlocked());
    }
}
