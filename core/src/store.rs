use crate::error::CredentialError;
use crate::llm::LlmProviderKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

const HASH_LEN: usize = 10;

/// One saved API key as it appears in the credentials file.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyRecord {
    pub hash: String,
    pub key: String,
}

impl KeyRecord {
    pub fn new(secret: &str) -> Self {
        Self {
            hash: key_hash(secret),
            key: secret.to_string(),
        }
    }

    pub fn masked(&self) -> String {
        mask_secret(&self.key)
    }
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("hash", &self.hash)
            .field("key", &self.masked())
            .finish()
    }
}

/// A saved key together with the provider and name it is filed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKey {
    pub provider: LlmProviderKind,
    pub name: String,
    pub record: KeyRecord,
}

/// On-disk layout: `{"openai": {name: record}, "anthropic": {name: record}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedKeys {
    #[serde(default)]
    pub openai: BTreeMap<String, KeyRecord>,
    #[serde(default)]
    pub anthropic: BTreeMap<String, KeyRecord>,
}

impl SavedKeys {
    /// Saved keys for `provider`. The mock provider never has any.
    pub fn keys_for(&self, provider: &LlmProviderKind) -> Option<&BTreeMap<String, KeyRecord>> {
        match provider {
            LlmProviderKind::OpenAi => Some(&self.openai),
            LlmProviderKind::Anthropic => Some(&self.anthropic),
            LlmProviderKind::Mock => None,
        }
    }

    fn keys_for_mut(
        &mut self,
        provider: &LlmProviderKind,
    ) -> Option<&mut BTreeMap<String, KeyRecord>> {
        match provider {
            LlmProviderKind::OpenAi => Some(&mut self.openai),
            LlmProviderKind::Anthropic => Some(&mut self.anthropic),
            LlmProviderKind::Mock => None,
        }
    }

    pub fn names(&self, provider: &LlmProviderKind) -> Vec<String> {
        self.keys_for(provider)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, provider: &LlmProviderKind, name: &str) -> Option<StoredKey> {
        let record = self.keys_for(provider)?.get(name)?;
        Some(StoredKey {
            provider: provider.clone(),
            name: name.to_string(),
            record: record.clone(),
        })
    }
}

/// Flat JSON file holding saved provider keys.
///
/// Every mutation rereads the file and rewrites it whole. There is no locking:
/// the last writer wins.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_load(&self) -> Result<SavedKeys, CredentialError> {
        if !self.path.exists() {
            return Ok(SavedKeys::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(CredentialError::Parse)
    }

    /// Load saved keys, degrading to an empty store when the file cannot be read.
    pub fn load(&self) -> SavedKeys {
        match self.try_load() {
            Ok(keys) => keys,
            Err(err) => {
                error!(error = %err, path = %self.path.display(), "error loading saved keys");
                SavedKeys::default()
            }
        }
    }

    /// Insert or overwrite `name` under `provider` and rewrite the file.
    pub fn save(
        &self,
        provider: &LlmProviderKind,
        name: &str,
        secret: &str,
    ) -> Result<StoredKey, CredentialError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CredentialError::EmptyName);
        }
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(CredentialError::EmptySecret);
        }
        let mut keys = self.load();
        let record = KeyRecord::new(secret);
        match keys.keys_for_mut(provider) {
            Some(map) => {
                map.insert(name.to_string(), record.clone());
            }
            None => {
                debug!(provider = ?provider, "provider takes no saved keys");
                return Err(CredentialError::NoSavedKeys(provider.clone()));
            }
        }
        self.write(&keys)?;
        info!(provider = ?provider, name, hash = %record.hash, "saved API key");
        Ok(StoredKey {
            provider: provider.clone(),
            name: name.to_string(),
            record,
        })
    }

    /// Remove `name` under `provider`. Returns `Ok(false)` and leaves the file
    /// untouched when there is no such entry.
    pub fn delete(&self, provider: &LlmProviderKind, name: &str) -> Result<bool, CredentialError> {
        let mut keys = self.load();
        let removed = keys
            .keys_for_mut(provider)
            .and_then(|map| map.remove(name))
            .is_some();
        if !removed {
            return Ok(false);
        }
        self.write(&keys)?;
        info!(provider = ?provider, name, "deleted API key");
        Ok(true)
    }

    fn write(&self, keys: &SavedKeys) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_vec(keys).map_err(CredentialError::Serialize)?;
        let mut file = open_private(&self.path)?;
        file.write_all(&serialized)?;
        Ok(())
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}

/// First ten hex characters of the secret's SHA-256 digest.
pub fn key_hash(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(HASH_LEN);
    digest
}

/// `sk-...abcd` style rendering for logs and listings.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
