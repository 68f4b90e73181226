//! Where session tokens live between runs
//!
//! Everything above this module sees only [`CredentialStore`]: a flat
//! string map keyed by [`TOKEN_KEY`] and [`REFRESH_TOKEN_KEY`].
//! [`CredentialManager`] picks the concrete store from [`CredentialConfig`]:
//! the OS keyring ([`KeyringStore`]), age-encrypted files
//! ([`EncryptedFileStore`]) or plain process memory ([`MemoryStore`]).
//!
//! # Example
//!
//! ```no_run
//! use libblogsocial::credentials::{CredentialConfig, CredentialManager, CredentialStore, TOKEN_KEY};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = CredentialManager::new(CredentialConfig::default())?;
//!
//! manager.set(TOKEN_KEY, "eyJhbGciOi...")?;
//! if let Some(token) = manager.get(TOKEN_KEY)? {
//!     println!("token is {} bytes", token.len());
//! }
//! manager.delete(TOKEN_KEY)?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CredentialError, Result};

/// Storage key of the access (bearer) token
pub const TOKEN_KEY: &str = "auth_token";
/// Storage key of the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Namespace all keys are stored under
pub const SERVICE_NAME: &str = "blogsocial";
/// Environment variable that unlocks the encrypted file store
pub const MASTER_PASSWORD_ENV: &str = "BLOGSOCIAL_MASTER_PASSWORD";

const MIN_MASTER_PASSWORD_LEN: usize = 8;

/// Trait for credential storage backends
///
/// Keys are flat strings (`auth_token`, `refresh_token`). Each backend is
/// responsible for namespacing them under its own service name.
///
/// Reads and writes of a single key are assumed atomic; callers do no extra
/// locking around them.
pub trait CredentialStore: Send + Sync {
    /// Look up a value. `Ok(None)` means the key is simply not there.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value
    ///
    /// Deleting a key that does not exist is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Check whether a key holds a value
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Backend identifier used in logs (e.g. "keyring", "encrypted_file", "memory")
    fn backend_name(&self) -> &str;
}

/// Tokens kept in the platform secret service
///
/// Keychain on macOS, Credential Manager on Windows, Secret Service over
/// D-Bus on Linux. Each key becomes one entry: service `blogsocial` (or the
/// name given to [`KeyringStore::with_service`]), user = the key.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Open the keyring under [`SERVICE_NAME`]
    ///
    /// Fails with `CredentialError::KeyringUnavailable` on hosts without a
    /// secret service, such as containers or headless Linux.
    pub fn new() -> Result<Self> {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Result<Self> {
        let store = Self {
            service: service.to_string(),
        };
        // Entry construction is where a missing platform backend shows up
        store.entry("availability_check")?;
        Ok(store)
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key).map_err(|e| {
            CredentialError::KeyringUnavailable(format!("cannot open {}/{}: {}", self.service, key, e)).into()
        })
    }
}

/// `NoEntry` is an absent key, anything else a backend failure
fn keyring_lookup<T>(result: keyring::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(CredentialError::Keyring(e.to_string()).into()),
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = keyring_lookup(self.entry(key)?.get_password())?;
        tracing::debug!(service = %self.service, key, found = value.is_some(), "keyring read");
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| CredentialError::Keyring(e.to_string()))?;
        tracing::debug!(service = %self.service, key, "keyring write");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let removed = keyring_lookup(self.entry(key)?.delete_password())?;
        tracing::debug!(service = %self.service, key, removed = removed.is_some(), "keyring delete");
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "keyring"
    }
}

/// Refuse to read or replace a credential file that is a symbolic link
pub fn validate_not_symlink(path: &Path) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| {
        CredentialError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot stat '{}': {}", path.display(), e),
        ))
    })?;

    if metadata.file_type().is_symlink() {
        return Err(CredentialError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "Credential file '{}' is a symbolic link; credential files must be regular files",
                path.display()
            ),
        ))
        .into());
    }
    Ok(())
}

fn crypt_error(e: impl std::fmt::Display) -> CredentialError {
    CredentialError::Encryption(e.to_string())
}

/// Create or truncate `path`, readable by the owner only on Unix
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;

    // `mode` only applies to new files; an older file may be wider
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.sync_all()
}

/// Tokens kept as age files sealed with a master password
///
/// Key `k` lives at `{base_path}/blogsocial.k.age`. Nothing is read or
/// written until [`EncryptedFileStore::set_master_password`] has been called.
pub struct EncryptedFileStore {
    base_path: PathBuf,
    master_password: RwLock<Option<Zeroizing<String>>>,
}

impl EncryptedFileStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            master_password: RwLock::new(None),
        }
    }

    /// Unlock the store
    ///
    /// Passwords shorter than 8 bytes are rejected with
    /// `CredentialError::WeakPassword`.
    pub fn set_master_password(&self, password: String) -> Result<()> {
        let password = Zeroizing::new(password);
        if password.len() < MIN_MASTER_PASSWORD_LEN {
            return Err(CredentialError::WeakPassword.into());
        }

        let mut slot = self
            .master_password
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(password);
        Ok(())
    }

    fn secret(&self) -> Result<age::secrecy::Secret<String>> {
        let slot = self
            .master_password
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match slot.as_ref() {
            Some(password) => Ok(age::secrecy::Secret::new(password.as_str().to_owned())),
            None => Err(CredentialError::MasterPasswordNotSet.into()),
        }
    }

    fn seal(&self, plaintext: &str) -> Result<Vec<u8>> {
        let encryptor = age::Encryptor::with_user_passphrase(self.secret()?);

        let mut sealed = Vec::new();
        let mut writer = encryptor.wrap_output(&mut sealed).map_err(crypt_error)?;
        writer.write_all(plaintext.as_bytes()).map_err(crypt_error)?;
        writer.finish().map_err(crypt_error)?;
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<String> {
        let secret = self.secret()?;

        let age::Decryptor::Passphrase(decryptor) = age::Decryptor::new(sealed).map_err(crypt_error)? else {
            return Err(crypt_error("file is not passphrase-encrypted").into());
        };
        let mut reader = decryptor.decrypt(&secret, None).map_err(|e| match e {
            age::DecryptError::DecryptionFailed | age::DecryptError::NoMatchingKeys => {
                CredentialError::DecryptionFailed
            }
            other => crypt_error(other),
        })?;

        let mut plaintext = Zeroizing::new(Vec::new());
        reader.read_to_end(&mut plaintext).map_err(crypt_error)?;
        std::str::from_utf8(&plaintext)
            .map(str::to_string)
            .map_err(|e| crypt_error(format!("stored value is not UTF-8: {}", e)).into())
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.{}.age", SERVICE_NAME, key))
    }
}

impl CredentialStore for EncryptedFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.file_path(key);
        if std::fs::symlink_metadata(&path).is_err() {
            return Ok(None);
        }
        validate_not_symlink(&path)?;

        let sealed = std::fs::read(&path).map_err(CredentialError::Io)?;
        let value = self.open(&sealed)?;
        tracing::debug!(key, path = %path.display(), "decrypted credential file");
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let sealed = self.seal(value)?;
        let path = self.file_path(key);

        std::fs::create_dir_all(&self.base_path).map_err(CredentialError::Io)?;
        if std::fs::symlink_metadata(&path).is_ok() {
            validate_not_symlink(&path)?;
        }
        write_private(&path, &sealed).map_err(CredentialError::Io)?;

        tracing::debug!(key, path = %path.display(), "wrote credential file");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.file_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(key, path = %path.display(), "removed credential file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CredentialError::Io(e).into()),
        }
    }

    fn backend_name(&self) -> &str {
        "encrypted_file"
    }
}

/// In-process credential storage
///
/// Nothing survives the process. Used by tests and by front ends that want
/// a session that is forgotten on exit.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

/// Which store `CredentialManager` writes to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Platform keyring, with encrypted files as a fallback when the keyring is missing
    #[default]
    Keyring,
    /// Encrypted files only
    Encrypted,
    /// Nothing persisted
    Memory,
}

/// The `[credentials]` table of the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    #[serde(default)]
    pub storage: StorageBackend,

    /// Directory of the encrypted files; `~` is expanded
    #[serde(default = "default_credential_path")]
    pub path: String,

    /// Never read from or written to the config file
    #[serde(skip)]
    pub master_password: Option<String>,
}

fn default_credential_path() -> String {
    "~/.config/blogsocial/credentials".to_string()
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Keyring,
            path: default_credential_path(),
            master_password: None,
        }
    }
}

impl CredentialConfig {
    /// Take the master password from [`MASTER_PASSWORD_ENV`] when it is non-empty
    pub fn load_master_password_from_env(&mut self) {
        match std::env::var(MASTER_PASSWORD_ENV) {
            Ok(password) if !password.is_empty() => {
                self.master_password = Some(password);
                tracing::debug!(source = MASTER_PASSWORD_ENV, "master password loaded");
            }
            _ => {}
        }
    }

    pub fn expand_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).as_ref())
    }
}

/// Ordered set of credential stores behind one `CredentialStore`
///
/// Writes go to the first store. Reads return the first hit. Deletes are
/// sent to every store so a token cannot linger in a fallback.
///
/// Which stores are used depends on [`CredentialConfig::storage`]:
/// `Memory` is a lone [`MemoryStore`], `Encrypted` a lone
/// [`EncryptedFileStore`], and `Keyring` the OS keyring, or encrypted files
/// when the keyring cannot be opened.
pub struct CredentialManager {
    stores: Vec<Box<dyn CredentialStore>>,
    config: CredentialConfig,
}

impl CredentialManager {
    /// Fails with `CredentialError::NoStoreAvailable` when no store could be opened
    pub fn new(config: CredentialConfig) -> Result<Self> {
        let store: Option<Box<dyn CredentialStore>> = match config.storage {
            StorageBackend::Memory => {
                tracing::info!("credentials kept in memory; the session ends with the process");
                Some(Box::new(MemoryStore::new()))
            }
            StorageBackend::Encrypted => Self::open_encrypted(&config)?,
            StorageBackend::Keyring => match KeyringStore::new() {
                Ok(keyring) => {
                    tracing::info!("credentials kept in the OS keyring");
                    Some(Box::new(keyring))
                }
                Err(e) => {
                    tracing::warn!("{}; trying encrypted files instead", e);
                    Self::open_encrypted(&config)?
                }
            },
        };

        Self::from_stores(store.into_iter().collect(), config)
    }

    /// Encrypted file store unlocked from config or an interactive prompt
    ///
    /// `Ok(None)` when no master password could be obtained.
    fn open_encrypted(config: &CredentialConfig) -> Result<Option<Box<dyn CredentialStore>>> {
        let store = EncryptedFileStore::new(config.expand_path());

        let password = match &config.master_password {
            // A configured password that is too weak is a hard error
            Some(password) => password.clone(),
            None => match prompt_master_password() {
                Some(password) => password,
                None => return Ok(None),
            },
        };
        if let Err(e) = store.set_master_password(password) {
            if config.master_password.is_some() {
                return Err(e);
            }
            tracing::error!("Master password rejected: {}", e);
            return Ok(None);
        }

        tracing::info!(path = %config.expand_path().display(), "credentials kept in encrypted files");
        Ok(Some(Box::new(store)))
    }

    /// Build a manager over an explicit list of stores
    pub fn from_stores(stores: Vec<Box<dyn CredentialStore>>, config: CredentialConfig) -> Result<Self> {
        if stores.is_empty() {
            return Err(CredentialError::NoStoreAvailable.into());
        }
        Ok(Self { stores, config })
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    /// Names of the active backends, in priority order
    pub fn backends(&self) -> Vec<&str> {
        self.stores.iter().map(|s| s.backend_name()).collect()
    }
}

/// Ask on the terminal; `None` without a TTY or on empty input
fn prompt_master_password() -> Option<String> {
    if !atty::is(atty::Stream::Stdin) {
        tracing::error!("No master password in {} and no terminal to ask on", MASTER_PASSWORD_ENV);
        return None;
    }
    match rpassword::prompt_password("Master password for stored credentials: ") {
        Ok(password) if !password.is_empty() => Some(password),
        Ok(_) => {
            tracing::error!("Empty master password; encrypted storage stays locked");
            None
        }
        Err(e) => {
            tracing::error!("Could not read master password: {}", e);
            None
        }
    }
}

impl CredentialStore for CredentialManager {
    fn get(&self, key: &str) -> Result<Option<String>> {
        for store in &self.stores {
            if let Some(value) = store.get(key)? {
                tracing::debug!(key, backend = store.backend_name(), "credential found");
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        // `from_stores` guarantees at least one
        match self.stores.first() {
            Some(primary) => primary.set(key, value),
            None => Err(CredentialError::NoStoreAvailable.into()),
        }
    }

    /// Every store is tried; the first failure is returned afterwards
    fn delete(&self, key: &str) -> Result<()> {
        self.stores
            .iter()
            .map(|store| store.delete(key))
            .fold(Ok(()), |first, next| first.and(next))
    }

    fn backend_name(&self) -> &str {
        self.stores.first().map_or("none", |s| s.backend_name())
    }
}
