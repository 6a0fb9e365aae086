//! Key file storage
//!
//! Keys live in a single JSON file in the application data directory:
//!
//! ```json
//! {"permanent_priv_key":"<b64>","temp_priv_key":"<b64>","prev_temp_priv_key":"<b64>"}
//! ```

use crate::keys::{DeviceKeys, KEY_LEN};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Default key file name inside the data directory
pub const DEFAULT_KEYS_FILENAME: &str = "keys.json";

/// Errors that can occur while reading or writing the key file
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("Failed to access key file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Failed to parse key file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid base64 in field {field}: {source}")]
    Decode {
        field: &'static str,
        source: base64::DecodeError,
    },

    #[error("Key {field} has {len} bytes, expected 32")]
    InvalidLength { field: &'static str, len: usize },
}

/// On-disk representation of [`DeviceKeys`]
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    permanent_priv_key: String,
    temp_priv_key: String,
    prev_temp_priv_key: String,
}

impl From<&DeviceKeys> for KeyFile {
    fn from(keys: &DeviceKeys) -> Self {
        Self {
            permanent_priv_key: STANDARD.encode(keys.permanent),
            temp_priv_key: STANDARD.encode(keys.current_temp),
            prev_temp_priv_key: STANDARD.encode(keys.previous_temp),
        }
    }
}

impl TryFrom<KeyFile> for DeviceKeys {
    type Error = KeyStoreError;

    fn try_from(file: KeyFile) -> Result<Self, Self::Error> {
        Ok(Self {
            permanent: decode_key("permanent_priv_key", &file.permanent_priv_key)?,
            current_temp: decode_key("temp_priv_key", &file.temp_priv_key)?,
            previous_temp: decode_key("prev_temp_priv_key", &file.prev_temp_priv_key)?,
        })
    }
}

fn decode_key(field: &'static str, encoded: &str) -> Result<[u8; KEY_LEN], KeyStoreError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|source| KeyStoreError::Decode { field, source })?;

    bytes
        .as_slice()
        .try_into()
        .map_err(|_| KeyStoreError::InvalidLength {
            field,
            len: bytes.len(),
        })
}

/// Key file manager
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    /// Create a key store backed by the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a key store for `file_name` inside `data_dir`
    pub fn in_data_dir(data_dir: impl AsRef<Path>, file_name: &str) -> Self {
        Self::new(data_dir.as_ref().join(file_name))
    }

    /// Path of the key file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored keys
    pub fn load(&self) -> Result<DeviceKeys, KeyStoreError> {
        let json = fs::read_to_string(&self.path).map_err(|source| KeyStoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        let file: KeyFile = serde_json::from_str(&json)?;
        DeviceKeys::try_from(file)
    }

    /// Read the stored keys, or generate and persist a fresh set
    ///
    /// Any read or parse failure falls back to generation. Only a failure to
    /// write the new keys is returned.
    pub fn load_or_generate(&self) -> Result<DeviceKeys, KeyStoreError> {
        match self.load() {
            Ok(keys) => Ok(keys),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read keys, will generate.");
                let keys = DeviceKeys::generate();
                self.persist(&keys)?;
                Ok(keys)
            }
        }
    }

    /// Write the keys to disk
    ///
    /// A missing parent directory is created. If the write still reports
    /// `NotFound` (the directory vanished in between) it is retried once;
    /// every other I/O error is returned.
    pub fn persist(&self, keys: &DeviceKeys) -> Result<(), KeyStoreError> {
        let json = serde_json::to_string(&KeyFile::from(keys))?;

        info!(path = %self.path.display(), "Writing keys");

        let mut retried = false;
        loop {
            self.ensure_parent_dir()?;
            match fs::write(&self.path, &json) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound && !retried => {
                    warn!(path = %self.path.display(), "Key directory disappeared, retrying write");
                    retried = true;
                }
                Err(source) => {
                    return Err(KeyStoreError::Io {
                        path: self.path.clone(),
                        source,
                    })
                }
            }
        }
    }

    /// Rotate the temporary keys and persist the result
    pub fn rotate(&self, keys: &mut DeviceKeys) -> Result<(), KeyStoreError> {
        keys.rotate();
        self.persist(keys)
    }

    fn ensure_parent_dir(&self) -> Result<(), KeyStoreError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).map_err(|source| KeyStoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }
}
