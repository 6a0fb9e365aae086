//! In-memory key set

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of every secret key in bytes
pub const KEY_LEN: usize = 32;

/// The three secrets identifying this device
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceKeys {
    pub permanent: [u8; KEY_LEN],
    pub current_temp: [u8; KEY_LEN],
    pub previous_temp: [u8; KEY_LEN],
}

impl DeviceKeys {
    /// Generate a fresh set of random keys
    pub fn generate() -> Self {
        Self {
            permanent: random_key(),
            current_temp: random_key(),
            previous_temp: random_key(),
        }
    }

    /// Shift the current temporary key into the previous slot and draw a new one
    pub fn rotate(&mut self) {
        self.previous_temp = self.current_temp;
        self.current_temp = random_key();
    }

    /// Hex SHA-256 of the permanent key, used as this device's address
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.permanent);
        format!("{:x}", hasher.finalize())
    }
}

// Never print secrets.
impl fmt::Debug for DeviceKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceKeys")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

fn random_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    key
}
