//! Device key material
//!
//! Loads, generates and persists the three secret keys a device needs to
//! talk to the messaging hub: the permanent key plus the current and the
//! previous rotating ("temporary") keys.

pub mod keys;
pub mod store;

pub use keys::{DeviceKeys, KEY_LEN};
pub use store::{KeyStore, KeyStoreError, DEFAULT_KEYS_FILENAME};
