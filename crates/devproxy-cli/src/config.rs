//! Process settings
//!
//! Compiled-in defaults, overridden by flags/environment, then by the
//! positional `<host> <port> <name> <desc> <open>` arguments.

use anyhow::{Context, Result};
use devproxy_hub::HubConfig;
use devproxy_keys::{KeyStore, DEFAULT_KEYS_FILENAME};
use devproxy_tunnel::{Greeting, TunnelConfig};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DEVICE_NAME: &str = "TCP Proxy";
pub const DEFAULT_HUB_URL: &str = "ws://127.0.0.1:6611";
pub const DEFAULT_PAIRING_SECRET: &str = "0000";

/// Positional overrides as given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionalOverrides {
    pub host: Option<String>,
    pub port: Option<String>,
    pub name: Option<String>,
    pub desc: Option<String>,
    pub open: Option<String>,
}

impl PositionalOverrides {
    fn is_empty(&self) -> bool {
        self.host.is_none()
            && self.port.is_none()
            && self.name.is_none()
            && self.desc.is_none()
            && self.open.is_none()
    }
}

/// What happened to the positional overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideOutcome {
    Applied,
    NotGiven,
    Rejected(String),
}

/// Everything the process needs to run
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub target_host: String,
    pub target_port: u16,
    pub device_name: String,
    /// `None` keeps the built-in greeting, an empty string disables it
    pub greeting: Option<String>,
    pub open_banner: Option<String>,
    pub hub_url: String,
    pub pairing_secret: String,
    pub data_dir: PathBuf,
    pub keys_filename: String,
    pub connect_timeout: Duration,
    pub max_pending_bytes: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        let tunnel = TunnelConfig::default();
        Self {
            target_host: tunnel.target_host,
            target_port: tunnel.target_port,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            greeting: None,
            open_banner: None,
            hub_url: DEFAULT_HUB_URL.to_string(),
            pairing_secret: DEFAULT_PAIRING_SECRET.to_string(),
            data_dir: default_data_dir(),
            keys_filename: DEFAULT_KEYS_FILENAME.to_string(),
            connect_timeout: tunnel.connect_timeout,
            max_pending_bytes: tunnel.max_pending_bytes,
        }
    }
}

/// Application data directory, `<data dir>/devproxy`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("devproxy"))
        .unwrap_or_else(|| PathBuf::from(".devproxy"))
}

/// Usage hint for the positional arguments
pub fn usage_line(program: &str) -> String {
    format!("Example usage: {} <host> <port> <name> <desc> <open>", program)
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

impl ProxySettings {
    /// Apply positional overrides. They only take effect when both host and
    /// port are present and the port is all digits; otherwise nothing changes.
    pub fn apply_overrides(&mut self, overrides: PositionalOverrides) -> OverrideOutcome {
        if overrides.is_empty() {
            return OverrideOutcome::NotGiven;
        }

        let (host, port) = match (overrides.host, overrides.port) {
            (Some(host), Some(port)) => (host, port),
            _ => return OverrideOutcome::Rejected("host and port are both required".to_string()),
        };

        if !is_all_digits(&port) {
            return OverrideOutcome::Rejected(format!("port '{}' is not a number", port));
        }
        let port = match port.parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => return OverrideOutcome::Rejected(format!("port '{}' is out of range", port)),
        };
        if host.trim().is_empty() {
            return OverrideOutcome::Rejected("host is empty".to_string());
        }

        self.target_host = host;
        self.target_port = port;
        if let Some(name) = overrides.name {
            self.device_name = name;
        }
        if let Some(desc) = overrides.desc {
            self.greeting = Some(desc);
        }
        if let Some(open) = overrides.open {
            self.open_banner = Some(open);
        }

        OverrideOutcome::Applied
    }

    /// Startup checks whose failure is fatal
    pub fn validate(&self) -> Result<()> {
        if self.pairing_secret.is_empty() {
            anyhow::bail!("No permanent pairing secret defined (use --pairing-secret)");
        }
        Ok(())
    }

    pub fn tunnel_config(&self) -> Result<TunnelConfig> {
        TunnelConfig::builder()
            .target_host(self.target_host.clone())
            .target_port(self.target_port)
            .greeting(Greeting::from_override(self.greeting.clone()))
            .open_banner(self.open_banner.clone())
            .connect_timeout(self.connect_timeout)
            .max_pending_bytes(self.max_pending_bytes)
            .build()
            .context("Invalid tunnel configuration")
    }

    pub fn hub_config(&self, device_address: String) -> HubConfig {
        HubConfig {
            url: self.hub_url.clone(),
            device_address,
            device_name: self.device_name.clone(),
            pairing_secret: self.pairing_secret.clone(),
        }
    }

    pub fn key_store(&self) -> KeyStore {
        KeyStore::in_data_dir(&self.data_dir, &self.keys_filename)
    }
}
