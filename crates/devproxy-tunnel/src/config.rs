//! Tunnel manager configuration

use devproxy_proto::PeerId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Placeholder replaced with the peer id in open banners
pub const PEER_PLACEHOLDER: &str = "%s";

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Target host cannot be empty")]
    EmptyHost,

    #[error("Invalid target port: {0}")]
    InvalidPort(u16),

    #[error("Connect timeout must be greater than zero")]
    ZeroConnectTimeout,

    #[error("Pending output limit must be greater than zero")]
    ZeroPendingLimit,
}

/// Text sent to a peer each time it pairs with this device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "lowercase")]
pub enum Greeting {
    /// Built-in banner naming the proxy version and the TCP target
    Default,
    /// No greeting at all
    Disabled,
    /// Operator supplied text, sent verbatim
    Custom(String),
}

impl Greeting {
    /// Build from an optional override; an empty override disables the greeting
    pub fn from_override(text: Option<String>) -> Self {
        match text {
            None => Greeting::Default,
            Some(text) if text.is_empty() => Greeting::Disabled,
            Some(text) => Greeting::Custom(text),
        }
    }
}

/// Tunnel manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub target_host: String,
    pub target_port: u16,
    pub greeting: Greeting,
    /// Sent to the TCP target right after each connect, `%s` becomes the peer id
    pub open_banner: Option<String>,
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Upper bound on queued, not yet written bytes per tunnel
    pub max_pending_bytes: usize,
}

/// Helper module for serializing Duration as seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            target_host: "india.colorado.edu".to_string(),
            target_port: 13,
            greeting: Greeting::Default,
            open_banner: None,
            connect_timeout: Duration::from_secs(30),
            max_pending_bytes: 1024 * 1024,
        }
    }
}

impl TunnelConfig {
    pub fn builder() -> TunnelConfigBuilder {
        TunnelConfigBuilder::default()
    }

    /// `host:port` string passed to `TcpStream::connect`
    pub fn target_addr(&self) -> String {
        format!("{}:{}", self.target_host, self.target_port)
    }

    /// Render the open banner for a peer, if one is configured
    pub fn render_open_banner(&self, peer: &PeerId) -> Option<String> {
        self.open_banner
            .as_ref()
            .map(|template| template.replace(PEER_PLACEHOLDER, peer.as_str()))
    }

    /// Text to send on pairing, if any
    pub fn greeting_text(&self) -> Option<String> {
        match &self.greeting {
            Greeting::Disabled => None,
            Greeting::Custom(text) => Some(text.clone()),
            Greeting::Default => {
                let rule = "-".repeat(61);
                Some(format!(
                    "Device-to-TCP Proxy v{}\n{rule}\nTarget:  tcp://{}\n{rule}\n",
                    env!("CARGO_PKG_VERSION"),
                    self.target_addr(),
                ))
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.target_port == 0 {
            return Err(ConfigError::InvalidPort(self.target_port));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroConnectTimeout);
        }
        if self.max_pending_bytes == 0 {
            return Err(ConfigError::ZeroPendingLimit);
        }
        Ok(())
    }
}

/// Builder for TunnelConfig
#[derive(Default)]
pub struct TunnelConfigBuilder {
    config: TunnelConfig,
}

impl TunnelConfigBuilder {
    pub fn target_host(mut self, host: impl Into<String>) -> Self {
        self.config.target_host = host.into();
        self
    }

    pub fn target_port(mut self, port: u16) -> Self {
        self.config.target_port = port;
        self
    }

    pub fn greeting(mut self, greeting: Greeting) -> Self {
        self.config.greeting = greeting;
        self
    }

    pub fn open_banner(mut self, template: Option<String>) -> Self {
        self.config.open_banner = template;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn max_pending_bytes(mut self, limit: usize) -> Self {
        self.config.max_pending_bytes = limit;
        self
    }

    pub fn build(self) -> Result<TunnelConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
