//! Hub connection configuration

use crate::HubError;
use url::Url;

/// Hub connection configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// WebSocket URL of the hub (`ws://` or `wss://`)
    pub url: String,
    /// Address other devices use to reach this one
    pub device_address: String,
    /// Name shown to peers
    pub device_name: String,
    /// Secret peers present when pairing
    pub pairing_secret: String,
}

impl HubConfig {
    /// Parse and check the hub URL
    pub fn parsed_url(&self) -> Result<Url, HubError> {
        let url = Url::parse(&self.url)
            .map_err(|e| HubError::InvalidUrl(format!("{}: {}", self.url, e)))?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(HubError::InvalidUrl(format!(
                "{}: unsupported scheme '{}', expected ws or wss",
                self.url, other
            ))),
        }
    }

    /// Pairing code peers enter to reach this device
    pub fn pairing_code(&self) -> String {
        let hub = self
            .parsed_url()
            .ok()
            .and_then(|url| {
                url.host_str().map(|host| {
                    let mut hub = host.to_string();
                    if let Some(port) = url.port() {
                        hub.push_str(&format!(":{}", port));
                    }
                    let path = url.path().trim_end_matches('/');
                    hub.push_str(path);
                    hub
                })
            })
            .unwrap_or_else(|| self.url.clone());

        format!("{}@{}#{}", self.device_address, hub, self.pairing_secret)
    }
}
