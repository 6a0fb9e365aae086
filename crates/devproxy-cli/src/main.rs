//! Devproxy - bridge messaging peers to a TCP service
//!
//! Every paired peer gets its own TCP connection to the target; peer text goes
//! out as newline terminated lines and whatever the target answers comes back
//! as text.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::{usage_line, OverrideOutcome, PositionalOverrides, ProxySettings};
use devproxy_hub::{HubClient, RotateKeysCallback};
use devproxy_tunnel::TunnelManager;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const INIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Devproxy - bridge messaging peers to a TCP service
#[derive(Parser, Debug)]
#[command(name = "devproxy")]
#[command(about = "Devproxy - bridge messaging peers to a TCP service")]
#[command(version)]
#[command(long_about = r#"
Devproxy registers a device with a messaging hub and forwards every text a
peer sends to a TCP service, one connection per peer. Whatever the service
answers is sent back to the peer as text.

Positional overrides only apply when both <HOST> and a numeric <PORT> are
given; otherwise the compiled-in defaults are used.

EXAMPLES:
  # Bridge peers to a local echo service
  devproxy 127.0.0.1 7 "Echo Proxy"

  # Custom greeting and a banner announcing each peer to the service
  devproxy chat.example.com 6667 "IRC Proxy" "Welcome!" "NICK %s"

  # Disable the pairing greeting
  devproxy 127.0.0.1 7000 "Quiet Proxy" ""

ENVIRONMENT VARIABLES:
  DEVPROXY_HUB             Hub WebSocket URL
  DEVPROXY_PAIRING_SECRET  Permanent pairing secret
  DEVPROXY_DATA_DIR        Directory holding the key file
"#)]
struct Cli {
    /// Target host
    host: Option<String>,

    /// Target port (digits only)
    port: Option<String>,

    /// Device name shown to peers
    name: Option<String>,

    /// Greeting sent to a peer after pairing (empty string disables it)
    desc: Option<String>,

    /// Banner sent to the target on every connect, %s is replaced with the peer id
    open: Option<String>,

    /// Hub WebSocket URL
    #[arg(long, env = "DEVPROXY_HUB", default_value = config::DEFAULT_HUB_URL)]
    hub: String,

    /// Permanent pairing secret
    #[arg(long, env = "DEVPROXY_PAIRING_SECRET", default_value = config::DEFAULT_PAIRING_SECRET)]
    pairing_secret: String,

    /// Directory holding the key file
    #[arg(long, env = "DEVPROXY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// TCP connect timeout in seconds
    #[arg(long, default_value = "30")]
    connect_timeout: u64,

    /// Maximum bytes queued per peer while its connection is not ready
    #[arg(long, default_value = "1048576")]
    max_pending_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable verbose logging (same as --log-level debug)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> PositionalOverrides {
        PositionalOverrides {
            host: self.host.clone(),
            port: self.port.clone(),
            name: self.name.clone(),
            desc: self.desc.clone(),
            open: self.open.clone(),
        }
    }

    fn settings(&self) -> ProxySettings {
        let mut settings = ProxySettings {
            hub_url: self.hub.clone(),
            pairing_secret: self.pairing_secret.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            max_pending_bytes: self.max_pending_bytes,
            ..ProxySettings::default()
        };
        if let Some(ref dir) = self.data_dir {
            settings.data_dir = dir.clone();
        }
        settings
    }
}

/// Setup logging with the specified log level
fn setup_logging(log_level: &str, verbose: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { log_level };

    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("Invalid log level: {}", log_level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level, cli.verbose)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("DEVPROXY_GIT_HASH"),
        build_time = env!("DEVPROXY_BUILD_TIME"),
        "Devproxy starting"
    );

    let mut settings = cli.settings();
    match settings.apply_overrides(cli.overrides()) {
        OverrideOutcome::Applied => {}
        OverrideOutcome::NotGiven => info!("{}", usage_line("devproxy")),
        OverrideOutcome::Rejected(reason) => {
            warn!("Ignoring command line overrides: {}", reason);
            info!("{}", usage_line("devproxy"));
        }
    }
    settings.validate()?;

    // Key persistence failures are fatal
    let store = settings.key_store();
    let keys = store
        .load_or_generate()
        .context("Failed to write keys file")?;
    info!("Done reading keys.");

    let hub_config = settings.hub_config(keys.fingerprint());
    info!("Device address: {}", hub_config.device_address);
    info!("Pairing code:   {}", hub_config.pairing_code());

    let tunnel_config = settings.tunnel_config()?;
    let target = tunnel_config.target_addr();

    let (client, session) = HubClient::connect(&hub_config)
        .await
        .context("Failed to connect to hub")?;

    let keys = Arc::new(Mutex::new(keys));
    let rotate: RotateKeysCallback = Arc::new(move || -> Result<(), String> {
        let mut keys = keys
            .lock()
            .map_err(|_| "key lock poisoned".to_string())?;
        store.rotate(&mut keys).map_err(|e| e.to_string())
    });

    let (manager, handle) = TunnelManager::new(tunnel_config, Arc::new(client.clone()));
    let mut session_task = tokio::spawn(session.on_rotate_keys(rotate).run(handle.clone()));

    // Wait for the hub to accept our login
    while !client.is_ready() {
        info!("Initializing...");
        tokio::select! {
            _ = tokio::time::sleep(INIT_POLL_INTERVAL) => {}
            result = &mut session_task => {
                return match result {
                    Ok(Ok(())) => anyhow::bail!("Hub session ended during initialization"),
                    Ok(Err(e)) => Err(e).context("Hub session failed during initialization"),
                    Err(e) => Err(e).context("Hub session task panicked"),
                };
            }
        }
    }

    info!("TCP Proxy is ready to rock on {}!", target);

    let manager_task = tokio::spawn(manager.run());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = tokio::select! {
        _ = &mut ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
        result = &mut session_task => {
            match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!("Hub session error: {:#}", e);
                    Err(anyhow::Error::new(e).context("Hub session ended"))
                }
                Err(e) => {
                    error!("Hub session task panicked: {}", e);
                    Err(e.into())
                }
            }
        }
    };

    let _ = handle.shutdown();
    if let Err(e) = manager_task.await {
        error!("Tunnel manager task panicked: {}", e);
    }
    session_task.abort();

    info!("Devproxy stopped");
    outcome
}
