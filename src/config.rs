use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::lsp::ProviderKind;
use crate::types::PLATFORM_MIN_CHANNEL_SATS;

/// Configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the LSP ordering API
    #[serde(rename = "lsp-url", default = "default_lsp_url")]
    pub lsp_url: String,

    /// Which provider adapter to speak: direct, proxy or lsps1
    #[serde(rename = "provider", default = "default_provider")]
    pub provider: String,

    /// Base URL of the node backend serving the channel refresh proxy.
    /// Falls back to `lsp-url` when unset.
    #[serde(rename = "backend-url")]
    pub backend_url: Option<String>,

    #[serde(rename = "channels-path", default = "default_channels_path")]
    pub channels_path: String,

    #[serde(
        rename = "order-poll-interval-secs",
        default = "default_poll_interval_secs"
    )]
    pub order_poll_interval_secs: u64,

    #[serde(
        rename = "channel-poll-interval-secs",
        default = "default_poll_interval_secs"
    )]
    pub channel_poll_interval_secs: u64,

    /// Minimum channel size enforced whatever the LSP advertises
    #[serde(rename = "min-channel-floor-sats", default = "default_min_channel_floor")]
    pub min_channel_floor_sats: u64,

    /// Suggested channel size, clamped into the LSP's bounds
    #[serde(
        rename = "default-channel-size-sats",
        default = "default_channel_size_sats"
    )]
    pub default_channel_size_sats: u64,

    /// Known LSP node URIs (`pubkey@host:port`) used to filter channels
    #[serde(rename = "lsp-uris", default)]
    pub lsp_uris: Vec<String>,

    #[serde(rename = "cache-enabled", default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// Data directory for the capability cache and logs
    #[serde(rename = "data-dir")]
    pub data_dir: Option<PathBuf>,

    #[serde(rename = "event-bus-capacity", default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Order parameters not chosen per order
    #[serde(rename = "order-defaults", default)]
    pub order_defaults: OrderDefaults,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderDefaults {
    #[serde(rename = "required-channel-confirmations", default)]
    pub required_channel_confirmations: u32,

    #[serde(
        rename = "funding-confirms-within-blocks",
        default = "default_funding_confirms_within_blocks"
    )]
    pub funding_confirms_within_blocks: u32,

    #[serde(
        rename = "channel-expiry-blocks",
        default = "default_channel_expiry_blocks"
    )]
    pub channel_expiry_blocks: u32,

    #[serde(rename = "announce-channel", default)]
    pub announce_channel: bool,

    #[serde(rename = "token", default)]
    pub token: String,
}

impl Default for OrderDefaults {
    fn default() -> Self {
        Self {
            required_channel_confirmations: 0,
            funding_confirms_within_blocks: default_funding_confirms_within_blocks(),
            channel_expiry_blocks: default_channel_expiry_blocks(),
            announce_channel: false,
            token: String::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lsp_url: default_lsp_url(),
            provider: default_provider(),
            backend_url: None,
            channels_path: default_channels_path(),
            order_poll_interval_secs: default_poll_interval_secs(),
            channel_poll_interval_secs: default_poll_interval_secs(),
            min_channel_floor_sats: default_min_channel_floor(),
            default_channel_size_sats: default_channel_size_sats(),
            lsp_uris: Vec::new(),
            cache_enabled: default_cache_enabled(),
            data_dir: None,
            event_bus_capacity: default_event_bus_capacity(),
            order_defaults: OrderDefaults::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file atomically
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;

        // Write to temporary file first
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, contents)?;

        match std::fs::rename(&temp_path, path) {
            Ok(_) => Ok(()),
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e.into())
            }
        }
    }

    /// Load the configuration file, writing the defaults when it is missing
    /// or unreadable. Returns whether a new file was written.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();

        if path.exists() {
            match Self::load_from_file(path) {
                Ok(config) => return Ok((config, false)),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Configuration file is corrupted, recreating with defaults"
                    );
                }
            }
        }

        let config = Self::default();
        config.save_to_file(path)?;
        Ok((config, true))
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        self.provider_kind()?;
        url::Url::parse(&self.lsp_url)?;
        if let Some(backend_url) = &self.backend_url {
            url::Url::parse(backend_url)?;
        }
        if self.order_poll_interval_secs == 0 || self.channel_poll_interval_secs == 0 {
            bail!("Poll intervals must be at least one second");
        }
        if self.min_channel_floor_sats < PLATFORM_MIN_CHANNEL_SATS {
            bail!(
                "min-channel-floor-sats must be at least {}",
                PLATFORM_MIN_CHANNEL_SATS
            );
        }
        if self.event_bus_capacity == 0 {
            bail!("event-bus-capacity must be greater than zero");
        }
        Ok(())
    }

    pub fn provider_kind(&self) -> Result<ProviderKind> {
        Ok(ProviderKind::from_str(&self.provider)?)
    }

    /// Base URL for the channel refresh endpoint
    pub fn backend_base_url(&self) -> &str {
        self.backend_url.as_deref().unwrap_or(&self.lsp_url)
    }

    pub fn order_poll_interval(&self) -> Duration {
        Duration::from_secs(self.order_poll_interval_secs)
    }

    pub fn channel_poll_interval(&self) -> Duration {
        Duration::from_secs(self.channel_poll_interval_secs)
    }
}

// Default value functions
fn default_lsp_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_provider() -> String {
    ProviderKind::Direct.as_str().to_string()
}

fn default_channels_path() -> String {
    "/api/channels/refresh".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_min_channel_floor() -> u64 {
    PLATFORM_MIN_CHANNEL_SATS
}

fn default_channel_size_sats() -> u64 {
    1_000_000
}

fn default_cache_enabled() -> bool {
    true
}

fn default_event_bus_capacity() -> usize {
    1000
}

fn default_funding_confirms_within_blocks() -> u32 {
    6
}

fn default_channel_expiry_blocks() -> u32 {
    13_140
}
