//! Daemon configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;
use vanguard_core::SourceId;
use vanguard_core::mirror::DEFAULT_TICK_INTERVAL;
use vanguard_hid::LinkSettings;
use vanguard_hid::protocol::DEFAULT_FRAME_DELAY;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Keyboard settings
    #[serde(default)]
    pub device: DeviceConfig,
    /// Mirror settings
    #[serde(default)]
    pub mirror: MirrorConfig,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DaemonConfig {
    /// IPC socket path (optional, uses `$XDG_RUNTIME_DIR` if not set)
    pub socket_path: Option<PathBuf>,
}

/// Keyboard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// USB Vendor ID
    #[serde(default = "default_vid")]
    pub vendor_id: String,
    /// USB Product ID
    #[serde(default = "default_pid")]
    pub product_id: String,
    /// HID usage page of the lighting interface
    #[serde(default = "default_usage_page")]
    pub usage_page: String,
    /// Pause between frames in milliseconds
    #[serde(default = "default_frame_delay_ms")]
    pub frame_delay_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: default_vid(),
            product_id: default_pid(),
            usage_page: default_usage_page(),
            frame_delay_ms: default_frame_delay_ms(),
        }
    }
}

impl DeviceConfig {
    /// Resolve the settings for the HID link.
    pub fn link_settings(&self) -> Result<LinkSettings> {
        Ok(LinkSettings {
            vendor_id: parse_hex_u16(&self.vendor_id).context("Invalid device.vendor_id")?,
            product_id: parse_hex_u16(&self.product_id).context("Invalid device.product_id")?,
            usage_page: parse_hex_u16(&self.usage_page).context("Invalid device.usage_page")?,
            frame_delay: Duration::from_millis(self.frame_delay_ms),
        })
    }
}

fn default_vid() -> String {
    "1b1c".to_string()
}

fn default_pid() -> String {
    "2b0d".to_string()
}

fn default_usage_page() -> String {
    "ff42".to_string()
}

fn default_frame_delay_ms() -> u64 {
    duration_ms(DEFAULT_FRAME_DELAY)
}

/// Mirror settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Start with mirroring enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Source selected at startup
    #[serde(default = "default_source")]
    pub source: Option<u32>,
    /// Polling period in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: default_source(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl MirrorConfig {
    /// Source selected at startup.
    #[must_use]
    pub fn source(&self) -> Option<SourceId> {
        self.source.map(SourceId)
    }

    /// Polling period.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn default_true() -> bool {
    true
}

#[allow(clippy::unnecessary_wraps)]
fn default_source() -> Option<u32> {
    Some(0)
}

fn default_tick_interval_ms() -> u64 {
    duration_ms(DEFAULT_TICK_INTERVAL)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Parse a 16-bit id written as `1b1c` or `0x1b1c`.
fn parse_hex_u16(value: &str) -> Result<u16> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).with_context(|| format!("{value:?} is not a 16-bit hex value"))
}

/// Load configuration from file or defaults.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

/// Load configuration from a specific file, using defaults if it is missing.
pub fn load_config_from(config_path: &Path) -> Result<Config> {
    let config = if config_path.exists() {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {config_path:?}"))?
    } else {
        info!(?config_path, "Config file not found, using defaults");
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.mirror.tick_interval_ms == 0 {
        bail!("mirror.tick_interval_ms must be greater than zero");
    }
    config.device.link_settings()?;
    Ok(())
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "vanguard", "VanguardBridge")
        .context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}
