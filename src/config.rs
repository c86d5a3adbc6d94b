//! Configuration management for noc-engine.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (NOC_ENGINE_PLATFORM, etc.)
//! 2. Project-local config file (`./noc-engine.toml`)
//! 3. User config file (`~/.config/noc-engine/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # noc-engine.toml
//!
//! # Platform family: grayskull, wormhole or blackhole
//! platform = "wormhole"
//!
//! # Transaction IDs available to the tracker (max 16)
//! num_trids = 8
//!
//! [saturation]
//! full_bandwidth_vcs = 3
//! degraded_divisor = 16
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::device::fabric::NocTimingConfig;
use crate::device::noc_spec;
use crate::device::{Platform, PlatformFamily};
use crate::engine::congestion::SaturationCurve;
use crate::error::{NocError, Result};

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Resolved engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Size of the transaction ID space.
    pub num_trids: u8,
    /// Reject rebinding a pending transaction ID.
    pub checked_trids: bool,
    /// Cycles a command slot is busy after accepting a command.
    pub cmd_accept_cycles: u32,
    /// Fail instead of warn when too many VCs would be active.
    pub reject_oversubscribed: bool,
    /// Buffer-sharing rule.
    pub saturation: SaturationCurve,
    /// Fabric timing.
    pub timing: NocTimingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_trids: noc_spec::MAX_TRANSACTION_IDS,
            checked_trids: cfg!(debug_assertions),
            cmd_accept_cycles: noc_spec::CMD_ACCEPT_CYCLES,
            reject_oversubscribed: false,
            saturation: SaturationCurve::default(),
            timing: NocTimingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reject settings the hardware cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.num_trids == 0 || self.num_trids > noc_spec::MAX_TRANSACTION_IDS {
            return Err(NocError::config(format!(
                "num_trids must be in 1..={}, got {}",
                noc_spec::MAX_TRANSACTION_IDS,
                self.num_trids
            )));
        }
        if self.saturation.degraded_divisor == 0 {
            return Err(NocError::config("saturation.degraded_divisor must be non-zero"));
        }
        Ok(())
    }

    /// Same settings with checked transaction IDs.
    pub fn checked(mut self) -> Self {
        self.checked_trids = true;
        self
    }
}

/// noc-engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Platform family preset.
    pub platform: Option<PlatformFamily>,

    /// Transaction IDs available to the tracker.
    pub num_trids: Option<u8>,

    /// Checked transaction-ID reuse.
    /// Defaults to on in debug builds.
    pub checked_trids: Option<bool>,

    /// Command slot accept interval in cycles.
    pub cmd_accept_cycles: Option<u32>,

    /// Fail issues that would oversubscribe router buffering.
    pub reject_oversubscribed: Option<bool>,

    /// Buffer-sharing rule override.
    pub saturation: Option<SaturationCurve>,

    /// Fabric timing override.
    pub timing: Option<NocTimingConfig>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `noc-engine.toml`
    /// 3. User config `~/.config/noc-engine/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| NocError::config(e.to_string()))
    }

    /// Platform family, with fallback to the default family.
    pub fn platform_family(&self) -> PlatformFamily {
        self.platform.unwrap_or_default()
    }

    /// Preset for the configured family.
    pub fn platform(&self) -> Platform {
        Platform::preset(self.platform_family())
    }

    /// Resolve engine settings, filling gaps with defaults.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let defaults = EngineConfig::default();
        let config = EngineConfig {
            num_trids: self.num_trids.unwrap_or(defaults.num_trids),
            checked_trids: self.checked_trids.unwrap_or(defaults.checked_trids),
            cmd_accept_cycles: self.cmd_accept_cycles.unwrap_or(defaults.cmd_accept_cycles),
            reject_oversubscribed: self.reject_oversubscribed.unwrap_or(defaults.reject_oversubscribed),
            saturation: self.saturation.unwrap_or(defaults.saturation),
            timing: self.timing.unwrap_or(defaults.timing),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load user configuration from ~/.config/noc-engine/config.toml
    fn load_user_config() -> Option<Self> {
        Self::load_from_file(&Self::user_config_path()?)
    }

    /// Load project-local configuration from ./noc-engine.toml
    fn load_local_config() -> Option<Self> {
        let local_path = Path::new("noc-engine.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("noc-engine.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.platform.is_some() {
            self.platform = other.platform;
        }
        if other.num_trids.is_some() {
            self.num_trids = other.num_trids;
        }
        if other.checked_trids.is_some() {
            self.checked_trids = other.checked_trids;
        }
        if other.cmd_accept_cycles.is_some() {
            self.cmd_accept_cycles = other.cmd_accept_cycles;
        }
        if other.reject_oversubscribed.is_some() {
            self.reject_oversubscribed = other.reject_oversubscribed;
        }
        if other.saturation.is_some() {
            self.saturation = other.saturation;
        }
        if other.timing.is_some() {
            self.timing = other.timing;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("NOC_ENGINE_PLATFORM") {
            match PlatformFamily::from_name(&name) {
                Some(family) => {
                    log::info!("Using NOC_ENGINE_PLATFORM from environment: {}", family);
                    self.platform = Some(family);
                }
                None => log::warn!("Ignoring unknown NOC_ENGINE_PLATFORM '{}'", name),
            }
        }
        if let Ok(value) = std::env::var("NOC_ENGINE_NUM_TRIDS") {
            match value.parse() {
                Ok(n) => {
                    log::info!("Using NOC_ENGINE_NUM_TRIDS from environment: {}", n);
                    self.num_trids = Some(n);
                }
                Err(e) => log::warn!("Ignoring NOC_ENGINE_NUM_TRIDS '{}': {}", value, e),
            }
        }
        if let Ok(value) = std::env::var("NOC_ENGINE_CHECKED_TRIDS") {
            match parse_flag(&value) {
                Some(flag) => {
                    log::info!("Using NOC_ENGINE_CHECKED_TRIDS from environment: {}", flag);
                    self.checked_trids = Some(flag);
                }
                None => log::warn!("Ignoring NOC_ENGINE_CHECKED_TRIDS '{}'", value),
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("noc-engine").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# noc-engine configuration
# Place this file at ~/.config/noc-engine/config.toml or ./noc-engine.toml

# Platform family: grayskull (32 KB buffers), wormhole (64 KB), blackhole (256 KB)
platform = "wormhole"

# Transaction IDs available to the tracker (1..=16)
num_trids = 16

# Reject rebinding a transaction ID that is still pending
# checked_trids = true

# Fail issues that would put more VCs in flight than buffering sustains
# reject_oversubscribed = false

# Buffer-sharing rule
[saturation]
full_bandwidth_vcs = 3
degraded_divisor = 16

# Fabric timing (cycles)
# [timing]
# niu_latency_cycles = 24
# hop_latency_cycles = 2
# ack_turnaround_cycles = 6
"#
        .to_string()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
