//! Configuration loading and validation

use anyhow::{bail, Result};
use netst_core::{ParserTag, VendorCommand, VendorCommandTable, VendorTag};
use netst_probe::ProbeScheduler;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default, rename = "vendor_command")]
    pub vendor_commands: Vec<VendorCommandConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Probes allowed in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Per-probe timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_max_concurrency() -> usize {
    64
}

fn default_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellConfig {
    /// SSH port on the devices
    #[serde(default = "default_shell_port")]
    pub port: u16,
    /// Timeout for one remote command in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Login name used when none is given on the command line
    #[serde(default)]
    pub username: Option<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            port: default_shell_port(),
            command_timeout_ms: default_command_timeout_ms(),
            username: None,
        }
    }
}

fn default_shell_port() -> u16 {
    22
}

fn default_command_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Interface for passive capture
    #[serde(default)]
    pub interface: Option<String>,
    /// Longest single wait for a frame in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Fixed expiry sweep interval; unset follows the smallest TTL seen
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
    /// How long passive capture runs (0 = until interrupted)
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interface: None,
            read_timeout_ms: default_read_timeout_ms(),
            sweep_interval_secs: None,
            duration_secs: default_duration_secs(),
        }
    }
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_duration_secs() -> u64 {
    60
}

/// One `[[vendor_command]]` entry. Entries for a vendor replace its built-in commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorCommandConfig {
    pub vendor: VendorTag,
    pub command: String,
    pub parser: ParserTag,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.probe.max_concurrency == 0 {
            bail!("probe.max_concurrency must be at least 1");
        }
        if self.probe.timeout_ms == 0 {
            bail!("probe.timeout_ms must be greater than 0");
        }
        if self.shell.port == 0 {
            bail!("shell.port must not be 0");
        }
        if self.shell.command_timeout_ms == 0 {
            bail!("shell.command_timeout_ms must be greater than 0");
        }
        if self.discovery.read_timeout_ms == 0 {
            bail!("discovery.read_timeout_ms must be greater than 0");
        }
        if self.discovery.sweep_interval_secs == Some(0) {
            bail!("discovery.sweep_interval_secs must be greater than 0");
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe.timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.shell.command_timeout_ms)
    }

    /// Scheduler with the configured bound and per-probe timeout
    pub fn to_scheduler(&self) -> Result<ProbeScheduler> {
        Ok(ProbeScheduler::new(
            self.probe.max_concurrency,
            self.probe_timeout(),
        )?)
    }

    /// Convert to the discoverer's settings
    pub fn to_discovery_config(&self) -> netst_discovery::DiscoveryConfig {
        netst_discovery::DiscoveryConfig {
            read_timeout: Duration::from_millis(self.discovery.read_timeout_ms),
            sweep_interval: self.discovery.sweep_interval_secs.map(Duration::from_secs),
        }
    }

    /// Passive capture duration; `None` listens until interrupted
    pub fn capture_duration(&self) -> Option<Duration> {
        match self.discovery.duration_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Built-in vendor commands with the configured overrides applied
    pub fn vendor_table(&self) -> VendorCommandTable {
        let mut overrides: BTreeMap<VendorTag, Vec<VendorCommand>> = BTreeMap::new();
        for entry in &self.vendor_commands {
            overrides
                .entry(entry.vendor)
                .or_default()
                .push(VendorCommand::new(entry.command.clone(), entry.parser));
        }

        let mut table = VendorCommandTable::default();
        for (vendor, commands) in overrides {
            table.set(vendor, commands);
        }
        table
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        config
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        discovery: DiscoveryConfig {
            interface: Some("eth0".to_string()),
            ..Default::default()
        },
        vendor_commands: vec![VendorCommandConfig {
            vendor: VendorTag::Linux,
            command: "lldpcli show neighbors -f keyvalue".to_string(),
            parser: ParserTag::LldpcliKeyvalue,
        }],
        ..Default::default()
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}
