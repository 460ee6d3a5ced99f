use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::protocol;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory incoming files are persisted under, relative to the
    /// working directory unless absolute. Created on demand.
    pub receive_directory: String,
    /// Extension given to received files.
    pub receive_extension: String,
    /// Service channel both peers rendezvous on.
    pub channel: u8,
    /// Base TCP port the bridged transport maps channels onto.
    pub port_base: u16,
    /// Bound on a single accept wait, so the server observes its stop flag
    /// promptly instead of blocking forever.
    pub accept_timeout_secs: u64,
    /// Pause between discovery entries, keeping the queue from flooding
    /// faster than the dispatch loop drains it.
    pub discovery_yield_ms: u64,
    /// Registry of remembered devices the discovery scan enumerates.
    pub known_devices: Vec<KnownDevice>,
}

/// One remembered device in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownDevice {
    pub name: String,
    /// 48-bit address as hex text, e.g. `00007f000001`.
    pub address: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            receive_directory: "received_files".to_string(),
            receive_extension: "bin".to_string(),
            channel: protocol::SERVICE_CHANNEL,
            port_base: protocol::DEFAULT_PORT_BASE,
            accept_timeout_secs: 1,
            discovery_yield_ms: 10,
            known_devices: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file or create default
    pub fn load_or_default(config_path: Option<&str>) -> Self {
        if let Some(config) = config_path
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|content| serde_json::from_str(&content).ok())
        {
            return config;
        }
        Self::default()
    }

    /// Save configuration to file
    pub fn save_to_file(&self, config_path: &str) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Get the receive directory as PathBuf
    pub fn receive_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.receive_directory)
    }

    /// Ensure the receive directory exists
    pub fn ensure_directories(&self) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(&self.receive_directory)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.receive_directory.is_empty() {
            anyhow::bail!("Receive directory must not be empty");
        }
        if self.accept_timeout_secs == 0 {
            anyhow::bail!("Accept timeout must be at least one second");
        }
        if u32::from(self.port_base) + u32::from(self.channel) > u32::from(u16::MAX) {
            anyhow::bail!("Port base plus channel exceeds the port range");
        }
        for device in &self.known_devices {
            if crate::core::DeviceAddress::parse(&device.address).is_none() {
                anyhow::bail!("Invalid device address in registry: {}", device.address);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.channel, protocol::SERVICE_CHANNEL);
    }

    #[test]
    fn rejects_bad_registry_entries() {
        let config = AppConfig {
            known_devices: vec![KnownDevice {
                name: "speaker".into(),
                address: "zz".into(),
            }],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.receive_directory, config.receive_directory);
        assert_eq!(back.port_base, config.port_base);
    }
}
