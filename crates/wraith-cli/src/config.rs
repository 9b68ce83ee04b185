//! Configuration for the `warp` CLI.
//!
//! Loading and persisting this file across restarts is the CLI's job only —
//! the transfer engine itself is stateless between runs and takes these
//! values as plain constructor arguments.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// `warp` configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Identity (handshake keypair) settings.
    pub identity: IdentityConfig,
    /// Source/sink pipeline tunables.
    pub transfer: TransferConfig,
    /// Fan-out coordinator and congestion tunables.
    pub network: NetworkConfig,
}

/// Identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Path to a saved X25519 private key, used by `send`/`receive`/`host`
    /// when present. `keygen` writes here by default.
    #[serde(default = "default_keypair_path")]
    pub keypair_path: PathBuf,
}

/// Source/sink pipeline tunables (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Lower clamp for chunk size, in bytes.
    #[serde(default = "default_chunk_min")]
    pub chunk_min: usize,
    /// Upper clamp for chunk size, in bytes.
    #[serde(default = "default_chunk_max")]
    pub chunk_max: usize,
    /// Single-stream prefetch high-water mark, in bytes.
    #[serde(default = "default_prefetch_high_water")]
    pub prefetch_high_water: usize,
    /// Single-stream prefetch low-water mark, in bytes.
    #[serde(default = "default_prefetch_low_water")]
    pub prefetch_low_water: usize,
    /// Archive-stream compress flag default for `send`.
    #[serde(default)]
    pub archive_compress: bool,
}

/// Fan-out coordinator and congestion tunables (spec.md §4.9, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Hard cap on simultaneously-attached peers.
    #[serde(default = "default_max_direct_peers")]
    pub max_direct_peers: usize,
    /// Seconds to wait for a peer's `TRANSFER_READY` before detaching it.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Seconds the coordinator waits for stragglers before batching whoever
    /// is ready.
    #[serde(default = "default_batch_readiness_window_secs")]
    pub batch_readiness_window_secs: u64,
    /// Transport buffered-amount high-water mark fed to the congestion
    /// controller; its ceiling is twice this value.
    #[serde(default = "default_transport_high_water")]
    pub transport_high_water: u64,
}

fn default_keypair_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("warp/identity.key")
}

fn default_chunk_min() -> usize {
    wraith_files::source::MIN_CHUNK_SIZE
}

fn default_chunk_max() -> usize {
    wraith_files::source::MAX_CHUNK_SIZE
}

fn default_prefetch_high_water() -> usize {
    wraith_files::source::PREFETCH_HIGH_WATER
}

fn default_prefetch_low_water() -> usize {
    wraith_files::source::PREFETCH_LOW_WATER
}

fn default_max_direct_peers() -> usize {
    wraith_core::MAX_DIRECT_PEERS
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_batch_readiness_window_secs() -> u64 {
    wraith_core::BATCH_READINESS_WINDOW.as_secs()
}

fn default_transport_high_water() -> u64 {
    8 * 1024 * 1024
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_min: default_chunk_min(),
            chunk_max: default_chunk_max(),
            prefetch_high_water: default_prefetch_high_water(),
            prefetch_low_water: default_prefetch_low_water(),
            archive_compress: false,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_direct_peers: default_max_direct_peers(),
            connect_timeout_secs: default_connect_timeout_secs(),
            batch_readiness_window_secs: default_batch_readiness_window_secs(),
            transport_high_water: default_transport_high_water(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    /// The default config file path (`$XDG_CONFIG_HOME/warp/config.toml`).
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("warp/config.toml")
    }

    /// Load from the default path, writing out the defaults first if no
    /// config file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Validate tunables against the ranges the engine actually enforces.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field found.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.transfer.chunk_min == 0 || self.transfer.chunk_min > self.transfer.chunk_max {
            anyhow::bail!(
                "chunk_min ({}) must be nonzero and <= chunk_max ({})",
                self.transfer.chunk_min,
                self.transfer.chunk_max
            );
        }
        if self.transfer.prefetch_low_water >= self.transfer.prefetch_high_water {
            anyhow::bail!("prefetch_low_water must be less than prefetch_high_water");
        }
        if self.network.max_direct_peers == 0 {
            anyhow::bail!("max_direct_peers must be at least 1");
        }
        if self.network.transport_high_water == 0 {
            anyhow::bail!("transport_high_water must be nonzero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_engine_constants() {
        let config = Config::default();
        assert_eq!(config.network.max_direct_peers, wraith_core::MAX_DIRECT_PEERS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_chunk_bounds() {
        let mut config = Config::default();
        config.transfer.chunk_min = config.transfer.chunk_max + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_prefetch_watermarks() {
        let mut config = Config::default();
        config.transfer.prefetch_low_water = config.transfer.prefetch_high_water;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrips() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let restored: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            config.network.max_direct_peers,
            restored.network.max_direct_peers
        );
    }
}
