// crates/bastion-daemon/src/config.rs
//
// Configuration for the Bastion staking daemon.
//
// Loaded from a TOML file; every field falls back to a default so a partial
// (or missing) file still yields a runnable dev node.

use std::fs;

use serde::Deserialize;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Chain identifier stamped into every block header.
    #[serde(default = "default_chain_id")]
    pub chain_id: String,

    /// Directory holding the RocksDB state database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Keep state in memory only; nothing survives a restart.
    #[serde(default)]
    pub memory_store: bool,

    /// Path to a JSON genesis file. When unset a dev genesis is generated.
    #[serde(default)]
    pub genesis_path: Option<String>,

    /// Number of validators in the generated dev genesis.
    #[serde(default = "default_dev_validators")]
    pub dev_validators: u32,

    /// Seconds between produced blocks.
    #[serde(default = "default_block_interval_secs")]
    pub block_interval_secs: u64,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_chain_id() -> String {
    "bastion-devnet".to_string()
}

fn default_data_dir() -> String {
    "~/.bastion/data".to_string()
}

fn default_dev_validators() -> u32 {
    4
}

fn default_block_interval_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            data_dir: default_data_dir(),
            memory_store: false,
            genesis_path: None,
            dev_validators: default_dev_validators(),
            block_interval_secs: default_block_interval_secs(),
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(expand_tilde(path))?;
        let config: DaemonConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Path of the state database under `data_dir`.
    pub fn state_db_path(&self) -> String {
        format!("{}/state_rocksdb", expand_tilde(&self.data_dir))
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DaemonConfig = toml::from_str(
            r#"
chain_id = "bastion-test"
block_interval_secs = 1
"#,
        )
        .unwrap();
        assert_eq!(config.chain_id, "bastion-test");
        assert_eq!(config.block_interval_secs, 1);
        assert_eq!(config.dev_validators, 4);
        assert_eq!(config.log_level, "info");
        assert!(config.genesis_path.is_none());
        assert!(!config.memory_store);
    }

    #[test]
    fn test_expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/lib/bastion"), "/var/lib/bastion");
        if dirs::home_dir().is_some() {
            assert!(!expand_tilde("~/x").starts_with('~'));
        }
    }

    #[test]
    fn test_state_db_path_under_data_dir() {
        let config = DaemonConfig {
            data_dir: "/tmp/bastion".to_string(),
            ..DaemonConfig::default()
        };
        assert_eq!(config.state_db_path(), "/tmp/bastion/state_rocksdb");
    }
}
