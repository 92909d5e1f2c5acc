use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KmsyncError, Result};

const CONFIG_FILE: &str = "kmsync.toml";

/// Default config template with rich comments, written by `Config::init`.
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# kmsync configuration file
# Location: <ManagedRoot>/.kmsync/kmsync.toml

[checkpoint]
# Sequence divisor for anchor checkpoints. A checkpoint at sequence N is an
# anchor (full content references only, no deltas) iff N % anchor_interval == 0.
anchor_interval = 10

# Smallest piece size for piece-hash verification, in bytes.
piece_size_min = 65536

# Largest piece size for piece-hash verification, in bytes.
piece_size_max = 4194304

# When true, a file whose size and mtime match the previous scan is assumed
# unchanged without rehashing its content.
trust_mtime = false

# Diff identity policy for paths. "true" treats paths that differ only in
# case as distinct files; "false" folds them together. Defaults to the host
# filesystem's native behavior when unset.
case_sensitive_paths = true

# Extra number of checkpoints of margin a CompletedDiscarded session's
# objects are kept reachable for before garbage_collect() may reclaim them.
gc_safety_window = 0
"#;

/// Engine-wide configuration, persisted at `.kmsync/kmsync.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            checkpoint: CheckpointConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_anchor_interval")]
    pub anchor_interval: u64,

    #[serde(default = "default_piece_size_min")]
    pub piece_size_min: u64,

    #[serde(default = "default_piece_size_max")]
    pub piece_size_max: u64,

    #[serde(default)]
    pub trust_mtime: bool,

    #[serde(default = "default_case_sensitive_paths")]
    pub case_sensitive_paths: bool,

    #[serde(default)]
    pub gc_safety_window: u64,
}

fn default_anchor_interval() -> u64 {
    10
}

fn default_piece_size_min() -> u64 {
    65_536
}

fn default_piece_size_max() -> u64 {
    4 * 1024 * 1024
}

/// POSIX filesystems are case-sensitive by default; others fold case.
fn default_case_sensitive_paths() -> bool {
    cfg!(unix)
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            anchor_interval: default_anchor_interval(),
            piece_size_min: default_piece_size_min(),
            piece_size_max: default_piece_size_max(),
            trust_mtime: false,
            case_sensitive_paths: default_case_sensitive_paths(),
            gc_safety_window: 0,
        }
    }
}

impl Config {
    /// Load config from a ManagedRoot's `.kmsync` directory.
    pub fn load(kmsync_dir: &Path) -> Result<Self> {
        let path = kmsync_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| KmsyncError::io(&path, e))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to a ManagedRoot's `.kmsync` directory.
    pub fn save(&self, kmsync_dir: &Path) -> Result<()> {
        let path = kmsync_dir.join(CONFIG_FILE);
        fs::create_dir_all(kmsync_dir).map_err(|e| KmsyncError::io(kmsync_dir, e))?;

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content).map_err(|e| KmsyncError::io(&path, e))?;
        Ok(())
    }

    /// Get the config file path for a given `.kmsync` directory.
    pub fn path(kmsync_dir: &Path) -> PathBuf {
        kmsync_dir.join(CONFIG_FILE)
    }

    /// Initialize config with the default, richly-commented template.
    pub fn init(kmsync_dir: &Path) -> Result<PathBuf> {
        let path = kmsync_dir.join(CONFIG_FILE);
        fs::create_dir_all(kmsync_dir).map_err(|e| KmsyncError::io(kmsync_dir, e))?;

        if !path.exists() {
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE).map_err(|e| KmsyncError::io(&path, e))?;
        }

        Ok(path)
    }

    /// Get a config value by dot-notation key.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "checkpoint.anchor_interval" => Some(self.checkpoint.anchor_interval.to_string()),
            "checkpoint.piece_size_min" => Some(self.checkpoint.piece_size_min.to_string()),
            "checkpoint.piece_size_max" => Some(self.checkpoint.piece_size_max.to_string()),
            "checkpoint.trust_mtime" => Some(self.checkpoint.trust_mtime.to_string()),
            "checkpoint.case_sensitive_paths" => {
                Some(self.checkpoint.case_sensitive_paths.to_string())
            }
            "checkpoint.gc_safety_window" => Some(self.checkpoint.gc_safety_window.to_string()),
            _ => None,
        }
    }

    /// Set a config value by dot-notation key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        macro_rules! parse {
            ($field:expr) => {
                value
                    .trim()
                    .parse()
                    .map_err(|_| KmsyncError::InvalidArgument {
                        message: format!("invalid value '{value}' for key '{key}'"),
                    })
                    .map(|v| $field = v)?
            };
        }

        match key {
            "checkpoint.anchor_interval" => parse!(self.checkpoint.anchor_interval),
            "checkpoint.piece_size_min" => parse!(self.checkpoint.piece_size_min),
            "checkpoint.piece_size_max" => parse!(self.checkpoint.piece_size_max),
            "checkpoint.trust_mtime" => parse!(self.checkpoint.trust_mtime),
            "checkpoint.case_sensitive_paths" => parse!(self.checkpoint.case_sensitive_paths),
            "checkpoint.gc_safety_window" => parse!(self.checkpoint.gc_safety_window),
            _ => {
                return Err(KmsyncError::ConfigKeyNotFound {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// List all config keys with their current values.
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            "checkpoint.anchor_interval",
            "checkpoint.piece_size_min",
            "checkpoint.piece_size_max",
            "checkpoint.trust_mtime",
            "checkpoint.case_sensitive_paths",
            "checkpoint.gc_safety_window",
        ]
        .into_iter()
        .map(|k| (k.to_string(), self.get(k).unwrap()))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.checkpoint.anchor_interval, 10);
        assert_eq!(config.checkpoint.piece_size_min, 65_536);
        assert_eq!(config.checkpoint.piece_size_max, 4 * 1024 * 1024);
        assert!(!config.checkpoint.trust_mtime);
        assert_eq!(config.checkpoint.gc_safety_window, 0);
    }

    #[test]
    fn get_set_round_trip() {
        let mut config = Config::default();
        config.set("checkpoint.anchor_interval", "20").unwrap();
        assert_eq!(config.get("checkpoint.anchor_interval").unwrap(), "20");

        config.set("checkpoint.trust_mtime", "true").unwrap();
        assert_eq!(config.checkpoint.trust_mtime, true);
    }

    #[test]
    fn unknown_key_errors() {
        let mut config = Config::default();
        assert!(config.set("checkpoint.nonexistent", "1").is_err());
        assert!(config.get("checkpoint.nonexistent").is_none());
    }

    #[test]
    fn save_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.checkpoint.anchor_interval = 25;
        config.save(temp.path()).unwrap();

        let loaded = Config::load(temp.path()).unwrap();
        assert_eq!(loaded.checkpoint.anchor_interval, 25);
    }

    #[test]
    fn load_missing_file_yields_default() {
        let temp = TempDir::new().unwrap();
        let loaded = Config::load(temp.path()).unwrap();
        assert_eq!(loaded.checkpoint.anchor_interval, 10);
    }
}
