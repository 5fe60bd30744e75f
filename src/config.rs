//! Daemon configuration
//!
//! A single YAML document. Loading is tolerant: a missing or malformed
//! file falls back to defaults so the daemon always comes up.

use crate::permissions::GuildAccess;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Leading marker for invocations. Empty means every event is one.
    pub command_prefix: String,
    /// Maximum edit distance for typo suggestions
    pub suggestion_distance: usize,
    /// Level every actor holds with no roles or overrides
    pub base_permission_level: u8,
    /// Seconds a resolved permission level stays cached
    pub permission_ttl_secs: u64,
    /// Wall-clock budget for one handler run, in seconds
    pub handler_timeout_secs: u64,
    /// Seconds between case expiry sweeps
    pub expiry_check_interval_secs: u64,
    /// Identities the console transport stamps on inbound lines
    pub console: ConsoleConfig,
    /// Per-guild permission tables
    pub guilds: Vec<GuildAccessConfig>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: String::new(),
            suggestion_distance: 2,
            base_permission_level: 0,
            permission_ttl_secs: 30,
            handler_timeout_secs: 10,
            expiry_check_interval_secs: 30,
            console: ConsoleConfig::default(),
            guilds: Vec::new(),
        }
    }
}

/// Identities for the console transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub guild_id: u64,
    pub channel_id: u64,
    pub actor_id: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            guild_id: 1,
            channel_id: 1,
            actor_id: 1,
        }
    }
}

/// Permission table for one guild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildAccessConfig {
    pub guild_id: u64,
    /// role id -> granted level
    #[serde(default)]
    pub role_levels: HashMap<u64, u8>,
    /// actor id -> explicit level
    #[serde(default)]
    pub overrides: HashMap<u64, u8>,
}

impl From<GuildAccessConfig> for GuildAccess {
    fn from(config: GuildAccessConfig) -> Self {
        Self {
            role_levels: config.role_levels,
            overrides: config.overrides,
        }
    }
}

impl BotConfig {
    pub const DEFAULT_PATH: &'static str = "data/warden.yaml";

    /// Load configuration from a YAML file, falling back to defaults
    /// when the file is absent or unreadable.
    pub async fn load(path: &str) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_yaml::from_str::<Self>(&content) {
                Ok(config) => config,
                Err(err) => {
                    warn!(path = %path, error = %err, "Config file is malformed; using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to a YAML file, creating the parent directory.
    ///
    /// # Errors
    /// Fails when the directory cannot be created, the config cannot be
    /// serialized, or the file cannot be written.
    pub async fn save(&self, path: &str) -> Result<(), crate::Error> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let yaml = serde_yaml::to_string(self)?;
        tokio::fs::write(path, yaml).await?;
        Ok(())
    }

    #[must_use]
    pub fn permission_ttl(&self) -> Duration {
        Duration::from_secs(self.permission_ttl_secs)
    }

    #[must_use]
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    #[must_use]
    pub fn expiry_check_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_check_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.command_prefix, "");
        assert_eq!(config.suggestion_distance, 2);
        assert_eq!(config.handler_timeout(), Duration::from_secs(10));
        assert!(config.guilds.is_empty());
    }

    #[test]
    fn test_partial_yaml_fills_in_defaults() {
        let config: BotConfig = serde_yaml::from_str("command_prefix: '!'\n").unwrap();
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.suggestion_distance, 2);
        assert_eq!(config.permission_ttl_secs, 30);
    }

    #[test]
    fn test_guild_table_round_trip() {
        let mut config = BotConfig::default();
        config.guilds.push(GuildAccessConfig {
            guild_id: 9,
            role_levels: HashMap::from([(100, 2)]),
            overrides: HashMap::from([(10, 4)]),
        });

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: BotConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.guilds.len(), 1);
        assert_eq!(parsed.guilds[0].guild_id, 9);
        assert_eq!(parsed.guilds[0].role_levels.get(&100), Some(&2));

        let access: GuildAccess = parsed.guilds[0].clone().into();
        assert_eq!(access.overrides.get(&10), Some(&4));
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let config = BotConfig::load("/nonexistent/warden.yaml").await;
        assert_eq!(config.suggestion_distance, 2);
    }
}
