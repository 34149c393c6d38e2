use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use domain::driver::LinkKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_notify_capacity")]
    pub notify_capacity: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            batch_size: default_batch_size(),
            notify_capacity: default_notify_capacity(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_poll_interval() -> u64 {
    500
}
fn default_batch_size() -> usize {
    50
}
fn default_notify_capacity() -> usize {
    1024
}

/// Locations of the tag and rule tables; relative paths are taken from the config directory
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TablesConfig {
    #[serde(default = "default_tag_table")]
    pub tags: String,
    #[serde(default = "default_rule_table")]
    pub rules: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            tags: default_tag_table(),
            rules: default_rule_table(),
        }
    }
}

fn default_tag_table() -> String {
    "tags.json".to_string()
}
fn default_rule_table() -> String {
    "rules.json".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LinkConfig {
    pub kind: LinkKind,
    /// Implementation-specific, decoded by the link factory
    #[serde(default)]
    pub settings: serde_json::Value,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LinksConfig {
    #[serde(default = "default_secondary_prefix")]
    pub secondary_prefix: String,
    pub primary: LinkConfig,
    #[serde(default)]
    pub secondary: Option<LinkConfig>,
}

fn default_secondary_prefix() -> String {
    "ssh.".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MotionSettings {
    #[serde(default = "default_max_jog_step")]
    pub max_jog_step: f64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            max_jog_step: default_max_jog_step(),
        }
    }
}

fn default_max_jog_step() -> f64 {
    10.0
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StationConfig {
    pub station_id: String,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub tables: TablesConfig,
    pub links: LinksConfig,
    #[serde(default)]
    pub motion: MotionSettings,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl StationConfig {
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("links.primary.kind", "simulated")?
            // Local config file, required so the station never starts unconfigured
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(true))
            // Per-environment overrides, e.g. config/production.toml
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Environment variables (e.g. STATION__POLL__INTERVAL_MS=250)
            .add_source(Environment::with_prefix("STATION").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn tag_table_path(&self, config_dir: impl AsRef<Path>) -> PathBuf {
        resolve(config_dir.as_ref(), &self.tables.tags)
    }

    pub fn rule_table_path(&self, config_dir: impl AsRef<Path>) -> PathBuf {
        resolve(config_dir.as_ref(), &self.tables.rules)
    }
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
station_id = "spray-cell-1"

[links.primary]
kind = "simulated"

[links.primary.settings]
name = "plc"
registers_file = "registers.json"
"#,
        )
        .unwrap();

        let config = StationConfig::load(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.station_id, "spray-cell-1");
        assert_eq!(config.poll, PollConfig::default());
        assert_eq!(config.poll.interval(), Duration::from_millis(500));
        assert_eq!(config.links.secondary_prefix, "ssh.");
        assert_eq!(config.links.primary.kind, LinkKind::Simulated);
        assert_eq!(config.links.primary.settings["name"], "plc");
        assert!(config.links.secondary.is_none());
        assert_eq!(config.heartbeat_interval_secs, 30);
        assert_eq!(config.tag_table_path(dir.path()), dir.path().join("tags.json"));
    }

    #[test]
    fn test_missing_default_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StationConfig::load(dir.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_absolute_table_paths_are_kept() {
        let resolved = resolve(Path::new("/etc/station"), "/opt/tables/tags.json");
        assert_eq!(resolved, PathBuf::from("/opt/tables/tags.json"));
        let resolved = resolve(Path::new("/etc/station"), "tables/rules.json");
        assert_eq!(resolved, PathBuf::from("/etc/station/tables/rules.json"));
    }
}
