//! Server configuration and access lists.
//!
//! [`ServerConfig`] is read from TOML; every key is optional and falls back to
//! its default. A missing file is not an error. `KJARNI_PORT` and
//! `KJARNI_TICK_RATE` override the file.
//!
//! ```toml
//! whitelist = false
//! blacklist = true
//! max_clients = 10
//! port = 1123
//! tick_rate = 60
//! save_path = "level.json"
//! ```
//!
//! [`AccessLists`] hold the whitelist, blacklist, and operator entries. They
//! are plain JSON arrays on disk (`whitelist.json`, `blacklist.json`,
//! `ops.json`).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Only admit accounts on the whitelist.
    pub whitelist: bool,
    /// Refuse accounts on the blacklist.
    pub blacklist: bool,
    pub max_clients: usize,
    /// Message of the day.
    pub message: String,
    pub debug: bool,
    pub port: u16,
    pub public_uptime: bool,
    pub public_log: bool,
    /// Level ticks per second.
    pub tick_rate: u32,
    /// Where `save` writes the level snapshot.
    pub save_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            whitelist: false,
            blacklist: true,
            max_clients: 10,
            message: String::new(),
            debug: false,
            port: 1123,
            public_uptime: false,
            public_log: false,
            tick_rate: 60,
            save_path: PathBuf::from("level.json"),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.is_file() {
            Self::from_toml_str(&std::fs::read_to_string(path)?)?
        } else {
            log::warn!("Failed to load {}; using defaults", path.display());
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(port) = std::env::var("KJARNI_PORT").ok().and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(rate) = std::env::var("KJARNI_TICK_RATE").ok().and_then(|v| v.parse().ok()) {
            self.tick_rate = rate;
        }
    }

    /// Interval between level ticks. A zero rate is treated as 1.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}

// ── Access lists ─────────────────────────────────────────────────────────

/// An operator: permission level and whether they may join a full server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpsEntry {
    pub id: Uuid,
    #[serde(rename = "bypassLimit", default)]
    pub bypass_limit: bool,
    pub oplvl: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Replace the current contents.
    Assign,
    /// Append to the current contents.
    Push,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessLists {
    pub whitelist: BTreeSet<Uuid>,
    pub blacklist: BTreeSet<Uuid>,
    pub ops: Vec<OpsEntry>,
}

impl AccessLists {
    /// Load `whitelist.json`, `blacklist.json`, and `ops.json` from a
    /// directory. Missing files are skipped with a warning.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut lists = Self::default();
        load_list::<Uuid, _>(&mut lists.whitelist, dir.join("whitelist.json"), LoadMode::Assign)?;
        load_list::<Uuid, _>(&mut lists.blacklist, dir.join("blacklist.json"), LoadMode::Assign)?;
        load_list::<OpsEntry, _>(&mut lists.ops, dir.join("ops.json"), LoadMode::Assign)?;
        Ok(lists)
    }

    pub fn op(&self, id: Uuid) -> Option<&OpsEntry> {
        self.ops.iter().find(|op| op.id == id)
    }

    pub fn can_bypass_limit(&self, id: Uuid) -> bool {
        self.op(id).is_some_and(|op| op.bypass_limit)
    }
}

/// Read a JSON array into a collection. Returns `false` if the file does
/// not exist.
pub fn load_list<T, C>(target: &mut C, path: impl AsRef<Path>, mode: LoadMode) -> Result<bool>
where
    T: DeserializeOwned,
    C: Default + Extend<T>,
{
    let path = path.as_ref();
    if !path.is_file() {
        log::warn!("Failed to load {}", path.display());
        return Ok(false);
    }
    let contents: Vec<T> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    if mode == LoadMode::Assign {
        *target = C::default();
    }
    target.extend(contents);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_keys() {
        let config = ServerConfig::from_toml_str("max_clients = 4\nwhitelist = true").unwrap();
        assert_eq!(config.max_clients, 4);
        assert!(config.whitelist);
        assert!(config.blacklist);
        assert_eq!(config.port, 1123);
        assert_eq!(config.tick_rate, 60);
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(ServerConfig::from_toml_str("port = \"high\"").is_err());
    }

    #[test]
    fn tick_period() {
        let mut config = ServerConfig::default();
        config.tick_rate = 20;
        assert_eq!(config.tick_period(), Duration::from_millis(50));
        config.tick_rate = 0;
        assert_eq!(config.tick_period(), Duration::from_secs(1));
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(dir.path().join("server.toml")).unwrap();
        assert_eq!(config.max_clients, 10);
    }

    #[test]
    fn access_lists_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        let op = Uuid::new_v4();
        let banned = Uuid::new_v4();
        std::fs::write(
            dir.path().join("ops.json"),
            format!(r#"[{{"id":"{op}","bypassLimit":true,"oplvl":4}}]"#),
        )
        .unwrap();
        std::fs::write(dir.path().join("blacklist.json"), format!(r#"["{banned}"]"#)).unwrap();

        let lists = AccessLists::load_dir(dir.path()).unwrap();
        assert!(lists.whitelist.is_empty());
        assert!(lists.blacklist.contains(&banned));
        assert_eq!(lists.op(op).map(|o| o.oplvl), Some(4));
        assert!(lists.can_bypass_limit(op));
        assert!(!lists.can_bypass_limit(banned));
    }

    #[test]
    fn push_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.json");
        let a = Uuid::new_v4();
        std::fs::write(&path, format!(r#"["{a}"]"#)).unwrap();

        let mut list = vec![Uuid::nil()];
        assert!(load_list::<Uuid, _>(&mut list, &path, LoadMode::Push).unwrap());
        assert_eq!(list, vec![Uuid::nil(), a]);
        assert!(load_list::<Uuid, _>(&mut list, &path, LoadMode::Assign).unwrap());
        assert_eq!(list, vec![a]);
        assert!(!load_list::<Uuid, _>(&mut list, dir.path().join("nope.json"), LoadMode::Assign).unwrap());
    }
}
