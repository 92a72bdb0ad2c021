//! Server configuration: the option set spec.md §6 names, loaded from a
//! TOML file via the `config` crate the way `spineldb`'s own `config.rs`
//! loads its (much larger) option set — a `RawConfig` deserialized with
//! per-field defaults, then resolved into the public `Config`.
//!
//! Loading and CLI plumbing are external collaborators per spec.md §1;
//! this module only owns the shape of the options and the TOML decode.

use config::{Config as ConfigSource, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `maxmemory-policy`: which keys the eviction engine (C8) samples from
/// and which recency counter it ranks them by.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    #[default]
    #[serde(rename = "noeviction")]
    NoEviction,
    #[serde(rename = "LRU-all")]
    LruAll,
    #[serde(rename = "LFU-all")]
    LfuAll,
    #[serde(rename = "LRU-ttl")]
    LruTtl,
    #[serde(rename = "LFU-ttl")]
    LfuTtl,
}

impl EvictionPolicy {
    pub fn is_volatile_only(self) -> bool {
        matches!(self, EvictionPolicy::LruTtl | EvictionPolicy::LfuTtl)
    }

    pub fn ranks_by_lfu(self) -> bool {
        matches!(self, EvictionPolicy::LfuAll | EvictionPolicy::LfuTtl)
    }
}

/// `appendfsync`: how aggressively the (external) AOF writer flushes.
/// Carried here because it's a config option, even though the writer
/// itself lives outside the core (spec.md §1).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppendFsync {
    Always,
    Everysec,
    No,
}

impl Default for AppendFsync {
    fn default() -> Self {
        AppendFsync::Everysec
    }
}

/// `self`/`peers`: present together enables cluster mode (spec.md §6).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ClusterConfig {
    #[serde(rename = "self")]
    pub self_id: String,
    #[serde(default)]
    pub peers: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AppendOnlyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_appendfilename")]
    pub appendfilename: String,
    #[serde(default)]
    pub appendfsync: AppendFsync,
}

fn default_appendfilename() -> String {
    "appendonly.aof".to_string()
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_databases")]
    databases: usize,
    #[serde(default)]
    requirepass: Option<String>,
    #[serde(default)]
    cluster: Option<ClusterConfig>,
    #[serde(default)]
    appendonly: AppendOnlyConfig,
    #[serde(default)]
    rdbfilename: Option<String>,
    #[serde(default)]
    maxmemory: u64,
    #[serde(default)]
    maxmemory_policy: EvictionPolicy,
    #[serde(default = "default_maxclients")]
    maxclients: usize,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    6380
}
fn default_databases() -> usize {
    16
}
fn default_maxclients() -> usize {
    10_000
}

/// The resolved, validated configuration a server is built from.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub databases: usize,
    pub requirepass: Option<String>,
    pub cluster: Option<ClusterConfig>,
    pub appendonly: AppendOnlyConfig,
    pub rdbfilename: Option<String>,
    pub maxmemory: u64,
    pub maxmemory_policy: EvictionPolicy,
    pub maxclients: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: default_bind(),
            port: default_port(),
            databases: default_databases(),
            requirepass: None,
            cluster: None,
            appendonly: AppendOnlyConfig::default(),
            rdbfilename: None,
            maxmemory: 0,
            maxmemory_policy: EvictionPolicy::default(),
            maxclients: default_maxclients(),
        }
    }
}

impl Config {
    /// Reads and parses a TOML config file, falling back to field
    /// defaults for anything unset.
    pub fn from_file(path: &str) -> Result<Self> {
        let source = ConfigSource::builder()
            .add_source(File::new(path, FileFormat::Toml))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        let raw: RawConfig = source
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        let config = Config {
            bind: raw.bind,
            port: raw.port,
            databases: raw.databases,
            requirepass: raw.requirepass,
            cluster: raw.cluster,
            appendonly: raw.appendonly,
            rdbfilename: raw.rdbfilename,
            maxmemory: raw.maxmemory,
            maxmemory_policy: raw.maxmemory_policy,
            maxclients: raw.maxclients,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port cannot be 0".to_string()));
        }
        if self.databases == 0 {
            return Err(Error::Config("databases cannot be 0".to_string()));
        }
        if self.maxclients == 0 {
            return Err(Error::Config("maxclients cannot be 0".to_string()));
        }
        if let Some(cluster) = &self.cluster
            && cluster.self_id.trim().is_empty()
        {
            return Err(Error::Config("cluster.self cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn cluster_enabled(&self) -> bool {
        self.cluster.as_ref().is_some_and(|c| !c.peers.is_empty())
    }

    pub fn auth_required(&self) -> bool {
        self.requirepass.as_ref().is_some_and(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.cluster_enabled());
        assert!(!config.auth_required());
    }

    #[test]
    fn cluster_enabled_requires_peers() {
        let mut config = Config::default();
        config.cluster = Some(ClusterConfig {
            self_id: "node-a".to_string(),
            peers: vec![],
        });
        assert!(!config.cluster_enabled());
        config.cluster.as_mut().unwrap().peers.push("node-b".to_string());
        assert!(config.cluster_enabled());
    }

    #[test]
    fn eviction_policy_classification() {
        assert!(EvictionPolicy::LruTtl.is_volatile_only());
        assert!(!EvictionPolicy::LruAll.is_volatile_only());
        assert!(EvictionPolicy::LfuAll.ranks_by_lfu());
        assert!(!EvictionPolicy::LruTtl.ranks_by_lfu());
    }
}
