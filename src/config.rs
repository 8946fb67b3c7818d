//! Configuration management for sync cadence, timeouts, sources and paths.

use std::{
   collections::BTreeMap,
   fs,
   path::{Path, PathBuf},
   sync::OnceLock,
   time::Duration,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
   error::{ConfigError, Result},
   types::Source,
};

pub const MAX_CONCURRENT_SYNCS_CAP: usize = 64;
pub const MAX_BATCH_OPS_CAP: usize = 10_000;

/// Endpoint of the collaborator service that serves one source's menus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEndpoint {
   pub endpoint: String,
   #[serde(default)]
   pub api_key:  Option<String>,
}

/// Application configuration loaded from config file and environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub max_concurrent_syncs: usize,
   pub fetch_timeout_ms:     u64,
   pub apply_timeout_ms:     u64,
   pub max_batch_ops:        usize,
   pub lease_ttl_ms:         u64,

   pub record_skips:       bool,
   pub legacy_id_fallback: bool,

   pub trigger_secret: Option<String>,
   pub data_dir:       Option<PathBuf>,

   pub sources: BTreeMap<Source, SourceEndpoint>,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         max_concurrent_syncs: 4,
         fetch_timeout_ms: 30_000,
         apply_timeout_ms: 30_000,
         max_batch_ops: 500,
         lease_ttl_ms: 300_000,
         record_skips: false,
         legacy_id_fallback: false,
         trigger_secret: None,
         data_dir: None,
         sources: BTreeMap::new(),
      }
   }
}

impl Config {
   /// Loads `~/.menusync/config.toml`, writing defaults on first use.
   ///
   /// A file that fails to parse is an error; it never falls back to defaults.
   pub fn load() -> Result<Self> {
      Self::load_from(ensure_global_config())
   }

   /// Loads from an explicit file without touching the global config path.
   pub fn load_from(path: &Path) -> Result<Self> {
      let cfg: Self = Self::figment(path)
         .extract()
         .map_err(|e| ConfigError::Extract(Box::new(e)))?;
      cfg.validate()?;
      Ok(cfg)
   }

   fn figment(path: &Path) -> Figment {
      Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(path))
         .merge(Env::prefixed("MENUSYNC_").split("__").lowercase(true))
   }

   fn create_default_config(path: &Path) {
      if let Some(parent) = path.parent() {
         let _ = fs::create_dir_all(parent);
      }
      let default_config = Self::default();
      if let Ok(toml) = toml::to_string_pretty(&default_config) {
         let _ = fs::write(path, toml);
      }
   }

   pub fn validate(&self) -> Result<()> {
      if self.max_concurrent_syncs == 0 || self.max_concurrent_syncs > MAX_CONCURRENT_SYNCS_CAP {
         return Err(
            ConfigError::Invalid(format!(
               "max_concurrent_syncs {} must be within 1..={MAX_CONCURRENT_SYNCS_CAP}",
               self.max_concurrent_syncs
            ))
            .into(),
         );
      }
      if self.max_batch_ops == 0 || self.max_batch_ops > MAX_BATCH_OPS_CAP {
         return Err(
            ConfigError::Invalid(format!(
               "max_batch_ops {} must be within 1..={MAX_BATCH_OPS_CAP}",
               self.max_batch_ops
            ))
            .into(),
         );
      }
      if self.lease_ttl_ms <= self.fetch_timeout_ms.max(self.apply_timeout_ms) {
         tracing::warn!(
            "lease_ttl_ms {} does not exceed the run timeouts; heartbeats keep the lease alive",
            self.lease_ttl_ms
         );
      }
      Ok(())
   }

   pub fn effective_max_concurrent_syncs(&self) -> usize {
      self.max_concurrent_syncs.clamp(1, MAX_CONCURRENT_SYNCS_CAP)
   }

   pub fn effective_max_batch_ops(&self) -> usize {
      self.max_batch_ops.clamp(1, MAX_BATCH_OPS_CAP)
   }

   pub const fn fetch_timeout(&self) -> Duration {
      Duration::from_millis(self.fetch_timeout_ms)
   }

   pub const fn apply_timeout(&self) -> Duration {
      Duration::from_millis(self.apply_timeout_ms)
   }

   pub const fn lease_ttl(&self) -> Duration {
      Duration::from_millis(self.lease_ttl_ms)
   }

   pub fn endpoint(&self, source: Source) -> Option<&SourceEndpoint> {
      self.sources.get(&source)
   }

   /// Directory holding the document store and result log.
   pub fn resolved_data_dir(&self) -> PathBuf {
      self.data_dir.clone().unwrap_or_else(|| data_dir().clone())
   }

   pub fn resolved_lock_dir(&self) -> PathBuf {
      self.resolved_data_dir().join("locks")
   }
}

/// Returns the base directory for menusync data and configuration
pub fn base_dir() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| resolve_base_dir(".menusync"))
}

fn ensure_global_config() -> &'static Path {
   let config_path = config_file_path();
   if !config_path.exists() {
      Config::create_default_config(config_path);
   }
   config_path
}

fn resolve_base_dir(dir_name: &str) -> PathBuf {
   BaseDirs::new()
      .map(|d| d.home_dir().join(dir_name))
      .or_else(|| {
         std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(dir_name))
      })
      .unwrap_or_else(|| {
         std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(dir_name)
      })
}

macro_rules! define_paths {
   ($($fn_name:ident: $path:literal),* $(,)?) => {
      $(
         pub fn $fn_name() -> &'static PathBuf {
            static ONCE: OnceLock<PathBuf> = OnceLock::new();
            ONCE.get_or_init(|| base_dir().join($path))
         }
      )*
   };
}

define_paths! {
   config_file_path: "config.toml",
   data_dir: "data",
}
