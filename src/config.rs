//! Configuration for ingestion threading and wait behaviour.

use std::{
   fs,
   path::{Path, PathBuf},
   sync::OnceLock,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub const MAX_THREADS_CAP: usize = 256;
pub const MIN_THREAD_STACK_BYTES: usize = 64 * 1024;

/// Application configuration loaded from config file and environment variables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
   /// Worker threads used for ingestion; 0 picks a value from the CPU count.
   pub ingest_threads:     usize,
   pub max_threads:        usize,
   /// Stack size for distributor worker threads; 0 uses the platform default.
   pub thread_stack_bytes: usize,
   /// Interval at which the CLI reports progress while waiting.
   pub wait_poll_ms:       u64,
}

impl Default for Config {
   fn default() -> Self {
      Self { ingest_threads: 0, max_threads: 32, thread_stack_bytes: 0, wait_poll_ms: 250 }
   }
}

impl Config {
   /// Loads config, falling back to defaults when the layers cannot be merged.
   pub fn load() -> Self {
      Self::try_load()
         .inspect_err(|e| tracing::warn!("failed to parse config: {e}"))
         .unwrap_or_default()
   }

   pub fn try_load() -> Result<Self> {
      Self::load_from(&ensure_global_config())
   }

   /// Merges defaults, the TOML file at `path` (if present) and `IDXSYNC_*`
   /// environment variables.
   pub fn load_from(path: &Path) -> Result<Self> {
      Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(path))
         .merge(Env::prefixed("IDXSYNC_").lowercase(true))
         .extract()
         .map_err(|e| ConfigError::Invalid(e.to_string()).into())
   }

   fn create_default_config(path: &Path) {
      if let Some(parent) = path.parent() {
         let _ = fs::create_dir_all(parent);
      }
      if let Ok(toml) = Self::default().to_toml() {
         let _ = fs::write(path, toml);
      }
   }

   pub fn to_toml(&self) -> Result<String> {
      Ok(toml::to_string_pretty(self).map_err(ConfigError::from)?)
   }

   /// Calculates default thread count based on available CPUs
   pub fn default_threads(&self) -> usize {
      num_cpus::get().clamp(1, self.effective_max_threads())
   }

   pub fn effective_max_threads(&self) -> usize {
      self.max_threads.clamp(1, MAX_THREADS_CAP)
   }

   /// Thread count for ingestion: the explicit request, then the configured
   /// value, then the CPU-derived default, always within `1..=max_threads`.
   pub fn ingest_threads(&self, requested: Option<usize>) -> usize {
      let threads = match requested.filter(|&n| n > 0) {
         Some(n) => n,
         None if self.ingest_threads > 0 => self.ingest_threads,
         None => return self.default_threads(),
      };
      threads.clamp(1, self.effective_max_threads())
   }

   pub fn effective_thread_stack_bytes(&self) -> Option<usize> {
      (self.thread_stack_bytes > 0).then(|| self.thread_stack_bytes.max(MIN_THREAD_STACK_BYTES))
   }
}

/// Returns the global configuration instance
pub fn get() -> &'static Config {
   CONFIG.get_or_init(Config::load)
}

/// Returns the base directory for idxsync configuration
pub fn base_dir() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| resolve_base_dir(".idxsync"))
}

pub fn config_file_path() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| base_dir().join("config.toml"))
}

fn ensure_global_config() -> PathBuf {
   let config_path = config_file_path();
   if !config_path.exists() {
      Config::create_default_config(config_path);
   }
   config_path.clone()
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
