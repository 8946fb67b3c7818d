//! CLI command implementations for menusync.
//!
//! Each module corresponds to one subcommand. Sync triggers go through
//! [`authorize`] before touching the store.

pub mod backfill;
pub mod status;
pub mod sync;

use console::style;

use crate::{
   Result, auth,
   config::Config,
   source::HttpSource,
   store::FileStore,
   sync::{SyncEngine, SyncOptions},
   types::{SyncResult, SyncStatus},
};

pub(crate) type Engine = SyncEngine<HttpSource, FileStore>;

pub(crate) fn open_store(cfg: &Config) -> Result<FileStore> {
   FileStore::open(cfg.resolved_data_dir(), cfg.effective_max_batch_ops())
}

pub(crate) fn build_engine(cfg: &Config) -> Result<Engine> {
   Ok(SyncEngine::new(HttpSource::from_config(cfg)?, open_store(cfg)?, SyncOptions::from_config(cfg)))
}

pub(crate) fn authorize(cfg: &Config, token: Option<&str>) -> Result<()> {
   auth::verify_bearer(token, cfg.trigger_secret.as_deref())
}

pub(crate) fn print_result(result: &SyncResult) {
   let marker = match result.status {
      SyncStatus::Success => style("●").green(),
      SyncStatus::Error => style("●").red(),
      SyncStatus::Skipped => style("●").dim(),
   };
   let source = result.source.map_or_else(|| "-".to_string(), |s| s.to_string());
   let detail = match result.status {
      SyncStatus::Success => format!(
         "+{} ~{} -{}",
         result.items_added, result.items_updated, result.items_removed
      ),
      _ => result.error.clone().unwrap_or_default(),
   };
   println!(
      "  {} {}/{} {} {}",
      marker,
      result.restaurant_id,
      source,
      result.status.as_str(),
      style(format!("({detail})")).dim()
   );
}
