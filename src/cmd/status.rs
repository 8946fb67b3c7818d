//! Sync status command.
//!
//! Shows enabled sync configurations with their last sync time and the most
//! recent entries of the result log.

use console::style;
use serde::Serialize;

use super::{open_store, print_result};
use crate::{
   Result,
   config::Config,
   store::{ConfigStore, ResultLog},
   types::{SyncConfig, SyncResult},
};

#[derive(Serialize)]
struct StatusJson {
   schema_version: u32,
   configs:        Vec<SyncConfig>,
   recent:         Vec<SyncResult>,
}

pub async fn execute(
   cfg: &Config,
   restaurant_id: Option<String>,
   limit: usize,
   json: bool,
) -> Result<()> {
   let store = open_store(cfg)?;
   let mut configs = store.list_enabled_configs().await?;
   if let Some(id) = restaurant_id.as_deref() {
      configs.retain(|c| c.restaurant_id == id);
   }
   let recent = store.recent(restaurant_id.as_deref(), limit).await?;

   if json {
      let payload = StatusJson { schema_version: 1, configs, recent };
      println!("{}", serde_json::to_string_pretty(&payload)?);
      return Ok(());
   }

   if configs.is_empty() {
      println!("{}", style("No enabled sync configurations").dim());
   } else {
      println!("{}", style("Enabled configurations:").bold());
      for config in &configs {
         let last = config
            .last_sync
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
         println!(
            "  {} {}/{} {}",
            style("●").green(),
            config.restaurant_id,
            config.source,
            style(format!("(every {}h, last {last})", config.sync_interval_hours)).dim()
         );
      }
   }

   println!();
   if recent.is_empty() {
      println!("{}", style("No recorded sync runs").dim());
   } else {
      println!("{}", style("Recent runs:").bold());
      for result in &recent {
         print_result(result);
      }
   }

   Ok(())
}
