//! Manual and scheduled sync triggers.

use console::style;
use serde::Serialize;

use super::{authorize, build_engine, print_result};
use crate::{
   Result,
   config::Config,
   types::{Source, SyncResult, SyncSummary},
};

#[derive(Serialize)]
struct SyncAllJson {
   schema_version: u32,
   summary:        SyncSummary,
   results:        Vec<SyncResult>,
}

/// Syncs one restaurant and prints its result.
pub async fn execute(
   cfg: &Config,
   token: Option<&str>,
   restaurant_id: String,
   source: Option<Source>,
   force: bool,
   json: bool,
) -> Result<()> {
   authorize(cfg, token)?;
   let engine = build_engine(cfg)?;
   let result = engine.sync_restaurant(&restaurant_id, source, force).await;

   if json {
      println!("{}", serde_json::to_string_pretty(&result)?);
   } else {
      print_result(&result);
   }
   Ok(())
}

/// Syncs every enabled config and prints per-restaurant results plus a tally.
pub async fn execute_all(cfg: &Config, token: Option<&str>, force: bool, json: bool) -> Result<()> {
   authorize(cfg, token)?;
   let engine = build_engine(cfg)?;
   let results = engine.sync_all(force).await?;
   let summary = SyncSummary::from_results(&results);

   if json {
      let payload = SyncAllJson { schema_version: 1, summary, results };
      println!("{}", serde_json::to_string_pretty(&payload)?);
      return Ok(());
   }

   if results.is_empty() {
      println!("{}", style("No enabled sync configurations").dim());
      return Ok(());
   }

   for result in &results {
      print_result(result);
   }
   println!();
   println!(
      "{} {} synced, {} failed, {} skipped",
      style("Done:").bold(),
      style(summary.success).green(),
      style(summary.error).red(),
      style(summary.skipped).dim()
   );
   Ok(())
}
