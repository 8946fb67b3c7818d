//! Stamps missing external ids on previously synced items.
//!
//! Items synced before external ids were recorded cannot be joined against a
//! fresh snapshot. Backfilling copies their storage id into `external_id`,
//! which is what the legacy runtime fallback would have assumed.

use console::style;

use super::{authorize, open_store};
use crate::{
   Result,
   config::Config,
   store::MenuStore,
   types::{Scope, Source},
};

pub async fn execute(
   cfg: &Config,
   token: Option<&str>,
   restaurant_id: String,
   source: Source,
) -> Result<()> {
   authorize(cfg, token)?;
   let store = open_store(cfg)?;
   let scope = Scope::new(restaurant_id, source);
   let stamped = store.backfill_external_ids(&scope).await?;
   tracing::info!(scope = %scope, stamped, "backfilled external ids");

   if stamped == 0 {
      println!("{}", style(format!("{scope}: nothing to backfill")).dim());
   } else {
      println!("{} {scope}: stamped {stamped} item(s)", style("✓").green());
   }
   Ok(())
}
