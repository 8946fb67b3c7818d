//! Menu synchronization engine.
//!
//! [`SyncEngine::sync_restaurant`] runs one (restaurant, source) pair through
//! config lookup, cadence check, lease, fetch, reconcile, apply and logging.
//! Every failure inside a run, panics included, becomes an `error`
//! [`SyncResult`]; nothing escapes to the caller. [`SyncEngine::sync_all`]
//! fans that out over every enabled config with bounded concurrency.

use std::{any::Any, panic::AssertUnwindSafe, path::PathBuf, time::Duration};

use chrono::Utc;
use futures::{FutureExt, StreamExt, stream};
use tokio::time;

use crate::{
   Result,
   apply::apply_batch,
   cadence::{self, Cadence},
   config::Config,
   error::{Error, LeaseError, StoreError},
   lease::SyncLease,
   reconcile::Reconciler,
   source::MenuSource,
   store::Store,
   types::{ApplyCounts, Scope, Source, SyncConfig, SyncResult},
};

/// Engine knobs, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
   pub max_concurrent:     usize,
   pub fetch_timeout:      Duration,
   pub apply_timeout:      Duration,
   pub max_batch_ops:      usize,
   pub lease_ttl:          Duration,
   /// Directory for per-scope lease files; `None` runs without leases.
   pub lock_dir:           Option<PathBuf>,
   pub record_skips:       bool,
   pub legacy_id_fallback: bool,
}

impl Default for SyncOptions {
   fn default() -> Self {
      Self::from_config(&Config::default())
   }
}

impl SyncOptions {
   pub fn from_config(cfg: &Config) -> Self {
      Self {
         max_concurrent:     cfg.effective_max_concurrent_syncs(),
         fetch_timeout:      cfg.fetch_timeout(),
         apply_timeout:      cfg.apply_timeout(),
         max_batch_ops:      cfg.effective_max_batch_ops(),
         lease_ttl:          cfg.lease_ttl(),
         lock_dir:           Some(cfg.resolved_lock_dir()),
         record_skips:       cfg.record_skips,
         legacy_id_fallback: cfg.legacy_id_fallback,
      }
   }
}

/// Engine for synchronizing external menus into the local store
pub struct SyncEngine<A: MenuSource, S: Store> {
   source:  A,
   store:   S,
   options: SyncOptions,
}

impl<A, S> SyncEngine<A, S>
where
   A: MenuSource,
   S: Store,
{
   pub const fn new(source: A, store: S, options: SyncOptions) -> Self {
      Self { source, store, options }
   }

   pub const fn store(&self) -> &S {
      &self.store
   }

   pub const fn options(&self) -> &SyncOptions {
      &self.options
   }

   /// Syncs one restaurant, optionally restricted to a single source.
   ///
   /// Never fails and never unwinds: a panic anywhere in the run becomes a
   /// logged `error` result.
   pub async fn sync_restaurant(
      &self,
      restaurant_id: &str,
      source: Option<Source>,
      force: bool,
   ) -> SyncResult {
      let attempt = AssertUnwindSafe(self.attempt(restaurant_id, source, force))
         .catch_unwind()
         .await;
      match attempt {
         Ok(result) => result,
         Err(panic) => {
            let message = format!("sync panicked: {}", panic_message(panic.as_ref()));
            tracing::warn!(restaurant_id, ?source, "{message}");
            let result = SyncResult::error(restaurant_id, source, message, Utc::now());
            if AssertUnwindSafe(self.record(&result)).catch_unwind().await.is_err() {
               tracing::warn!(restaurant_id, "result log panicked while recording a panic");
            }
            result
         },
      }
   }

   /// Syncs every enabled config; one result per config, in config order.
   ///
   /// At most `max_concurrent` runs are in flight, and a slow run only
   /// occupies its own slot. Only a failure to list the configs is returned
   /// as an error.
   pub async fn sync_all(&self, force: bool) -> Result<Vec<SyncResult>> {
      let configs = self.store.list_enabled_configs().await?;
      tracing::info!(configs = configs.len(), force, "starting sync for all restaurants");

      let mut results: Vec<(usize, SyncResult)> = stream::iter(configs.into_iter().enumerate())
         .map(|(index, config): (usize, SyncConfig)| async move {
            let result = self
               .sync_restaurant(&config.restaurant_id, Some(config.source), force)
               .await;
            (index, result)
         })
         .buffer_unordered(self.options.max_concurrent.max(1))
         .collect()
         .await;
      results.sort_by_key(|(index, _)| *index);

      Ok(results.into_iter().map(|(_, result)| result).collect())
   }

   async fn attempt(&self, restaurant_id: &str, source: Option<Source>, force: bool) -> SyncResult {
      let config = match self.store.enabled_config(restaurant_id, source).await {
         Ok(Some(config)) => config,
         Ok(None) => {
            let reason = match source {
               Some(s) => format!("no enabled {s} sync configuration"),
               None => "no enabled sync configuration".to_string(),
            };
            return self.skip(restaurant_id, source, reason).await;
         },
         Err(err) => return self.fail(restaurant_id, source, &err).await,
      };

      let effective_source = source.unwrap_or(config.source);
      let scope = Scope::new(restaurant_id, effective_source);

      if let Cadence::NotDue { elapsed_hours, interval_hours } =
         cadence::check(&config, Utc::now(), force)
      {
         let reason = format!(
            "sync not due: {elapsed_hours:.1}h since last sync, interval {interval_hours}h"
         );
         return self.skip(restaurant_id, Some(effective_source), reason).await;
      }

      let lease = match self.acquire_lease(&scope).await {
         Ok(lease) => lease,
         Err(Error::Lease(LeaseError::Held { key })) => {
            let reason = format!("sync already in progress for {key}");
            return self.skip(restaurant_id, Some(effective_source), reason).await;
         },
         Err(err) => return self.fail(restaurant_id, Some(effective_source), &err).await,
      };

      let result = match self.run(&config, &scope, lease.as_ref()).await {
         Ok(counts) => {
            tracing::info!(
               scope = %scope,
               added = counts.items_added,
               updated = counts.items_updated,
               removed = counts.items_removed,
               "menu sync succeeded"
            );
            SyncResult::success(&scope, counts, Utc::now())
         },
         Err(err) => {
            let failed =
               SyncResult::error(restaurant_id, Some(effective_source), err.to_string(), Utc::now());
            match err.committed_counts() {
               Some(counts) => {
                  tracing::warn!(
                     scope = %scope,
                     added = counts.items_added,
                     updated = counts.items_updated,
                     removed = counts.items_removed,
                     "menu sync failed after writes landed: {err}"
                  );
                  failed.with_counts(counts)
               },
               None => {
                  tracing::warn!(scope = %scope, "menu sync failed: {err}");
                  failed
               },
            }
         },
      };

      self.record(&result).await;
      result
   }

   async fn run(
      &self,
      config: &SyncConfig,
      scope: &Scope,
      lease: Option<&SyncLease>,
   ) -> Result<ApplyCounts> {
      let fetch_ms = self.options.fetch_timeout.as_millis() as u64;
      let envelope = time::timeout(
         self.options.fetch_timeout,
         self.source.fetch(scope.source, &scope.restaurant_id),
      )
      .await
      .map_err(|_| Error::Timeout { op: "fetch", ms: fetch_ms })??;
      let external = envelope.into_records(scope.source)?;

      let existing = self.store.scoped_items(scope).await?;
      let changes = Reconciler::new(scope.clone(), Utc::now())
         .legacy_id_fallback(self.options.legacy_id_fallback)
         .reconcile(&existing, &external);
      tracing::debug!(
         scope = %scope,
         fetched = external.len(),
         stored = existing.len(),
         create = changes.to_create.len(),
         update = changes.to_update.len(),
         delete = changes.to_delete.len(),
         "reconciled menu"
      );

      if let Some(lease) = lease {
         lease.verify()?;
      }

      let apply_ms = self.options.apply_timeout.as_millis() as u64;
      let counts = time::timeout(
         self.options.apply_timeout,
         apply_batch(&self.store, &changes, self.options.max_batch_ops),
      )
      .await
      .map_err(|_| Error::Timeout { op: "apply", ms: apply_ms })??;

      if let Err(err) = self.store.touch_last_sync(&config.id, Utc::now()).await {
         return Err(Error::Store(StoreError::LastSyncNotRecorded {
            added:   counts.items_added,
            updated: counts.items_updated,
            removed: counts.items_removed,
            reason:  err.to_string(),
         }));
      }
      Ok(counts)
   }

   async fn acquire_lease(&self, scope: &Scope) -> Result<Option<SyncLease>> {
      match &self.options.lock_dir {
         Some(dir) => Ok(Some(SyncLease::acquire(dir, scope, self.options.lease_ttl).await?)),
         None => Ok(None),
      }
   }

   async fn skip(&self, restaurant_id: &str, source: Option<Source>, reason: String) -> SyncResult {
      tracing::debug!(restaurant_id, ?source, "skipping sync: {reason}");
      let result = SyncResult::skipped(restaurant_id, source, reason, Utc::now());
      if self.options.record_skips {
         self.record(&result).await;
      }
      result
   }

   async fn fail(&self, restaurant_id: &str, source: Option<Source>, err: &Error) -> SyncResult {
      tracing::warn!(restaurant_id, ?source, "menu sync failed: {err}");
      let result = SyncResult::error(restaurant_id, source, err.to_string(), Utc::now());
      self.record(&result).await;
      result
   }

   async fn record(&self, result: &SyncResult) {
      if let Err(err) = self.store.append(result).await {
         tracing::warn!(
            restaurant_id = %result.restaurant_id,
            "failed to append sync result: {err}"
         );
      }
   }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
   panic
      .downcast_ref::<&str>()
      .copied()
      .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
      .unwrap_or("unknown panic")
}
