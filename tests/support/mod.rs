#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::{
   collections::HashMap,
   sync::atomic::{AtomicUsize, Ordering},
   time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use menusync::{
   Result,
   error::{SourceError, StoreError},
   source::{FetchEnvelope, MenuSource},
   store::{ConfigStore, MemoryStore, MenuStore, ResultLog, WriteBatch},
   sync::SyncOptions,
   types::{ExternalMenuRecord, MenuItem, Scope, Source, SyncConfig, SyncResult},
};
use parking_lot::Mutex;

/// What a scripted source does for one restaurant.
#[derive(Debug, Clone)]
pub enum Script {
   Menu(Vec<ExternalMenuRecord>),
   Rejected(String),
   Fails(String),
   Panics,
   Slow(Duration),
}

/// Source double answering from a per-restaurant script.
#[derive(Default)]
pub struct ScriptedSource {
   scripts:   Mutex<HashMap<String, Script>>,
   calls:     AtomicUsize,
   in_flight: AtomicUsize,
   peak:      AtomicUsize,
}

/// Counts one fetch as in flight until dropped, including on timeout.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
   fn enter(in_flight: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
      let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
      peak.fetch_max(now, Ordering::SeqCst);
      Self(in_flight)
   }
}

impl Drop for InFlight<'_> {
   fn drop(&mut self) {
      self.0.fetch_sub(1, Ordering::SeqCst);
   }
}

impl ScriptedSource {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with(self, restaurant_id: &str, script: Script) -> Self {
      self.set(restaurant_id, script);
      self
   }

   pub fn set(&self, restaurant_id: &str, script: Script) {
      self.scripts.lock().insert(restaurant_id.to_string(), script);
   }

   pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
   }

   /// Highest number of fetches that were running at the same time.
   pub fn peak_in_flight(&self) -> usize {
      self.peak.load(Ordering::SeqCst)
   }
}

#[async_trait]
impl MenuSource for ScriptedSource {
   async fn fetch(&self, source: Source, restaurant_id: &str) -> Result<FetchEnvelope> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let _in_flight = InFlight::enter(&self.in_flight, &self.peak);
      let script = self.scripts.lock().get(restaurant_id).cloned();
      match script {
         Some(Script::Menu(records)) => Ok(FetchEnvelope::ok(records)),
         Some(Script::Rejected(message)) => Ok(FetchEnvelope::failed(message)),
         Some(Script::Fails(reason)) => {
            Err(SourceError::Malformed { origin: source, reason }.into())
         },
         Some(Script::Panics) => panic!("source exploded for {restaurant_id}"),
         Some(Script::Slow(delay)) => {
            tokio::time::sleep(delay).await;
            Ok(FetchEnvelope::ok(Vec::new()))
         },
         None => Ok(FetchEnvelope::ok(Vec::new())),
      }
   }
}

/// Memory store with injectable faults.
///
/// Commits start failing after `ok_commits` successes; `lastSync` updates and
/// config lookups for one restaurant can be made to fail or panic.
pub struct FlakyStore {
   pub inner:        MemoryStore,
   ok_commits:       usize,
   commits:          AtomicUsize,
   fail_touch:       bool,
   panic_config_for: Option<String>,
}

impl FlakyStore {
   pub fn new(inner: MemoryStore, ok_commits: usize) -> Self {
      Self {
         inner,
         ok_commits,
         commits: AtomicUsize::new(0),
         fail_touch: false,
         panic_config_for: None,
      }
   }

   /// Store that only misbehaves where a builder method says so.
   pub fn healthy(inner: MemoryStore) -> Self {
      Self::new(inner, usize::MAX)
   }

   pub fn failing_touch(mut self) -> Self {
      self.fail_touch = true;
      self
   }

   pub fn panicking_config_for(mut self, restaurant_id: &str) -> Self {
      self.panic_config_for = Some(restaurant_id.to_string());
      self
   }
}

#[async_trait]
impl ConfigStore for FlakyStore {
   async fn enabled_config(
      &self,
      restaurant_id: &str,
      source: Option<Source>,
   ) -> Result<Option<SyncConfig>> {
      if self.panic_config_for.as_deref() == Some(restaurant_id) {
         panic!("config lookup exploded for {restaurant_id}");
      }
      self.inner.enabled_config(restaurant_id, source).await
   }

   async fn list_enabled_configs(&self) -> Result<Vec<SyncConfig>> {
      self.inner.list_enabled_configs().await
   }

   async fn touch_last_sync(&self, config_id: &str, at: DateTime<Utc>) -> Result<()> {
      if self.fail_touch {
         return Err(StoreError::Rejected("injected lastSync failure".to_string()).into());
      }
      self.inner.touch_last_sync(config_id, at).await
   }
}

#[async_trait]
impl MenuStore for FlakyStore {
   async fn scoped_items(&self, scope: &Scope) -> Result<Vec<MenuItem>> {
      self.inner.scoped_items(scope).await
   }

   fn max_batch_ops(&self) -> usize {
      self.inner.max_batch_ops()
   }

   async fn commit(&self, batch: WriteBatch) -> Result<()> {
      let n = self.commits.fetch_add(1, Ordering::SeqCst);
      if n >= self.ok_commits {
         return Err(StoreError::Rejected("injected commit failure".to_string()).into());
      }
      self.inner.commit(batch).await
   }
}

#[async_trait]
impl ResultLog for FlakyStore {
   async fn append(&self, result: &SyncResult) -> Result<()> {
      self.inner.append(result).await
   }

   async fn recent(&self, restaurant_id: Option<&str>, limit: usize) -> Result<Vec<SyncResult>> {
      self.inner.recent(restaurant_id, limit).await
   }
}

pub fn record(id: &str, price: f64) -> ExternalMenuRecord {
   ExternalMenuRecord::new(id, format!("dish {id}"), price)
}

pub fn synced_item(restaurant_id: &str, source: Source, external_id: &str, price: f64) -> MenuItem {
   let created = Utc::now() - chrono::Duration::days(7);
   MenuItem {
      id: format!("doc-{restaurant_id}-{external_id}"),
      restaurant_id: restaurant_id.to_string(),
      source: Some(source),
      external_id: Some(external_id.to_string()),
      name: format!("dish {external_id}"),
      description: String::new(),
      price,
      category: "Other".to_string(),
      image: None,
      available: true,
      created_at: created,
      updated_at: created,
      synced_at: Some(created),
   }
}

/// Engine options with leases under `lock_dir` and short timeouts.
pub fn options(lock_dir: Option<&std::path::Path>) -> SyncOptions {
   SyncOptions {
      max_concurrent:     2,
      fetch_timeout:      Duration::from_secs(2),
      apply_timeout:      Duration::from_secs(2),
      max_batch_ops:      500,
      lease_ttl:          Duration::from_secs(30),
      lock_dir:           lock_dir.map(std::path::Path::to_path_buf),
      record_skips:       false,
      legacy_id_fallback: false,
   }
}
