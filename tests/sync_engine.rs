mod support;

use std::{
   sync::Arc,
   time::{Duration, Instant},
};

use chrono::Utc;
use menusync::{
   lease::SyncLease,
   store::MemoryStore,
   sync::SyncEngine,
   types::{ExternalMenuRecord, MenuItem, Scope, Source, SyncConfig, SyncStatus},
};
use support::{FlakyStore, Script, ScriptedSource, options, record, synced_item};
use tempfile::TempDir;

fn store_with(configs: &[SyncConfig]) -> Arc<MemoryStore> {
   let store = Arc::new(MemoryStore::new());
   for cfg in configs {
      store.insert_config(cfg.clone());
   }
   store
}

fn recently_synced(restaurant_id: &str, source: Source) -> SyncConfig {
   let mut cfg = SyncConfig::new(restaurant_id, source, 24);
   cfg.last_sync = Some(Utc::now() - chrono::Duration::hours(1));
   cfg
}

#[tokio::test]
async fn first_sync_creates_items_and_logs_success() {
   let cfg = SyncConfig::new("r1", Source::Documenu, 24);
   let store = store_with(&[cfg.clone()]);
   let source = ScriptedSource::new().with("r1", Script::Menu(vec![record("A", 10.0), record("B", 5.0)]));
   let engine = SyncEngine::new(source, Arc::clone(&store), options(None));

   let result = engine.sync_restaurant("r1", None, false).await;

   assert_eq!(result.status, SyncStatus::Success);
   assert_eq!((result.items_added, result.items_updated, result.items_removed), (2, 0, 0));
   assert_eq!(result.source, Some(Source::Documenu));
   assert_eq!(store.items().len(), 2);
   assert_eq!(store.results(), vec![result]);
   assert!(store.configs()[0].last_sync.is_some());
}

#[tokio::test]
async fn unchanged_snapshot_only_restamps_on_second_run() {
   let store = store_with(&[SyncConfig::new("r1", Source::Yelp, 24)]);
   let source = ScriptedSource::new().with("r1", Script::Menu(vec![record("A", 1.0), record("B", 2.0)]));
   let engine = SyncEngine::new(source, Arc::clone(&store), options(None));

   engine.sync_restaurant("r1", None, false).await;
   let ids_before: Vec<String> = store.items().into_iter().map(|i| i.id).collect();
   let second = engine.sync_restaurant("r1", None, true).await;

   assert_eq!(second.status, SyncStatus::Success);
   assert_eq!((second.items_added, second.items_updated, second.items_removed), (0, 2, 0));
   let ids_after: Vec<String> = store.items().into_iter().map(|i| i.id).collect();
   assert_eq!(ids_before, ids_after);
}

#[tokio::test]
async fn price_change_new_item_and_removal() {
   let store = store_with(&[SyncConfig::new("r1", Source::Documenu, 24)]);
   store.insert_item(synced_item("r1", Source::Documenu, "A", 10.0));
   store.insert_item(synced_item("r1", Source::Documenu, "C", 7.0));
   let source = ScriptedSource::new().with("r1", Script::Menu(vec![record("A", 12.0), record("B", 5.0)]));
   let engine = SyncEngine::new(source, Arc::clone(&store), options(None));

   let result = engine.sync_restaurant("r1", None, false).await;

   assert_eq!((result.items_added, result.items_updated, result.items_removed), (1, 1, 1));
   let mut prices: Vec<(String, f64)> = store
      .items()
      .into_iter()
      .map(|i| (i.external_id.unwrap_or_default(), i.price))
      .collect();
   prices.sort_by(|a, b| a.0.cmp(&b.0));
   assert_eq!(prices, vec![("A".to_string(), 12.0), ("B".to_string(), 5.0)]);
}

#[tokio::test]
async fn not_due_is_skipped_without_logging_and_force_bypasses() {
   let store = store_with(&[recently_synced("r1", Source::Documenu)]);
   let source = Arc::new(ScriptedSource::new().with("r1", Script::Menu(vec![record("A", 1.0)])));
   let engine = SyncEngine::new(Arc::clone(&source), Arc::clone(&store), options(None));

   let skipped = engine.sync_restaurant("r1", None, false).await;
   assert_eq!(skipped.status, SyncStatus::Skipped);
   assert!(skipped.error.as_deref().unwrap_or_default().contains("not due"));
   assert_eq!(source.calls(), 0);
   assert!(store.results().is_empty());

   let forced = engine.sync_restaurant("r1", None, true).await;
   assert_eq!(forced.status, SyncStatus::Success);
   assert_eq!(source.calls(), 1);
   assert_eq!(store.results().len(), 1);
}

#[tokio::test]
async fn missing_config_is_a_silent_skip() {
   let store = store_with(&[]);
   let engine = SyncEngine::new(ScriptedSource::new(), Arc::clone(&store), options(None));

   let result = engine.sync_restaurant("nobody", None, true).await;

   assert_eq!(result.status, SyncStatus::Skipped);
   assert!(result.error.is_some());
   assert!(store.results().is_empty());
}

#[tokio::test]
async fn record_skips_appends_skips_to_the_log() {
   let store = store_with(&[recently_synced("r1", Source::Zomato)]);
   let mut opts = options(None);
   opts.record_skips = true;
   let engine = SyncEngine::new(ScriptedSource::new(), Arc::clone(&store), opts);

   engine.sync_restaurant("r1", None, false).await;

   let results = store.results();
   assert_eq!(results.len(), 1);
   assert_eq!(results[0].status, SyncStatus::Skipped);
}

#[tokio::test]
async fn rejected_fetch_is_logged_as_error_and_keeps_last_sync() {
   let store = store_with(&[SyncConfig::new("r1", Source::Yelp, 24)]);
   store.insert_item(synced_item("r1", Source::Yelp, "A", 3.0));
   let source = ScriptedSource::new().with("r1", Script::Rejected("quota exceeded".to_string()));
   let engine = SyncEngine::new(source, Arc::clone(&store), options(None));

   let result = engine.sync_restaurant("r1", None, false).await;

   assert_eq!(result.status, SyncStatus::Error);
   assert_eq!((result.items_added, result.items_updated, result.items_removed), (0, 0, 0));
   assert!(result.error.as_deref().unwrap_or_default().contains("quota exceeded"));
   assert_eq!(store.results(), vec![result]);
   assert!(store.configs()[0].last_sync.is_none());
   assert_eq!(store.items().len(), 1);
}

#[tokio::test]
async fn panicking_source_is_contained() {
   let store = store_with(&[SyncConfig::new("r1", Source::Documenu, 24)]);
   let source = ScriptedSource::new().with("r1", Script::Panics);
   let engine = SyncEngine::new(source, Arc::clone(&store), options(None));

   let result = engine.sync_restaurant("r1", None, false).await;

   assert_eq!(result.status, SyncStatus::Error);
   assert!(result.error.as_deref().unwrap_or_default().contains("source exploded"));
   assert_eq!(store.results().len(), 1);
}

#[tokio::test]
async fn slow_fetch_times_out() {
   let store = store_with(&[SyncConfig::new("r1", Source::Documenu, 24)]);
   let source = ScriptedSource::new().with("r1", Script::Slow(Duration::from_millis(500)));
   let mut opts = options(None);
   opts.fetch_timeout = Duration::from_millis(20);
   let engine = SyncEngine::new(source, Arc::clone(&store), opts);

   let result = engine.sync_restaurant("r1", None, false).await;

   assert_eq!(result.status, SyncStatus::Error);
   assert!(result.error.as_deref().unwrap_or_default().contains("timed out"));
}

#[tokio::test]
async fn failed_commit_is_an_error_and_keeps_last_sync() {
   let inner = MemoryStore::new();
   inner.insert_config(SyncConfig::new("r1", Source::Documenu, 24));
   let store = Arc::new(FlakyStore::new(inner, 0));
   let source = ScriptedSource::new().with("r1", Script::Menu(vec![record("A", 1.0)]));
   let engine = SyncEngine::new(source, Arc::clone(&store), options(None));

   let result = engine.sync_restaurant("r1", None, false).await;

   assert_eq!(result.status, SyncStatus::Error);
   assert!(store.inner.items().is_empty());
   assert!(store.inner.configs()[0].last_sync.is_none());
   assert_eq!(store.inner.results().len(), 1);
}

#[tokio::test]
async fn sync_all_isolates_a_failing_restaurant() {
   let store = store_with(&[
      SyncConfig::new("r1", Source::Documenu, 24),
      SyncConfig::new("r2", Source::Documenu, 24),
      recently_synced("r3", Source::Yelp),
   ]);
   let source = ScriptedSource::new()
      .with("r1", Script::Menu(vec![record("A", 1.0)]))
      .with("r2", Script::Fails("connection reset".to_string()))
      .with("r3", Script::Menu(vec![record("Z", 1.0)]));
   let engine = SyncEngine::new(source, Arc::clone(&store), options(None));

   let results = engine.sync_all(false).await.expect("configs listed");

   let statuses: Vec<(String, SyncStatus)> = results
      .iter()
      .map(|r| (r.restaurant_id.clone(), r.status))
      .collect();
   assert_eq!(statuses, vec![
      ("r1".to_string(), SyncStatus::Success),
      ("r2".to_string(), SyncStatus::Error),
      ("r3".to_string(), SyncStatus::Skipped),
   ]);
   // Only the two executed runs are logged.
   assert_eq!(store.results().len(), 2);
}

#[tokio::test]
async fn sync_all_with_panicking_restaurant_still_returns_every_result() {
   let store = store_with(&[
      SyncConfig::new("r1", Source::Documenu, 24),
      SyncConfig::new("r2", Source::Zomato, 24),
      SyncConfig::new("r3", Source::Yelp, 24),
   ]);
   let source = ScriptedSource::new().with("r2", Script::Panics);
   let engine = SyncEngine::new(source, Arc::clone(&store), options(None));

   let results = engine.sync_all(true).await.expect("configs listed");

   assert_eq!(results.len(), 3);
   assert_eq!(results[1].status, SyncStatus::Error);
   assert_eq!(results[0].status, SyncStatus::Success);
   assert_eq!(results[2].status, SyncStatus::Success);
}

#[tokio::test]
async fn held_lease_skips_the_run() {
   let locks = TempDir::new().expect("lock dir");
   let store = store_with(&[SyncConfig::new("r1", Source::Documenu, 24)]);
   let source = Arc::new(ScriptedSource::new().with("r1", Script::Menu(vec![record("A", 1.0)])));
   let engine =
      SyncEngine::new(Arc::clone(&source), Arc::clone(&store), options(Some(locks.path())));

   let scope = Scope::new("r1", Source::Documenu);
   let held = SyncLease::acquire(locks.path(), &scope, Duration::from_secs(30))
      .await
      .expect("lease acquired");

   let blocked = engine.sync_restaurant("r1", None, false).await;
   assert_eq!(blocked.status, SyncStatus::Skipped);
   assert!(blocked.error.as_deref().unwrap_or_default().contains("already in progress"));
   assert_eq!(source.calls(), 0);

   drop(held);
   let after = engine.sync_restaurant("r1", None, false).await;
   assert_eq!(after.status, SyncStatus::Success);
}

#[tokio::test]
async fn manual_items_and_other_sources_are_untouched() {
   let store = store_with(&[
      SyncConfig::new("r1", Source::Documenu, 24),
      SyncConfig::new("r1", Source::Yelp, 24),
   ]);
   let mut manual: MenuItem = synced_item("r1", Source::Documenu, "M", 9.0);
   manual.id = "manual".to_string();
   manual.source = None;
   store.insert_item(manual);
   store.insert_item(synced_item("r1", Source::Documenu, "D", 1.0));
   store.insert_item(synced_item("r1", Source::Yelp, "Y", 1.0));
   let engine = SyncEngine::new(ScriptedSource::new(), Arc::clone(&store), options(None));

   let result = engine.sync_restaurant("r1", Some(Source::Yelp), false).await;

   assert_eq!(result.source, Some(Source::Yelp));
   assert_eq!(result.items_removed, 1);
   let mut remaining: Vec<String> = store.items().into_iter().map(|i| i.id).collect();
   remaining.sort();
   assert_eq!(remaining, vec!["doc-r1-D".to_string(), "manual".to_string()]);
}

#[tokio::test]
async fn blank_external_id_never_creates_items() {
   let store = store_with(&[SyncConfig::new("r1", Source::Documenu, 24)]);
   let source = ScriptedSource::new().with(
      "r1",
      Script::Menu(vec![record("A", 1.0), ExternalMenuRecord::new("  ", "ghost", 1.0)]),
   );
   let engine = SyncEngine::new(source, Arc::clone(&store), options(None));

   for _ in 0..3 {
      let result = engine.sync_restaurant("r1", None, true).await;
      assert_eq!(result.status, SyncStatus::Error);
      assert!(result.error.as_deref().unwrap_or_default().contains("blank external id"));
   }

   assert!(store.items().is_empty());
   assert!(store.configs()[0].last_sync.is_none());
}

#[tokio::test]
async fn panicking_config_lookup_is_contained() {
   let inner = MemoryStore::new();
   for id in ["r1", "r2", "r3"] {
      inner.insert_config(SyncConfig::new(id, Source::Documenu, 24));
   }
   let store = Arc::new(FlakyStore::healthy(inner).panicking_config_for("r2"));
   let engine = SyncEngine::new(ScriptedSource::new(), Arc::clone(&store), options(None));

   let single = engine.sync_restaurant("r2", Some(Source::Documenu), true).await;
   assert_eq!(single.status, SyncStatus::Error);
   assert_eq!(single.source, Some(Source::Documenu));
   assert!(single.error.as_deref().unwrap_or_default().contains("config lookup exploded"));

   let results = engine.sync_all(true).await.expect("configs listed");
   let statuses: Vec<SyncStatus> = results.iter().map(|r| r.status).collect();
   assert_eq!(statuses, vec![SyncStatus::Success, SyncStatus::Error, SyncStatus::Success]);
   assert_eq!(results[1].restaurant_id, "r2");
}

#[tokio::test]
async fn sync_all_never_exceeds_the_concurrency_limit() {
   let ids = ["r1", "r2", "r3", "r4", "r5"];
   let configs: Vec<SyncConfig> =
      ids.iter().map(|id| SyncConfig::new(*id, Source::Yelp, 24)).collect();
   let store = store_with(&configs);
   let source = Arc::new(ScriptedSource::new());
   for id in ids {
      source.set(id, Script::Slow(Duration::from_millis(100)));
   }
   let engine = SyncEngine::new(Arc::clone(&source), Arc::clone(&store), options(None));

   let results = engine.sync_all(false).await.expect("configs listed");

   assert_eq!(results.len(), 5);
   assert!(results.iter().all(|r| r.status == SyncStatus::Success));
   assert_eq!(source.calls(), 5);
   assert_eq!(source.peak_in_flight(), 2);
}

#[tokio::test]
async fn slow_restaurant_does_not_hold_back_the_others() {
   let configs: Vec<SyncConfig> = ["r1", "r2", "r3", "r4", "r5"]
      .iter()
      .map(|id| SyncConfig::new(*id, Source::Zomato, 24))
      .collect();
   let store = store_with(&configs);
   let source = ScriptedSource::new().with("r1", Script::Slow(Duration::from_secs(10)));
   for id in ["r2", "r3", "r4", "r5"] {
      source.set(id, Script::Slow(Duration::from_millis(50)));
   }
   let mut opts = options(None);
   opts.fetch_timeout = Duration::from_secs(1);
   let engine = SyncEngine::new(source, Arc::clone(&store), opts);

   let started = Utc::now();
   let clock = Instant::now();
   let results = engine.sync_all(true).await.expect("configs listed");
   let elapsed = clock.elapsed();

   let order: Vec<&str> = results.iter().map(|r| r.restaurant_id.as_str()).collect();
   assert_eq!(order, vec!["r1", "r2", "r3", "r4", "r5"]);
   assert_eq!(results[0].status, SyncStatus::Error);
   assert!(results[0].error.as_deref().unwrap_or_default().contains("timed out"));
   for fast in &results[1..] {
      assert_eq!(fast.status, SyncStatus::Success);
      let finished_after = fast.timestamp - started;
      assert!(
         finished_after < chrono::Duration::milliseconds(700),
         "{} finished {finished_after} after start",
         fast.restaurant_id
      );
   }
   assert!(elapsed < Duration::from_secs(3), "sync_all took {elapsed:?}");
}

#[tokio::test]
async fn failed_last_sync_update_reports_committed_counts() {
   let inner = MemoryStore::new();
   inner.insert_config(SyncConfig::new("r1", Source::Documenu, 24));
   let store = Arc::new(FlakyStore::healthy(inner).failing_touch());
   let source = ScriptedSource::new().with("r1", Script::Menu(vec![record("A", 4.0)]));
   let engine = SyncEngine::new(source, Arc::clone(&store), options(None));

   let result = engine.sync_restaurant("r1", None, false).await;

   assert_eq!(result.status, SyncStatus::Error);
   assert_eq!((result.items_added, result.items_updated, result.items_removed), (1, 0, 0));
   assert!(result.error.as_deref().unwrap_or_default().contains("lastSync was not recorded"));
   assert_eq!(store.inner.items().len(), 1);
   assert!(store.inner.configs()[0].last_sync.is_none());
   assert_eq!(store.inner.results(), vec![result]);
}
