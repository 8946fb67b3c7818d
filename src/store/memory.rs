//! In-process store backed by `parking_lot` locks.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{ConfigStore, MenuStore, ResultLog, WriteBatch, WriteOp};
use crate::{
   Result,
   error::StoreError,
   types::{MenuItem, Scope, Source, SyncConfig, SyncResult},
};

pub const DEFAULT_BATCH_LIMIT: usize = 500;

#[derive(Debug, Default, Clone)]
pub(crate) struct Documents {
   pub configs: Vec<SyncConfig>,
   pub items:   BTreeMap<String, MenuItem>,
}

impl Documents {
   pub fn enabled_config(&self, restaurant_id: &str, source: Option<Source>) -> Option<SyncConfig> {
      let mut matches = self.configs.iter().filter(|cfg| {
         cfg.enabled
            && cfg.restaurant_id == restaurant_id
            && source.is_none_or(|s| cfg.source == s)
      });
      let first = matches.next().cloned();
      if first.is_some() && matches.next().is_some() {
         tracing::warn!(restaurant_id, ?source, "multiple enabled sync configs, using the first");
      }
      first
   }

   pub fn touch_last_sync(&mut self, config_id: &str, at: DateTime<Utc>) -> Result<()> {
      let cfg = self
         .configs
         .iter_mut()
         .find(|cfg| cfg.id == config_id)
         .ok_or_else(|| StoreError::NotFound { kind: "sync config", id: config_id.to_string() })?;
      cfg.last_sync = Some(at);
      Ok(())
   }

   pub fn scoped_items(&self, scope: &Scope) -> Vec<MenuItem> {
      self
         .items
         .values()
         .filter(|item| item.in_scope(scope))
         .cloned()
         .collect()
   }

   /// Checks every op before touching anything so a bad op rejects the batch.
   pub fn apply(&mut self, batch: WriteBatch) -> Result<()> {
      for op in &batch.ops {
         let exists = self.items.contains_key(op.item_id());
         match op {
            WriteOp::Insert(item) if exists => {
               return Err(StoreError::Rejected(format!("item {} already exists", item.id)).into());
            },
            WriteOp::Update(_) | WriteOp::Delete { .. } if !exists => {
               return Err(StoreError::NotFound { kind: "menu item", id: op.item_id().to_string() }
                  .into());
            },
            _ => {},
         }
      }

      for op in batch.ops {
         match op {
            WriteOp::Insert(item) | WriteOp::Update(item) => {
               self.items.insert(item.id.clone(), item);
            },
            WriteOp::Delete { id } => {
               self.items.remove(&id);
            },
         }
      }
      Ok(())
   }
}

/// Store that keeps everything in memory.
///
/// Commits are atomic under a single write lock.
#[derive(Debug)]
pub struct MemoryStore {
   docs:        RwLock<Documents>,
   results:     RwLock<Vec<SyncResult>>,
   batch_limit: usize,
}

impl Default for MemoryStore {
   fn default() -> Self {
      Self::new()
   }
}

impl MemoryStore {
   pub fn new() -> Self {
      Self::with_batch_limit(DEFAULT_BATCH_LIMIT)
   }

   pub fn with_batch_limit(batch_limit: usize) -> Self {
      Self {
         docs: RwLock::new(Documents::default()),
         results: RwLock::new(Vec::new()),
         batch_limit: batch_limit.max(1),
      }
   }

   pub fn insert_config(&self, config: SyncConfig) {
      self.docs.write().configs.push(config);
   }

   pub fn insert_item(&self, item: MenuItem) {
      self.docs.write().items.insert(item.id.clone(), item);
   }

   pub fn configs(&self) -> Vec<SyncConfig> {
      self.docs.read().configs.clone()
   }

   pub fn items(&self) -> Vec<MenuItem> {
      self.docs.read().items.values().cloned().collect()
   }

   pub fn results(&self) -> Vec<SyncResult> {
      self.results.read().clone()
   }
}

#[async_trait]
impl ConfigStore for MemoryStore {
   async fn enabled_config(
      &self,
      restaurant_id: &str,
      source: Option<Source>,
   ) -> Result<Option<SyncConfig>> {
      Ok(self.docs.read().enabled_config(restaurant_id, source))
   }

   async fn list_enabled_configs(&self) -> Result<Vec<SyncConfig>> {
      Ok(self
         .docs
         .read()
         .configs
         .iter()
         .filter(|cfg| cfg.enabled)
         .cloned()
         .collect())
   }

   async fn touch_last_sync(&self, config_id: &str, at: DateTime<Utc>) -> Result<()> {
      self.docs.write().touch_last_sync(config_id, at)
   }
}

#[async_trait]
impl MenuStore for MemoryStore {
   async fn scoped_items(&self, scope: &Scope) -> Result<Vec<MenuItem>> {
      Ok(self.docs.read().scoped_items(scope))
   }

   fn max_batch_ops(&self) -> usize {
      self.batch_limit
   }

   async fn commit(&self, batch: WriteBatch) -> Result<()> {
      if batch.len() > self.batch_limit {
         return Err(StoreError::BatchTooLarge { ops: batch.len(), limit: self.batch_limit }.into());
      }
      self.docs.write().apply(batch)
   }
}

#[async_trait]
impl ResultLog for MemoryStore {
   async fn append(&self, result: &SyncResult) -> Result<()> {
      self.results.write().push(result.clone());
      Ok(())
   }

   async fn recent(&self, restaurant_id: Option<&str>, limit: usize) -> Result<Vec<SyncResult>> {
      Ok(self
         .results
         .read()
         .iter()
         .rev()
         .filter(|r| restaurant_id.is_none_or(|id| r.restaurant_id == id))
         .take(limit)
         .cloned()
         .collect())
   }
}
