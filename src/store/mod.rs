//! Persistence abstraction for sync configs, menu items and the result log.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use self::{file::FileStore, memory::MemoryStore};
use crate::{
   Result,
   types::{MenuItem, Scope, Source, SyncConfig, SyncResult},
};

/// A single write inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
   Insert(MenuItem),
   Update(MenuItem),
   Delete { id: String },
}

impl WriteOp {
   pub fn item_id(&self) -> &str {
      match self {
         Self::Insert(item) | Self::Update(item) => &item.id,
         Self::Delete { id } => id,
      }
   }
}

/// Operations committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
   pub ops: Vec<WriteOp>,
}

impl WriteBatch {
   pub fn len(&self) -> usize {
      self.ops.len()
   }

   pub fn is_empty(&self) -> bool {
      self.ops.is_empty()
   }
}

/// Read and `lastSync` bookkeeping for sync configurations.
#[async_trait]
pub trait ConfigStore: Send + Sync {
   /// First enabled config for the restaurant, optionally narrowed by source.
   async fn enabled_config(
      &self,
      restaurant_id: &str,
      source: Option<Source>,
   ) -> Result<Option<SyncConfig>>;

   async fn list_enabled_configs(&self) -> Result<Vec<SyncConfig>>;

   async fn touch_last_sync(&self, config_id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Scoped reads and atomic batched writes over menu items.
#[async_trait]
pub trait MenuStore: Send + Sync {
   /// Items owned by the scope; items without a source are never returned.
   async fn scoped_items(&self, scope: &Scope) -> Result<Vec<MenuItem>>;

   /// Largest batch this store commits atomically.
   fn max_batch_ops(&self) -> usize;

   async fn commit(&self, batch: WriteBatch) -> Result<()>;

   /// Stamps `external_id = id` on scoped items that have none.
   async fn backfill_external_ids(&self, scope: &Scope) -> Result<usize> {
      let ops: Vec<WriteOp> = self
         .scoped_items(scope)
         .await?
         .into_iter()
         .filter(|item| item.external_id.as_deref().is_none_or(str::is_empty))
         .map(|mut item| {
            item.external_id = Some(item.id.clone());
            WriteOp::Update(item)
         })
         .collect();
      let count = ops.len();
      for chunk in ops.chunks(self.max_batch_ops().max(1)) {
         self.commit(WriteBatch { ops: chunk.to_vec() }).await?;
      }
      Ok(count)
   }
}

/// Append-only audit trail of sync runs.
#[async_trait]
pub trait ResultLog: Send + Sync {
   async fn append(&self, result: &SyncResult) -> Result<()>;

   /// Most recent results first, optionally for one restaurant.
   async fn recent(&self, restaurant_id: Option<&str>, limit: usize) -> Result<Vec<SyncResult>>;
}

/// Everything the sync engine needs from persistence.
pub trait Store: ConfigStore + MenuStore + ResultLog {}

impl<T: ConfigStore + MenuStore + ResultLog> Store for T {}

#[async_trait]
impl<T: ConfigStore + ?Sized> ConfigStore for std::sync::Arc<T> {
   async fn enabled_config(
      &self,
      restaurant_id: &str,
      source: Option<Source>,
   ) -> Result<Option<SyncConfig>> {
      (**self).enabled_config(restaurant_id, source).await
   }

   async fn list_enabled_configs(&self) -> Result<Vec<SyncConfig>> {
      (**self).list_enabled_configs().await
   }

   async fn touch_last_sync(&self, config_id: &str, at: DateTime<Utc>) -> Result<()> {
      (**self).touch_last_sync(config_id, at).await
   }
}

#[async_trait]
impl<T: MenuStore + ?Sized> MenuStore for std::sync::Arc<T> {
   async fn scoped_items(&self, scope: &Scope) -> Result<Vec<MenuItem>> {
      (**self).scoped_items(scope).await
   }

   fn max_batch_ops(&self) -> usize {
      (**self).max_batch_ops()
   }

   async fn commit(&self, batch: WriteBatch) -> Result<()> {
      (**self).commit(batch).await
   }

   async fn backfill_external_ids(&self, scope: &Scope) -> Result<usize> {
      (**self).backfill_external_ids(scope).await
   }
}

#[async_trait]
impl<T: ResultLog + ?Sized> ResultLog for std::sync::Arc<T> {
   async fn append(&self, result: &SyncResult) -> Result<()> {
      (**self).append(result).await
   }

   async fn recent(&self, restaurant_id: Option<&str>, limit: usize) -> Result<Vec<SyncResult>> {
      (**self).recent(restaurant_id, limit).await
   }
}
