//! On-disk JSON document store.
//!
//! Layout under the data directory:
//! - `menu.json`: sync configs and menu items, rewritten atomically on every
//!   mutation (write temp file, rename, fsync the directory)
//! - `results.jsonl`: append-only sync result log, one JSON object per line

use std::{
   fs::{self, OpenOptions},
   io::{BufRead, BufReader, Write},
   path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{ConfigStore, MenuStore, ResultLog, WriteBatch, memory::Documents};
use crate::{
   Result,
   error::StoreError,
   types::{MenuItem, Scope, Source, SyncConfig, SyncResult},
   util::write_atomic,
};

pub const DOCUMENTS_FILE: &str = "menu.json";
pub const RESULTS_FILE: &str = "results.jsonl";
pub const DOCUMENTS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentsFile {
   #[serde(default)]
   schema_version: u32,
   #[serde(default)]
   configs:        Vec<SyncConfig>,
   #[serde(default)]
   items:          Vec<MenuItem>,
}

impl From<DocumentsFile> for Documents {
   fn from(file: DocumentsFile) -> Self {
      Self {
         configs: file.configs,
         items:   file
            .items
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect(),
      }
   }
}

impl From<&Documents> for DocumentsFile {
   fn from(docs: &Documents) -> Self {
      Self {
         schema_version: DOCUMENTS_SCHEMA_VERSION,
         configs:        docs.configs.clone(),
         items:          docs.items.values().cloned().collect(),
      }
   }
}

/// Single-process document store persisted as JSON files.
pub struct FileStore {
   dir:         PathBuf,
   batch_limit: usize,
   docs_lock:   Mutex<()>,
   log_lock:    Mutex<()>,
}

impl FileStore {
   pub fn open(dir: impl Into<PathBuf>, batch_limit: usize) -> Result<Self> {
      let dir = dir.into();
      fs::create_dir_all(&dir)?;
      Ok(Self { dir, batch_limit: batch_limit.max(1), docs_lock: Mutex::new(()), log_lock: Mutex::new(()) })
   }

   pub fn dir(&self) -> &Path {
      &self.dir
   }

   fn documents_path(&self) -> PathBuf {
      self.dir.join(DOCUMENTS_FILE)
   }

   fn results_path(&self) -> PathBuf {
      self.dir.join(RESULTS_FILE)
   }

   fn load(&self) -> Result<Documents> {
      let path = self.documents_path();
      if !path.exists() {
         return Ok(Documents::default());
      }
      let raw = fs::read_to_string(&path)?;
      let file: DocumentsFile = serde_json::from_str(&raw)?;
      Ok(file.into())
   }

   fn save(&self, docs: &Documents) -> Result<()> {
      let data = serde_json::to_vec_pretty(&DocumentsFile::from(docs))?;
      write_atomic(&self.documents_path(), &data)
   }

   fn read<T>(&self, f: impl FnOnce(&Documents) -> T) -> Result<T> {
      let _guard = self.docs_lock.lock();
      Ok(f(&self.load()?))
   }

   fn mutate<T>(&self, f: impl FnOnce(&mut Documents) -> Result<T>) -> Result<T> {
      let _guard = self.docs_lock.lock();
      let mut docs = self.load()?;
      let out = f(&mut docs)?;
      self.save(&docs)?;
      Ok(out)
   }

   /// Adds or replaces a sync config by id.
   pub fn upsert_config(&self, config: SyncConfig) -> Result<()> {
      self.mutate(|docs| {
         docs.configs.retain(|c| c.id != config.id);
         docs.configs.push(config);
         Ok(())
      })
   }

   pub fn configs(&self) -> Result<Vec<SyncConfig>> {
      self.read(|docs| docs.configs.clone())
   }
}

#[async_trait]
impl ConfigStore for FileStore {
   async fn enabled_config(
      &self,
      restaurant_id: &str,
      source: Option<Source>,
   ) -> Result<Option<SyncConfig>> {
      self.read(|docs| docs.enabled_config(restaurant_id, source))
   }

   async fn list_enabled_configs(&self) -> Result<Vec<SyncConfig>> {
      self.read(|docs| docs.configs.iter().filter(|c| c.enabled).cloned().collect())
   }

   async fn touch_last_sync(&self, config_id: &str, at: DateTime<Utc>) -> Result<()> {
      self.mutate(|docs| docs.touch_last_sync(config_id, at))
   }
}

#[async_trait]
impl MenuStore for FileStore {
   async fn scoped_items(&self, scope: &Scope) -> Result<Vec<MenuItem>> {
      self.read(|docs| docs.scoped_items(scope))
   }

   fn max_batch_ops(&self) -> usize {
      self.batch_limit
   }

   async fn commit(&self, batch: WriteBatch) -> Result<()> {
      if batch.len() > self.batch_limit {
         return Err(StoreError::BatchTooLarge { ops: batch.len(), limit: self.batch_limit }.into());
      }
      if batch.is_empty() {
         return Ok(());
      }
      self.mutate(|docs| docs.apply(batch))
   }
}

#[async_trait]
impl ResultLog for FileStore {
   async fn append(&self, result: &SyncResult) -> Result<()> {
      let mut line = serde_json::to_vec(result)?;
      line.push(b'\n');

      let _guard = self.log_lock.lock();
      let mut file = OpenOptions::new()
         .create(true)
         .append(true)
         .open(self.results_path())?;
      file.write_all(&line)?;
      file.sync_data()?;
      Ok(())
   }

   async fn recent(&self, restaurant_id: Option<&str>, limit: usize) -> Result<Vec<SyncResult>> {
      let path = self.results_path();
      let _guard = self.log_lock.lock();
      if !path.exists() {
         return Ok(Vec::new());
      }

      let mut results = Vec::new();
      for (lineno, line) in BufReader::new(fs::File::open(&path)?).lines().enumerate() {
         let line = line?;
         if line.trim().is_empty() {
            continue;
         }
         match serde_json::from_str::<SyncResult>(&line) {
            Ok(result) if restaurant_id.is_none_or(|id| result.restaurant_id == id) => {
               results.push(result);
            },
            Ok(_) => {},
            Err(e) => tracing::warn!("skipping corrupt result log line {}: {e}", lineno + 1),
         }
      }

      results.reverse();
      results.truncate(limit);
      Ok(results)
   }
}
