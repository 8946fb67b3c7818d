//! Per-(restaurant, source) sync lease (single runner + heartbeat).
//!
//! A run takes the lease after its cadence check and before calling the
//! external source, so two triggers for the same scope cannot race on the
//! batch write. A lease whose heartbeat is older than its TTL is stale and
//! may be taken over; the takeover bumps the epoch so the previous holder
//! notices on its next heartbeat.

use std::{
   fs::{self, OpenOptions},
   path::{Path, PathBuf},
   time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
   Result,
   error::LeaseError,
   types::Scope,
   util::{file_stem, write_atomic},
};

pub const LEASE_SCHEMA_VERSION: u32 = 1;

const GUARD_TIMEOUT: Duration = Duration::from_secs(5);
const GUARD_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncLeaseRecord {
   pub schema_version:    u32,
   pub owner_id:          String,
   pub restaurant_id:     String,
   pub source:            String,
   pub pid:               u32,
   pub started_at:        String,
   pub last_heartbeat_at: String,
   pub lease_epoch:       u64,
   pub lease_ttl_ms:      u64,
}

impl SyncLeaseRecord {
   fn new(scope: &Scope, owner_id: String, lease_epoch: u64, lease_ttl_ms: u64) -> Self {
      let now = timestamp(Utc::now());
      Self {
         schema_version: LEASE_SCHEMA_VERSION,
         owner_id,
         restaurant_id: scope.restaurant_id.clone(),
         source: scope.source.to_string(),
         pid: std::process::id(),
         started_at: now.clone(),
         last_heartbeat_at: now,
         lease_epoch,
         lease_ttl_ms,
      }
   }

   /// Unparseable heartbeats count as stale.
   pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
      DateTime::parse_from_rfc3339(&self.last_heartbeat_at).map_or(true, |beat| {
         now.signed_duration_since(beat).num_milliseconds() > self.lease_ttl_ms as i64
      })
   }
}

/// Lease record and guard file for one scope.
#[derive(Debug, Clone)]
struct LeaseFiles {
   key:    String,
   record: PathBuf,
   guard:  PathBuf,
}

impl LeaseFiles {
   fn new(lock_dir: &Path, scope: &Scope) -> Self {
      // Source names never contain `__`, so the split point is unambiguous.
      let stem = format!("{}__{}", file_stem(&scope.restaurant_id), scope.source);
      Self {
         key:    scope.to_string(),
         record: lock_dir.join(format!("{stem}.lease.json")),
         guard:  lock_dir.join(format!("{stem}.guard.lock")),
      }
   }

   fn read(&self) -> Result<SyncLeaseRecord> {
      Ok(serde_json::from_slice(&fs::read(&self.record)?)?)
   }

   fn write(&self, record: &SyncLeaseRecord) -> Result<()> {
      write_atomic(&self.record, &serde_json::to_vec_pretty(record)?)
   }

   fn ensure_owned(&self, record: &SyncLeaseRecord, owner_id: &str, epoch: u64) -> Result<()> {
      if record.owner_id == owner_id && record.lease_epoch == epoch {
         Ok(())
      } else {
         Err(LeaseError::Lost { key: self.key.clone() }.into())
      }
   }

   async fn heartbeat(&self, owner_id: &str, epoch: u64) -> Result<()> {
      let _guard = LeaseGuard::acquire(&self.guard, &self.key).await?;
      let mut record = self.read()?;
      self.ensure_owned(&record, owner_id, epoch)?;
      record.last_heartbeat_at = timestamp(Utc::now());
      self.write(&record)
   }

   /// Removes the record only while it still names this owner and epoch.
   fn release(&self, owner_id: &str, epoch: u64) {
      let owned = self
         .read()
         .is_ok_and(|record| self.ensure_owned(&record, owner_id, epoch).is_ok());
      if owned {
         let _ = fs::remove_file(&self.record);
      }
   }
}

fn timestamp(at: DateTime<Utc>) -> String {
   at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Held lease; released when dropped.
pub struct SyncLease {
   files:       LeaseFiles,
   owner_id:    String,
   lease_epoch: u64,
   token:       CancellationToken,
   heartbeat:   Option<JoinHandle<()>>,
}

impl SyncLease {
   pub async fn acquire(lock_dir: &Path, scope: &Scope, ttl: Duration) -> Result<Self> {
      let files = LeaseFiles::new(lock_dir, scope);
      let guard = LeaseGuard::acquire(&files.guard, &files.key).await?;

      let previous = files.read().ok();
      if let Some(prev) = &previous {
         if !prev.is_stale(Utc::now()) {
            return Err(LeaseError::Held { key: files.key.clone() }.into());
         }
         tracing::warn!(
            scope = %files.key,
            epoch = prev.lease_epoch,
            holder = %prev.owner_id,
            "taking over stale sync lease"
         );
      }

      let lease_epoch = previous.map_or(1, |prev| prev.lease_epoch + 1);
      let owner_id = Uuid::new_v4().to_string();
      files.write(&SyncLeaseRecord::new(
         scope,
         owner_id.clone(),
         lease_epoch,
         ttl.as_millis() as u64,
      ))?;
      drop(guard);

      let token = CancellationToken::new();
      let heartbeat = tokio::spawn(run_heartbeat(
         files.clone(),
         owner_id.clone(),
         lease_epoch,
         (ttl / 3).max(Duration::from_millis(250)),
         token.clone(),
      ));

      Ok(Self { files, owner_id, lease_epoch, token, heartbeat: Some(heartbeat) })
   }

   pub const fn lease_epoch(&self) -> u64 {
      self.lease_epoch
   }

   pub fn owner_id(&self) -> &str {
      &self.owner_id
   }

   /// Fails if the lease was taken over since it was acquired.
   pub fn verify(&self) -> Result<()> {
      let record = self.files.read()?;
      self.files.ensure_owned(&record, &self.owner_id, self.lease_epoch)
   }
}

impl Drop for SyncLease {
   fn drop(&mut self) {
      self.token.cancel();
      if let Some(handle) = self.heartbeat.take() {
         handle.abort();
      }
      self.files.release(&self.owner_id, self.lease_epoch);
   }
}

async fn run_heartbeat(
   files: LeaseFiles,
   owner_id: String,
   epoch: u64,
   every: Duration,
   token: CancellationToken,
) {
   loop {
      tokio::select! {
         () = token.cancelled() => return,
         () = time::sleep(every) => {},
      }
      if let Err(err) = files.heartbeat(&owner_id, epoch).await {
         tracing::warn!(scope = %files.key, "sync lease heartbeat failed: {err}");
         return;
      }
   }
}

pub fn read_lease_record(lock_dir: &Path, scope: &Scope) -> Result<SyncLeaseRecord> {
   LeaseFiles::new(lock_dir, scope).read()
}

/// Short-lived exclusive file guarding read-modify-write of the lease record.
struct LeaseGuard {
   path: PathBuf,
}

/// Contents of a guard file: who created it and when.
#[derive(Debug, Serialize, Deserialize)]
struct GuardStamp {
   pid:         u32,
   acquired_ms: u64,
}

impl GuardStamp {
   fn now() -> Self {
      let acquired_ms = SystemTime::now()
         .duration_since(UNIX_EPOCH)
         .map_or(0, |d| d.as_millis() as u64);
      Self { pid: std::process::id(), acquired_ms }
   }

   fn read(path: &Path) -> Option<Self> {
      serde_json::from_slice(&fs::read(path).ok()?).ok()
   }

   /// Abandoned guards are reclaimed once older than [`GUARD_TTL`] unless
   /// their creator is another process that is still running.
   fn is_abandoned(path: &Path) -> bool {
      let owner_running = Self::read(path)
         .is_some_and(|stamp| stamp.pid != std::process::id() && pid_is_alive(stamp.pid));
      if owner_running {
         return false;
      }
      fs::metadata(path)
         .and_then(|m| m.modified())
         .ok()
         .and_then(|mtime| mtime.elapsed().ok())
         .is_none_or(|age| age > GUARD_TTL)
   }
}

impl LeaseGuard {
   async fn acquire(path: &Path, key: &str) -> Result<Self> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let deadline = time::Instant::now() + GUARD_TIMEOUT;
      loop {
         match OpenOptions::new().create_new(true).write(true).open(path) {
            Ok(file) => {
               if let Err(err) = serde_json::to_writer(&file, &GuardStamp::now()) {
                  tracing::debug!(scope = key, "failed to stamp lease guard: {err}");
               }
               return Ok(Self { path: path.to_path_buf() });
            },
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
               if GuardStamp::is_abandoned(path) {
                  tracing::debug!(scope = key, "reclaiming abandoned lease guard");
                  let _ = fs::remove_file(path);
                  continue;
               }
               if time::Instant::now() >= deadline {
                  return Err(LeaseError::GuardTimeout { key: key.to_string() }.into());
               }
               time::sleep(Duration::from_millis(25)).await;
            },
            Err(e) => return Err(e.into()),
         }
      }
   }
}

impl Drop for LeaseGuard {
   fn drop(&mut self) {
      let _ = fs::remove_file(&self.path);
   }
}

#[cfg(target_os = "linux")]
fn pid_is_alive(pid: u32) -> bool {
   let Ok(pid) = libc::pid_t::try_from(pid) else {
      return false;
   };
   // SAFETY: signal 0 only checks that the process exists.
   match unsafe { libc::kill(pid, 0) } {
      0 => true,
      _ => std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM),
   }
}

#[cfg(not(target_os = "linux"))]
fn pid_is_alive(_pid: u32) -> bool {
   false
}
