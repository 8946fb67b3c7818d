use std::io;

use thiserror::Error;

use crate::types::{ApplyCounts, Source};

/// Main error type for menusync.
///
/// Everything that can go wrong while loading configuration, talking to an
/// external menu source, or reading and writing the local store funnels into
/// this enum. The orchestrator never lets one of these escape a single
/// restaurant's run; it converts them into an `error` sync result instead.
#[derive(Debug, Error)]
pub enum Error {
   /// I/O error occurred during file operations.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// Error reported by or about an external menu source.
   #[error("source error: {0}")]
   Source(#[from] SourceError),

   /// Error occurred in the store layer.
   #[error("store error: {0}")]
   Store(#[from] StoreError),

   /// Configuration-related error occurred.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// Sync lease could not be acquired or was lost.
   #[error("lease error: {0}")]
   Lease(#[from] LeaseError),

   /// JSON serialization or deserialization error occurred.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// A suspending operation exceeded its deadline.
   #[error("{op} timed out after {ms}ms")]
   Timeout { op: &'static str, ms: u64 },

   /// Trigger credential missing or wrong.
   #[error("unauthorized: {0}")]
   Unauthorized(&'static str),

   /// Generic operation failure with context.
   #[error("{op} failed: {reason}")]
   Operation { op: &'static str, reason: String },
}

impl Error {
   /// Counts of writes that reached the store before this error, if any.
   pub const fn committed_counts(&self) -> Option<ApplyCounts> {
      match self {
         Self::Store(
            StoreError::PartialCommit { added, updated, removed, .. }
            | StoreError::LastSyncNotRecorded { added, updated, removed, .. },
         ) => Some(ApplyCounts {
            items_added:   *added,
            items_updated: *updated,
            items_removed: *removed,
         }),
         _ => None,
      }
   }

   pub fn exit_code(&self) -> i32 {
      match self {
         Self::Lease(LeaseError::Held { .. }) => 10,
         Self::Timeout { .. } => 11,
         Self::Unauthorized(_) => 13,
         _ => 1,
      }
   }
}

/// Errors produced while fetching a menu snapshot from an external source.
///
/// Any of these turns a run into an adapter-level failure.
#[derive(Debug, Error)]
pub enum SourceError {
   /// The source answered with an envelope whose `success` flag was false.
   #[error("{origin} reported failure: {message}")]
   Rejected { origin: Source, message: String },

   /// No endpoint is configured for the source.
   #[error("no endpoint configured for {0}")]
   NotConfigured(Source),

   /// HTTP request failed (network error, connection refused, etc.).
   #[error("request failed: {0}")]
   Request(#[from] reqwest::Error),

   /// Received a non-success HTTP status code.
   #[error("{origin} returned HTTP {status}")]
   Status { origin: Source, status: u16 },

   /// The payload could not be interpreted.
   #[error("malformed payload from {origin}: {reason}")]
   Malformed { origin: Source, reason: String },
}

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
   /// A referenced record does not exist.
   #[error("{kind} not found: {id}")]
   NotFound { kind: &'static str, id: String },

   /// A batch was larger than the store can commit atomically.
   #[error("batch of {ops} operations exceeds atomic limit of {limit}")]
   BatchTooLarge { ops: usize, limit: usize },

   /// Some chunks of a change set were committed before a later chunk failed.
   #[error(
      "partial commit: {added} added, {updated} updated, {removed} removed before failure: {reason}"
   )]
   PartialCommit { added: usize, updated: usize, removed: usize, reason: String },

   /// The batch landed but the config's `lastSync` could not be advanced.
   #[error(
      "committed {added} added, {updated} updated, {removed} removed but lastSync was not \
       recorded: {reason}"
   )]
   LastSyncNotRecorded { added: usize, updated: usize, removed: usize, reason: String },

   /// Store backend rejected the write.
   #[error("commit rejected: {0}")]
   Rejected(String),
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// A configured value is out of range.
   #[error("invalid config: {0}")]
   Invalid(String),

   /// The layered configuration could not be extracted.
   #[error("failed to extract config: {0}")]
   Extract(#[from] Box<figment::Error>),
}

/// Errors related to per-restaurant sync leases.
#[derive(Debug, Error)]
pub enum LeaseError {
   /// Another run currently holds the lease.
   #[error("sync already in progress for {key}")]
   Held { key: String },

   /// The lease was taken over or removed while held.
   #[error("lease ownership lost for {key}")]
   Lost { key: String },

   /// Timed out waiting for the lease guard file.
   #[error("lease guard timeout for {key}")]
   GuardTimeout { key: String },
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
