//! Core data model shared by the reconciler, the stores and the orchestrator.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// External system a restaurant's menu is pulled from.
#[derive(
   Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Source {
   Documenu,
   Yelp,
   Zomato,
}

impl Source {
   pub const ALL: [Self; 3] = [Self::Documenu, Self::Yelp, Self::Zomato];

   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Documenu => "documenu",
         Self::Yelp => "yelp",
         Self::Zomato => "zomato",
      }
   }
}

impl fmt::Display for Source {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

impl FromStr for Source {
   type Err = ConfigError;

   fn from_str(s: &str) -> Result<Self, Self::Err> {
      Self::ALL
         .into_iter()
         .find(|source| source.as_str().eq_ignore_ascii_case(s))
         .ok_or_else(|| ConfigError::Invalid(format!("unknown source '{s}'")))
   }
}

/// Per-(restaurant, source) sync settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
   pub id:                  String,
   pub restaurant_id:       String,
   pub source:              Source,
   pub enabled:             bool,
   pub sync_interval_hours: u32,
   #[serde(default)]
   pub last_sync:           Option<DateTime<Utc>>,
   /// Reserved; not consulted by the engine yet.
   #[serde(default)]
   pub auto_update:         bool,
}

impl SyncConfig {
   pub fn new(restaurant_id: impl Into<String>, source: Source, sync_interval_hours: u32) -> Self {
      Self {
         id: uuid::Uuid::new_v4().to_string(),
         restaurant_id: restaurant_id.into(),
         source,
         enabled: true,
         sync_interval_hours,
         last_sync: None,
         auto_update: false,
      }
   }

   pub fn scope(&self) -> Scope {
      Scope::new(self.restaurant_id.clone(), self.source)
   }
}

/// One menu entry as reported by an external source, after field mapping.
///
/// Never persisted directly; the reconciler turns it into a [`MenuItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMenuRecord {
   pub external_id: String,
   pub name:        String,
   pub description: String,
   pub price:       f64,
   pub category:    String,
   pub image:       Option<String>,
   pub available:   bool,
}

pub const DEFAULT_CATEGORY: &str = "Other";

impl ExternalMenuRecord {
   pub fn new(external_id: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
      Self {
         external_id: external_id.into(),
         name: name.into(),
         description: String::new(),
         price,
         category: DEFAULT_CATEGORY.to_string(),
         image: None,
         available: true,
      }
   }
}

/// Persisted menu item.
///
/// Items with `source == None` belong to the manual menu editor and are never
/// visible to sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
   pub id:            String,
   pub restaurant_id: String,
   #[serde(default)]
   pub source:        Option<Source>,
   #[serde(default)]
   pub external_id:   Option<String>,
   pub name:          String,
   #[serde(default)]
   pub description:   String,
   pub price:         f64,
   pub category:      String,
   #[serde(default)]
   pub image:         Option<String>,
   pub available:     bool,
   pub created_at:    DateTime<Utc>,
   pub updated_at:    DateTime<Utc>,
   #[serde(default)]
   pub synced_at:     Option<DateTime<Utc>>,
}

impl MenuItem {
   pub fn in_scope(&self, scope: &Scope) -> bool {
      self.restaurant_id == scope.restaurant_id && self.source == Some(scope.source)
   }
}

/// The (restaurant, source) pair that owns a slice of the menu.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
   pub restaurant_id: String,
   pub source:        Source,
}

impl Scope {
   pub fn new(restaurant_id: impl Into<String>, source: Source) -> Self {
      Self { restaurant_id: restaurant_id.into(), source }
   }
}

impl fmt::Display for Scope {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}/{}", self.restaurant_id, self.source)
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
   Success,
   Error,
   Skipped,
}

impl SyncStatus {
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Success => "success",
         Self::Error => "error",
         Self::Skipped => "skipped",
      }
   }
}

/// Audit record of one sync attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
   pub restaurant_id: String,
   pub source:        Option<Source>,
   pub status:        SyncStatus,
   pub items_added:   usize,
   pub items_updated: usize,
   pub items_removed: usize,
   #[serde(default)]
   pub error:         Option<String>,
   pub timestamp:     DateTime<Utc>,
}

impl SyncResult {
   pub fn success(scope: &Scope, counts: ApplyCounts, timestamp: DateTime<Utc>) -> Self {
      Self {
         restaurant_id: scope.restaurant_id.clone(),
         source: Some(scope.source),
         status: SyncStatus::Success,
         items_added: counts.items_added,
         items_updated: counts.items_updated,
         items_removed: counts.items_removed,
         error: None,
         timestamp,
      }
   }

   pub fn error(
      restaurant_id: &str,
      source: Option<Source>,
      message: impl Into<String>,
      timestamp: DateTime<Utc>,
   ) -> Self {
      Self::empty(restaurant_id, source, SyncStatus::Error, message.into(), timestamp)
   }

   pub fn skipped(
      restaurant_id: &str,
      source: Option<Source>,
      reason: impl Into<String>,
      timestamp: DateTime<Utc>,
   ) -> Self {
      Self::empty(restaurant_id, source, SyncStatus::Skipped, reason.into(), timestamp)
   }

   /// Records writes that landed even though the run failed.
   pub fn with_counts(mut self, counts: ApplyCounts) -> Self {
      self.items_added = counts.items_added;
      self.items_updated = counts.items_updated;
      self.items_removed = counts.items_removed;
      self
   }

   fn empty(
      restaurant_id: &str,
      source: Option<Source>,
      status: SyncStatus,
      message: String,
      timestamp: DateTime<Utc>,
   ) -> Self {
      Self {
         restaurant_id: restaurant_id.to_string(),
         source,
         status,
         items_added: 0,
         items_updated: 0,
         items_removed: 0,
         error: Some(message),
         timestamp,
      }
   }
}

/// Number of operations included in each part of a committed change set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCounts {
   pub items_added:   usize,
   pub items_updated: usize,
   pub items_removed: usize,
}

impl ApplyCounts {
   pub const fn total(&self) -> usize {
      self.items_added + self.items_updated + self.items_removed
   }
}

/// Outcome tally over a batch of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
   pub total:   usize,
   pub success: usize,
   pub error:   usize,
   pub skipped: usize,
}

impl SyncSummary {
   pub fn from_results(results: &[SyncResult]) -> Self {
      results.iter().fold(Self::default(), |mut acc, result| {
         acc.total += 1;
         match result.status {
            SyncStatus::Success => acc.success += 1,
            SyncStatus::Error => acc.error += 1,
            SyncStatus::Skipped => acc.skipped += 1,
         }
         acc
      })
   }
}
