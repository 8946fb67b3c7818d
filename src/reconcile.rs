//! Diffing a fetched menu snapshot against the locally stored items.
//!
//! The join key is the external id. Incoming records are classified as
//! creates or updates, and stored items whose key was not seen in the
//! snapshot become deletes. The three sets are disjoint by external id.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{ApplyCounts, ExternalMenuRecord, MenuItem, Scope};

/// Output of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
   pub to_create: Vec<MenuItem>,
   pub to_update: Vec<MenuItem>,
   pub to_delete: Vec<MenuItem>,
   /// Stored items in scope that carry no external id and were left alone.
   pub unkeyed:   usize,
}

impl ChangeSet {
   pub fn counts(&self) -> ApplyCounts {
      ApplyCounts {
         items_added:   self.to_create.len(),
         items_updated: self.to_update.len(),
         items_removed: self.to_delete.len(),
      }
   }

   pub fn len(&self) -> usize {
      self.to_create.len() + self.to_update.len() + self.to_delete.len()
   }

   pub fn is_empty(&self) -> bool {
      self.len() == 0
   }
}

/// Computes create/update/delete sets for one (restaurant, source) scope.
#[derive(Debug, Clone)]
pub struct Reconciler {
   scope:              Scope,
   now:                DateTime<Utc>,
   legacy_id_fallback: bool,
}

impl Reconciler {
   pub const fn new(scope: Scope, now: DateTime<Utc>) -> Self {
      Self { scope, now, legacy_id_fallback: false }
   }

   /// Joins stored items that lack an external id on their storage id.
   ///
   /// Off by default: such items are counted in [`ChangeSet::unkeyed`] and
   /// left untouched until they are backfilled.
   pub const fn legacy_id_fallback(mut self, enabled: bool) -> Self {
      self.legacy_id_fallback = enabled;
      self
   }

   pub fn reconcile(&self, existing: &[MenuItem], external: &[ExternalMenuRecord]) -> ChangeSet {
      let mut changes = ChangeSet::default();

      let mut lookup: HashMap<&str, &MenuItem> = HashMap::with_capacity(existing.len());
      for item in existing {
         if !item.in_scope(&self.scope) {
            tracing::warn!(scope = %self.scope, item = %item.id, "ignoring out-of-scope item");
            continue;
         }
         let Some(key) = self.join_key(item) else {
            changes.unkeyed += 1;
            continue;
         };
         if lookup.insert(key, item).is_some() {
            tracing::warn!(scope = %self.scope, external_id = key, "duplicate stored external id");
         }
      }

      // Last occurrence wins, but output keeps first-appearance order.
      let mut order: Vec<&str> = Vec::with_capacity(external.len());
      let mut latest: HashMap<&str, &ExternalMenuRecord> = HashMap::with_capacity(external.len());
      for record in external {
         if latest.insert(record.external_id.as_str(), record).is_none() {
            order.push(record.external_id.as_str());
         } else {
            tracing::debug!(
               scope = %self.scope,
               external_id = %record.external_id,
               "duplicate external id in snapshot, keeping last"
            );
         }
      }

      for key in &order {
         let record = latest[key];
         match lookup.get(key) {
            Some(current) => changes.to_update.push(self.updated(current, record)),
            None => changes.to_create.push(self.created(record)),
         }
      }

      let processed: HashSet<&str> = order.into_iter().collect();
      changes.to_delete = lookup
         .into_iter()
         .filter(|(key, _)| !processed.contains(key))
         .map(|(_, item)| item.clone())
         .collect();
      changes.to_delete.sort_by(|a, b| a.id.cmp(&b.id));

      if changes.unkeyed > 0 {
         tracing::warn!(
            scope = %self.scope,
            unkeyed = changes.unkeyed,
            "stored items without external id left untouched; run backfill"
         );
      }

      changes
   }

   fn join_key<'a>(&self, item: &'a MenuItem) -> Option<&'a str> {
      match item.external_id.as_deref() {
         Some(id) if !id.is_empty() => Some(id),
         _ if self.legacy_id_fallback => Some(item.id.as_str()),
         _ => None,
      }
   }

   fn updated(&self, current: &MenuItem, record: &ExternalMenuRecord) -> MenuItem {
      MenuItem {
         id:            current.id.clone(),
         restaurant_id: current.restaurant_id.clone(),
         source:        Some(self.scope.source),
         external_id:   Some(record.external_id.clone()),
         name:          record.name.clone(),
         description:   record.description.clone(),
         price:         record.price,
         category:      record.category.clone(),
         image:         record.image.clone(),
         available:     record.available,
         created_at:    current.created_at,
         updated_at:    self.now,
         synced_at:     Some(self.now),
      }
   }

   fn created(&self, record: &ExternalMenuRecord) -> MenuItem {
      MenuItem {
         id:            Uuid::new_v4().to_string(),
         restaurant_id: self.scope.restaurant_id.clone(),
         source:        Some(self.scope.source),
         external_id:   Some(record.external_id.clone()),
         name:          record.name.clone(),
         description:   record.description.clone(),
         price:         record.price,
         category:      record.category.clone(),
         image:         record.image.clone(),
         available:     record.available,
         created_at:    self.now,
         updated_at:    self.now,
         synced_at:     Some(self.now),
      }
   }
}
