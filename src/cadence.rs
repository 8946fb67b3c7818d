//! Due-for-sync policy.

use chrono::{DateTime, Utc};

use crate::types::SyncConfig;

/// Whether a configured sync should run now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cadence {
   /// Never synced, forced, or the interval has elapsed.
   Due,
   /// Interval not yet elapsed.
   NotDue { elapsed_hours: f64, interval_hours: u32 },
}

impl Cadence {
   pub const fn is_due(&self) -> bool {
      matches!(self, Self::Due)
   }
}

pub fn check(config: &SyncConfig, now: DateTime<Utc>, force: bool) -> Cadence {
   if force {
      return Cadence::Due;
   }
   let Some(last_sync) = config.last_sync else {
      return Cadence::Due;
   };

   // A lastSync in the future (clock skew) yields a negative elapsed time and
   // stays not-due until the interval has passed from that timestamp.
   let elapsed_hours = now.signed_duration_since(last_sync).num_milliseconds() as f64 / 3_600_000.0;
   if elapsed_hours < f64::from(config.sync_interval_hours) {
      Cadence::NotDue { elapsed_hours, interval_hours: config.sync_interval_hours }
   } else {
      Cadence::Due
   }
}
