//! External menu sources.
//!
//! A source hands back a [`FetchEnvelope`] for one restaurant. The engine only
//! ever sees normalized [`ExternalMenuRecord`]s; per-source payload quirks are
//! absorbed by [`mapping`].

pub mod http;
pub mod mapping;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::{http::HttpSource, mapping::FieldMap};
use crate::{
   Result,
   error::SourceError,
   types::{ExternalMenuRecord, Source},
};

/// Success/failure wrapper returned by a source fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchEnvelope<T = ExternalMenuRecord> {
   pub success: bool,
   #[serde(default)]
   pub data:    Option<Vec<T>>,
   #[serde(default)]
   pub error:   Option<String>,
}

impl<T> FetchEnvelope<T> {
   pub const fn ok(data: Vec<T>) -> Self {
      Self { success: true, data: Some(data), error: None }
   }

   pub fn failed(message: impl Into<String>) -> Self {
      Self { success: false, data: None, error: Some(message.into()) }
   }
}

impl FetchEnvelope {
   /// Unwraps a successful envelope into its records.
   ///
   /// `success = false` becomes [`SourceError::Rejected`]; a successful
   /// envelope without `data` is treated as an empty menu. A record with a
   /// blank external id cannot be joined and makes the payload malformed.
   pub fn into_records(self, source: Source) -> Result<Vec<ExternalMenuRecord>, SourceError> {
      if !self.success {
         return Err(SourceError::Rejected {
            origin:  source,
            message: self.error.unwrap_or_else(|| "unknown error".to_string()),
         });
      }
      let records = self.data.unwrap_or_default();
      if let Some(pos) = records.iter().position(|r| r.external_id.trim().is_empty()) {
         return Err(SourceError::Malformed {
            origin: source,
            reason: format!("menu item {pos} has a blank external id"),
         });
      }
      Ok(records)
   }
}

/// Fetches a restaurant's current menu from a named external source.
#[async_trait]
pub trait MenuSource: Send + Sync {
   async fn fetch(&self, source: Source, restaurant_id: &str) -> Result<FetchEnvelope>;
}

#[async_trait]
impl<T: MenuSource + ?Sized> MenuSource for std::sync::Arc<T> {
   async fn fetch(&self, source: Source, restaurant_id: &str) -> Result<FetchEnvelope> {
      (**self).fetch(source, restaurant_id).await
   }
}
