//! HTTP adapter for the menu collaborator service.

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;

use super::{FetchEnvelope, FieldMap, MenuSource};
use crate::{
   Result,
   config::{Config, SourceEndpoint},
   error::SourceError,
   types::Source,
};

/// Fetches menus over HTTP from `{endpoint}/restaurants/{id}/menu`.
///
/// The service answers with a `{ success, data, error }` envelope whose
/// `data` items are still in the source's native shape; they are normalized
/// here through the source's [`FieldMap`].
pub struct HttpSource {
   client:    Client,
   endpoints: BTreeMap<Source, SourceEndpoint>,
}

impl HttpSource {
   pub fn new(endpoints: BTreeMap<Source, SourceEndpoint>, timeout: Duration) -> Result<Self> {
      let client = Client::builder()
         .timeout(timeout)
         .user_agent(concat!("menusync/", env!("CARGO_PKG_VERSION")))
         .build()
         .map_err(SourceError::Request)?;
      Ok(Self { client, endpoints })
   }

   pub fn from_config(cfg: &Config) -> Result<Self> {
      Self::new(cfg.sources.clone(), cfg.fetch_timeout())
   }

   fn menu_url(&self, source: Source, restaurant_id: &str) -> Result<Url, SourceError> {
      let endpoint = self
         .endpoints
         .get(&source)
         .ok_or(SourceError::NotConfigured(source))?;
      let mut url = Url::parse(&endpoint.endpoint).map_err(|e| SourceError::Malformed {
         origin: source,
         reason: format!("invalid endpoint '{}': {e}", endpoint.endpoint),
      })?;
      url
         .path_segments_mut()
         .map_err(|()| SourceError::Malformed {
            origin: source,
            reason: format!("endpoint '{}' cannot carry a path", endpoint.endpoint),
         })?
         .pop_if_empty()
         .extend(["restaurants", restaurant_id, "menu"]);
      Ok(url)
   }
}

#[async_trait]
impl MenuSource for HttpSource {
   async fn fetch(&self, source: Source, restaurant_id: &str) -> Result<FetchEnvelope> {
      let url = self.menu_url(source, restaurant_id)?;
      tracing::debug!(%source, restaurant_id, %url, "fetching external menu");

      let mut request = self.client.get(url);
      if let Some(key) = self.endpoints.get(&source).and_then(|e| e.api_key.as_deref()) {
         request = request.bearer_auth(key);
      }

      let response = request.send().await.map_err(SourceError::Request)?;
      let status = response.status();
      if !status.is_success() {
         return Err(SourceError::Status { origin: source, status: status.as_u16() }.into());
      }

      let envelope: FetchEnvelope<Value> =
         response.json().await.map_err(|e| SourceError::Malformed {
            origin: source,
            reason: e.to_string(),
         })?;

      if !envelope.success {
         return Ok(FetchEnvelope::failed(
            envelope.error.unwrap_or_else(|| "unknown error".to_string()),
         ));
      }

      let raw = envelope.data.unwrap_or_default();
      let records = FieldMap::for_source(source).normalize_all(source, &raw)?;
      Ok(FetchEnvelope::ok(records))
   }
}
