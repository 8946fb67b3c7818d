//! Declarative per-source field mapping.
//!
//! Each source names the same concepts differently (`menu_item_name` vs
//! `name`, prices as numbers or strings). A [`FieldMap`] lists, per field, the
//! payload keys to try in order. Adding a source means adding a table entry.

use serde_json::{Map, Value};

use crate::{
   error::SourceError,
   types::{DEFAULT_CATEGORY, ExternalMenuRecord, Source},
};

/// Candidate payload keys for each record field, tried in order.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
   pub external_id: &'static [&'static str],
   pub name:        &'static [&'static str],
   pub description: &'static [&'static str],
   pub price:       &'static [&'static str],
   pub category:    &'static [&'static str],
   pub image:       &'static [&'static str],
   pub available:   &'static [&'static str],
}

const DOCUMENU: FieldMap = FieldMap {
   external_id: &["item_id", "externalId", "id"],
   name:        &["menu_item_name", "name"],
   description: &["menu_item_description", "description"],
   price:       &["menu_item_price", "price"],
   category:    &["subsection", "category"],
   image:       &["menu_item_image", "image"],
   available:   &["available"],
};

const YELP: FieldMap = FieldMap {
   external_id: &["id", "externalId"],
   name:        &["name", "title"],
   description: &["description"],
   price:       &["price"],
   category:    &["category", "section"],
   image:       &["image_url", "image"],
   available:   &["is_available", "available"],
};

const ZOMATO: FieldMap = FieldMap {
   external_id: &["id", "item_id", "externalId"],
   name:        &["name", "item_name"],
   description: &["desc", "description"],
   price:       &["price", "cost"],
   category:    &["category", "menu_category"],
   image:       &["img", "image"],
   available:   &["in_stock", "available"],
};

impl FieldMap {
   pub const fn for_source(source: Source) -> &'static Self {
      match source {
         Source::Documenu => &DOCUMENU,
         Source::Yelp => &YELP,
         Source::Zomato => &ZOMATO,
      }
   }

   /// Normalizes one raw payload object into an [`ExternalMenuRecord`].
   ///
   /// The external id is the only required field; everything else falls back
   /// to an empty/default value.
   pub fn normalize(&self, source: Source, raw: &Value) -> Result<ExternalMenuRecord, SourceError> {
      let Some(obj) = raw.as_object() else {
         return Err(SourceError::Malformed {
            origin: source,
            reason: format!("menu item is not an object: {raw}"),
         });
      };

      let external_id = first(obj, self.external_id)
         .and_then(id_string)
         .ok_or_else(|| SourceError::Malformed {
            origin: source,
            reason: format!("menu item without an id (tried {:?})", self.external_id),
         })?;

      let name = first(obj, self.name)
         .and_then(Value::as_str)
         .unwrap_or_default()
         .to_string();
      let description = first(obj, self.description)
         .and_then(Value::as_str)
         .unwrap_or_default()
         .to_string();
      let price = first(obj, self.price).and_then(parse_price).unwrap_or(0.0);
      let category = first(obj, self.category)
         .and_then(Value::as_str)
         .filter(|c| !c.trim().is_empty())
         .unwrap_or(DEFAULT_CATEGORY)
         .to_string();
      let image = first(obj, self.image)
         .and_then(Value::as_str)
         .filter(|s| !s.is_empty())
         .map(str::to_string);
      // Only an explicit `false` marks an item unavailable.
      let available = !matches!(first(obj, self.available), Some(Value::Bool(false)));

      Ok(ExternalMenuRecord { external_id, name, description, price, category, image, available })
   }

   pub fn normalize_all(
      &self,
      source: Source,
      raw: &[Value],
   ) -> Result<Vec<ExternalMenuRecord>, SourceError> {
      raw.iter().map(|item| self.normalize(source, item)).collect()
   }
}

fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
   keys
      .iter()
      .filter_map(|key| obj.get(*key))
      .find(|value| !value.is_null())
}

fn id_string(value: &Value) -> Option<String> {
   match value {
      Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
      Value::Number(n) => Some(n.to_string()),
      _ => None,
   }
}

fn parse_price(value: &Value) -> Option<f64> {
   let price = match value {
      Value::Number(n) => n.as_f64(),
      Value::String(s) => s
         .trim()
         .trim_start_matches(['$', '€', '£'])
         .replace(',', "")
         .parse::<f64>()
         .ok(),
      _ => None,
   };
   price.filter(|p| p.is_finite())
}
