//! Shared-secret bearer check for sync triggers.

use crate::{Result, error::Error};

/// Verifies a presented credential against the configured trigger secret.
///
/// Accepts either a raw token or an `Authorization` header value of the form
/// `Bearer <token>`. When no secret is configured every caller is accepted.
pub fn verify_bearer(presented: Option<&str>, secret: Option<&str>) -> Result<()> {
   let Some(secret) = secret.filter(|s| !s.is_empty()) else {
      return Ok(());
   };
   let Some(presented) = presented.map(str::trim).filter(|p| !p.is_empty()) else {
      return Err(Error::Unauthorized("missing trigger token"));
   };
   let token = presented
      .strip_prefix("Bearer ")
      .or_else(|| presented.strip_prefix("bearer "))
      .unwrap_or(presented)
      .trim();

   if constant_time_eq(token.as_bytes(), secret.as_bytes()) {
      Ok(())
   } else {
      Err(Error::Unauthorized("invalid trigger token"))
   }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
   if a.len() != b.len() {
      return false;
   }
   a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn no_secret_accepts_anyone() {
      assert!(verify_bearer(None, None).is_ok());
   }

   #[test]
   fn bearer_header_and_raw_token_are_accepted() {
      assert!(verify_bearer(Some("Bearer s3cret"), Some("s3cret")).is_ok());
      assert!(verify_bearer(Some("s3cret"), Some("s3cret")).is_ok());
   }

   #[test]
   fn wrong_or_missing_token_is_unauthorized() {
      let err = verify_bearer(Some("Bearer nope"), Some("s3cret")).unwrap_err();
      assert_eq!(err.exit_code(), 13);
      assert!(verify_bearer(None, Some("s3cret")).is_err());
   }
}
