//! External menu synchronization for restaurant storefronts.
//!
//! A run pulls one restaurant's menu from an external source, diffs it
//! against the items previously synced from that source, and commits the
//! resulting creates, updates and deletes as one batch. Items entered by hand
//! (no source) are never touched.

pub mod apply;
pub mod auth;
pub mod cadence;
pub mod cmd;
pub mod config;
pub mod error;
pub mod lease;
pub mod reconcile;
pub mod source;
pub mod store;
pub mod sync;
pub mod types;
pub mod util;

pub use error::{Error, Result};
