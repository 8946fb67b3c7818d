//! Utility functions for filesystem operations

use std::{
   fs::{self, File},
   io::Write,
   path::{Path, PathBuf},
};

use crate::{Result, error::Error};

/// Writes `data` next to `path` and renames it into place.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
   if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
   }
   let tmp_path = temp_path(path)?;
   {
      let mut file = File::create(&tmp_path)?;
      file.write_all(data)?;
      file.sync_all()?;
   }
   fs::rename(&tmp_path, path)?;
   if let Some(parent) = path.parent() {
      fsync_dir(parent)?;
   }
   Ok(())
}

#[cfg(unix)]
pub fn fsync_dir(dir: &Path) -> Result<()> {
   File::open(dir)?.sync_all()?;
   Ok(())
}

#[cfg(not(unix))]
pub fn fsync_dir(_dir: &Path) -> Result<()> {
   Ok(())
}

fn temp_path(path: &Path) -> Result<PathBuf> {
   let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| Error::Operation { op: "write", reason: "invalid file path".to_string() })?;
   Ok(path.with_file_name(format!("{name}.tmp")))
}

/// Turns an arbitrary id into a file-name-safe stem.
///
/// Plain ids pass through; anything else is hex encoded behind a `~`, which
/// never occurs in a plain id, so distinct ids never share a stem.
pub fn file_stem(id: &str) -> String {
   let plain = !id.is_empty()
      && id
         .chars()
         .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
   if plain { id.to_string() } else { format!("~{}", hex::encode(id.as_bytes())) }
}
