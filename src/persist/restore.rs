use super::snapshot::{apply_entries, decode_entries};
use crate::core::{Result, StoreError};
use log::debug;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// Loads the snapshot at `path` (if any) on top of `fresh`.
///
/// A missing or empty file leaves `fresh` untouched. Restored entries replace
/// top-level fields wholesale; nested values are never merged.
pub async fn restore(
    path: impl AsRef<Path>,
    mut fresh: Map<String, Value>,
) -> Result<Map<String, Value>> {
    let path = path.as_ref();
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("no snapshot at '{}', starting fresh", path.display());
            return Ok(fresh);
        }
        Err(err) => {
            return Err(StoreError::IoError(format!(
                "Failed to read snapshot '{}': {}",
                path.display(),
                err
            )));
        }
    };

    if bytes.is_empty() {
        return Ok(fresh);
    }

    let entries = decode_entries(&bytes)?;
    debug!(
        "restored {} field(s) from '{}'",
        entries.len(),
        path.display()
    );
    apply_entries(&mut fresh, entries);
    Ok(fresh)
}
