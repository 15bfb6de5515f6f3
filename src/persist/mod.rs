//! Transparent persistence for an in-memory JSON root.
//!
//! [`make_persistent`] restores the last snapshot, wraps the result in an
//! [`Observed`] root and wires every observed write into a
//! [`WriteCoalescer`]. Code that mutates the root never calls into the
//! persistence layer itself.

pub mod coalescer;
pub mod config;
pub mod observer;
pub mod restore;
pub mod snapshot;

pub use coalescer::{CoalescerStats, ScheduleHandle, WriteCoalescer};
pub use config::{DEFAULT_QUIESCENCE, DEFAULT_STORAGE_PATH, PersistOptions};
pub use observer::{Discipline, Field, FieldSchema, Node, Observed, ObservedView, WriteNotify};
pub use restore::restore;

use crate::core::{Result, StoreError};
use log::info;
use serde_json::{Map, Value};
use std::path::Path;

/// An observed root whose writes are flushed to disk in the background.
#[derive(Debug)]
pub struct Persistent {
    root: Observed,
    writer: WriteCoalescer,
}

/// Restores `fresh` from `options.path` and starts observing it.
///
/// Must be called from within a tokio runtime.
pub async fn make_persistent(
    options: &PersistOptions,
    fresh: Map<String, Value>,
    schema: FieldSchema,
) -> Result<Persistent> {
    let restored = restore(&options.path, fresh).await?;
    let mut root = Observed::with_schema(restored, schema).map_err(|err| {
        StoreError::ParseError(format!(
            "snapshot '{}' does not fit the root layout: {}",
            options.path.display(),
            err
        ))
    })?;
    let writer = WriteCoalescer::spawn(&options.path, options.quiescence)?;

    let handle = writer.handle();
    root.subscribe(move |state| handle.schedule(state.clone()));

    info!(
        "persistent root opened: path='{}' quiescence_ms={}",
        options.path.display(),
        options.quiescence.as_millis()
    );
    Ok(Persistent { root, writer })
}

impl Persistent {
    pub fn root(&self) -> &Observed {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Observed {
        &mut self.root
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    pub fn stats(&self) -> CoalescerStats {
        self.writer.stats()
    }

    /// Waits for the pending write (if any) and stops the writer.
    pub async fn shutdown(self) -> Result<()> {
        self.writer.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;

    fn fresh() -> Map<String, Value> {
        json!({"settings": {"lang": "en"}, "tags": []})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_writes_reach_disk_and_restore() {
        let dir = tempdir().unwrap();
        let options = PersistOptions::new(dir.path().join("root.json"))
            .quiescence(Duration::from_millis(20));

        let mut persistent = make_persistent(&options, fresh(), FieldSchema::new())
            .await
            .unwrap();
        persistent
            .root_mut()
            .view()
            .child("settings")
            .unwrap()
            .set("lang", json!("de"))
            .unwrap();
        persistent.root_mut().set(&["tags"], json!(["a"])).unwrap();
        persistent.shutdown().await.unwrap();

        let reopened = make_persistent(&options, fresh(), FieldSchema::new())
            .await
            .unwrap();
        assert_eq!(
            reopened.root().state(),
            &json!({"settings": {"lang": "de"}, "tags": ["a"]})
        );
        assert_eq!(reopened.stats().scheduled, 0);
    }

    #[tokio::test]
    async fn test_reads_schedule_nothing() {
        let dir = tempdir().unwrap();
        let options = PersistOptions::new(dir.path().join("root.json"));
        let mut persistent = make_persistent(&options, fresh(), FieldSchema::new())
            .await
            .unwrap();

        let mut view = persistent.root_mut().view();
        let _ = view.field("settings");
        let _ = view.field("tags");
        assert!(persistent.root().get(&["settings", "lang"]).is_some());

        assert_eq!(persistent.stats().scheduled, 0);
        assert_eq!(persistent.path(), dir.path().join("root.json"));
    }
}
