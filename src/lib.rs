// ============================================================================
// chatlink library
// ============================================================================
//
// Persistent chat <-> project subscription store.
//
//   restore(snapshot) -> Observed root -> SubscriptionStore operations
//                              |
//                              +-- every write --> WriteCoalescer --> snapshot file
//
// Handlers only ever call `SubscriptionStore`; the snapshot file is written
// in the background once writes have been quiet for the configured interval.

pub mod core;
pub mod persist;
pub mod prelude;
pub mod storage;

pub use crate::core::{ChatId, ProjectRemoval, Result, StoreError, UNSET_OWNER, UserId};
pub use crate::persist::{
    CoalescerStats, FieldSchema, Observed, PersistOptions, Persistent, WriteCoalescer,
    make_persistent,
};
pub use crate::storage::{SharedStore, StoreState, SubscriptionStore};

/// Opens the store described by the environment (`CHATLINK_STORAGE_PATH`,
/// `CHATLINK_QUIESCENCE_MS`).
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> chatlink::Result<()> {
/// let mut store = chatlink::open_from_env().await?;
/// store.set_owner_id(42)?;
/// store.add_project(42, 3001, "https://gitlab.com/group/project")?;
/// assert_eq!(store.get_chats("https://gitlab.com/group/project").len(), 1);
/// # Ok(())
/// # }
/// ```
pub async fn open_from_env() -> Result<SubscriptionStore> {
    let options = PersistOptions::from_env()?;
    SubscriptionStore::open(&options).await
}
