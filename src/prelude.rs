//! Recommended imports grouped by abstraction level.
//!
//! `store` is what chat and webhook handlers need. `persist` exposes the
//! generic observe-and-flush machinery for other roots.

pub mod store {
    pub use crate::core::{ChatId, ProjectRemoval, Result, StoreError, UserId};
    pub use crate::persist::PersistOptions;
    pub use crate::storage::{SharedStore, StoreState, SubscriptionStore};
}

pub mod persist {
    pub use crate::persist::{
        CoalescerStats, Field, FieldSchema, Observed, ObservedView, PersistOptions, Persistent,
        WriteCoalescer, make_persistent, restore,
    };
}
