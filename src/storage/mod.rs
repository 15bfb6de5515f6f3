pub mod state;
pub mod subscriptions;

pub use state::StoreState;
pub use subscriptions::{SharedStore, SubscriptionStore};
