pub mod error;
pub mod types;

pub use error::{Result, StoreError};
pub use types::{ChatId, ProjectRemoval, UNSET_OWNER, UserId, parse_user_id};
