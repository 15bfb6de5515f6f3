use crate::core::{ChatId, Result, StoreError, UNSET_OWNER, UserId};
use crate::persist::FieldSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const CHATS_FIELD: &str = "chats";
pub const USERS_FIELD: &str = "users";
pub const OWNER_FIELD: &str = "ownerUserId";

/// Typed picture of everything the subscription store persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreState {
    /// Chat id -> subscribed project URLs (never empty)
    #[serde(default)]
    pub chats: BTreeMap<ChatId, Vec<String>>,

    /// Users allowed to change subscriptions
    #[serde(default)]
    pub users: Vec<UserId>,

    #[serde(default, rename = "ownerUserId")]
    pub owner_user_id: UserId,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            chats: BTreeMap::new(),
            users: Vec::new(),
            owner_user_id: UNSET_OWNER,
        }
    }
}

impl StoreState {
    /// `chats` is observed field by field; the other two are replaced whole.
    pub fn schema() -> FieldSchema {
        FieldSchema::new()
            .deep(CHATS_FIELD)
            .atomic(USERS_FIELD)
            .atomic(OWNER_FIELD)
    }

    /// Root object of a store that has never been written.
    pub fn fresh_root() -> Map<String, Value> {
        let mut root = Map::new();
        root.insert(CHATS_FIELD.to_string(), Value::Object(Map::new()));
        root.insert(USERS_FIELD.to_string(), Value::Array(Vec::new()));
        root.insert(OWNER_FIELD.to_string(), Value::from(UNSET_OWNER));
        root
    }

    /// Checks that a (possibly restored) root has the layout the store expects.
    pub fn from_root(root: &Value) -> Result<Self> {
        serde_json::from_value(root.clone()).map_err(|err| {
            StoreError::ParseError(format!("snapshot does not match the store layout: {}", err))
        })
    }
}
