//! Chat ↔ project subscription index with an allow-list of operators.
//!
//! All operations are synchronous and run to completion; persistence
//! happens behind the observed root and is never visible to callers.

use super::state::{CHATS_FIELD, OWNER_FIELD, StoreState, USERS_FIELD};
use crate::core::{ChatId, ProjectRemoval, Result, StoreError, UNSET_OWNER, UserId, parse_user_id};
use crate::persist::{CoalescerStats, Node, PersistOptions, Persistent, make_persistent};
use log::{debug, warn};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One store per process, handed to every handler that needs it.
pub type SharedStore = Arc<Mutex<SubscriptionStore>>;

#[derive(Debug)]
pub struct SubscriptionStore {
    persistent: Persistent,
}

impl SubscriptionStore {
    /// Opens the store, restoring the snapshot at `options.path` if present.
    pub async fn open(options: &PersistOptions) -> Result<Self> {
        let persistent =
            make_persistent(options, StoreState::fresh_root(), StoreState::schema()).await?;
        StoreState::from_root(persistent.root().state())?;
        Ok(Self { persistent })
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    // ========================================================================
    // Access control
    // ========================================================================

    pub fn owner_id(&self) -> UserId {
        match self.persistent.root().get(&[OWNER_FIELD]) {
            Some(Node::Leaf(value)) => value.as_i64().unwrap_or(UNSET_OWNER),
            _ => UNSET_OWNER,
        }
    }

    pub fn users(&self) -> Vec<UserId> {
        match self.persistent.root().get(&[USERS_FIELD]) {
            Some(Node::Leaf(Value::Array(ids))) => ids.iter().filter_map(Value::as_i64).collect(),
            _ => Vec::new(),
        }
    }

    /// Makes `id` the owner and the only allowed user.
    ///
    /// Any previously allowed users are dropped, on every call.
    pub fn set_owner_id(&mut self, id: UserId) -> Result<()> {
        let root = self.persistent.root_mut();
        root.set(&[OWNER_FIELD], Value::from(id))?;
        root.set(&[USERS_FIELD], Value::from(vec![id]))?;
        debug!("owner set: user={}", id);
        Ok(())
    }

    pub fn check_access(&self, user: UserId) -> Result<()> {
        self.check_access_for(Some(user))
    }

    fn check_access_for(&self, user: Option<UserId>) -> Result<()> {
        match user {
            Some(user) if self.users().contains(&user) => Ok(()),
            _ => {
                warn!("permission denied: user={:?}", user);
                Err(StoreError::PermissionDenied)
            }
        }
    }

    /// Allows `target` (given as text, as chat commands deliver it).
    pub fn add_user(&mut self, initiator: UserId, target: &str) -> Result<UserId> {
        self.check_access(initiator)?;
        let target = parse_user_id(target)?;

        let mut users = self.users();
        if !users.contains(&target) {
            users.push(target);
        }
        self.write_users(users)?;
        Ok(target)
    }

    /// Revokes `target`. The owner can never be removed, not even by itself.
    pub fn del_user(&mut self, initiator: UserId, target: UserId) -> Result<()> {
        let checked = if target == self.owner_id() {
            None
        } else {
            Some(initiator)
        };
        self.check_access_for(checked)?;

        let mut users = self.users();
        users.retain(|id| *id != target);
        self.write_users(users)
    }

    fn write_users(&mut self, users: Vec<UserId>) -> Result<()> {
        self.persistent
            .root_mut()
            .set(&[USERS_FIELD], Value::from(users))
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Every chat subscribed to `project_url`.
    pub fn get_chats(&self, project_url: &str) -> Vec<ChatId> {
        let Some(Node::Object(chats)) = self.persistent.root().get(&[CHATS_FIELD]) else {
            return Vec::new();
        };
        chats
            .iter()
            .filter(|(_, urls)| {
                urls.as_array()
                    .is_some_and(|urls| urls.iter().any(|url| url.as_str() == Some(project_url)))
            })
            .map(|(chat_id, _)| ChatId::from(chat_id.as_str()))
            .collect()
    }

    pub fn get_projects(&self, chat_id: impl Into<ChatId>) -> Vec<String> {
        let chat_id = chat_id.into();
        match self.persistent.root().get(&[CHATS_FIELD, chat_id.as_str()]) {
            Some(Node::Leaf(Value::Array(urls))) => urls
                .iter()
                .filter_map(|url| url.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Replaces the chat's subscriptions. Duplicates are dropped (first one
    /// wins) and an empty list unlinks the chat entirely.
    pub fn set_projects(
        &mut self,
        user: UserId,
        chat_id: impl Into<ChatId>,
        urls: Vec<String>,
    ) -> Result<()> {
        self.check_access(user)?;
        let chat_id = chat_id.into();

        let mut seen = HashSet::new();
        let urls: Vec<String> = urls
            .into_iter()
            .filter(|url| seen.insert(url.clone()))
            .collect();

        let mut root = self.persistent.root_mut().view();
        let mut chats = root.child(CHATS_FIELD).ok_or_else(|| {
            StoreError::InvalidPath(format!("field '{}' is not an object", CHATS_FIELD))
        })?;

        if urls.is_empty() {
            if chats.remove(chat_id.as_str())?.is_some() {
                debug!("chat '{}' has no projects left; removed", chat_id);
            }
            return Ok(());
        }
        chats.set(chat_id.as_str(), Value::from(urls))
    }

    /// Subscribes the chat to `project_url`; repeating the call changes nothing.
    pub fn add_project(
        &mut self,
        user: UserId,
        chat_id: impl Into<ChatId>,
        project_url: &str,
    ) -> Result<()> {
        let chat_id = chat_id.into();
        let mut urls = self.get_projects(chat_id.clone());
        if !urls.iter().any(|url| url == project_url) {
            urls.push(project_url.to_string());
        }
        self.set_projects(user, chat_id, urls)
    }

    /// Unsubscribes the chat from `project_url`.
    ///
    /// The returned counts let the caller decide whether anything tied to
    /// the project (e.g. a registered webhook) is still needed.
    pub fn del_project(
        &mut self,
        user: UserId,
        chat_id: impl Into<ChatId>,
        project_url: &str,
    ) -> Result<ProjectRemoval> {
        let chat_id = chat_id.into();
        let mut urls = self.get_projects(chat_id.clone());
        urls.retain(|url| url != project_url);
        self.set_projects(user, chat_id.clone(), urls)?;

        Ok(ProjectRemoval {
            projects_for_chat: self.get_projects(chat_id).len(),
            chats_for_project: self.get_chats(project_url).len(),
        })
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Typed copy of the whole store.
    pub fn state(&self) -> StoreState {
        let chats: BTreeMap<ChatId, Vec<String>> = match self.persistent.root().get(&[CHATS_FIELD]) {
            Some(Node::Object(chats)) => chats
                .keys()
                .map(|chat_id| {
                    let chat_id = ChatId::from(chat_id.as_str());
                    let urls = self.get_projects(chat_id.clone());
                    (chat_id, urls)
                })
                .collect(),
            _ => BTreeMap::new(),
        };
        StoreState {
            chats,
            users: self.users(),
            owner_user_id: self.owner_id(),
        }
    }

    pub fn path(&self) -> &Path {
        self.persistent.path()
    }

    pub fn persist_stats(&self) -> CoalescerStats {
        self.persistent.stats()
    }

    /// Lets a pending write land, then stops the background writer.
    pub async fn shutdown(self) -> Result<()> {
        self.persistent.shutdown().await
    }
}
