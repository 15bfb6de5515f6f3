use super::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Telegram-style numeric user identifier.
pub type UserId = i64;

/// Owner value meaning "no owner configured yet".
pub const UNSET_OWNER: UserId = 0;

/// Chat identifier.
///
/// Chats may be addressed by number or by name; both are kept in their
/// string form because that is how they appear as keys of the persisted map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form of the id, if it has one.
    pub fn as_number(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<i32> for ChatId {
    fn from(id: i32) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ChatId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChatId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Remaining counts after a project was unlinked from a chat.
///
/// `chats_for_project == 0` tells the caller that nothing references the
/// project any more, so hooks registered for it can be torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRemoval {
    pub projects_for_chat: usize,
    pub chats_for_project: usize,
}

/// Parses a user id the way chat commands receive it (as text).
pub fn parse_user_id(raw: &str) -> Result<UserId> {
    raw.trim()
        .parse::<UserId>()
        .map_err(|_| StoreError::Validation(format!("UserId not valid: '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_id_forms() {
        assert_eq!(ChatId::from(3001).as_str(), "3001");
        assert_eq!(ChatId::from("3001"), ChatId::from(3001));
        assert_eq!(ChatId::from("@team").as_number(), None);
        assert_eq!(ChatId::from(-100).as_number(), Some(-100));
    }

    #[test]
    fn test_parse_user_id() {
        assert_eq!(parse_user_id("42").unwrap(), 42);
        assert_eq!(parse_user_id(" 7 ").unwrap(), 7);
        assert!(matches!(
            parse_user_id("abc"),
            Err(StoreError::Validation(_))
        ));
        assert!(parse_user_id("").is_err());
    }
}
