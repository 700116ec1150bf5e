//! Push-channel frames and the event names the server emits.
//!
//! The server is inconsistent about event-name casing (`CardUpdated` and
//! `card_updated` both occur for the same change). Names are matched
//! case-insensitively and every observed alias is listed here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame sent by the server over the push channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Action invoked by the client over the push channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientFrame {
    pub invoke: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl ClientFrame {
    pub fn join_group(group: &str) -> Self {
        Self {
            invoke: actions::JOIN_GROUP.to_string(),
            args: vec![Value::String(group.to_string())],
        }
    }
}

/// Client-invokable actions.
pub mod actions {
    pub const JOIN_GROUP: &str = "JoinGroup";
    pub const ADMIN_GROUP: &str = "Admins";
}

/// Server event names, grouped by the logical change they announce.
pub mod events {
    pub const CHECK_IN: &[&str] = &["CheckIn"];
    pub const CHECK_OUT: &[&str] = &["CheckOut"];
    pub const LOGS_DELETED: &[&str] = &["LogsDeleted"];

    pub const CARD_CREATED: &[&str] = &["CardCreated"];
    pub const CARD_UPDATED: &[&str] = &["CardUpdated", "card_updated"];
    pub const CARD_DELETED: &[&str] = &["CardDeleted"];
    pub const CARD_REGISTERED: &[&str] = &["CardRegistered", "NewCardRegistered"];

    pub const USER_CREATED: &[&str] = &["UserCreated"];
    pub const USER_UPDATED: &[&str] = &["UserUpdated"];
    pub const USER_DELETED: &[&str] = &["UserDeleted"];

    pub const ROOM_CREATED: &[&str] = &["RoomCreated"];
    pub const ROOM_DELETED: &[&str] = &["RoomDeleted"];

    pub const DASHBOARD_STATS: &[&str] = &["DashboardStats"];

    /// Every event that changes the access-log collection.
    pub fn access_log_changes() -> Vec<&'static str> {
        [CHECK_IN, CHECK_OUT, LOGS_DELETED].concat()
    }

    /// Every event that changes the card collection.
    pub fn card_changes() -> Vec<&'static str> {
        [CARD_CREATED, CARD_UPDATED, CARD_DELETED, CARD_REGISTERED].concat()
    }

    pub fn user_changes() -> Vec<&'static str> {
        [USER_CREATED, USER_UPDATED, USER_DELETED].concat()
    }

    pub fn room_changes() -> Vec<&'static str> {
        [ROOM_CREATED, ROOM_DELETED].concat()
    }
}

/// Lowercased registry key for an event name.
pub fn normalize_event_name(name: &str) -> String {
    name.trim().to_lowercase()
}
