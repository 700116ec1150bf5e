//! Domain records for the access-control console.
//!
//! Field keys used by `Record::field` / `Record::timestamp` match the
//! camelCase JSON names, so filter and search declarations read the same as
//! the API payloads.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::record::{non_empty, Record};
use crate::time::{lenient_datetime, sentinel_datetime};

fn fmt_ts(value: &Option<NaiveDateTime>) -> Option<String> {
    value.map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
}

// --- Envelope ---

/// Response shape shared by every resource endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

// --- Cards ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CardStatus {
    Active,
    Inactive,
    Lost,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Active => "active",
            CardStatus::Inactive => "inactive",
            CardStatus::Lost => "lost",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: i64,
    /// Hex UID read from the RFID tag.
    pub uid: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub user_name: Option<String>,
    pub status: CardStatus,
    #[serde(with = "lenient_datetime")]
    pub created_at: NaiveDateTime,
}

impl Record for Card {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, key: &str) -> Option<String> {
        match key {
            "id" => Some(self.id.to_string()),
            "uid" => Some(self.uid.clone()),
            "userId" => self.user_id.map(|v| v.to_string()),
            "userName" => non_empty(&self.user_name),
            "status" => Some(self.status.as_str().to_string()),
            "createdAt" => fmt_ts(&Some(self.created_at)),
            _ => None,
        }
    }

    fn timestamp(&self, key: &str) -> Option<NaiveDateTime> {
        match key {
            "createdAt" => Some(self.created_at),
            _ => None,
        }
    }
}

// --- Access logs ---

/// One check-in / check-out session at a lab door.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessLog {
    pub id: i64,
    pub card_uid: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub user_name: Option<String>,
    pub lab_id: i64,
    #[serde(default)]
    pub lab_name: Option<String>,
    #[serde(default)]
    pub class_id: Option<i64>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(with = "lenient_datetime")]
    pub check_in_at: NaiveDateTime,
    #[serde(default, with = "sentinel_datetime")]
    pub check_out_at: Option<NaiveDateTime>,
}

impl Record for AccessLog {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, key: &str) -> Option<String> {
        match key {
            "id" => Some(self.id.to_string()),
            "cardUid" => Some(self.card_uid.clone()),
            "userId" => self.user_id.map(|v| v.to_string()),
            "userName" => non_empty(&self.user_name),
            "labId" => Some(self.lab_id.to_string()),
            "labName" => non_empty(&self.lab_name),
            "classId" => self.class_id.map(|v| v.to_string()),
            "className" => non_empty(&self.class_name),
            "checkInAt" => fmt_ts(&Some(self.check_in_at)),
            "checkOutAt" => fmt_ts(&self.check_out_at),
            _ => None,
        }
    }

    fn timestamp(&self, key: &str) -> Option<NaiveDateTime> {
        match key {
            "checkInAt" => Some(self.check_in_at),
            "checkOutAt" => self.check_out_at,
            _ => None,
        }
    }
}

// --- Labs ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lab {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
}

impl Record for Lab {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, key: &str) -> Option<String> {
        match key {
            "id" => Some(self.id.to_string()),
            "name" => Some(self.name.clone()),
            "location" => non_empty(&self.location),
            "capacity" => self.capacity.map(|v| v.to_string()),
            _ => None,
        }
    }
}

// --- Classes ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub lab_id: Option<i64>,
    #[serde(default)]
    pub teacher_name: Option<String>,
}

impl Record for ClassGroup {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, key: &str) -> Option<String> {
        match key {
            "id" => Some(self.id.to_string()),
            "name" => Some(self.name.clone()),
            "labId" => self.lab_id.map(|v| v.to_string()),
            "teacherName" => non_empty(&self.teacher_name),
            _ => None,
        }
    }
}

// --- Users ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub student_code: Option<String>,
    #[serde(default)]
    pub class_id: Option<i64>,
}

impl Record for User {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, key: &str) -> Option<String> {
        match key {
            "id" => Some(self.id.to_string()),
            "fullName" => Some(self.full_name.clone()),
            "email" => Some(self.email.clone()),
            "role" => Some(self.role.as_str().to_string()),
            "studentCode" => non_empty(&self.student_code),
            "classId" => self.class_id.map(|v| v.to_string()),
            _ => None,
        }
    }
}

// --- Broadcast payloads ---

/// Counters pushed with the dashboard-stat broadcast.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_cards: u64,
    pub total_labs: u64,
    pub active_sessions: u64,
    pub today_check_ins: u64,
}

/// The most recent tag read by the enrollment reader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub uid: String,
    #[serde(default, with = "sentinel_datetime")]
    pub scanned_at: Option<NaiveDateTime>,
}
