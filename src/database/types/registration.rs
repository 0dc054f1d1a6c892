use super::{Event, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Active,
    Canceled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Active => "active",
            RegistrationStatus::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Registration {
    pub id: i64,
    pub user_id: i64,
    pub event_id: i64,
    pub status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub reminder24_sent: bool,
    #[serde(default)]
    pub reminder1_sent: bool,
}

impl Registration {
    pub fn flag(&self, flag: ReminderFlag) -> bool {
        match flag {
            ReminderFlag::Reminder24 => self.reminder24_sent,
            ReminderFlag::Reminder1 => self.reminder1_sent,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RegistrationWithEvent {
    #[serde(flatten)]
    pub registration: Registration,
    pub event: Event,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RegistrationWithUser {
    #[serde(flatten)]
    pub registration: Registration,
    pub user: User,
}

// One line of the admin roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: String,
    pub nickname: String,
    pub telegram_id: i64,
}

impl From<&RegistrationWithUser> for RosterEntry {
    fn from(row: &RegistrationWithUser) -> Self {
        Self {
            name: row.user.name.clone().unwrap_or_default(),
            nickname: row.user.nickname.clone().unwrap_or_default(),
            telegram_id: row.user.telegram_id,
        }
    }
}

/// Per-registration notification flags, one per reminder threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderFlag {
    Reminder24,
    Reminder1,
}

impl ReminderFlag {
    pub fn column(&self) -> &'static str {
        match self {
            ReminderFlag::Reminder24 => "reminder24_sent",
            ReminderFlag::Reminder1 => "reminder1_sent",
        }
    }
}
