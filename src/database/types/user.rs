use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    // Delivery target for outbound messages, not the same as telegram_id in groups
    pub chat_id: i64,
    pub username: Option<String>,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    // Onboarding is complete once both name and nickname are filled in
    pub fn has_profile(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.name) && filled(&self.nickname)
    }

    pub fn nickname_or_default(&self) -> &str {
        self.nickname
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Name,
    Nickname,
    Phone,
}

impl UserField {
    pub fn column(&self) -> &'static str {
        match self {
            UserField::Name => "name",
            UserField::Nickname => "nickname",
            UserField::Phone => "phone",
        }
    }
}
