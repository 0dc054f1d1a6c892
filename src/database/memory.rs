//! In-process [`EventStore`] used by unit tests. Rows come back in insertion
//! order so callers cannot lean on the store for sorting.

use super::errors::DatabaseError;
use super::store::EventStore;
use super::types::{
    Event, NewEvent, Registration, RegistrationStatus, RegistrationWithEvent,
    RegistrationWithUser, ReminderFlag, User, UserField,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    events: Vec<Event>,
    registrations: Vec<Registration>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.tables.lock().unwrap().registrations.clone()
    }

    pub fn set_registration_times(&self, id: i64, at: DateTime<Utc>) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(r) = tables.registrations.iter_mut().find(|r| r.id == id) {
            r.created_at = at;
            r.updated_at = at;
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.tables.lock().unwrap().events.clone()
    }

    fn check(&self) -> Result<(), DatabaseError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DatabaseError::ConnectionError("store offline".to_string()));
        }
        Ok(())
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>, DatabaseError> {
        self.check()?;
        Ok(self.tables.lock().unwrap())
    }
}

fn next_id(len: usize) -> i64 {
    len as i64 + 1
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        self.check()
    }

    async fn get_user(&self, telegram_id: i64) -> Result<Option<User>, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables
            .users
            .iter()
            .find(|u| u.telegram_id == telegram_id)
            .cloned())
    }

    async fn upsert_user(
        &self,
        telegram_id: i64,
        chat_id: i64,
        username: Option<&str>,
    ) -> Result<User, DatabaseError> {
        let mut tables = self.tables()?;
        if let Some(user) = tables.users.iter().find(|u| u.telegram_id == telegram_id) {
            return Ok(user.clone());
        }
        let now = Utc::now();
        let user = User {
            id: next_id(tables.users.len()),
            telegram_id,
            chat_id,
            username: username.map(str::to_string),
            name: None,
            nickname: None,
            phone: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn update_user_field(
        &self,
        telegram_id: i64,
        field: UserField,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let mut tables = self.tables()?;
        if let Some(user) = tables.users.iter_mut().find(|u| u.telegram_id == telegram_id) {
            let slot = match field {
                UserField::Name => &mut user.name,
                UserField::Nickname => &mut user.nickname,
                UserField::Phone => &mut user.phone,
            };
            *slot = Some(value.to_string());
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_events(&self, from: DateTime<Utc>) -> Result<Vec<Event>, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.starts_at >= from)
            .cloned()
            .collect())
    }

    async fn get_event_by_id(&self, id: i64) -> Result<Option<Event>, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables.events.iter().find(|e| e.id == id).cloned())
    }

    async fn get_upcoming_events(
        &self,
        now: DateTime<Utc>,
        within: Duration,
    ) -> Result<Vec<Event>, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.starts_at > now && e.starts_at <= now + within)
            .cloned()
            .collect())
    }

    async fn create_event(&self, event: NewEvent) -> Result<Event, DatabaseError> {
        let mut tables = self.tables()?;
        let event = Event {
            id: next_id(tables.events.len()),
            title: event.title,
            description: event.description,
            location: event.location,
            starts_at: event.starts_at,
        };
        tables.events.push(event.clone());
        Ok(event)
    }

    async fn registration_exists(
        &self,
        event_id: i64,
        user_id: i64,
    ) -> Result<bool, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables.registrations.iter().any(|r| {
            r.event_id == event_id && r.user_id == user_id && r.status == RegistrationStatus::Active
        }))
    }

    async fn create_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Registration, DatabaseError> {
        let mut tables = self.tables()?;
        if tables
            .registrations
            .iter()
            .any(|r| r.user_id == user_id && r.event_id == event_id)
        {
            return Err(DatabaseError::Conflict);
        }
        let now = Utc::now();
        let registration = Registration {
            id: next_id(tables.registrations.len()),
            user_id,
            event_id,
            status: RegistrationStatus::Active,
            created_at: now,
            updated_at: now,
            reminder24_sent: false,
            reminder1_sent: false,
        };
        tables.registrations.push(registration.clone());
        Ok(registration)
    }

    async fn reactivate_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Registration>, DatabaseError> {
        let mut tables = self.tables()?;
        Ok(tables
            .registrations
            .iter_mut()
            .find(|r| {
                r.user_id == user_id
                    && r.event_id == event_id
                    && r.status == RegistrationStatus::Canceled
            })
            .map(|r| {
                r.status = RegistrationStatus::Active;
                r.updated_at = Utc::now();
                r.clone()
            }))
    }

    async fn delete_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Registration>, DatabaseError> {
        let mut tables = self.tables()?;
        Ok(tables
            .registrations
            .iter_mut()
            .find(|r| {
                r.user_id == user_id
                    && r.event_id == event_id
                    && r.status == RegistrationStatus::Active
            })
            .map(|r| {
                r.status = RegistrationStatus::Canceled;
                r.updated_at = Utc::now();
                r.clone()
            }))
    }

    async fn list_registrations_for_user(
        &self,
        telegram_id: i64,
    ) -> Result<Vec<RegistrationWithEvent>, DatabaseError> {
        let tables = self.tables()?;
        let Some(user) = tables.users.iter().find(|u| u.telegram_id == telegram_id) else {
            return Ok(Vec::new());
        };
        Ok(tables
            .registrations
            .iter()
            .filter(|r| r.user_id == user.id && r.status == RegistrationStatus::Active)
            .filter_map(|r| {
                let event = tables.events.iter().find(|e| e.id == r.event_id)?;
                Some(RegistrationWithEvent {
                    registration: r.clone(),
                    event: event.clone(),
                })
            })
            .collect())
    }

    async fn list_registrations_for_event(
        &self,
        event_id: i64,
    ) -> Result<Vec<RegistrationWithUser>, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables
            .registrations
            .iter()
            .filter(|r| r.event_id == event_id && r.status == RegistrationStatus::Active)
            .filter_map(|r| {
                let user = tables.users.iter().find(|u| u.id == r.user_id)?;
                Some(RegistrationWithUser {
                    registration: r.clone(),
                    user: user.clone(),
                })
            })
            .collect())
    }

    async fn count_active_registrations(&self, event_id: i64) -> Result<usize, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables
            .registrations
            .iter()
            .filter(|r| r.event_id == event_id && r.status == RegistrationStatus::Active)
            .count())
    }

    async fn list_participants_pending_flag(
        &self,
        event_id: i64,
        flag: ReminderFlag,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<User>, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables
            .registrations
            .iter()
            .filter(|r| {
                r.event_id == event_id
                    && r.status == RegistrationStatus::Active
                    && !r.flag(flag)
                    && r.updated_at <= cutoff
            })
            .filter_map(|r| tables.users.iter().find(|u| u.id == r.user_id).cloned())
            .collect())
    }

    async fn set_flag_for_events(
        &self,
        event_ids: &[i64],
        flag: ReminderFlag,
        cutoff: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let mut tables = self.tables()?;
        for r in tables
            .registrations
            .iter_mut()
            .filter(|r| event_ids.contains(&r.event_id) && r.updated_at <= cutoff)
        {
            match flag {
                ReminderFlag::Reminder24 => r.reminder24_sent = true,
                ReminderFlag::Reminder1 => r.reminder1_sent = true,
            }
        }
        Ok(())
    }
}
