use super::errors::DatabaseError;
use super::types::{
    Event, NewEvent, Registration, RegistrationWithEvent, RegistrationWithUser, ReminderFlag, User,
    UserField,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Typed access to users, events and registrations.
///
/// Implementations enforce `UNIQUE(user_id, event_id)` on registrations and
/// report a violation as [`DatabaseError::Conflict`]; callers rely on that,
/// not on a prior [`EventStore::registration_exists`] check. Every read that
/// concerns registrations only sees rows with status `active`.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn ping(&self) -> Result<(), DatabaseError>;

    async fn get_user(&self, telegram_id: i64) -> Result<Option<User>, DatabaseError>;

    /// Returns the existing user untouched, or creates one on first contact.
    async fn upsert_user(
        &self,
        telegram_id: i64,
        chat_id: i64,
        username: Option<&str>,
    ) -> Result<User, DatabaseError>;

    async fn update_user_field(
        &self,
        telegram_id: i64,
        field: UserField,
        value: &str,
    ) -> Result<(), DatabaseError>;

    /// Events starting at or after `from`, ordered by start.
    async fn get_events(&self, from: DateTime<Utc>) -> Result<Vec<Event>, DatabaseError>;

    async fn get_event_by_id(&self, id: i64) -> Result<Option<Event>, DatabaseError>;

    /// Events with `starts_at` in `(now, now + within]`.
    async fn get_upcoming_events(
        &self,
        now: DateTime<Utc>,
        within: Duration,
    ) -> Result<Vec<Event>, DatabaseError>;

    async fn create_event(&self, event: NewEvent) -> Result<Event, DatabaseError>;

    async fn registration_exists(&self, event_id: i64, user_id: i64)
        -> Result<bool, DatabaseError>;

    async fn create_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Registration, DatabaseError>;

    /// Flips a canceled row back to active. `None` when there is no canceled
    /// row for the pair.
    async fn reactivate_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Registration>, DatabaseError>;

    /// Soft delete: marks the active row canceled, keeping its reminder flags.
    /// `None` when there is no active row for the pair.
    async fn delete_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Registration>, DatabaseError>;

    async fn list_registrations_for_user(
        &self,
        telegram_id: i64,
    ) -> Result<Vec<RegistrationWithEvent>, DatabaseError>;

    async fn list_registrations_for_event(
        &self,
        event_id: i64,
    ) -> Result<Vec<RegistrationWithUser>, DatabaseError>;

    async fn count_active_registrations(&self, event_id: i64) -> Result<usize, DatabaseError>;

    /// Users whose registration for `event_id` still has `flag` unset and was
    /// last touched no later than `cutoff`.
    async fn list_participants_pending_flag(
        &self,
        event_id: i64,
        flag: ReminderFlag,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<User>, DatabaseError>;

    /// Sets `flag` on every registration of the given events last touched no
    /// later than `cutoff`.
    async fn set_flag_for_events(
        &self,
        event_ids: &[i64],
        flag: ReminderFlag,
        cutoff: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;
}
