//! Registration lifecycle: register, cancel, lookups.
//!
//! The store's uniqueness constraint on `(user_id, event_id)` is the only
//! guard against double registration. [`RegistrationEngine::exists`] is for
//! rendering buttons, never for correctness. A canceled registration is
//! reactivated in place when the user registers again, so its reminder flags
//! survive and nobody gets the same reminder twice.

use crate::database::{
    DatabaseError, EventStore, Registration, RegistrationWithEvent, RegistrationWithUser,
    RosterEntry,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("User not found")]
    UserNotFound,
    #[error("Event not found")]
    EventNotFound,
    #[error("Already registered")]
    AlreadyRegistered,
    #[error("Registration not found")]
    RegistrationNotFound,
    #[error(transparent)]
    Persistence(#[from] DatabaseError),
}

#[derive(Clone)]
pub struct RegistrationEngine {
    store: Arc<dyn EventStore>,
}

impl RegistrationEngine {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub async fn register(
        &self,
        telegram_id: i64,
        event_id: i64,
    ) -> Result<Registration, RegistrationError> {
        let user = self
            .store
            .get_user(telegram_id)
            .await?
            .ok_or(RegistrationError::UserNotFound)?;
        // A missing event would otherwise surface as a foreign-key conflict
        if self.store.get_event_by_id(event_id).await?.is_none() {
            return Err(RegistrationError::EventNotFound);
        }

        match self.store.create_registration(user.id, event_id).await {
            Ok(registration) => {
                info!(telegram_id, event_id, registration_id = registration.id, "Registered");
                Ok(registration)
            }
            Err(DatabaseError::Conflict) => {
                match self.store.reactivate_registration(user.id, event_id).await? {
                    Some(registration) => {
                        info!(
                            telegram_id,
                            event_id,
                            registration_id = registration.id,
                            "Registration reactivated"
                        );
                        Ok(registration)
                    }
                    None => {
                        debug!(telegram_id, event_id, "Duplicate registration rejected");
                        Err(RegistrationError::AlreadyRegistered)
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn cancel(
        &self,
        telegram_id: i64,
        event_id: i64,
    ) -> Result<Registration, RegistrationError> {
        let user = self
            .store
            .get_user(telegram_id)
            .await?
            .ok_or(RegistrationError::UserNotFound)?;

        let canceled = self
            .store
            .delete_registration(user.id, event_id)
            .await?
            .ok_or(RegistrationError::RegistrationNotFound)?;
        info!(telegram_id, event_id, registration_id = canceled.id, "Registration canceled");
        Ok(canceled)
    }

    pub async fn exists(&self, event_id: i64, user_id: i64) -> Result<bool, RegistrationError> {
        Ok(self.store.registration_exists(event_id, user_id).await?)
    }

    // Same as `exists`, keyed by the Telegram identity the controller has at hand
    pub async fn is_registered(
        &self,
        telegram_id: i64,
        event_id: i64,
    ) -> Result<bool, RegistrationError> {
        match self.store.get_user(telegram_id).await? {
            Some(user) => self.exists(event_id, user.id).await,
            None => Ok(false),
        }
    }

    /// Active registrations of the user joined with their events, soonest first.
    pub async fn list_for_user(
        &self,
        telegram_id: i64,
    ) -> Result<Vec<RegistrationWithEvent>, RegistrationError> {
        let mut registrations = self.store.list_registrations_for_user(telegram_id).await?;
        registrations.sort_by_key(|r| (r.event.starts_at, r.event.id));
        Ok(registrations)
    }

    /// Active registrations of the event joined with their users, in the order
    /// people signed up. Roster numbering depends on this order.
    pub async fn list_for_event(
        &self,
        event_id: i64,
    ) -> Result<Vec<RegistrationWithUser>, RegistrationError> {
        let mut registrations = self.store.list_registrations_for_event(event_id).await?;
        registrations.sort_by_key(|r| (r.registration.created_at, r.registration.id));
        Ok(registrations)
    }

    pub async fn roster(&self, event_id: i64) -> Result<Vec<RosterEntry>, RegistrationError> {
        Ok(self
            .list_for_event(event_id)
            .await?
            .iter()
            .map(RosterEntry::from)
            .collect())
    }
}
