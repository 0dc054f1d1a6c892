use crate::communication::telegram::Reply;
use crate::database::DatabaseError;
use crate::events::EventError;
use crate::locales;
use crate::registration::RegistrationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InteractionError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Event(#[from] EventError),
    #[error(transparent)]
    Persistence(#[from] DatabaseError),
}

impl InteractionError {
    // Failures caused by the user's input rather than the backend
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            InteractionError::Persistence(_)
                | InteractionError::Registration(RegistrationError::Persistence(_))
                | InteractionError::Event(EventError::Persistence(_))
        )
    }
}

pub fn map_interaction_error_to_user_message(error: &InteractionError) -> &'static str {
    match error {
        InteractionError::Registration(e) => match e {
            RegistrationError::UserNotFound => locales::ERROR_USER_NOT_FOUND,
            RegistrationError::EventNotFound => locales::ERROR_EVENT_NOT_FOUND,
            RegistrationError::AlreadyRegistered => locales::ERROR_ALREADY_REGISTERED,
            RegistrationError::RegistrationNotFound => locales::ERROR_REGISTRATION_NOT_FOUND,
            RegistrationError::Persistence(_) => locales::ERROR_TRY_LATER,
        },
        InteractionError::Event(e) => match e {
            EventError::Validation(_) | EventError::InvalidLocalTime => {
                locales::ERROR_INVALID_DATETIME
            }
            EventError::Persistence(_) => locales::ERROR_TRY_LATER,
        },
        InteractionError::Persistence(_) => locales::ERROR_TRY_LATER,
    }
}

pub fn create_error_reply(error: &InteractionError) -> Reply {
    Reply::plain(map_interaction_error_to_user_message(error))
}
