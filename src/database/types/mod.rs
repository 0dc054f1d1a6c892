mod event;
mod registration;
mod user;

pub use event::{Event, NewEvent};
pub use registration::{
    Registration, RegistrationStatus, RegistrationWithEvent, RegistrationWithUser, ReminderFlag,
    RosterEntry,
};
pub use user::{User, UserField};
