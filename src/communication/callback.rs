use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Inline-button payloads. Every variant carries an event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    ShowEvent(i64),
    Register(i64),
    Cancel(i64),
    AdminRoster(i64),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown callback payload: {0}")]
pub struct UnknownCallback(pub String);

impl FromStr for CallbackAction {
    type Err = UnknownCallback;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownCallback(data.to_string());
        // admin_ev_ must be tried before ev_
        let (build, id): (fn(i64) -> Self, &str) = if let Some(id) = data.strip_prefix("admin_ev_") {
            (CallbackAction::AdminRoster, id)
        } else if let Some(id) = data.strip_prefix("ev_") {
            (CallbackAction::ShowEvent, id)
        } else if let Some(id) = data.strip_prefix("register_") {
            (CallbackAction::Register, id)
        } else if let Some(id) = data.strip_prefix("cancel_") {
            (CallbackAction::Cancel, id)
        } else {
            return Err(unknown());
        };
        id.parse::<i64>().map(build).map_err(|_| unknown())
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::ShowEvent(id) => write!(f, "ev_{}", id),
            CallbackAction::Register(id) => write!(f, "register_{}", id),
            CallbackAction::Cancel(id) => write!(f, "cancel_{}", id),
            CallbackAction::AdminRoster(id) => write!(f, "admin_ev_{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_payloads() {
        assert_eq!("ev_12".parse(), Ok(CallbackAction::ShowEvent(12)));
        assert_eq!("register_7".parse(), Ok(CallbackAction::Register(7)));
        assert_eq!("cancel_7".parse(), Ok(CallbackAction::Cancel(7)));
        assert_eq!("admin_ev_3".parse(), Ok(CallbackAction::AdminRoster(3)));
    }

    #[test]
    fn rejects_garbage() {
        for data in ["", "ev_", "ev_x", "register", "delete_1", "admin_3"] {
            assert_eq!(
                data.parse::<CallbackAction>(),
                Err(UnknownCallback(data.to_string()))
            );
        }
    }

    #[test]
    fn display_matches_parser() {
        let action = CallbackAction::AdminRoster(41);
        assert_eq!(action.to_string(), "admin_ev_41");
        assert_eq!(action.to_string().parse(), Ok(action));
    }
}
