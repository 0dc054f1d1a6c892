//! Per-user dialog state. Each Telegram user owns one [`UserSession`] behind
//! its own lock, so two messages from the same user never interleave while
//! different users proceed in parallel.

use crate::database::UserField;
use crate::locales;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Onboarding {
    #[default]
    Idle,
    AwaitingName,
    AwaitingNickname,
}

impl Onboarding {
    /// Profile field the next text message fills in, the following state and
    /// its prompt. `None` when no onboarding is in progress.
    pub fn accept(self) -> Option<(UserField, Onboarding, &'static str)> {
        match self {
            Onboarding::Idle => None,
            Onboarding::AwaitingName => Some((
                UserField::Name,
                Onboarding::AwaitingNickname,
                locales::ASK_NICKNAME,
            )),
            Onboarding::AwaitingNickname => Some((
                UserField::Nickname,
                Onboarding::Idle,
                locales::ONBOARDING_DONE,
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AdminWizard {
    #[default]
    Idle,
    AwaitingTitle,
    AwaitingDescription(EventDraft),
    AwaitingLocation(EventDraft),
    AwaitingDateTime(EventDraft),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardStep {
    Prompt(AdminWizard, &'static str),
    /// Draft complete; the raw date-time input still has to be validated.
    Submit(EventDraft, String),
    Inactive,
}

impl AdminWizard {
    pub fn accept(self, input: &str) -> WizardStep {
        let input = input.trim().to_string();
        match self {
            AdminWizard::Idle => WizardStep::Inactive,
            AdminWizard::AwaitingTitle => WizardStep::Prompt(
                AdminWizard::AwaitingDescription(EventDraft {
                    title: input,
                    ..Default::default()
                }),
                locales::ADMIN_ASK_DESCRIPTION,
            ),
            AdminWizard::AwaitingDescription(draft) => WizardStep::Prompt(
                AdminWizard::AwaitingLocation(EventDraft {
                    description: input,
                    ..draft
                }),
                locales::ADMIN_ASK_LOCATION,
            ),
            AdminWizard::AwaitingLocation(draft) => WizardStep::Prompt(
                AdminWizard::AwaitingDateTime(EventDraft {
                    location: input,
                    ..draft
                }),
                locales::ADMIN_ASK_DATETIME,
            ),
            AdminWizard::AwaitingDateTime(draft) => WizardStep::Submit(draft, input),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSession {
    pub onboarding: Onboarding,
    pub admin_wizard: AdminWizard,
}

#[derive(Default)]
pub struct Sessions {
    sessions: DashMap<i64, Arc<Mutex<UserSession>>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    // The shard guard is released before the caller awaits the user lock
    pub fn for_user(&self, telegram_id: i64) -> Arc<Mutex<UserSession>> {
        self.sessions.entry(telegram_id).or_default().clone()
    }
}
