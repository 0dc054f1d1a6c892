//! Commands for the allowlisted organisers: event wizard, rosters,
//! recurring-event generation and the registration announcement.

use super::callback::CallbackAction;
use super::conversation::{AdminWizard, EventDraft, UserSession};
use super::error_handler::InteractionError;
use super::telegram::{Controller, Reply, Sender};
use crate::database::NewEvent;
use crate::locales;
use crate::notifications::announce_registration_open;
use crate::registration::RegistrationError;
use chrono::Utc;
use tracing::{debug, error, info};

impl Controller {
    pub(super) async fn admin_command(
        &self,
        session: &mut UserSession,
        command: &str,
    ) -> Result<Vec<Reply>, InteractionError> {
        match command {
            "/addevent" => {
                session.admin_wizard = AdminWizard::AwaitingTitle;
                Ok(vec![Reply::plain(locales::ADMIN_ASK_TITLE)])
            }
            "/registrations" => self.pick_roster_event().await,
            "/generate" => {
                let events = self.generator.create_weekly_events(Utc::now()).await?;
                info!(count = events.len(), "Weekly events generated on request");
                Ok(vec![Reply::plain(locales::ADMIN_EVENTS_GENERATED)])
            }
            "/notify_registration" => {
                let chat_id = self.config.announcement_chat_id;
                match announce_registration_open(self.notifier.as_ref(), chat_id).await {
                    Ok(()) => Ok(vec![Reply::plain(locales::ADMIN_ANNOUNCEMENT_SENT)]),
                    Err(e) => {
                        error!(chat_id = %e.chat_id, error = %e, "Failed to announce registration");
                        Ok(vec![Reply::plain(locales::ERROR_TRY_LATER)])
                    }
                }
            }
            _ => Ok(vec![Reply::plain(locales::ADMIN_HELP)]),
        }
    }

    async fn pick_roster_event(&self) -> Result<Vec<Reply>, InteractionError> {
        let events = self.upcoming_events(Utc::now()).await?;
        if events.is_empty() {
            return Ok(vec![Reply::plain(locales::NO_EVENTS)]);
        }
        let buttons = events
            .iter()
            .map(|e| (self.event_label(e), CallbackAction::AdminRoster(e.id)))
            .collect();
        Ok(vec![Reply::plain(locales::ADMIN_EVENTS_HEADER).with_buttons(buttons)])
    }

    pub(super) async fn roster(
        &self,
        sender: &Sender,
        event_id: i64,
    ) -> Result<Vec<Reply>, InteractionError> {
        if !self.config.is_admin(sender.telegram_id) {
            return Ok(Vec::new());
        }

        let event = self
            .store
            .get_event_by_id(event_id)
            .await?
            .ok_or(RegistrationError::EventNotFound)?;
        let roster = self.engine.roster(event_id).await?;
        if roster.is_empty() {
            return Ok(vec![Reply::plain(locales::ADMIN_NO_REGISTRATIONS)]);
        }

        let mut text = format!("*{}*\n", self.event_label(&event));
        for (i, entry) in roster.iter().enumerate() {
            text.push_str(&format!(
                "{}. [{} ({})](tg://user?id={})\n",
                i + 1,
                entry.name,
                entry.nickname,
                entry.telegram_id
            ));
        }
        Ok(vec![Reply::markdown(text)])
    }

    pub(super) async fn submit_event(
        &self,
        session: &mut UserSession,
        draft: EventDraft,
        input: &str,
    ) -> Result<Vec<Reply>, InteractionError> {
        let starts_at = match self.generator.parse_start(input) {
            Ok(starts_at) => starts_at,
            Err(e) => {
                debug!(input, error = %e, "Rejected event date");
                session.admin_wizard = AdminWizard::AwaitingDateTime(draft);
                return Ok(vec![Reply::plain(locales::ERROR_INVALID_DATETIME)]);
            }
        };

        let new_event = NewEvent {
            title: draft.title.clone(),
            description: draft.description.clone(),
            location: draft.location.clone(),
            starts_at,
        };
        if let Err(e) = self.generator.create_event(new_event).await {
            // Keep the draft so the organiser can resend the date
            session.admin_wizard = AdminWizard::AwaitingDateTime(draft);
            return Err(e.into());
        }
        Ok(vec![Reply::plain(locales::ADMIN_EVENT_ADDED)])
    }
}

#[cfg(test)]
mod tests {
    use crate::communication::telegram::tests::{callbacks, fixture, ADMIN, CHANNEL};
    use crate::audit::AuditRecord;
    use crate::locales;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn wizard_creates_event_and_reprompts_bad_dates() {
        let mut f = fixture();

        assert_eq!(f.text(ADMIN, "/addevent").await[0].text, locales::ADMIN_ASK_TITLE);
        f.text(ADMIN, "Турнир").await;
        f.text(ADMIN, "Финал сезона").await;
        assert_eq!(f.text(ADMIN, "Студия").await[0].text, locales::ADMIN_ASK_DATETIME);

        assert_eq!(
            f.text(ADMIN, "24/10 18:30").await[0].text,
            locales::ERROR_INVALID_DATETIME
        );
        assert_eq!(
            f.text(ADMIN, "2026-10-24 18:30").await[0].text,
            locales::ADMIN_EVENT_ADDED
        );

        let events = f.store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Турнир");
        assert_eq!(events[0].location, "Студия");
        assert_eq!(
            events[0].starts_at,
            Utc.with_ymd_and_hms(2026, 10, 24, 16, 30, 0).unwrap()
        );
        assert_eq!(
            f.audit.recv().await,
            Some(AuditRecord::EventCreated {
                sheet_title: "Турнир - 24.10".to_string()
            })
        );

        // Wizard is finished
        assert_eq!(f.text(ADMIN, "ещё текст").await[0].text, locales::HELP);
    }

    #[tokio::test]
    async fn commands_abandon_the_wizard() {
        let f = fixture();
        f.text(ADMIN, "/addevent").await;
        f.text(ADMIN, "/events").await;
        assert_eq!(f.text(ADMIN, "Турнир").await[0].text, locales::HELP);
    }

    #[tokio::test]
    async fn admin_commands_are_hidden_from_players() {
        let f = fixture();
        assert_eq!(f.text(42, "/generate").await[0].text, locales::HELP);
        assert_eq!(f.text(42, "/addevent").await[0].text, locales::HELP);
        assert!(f.store.events().is_empty());

        let event = f.event_in(Duration::days(1)).await;
        assert!(f.press(42, &format!("admin_ev_{}", event.id)).await.is_empty());
    }

    #[tokio::test]
    async fn generate_creates_weekly_set() {
        let f = fixture();
        assert_eq!(
            f.text(ADMIN, "/generate").await[0].text,
            locales::ADMIN_EVENTS_GENERATED
        );
        assert_eq!(f.store.events().len(), 3);
    }

    #[tokio::test]
    async fn notify_registration_posts_to_channel() {
        let f = fixture();
        assert_eq!(
            f.text(ADMIN, "/notify_registration").await[0].text,
            locales::ADMIN_ANNOUNCEMENT_SENT
        );
        assert_eq!(
            f.notifier.sent_to(CHANNEL),
            vec![locales::REGISTRATION_OPEN.to_string()]
        );
    }

    #[tokio::test]
    async fn roster_lists_players_in_signup_order() {
        let f = fixture();
        let event = f.event_in(Duration::days(2)).await;
        f.onboard(7, "Вито", "Дон").await;
        f.onboard(8, "Катя", "Шериф").await;
        f.press(8, &format!("register_{}", event.id)).await;
        f.press(7, &format!("register_{}", event.id)).await;

        let picker = f.text(ADMIN, "/registrations").await;
        assert_eq!(callbacks(&picker[0]), vec![format!("admin_ev_{}", event.id)]);

        let roster = f.press(ADMIN, &format!("admin_ev_{}", event.id)).await;
        let lines: Vec<&str> = roster[0].text.lines().skip(1).collect();
        assert_eq!(
            lines,
            vec![
                "1. [Катя (Шериф)](tg://user?id=8)",
                "2. [Вито (Дон)](tg://user?id=7)"
            ]
        );
    }

    #[tokio::test]
    async fn empty_roster_says_so() {
        let f = fixture();
        let event = f.event_in(Duration::days(2)).await;
        let roster = f.press(ADMIN, &format!("admin_ev_{}", event.id)).await;
        assert_eq!(roster[0].text, locales::ADMIN_NO_REGISTRATIONS);
    }
}
