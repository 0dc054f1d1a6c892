//! One notification pass per tick: reminders at fixed lead times before an
//! event, then the quorum roll-call.
//!
//! Reminder flags only move from unsent to sent. Each pass captures a cutoff
//! instant before reading participants and only selects or flags rows last
//! written at or before it, so a registration landing mid-pass is handled on
//! the next tick instead of being flagged without a message. Quorum keeps no
//! state and re-announces on every tick while the threshold holds.

use super::{MessageFormat, Notifier};
use crate::database::{DatabaseError, Event, EventStore, ReminderFlag};
use crate::locales;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

const REMINDERS: [ReminderFlag; 2] = [ReminderFlag::Reminder24, ReminderFlag::Reminder1];

fn lead_time(flag: ReminderFlag) -> Duration {
    match flag {
        ReminderFlag::Reminder24 => Duration::hours(24),
        ReminderFlag::Reminder1 => Duration::hours(1),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub reminders_sent: usize,
    pub delivery_failures: usize,
    pub events_flagged: usize,
    pub quorum_broadcasts: usize,
    pub skipped: bool,
}

pub struct NotificationScheduler {
    store: Arc<dyn EventStore>,
    notifier: Arc<dyn Notifier>,
    timezone: Tz,
    announcement_chat_id: i64,
    quorum_threshold: usize,
    quorum_lookahead: Duration,
    running: Mutex<()>,
}

impl NotificationScheduler {
    pub fn new(
        store: Arc<dyn EventStore>,
        notifier: Arc<dyn Notifier>,
        timezone: Tz,
        announcement_chat_id: i64,
        quorum_threshold: usize,
        quorum_lookahead: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            timezone,
            announcement_chat_id,
            quorum_threshold,
            quorum_lookahead,
            running: Mutex::new(()),
        }
    }

    /// Runs every reminder pass and the quorum check against `now`.
    ///
    /// A persistence failure aborts the remainder of the tick; delivery
    /// failures are logged and counted. Returns a skipped report when the
    /// previous tick is still running.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, DatabaseError> {
        let Ok(_running) = self.running.try_lock() else {
            return Ok(TickReport {
                skipped: true,
                ..Default::default()
            });
        };

        let mut report = TickReport::default();
        for flag in REMINDERS {
            self.reminder_pass(flag, now, &mut report).await?;
        }
        self.quorum_pass(now, &mut report).await?;
        Ok(report)
    }

    async fn reminder_pass(
        &self,
        flag: ReminderFlag,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), DatabaseError> {
        let cutoff = now;
        let events = self.store.get_upcoming_events(now, lead_time(flag)).await?;
        if events.is_empty() {
            return Ok(());
        }

        for event in &events {
            let participants = self
                .store
                .list_participants_pending_flag(event.id, flag, cutoff)
                .await?;
            if participants.is_empty() {
                continue;
            }

            let text = self.reminder_text(flag, event);
            let deliveries = participants
                .iter()
                .map(|user| self.notifier.send(user.chat_id, &text, MessageFormat::Plain));
            for result in join_all(deliveries).await {
                match result {
                    Ok(()) => report.reminders_sent += 1,
                    Err(e) => {
                        report.delivery_failures += 1;
                        error!(
                            chat_id = %e.chat_id,
                            event_id = event.id,
                            ?flag,
                            error = %e,
                            "Failed to deliver reminder"
                        );
                    }
                }
            }
        }

        let event_ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        self.store.set_flag_for_events(&event_ids, flag, cutoff).await?;
        report.events_flagged += event_ids.len();
        debug!(?flag, ?event_ids, "Reminder flags set");
        Ok(())
    }

    fn reminder_text(&self, flag: ReminderFlag, event: &Event) -> String {
        match flag {
            ReminderFlag::Reminder24 => {
                let local = event.starts_at.with_timezone(&self.timezone);
                locales::reminder_day_before(&local.format("%H:%M %d.%m.%Y").to_string(), &event.title)
            }
            ReminderFlag::Reminder1 => locales::reminder_hour_before(&event.title),
        }
    }

    async fn quorum_pass(
        &self,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), DatabaseError> {
        let events = self
            .store
            .get_upcoming_events(now, self.quorum_lookahead)
            .await?;

        for event in &events {
            let count = self.store.count_active_registrations(event.id).await?;
            if count < self.quorum_threshold {
                continue;
            }

            let mut registrations = self.store.list_registrations_for_event(event.id).await?;
            registrations.sort_by_key(|r| (r.registration.created_at, r.registration.id));
            let nicknames: Vec<&str> = registrations
                .iter()
                .map(|r| r.user.nickname_or_default())
                .collect();

            let local = event.starts_at.with_timezone(&self.timezone);
            let when = format!(
                "{} 🕐 {}.",
                locales::format_date_short(&local),
                local.format("%H:%M")
            );
            let text = locales::quorum_announcement(&event.title, &when, &event.location, &nicknames);

            match self
                .notifier
                .send(self.announcement_chat_id, &text, MessageFormat::Markdown)
                .await
            {
                Ok(()) => {
                    report.quorum_broadcasts += 1;
                    info!(event_id = event.id, count, "Quorum announced");
                }
                Err(e) => {
                    report.delivery_failures += 1;
                    error!(chat_id = %e.chat_id, event_id = event.id, error = %e, "Failed to announce quorum");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::{NewEvent, UserField};
    use crate::notifications::tests::RecordingNotifier;
    use crate::registration::RegistrationEngine;
    use chrono_tz::Europe::Madrid;

    const CHANNEL: i64 = -100500;

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        scheduler: NotificationScheduler,
        engine: RegistrationEngine,
    }

    fn fixture_with(notifier: RecordingNotifier) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(notifier);
        let scheduler = NotificationScheduler::new(
            store.clone(),
            notifier.clone(),
            Madrid,
            CHANNEL,
            12,
            Duration::days(6),
        );
        let engine = RegistrationEngine::new(store.clone());
        Fixture {
            store,
            notifier,
            scheduler,
            engine,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingNotifier::default())
    }

    impl Fixture {
        async fn event_in(&self, lead: Duration) -> Event {
            self.store
                .create_event(NewEvent {
                    title: "Вечер клубных игр".to_string(),
                    description: String::new(),
                    location: "Студия".to_string(),
                    starts_at: Utc::now() + lead,
                })
                .await
                .unwrap()
        }

        async fn player(&self, telegram_id: i64, nickname: &str) {
            self.store
                .upsert_user(telegram_id, telegram_id + 5000, None)
                .await
                .unwrap();
            self.store
                .update_user_field(telegram_id, UserField::Nickname, nickname)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn day_before_reminder_fires_once() {
        let f = fixture();
        let event = f.event_in(Duration::hours(23) + Duration::minutes(59)).await;
        f.player(1, "don").await;
        f.engine.register(1, event.id).await.unwrap();

        let report = f.scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report.reminders_sent, 1);
        let sent = f.notifier.sent_to(5001);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("Напоминание! Завтра в "));
        assert!(f.store.registrations()[0].reminder24_sent);
        assert!(!f.store.registrations()[0].reminder1_sent);

        let report = f.scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report.reminders_sent, 0);
        assert_eq!(f.notifier.sent_to(5001).len(), 1);
    }

    #[tokio::test]
    async fn late_registration_gets_both_reminders() {
        let f = fixture();
        let event = f.event_in(Duration::minutes(30)).await;
        f.player(1, "don").await;
        f.engine.register(1, event.id).await.unwrap();

        let report = f.scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report.reminders_sent, 2);
        let sent = f.notifier.sent_to(5001);
        assert_eq!(sent[1], locales::reminder_hour_before("Вечер клубных игр"));
    }

    #[tokio::test]
    async fn events_outside_window_are_untouched() {
        let f = fixture();
        let event = f.event_in(Duration::hours(30)).await;
        f.player(1, "don").await;
        f.engine.register(1, event.id).await.unwrap();

        let report = f.scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report, TickReport::default());
        assert!(!f.store.registrations()[0].reminder24_sent);
    }

    #[tokio::test]
    async fn failed_delivery_does_not_block_others() {
        let f = fixture_with(RecordingNotifier::failing(&[5001]));
        let event = f.event_in(Duration::hours(2)).await;
        for (id, nick) in [(1, "don"), (2, "vito")] {
            f.player(id, nick).await;
            f.engine.register(id, event.id).await.unwrap();
        }

        let report = f.scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report.delivery_failures, 1);
        assert_eq!(report.reminders_sent, 1);
        assert_eq!(f.notifier.sent_to(5002).len(), 1);
        // At-most-once: the failed recipient is flagged too
        assert!(f.store.registrations().iter().all(|r| r.reminder24_sent));
    }

    #[tokio::test]
    async fn registration_after_cutoff_waits_for_next_tick() {
        let f = fixture();
        let event = f.event_in(Duration::hours(2)).await;
        f.player(1, "don").await;
        let registration = f.engine.register(1, event.id).await.unwrap();

        // The pass started before the registration was written
        let pass_start = registration.updated_at - Duration::seconds(1);
        let report = f.scheduler.tick(pass_start).await.unwrap();
        assert_eq!(report.reminders_sent, 0);
        assert!(!f.store.registrations()[0].reminder24_sent);

        let report = f.scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report.reminders_sent, 1);
        assert!(f.store.registrations()[0].reminder24_sent);
    }

    #[tokio::test]
    async fn canceled_registrations_get_no_reminder() {
        let f = fixture();
        let event = f.event_in(Duration::hours(2)).await;
        f.player(1, "don").await;
        f.engine.register(1, event.id).await.unwrap();
        f.engine.cancel(1, event.id).await.unwrap();

        let report = f.scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report.reminders_sent, 0);
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn read_failure_aborts_tick() {
        let f = fixture();
        let event = f.event_in(Duration::hours(2)).await;
        f.player(1, "don").await;
        f.engine.register(1, event.id).await.unwrap();
        f.store.set_unavailable(true);

        assert!(f.scheduler.tick(Utc::now()).await.is_err());
        assert!(f.notifier.sent().is_empty());

        f.store.set_unavailable(false);
        let report = f.scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report.reminders_sent, 1);
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let f = fixture();
        let _held = f.scheduler.running.lock().await;
        let report = f.scheduler.tick(Utc::now()).await.unwrap();
        assert!(report.skipped);
    }

    #[tokio::test]
    async fn quorum_fires_at_threshold_and_refires() {
        let f = fixture();
        let event = f.event_in(Duration::days(3)).await;
        for i in 1..=12 {
            f.player(i, &format!("p{:02}", i)).await;
        }
        for i in 1..=11 {
            f.engine.register(i, event.id).await.unwrap();
        }

        let report = f.scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report.quorum_broadcasts, 0);
        assert!(f.notifier.sent_to(CHANNEL).is_empty());

        f.engine.register(12, event.id).await.unwrap();
        let report = f.scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report.quorum_broadcasts, 1);

        let broadcasts = f.notifier.sent_to(CHANNEL);
        assert_eq!(broadcasts.len(), 1);
        let roster: Vec<&str> = broadcasts[0]
            .lines()
            .filter(|l| l.contains(") @"))
            .collect();
        let expected: Vec<String> = (1..=12).map(|i| format!("{}) @p{:02}", i, i)).collect();
        assert_eq!(roster, expected);
        assert!(broadcasts[0].contains("🕐"));

        let report = f.scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report.quorum_broadcasts, 1);
        assert_eq!(f.notifier.sent_to(CHANNEL).len(), 2);
    }

    #[tokio::test]
    async fn quorum_roster_follows_signup_order() {
        let f = fixture();
        let event = f.event_in(Duration::days(2)).await;
        let mut ids = Vec::new();
        for i in 1..=12 {
            f.player(i, &format!("p{:02}", i)).await;
            ids.push(f.engine.register(i, event.id).await.unwrap().id);
        }
        // Reverse the signup times
        let base = Utc::now() - Duration::hours(1);
        for (n, id) in ids.iter().enumerate() {
            f.store
                .set_registration_times(*id, base + Duration::minutes(12 - n as i64));
        }

        f.scheduler.tick(Utc::now()).await.unwrap();
        let broadcast = &f.notifier.sent_to(CHANNEL)[0];
        assert!(broadcast.contains("1) @p12\n"));
        assert!(broadcast.contains("12) @p01\n"));
    }

    #[tokio::test]
    async fn quorum_ignores_events_beyond_lookahead() {
        let f = fixture();
        let event = f.event_in(Duration::days(7)).await;
        for i in 1..=12 {
            f.player(i, &format!("p{:02}", i)).await;
            f.engine.register(i, event.id).await.unwrap();
        }

        let report = f.scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report.quorum_broadcasts, 0);
    }
}
