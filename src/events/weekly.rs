//! Monday jobs: create the week's club nights at midnight, announce that
//! registration is open at noon. Each job runs at most once per local date.

use super::EventGenerator;
use crate::configuration::Context;
use crate::core::service_manager::{Error as ServiceManagerError, Service};
use crate::notifications::{announce_registration_open, Notifier, TelegramNotifier};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

const POLL_INTERVAL: Duration = Duration::from_secs(30);

// A job missed by more than this (process down) waits for next week
const GRACE_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeeklyJob {
    CreateEvents,
    AnnounceRegistration,
}

impl WeeklyJob {
    pub const ALL: [WeeklyJob; 2] = [WeeklyJob::CreateEvents, WeeklyJob::AnnounceRegistration];

    fn slot(&self) -> (Weekday, u32, u32) {
        match self {
            WeeklyJob::CreateEvents => (Weekday::Mon, 0, 0),
            WeeklyJob::AnnounceRegistration => (Weekday::Mon, 12, 0),
        }
    }

    /// True inside the job's slot when it has not run yet on this local date.
    pub fn is_due<T: TimeZone>(&self, now: &DateTime<T>, last_run: Option<NaiveDate>) -> bool {
        let (weekday, hour, minute) = self.slot();
        let today = now.date_naive();
        if now.weekday() != weekday || last_run == Some(today) {
            return false;
        }
        let Some(start) = NaiveTime::from_hms_opt(hour, minute, 0) else {
            return false;
        };
        let elapsed = now.time() - start;
        elapsed >= chrono::Duration::zero() && elapsed < chrono::Duration::minutes(GRACE_MINUTES)
    }
}

pub struct WeeklyScheduleService {
    generator: EventGenerator,
    notifier: Arc<dyn Notifier>,
    announcement_chat_id: i64,
    timezone: Tz,
    last_runs: HashMap<WeeklyJob, NaiveDate>,
}

#[async_trait]
impl Service for WeeklyScheduleService {
    type Context = Context;
    const NAME: &'static str = "weekly-schedule";

    async fn new(context: Context) -> Self {
        Self {
            generator: EventGenerator::new(
                context.store.clone(),
                context.audit.clone(),
                context.timezone,
            ),
            notifier: Arc::new(TelegramNotifier::new(context.bot.clone())),
            announcement_chat_id: context.config.announcement_chat_id,
            timezone: context.timezone,
            last_runs: HashMap::new(),
        }
    }

    async fn run(mut self) -> Result<(), ServiceManagerError> {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            self.run_due_jobs(Utc::now()).await;
        }
    }
}

impl WeeklyScheduleService {
    async fn run_due_jobs(&mut self, now: DateTime<Utc>) {
        let local = now.with_timezone(&self.timezone);
        for job in WeeklyJob::ALL {
            if !job.is_due(&local, self.last_runs.get(&job).copied()) {
                continue;
            }
            // Marked before running: a failed job is not retried the same day
            self.last_runs.insert(job, local.date_naive());
            self.run_job(job, now).await;
        }
    }

    async fn run_job(&self, job: WeeklyJob, now: DateTime<Utc>) {
        match job {
            WeeklyJob::CreateEvents => match self.generator.create_weekly_events(now).await {
                Ok(events) => info!(count = events.len(), "Weekly events created"),
                Err(e) => error!(error = %e, "Failed to create weekly events"),
            },
            WeeklyJob::AnnounceRegistration => {
                if let Err(e) =
                    announce_registration_open(self.notifier.as_ref(), self.announcement_chat_id)
                        .await
                {
                    error!(chat_id = %e.chat_id, error = %e, "Failed to announce registration");
                }
            }
        }
    }
}
