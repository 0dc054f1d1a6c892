//! Recurring and ad hoc event creation.

use crate::audit::{sheet_title, AuditMirror};
use crate::database::{DatabaseError, Event, EventStore, NewEvent};
use crate::locales;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub mod schedule;
pub mod weekly;

pub use schedule::next_occurrence;
pub use weekly::WeeklyScheduleService;

pub const CLUB_NIGHT_TITLE: &str = "Вечер клубных игр";
pub const ADHOC_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

const STUDIO: &str =
    "🎙 Студия: [Calle Conejito de Málaga, 18](https://maps.app.goo.gl/K21A6KPB65FbNbcP8)";
const RESTAURANT: &str =
    "🍕 Ресторан: [La Mafia se sienta a la mesa](https://maps.app.goo.gl/nhiYHBUkETyxuYaq9)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurringTemplate {
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
    pub location: &'static str,
}

pub const FRIDAY_CLUB_NIGHT: RecurringTemplate = RecurringTemplate {
    weekday: Weekday::Fri,
    hour: 18,
    minute: 30,
    location: STUDIO,
};

pub const SATURDAY_CLUB_NIGHT: RecurringTemplate = RecurringTemplate {
    weekday: Weekday::Sat,
    hour: 17,
    minute: 0,
    location: STUDIO,
};

pub const SUNDAY_CLUB_NIGHT: RecurringTemplate = RecurringTemplate {
    weekday: Weekday::Sun,
    hour: 18,
    minute: 30,
    location: RESTAURANT,
};

pub const WEEKLY_TEMPLATES: [RecurringTemplate; 3] =
    [FRIDAY_CLUB_NIGHT, SATURDAY_CLUB_NIGHT, SUNDAY_CLUB_NIGHT];

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Invalid event input: {0}")]
    Validation(String),
    #[error("Local time does not exist in the configured timezone")]
    InvalidLocalTime,
    #[error(transparent)]
    Persistence(#[from] DatabaseError),
}

#[derive(Clone)]
pub struct EventGenerator {
    store: Arc<dyn EventStore>,
    audit: AuditMirror,
    timezone: Tz,
}

impl EventGenerator {
    pub fn new(store: Arc<dyn EventStore>, audit: AuditMirror, timezone: Tz) -> Self {
        Self {
            store,
            audit,
            timezone,
        }
    }

    pub async fn create_friday_event(&self, now: DateTime<Utc>) -> Result<Event, EventError> {
        self.create_from_template(&FRIDAY_CLUB_NIGHT, now).await
    }

    pub async fn create_saturday_event(&self, now: DateTime<Utc>) -> Result<Event, EventError> {
        self.create_from_template(&SATURDAY_CLUB_NIGHT, now).await
    }

    pub async fn create_sunday_event(&self, now: DateTime<Utc>) -> Result<Event, EventError> {
        self.create_from_template(&SUNDAY_CLUB_NIGHT, now).await
    }

    /// Creates the whole weekly set, stopping at the first failure.
    pub async fn create_weekly_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>, EventError> {
        let mut created = Vec::with_capacity(WEEKLY_TEMPLATES.len());
        for template in &WEEKLY_TEMPLATES {
            created.push(self.create_from_template(template, now).await?);
        }
        Ok(created)
    }

    pub async fn create_from_template(
        &self,
        template: &RecurringTemplate,
        now: DateTime<Utc>,
    ) -> Result<Event, EventError> {
        let local_now = now.with_timezone(&self.timezone);
        let starts_at = next_occurrence(&local_now, template.weekday, template.hour, template.minute)
            .ok_or(EventError::InvalidLocalTime)?;

        let description = locales::club_night_description(
            &locales::format_date(&starts_at),
            &starts_at.format("%H:%M").to_string(),
            template.location,
        );

        self.create_event(NewEvent {
            title: CLUB_NIGHT_TITLE.to_string(),
            description,
            location: template.location.to_string(),
            starts_at: starts_at.with_timezone(&Utc),
        })
        .await
    }

    pub async fn create_event(&self, new_event: NewEvent) -> Result<Event, EventError> {
        let event = self.store.create_event(new_event).await?;
        info!(event_id = event.id, starts_at = %event.starts_at, "Event created");

        self.audit
            .event_created(sheet_title(&event.title, event.starts_at, &self.timezone));
        Ok(event)
    }

    /// Parses an administrator's `YYYY-MM-DD HH:MM` input as local time.
    pub fn parse_start(&self, input: &str) -> Result<DateTime<Utc>, EventError> {
        let naive = NaiveDateTime::parse_from_str(input.trim(), ADHOC_DATETIME_FORMAT)
            .map_err(|e| EventError::Validation(e.to_string()))?;
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .ok_or(EventError::InvalidLocalTime)
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}
