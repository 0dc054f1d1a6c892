use super::super::types::{Event, NewEvent};
use super::{optional_row, rows, timestamp, DatabaseError, DatabaseService, Fetch};
use chrono::{DateTime, Utc};

impl DatabaseService {
    pub async fn get_events_from(&self, from: DateTime<Utc>) -> Result<Vec<Event>, DatabaseError> {
        let response = self
            .client
            .from("events")
            .select("*")
            .gte("starts_at", timestamp(from))
            .order("starts_at.asc")
            .fetch()
            .await?;

        rows(response)
    }

    pub async fn get_events_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Event>, DatabaseError> {
        let response = self
            .client
            .from("events")
            .select("*")
            .gt("starts_at", timestamp(after))
            .lte("starts_at", timestamp(until))
            .order("starts_at.asc")
            .fetch()
            .await?;

        rows(response)
    }

    pub async fn fetch_event(&self, id: i64) -> Result<Option<Event>, DatabaseError> {
        let response = self
            .client
            .from("events")
            .select("*")
            .eq("id", id.to_string())
            .single()
            .fetch()
            .await?;

        optional_row(response)
    }

    pub async fn insert_event(&self, event: NewEvent) -> Result<Event, DatabaseError> {
        let body =
            serde_json::to_string(&event).map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        let response = self.client.from("events").insert(body).fetch().await?;

        let mut created: Vec<Event> = rows(response)?;
        if created.is_empty() {
            return Err(DatabaseError::QueryError("No event returned".to_string()));
        }
        Ok(created.remove(0))
    }
}
