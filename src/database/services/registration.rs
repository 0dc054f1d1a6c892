use super::super::types::{
    Registration, RegistrationStatus, RegistrationWithEvent, RegistrationWithUser, ReminderFlag,
    User,
};
use super::{
    ensure_success, rows, timestamp, DatabaseError, DatabaseService, Fetch, RestResponse,
};
use chrono::{DateTime, Utc};

const ACTIVE: &str = "active";

impl DatabaseService {
    pub async fn active_registration_exists(
        &self,
        event_id: i64,
        user_id: i64,
    ) -> Result<bool, DatabaseError> {
        let response = self
            .client
            .from("registrations")
            .select("id")
            .eq("event_id", event_id.to_string())
            .eq("user_id", user_id.to_string())
            .eq("status", ACTIVE)
            .fetch()
            .await?;

        let ids: Vec<serde_json::Value> = rows(response)?;
        Ok(!ids.is_empty())
    }

    // A 409 from the unique (user_id, event_id) index surfaces as Conflict
    pub async fn insert_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Registration, DatabaseError> {
        let new_registration = serde_json::json!({
            "user_id": user_id,
            "event_id": event_id,
            "status": RegistrationStatus::Active,
        });

        let response = self
            .client
            .from("registrations")
            .insert(new_registration.to_string())
            .fetch()
            .await?;

        first_row(response)?.ok_or_else(|| {
            DatabaseError::QueryError("No registration returned".to_string())
        })
    }

    pub async fn reactivate_canceled_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Registration>, DatabaseError> {
        self.transition_status(
            user_id,
            event_id,
            RegistrationStatus::Canceled,
            RegistrationStatus::Active,
        )
        .await
    }

    pub async fn cancel_active_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Registration>, DatabaseError> {
        self.transition_status(
            user_id,
            event_id,
            RegistrationStatus::Active,
            RegistrationStatus::Canceled,
        )
        .await
    }

    // Conditional on the current status so concurrent transitions cannot both win
    async fn transition_status(
        &self,
        user_id: i64,
        event_id: i64,
        from: RegistrationStatus,
        to: RegistrationStatus,
    ) -> Result<Option<Registration>, DatabaseError> {
        let update = serde_json::json!({
            "status": to,
            "updated_at": timestamp(Utc::now()),
        });

        let response = self
            .client
            .from("registrations")
            .update(update.to_string())
            .eq("user_id", user_id.to_string())
            .eq("event_id", event_id.to_string())
            .eq("status", from.as_str())
            .fetch()
            .await?;

        first_row(response)
    }

    pub async fn get_user_registrations(
        &self,
        telegram_id: i64,
    ) -> Result<Vec<RegistrationWithEvent>, DatabaseError> {
        let Some(user) = self.get_user_by_telegram(telegram_id).await? else {
            return Ok(Vec::new());
        };

        let response = self
            .client
            .from("registrations")
            .select("*,event:events(*)")
            .eq("user_id", user.id.to_string())
            .eq("status", ACTIVE)
            .fetch()
            .await?;

        let mut registrations: Vec<RegistrationWithEvent> = rows(response)?;
        registrations.sort_by_key(|r| (r.event.starts_at, r.event.id));
        Ok(registrations)
    }

    pub async fn get_registrations_by_event(
        &self,
        event_id: i64,
    ) -> Result<Vec<RegistrationWithUser>, DatabaseError> {
        let response = self
            .client
            .from("registrations")
            .select("*,user:users(*)")
            .eq("event_id", event_id.to_string())
            .eq("status", ACTIVE)
            .order("created_at.asc,id.asc")
            .fetch()
            .await?;

        rows(response)
    }

    pub async fn get_event_participants_count(&self, event_id: i64) -> Result<usize, DatabaseError> {
        let response = self
            .client
            .from("registrations")
            .select("id")
            .eq("event_id", event_id.to_string())
            .eq("status", ACTIVE)
            .fetch()
            .await?;

        let ids: Vec<serde_json::Value> = rows(response)?;
        Ok(ids.len())
    }

    pub async fn get_event_participants_with_flag(
        &self,
        event_id: i64,
        flag: ReminderFlag,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<User>, DatabaseError> {
        let response = self
            .client
            .from("registrations")
            .select("*,user:users(*)")
            .eq("event_id", event_id.to_string())
            .eq("status", ACTIVE)
            .eq(flag.column(), "false")
            .lte("updated_at", timestamp(cutoff))
            .order("created_at.asc,id.asc")
            .fetch()
            .await?;

        let participants: Vec<RegistrationWithUser> = rows(response)?;
        Ok(participants.into_iter().map(|p| p.user).collect())
    }

    pub async fn update_registration_notification_status(
        &self,
        event_ids: &[i64],
        flag: ReminderFlag,
        cutoff: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        if event_ids.is_empty() {
            return Ok(());
        }

        let mut update = serde_json::Map::new();
        update.insert(flag.column().to_string(), true.into());

        let response = self
            .client
            .from("registrations")
            .update(serde_json::Value::Object(update).to_string())
            .in_("event_id", event_ids.iter().map(|id| id.to_string()))
            .lte("updated_at", timestamp(cutoff))
            .fetch()
            .await?;

        ensure_success(response).map(|_| ())
    }
}

fn first_row(response: RestResponse) -> Result<Option<Registration>, DatabaseError> {
    let mut updated: Vec<Registration> = rows(response)?;
    if updated.is_empty() {
        return Ok(None);
    }
    Ok(Some(updated.remove(0)))
}
