use super::errors::DatabaseError;
use super::store::EventStore;
use super::types::{
    Event, NewEvent, Registration, RegistrationWithEvent, RegistrationWithUser, ReminderFlag, User,
    UserField,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use postgrest::{Builder, Postgrest};
use serde::de::DeserializeOwned;

mod event;
mod registration;
mod user;

pub struct DatabaseService {
    pub client: Postgrest,
}

impl DatabaseService {
    // `url` is the PostgREST root, e.g. https://<project>.supabase.co/rest/v1
    pub fn new(url: &str, service_key: Option<&str>) -> Self {
        let mut client = Postgrest::new(url.trim_end_matches('/'));
        if let Some(key) = service_key {
            client = client
                .insert_header("apikey", key)
                .insert_header("Authorization", format!("Bearer {}", key));
        }
        Self { client }
    }
}

// Status and body of a PostgREST call. postgrest pins its own reqwest
// release, so its response type never leaves `fetch`.
pub(crate) struct RestResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub(crate) trait Fetch {
    async fn fetch(self) -> Result<RestResponse, DatabaseError>;
}

#[async_trait]
impl Fetch for Builder {
    async fn fetch(self) -> Result<RestResponse, DatabaseError> {
        let response = self.execute().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                DatabaseError::ConnectionError(e.to_string())
            } else {
                DatabaseError::QueryError(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        Ok(RestResponse { status, body })
    }
}

// PostgREST answers 406 to `single()` when no row matches
pub(crate) fn optional_row<T: DeserializeOwned>(
    response: RestResponse,
) -> Result<Option<T>, DatabaseError> {
    if response.status == 406 {
        return Ok(None);
    }
    let response = ensure_success(response)?;
    let row: T = serde_json::from_str(&response.body)
        .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
    Ok(Some(row))
}

pub(crate) fn rows<T: DeserializeOwned>(response: RestResponse) -> Result<Vec<T>, DatabaseError> {
    let response = ensure_success(response)?;
    serde_json::from_str(&response.body).map_err(|e| DatabaseError::QueryError(e.to_string()))
}

pub(crate) fn ensure_success(response: RestResponse) -> Result<RestResponse, DatabaseError> {
    if response.status == 409 {
        return Err(DatabaseError::Conflict);
    }
    if !(200..300).contains(&response.status) {
        return Err(DatabaseError::QueryError(format!(
            "Request failed with status {}: {}",
            response.status, response.body
        )));
    }
    Ok(response)
}

pub(crate) fn timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl EventStore for DatabaseService {
    async fn ping(&self) -> Result<(), DatabaseError> {
        let response = self
            .client
            .from("events")
            .select("id")
            .limit(1)
            .fetch()
            .await?;
        ensure_success(response).map(|_| ())
    }

    async fn get_user(&self, telegram_id: i64) -> Result<Option<User>, DatabaseError> {
        self.get_user_by_telegram(telegram_id).await
    }

    async fn upsert_user(
        &self,
        telegram_id: i64,
        chat_id: i64,
        username: Option<&str>,
    ) -> Result<User, DatabaseError> {
        self.get_or_create_user(telegram_id, chat_id, username).await
    }

    async fn update_user_field(
        &self,
        telegram_id: i64,
        field: UserField,
        value: &str,
    ) -> Result<(), DatabaseError> {
        self.update_user_profile_field(telegram_id, field, value).await
    }

    async fn get_events(&self, from: DateTime<Utc>) -> Result<Vec<Event>, DatabaseError> {
        self.get_events_from(from).await
    }

    async fn get_event_by_id(&self, id: i64) -> Result<Option<Event>, DatabaseError> {
        self.fetch_event(id).await
    }

    async fn get_upcoming_events(
        &self,
        now: DateTime<Utc>,
        within: Duration,
    ) -> Result<Vec<Event>, DatabaseError> {
        self.get_events_between(now, now + within).await
    }

    async fn create_event(&self, event: NewEvent) -> Result<Event, DatabaseError> {
        self.insert_event(event).await
    }

    async fn registration_exists(
        &self,
        event_id: i64,
        user_id: i64,
    ) -> Result<bool, DatabaseError> {
        self.active_registration_exists(event_id, user_id).await
    }

    async fn create_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Registration, DatabaseError> {
        self.insert_registration(user_id, event_id).await
    }

    async fn reactivate_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Registration>, DatabaseError> {
        self.reactivate_canceled_registration(user_id, event_id)
            .await
    }

    async fn delete_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Registration>, DatabaseError> {
        self.cancel_active_registration(user_id, event_id).await
    }

    async fn list_registrations_for_user(
        &self,
        telegram_id: i64,
    ) -> Result<Vec<RegistrationWithEvent>, DatabaseError> {
        self.get_user_registrations(telegram_id).await
    }

    async fn list_registrations_for_event(
        &self,
        event_id: i64,
    ) -> Result<Vec<RegistrationWithUser>, DatabaseError> {
        self.get_registrations_by_event(event_id).await
    }

    async fn count_active_registrations(&self, event_id: i64) -> Result<usize, DatabaseError> {
        self.get_event_participants_count(event_id).await
    }

    async fn list_participants_pending_flag(
        &self,
        event_id: i64,
        flag: ReminderFlag,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<User>, DatabaseError> {
        self.get_event_participants_with_flag(event_id, flag, cutoff)
            .await
    }

    async fn set_flag_for_events(
        &self,
        event_ids: &[i64],
        flag: ReminderFlag,
        cutoff: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.update_registration_notification_status(event_ids, flag, cutoff)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn path(table: &str) -> Matcher {
        Matcher::Regex(format!("^/{}", table))
    }

    const REGISTRATION: &str = r#"[{"id": 7, "user_id": 3, "event_id": 5, "status": "active",
        "created_at": "2026-10-18T10:00:00Z", "updated_at": "2026-10-18T10:00:00Z",
        "reminder24_sent": false, "reminder1_sent": false}]"#;

    #[tokio::test]
    async fn duplicate_registration_maps_to_conflict() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", path("registrations"))
            .match_query(Matcher::Any)
            .with_status(409)
            .with_body(r#"{"code":"23505","message":"duplicate key value"}"#)
            .create_async()
            .await;

        let db = DatabaseService::new(&server.url(), Some("key"));
        let result = db.create_registration(3, 5).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(DatabaseError::Conflict)));
    }

    #[tokio::test]
    async fn inserted_registration_is_returned() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", path("registrations"))
            .match_query(Matcher::Any)
            .match_header("apikey", "key")
            .with_status(201)
            .with_body(REGISTRATION)
            .create_async()
            .await;

        let db = DatabaseService::new(&server.url(), Some("key"));
        let registration = db.create_registration(3, 5).await.unwrap();
        assert_eq!(registration.id, 7);
        assert_eq!(registration.status, crate::database::RegistrationStatus::Active);
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", path("users"))
            .match_query(Matcher::Any)
            .with_status(406)
            .create_async()
            .await;

        let db = DatabaseService::new(&server.url(), None);
        assert!(db.get_user(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_without_active_row_is_none() {
        let mut server = Server::new_async().await;
        server
            .mock("PATCH", path("registrations"))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let db = DatabaseService::new(&server.url(), None);
        assert!(db.delete_registration(3, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn participants_are_unwrapped_from_embedding() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", path("registrations"))
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("event_id".into(), "eq.5".into()),
                Matcher::UrlEncoded("reminder24_sent".into(), "eq.false".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[{"id": 7, "user_id": 3, "event_id": 5, "status": "active",
                "created_at": "2026-10-18T10:00:00Z", "updated_at": "2026-10-18T10:00:00Z",
                "reminder24_sent": false, "reminder1_sent": false,
                "user": {"id": 3, "telegram_id": 1001, "chat_id": 2002, "username": "don",
                "name": "Vito", "nickname": "Don", "phone": null,
                "created_at": "2026-10-01T10:00:00Z", "updated_at": "2026-10-01T10:00:00Z"}}]"#,
            )
            .create_async()
            .await;

        let db = DatabaseService::new(&server.url(), None);
        let users = db
            .list_participants_pending_flag(5, ReminderFlag::Reminder24, Utc::now())
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].chat_id, 2002);
    }

    #[tokio::test]
    async fn flag_update_skips_empty_event_set() {
        // No mock registered: any request would fail the call
        let server = Server::new_async().await;
        let db = DatabaseService::new(&server.url(), None);
        db.set_flag_for_events(&[], ReminderFlag::Reminder1, Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn server_error_is_query_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", path("events"))
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let db = DatabaseService::new(&server.url(), None);
        let result = db.get_events(Utc::now()).await;
        assert!(matches!(result, Err(DatabaseError::QueryError(_))));
    }

    #[tokio::test]
    async fn ping_reads_one_event_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", path("events"))
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), "id".into()),
                Matcher::UrlEncoded("limit".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let db = DatabaseService::new(&server.url(), Some("key"));
        db.ping().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_backend_is_connection_error() {
        let db = DatabaseService::new("http://127.0.0.1:1", None);
        assert!(matches!(
            db.ping().await,
            Err(DatabaseError::ConnectionError(_))
        ));
        assert!(matches!(
            db.get_user(42).await,
            Err(DatabaseError::ConnectionError(_))
        ));
    }

    #[test]
    fn undecodable_body_is_query_error() {
        let response = RestResponse {
            status: 200,
            body: "<html>".to_string(),
        };
        assert!(matches!(
            rows::<Event>(response),
            Err(DatabaseError::QueryError(_))
        ));
    }
}
