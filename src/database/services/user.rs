use super::super::types::{User, UserField};
use super::{ensure_success, optional_row, rows, DatabaseError, DatabaseService, Fetch};
use tracing::debug;

impl DatabaseService {
    // Find user based on telegram id
    pub async fn get_user_by_telegram(
        &self,
        telegram_id: i64,
    ) -> Result<Option<User>, DatabaseError> {
        let response = self
            .client
            .from("users")
            .select("*")
            .eq("telegram_id", telegram_id.to_string())
            .single()
            .fetch()
            .await?;

        optional_row(response)
    }

    // Existing profiles are never overwritten on a repeated /start
    pub async fn get_or_create_user(
        &self,
        telegram_id: i64,
        chat_id: i64,
        username: Option<&str>,
    ) -> Result<User, DatabaseError> {
        if let Some(user) = self.get_user_by_telegram(telegram_id).await? {
            return Ok(user);
        }

        let new_user = serde_json::json!({
            "telegram_id": telegram_id,
            "chat_id": chat_id,
            "username": username,
        });

        let response = self
            .client
            .from("users")
            .insert(new_user.to_string())
            .fetch()
            .await?;

        match rows::<User>(response) {
            Ok(mut created) if !created.is_empty() => Ok(created.remove(0)),
            Ok(_) => Err(DatabaseError::QueryError("No user returned".to_string())),
            // Another interaction created the user between our read and insert
            Err(DatabaseError::Conflict) => {
                debug!(telegram_id, "User created concurrently, re-reading");
                self.get_user_by_telegram(telegram_id)
                    .await?
                    .ok_or_else(|| DatabaseError::QueryError("User vanished".to_string()))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn update_user_profile_field(
        &self,
        telegram_id: i64,
        field: UserField,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let mut update = serde_json::Map::new();
        update.insert(field.column().to_string(), value.into());
        update.insert("updated_at".to_string(), chrono::Utc::now().to_rfc3339().into());

        let response = self
            .client
            .from("users")
            .update(serde_json::Value::Object(update).to_string())
            .eq("telegram_id", telegram_id.to_string())
            .fetch()
            .await?;

        ensure_success(response).map(|_| ())
    }
}
