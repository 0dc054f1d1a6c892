use super::{AuditError, AuditSink, RegistrationLine};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use moka::sync::Cache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::time::Duration;
use tracing::{info, warn};
use urlencoding::encode as url_encode;

const SHEETS_API: &str = "https://sheets.googleapis.com";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_KEY: &str = "access_token";
// Google issues hour-long tokens; refresh well before that
const TOKEN_TTL: Duration = Duration::from_secs(50 * 60);
const HEADERS: [&str; 8] = [
    "ID",
    "TelegramLink",
    "Username",
    "Имя",
    "Игровой Ник",
    "Статус",
    "CreatedAt",
    "UpdatedAt",
];

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Google Sheets v4 client authenticated as a service account.
pub struct SheetsClient {
    http: Client,
    key: ServiceAccountKey,
    spreadsheet_id: String,
    api_base: String,
    timezone: Tz,
    tokens: Cache<&'static str, String>,
}

impl SheetsClient {
    pub fn new(key: ServiceAccountKey, spreadsheet_id: &str, timezone: Tz) -> Self {
        Self {
            http: Client::new(),
            key,
            spreadsheet_id: spreadsheet_id.to_string(),
            api_base: SHEETS_API.to_string(),
            timezone,
            tokens: Cache::builder()
                .max_capacity(1)
                .time_to_live(TOKEN_TTL)
                .build(),
        }
    }

    pub fn from_file(path: &str, spreadsheet_id: &str, timezone: Tz) -> Result<Self, AuditError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| AuditError::Credentials(format!("{}: {}", path, e)))?;
        let key: ServiceAccountKey =
            serde_json::from_str(&raw).map_err(|e| AuditError::Credentials(e.to_string()))?;
        Ok(Self::new(key, spreadsheet_id, timezone))
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    async fn access_token(&self) -> Result<String, AuditError> {
        if let Some(token) = self.tokens.get(TOKEN_KEY) {
            return Ok(token);
        }

        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| AuditError::Credentials(e.to_string()))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .map_err(|e| AuditError::Credentials(e.to_string()))?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuditError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let token: TokenResponse = response.json().await?;

        self.tokens.insert(TOKEN_KEY, token.access_token.clone());
        Ok(token.access_token)
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.api_base,
            self.spreadsheet_id,
            url_encode(range)
        )
    }

    fn format_time(&self, t: DateTime<Utc>) -> String {
        t.with_timezone(&self.timezone)
            .format("%d.%m.%Y %H:%M")
            .to_string()
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, AuditError> {
        let token = self.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuditError::Request(format!("{}: {}", status, body)));
        }
        Ok(response)
    }

    async fn add_sheet(&self, sheet_title: &str) -> Result<(), AuditError> {
        let url = format!(
            "{}/v4/spreadsheets/{}:batchUpdate",
            self.api_base, self.spreadsheet_id
        );
        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": sheet_title } } }]
        });
        self.send(self.http.post(url).json(&body)).await?;
        Ok(())
    }

    async fn write_headers(&self, sheet_title: &str) -> Result<(), AuditError> {
        let url = self.values_url(&format!("'{}'!A1:H1", sheet_title));
        let body = json!({ "values": [HEADERS] });
        self.send(
            self.http
                .put(url)
                .query(&[("valueInputOption", "RAW")])
                .json(&body),
        )
        .await?;
        Ok(())
    }

    // Data rows start at row 2, under the header. Rows appended before
    // reactivations were rewritten in place may repeat an id; the last one is live.
    async fn locate_row(
        &self,
        sheet_title: &str,
        registration_id: i64,
    ) -> Result<Option<usize>, AuditError> {
        let url = self.values_url(&format!("'{}'!A2:A", sheet_title));
        let range: ValueRange = self.send(self.http.get(url)).await?.json().await?;

        let wanted = registration_id.to_string();
        Ok(range
            .values
            .iter()
            .rposition(|row| row.first().is_some_and(|cell| cell_text(cell) == wanted))
            .map(|index| index + 2))
    }

    async fn find_row(&self, sheet_title: &str, registration_id: i64) -> Result<usize, AuditError> {
        self.locate_row(sheet_title, registration_id)
            .await?
            .ok_or(AuditError::RowNotFound(registration_id))
    }

    // Null leaves column G (created at) untouched
    async fn write_status(
        &self,
        sheet_title: &str,
        row: usize,
        status: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AuditError> {
        let url = self.values_url(&format!("'{}'!F{}:H{}", sheet_title, row, row));
        let body = json!({ "values": [[status, null, self.format_time(at)]] });
        self.send(
            self.http
                .put(url)
                .query(&[("valueInputOption", "RAW")])
                .json(&body),
        )
        .await?;
        Ok(())
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl AuditSink for SheetsClient {
    async fn on_event_created(&self, sheet_title: &str) -> Result<(), AuditError> {
        self.add_sheet(sheet_title).await?;
        info!(sheet = sheet_title, "New sheet was created");
        self.write_headers(sheet_title).await
    }

    async fn on_registration_created(
        &self,
        sheet_title: &str,
        line: &RegistrationLine,
    ) -> Result<(), AuditError> {
        // A re-registration reuses its row
        if let Some(row) = self.locate_row(sheet_title, line.id).await? {
            self.write_status(sheet_title, row, &line.status, line.updated_at)
                .await?;
            info!(registration_id = line.id, sheet = sheet_title, "Registration reactivated in sheet");
            return Ok(());
        }

        let url = format!("{}:append", self.values_url(&format!("'{}'!A2:H2", sheet_title)));
        let username = line
            .username
            .as_deref()
            .map(|u| format!("@{}", u))
            .unwrap_or_default();
        let body = json!({
            "values": [[
                line.id,
                line.telegram_link,
                username,
                line.name,
                line.nickname,
                line.status,
                self.format_time(line.created_at),
                self.format_time(line.updated_at),
            ]]
        });
        self.send(
            self.http
                .post(url)
                .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn on_registration_canceled(
        &self,
        registration_id: i64,
        sheet_title: &str,
        canceled_at: DateTime<Utc>,
    ) -> Result<(), AuditError> {
        let row = match self.find_row(sheet_title, registration_id).await {
            Ok(row) => row,
            Err(e) => {
                warn!(registration_id, sheet = sheet_title, error = %e, "Cannot locate registration row");
                return Err(e);
            }
        };

        self.write_status(sheet_title, row, "canceled", canceled_at)
            .await?;
        info!(registration_id, sheet = sheet_title, "Registration marked canceled in sheet");
        Ok(())
    }
}
