use crate::audit::{AuditMirror, AuditSink};
use crate::database::EventStore;
use chrono_tz::Tz;
use serde::Deserialize;
use std::env;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use teloxide::Bot;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File read error")]
    FileError,

    #[error("Deserialization error:{0}")]
    DeserializationError(String),

    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("Unknown timezone:{0}")]
    InvalidTimezone(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub admin_ids: Vec<i64>,
    pub announcement_chat_id: i64,
    pub spreadsheet_id: String,
    #[serde(default = "default_health_port")]
    pub health_port: u16,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    #[serde(default = "default_quorum_threshold")]
    pub quorum_threshold: usize,
    #[serde(default = "default_quorum_lookahead_days")]
    pub quorum_lookahead_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
            quorum_threshold: default_quorum_threshold(),
            quorum_lookahead_days: default_quorum_lookahead_days(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(1))
    }

    pub fn quorum_lookahead(&self) -> chrono::Duration {
        chrono::Duration::days(self.quorum_lookahead_days)
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_timezone() -> String {
    "Europe/Madrid".to_string()
}

fn default_health_port() -> u16 {
    8080
}

fn default_tick_seconds() -> u64 {
    60
}

fn default_quorum_threshold() -> usize {
    12
}

fn default_quorum_lookahead_days() -> i64 {
    6
}

impl Config {
    pub fn new(config_file: &str) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(config_file).map_err(|_| ConfigError::FileError)?;
        Self::from_json(&config_str)
    }

    pub fn from_json(config_str: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(config_str)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        Ok(config)
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }

    pub fn is_admin(&self, telegram_id: i64) -> bool {
        self.admin_ids.contains(&telegram_id)
    }
}

// Credentials that must never live in config.json
#[derive(Debug, Clone)]
pub struct Secrets {
    pub telegram_token: String,
    pub database_url: String,
    pub database_key: Option<String>,
    pub google_credentials_path: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            telegram_token: required("TELEGRAM_TOKEN")?,
            database_url: required("DATABASE_URL")?,
            database_key: env::var("DATABASE_KEY").ok().filter(|key| !key.is_empty()),
            google_credentials_path: required("GOOGLE_CREDENTIALS_PATH")?,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv(name)),
    }
}

#[derive(Clone)]
pub struct Context {
    pub config: Config,
    pub timezone: Tz,
    pub bot: Bot,
    pub store: Arc<dyn EventStore>,
    pub audit: AuditMirror,
    pub audit_sink: Arc<dyn AuditSink>,
}

impl Context {
    pub fn new(
        config: Config,
        bot: Bot,
        store: Arc<dyn EventStore>,
        audit: AuditMirror,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Result<Self, ConfigError> {
        let timezone = config.timezone()?;
        Ok(Self {
            config,
            timezone,
            bot,
            store,
            audit,
            audit_sink,
        })
    }
}
