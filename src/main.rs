use club_bot::audit::{AuditMirror, AuditService, SheetsClient, QUEUE_CAPACITY};
use club_bot::communication::TelegramService;
use club_bot::configuration::{Config, Context, Secrets};
use club_bot::core::{HealthService, ServiceManager};
use club_bot::database::{DatabaseService, EventStore};
use club_bot::events::WeeklyScheduleService;
use club_bot::notifications::NotificationService;
use club_bot::AppError;
use dotenvy::dotenv;
use std::str::FromStr;
use std::sync::Arc;
use teloxide::Bot;
use tokio::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenv().ok();
    let config = Config::new("config.json").map_err(|e| AppError::ConfigError(e.to_string()))?;

    let log_level = Level::from_str(&config.log_level).unwrap_or(Level::INFO);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(log_level.to_string()))
        .init();
    tracing::info!("Starting club bot");

    let secrets = Secrets::from_env().map_err(|e| AppError::ConfigError(e.to_string()))?;
    let timezone = config
        .timezone()
        .map_err(|e| AppError::ConfigError(e.to_string()))?;

    let database = DatabaseService::new(&secrets.database_url, secrets.database_key.as_deref());
    database
        .ping()
        .await
        .map_err(|e| AppError::StartupError(e.to_string()))?;

    let sheets = SheetsClient::from_file(
        &secrets.google_credentials_path,
        &config.spreadsheet_id,
        timezone,
    )
    .map_err(|e| AppError::ConfigError(e.to_string()))?;

    let (audit, audit_receiver) = AuditMirror::channel(QUEUE_CAPACITY);
    let context = Context::new(
        config,
        Bot::new(&secrets.telegram_token),
        Arc::new(database),
        audit,
        Arc::new(sheets),
    )
    .map_err(|e| AppError::ConfigError(e.to_string()))?;

    let mut service_manager = ServiceManager::new(context);
    service_manager.spawn_with_receiver::<AuditService>(Arc::new(Mutex::new(audit_receiver)));
    service_manager.spawn::<HealthService>();
    service_manager.spawn::<NotificationService>();
    service_manager.spawn::<WeeklyScheduleService>();
    service_manager.spawn::<TelegramService>();

    service_manager
        .wait()
        .await
        .map_err(|_| AppError::ServiceError)
}
