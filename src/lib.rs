pub mod audit;
pub mod communication;
pub mod configuration;
pub mod core;
pub mod database;
pub mod events;
pub mod locales;
pub mod notifications;
pub mod registration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config Error:{0}")]
    ConfigError(String),

    #[error("Persistence unavailable at startup:{0}")]
    StartupError(String),

    #[error("Service error")]
    ServiceError,
}
