//! Best-effort mirror of registration activity into a spreadsheet.
//!
//! Producers hold an [`AuditMirror`] and enqueue records without waiting;
//! [`AuditService`] drains the queue into an [`AuditSink`]. Failures are
//! logged and dropped, never retried and never surfaced to users.

use crate::configuration::Context;
use crate::core::service_manager::{Error as ServiceManagerError, ServiceWithReceiver};
use crate::database::{Registration, User};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

pub mod sheets;

pub use sheets::SheetsClient;

pub const QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Credentials error: {0}")]
    Credentials(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("Spreadsheet request failed: {0}")]
    Request(String),
    #[error("Registration {0} not found in sheet")]
    RowNotFound(i64),
}

impl From<reqwest::Error> for AuditError {
    fn from(e: reqwest::Error) -> Self {
        AuditError::Request(e.to_string())
    }
}

// One spreadsheet row per registration
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationLine {
    pub id: i64,
    pub telegram_link: String,
    pub username: Option<String>,
    pub name: String,
    pub nickname: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegistrationLine {
    pub fn new(registration: &Registration, user: &User) -> Self {
        Self {
            id: registration.id,
            telegram_link: format!("tg://user?id={}", user.telegram_id),
            username: user.username.clone(),
            name: user.name.clone().unwrap_or_default(),
            nickname: user.nickname.clone().unwrap_or_default(),
            status: registration.status.as_str().to_string(),
            created_at: registration.created_at,
            updated_at: registration.updated_at,
        }
    }
}

/// Sheet name used for an event, e.g. `"Вечер клубных игр - 24.10"`.
pub fn sheet_title<Tz: TimeZone>(title: &str, starts_at: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{} - {}", title, starts_at.with_timezone(tz).format("%d.%m"))
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuditRecord {
    EventCreated {
        sheet_title: String,
    },
    RegistrationCreated {
        sheet_title: String,
        line: RegistrationLine,
    },
    RegistrationCanceled {
        registration_id: i64,
        sheet_title: String,
        canceled_at: DateTime<Utc>,
    },
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn on_event_created(&self, sheet_title: &str) -> Result<(), AuditError>;

    async fn on_registration_created(
        &self,
        sheet_title: &str,
        line: &RegistrationLine,
    ) -> Result<(), AuditError>;

    async fn on_registration_canceled(
        &self,
        registration_id: i64,
        sheet_title: &str,
        canceled_at: DateTime<Utc>,
    ) -> Result<(), AuditError>;
}

pub async fn apply(sink: &dyn AuditSink, record: &AuditRecord) -> Result<(), AuditError> {
    match record {
        AuditRecord::EventCreated { sheet_title } => sink.on_event_created(sheet_title).await,
        AuditRecord::RegistrationCreated { sheet_title, line } => {
            sink.on_registration_created(sheet_title, line).await
        }
        AuditRecord::RegistrationCanceled {
            registration_id,
            sheet_title,
            canceled_at,
        } => {
            sink.on_registration_canceled(*registration_id, sheet_title, *canceled_at)
                .await
        }
    }
}

#[derive(Clone)]
pub struct AuditMirror {
    sender: mpsc::Sender<AuditRecord>,
}

impl AuditMirror {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuditRecord>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn event_created(&self, sheet_title: String) {
        self.enqueue(AuditRecord::EventCreated { sheet_title });
    }

    pub fn registration_created(&self, sheet_title: String, line: RegistrationLine) {
        self.enqueue(AuditRecord::RegistrationCreated { sheet_title, line });
    }

    pub fn registration_canceled(
        &self,
        registration_id: i64,
        sheet_title: String,
        canceled_at: DateTime<Utc>,
    ) {
        self.enqueue(AuditRecord::RegistrationCanceled {
            registration_id,
            sheet_title,
            canceled_at,
        });
    }

    // Never waits: a full or closed queue drops the record
    fn enqueue(&self, record: AuditRecord) {
        match self.sender.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                warn!(?record, "Audit queue full, dropping record");
            }
            Err(TrySendError::Closed(record)) => {
                warn!(?record, "Audit queue closed, dropping record");
            }
        }
    }
}

pub struct AuditService {
    sink: Arc<dyn AuditSink>,
    receiver: Arc<Mutex<mpsc::Receiver<AuditRecord>>>,
}

#[async_trait]
impl ServiceWithReceiver for AuditService {
    type Context = Context;
    type Message = AuditRecord;
    const NAME: &'static str = "audit";

    async fn new(context: Context, receiver: Arc<Mutex<mpsc::Receiver<AuditRecord>>>) -> Self {
        Self {
            sink: context.audit_sink,
            receiver,
        }
    }

    async fn run(self) -> Result<(), ServiceManagerError> {
        loop {
            let mut rx = self.receiver.lock().await;
            let Some(record) = rx.recv().await else {
                return Ok(());
            };
            drop(rx);

            self.process(&record).await;
        }
    }
}

impl AuditService {
    async fn process(&self, record: &AuditRecord) {
        match apply(self.sink.as_ref(), record).await {
            Ok(()) => debug!(?record, "Audit record mirrored"),
            Err(e) => error!(?record, error = %e, "Failed to mirror audit record"),
        }
    }
}
