//! Outbound delivery and the periodic reminder/quorum scheduler.

use crate::configuration::Context;
use crate::core::service_manager::{Error as ServiceManagerError, Service};
use crate::locales;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub mod scheduler;

pub use scheduler::{NotificationScheduler, TickReport};

#[derive(Debug, Error)]
#[error("Delivery to chat {chat_id} failed: {reason}")]
pub struct DeliveryError {
    pub chat_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    Plain,
    Markdown,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str, format: MessageFormat)
        -> Result<(), DeliveryError>;
}

#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        format: MessageFormat,
    ) -> Result<(), DeliveryError> {
        let request = self.bot.send_message(ChatId(chat_id), text);
        let request = match format {
            MessageFormat::Plain => request,
            MessageFormat::Markdown => request.parse_mode(ParseMode::Markdown),
        };
        request.await.map(|_| ()).map_err(|e| DeliveryError {
            chat_id,
            reason: e.to_string(),
        })
    }
}

/// Posts the weekly "registration is open" message to the announcement chat.
pub async fn announce_registration_open(
    notifier: &dyn Notifier,
    chat_id: i64,
) -> Result<(), DeliveryError> {
    notifier
        .send(chat_id, locales::REGISTRATION_OPEN, MessageFormat::Plain)
        .await?;
    info!(chat_id = %chat_id, "Registration announcement sent");
    Ok(())
}

pub struct NotificationService {
    scheduler: NotificationScheduler,
    tick: Duration,
}

#[async_trait]
impl Service for NotificationService {
    type Context = Context;
    const NAME: &'static str = "notifications";

    async fn new(context: Context) -> Self {
        let scheduler_config = &context.config.scheduler;
        let scheduler = NotificationScheduler::new(
            context.store.clone(),
            Arc::new(TelegramNotifier::new(context.bot.clone())),
            context.timezone,
            context.config.announcement_chat_id,
            scheduler_config.quorum_threshold,
            scheduler_config.quorum_lookahead(),
        );

        Self {
            scheduler,
            tick: scheduler_config.tick(),
        }
    }

    async fn run(self) -> Result<(), ServiceManagerError> {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick = ?self.tick, "Notification scheduler started");

        loop {
            interval.tick().await;
            match self.scheduler.tick(Utc::now()).await {
                Ok(report) if report.skipped => warn!("Previous pass still running, tick skipped"),
                Ok(report) => {
                    if report.reminders_sent > 0 || report.quorum_broadcasts > 0 {
                        info!(?report, "Notification pass finished");
                    }
                }
                Err(e) => error!(error = %e, "Notification pass aborted"),
            }
        }
    }
}
