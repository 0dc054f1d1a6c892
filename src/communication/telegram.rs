use super::callback::CallbackAction;
use super::conversation::{AdminWizard, Onboarding, Sessions, UserSession, WizardStep};
use super::error_handler::{create_error_reply, InteractionError};
use crate::audit::{sheet_title, AuditMirror, RegistrationLine};
use crate::configuration::{Config, Context};
use crate::core::service_manager::{Error as ServiceManagerError, Service};
use crate::database::{Event, EventStore, Registration};
use crate::events::EventGenerator;
use crate::locales;
use crate::notifications::{MessageFormat, Notifier, TelegramNotifier};
use crate::registration::{RegistrationEngine, RegistrationError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use tracing::{error, warn};

#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub format: MessageFormat,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl Reply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: MessageFormat::Plain,
            keyboard: None,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            format: MessageFormat::Markdown,
            ..Self::plain(text)
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<(String, CallbackAction)>) -> Self {
        let rows = buttons
            .into_iter()
            .map(|(label, action)| vec![InlineKeyboardButton::callback(label, action.to_string())])
            .collect::<Vec<_>>();
        self.keyboard = Some(InlineKeyboardMarkup::new(rows));
        self
    }
}

#[derive(Debug, Clone)]
pub struct Sender {
    pub telegram_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
}

/// Turns user input into replies. Holds the user's session lock for the
/// whole interaction.
pub struct Controller {
    pub(super) config: Config,
    pub(super) timezone: Tz,
    pub(super) store: Arc<dyn EventStore>,
    pub(super) engine: RegistrationEngine,
    pub(super) generator: EventGenerator,
    pub(super) notifier: Arc<dyn Notifier>,
    audit: AuditMirror,
    sessions: Sessions,
}

impl Controller {
    pub fn new(
        config: Config,
        timezone: Tz,
        store: Arc<dyn EventStore>,
        audit: AuditMirror,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            engine: RegistrationEngine::new(store.clone()),
            generator: EventGenerator::new(store.clone(), audit.clone(), timezone),
            config,
            timezone,
            store,
            notifier,
            audit,
            sessions: Sessions::new(),
        }
    }

    pub async fn handle_text(&self, sender: &Sender, text: &str) -> Vec<Reply> {
        let session = self.sessions.for_user(sender.telegram_id);
        let mut session = session.lock().await;
        let result = self.dispatch_text(&mut session, sender, text).await;
        self.into_replies(sender, result)
    }

    pub async fn handle_callback(&self, sender: &Sender, data: &str) -> Vec<Reply> {
        let action = match data.parse::<CallbackAction>() {
            Ok(action) => action,
            Err(e) => {
                warn!(telegram_id = sender.telegram_id, error = %e, "Ignoring callback");
                return Vec::new();
            }
        };

        let session = self.sessions.for_user(sender.telegram_id);
        let _session = session.lock().await;
        let result = match action {
            CallbackAction::ShowEvent(event_id) => self.show_event(sender, event_id).await,
            CallbackAction::Register(event_id) => self.register(sender, event_id).await,
            CallbackAction::Cancel(event_id) => self.cancel(sender, event_id).await,
            CallbackAction::AdminRoster(event_id) => self.roster(sender, event_id).await,
        };
        self.into_replies(sender, result)
    }

    fn into_replies(
        &self,
        sender: &Sender,
        result: Result<Vec<Reply>, InteractionError>,
    ) -> Vec<Reply> {
        match result {
            Ok(replies) => replies,
            Err(e) => {
                if e.is_user_error() {
                    warn!(telegram_id = sender.telegram_id, error = %e, "Request rejected");
                } else {
                    error!(telegram_id = sender.telegram_id, error = %e, "Request failed");
                }
                vec![create_error_reply(&e)]
            }
        }
    }

    async fn dispatch_text(
        &self,
        session: &mut UserSession,
        sender: &Sender,
        text: &str,
    ) -> Result<Vec<Reply>, InteractionError> {
        let text = text.trim();

        if let Some(command) = parse_command(text) {
            // Any command abandons a half-filled event
            session.admin_wizard = AdminWizard::Idle;
            return match command {
                "/start" => self.start(session, sender).await,
                "/events" => self.list_events().await,
                "/my" => self.my_registrations(sender).await,
                "/addevent" | "/registrations" | "/generate" | "/notify_registration"
                    if self.config.is_admin(sender.telegram_id) =>
                {
                    self.admin_command(session, command).await
                }
                _ => Ok(vec![Reply::plain(locales::HELP)]),
            };
        }

        if let Some((field, next, prompt)) = session.onboarding.accept() {
            self.store
                .update_user_field(sender.telegram_id, field, text)
                .await?;
            session.onboarding = next;
            return Ok(vec![Reply::markdown(prompt)]);
        }

        match std::mem::take(&mut session.admin_wizard).accept(text) {
            WizardStep::Inactive => Ok(vec![Reply::plain(locales::HELP)]),
            WizardStep::Prompt(next, prompt) => {
                session.admin_wizard = next;
                Ok(vec![Reply::plain(prompt)])
            }
            WizardStep::Submit(draft, input) => self.submit_event(session, draft, &input).await,
        }
    }

    async fn start(
        &self,
        session: &mut UserSession,
        sender: &Sender,
    ) -> Result<Vec<Reply>, InteractionError> {
        let user = match self.store.get_user(sender.telegram_id).await? {
            Some(user) => user,
            None => {
                self.store
                    .upsert_user(sender.telegram_id, sender.chat_id, sender.username.as_deref())
                    .await?
            }
        };

        let mut replies = vec![Reply::markdown(locales::GREETING)];
        if user.has_profile() {
            session.onboarding = Onboarding::Idle;
            replies.push(Reply::plain(locales::ONBOARDING_DONE));
        } else {
            session.onboarding = Onboarding::AwaitingName;
            replies.push(Reply::markdown(locales::ASK_NAME));
        }
        Ok(replies)
    }

    async fn list_events(&self) -> Result<Vec<Reply>, InteractionError> {
        let events = self.upcoming_events(Utc::now()).await?;
        if events.is_empty() {
            return Ok(vec![Reply::plain(locales::NO_EVENTS)]);
        }

        let buttons = events
            .iter()
            .map(|e| (self.event_label(e), CallbackAction::ShowEvent(e.id)))
            .collect();
        Ok(vec![Reply::plain(locales::EVENTS_HEADER).with_buttons(buttons)])
    }

    async fn show_event(
        &self,
        sender: &Sender,
        event_id: i64,
    ) -> Result<Vec<Reply>, InteractionError> {
        let event = self
            .store
            .get_event_by_id(event_id)
            .await?
            .ok_or(RegistrationError::EventNotFound)?;
        let registered = self.engine.is_registered(sender.telegram_id, event_id).await?;

        let text = format!("*{}*\n\n{}", event.title, event.description);
        if registered {
            return Ok(vec![Reply::markdown(format!(
                "{}\n\n{}",
                text,
                locales::ALREADY_REGISTERED_MARK
            ))]);
        }
        Ok(vec![Reply::markdown(text).with_buttons(vec![(
            locales::REGISTER_BUTTON.to_string(),
            CallbackAction::Register(event_id),
        )])])
    }

    async fn register(
        &self,
        sender: &Sender,
        event_id: i64,
    ) -> Result<Vec<Reply>, InteractionError> {
        let registration = self.engine.register(sender.telegram_id, event_id).await?;
        self.mirror_registration(sender, &registration).await;
        Ok(vec![Reply::plain(locales::REGISTERED)])
    }

    async fn cancel(
        &self,
        sender: &Sender,
        event_id: i64,
    ) -> Result<Vec<Reply>, InteractionError> {
        let registration = self.engine.cancel(sender.telegram_id, event_id).await?;
        match self.store.get_event_by_id(event_id).await {
            Ok(Some(event)) => self.audit.registration_canceled(
                registration.id,
                sheet_title(&event.title, event.starts_at, &self.timezone),
                registration.updated_at,
            ),
            Ok(None) => warn!(event_id, "Event vanished, cancellation not mirrored"),
            Err(e) => warn!(event_id, error = %e, "Cancellation not mirrored"),
        }
        Ok(vec![Reply::plain(locales::CANCELED)])
    }

    // Mirror failures never reach the user
    async fn mirror_registration(&self, sender: &Sender, registration: &Registration) {
        let user = self.store.get_user(sender.telegram_id).await;
        let event = self.store.get_event_by_id(registration.event_id).await;
        match (user, event) {
            (Ok(Some(user)), Ok(Some(event))) => self.audit.registration_created(
                sheet_title(&event.title, event.starts_at, &self.timezone),
                RegistrationLine::new(registration, &user),
            ),
            _ => warn!(
                registration_id = registration.id,
                "Registration not mirrored, rows unavailable"
            ),
        }
    }

    async fn my_registrations(&self, sender: &Sender) -> Result<Vec<Reply>, InteractionError> {
        let registrations = self.engine.list_for_user(sender.telegram_id).await?;
        if registrations.is_empty() {
            return Ok(vec![Reply::plain(locales::NO_REGISTRATIONS)]);
        }

        Ok(registrations
            .iter()
            .map(|r| {
                let local = r.event.starts_at.with_timezone(&self.timezone);
                Reply::markdown(format!(
                    "*{}*\n🗓 {}, {}\n📌 {}",
                    r.event.title,
                    locales::format_date(&local),
                    local.format("%H:%M"),
                    r.event.location
                ))
                .with_buttons(vec![(
                    locales::CANCEL_BUTTON.to_string(),
                    CallbackAction::Cancel(r.event.id),
                )])
            })
            .collect())
    }

    /// Events from the start of the current local day, soonest first.
    pub(super) async fn upcoming_events(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, InteractionError> {
        let from = now
            .with_timezone(&self.timezone)
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .and_then(|midnight| self.timezone.from_local_datetime(&midnight).earliest())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(now);

        let mut events = self.store.get_events(from).await?;
        events.sort_by_key(|e| (e.starts_at, e.id));
        Ok(events)
    }

    pub(super) fn event_label(&self, event: &Event) -> String {
        let local = event.starts_at.with_timezone(&self.timezone);
        format!(
            "{} - {} {}",
            event.title,
            locales::format_date_short(&local),
            local.format("%H:%M")
        )
    }
}

// "/events@club_bot extra" -> "/events"
fn parse_command(text: &str) -> Option<&str> {
    if !text.starts_with('/') {
        return None;
    }
    let word = text.split_whitespace().next()?;
    word.split('@').next()
}

async fn deliver(bot: &Bot, chat_id: i64, replies: Vec<Reply>) -> ResponseResult<()> {
    for reply in replies {
        let mut request = bot.send_message(ChatId(chat_id), reply.text);
        if reply.format == MessageFormat::Markdown {
            request = request.parse_mode(ParseMode::Markdown);
        }
        if let Some(keyboard) = reply.keyboard {
            request = request.reply_markup(keyboard);
        }
        request.await?;
    }
    Ok(())
}

pub struct TelegramService {
    bot: Bot,
    controller: Arc<Controller>,
}

#[async_trait]
impl Service for TelegramService {
    type Context = Context;
    const NAME: &'static str = "telegram";

    async fn new(context: Context) -> Self {
        let notifier = Arc::new(TelegramNotifier::new(context.bot.clone()));
        let controller = Controller::new(
            context.config.clone(),
            context.timezone,
            context.store.clone(),
            context.audit.clone(),
            notifier,
        );

        Self {
            bot: context.bot,
            controller: Arc::new(controller),
        }
    }

    async fn run(self) -> Result<(), ServiceManagerError> {
        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(on_message))
            .branch(Update::filter_callback_query().endpoint(on_callback));

        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.controller])
            .build()
            .dispatch()
            .await;
        Ok(())
    }
}

// Each update runs as its own task; the per-user lock orders a user's updates
async fn on_message(bot: Bot, msg: Message, controller: Arc<Controller>) -> ResponseResult<()> {
    let (Some(text), Some(from)) = (msg.text(), msg.from()) else {
        return Ok(());
    };
    let sender = Sender {
        telegram_id: from.id.0 as i64,
        chat_id: msg.chat.id.0,
        username: from.username.clone(),
    };
    let text = text.to_string();

    tokio::spawn(async move {
        let replies = controller.handle_text(&sender, &text).await;
        if let Err(e) = deliver(&bot, sender.chat_id, replies).await {
            error!(chat_id = %sender.chat_id, error = %e, "Failed to send reply");
        }
    });
    Ok(())
}

async fn on_callback(
    bot: Bot,
    query: CallbackQuery,
    controller: Arc<Controller>,
) -> ResponseResult<()> {
    bot.answer_callback_query(query.id.clone()).await?;
    let Some(data) = query.data.clone() else {
        return Ok(());
    };
    let sender = Sender {
        telegram_id: query.from.id.0 as i64,
        chat_id: query
            .message
            .as_ref()
            .map(|m| m.chat.id.0)
            .unwrap_or(query.from.id.0 as i64),
        username: query.from.username.clone(),
    };

    tokio::spawn(async move {
        let replies = controller.handle_callback(&sender, &data).await;
        if let Err(e) = deliver(&bot, sender.chat_id, replies).await {
            error!(chat_id = %sender.chat_id, error = %e, "Failed to send reply");
        }
    });
    Ok(())
}
