//! Telegram conversation controller.

pub mod admin;
pub mod callback;
pub mod conversation;
pub mod error_handler;
pub mod telegram;

pub use callback::CallbackAction;
pub use telegram::{Controller, TelegramService};
