//! Russian date formatting and the user-facing texts of the bot.

use chrono::{DateTime, Datelike, TimeZone};

const MONTHS: [&str; 12] = [
    "января", "февраля", "марта", "апреля", "мая", "июня", "июля", "августа", "сентября",
    "октября", "ноября", "декабря",
];

const WEEKDAYS: [&str; 7] = [
    "понедельник",
    "вторник",
    "среда",
    "четверг",
    "пятница",
    "суббота",
    "воскресенье",
];

const WEEKDAYS_SHORT: [&str; 7] = ["пн", "вт", "ср", "чт", "пт", "сб", "вс"];

/// `"пятница, 24 октября"`
pub fn format_date<Tz: TimeZone>(t: &DateTime<Tz>) -> String {
    format!(
        "{}, {} {}",
        WEEKDAYS[t.weekday().num_days_from_monday() as usize],
        t.day(),
        MONTHS[t.month0() as usize]
    )
}

/// `"24 октября (пт)"`
pub fn format_date_short<Tz: TimeZone>(t: &DateTime<Tz>) -> String {
    format!(
        "{} {} ({})",
        t.day(),
        MONTHS[t.month0() as usize],
        WEEKDAYS_SHORT[t.weekday().num_days_from_monday() as usize]
    )
}

pub const GREETING: &str = "Привет! Я бот клуба спортивной мафии *La Verdad*. \nС помощью меня можно записаться на игры и не только 😉";
pub const ASK_NAME: &str = "Пожалуйста пройди небольшую регистрацию\n\nВведи своё *имя*:";
pub const ASK_NICKNAME: &str = "Отлично! Теперь введи свой игровой *ник*:";
pub const ONBOARDING_DONE: &str = "Готово! Теперь можешь использовать команды:\n/events — Список событий\n/my — Мои регистрации";
pub const HELP: &str = "Неизвестная команда. Доступные команды:\n/events — список событий\n/my — мои регистрации";
pub const NO_EVENTS: &str = "Пока нет доступных событий.";
pub const EVENTS_HEADER: &str = "Доступные мероприятия:";
pub const NO_REGISTRATIONS: &str = "Ты пока никуда не записан.";
pub const ALREADY_REGISTERED_MARK: &str = "✅ *Вы уже зарегистрированы*";
pub const REGISTER_BUTTON: &str = "📝 Записаться";
pub const CANCEL_BUTTON: &str = "Отменить";
pub const REGISTERED: &str = "✅ Ты успешно зарегистрирован на событие!";
pub const CANCELED: &str = "❌ Регистрация отменена.";

pub const ADMIN_HELP: &str = "Доступные команды:\n/addevent\n/registrations\n/generate\n/notify_registration";
pub const ADMIN_EVENTS_HEADER: &str = "Список мероприятий:";
pub const ADMIN_ASK_TITLE: &str = "Введите заголовок события:";
pub const ADMIN_ASK_DESCRIPTION: &str = "Введите описание события:";
pub const ADMIN_ASK_LOCATION: &str = "Введите место проведения события:";
pub const ADMIN_ASK_DATETIME: &str = "Введите дату и время события в формате ГГГГ-ММ-ДД ЧЧ:ММ (например, 2026-10-24 18:30):";
pub const ADMIN_EVENT_ADDED: &str = "✅ Событие добавлено!";
pub const ADMIN_EVENTS_GENERATED: &str = "✅ События успешно созданы!";
pub const ADMIN_ANNOUNCEMENT_SENT: &str = "✅ Объявление отправлено!";
pub const ADMIN_NO_REGISTRATIONS: &str = "Нет регистраций на мероприятие!";

pub const ERROR_USER_NOT_FOUND: &str = "Сначала выполни /start, чтобы пройти регистрацию.";
pub const ERROR_EVENT_NOT_FOUND: &str = "Ошибка: Не удалось загрузить событие.";
pub const ERROR_ALREADY_REGISTERED: &str = "Ты уже зарегистрирован на это событие.";
pub const ERROR_REGISTRATION_NOT_FOUND: &str = "Регистрация не найдена.";
pub const ERROR_INVALID_DATETIME: &str = "Неверный формат, попробуйте ещё раз:";
pub const ERROR_TRY_LATER: &str = "Сервис временно недоступен, попробуйте позже.";

pub const REGISTRATION_OPEN: &str = "Мирный привет городу, соберёмся играть в 🔴 мафию ⚫ на этой неделе?
Обратите внимание, что место и время отличаются по дням.
Для записи на игры перейдите в бот @mafia_appointment_bot";

pub fn reminder_day_before(time: &str, title: &str) -> String {
    format!("Напоминание! Завтра в {} начнется: {}", time, title)
}

pub fn reminder_hour_before(title: &str) -> String {
    format!("Напоминание! Через час начнется: {}", title)
}

pub fn quorum_announcement(title: &str, when: &str, location: &str, nicknames: &[&str]) -> String {
    let mut text = format!(
        "Есть кворум!

{}
🗓 {}
📌 {}
💶 Донат на развитие клуба - 5€ с человека.

Постарайтесь не опоздать. Если что-то поменяется, обязательно напишите. Ждём! 🕵️‍♂️
",
        title, when, location
    );
    for (i, nickname) in nicknames.iter().enumerate() {
        text.push_str(&format!("{}) @{}\n", i + 1, escape_markdown(nickname)));
    }
    text
}

/// Escapes user-supplied text placed outside entities of a legacy
/// Markdown message, so `john_doe` does not open an italic run.
/// Event locations carry their own map links and are left as is.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn club_night_description(date: &str, time: &str, location: &str) -> String {
    format!(
        "Клубные игры (фанки). 4-5 игр по спортивной мафии в дружественной атмосфере.

🗓️ {}
⏳ {} - 23:00
📌 {}
💶 Донат на развитие клуба - 5€ с человека.

Если вы первый раз - ведущий расскажет правила и поможет влиться, во время игры будет делать небольшие комментарии 🤗
",
        date, time, location
    )
}
