use chrono::{DateTime, Datelike, Duration, TimeZone, Weekday};

/// Next `weekday` at `hour:minute` local time, always 1 to 7 days after `now`.
///
/// When `now` already falls on `weekday` the result is a week later, even if
/// the requested time of day has not passed yet. `None` when the local time
/// does not exist on that date (a DST gap).
pub fn next_occurrence<Tz: TimeZone>(
    now: &DateTime<Tz>,
    weekday: Weekday,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Tz>> {
    let today = now.date_naive();
    let mut days_ahead = (i64::from(weekday.num_days_from_monday())
        - i64::from(today.weekday().num_days_from_monday()))
    .rem_euclid(7);
    if days_ahead == 0 {
        days_ahead = 7;
    }

    let date = today + Duration::days(days_ahead);
    let local = date.and_hms_opt(hour, minute, 0)?;
    now.timezone().from_local_datetime(&local).earliest()
}
