use chrono::Duration;

use crate::prayer::model::WallClockTime;

pub const UNKNOWN_TIME: &str = "--:--";

/// Adds `delta` minutes to a time-of-day. Minutes carry into the hour and the
/// result wraps past midnight the way adding to a calendar instant would.
/// A missing time, a zero delta or a delta too large for a duration returns
/// the input unchanged.
pub fn add_minutes(time: Option<WallClockTime>, delta: i64) -> Option<WallClockTime> {
    let time = time?;
    if delta == 0 {
        return Some(time);
    }
    let Some(delta) = Duration::try_minutes(delta) else {
        return Some(time);
    };
    let (shifted, _days) = time.as_naive().overflowing_add_signed(delta);
    Some(WallClockTime::from_naive(shifted))
}

/// "5:07 AM" style rendering; hour 0 renders as 12.
pub fn format_12h(time: Option<WallClockTime>) -> String {
    let Some(time) = time else {
        return UNKNOWN_TIME.to_string();
    };
    let hour = time.hour();
    let meridiem = if hour >= 12 { "PM" } else { "AM" };
    let hour12 = match hour % 12 {
        0 => 12,
        other => other,
    };
    format!("{hour12}:{:02} {meridiem}", time.minute())
}

/// Zero-padded HH:MM:SS, negative durations clamp to zero.
pub fn format_countdown(remaining: Duration) -> String {
    let total_seconds = remaining.num_seconds().max(0);
    let hours = total_seconds / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
