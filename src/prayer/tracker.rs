use chrono::{Days, Duration, NaiveDateTime};
use serde::Serialize;

use crate::prayer::model::PrayerName;
use crate::prayer::schedule::DailySchedule;
use crate::prayer::time_math::format_countdown;

const WARNING_WINDOW_MS: i64 = 5 * 60 * 1_000;
const IMMINENT_WINDOW_MS: i64 = 2 * 60 * 1_000;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "prayer", rename_all = "snake_case")]
pub enum TrackingState {
    AwaitingAzan(PrayerName),
    AwaitingIqamah(PrayerName),
}

impl TrackingState {
    pub fn prayer(self) -> PrayerName {
        match self {
            TrackingState::AwaitingAzan(name) | TrackingState::AwaitingIqamah(name) => name,
        }
    }

    pub fn is_awaiting_azan(self) -> bool {
        matches!(self, TrackingState::AwaitingAzan(_))
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    None,
    Warning,
    Imminent,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct Countdown {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

/// What the board is waiting for at one instant.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Tracking {
    pub state: TrackingState,
    pub target: NaiveDateTime,
    pub label: String,
    remaining: Duration,
}

impl Tracking {
    /// Time left until the target, never negative.
    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn countdown(&self) -> Countdown {
        let total = self.remaining.num_seconds();
        Countdown {
            hours: total / 3_600,
            minutes: (total % 3_600) / 60,
            seconds: total % 60,
        }
    }

    pub fn countdown_text(&self) -> String {
        format_countdown(self.remaining)
    }

    pub fn alert_level(&self) -> AlertLevel {
        if self.state.is_awaiting_azan() {
            return AlertLevel::None;
        }
        let remaining_ms = self.remaining.num_milliseconds();
        if remaining_ms < IMMINENT_WINDOW_MS {
            AlertLevel::Imminent
        } else if remaining_ms < WARNING_WINDOW_MS {
            AlertLevel::Warning
        } else {
            AlertLevel::None
        }
    }

    /// The schedule row to highlight.
    pub fn active_prayer(&self) -> PrayerName {
        self.state.prayer()
    }
}

/// Recomputes the tracking state from scratch for `now`.
///
/// The soonest Azan still ahead today is the default target; after Isha the
/// target rolls to tomorrow's Fajr. If `now` sits inside an Azan -> Iqamah
/// window, the first such window in canonical order takes precedence.
pub fn evaluate(schedule: &DailySchedule, now: NaiveDateTime) -> Tracking {
    let today = now.date();
    let entries = schedule.entries();

    let mut next_azan: Option<(PrayerName, NaiveDateTime)> = None;
    for entry in entries {
        let azan_at = entry.azan.on(today);
        if azan_at <= now {
            continue;
        }
        let is_sooner = next_azan
            .map(|(_, best)| azan_at < best)
            .unwrap_or(true);
        if is_sooner {
            next_azan = Some((entry.name, azan_at));
        }
    }

    let (mut state, mut target) = match next_azan {
        Some((name, azan_at)) => (TrackingState::AwaitingAzan(name), azan_at),
        None => {
            let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
            let fajr_at = schedule
                .entry(PrayerName::Fajr)
                .map(|entry| entry.azan.on(tomorrow))
                .unwrap_or(now);
            (TrackingState::AwaitingAzan(PrayerName::Fajr), fajr_at)
        }
    };

    for entry in entries {
        let Some(iqamah) = entry.iqamah else {
            continue;
        };
        let azan_at = entry.azan.on(today);
        let iqamah_at = iqamah.on(today);
        if now >= azan_at && now < iqamah_at {
            state = TrackingState::AwaitingIqamah(entry.name);
            target = iqamah_at;
            break;
        }
    }

    let display_name = schedule
        .entry(state.prayer())
        .map(|entry| entry.display_name)
        .unwrap_or_else(|| state.prayer().as_str());
    let label = match state {
        TrackingState::AwaitingAzan(_) => display_name.to_string(),
        TrackingState::AwaitingIqamah(_) => format!("{display_name} Iqamah"),
    };

    Tracking {
        state,
        target,
        label,
        remaining: (target - now).max(Duration::zero()),
    }
}
