use chrono::NaiveDateTime;
use serde::Serialize;

use crate::prayer::model::{PrayerName, SUNRISE_LABEL, WallClockTime};
use crate::prayer::schedule::DailySchedule;
use crate::prayer::time_math::format_12h;
use crate::prayer::tracker::{AlertLevel, Countdown, Tracking, TrackingState};

const SUNRISE_NOTE: &str = "Ishraq";

/// Everything a presentation layer needs for one tick.
#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    pub now: String,
    pub clock_text: String,
    pub date_text: String,
    pub hijri_date: Option<String>,
    pub status: String,
    pub announcement: String,
    pub alert_enabled: bool,
    pub alert_playing: bool,
    pub ready: bool,
    pub tracking: Option<TrackingView>,
    pub schedule: Vec<EntryView>,
    pub sunrise: Option<SunriseView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingView {
    pub state: TrackingState,
    pub label: String,
    pub countdown: String,
    pub remaining: Countdown,
    pub target: String,
    pub alert_level: AlertLevel,
    pub active_prayer: PrayerName,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub name: PrayerName,
    pub display_name: String,
    pub azan: String,
    pub iqamah: String,
    pub azan_24h: WallClockTime,
    pub iqamah_24h: Option<WallClockTime>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SunriseView {
    pub time: String,
    pub note: &'static str,
}

pub struct SnapshotInput<'a> {
    pub now: NaiveDateTime,
    pub schedule: Option<&'a DailySchedule>,
    pub tracking: Option<&'a Tracking>,
    pub status: String,
    pub announcement: &'a str,
    pub alert_enabled: bool,
    pub alert_playing: bool,
}

pub fn build_snapshot(input: SnapshotInput<'_>) -> BoardSnapshot {
    let active = input.tracking.map(Tracking::active_prayer);
    let schedule = input
        .schedule
        .map(|schedule| {
            schedule
                .entries()
                .iter()
                .map(|entry| EntryView {
                    name: entry.name,
                    display_name: entry.display_name.to_string(),
                    azan: format_12h(Some(entry.azan)),
                    iqamah: format_12h(entry.iqamah),
                    azan_24h: entry.azan,
                    iqamah_24h: entry.iqamah,
                    active: active == Some(entry.name),
                })
                .collect()
        })
        .unwrap_or_default();

    let tracking = input.tracking.map(|tracking| TrackingView {
        state: tracking.state,
        label: tracking.label.clone(),
        countdown: tracking.countdown_text(),
        remaining: tracking.countdown(),
        target: tracking.target.format("%Y-%m-%dT%H:%M:%S").to_string(),
        alert_level: tracking.alert_level(),
        active_prayer: tracking.active_prayer(),
    });

    BoardSnapshot {
        now: input.now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        clock_text: input.now.format("%-I:%M:%S %p").to_string(),
        date_text: input.now.format("%A, %B %-d, %Y").to_string(),
        hijri_date: input.schedule.and_then(|schedule| schedule.hijri_date.clone()),
        status: input.status,
        announcement: input.announcement.to_string(),
        alert_enabled: input.alert_enabled,
        alert_playing: input.alert_playing,
        ready: tracking.is_some(),
        tracking,
        schedule,
        sunrise: input
            .schedule
            .and_then(|schedule| schedule.sunrise)
            .map(|time| SunriseView {
                time: format_12h(Some(time)),
                note: SUNRISE_NOTE,
            }),
    }
}

/// Plain-text rendering of a snapshot, one board per call.
pub fn render_text(snapshot: &BoardSnapshot) -> String {
    let mut lines = Vec::new();
    let mut heading = format!("{}  {}", snapshot.date_text, snapshot.clock_text);
    if let Some(hijri) = snapshot.hijri_date.as_deref() {
        heading.push_str(&format!("  ({hijri})"));
    }
    lines.push(heading);
    lines.push(snapshot.status.clone());

    if !snapshot.schedule.is_empty() {
        lines.push(format!("  {:<10}{:<11}{}", "Prayer", "Azan", "Iqamah"));
        for entry in &snapshot.schedule {
            let marker = if entry.active { '>' } else { ' ' };
            lines.push(format!(
                "{marker} {:<10}{:<11}{}",
                entry.display_name, entry.azan, entry.iqamah
            ));
            if entry.name == PrayerName::Fajr
                && let Some(sunrise) = snapshot.sunrise.as_ref()
            {
                lines.push(format!(
                    "  {:<10}{:<11}{}",
                    SUNRISE_LABEL, sunrise.time, sunrise.note
                ));
            }
        }
    }

    if let Some(tracking) = snapshot.tracking.as_ref() {
        let level = match tracking.alert_level {
            AlertLevel::None => "",
            AlertLevel::Warning => " [warning]",
            AlertLevel::Imminent => " [imminent]",
        };
        lines.push(format!("Next: {} in {}{level}", tracking.label, tracking.countdown));
    }

    let alert = match (snapshot.alert_enabled, snapshot.alert_playing) {
        (true, true) => "Azan alert: playing",
        (true, false) => "Azan alert: on",
        (false, _) => "Azan alert: off",
    };
    lines.push(alert.to_string());
    lines.push(snapshot.announcement.clone());

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
