use chrono::{Datelike, NaiveDate, Weekday};
use thiserror::Error;

use crate::prayer::iqamah::resolve;
use crate::prayer::model::{
    Adjustments, IqamahSettings, JUMUAH_LABEL, PrayerName, RawTimings, WallClockTime,
};
use crate::prayer::time_math::add_minutes;

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum ScheduleError {
    #[error("no prayer timings have been loaded yet")]
    MissingTimings,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScheduleEntry {
    pub name: PrayerName,
    pub display_name: &'static str,
    pub azan: WallClockTime,
    pub iqamah: Option<WallClockTime>,
}

/// The five tracked prayers for one calendar day, in canonical order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DailySchedule {
    date: NaiveDate,
    entries: Vec<ScheduleEntry>,
    pub sunrise: Option<WallClockTime>,
    pub hijri_date: Option<String>,
}

impl DailySchedule {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn is_friday(&self) -> bool {
        self.date.weekday() == Weekday::Fri
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn entry(&self, name: PrayerName) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    #[cfg(test)]
    pub(crate) fn clear_iqamah(&mut self, name: PrayerName) {
        for entry in self.entries.iter_mut().filter(|entry| entry.name == name) {
            entry.iqamah = None;
        }
    }
}

/// Builds the day's schedule. Adjustments shift the Azan; Iqamah rules are
/// resolved against the adjusted Azan. On Fridays Dhuhr is labelled Jumuah
/// and, when a Jumuah rule exists, that rule replaces Dhuhr's Iqamah rule.
/// The Azan itself is never replaced.
pub fn build_schedule(
    raw: Option<&RawTimings>,
    adjustments: &Adjustments,
    iqamah: &IqamahSettings,
    today: NaiveDate,
) -> Result<DailySchedule, ScheduleError> {
    let raw = raw.ok_or(ScheduleError::MissingTimings)?;
    let is_friday = today.weekday() == Weekday::Fri;

    let entries = PrayerName::TRACKED
        .into_iter()
        .map(|name| {
            let raw_azan = raw.azan(name);
            let azan = add_minutes(Some(raw_azan), adjustments.minutes(name)).unwrap_or(raw_azan);
            let mut display_name = name.as_str();
            let mut iqamah_time = resolve(iqamah.setting(name), Some(azan));

            if is_friday && name == PrayerName::Dhuhr {
                display_name = JUMUAH_LABEL;
                if let Some(jumuah) = iqamah.jumuah {
                    iqamah_time = resolve(jumuah, Some(azan));
                }
            }

            ScheduleEntry {
                name,
                display_name,
                azan,
                iqamah: iqamah_time,
            }
        })
        .collect();

    Ok(DailySchedule {
        date: today,
        entries,
        sunrise: raw.sunrise,
        hijri_date: raw.hijri_date.clone(),
    })
}
