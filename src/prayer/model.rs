use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// The five tracked daily prayers, in canonical order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum PrayerName {
    Fajr,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerName {
    pub const TRACKED: [PrayerName; 5] = [
        PrayerName::Fajr,
        PrayerName::Dhuhr,
        PrayerName::Asr,
        PrayerName::Maghrib,
        PrayerName::Isha,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PrayerName::Fajr => "Fajr",
            PrayerName::Dhuhr => "Dhuhr",
            PrayerName::Asr => "Asr",
            PrayerName::Maghrib => "Maghrib",
            PrayerName::Isha => "Isha",
        }
    }

    fn index(self) -> usize {
        match self {
            PrayerName::Fajr => 0,
            PrayerName::Dhuhr => 1,
            PrayerName::Asr => 2,
            PrayerName::Maghrib => 3,
            PrayerName::Isha => 4,
        }
    }
}

impl fmt::Display for PrayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrayerName {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        PrayerName::TRACKED
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(input.trim()))
            .ok_or_else(|| format!("unknown prayer name '{input}'"))
    }
}

/// Display label used for Dhuhr on Fridays.
pub const JUMUAH_LABEL: &str = "Jumuah";
pub const SUNRISE_LABEL: &str = "Sunrise";

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum TimeParseError {
    #[error("invalid time '{0}', expected HH:MM")]
    Format(String),
    #[error("time '{0}' is out of range")]
    Range(String),
}

/// A local time-of-day with minute precision.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WallClockTime(NaiveTime);

impl WallClockTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    /// Parses "HH:MM" and ignores anything after the minute digits, so
    /// provider values such as "05:12 (IST)" are accepted.
    pub fn parse(input: &str) -> Result<Self, TimeParseError> {
        let trimmed = input.trim();
        let (hour_text, rest) = trimmed
            .split_once(':')
            .ok_or_else(|| TimeParseError::Format(input.to_string()))?;
        let minute_text: String = rest.chars().take(2).collect();
        let valid_hour = !hour_text.is_empty()
            && hour_text.len() <= 2
            && hour_text.chars().all(|c| c.is_ascii_digit());
        let valid_minute = minute_text.len() == 2 && minute_text.chars().all(|c| c.is_ascii_digit());
        if !valid_hour || !valid_minute {
            return Err(TimeParseError::Format(input.to_string()));
        }

        let hour = hour_text
            .parse::<u32>()
            .map_err(|_| TimeParseError::Format(input.to_string()))?;
        let minute = minute_text
            .parse::<u32>()
            .map_err(|_| TimeParseError::Format(input.to_string()))?;
        Self::new(hour, minute).ok_or_else(|| TimeParseError::Range(input.to_string()))
    }

    pub fn hour(self) -> u32 {
        self.0.hour()
    }

    pub fn minute(self) -> u32 {
        self.0.minute()
    }

    pub fn as_naive(self) -> NaiveTime {
        self.0
    }

    /// Places this time-of-day on a calendar date.
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.0)
    }

    pub(crate) fn from_naive(time: NaiveTime) -> Self {
        Self(time.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(time))
    }
}

impl fmt::Display for WallClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for WallClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Timings for one day as supplied by the provider.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawTimings {
    azan: [WallClockTime; 5],
    pub sunrise: Option<WallClockTime>,
    pub hijri_date: Option<String>,
}

impl RawTimings {
    pub fn new(azan: [WallClockTime; 5]) -> Self {
        Self {
            azan,
            sunrise: None,
            hijri_date: None,
        }
    }

    /// Builds timings from a name -> "HH:MM" mapping. All five tracked
    /// prayers must be present and parsable; Sunrise is optional.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, TimeParseError> {
        let mut azan = [WallClockTime::default(); 5];
        for name in PrayerName::TRACKED {
            let text = map
                .get(name.as_str())
                .ok_or_else(|| TimeParseError::Format(format!("{name}: missing")))?;
            azan[name.index()] = WallClockTime::parse(text)?;
        }
        let mut timings = Self::new(azan);
        timings.sunrise = map
            .get(SUNRISE_LABEL)
            .and_then(|text| WallClockTime::parse(text).ok());
        Ok(timings)
    }

    pub fn azan(&self, name: PrayerName) -> WallClockTime {
        self.azan[name.index()]
    }
}

impl Default for WallClockTime {
    fn default() -> Self {
        Self(NaiveTime::MIN)
    }
}

/// Per-prayer Azan corrections in signed minutes.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Adjustments(BTreeMap<PrayerName, i64>);

impl Default for Adjustments {
    fn default() -> Self {
        Self(PrayerName::TRACKED.into_iter().map(|name| (name, 0)).collect())
    }
}

impl Adjustments {
    pub fn minutes(&self, name: PrayerName) -> i64 {
        self.0.get(&name).copied().unwrap_or(0)
    }

    pub fn set(&mut self, name: PrayerName, minutes: i64) {
        self.0.insert(name, minutes);
    }

    #[cfg(test)]
    pub fn with(mut self, name: PrayerName, minutes: i64) -> Self {
        self.set(name, minutes);
        self
    }
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum IqamahParseError {
    #[error("invalid iqamah offset '{0}', expected +N minutes")]
    Offset(String),
    #[error(transparent)]
    Time(#[from] TimeParseError),
}

/// How an Iqamah time is derived: a fixed clock time, or minutes after Azan.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IqamahSetting {
    Fixed(WallClockTime),
    Offset(u32),
}

impl IqamahSetting {
    pub fn parse(input: &str) -> Result<Self, IqamahParseError> {
        let trimmed = input.trim();
        match trimmed.strip_prefix('+') {
            Some(minutes) => minutes
                .trim()
                .parse::<u32>()
                .map(IqamahSetting::Offset)
                .map_err(|_| IqamahParseError::Offset(input.to_string())),
            None => Ok(IqamahSetting::Fixed(WallClockTime::parse(trimmed)?)),
        }
    }

    pub fn default_for(name: PrayerName) -> Self {
        match name {
            PrayerName::Fajr => IqamahSetting::Offset(20),
            PrayerName::Dhuhr | PrayerName::Asr | PrayerName::Isha => IqamahSetting::Offset(15),
            PrayerName::Maghrib => IqamahSetting::Offset(10),
        }
    }

    pub fn default_jumuah() -> Self {
        IqamahSetting::Fixed(WallClockTime(
            NaiveTime::from_hms_opt(12, 30, 0).unwrap_or(NaiveTime::MIN),
        ))
    }
}

impl fmt::Display for IqamahSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IqamahSetting::Fixed(time) => write!(f, "{time}"),
            IqamahSetting::Offset(minutes) => write!(f, "+{minutes}"),
        }
    }
}

impl Serialize for IqamahSetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Iqamah rules for every tracked prayer plus the Friday Jumuah override.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IqamahSettings {
    per_prayer: BTreeMap<PrayerName, IqamahSetting>,
    pub jumuah: Option<IqamahSetting>,
}

impl Default for IqamahSettings {
    fn default() -> Self {
        Self {
            per_prayer: PrayerName::TRACKED
                .into_iter()
                .map(|name| (name, IqamahSetting::default_for(name)))
                .collect(),
            jumuah: Some(IqamahSetting::default_jumuah()),
        }
    }
}

impl IqamahSettings {
    pub fn setting(&self, name: PrayerName) -> IqamahSetting {
        self.per_prayer
            .get(&name)
            .copied()
            .unwrap_or_else(|| IqamahSetting::default_for(name))
    }

    pub fn set(&mut self, name: PrayerName, setting: IqamahSetting) {
        self.per_prayer.insert(name, setting);
    }

    #[cfg(test)]
    pub fn with(mut self, name: PrayerName, setting: IqamahSetting) -> Self {
        self.set(name, setting);
        self
    }

    #[cfg(test)]
    pub fn with_jumuah(mut self, setting: Option<IqamahSetting>) -> Self {
        self.jumuah = setting;
        self
    }
}

impl Serialize for IqamahSettings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = BTreeMap::new();
        for name in PrayerName::TRACKED {
            map.insert(name.as_str(), self.setting(name).to_string());
        }
        if let Some(jumuah) = self.jumuah {
            map.insert(JUMUAH_LABEL, jumuah.to_string());
        }
        map.serialize(serializer)
    }
}
