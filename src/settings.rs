use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::prayer::model::{Adjustments, IqamahSetting, IqamahSettings, JUMUAH_LABEL, PrayerName};

pub const SETTINGS_VERSION: u32 = 1;
pub const DEFAULT_CITY: &str = "Kalpetta";
pub const DEFAULT_COUNTRY: &str = "India";
/// University of Islamic Sciences, Karachi.
pub const DEFAULT_CALC_METHOD: u8 = 1;
/// 0 = Standard, 1 = Hanafi.
pub const DEFAULT_ASR_SCHOOL: u8 = 0;
/// Daily adjustments beyond a full day are treated as typos.
pub const MAX_ADJUSTMENT_MINUTES: i64 = 24 * 60;
pub const DEFAULT_ANNOUNCEMENT: &str = "Welcome to the Masjid. Please silence your mobile phones.";

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct LocationSettings {
    pub city: String,
    pub country: String,
    pub calc_method: u8,
    pub asr_school: u8,
}

impl LocationSettings {
    pub fn is_configured(&self) -> bool {
        !self.city.trim().is_empty() && !self.country.trim().is_empty()
    }

    pub fn display(&self) -> String {
        format!("{}, {}", self.city, self.country)
    }
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            city: DEFAULT_CITY.to_string(),
            country: DEFAULT_COUNTRY.to_string(),
            calc_method: DEFAULT_CALC_METHOD,
            asr_school: DEFAULT_ASR_SCHOOL,
        }
    }
}

/// Snapshot of everything the board reads from persisted settings.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct MasjidSettings {
    #[serde(flatten)]
    pub location: LocationSettings,
    pub adjustments: Adjustments,
    pub iqamah: IqamahSettings,
    pub alert_enabled: bool,
    pub announcement: String,
}

impl Default for MasjidSettings {
    fn default() -> Self {
        Self {
            location: LocationSettings::default(),
            adjustments: Adjustments::default(),
            iqamah: IqamahSettings::default(),
            alert_enabled: false,
            announcement: DEFAULT_ANNOUNCEMENT.to_string(),
        }
    }
}

/// Reads settings from `path`. A missing or unreadable file yields defaults.
pub fn load_settings(path: &Path) -> Result<MasjidSettings> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(parse_settings_text(&content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(MasjidSettings::default()),
        Err(err) => Err(err)
            .with_context(|| format!("unable to read settings file {}", path.display())),
    }
}

/// Parses settings JSON. Unparsable fields fall back to their defaults and
/// a document that is not JSON at all falls back to the full defaults.
pub fn parse_settings_text(content: &str) -> MasjidSettings {
    match serde_json::from_str::<SettingsFile>(content) {
        Ok(raw) => settings_from_file(raw),
        Err(err) => {
            let line = err.line();
            let column = err.column();
            warn!("invalid settings JSON at line {line}, column {column}: {err}; using defaults");
            MasjidSettings::default()
        }
    }
}

/// Strict variant used for settings submitted over the API: a document that
/// is not a JSON object is an error instead of a silent reset.
pub fn parse_settings_document(content: &str) -> Result<MasjidSettings> {
    let raw = serde_json::from_str::<SettingsFile>(content).map_err(|err| {
        anyhow!(
            "invalid settings JSON at line {}, column {}: {err}",
            err.line(),
            err.column()
        )
    })?;
    Ok(settings_from_file(raw))
}

pub fn save_settings(path: &Path, settings: &MasjidSettings) -> Result<()> {
    let mut adjustments = Map::new();
    let mut iqamah = Map::new();
    for name in PrayerName::TRACKED {
        adjustments.insert(
            name.as_str().to_string(),
            Value::Number(settings.adjustments.minutes(name).into()),
        );
        iqamah.insert(
            name.as_str().to_string(),
            Value::String(settings.iqamah.setting(name).to_string()),
        );
    }
    if let Some(jumuah) = settings.iqamah.jumuah {
        iqamah.insert(JUMUAH_LABEL.to_string(), Value::String(jumuah.to_string()));
    }

    let payload = json!({
        "version": SETTINGS_VERSION,
        "city": settings.location.city,
        "country": settings.location.country,
        "calc_method": settings.location.calc_method,
        "asr_school": settings.location.asr_school,
        "adjustments": adjustments,
        "iqamah": iqamah,
        "alert_enabled": settings.alert_enabled,
        "announcement": settings.announcement,
    });
    let text = serde_json::to_string_pretty(&payload)?;
    fs::write(path, format!("{text}\n"))
        .with_context(|| format!("unable to write settings file {}", path.display()))?;
    Ok(())
}

fn settings_from_file(raw: SettingsFile) -> MasjidSettings {
    if let Some(version) = raw.version
        && version != SETTINGS_VERSION
    {
        warn!("settings version {version} is not {SETTINGS_VERSION}; reading known fields only");
    }

    let defaults = LocationSettings::default();
    let location = LocationSettings {
        city: text_or(raw.city, &defaults.city),
        country: text_or(raw.country, &defaults.country),
        calc_method: small_int_or("calc_method", raw.calc_method.as_ref(), defaults.calc_method),
        asr_school: small_int_or("asr_school", raw.asr_school.as_ref(), defaults.asr_school),
    };

    let mut adjustments = Adjustments::default();
    let mut iqamah = IqamahSettings::default();
    for name in PrayerName::TRACKED {
        if let Some(value) = raw.adjustments.get(name.as_str()) {
            adjustments.set(name, parse_adjustment(name.as_str(), value));
        }
        if let Some(setting) = raw
            .iqamah
            .get(name.as_str())
            .and_then(|value| parse_iqamah(name.as_str(), value))
        {
            iqamah.set(name, setting);
        }
    }
    if let Some(setting) = raw
        .iqamah
        .get(JUMUAH_LABEL)
        .and_then(|value| parse_iqamah(JUMUAH_LABEL, value))
    {
        iqamah.jumuah = Some(setting);
    }

    MasjidSettings {
        location,
        adjustments,
        iqamah,
        alert_enabled: raw.alert_enabled.unwrap_or(false),
        announcement: text_or(raw.announcement, DEFAULT_ANNOUNCEMENT),
    }
}

fn text_or(value: Option<String>, default: &str) -> String {
    match value {
        Some(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => default.to_string(),
    }
}

fn small_int_or(field: &str, value: Option<&Value>, default: u8) -> u8 {
    let Some(value) = value else {
        return default;
    };
    let parsed = match value {
        Value::Number(number) => number.as_u64().and_then(|n| u8::try_from(n).ok()),
        Value::String(text) => text.trim().parse::<u8>().ok(),
        _ => None,
    };
    parsed.unwrap_or_else(|| {
        warn!("settings field {field} has invalid value {value}; using {default}");
        default
    })
}

fn parse_adjustment(field: &str, value: &Value) -> i64 {
    let parsed = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|n| n.is_finite()).map(|n| n.trunc() as i64)),
        Value::String(text) if text.trim().is_empty() => Some(0),
        Value::String(text) => leading_integer(text.trim()),
        Value::Null => Some(0),
        _ => None,
    };
    match parsed {
        Some(minutes) if (-MAX_ADJUSTMENT_MINUTES..=MAX_ADJUSTMENT_MINUTES).contains(&minutes) => {
            minutes
        }
        Some(minutes) => {
            warn!(
                "adjustment for {field} of {minutes} minutes is outside +/-{MAX_ADJUSTMENT_MINUTES}; using 0"
            );
            0
        }
        None => {
            warn!("adjustment for {field} has invalid value {value}; using 0");
            0
        }
    }
}

/// Reads an optional sign and the digits that follow it, ignoring anything
/// after them, so "10min" is 10 and "5.5" is 5.
fn leading_integer(text: &str) -> Option<i64> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let magnitude = rest[..digits_end].parse::<i64>().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_iqamah(field: &str, value: &Value) -> Option<IqamahSetting> {
    let Value::String(text) = value else {
        if !value.is_null() {
            warn!("iqamah for {field} has invalid value {value}; using default");
        }
        return None;
    };
    if text.trim().is_empty() {
        return None;
    }
    match IqamahSetting::parse(text) {
        Ok(setting) => Some(setting),
        Err(err) => {
            warn!("iqamah for {field}: {err}; using default");
            None
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct SettingsFile {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    calc_method: Option<Value>,
    #[serde(default)]
    asr_school: Option<Value>,
    #[serde(default)]
    adjustments: Map<String, Value>,
    #[serde(default)]
    iqamah: Map<String, Value>,
    #[serde(default)]
    alert_enabled: Option<bool>,
    #[serde(default)]
    announcement: Option<String>,
}
