use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::prayer::model::{RawTimings, TimeParseError};
use crate::settings::LocationSettings;

pub const DEFAULT_PROVIDER_URL: &str = "https://api.aladhan.com/v1/timingsByCity";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to timing provider failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("timing provider returned HTTP status {0}")]
    Status(u16),
    #[error("timing provider reported code {code}: {status}")]
    Provider { code: i64, status: String },
    #[error("malformed timing payload: {0}")]
    Payload(String),
    #[error("unable to read timings file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl From<TimeParseError> for FetchError {
    fn from(err: TimeParseError) -> Self {
        FetchError::Payload(err.to_string())
    }
}

/// Source of raw daily timings.
pub trait TimingSource: Send + Sync {
    fn fetch(&self, location: &LocationSettings, date: NaiveDate) -> Result<RawTimings, FetchError>;
    fn label(&self) -> &str;
}

/// Aladhan-compatible `timingsByCity` endpoint.
pub struct AladhanSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl AladhanSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn request_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            date.format("%d-%m-%Y")
        )
    }
}

impl TimingSource for AladhanSource {
    fn fetch(&self, location: &LocationSettings, date: NaiveDate) -> Result<RawTimings, FetchError> {
        let url = self.request_url(date);
        let method = location.calc_method.to_string();
        let school = location.asr_school.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("city", location.city.as_str()),
                ("country", location.country.as_str()),
                ("method", method.as_str()),
                ("school", school.as_str()),
            ])
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.text()?;
        parse_provider_payload(&body)
    }

    fn label(&self) -> &str {
        &self.base_url
    }
}

/// Reads a provider payload, or a bare `{"Fajr": "05:00", ...}` map, from disk.
pub struct FileSource {
    path: PathBuf,
    label: String,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        let label = path.display().to_string();
        Self { path, label }
    }
}

impl TimingSource for FileSource {
    fn fetch(&self, _location: &LocationSettings, _date: NaiveDate) -> Result<RawTimings, FetchError> {
        let text = fs::read_to_string(&self.path).map_err(|source| FetchError::Io {
            path: self.label.clone(),
            source,
        })?;
        match serde_json::from_str::<BTreeMap<String, String>>(&text) {
            Ok(map) => Ok(RawTimings::from_map(&map)?),
            Err(_) => parse_provider_payload(&text),
        }
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Parses a `timingsByCity` response body.
pub fn parse_provider_payload(body: &str) -> Result<RawTimings, FetchError> {
    let payload = serde_json::from_str::<ProviderResponse>(body).map_err(|err| {
        FetchError::Payload(format!(
            "invalid JSON at line {}, column {}: {err}",
            err.line(),
            err.column()
        ))
    })?;
    if payload.code != 200 {
        return Err(FetchError::Provider {
            code: payload.code,
            status: payload.status.unwrap_or_default(),
        });
    }
    let data = payload
        .data
        .ok_or_else(|| FetchError::Payload("response has no data".to_string()))?;
    let data = serde_json::from_value::<ProviderData>(data)
        .map_err(|err| FetchError::Payload(format!("unexpected data shape: {err}")))?;

    let mut raw = RawTimings::from_map(&data.timings)?;
    raw.hijri_date = data
        .date
        .and_then(|date| date.hijri)
        .map(|hijri| format!("{} {} {}", hijri.day, hijri.month.en, hijri.year));
    Ok(raw)
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    code: i64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProviderData {
    timings: BTreeMap<String, String>,
    #[serde(default)]
    date: Option<ProviderDate>,
}

#[derive(Debug, Deserialize)]
struct ProviderDate {
    #[serde(default)]
    hijri: Option<HijriDate>,
}

#[derive(Debug, Deserialize)]
struct HijriDate {
    day: String,
    month: HijriMonth,
    year: String,
}

#[derive(Debug, Deserialize)]
struct HijriMonth {
    en: String,
}
