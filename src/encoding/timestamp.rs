//! Version-aware conversion between timestamps and their MDS wire form.
//!
//! | date format | version  | wire form                         |
//! |-------------|----------|-----------------------------------|
//! | unix        | < 0.3.0  | fractional seconds, `"1.234"`     |
//! | unix        | >= 0.3.0 | integer milliseconds, `"1234"`    |
//! | iso8601     | any      | `"1970-01-01T00:00:01.234Z"`      |
//! | custom      | any      | strftime pattern                  |
//! | plain       | any      | `"1970-01-01 00:00:01.234"`       |
//!
//! Decoding always tries a numeric reading first (seconds or milliseconds
//! depending on version) and only then falls back to parsing text.

use std::fmt::{self, Write};
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::warn;

use crate::error::{MdsError, Result};
use crate::versions::{Version, VersionRange, VersionStatus};

/// Naive layouts tried, in order, when a timestamp is neither numeric nor
/// RFC 3339.
const TEXT_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// How timestamps are rendered on output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DateFormat {
    /// Offset from the Unix epoch; seconds or milliseconds by version.
    #[default]
    Unix,
    Iso8601,
    /// A strftime pattern.
    Custom(String),
    /// The plain UTC date-time text, no format applied.
    Plain,
}

impl DateFormat {
    /// Builds a custom format, rejecting malformed strftime patterns.
    pub fn custom(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(MdsError::InvalidDateFormat(pattern));
        }
        Ok(DateFormat::Custom(pattern))
    }
}

impl FromStr for DateFormat {
    type Err = MdsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unix" => Ok(DateFormat::Unix),
            "iso8601" => Ok(DateFormat::Iso8601),
            "" | "plain" => Ok(DateFormat::Plain),
            pattern => DateFormat::custom(pattern),
        }
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateFormat::Unix => f.write_str("unix"),
            DateFormat::Iso8601 => f.write_str("iso8601"),
            DateFormat::Custom(pattern) => f.write_str(pattern),
            DateFormat::Plain => f.write_str("plain"),
        }
    }
}

/// Target version and date format shared by every value in one
/// encode/decode session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingContext {
    version: Version,
    date_format: DateFormat,
}

impl EncodingContext {
    /// # Errors
    ///
    /// [`MdsError::UnsupportedVersion`] when `version` is below the installed
    /// floor, [`MdsError::InvalidDateFormat`] for a malformed custom pattern.
    pub fn new(version: Version, date_format: DateFormat) -> Result<Self> {
        match VersionRange::current().classify(&version) {
            VersionStatus::Unsupported => return Err(MdsError::UnsupportedVersion(version)),
            VersionStatus::Deprecated => {
                warn!(%version, "Version is newer than the supported range");
            }
            VersionStatus::Supported => {}
        }

        if let DateFormat::Custom(pattern) = &date_format {
            DateFormat::custom(pattern.as_str())?;
        }

        Ok(Self {
            version,
            date_format,
        })
    }

    /// Context with the default unix date format.
    pub fn for_version(version: Version) -> Result<Self> {
        Self::new(version, DateFormat::Unix)
    }

    /// Context for reading existing timestamps only. Skips the supported
    /// range check, so it must not be used to produce output.
    pub(crate) fn for_reading(version: Version) -> Self {
        Self {
            version,
            date_format: DateFormat::Unix,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn date_format(&self) -> &DateFormat {
        &self.date_format
    }
}

impl Default for EncodingContext {
    fn default() -> Self {
        Self {
            version: VersionRange::current().lower,
            date_format: DateFormat::Unix,
        }
    }
}

/// Encodes a timestamp into its wire representation.
pub fn encode_timestamp(timestamp: &DateTime<Utc>, context: &EncodingContext) -> Result<String> {
    match &context.date_format {
        DateFormat::Unix if context.version.uses_millisecond_timestamps() => {
            let millis = (timestamp.timestamp_micros() + 500).div_euclid(1000);
            Ok(millis.to_string())
        }
        DateFormat::Unix => {
            let seconds = timestamp.timestamp_micros() as f64 / 1_000_000.0;
            let mut text = seconds.to_string();
            if !text.contains('.') {
                text.push_str(".0");
            }
            Ok(text)
        }
        DateFormat::Iso8601 => Ok(timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        DateFormat::Custom(pattern) => {
            let mut text = String::new();
            write!(text, "{}", timestamp.format(pattern))
                .map_err(|_| MdsError::InvalidDateFormat(pattern.clone()))?;
            Ok(text)
        }
        DateFormat::Plain => Ok(timestamp.naive_utc().to_string()),
    }
}

/// Decodes a wire timestamp, numeric first, then as text.
pub fn decode_timestamp(raw: &Value, context: &EncodingContext) -> Result<DateTime<Utc>> {
    if let Some(n) = numeric(raw) {
        let millis = if context.version.uses_millisecond_timestamps() {
            n.round()
        } else {
            (n * 1000.0).round()
        };
        return DateTime::from_timestamp_millis(millis as i64)
            .ok_or_else(|| MdsError::InvalidTimestamp(raw.to_string()));
    }

    match raw {
        Value::String(text) => parse_text(text, &context.date_format)
            .ok_or_else(|| MdsError::InvalidTimestamp(text.clone())),
        other => Err(MdsError::InvalidTimestamp(other.to_string())),
    }
}

fn numeric(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn parse_text(text: &str, date_format: &DateFormat) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let DateFormat::Custom(pattern) = date_format {
        if let Some(parsed) = parse_with(text, pattern) {
            return Some(parsed);
        }
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }

    TEXT_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .map(|naive| naive.and_utc())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            DateTime::parse_from_rfc2822(text)
                .ok()
                .map(|parsed| parsed.with_timezone(&Utc))
        })
}

fn parse_with(text: &str, pattern: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_str(text, pattern) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, pattern) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, pattern)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Timestamp encoder/decoder bound to one [`EncodingContext`].
#[derive(Debug, Clone)]
pub struct TimestampCodec {
    context: EncodingContext,
}

impl TimestampCodec {
    /// # Errors
    ///
    /// Fails with [`MdsError::UnsupportedVersion`] before any data is seen
    /// when `version` is below the supported floor.
    pub fn new(version: Version, date_format: DateFormat) -> Result<Self> {
        Ok(Self::from_context(EncodingContext::new(version, date_format)?))
    }

    pub fn from_context(context: EncodingContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &EncodingContext {
        &self.context
    }

    pub fn encode(&self, timestamp: &DateTime<Utc>) -> Result<String> {
        encode_timestamp(timestamp, &self.context)
    }

    pub fn decode(&self, raw: &Value) -> Result<DateTime<Utc>> {
        decode_timestamp(raw, &self.context)
    }
}
