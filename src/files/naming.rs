//! File naming for dumped payloads.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::encoding::{EncodingContext, decode_timestamp};
use crate::error::{MdsError, Result};
use crate::schemas::RecordType;
use crate::versions::Version;

const HOUR_FORMAT: &str = "%Y%m%dT%H0000Z";

/// Everything a naming strategy gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct FileNameRequest<'a> {
    pub record_type: Option<RecordType>,
    /// All pages being written in this dump.
    pub payloads: &'a [Value],
    pub extension: &'a str,
    /// The page being written, in one-file-per-payload mode.
    pub payload: Option<&'a Value>,
}

type NameFn = dyn Fn(&FileNameRequest<'_>) -> Result<String> + Send + Sync;

/// How output files are named.
#[derive(Clone, Default)]
pub enum FileName {
    /// `{providers}_{record_type}_{start}_{end}.json`, or a content hash.
    #[default]
    Generated,
    Fixed(String),
    Custom(Arc<NameFn>),
}

impl FileName {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&FileNameRequest<'_>) -> Result<String> + Send + Sync + 'static,
    {
        FileName::Custom(Arc::new(f))
    }

    pub fn resolve(&self, request: &FileNameRequest<'_>) -> Result<String> {
        match self {
            FileName::Generated => generated_name(request),
            FileName::Fixed(name) => Ok(name.clone()),
            FileName::Custom(f) => f(request),
        }
    }
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileName::Generated => f.write_str("Generated"),
            FileName::Fixed(name) => f.debug_tuple("Fixed").field(name).finish(),
            FileName::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Names a file after the providers and hour-clipped time span of its
/// records (of `payload` when set, else of all `payloads`). Falls back to a short SHA-256 of the JSON content when the
/// record type is ambiguous or no record carries a time.
pub fn generated_name(request: &FileNameRequest<'_>) -> Result<String> {
    let pages = match request.payload {
        Some(payload) => std::slice::from_ref(payload),
        None => request.payloads,
    };
    let Some(record_type) = request.record_type.or_else(|| single_record_type(pages)) else {
        return hashed_name(request);
    };

    let time_key = record_type.time_key();
    let mut bounds: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
    let mut providers = BTreeSet::new();

    for page in pages {
        let Some(records) = page["data"][record_type.as_str()].as_array() else {
            continue;
        };
        if records.is_empty() {
            continue;
        }

        let version = Version::try_from(&page["version"])?;
        let context = EncodingContext::for_reading(version);

        for record in records {
            if let Some(name) = record["provider_name"].as_str() {
                providers.insert(name);
            }
            let raw = &record[time_key];
            if raw.is_null() {
                return Err(MdsError::InvalidPayload(format!(
                    "{record_type} record without {time_key}"
                )));
            }
            let t = decode_timestamp(raw, &context)?;
            bounds = Some(match bounds {
                Some((start, end)) => (start.min(t), end.max(t)),
                None => (t, t),
            });
        }
    }

    let Some((start, end)) = bounds else {
        return hashed_name(request);
    };

    let start = clip_to_hour(start);
    let mut end = clip_to_hour(end);
    if start == end {
        end += TimeDelta::hours(1);
    }

    let providers: Vec<&str> = providers.into_iter().collect();
    Ok(format!(
        "{}_{}_{}_{}{}",
        providers.join("_"),
        record_type,
        start.format(HOUR_FORMAT),
        end.format(HOUR_FORMAT),
        request.extension
    ))
}

fn single_record_type(payloads: &[Value]) -> Option<RecordType> {
    let keys: BTreeSet<&str> = payloads
        .iter()
        .filter_map(|p| p["data"].as_object()?.keys().next().map(String::as_str))
        .collect();

    match keys.into_iter().collect::<Vec<_>>().as_slice() {
        [only] => only.parse().ok(),
        _ => None,
    }
}

fn hashed_name(request: &FileNameRequest<'_>) -> Result<String> {
    let data = match request.payload {
        Some(payload) => serde_json::to_vec(payload)?,
        None => serde_json::to_vec(request.payloads)?,
    };
    let digest = format!("{:x}", Sha256::digest(&data));
    Ok(format!("{}{}", &digest[..7], request.extension))
}

fn clip_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_minute(0))
        .unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request<'a>(record_type: Option<RecordType>, payloads: &'a [Value]) -> FileNameRequest<'a> {
        FileNameRequest {
            record_type,
            payloads,
            extension: ".json",
            payload: None,
        }
    }

    #[test]
    fn test_generated_name_from_millisecond_times() {
        let payloads = vec![json!({
            "version": "0.3.0",
            "data": { "status_changes": [
                { "provider_name": "Lime", "event_time": 1609459200000i64 },
                { "provider_name": "Bird", "event_time": 1609466400000i64 },
            ]}
        })];
        let name = generated_name(&request(None, &payloads)).unwrap();
        assert_eq!(name, "Bird_Lime_status_changes_20210101T000000Z_20210101T020000Z.json");
    }

    #[test]
    fn test_generated_name_same_hour_extends_end() {
        let payloads = vec![json!({
            "version": "0.2.0",
            "data": { "trips": [
                { "provider_name": "Jump", "start_time": 1609459260 },
                { "provider_name": "Jump", "start_time": "1609459320.5" },
            ]}
        })];
        let name = generated_name(&request(Some(RecordType::Trips), &payloads)).unwrap();
        assert_eq!(name, "Jump_trips_20210101T000000Z_20210101T010000Z.json");
    }

    #[test]
    fn test_generated_name_ignores_supported_range() {
        let payloads = vec![json!({
            "version": "0.1.0",
            "data": { "trips": [
                { "provider_name": "Jump", "start_time": 1609459200 },
            ]}
        })];
        let name = generated_name(&request(Some(RecordType::Trips), &payloads)).unwrap();
        assert_eq!(name, "Jump_trips_20210101T000000Z_20210101T010000Z.json");
    }

    #[test]
    fn test_mixed_record_types_fall_back_to_hash() {
        let payloads = vec![
            json!({ "version": "0.3.0", "data": { "trips": [] } }),
            json!({ "version": "0.3.0", "data": { "status_changes": [] } }),
        ];
        let name = generated_name(&request(None, &payloads)).unwrap();
        assert_eq!(name.len(), 7 + ".json".len());
        assert!(name[..7].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(name, generated_name(&request(None, &payloads)).unwrap());
    }

    #[test]
    fn test_hash_uses_single_payload_when_given() {
        let payloads = vec![json!({ "a": 1 }), json!({ "b": 2 })];
        let whole = generated_name(&request(None, &payloads)).unwrap();
        let single = generated_name(&FileNameRequest {
            payload: Some(&payloads[0]),
            ..request(None, &payloads)
        })
        .unwrap();
        assert_ne!(whole, single);
    }

    #[test]
    fn test_missing_time_is_an_error() {
        let payloads = vec![json!({
            "version": "0.3.0",
            "data": { "trips": [{ "provider_name": "Lime" }] }
        })];
        assert!(generated_name(&request(Some(RecordType::Trips), &payloads)).is_err());
    }

    #[test]
    fn test_fixed_and_custom_names() {
        let payloads: Vec<Value> = Vec::new();
        assert_eq!(
            FileName::Fixed("out.json".into()).resolve(&request(None, &payloads)).unwrap(),
            "out.json"
        );
        let custom = FileName::custom(|req| Ok(format!("custom{}", req.extension)));
        assert_eq!(custom.resolve(&request(None, &payloads)).unwrap(), "custom.json");
    }
}
