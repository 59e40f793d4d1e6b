//! MDS Provider record types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MdsError;

/// The record collections an MDS Provider payload can carry under `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    StatusChanges,
    Trips,
}

impl RecordType {
    pub const ALL: [RecordType; 2] = [RecordType::StatusChanges, RecordType::Trips];

    /// Key of the record collection inside a payload's `data` object.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::StatusChanges => "status_changes",
            RecordType::Trips => "trips",
        }
    }

    /// Field that places a record in time.
    pub fn time_key(&self) -> &'static str {
        match self {
            RecordType::StatusChanges => "event_time",
            RecordType::Trips => "start_time",
        }
    }

    /// Record fields carrying MDS timestamps.
    pub fn timestamp_fields(&self) -> &'static [&'static str] {
        match self {
            RecordType::StatusChanges => &["event_time", "publication_time"],
            RecordType::Trips => &["start_time", "end_time", "publication_time"],
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = MdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MdsError::UnknownRecordType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_types() {
        assert_eq!(
            "status_changes".parse::<RecordType>().unwrap(),
            RecordType::StatusChanges
        );
        assert_eq!("trips".parse::<RecordType>().unwrap(), RecordType::Trips);
        assert!(matches!(
            "vehicles".parse::<RecordType>(),
            Err(MdsError::UnknownRecordType(_))
        ));
    }

    #[test]
    fn test_time_keys() {
        assert_eq!(RecordType::StatusChanges.time_key(), "event_time");
        assert_eq!(RecordType::Trips.time_key(), "start_time");
        for t in RecordType::ALL {
            assert!(t.timestamp_fields().contains(&t.time_key()));
        }
    }

    #[test]
    fn test_serde_matches_payload_keys() {
        for t in RecordType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }
}
