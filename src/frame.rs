//! Tabular view of a record batch, with CSV output.
//!
//! Columns are the union of record keys in first-seen order. Known timestamp
//! fields are decoded for the batch's version so they can be re-encoded in
//! any output format.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;
use serde_json::Value;
use tracing::debug;

use crate::encoding::{EncodingContext, RawValue, ValueEncoder, decode_timestamp};
use crate::error::{MdsError, Result};
use crate::payloads::RecordBatch;
use crate::schemas::RecordType;
use crate::versions::Version;

#[derive(Debug, Clone)]
pub struct RecordFrame {
    pub version: Version,
    pub record_type: RecordType,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

impl RecordFrame {
    /// # Errors
    ///
    /// Fails for unsupported batch versions, non-object records and
    /// timestamp fields that cannot be decoded.
    pub fn from_batch(batch: &RecordBatch, record_type: RecordType) -> Result<Self> {
        let context = EncodingContext::for_version(batch.version)?;
        let timestamp_fields = record_type.timestamp_fields();

        let mut columns: Vec<String> = Vec::new();
        let mut objects = Vec::with_capacity(batch.records.len());
        for record in &batch.records {
            let object = record.as_object().ok_or_else(|| {
                MdsError::InvalidPayload(format!("{record_type} record is not a JSON object"))
            })?;
            for key in object.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
            objects.push(object);
        }

        let mut rows = Vec::with_capacity(objects.len());
        for object in objects {
            let mut row = Vec::with_capacity(columns.len());
            for column in &columns {
                let cell = match object.get(column) {
                    None | Some(Value::Null) => RawValue::Null,
                    Some(raw) if timestamp_fields.contains(&column.as_str()) => {
                        RawValue::Timestamp(decode_timestamp(raw, &context)?)
                    }
                    Some(raw) => RawValue::from(raw.clone()),
                };
                row.push(cell);
            }
            rows.push(row);
        }

        Ok(Self {
            version: batch.version,
            record_type,
            columns,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &RawValue>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Writes a header row and every record. Cells go through `encoder`;
    /// strings are written verbatim, nulls as empty cells, everything else as
    /// JSON text.
    pub fn write_csv<W: Write>(&self, writer: W, encoder: &ValueEncoder) -> Result<()> {
        self.write_rows(WriterBuilder::new().from_writer(writer), true, encoder)
    }

    /// Appends rows to a CSV file, writing the header only when the file is
    /// created.
    pub fn append_csv(&self, path: &Path, encoder: &ValueEncoder) -> Result<()> {
        let file_exists = path.exists();
        debug!(path = %path.display(), file_exists, rows = self.len(), "Appending CSV rows");

        let file = OpenOptions::new().append(true).create(true).open(path)?;
        self.write_rows(WriterBuilder::new().from_writer(file), !file_exists, encoder)
    }

    fn write_rows<W: Write>(
        &self,
        mut writer: csv::Writer<W>,
        header: bool,
        encoder: &ValueEncoder,
    ) -> Result<()> {
        if header {
            writer.write_record(&self.columns)?;
        }
        for row in &self.rows {
            let cells = row
                .iter()
                .map(|cell| cell_text(cell, encoder))
                .collect::<Result<Vec<_>>>()?;
            writer.write_record(&cells)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn cell_text(cell: &RawValue, encoder: &ValueEncoder) -> Result<String> {
    Ok(match encoder.encode(cell)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::DateFormat;
    use serde_json::json;

    fn batch() -> RecordBatch {
        RecordBatch {
            version: Version::new(0, 3, 0),
            records: vec![
                json!({ "provider_name": "Lime", "event_time": 1609459200000i64, "event_type": "available" }),
                json!({ "provider_name": "Lime", "event_time": "1609459260000", "battery_pct": 0.5 }),
            ],
        }
    }

    fn iso_encoder() -> ValueEncoder {
        ValueEncoder::new(EncodingContext::new(Version::new(0, 3, 0), DateFormat::Iso8601).unwrap())
    }

    #[test]
    fn test_columns_are_union_in_first_seen_order() {
        let frame = RecordFrame::from_batch(&batch(), RecordType::StatusChanges).unwrap();
        assert_eq!(
            frame.columns,
            ["provider_name", "event_time", "event_type", "battery_pct"]
        );
        assert_eq!(frame.len(), 2);
        assert!(matches!(frame.rows[0][3], RawValue::Null));
        assert!(matches!(frame.rows[1][2], RawValue::Null));
    }

    #[test]
    fn test_timestamp_fields_are_decoded() {
        let frame = RecordFrame::from_batch(&batch(), RecordType::StatusChanges).unwrap();
        let times: Vec<_> = frame.column("event_time").unwrap().collect();
        match times[1] {
            RawValue::Timestamp(t) => assert_eq!(t.timestamp(), 1609459260),
            other => panic!("expected timestamp, got {other:?}"),
        }
    }

    #[test]
    fn test_non_object_record_rejected() {
        let bad = RecordBatch {
            version: Version::new(0, 3, 0),
            records: vec![json!([1, 2])],
        };
        assert!(RecordFrame::from_batch(&bad, RecordType::Trips).is_err());
    }

    #[test]
    fn test_write_csv_reencodes_timestamps() {
        let frame = RecordFrame::from_batch(&batch(), RecordType::StatusChanges).unwrap();
        let mut out = Vec::new();
        frame.write_csv(&mut out, &iso_encoder()).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "provider_name,event_time,event_type,battery_pct");
        assert_eq!(lines[1], "Lime,2021-01-01T00:00:00Z,available,");
        assert_eq!(lines[2], "Lime,2021-01-01T00:01:00Z,,0.5");
    }

    #[test]
    fn test_append_csv_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status_changes.csv");
        let frame = RecordFrame::from_batch(&batch(), RecordType::StatusChanges).unwrap();

        frame.append_csv(&path, &iso_encoder()).unwrap();
        frame.append_csv(&path, &iso_encoder()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.starts_with("provider_name")).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 5);
    }
}
