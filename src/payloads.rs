//! Extraction and version reconciliation of raw MDS Provider payloads.
//!
//! A payload is either a single page
//! `{"version": "0.3.0", "data": {"trips": [...]}}` or a JSON array of such
//! pages. [`extract`] turns a heterogeneous batch into one [`RecordBatch`] per
//! page; [`reconcile`] either keeps the pages apart or merges them, refusing
//! to merge pages that declare different versions.

use serde_json::Value;
use tracing::debug;

use crate::error::{MdsError, Result};
use crate::schemas::RecordType;
use crate::versions::Version;

/// An opaque MDS record; only its container is interpreted here.
pub type Record = Value;

/// Records of one page (or one merged batch) with their declared version.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    pub version: Version,
    pub records: Vec<Record>,
}

/// Outcome of [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Every page merged under their common version.
    Merged(RecordBatch),
    /// One batch per source page, unmerged. Also the result for empty input.
    Pages(Vec<RecordBatch>),
}

impl Reconciled {
    pub fn is_empty(&self) -> bool {
        match self {
            Reconciled::Merged(batch) => batch.records.is_empty(),
            Reconciled::Pages(pages) => pages.is_empty(),
        }
    }

    /// Total number of records across all batches.
    pub fn record_count(&self) -> usize {
        self.batches().map(|b| b.records.len()).sum()
    }

    pub fn batches(&self) -> impl Iterator<Item = &RecordBatch> {
        let (merged, pages) = match self {
            Reconciled::Merged(batch) => (Some(batch), &[][..]),
            Reconciled::Pages(pages) => (None, pages.as_slice()),
        };
        merged.into_iter().chain(pages.iter())
    }

    pub fn into_batches(self) -> Vec<RecordBatch> {
        match self {
            Reconciled::Merged(batch) => vec![batch],
            Reconciled::Pages(pages) => pages,
        }
    }
}

/// Collects `(version, records)` for `record_type` from every page.
///
/// Pages without `data.<record_type>` are skipped. Output order follows
/// payload order, then page order within a payload.
///
/// # Errors
///
/// [`MdsError::InvalidPayload`] for a page that is not an object, a `data`
/// that is not an object, or a missing version. [`MdsError::MalformedVersion`]
/// for an unparseable version.
pub fn extract(payloads: &[Value], record_type: RecordType) -> Result<Vec<RecordBatch>> {
    let mut batches = Vec::new();

    for payload in payloads {
        let pages = match payload {
            Value::Array(pages) => pages.as_slice(),
            page => std::slice::from_ref(page),
        };

        for page in pages {
            if let Some(batch) = extract_page(page, record_type)? {
                batches.push(batch);
            }
        }
    }

    debug!(
        payloads = payloads.len(),
        pages = batches.len(),
        record_type = %record_type,
        "Extracted record batches"
    );
    Ok(batches)
}

fn extract_page(page: &Value, record_type: RecordType) -> Result<Option<RecordBatch>> {
    let page = page
        .as_object()
        .ok_or_else(|| MdsError::InvalidPayload("page is not a JSON object".to_string()))?;

    let data = match page.get("data") {
        Some(Value::Object(data)) => data,
        None | Some(Value::Null) => return Ok(None),
        Some(_) => {
            return Err(MdsError::InvalidPayload(
                "page data is not a JSON object".to_string(),
            ));
        }
    };

    let records = match data.get(record_type.as_str()) {
        Some(Value::Array(records)) => records,
        Some(_) => {
            return Err(MdsError::InvalidPayload(format!(
                "data.{record_type} is not an array"
            )));
        }
        None => return Ok(None),
    };

    let version = page
        .get("version")
        .ok_or_else(|| MdsError::InvalidPayload("page has no version".to_string()))?;
    let version = Version::try_from(version)?;

    Ok(Some(RecordBatch {
        version,
        records: records.clone(),
    }))
}

/// Keeps pages apart (`flatten = false`) or merges them into one batch.
///
/// Merging requires every page to share the first page's version and
/// concatenates records in input order. Empty input yields an empty
/// [`Reconciled::Pages`] in both modes.
///
/// # Errors
///
/// [`MdsError::UnexpectedVersion`] naming the first page whose version
/// differs from the first page's. Nothing is merged in that case.
pub fn reconcile(batches: Vec<RecordBatch>, flatten: bool) -> Result<Reconciled> {
    if !flatten {
        return Ok(Reconciled::Pages(batches));
    }

    let Some(expected) = batches.first().map(|b| b.version) else {
        return Ok(Reconciled::Pages(Vec::new()));
    };

    if let Some(mismatch) = batches.iter().find(|b| b.version != expected) {
        return Err(MdsError::UnexpectedVersion {
            actual: mismatch.version,
            expected,
        });
    }

    let records: Vec<Record> = batches.into_iter().flat_map(|b| b.records).collect();
    debug!(version = %expected, records = records.len(), "Merged record batches");

    Ok(Reconciled::Merged(RecordBatch {
        version: expected,
        records,
    }))
}
