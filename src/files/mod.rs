//! Reading and writing MDS Provider payload files.
//!
//! Sources are local JSON files, directories of JSON files, or HTTP(S) URLs.
//! Loading goes raw payloads → [`crate::payloads::extract`] →
//! [`crate::payloads::reconcile`] → optionally [`RecordFrame`]s.

mod naming;

pub use naming::{FileName, FileNameRequest, generated_name};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{DumpOptions, LoadOptions};
use crate::fetch::{BasicClient, HttpClient, fetch_json};
use crate::frame::RecordFrame;
use crate::payloads::{Reconciled, extract, reconcile};
use crate::schemas::RecordType;

const JSON_EXTENSION: &str = ".json";

/// A place to read payloads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Dir(PathBuf),
    Url(String),
}

impl Source {
    /// `http://` and `https://` URLs with a host are URLs; anything else is a
    /// path, classified as a directory when one exists there.
    pub fn parse(source: &str) -> Self {
        let is_url = (source.starts_with("http://") || source.starts_with("https://"))
            && reqwest::Url::parse(source).is_ok_and(|url| url.host_str().is_some());
        if is_url {
            return Source::Url(source.to_string());
        }
        Source::from(PathBuf::from(source))
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        if path.is_dir() {
            Source::Dir(path)
        } else {
            Source::File(path)
        }
    }
}

impl From<&str> for Source {
    fn from(source: &str) -> Self {
        Source::parse(source)
    }
}

/// Concrete files and URLs to read, in read order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<PathBuf>,
    pub urls: Vec<String>,
}

/// Expands sources into readable files and URLs.
///
/// Directories contribute their `*.json` children in name order. Files that
/// do not exist are skipped with a warning.
pub async fn ls(sources: &[Source]) -> Result<Listing> {
    let mut listing = Listing::default();
    let mut from_dirs = Vec::new();

    for source in sources {
        match source {
            Source::File(path) => {
                if is_file(path).await {
                    listing.files.push(path.clone());
                } else {
                    warn!(path = %path.display(), "Skipping missing source file");
                }
            }
            Source::Dir(dir) => {
                let mut entries = tokio::fs::read_dir(dir)
                    .await
                    .with_context(|| format!("reading directory {}", dir.display()))?;
                let mut children = Vec::new();
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("json")
                        && is_file(&path).await
                    {
                        children.push(path);
                    }
                }
                children.sort();
                from_dirs.extend(children);
            }
            Source::Url(url) => listing.urls.push(url.clone()),
        }
    }

    listing.files.extend(from_dirs);
    Ok(listing)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file())
}

fn has_record_type(page: &Value, record_type: RecordType) -> bool {
    page.get("data")
        .and_then(Value::as_object)
        .is_some_and(|data| data.contains_key(record_type.as_str()))
}

/// Works with MDS Provider payloads stored in files or served over HTTP.
pub struct ProviderDataFiles<C = BasicClient> {
    record_type: Option<RecordType>,
    sources: Vec<Source>,
    client: C,
    file_name: FileName,
}

impl ProviderDataFiles<BasicClient> {
    pub fn new<S: Into<Source>>(
        record_type: Option<RecordType>,
        sources: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        Ok(Self {
            record_type,
            sources: sources.into_iter().map(Into::into).collect(),
            client: BasicClient::new()?,
            file_name: FileName::default(),
        })
    }
}

impl<C: HttpClient> ProviderDataFiles<C> {
    /// Replaces the HTTP client, e.g. with an [`crate::fetch::ApiKey`] wrapper.
    pub fn with_client<D: HttpClient>(self, client: D) -> ProviderDataFiles<D> {
        ProviderDataFiles {
            record_type: self.record_type,
            sources: self.sources,
            client,
            file_name: self.file_name,
        }
    }

    pub fn with_file_name(mut self, file_name: FileName) -> Self {
        self.file_name = file_name;
        self
    }

    pub fn record_type(&self) -> Option<RecordType> {
        self.record_type
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    fn record_type_or_err(&self, record_type: Option<RecordType>) -> Result<RecordType> {
        record_type
            .or(self.record_type)
            .context("a record type must be specified")
    }

    /// The single directory source if there is exactly one, else `.`.
    fn default_dir(&self) -> PathBuf {
        let dirs: Vec<&PathBuf> = self
            .sources
            .iter()
            .filter_map(|s| match s {
                Source::Dir(dir) => Some(dir),
                _ => None,
            })
            .collect();
        match dirs.as_slice() {
            [dir] => (*dir).clone(),
            _ => PathBuf::from("."),
        }
    }

    /// Reads raw payloads.
    ///
    /// Falls back to the instance sources when `sources` is empty. Pages
    /// without `record_type` are dropped (no filtering when neither this call
    /// nor the instance names one). With `flatten`, page lists are spread into
    /// individual pages; otherwise each file or URL keeps its own shape.
    #[tracing::instrument(skip(self, sources, options), fields(flatten = options.flatten))]
    pub async fn load_payloads(
        &self,
        record_type: Option<RecordType>,
        sources: &[Source],
        options: &LoadOptions,
    ) -> Result<Vec<Value>> {
        let sources = if sources.is_empty() {
            &self.sources
        } else {
            sources
        };
        if sources.is_empty() {
            anyhow::bail!("there are no sources to read from");
        }
        let record_type = record_type.or(self.record_type);

        let listing = ls(sources).await?;
        debug!(files = listing.files.len(), urls = listing.urls.len(), "Listed sources");

        let mut data = Vec::with_capacity(listing.files.len() + listing.urls.len());
        for path in &listing.files {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let payload: Value = serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing {}", path.display()))?;
            data.push(payload);
        }
        for url in &listing.urls {
            let headers = options.headers.for_url(url)?;
            data.push(fetch_json(&self.client, url, headers).await?);
        }

        if let Some(record_type) = record_type {
            data = data
                .into_iter()
                .filter_map(|payload| match payload {
                    Value::Array(pages) => {
                        let pages: Vec<Value> = pages
                            .into_iter()
                            .filter(|page| has_record_type(page, record_type))
                            .collect();
                        (!pages.is_empty()).then_some(Value::Array(pages))
                    }
                    page if has_record_type(&page, record_type) => Some(page),
                    _ => None,
                })
                .collect();
        }

        if options.flatten {
            data = data
                .into_iter()
                .flat_map(|payload| match payload {
                    Value::Array(pages) => pages,
                    page => vec![page],
                })
                .collect();
        }

        info!(payloads = data.len(), "Loaded payloads");
        Ok(data)
    }

    /// Reads records of one type as version-checked batches.
    ///
    /// # Errors
    ///
    /// With `flatten`, fails with [`crate::MdsError::UnexpectedVersion`] when
    /// the pages disagree on their version.
    #[tracing::instrument(skip(self, sources, options), fields(flatten = options.flatten))]
    pub async fn load_records(
        &self,
        record_type: Option<RecordType>,
        sources: &[Source],
        options: &LoadOptions,
    ) -> Result<Reconciled> {
        let record_type = self.record_type_or_err(record_type)?;

        let raw_options = LoadOptions {
            flatten: false,
            ..options.clone()
        };
        let payloads = self
            .load_payloads(Some(record_type), sources, &raw_options)
            .await?;

        let batches = extract(&payloads, record_type)?;
        Ok(reconcile(batches, options.flatten)?)
    }

    /// Like [`Self::load_records`], one [`RecordFrame`] per resulting batch:
    /// a single frame when flattened, none when nothing was found.
    pub async fn load_frames(
        &self,
        record_type: Option<RecordType>,
        sources: &[Source],
        options: &LoadOptions,
    ) -> Result<Vec<RecordFrame>> {
        let record_type = self.record_type_or_err(record_type)?;
        let reconciled = self.load_records(Some(record_type), sources, options).await?;

        let frames = reconciled
            .batches()
            .map(|batch| RecordFrame::from_batch(batch, record_type))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(frames)
    }

    /// Writes payloads as JSON files.
    ///
    /// Page lists are spread into pages and pages without `record_type` are
    /// dropped first. Returns the file written (single-file mode) or the
    /// output directory (one file per page), or `None` when no page is left.
    #[tracing::instrument(skip(self, payloads, options), fields(single_file = options.single_file))]
    pub fn dump_payloads(
        &self,
        record_type: Option<RecordType>,
        payloads: &[Value],
        options: &DumpOptions,
    ) -> Result<Option<PathBuf>> {
        let record_type = record_type.or(self.record_type);
        let single_object = matches!(payloads, [Value::Object(_)]);

        let pages: Vec<Value> = payloads
            .iter()
            .flat_map(|payload| match payload {
                Value::Array(pages) => pages.clone(),
                page => vec![page.clone()],
            })
            .filter(|page| record_type.is_none_or(|t| has_record_type(page, t)))
            .collect();

        if pages.is_empty() {
            info!("No payloads to write");
            return Ok(None);
        }

        let output_dir = options.output_dir.clone().unwrap_or_else(|| self.default_dir());
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("creating {}", output_dir.display()))?;
        let file_name = options.file_name.as_ref().unwrap_or(&self.file_name);

        if options.single_file {
            let name = file_name.resolve(&FileNameRequest {
                record_type,
                payloads: &pages,
                extension: JSON_EXTENSION,
                payload: None,
            })?;
            let path = output_dir.join(name);
            if single_object && pages.len() == 1 {
                write_json(&path, &pages[0], options.pretty)?;
            } else {
                write_json(&path, &pages, options.pretty)?;
            }
            info!(path = %path.display(), pages = pages.len(), "Wrote payload file");
            return Ok(Some(path));
        }

        let width = pages.len().to_string().len();
        for (n, page) in pages.iter().enumerate() {
            let name = file_name.resolve(&FileNameRequest {
                record_type,
                payloads: &pages,
                extension: JSON_EXTENSION,
                payload: Some(page),
            })?;
            let mut path = output_dir.join(&name);
            if n > 0 && path.exists() {
                path = output_dir.join(numbered(&name, n, width));
            }
            write_json(&path, page, options.pretty)?;
            debug!(path = %path.display(), "Wrote payload file");
        }

        info!(dir = %output_dir.display(), pages = pages.len(), "Wrote payload files");
        Ok(Some(output_dir))
    }
}

/// `trips.json` → `trips_03.json` for `n = 3, width = 2`.
fn numbered(name: &str, n: usize, width: usize) -> String {
    let suffix = format!("_{n:0width$}");
    match name.strip_suffix(JSON_EXTENSION) {
        Some(stem) => format!("{stem}{suffix}{JSON_EXTENSION}"),
        None => format!("{name}{suffix}"),
    }
}

fn write_json(path: &Path, value: &impl serde::Serialize, pretty: bool) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    if pretty {
        serde_json::to_writer_pretty(&mut writer, value)?;
    } else {
        serde_json::to_writer(&mut writer, value)?;
    }
    writer.flush()?;
    Ok(())
}
