//! Process settings and per-call option structs.
//!
//! [`Settings`] is read once from the environment (after `.env` has been
//! loaded). [`LoadOptions`] and [`DumpOptions`] are plain immutable values
//! passed to each [`crate::files::ProviderDataFiles`] call.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::files::FileName;
use crate::versions::{MDS_LOWER, MDS_UPPER, Version, VersionRange};

pub const DEFAULT_LOG_FILE: &str = "logs/mds_provider.log";

/// Environment-derived settings.
///
/// | variable              | default                 |
/// |-----------------------|-------------------------|
/// | `MDS_VERSION_LOWER`   | `0.2.0`                 |
/// | `MDS_VERSION_UPPER`   | `0.4.1`                 |
/// | `MDS_PROVIDER_TOKEN`  | unset                   |
/// | `LOG_FILE_PATH`       | `logs/mds_provider.log` |
#[derive(Debug, Clone)]
pub struct Settings {
    pub version_range: VersionRange,
    pub provider_token: Option<String>,
    pub log_file_path: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let version = |key: &str, default: Version| -> Result<Version> {
            match lookup(key) {
                Some(raw) => Version::parse(&raw).with_context(|| format!("{key} is not a version")),
                None => Ok(default),
            }
        };

        let version_range = VersionRange::new(
            version("MDS_VERSION_LOWER", MDS_LOWER)?,
            version("MDS_VERSION_UPPER", MDS_UPPER)?,
        );
        if version_range.lower > version_range.upper {
            anyhow::bail!(
                "MDS_VERSION_LOWER {} is above MDS_VERSION_UPPER {}",
                version_range.lower,
                version_range.upper
            );
        }

        Ok(Self {
            version_range,
            provider_token: lookup("MDS_PROVIDER_TOKEN").filter(|t| !t.is_empty()),
            log_file_path: lookup("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        })
    }
}

/// Headers sent with requests to URL sources.
///
/// Headers registered for a specific URL replace the defaults for that URL
/// rather than adding to them.
#[derive(Debug, Clone, Default)]
pub struct RequestHeaders {
    defaults: Vec<(String, String)>,
    per_url: HashMap<String, Vec<(String, String)>>,
}

impl RequestHeaders {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.push((name.into(), value.into()));
        self
    }

    pub fn with_url_header(
        mut self,
        url: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.per_url
            .entry(url.into())
            .or_default()
            .push((name.into(), value.into()));
        self
    }

    /// Parses a `"Name: value"` command-line argument.
    pub fn parse_arg(arg: &str) -> Result<(String, String)> {
        let (name, value) = arg
            .split_once(':')
            .with_context(|| format!("header {arg:?} is not in `Name: value` form"))?;
        Ok((name.trim().to_string(), value.trim().to_string()))
    }

    pub fn for_url(&self, url: &str) -> Result<HeaderMap> {
        let pairs = self.per_url.get(url).unwrap_or(&self.defaults);

        let mut headers = HeaderMap::with_capacity(pairs.len());
        for (name, value) in pairs {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name {name:?}"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header {name}"))?;
            headers.append(name, value);
        }
        Ok(headers)
    }
}

/// Options for loading payloads, records and frames.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Merge everything into one result (`true`, default) or keep one entry
    /// per source page.
    pub flatten: bool,
    pub headers: RequestHeaders,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            flatten: true,
            headers: RequestHeaders::default(),
        }
    }
}

/// Options for writing payloads to disk.
#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// Defaults to the single directory source, or the current directory.
    pub output_dir: Option<PathBuf>,
    /// One file for all payloads (default) or one file per payload.
    pub single_file: bool,
    /// Overrides the naming strategy of the [`crate::files::ProviderDataFiles`].
    pub file_name: Option<FileName>,
    pub pretty: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            single_file: true,
            file_name: None,
            pretty: false,
        }
    }
}
