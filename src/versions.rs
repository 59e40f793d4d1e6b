//! MDS format versions and the supported version range.
//!
//! A [`Version`] is an ordered `major.minor.patch` triple. Ordering is
//! lexicographic on the triple, so the derived `Ord` is the comparison the
//! rest of the crate relies on.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use tracing::{debug, warn};

use crate::error::{MdsError, Result};

/// Oldest format revision understood by this crate.
pub const MDS_LOWER: Version = Version::new(0, 2, 0);

/// Newest format revision understood by this crate.
pub const MDS_UPPER: Version = Version::new(0, 4, 1);

/// First version that encodes timestamps as integer milliseconds.
pub const MILLISECOND_TIMESTAMPS: Version = Version::new(0, 3, 0);

static INSTALLED_RANGE: OnceCell<VersionRange> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Where a version falls relative to a [`VersionRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStatus {
    /// Below the floor; codecs refuse to work with it.
    Unsupported,
    Supported,
    /// Above the ceiling; usable, but callers should warn.
    Deprecated,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses a `"major.minor.patch"` string.
    ///
    /// # Errors
    ///
    /// Returns [`MdsError::MalformedVersion`] unless the input is exactly three
    /// dot-separated non-negative integers.
    pub fn parse(input: &str) -> Result<Self> {
        let malformed = || MdsError::MalformedVersion(input.to_string());

        let mut parts = input.trim().split('.');
        let mut next = || -> Result<u32> {
            let part = parts.next().ok_or_else(malformed)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            part.parse().map_err(|_| malformed())
        };

        let version = Version::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(version)
    }

    /// Classifies this version against the process-wide range.
    pub fn status(&self) -> VersionStatus {
        VersionRange::current().classify(self)
    }

    pub fn is_unsupported(&self) -> bool {
        self.status() == VersionStatus::Unsupported
    }

    pub fn is_deprecated(&self) -> bool {
        self.status() == VersionStatus::Deprecated
    }

    pub fn is_supported(&self) -> bool {
        self.status() == VersionStatus::Supported
    }

    /// Timestamps for this version are integer milliseconds rather than
    /// fractional seconds.
    pub fn uses_millisecond_timestamps(&self) -> bool {
        *self >= MILLISECOND_TIMESTAMPS
    }
}

impl Default for Version {
    fn default() -> Self {
        MDS_LOWER
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = MdsError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl TryFrom<&str> for Version {
    type Error = MdsError;

    fn try_from(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl From<(u32, u32, u32)> for Version {
    fn from((major, minor, patch): (u32, u32, u32)) -> Self {
        Version::new(major, minor, patch)
    }
}

impl TryFrom<(i64, i64, i64)> for Version {
    type Error = MdsError;

    fn try_from(triple: (i64, i64, i64)) -> Result<Self> {
        let component = |n: i64| {
            u32::try_from(n).map_err(|_| MdsError::MalformedVersion(format!("{triple:?}")))
        };
        Ok(Version::new(
            component(triple.0)?,
            component(triple.1)?,
            component(triple.2)?,
        ))
    }
}

/// Accepts the dotted string form or a three-element integer array.
impl TryFrom<&serde_json::Value> for Version {
    type Error = MdsError;

    fn try_from(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(s) => Version::parse(s),
            serde_json::Value::Array(items) => match items.as_slice() {
                [a, b, c] => {
                    let n = |item: &serde_json::Value| {
                        item.as_i64()
                            .ok_or_else(|| MdsError::MalformedVersion(value.to_string()))
                    };
                    Version::try_from((n(a)?, n(b)?, n(c)?))
                }
                _ => Err(MdsError::MalformedVersion(value.to_string())),
            },
            other => Err(MdsError::MalformedVersion(other.to_string())),
        }
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(de::Error::custom)
    }
}

/// Floor and ceiling of the supported format revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub lower: Version,
    pub upper: Version,
}

impl Default for VersionRange {
    fn default() -> Self {
        Self {
            lower: MDS_LOWER,
            upper: MDS_UPPER,
        }
    }
}

impl VersionRange {
    pub fn new(lower: Version, upper: Version) -> Self {
        Self { lower, upper }
    }

    pub fn classify(&self, version: &Version) -> VersionStatus {
        if *version < self.lower {
            VersionStatus::Unsupported
        } else if *version > self.upper {
            VersionStatus::Deprecated
        } else {
            VersionStatus::Supported
        }
    }

    /// Installs the process-wide range. Only the first call takes effect;
    /// returns whether this call was the one that installed it.
    pub fn install(range: VersionRange) -> bool {
        match INSTALLED_RANGE.set(range) {
            Ok(()) => {
                debug!(lower = %range.lower, upper = %range.upper, "Installed version range");
                true
            }
            Err(rejected) => {
                warn!(
                    lower = %rejected.lower,
                    upper = %rejected.upper,
                    "Version range already installed, ignoring"
                );
                false
            }
        }
    }

    /// The installed range, or the built-in default when none was installed.
    pub fn current() -> VersionRange {
        INSTALLED_RANGE.get().copied().unwrap_or_default()
    }
}
