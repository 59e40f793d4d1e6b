pub mod config;
pub mod encoding;
pub mod error;
pub mod fetch;
pub mod files;
pub mod frame;
pub mod geometry;
pub mod payloads;
pub mod schemas;
pub mod versions;

pub use encoding::{DateFormat, EncodingContext, RawValue, TimestampCodec, ValueEncoder};
pub use error::{MdsError, Result};
pub use files::{ProviderDataFiles, Source};
pub use payloads::{RecordBatch, Reconciled, extract, reconcile};
pub use schemas::RecordType;
pub use versions::{Version, VersionRange, VersionStatus};
