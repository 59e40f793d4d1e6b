//! Encoding and decoding of MDS Provider data.
//!
//! [`timestamp`] holds the version-dependent timestamp rules; [`value`]
//! builds on it to turn whole value trees into plain JSON.

pub mod timestamp;
pub mod value;

pub use timestamp::{
    DateFormat, EncodingContext, TimestampCodec, decode_timestamp, encode_timestamp,
};
pub use value::{EncodeRule, RawValue, ValueEncoder, encode_value};
