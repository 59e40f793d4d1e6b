//! Rewrites trees of MDS domain values into plain JSON.
//!
//! Encoding walks a [`RawValue`] and asks each registered [`EncodeRule`], in
//! order, whether it handles the current node. Built-in rules cover
//! timestamps, paths, geometry, tuples, UUIDs and versions; callers can add
//! their own with [`ValueEncoder::with_rule`] or [`ValueEncoder::register`].
//! Nodes no rule claims go to the generic JSON fallback, which only knows
//! plain scalars, arrays and objects.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::timestamp::{EncodingContext, TimestampCodec};
use crate::error::{MdsError, Result};
use crate::geometry::{Point, Polygon};
use crate::versions::Version;

/// A value as it exists in memory before serialization.
#[derive(Clone)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<RawValue>),
    /// Keys keep their insertion order.
    Object(Vec<(String, RawValue)>),
    Tuple(Vec<RawValue>),
    Timestamp(DateTime<Utc>),
    Path(PathBuf),
    Point(Point),
    Polygon(Polygon),
    Uuid(Uuid),
    Version(Version),
    /// Any other value; only encodable through a registered rule.
    Custom {
        type_name: &'static str,
        value: Arc<dyn Any + Send + Sync>,
    },
}

impl RawValue {
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        RawValue::Custom {
            type_name: std::any::type_name::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, RawValue)>) -> Self {
        RawValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Name of the value's kind, used in serialization errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "bool",
            RawValue::Number(_) => "number",
            RawValue::String(_) => "string",
            RawValue::Array(_) => "array",
            RawValue::Object(_) => "object",
            RawValue::Tuple(_) => "tuple",
            RawValue::Timestamp(_) => "timestamp",
            RawValue::Path(_) => "path",
            RawValue::Point(_) => "point",
            RawValue::Polygon(_) => "polygon",
            RawValue::Uuid(_) => "uuid",
            RawValue::Version(_) => "version",
            RawValue::Custom { type_name, .. } => *type_name,
        }
    }
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("Null"),
            RawValue::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            RawValue::Number(n) => f.debug_tuple("Number").field(n).finish(),
            RawValue::String(s) => f.debug_tuple("String").field(s).finish(),
            RawValue::Array(items) => f.debug_tuple("Array").field(items).finish(),
            RawValue::Object(entries) => f.debug_tuple("Object").field(entries).finish(),
            RawValue::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
            RawValue::Timestamp(t) => f.debug_tuple("Timestamp").field(t).finish(),
            RawValue::Path(p) => f.debug_tuple("Path").field(p).finish(),
            RawValue::Point(p) => f.debug_tuple("Point").field(p).finish(),
            RawValue::Polygon(p) => f.debug_tuple("Polygon").field(p).finish(),
            RawValue::Uuid(u) => f.debug_tuple("Uuid").field(u).finish(),
            RawValue::Version(v) => f.debug_tuple("Version").field(v).finish(),
            RawValue::Custom { type_name, .. } => f.debug_tuple("Custom").field(type_name).finish(),
        }
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawValue::Null,
            Value::Bool(b) => RawValue::Bool(b),
            Value::Number(n) => RawValue::Number(n),
            Value::String(s) => RawValue::String(s),
            Value::Array(items) => RawValue::Array(items.into_iter().map(RawValue::from).collect()),
            Value::Object(map) => {
                RawValue::Object(map.into_iter().map(|(k, v)| (k, RawValue::from(v))).collect())
            }
        }
    }
}

impl From<DateTime<Utc>> for RawValue {
    fn from(t: DateTime<Utc>) -> Self {
        RawValue::Timestamp(t)
    }
}

impl From<PathBuf> for RawValue {
    fn from(p: PathBuf) -> Self {
        RawValue::Path(p)
    }
}

impl From<Point> for RawValue {
    fn from(p: Point) -> Self {
        RawValue::Point(p)
    }
}

impl From<Polygon> for RawValue {
    fn from(p: Polygon) -> Self {
        RawValue::Polygon(p)
    }
}

impl From<Uuid> for RawValue {
    fn from(u: Uuid) -> Self {
        RawValue::Uuid(u)
    }
}

impl From<Version> for RawValue {
    fn from(v: Version) -> Self {
        RawValue::Version(v)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::String(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::String(s)
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        RawValue::Number(n.into())
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Bool(b)
    }
}

/// A (predicate, converter) pair consulted during encoding.
pub trait EncodeRule: Send + Sync {
    fn matches(&self, value: &RawValue) -> bool;

    /// Only called when [`EncodeRule::matches`] returned `true`. `encoder`
    /// is available for recursing into children.
    fn convert(&self, value: &RawValue, encoder: &ValueEncoder) -> Result<Value>;
}

struct TimestampRule;

impl EncodeRule for TimestampRule {
    fn matches(&self, value: &RawValue) -> bool {
        matches!(value, RawValue::Timestamp(_))
    }

    fn convert(&self, value: &RawValue, encoder: &ValueEncoder) -> Result<Value> {
        match value {
            RawValue::Timestamp(t) => Ok(Value::String(encoder.timestamps.encode(t)?)),
            other => Err(MdsError::Serialization(other.type_name().to_string())),
        }
    }
}

struct PathRule;

impl EncodeRule for PathRule {
    fn matches(&self, value: &RawValue) -> bool {
        matches!(value, RawValue::Path(_))
    }

    fn convert(&self, value: &RawValue, _encoder: &ValueEncoder) -> Result<Value> {
        match value {
            RawValue::Path(p) => Ok(Value::String(p.to_string_lossy().into_owned())),
            other => Err(MdsError::Serialization(other.type_name().to_string())),
        }
    }
}

struct GeometryRule;

impl EncodeRule for GeometryRule {
    fn matches(&self, value: &RawValue) -> bool {
        matches!(value, RawValue::Point(_) | RawValue::Polygon(_))
    }

    fn convert(&self, value: &RawValue, _encoder: &ValueEncoder) -> Result<Value> {
        match value {
            RawValue::Point(p) => Ok(p.to_feature()),
            RawValue::Polygon(p) => Ok(p.to_feature()),
            other => Err(MdsError::Serialization(other.type_name().to_string())),
        }
    }
}

struct TupleRule;

impl EncodeRule for TupleRule {
    fn matches(&self, value: &RawValue) -> bool {
        matches!(value, RawValue::Tuple(_))
    }

    fn convert(&self, value: &RawValue, encoder: &ValueEncoder) -> Result<Value> {
        match value {
            RawValue::Tuple(items) => items
                .iter()
                .map(|item| encoder.encode(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Err(MdsError::Serialization(other.type_name().to_string())),
        }
    }
}

struct UuidRule;

impl EncodeRule for UuidRule {
    fn matches(&self, value: &RawValue) -> bool {
        matches!(value, RawValue::Uuid(_))
    }

    fn convert(&self, value: &RawValue, _encoder: &ValueEncoder) -> Result<Value> {
        match value {
            RawValue::Uuid(u) => Ok(Value::String(u.hyphenated().to_string())),
            other => Err(MdsError::Serialization(other.type_name().to_string())),
        }
    }
}

struct VersionRule;

impl EncodeRule for VersionRule {
    fn matches(&self, value: &RawValue) -> bool {
        matches!(value, RawValue::Version(_))
    }

    fn convert(&self, value: &RawValue, _encoder: &ValueEncoder) -> Result<Value> {
        match value {
            RawValue::Version(v) => Ok(Value::String(v.to_string())),
            other => Err(MdsError::Serialization(other.type_name().to_string())),
        }
    }
}

/// Rule for a concrete type stored in [`RawValue::Custom`].
struct TypedRule<T, F> {
    convert: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> EncodeRule for TypedRule<T, F>
where
    T: Any + Send + Sync,
    F: Fn(&T, &ValueEncoder) -> Result<Value> + Send + Sync,
{
    fn matches(&self, value: &RawValue) -> bool {
        matches!(value, RawValue::Custom { value, .. } if value.is::<T>())
    }

    fn convert(&self, value: &RawValue, encoder: &ValueEncoder) -> Result<Value> {
        match value {
            RawValue::Custom { value, .. } => match value.downcast_ref::<T>() {
                Some(inner) => (self.convert)(inner, encoder),
                None => Err(MdsError::Serialization(std::any::type_name::<T>().to_string())),
            },
            other => Err(MdsError::Serialization(other.type_name().to_string())),
        }
    }
}

/// Encoder bound to one [`EncodingContext`], reused for every value in a
/// serialization pass.
#[derive(Clone)]
pub struct ValueEncoder {
    timestamps: TimestampCodec,
    rules: Vec<Arc<dyn EncodeRule>>,
}

impl ValueEncoder {
    pub fn new(context: EncodingContext) -> Self {
        let rules: Vec<Arc<dyn EncodeRule>> = vec![
            Arc::new(TimestampRule),
            Arc::new(PathRule),
            Arc::new(GeometryRule),
            Arc::new(TupleRule),
            Arc::new(UuidRule),
            Arc::new(VersionRule),
        ];
        Self {
            timestamps: TimestampCodec::from_context(context),
            rules,
        }
    }

    pub fn context(&self) -> &EncodingContext {
        self.timestamps.context()
    }

    /// Appends a rule; it is consulted after every rule already present.
    pub fn with_rule(mut self, rule: impl EncodeRule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Appends a rule for values of type `T` wrapped with [`RawValue::custom`].
    pub fn register<T, F>(self, convert: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &ValueEncoder) -> Result<Value> + Send + Sync + 'static,
    {
        self.with_rule(TypedRule::<T, F> {
            convert,
            _marker: PhantomData,
        })
    }

    pub fn encode(&self, value: &RawValue) -> Result<Value> {
        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(value)) {
            return rule.convert(value, self);
        }
        self.encode_generic(value)
    }

    fn encode_generic(&self, value: &RawValue) -> Result<Value> {
        match value {
            RawValue::Null => Ok(Value::Null),
            RawValue::Bool(b) => Ok(Value::Bool(*b)),
            RawValue::Number(n) => Ok(Value::Number(n.clone())),
            RawValue::String(s) => Ok(Value::String(s.clone())),
            RawValue::Array(items) => items
                .iter()
                .map(|item| self.encode(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            RawValue::Object(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, item) in entries {
                    map.insert(key.clone(), self.encode(item)?);
                }
                Ok(Value::Object(map))
            }
            other => Err(MdsError::Serialization(other.type_name().to_string())),
        }
    }

    pub fn to_string(&self, value: &RawValue) -> Result<String> {
        Ok(serde_json::to_string(&self.encode(value)?)?)
    }

    pub fn to_string_pretty(&self, value: &RawValue) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.encode(value)?)?)
    }
}

impl fmt::Debug for ValueEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueEncoder")
            .field("context", self.context())
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// Encodes one value with the built-in rules.
pub fn encode_value(value: &RawValue, context: &EncodingContext) -> Result<Value> {
    ValueEncoder::new(context.clone()).encode(value)
}
