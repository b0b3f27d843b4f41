//! Scalar values carried by `Value` nodes and bound parameters.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use uuid::Uuid;

/// An enum member as seen by the host: its name and numeric value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub name: String,
    pub value: i64,
}

impl EnumValue {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A single value. Floats compare and hash by bit pattern so that equality
/// stays reflexive and consistent with `Hash`.
#[derive(Debug, Clone)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Guid(Uuid),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<FixedOffset>),
    Enum(EnumValue),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(n) => Some(*n),
            Scalar::Enum(e) => Some(e.value),
            _ => None,
        }
    }

    /// Short type name used for handler dispatch and diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "Null",
            Scalar::Bool(_) => "Boolean",
            Scalar::Int(_) => "Int64",
            Scalar::Float(_) => "Double",
            Scalar::Text(_) => "String",
            Scalar::Bytes(_) => "Bytes",
            Scalar::Guid(_) => "Guid",
            Scalar::Date(_) => "DateOnly",
            Scalar::DateTime(_) => "DateTime",
            Scalar::DateTimeTz(_) => "DateTimeOffset",
            Scalar::Enum(_) => "Enum",
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Int(a), Scalar::Int(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a.to_bits() == b.to_bits(),
            (Scalar::Text(a), Scalar::Text(b)) => a == b,
            (Scalar::Bytes(a), Scalar::Bytes(b)) => a == b,
            (Scalar::Guid(a), Scalar::Guid(b)) => a == b,
            (Scalar::Date(a), Scalar::Date(b)) => a == b,
            (Scalar::DateTime(a), Scalar::DateTime(b)) => a == b,
            // Same instant is not enough: the offset is part of the value.
            (Scalar::DateTimeTz(a), Scalar::DateTimeTz(b)) => {
                a.naive_utc() == b.naive_utc() && a.offset() == b.offset()
            }
            (Scalar::Enum(a), Scalar::Enum(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Scalar::Null => {}
            Scalar::Bool(b) => b.hash(state),
            Scalar::Int(n) => n.hash(state),
            Scalar::Float(f) => f.to_bits().hash(state),
            Scalar::Text(s) => s.hash(state),
            Scalar::Bytes(b) => b.hash(state),
            Scalar::Guid(g) => g.hash(state),
            Scalar::Date(d) => d.hash(state),
            Scalar::DateTime(dt) => dt.hash(state),
            Scalar::DateTimeTz(dt) => {
                dt.naive_utc().hash(state);
                dt.offset().local_minus_utc().hash(state);
            }
            Scalar::Enum(e) => e.hash(state),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<Vec<u8>> for Scalar {
    fn from(v: Vec<u8>) -> Self {
        Scalar::Bytes(v)
    }
}

impl From<Uuid> for Scalar {
    fn from(v: Uuid) -> Self {
        Scalar::Guid(v)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(v: NaiveDate) -> Self {
        Scalar::Date(v)
    }
}

impl From<NaiveDateTime> for Scalar {
    fn from(v: NaiveDateTime) -> Self {
        Scalar::DateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for Scalar {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Scalar::DateTimeTz(v)
    }
}

impl From<EnumValue> for Scalar {
    fn from(v: EnumValue) -> Self {
        Scalar::Enum(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map_or(Scalar::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(s: &Scalar) -> u64 {
        let mut h = DefaultHasher::new();
        s.hash(&mut h);
        h.finish()
    }

    #[test]
    fn float_equality_is_bitwise() {
        assert_eq!(Scalar::Float(f64::NAN), Scalar::Float(f64::NAN));
        assert_ne!(Scalar::Float(0.0), Scalar::Float(-0.0));
        assert_eq!(hash_of(&Scalar::Float(1.5)), hash_of(&Scalar::Float(1.5)));
    }

    #[test]
    fn offset_is_part_of_the_value() {
        let a = DateTime::parse_from_rfc3339("2024-01-01T10:00:00+02:00").unwrap();
        let b = DateTime::parse_from_rfc3339("2024-01-01T08:00:00+00:00").unwrap();
        assert_ne!(Scalar::DateTimeTz(a), Scalar::DateTimeTz(b));
        assert_eq!(Scalar::DateTimeTz(a), Scalar::DateTimeTz(a));
    }

    #[test]
    fn option_maps_to_null() {
        assert_eq!(Scalar::from(None::<i32>), Scalar::Null);
        assert_eq!(Scalar::from(Some("x")), Scalar::Text("x".into()));
    }
}
