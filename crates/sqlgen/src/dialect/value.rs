//! Conversion between host values and stored values.

use std::fmt::{self, Write};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::{BoolStorage, EnumStorage, GuidStorage, SqlDialect};
use crate::ast::{EnumValue, Scalar};
use crate::meta::DbType;

/// Host-side type a stored value is read back into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostType {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Guid,
    Date,
    DateTime,
    DateTimeTz,
    /// Enum with its known members
    Enum(Vec<EnumValue>),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("cannot convert {value} to {target}")]
    Incompatible { value: String, target: String },

    #[error("invalid {option} `{format}`")]
    Format { option: &'static str, format: String },
}

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Reject a strftime pattern chrono cannot parse.
pub fn check_format(option: &'static str, format: &str) -> Result<(), ValueError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ValueError::Format {
            option,
            format: format.to_string(),
        });
    }
    Ok(())
}

fn render(formatted: impl fmt::Display) -> Option<String> {
    let mut out = String::new();
    write!(out, "{formatted}").ok()?;
    Some(out)
}

// A pattern can parse yet still fail on a value, e.g. `%H` on a date.
fn format_date(dt: &NaiveDate, format: &str) -> String {
    render(dt.format(format)).unwrap_or_else(|| {
        log::warn!("date format `{format}` failed, using {DEFAULT_DATE_FORMAT}");
        dt.format(DEFAULT_DATE_FORMAT).to_string()
    })
}

fn format_datetime(dt: &NaiveDateTime, format: &str) -> String {
    render(dt.format(format)).unwrap_or_else(|| {
        log::warn!("datetime format `{format}` failed, using {DEFAULT_DATETIME_FORMAT}");
        dt.format(DEFAULT_DATETIME_FORMAT).to_string()
    })
}

fn incompatible(value: &Scalar, target: &HostType) -> ValueError {
    ValueError::Incompatible {
        value: format!("{value:?}"),
        target: format!("{target:?}"),
    }
}

fn yes_no(b: bool) -> Scalar {
    Scalar::Text(if b { "Y" } else { "N" }.to_string())
}

pub fn to_db_value<D: SqlDialect + ?Sized>(d: &D, value: &Scalar, column: Option<&DbType>) -> Scalar {
    let opts = d.options();
    match (value, column) {
        (Scalar::Bool(b), Some(DbType::Text(_))) => yes_no(*b),
        (Scalar::Bool(b), Some(DbType::Int32 | DbType::Int64)) => Scalar::Int(*b as i64),
        (Scalar::Bool(b), _) => match d.bool_storage() {
            BoolStorage::Native => Scalar::Bool(*b),
            BoolStorage::Integer => Scalar::Int(*b as i64),
            BoolStorage::YesNo => yes_no(*b),
        },

        (Scalar::Enum(e), Some(DbType::Text(_))) => Scalar::Text(e.name.clone()),
        (Scalar::Enum(e), Some(DbType::Int32 | DbType::Int64)) => Scalar::Int(e.value),
        (Scalar::Enum(e), _) => match opts.enum_storage {
            EnumStorage::Integer => Scalar::Int(e.value),
            EnumStorage::Name => Scalar::Text(e.name.clone()),
        },

        (Scalar::Guid(g), Some(DbType::Text(_))) => Scalar::Text(g.hyphenated().to_string()),
        (Scalar::Guid(g), Some(DbType::Bytes)) => Scalar::Bytes(g.as_bytes().to_vec()),
        (Scalar::Guid(g), _) => match d.guid_storage() {
            GuidStorage::Native => Scalar::Guid(*g),
            GuidStorage::Text => Scalar::Text(g.hyphenated().to_string()),
            GuidStorage::Blob => Scalar::Bytes(g.as_bytes().to_vec()),
        },

        (Scalar::Date(dt), Some(DbType::Text(_))) => {
            Scalar::Text(format_date(dt, &opts.date_format))
        }
        (Scalar::Date(dt), _) if d.temporal_as_text() => {
            Scalar::Text(format_date(dt, &opts.date_format))
        }
        (Scalar::DateTime(dt), Some(DbType::Text(_))) => {
            Scalar::Text(format_datetime(dt, &opts.datetime_format))
        }
        (Scalar::DateTime(dt), _) if d.temporal_as_text() => {
            Scalar::Text(format_datetime(dt, &opts.datetime_format))
        }
        (Scalar::DateTimeTz(dt), Some(DbType::Text(_))) => Scalar::Text(dt.to_rfc3339()),
        (Scalar::DateTimeTz(dt), _) if d.temporal_as_text() => Scalar::Text(dt.to_rfc3339()),
        (Scalar::DateTimeTz(dt), Some(DbType::DateTime)) => Scalar::DateTime(dt.naive_utc()),
        (Scalar::DateTimeTz(dt), _) if !d.supports_offsets() => Scalar::DateTime(dt.naive_utc()),

        (other, _) => other.clone(),
    }
}

fn parse_datetime(s: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, format)
        .or_else(|_| NaiveDateTime::parse_from_str(s, DEFAULT_DATETIME_FORMAT))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub fn from_db_value<D: SqlDialect + ?Sized>(
    d: &D,
    value: Scalar,
    target: &HostType,
) -> Result<Scalar, ValueError> {
    let opts = d.options();
    let converted = match (&value, target) {
        (Scalar::Null, _) => Some(Scalar::Null),

        (Scalar::Bool(_), HostType::Bool) => Some(value.clone()),
        (Scalar::Int(n), HostType::Bool) => Some(Scalar::Bool(*n != 0)),
        (Scalar::Text(s), HostType::Bool) => match s.trim().to_ascii_uppercase().as_str() {
            "Y" | "YES" | "1" | "TRUE" | "T" => Some(Scalar::Bool(true)),
            "N" | "NO" | "0" | "FALSE" | "F" => Some(Scalar::Bool(false)),
            _ => None,
        },

        (Scalar::Int(_), HostType::Int) => Some(value.clone()),
        (Scalar::Bool(b), HostType::Int) => Some(Scalar::Int(*b as i64)),
        (Scalar::Float(f), HostType::Int) if f.fract() == 0.0 => Some(Scalar::Int(*f as i64)),
        (Scalar::Text(s), HostType::Int) => s.trim().parse().ok().map(Scalar::Int),

        (Scalar::Float(_), HostType::Float) => Some(value.clone()),
        (Scalar::Int(n), HostType::Float) => Some(Scalar::Float(*n as f64)),
        (Scalar::Text(s), HostType::Float) => s.trim().parse().ok().map(Scalar::Float),

        (Scalar::Text(_), HostType::Text) => Some(value.clone()),
        (Scalar::Guid(g), HostType::Text) => Some(Scalar::Text(g.to_string())),
        (Scalar::Int(n), HostType::Text) => Some(Scalar::Text(n.to_string())),

        (Scalar::Bytes(_), HostType::Bytes) => Some(value.clone()),

        (Scalar::Guid(_), HostType::Guid) => Some(value.clone()),
        (Scalar::Text(s), HostType::Guid) => Uuid::parse_str(s.trim()).ok().map(Scalar::Guid),
        (Scalar::Bytes(b), HostType::Guid) => Uuid::from_slice(b).ok().map(Scalar::Guid),

        (Scalar::Date(_), HostType::Date) => Some(value.clone()),
        (Scalar::DateTime(dt), HostType::Date) => Some(Scalar::Date(dt.date())),
        (Scalar::Text(s), HostType::Date) => NaiveDate::parse_from_str(s, &opts.date_format)
            .ok()
            .or_else(|| parse_datetime(s, &opts.datetime_format).map(|dt| dt.date()))
            .map(Scalar::Date),

        (Scalar::DateTime(_), HostType::DateTime) => Some(value.clone()),
        (Scalar::Date(dt), HostType::DateTime) => dt.and_hms_opt(0, 0, 0).map(Scalar::DateTime),
        (Scalar::DateTimeTz(dt), HostType::DateTime) => Some(Scalar::DateTime(dt.naive_utc())),
        (Scalar::Text(s), HostType::DateTime) => {
            parse_datetime(s, &opts.datetime_format).map(Scalar::DateTime)
        }

        (Scalar::DateTimeTz(_), HostType::DateTimeTz) => Some(value.clone()),
        // Offset-less storage holds UTC
        (Scalar::DateTime(dt), HostType::DateTimeTz) => {
            Some(Scalar::DateTimeTz(Utc.from_utc_datetime(dt).fixed_offset()))
        }
        (Scalar::Text(s), HostType::DateTimeTz) => DateTime::<FixedOffset>::parse_from_rfc3339(s)
            .ok()
            .map(Scalar::DateTimeTz)
            .or_else(|| {
                parse_datetime(s, &opts.datetime_format)
                    .map(|dt| Scalar::DateTimeTz(Utc.from_utc_datetime(&dt).fixed_offset()))
            }),

        (Scalar::Enum(_), HostType::Enum(_)) => Some(value.clone()),
        (Scalar::Int(n), HostType::Enum(members)) => members
            .iter()
            .find(|m| m.value == *n)
            .cloned()
            .map(Scalar::Enum),
        (Scalar::Text(s), HostType::Enum(members)) => members
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(s.trim()))
            .cloned()
            .map(Scalar::Enum),

        _ => None,
    };
    converted.ok_or_else(|| incompatible(&value, target))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

pub fn literal_sql<D: SqlDialect + ?Sized>(d: &D, value: &Scalar) -> String {
    let opts = d.options();
    match value {
        Scalar::Null => "NULL".into(),
        Scalar::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).into(),
        Scalar::Int(n) => n.to_string(),
        Scalar::Float(f) if f.is_finite() => format!("{f:?}"),
        Scalar::Float(_) => "NULL".into(),
        Scalar::Text(s) => d.string_literal(s),
        Scalar::Bytes(b) => format!("X'{}'", hex(b)),
        Scalar::Guid(g) => d.string_literal(&g.hyphenated().to_string()),
        Scalar::Date(dt) => d.string_literal(&format_date(dt, &opts.date_format)),
        Scalar::DateTime(dt) => d.string_literal(&format_datetime(dt, &opts.datetime_format)),
        Scalar::DateTimeTz(dt) => d.string_literal(&dt.to_rfc3339()),
        Scalar::Enum(e) => e.value.to_string(),
    }
}
