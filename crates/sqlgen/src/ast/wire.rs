//! JSON wire format
//!
//! Every node is an object with one discriminator key:
//!
//! | node | shape |
//! |---|---|
//! | Value | `{"val": scalar or [nodes], "Lit": true?}` |
//! | Property | `{"prop": name}` |
//! | Unary | `{"un": op, "Operand": node}` |
//! | Binary | `{"bin": op, "L": node, "R": node}` |
//! | Function | `{"fn": name, "Args": [nodes]}` |
//! | Set | `{"and" / "or" / "list" / "concat": [nodes]}` |
//! | Foreign | `{"fk": property, "Cond": node}` |
//! | Generic | `{"gen": key, "Arg": node}` |
//! | Raw | `{"raw": sql}` |
//!
//! Scalars without a JSON counterpart are tagged objects (`$guid`, `$date`,
//! `$dt`, `$dto`, `$bytes`, `$enum`, `$f`). Lambdas are written as their
//! converted node. Decoding an unknown or malformed node yields `None`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value, json};
use uuid::Uuid;

use super::{BinaryOp, EnumValue, Expr, Scalar, SetKind, UnaryOp, ValueData};
use crate::convert::ConvertError;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const SET_KINDS: [SetKind; 4] = [SetKind::And, SetKind::Or, SetKind::List, SetKind::Concat];

fn tagged(tag: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(tag.to_string(), value);
    Value::Object(map)
}

pub fn scalar_to_wire(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Int(n) => Value::from(*n),
        Scalar::Float(f) => match Number::from_f64(*f) {
            Some(n) => Value::Number(n),
            None => {
                let text = if f.is_nan() {
                    "NaN"
                } else if f.is_sign_positive() {
                    "Infinity"
                } else {
                    "-Infinity"
                };
                tagged("$f", Value::from(text))
            }
        },
        Scalar::Text(s) => Value::from(s.as_str()),
        Scalar::Bytes(b) => tagged("$bytes", Value::from(STANDARD.encode(b))),
        Scalar::Guid(g) => tagged("$guid", Value::from(g.to_string())),
        Scalar::Date(d) => tagged("$date", Value::from(d.format(DATE_FORMAT).to_string())),
        Scalar::DateTime(dt) => tagged("$dt", Value::from(dt.format(DATETIME_FORMAT).to_string())),
        Scalar::DateTimeTz(dt) => tagged("$dto", Value::from(dt.to_rfc3339())),
        Scalar::Enum(e) => json!({ "$enum": e.name, "Value": e.value }),
    }
}

pub fn scalar_from_wire(value: &Value) -> Option<Scalar> {
    match value {
        Value::Null => Some(Scalar::Null),
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Scalar::Int(i)),
            None => n.as_f64().map(Scalar::Float),
        },
        Value::String(s) => Some(Scalar::Text(s.clone())),
        Value::Array(_) => None,
        Value::Object(map) => {
            let text = |key: &str| map.get(key).and_then(Value::as_str);
            if let Some(s) = text("$guid") {
                Uuid::parse_str(s).ok().map(Scalar::Guid)
            } else if let Some(s) = text("$date") {
                NaiveDate::parse_from_str(s, DATE_FORMAT).ok().map(Scalar::Date)
            } else if let Some(s) = text("$dt") {
                NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                    .ok()
                    .map(Scalar::DateTime)
            } else if let Some(s) = text("$dto") {
                DateTime::parse_from_rfc3339(s).ok().map(Scalar::DateTimeTz)
            } else if let Some(s) = text("$bytes") {
                STANDARD.decode(s).ok().map(Scalar::Bytes)
            } else if let Some(name) = text("$enum") {
                let value = map.get("Value")?.as_i64()?;
                Some(Scalar::Enum(EnumValue::new(name, value)))
            } else {
                match text("$f")? {
                    "NaN" => Some(Scalar::Float(f64::NAN)),
                    "Infinity" => Some(Scalar::Float(f64::INFINITY)),
                    "-Infinity" => Some(Scalar::Float(f64::NEG_INFINITY)),
                    _ => None,
                }
            }
        }
    }
}

fn encode_all(items: &[Expr]) -> Result<Value, ConvertError> {
    items
        .iter()
        .map(Expr::to_wire)
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn decode_all(value: &Value) -> Option<Vec<Expr>> {
    value.as_array()?.iter().map(Expr::from_wire).collect()
}

fn decode_box(value: Option<&Value>) -> Option<Box<Expr>> {
    Expr::from_wire(value?).map(Box::new)
}

impl Expr {
    /// Encode as a wire object. Fails only for a lambda whose conversion
    /// failed.
    pub fn to_wire(&self) -> Result<Value, ConvertError> {
        Ok(match self {
            Expr::Value { value, literal } => {
                let mut map = Map::new();
                let encoded = match value {
                    ValueData::Scalar(s) => scalar_to_wire(s),
                    ValueData::List(items) => encode_all(items)?,
                };
                map.insert("val".into(), encoded);
                if *literal {
                    map.insert("Lit".into(), Value::Bool(true));
                }
                Value::Object(map)
            }
            Expr::Property(name) => json!({ "prop": name }),
            Expr::Unary(op, operand) => json!({ "un": op.name(), "Operand": operand.to_wire()? }),
            Expr::Binary { op, left, right } => json!({
                "bin": op.name(),
                "L": left.to_wire()?,
                "R": right.to_wire()?,
            }),
            Expr::Function { name, args } => json!({ "fn": name, "Args": encode_all(args)? }),
            Expr::Set { kind, items } => tagged(kind.tag(), encode_all(items)?),
            Expr::Lambda(lambda) => lambda.converted()?.to_wire()?,
            Expr::Foreign {
                property,
                condition,
            } => json!({ "fk": property, "Cond": condition.to_wire()? }),
            Expr::Generic { key, arg } => json!({ "gen": key, "Arg": arg.to_wire()? }),
            Expr::Raw(sql) => json!({ "raw": sql }),
        })
    }

    /// Decode a wire object. Unknown discriminators yield `None`.
    pub fn from_wire(value: &Value) -> Option<Expr> {
        let obj = value.as_object()?;
        let text = |key: &str| obj.get(key).and_then(Value::as_str);

        if let Some(v) = obj.get("val") {
            let literal = obj.get("Lit").and_then(Value::as_bool).unwrap_or(false);
            let value = match v {
                Value::Array(_) => ValueData::List(decode_all(v)?),
                other => ValueData::Scalar(scalar_from_wire(other)?),
            };
            return Some(Expr::Value { value, literal });
        }
        if obj.contains_key("prop") {
            return Some(Expr::Property(text("prop")?.to_string()));
        }
        if obj.contains_key("un") {
            let op = UnaryOp::from_name(text("un")?)?;
            return Some(Expr::Unary(op, decode_box(obj.get("Operand"))?));
        }
        if obj.contains_key("bin") {
            return Some(Expr::Binary {
                op: BinaryOp::from_name(text("bin")?)?,
                left: decode_box(obj.get("L"))?,
                right: decode_box(obj.get("R"))?,
            });
        }
        if obj.contains_key("fn") {
            return Some(Expr::Function {
                name: text("fn")?.to_string(),
                args: decode_all(obj.get("Args")?)?,
            });
        }
        for kind in SET_KINDS {
            if let Some(items) = obj.get(kind.tag()) {
                // Stored shape is kept as is; it was flattened when built.
                return Some(Expr::Set {
                    kind,
                    items: decode_all(items)?,
                });
            }
        }
        if obj.contains_key("fk") {
            return Some(Expr::Foreign {
                property: text("fk")?.to_string(),
                condition: decode_box(obj.get("Cond"))?,
            });
        }
        if obj.contains_key("gen") {
            return Some(Expr::Generic {
                key: text("gen")?.to_string(),
                arg: decode_box(obj.get("Arg"))?,
            });
        }
        if obj.contains_key("raw") {
            return Some(Expr::Raw(text("raw")?.to_string()));
        }
        log::debug!("unknown expression node: {value}");
        None
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Expr::from_wire(&value)
            .ok_or_else(|| serde::de::Error::custom("unrecognized expression node"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{HostBinaryOp, HostExpr, HostLambda};
    use chrono::{FixedOffset, TimeZone};

    fn round_trip(e: &Expr) -> Expr {
        let text = serde_json::to_string(e).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn nodes_round_trip_with_equal_hash() {
        let nodes = vec![
            Expr::prop("Age").gt(18) & Expr::prop("Name").starts_with("A%B"),
            Expr::prop("Id").in_values([1, 2, 3]),
            !Expr::prop("Tag").in_values(["x", "y"]),
            Expr::func("UPPER", vec![Expr::prop("Name")]).concat("!"),
            Expr::list([Expr::value(1), Expr::list([Expr::value(2)])]),
            Expr::foreign("DeptId", Expr::prop("Name").equal("R&D")),
            Expr::generic("soundex", Expr::prop("Name")),
            Expr::raw("1 = 1") | Expr::literal(true).equal(Expr::null()),
            -(Expr::prop("Delta") % 2),
        ];
        for node in nodes {
            let back = round_trip(&node);
            assert_eq!(back, node);
            assert_eq!(back.stable_hash(), node.stable_hash());
        }
    }

    #[test]
    fn typed_scalars_round_trip() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let scalars = vec![
            Scalar::Null,
            Scalar::Float(2.5),
            Scalar::Float(3.0),
            Scalar::Float(f64::NAN),
            Scalar::Float(f64::NEG_INFINITY),
            Scalar::Bytes(vec![0, 255, 16]),
            Scalar::Guid(Uuid::from_u128(0x1234)),
            Scalar::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
            Scalar::DateTime(
                NaiveDate::from_ymd_opt(2024, 2, 29)
                    .unwrap()
                    .and_hms_milli_opt(23, 59, 1, 250)
                    .unwrap(),
            ),
            Scalar::DateTimeTz(tz.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()),
            Scalar::Enum(EnumValue::new("Active", 1)),
        ];
        for s in scalars {
            let node = Expr::value(s.clone());
            assert_eq!(round_trip(&node), node, "{s:?}");
        }
    }

    #[test]
    fn wire_shapes() {
        let e = Expr::prop("Age").ge(21);
        assert_eq!(
            e.to_wire().unwrap(),
            json!({
                "bin": "GreaterThanOrEqual",
                "L": { "prop": "Age" },
                "R": { "val": 21 },
            })
        );
        assert_eq!(
            Expr::literal("x").to_wire().unwrap(),
            json!({ "val": "x", "Lit": true })
        );
    }

    #[test]
    fn unknown_discriminator_is_none() {
        assert_eq!(Expr::from_wire(&json!({ "mystery": 1 })), None);
        assert_eq!(Expr::from_wire(&json!({ "bin": "Bogus", "L": {}, "R": {} })), None);
        assert_eq!(Expr::from_wire(&json!([1, 2])), None);
        assert!(serde_json::from_str::<Expr>(r#"{"nope": true}"#).is_err());
    }

    #[test]
    fn lambda_is_written_as_its_conversion() {
        let lambda = Expr::lambda(HostLambda::new(
            "u",
            HostExpr::param("u")
                .member("Age")
                .binop(HostBinaryOp::GreaterThan, HostExpr::constant(18)),
        ));
        let back = round_trip(&lambda);
        assert!(matches!(back, Expr::Binary { .. }));
        assert_eq!(back, lambda);
    }
}
