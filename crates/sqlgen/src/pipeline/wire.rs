//! JSON wire format for pipelines
//!
//! A segment is an object whose discriminator key holds its source segment
//! (or, for `t`, the entity name):
//!
//! ```text
//! {"sec": {"o": {"w": {"t": "User"}, "Where": {..}},
//!          "OrderBys": [{"Expr": {..}, "Asc": true}]},
//!  "Skip": 10, "Take": 20}
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

use super::{OrderItem, Segment, SelectItem, SetItem};
use crate::ast::Expr;
use crate::convert::ConvertError;

fn encode_exprs(items: &[Expr]) -> Result<Value, ConvertError> {
    items
        .iter()
        .map(Expr::to_wire)
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

impl Segment {
    pub fn to_wire(&self) -> Result<Value, ConvertError> {
        let mut map = Map::new();
        match self {
            Segment::Table { entity } => {
                map.insert("t".into(), Value::from(entity.as_str()));
            }
            Segment::Where { source, condition } => {
                map.insert("w".into(), source.to_wire()?);
                map.insert("Where".into(), condition.to_wire()?);
            }
            Segment::GroupBy { source, keys } => {
                map.insert("g".into(), source.to_wire()?);
                map.insert("GroupBys".into(), encode_exprs(keys)?);
            }
            Segment::Having { source, condition } => {
                map.insert("h".into(), source.to_wire()?);
                map.insert("Having".into(), condition.to_wire()?);
            }
            Segment::OrderBy { source, orders } => {
                let orders = orders
                    .iter()
                    .map(|o| Ok(json!({ "Expr": o.expr.to_wire()?, "Asc": o.asc })))
                    .collect::<Result<Vec<_>, ConvertError>>()?;
                map.insert("o".into(), source.to_wire()?);
                map.insert("OrderBys".into(), Value::Array(orders));
            }
            Segment::Section { source, skip, take } => {
                map.insert("sec".into(), source.to_wire()?);
                map.insert("Skip".into(), Value::from(*skip));
                if let Some(take) = take {
                    map.insert("Take".into(), Value::from(*take));
                }
            }
            Segment::Select { source, items } => {
                let items = items
                    .iter()
                    .map(|item| {
                        let mut entry = Map::new();
                        if let Some(name) = &item.name {
                            entry.insert("Name".into(), Value::from(name.as_str()));
                        }
                        entry.insert("Expr".into(), item.expr.to_wire()?);
                        Ok(Value::Object(entry))
                    })
                    .collect::<Result<Vec<_>, ConvertError>>()?;
                map.insert("s".into(), source.to_wire()?);
                map.insert("Select".into(), Value::Array(items));
            }
            Segment::Update { source, sets } => {
                let sets = sets
                    .iter()
                    .map(|s| Ok(json!({ "Prop": s.property, "Value": s.value.to_wire()? })))
                    .collect::<Result<Vec<_>, ConvertError>>()?;
                map.insert("u".into(), source.to_wire()?);
                map.insert("Sets".into(), Value::Array(sets));
            }
            Segment::Delete { source } => {
                map.insert("d".into(), source.to_wire()?);
            }
        }
        Ok(Value::Object(map))
    }

    /// Decode a wire object. Unknown discriminators yield `None`.
    pub fn from_wire(value: &Value) -> Option<Segment> {
        let obj = value.as_object()?;
        let source = |tag: &str| -> Option<Box<Segment>> {
            Segment::from_wire(obj.get(tag)?).map(Box::new)
        };
        let expr = |key: &str| Expr::from_wire(obj.get(key)?);

        if let Some(entity) = obj.get("t") {
            return Some(Segment::table(entity.as_str()?));
        }
        if obj.contains_key("w") {
            return Some(Segment::Where {
                source: source("w")?,
                condition: expr("Where")?,
            });
        }
        if obj.contains_key("g") {
            let keys = obj
                .get("GroupBys")?
                .as_array()?
                .iter()
                .map(Expr::from_wire)
                .collect::<Option<Vec<_>>>()?;
            return Some(Segment::GroupBy {
                source: source("g")?,
                keys,
            });
        }
        if obj.contains_key("h") {
            return Some(Segment::Having {
                source: source("h")?,
                condition: expr("Having")?,
            });
        }
        if obj.contains_key("o") {
            let orders = obj
                .get("OrderBys")?
                .as_array()?
                .iter()
                .map(|o| {
                    Some(OrderItem {
                        expr: Expr::from_wire(o.get("Expr")?)?,
                        asc: o.get("Asc").and_then(Value::as_bool).unwrap_or(true),
                    })
                })
                .collect::<Option<Vec<_>>>()?;
            return Some(Segment::OrderBy {
                source: source("o")?,
                orders,
            });
        }
        if obj.contains_key("sec") {
            return Some(Segment::Section {
                source: source("sec")?,
                skip: obj.get("Skip").and_then(Value::as_u64).unwrap_or(0),
                take: obj.get("Take").and_then(Value::as_u64),
            });
        }
        if obj.contains_key("s") {
            let items = obj
                .get("Select")?
                .as_array()?
                .iter()
                .map(|item| {
                    Some(SelectItem {
                        name: item.get("Name").and_then(Value::as_str).map(str::to_string),
                        expr: Expr::from_wire(item.get("Expr")?)?,
                    })
                })
                .collect::<Option<Vec<_>>>()?;
            return Some(Segment::Select {
                source: source("s")?,
                items,
            });
        }
        if obj.contains_key("u") {
            let sets = obj
                .get("Sets")?
                .as_array()?
                .iter()
                .map(|s| {
                    Some(SetItem {
                        property: s.get("Prop")?.as_str()?.to_string(),
                        value: Expr::from_wire(s.get("Value")?)?,
                    })
                })
                .collect::<Option<Vec<_>>>()?;
            return Some(Segment::Update {
                source: source("u")?,
                sets,
            });
        }
        if obj.contains_key("d") {
            return Some(Segment::Delete {
                source: source("d")?,
            });
        }
        log::debug!("unknown pipeline segment: {value}");
        None
    }
}

impl Serialize for Segment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Segment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Segment::from_wire(&value)
            .ok_or_else(|| serde::de::Error::custom("unrecognized pipeline segment"))
    }
}
