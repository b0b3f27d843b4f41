//! Host expression tree - what the converter consumes
//!
//! Mirrors a typed lambda expression tree: parameters, captured constants,
//! member access, instance/static calls, operators, anonymous objects and
//! nested lambdas. Built by hand or by [`crate::convert::parse`].

use indexmap::IndexMap;

use crate::ast::{Scalar, UnaryOp};

/// A captured host value.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Scalar(Scalar),
    List(Vec<HostValue>),
    /// Object with named fields, e.g. a captured settings struct
    Object(IndexMap<String, HostValue>),
}

impl HostValue {
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, HostValue)>,
        K: Into<String>,
    {
        HostValue::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        HostValue::List(
            items
                .into_iter()
                .map(|v| HostValue::Scalar(v.into()))
                .collect(),
        )
    }

    /// Type name used for handler dispatch.
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Scalar(s) => s.type_name(),
            HostValue::List(_) => "List",
            HostValue::Object(_) => "Object",
        }
    }

    /// Read a field or a well-known property of a constant.
    pub fn member(&self, name: &str) -> Option<HostValue> {
        match (self, name) {
            (HostValue::Object(fields), _) => fields.get(name).cloned(),
            (HostValue::Scalar(Scalar::Text(s)), "Length") => {
                Some(HostValue::Scalar(Scalar::Int(s.chars().count() as i64)))
            }
            (HostValue::List(items), "Count" | "Length") => {
                Some(HostValue::Scalar(Scalar::Int(items.len() as i64)))
            }
            _ => None,
        }
    }
}

macro_rules! impl_host_value_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for HostValue {
                fn from(v: $t) -> Self {
                    HostValue::Scalar(v.into())
                }
            }
        )*
    };
}

impl_host_value_from!(
    bool,
    i32,
    i64,
    u32,
    f64,
    &str,
    String,
    Vec<u8>,
    uuid::Uuid,
    chrono::NaiveDate,
    chrono::NaiveDateTime,
    chrono::DateTime<chrono::FixedOffset>,
    crate::ast::EnumValue,
    Scalar,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostBinaryOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    AndAlso,
    OrElse,
    Coalesce,
}

impl HostBinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            HostBinaryOp::Equal => "==",
            HostBinaryOp::NotEqual => "!=",
            HostBinaryOp::LessThan => "<",
            HostBinaryOp::LessThanOrEqual => "<=",
            HostBinaryOp::GreaterThan => ">",
            HostBinaryOp::GreaterThanOrEqual => ">=",
            HostBinaryOp::Add => "+",
            HostBinaryOp::Subtract => "-",
            HostBinaryOp::Multiply => "*",
            HostBinaryOp::Divide => "/",
            HostBinaryOp::Modulo => "%",
            HostBinaryOp::AndAlso => "&&",
            HostBinaryOp::OrElse => "||",
            HostBinaryOp::Coalesce => "??",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            HostBinaryOp::Equal
                | HostBinaryOp::NotEqual
                | HostBinaryOp::LessThan
                | HostBinaryOp::LessThanOrEqual
                | HostBinaryOp::GreaterThan
                | HostBinaryOp::GreaterThanOrEqual
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostExpr {
    /// Reference to a lambda parameter: `u`
    Parameter(String),

    /// Captured or literal constant
    Constant(HostValue),

    /// Query root: a named sequence of entities (`users`)
    Source { name: String, entity: String },

    /// Instance member: `u.Name`
    Member {
        target: Box<HostExpr>,
        member: String,
    },

    /// Static member: `DateTime.Now`
    StaticMember { type_name: String, member: String },

    /// Instance call: `u.Name.StartsWith("A")`
    Call {
        target: Box<HostExpr>,
        method: String,
        args: Vec<HostExpr>,
    },

    /// Static call: `Math.Abs(u.Delta)`
    StaticCall {
        type_name: String,
        method: String,
        args: Vec<HostExpr>,
    },

    Binary(HostBinaryOp, Box<HostExpr>, Box<HostExpr>),

    Unary(UnaryOp, Box<HostExpr>),

    /// Anonymous object: `new { u.Name, Total = g.Count() }`
    New(Vec<(String, HostExpr)>),

    /// Array construction: `[1, 2, 3]`
    Array(Vec<HostExpr>),

    /// Nested lambda, e.g. the selector of `g.Sum(u => u.Salary)`
    Lambda(HostLambda),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostLambda {
    pub params: Vec<String>,
    pub body: Box<HostExpr>,
}

impl HostLambda {
    pub fn new(param: impl Into<String>, body: HostExpr) -> Self {
        Self {
            params: vec![param.into()],
            body: Box::new(body),
        }
    }

    /// The first parameter, which is the query's root entity.
    pub fn root(&self) -> Option<&str> {
        self.params.first().map(String::as_str)
    }
}

impl HostExpr {
    pub fn param(name: impl Into<String>) -> Self {
        HostExpr::Parameter(name.into())
    }

    pub fn constant(v: impl Into<HostValue>) -> Self {
        HostExpr::Constant(v.into())
    }

    pub fn member(self, name: impl Into<String>) -> Self {
        HostExpr::Member {
            target: Box::new(self),
            member: name.into(),
        }
    }

    pub fn call(self, method: impl Into<String>, args: Vec<HostExpr>) -> Self {
        HostExpr::Call {
            target: Box::new(self),
            method: method.into(),
            args,
        }
    }

    pub fn static_call(
        type_name: impl Into<String>,
        method: impl Into<String>,
        args: Vec<HostExpr>,
    ) -> Self {
        HostExpr::StaticCall {
            type_name: type_name.into(),
            method: method.into(),
            args,
        }
    }

    pub fn binop(self, op: HostBinaryOp, rhs: HostExpr) -> Self {
        HostExpr::Binary(op, Box::new(self), Box::new(rhs))
    }

    /// Statically known type of this node, when there is one.
    pub fn static_type(&self) -> Option<&str> {
        match self {
            HostExpr::Constant(v) => Some(v.type_name()),
            HostExpr::Array(_) => Some("List"),
            HostExpr::Source { entity, .. } => Some(entity),
            _ => None,
        }
    }
}

/// Normalize keyword aliases to their framework type names.
pub fn normalize_type(name: &str) -> &str {
    match name {
        "string" => "String",
        "int" => "Int32",
        "long" => "Int64",
        "double" => "Double",
        "bool" => "Boolean",
        "object" => "Object",
        "decimal" => "Decimal",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_members() {
        let v = HostValue::object([("MinAge", HostValue::from(18))]);
        assert_eq!(v.member("MinAge"), Some(HostValue::from(18)));
        assert_eq!(v.member("Missing"), None);
        assert_eq!(
            HostValue::from("héllo").member("Length"),
            Some(HostValue::from(5))
        );
        assert_eq!(
            HostValue::list([1, 2, 3]).member("Count"),
            Some(HostValue::from(3))
        );
    }

    #[test]
    fn static_types() {
        assert_eq!(HostExpr::constant("x").static_type(), Some("String"));
        assert_eq!(HostExpr::Array(vec![]).static_type(), Some("List"));
        assert_eq!(HostExpr::param("u").static_type(), None);
    }
}
