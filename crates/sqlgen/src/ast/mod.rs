//! Database-agnostic expression AST
//!
//! Split into:
//! - `ops`: binary/unary operators and set kinds
//! - `scalar`: literal values
//! - `eq`: structural equality and hashing (multiset semantics for And/Or)
//! - `lambda`: lazily converted host lambda wrapper
//! - `wire`: JSON wire format

pub mod eq;
pub mod lambda;
pub mod ops;
pub mod scalar;
pub mod wire;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use uuid::Uuid;

pub use lambda::LambdaExpr;
pub use ops::{BinaryOp, SetKind, UnaryOp};
pub use scalar::{EnumValue, Scalar};

/// Payload of a `Value` node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueData {
    Scalar(Scalar),
    /// Ordered collection, rendered as a parenthesized list
    List(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub enum Expr {
    /// Constant. With `literal` set a scalar is inlined instead of bound.
    Value { value: ValueData, literal: bool },

    /// Logical property name, resolved against table metadata at compile time
    Property(String),

    Unary(UnaryOp, Box<Expr>),

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Named function; argument meaning is dialect-defined
    Function { name: String, args: Vec<Expr> },

    /// And/Or (unordered) or List/Concat (ordered)
    Set { kind: SetKind, items: Vec<Expr> },

    /// Host lambda converted on first use
    Lambda(LambdaExpr),

    /// Correlated `EXISTS` over the table referenced by a foreign key
    Foreign {
        property: String,
        condition: Box<Expr>,
    },

    /// Escape hatch resolved through the generic SQL registry
    Generic { key: String, arg: Box<Expr> },

    /// Verbatim SQL text
    Raw(String),
}

impl Expr {
    pub fn prop(name: impl Into<String>) -> Self {
        Expr::Property(name.into())
    }

    pub fn value(v: impl Into<Scalar>) -> Self {
        Expr::Value {
            value: ValueData::Scalar(v.into()),
            literal: false,
        }
    }

    /// A value rendered inline as SQL literal text.
    pub fn literal(v: impl Into<Scalar>) -> Self {
        Expr::Value {
            value: ValueData::Scalar(v.into()),
            literal: true,
        }
    }

    pub fn null() -> Self {
        Expr::value(Scalar::Null)
    }

    /// A collection of values, e.g. the right side of `IN`.
    pub fn values<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        Expr::Value {
            value: ValueData::List(items.into_iter().map(Expr::value).collect()),
            literal: false,
        }
    }

    /// A collection of arbitrary nodes rendered as a parenthesized list.
    pub fn value_list(items: Vec<Expr>) -> Self {
        Expr::Value {
            value: ValueData::List(items),
            literal: false,
        }
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    /// `COUNT(*)`
    pub fn count() -> Self {
        Expr::func("COUNT", vec![])
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    pub fn generic(key: impl Into<String>, arg: Expr) -> Self {
        Expr::Generic {
            key: key.into(),
            arg: Box::new(arg),
        }
    }

    pub fn foreign(property: impl Into<String>, condition: Expr) -> Self {
        Expr::Foreign {
            property: property.into(),
            condition: Box::new(condition),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary(op, Box::new(operand))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Build a set node, splicing children of the same kind when the kind
    /// flattens (And, Or, Concat).
    pub fn set(kind: SetKind, items: impl IntoIterator<Item = Expr>) -> Self {
        let mut flat = Vec::new();
        for item in items {
            match item {
                Expr::Set {
                    kind: child,
                    items: inner,
                } if child == kind && kind.flattens() => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Expr::Set { kind, items: flat }
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::set(SetKind::And, [self, other])
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::set(SetKind::Or, [self, other])
    }

    pub fn list(items: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Set {
            kind: SetKind::List,
            items: items.into_iter().collect(),
        }
    }

    pub fn concat(self, other: impl Into<Expr>) -> Self {
        Expr::set(SetKind::Concat, [self, other.into()])
    }

    pub fn equal(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::EQUAL, self, rhs.into())
    }

    pub fn not_equal(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::NOT_EQUAL, self, rhs.into())
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::GREATER_THAN, self, rhs.into())
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::GREATER_THAN_OR_EQUAL, self, rhs.into())
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::LESS_THAN, self, rhs.into())
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::LESS_THAN_OR_EQUAL, self, rhs.into())
    }

    pub fn starts_with(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::STARTS_WITH, self, rhs.into())
    }

    pub fn ends_with(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::ENDS_WITH, self, rhs.into())
    }

    pub fn contains(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::CONTAINS, self, rhs.into())
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::LIKE, self, pattern.into())
    }

    pub fn regexp_like(self, pattern: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::REGEXP_LIKE, self, pattern.into())
    }

    pub fn in_list(self, list: Expr) -> Self {
        Expr::binary(BinaryOp::IN, self, list)
    }

    pub fn in_values<I, T>(self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        self.in_list(Expr::values(values))
    }

    /// `true` for a `Value` holding SQL NULL.
    pub fn is_null_value(&self) -> bool {
        matches!(
            self,
            Expr::Value {
                value: ValueData::Scalar(Scalar::Null),
                ..
            }
        )
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Expr::Value {
                value: ValueData::Scalar(s),
                ..
            } => Some(s),
            _ => None,
        }
    }

    /// Negate a predicate, folding into the operator's NOT bit when possible.
    pub fn negate(self) -> Self {
        match self {
            Expr::Binary { op, left, right } if op.is_predicate() => Expr::Binary {
                op: op.opposite(),
                left,
                right,
            },
            Expr::Unary(UnaryOp::Not, inner) => *inner,
            other => Expr::unary(UnaryOp::Not, other),
        }
    }
}

macro_rules! impl_expr_from_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Expr {
                fn from(v: $t) -> Self {
                    Expr::value(v)
                }
            }
        )*
    };
}

impl_expr_from_scalar!(
    bool,
    i32,
    i64,
    u32,
    f64,
    &str,
    String,
    Uuid,
    NaiveDate,
    NaiveDateTime,
    DateTime<FixedOffset>,
    EnumValue,
    Scalar,
);

impl std::ops::BitAnd for Expr {
    type Output = Expr;

    fn bitand(self, rhs: Expr) -> Expr {
        self.and(rhs)
    }
}

impl std::ops::BitOr for Expr {
    type Output = Expr;

    fn bitor(self, rhs: Expr) -> Expr {
        self.or(rhs)
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        self.negate()
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Negate, self)
    }
}

macro_rules! impl_arith {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<Expr>> std::ops::$trait<T> for Expr {
            type Output = Expr;

            fn $method(self, rhs: T) -> Expr {
                Expr::binary($op, self, rhs.into())
            }
        }
    };
}

impl_arith!(Add, add, BinaryOp::ADD);
impl_arith!(Sub, sub, BinaryOp::SUBTRACT);
impl_arith!(Mul, mul, BinaryOp::MULTIPLY);
impl_arith!(Div, div, BinaryOp::DIVIDE);
impl_arith!(Rem, rem, BinaryOp::MODULO);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_flattens_nested_sets() {
        let a = Expr::prop("A").equal(1);
        let b = Expr::prop("B").equal(2);
        let c = Expr::prop("C").equal(3);
        let left = (a.clone() & b.clone()) & c.clone();
        let right = a & (b & c);
        match (&left, &right) {
            (Expr::Set { items: l, .. }, Expr::Set { items: r, .. }) => {
                assert_eq!(l.len(), 3);
                assert_eq!(r.len(), 3);
            }
            _ => panic!("expected sets"),
        }
        assert_eq!(left, right);
    }

    #[test]
    fn or_does_not_flatten_into_and() {
        let a = Expr::prop("A").equal(1);
        let b = Expr::prop("B").equal(2);
        let c = Expr::prop("C").equal(3);
        let expr = (a | b) & c;
        if let Expr::Set { kind, items } = expr {
            assert_eq!(kind, SetKind::And);
            assert_eq!(items.len(), 2);
        } else {
            panic!("expected And set");
        }
    }

    #[test]
    fn list_never_flattens() {
        let inner = Expr::list([Expr::value(1), Expr::value(2)]);
        let outer = Expr::set(SetKind::List, [inner, Expr::value(3)]);
        if let Expr::Set { items, .. } = outer {
            assert_eq!(items.len(), 2);
        } else {
            panic!("expected List set");
        }
    }

    #[test]
    fn negate_folds_into_not_bit() {
        let e = !Expr::prop("Age").gt(18);
        assert!(matches!(
            e,
            Expr::Binary { op, .. } if op == BinaryOp::LESS_THAN_OR_EQUAL
        ));
        let double = !!Expr::prop("Flag");
        assert_eq!(double, Expr::prop("Flag"));
    }

    #[test]
    fn arithmetic_operators_build_binary_nodes() {
        let e = Expr::prop("Price") * 2 + 1;
        assert!(matches!(e, Expr::Binary { op, .. } if op == BinaryOp::ADD));
    }
}
