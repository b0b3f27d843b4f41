//! Operator types shared by the AST and the host expression tree.

use std::fmt;

/// Binary operator with the negation encoded as a reserved high bit.
///
/// `op.positive()` strips the bit, `op.opposite()` toggles it. The base
/// operators are stored in the low bits, so `op.bits() & !NOT_BIT` is always
/// one of the base constants.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BinaryOp(u32);

const BASE_NAMES: [&str; 15] = [
    "Equal",
    "GreaterThan",
    "LessThan",
    "StartsWith",
    "EndsWith",
    "Contains",
    "Like",
    "In",
    "RegexpLike",
    "Add",
    "Subtract",
    "Multiply",
    "Divide",
    "Concat",
    "Modulo",
];

impl BinaryOp {
    /// The reserved negation bit.
    pub const NOT_BIT: u32 = 1 << 31;

    pub const EQUAL: BinaryOp = BinaryOp(0);
    pub const GREATER_THAN: BinaryOp = BinaryOp(1);
    pub const LESS_THAN: BinaryOp = BinaryOp(2);
    pub const STARTS_WITH: BinaryOp = BinaryOp(3);
    pub const ENDS_WITH: BinaryOp = BinaryOp(4);
    pub const CONTAINS: BinaryOp = BinaryOp(5);
    pub const LIKE: BinaryOp = BinaryOp(6);
    pub const IN: BinaryOp = BinaryOp(7);
    pub const REGEXP_LIKE: BinaryOp = BinaryOp(8);
    pub const ADD: BinaryOp = BinaryOp(9);
    pub const SUBTRACT: BinaryOp = BinaryOp(10);
    pub const MULTIPLY: BinaryOp = BinaryOp(11);
    pub const DIVIDE: BinaryOp = BinaryOp(12);
    pub const CONCAT: BinaryOp = BinaryOp(13);
    pub const MODULO: BinaryOp = BinaryOp(14);

    pub const NOT_EQUAL: BinaryOp = BinaryOp(Self::NOT_BIT);
    pub const LESS_THAN_OR_EQUAL: BinaryOp = BinaryOp(1 | Self::NOT_BIT);
    pub const GREATER_THAN_OR_EQUAL: BinaryOp = BinaryOp(2 | Self::NOT_BIT);
    pub const NOT_STARTS_WITH: BinaryOp = BinaryOp(3 | Self::NOT_BIT);
    pub const NOT_ENDS_WITH: BinaryOp = BinaryOp(4 | Self::NOT_BIT);
    pub const NOT_CONTAINS: BinaryOp = BinaryOp(5 | Self::NOT_BIT);
    pub const NOT_LIKE: BinaryOp = BinaryOp(6 | Self::NOT_BIT);
    pub const NOT_IN: BinaryOp = BinaryOp(7 | Self::NOT_BIT);
    pub const NOT_REGEXP_LIKE: BinaryOp = BinaryOp(8 | Self::NOT_BIT);

    /// All base (positive) operators.
    pub const BASE: [BinaryOp; 15] = [
        Self::EQUAL,
        Self::GREATER_THAN,
        Self::LESS_THAN,
        Self::STARTS_WITH,
        Self::ENDS_WITH,
        Self::CONTAINS,
        Self::LIKE,
        Self::IN,
        Self::REGEXP_LIKE,
        Self::ADD,
        Self::SUBTRACT,
        Self::MULTIPLY,
        Self::DIVIDE,
        Self::CONCAT,
        Self::MODULO,
    ];

    /// Build from raw bits; `None` if the base part is not a known operator.
    pub fn from_bits(bits: u32) -> Option<Self> {
        if ((bits & !Self::NOT_BIT) as usize) < BASE_NAMES.len() {
            Some(BinaryOp(bits))
        } else {
            None
        }
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Strip the negation bit.
    pub fn positive(self) -> Self {
        BinaryOp(self.0 & !Self::NOT_BIT)
    }

    /// Toggle the negation bit.
    pub fn opposite(self) -> Self {
        BinaryOp(self.0 ^ Self::NOT_BIT)
    }

    pub fn is_not(self) -> bool {
        self.0 & Self::NOT_BIT != 0
    }

    /// Arithmetic operators never carry a meaningful negation.
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self.positive(),
            Self::ADD | Self::SUBTRACT | Self::MULTIPLY | Self::DIVIDE | Self::MODULO | Self::CONCAT
        )
    }

    pub fn is_pattern(self) -> bool {
        matches!(
            self.positive(),
            Self::STARTS_WITH | Self::ENDS_WITH | Self::CONTAINS
        )
    }

    /// Operators that produce a boolean.
    pub fn is_predicate(self) -> bool {
        !self.is_arithmetic()
    }

    /// Canonical name, e.g. `NotEqual`, `GreaterThanOrEqual`, `NotIn`.
    pub fn name(self) -> String {
        let base = BASE_NAMES[(self.0 & !Self::NOT_BIT) as usize];
        match self {
            Self::NOT_EQUAL => "NotEqual".to_string(),
            Self::LESS_THAN_OR_EQUAL => "LessThanOrEqual".to_string(),
            Self::GREATER_THAN_OR_EQUAL => "GreaterThanOrEqual".to_string(),
            op if op.is_not() => format!("Not{base}"),
            _ => base.to_string(),
        }
    }

    /// Inverse of [`BinaryOp::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "NotEqual" => return Some(Self::NOT_EQUAL),
            "LessThanOrEqual" => return Some(Self::LESS_THAN_OR_EQUAL),
            "GreaterThanOrEqual" => return Some(Self::GREATER_THAN_OR_EQUAL),
            _ => {}
        }
        if let Some(pos) = BASE_NAMES.iter().position(|n| *n == name) {
            return Some(BinaryOp(pos as u32));
        }
        let base = name.strip_prefix("Not")?;
        BASE_NAMES
            .iter()
            .position(|n| *n == base)
            .map(|pos| BinaryOp(pos as u32 | Self::NOT_BIT))
    }
}

impl std::ops::Not for BinaryOp {
    type Output = BinaryOp;

    fn not(self) -> BinaryOp {
        self.opposite()
    }
}

impl fmt::Debug for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    BitwiseNot,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Not => "Not",
            UnaryOp::Negate => "Negate",
            UnaryOp::BitwiseNot => "BitwiseNot",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Not" => Some(UnaryOp::Not),
            "Negate" => Some(UnaryOp::Negate),
            "BitwiseNot" => Some(UnaryOp::BitwiseNot),
            _ => None,
        }
    }
}

/// Kind of a set node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetKind {
    And,
    Or,
    List,
    Concat,
}

impl SetKind {
    /// Ordered sets compare positionally; unordered ones as multisets.
    pub fn is_ordered(self) -> bool {
        matches!(self, SetKind::List | SetKind::Concat)
    }

    /// Whether a child of the same kind is spliced into its parent.
    pub fn flattens(self) -> bool {
        !matches!(self, SetKind::List)
    }

    pub fn tag(self) -> &'static str {
        match self {
            SetKind::And => "and",
            SetKind::Or => "or",
            SetKind::List => "list",
            SetKind::Concat => "concat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_bit_algebra() {
        for op in BinaryOp::BASE {
            assert_eq!(op.opposite().opposite(), op);
            assert_eq!(op.opposite().positive(), op);
            assert!(op.opposite().is_not());
            assert!(!op.is_not());
        }
        assert_eq!(!BinaryOp::EQUAL, BinaryOp::NOT_EQUAL);
        assert_eq!(!BinaryOp::LESS_THAN, BinaryOp::GREATER_THAN_OR_EQUAL);
        assert_eq!(!BinaryOp::GREATER_THAN, BinaryOp::LESS_THAN_OR_EQUAL);
    }

    #[test]
    fn names_round_trip() {
        for op in BinaryOp::BASE {
            assert_eq!(BinaryOp::from_name(&op.name()), Some(op));
            let neg = op.opposite();
            assert_eq!(BinaryOp::from_name(&neg.name()), Some(neg));
        }
        assert_eq!(BinaryOp::NOT_IN.name(), "NotIn");
        assert_eq!(BinaryOp::from_name("Bogus"), None);
    }

    #[test]
    fn from_bits_rejects_unknown_base() {
        assert_eq!(BinaryOp::from_bits(7), Some(BinaryOp::IN));
        assert_eq!(BinaryOp::from_bits(99), None);
        assert_eq!(
            BinaryOp::from_bits(BinaryOp::NOT_BIT),
            Some(BinaryOp::NOT_EQUAL)
        );
    }
}
