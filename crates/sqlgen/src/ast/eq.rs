//! Structural equality and hashing for [`Expr`].
//!
//! And/Or sets compare as multisets and hash by a wrapping sum of child
//! hashes. Every other node is positional. Lambda wrappers are compared and
//! hashed through their converted node.

use std::hash::{Hash, Hasher};

use super::Expr;

impl Expr {
    /// Look through a lambda wrapper to its converted node. A wrapper whose
    /// conversion failed stands for itself.
    pub(crate) fn resolved(&self) -> &Expr {
        match self {
            Expr::Lambda(lambda) => lambda.node().unwrap_or(self),
            other => other,
        }
    }

    /// Hash with [`StableHasher`]: the same tree gives the same value in
    /// every process, on every platform, under every toolchain.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = StableHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a. Integers are fed little-endian and `usize`/`isize` are
/// widened to 64 bits, so nothing depends on the host's word size or
/// byte order.
#[derive(Debug, Clone, Copy)]
pub struct StableHasher(u64);

impl Default for StableHasher {
    fn default() -> Self {
        Self(FNV_OFFSET)
    }
}

impl Hasher for StableHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u64::from(*byte);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    fn write_u16(&mut self, n: u16) {
        self.write(&n.to_le_bytes());
    }

    fn write_u32(&mut self, n: u32) {
        self.write(&n.to_le_bytes());
    }

    fn write_u64(&mut self, n: u64) {
        self.write(&n.to_le_bytes());
    }

    fn write_u128(&mut self, n: u128) {
        self.write(&n.to_le_bytes());
    }

    fn write_usize(&mut self, n: usize) {
        self.write_u64(n as u64);
    }

    fn write_i16(&mut self, n: i16) {
        self.write(&n.to_le_bytes());
    }

    fn write_i32(&mut self, n: i32) {
        self.write(&n.to_le_bytes());
    }

    fn write_i64(&mut self, n: i64) {
        self.write(&n.to_le_bytes());
    }

    fn write_i128(&mut self, n: i128) {
        self.write(&n.to_le_bytes());
    }

    fn write_isize(&mut self, n: isize) {
        self.write_i64(n as i64);
    }
}

fn multiset_eq(left: &[Expr], right: &[Expr]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut used = vec![false; right.len()];
    'outer: for l in left {
        for (i, r) in right.iter().enumerate() {
            if !used[i] && l == r {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        match (self.resolved(), other.resolved()) {
            (
                Expr::Value {
                    value: a,
                    literal: la,
                },
                Expr::Value {
                    value: b,
                    literal: lb,
                },
            ) => la == lb && a == b,
            (Expr::Property(a), Expr::Property(b)) => a == b,
            (Expr::Unary(op_a, a), Expr::Unary(op_b, b)) => op_a == op_b && a == b,
            (
                Expr::Binary {
                    op: op_a,
                    left: la,
                    right: ra,
                },
                Expr::Binary {
                    op: op_b,
                    left: lb,
                    right: rb,
                },
            ) => op_a == op_b && la == lb && ra == rb,
            (
                Expr::Function { name: na, args: aa },
                Expr::Function { name: nb, args: ab },
            ) => na == nb && aa == ab,
            (
                Expr::Set {
                    kind: ka,
                    items: ia,
                },
                Expr::Set {
                    kind: kb,
                    items: ib,
                },
            ) => {
                ka == kb
                    && if ka.is_ordered() {
                        ia == ib
                    } else {
                        multiset_eq(ia, ib)
                    }
            }
            (Expr::Lambda(a), Expr::Lambda(b)) => a.host() == b.host(),
            (
                Expr::Foreign {
                    property: pa,
                    condition: ca,
                },
                Expr::Foreign {
                    property: pb,
                    condition: cb,
                },
            ) => pa == pb && ca == cb,
            (Expr::Generic { key: ka, arg: aa }, Expr::Generic { key: kb, arg: ab }) => {
                ka == kb && aa == ab
            }
            (Expr::Raw(a), Expr::Raw(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let this = self.resolved();
        std::mem::discriminant(this).hash(state);
        match this {
            Expr::Value { value, literal } => {
                literal.hash(state);
                value.hash(state);
            }
            Expr::Property(name) => name.hash(state),
            Expr::Unary(op, operand) => {
                op.hash(state);
                operand.hash(state);
            }
            Expr::Binary { op, left, right } => {
                op.hash(state);
                left.hash(state);
                right.hash(state);
            }
            Expr::Function { name, args } => {
                name.hash(state);
                args.hash(state);
            }
            Expr::Set { kind, items } => {
                kind.hash(state);
                if kind.is_ordered() {
                    items.hash(state);
                } else {
                    let sum = items
                        .iter()
                        .fold(0u64, |acc, item| acc.wrapping_add(item.stable_hash()));
                    state.write_usize(items.len());
                    state.write_u64(sum);
                }
            }
            // Only reached when conversion failed; equal hosts must hash alike
            Expr::Lambda(_) => state.write_u8(0),
            Expr::Foreign {
                property,
                condition,
            } => {
                property.hash(state);
                condition.hash(state);
            }
            Expr::Generic { key, arg } => {
                key.hash(state);
                arg.hash(state);
            }
            Expr::Raw(sql) => sql.hash(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SetKind;

    #[test]
    fn and_equality_ignores_order() {
        let a = Expr::prop("Name").starts_with("A");
        let b = Expr::prop("Name").starts_with("B");
        let ab = a.clone() & b.clone();
        let ba = b & a;
        assert_eq!(ab, ba);
        assert_eq!(ab.stable_hash(), ba.stable_hash());
    }

    fn fnv(bytes: &[u8]) -> u64 {
        let mut hasher = StableHasher::default();
        hasher.write(bytes);
        hasher.finish()
    }

    #[test]
    fn stable_hasher_is_fnv1a() {
        assert_eq!(fnv(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv(b"foobar"), 0x8594_4171_f739_67e8);

        let mut words = StableHasher::default();
        words.write_usize(0x0102);
        assert_eq!(words.finish(), fnv(&[2, 1, 0, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn stable_hash_matches_between_separately_built_trees() {
        let build = || Expr::prop("Age").gt(18) & Expr::prop("Name").starts_with("A");
        assert_eq!(build().stable_hash(), build().stable_hash());
        assert_ne!(
            build().stable_hash(),
            (Expr::prop("Age").gt(19) & Expr::prop("Name").starts_with("A")).stable_hash()
        );
    }

    #[test]
    fn multiset_counts_duplicates() {
        let a = Expr::prop("A").equal(1);
        let b = Expr::prop("B").equal(1);
        let aab = Expr::set(SetKind::Or, [a.clone(), a.clone(), b.clone()]);
        let abb = Expr::set(SetKind::Or, [a, b.clone(), b]);
        assert_ne!(aab, abb);
    }

    #[test]
    fn list_equality_is_positional() {
        let forward = Expr::list([Expr::value(1), Expr::value(2), Expr::value(3)]);
        let backward = Expr::list([Expr::value(3), Expr::value(2), Expr::value(1)]);
        assert_ne!(forward, backward);
        assert_ne!(forward.stable_hash(), backward.stable_hash());
    }

    #[test]
    fn literal_flag_participates() {
        assert_ne!(Expr::value(1), Expr::literal(1));
    }

    #[test]
    fn raw_and_generic_compare_by_content() {
        assert_eq!(Expr::raw("1 = 1"), Expr::raw("1 = 1"));
        assert_ne!(Expr::raw("1 = 1"), Expr::raw("1=1"));
        assert_eq!(
            Expr::generic("k", Expr::value(1)),
            Expr::generic("k", Expr::value(1))
        );
        assert_ne!(
            Expr::generic("k", Expr::value(1)),
            Expr::generic("j", Expr::value(1))
        );
    }
}
