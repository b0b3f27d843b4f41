//! Pretty printing for expressions, host trees and pipelines
//!
//! `Display` gives a deterministic single-line form used in logs and error
//! messages. [`pretty`] breaks fluent chains across lines when they exceed a
//! width.

use std::fmt::{self, Display};

use crate::ast::{BinaryOp, Expr, Scalar, SetKind, UnaryOp, ValueData};
use crate::convert::{HostExpr, HostLambda, HostValue};
use crate::pipeline::{OrderItem, Segment};

// ============ AST ============

struct SqlScalar<'a>(&'a Scalar);

impl Display for SqlScalar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Float(n) => write_float(f, *n),
            Scalar::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Scalar::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Scalar::Guid(g) => write!(f, "'{g}'"),
            Scalar::Date(d) => write!(f, "'{d}'"),
            Scalar::DateTime(d) => write!(f, "'{d}'"),
            Scalar::DateTimeTz(d) => write!(f, "'{}'", d.to_rfc3339()),
            Scalar::Enum(e) => write!(f, "{}", e.name),
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_finite() && n.fract() == 0.0 {
        write!(f, "{n:.1}")
    } else {
        write!(f, "{n}")
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    let negated = op.is_not();
    match op.positive() {
        BinaryOp::EQUAL if negated => "<>",
        BinaryOp::EQUAL => "=",
        BinaryOp::GREATER_THAN if negated => "<=",
        BinaryOp::GREATER_THAN => ">",
        BinaryOp::LESS_THAN if negated => ">=",
        BinaryOp::LESS_THAN => "<",
        BinaryOp::STARTS_WITH if negated => "NOT STARTSWITH",
        BinaryOp::STARTS_WITH => "STARTSWITH",
        BinaryOp::ENDS_WITH if negated => "NOT ENDSWITH",
        BinaryOp::ENDS_WITH => "ENDSWITH",
        BinaryOp::CONTAINS if negated => "NOT CONTAINS",
        BinaryOp::CONTAINS => "CONTAINS",
        BinaryOp::LIKE if negated => "NOT LIKE",
        BinaryOp::LIKE => "LIKE",
        BinaryOp::IN if negated => "NOT IN",
        BinaryOp::IN => "IN",
        BinaryOp::REGEXP_LIKE if negated => "NOT REGEXP",
        BinaryOp::REGEXP_LIKE => "REGEXP",
        BinaryOp::ADD => "+",
        BinaryOp::SUBTRACT => "-",
        BinaryOp::MULTIPLY => "*",
        BinaryOp::DIVIDE => "/",
        BinaryOp::MODULO => "%",
        BinaryOp::CONCAT => "||",
        _ => "?",
    }
}

fn write_list<T: Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Operand of an operator: binaries get parentheses.
struct Operand<'a>(&'a Expr);

impl Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.resolved() {
            e @ Expr::Binary { .. } => write!(f, "({e})"),
            e => write!(f, "{e}"),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Value {
                value: ValueData::Scalar(s),
                ..
            } => write!(f, "{}", SqlScalar(s)),
            Expr::Value {
                value: ValueData::List(items),
                ..
            } => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            Expr::Property(name) => write!(f, "{name}"),
            Expr::Unary(op, operand) => {
                let symbol = match op {
                    UnaryOp::Not => "NOT ",
                    UnaryOp::Negate => "-",
                    UnaryOp::BitwiseNot => "~",
                };
                write!(f, "{symbol}{}", Operand(operand))
            }
            Expr::Binary { op, left, right } => {
                write!(f, "{} {} {}", Operand(left), binary_symbol(*op), Operand(right))
            }
            Expr::Function { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Set { kind, items } => {
                let joiner = match kind {
                    SetKind::And => " AND ",
                    SetKind::Or => " OR ",
                    SetKind::List => ", ",
                    SetKind::Concat => " || ",
                };
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(joiner)?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Expr::Lambda(lambda) => match lambda.node() {
                Some(node) => write!(f, "{node}"),
                None => write!(f, "{{{}}}", lambda.host()),
            },
            Expr::Foreign {
                property,
                condition,
            } => write!(f, "EXISTS {property}({condition})"),
            Expr::Generic { key, arg } => write!(f, "@{key}({arg})"),
            Expr::Raw(sql) => write!(f, "RAW \"{}\"", escape_string(sql)),
        }
    }
}

// ============ Host trees ============

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

impl Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Scalar(s) => match s {
                Scalar::Null => write!(f, "null"),
                Scalar::Bool(b) => write!(f, "{b}"),
                Scalar::Int(n) => write!(f, "{n}"),
                Scalar::Float(n) => write_float(f, *n),
                Scalar::Text(s) => write!(f, "\"{}\"", escape_string(s)),
                other => write!(f, "{}", SqlScalar(other)),
            },
            HostValue::List(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            HostValue::Object(fields) => {
                write!(f, "new {{ ")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} = {value}")?;
                }
                write!(f, " }}")
            }
        }
    }
}

/// Receiver or operand position: operators get parentheses.
struct HostOperand<'a>(&'a HostExpr);

impl Display for HostOperand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            e @ (HostExpr::Binary(..) | HostExpr::Unary(..) | HostExpr::Lambda(_)) => {
                write!(f, "({e})")
            }
            e => write!(f, "{e}"),
        }
    }
}

impl Display for HostExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostExpr::Parameter(name) => write!(f, "{name}"),
            HostExpr::Constant(value) => write!(f, "{value}"),
            HostExpr::Source { name, .. } => write!(f, "{name}"),
            HostExpr::Member { target, member } => {
                write!(f, "{}.{member}", HostOperand(target))
            }
            HostExpr::StaticMember { type_name, member } => write!(f, "{type_name}.{member}"),
            HostExpr::Call {
                target,
                method,
                args,
            } => {
                write!(f, "{}.{method}(", HostOperand(target))?;
                write_list(f, args)?;
                write!(f, ")")
            }
            HostExpr::StaticCall {
                type_name,
                method,
                args,
            } => {
                write!(f, "{type_name}.{method}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            HostExpr::Binary(op, left, right) => write!(
                f,
                "{} {} {}",
                HostOperand(left),
                op.symbol(),
                HostOperand(right)
            ),
            HostExpr::Unary(op, operand) => {
                let symbol = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Negate => "-",
                    UnaryOp::BitwiseNot => "~",
                };
                write!(f, "{symbol}{}", HostOperand(operand))
            }
            HostExpr::New(fields) => {
                write!(f, "new {{ ")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} = {value}")?;
                }
                write!(f, " }}")
            }
            HostExpr::Array(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            HostExpr::Lambda(lambda) => write!(f, "{lambda}"),
        }
    }
}

impl Display for HostLambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.params.as_slice() {
            [single] => write!(f, "{single} => {}", self.body),
            params => write!(f, "({}) => {}", params.join(", "), self.body),
        }
    }
}

// ============ Pipelines ============

impl Display for OrderItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expr, if self.asc { "ASC" } else { "DESC" })
    }
}

/// Chain steps from the table outwards, e.g. `["User", ".Where(..)"]`.
fn segment_steps(segment: &Segment) -> Vec<String> {
    let mut steps = match segment.source() {
        Some(source) => segment_steps(source),
        None => Vec::new(),
    };
    let joined = |items: &[Expr]| {
        items
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    match segment {
        Segment::Table { entity } => steps.push(entity.clone()),
        Segment::Where { condition, .. } => steps.push(format!(".Where({condition})")),
        Segment::GroupBy { keys, .. } => steps.push(format!(".GroupBy({})", joined(keys))),
        Segment::Having { condition, .. } => steps.push(format!(".Having({condition})")),
        Segment::OrderBy { orders, .. } => {
            let orders = orders
                .iter()
                .map(|o| o.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            steps.push(format!(".OrderBy({orders})"));
        }
        Segment::Section { skip, take, .. } => {
            if *skip > 0 || take.is_none() {
                steps.push(format!(".Skip({skip})"));
            }
            if let Some(take) = take {
                steps.push(format!(".Take({take})"));
            }
        }
        Segment::Select { items, .. } => {
            let items = items
                .iter()
                .map(|item| match &item.name {
                    Some(name) => format!("{} AS {name}", item.expr),
                    None => item.expr.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            steps.push(format!(".Select({items})"));
        }
        Segment::Update { sets, .. } => {
            let sets = sets
                .iter()
                .map(|s| format!("{} = {}", s.property, s.value))
                .collect::<Vec<_>>()
                .join(", ");
            steps.push(format!(".Update({sets})"));
        }
        Segment::Delete { .. } => steps.push(".Delete()".to_string()),
    }
    steps
}

impl Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&segment_steps(self).concat())
    }
}

// ============ Line breaking ============

fn host_steps(expr: &HostExpr) -> Vec<String> {
    match expr {
        HostExpr::Call {
            target,
            method,
            args,
        } => {
            let mut steps = host_steps(target);
            let args = args
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            steps.push(format!(".{method}({args})"));
            steps
        }
        HostExpr::Member { target, member } if !matches!(**target, HostExpr::Parameter(_)) => {
            let mut steps = host_steps(target);
            steps.push(format!(".{member}"));
            steps
        }
        other => vec![HostOperand(other).to_string()],
    }
}

/// Keep the first step on the base's line and indent the rest.
fn break_steps(steps: &[String], one_line: String, width: usize) -> String {
    if one_line.len() <= width || steps.len() <= 2 {
        return one_line;
    }
    let mut out = String::new();
    for (i, step) in steps.iter().enumerate() {
        if i > 1 {
            out.push_str("\n    ");
        }
        out.push_str(step);
    }
    out
}

/// Pretty print a fluent query with line breaking at the given width.
pub fn pretty(query: &HostExpr, width: usize) -> String {
    break_steps(&host_steps(query), query.to_string(), width)
}

impl HostExpr {
    pub fn pretty(&self, width: usize) -> String {
        pretty(self, width)
    }
}

impl Segment {
    /// Pretty print the chain with line breaking at the given width.
    pub fn pretty(&self, width: usize) -> String {
        break_steps(&segment_steps(self), self.to_string(), width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{ParseEnv, parse_lambda, parse_query};

    #[test]
    fn expr_display() {
        let e = Expr::prop("Age").gt(18) & Expr::prop("Name").starts_with("A");
        assert_eq!(e.to_string(), "(Age > 18 AND Name STARTSWITH 'A')");

        let e = (Expr::prop("Price") * 2).le(10.5) | Expr::prop("Tag").in_values(["a", "b"]);
        assert_eq!(e.to_string(), "((Price * 2) <= 10.5 OR Tag IN ('a', 'b'))");

        assert_eq!(Expr::prop("Name").equal(Expr::null()).to_string(), "Name = NULL");
        assert_eq!((!Expr::prop("Name").contains("x")).to_string(), "Name NOT CONTAINS 'x'");
        assert_eq!(Expr::count().to_string(), "COUNT()");
    }

    #[test]
    fn host_display_reparses() {
        let env = ParseEnv::new();
        for text in [
            "u => u.Age > 18 && u.Name.StartsWith(\"A\\\"b\")",
            "u => !(u.Active) || u.Score * 2.0 >= 10",
            "g => new { Dept = g.Key, Total = g.Sum(u => u.Salary) }",
            "u => Math.Abs(u.Delta) < 3 && [1, 2].Contains(u.Id)",
        ] {
            let parsed = parse_lambda(text, &env).unwrap();
            let printed = parsed.to_string();
            assert_eq!(parse_lambda(&printed, &env).unwrap(), parsed, "{printed}");
        }
    }

    #[test]
    fn segment_display() {
        let seg = Segment::table("User")
            .where_(Expr::prop("Age").gt(18))
            .and_then(|s| s.order_by(Expr::prop("Name"), true))
            .and_then(|s| s.skip(10))
            .and_then(|s| s.take(20))
            .unwrap();
        assert_eq!(
            seg.to_string(),
            "User.Where(Age > 18).OrderBy(Name ASC).Skip(10).Take(20)"
        );
        assert_eq!(
            seg.pretty(30),
            "User.Where(Age > 18)\n    .OrderBy(Name ASC)\n    .Skip(10)\n    .Take(20)"
        );
        assert_eq!(seg.pretty(80), seg.to_string());
    }

    #[test]
    fn long_query_breaks_chain() {
        let env = ParseEnv::new().with_source("users", "User");
        let q = parse_query(
            "users.Where(u => u.Age > 18).OrderBy(u => u.Name).Select(u => new { u.Name, u.Age })",
            &env,
        )
        .unwrap();
        let out = pretty(&q, 40);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "users.Where(u => u.Age > 18)");
        assert!(lines[2].starts_with("    .Select("));
        assert_eq!(pretty(&q, 200), q.to_string());
    }
}
