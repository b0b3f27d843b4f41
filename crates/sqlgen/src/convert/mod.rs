//! Host lambda to AST conversion
//!
//! Conversion walks the host tree once:
//! - member access on the lambda's root parameter becomes a property
//! - member access on anything that evaluates to a constant is evaluated
//! - calls and other members dispatch through the [`HandlerRegistry`]:
//!   a handler for `(type, name)` first, then one for `name` alone, then a
//!   plain function node. A receiver's type comes from a constant's value
//!   or, for entity properties, from the column type in the metadata
//! - inside a grouped query the group parameter exposes `Key` and the
//!   aggregates (`Count`, `Sum`, `Average`, `Max`, `Min`)

pub mod host;
pub mod parse;
pub mod query;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::ast::{BinaryOp, Expr, LambdaExpr, Scalar, SetKind, UnaryOp, ValueData};
use crate::meta::MetadataLookup;
use crate::pipeline::PipelineError;

pub use host::{HostBinaryOp, HostExpr, HostLambda, HostValue, normalize_type};
pub use parse::{ParseEnv, ParseError, parse_expr, parse_lambda, parse_query};
pub use registry::{HandlerRegistry, MemberHandler, MethodCall, MethodHandler};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error("lambda declares no parameter")]
    NoParameter,

    #[error("cannot convert {0}")]
    CannotConvert(String),

    #[error("invalid argument to {method}: {message}")]
    Argument { method: String, message: String },

    #[error("unsupported query operator `{0}`")]
    UnsupportedOperator(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Types whose static calls map to upper-cased SQL function names.
const MATH_TYPES: &[&str] = &["Math", "MathF"];

/// Converts host lambdas using a handler registry.
#[derive(Clone)]
pub struct Converter {
    registry: Arc<HandlerRegistry>,
    metadata: Option<Arc<dyn MetadataLookup>>,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("registry", &self.registry)
            .field("metadata", &self.metadata.is_some())
            .finish()
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::global()
    }
}

impl Converter {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            metadata: None,
        }
    }

    /// Type entity properties from table metadata, so `u.Name.PadLeft(5)`
    /// finds a handler registered for `("String", "PadLeft")`.
    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataLookup>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Converter over the process-wide registry.
    pub fn global() -> Self {
        Self::new(HandlerRegistry::global())
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn convert(&self, lambda: &HostLambda) -> Result<Expr, ConvertError> {
        let root = lambda.root().ok_or(ConvertError::NoParameter)?;
        Scope::new(self, root).convert(&lambda.body)
    }

    /// Convert a lambda whose parameter is a row of `entity`.
    pub fn convert_for(&self, entity: &str, lambda: &HostLambda) -> Result<Expr, ConvertError> {
        let root = lambda.root().ok_or(ConvertError::NoParameter)?;
        Scope::new(self, root).for_entity(entity).convert(&lambda.body)
    }

    /// Convert a lambda used as a filter. A bare boolean property `u.Active`
    /// becomes `Active = true`.
    pub fn predicate(&self, lambda: &HostLambda) -> Result<Expr, ConvertError> {
        self.convert(lambda).map(as_predicate)
    }

    pub fn predicate_for(&self, entity: &str, lambda: &HostLambda) -> Result<Expr, ConvertError> {
        self.convert_for(entity, lambda).map(as_predicate)
    }

    /// Wrap a lambda for lazy conversion with this converter.
    pub fn wrap(&self, lambda: HostLambda) -> LambdaExpr {
        LambdaExpr::with_converter(lambda, self.clone())
    }
}

/// Keys of the grouping in effect, with their names where known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupKeys {
    pub keys: Vec<(Option<String>, Expr)>,
}

impl GroupKeys {
    fn key(&self) -> Result<Expr, ConvertError> {
        match self.keys.as_slice() {
            [(_, single)] => Ok(single.clone()),
            _ => Err(ConvertError::CannotConvert(
                "composite group key used as a single value".into(),
            )),
        }
    }

    fn named(&self, name: &str) -> Result<Expr, ConvertError> {
        self.keys
            .iter()
            .find(|(n, _)| n.as_deref() == Some(name))
            .map(|(_, e)| e.clone())
            .ok_or_else(|| ConvertError::CannotConvert(format!("unknown group key `{name}`")))
    }
}

/// Conversion state for one lambda body: its root parameter, the entity
/// it ranges over when known and, inside a grouped query, the group keys.
pub struct Scope<'a> {
    converter: &'a Converter,
    root: &'a str,
    entity: Option<&'a str>,
    group: Option<&'a GroupKeys>,
}

impl<'a> Scope<'a> {
    pub fn new(converter: &'a Converter, root: &'a str) -> Self {
        Self {
            converter,
            root,
            entity: None,
            group: None,
        }
    }

    pub fn grouped(converter: &'a Converter, root: &'a str, group: &'a GroupKeys) -> Self {
        Self {
            converter,
            root,
            entity: None,
            group: Some(group),
        }
    }

    pub fn for_entity(mut self, entity: &'a str) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn root(&self) -> &str {
        self.root
    }

    pub fn entity(&self) -> Option<&str> {
        self.entity
    }

    /// Type of a receiver: a constant's own type, or the column type of a
    /// property on the root row.
    fn receiver_type<'e>(&self, expr: &'e HostExpr) -> Option<&'e str> {
        if let HostExpr::Member { target, member } = expr
            && self.group.is_none()
            && self.is_root(target)
        {
            let entity = self.entity?;
            let metadata = self.converter.metadata.as_ref()?;
            return metadata
                .resolve_column(entity, member)
                .map(|column| column.db_type.host_type());
        }
        expr.static_type().map(normalize_type)
    }

    fn is_root(&self, expr: &HostExpr) -> bool {
        matches!(expr, HostExpr::Parameter(p) if p == self.root)
    }

    /// Convert a nested lambda in a fresh scope rooted at its parameter.
    pub fn convert_lambda(&self, lambda: &HostLambda) -> Result<Expr, ConvertError> {
        let root = lambda.root().ok_or(ConvertError::NoParameter)?;
        Scope::new(self.converter, root).convert(&lambda.body)
    }

    pub fn convert_all(&self, exprs: &[HostExpr]) -> Result<Vec<Expr>, ConvertError> {
        exprs.iter().map(|e| self.convert(e)).collect()
    }

    pub fn convert(&self, expr: &HostExpr) -> Result<Expr, ConvertError> {
        match expr {
            HostExpr::Parameter(name) => Err(ConvertError::CannotConvert(format!(
                "bare parameter `{name}`"
            ))),
            HostExpr::Constant(value) => value_from_host(value),
            HostExpr::Source { name, .. } => Err(ConvertError::CannotConvert(format!(
                "query source `{name}` inside an expression"
            ))),
            HostExpr::Member { target, member } => self.convert_member(target, member),
            HostExpr::StaticMember { type_name, member } => {
                let ty = normalize_type(type_name);
                match self.converter.registry.find_member(Some(ty), member) {
                    Some(handler) => handler(None, self),
                    None => Err(ConvertError::CannotConvert(format!("{ty}.{member}"))),
                }
            }
            HostExpr::Call {
                target,
                method,
                args,
            } => self.convert_call(Some(target), None, method, args),
            HostExpr::StaticCall {
                type_name,
                method,
                args,
            } => self.convert_call(None, Some(type_name), method, args),
            HostExpr::Binary(op, left, right) => self.convert_binary(*op, left, right),
            HostExpr::Unary(op, operand) => Ok(Expr::unary(*op, self.convert(operand)?)),
            HostExpr::New(_) => Err(ConvertError::CannotConvert(
                "object construction outside a projection".into(),
            )),
            HostExpr::Array(items) => Ok(Expr::value_list(self.convert_all(items)?)),
            HostExpr::Lambda(_) => Err(ConvertError::CannotConvert(
                "lambda outside a method argument".into(),
            )),
        }
    }

    fn convert_member(&self, target: &HostExpr, member: &str) -> Result<Expr, ConvertError> {
        if let Some(group) = self.group {
            if self.is_root(target) && member == "Key" {
                return group.key();
            }
            if let HostExpr::Member {
                target: inner,
                member: key,
            } = target
                && key == "Key"
                && self.is_root(inner)
            {
                return group.named(member);
            }
        }

        if let HostExpr::Parameter(name) = target {
            return if name == self.root {
                Ok(Expr::prop(member))
            } else {
                Err(ConvertError::CannotConvert(format!(
                    "member `{member}` of unknown parameter `{name}`"
                )))
            };
        }

        if let Some(value) = evaluate(target).and_then(|v| v.member(member)) {
            return value_from_host(&value);
        }

        let ty = self.receiver_type(target);
        if let Some(handler) = self.converter.registry.find_member(ty, member) {
            return handler(Some(target), self);
        }

        log::debug!("no member handler for `{member}`, emitting a function call");
        Ok(Expr::func(member, vec![self.convert(target)?]))
    }

    fn convert_call(
        &self,
        target: Option<&HostExpr>,
        type_name: Option<&str>,
        method: &str,
        args: &[HostExpr],
    ) -> Result<Expr, ConvertError> {
        if self.group.is_some()
            && let Some(target) = target
            && self.is_root(target)
        {
            return self.convert_aggregate(method, args);
        }

        let ty = match type_name {
            Some(t) => Some(normalize_type(t)),
            None => target.and_then(|t| self.receiver_type(t)),
        };
        let call = MethodCall {
            type_name: ty,
            method,
            target,
            args,
        };
        if let Some(handler) = self.converter.registry.find_method(ty, method) {
            return handler(&call, self);
        }

        log::debug!(
            "no method handler for `{}.{method}`, emitting a function call",
            ty.unwrap_or("?")
        );
        let mut converted = Vec::with_capacity(args.len() + 1);
        if let Some(target) = target {
            converted.push(self.convert(target)?);
        }
        converted.extend(self.convert_all(args)?);
        let name = match type_name {
            Some(t) if MATH_TYPES.contains(&t) => method.to_uppercase(),
            _ => method.to_string(),
        };
        Ok(Expr::func(name, converted))
    }

    fn convert_aggregate(&self, method: &str, args: &[HostExpr]) -> Result<Expr, ConvertError> {
        let name = match method {
            "Count" | "LongCount" => "COUNT",
            "Sum" => "SUM",
            "Average" => "AVG",
            "Max" => "MAX",
            "Min" => "MIN",
            other => {
                return Err(ConvertError::CannotConvert(format!(
                    "group method `{other}`"
                )));
            }
        };
        let args = match args.first() {
            None => Vec::new(),
            Some(_) if name == "COUNT" => {
                return Err(ConvertError::CannotConvert(
                    "Count with a predicate inside a group".into(),
                ));
            }
            Some(HostExpr::Lambda(selector)) => vec![self.convert_lambda(selector)?],
            Some(other) => vec![self.convert(other)?],
        };
        Ok(Expr::func(name, args))
    }

    fn convert_binary(
        &self,
        op: HostBinaryOp,
        left: &HostExpr,
        right: &HostExpr,
    ) -> Result<Expr, ConvertError> {
        let comparison = match op {
            HostBinaryOp::AndAlso => return Ok(self.convert(left)?.and(self.convert(right)?)),
            HostBinaryOp::OrElse => return Ok(self.convert(left)?.or(self.convert(right)?)),
            HostBinaryOp::Coalesce => {
                return Ok(Expr::func(
                    "COALESCE",
                    vec![self.convert(left)?, self.convert(right)?],
                ));
            }
            HostBinaryOp::Add => {
                let (l, r) = (self.convert(left)?, self.convert(right)?);
                return Ok(if is_text(&l) || is_text(&r) {
                    l.concat(r)
                } else {
                    Expr::binary(BinaryOp::ADD, l, r)
                });
            }
            HostBinaryOp::Subtract => BinaryOp::SUBTRACT,
            HostBinaryOp::Multiply => BinaryOp::MULTIPLY,
            HostBinaryOp::Divide => BinaryOp::DIVIDE,
            HostBinaryOp::Modulo => BinaryOp::MODULO,
            HostBinaryOp::Equal => BinaryOp::EQUAL,
            HostBinaryOp::NotEqual => BinaryOp::NOT_EQUAL,
            HostBinaryOp::LessThan => BinaryOp::LESS_THAN,
            HostBinaryOp::LessThanOrEqual => BinaryOp::LESS_THAN_OR_EQUAL,
            HostBinaryOp::GreaterThan => BinaryOp::GREATER_THAN,
            HostBinaryOp::GreaterThanOrEqual => BinaryOp::GREATER_THAN_OR_EQUAL,
        };

        // `a.CompareTo(b) > 0` and `String.Compare(a, b) > 0` compare a with b
        if op.is_comparison()
            && is_zero(right)
            && let Some((a, b)) = compare_operands(left)
        {
            return Ok(Expr::binary(comparison, self.convert(a)?, self.convert(b)?));
        }

        Ok(Expr::binary(
            comparison,
            self.convert(left)?,
            self.convert(right)?,
        ))
    }
}

fn is_zero(expr: &HostExpr) -> bool {
    matches!(expr, HostExpr::Constant(HostValue::Scalar(Scalar::Int(0))))
}

fn compare_operands(expr: &HostExpr) -> Option<(&HostExpr, &HostExpr)> {
    match expr {
        HostExpr::Call {
            target,
            method,
            args,
        } if method == "CompareTo" && args.len() == 1 => Some((target, &args[0])),
        HostExpr::StaticCall { method, args, .. } if method == "Compare" && args.len() == 2 => {
            Some((&args[0], &args[1]))
        }
        _ => None,
    }
}

fn is_text(expr: &Expr) -> bool {
    match expr {
        Expr::Value {
            value: ValueData::Scalar(Scalar::Text(_)),
            ..
        } => true,
        Expr::Set {
            kind: SetKind::Concat,
            ..
        } => true,
        _ => false,
    }
}

/// Evaluate a host node that only depends on captured values.
pub fn evaluate(expr: &HostExpr) -> Option<HostValue> {
    match expr {
        HostExpr::Constant(v) => Some(v.clone()),
        HostExpr::Member { target, member } => evaluate(target)?.member(member),
        HostExpr::Array(items) => items
            .iter()
            .map(evaluate)
            .collect::<Option<Vec<_>>>()
            .map(HostValue::List),
        HostExpr::Unary(UnaryOp::Negate, operand) => match evaluate(operand)? {
            HostValue::Scalar(Scalar::Int(n)) => Some(HostValue::Scalar(Scalar::Int(-n))),
            HostValue::Scalar(Scalar::Float(f)) => Some(HostValue::Scalar(Scalar::Float(-f))),
            _ => None,
        },
        _ => None,
    }
}

pub fn value_from_host(value: &HostValue) -> Result<Expr, ConvertError> {
    match value {
        HostValue::Scalar(s) => Ok(Expr::value(s.clone())),
        HostValue::List(items) => Ok(Expr::value_list(
            items
                .iter()
                .map(value_from_host)
                .collect::<Result<_, _>>()?,
        )),
        HostValue::Object(_) => Err(ConvertError::CannotConvert(
            "object value used as a scalar".into(),
        )),
    }
}

/// Turn a bare boolean operand into a comparison.
pub fn as_predicate(expr: Expr) -> Expr {
    match expr {
        Expr::Property(_) => expr.equal(true),
        Expr::Unary(UnaryOp::Not, inner) if matches!(*inner, Expr::Property(_)) => {
            (*inner).equal(false)
        }
        Expr::Set { kind, items } if matches!(kind, SetKind::And | SetKind::Or) => Expr::Set {
            kind,
            items: items.into_iter().map(as_predicate).collect(),
        },
        other => other,
    }
}
