//! Member and method handler registry
//!
//! Handlers are stored twice over: keyed by `(type, name)` and by `name`
//! alone. The typed table is consulted first when the receiver's type is
//! known. Registration is safe while other threads convert.

use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use uuid::Uuid;

use super::host::normalize_type;
use super::{ConvertError, HostExpr, HostValue, Scope, evaluate};
use crate::ast::{BinaryOp, Expr, Scalar, SetKind, ValueData};

/// A method call site as seen by a handler. `target` is `None` for static
/// calls.
#[derive(Debug, Clone, Copy)]
pub struct MethodCall<'a> {
    pub type_name: Option<&'a str>,
    pub method: &'a str,
    pub target: Option<&'a HostExpr>,
    pub args: &'a [HostExpr],
}

impl<'a> MethodCall<'a> {
    pub fn arg(&self, index: usize) -> Result<&'a HostExpr, ConvertError> {
        self.args.get(index).ok_or_else(|| ConvertError::Argument {
            method: self.method.to_string(),
            message: format!("missing argument {index}"),
        })
    }

    pub fn receiver(&self) -> Result<&'a HostExpr, ConvertError> {
        self.target.ok_or_else(|| ConvertError::Argument {
            method: self.method.to_string(),
            message: "instance method called statically".into(),
        })
    }

    /// `(target, arg0)` for instance calls, `(arg0, arg1)` for static ones.
    pub fn operands(&self) -> Result<(&'a HostExpr, &'a HostExpr), ConvertError> {
        match self.target {
            Some(target) => Ok((target, self.arg(0)?)),
            None => Ok((self.arg(0)?, self.arg(1)?)),
        }
    }

    /// A captured or literal string argument.
    pub fn text_arg(&self, index: usize) -> Result<String, ConvertError> {
        match evaluate(self.arg(index)?) {
            Some(HostValue::Scalar(Scalar::Text(s))) => Ok(s),
            _ => Err(ConvertError::Argument {
                method: self.method.to_string(),
                message: format!("argument {index} must be a constant string"),
            }),
        }
    }

    fn invalid(&self, message: impl Into<String>) -> ConvertError {
        ConvertError::Argument {
            method: self.method.to_string(),
            message: message.into(),
        }
    }
}

pub type MethodHandler =
    Arc<dyn Fn(&MethodCall<'_>, &Scope<'_>) -> Result<Expr, ConvertError> + Send + Sync + 'static>;

/// Receives the member's target, `None` for static members.
pub type MemberHandler =
    Arc<dyn Fn(Option<&HostExpr>, &Scope<'_>) -> Result<Expr, ConvertError> + Send + Sync + 'static>;

#[derive(Default)]
pub struct HandlerRegistry {
    typed_methods: DashMap<(String, String), MethodHandler>,
    methods: DashMap<String, MethodHandler>,
    typed_members: DashMap<(String, String), MemberHandler>,
    members: DashMap<String, MemberHandler>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("typed_methods", &self.typed_methods.len())
            .field("methods", &self.methods.len())
            .field("typed_members", &self.typed_members.len())
            .field("members", &self.members.len())
            .finish()
    }
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_builtins();
        registry
    }

    /// The process-wide registry, built on first use.
    pub fn global() -> Arc<HandlerRegistry> {
        static GLOBAL: OnceLock<Arc<HandlerRegistry>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(HandlerRegistry::with_builtins()))
            .clone()
    }

    /// Handler for `type_name.name(...)`.
    pub fn register_method<F>(&self, type_name: &str, name: &str, handler: F)
    where
        F: Fn(&MethodCall<'_>, &Scope<'_>) -> Result<Expr, ConvertError> + Send + Sync + 'static,
    {
        self.typed_methods.insert(
            (normalize_type(type_name).to_string(), name.to_string()),
            Arc::new(handler),
        );
    }

    /// Handler for `name(...)` on any receiver.
    pub fn register_any_method<F>(&self, name: &str, handler: F)
    where
        F: Fn(&MethodCall<'_>, &Scope<'_>) -> Result<Expr, ConvertError> + Send + Sync + 'static,
    {
        self.methods.insert(name.to_string(), Arc::new(handler));
    }

    pub fn register_member<F>(&self, type_name: &str, name: &str, handler: F)
    where
        F: Fn(Option<&HostExpr>, &Scope<'_>) -> Result<Expr, ConvertError> + Send + Sync + 'static,
    {
        self.typed_members.insert(
            (normalize_type(type_name).to_string(), name.to_string()),
            Arc::new(handler),
        );
    }

    pub fn register_any_member<F>(&self, name: &str, handler: F)
    where
        F: Fn(Option<&HostExpr>, &Scope<'_>) -> Result<Expr, ConvertError> + Send + Sync + 'static,
    {
        self.members.insert(name.to_string(), Arc::new(handler));
    }

    pub fn find_method(&self, type_name: Option<&str>, name: &str) -> Option<MethodHandler> {
        if let Some(ty) = type_name
            && let Some(h) = self.typed_methods.get(&(ty.to_string(), name.to_string()))
        {
            return Some(h.value().clone());
        }
        self.methods.get(name).map(|h| h.value().clone())
    }

    /// Static members only match typed handlers.
    pub fn find_member(&self, type_name: Option<&str>, name: &str) -> Option<MemberHandler> {
        if let Some(ty) = type_name
            && let Some(h) = self.typed_members.get(&(ty.to_string(), name.to_string()))
        {
            return Some(h.value().clone());
        }
        self.members.get(name).map(|h| h.value().clone())
    }

    fn register_builtins(&self) {
        // String predicates
        for (name, op) in [
            ("StartsWith", BinaryOp::STARTS_WITH),
            ("EndsWith", BinaryOp::ENDS_WITH),
        ] {
            self.register_any_method(name, move |call, scope| {
                let (subject, pattern) = call.operands()?;
                Ok(Expr::binary(op, scope.convert(subject)?, scope.convert(pattern)?))
            });
        }

        // `list.Contains(x)` is membership, `s.Contains(x)` is a substring test
        self.register_any_method("Contains", |call, scope| match call.target {
            None => {
                let list = scope.convert(call.arg(0)?)?;
                Ok(scope.convert(call.arg(1)?)?.in_list(list))
            }
            Some(target) => {
                let subject = scope.convert(target)?;
                let item = scope.convert(call.arg(0)?)?;
                if is_collection(target, &subject) {
                    Ok(item.in_list(subject))
                } else {
                    Ok(subject.contains(item))
                }
            }
        });

        self.register_method("String", "Concat", |call, scope| {
            let mut parts = match call.target {
                Some(receiver) => vec![scope.convert(receiver)?],
                None => Vec::new(),
            };
            parts.extend(match call.args {
                [single] => match scope.convert(single)? {
                    Expr::Value {
                        value: ValueData::List(items),
                        ..
                    } => items,
                    other => vec![other],
                },
                many => scope.convert_all(many)?,
            });
            Ok(Expr::set(SetKind::Concat, parts))
        });
        self.register_any_method("Concat", |call, scope| {
            let mut parts = vec![scope.convert(call.receiver()?)?];
            parts.extend(scope.convert_all(call.args)?);
            Ok(Expr::set(SetKind::Concat, parts))
        });

        for name in ["Equals", "CompareTo", "Compare"] {
            self.register_any_method(name, |call, scope| {
                let (a, b) = call.operands()?;
                Ok(scope.convert(a)?.equal(scope.convert(b)?))
            });
        }

        // a format argument changes the text, so only the bare call is a no-op
        self.register_any_method("ToString", |call, scope| {
            let receiver = scope.convert(call.receiver()?)?;
            if call.args.is_empty() {
                return Ok(receiver);
            }
            let mut args = vec![receiver];
            args.extend(scope.convert_all(call.args)?);
            Ok(Expr::func("ToString", args))
        });

        // Foreign.Exists(u.DeptId, d => d.Name == "R&D")
        self.register_method("Foreign", "Exists", |call, scope| {
            let property = match call.arg(0)? {
                HostExpr::Member { target, member }
                    if matches!(target.as_ref(), HostExpr::Parameter(p) if p == scope.root()) =>
                {
                    member.clone()
                }
                _ => return Err(call.invalid("first argument must be a property")),
            };
            let condition = match call.arg(1)? {
                HostExpr::Lambda(lambda) => scope.convert_lambda(lambda)?,
                _ => return Err(call.invalid("second argument must be a lambda")),
            };
            Ok(Expr::foreign(property, super::as_predicate(condition)))
        });

        self.register_method("Sql", "Raw", |call, _| Ok(Expr::raw(call.text_arg(0)?)));
        self.register_method("Sql", "Generic", |call, scope| {
            Ok(Expr::generic(call.text_arg(0)?, scope.convert(call.arg(1)?)?))
        });
        self.register_method("Sql", "Like", |call, scope| {
            let (subject, pattern) = call.operands()?;
            Ok(scope.convert(subject)?.like(scope.convert(pattern)?))
        });
        self.register_method("Sql", "Literal", |call, _| match evaluate(call.arg(0)?) {
            Some(HostValue::Scalar(s)) => Ok(Expr::literal(s)),
            _ => Err(call.invalid("argument must be a constant")),
        });
        self.register_method("Regex", "IsMatch", |call, scope| {
            let (subject, pattern) = call.operands()?;
            Ok(scope.convert(subject)?.regexp_like(scope.convert(pattern)?))
        });

        // Database clock
        for (ty, name) in [
            ("DateTime", "Now"),
            ("DateTime", "UtcNow"),
            ("DateTime", "Today"),
            ("DateTimeOffset", "Now"),
            ("DateTimeOffset", "UtcNow"),
        ] {
            self.register_member(ty, name, move |_, _| Ok(Expr::func(name, vec![])));
        }
        self.register_member("Guid", "Empty", |_, _| Ok(Expr::value(Uuid::nil())));
        self.register_member("String", "Empty", |_, _| Ok(Expr::value("")));

        for name in ["Length", "Year", "Month", "Day", "Hour", "Minute", "Second"] {
            self.register_any_member(name, move |target, scope| match target {
                Some(target) => Ok(Expr::func(name, vec![scope.convert(target)?])),
                None => Err(ConvertError::CannotConvert(format!("static member `{name}`"))),
            });
        }
    }
}

fn is_collection(host: &HostExpr, converted: &Expr) -> bool {
    host.static_type() == Some("List")
        || matches!(
            converted,
            Expr::Value {
                value: ValueData::List(_),
                ..
            } | Expr::Set {
                kind: SetKind::List,
                ..
            }
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{Converter, HostLambda};

    fn u() -> HostExpr {
        HostExpr::param("u")
    }

    fn convert_with(registry: HandlerRegistry, body: HostExpr) -> Result<Expr, ConvertError> {
        Converter::new(Arc::new(registry)).convert(&HostLambda::new("u", body))
    }

    fn convert(body: HostExpr) -> Result<Expr, ConvertError> {
        convert_with(HandlerRegistry::with_builtins(), body)
    }

    #[test]
    fn starts_with_maps_to_operator() {
        let body = u().member("Name").call("StartsWith", vec![HostExpr::constant("A")]);
        assert_eq!(convert(body).unwrap(), Expr::prop("Name").starts_with("A"));
    }

    #[test]
    fn list_contains_becomes_in_with_swapped_operands() {
        let ids = HostExpr::constant(HostValue::list([1, 2, 3]));
        let body = ids.call("Contains", vec![u().member("Id")]);
        assert_eq!(
            convert(body).unwrap(),
            Expr::prop("Id").in_values([1, 2, 3])
        );
    }

    #[test]
    fn string_contains_is_substring() {
        let body = u().member("Name").call("Contains", vec![HostExpr::constant("x")]);
        assert_eq!(convert(body).unwrap(), Expr::prop("Name").contains("x"));
    }

    #[test]
    fn static_concat_over_array() {
        let body = HostExpr::static_call(
            "string",
            "Concat",
            vec![HostExpr::Array(vec![
                u().member("A"),
                HostExpr::constant("-"),
                u().member("B"),
            ])],
        );
        assert_eq!(
            convert(body).unwrap(),
            Expr::set(
                SetKind::Concat,
                [Expr::prop("A"), Expr::value("-"), Expr::prop("B")]
            )
        );
    }

    #[test]
    fn foreign_exists() {
        let cond = HostLambda::new(
            "d",
            HostExpr::param("d")
                .member("Name")
                .binop(crate::convert::HostBinaryOp::Equal, HostExpr::constant("R&D")),
        );
        let body = HostExpr::static_call(
            "Foreign",
            "Exists",
            vec![u().member("DeptId"), HostExpr::Lambda(cond)],
        );
        assert_eq!(
            convert(body).unwrap(),
            Expr::foreign("DeptId", Expr::prop("Name").equal("R&D"))
        );
    }

    #[test]
    fn sql_escape_hatches() {
        let raw = HostExpr::static_call("Sql", "Raw", vec![HostExpr::constant("1 = 1")]);
        assert_eq!(convert(raw).unwrap(), Expr::raw("1 = 1"));

        let not_constant = HostExpr::static_call("Sql", "Raw", vec![u().member("Name")]);
        assert!(matches!(
            convert(not_constant),
            Err(ConvertError::Argument { .. })
        ));
    }

    #[test]
    fn to_string_keeps_its_format_argument() {
        let bare = u().member("Age").call("ToString", vec![]);
        assert_eq!(convert(bare).unwrap(), Expr::prop("Age"));

        let formatted = u()
            .member("Price")
            .call("ToString", vec![HostExpr::constant("N2")]);
        assert_eq!(
            convert(formatted).unwrap(),
            Expr::func("ToString", vec![Expr::prop("Price"), Expr::value("N2")])
        );
    }

    #[test]
    fn now_is_a_database_function() {
        let body = HostExpr::StaticMember {
            type_name: "DateTime".into(),
            member: "Now".into(),
        };
        assert_eq!(convert(body).unwrap(), Expr::func("Now", vec![]));
    }

    #[test]
    fn isolated_registry_overrides() {
        let registry = HandlerRegistry::new();
        registry.register_any_method("StartsWith", |call, scope| {
            Ok(Expr::func("PREFIX", scope.convert_all(call.args)?))
        });
        let body = u().member("Name").call("StartsWith", vec![HostExpr::constant("A")]);
        assert_eq!(
            convert_with(registry, body).unwrap(),
            Expr::func("PREFIX", vec![Expr::value("A")])
        );
    }

    #[test]
    fn typed_handler_wins_over_name_only() {
        let registry = HandlerRegistry::new();
        registry.register_any_method("Check", |_, _| Ok(Expr::raw("any")));
        registry.register_method("Rules", "Check", |_, _| Ok(Expr::raw("typed")));
        let typed = HostExpr::static_call("Rules", "Check", vec![]);
        let untyped = u().member("X").call("Check", vec![]);
        let converter = Converter::new(Arc::new(registry));
        let conv = |b| converter.convert(&HostLambda::new("u", b)).unwrap();
        assert_eq!(conv(typed), Expr::raw("typed"));
        assert_eq!(conv(untyped), Expr::raw("any"));
    }
}
