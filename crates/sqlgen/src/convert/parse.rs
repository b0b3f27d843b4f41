//! Parser for host lambda and fluent-query text
//!
//! Produces a private syntax tree which is then resolved against a
//! [`ParseEnv`] (captured values, query sources, lambda parameters) into a
//! [`HostExpr`].

use indexmap::IndexMap;
use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, delimited, not, opt, preceded, repeat, separated, terminated};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use super::host::{HostBinaryOp, HostExpr, HostLambda, HostValue};
use crate::ast::{Scalar, UnaryOp};

type PResult<T> = winnow::ModalResult<T>;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (line {}, column {}, offset {})",
            self.message, self.line, self.column, self.offset
        )
    }
}

impl std::error::Error for ParseError {}

/// Names visible to parsed text besides lambda parameters.
#[derive(Debug, Clone, Default)]
pub struct ParseEnv {
    /// Captured values, referenced as `@name`
    pub captures: IndexMap<String, HostValue>,
    /// Query sources: identifier -> entity name
    pub sources: IndexMap<String, String>,
}

impl ParseEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capture(mut self, name: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.captures.insert(name.into(), value.into());
        self
    }

    pub fn with_source(mut self, name: impl Into<String>, entity: impl Into<String>) -> Self {
        self.sources.insert(name.into(), entity.into());
        self
    }
}

/// Parse `u => body` (or `(a, b) => body`).
pub fn parse_lambda(input: &str, env: &ParseEnv) -> Result<HostLambda, ParseError> {
    let input = input.trim();
    match parse_syntax(input)? {
        Syntax::Lambda(params, body) => {
            let mut resolver = Resolver::new(env);
            resolver
                .lambda(params, *body)
                .map_err(|e| e.into_parse_error(input))
        }
        _ => Err(build_parse_error("expected a lambda".into(), input, 0)),
    }
}

/// Parse a free expression. Identifiers must be query sources or type names.
pub fn parse_expr(input: &str, env: &ParseEnv) -> Result<HostExpr, ParseError> {
    let input = input.trim();
    let syntax = parse_syntax(input)?;
    Resolver::new(env)
        .resolve(syntax)
        .map_err(|e| e.into_parse_error(input))
}

/// Parse a fluent query: `users.Where(u => u.Age > 18).Take(10)`.
pub fn parse_query(input: &str, env: &ParseEnv) -> Result<HostExpr, ParseError> {
    let expr = parse_expr(input, env)?;
    if query_root(&expr).is_some() {
        Ok(expr)
    } else {
        Err(build_parse_error(
            "query must start from a known source".into(),
            input.trim(),
            0,
        ))
    }
}

fn query_root(expr: &HostExpr) -> Option<&HostExpr> {
    match expr {
        HostExpr::Source { .. } => Some(expr),
        HostExpr::Call { target, .. } => query_root(target),
        _ => None,
    }
}

fn parse_syntax(input: &str) -> Result<Syntax, ParseError> {
    let mut stream = input;
    match expr.parse_next(&mut stream) {
        Ok(parsed) => {
            if stream.trim().is_empty() {
                Ok(parsed)
            } else {
                let offset = trailing_input_offset(input, stream);
                Err(build_parse_error(
                    "unexpected trailing input".to_string(),
                    input,
                    offset,
                ))
            }
        }
        Err(e) => {
            let offset = input.len().saturating_sub(stream.len());
            Err(build_parse_error(format!("{:?}", e), input, offset))
        }
    }
}

fn build_parse_error(message: String, input: &str, offset: usize) -> ParseError {
    let (line, column) = offset_to_line_column(input, offset);
    ParseError {
        message,
        offset,
        line,
        column,
    }
}

fn offset_to_line_column(input: &str, offset: usize) -> (usize, usize) {
    let bounded = offset.min(input.len());
    let mut line = 1usize;
    let mut column = 1usize;

    for ch in input[..bounded].chars() {
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }

    (line, column)
}

fn trailing_input_offset(input: &str, trailing: &str) -> usize {
    let base = input.len().saturating_sub(trailing.len());
    let non_ws = trailing
        .char_indices()
        .find(|(_, ch)| !ch.is_whitespace())
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    base + non_ws
}

// ============ Syntax tree ============

#[derive(Debug, Clone, PartialEq)]
enum Syntax {
    Ident(String),
    Literal(Scalar),
    Capture(String),
    Member(Box<Syntax>, String),
    Call(Box<Syntax>, Vec<Syntax>),
    Binary(HostBinaryOp, Box<Syntax>, Box<Syntax>),
    Unary(UnaryOp, Box<Syntax>),
    Array(Vec<Syntax>),
    New(Vec<(Option<String>, Syntax)>),
    Lambda(Vec<String>, Box<Syntax>),
}

fn binary(op: HostBinaryOp) -> impl Fn(Syntax, Syntax) -> Syntax {
    move |l, r| Syntax::Binary(op, Box::new(l), Box::new(r))
}

// ============ Top-level expression (handles precedence) ============

fn expr(input: &mut &str) -> PResult<Syntax> {
    preceded(ws, alt((lambda, coalesce_expr))).parse_next(input)
}

fn lambda(input: &mut &str) -> PResult<Syntax> {
    let params = alt((
        ident_str.map(|p| vec![p]),
        delimited(
            ('(', ws),
            separated(0.., ident_str, (ws, ',', ws)),
            (ws, ')'),
        ),
    ))
    .parse_next(input)?;
    let body = preceded((ws, "=>", ws), expr).parse_next(input)?;
    Ok(Syntax::Lambda(params, Box::new(body)))
}

/// `a ?? b ?? c` groups to the right.
fn coalesce_expr(input: &mut &str) -> PResult<Syntax> {
    let left = or_expr.parse_next(input)?;
    let right: Option<Syntax> = opt(preceded((ws, "??", ws), coalesce_expr)).parse_next(input)?;
    Ok(match right {
        Some(r) => binary(HostBinaryOp::Coalesce)(left, r),
        None => left,
    })
}

fn or_expr(input: &mut &str) -> PResult<Syntax> {
    let first = and_expr.parse_next(input)?;
    let rest: Vec<Syntax> = repeat(0.., preceded((ws, "||", ws), and_expr)).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, binary(HostBinaryOp::OrElse)))
}

fn and_expr(input: &mut &str) -> PResult<Syntax> {
    let first = cmp_expr.parse_next(input)?;
    let rest: Vec<Syntax> = repeat(0.., preceded((ws, "&&", ws), cmp_expr)).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, binary(HostBinaryOp::AndAlso)))
}

fn cmp_expr(input: &mut &str) -> PResult<Syntax> {
    let first = add_expr.parse_next(input)?;
    let rest: Vec<(HostBinaryOp, Syntax)> =
        repeat(0.., (ws, cmp_op, ws, add_expr).map(|(_, op, _, e)| (op, e))).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |l, (op, r)| binary(op)(l, r)))
}

fn cmp_op(input: &mut &str) -> PResult<HostBinaryOp> {
    alt((
        "==".value(HostBinaryOp::Equal),
        "!=".value(HostBinaryOp::NotEqual),
        "<=".value(HostBinaryOp::LessThanOrEqual),
        ">=".value(HostBinaryOp::GreaterThanOrEqual),
        "<".value(HostBinaryOp::LessThan),
        ">".value(HostBinaryOp::GreaterThan),
    ))
    .parse_next(input)
}

fn add_expr(input: &mut &str) -> PResult<Syntax> {
    let first = mul_expr.parse_next(input)?;
    let rest: Vec<(HostBinaryOp, Syntax)> =
        repeat(0.., (ws, add_op, ws, mul_expr).map(|(_, op, _, e)| (op, e))).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |l, (op, r)| binary(op)(l, r)))
}

fn add_op(input: &mut &str) -> PResult<HostBinaryOp> {
    alt((
        '+'.value(HostBinaryOp::Add),
        '-'.value(HostBinaryOp::Subtract),
    ))
    .parse_next(input)
}

fn mul_expr(input: &mut &str) -> PResult<Syntax> {
    let first = unary_expr.parse_next(input)?;
    let rest: Vec<(HostBinaryOp, Syntax)> = repeat(
        0..,
        (ws, mul_op, ws, unary_expr).map(|(_, op, _, e)| (op, e)),
    )
    .parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |l, (op, r)| binary(op)(l, r)))
}

fn mul_op(input: &mut &str) -> PResult<HostBinaryOp> {
    alt((
        '*'.value(HostBinaryOp::Multiply),
        '/'.value(HostBinaryOp::Divide),
        '%'.value(HostBinaryOp::Modulo),
    ))
    .parse_next(input)
}

fn unary_expr(input: &mut &str) -> PResult<Syntax> {
    alt((
        preceded(('!', ws), unary_expr).map(|e| Syntax::Unary(UnaryOp::Not, Box::new(e))),
        preceded(('-', ws), unary_expr).map(negate),
        preceded(('~', ws), unary_expr).map(|e| Syntax::Unary(UnaryOp::BitwiseNot, Box::new(e))),
        postfix_expr,
    ))
    .parse_next(input)
}

fn negate(e: Syntax) -> Syntax {
    match e {
        Syntax::Literal(Scalar::Int(n)) => Syntax::Literal(Scalar::Int(-n)),
        Syntax::Literal(Scalar::Float(f)) => Syntax::Literal(Scalar::Float(-f)),
        other => Syntax::Unary(UnaryOp::Negate, Box::new(other)),
    }
}

// ============ Postfix expressions (.member and (call)) ============

enum Postfix {
    Member(String),
    Call(Vec<Syntax>),
}

fn postfix_expr(input: &mut &str) -> PResult<Syntax> {
    let base = primary.parse_next(input)?;
    let ops: Vec<Postfix> = repeat(0.., postfix_op).parse_next(input)?;

    Ok(ops.into_iter().fold(base, |acc, op| match op {
        Postfix::Member(name) => Syntax::Member(Box::new(acc), name),
        Postfix::Call(args) => Syntax::Call(Box::new(acc), args),
    }))
}

fn postfix_op(input: &mut &str) -> PResult<Postfix> {
    preceded(ws, alt((member_access, call_args))).parse_next(input)
}

fn member_access(input: &mut &str) -> PResult<Postfix> {
    preceded(('.', ws), ident_str)
        .map(Postfix::Member)
        .parse_next(input)
}

fn call_args(input: &mut &str) -> PResult<Postfix> {
    delimited('(', comma_list, (ws, ')'))
        .map(Postfix::Call)
        .parse_next(input)
}

/// Zero or more comma-separated expressions, trailing comma allowed.
fn comma_list(input: &mut &str) -> PResult<Vec<Syntax>> {
    preceded(
        ws,
        opt(terminated(
            separated(1.., expr, (ws, ',', ws)),
            opt((ws, ',')),
        )),
    )
    .map(|items| items.unwrap_or_default())
    .parse_next(input)
}

// ============ Primary expressions ============

fn primary(input: &mut &str) -> PResult<Syntax> {
    preceded(
        ws,
        alt((
            paren_expr,
            array_expr,
            new_array,
            new_object,
            capture,
            literal.map(Syntax::Literal),
            ident_or_keyword,
        )),
    )
    .parse_next(input)
}

fn paren_expr(input: &mut &str) -> PResult<Syntax> {
    delimited(('(', ws), expr, (ws, ')')).parse_next(input)
}

/// `[a, b, c]`
fn array_expr(input: &mut &str) -> PResult<Syntax> {
    delimited('[', comma_list, (ws, ']'))
        .map(Syntax::Array)
        .parse_next(input)
}

/// `new[] { a, b }`
fn new_array(input: &mut &str) -> PResult<Syntax> {
    preceded(
        ("new", ws, '[', ws, ']', ws),
        delimited('{', comma_list, (ws, '}')),
    )
    .map(Syntax::Array)
    .parse_next(input)
}

/// `new { Name = u.First, u.Age }`
fn new_object(input: &mut &str) -> PResult<Syntax> {
    preceded(
        ("new", ws),
        delimited(
            ('{', ws),
            opt(terminated(
                separated(1.., object_member, (ws, ',', ws)),
                opt((ws, ',')),
            ))
            .map(|members| members.unwrap_or_default()),
            (ws, '}'),
        ),
    )
    .map(Syntax::New)
    .parse_next(input)
}

fn object_member(input: &mut &str) -> PResult<(Option<String>, Syntax)> {
    alt((
        (
            ident_str,
            ws,
            terminated('=', not(one_of(['=', '>']))),
            ws,
            expr,
        )
            .map(|(name, _, _, _, e)| (Some(name), e)),
        expr.map(|e| (None, e)),
    ))
    .parse_next(input)
}

/// `@minAge`
fn capture(input: &mut &str) -> PResult<Syntax> {
    preceded('@', ident_str)
        .map(Syntax::Capture)
        .parse_next(input)
}

// ============ Identifiers ============

fn ident_or_keyword(input: &mut &str) -> PResult<Syntax> {
    ident_str
        .map(|name| match name.as_str() {
            "true" => Syntax::Literal(Scalar::Bool(true)),
            "false" => Syntax::Literal(Scalar::Bool(false)),
            "null" => Syntax::Literal(Scalar::Null),
            _ => Syntax::Ident(name),
        })
        .parse_next(input)
}

fn ident_str(input: &mut &str) -> PResult<String> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .map(str::to_string)
        .parse_next(input)
}

// ============ Literals ============

fn literal(input: &mut &str) -> PResult<Scalar> {
    alt((float_lit, int_lit, string_lit)).parse_next(input)
}

fn int_lit(input: &mut &str) -> PResult<Scalar> {
    terminated(digit1, opt(one_of(['L', 'l'])))
        .try_map(|s: &str| s.parse::<i64>())
        .map(Scalar::Int)
        .parse_next(input)
}

fn float_lit(input: &mut &str) -> PResult<Scalar> {
    terminated(
        (digit1, '.', digit1).take(),
        opt(one_of(['m', 'M', 'd', 'D', 'f', 'F'])),
    )
    .try_map(|s: &str| s.parse::<f64>())
    .map(Scalar::Float)
    .parse_next(input)
}

fn string_lit(input: &mut &str) -> PResult<Scalar> {
    alt((
        delimited('"', string_contents('"'), '"'),
        delimited('\'', string_contents('\''), '\''),
    ))
    .map(Scalar::Text)
    .parse_next(input)
}

fn string_contents<'a>(quote: char) -> impl FnMut(&mut &'a str) -> PResult<String> {
    move |input: &mut &'a str| {
        let text: &'a str = input;
        let mut result = String::new();
        let mut chars = text.char_indices();
        let end = loop {
            let Some((idx, c)) = chars.next() else {
                return Err(winnow::error::ErrMode::Backtrack(
                    winnow::error::ContextError::new(),
                ));
            };
            if c == quote {
                break idx;
            }
            if c != '\\' {
                result.push(c);
                continue;
            }
            let Some((_, escaped)) = chars.next() else {
                return Err(winnow::error::ErrMode::Backtrack(
                    winnow::error::ContextError::new(),
                ));
            };
            result.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                other => other,
            });
        };
        *input = &text[end..];
        Ok(result)
    }
}

// ============ Whitespace ============

fn ws(input: &mut &str) -> PResult<()> {
    multispace0.void().parse_next(input)
}

// ============ Resolution ============

struct ResolveError {
    message: String,
    /// Text to point the error at
    near: Option<String>,
}

impl ResolveError {
    fn new(message: impl Into<String>, near: Option<&str>) -> Self {
        Self {
            message: message.into(),
            near: near.map(str::to_string),
        }
    }

    fn into_parse_error(self, input: &str) -> ParseError {
        let offset = self
            .near
            .as_deref()
            .and_then(|n| input.find(n))
            .unwrap_or(0);
        build_parse_error(self.message, input, offset)
    }
}

struct Resolver<'e> {
    env: &'e ParseEnv,
    params: Vec<String>,
}

impl<'e> Resolver<'e> {
    fn new(env: &'e ParseEnv) -> Self {
        Self {
            env,
            params: Vec::new(),
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name) || self.env.sources.contains_key(name)
    }

    /// An unbound identifier names a type, optionally qualified by a
    /// `System` namespace path.
    fn type_name(&self, syntax: &Syntax) -> Option<String> {
        match syntax {
            Syntax::Ident(name) if !self.is_bound(name) => Some(name.clone()),
            Syntax::Member(target, member) if self.is_namespace(target) => Some(member.clone()),
            _ => None,
        }
    }

    fn is_namespace(&self, syntax: &Syntax) -> bool {
        match syntax {
            Syntax::Ident(name) => name == "System" && !self.is_bound(name),
            Syntax::Member(target, _) => self.is_namespace(target),
            _ => false,
        }
    }

    fn lambda(&mut self, params: Vec<String>, body: Syntax) -> Result<HostLambda, ResolveError> {
        let depth = self.params.len();
        self.params.extend(params.iter().cloned());
        let body = self.resolve(body);
        self.params.truncate(depth);
        Ok(HostLambda {
            params,
            body: Box::new(body?),
        })
    }

    fn resolve_all(&mut self, items: Vec<Syntax>) -> Result<Vec<HostExpr>, ResolveError> {
        items.into_iter().map(|s| self.resolve(s)).collect()
    }

    fn resolve(&mut self, syntax: Syntax) -> Result<HostExpr, ResolveError> {
        match syntax {
            Syntax::Ident(name) => {
                if self.params.iter().any(|p| *p == name) {
                    Ok(HostExpr::Parameter(name))
                } else if let Some(entity) = self.env.sources.get(&name) {
                    Ok(HostExpr::Source {
                        name,
                        entity: entity.clone(),
                    })
                } else {
                    Err(ResolveError::new(
                        format!("unknown identifier `{name}`"),
                        Some(&name),
                    ))
                }
            }
            Syntax::Literal(s) => Ok(HostExpr::Constant(HostValue::Scalar(s))),
            Syntax::Capture(name) => match self.env.captures.get(&name) {
                Some(v) => Ok(HostExpr::Constant(v.clone())),
                None => Err(ResolveError::new(
                    format!("no captured value named `{name}`"),
                    Some(&format!("@{name}")),
                )),
            },
            Syntax::Member(target, member) => match self.type_name(&target) {
                Some(type_name) => Ok(HostExpr::StaticMember { type_name, member }),
                None => Ok(HostExpr::Member {
                    target: Box::new(self.resolve(*target)?),
                    member,
                }),
            },
            Syntax::Call(callee, args) => {
                let Syntax::Member(target, method) = *callee else {
                    return Err(ResolveError::new("only methods can be called", None));
                };
                let args = self.resolve_all(args)?;
                match self.type_name(&target) {
                    Some(type_name) => Ok(HostExpr::StaticCall {
                        type_name,
                        method,
                        args,
                    }),
                    None => Ok(HostExpr::Call {
                        target: Box::new(self.resolve(*target)?),
                        method,
                        args,
                    }),
                }
            }
            Syntax::Binary(op, l, r) => Ok(HostExpr::Binary(
                op,
                Box::new(self.resolve(*l)?),
                Box::new(self.resolve(*r)?),
            )),
            Syntax::Unary(op, e) => Ok(HostExpr::Unary(op, Box::new(self.resolve(*e)?))),
            Syntax::Array(items) => Ok(HostExpr::Array(self.resolve_all(items)?)),
            Syntax::New(members) => {
                let mut fields = Vec::with_capacity(members.len());
                for (name, value) in members {
                    let name = match (name, &value) {
                        (Some(n), _) => n,
                        (None, Syntax::Member(_, m)) => m.clone(),
                        (None, Syntax::Ident(i)) => i.clone(),
                        (None, _) => {
                            return Err(ResolveError::new(
                                "anonymous object member needs a name",
                                Some("new"),
                            ));
                        }
                    };
                    fields.push((name, self.resolve(value)?));
                }
                Ok(HostExpr::New(fields))
            }
            Syntax::Lambda(params, body) => self.lambda(params, *body).map(HostExpr::Lambda),
        }
    }
}

// ============ Sanity Tests ============
// End-to-end parsing through conversion lives in tests/integration.rs

#[cfg(test)]
mod tests {
    use super::*;

    fn lambda(text: &str) -> HostLambda {
        parse_lambda(text, &ParseEnv::new()).unwrap()
    }

    fn u() -> HostExpr {
        HostExpr::param("u")
    }

    #[test]
    fn parse_literals() {
        assert_eq!(parse_syntax("123").unwrap(), Syntax::Literal(Scalar::Int(123)));
        assert_eq!(parse_syntax("-7").unwrap(), Syntax::Literal(Scalar::Int(-7)));
        assert!(matches!(
            parse_syntax("3.14").unwrap(),
            Syntax::Literal(Scalar::Float(_))
        ));
        assert_eq!(
            parse_syntax("true").unwrap(),
            Syntax::Literal(Scalar::Bool(true))
        );
        assert_eq!(parse_syntax("null").unwrap(), Syntax::Literal(Scalar::Null));
        assert_eq!(
            parse_syntax(r#""a\"b""#).unwrap(),
            Syntax::Literal(Scalar::Text("a\"b".into()))
        );
        assert_eq!(
            parse_syntax("'x'").unwrap(),
            Syntax::Literal(Scalar::Text("x".into()))
        );
    }

    #[test]
    fn parse_operator_precedence() {
        // a * b + c parses as (a * b) + c
        let l = lambda("u => u.A * u.B + u.C");
        match *l.body {
            HostExpr::Binary(HostBinaryOp::Add, left, _) => {
                assert!(matches!(*left, HostExpr::Binary(HostBinaryOp::Multiply, _, _)));
            }
            other => panic!("expected Add at top level, got {other:?}"),
        }

        // a && b || c parses as (a && b) || c
        let l = lambda("u => u.A && u.B || u.C");
        assert!(matches!(
            *l.body,
            HostExpr::Binary(HostBinaryOp::OrElse, _, _)
        ));
    }

    #[test]
    fn parse_predicate_lambda() {
        let l = lambda(r#"u => u.Age > 18 && u.Name.StartsWith("A")"#);
        assert_eq!(l.params, vec!["u".to_string()]);
        let expected = u()
            .member("Age")
            .binop(HostBinaryOp::GreaterThan, HostExpr::constant(18i64))
            .binop(
                HostBinaryOp::AndAlso,
                u().member("Name")
                    .call("StartsWith", vec![HostExpr::constant("A")]),
            );
        assert_eq!(*l.body, expected);
    }

    #[test]
    fn captures_become_constants() {
        let env = ParseEnv::new().with_capture("min", 21);
        let l = parse_lambda("u => u.Age >= @min", &env).unwrap();
        assert_eq!(
            *l.body,
            u().member("Age")
                .binop(HostBinaryOp::GreaterThanOrEqual, HostExpr::constant(21))
        );

        let err = parse_lambda("u => u.Age >= @max", &env).unwrap_err();
        assert!(err.message.contains("max"));
        assert_eq!(err.offset, 14);
    }

    #[test]
    fn type_names_become_static_access() {
        let l = lambda("u => u.Created < DateTime.Now && Math.Abs(u.Delta) > 1");
        let HostExpr::Binary(_, left, right) = *l.body else {
            panic!("expected binary");
        };
        assert!(matches!(
            *left,
            HostExpr::Binary(_, _, ref now)
                if matches!(now.as_ref(), HostExpr::StaticMember { type_name, member }
                    if type_name == "DateTime" && member == "Now")
        ));
        assert!(matches!(
            *right,
            HostExpr::Binary(_, ref abs, _)
                if matches!(abs.as_ref(), HostExpr::StaticCall { type_name, method, .. }
                    if type_name == "Math" && method == "Abs")
        ));

        let l = lambda("u => System.String.IsNullOrEmpty(u.Name)");
        assert!(matches!(
            *l.body,
            HostExpr::StaticCall { ref type_name, .. } if type_name == "String"
        ));
    }

    #[test]
    fn anonymous_objects_and_arrays() {
        let l = lambda("g => new { Dept = g.Key, Total = g.Count(), g.Key.Year }");
        let HostExpr::New(fields) = *l.body else {
            panic!("expected new");
        };
        let names: Vec<_> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["Dept", "Total", "Year"]);

        let l = lambda("u => new[] { 1, 2, 3 }.Contains(u.Id)");
        assert!(matches!(
            *l.body,
            HostExpr::Call { ref target, .. } if matches!(target.as_ref(), HostExpr::Array(items) if items.len() == 3)
        ));
        let l = lambda("u => [1, 2].Contains(u.Id)");
        assert!(matches!(*l.body, HostExpr::Call { .. }));
    }

    #[test]
    fn nested_lambdas_see_outer_parameters() {
        let l = lambda("u => Foreign.Exists(u.DeptId, d => d.Name == u.Name)");
        let HostExpr::StaticCall { args, .. } = *l.body else {
            panic!("expected static call");
        };
        let HostExpr::Lambda(inner) = &args[1] else {
            panic!("expected nested lambda");
        };
        assert_eq!(inner.root(), Some("d"));
        assert!(matches!(
            inner.body.as_ref(),
            HostExpr::Binary(_, _, r) if **r == u().member("Name")
        ));
    }

    #[test]
    fn parse_fluent_query() {
        let env = ParseEnv::new().with_source("users", "User");
        let q = parse_query(
            "users.Where(u => u.Age > 18)\n     .OrderBy(u => u.Name)\n     .Take(20)",
            &env,
        )
        .unwrap();
        let HostExpr::Call { method, target, .. } = q else {
            panic!("expected call");
        };
        assert_eq!(method, "Take");
        assert!(query_root(&target).is_some());

        assert!(parse_query("u => u.Age", &env).is_err());
    }

    #[test]
    fn errors_carry_positions() {
        let err = parse_lambda("u => u.Age >", &ParseEnv::new()).unwrap_err();
        assert_eq!(err.line, 1);

        let err = parse_lambda("u => u.Age\n  )", &ParseEnv::new()).unwrap_err();
        assert_eq!(err.message, "unexpected trailing input");
        assert_eq!((err.line, err.column), (2, 3));

        let err = parse_lambda("u.Age > 1", &ParseEnv::new()).unwrap_err();
        assert_eq!(err.message, "expected a lambda");
    }

    #[test]
    fn coalesce_groups_right() {
        let l = lambda("u => u.A ?? u.B ?? 0");
        let HostExpr::Binary(HostBinaryOp::Coalesce, _, right) = *l.body else {
            panic!("expected coalesce");
        };
        assert!(matches!(
            *right,
            HostExpr::Binary(HostBinaryOp::Coalesce, _, _)
        ));
    }
}
