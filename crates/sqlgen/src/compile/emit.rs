//! Expression emission
//!
//! An [`Emitter`] compiles expression nodes against the table in scope,
//! collecting bound parameters in emission order. Foreign conditions push a
//! nested, aliased scope for the duration of their sub-query.

use super::{CompileError, Result, SqlGen};
use crate::ast::{BinaryOp, Expr, Scalar, SetKind, UnaryOp, ValueData};
use crate::dialect::SqlDialect;
use crate::meta::{ColumnMeta, DbType, TableMeta};

struct Frame<'g> {
    table: &'g TableMeta,
    alias: Option<String>,
}

pub(crate) struct Emitter<'g> {
    generator: &'g SqlGen,
    root: Frame<'g>,
    nested: Vec<Frame<'g>>,
    params: Vec<(String, Scalar)>,
    next_alias: usize,
}

impl<'g> Emitter<'g> {
    pub(crate) fn new(generator: &'g SqlGen, table: &'g TableMeta) -> Self {
        Self {
            generator,
            root: Frame { table, alias: None },
            nested: Vec::new(),
            params: Vec::new(),
            next_alias: 1,
        }
    }

    pub(crate) fn dialect(&self) -> &'g dyn SqlDialect {
        let generator: &'g SqlGen = self.generator;
        generator.dialect.as_ref()
    }

    pub(crate) fn into_params(self) -> Vec<(String, Scalar)> {
        self.params
    }

    fn frame(&self) -> &Frame<'g> {
        self.nested.last().unwrap_or(&self.root)
    }

    /// Table currently in scope.
    pub(crate) fn table(&self) -> &'g TableMeta {
        self.frame().table
    }

    pub(crate) fn column(&self, property: &str) -> Result<&'g ColumnMeta> {
        self.resolve(self.table(), property)
    }

    fn resolve(&self, table: &'g TableMeta, property: &str) -> Result<&'g ColumnMeta> {
        let generator: &'g SqlGen = self.generator;
        generator
            .catalog
            .resolve_column(&table.entity, property)
            .ok_or_else(|| CompileError::UnknownProperty {
                property: property.to_string(),
                table: table.entity.clone(),
            })
    }

    /// Column reference in the current scope. Computed columns are emitted
    /// as their expression; inside a nested frame its bare names bind to
    /// the innermost table, which is the frame's own.
    pub(crate) fn column_ref(&self, column: &ColumnMeta) -> String {
        if let Some(sql) = &column.expression {
            return sql.clone();
        }
        let name = self.dialect().quote_name(&column.column);
        match &self.frame().alias {
            Some(alias) => format!("{alias}.{name}"),
            None => name,
        }
    }

    /// Always-qualified reference, for correlating a sub-query with its
    /// outer table. Computed SQL cannot be qualified.
    fn qualified_ref(&self, frame: &Frame<'g>, column: &ColumnMeta) -> Result<String> {
        if column.expression.is_some() {
            return Err(CompileError::Unsupported(format!(
                "computed column `{}` of `{}` in a foreign key",
                column.property, frame.table.entity
            )));
        }
        let d = self.dialect();
        let qualifier = match &frame.alias {
            Some(alias) => alias.clone(),
            None => d.table_name(frame.table),
        };
        Ok(format!("{qualifier}.{}", d.quote_name(&column.column)))
    }

    /// Bind a parameter and return its placeholder.
    pub(crate) fn bind(&mut self, value: &Scalar, column: Option<&DbType>) -> String {
        let d = self.dialect();
        let name = d.param_name(self.params.len());
        let placeholder = d.to_placeholder(&name);
        self.params.push((name, d.to_db_value(value, column)));
        placeholder
    }

    /// Column type of a property operand, used to convert the value on the
    /// other side of a comparison.
    fn column_type(&self, expr: &Expr) -> Option<&'g DbType> {
        match expr.resolved() {
            Expr::Property(p) => self.column(p).ok().map(|c| &c.db_type),
            _ => None,
        }
    }

    pub(crate) fn expr(&mut self, expr: &Expr) -> Result<String> {
        self.typed(expr, None)
    }

    /// Compile a value destined for `column` (SET clauses, inserts).
    pub(crate) fn expr_for(&mut self, expr: &Expr, column: &'g ColumnMeta) -> Result<String> {
        self.typed(expr, Some(&column.db_type))
    }

    fn typed(&mut self, expr: &Expr, hint: Option<&'g DbType>) -> Result<String> {
        let d = self.dialect();
        let sql = match expr {
            Expr::Value {
                value: ValueData::Scalar(s),
                literal,
            } => self.scalar(s, *literal, hint),
            Expr::Value {
                value: ValueData::List(items),
                ..
            } => {
                let parts = items
                    .iter()
                    .map(|item| self.typed(item, hint))
                    .collect::<Result<Vec<_>>>()?;
                format!("({})", parts.join(", "))
            }
            Expr::Property(p) => {
                let column = self.column(p)?;
                self.column_ref(column)
            }
            Expr::Unary(op, operand) => {
                let inner = self.expr(operand)?;
                match op {
                    UnaryOp::Not => format!("NOT ({inner})"),
                    UnaryOp::Negate => format!("-({inner})"),
                    UnaryOp::BitwiseNot => format!("~({inner})"),
                }
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right)?,
            Expr::Function { name, args } => {
                let args = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>>>()?;
                self.generator.functions.render(d, name, &args)
            }
            Expr::Set { kind, items } => self.set(*kind, items, hint)?,
            Expr::Lambda(lambda) => {
                let node = lambda.converted()?;
                self.typed(node, hint)?
            }
            Expr::Foreign {
                property,
                condition,
            } => self.foreign(property, condition)?,
            Expr::Generic { key, arg } => {
                let handler = self
                    .generator
                    .generics
                    .lookup(key)
                    .ok_or_else(|| CompileError::UnknownGeneric(key.clone()))?;
                let arg = self.expr(arg)?;
                handler(&arg, d)
            }
            Expr::Raw(sql) => sql.clone(),
        };
        Ok(sql)
    }

    fn scalar(&mut self, value: &Scalar, literal: bool, hint: Option<&DbType>) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        if literal {
            let d = self.dialect();
            return d.literal_sql(&d.to_db_value(value, hint));
        }
        self.bind(value, hint)
    }

    fn set(&mut self, kind: SetKind, items: &[Expr], hint: Option<&'g DbType>) -> Result<String> {
        let d = self.dialect();
        match kind {
            SetKind::And | SetKind::Or => {
                let (joiner, empty) = match kind {
                    SetKind::And => (" AND ", d.true_predicate()),
                    _ => (" OR ", d.false_predicate()),
                };
                let mut parts = items
                    .iter()
                    .map(|item| self.expr(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(match parts.len() {
                    0 => empty.to_string(),
                    1 => parts.remove(0),
                    _ => format!("({})", parts.join(joiner)),
                })
            }
            SetKind::List => {
                let parts = items
                    .iter()
                    .map(|item| self.typed(item, hint))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({})", parts.join(", ")))
            }
            SetKind::Concat => {
                let parts = items
                    .iter()
                    .map(|item| self.expr(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(d.concat(&parts))
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<String> {
        let d = self.dialect();
        let (left, right) = (left.resolved(), right.resolved());
        let base = op.positive();
        let not = if op.is_not() { "NOT " } else { "" };

        if base == BinaryOp::EQUAL && (left.is_null_value() || right.is_null_value()) {
            let subject = if right.is_null_value() { left } else { right };
            let subject = self.expr(subject)?;
            return Ok(format!("{subject} IS {not}NULL"));
        }
        if op.is_pattern() {
            return self.pattern(base, not, left, right);
        }

        let left_hint = self.column_type(right);
        let right_hint = self.column_type(left);

        if base == BinaryOp::IN {
            if is_empty_list(right) {
                let constant = if op.is_not() {
                    d.true_predicate()
                } else {
                    d.false_predicate()
                };
                return Ok(constant.to_string());
            }
            let subject = self.typed(left, left_hint)?;
            let list = self.typed(right, right_hint)?;
            let list = if list.starts_with('(') {
                list
            } else {
                format!("({list})")
            };
            return Ok(format!("{subject} {not}IN {list}"));
        }

        let l = self.typed(left, left_hint)?;
        let r = self.typed(right, right_hint)?;
        let sql = match base {
            BinaryOp::EQUAL if op.is_not() => format!("{l} <> {r}"),
            BinaryOp::EQUAL => format!("{l} = {r}"),
            BinaryOp::GREATER_THAN if op.is_not() => format!("{l} <= {r}"),
            BinaryOp::GREATER_THAN => format!("{l} > {r}"),
            BinaryOp::LESS_THAN if op.is_not() => format!("{l} >= {r}"),
            BinaryOp::LESS_THAN => format!("{l} < {r}"),
            BinaryOp::LIKE => format!("{l} {not}LIKE {r}"),
            BinaryOp::REGEXP_LIKE if op.is_not() => format!("NOT ({})", d.regexp_like(&l, &r)),
            BinaryOp::REGEXP_LIKE => d.regexp_like(&l, &r),
            BinaryOp::ADD => format!("({l} + {r})"),
            BinaryOp::SUBTRACT => format!("({l} - {r})"),
            BinaryOp::MULTIPLY => format!("({l} * {r})"),
            BinaryOp::DIVIDE => format!("({l} / {r})"),
            BinaryOp::MODULO => d.modulo(&l, &r),
            BinaryOp::CONCAT => d.concat(&[l, r]),
            other => {
                return Err(CompileError::Unsupported(format!(
                    "binary operator {other:?}"
                )));
            }
        };
        Ok(sql)
    }

    /// StartsWith / EndsWith / Contains as an escaped `LIKE`.
    fn pattern(&mut self, base: BinaryOp, not: &str, left: &Expr, right: &Expr) -> Result<String> {
        let d = self.dialect();
        let subject = self.expr(left)?;
        let escape = d.like_escape_clause();

        if let Some(Scalar::Text(text)) = right.as_scalar() {
            let escaped = d.escape_like(text);
            let pattern = match base {
                BinaryOp::STARTS_WITH => format!("{escaped}%"),
                BinaryOp::ENDS_WITH => format!("%{escaped}"),
                _ => format!("%{escaped}%"),
            };
            let placeholder = self.bind(&Scalar::Text(pattern), None);
            return Ok(format!("{subject} {not}LIKE {placeholder} {escape}"));
        }

        let esc = d.like_escape().to_string();
        let mut escaped = format!(
            "REPLACE({}, {}, {})",
            self.expr(right)?,
            d.string_literal(&esc),
            d.string_literal(&format!("{esc}{esc}"))
        );
        for wildcard in d.like_wildcards() {
            escaped = format!(
                "REPLACE({escaped}, {}, {})",
                d.string_literal(&wildcard.to_string()),
                d.string_literal(&format!("{esc}{wildcard}"))
            );
        }
        let any = d.string_literal("%");
        let parts = match base {
            BinaryOp::STARTS_WITH => vec![escaped, any],
            BinaryOp::ENDS_WITH => vec![any, escaped],
            _ => vec![any.clone(), escaped, any],
        };
        Ok(format!("{subject} {not}LIKE {} {escape}", d.concat(&parts)))
    }

    /// `EXISTS` over the table a foreign key points at, correlated on the key.
    fn foreign(&mut self, property: &str, condition: &Expr) -> Result<String> {
        let d = self.dialect();
        let outer = self.column(property)?;
        let fk = outer
            .foreign
            .as_ref()
            .ok_or_else(|| CompileError::NotAForeignKey {
                property: property.to_string(),
                table: self.table().entity.clone(),
            })?;
        let generator: &'g SqlGen = self.generator;
        let target = generator.table(&fk.entity)?;
        let key = self.resolve(target, &fk.property)?;

        // the outer side must be qualified or it would bind to the inner table
        let outer_ref = self.qualified_ref(self.frame(), outer)?;

        let alias = format!("T{}", self.next_alias);
        self.next_alias += 1;
        let frame = Frame {
            table: target,
            alias: Some(alias.clone()),
        };
        let key_ref = self.qualified_ref(&frame, key)?;
        self.nested.push(frame);
        let inner = self.expr(condition);
        self.nested.pop();
        let inner = inner?;

        Ok(format!(
            "EXISTS (SELECT 1 FROM {} {alias} WHERE {key_ref} = {outer_ref} AND {inner})",
            d.table_name(target),
        ))
    }
}

fn is_empty_list(expr: &Expr) -> bool {
    match expr {
        Expr::Value {
            value: ValueData::List(items),
            ..
        } => items.is_empty(),
        Expr::Set {
            kind: SetKind::List,
            items,
        } => items.is_empty(),
        _ => false,
    }
}
