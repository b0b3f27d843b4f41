//! Segment chains to `SELECT`, `UPDATE` and `DELETE`

use super::emit::Emitter;
use super::{CompileError, CompiledQuery, Result, SqlGen};
use crate::ast::Expr;
use crate::dialect::SelectParts;
use crate::pipeline::{OrderItem, Segment, SegmentKind, SelectItem, SetItem};

/// Clause slots of a flattened chain.
#[derive(Default)]
struct Slots<'s> {
    entity: &'s str,
    where_: Option<&'s Expr>,
    group_by: Option<&'s [Expr]>,
    having: Option<&'s Expr>,
    order_by: Option<&'s [OrderItem]>,
    section: Option<(u64, Option<u64>)>,
    select: Option<&'s [SelectItem]>,
}

enum Terminal<'s> {
    Select,
    Update(&'s [SetItem]),
    Delete,
}

/// Clause position. Along a well-formed chain it strictly increases from
/// the table outwards.
fn rank(kind: SegmentKind) -> u8 {
    match kind {
        SegmentKind::Table => 0,
        SegmentKind::Where => 1,
        SegmentKind::GroupBy => 2,
        SegmentKind::Having => 3,
        SegmentKind::OrderBy => 4,
        SegmentKind::Section => 5,
        SegmentKind::Select | SegmentKind::Update | SegmentKind::Delete => 6,
    }
}

fn invalid(message: impl Into<String>) -> CompileError {
    CompileError::InvalidPipeline(message.into())
}

/// Walk from the outermost segment to the table, filling one slot per
/// segment. Chains decoded from the wire may violate the builder rules, so
/// clause order is checked here as well.
fn flatten(segment: &Segment) -> Result<(Slots<'_>, Terminal<'_>)> {
    let mut slots = Slots::default();
    let mut terminal = Terminal::Select;
    let mut outer: Option<SegmentKind> = None;
    let mut seg = segment;
    loop {
        let kind = seg.kind();
        if let Some(outer) = outer
            && rank(kind) >= rank(outer)
        {
            return Err(invalid(format!("{outer} cannot follow {kind}")));
        }
        match seg {
            Segment::Table { entity } => {
                slots.entity = entity;
                break;
            }
            Segment::Where { condition, .. } => slots.where_ = Some(condition),
            Segment::GroupBy { keys, .. } => slots.group_by = Some(keys),
            Segment::Having { condition, .. } => slots.having = Some(condition),
            Segment::OrderBy { orders, .. } => slots.order_by = Some(orders),
            Segment::Section { skip, take, .. } => slots.section = Some((*skip, *take)),
            Segment::Select { items, .. } => slots.select = Some(items),
            Segment::Update { sets, .. } => terminal = Terminal::Update(sets),
            Segment::Delete { .. } => terminal = Terminal::Delete,
        }
        outer = Some(kind);
        match seg.source() {
            Some(inner) => seg = inner,
            None => return Err(invalid("chain has no table")),
        }
    }

    if slots.having.is_some() && slots.group_by.is_none() {
        return Err(invalid("Having requires GroupBy"));
    }
    if !matches!(terminal, Terminal::Select)
        && (slots.group_by.is_some() || slots.order_by.is_some() || slots.section.is_some())
    {
        return Err(invalid("Update and Delete apply to a filtered table only"));
    }
    Ok((slots, terminal))
}

pub(super) fn compile(generator: &SqlGen, segment: &Segment) -> Result<CompiledQuery> {
    let (slots, terminal) = flatten(segment)?;
    let table = generator.table(slots.entity)?;
    let mut emitter = Emitter::new(generator, table);
    let sql = match terminal {
        Terminal::Select => select(&mut emitter, &slots)?,
        Terminal::Update(sets) => update(&mut emitter, &slots, sets)?,
        Terminal::Delete => delete(&mut emitter, &slots)?,
    };
    Ok(CompiledQuery {
        sql,
        params: emitter.into_params(),
    })
}

fn expr_list(e: &mut Emitter<'_>, exprs: &[Expr]) -> Result<String> {
    Ok(exprs
        .iter()
        .map(|x| e.expr(x))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

fn order_list(e: &mut Emitter<'_>, orders: &[OrderItem]) -> Result<String> {
    Ok(orders
        .iter()
        .map(|o| Ok(format!("{} {}", e.expr(&o.expr)?, if o.asc { "ASC" } else { "DESC" })))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

/// Every mapped column, aliased to its property name where they differ.
fn all_columns(e: &Emitter<'_>) -> String {
    let d = e.dialect();
    let table = e.table();
    if table.columns.is_empty() {
        return "*".to_string();
    }
    table
        .columns
        .iter()
        .map(|c| {
            let sql = e.column_ref(c);
            if c.expression.is_some() || c.column != c.property {
                format!("{sql} AS {}", d.quote_name(&c.property))
            } else {
                sql
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn projection(e: &mut Emitter<'_>, items: &[SelectItem]) -> Result<String> {
    let d = e.dialect();
    Ok(items
        .iter()
        .map(|item| {
            let sql = e.expr(&item.expr)?;
            Ok(match &item.name {
                Some(name) if !names_column(e, &item.expr, name) => {
                    format!("{sql} AS {}", d.quote_name(name))
                }
                _ => sql,
            })
        })
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

/// Whether `expr` is a stored column already called `name`.
fn names_column(e: &Emitter<'_>, expr: &Expr, name: &str) -> bool {
    match expr.resolved() {
        Expr::Property(p) => e
            .column(p)
            .is_ok_and(|c| c.expression.is_none() && c.column == name),
        _ => false,
    }
}

/// Ordering used when rows are paged without an explicit one.
fn stable_order(e: &mut Emitter<'_>, slots: &Slots<'_>) -> Result<String> {
    if let Some(keys) = slots.group_by {
        let keys = keys
            .iter()
            .map(|k| Ok(format!("{} ASC", e.expr(k)?)))
            .collect::<Result<Vec<_>>>()?;
        return Ok(keys.join(", "));
    }
    let columns = e.table().stable_order();
    if columns.is_empty() {
        return Err(invalid(format!(
            "`{}` has no column to page by",
            e.table().entity
        )));
    }
    Ok(columns
        .iter()
        .map(|c| format!("{} ASC", e.column_ref(c)))
        .collect::<Vec<_>>()
        .join(", "))
}

fn select(e: &mut Emitter<'_>, slots: &Slots<'_>) -> Result<String> {
    let d = e.dialect();
    let columns = match (slots.select, slots.group_by) {
        (Some(items), _) => projection(e, items)?,
        (None, Some(keys)) => expr_list(e, keys)?,
        (None, None) => all_columns(e),
    };
    let mut parts = SelectParts {
        columns,
        from: d.table_name(e.table()),
        where_: slots.where_.map(|c| e.expr(c)).transpose()?,
        group_by: slots.group_by.map(|k| expr_list(e, k)).transpose()?,
        having: slots.having.map(|c| e.expr(c)).transpose()?,
        order_by: slots.order_by.map(|o| order_list(e, o)).transpose()?,
    };
    match slots.section {
        Some((skip, take)) if skip > 0 || take.is_some() => {
            if parts.order_by.is_none() {
                parts.order_by = Some(stable_order(e, slots)?);
            }
            Ok(d.paginate(&parts, skip, take))
        }
        _ => Ok(parts.render(None)),
    }
}

fn update(e: &mut Emitter<'_>, slots: &Slots<'_>, sets: &[SetItem]) -> Result<String> {
    let d = e.dialect();
    let table = e.table();
    let assignments = sets
        .iter()
        .map(|set| {
            let column = e.column(&set.property)?;
            if !column.is_writable() {
                return Err(CompileError::NotWritable {
                    property: set.property.clone(),
                    table: table.entity.clone(),
                });
            }
            let value = e.expr_for(&set.value, column)?;
            Ok(format!("{} = {value}", d.quote_name(&column.column)))
        })
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let mut sql = format!("UPDATE {} SET {assignments}", d.table_name(table));
    if let Some(condition) = slots.where_ {
        sql.push_str(" WHERE ");
        sql.push_str(&e.expr(condition)?);
    }
    Ok(sql)
}

fn delete(e: &mut Emitter<'_>, slots: &Slots<'_>) -> Result<String> {
    let mut sql = format!("DELETE FROM {}", e.dialect().table_name(e.table()));
    if let Some(condition) = slots.where_ {
        sql.push_str(" WHERE ");
        sql.push_str(&e.expr(condition)?);
    }
    Ok(sql)
}
