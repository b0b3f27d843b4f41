//! Query pipeline segments
//!
//! A query is a chain of segments rooted at a `Table`. Builder methods take
//! the current segment by value and return the extended chain, enforcing
//! which segment may follow which:
//!
//! - `where_` on a `Where` merges with AND; on a grouped source it becomes
//!   `Having`; on an `OrderBy` it is pushed beneath the ordering
//! - `then_by` appends to an existing `OrderBy`; `order_by` on one replaces it
//! - `skip`/`take` on a `Section` compose with it
//! - `update`/`delete` only follow `Table` or `Where`

pub mod wire;

use std::fmt;

use thiserror::Error;

use crate::ast::Expr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderItem {
    pub expr: Expr,
    pub asc: bool,
}

impl OrderItem {
    pub fn asc(expr: Expr) -> Self {
        Self { expr, asc: true }
    }

    pub fn desc(expr: Expr) -> Self {
        Self { expr, asc: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectItem {
    /// Output alias
    pub name: Option<String>,
    pub expr: Expr,
}

impl SelectItem {
    pub fn new(expr: Expr) -> Self {
        Self { name: None, expr }
    }

    pub fn named(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: Some(name.into()),
            expr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SetItem {
    pub property: String,
    pub value: Expr,
}

impl SetItem {
    pub fn new(property: impl Into<String>, value: impl Into<Expr>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Table {
        entity: String,
    },
    Where {
        source: Box<Segment>,
        condition: Expr,
    },
    GroupBy {
        source: Box<Segment>,
        keys: Vec<Expr>,
    },
    Having {
        source: Box<Segment>,
        condition: Expr,
    },
    OrderBy {
        source: Box<Segment>,
        orders: Vec<OrderItem>,
    },
    /// Skip `skip` rows then take at most `take`
    Section {
        source: Box<Segment>,
        skip: u64,
        take: Option<u64>,
    },
    Select {
        source: Box<Segment>,
        items: Vec<SelectItem>,
    },
    Update {
        source: Box<Segment>,
        sets: Vec<SetItem>,
    },
    Delete {
        source: Box<Segment>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Table,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Section,
    Select,
    Update,
    Delete,
}

impl SegmentKind {
    pub fn name(self) -> &'static str {
        match self {
            SegmentKind::Table => "Table",
            SegmentKind::Where => "Where",
            SegmentKind::GroupBy => "GroupBy",
            SegmentKind::Having => "Having",
            SegmentKind::OrderBy => "OrderBy",
            SegmentKind::Section => "Section",
            SegmentKind::Select => "Select",
            SegmentKind::Update => "Update",
            SegmentKind::Delete => "Delete",
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("{op} cannot follow {after}")]
    Illegal { op: &'static str, after: SegmentKind },

    #[error("then_by requires an ordered source, got {0}")]
    ThenByWithoutOrderBy(SegmentKind),

    #[error("{0} requires at least one item")]
    Empty(&'static str),
}

fn illegal(op: &'static str, after: &Segment) -> PipelineError {
    PipelineError::Illegal {
        op,
        after: after.kind(),
    }
}

impl Segment {
    pub fn table(entity: impl Into<String>) -> Self {
        Segment::Table {
            entity: entity.into(),
        }
    }

    pub fn kind(&self) -> SegmentKind {
        match self {
            Segment::Table { .. } => SegmentKind::Table,
            Segment::Where { .. } => SegmentKind::Where,
            Segment::GroupBy { .. } => SegmentKind::GroupBy,
            Segment::Having { .. } => SegmentKind::Having,
            Segment::OrderBy { .. } => SegmentKind::OrderBy,
            Segment::Section { .. } => SegmentKind::Section,
            Segment::Select { .. } => SegmentKind::Select,
            Segment::Update { .. } => SegmentKind::Update,
            Segment::Delete { .. } => SegmentKind::Delete,
        }
    }

    pub fn source(&self) -> Option<&Segment> {
        match self {
            Segment::Table { .. } => None,
            Segment::Where { source, .. }
            | Segment::GroupBy { source, .. }
            | Segment::Having { source, .. }
            | Segment::OrderBy { source, .. }
            | Segment::Section { source, .. }
            | Segment::Select { source, .. }
            | Segment::Update { source, .. }
            | Segment::Delete { source } => Some(source),
        }
    }

    /// Entity name of the chain's root table.
    pub fn entity(&self) -> &str {
        let mut seg = self;
        while let Some(inner) = seg.source() {
            seg = inner;
        }
        match seg {
            Segment::Table { entity } => entity,
            _ => "",
        }
    }

    /// Whether a `GroupBy` appears anywhere below this segment.
    pub fn is_grouped(&self) -> bool {
        let mut seg = Some(self);
        while let Some(s) = seg {
            if s.kind() == SegmentKind::GroupBy {
                return true;
            }
            seg = s.source();
        }
        false
    }

    /// Filter. Merges into an existing `Where`, becomes `Having` on a
    /// grouped source and is pushed beneath an `OrderBy`.
    pub fn where_(self, condition: Expr) -> Result<Segment, PipelineError> {
        match self {
            Segment::Table { .. } => Ok(Segment::Where {
                source: Box::new(self),
                condition,
            }),
            Segment::Where {
                source,
                condition: existing,
            } => Ok(Segment::Where {
                source,
                condition: existing.and(condition),
            }),
            Segment::GroupBy { .. } | Segment::Having { .. } => self.having(condition),
            Segment::OrderBy { source, orders } => Ok(Segment::OrderBy {
                source: Box::new(source.where_(condition)?),
                orders,
            }),
            other => Err(illegal("Where", &other)),
        }
    }

    pub fn group_by(self, keys: Vec<Expr>) -> Result<Segment, PipelineError> {
        if keys.is_empty() {
            return Err(PipelineError::Empty("GroupBy"));
        }
        match self {
            Segment::Table { .. } | Segment::Where { .. } => Ok(Segment::GroupBy {
                source: Box::new(self),
                keys,
            }),
            other => Err(illegal("GroupBy", &other)),
        }
    }

    /// Filter on groups; merges into an existing `Having`.
    pub fn having(self, condition: Expr) -> Result<Segment, PipelineError> {
        match self {
            Segment::GroupBy { .. } => Ok(Segment::Having {
                source: Box::new(self),
                condition,
            }),
            Segment::Having {
                source,
                condition: existing,
            } => Ok(Segment::Having {
                source,
                condition: existing.and(condition),
            }),
            other => Err(illegal("Having", &other)),
        }
    }

    /// Start a new ordering; replaces an existing `OrderBy`.
    pub fn order_by(self, expr: Expr, asc: bool) -> Result<Segment, PipelineError> {
        let item = OrderItem { expr, asc };
        match self {
            Segment::OrderBy { source, .. } => Ok(Segment::OrderBy {
                source,
                orders: vec![item],
            }),
            Segment::Table { .. }
            | Segment::Where { .. }
            | Segment::GroupBy { .. }
            | Segment::Having { .. } => Ok(Segment::OrderBy {
                source: Box::new(self),
                orders: vec![item],
            }),
            other => Err(illegal("OrderBy", &other)),
        }
    }

    /// Add a secondary ordering to an existing `OrderBy`.
    pub fn then_by(self, expr: Expr, asc: bool) -> Result<Segment, PipelineError> {
        match self {
            Segment::OrderBy { source, mut orders } => {
                orders.push(OrderItem { expr, asc });
                Ok(Segment::OrderBy { source, orders })
            }
            other => Err(PipelineError::ThenByWithoutOrderBy(other.kind())),
        }
    }

    pub fn order_by_desc(self, expr: Expr) -> Result<Segment, PipelineError> {
        self.order_by(expr, false)
    }

    pub fn then_by_desc(self, expr: Expr) -> Result<Segment, PipelineError> {
        self.then_by(expr, false)
    }

    /// Skip `n` rows. On a `Section` this skips further into it and shrinks
    /// what remains to take.
    pub fn skip(self, n: u64) -> Result<Segment, PipelineError> {
        match self {
            Segment::Section { source, skip, take } => Ok(Segment::Section {
                source,
                skip: skip.saturating_add(n),
                take: take.map(|t| t.saturating_sub(n)),
            }),
            Segment::Select { .. } | Segment::Update { .. } | Segment::Delete { .. } => {
                Err(illegal("Skip", &self))
            }
            other => Ok(Segment::Section {
                source: Box::new(other),
                skip: n,
                take: None,
            }),
        }
    }

    /// Take at most `n` rows. On a `Section` the smaller limit wins.
    pub fn take(self, n: u64) -> Result<Segment, PipelineError> {
        match self {
            Segment::Section { source, skip, take } => Ok(Segment::Section {
                source,
                skip,
                take: Some(take.map_or(n, |t| t.min(n))),
            }),
            Segment::Select { .. } | Segment::Update { .. } | Segment::Delete { .. } => {
                Err(illegal("Take", &self))
            }
            other => Ok(Segment::Section {
                source: Box::new(other),
                skip: 0,
                take: Some(n),
            }),
        }
    }

    pub fn section(self, skip: u64, take: Option<u64>) -> Result<Segment, PipelineError> {
        let seg = if skip > 0 { self.skip(skip)? } else { self };
        match take {
            Some(n) => seg.take(n),
            None if skip == 0 => seg.skip(0),
            None => Ok(seg),
        }
    }

    pub fn select(self, items: Vec<SelectItem>) -> Result<Segment, PipelineError> {
        if items.is_empty() {
            return Err(PipelineError::Empty("Select"));
        }
        match self {
            Segment::Select { .. } | Segment::Update { .. } | Segment::Delete { .. } => {
                Err(illegal("Select", &self))
            }
            other => Ok(Segment::Select {
                source: Box::new(other),
                items,
            }),
        }
    }

    pub fn update(self, sets: Vec<SetItem>) -> Result<Segment, PipelineError> {
        if sets.is_empty() {
            return Err(PipelineError::Empty("Update"));
        }
        match self {
            Segment::Table { .. } | Segment::Where { .. } => Ok(Segment::Update {
                source: Box::new(self),
                sets,
            }),
            other => Err(illegal("Update", &other)),
        }
    }

    pub fn delete(self) -> Result<Segment, PipelineError> {
        match self {
            Segment::Table { .. } | Segment::Where { .. } => Ok(Segment::Delete {
                source: Box::new(self),
            }),
            other => Err(illegal("Delete", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Segment {
        Segment::table("User")
    }

    #[test]
    fn where_merges_with_and() {
        let seg = users()
            .where_(Expr::prop("Age").gt(18))
            .unwrap()
            .where_(Expr::prop("Name").starts_with("A"))
            .unwrap();
        match seg {
            Segment::Where { source, condition } => {
                assert_eq!(source.kind(), SegmentKind::Table);
                assert_eq!(
                    condition,
                    Expr::prop("Age").gt(18) & Expr::prop("Name").starts_with("A")
                );
            }
            other => panic!("expected Where, got {other:?}"),
        }
    }

    #[test]
    fn where_on_group_becomes_having() {
        let seg = users()
            .group_by(vec![Expr::prop("Dept")])
            .unwrap()
            .where_(Expr::count().gt(5))
            .unwrap();
        assert_eq!(seg.kind(), SegmentKind::Having);
    }

    #[test]
    fn where_is_pushed_beneath_order_by() {
        let seg = users()
            .order_by(Expr::prop("Name"), true)
            .unwrap()
            .where_(Expr::prop("Age").gt(18))
            .unwrap();
        assert_eq!(seg.kind(), SegmentKind::OrderBy);
        assert_eq!(seg.source().unwrap().kind(), SegmentKind::Where);
    }

    #[test]
    fn then_by_requires_order_by() {
        let err = users().then_by(Expr::prop("Name"), true).unwrap_err();
        assert_eq!(err, PipelineError::ThenByWithoutOrderBy(SegmentKind::Table));

        let seg = users()
            .order_by(Expr::prop("Name"), true)
            .unwrap()
            .then_by(Expr::prop("Age"), false)
            .unwrap();
        if let Segment::OrderBy { orders, .. } = seg {
            assert_eq!(orders.len(), 2);
            assert!(!orders[1].asc);
        } else {
            panic!("expected OrderBy");
        }
    }

    #[test]
    fn order_by_replaces_previous_ordering() {
        let seg = users()
            .order_by(Expr::prop("Name"), true)
            .unwrap()
            .order_by_desc(Expr::prop("Age"))
            .unwrap()
            .then_by_desc(Expr::prop("Id"))
            .unwrap();
        if let Segment::OrderBy { orders, .. } = seg {
            assert_eq!(
                orders,
                vec![OrderItem::desc(Expr::prop("Age")), OrderItem::desc(Expr::prop("Id"))]
            );
        } else {
            panic!("expected OrderBy");
        }
    }

    #[test]
    fn section_merging() {
        let seg = users().skip(10).unwrap().take(20).unwrap().take(5).unwrap();
        assert!(matches!(
            seg,
            Segment::Section {
                skip: 10,
                take: Some(5),
                ..
            }
        ));

        // take 10 then skip 3 leaves rows 3..10
        let seg = users().take(10).unwrap().skip(3).unwrap();
        assert!(matches!(
            seg,
            Segment::Section {
                skip: 3,
                take: Some(7),
                ..
            }
        ));
    }

    #[test]
    fn update_and_delete_only_on_filters() {
        assert!(users().delete().is_ok());
        assert!(
            users()
                .where_(Expr::prop("Id").equal(1))
                .unwrap()
                .update(vec![SetItem::new("Name", "x")])
                .is_ok()
        );
        let err = users()
            .order_by(Expr::prop("Id"), true)
            .unwrap()
            .delete()
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::Illegal {
                op: "Delete",
                after: SegmentKind::OrderBy
            }
        );
    }

    #[test]
    fn where_after_section_is_rejected() {
        let err = users()
            .take(5)
            .unwrap()
            .where_(Expr::prop("Age").gt(1))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Illegal { op: "Where", .. }));
    }

    #[test]
    fn entity_walks_to_root() {
        let seg = users()
            .where_(Expr::prop("Age").gt(1))
            .unwrap()
            .take(3)
            .unwrap();
        assert_eq!(seg.entity(), "User");
        assert!(!seg.is_grouped());
    }
}
