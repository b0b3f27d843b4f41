//! Fluent query chains to pipeline segments
//!
//! `users.Where(..).GroupBy(..).Select(..)` is walked from the source
//! outwards, each call becoming one builder step on [`Segment`]. After a
//! `GroupBy` the lambdas that follow are converted in a group scope.

use super::{
    ConvertError, Converter, GroupKeys, HostExpr, HostLambda, HostValue, Scope, as_predicate,
    evaluate,
};
use crate::ast::{Expr, Scalar};
use crate::pipeline::{Segment, SelectItem, SetItem};

type Built = (Segment, Option<GroupKeys>);

impl Converter {
    /// Convert a fluent query rooted at a [`HostExpr::Source`].
    pub fn convert_query(&self, query: &HostExpr) -> Result<Segment, ConvertError> {
        self.build(query).map(|(segment, _)| segment)
    }

    fn build(&self, expr: &HostExpr) -> Result<Built, ConvertError> {
        match expr {
            HostExpr::Source { entity, .. } => Ok((Segment::table(entity.clone()), None)),
            HostExpr::Call {
                target,
                method,
                args,
            } => {
                let (segment, group) = self.build(target)?;
                self.apply(segment, group, method, args)
            }
            _ => Err(ConvertError::CannotConvert(
                "query must start from a source".into(),
            )),
        }
    }

    fn apply(
        &self,
        segment: Segment,
        group: Option<GroupKeys>,
        method: &str,
        args: &[HostExpr],
    ) -> Result<Built, ConvertError> {
        log::trace!("query operator {method} on {}", segment.kind());
        let entity = segment.entity().to_string();
        let entity = entity.as_str();
        let segment = match method {
            "Where" => {
                let condition = self.body(lambda_arg(method, args, 0)?, entity, group.as_ref())?;
                segment.where_(as_predicate(condition))?
            }
            "OrderBy" | "OrderByDescending" => {
                let key = self.body(lambda_arg(method, args, 0)?, entity, group.as_ref())?;
                segment.order_by(key, method == "OrderBy")?
            }
            "ThenBy" | "ThenByDescending" => {
                let key = self.body(lambda_arg(method, args, 0)?, entity, group.as_ref())?;
                segment.then_by(key, method == "ThenBy")?
            }
            "Skip" => segment.skip(count_arg(method, args)?)?,
            "Take" => segment.take(count_arg(method, args)?)?,
            "First" | "FirstOrDefault" => self
                .filtered(segment, entity, group.as_ref(), args)?
                .take(1)?,
            "GroupBy" => {
                let keys = self.group_keys(lambda_arg(method, args, 0)?, entity)?;
                let exprs = keys.keys.iter().map(|(_, e)| e.clone()).collect();
                return Ok((segment.group_by(exprs)?, Some(keys)));
            }
            "Select" => {
                let lambda = lambda_arg(method, args, 0)?;
                match self.projection(lambda, entity, group.as_ref())? {
                    Some(items) => segment.select(items)?,
                    None => segment,
                }
            }
            "Count" | "LongCount" => self
                .filtered(segment, entity, group.as_ref(), args)?
                .select(vec![SelectItem::named("Count", Expr::count())])?,
            "Update" => {
                let lambda = lambda_arg(method, args, 0)?;
                let root = lambda.root().ok_or(ConvertError::NoParameter)?;
                let HostExpr::New(fields) = lambda.body.as_ref() else {
                    return Err(ConvertError::Argument {
                        method: method.into(),
                        message: "expected `x => new { Prop = value, .. }`".into(),
                    });
                };
                let scope = Scope::new(self, root).for_entity(entity);
                let sets = fields
                    .iter()
                    .map(|(name, value)| Ok(SetItem::new(name.clone(), scope.convert(value)?)))
                    .collect::<Result<Vec<_>, ConvertError>>()?;
                segment.update(sets)?
            }
            "Delete" => self.filtered(segment, entity, group.as_ref(), args)?.delete()?,
            other => return Err(ConvertError::UnsupportedOperator(other.to_string())),
        };
        Ok((segment, group))
    }

    /// Convert a lambda body, in the group scope when one is active.
    fn body(
        &self,
        lambda: &HostLambda,
        entity: &str,
        group: Option<&GroupKeys>,
    ) -> Result<Expr, ConvertError> {
        let root = lambda.root().ok_or(ConvertError::NoParameter)?;
        let scope = match group {
            Some(keys) => Scope::grouped(self, root, keys),
            None => Scope::new(self, root),
        };
        scope.for_entity(entity).convert(&lambda.body)
    }

    /// Apply an optional trailing predicate argument, as in `Count(u => ..)`.
    fn filtered(
        &self,
        segment: Segment,
        entity: &str,
        group: Option<&GroupKeys>,
        args: &[HostExpr],
    ) -> Result<Segment, ConvertError> {
        match args.first() {
            Some(HostExpr::Lambda(lambda)) => {
                Ok(segment.where_(as_predicate(self.body(lambda, entity, group)?))?)
            }
            Some(_) => Err(ConvertError::Argument {
                method: "predicate".into(),
                message: "expected a lambda".into(),
            }),
            None => Ok(segment),
        }
    }

    fn group_keys(&self, lambda: &HostLambda, entity: &str) -> Result<GroupKeys, ConvertError> {
        let root = lambda.root().ok_or(ConvertError::NoParameter)?;
        let scope = Scope::new(self, root).for_entity(entity);
        let keys = match lambda.body.as_ref() {
            HostExpr::New(fields) => fields
                .iter()
                .map(|(name, e)| Ok((Some(name.clone()), scope.convert(e)?)))
                .collect::<Result<Vec<_>, ConvertError>>()?,
            body => vec![(member_name(body), scope.convert(body)?)],
        };
        Ok(GroupKeys { keys })
    }

    /// `None` for an identity projection (`u => u`).
    fn projection(
        &self,
        lambda: &HostLambda,
        entity: &str,
        group: Option<&GroupKeys>,
    ) -> Result<Option<Vec<SelectItem>>, ConvertError> {
        let root = lambda.root().ok_or(ConvertError::NoParameter)?;
        let scope = match group {
            Some(keys) => Scope::grouped(self, root, keys),
            None => Scope::new(self, root),
        }
        .for_entity(entity);
        let items = match lambda.body.as_ref() {
            HostExpr::Parameter(p) if p == root => return Ok(None),
            HostExpr::New(fields) => fields
                .iter()
                .map(|(name, e)| Ok(SelectItem::named(name.clone(), scope.convert(e)?)))
                .collect::<Result<Vec<_>, ConvertError>>()?,
            body => {
                let expr = scope.convert(body)?;
                match member_name(body) {
                    Some(name) => vec![SelectItem::named(name, expr)],
                    None => vec![SelectItem::new(expr)],
                }
            }
        };
        Ok(Some(items))
    }
}

fn member_name(expr: &HostExpr) -> Option<String> {
    match expr {
        HostExpr::Member { member, .. } => Some(member.clone()),
        _ => None,
    }
}

fn lambda_arg<'h>(
    method: &str,
    args: &'h [HostExpr],
    index: usize,
) -> Result<&'h HostLambda, ConvertError> {
    match args.get(index) {
        Some(HostExpr::Lambda(lambda)) => Ok(lambda),
        _ => Err(ConvertError::Argument {
            method: method.to_string(),
            message: format!("argument {index} must be a lambda"),
        }),
    }
}

fn count_arg(method: &str, args: &[HostExpr]) -> Result<u64, ConvertError> {
    match args.first().and_then(evaluate) {
        Some(HostValue::Scalar(Scalar::Int(n))) if n >= 0 => Ok(n as u64),
        _ => Err(ConvertError::Argument {
            method: method.to_string(),
            message: "expected a non-negative integer constant".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{ParseEnv, parse_query};
    use crate::pipeline::{OrderItem, PipelineError};

    fn query(text: &str) -> Result<Segment, ConvertError> {
        let env = ParseEnv::new()
            .with_source("users", "User")
            .with_capture("page", 20);
        let host = parse_query(text, &env).unwrap();
        Converter::global().convert_query(&host)
    }

    #[test]
    fn where_order_skip_take() {
        let seg = query("users.Where(u => u.Age > 18).OrderBy(u => u.Name).Skip(10).Take(@page)")
            .unwrap();
        let expected = Segment::Section {
            source: Box::new(Segment::OrderBy {
                source: Box::new(Segment::Where {
                    source: Box::new(Segment::table("User")),
                    condition: Expr::prop("Age").gt(18),
                }),
                orders: vec![OrderItem::asc(Expr::prop("Name"))],
            }),
            skip: 10,
            take: Some(20),
        };
        assert_eq!(seg, expected);
    }

    #[test]
    fn sequential_where_merges() {
        let seg = query("users.Where(u => u.Age > 18).Where(u => u.Active)").unwrap();
        let Segment::Where { source, condition } = seg else {
            panic!("expected a single Where");
        };
        assert_eq!(*source, Segment::table("User"));
        assert_eq!(
            condition,
            Expr::prop("Age").gt(18).and(Expr::prop("Active").equal(true))
        );
    }

    #[test]
    fn group_by_with_aggregate_projection() {
        let seg = query(
            "users.GroupBy(u => u.DeptId)\
             .Where(g => g.Count() > 5)\
             .Select(g => new { Dept = g.Key, Total = g.Count(), Top = g.Max(u => u.Salary) })",
        )
        .unwrap();
        let Segment::Select { source, items } = seg else {
            panic!("expected Select");
        };
        assert_eq!(
            items,
            vec![
                SelectItem::named("Dept", Expr::prop("DeptId")),
                SelectItem::named("Total", Expr::count()),
                SelectItem::named("Top", Expr::func("MAX", vec![Expr::prop("Salary")])),
            ]
        );
        assert!(matches!(
            *source,
            Segment::Having { ref condition, .. } if *condition == Expr::count().gt(5)
        ));
    }

    #[test]
    fn composite_group_keys_by_name() {
        let seg = query(
            "users.GroupBy(u => new { u.DeptId, u.Role }).Select(g => new { g.Key.Role, N = g.Count() })",
        )
        .unwrap();
        let Segment::Select { source, items } = seg else {
            panic!("expected Select");
        };
        assert_eq!(items[0], SelectItem::named("Role", Expr::prop("Role")));
        assert!(matches!(*source, Segment::GroupBy { ref keys, .. } if keys.len() == 2));
    }

    #[test]
    fn count_with_predicate() {
        let seg = query("users.Count(u => u.Age < 30)").unwrap();
        let Segment::Select { source, items } = seg else {
            panic!("expected Select");
        };
        assert_eq!(items, vec![SelectItem::named("Count", Expr::count())]);
        assert_eq!(source.kind(), crate::pipeline::SegmentKind::Where);
    }

    #[test]
    fn update_and_delete() {
        let seg = query("users.Where(u => u.Id == 7).Update(u => new { Age = u.Age + 1 })").unwrap();
        assert!(matches!(
            seg,
            Segment::Update { ref sets, .. } if sets[0] == SetItem::new("Age", Expr::prop("Age") + 1)
        ));

        let seg = query("users.Delete(u => u.Age > 99)").unwrap();
        assert!(matches!(seg, Segment::Delete { .. }));
    }

    #[test]
    fn usage_errors() {
        assert_eq!(
            query("users.ThenBy(u => u.Name)").unwrap_err(),
            ConvertError::Pipeline(PipelineError::ThenByWithoutOrderBy(
                crate::pipeline::SegmentKind::Table
            ))
        );
        assert!(matches!(
            query("users.Reverse()").unwrap_err(),
            ConvertError::UnsupportedOperator(op) if op == "Reverse"
        ));
        assert!(matches!(
            query("users.Take(-1)").unwrap_err(),
            ConvertError::Argument { .. }
        ));
    }

    #[test]
    fn identity_select_is_a_no_op() {
        assert_eq!(
            query("users.Select(u => u)").unwrap(),
            Segment::table("User")
        );
    }
}
