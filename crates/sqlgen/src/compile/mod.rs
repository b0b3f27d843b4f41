//! Pipeline and expression compilation to parameterized SQL
//!
//! [`SqlGen`] ties a dialect to table metadata and the function and
//! generic-SQL registries. Compiling a pipeline flattens its segments into
//! clause slots, emits every expression against the root table and hands
//! the assembled parts to the dialect for pagination.

mod emit;
pub mod generic;
mod statement;
mod write;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::ast::{Expr, Scalar};
use crate::convert::ConvertError;
use crate::dialect::{FunctionRegistry, SqlDialect};
use crate::meta::{MetadataLookup, TableMeta};
use crate::pipeline::{Segment, SelectItem};

pub use generic::{GenericHandler, GenericSqlRegistry};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("unknown table for entity `{0}`")]
    UnknownTable(String),

    #[error("unknown property `{property}` on `{table}`")]
    UnknownProperty { property: String, table: String },

    #[error("`{property}` on `{table}` is not a foreign key")]
    NotAForeignKey { property: String, table: String },

    #[error("`{property}` on `{table}` cannot be written")]
    NotWritable { property: String, table: String },

    #[error("`{0}` has no primary key")]
    NoPrimaryKey(String),

    #[error("no generic SQL handler registered for `{0}`")]
    UnknownGeneric(String),

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("row {row} has {got} values, expected {expected}")]
    RowLength {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Convert(#[from] ConvertError),
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// SQL text plus its parameters in binding order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<(String, Scalar)>,
}

impl CompiledQuery {
    pub fn param(&self, name: &str) -> Option<&Scalar> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Parameter values in binding order.
    pub fn values(&self) -> impl Iterator<Item = &Scalar> {
        self.params.iter().map(|(_, value)| value)
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// The compiler.
#[derive(Clone)]
pub struct SqlGen {
    pub(crate) dialect: Arc<dyn SqlDialect>,
    pub(crate) catalog: Arc<dyn MetadataLookup>,
    pub(crate) functions: Arc<FunctionRegistry>,
    pub(crate) generics: Arc<GenericSqlRegistry>,
}

impl fmt::Debug for SqlGen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlGen")
            .field("dialect", &self.dialect.name())
            .field("functions", &self.functions)
            .field("generics", &self.generics)
            .finish()
    }
}

impl SqlGen {
    /// A compiler using the process-wide function and generic registries.
    pub fn new(dialect: Arc<dyn SqlDialect>, catalog: Arc<dyn MetadataLookup>) -> Self {
        Self {
            dialect,
            catalog,
            functions: FunctionRegistry::global(),
            generics: GenericSqlRegistry::global(),
        }
    }

    pub fn with_dialect(mut self, dialect: Arc<dyn SqlDialect>) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_generics(mut self, generics: Arc<GenericSqlRegistry>) -> Self {
        self.generics = generics;
        self
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn metadata(&self) -> Arc<dyn MetadataLookup> {
        self.catalog.clone()
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn generics(&self) -> &GenericSqlRegistry {
        &self.generics
    }

    pub fn table(&self, entity: &str) -> Result<&TableMeta> {
        self.catalog
            .table(entity)
            .ok_or_else(|| CompileError::UnknownTable(entity.to_string()))
    }

    /// Compile a pipeline into a single statement.
    pub fn compile(&self, segment: &Segment) -> Result<CompiledQuery> {
        let query = statement::compile(self, segment)?;
        log::debug!(
            "compiled {} pipeline on {} ({} params)",
            segment.kind(),
            segment.entity(),
            query.params.len()
        );
        log::trace!("{}", query.sql);
        Ok(query)
    }

    /// `SELECT` all mapped columns of `entity` matching `condition`.
    pub fn compile_condition(&self, entity: &str, condition: &Expr) -> Result<CompiledQuery> {
        let segment = Segment::table(entity)
            .where_(condition.clone())
            .map_err(|e| CompileError::InvalidPipeline(e.to_string()))?;
        self.compile(&segment)
    }

    /// Compile a bare expression against `entity`, as it would appear in a
    /// `WHERE` clause.
    pub fn compile_expr(&self, entity: &str, expr: &Expr) -> Result<CompiledQuery> {
        let table = self.table(entity)?;
        let mut emitter = emit::Emitter::new(self, table);
        let sql = emitter.expr(expr)?;
        Ok(CompiledQuery {
            sql,
            params: emitter.into_params(),
        })
    }

    /// Projection items naming every mapped column of `entity`.
    pub fn all_columns(&self, entity: &str) -> Result<Vec<SelectItem>> {
        Ok(self
            .table(entity)?
            .columns
            .iter()
            .map(|c| SelectItem::named(c.property.clone(), Expr::prop(c.property.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{HostExpr, HostLambda, ParseEnv, parse_lambda};
    use crate::dialect::{DialectOptions, Generic};
    use crate::meta::{Catalog, ColumnMeta, DbType};

    fn generator() -> SqlGen {
        let catalog = Catalog::new().with_table(
            TableMeta::new("User")
                .with_column(ColumnMeta::new("Id", DbType::Int64).primary_key())
                .with_column(ColumnMeta::new("Age", DbType::Int32)),
        );
        SqlGen::new(Arc::new(Generic::new(DialectOptions::default())), Arc::new(catalog))
    }

    #[test]
    fn lambda_nodes_compile_through_their_conversion() {
        let host = parse_lambda("u => u.Age >= 21", &ParseEnv::new()).unwrap();
        let q = generator()
            .compile_condition("User", &Expr::lambda(host))
            .unwrap();
        assert_eq!(q.sql, "SELECT [Id], [Age] FROM [User] WHERE [Age] >= @0");
        assert_eq!(q.param("0"), Some(&Scalar::Int(21)));
    }

    #[test]
    fn failed_lambda_reports_conversion_error() {
        let broken = HostLambda {
            params: Vec::new(),
            body: Box::new(HostExpr::Parameter("u".into())),
        };
        let err = generator()
            .compile_expr("User", &Expr::lambda(broken))
            .unwrap_err();
        assert!(matches!(err, CompileError::Convert(_)));
    }

    #[test]
    fn all_columns_projection() {
        let items = generator().all_columns("User").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], SelectItem::named("Age", Expr::prop("Age")));
    }
}
