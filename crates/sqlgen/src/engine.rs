//! Query engine with a catalog and prepared statements
//!
//! Bundles what a host application needs to go from query text to SQL:
//! - table metadata and query sources
//! - a dialect and the function, generic-SQL and conversion registries
//! - captured values referenced as `@name`
//! - named prepared statements, recompiled when the engine changes

use std::sync::Arc;

use indexmap::IndexMap;

use crate::ast::Expr;
use crate::compile::{CompiledQuery, GenericSqlRegistry, SqlGen};
use crate::convert::{Converter, HandlerRegistry, HostValue, ParseEnv, parse_lambda, parse_query};
use crate::dialect::{self, DialectOptions, FunctionRegistry, SqlDialect};
use crate::meta::{Catalog, TableMeta};
use crate::pipeline::Segment;
use crate::SqlGenError;

/// A prepared statement: its text, pipeline and current compilation.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub text: String,
    pub segment: Segment,
    pub query: CompiledQuery,
}

/// Query engine with a catalog and prepared statements
///
/// # Example
///
/// ```ignore
/// let mut engine = QueryEngine::for_dialect("postgres", DialectOptions::default())?;
/// engine.register_table(users_meta);
/// engine.add_source("users", "User");
/// engine.set_capture("min_age", 18);
///
/// // one-off
/// let q = engine.query("users.Where(u => u.Age >= @min_age).Take(10)")?;
///
/// // prepared, recompiled after catalog or capture changes
/// engine.prepare("adults", "users.Where(u => u.Age >= @min_age)")?;
/// let sql = &engine.get("adults").unwrap().sql;
/// ```
pub struct QueryEngine {
    catalog: Arc<Catalog>,
    dialect: Arc<dyn SqlDialect>,
    functions: Arc<FunctionRegistry>,
    generics: Arc<GenericSqlRegistry>,
    converter: Converter,
    env: ParseEnv,

    /// Prepared statements: name -> statement, in preparation order
    prepared: IndexMap<String, Prepared>,
}

impl QueryEngine {
    /// An engine with isolated registries holding the built-ins.
    pub fn new(dialect: Arc<dyn SqlDialect>) -> Self {
        Self {
            catalog: Arc::new(Catalog::new()),
            dialect,
            functions: Arc::new(FunctionRegistry::with_builtins()),
            generics: Arc::new(GenericSqlRegistry::new()),
            converter: Converter::new(Arc::new(HandlerRegistry::with_builtins())),
            env: ParseEnv::new(),
            prepared: IndexMap::new(),
        }
    }

    /// Build from a dialect name such as `"postgres"` or `"mssql"`.
    pub fn for_dialect(name: &str, options: DialectOptions) -> Result<Self, SqlGenError> {
        options.validate()?;
        dialect::by_name(name, options)
            .map(Self::new)
            .ok_or_else(|| SqlGenError::UnknownDialect(name.to_string()))
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Function handlers, for registering dialect-specific translations.
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn generics(&self) -> &GenericSqlRegistry {
        &self.generics
    }

    /// Method and member handlers used by conversion.
    pub fn handlers(&self) -> &HandlerRegistry {
        self.converter.registry()
    }

    /// Register or replace a table. Prepared statements are recompiled.
    pub fn register_table(&mut self, table: TableMeta) -> Result<(), SqlGenError> {
        Arc::make_mut(&mut self.catalog).register(table);
        self.refresh()
    }

    /// Make `name` usable as a query source for `entity`.
    pub fn add_source(&mut self, name: impl Into<String>, entity: impl Into<String>) {
        self.env.sources.insert(name.into(), entity.into());
    }

    /// Set a captured value. Prepared statements are recompiled.
    pub fn set_capture(
        &mut self,
        name: impl Into<String>,
        value: impl Into<HostValue>,
    ) -> Result<(), SqlGenError> {
        self.env.captures.insert(name.into(), value.into());
        self.refresh()
    }

    fn generator(&self) -> SqlGen {
        SqlGen::new(self.dialect.clone(), self.catalog.clone())
            .with_functions(self.functions.clone())
            .with_generics(self.generics.clone())
    }

    // Built per call so the converter sees the current catalog.
    fn converter(&self) -> Converter {
        self.converter.clone().with_metadata(self.catalog.clone())
    }

    /// Parse and convert a fluent query to its pipeline.
    pub fn pipeline(&self, text: &str) -> Result<Segment, SqlGenError> {
        let host = parse_query(text, &self.env)?;
        Ok(self.converter().convert_query(&host)?)
    }

    /// Compile a one-off query.
    pub fn query(&self, text: &str) -> Result<CompiledQuery, SqlGenError> {
        let segment = self.pipeline(text)?;
        self.compile(&segment)
    }

    pub fn compile(&self, segment: &Segment) -> Result<CompiledQuery, SqlGenError> {
        Ok(self.generator().compile(segment)?)
    }

    /// Select rows of `entity` matching a lambda such as `u => u.Age > 18`.
    pub fn filter(&self, entity: &str, lambda: &str) -> Result<CompiledQuery, SqlGenError> {
        let host = parse_lambda(lambda, &self.env)?;
        let condition = self.converter().predicate_for(entity, &host)?;
        Ok(self.generator().compile_condition(entity, &condition)?)
    }

    /// Compile a bare expression against `entity`.
    pub fn expression(&self, entity: &str, expr: &Expr) -> Result<CompiledQuery, SqlGenError> {
        Ok(self.generator().compile_expr(entity, expr)?)
    }

    /// Prepare a named statement, replacing any previous one.
    pub fn prepare(
        &mut self,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<&Prepared, SqlGenError> {
        let name = name.into();
        let text = text.into();
        let segment = self.pipeline(&text)?;
        let query = self.compile(&segment)?;
        log::debug!("prepared {name}: {segment}");
        let (index, _) = self.prepared.insert_full(
            name,
            Prepared {
                text,
                segment,
                query,
            },
        );
        Ok(&self.prepared[index])
    }

    pub fn get(&self, name: &str) -> Option<&CompiledQuery> {
        self.prepared.get(name).map(|p| &p.query)
    }

    pub fn prepared(&self, name: &str) -> Option<&Prepared> {
        self.prepared.get(name)
    }

    pub fn unprepare(&mut self, name: &str) -> Option<Prepared> {
        self.prepared.shift_remove(name)
    }

    /// Names of prepared statements, in preparation order.
    pub fn prepared_names(&self) -> Vec<String> {
        self.prepared.keys().cloned().collect()
    }

    /// Re-parse and recompile every prepared statement in preparation
    /// order. Stops at the first failure.
    pub fn refresh(&mut self) -> Result<(), SqlGenError> {
        if self.prepared.is_empty() {
            return Ok(());
        }
        let mut updated = IndexMap::with_capacity(self.prepared.len());
        for (name, prepared) in &self.prepared {
            let segment = self.pipeline(&prepared.text)?;
            let query = self.compile(&segment)?;
            updated.insert(
                name.clone(),
                Prepared {
                    text: prepared.text.clone(),
                    segment,
                    query,
                },
            );
        }
        log::debug!("recompiled {} prepared statements", updated.len());
        self.prepared = updated;
        Ok(())
    }
}
