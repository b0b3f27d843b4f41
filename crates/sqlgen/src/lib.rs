//! sqlgen - database-agnostic query expressions compiled to SQL
//!
//! Host-language lambdas and fluent query chains are converted into a
//! canonical expression AST, assembled into a pipeline of query segments
//! and compiled into dialect-correct, parameterized SQL.
//!
//! ## Quick Start
//!
//! ```ignore
//! use sqlgen::{DialectOptions, QueryEngine};
//! use sqlgen::meta::{ColumnMeta, DbType, TableMeta};
//!
//! let mut engine = QueryEngine::for_dialect("postgres", DialectOptions::default())?;
//! engine.register_table(
//!     TableMeta::new("User")
//!         .with_column(ColumnMeta::new("Id", DbType::Int64).primary_key())
//!         .with_column(ColumnMeta::new("Age", DbType::Int32)),
//! )?;
//! engine.add_source("users", "User");
//!
//! let q = engine.query("users.Where(u => u.Age > 18).OrderBy(u => u.Id).Take(10)")?;
//! // SELECT "id", "age" FROM "user" WHERE "age" > $1 ORDER BY "id" ASC LIMIT 10
//! println!("{} {:?}", q.sql, q.params);
//! ```
//!
//! ## Standalone Usage
//!
//! Without the engine, wire the pieces yourself:
//!
//! ```ignore
//! use sqlgen::{compile_query, SqlGen};
//! use sqlgen::convert::ParseEnv;
//!
//! let generator = SqlGen::new(dialect, Arc::new(catalog));
//! let env = ParseEnv::new().with_source("users", "User");
//! let q = compile_query("users.Where(u => u.Name.Contains(\"an\"))", &env, &generator)?;
//! ```
//!
//! ## Layers
//!
//! - [`ast`]: the expression tree with structural equality, hashing and a
//!   JSON wire format
//! - [`convert`]: host lambda parsing and conversion through a handler registry
//! - [`pipeline`]: query segments and their ordering rules
//! - [`dialect`]: per-backend SQL builders and the function registry
//! - [`compile`]: the compiler producing SQL text plus ordered parameters

pub mod ast;
pub mod compile;
pub mod convert;
pub mod dialect;
mod engine;
pub mod meta;
pub mod pipeline;
mod pretty;

use thiserror::Error;

// ============ Primary Public API ============

pub use ast::{BinaryOp, Expr, Scalar};
pub use compile::{CompileError, CompiledQuery, SqlGen};
pub use convert::{ConvertError, Converter, ParseError};
pub use dialect::{DialectKind, DialectOptions, SqlDialect};
pub use engine::{Prepared, QueryEngine};
pub use pipeline::{PipelineError, Segment};

/// Parse, convert and compile a fluent query in one go.
pub fn compile_query(
    text: &str,
    env: &convert::ParseEnv,
    generator: &SqlGen,
) -> Result<CompiledQuery, SqlGenError> {
    let host = convert::parse_query(text, env)?;
    let segment = Converter::global()
        .with_metadata(generator.metadata())
        .convert_query(&host)?;
    Ok(generator.compile(&segment)?)
}

// ============ Errors ============

#[derive(Error, Debug)]
pub enum SqlGenError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("Value error: {0}")]
    Value(#[from] dialect::ValueError),
    #[error("unknown dialect `{0}`")]
    UnknownDialect(String),
}

// ============ Advanced: Low-level Access ============

/// Lower-level pieces (for custom handlers, tooling or introspection)
pub mod advanced {
    pub use crate::ast::wire::{scalar_from_wire, scalar_to_wire};
    pub use crate::ast::{LambdaExpr, SetKind, UnaryOp};
    pub use crate::compile::GenericSqlRegistry;
    pub use crate::convert::{
        HandlerRegistry, HostExpr, HostLambda, HostValue, MethodCall, Scope, as_predicate,
        evaluate, parse_expr, parse_lambda, parse_query, value_from_host,
    };
    pub use crate::dialect::{FunctionRegistry, SelectParts, ddl};
    pub use crate::pretty::pretty;
}
