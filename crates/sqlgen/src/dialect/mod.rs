//! SQL dialects
//!
//! [`SqlDialect`] carries the baseline rendering as default methods: bracket
//! quoting, `@` placeholders, `CONCAT(...)`, `OFFSET ... FETCH NEXT`. Each
//! backend overrides only what differs. Dialects form a chain back to
//! [`DialectKind::Generic`], which the function registry walks when looking
//! up per-dialect handlers.

pub mod ddl;
pub mod functions;
pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod sqlite;
pub mod sqlserver;
pub mod value;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::ast::Scalar;
use crate::meta::{ColumnMeta, DbType, IndexMeta, TableMeta};

pub use functions::{FunctionHandler, FunctionRegistry};
pub use mysql::MySql;
pub use oracle::Oracle;
pub use postgres::Postgres;
pub use sqlite::Sqlite;
pub use sqlserver::SqlServer;
pub use value::{HostType, ValueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    Generic,
    SqlServer,
    MySql,
    Oracle,
    Postgres,
    Sqlite,
}

impl DialectKind {
    pub const ALL: [DialectKind; 6] = [
        DialectKind::Generic,
        DialectKind::SqlServer,
        DialectKind::MySql,
        DialectKind::Oracle,
        DialectKind::Postgres,
        DialectKind::Sqlite,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DialectKind::Generic => "generic",
            DialectKind::SqlServer => "sqlserver",
            DialectKind::MySql => "mysql",
            DialectKind::Oracle => "oracle",
            DialectKind::Postgres => "postgres",
            DialectKind::Sqlite => "sqlite",
        }
    }

    /// Parse a dialect name, accepting common aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "generic" | "ansi" => Some(DialectKind::Generic),
            "sqlserver" | "mssql" | "tsql" => Some(DialectKind::SqlServer),
            "mysql" | "mariadb" => Some(DialectKind::MySql),
            "oracle" => Some(DialectKind::Oracle),
            "postgres" | "postgresql" | "pg" => Some(DialectKind::Postgres),
            "sqlite" => Some(DialectKind::Sqlite),
            _ => None,
        }
    }

    pub fn base(self) -> Option<DialectKind> {
        match self {
            DialectKind::Generic => None,
            _ => Some(DialectKind::Generic),
        }
    }

    /// This kind followed by its bases, most specific first.
    pub fn chain(self) -> impl Iterator<Item = DialectKind> {
        std::iter::successors(Some(self), |k| k.base())
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How booleans are written to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolStorage {
    Native,
    /// 1 / 0
    Integer,
    /// 'Y' / 'N'
    YesNo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumStorage {
    #[default]
    Integer,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidStorage {
    Native,
    Text,
    Blob,
}

/// Per-instance dialect settings. Unset storage options fall back to the
/// dialect's own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectOptions {
    pub like_escape: char,
    pub bool_storage: Option<BoolStorage>,
    pub enum_storage: EnumStorage,
    pub guid_storage: Option<GuidStorage>,
    /// chrono format used when temporal values are stored as text
    #[serde(deserialize_with = "strftime")]
    pub datetime_format: String,
    #[serde(deserialize_with = "strftime")]
    pub date_format: String,
}

fn strftime<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let format = String::deserialize(deserializer)?;
    value::check_format("format", &format).map_err(serde::de::Error::custom)?;
    Ok(format)
}

impl Default for DialectOptions {
    fn default() -> Self {
        Self {
            like_escape: '/',
            bool_storage: None,
            enum_storage: EnumStorage::Integer,
            guid_storage: None,
            datetime_format: value::DEFAULT_DATETIME_FORMAT.to_string(),
            date_format: value::DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl DialectOptions {
    pub fn with_like_escape(mut self, c: char) -> Self {
        self.like_escape = c;
        self
    }

    pub fn with_bool_storage(mut self, storage: BoolStorage) -> Self {
        self.bool_storage = Some(storage);
        self
    }

    pub fn with_enum_storage(mut self, storage: EnumStorage) -> Self {
        self.enum_storage = storage;
        self
    }

    pub fn with_guid_storage(mut self, storage: GuidStorage) -> Self {
        self.guid_storage = Some(storage);
        self
    }

    pub fn with_datetime_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_format = format.into();
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    /// Check the temporal formats. Formatting never panics on a bad pattern,
    /// it falls back to ISO text, so this is for surfacing typos early.
    pub fn validate(&self) -> Result<(), ValueError> {
        value::check_format("datetime_format", &self.datetime_format)?;
        value::check_format("date_format", &self.date_format)
    }
}

/// Rendered clauses of a SELECT, assembled by [`SqlDialect::paginate`] or
/// [`SelectParts::render`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectParts {
    pub columns: String,
    pub from: String,
    pub where_: Option<String>,
    pub group_by: Option<String>,
    pub having: Option<String>,
    pub order_by: Option<String>,
}

impl SelectParts {
    /// `SELECT [top ]columns FROM ... [WHERE] [GROUP BY] [HAVING] [ORDER BY]`
    pub fn render(&self, top: Option<&str>) -> String {
        let mut sql = String::from("SELECT ");
        if let Some(top) = top {
            sql.push_str(top);
            sql.push(' ');
        }
        sql.push_str(&self.columns);
        sql.push_str(" FROM ");
        sql.push_str(&self.from);
        for (keyword, clause) in [
            ("WHERE", &self.where_),
            ("GROUP BY", &self.group_by),
            ("HAVING", &self.having),
            ("ORDER BY", &self.order_by),
        ] {
            if let Some(clause) = clause {
                sql.push(' ');
                sql.push_str(keyword);
                sql.push(' ');
                sql.push_str(clause);
            }
        }
        sql
    }
}

/// A SQL backend.
pub trait SqlDialect: fmt::Debug + Send + Sync {
    fn kind(&self) -> DialectKind;

    fn options(&self) -> &DialectOptions;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    // Identifiers

    fn quote_name(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    /// Quote a dotted name part by part.
    fn quote_qualified(&self, name: &str) -> String {
        name.split('.')
            .map(|part| self.quote_name(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn table_name(&self, table: &TableMeta) -> String {
        match &table.schema {
            Some(schema) => format!("{}.{}", self.quote_name(schema), self.quote_name(&table.name)),
            None => self.quote_name(&table.name),
        }
    }

    // Parameters

    fn param_prefix(&self) -> &'static str {
        "@"
    }

    /// Name of the parameter at `index` as stored in the parameter list.
    fn param_name(&self, index: usize) -> String {
        index.to_string()
    }

    /// Placeholder text for a parameter name.
    fn to_placeholder(&self, name: &str) -> String {
        format!("{}{}", self.param_prefix(), name)
    }

    /// Inverse of [`SqlDialect::to_placeholder`].
    fn to_native_name(&self, placeholder: &str) -> String {
        placeholder
            .strip_prefix(self.param_prefix())
            .unwrap_or(placeholder)
            .to_string()
    }

    /// Whether the driver binds by name rather than by position.
    fn binds_by_name(&self) -> bool {
        true
    }

    // Strings and operators

    fn string_literal(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    fn like_escape(&self) -> char {
        self.options().like_escape
    }

    /// Characters with wildcard meaning inside `LIKE` patterns.
    fn like_wildcards(&self) -> &'static [char] {
        &['%', '_']
    }

    /// Escape a literal for use inside a `LIKE` pattern.
    fn escape_like(&self, value: &str) -> String {
        let esc = self.like_escape();
        let wild = self.like_wildcards();
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            if c == esc || wild.contains(&c) {
                out.push(esc);
            }
            out.push(c);
        }
        out
    }

    /// `ESCAPE 'c'` suffix for `LIKE` predicates.
    fn like_escape_clause(&self) -> String {
        format!("ESCAPE {}", self.string_literal(&self.like_escape().to_string()))
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("CONCAT({})", parts.join(", "))
    }

    fn modulo(&self, left: &str, right: &str) -> String {
        format!("({left} % {right})")
    }

    fn regexp_like(&self, subject: &str, pattern: &str) -> String {
        format!("REGEXP_LIKE({subject}, {pattern})")
    }

    fn true_predicate(&self) -> &'static str {
        "1 = 1"
    }

    fn false_predicate(&self) -> &'static str {
        "1 = 0"
    }

    // Values

    fn default_bool_storage(&self) -> BoolStorage {
        BoolStorage::Integer
    }

    fn default_guid_storage(&self) -> GuidStorage {
        GuidStorage::Native
    }

    fn bool_storage(&self) -> BoolStorage {
        self.options()
            .bool_storage
            .unwrap_or_else(|| self.default_bool_storage())
    }

    fn guid_storage(&self) -> GuidStorage {
        self.options()
            .guid_storage
            .unwrap_or_else(|| self.default_guid_storage())
    }

    /// Whether dates and times are stored as formatted text.
    fn temporal_as_text(&self) -> bool {
        false
    }

    /// Whether the backend has a timezone-aware timestamp type.
    fn supports_offsets(&self) -> bool {
        true
    }

    /// Convert a host value to its stored form, honoring the column type
    /// when one is known.
    fn to_db_value(&self, value: &Scalar, column: Option<&DbType>) -> Scalar {
        value::to_db_value(self, value, column)
    }

    /// Convert a stored value back to the host type.
    fn from_db_value(&self, value: Scalar, target: &HostType) -> Result<Scalar, ValueError> {
        value::from_db_value(self, value, target)
    }

    /// Render an already converted value as inline SQL.
    fn literal_sql(&self, value: &Scalar) -> String {
        value::literal_sql(self, value)
    }

    // SELECT assembly

    /// Assemble a SELECT with `skip`/`take` applied. `parts.order_by` is
    /// always set when this is called.
    fn paginate(&self, parts: &SelectParts, skip: u64, take: Option<u64>) -> String {
        let mut sql = parts.render(None);
        sql.push_str(&format!(" OFFSET {skip} ROWS"));
        if let Some(take) = take {
            sql.push_str(&format!(" FETCH NEXT {take} ROWS ONLY"));
        }
        sql
    }

    // Writes

    /// `INSERT` for a single row. The identity column, if any, is returned
    /// the way the backend supports.
    fn insert_sql(&self, table: &TableMeta, columns: &[&ColumnMeta], values: &[String]) -> String {
        ddl::insert(self, table, columns, values, None)
    }

    fn batch_insert_sql(
        &self,
        table: &TableMeta,
        columns: &[&ColumnMeta],
        rows: &[Vec<String>],
    ) -> String {
        ddl::multi_row_insert(self, table, columns, rows)
    }

    /// One `UPDATE` per row; `rows[i]` holds the set values followed by the
    /// key values.
    fn batch_update_sql(
        &self,
        table: &TableMeta,
        sets: &[&ColumnMeta],
        keys: &[&ColumnMeta],
        rows: &[Vec<String>],
    ) -> String {
        ddl::per_row_update(self, table, sets, keys, rows)
    }

    fn batch_delete_sql(&self, table: &TableMeta, keys: &[&ColumnMeta], rows: &[Vec<String>]) -> String {
        ddl::keyed_delete(self, table, keys, rows)
    }

    // DDL

    fn db_type_sql(&self, db_type: &DbType) -> String {
        ddl::ansi_type(db_type)
    }

    /// Type of a column after applying storage options.
    fn column_type_sql(&self, column: &ColumnMeta) -> String {
        ddl::column_type(self, column)
    }

    fn identity_clause(&self, _column: &ColumnMeta) -> Option<String> {
        Some("GENERATED BY DEFAULT AS IDENTITY".to_string())
    }

    fn column_definition(&self, column: &ColumnMeta) -> String {
        ddl::column_definition(self, column)
    }

    fn create_table_sql(&self, table: &TableMeta) -> String {
        ddl::create_table(self, table)
    }

    fn add_column_sql(&self, table: &TableMeta, column: &ColumnMeta) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.table_name(table),
            self.column_definition(column)
        )
    }

    fn create_index_sql(&self, table: &TableMeta, index: &IndexMeta) -> String {
        ddl::create_index(self, table, index)
    }

    // Functions

    /// Plain renames applied when no function handler matches.
    fn function_names(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }
}

/// The baseline dialect.
#[derive(Debug, Clone, Default)]
pub struct Generic {
    options: DialectOptions,
}

impl Generic {
    pub fn new(options: DialectOptions) -> Self {
        Self { options }
    }
}

impl SqlDialect for Generic {
    fn kind(&self) -> DialectKind {
        DialectKind::Generic
    }

    fn options(&self) -> &DialectOptions {
        &self.options
    }
}

/// Renames shared by every dialect, consulted after the dialect's own table.
pub const COMMON_FUNCTION_NAMES: &[(&str, &str)] = &[
    ("ToUpper", "UPPER"),
    ("ToLower", "LOWER"),
    ("Length", "LENGTH"),
    ("Average", "AVG"),
    ("Ceiling", "CEILING"),
    ("TrimStart", "LTRIM"),
    ("TrimEnd", "RTRIM"),
    ("Replace", "REPLACE"),
    ("Coalesce", "COALESCE"),
];

/// Build a dialect from its name.
pub fn by_name(name: &str, options: DialectOptions) -> Option<Arc<dyn SqlDialect>> {
    let kind = DialectKind::from_name(name)?;
    Some(for_kind(kind, options))
}

pub fn for_kind(kind: DialectKind, options: DialectOptions) -> Arc<dyn SqlDialect> {
    match kind {
        DialectKind::Generic => Arc::new(Generic::new(options)),
        DialectKind::SqlServer => Arc::new(SqlServer::new(options)),
        DialectKind::MySql => Arc::new(MySql::new(options)),
        DialectKind::Oracle => Arc::new(Oracle::new(options)),
        DialectKind::Postgres => Arc::new(Postgres::new(options)),
        DialectKind::Sqlite => Arc::new(Sqlite::new(options)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ends_at_generic() {
        let chain: Vec<_> = DialectKind::Postgres.chain().collect();
        assert_eq!(chain, [DialectKind::Postgres, DialectKind::Generic]);
        assert_eq!(DialectKind::Generic.chain().count(), 1);
    }

    #[test]
    fn by_name_accepts_aliases() {
        let d = by_name("PostgreSQL", DialectOptions::default()).unwrap();
        assert_eq!(d.kind(), DialectKind::Postgres);
        assert!(by_name("db2", DialectOptions::default()).is_none());
    }

    #[test]
    fn baseline_rendering() {
        let d = Generic::default();
        assert_eq!(d.quote_name("Order"), "[Order]");
        assert_eq!(d.quote_qualified("dbo.Order"), "[dbo].[Order]");
        assert_eq!(d.to_placeholder(&d.param_name(3)), "@3");
        assert_eq!(d.to_native_name("@3"), "3");
        assert_eq!(d.escape_like("50%_a/b"), "50/%/_a//b");
        assert_eq!(d.like_escape_clause(), "ESCAPE '/'");
    }

    #[test]
    fn paginate_uses_offset_fetch() {
        let parts = SelectParts {
            columns: "*".into(),
            from: "[T]".into(),
            order_by: Some("[Id] ASC".into()),
            ..Default::default()
        };
        assert_eq!(
            Generic::default().paginate(&parts, 10, Some(5)),
            "SELECT * FROM [T] ORDER BY [Id] ASC OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
        );
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: DialectOptions = serde_json::from_str(r#"{"bool_storage": "yes_no"}"#).unwrap();
        assert_eq!(opts.bool_storage, Some(BoolStorage::YesNo));
        assert_eq!(opts.like_escape, '/');
    }

    #[test]
    fn malformed_formats_fail_validation() {
        assert_eq!(DialectOptions::default().validate(), Ok(()));
        let bad = DialectOptions::default().with_datetime_format("%Q");
        assert!(matches!(
            bad.validate(),
            Err(ValueError::Format { option: "datetime_format", .. })
        ));
        let bad = DialectOptions::default().with_date_format("%Y-%");
        assert!(bad.validate().is_err());

        let err = serde_json::from_str::<DialectOptions>(r#"{"date_format": "%Q"}"#).unwrap_err();
        assert!(err.to_string().contains("invalid format `%Q`"), "{err}");
        let opts: DialectOptions = serde_json::from_str(r#"{"date_format": "%d.%m.%Y"}"#).unwrap();
        assert_eq!(opts.date_format, "%d.%m.%Y");
    }
}
