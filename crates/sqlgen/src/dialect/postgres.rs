use super::{BoolStorage, DialectKind, DialectOptions, SelectParts, SqlDialect, ddl};
use crate::ast::Scalar;
use crate::meta::{ColumnMeta, DbType, TableMeta};

/// PostgreSQL.
///
/// Identifiers are folded to lower case. Placeholders are positional
/// `$1, $2, ...`; the parameter named `"0"` renders as `$1`.
#[derive(Debug, Clone, Default)]
pub struct Postgres {
    options: DialectOptions,
}

impl Postgres {
    pub fn new(options: DialectOptions) -> Self {
        Self { options }
    }
}

impl SqlDialect for Postgres {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn options(&self) -> &DialectOptions {
        &self.options
    }

    fn quote_name(&self, name: &str) -> String {
        format!("\"{}\"", name.to_lowercase().replace('"', "\"\""))
    }

    fn param_prefix(&self) -> &'static str {
        "$"
    }

    fn to_placeholder(&self, name: &str) -> String {
        match name.parse::<usize>() {
            Ok(index) => format!("${}", index + 1),
            Err(_) => format!("${name}"),
        }
    }

    fn to_native_name(&self, placeholder: &str) -> String {
        let bare = placeholder.strip_prefix('$').unwrap_or(placeholder);
        match bare.parse::<usize>() {
            Ok(n) if n > 0 => (n - 1).to_string(),
            _ => bare.to_string(),
        }
    }

    fn binds_by_name(&self) -> bool {
        false
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("({})", parts.join(" || "))
    }

    fn regexp_like(&self, subject: &str, pattern: &str) -> String {
        format!("{subject} ~ {pattern}")
    }

    fn default_bool_storage(&self) -> BoolStorage {
        BoolStorage::Native
    }

    fn literal_sql(&self, value: &Scalar) -> String {
        match value {
            Scalar::Bytes(b) => {
                let hex: String = b.iter().map(|x| format!("{x:02x}")).collect();
                format!("'\\x{hex}'::bytea")
            }
            other => super::value::literal_sql(self, other),
        }
    }

    fn paginate(&self, parts: &SelectParts, skip: u64, take: Option<u64>) -> String {
        let mut sql = parts.render(None);
        if let Some(take) = take {
            sql.push_str(&format!(" LIMIT {take}"));
        }
        if skip > 0 {
            sql.push_str(&format!(" OFFSET {skip}"));
        }
        sql
    }

    fn insert_sql(&self, table: &TableMeta, columns: &[&ColumnMeta], values: &[String]) -> String {
        let suffix = table
            .identity_column()
            .map(|col| format!("RETURNING {}", self.quote_name(&col.column)));
        ddl::insert(self, table, columns, values, suffix.as_deref())
    }

    fn db_type_sql(&self, db_type: &DbType) -> String {
        match db_type {
            DbType::Decimal { precision, scale } => format!("NUMERIC({precision}, {scale})"),
            DbType::Text(None) => "TEXT".into(),
            DbType::Bytes => "BYTEA".into(),
            DbType::Guid => "UUID".into(),
            DbType::DateTimeTz => "TIMESTAMPTZ".into(),
            other => ddl::ansi_type(other),
        }
    }

    fn function_names(&self) -> &'static [(&'static str, &'static str)] {
        &[("Ceiling", "CEIL"), ("NewGuid", "GEN_RANDOM_UUID")]
    }
}
