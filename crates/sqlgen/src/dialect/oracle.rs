use super::{BoolStorage, DialectKind, DialectOptions, GuidStorage, SqlDialect, ddl};
use crate::meta::{ColumnMeta, DbType, TableMeta};

/// Oracle Database 12c and later.
///
/// Identifiers are upper-cased and double-quoted. Placeholders are `:name`
/// and bound by name.
#[derive(Debug, Clone, Default)]
pub struct Oracle {
    options: DialectOptions,
}

impl Oracle {
    pub fn new(options: DialectOptions) -> Self {
        Self { options }
    }
}

impl SqlDialect for Oracle {
    fn kind(&self) -> DialectKind {
        DialectKind::Oracle
    }

    fn options(&self) -> &DialectOptions {
        &self.options
    }

    fn quote_name(&self, name: &str) -> String {
        format!("\"{}\"", name.to_uppercase().replace('"', "\"\""))
    }

    fn param_prefix(&self) -> &'static str {
        ":"
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("({})", parts.join(" || "))
    }

    fn modulo(&self, left: &str, right: &str) -> String {
        format!("MOD({left}, {right})")
    }

    fn default_bool_storage(&self) -> BoolStorage {
        BoolStorage::Integer
    }

    fn default_guid_storage(&self) -> GuidStorage {
        GuidStorage::Blob
    }

    /// Sequence-backed identities take `NEXTVAL` in the insert itself.
    fn insert_sql(&self, table: &TableMeta, columns: &[&ColumnMeta], values: &[String]) -> String {
        let mut columns = columns.to_vec();
        let mut values = values.to_vec();
        let identity = table.identity_column();
        if let Some(col) = identity
            && let Some(seq) = &col.sequence
        {
            columns.insert(0, col);
            values.insert(0, format!("{}.NEXTVAL", self.quote_name(seq)));
        }
        let suffix = identity.map(|col| {
            format!(
                "RETURNING {} INTO {}",
                self.quote_name(&col.column),
                self.to_placeholder("identity")
            )
        });
        ddl::insert(self, table, &columns, &values, suffix.as_deref())
    }

    fn batch_insert_sql(
        &self,
        table: &TableMeta,
        columns: &[&ColumnMeta],
        rows: &[Vec<String>],
    ) -> String {
        let cols = columns
            .iter()
            .map(|c| self.quote_name(&c.column))
            .collect::<Vec<_>>()
            .join(", ");
        let target = self.table_name(table);
        let mut sql = String::from("INSERT ALL");
        for row in rows {
            sql.push_str(&format!(" INTO {target} ({cols}) VALUES ({})", row.join(", ")));
        }
        sql.push_str(" SELECT 1 FROM DUAL");
        sql
    }

    fn db_type_sql(&self, db_type: &DbType) -> String {
        match db_type {
            DbType::Bool => "NUMBER(1)".into(),
            DbType::Int32 | DbType::Enum => "NUMBER(10)".into(),
            DbType::Int64 => "NUMBER(19)".into(),
            DbType::Float => "BINARY_DOUBLE".into(),
            DbType::Decimal { precision, scale } => format!("NUMBER({precision}, {scale})"),
            DbType::Text(Some(n)) => format!("NVARCHAR2({n})"),
            DbType::Text(None) => "NCLOB".into(),
            DbType::Guid => "RAW(16)".into(),
            other => ddl::ansi_type(other),
        }
    }

    fn identity_clause(&self, column: &ColumnMeta) -> Option<String> {
        match column.sequence {
            Some(_) => None,
            None => Some("GENERATED BY DEFAULT AS IDENTITY".to_string()),
        }
    }

    fn add_column_sql(&self, table: &TableMeta, column: &ColumnMeta) -> String {
        format!(
            "ALTER TABLE {} ADD ({})",
            self.table_name(table),
            self.column_definition(column)
        )
    }

    fn function_names(&self) -> &'static [(&'static str, &'static str)] {
        &[("Ceiling", "CEIL"), ("NewGuid", "SYS_GUID")]
    }
}
