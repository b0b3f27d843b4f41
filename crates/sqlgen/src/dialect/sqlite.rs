use super::{DialectKind, DialectOptions, GuidStorage, SelectParts, SqlDialect, ddl};
use crate::meta::{ColumnMeta, DbType, TableMeta};

/// SQLite 3. Temporal values are stored as text.
#[derive(Debug, Clone, Default)]
pub struct Sqlite {
    options: DialectOptions,
}

impl Sqlite {
    pub fn new(options: DialectOptions) -> Self {
        Self { options }
    }
}

impl SqlDialect for Sqlite {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn options(&self) -> &DialectOptions {
        &self.options
    }

    fn quote_name(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("({})", parts.join(" || "))
    }

    fn regexp_like(&self, subject: &str, pattern: &str) -> String {
        // needs a user-defined regexp() function on the connection
        format!("{subject} REGEXP {pattern}")
    }

    fn default_guid_storage(&self) -> GuidStorage {
        GuidStorage::Text
    }

    fn temporal_as_text(&self) -> bool {
        true
    }

    fn paginate(&self, parts: &SelectParts, skip: u64, take: Option<u64>) -> String {
        let mut sql = parts.render(None);
        match take {
            Some(take) => sql.push_str(&format!(" LIMIT {take}")),
            None => sql.push_str(" LIMIT -1"),
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
            DbType::Bool | DbType::Int32 | DbType::Int64 | DbType::Enum => "INTEGER".into(),
            DbType::Float => "REAL".into(),
            DbType::Decimal { .. } => "NUMERIC".into(),
            DbType::Bytes => "BLOB".into(),
            _ => "TEXT".into(),
        }
    }

    /// Identity must be the inline `INTEGER PRIMARY KEY`.
    fn column_definition(&self, column: &ColumnMeta) -> String {
        if column.identity {
            format!(
                "{} INTEGER PRIMARY KEY AUTOINCREMENT",
                self.quote_name(&column.column)
            )
        } else {
            ddl::column_definition(self, column)
        }
    }

    fn identity_clause(&self, _column: &ColumnMeta) -> Option<String> {
        None
    }

    fn create_table_sql(&self, table: &TableMeta) -> String {
        if table.identity_column().is_none() {
            return ddl::create_table(self, table);
        }
        let lines: Vec<String> = table
            .columns
            .iter()
            .filter(|c| c.expression.is_none())
            .map(|c| format!("  {}", self.column_definition(c)))
            .collect();
        format!(
            "CREATE TABLE {} (\n{}\n)",
            self.table_name(table),
            lines.join(",\n")
        )
    }
}
