use super::{BoolStorage, DialectKind, DialectOptions, SelectParts, SqlDialect, ddl};
use crate::ast::Scalar;
use crate::meta::{ColumnMeta, DbType, TableMeta};

/// Microsoft SQL Server.
#[derive(Debug, Clone, Default)]
pub struct SqlServer {
    options: DialectOptions,
}

impl SqlServer {
    pub fn new(options: DialectOptions) -> Self {
        Self { options }
    }
}

impl SqlDialect for SqlServer {
    fn kind(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    fn options(&self) -> &DialectOptions {
        &self.options
    }

    // `[` opens a character class inside LIKE patterns
    fn like_wildcards(&self) -> &'static [char] {
        &['%', '_', '[']
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("({})", parts.join(" + "))
    }

    fn regexp_like(&self, subject: &str, pattern: &str) -> String {
        // SQL Server 2025 onwards
        format!("REGEXP_LIKE({subject}, {pattern})")
    }

    fn default_bool_storage(&self) -> BoolStorage {
        BoolStorage::Native
    }

    // BIT has no TRUE/FALSE keywords
    fn literal_sql(&self, value: &Scalar) -> String {
        match value {
            Scalar::Bool(b) => (if *b { "1" } else { "0" }).into(),
            other => super::value::literal_sql(self, other),
        }
    }

    fn paginate(&self, parts: &SelectParts, skip: u64, take: Option<u64>) -> String {
        match take {
            Some(take) if skip == 0 => parts.render(Some(&format!("TOP ({take})"))),
            _ => {
                let mut sql = parts.render(None);
                sql.push_str(&format!(" OFFSET {skip} ROWS"));
                if let Some(take) = take {
                    sql.push_str(&format!(" FETCH NEXT {take} ROWS ONLY"));
                }
                sql
            }
        }
    }

    fn insert_sql(&self, table: &TableMeta, columns: &[&ColumnMeta], values: &[String]) -> String {
        let mut sql = format!("INSERT INTO {} (", self.table_name(table));
        sql.push_str(
            &columns
                .iter()
                .map(|c| self.quote_name(&c.column))
                .collect::<Vec<_>>()
                .join(", "),
        );
        sql.push(')');
        if let Some(identity) = table.identity_column() {
            sql.push_str(&format!(" OUTPUT INSERTED.{}", self.quote_name(&identity.column)));
        }
        sql.push_str(&format!(" VALUES ({})", values.join(", ")));
        sql
    }

    fn db_type_sql(&self, db_type: &DbType) -> String {
        match db_type {
            DbType::Bool => "BIT".into(),
            DbType::Int32 | DbType::Enum => "INT".into(),
            DbType::Int64 => "BIGINT".into(),
            DbType::Float => "FLOAT".into(),
            DbType::Text(Some(n)) => format!("NVARCHAR({n})"),
            DbType::Text(None) => "NVARCHAR(MAX)".into(),
            DbType::Bytes => "VARBINARY(MAX)".into(),
            DbType::Guid => "UNIQUEIDENTIFIER".into(),
            DbType::DateTime => "DATETIME2".into(),
            DbType::DateTimeTz => "DATETIMEOFFSET".into(),
            other => ddl::ansi_type(other),
        }
    }

    fn identity_clause(&self, _column: &ColumnMeta) -> Option<String> {
        Some("IDENTITY(1,1)".to_string())
    }

    fn add_column_sql(&self, table: &TableMeta, column: &ColumnMeta) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.table_name(table),
            self.column_definition(column)
        )
    }

    fn function_names(&self) -> &'static [(&'static str, &'static str)] {
        &[("Length", "LEN"), ("NewGuid", "NEWID")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> SelectParts {
        SelectParts {
            columns: "[Id]".into(),
            from: "[User]".into(),
            order_by: Some("[Id] ASC".into()),
            ..Default::default()
        }
    }

    #[test]
    fn take_without_skip_uses_top() {
        assert_eq!(
            SqlServer::default().paginate(&parts(), 0, Some(10)),
            "SELECT TOP (10) [Id] FROM [User] ORDER BY [Id] ASC"
        );
        assert_eq!(
            SqlServer::default().paginate(&parts(), 5, Some(10)),
            "SELECT [Id] FROM [User] ORDER BY [Id] ASC OFFSET 5 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn bool_literals_are_bits() {
        let d = SqlServer::default();
        assert_eq!(d.literal_sql(&Scalar::Bool(true)), "1");
        assert_eq!(d.literal_sql(&Scalar::Bool(false)), "0");
        assert_eq!(d.literal_sql(&Scalar::Int(7)), "7");
        assert_eq!(d.literal_sql(&Scalar::from("it's")), "'it''s'");
    }

    #[test]
    fn concat_uses_plus_and_escapes_brackets() {
        let d = SqlServer::default();
        assert_eq!(d.concat(&["a".into(), "b".into()]), "(a + b)");
        assert_eq!(d.escape_like("[x]"), "/[x]");
    }

    #[test]
    fn insert_outputs_identity() {
        let t = TableMeta::new("User")
            .with_column(ColumnMeta::new("Id", DbType::Int32).primary_key().identity())
            .with_column(ColumnMeta::new("Name", DbType::Text(Some(20))));
        let cols = vec![t.column("Name").unwrap()];
        assert_eq!(
            SqlServer::default().insert_sql(&t, &cols, &["@0".into()]),
            "INSERT INTO [User] ([Name]) OUTPUT INSERTED.[Id] VALUES (@0)"
        );
    }
}
