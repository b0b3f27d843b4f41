use super::{DialectKind, DialectOptions, SelectParts, SqlDialect, ddl};
use crate::meta::{ColumnMeta, DbType, TableMeta};

/// MySQL and MariaDB.
#[derive(Debug, Clone, Default)]
pub struct MySql {
    options: DialectOptions,
}

impl MySql {
    pub fn new(options: DialectOptions) -> Self {
        Self { options }
    }
}

impl SqlDialect for MySql {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn options(&self) -> &DialectOptions {
        &self.options
    }

    fn quote_name(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn string_literal(&self, s: &str) -> String {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn regexp_like(&self, subject: &str, pattern: &str) -> String {
        format!("{subject} REGEXP {pattern}")
    }

    fn supports_offsets(&self) -> bool {
        false
    }

    fn paginate(&self, parts: &SelectParts, skip: u64, take: Option<u64>) -> String {
        let mut sql = parts.render(None);
        match (skip, take) {
            (0, Some(take)) => sql.push_str(&format!(" LIMIT {take}")),
            (skip, Some(take)) => sql.push_str(&format!(" LIMIT {skip}, {take}")),
            // MySQL has no open-ended LIMIT
            (skip, None) => sql.push_str(&format!(" LIMIT {skip}, {}", u64::MAX)),
        }
        sql
    }

    fn insert_sql(&self, table: &TableMeta, columns: &[&ColumnMeta], values: &[String]) -> String {
        let mut sql = ddl::insert(self, table, columns, values, None);
        if table.identity_column().is_some() {
            sql.push_str("; SELECT LAST_INSERT_ID()");
        }
        sql
    }

    fn db_type_sql(&self, db_type: &DbType) -> String {
        match db_type {
            DbType::Bool => "TINYINT(1)".into(),
            DbType::Int32 | DbType::Enum => "INT".into(),
            DbType::Float => "DOUBLE".into(),
            DbType::Text(Some(n)) => format!("VARCHAR({n})"),
            DbType::Text(None) => "LONGTEXT".into(),
            DbType::Bytes => "LONGBLOB".into(),
            DbType::DateTime | DbType::DateTimeTz => "DATETIME(6)".into(),
            other => ddl::ansi_type(other),
        }
    }

    fn identity_clause(&self, _column: &ColumnMeta) -> Option<String> {
        Some("AUTO_INCREMENT".to_string())
    }

    fn function_names(&self) -> &'static [(&'static str, &'static str)] {
        &[("Length", "CHAR_LENGTH"), ("NewGuid", "UUID")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_forms() {
        let parts = SelectParts {
            columns: "*".into(),
            from: "`T`".into(),
            order_by: Some("`Id` ASC".into()),
            ..Default::default()
        };
        let d = MySql::default();
        assert!(d.paginate(&parts, 0, Some(3)).ends_with("LIMIT 3"));
        assert!(d.paginate(&parts, 20, Some(10)).ends_with("LIMIT 20, 10"));
        assert!(
            d.paginate(&parts, 20, None)
                .ends_with("LIMIT 20, 18446744073709551615")
        );
    }

    #[test]
    fn backtick_quoting_and_regexp() {
        let d = MySql::default();
        assert_eq!(d.quote_name("a`b"), "`a``b`");
        assert_eq!(d.regexp_like("`Name`", "@0"), "`Name` REGEXP @0");
        assert_eq!(d.concat(&["a".into(), "b".into()]), "CONCAT(a, b)");
    }

    #[test]
    fn insert_selects_last_id() {
        let t = TableMeta::new("User")
            .with_column(ColumnMeta::new("Id", DbType::Int32).primary_key().identity())
            .with_column(ColumnMeta::new("Name", DbType::Text(Some(20))));
        let cols = vec![t.column("Name").unwrap()];
        assert_eq!(
            MySql::default().insert_sql(&t, &cols, &["@0".into()]),
            "INSERT INTO `User` (`Name`) VALUES (@0); SELECT LAST_INSERT_ID()"
        );
    }
}
