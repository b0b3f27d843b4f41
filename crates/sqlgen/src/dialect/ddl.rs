//! Shared renderers for inserts, batch writes and schema statements.
//!
//! Dialects call these from their trait methods and override only the
//! pieces that differ (type names, identity clauses, row constructors).

use super::{BoolStorage, EnumStorage, GuidStorage, SqlDialect};
use crate::meta::{ColumnMeta, DbType, IndexMeta, TableMeta};

fn column_list<D: SqlDialect + ?Sized>(d: &D, columns: &[&ColumnMeta]) -> String {
    columns
        .iter()
        .map(|c| d.quote_name(&c.column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `INSERT INTO t (cols) VALUES (vals)[ suffix]`
pub fn insert<D: SqlDialect + ?Sized>(
    d: &D,
    table: &TableMeta,
    columns: &[&ColumnMeta],
    values: &[String],
    suffix: Option<&str>,
) -> String {
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        d.table_name(table),
        column_list(d, columns),
        values.join(", ")
    );
    if let Some(suffix) = suffix {
        sql.push(' ');
        sql.push_str(suffix);
    }
    sql
}

pub fn multi_row_insert<D: SqlDialect + ?Sized>(
    d: &D,
    table: &TableMeta,
    columns: &[&ColumnMeta],
    rows: &[Vec<String>],
) -> String {
    let tuples = rows
        .iter()
        .map(|row| format!("({})", row.join(", ")))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        d.table_name(table),
        column_list(d, columns),
        tuples
    )
}

fn key_predicate<D: SqlDialect + ?Sized>(d: &D, keys: &[&ColumnMeta], values: &[String]) -> String {
    keys.iter()
        .zip(values)
        .map(|(k, v)| format!("{} = {}", d.quote_name(&k.column), v))
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub fn per_row_update<D: SqlDialect + ?Sized>(
    d: &D,
    table: &TableMeta,
    sets: &[&ColumnMeta],
    keys: &[&ColumnMeta],
    rows: &[Vec<String>],
) -> String {
    rows.iter()
        .map(|row| {
            let (set_vals, key_vals) = row.split_at(sets.len().min(row.len()));
            let assignments = sets
                .iter()
                .zip(set_vals)
                .map(|(c, v)| format!("{} = {}", d.quote_name(&c.column), v))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "UPDATE {} SET {} WHERE {}",
                d.table_name(table),
                assignments,
                key_predicate(d, keys, key_vals)
            )
        })
        .collect::<Vec<_>>()
        .join(";\n")
}

/// Single key: `IN (...)`; composite keys: OR of per-row conjunctions.
pub fn keyed_delete<D: SqlDialect + ?Sized>(
    d: &D,
    table: &TableMeta,
    keys: &[&ColumnMeta],
    rows: &[Vec<String>],
) -> String {
    let predicate = if keys.len() == 1 {
        let values = rows
            .iter()
            .filter_map(|r| r.first().cloned())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} IN ({})", d.quote_name(&keys[0].column), values)
    } else {
        rows.iter()
            .map(|r| format!("({})", key_predicate(d, keys, r)))
            .collect::<Vec<_>>()
            .join(" OR ")
    };
    format!("DELETE FROM {} WHERE {}", d.table_name(table), predicate)
}

pub fn ansi_type(db_type: &DbType) -> String {
    match db_type {
        DbType::Bool => "BOOLEAN".into(),
        DbType::Int32 => "INTEGER".into(),
        DbType::Int64 => "BIGINT".into(),
        DbType::Float => "DOUBLE PRECISION".into(),
        DbType::Decimal { precision, scale } => format!("DECIMAL({precision}, {scale})"),
        DbType::Text(Some(n)) => format!("VARCHAR({n})"),
        DbType::Text(None) => "CLOB".into(),
        DbType::Bytes => "BLOB".into(),
        DbType::Guid => "CHAR(36)".into(),
        DbType::Date => "DATE".into(),
        DbType::DateTime => "TIMESTAMP".into(),
        DbType::DateTimeTz => "TIMESTAMP WITH TIME ZONE".into(),
        DbType::Enum => "INTEGER".into(),
    }
}

/// Map the logical type through the storage options, then to the dialect's
/// type name.
pub fn column_type<D: SqlDialect + ?Sized>(d: &D, column: &ColumnMeta) -> String {
    let stored = match &column.db_type {
        DbType::Bool => match d.bool_storage() {
            BoolStorage::Native => DbType::Bool,
            BoolStorage::Integer => DbType::Int32,
            BoolStorage::YesNo => return "CHAR(1)".into(),
        },
        DbType::Enum => match d.options().enum_storage {
            EnumStorage::Integer => DbType::Int32,
            EnumStorage::Name => DbType::Text(Some(64)),
        },
        DbType::Guid => match d.guid_storage() {
            GuidStorage::Native => DbType::Guid,
            GuidStorage::Text => DbType::Text(Some(36)),
            GuidStorage::Blob => DbType::Bytes,
        },
        DbType::DateTimeTz if !d.supports_offsets() => DbType::DateTime,
        other => other.clone(),
    };
    d.db_type_sql(&stored)
}

pub fn column_definition<D: SqlDialect + ?Sized>(d: &D, column: &ColumnMeta) -> String {
    let mut sql = format!("{} {}", d.quote_name(&column.column), d.column_type_sql(column));
    if column.identity
        && let Some(clause) = d.identity_clause(column)
    {
        sql.push(' ');
        sql.push_str(&clause);
    }
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    sql
}

pub fn create_table<D: SqlDialect + ?Sized>(d: &D, table: &TableMeta) -> String {
    let mut lines: Vec<String> = table
        .columns
        .iter()
        .filter(|c| c.expression.is_none())
        .map(|c| format!("  {}", d.column_definition(c)))
        .collect();
    let keys: Vec<&ColumnMeta> = table.primary_keys().collect();
    if !keys.is_empty() {
        lines.push(format!("  PRIMARY KEY ({})", column_list(d, &keys)));
    }
    format!("CREATE TABLE {} (\n{}\n)", d.table_name(table), lines.join(",\n"))
}

pub fn create_index<D: SqlDialect + ?Sized>(d: &D, table: &TableMeta, index: &IndexMeta) -> String {
    let columns = index
        .properties
        .iter()
        .map(|p| {
            let name = table.column(p).map_or(p.as_str(), |c| c.column.as_str());
            d.quote_name(name)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        d.quote_name(&index.name),
        d.table_name(table),
        columns
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{DialectOptions, Generic};

    fn users() -> TableMeta {
        TableMeta::new("User")
            .with_column(ColumnMeta::new("Id", DbType::Int64).primary_key().identity())
            .with_column(ColumnMeta::new("Name", DbType::Text(Some(50))))
            .with_column(ColumnMeta::new("Active", DbType::Bool).nullable())
            .with_index("IX_User_Name", &["Name"], true)
    }

    #[test]
    fn create_table_lists_columns_and_key() {
        let sql = Generic::default().create_table_sql(&users());
        assert_eq!(
            sql,
            "CREATE TABLE [User] (\n  [Id] BIGINT GENERATED BY DEFAULT AS IDENTITY NOT NULL,\n  \
             [Name] VARCHAR(50) NOT NULL,\n  [Active] INTEGER,\n  PRIMARY KEY ([Id])\n)"
        );
    }

    #[test]
    fn bool_storage_changes_column_type() {
        let d = Generic::new(DialectOptions::default().with_bool_storage(BoolStorage::YesNo));
        let col = ColumnMeta::new("Active", DbType::Bool);
        assert_eq!(d.column_type_sql(&col), "CHAR(1)");
    }

    #[test]
    fn unique_index() {
        let t = users();
        assert_eq!(
            Generic::default().create_index_sql(&t, &t.indexes[0]),
            "CREATE UNIQUE INDEX [IX_User_Name] ON [User] ([Name])"
        );
    }

    #[test]
    fn composite_key_delete() {
        let t = TableMeta::new("Link")
            .with_column(ColumnMeta::new("A", DbType::Int32).primary_key())
            .with_column(ColumnMeta::new("B", DbType::Int32).primary_key());
        let keys: Vec<_> = t.primary_keys().collect();
        let rows = vec![
            vec!["@0".to_string(), "@1".to_string()],
            vec!["@2".to_string(), "@3".to_string()],
        ];
        assert_eq!(
            Generic::default().batch_delete_sql(&t, &keys, &rows),
            "DELETE FROM [Link] WHERE ([A] = @0 AND [B] = @1) OR ([A] = @2 AND [B] = @3)"
        );
    }
}
