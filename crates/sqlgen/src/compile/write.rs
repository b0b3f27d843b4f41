//! Row writes and schema statements

use super::emit::Emitter;
use super::{CompileError, CompiledQuery, Result, SqlGen};
use crate::ast::Scalar;
use crate::meta::{ColumnMeta, TableMeta};

fn writable<'t>(table: &'t TableMeta, property: &str) -> Result<&'t ColumnMeta> {
    let column = table
        .column(property)
        .ok_or_else(|| CompileError::UnknownProperty {
            property: property.to_string(),
            table: table.entity.clone(),
        })?;
    if !column.is_writable() {
        return Err(CompileError::NotWritable {
            property: property.to_string(),
            table: table.entity.clone(),
        });
    }
    Ok(column)
}

fn primary_keys(table: &TableMeta) -> Result<Vec<&ColumnMeta>> {
    let keys: Vec<_> = table.primary_keys().collect();
    if keys.is_empty() {
        return Err(CompileError::NoPrimaryKey(table.entity.clone()));
    }
    Ok(keys)
}

/// Bind each row against `columns`, checking row width.
fn bind_rows(
    emitter: &mut Emitter<'_>,
    columns: &[&ColumnMeta],
    rows: &[Vec<Scalar>],
) -> Result<Vec<Vec<String>>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() != columns.len() {
                return Err(CompileError::RowLength {
                    row: i,
                    expected: columns.len(),
                    got: row.len(),
                });
            }
            Ok(columns
                .iter()
                .zip(row)
                .map(|(column, value)| emitter.bind(value, Some(&column.db_type)))
                .collect())
        })
        .collect()
}

impl SqlGen {
    /// `INSERT` one row. The identity column is filled by the database and
    /// returned the way the dialect supports.
    pub fn insert(&self, entity: &str, values: &[(&str, Scalar)]) -> Result<CompiledQuery> {
        let table = self.table(entity)?;
        let columns = values
            .iter()
            .map(|(property, _)| writable(table, property))
            .collect::<Result<Vec<_>>>()?;
        let row: Vec<Scalar> = values.iter().map(|(_, v)| v.clone()).collect();
        let mut emitter = Emitter::new(self, table);
        let placeholders = bind_rows(&mut emitter, &columns, std::slice::from_ref(&row))?
            .pop()
            .unwrap_or_default();
        let sql = self.dialect.insert_sql(table, &columns, &placeholders);
        log::debug!("insert into {entity}: {} columns", columns.len());
        Ok(CompiledQuery {
            sql,
            params: emitter.into_params(),
        })
    }

    /// Multi-row `INSERT`; every row lists values for `columns` in order.
    pub fn batch_insert(
        &self,
        entity: &str,
        columns: &[&str],
        rows: &[Vec<Scalar>],
    ) -> Result<CompiledQuery> {
        let table = self.table(entity)?;
        let columns = columns
            .iter()
            .map(|p| writable(table, p))
            .collect::<Result<Vec<_>>>()?;
        let mut emitter = Emitter::new(self, table);
        let rows = bind_rows(&mut emitter, &columns, rows)?;
        log::debug!("batch insert into {entity}: {} rows", rows.len());
        Ok(CompiledQuery {
            sql: self.dialect.batch_insert_sql(table, &columns, &rows),
            params: emitter.into_params(),
        })
    }

    /// One `UPDATE` per row, keyed on the primary key. Each row holds the
    /// values for `sets` followed by the key values.
    pub fn batch_update(
        &self,
        entity: &str,
        sets: &[&str],
        rows: &[Vec<Scalar>],
    ) -> Result<CompiledQuery> {
        let table = self.table(entity)?;
        let sets = sets
            .iter()
            .map(|p| writable(table, p))
            .collect::<Result<Vec<_>>>()?;
        let keys = primary_keys(table)?;
        let all: Vec<&ColumnMeta> = sets.iter().chain(&keys).copied().collect();
        let mut emitter = Emitter::new(self, table);
        let rows = bind_rows(&mut emitter, &all, rows)?;
        Ok(CompiledQuery {
            sql: self.dialect.batch_update_sql(table, &sets, &keys, &rows),
            params: emitter.into_params(),
        })
    }

    /// `DELETE` rows by primary key; each row holds the key values.
    pub fn batch_delete(&self, entity: &str, keys: &[Vec<Scalar>]) -> Result<CompiledQuery> {
        let table = self.table(entity)?;
        let columns = primary_keys(table)?;
        let mut emitter = Emitter::new(self, table);
        let rows = bind_rows(&mut emitter, &columns, keys)?;
        Ok(CompiledQuery {
            sql: self.dialect.batch_delete_sql(table, &columns, &rows),
            params: emitter.into_params(),
        })
    }

    pub fn create_table(&self, entity: &str) -> Result<String> {
        Ok(self.dialect.create_table_sql(self.table(entity)?))
    }

    /// One statement per declared index.
    pub fn create_indexes(&self, entity: &str) -> Result<Vec<String>> {
        let table = self.table(entity)?;
        Ok(table
            .indexes
            .iter()
            .map(|index| self.dialect.create_index_sql(table, index))
            .collect())
    }

    pub fn add_column(&self, entity: &str, property: &str) -> Result<String> {
        let table = self.table(entity)?;
        let column = table
            .column(property)
            .ok_or_else(|| CompileError::UnknownProperty {
                property: property.to_string(),
                table: entity.to_string(),
            })?;
        Ok(self.dialect.add_column_sql(table, column))
    }
}
