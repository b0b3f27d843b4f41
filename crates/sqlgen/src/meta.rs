//! Table metadata consumed by the compiler and DDL synthesis.
//!
//! Entities are addressed by their logical name (what a pipeline's `Table`
//! segment carries); columns by their logical property name.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Storage type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbType {
    Bool,
    Int32,
    Int64,
    Float,
    Decimal { precision: u8, scale: u8 },
    /// Text with an optional maximum length
    Text(Option<u32>),
    Bytes,
    Guid,
    Date,
    DateTime,
    DateTimeTz,
    /// Enum column; stored per the dialect's enum storage option
    Enum,
}

impl DbType {
    /// Host type name of values stored in this column, matching the names
    /// typed conversion handlers register under.
    pub fn host_type(&self) -> &'static str {
        match self {
            DbType::Bool => "Boolean",
            DbType::Int32 => "Int32",
            DbType::Int64 => "Int64",
            DbType::Float => "Double",
            DbType::Decimal { .. } => "Decimal",
            DbType::Text(_) => "String",
            DbType::Bytes => "Bytes",
            DbType::Guid => "Guid",
            DbType::Date => "DateOnly",
            DbType::DateTime => "DateTime",
            DbType::DateTimeTz => "DateTimeOffset",
            DbType::Enum => "Enum",
        }
    }
}

/// Target of a foreign key: an entity and the property it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignRef {
    pub entity: String,
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub property: String,
    pub column: String,
    pub db_type: DbType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub identity: bool,
    /// Sequence feeding an identity column on backends without identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign: Option<ForeignRef>,
    /// Computed column: SQL rendered in place of the column reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl ColumnMeta {
    /// A column whose physical name equals its property name.
    pub fn new(property: impl Into<String>, db_type: DbType) -> Self {
        let property = property.into();
        Self {
            column: property.clone(),
            property,
            db_type,
            nullable: false,
            primary_key: false,
            identity: false,
            sequence: None,
            foreign: None,
            expression: None,
        }
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.column = name.into();
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn sequence(mut self, name: impl Into<String>) -> Self {
        self.sequence = Some(name.into());
        self
    }

    pub fn references(mut self, entity: impl Into<String>, property: impl Into<String>) -> Self {
        self.foreign = Some(ForeignRef {
            entity: entity.into(),
            property: property.into(),
        });
        self
    }

    pub fn computed(mut self, sql: impl Into<String>) -> Self {
        self.expression = Some(sql.into());
        self
    }

    /// Whether values are written by the application.
    pub fn is_writable(&self) -> bool {
        !self.identity && self.expression.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    /// Property names, in key order
    pub properties: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub entity: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub columns: Vec<ColumnMeta>,
    #[serde(default)]
    pub indexes: Vec<IndexMeta>,
}

impl TableMeta {
    /// A table whose physical name equals its entity name.
    pub fn new(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self {
            name: entity.clone(),
            entity,
            schema: None,
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_column(mut self, column: ColumnMeta) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_index(
        mut self,
        name: impl Into<String>,
        properties: &[&str],
        unique: bool,
    ) -> Self {
        self.indexes.push(IndexMeta {
            name: name.into(),
            properties: properties.iter().map(|p| p.to_string()).collect(),
            unique,
        });
        self
    }

    pub fn column(&self, property: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.property == property)
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &ColumnMeta> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    pub fn identity_column(&self) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.identity)
    }

    /// Columns giving a stable row order: the primary key, else the first column.
    pub fn stable_order(&self) -> Vec<&ColumnMeta> {
        let keys: Vec<_> = self.primary_keys().collect();
        if keys.is_empty() {
            self.columns.iter().take(1).collect()
        } else {
            keys
        }
    }
}

/// Source of table metadata for the compiler.
pub trait MetadataLookup: Send + Sync {
    fn table(&self, entity: &str) -> Option<&TableMeta>;

    fn resolve_column(&self, entity: &str, property: &str) -> Option<&ColumnMeta> {
        self.table(entity)?.column(property)
    }
}

/// In-memory metadata store keyed by entity name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    tables: IndexMap<String, TableMeta>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableMeta) -> Self {
        self.register(table);
        self
    }

    /// Register or replace a table.
    pub fn register(&mut self, table: TableMeta) {
        log::debug!("registered table {} as {}", table.entity, table.name);
        self.tables.insert(table.entity.clone(), table);
    }

    pub fn remove(&mut self, entity: &str) -> Option<TableMeta> {
        self.tables.shift_remove(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl MetadataLookup for Catalog {
    fn table(&self, entity: &str) -> Option<&TableMeta> {
        self.tables.get(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableMeta {
        TableMeta::new("User")
            .table_name("users")
            .with_column(ColumnMeta::new("Id", DbType::Int64).primary_key().identity())
            .with_column(ColumnMeta::new("Name", DbType::Text(Some(100))).column("user_name"))
            .with_column(ColumnMeta::new("Age", DbType::Int32))
    }

    #[test]
    fn resolves_columns_by_property() {
        let catalog = Catalog::new().with_table(users());
        let col = catalog.resolve_column("User", "Name").unwrap();
        assert_eq!(col.column, "user_name");
        assert!(catalog.resolve_column("User", "Missing").is_none());
        assert!(catalog.resolve_column("Order", "Id").is_none());
    }

    #[test]
    fn stable_order_prefers_primary_key() {
        let t = users();
        let order: Vec<_> = t.stable_order().iter().map(|c| c.property.as_str()).collect();
        assert_eq!(order, ["Id"]);

        let keyless = TableMeta::new("Log").with_column(ColumnMeta::new("At", DbType::DateTime));
        assert_eq!(keyless.stable_order()[0].property, "At");
    }

    #[test]
    fn catalog_deserializes_from_json() {
        let json = r#"{"tables": {"User": {"entity": "User", "name": "users",
            "columns": [{"property": "Id", "column": "id", "db_type": "int64", "primary_key": true}]}}}"#;
        let catalog: Catalog = serde_json::from_str(json).unwrap();
        assert!(catalog.table("User").unwrap().column("Id").unwrap().primary_key);
    }
}
