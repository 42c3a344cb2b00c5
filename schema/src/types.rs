//! Schema definition types.

use std::sync::Arc;

/// Storage class of a column, as far as JSON conversion is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnType {
    #[default]
    Unknown,
    Integer,
    Double,
    Boolean,
    String,
    Binary,
    Geometry,
    Json,
}

/// How a primary key column gets its value when the document omits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdGeneration {
    #[default]
    None,
    AutoIncrement,
    /// UUID stored time-high-first, as produced by `UUID_TO_BIN(uuid, 1)`.
    ReverseUuid,
}

/// Column definition within a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name in the database.
    pub name: String,
    /// SQL data type as declared (e.g. "bigint unsigned").
    pub datatype: String,
    pub column_type: ColumnType,
    pub is_primary: bool,
    pub is_row_owner: bool,
    /// Computed by the server; never written.
    pub is_generated: bool,
    pub not_null: bool,
    pub id_generation: IdGeneration,
    /// Per column override of the table's update capability.
    pub with_update: Option<bool>,
    /// Spatial reference system for geometry columns.
    pub srid: u32,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        let datatype = match column_type {
            ColumnType::Unknown => "text",
            ColumnType::Integer => "int",
            ColumnType::Double => "double",
            ColumnType::Boolean => "bit(1)",
            ColumnType::String => "varchar(255)",
            ColumnType::Binary => "binary(16)",
            ColumnType::Geometry => "geometry",
            ColumnType::Json => "json",
        };
        Self {
            name: name.into(),
            datatype: datatype.to_string(),
            column_type,
            is_primary: false,
            is_row_owner: false,
            is_generated: false,
            not_null: false,
            id_generation: IdGeneration::None,
            with_update: None,
            srid: 0,
        }
    }

    /// Primary key columns are implicitly NOT NULL.
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self.not_null = true;
        self
    }

    pub fn row_owner(mut self) -> Self {
        self.is_row_owner = true;
        self
    }

    pub fn generated(mut self) -> Self {
        self.is_generated = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.id_generation = IdGeneration::AutoIncrement;
        self
    }

    pub fn reverse_uuid(mut self) -> Self {
        self.id_generation = IdGeneration::ReverseUuid;
        self
    }

    pub fn no_update(mut self) -> Self {
        self.with_update = Some(false);
        self
    }

    pub fn with_datatype(mut self, datatype: impl Into<String>) -> Self {
        self.datatype = datatype.into();
        self
    }

    pub fn with_srid(mut self, srid: u32) -> Self {
        self.srid = srid;
        self
    }

    /// True for 64 bit integers, which JSON consumers may not represent
    /// exactly.
    pub fn is_bigint(&self) -> bool {
        self.column_type == ColumnType::Integer
            && self.datatype.to_ascii_lowercase().starts_with("bigint")
    }

    /// True when the server fills the value if it is omitted.
    pub fn is_auto_generated(&self) -> bool {
        self.is_generated || self.id_generation != IdGeneration::None
    }
}

/// Operations a table allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrudOperations {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl Default for CrudOperations {
    fn default() -> Self {
        Self {
            insert: true,
            update: true,
            delete: true,
        }
    }
}

/// A nested object or array joined to its owner by a foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyReference {
    /// The nested table.
    pub table: Arc<Table>,
    /// Ordered `(owner column, nested table column)` pairs.
    pub column_mapping: Vec<(String, String)>,
    pub to_many: bool,
    /// Nested fields are merged into the owner's object.
    pub unnest: bool,
}

impl ForeignKeyReference {
    pub fn to_one(table: Arc<Table>) -> Self {
        Self {
            table,
            column_mapping: Vec::new(),
            to_many: false,
            unnest: false,
        }
    }

    pub fn to_many(table: Arc<Table>) -> Self {
        Self {
            to_many: true,
            ..Self::to_one(table)
        }
    }

    pub fn map(mut self, this_column: impl Into<String>, other_column: impl Into<String>) -> Self {
        self.column_mapping
            .push((this_column.into(), other_column.into()));
        self
    }

    pub fn unnested(mut self) -> Self {
        self.unnest = true;
        self
    }

    /// True when the nested rows hold the foreign key pointing at `owner`.
    ///
    /// To-many references always do. A to-one reference does when every
    /// owner-side column of the mapping is part of the owner's primary key.
    pub fn is_referencing_this(&self, owner: &Table) -> bool {
        self.to_many
            || self.column_mapping.iter().all(|(this_col, _)| {
                owner
                    .get_column(this_col)
                    .map(|c| c.is_primary)
                    .unwrap_or(false)
            })
    }

    pub fn this_columns(&self) -> impl Iterator<Item = &str> {
        self.column_mapping.iter().map(|(c, _)| c.as_str())
    }

    pub fn other_columns(&self) -> impl Iterator<Item = &str> {
        self.column_mapping.iter().map(|(_, c)| c.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Column(Column),
    Reference(ForeignKeyReference),
}

/// A JSON member of a table's document.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Key in the JSON object.
    pub name: String,
    /// Disabled fields are neither read nor written.
    pub enabled: bool,
    /// Excluded from etag computation and update completeness checks.
    pub no_check: bool,
    pub kind: FieldKind,
}

impl Field {
    pub fn column(name: impl Into<String>, column: Column) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            no_check: false,
            kind: FieldKind::Column(column),
        }
    }

    pub fn reference(name: impl Into<String>, reference: ForeignKeyReference) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            no_check: false,
            kind: FieldKind::Reference(reference),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn no_check(mut self) -> Self {
        self.no_check = true;
        self
    }

    /// Enabled and participating in checks.
    pub fn is_checked(&self) -> bool {
        self.enabled && !self.no_check
    }

    pub fn as_column(&self) -> Option<&Column> {
        match &self.kind {
            FieldKind::Column(c) => Some(c),
            FieldKind::Reference(_) => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ForeignKeyReference> {
        match &self.kind {
            FieldKind::Reference(r) => Some(r),
            FieldKind::Column(_) => None,
        }
    }
}

/// A table exposed as a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub schema: String,
    pub table: String,
    pub crud: CrudOperations,
    /// Declaration order is processing, checksum and error order.
    pub fields: Vec<Field>,
}

impl Table {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            crud: CrudOperations::default(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn column(self, name: impl Into<String>, column: Column) -> Self {
        self.field(Field::column(name, column))
    }

    pub fn reference(self, name: impl Into<String>, reference: ForeignKeyReference) -> Self {
        self.field(Field::reference(name, reference))
    }

    pub fn with_insert(mut self, allowed: bool) -> Self {
        self.crud.insert = allowed;
        self
    }

    pub fn with_update(mut self, allowed: bool) -> Self {
        self.crud.update = allowed;
        self
    }

    pub fn with_delete(mut self, allowed: bool) -> Self {
        self.crud.delete = allowed;
        self
    }

    pub fn read_only(self) -> Self {
        self.with_insert(false).with_update(false).with_delete(false)
    }

    /// `schema.table`, for messages.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field backed by the given database column, enabled or not.
    pub fn get_column_field(&self, column: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.as_column().map(|c| c.name == column).unwrap_or(false))
    }

    pub fn get_column(&self, column: &str) -> Option<&Column> {
        self.get_column_field(column).and_then(Field::as_column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.fields.iter().filter_map(Field::as_column)
    }

    pub fn primary_key_columns(&self) -> Vec<&Column> {
        self.columns().filter(|c| c.is_primary).collect()
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        self.get_column(column).map(|c| c.is_primary).unwrap_or(false)
    }

    pub fn row_owner_column(&self) -> Option<&Column> {
        self.columns().find(|c| c.is_row_owner)
    }

    /// The primary key column filled by a generation strategy, if any.
    pub fn generated_id_column(&self) -> Option<&Column> {
        self.columns()
            .find(|c| c.is_primary && c.id_generation != IdGeneration::None)
    }

    /// Whether UPDATE statements may assign this column.
    pub fn is_column_updatable(&self, column: &Column) -> bool {
        !column.is_generated && column.with_update.unwrap_or(self.crud.update)
    }
}
