//! Structural validation of a table graph.

use std::collections::HashSet;
use thiserror::Error;

use crate::{FieldKind, Table};

/// Errors found in a schema definition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Duplicate field name '{field}' in {table}")]
    DuplicateField { table: String, field: String },

    #[error("Table {0} has no primary key")]
    MissingPrimaryKey(String),

    #[error("Reference '{field}' in {table} has an empty column mapping")]
    EmptyMapping { table: String, field: String },

    #[error("Reference '{field}' in {table} maps unknown column {column}")]
    UnknownMappedColumn {
        table: String,
        field: String,
        column: String,
    },

    #[error("Reference '{field}' in {table} cannot unnest a to-many relation")]
    UnnestedToMany { table: String, field: String },

    #[error("Reference '{field}' in {table} cannot unnest rows that reference it")]
    UnnestedReferencingOwner { table: String, field: String },
}

pub type SchemaResult<T> = Result<T, SchemaError>;

impl SchemaError {
    pub fn duplicate_field(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::DuplicateField {
            table: table.into(),
            field: field.into(),
        }
    }

    pub fn unknown_mapped_column(
        table: impl Into<String>,
        field: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self::UnknownMappedColumn {
            table: table.into(),
            field: field.into(),
            column: column.into(),
        }
    }
}

/// Validate a table and every table nested under it.
pub fn validate(table: &Table) -> SchemaResult<()> {
    if table.primary_key_columns().is_empty() {
        return Err(SchemaError::MissingPrimaryKey(table.full_name()));
    }

    let mut names = HashSet::new();
    for field in &table.fields {
        if !names.insert(field.name.as_str()) {
            return Err(SchemaError::duplicate_field(table.full_name(), &field.name));
        }

        let FieldKind::Reference(reference) = &field.kind else {
            continue;
        };
        if reference.column_mapping.is_empty() {
            return Err(SchemaError::EmptyMapping {
                table: table.full_name(),
                field: field.name.clone(),
            });
        }
        if reference.unnest && reference.to_many {
            return Err(SchemaError::UnnestedToMany {
                table: table.full_name(),
                field: field.name.clone(),
            });
        }
        // Unnested members only copy the nested key into this row's FK columns.
        if reference.unnest && reference.is_referencing_this(table) {
            return Err(SchemaError::UnnestedReferencingOwner {
                table: table.full_name(),
                field: field.name.clone(),
            });
        }
        for (this_col, other_col) in &reference.column_mapping {
            if table.get_column(this_col).is_none() {
                return Err(SchemaError::unknown_mapped_column(
                    table.full_name(),
                    &field.name,
                    this_col,
                ));
            }
            if reference.table.get_column(other_col).is_none() {
                return Err(SchemaError::unknown_mapped_column(
                    reference.table.full_name(),
                    &field.name,
                    other_col,
                ));
            }
        }
        validate(&reference.table)?;
    }
    Ok(())
}
