//! Relation schemas with precomputed column-name resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use osprey_common::{AttrType, OspreyError, Result};

/// Definition of a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Attribute type.
    pub attr: AttrType,
    /// On-disk cell width in bytes.
    pub width: u16,
}

impl ColumnDef {
    /// Default on-disk width for string cells (2-byte length prefix + data).
    pub const DEFAULT_STR_WIDTH: u16 = 32;

    /// Creates a column definition with the default width for its type.
    pub fn new(name: impl Into<String>, attr: AttrType) -> Self {
        let width = match attr {
            AttrType::Int | AttrType::Real => 8,
            AttrType::Str => Self::DEFAULT_STR_WIDTH,
        };
        Self {
            name: name.into(),
            attr,
            width,
        }
    }

    /// Creates a string column with an explicit on-disk width.
    pub fn string(name: impl Into<String>, width: u16) -> Self {
        Self {
            name: name.into(),
            attr: AttrType::Str,
            width,
        }
    }
}

/// An ordered column list with a name-to-ordinal map built once at load.
///
/// Column ordinals are 1-based throughout the engine.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<ColumnDef>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    /// Builds a schema, rejecting duplicate names and unusable cell widths.
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(columns.len());
        for (idx, col) in columns.iter().enumerate() {
            let width_ok = match col.attr {
                AttrType::Int | AttrType::Real => col.width == 8,
                // Length prefix plus at least one byte of content
                AttrType::Str => col.width >= 3,
            };
            if !width_ok {
                return Err(OspreyError::Format(format!(
                    "column {}: width {} unusable for {}",
                    col.name, col.width, col.attr
                )));
            }
            if by_name.insert(col.name.clone(), idx + 1).is_some() {
                return Err(OspreyError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self { columns, by_name })
    }

    /// Returns the column definitions in declaration order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Resolves a column name to its 1-based ordinal.
    ///
    /// Unknown names are a hard error, never a silent placeholder ordinal.
    pub fn ordinal(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| OspreyError::ColumnNotFound(name.to_string()))
    }

    /// Resolves a list of column names to 1-based ordinals.
    pub fn ordinals(&self, names: &[String]) -> Result<Vec<usize>> {
        names.iter().map(|n| self.ordinal(n)).collect()
    }

    /// Returns the column definition at a 1-based ordinal.
    pub fn column(&self, ordinal: usize) -> Result<&ColumnDef> {
        if ordinal == 0 || ordinal > self.columns.len() {
            return Err(OspreyError::ColumnNotFound(format!(
                "ordinal {} out of range for {} columns",
                ordinal,
                self.columns.len()
            )));
        }
        Ok(&self.columns[ordinal - 1])
    }

    /// Returns the attribute type of the column at a 1-based ordinal.
    pub fn attr_type(&self, ordinal: usize) -> Result<AttrType> {
        Ok(self.column(ordinal)?.attr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::new(vec![
            ColumnDef::new("id", AttrType::Int),
            ColumnDef::string("name", 24),
            ColumnDef::new("score", AttrType::Real),
        ])
        .unwrap()
    }

    #[test]
    fn test_ordinals_are_one_based() {
        let schema = sample();
        assert_eq!(schema.ordinal("id").unwrap(), 1);
        assert_eq!(schema.ordinal("name").unwrap(), 2);
        assert_eq!(schema.ordinal("score").unwrap(), 3);
    }

    #[test]
    fn test_unknown_name_is_an_error() {
        let schema = sample();
        let err = schema.ordinal("missing").unwrap_err();
        assert!(matches!(err, OspreyError::ColumnNotFound(name) if name == "missing"));
    }

    #[test]
    fn test_ordinals_preserve_request_order() {
        let schema = sample();
        let resolved = schema
            .ordinals(&["score".to_string(), "id".to_string()])
            .unwrap();
        assert_eq!(resolved, vec![3, 1]);
    }

    #[test]
    fn test_ordinals_fail_on_any_unknown() {
        let schema = sample();
        assert!(schema
            .ordinals(&["id".to_string(), "ghost".to_string()])
            .is_err());
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = Schema::new(vec![
            ColumnDef::new("a", AttrType::Int),
            ColumnDef::new("a", AttrType::Real),
        ])
        .unwrap_err();
        assert!(matches!(err, OspreyError::DuplicateColumn(name) if name == "a"));
    }

    #[test]
    fn test_column_lookup() {
        let schema = sample();
        assert_eq!(schema.column(2).unwrap().name, "name");
        assert_eq!(schema.attr_type(3).unwrap(), AttrType::Real);
        assert!(schema.column(0).is_err());
        assert!(schema.column(4).is_err());
    }

    #[test]
    fn test_bad_width_rejected() {
        let err = Schema::new(vec![ColumnDef {
            name: "id".to_string(),
            attr: AttrType::Int,
            width: 4,
        }])
        .unwrap_err();
        assert!(matches!(err, OspreyError::Format(_)));
    }

    #[test]
    fn test_default_widths() {
        let id = ColumnDef::new("id", AttrType::Int);
        assert_eq!(id.width, 8);
        let name = ColumnDef::new("name", AttrType::Str);
        assert_eq!(name.width, ColumnDef::DEFAULT_STR_WIDTH);
    }
}
