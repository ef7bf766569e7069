//! Column-oriented relation storage.
//!
//! A relation named `r` with `n` columns is stored as `n` paged column
//! files `r.1` … `r.n` plus a JSON catalog `r.schema` holding the schema
//! and row count. Cells are fixed-width, so resolving a rid to a position
//! is pure arithmetic and never touches disk.

use crate::disk::FileId;
use crate::schema::{ColumnDef, Schema};
use crate::store::PageStore;
use crate::tuple::{Position, Rid, Tuple};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use osprey_common::page::{PageHeader, PageType, PAGE_SIZE};
use osprey_common::{AttrType, OspreyError, Result, Value};

/// On-disk catalog document for a relation.
#[derive(Serialize, Deserialize)]
struct RelationCatalog {
    columns: Vec<ColumnDef>,
    row_count: u64,
}

/// A column-oriented relation.
pub struct Relation {
    store: Arc<PageStore>,
    name: String,
    schema: Schema,
    column_files: Vec<FileId>,
    row_count: u64,
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl Relation {
    /// Catalog file name for a relation.
    fn catalog_name(name: &str) -> String {
        format!("{name}.schema")
    }

    /// Column file name for a 1-based column ordinal.
    fn column_name(name: &str, ordinal: usize) -> String {
        format!("{name}.{ordinal}")
    }

    fn catalog_path(store: &PageStore, name: &str) -> PathBuf {
        store.disk().data_dir().join(Self::catalog_name(name))
    }

    /// Creates a new empty relation, writing its catalog and column files.
    pub fn create(store: Arc<PageStore>, name: &str, schema: Schema) -> Result<Self> {
        let mut column_files = Vec::with_capacity(schema.len());
        for ordinal in 1..=schema.len() {
            column_files.push(store.create_file(&Self::column_name(name, ordinal))?);
        }

        let relation = Self {
            store,
            name: name.to_string(),
            schema,
            column_files,
            row_count: 0,
        };
        relation.save()?;
        debug!("created relation {name}");
        Ok(relation)
    }

    /// Opens an existing relation.
    ///
    /// A missing catalog or column file fails with `FileNotFound` and
    /// leaves nothing half-opened.
    pub fn open(store: Arc<PageStore>, name: &str) -> Result<Self> {
        let path = Self::catalog_path(&store, name);
        if !path.exists() {
            return Err(OspreyError::FileNotFound(Self::catalog_name(name)));
        }

        let raw = std::fs::read_to_string(&path)?;
        let catalog: RelationCatalog = serde_json::from_str(&raw)
            .map_err(|e| OspreyError::Format(format!("catalog {name}: {e}")))?;
        let schema = Schema::new(catalog.columns)?;

        let mut column_files = Vec::with_capacity(schema.len());
        for ordinal in 1..=schema.len() {
            column_files.push(store.open_file(&Self::column_name(name, ordinal))?);
        }

        Ok(Self {
            store,
            name: name.to_string(),
            schema,
            column_files,
            row_count: catalog.row_count,
        })
    }

    /// Persists the catalog (schema and row count).
    pub fn save(&self) -> Result<()> {
        let catalog = RelationCatalog {
            columns: self.schema.columns().to_vec(),
            row_count: self.row_count,
        };
        let raw = serde_json::to_string_pretty(&catalog)
            .map_err(|e| OspreyError::Format(format!("catalog {}: {e}", self.name)))?;
        std::fs::write(Self::catalog_path(&self.store, &self.name), raw)?;
        Ok(())
    }

    /// Returns the relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the number of rows.
    pub fn len(&self) -> u64 {
        self.row_count
    }

    /// Returns true if the relation holds no rows.
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Returns the attribute type of a 1-based column.
    pub fn attr_type(&self, column: usize) -> Result<AttrType> {
        self.schema.attr_type(column)
    }

    fn cells_per_page(width: u16) -> u64 {
        ((PAGE_SIZE - PageHeader::SIZE) / width as usize) as u64
    }

    /// Resolves a rid and 1-based column number to a physical position.
    pub fn position(&self, rid: Rid, column: usize) -> Result<Position> {
        let def = self.schema.column(column)?;
        if rid.0 >= self.row_count {
            return Err(OspreyError::Resolution(format!(
                "{} beyond {} rows of {}",
                rid, self.row_count, self.name
            )));
        }
        let cpp = Self::cells_per_page(def.width);
        Ok(Position {
            file_id: self.column_files[column - 1],
            page_num: (rid.0 / cpp) as u32,
            cell: (rid.0 % cpp) as u32,
        })
    }

    /// Reads the single cell value at a position.
    pub fn value_at(&self, pos: Position, column: usize) -> Result<Value> {
        let def = self.schema.column(column)?;
        let page_id = osprey_common::page::PageId::new(pos.file_id.0, pos.page_num);
        let page = self.store.pin(page_id)?;
        let offset = PageHeader::SIZE + pos.cell as usize * def.width as usize;
        let cell: Vec<u8> = page.read(|data| data[offset..offset + def.width as usize].to_vec())?;
        decode_cell(&cell, def)
    }

    /// Fetches the full tuple for a rid, resolving every column.
    pub fn fetch(&self, rid: Rid) -> Result<Tuple> {
        let mut values = Vec::with_capacity(self.schema.len());
        for column in 1..=self.schema.len() {
            let pos = self.position(rid, column)?;
            values.push(self.value_at(pos, column)?);
        }
        Ok(Tuple::new(values))
    }

    /// Appends a row, returning its rid.
    pub fn append(&mut self, values: &[Value]) -> Result<Rid> {
        if values.len() != self.schema.len() {
            return Err(OspreyError::ArityMismatch {
                expected: self.schema.len(),
                actual: values.len(),
            });
        }

        let rid = Rid(self.row_count);
        for (idx, value) in values.iter().enumerate() {
            let column = idx + 1;
            let def = self.schema.column(column)?;
            if value.attr_type() != def.attr {
                return Err(OspreyError::TypeMismatch {
                    expected: def.attr.to_string(),
                    actual: value.attr_type().to_string(),
                });
            }
            let cell = encode_cell(value, def)?;

            let file_id = self.column_files[idx];
            let cpp = Self::cells_per_page(def.width);
            let page_num = (rid.0 / cpp) as u32;
            let cell_idx = (rid.0 % cpp) as u32;

            let mut page = if page_num >= self.store.disk().num_pages(file_id)? {
                self.store.allocate(file_id, PageType::Columnar)?
            } else {
                self.store
                    .pin(osprey_common::page::PageId::new(file_id.0, page_num))?
            };

            let offset = PageHeader::SIZE + cell_idx as usize * def.width as usize;
            page.write(|data| data[offset..offset + cell.len()].copy_from_slice(&cell))?;
        }

        self.row_count += 1;
        Ok(rid)
    }
}

/// Encodes a value into its fixed-width cell representation.
fn encode_cell(value: &Value, def: &ColumnDef) -> Result<Vec<u8>> {
    let width = def.width as usize;
    let mut cell = vec![0u8; width];
    match value {
        Value::Int(v) => cell.copy_from_slice(&v.to_le_bytes()),
        Value::Real(v) => cell.copy_from_slice(&v.to_le_bytes()),
        Value::Str(s) => {
            let bytes = s.as_bytes();
            if bytes.len() + 2 > width {
                return Err(OspreyError::ValueTooWide {
                    column: def.name.clone(),
                    size: bytes.len(),
                    max: width - 2,
                });
            }
            cell[0..2].copy_from_slice(&(bytes.len() as u16).to_le_bytes());
            cell[2..2 + bytes.len()].copy_from_slice(bytes);
        }
    }
    Ok(cell)
}

/// Decodes a fixed-width cell into a value.
fn decode_cell(cell: &[u8], def: &ColumnDef) -> Result<Value> {
    match def.attr {
        AttrType::Int => Ok(Value::Int(i64::from_le_bytes([
            cell[0], cell[1], cell[2], cell[3], cell[4], cell[5], cell[6], cell[7],
        ]))),
        AttrType::Real => Ok(Value::Real(f64::from_le_bytes([
            cell[0], cell[1], cell[2], cell[3], cell[4], cell[5], cell[6], cell[7],
        ]))),
        AttrType::Str => {
            let len = u16::from_le_bytes([cell[0], cell[1]]) as usize;
            if 2 + len > cell.len() {
                return Err(OspreyError::Format(format!(
                    "string cell in {} claims {} bytes of {}",
                    def.name,
                    len,
                    cell.len() - 2
                )));
            }
            let s = std::str::from_utf8(&cell[2..2 + len])
                .map_err(|e| OspreyError::Format(format!("string cell in {}: {e}", def.name)))?;
            Ok(Value::Str(s.to_string()))
        }
    }
}
