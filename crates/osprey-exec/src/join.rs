//! Index-nested-loop equi-join.
//!
//! The engine drives two index scans opened on the join columns of two
//! relations. For every outer entry it re-opens the inner scan from the
//! start, resolves both entries to tuples through the columnar layer,
//! compares the join-column values under their declared type ordering and
//! emits a projected record per equal pair. Emission order is fully
//! determined by the (outer, inner) enumeration; nothing is buffered or
//! sorted.
//!
//! One generic body serves every index flavor satisfying the scan
//! contract, so the plain and compressed bitmap paths cannot drift apart.

use log::{debug, warn};
use std::cmp::Ordering;
use std::io::Write;
use osprey_common::{Result, Value};
use osprey_storage::index::{EntryScan, IndexEntry, ScanSource};
use osprey_storage::{Relation, Tuple};

/// Marker substituted for a value that failed to resolve or format.
pub const ERROR_MARKER: &str = "<err>";

/// One side of a join: an index over the join column, the relation it
/// belongs to, and the caller's projection.
pub struct JoinSide<'a, S> {
    /// Index opened on the join column.
    pub index: &'a S,
    /// The relation the index entries resolve into.
    pub relation: &'a Relation,
    /// 1-based join column number.
    pub join_column: usize,
    /// 1-based projection column numbers, in caller order.
    pub projection: Vec<usize>,
}

impl<S> JoinSide<'_, S> {
    /// Resolves an index entry to its tuple and join-column value.
    ///
    /// A row that cannot be resolved is reported and skipped; it can
    /// match nothing.
    fn resolve(&self, entry: &IndexEntry) -> Option<(Tuple, Value)> {
        let tuple = match self.relation.fetch(entry.rid) {
            Ok(tuple) => tuple,
            Err(e) => {
                warn!("skipping {} of {}: {e}", entry.rid, self.relation.name());
                return None;
            }
        };
        let value = match tuple.field(self.join_column) {
            Ok(value) => value.clone(),
            Err(e) => {
                warn!("skipping {} of {}: {e}", entry.rid, self.relation.name());
                return None;
            }
        };
        Some((tuple, value))
    }
}

/// The equi-join engine, generic over the index flavor.
pub struct EquiJoin<'a, S: ScanSource> {
    left: JoinSide<'a, S>,
    right: JoinSide<'a, S>,
}

impl<'a, S: ScanSource> EquiJoin<'a, S> {
    /// Builds a join over two sides of the same index flavor.
    pub fn new(left: JoinSide<'a, S>, right: JoinSide<'a, S>) -> Self {
        Self { left, right }
    }

    /// Runs the join, writing one record per matching pair:
    /// `{left values}, {right values}`.
    ///
    /// Returns the number of emitted records. Scan failures abort the
    /// join; per-record resolution failures are reported and skipped, and
    /// unformattable projected values appear as the error marker.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<u64> {
        let mut emitted = 0u64;

        let mut outer = self.left.index.open_scan(None, None)?;
        while let Some(outer_entry) = outer.next_entry()? {
            let Some((left_tuple, left_value)) = self.left.resolve(&outer_entry) else {
                continue;
            };

            // The inner side restarts from scratch for every outer entry.
            let mut inner = self.right.index.open_scan(None, None)?;
            while let Some(inner_entry) = inner.next_entry()? {
                let Some((right_tuple, right_value)) = self.right.resolve(&inner_entry) else {
                    continue;
                };

                if left_value.try_cmp(&right_value)? == Ordering::Equal {
                    writeln!(
                        out,
                        "{}, {}",
                        format_projection(&left_tuple, &self.left.projection),
                        format_projection(&right_tuple, &self.right.projection),
                    )?;
                    emitted += 1;
                }
            }
            inner.close()?;
        }
        outer.close()?;

        debug!("equi-join emitted {emitted} records");
        Ok(emitted)
    }
}

/// Formats the projected columns of a tuple as `{v1, v2, ...}`.
fn format_projection(tuple: &Tuple, projection: &[usize]) -> String {
    let mut parts = Vec::with_capacity(projection.len());
    for &column in projection {
        match tuple.field(column) {
            Ok(value) => parts.push(value.to_string()),
            Err(e) => {
                warn!("projection column {column}: {e}");
                parts.push(ERROR_MARKER.to_string());
            }
        }
    }
    format!("{{{}}}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_projection_orders_by_request() {
        let tuple = Tuple::new(vec![Value::Int(1), Value::from("a"), Value::Real(2.5)]);
        assert_eq!(format_projection(&tuple, &[2, 1]), "{a, 1}");
        assert_eq!(format_projection(&tuple, &[3]), "{2.5}");
    }

    #[test]
    fn test_format_projection_empty() {
        let tuple = Tuple::new(vec![Value::Int(1)]);
        assert_eq!(format_projection(&tuple, &[]), "{}");
    }

    #[test]
    fn test_format_projection_marks_bad_columns() {
        let tuple = Tuple::new(vec![Value::Int(1)]);
        assert_eq!(format_projection(&tuple, &[1, 9]), "{1, <err>}");
    }
}
