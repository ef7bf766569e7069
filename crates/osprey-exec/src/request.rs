//! Join invocation surface.
//!
//! A join request names two relations, their join columns, the projection
//! column names for each side and the index flavor to drive the scans
//! with. Setup resolves every name before any scan opens: missing files
//! and unknown column names abort construction with nothing half-opened.

use crate::join::{EquiJoin, JoinSide};
use log::debug;
use std::io::Write;
use std::sync::Arc;
use osprey_common::Result;
use osprey_storage::index::{BitmapIndex, CompressedBitmapIndex};
use osprey_storage::{PageStore, Relation};

/// Which index flavor drives the join scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Plain bitmap index (`name.bitmap{i}` files).
    Bitmap,
    /// Compressed bitmap index (`name.cbitmap{i}` files).
    Compressed,
}

impl IndexKind {
    /// Parses the caller-facing selector: the literal `"BITMAP"` selects
    /// the plain flavor, any other value the compressed one.
    pub fn from_selector(selector: &str) -> Self {
        if selector == "BITMAP" {
            IndexKind::Bitmap
        } else {
            IndexKind::Compressed
        }
    }
}

/// A fully described equi-join invocation.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    /// Left relation name.
    pub left_relation: String,
    /// Join column name on the left relation.
    pub left_column: String,
    /// Right relation name.
    pub right_relation: String,
    /// Join column name on the right relation.
    pub right_column: String,
    /// Left projection column names, in output order.
    pub left_projection: Vec<String>,
    /// Right projection column names, in output order.
    pub right_projection: Vec<String>,
    /// Index flavor to scan with.
    pub index_kind: IndexKind,
}

/// Sets up and runs an equi-join, writing matched records to `out`.
///
/// Returns the number of emitted records.
pub fn run_join<W: Write>(
    store: &Arc<PageStore>,
    request: &JoinRequest,
    out: &mut W,
) -> Result<u64> {
    let left_rel = Relation::open(store.clone(), &request.left_relation)?;
    let right_rel = Relation::open(store.clone(), &request.right_relation)?;

    let left_column = left_rel.schema().ordinal(&request.left_column)?;
    let right_column = right_rel.schema().ordinal(&request.right_column)?;
    let left_projection = left_rel.schema().ordinals(&request.left_projection)?;
    let right_projection = right_rel.schema().ordinals(&request.right_projection)?;

    debug!(
        "joining {}.{} with {}.{} via {:?} indexes",
        request.left_relation, request.left_column, request.right_relation, request.right_column,
        request.index_kind
    );

    match request.index_kind {
        IndexKind::Bitmap => {
            let left_index = BitmapIndex::open(store.clone(), &request.left_relation, left_column)?;
            let right_index =
                BitmapIndex::open(store.clone(), &request.right_relation, right_column)?;
            EquiJoin::new(
                JoinSide {
                    index: &left_index,
                    relation: &left_rel,
                    join_column: left_column,
                    projection: left_projection,
                },
                JoinSide {
                    index: &right_index,
                    relation: &right_rel,
                    join_column: right_column,
                    projection: right_projection,
                },
            )
            .run(out)
        }
        IndexKind::Compressed => {
            let left_index =
                CompressedBitmapIndex::open(store.clone(), &request.left_relation, left_column)?;
            let right_index =
                CompressedBitmapIndex::open(store.clone(), &request.right_relation, right_column)?;
            EquiJoin::new(
                JoinSide {
                    index: &left_index,
                    relation: &left_rel,
                    join_column: left_column,
                    projection: left_projection,
                },
                JoinSide {
                    index: &right_index,
                    relation: &right_rel,
                    join_column: right_column,
                    projection: right_projection,
                },
            )
            .run(out)
        }
    }
}
