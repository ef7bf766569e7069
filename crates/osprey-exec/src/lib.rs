//! Query execution for OspreyDB.
//!
//! This crate provides the index-nested-loop equi-join engine and the
//! join invocation surface that wires relations, index files and column
//! projections together.

mod join;
mod request;

pub use join::{EquiJoin, JoinSide};
pub use request::{run_join, IndexKind, JoinRequest};
