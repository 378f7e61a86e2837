//! Models module
//!
//! Typed views over the parts of a semantic model definition the passes
//! reason about: generated columns and relationship declarations.

pub mod column;
pub mod relationship;

pub use column::{ColumnSpec, DataType};
pub use relationship::{
    Endpoint, KeepPair, LOCAL_DATE_TABLE_PREFIX, Relationship, RelationshipsFile, Segment,
    quote_if_needed,
};
