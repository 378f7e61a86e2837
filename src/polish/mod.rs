//! Polishing passes that run after normalization

pub mod relationships;
pub mod tables;

pub use relationships::{RELATIONSHIPS_FILE, RelationshipPolisher};
pub use tables::{TABLES_DIR, TablePolishOptions, TablePolisher, polish_table_text};
