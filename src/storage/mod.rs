//! Storage helpers
//!
//! Every pass reads a definition file fully into memory, rewrites it, and
//! hands the result to [`write_atomic`]. Discovery of `*.tmdl` files and the
//! template copy used by the scaffolder live here too.

pub mod filesystem;

pub use filesystem::{
    IGNORED_DIR_NAMES, copy_dir_all, copy_file, discover_files, ensure_dir, is_json_like,
    read_text, remove_dir_all, write_atomic,
};
