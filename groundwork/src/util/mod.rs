//! Shared filesystem and process helpers.

pub mod fs;
pub mod process;

pub use fs::{copy_path, copy_tree};
pub use process::{is_process_alive, kill_process};
