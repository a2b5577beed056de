//! Filesystem utilities for codemend.
//!
//! Experiment output is append-only: attempt records are appended one JSON
//! line at a time, and the aggregate snapshot is replaced atomically so a
//! reader never sees a half-written file.

mod atomic;

pub use atomic::{append_line, atomic_write, atomic_write_file, create_new_dir, ensure_dir};
