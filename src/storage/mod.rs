//! File system storage management
//!
//! Virtual path resolution, the storage abstraction used by file commands,
//! and its disk-backed implementation.

pub mod filesystem;
pub mod operations;
pub mod validation;

pub use filesystem::{FileEntry, FileReader, FileSystem};
pub use operations::DiskFileSystem;
pub use validation::{MAX_DIRECTORY_DEPTH, resolve_virtual_path, virtual_to_real_path};
