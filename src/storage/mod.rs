//! File storage for achievement evidence

pub mod files;

pub use files::{sanitize_file_name, FileStore, FileUpload, LocalFileStore, StoredFile};
