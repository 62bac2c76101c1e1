//! Durable storage for the Capstan workflow engine.
//!
//! The crate is split into a generic key-value-per-entity
//! [`StorageBackend`] seam (filesystem and in-memory implementations) and
//! the [`ExecutionStore`], which layers an in-memory summary cache and the
//! paginated query surface on top of the backend.

pub mod backend;
pub mod data_dir;
pub mod executions;
pub mod fs;
pub mod memory;

pub use backend::{ENTITY_EXECUTIONS, ENTITY_WORKFLOWS, StorageBackend, StorageError};
pub use data_dir::{DATA_DIR_ENV, default_data_dir};
pub use executions::{ExecutionStore, ExecutionStoreError};
pub use fs::FilesystemStorage;
pub use memory::MemoryStorage;
