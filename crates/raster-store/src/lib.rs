//! Storage backends for masked rasters.
//!
//! Provides unified interfaces for:
//! - Local filesystem storage (binary files with index sidecars)
//! - PostgreSQL storage (chunked blobs behind a header table)
//! - Name-serialized operations spanning both

pub mod backend;
pub mod chunk;
pub mod config;
pub mod database;
pub mod file;
pub mod lock;
pub mod service;

pub use backend::RasterBackend;
pub use chunk::DEFAULT_MAX_CHUNK_SIZE;
pub use config::{DatabaseConfig, FileBackendConfig};
pub use database::DatabaseBackend;
pub use file::FileBackend;
pub use lock::NameLocks;
pub use service::RasterService;
