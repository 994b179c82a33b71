//! Filesystem-style access to an Aliyun OSS bucket.
//!
//! [`OssAdapter`] translates filesystem verbs (write, read, rename, list, ...)
//! into object-store calls through an [`ObjectClient`], applying an optional
//! key prefix and deriving public, CDN and signed URLs. [`DriverRegistry`]
//! turns named disk configuration into ready [`Filesystem`] handles.

pub mod adapter;
pub mod adapters;
pub mod driver;
pub mod fs;
pub mod model;
pub mod util;

pub use adapter::{Adapter, OssAdapter};
pub use adapters::ObjectClient;
pub use driver::{DiskConfig, DriverFactory, DriverRegistry, StorageConfig};
pub use fs::Filesystem;
pub use model::error::{AdapterError, ConfigError, StoreError};
pub use model::fs::{DirectoryRecord, FileMetadata, FileRecord, ObjectRecord, ReadResult, WriteResult};
pub use model::options::{Config, ObjectOptions, SignOptions};
