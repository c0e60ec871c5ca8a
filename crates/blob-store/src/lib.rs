//! Opaque blob storage for filevault.
//!
//! The logical file tree in `filevault-core` never touches bytes
//! directly; files carry an opaque [`ContentId`] that resolves against
//! a [`BlobStore`]. Two implementations are provided:
//! - [`FsBlobStore`] - one file per blob under a root directory
//! - [`MemoryBlobStore`] - in-memory map, for tests and ephemeral use
//!
//! Content ids are opaque handles minted by the store; a copy always
//! receives a fresh id so two files never alias the same blob.

mod content_id;
mod error;
mod fs;
mod memory;
mod store;

pub use content_id::{ContentId, ContentIdError};
pub use error::{BlobStoreError, Result};
pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use store::BlobStore;
