use async_trait::async_trait;
use bytes::Bytes;
use snafu::prelude::*;
use tokio::io::AsyncRead;

mod fs_storage;
mod s3_storage;

pub use fs_storage::FilesystemObjectStore;
pub use s3_storage::S3ObjectStore;

/// Byte source of an upload. Backends consume it incrementally.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Wrap an in-memory buffer as a [`ByteStream`]
pub fn byte_stream(data: impl Into<Bytes>) -> ByteStream {
    Box::new(std::io::Cursor::new(data.into()))
}

/// Reference to an object created by an [`ObjectStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObjectRef {
    /// Backend specific object identifier
    pub object_id: String,
    /// Container (bucket or directory) holding the object
    pub container: String,
    /// Object name inside the container
    pub name: String,
    /// Caller-facing view URL, resolvable once read access is granted
    pub public_url: String,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// Invalid object or container name {name:?}
    InvalidName { name: String },

    /// Could not open container {container}
    Container {
        container: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to upload {name} to {container}
    Upload {
        container: String,
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O error on {path}
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Failed to grant public read on {object_id}
    GrantPublic {
        object_id: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Remote object storage used by the submission pipeline.
///
/// Every uploaded object is expected to be followed by [`ObjectStore::grant_public`];
/// a link is only useful once anyone holding it can read the object.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create `name` inside `container` from `stream`. Same-name uploads overwrite.
    async fn upload(
        &self,
        stream: ByteStream,
        name: &str,
        mime_type: &str,
        container: &str,
    ) -> Result<StoredObjectRef, StorageError>;

    /// Grant read access to anyone with the link and return that link
    async fn grant_public(&self, object: &StoredObjectRef) -> Result<String, StorageError>;

    /// Verify the container is reachable
    async fn check_container(&self, _container: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Reject names that would escape their container or are empty
pub(crate) fn validate_name(name: &str) -> Result<(), StorageError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    ensure!(!invalid, InvalidNameSnafu { name });
    Ok(())
}
