// Resource resolution contract shared by every backend
use crate::error::Result;
use crate::placement::StorageLocation;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod config;
pub mod local;
pub mod object;

pub use config::StoreConfig;
pub use local::{LocalResolver, LocalResource};
pub use object::{MemoryObjectClient, ObjectClient, ObjectResolver, ObjectResource};

/// Readable content handed to callers; they own it and drop it when done
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Writable sink for content; `shutdown()` completes the write
pub type ByteSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Handle to zero or one blob at a location inside a backend
///
/// Resources are create-on-write: a handle to a missing location becomes
/// existing once a sink opened on it has been shut down.
#[async_trait]
pub trait Resource: Send + Sync {
    fn location(&self) -> &StorageLocation;

    async fn exists(&self) -> Result<bool>;

    /// Fails with `StoreError::NotFound` when the resource does not exist
    async fn open_read(&self) -> Result<ByteStream>;

    async fn open_write(&self) -> Result<ByteSink>;

    /// Length in bytes of the stored blob
    async fn length(&self) -> Result<u64>;

    /// Removes the blob; deleting a missing resource succeeds
    async fn delete(&self) -> Result<()>;
}

/// Maps locations to resource handles inside one backend root
///
/// Resolution is a pure lookup: it never touches the backend.
pub trait ResourceResolver: Send + Sync {
    type Resource: Resource;

    fn resolve(&self, location: &StorageLocation) -> Self::Resource;

    /// Backend kind, for logs and store information
    fn kind(&self) -> &'static str;
}
