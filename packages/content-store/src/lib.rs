//! Pluggable content storage for entities that reference binary payloads by id
//!
//! An entity carries a content id and a content length. A [`ContentStore`]
//! keeps those two fields consistent with the bytes held in a backend
//! (a local directory or an object store bucket), placing content with the
//! current [`PlacementService`] scheme and falling back to a legacy scheme
//! when reading content placed before a migration.

pub mod db;
pub mod entity;
pub mod error;
pub mod fallback;
pub mod placement;
pub mod registry;
pub mod storage;
pub mod store;

pub use entity::{ContentFields, FieldAccessor, Fields, MetadataAccessor};
pub use error::{Result, StoreError};
pub use placement::{PlacementService, PlacementStrategy, Scheme, StorageLocation};
pub use registry::{StoreInfo, StoreRegistry};
pub use storage::{ByteSink, ByteStream, Resource, ResourceResolver, StoreConfig};
pub use store::ContentStore;
