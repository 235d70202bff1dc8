// Object store backend: blobs keyed by location inside a named bucket
use super::{ByteSink, ByteStream, Resource, ResourceResolver};
use crate::error::{Result, StoreError};
use crate::placement::StorageLocation;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// Low-level object operations, implemented per object store client
#[async_trait]
pub trait ObjectClient: Send + Sync + 'static {
    /// Size of the object, or None if it doesn't exist
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<u64>>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store the object, replacing any previous one under the same key
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()>;

    /// Returns whether an object was removed
    async fn delete(&self, bucket: &str, key: &str) -> Result<bool>;
}

type Bucket = BTreeMap<String, Vec<u8>>;

/// In-process object store
#[derive(Debug, Default)]
pub struct MemoryObjectClient {
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        buckets.get(bucket).map_or(0, |b| b.len())
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<u64>> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        Ok(buckets
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|data| data.len() as u64))
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        Ok(buckets.get(bucket).and_then(|b| b.get(key)).cloned())
    }

    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool> {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        Ok(buckets
            .get_mut(bucket)
            .and_then(|b| b.remove(key))
            .is_some())
    }
}

/// Resolves locations to objects in one bucket
pub struct ObjectResolver<C> {
    client: Arc<C>,
    bucket: Arc<str>,
}

impl<C: ObjectClient> ObjectResolver<C> {
    pub fn new(client: Arc<C>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: Arc::from(bucket.into()),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }
}

impl<C> Clone for ObjectResolver<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            bucket: Arc::clone(&self.bucket),
        }
    }
}

impl<C: ObjectClient> ResourceResolver for ObjectResolver<C> {
    type Resource = ObjectResource<C>;

    fn resolve(&self, location: &StorageLocation) -> ObjectResource<C> {
        ObjectResource {
            client: Arc::clone(&self.client),
            bucket: Arc::clone(&self.bucket),
            key: location.relative_path().to_string(),
            location: location.clone(),
        }
    }

    fn kind(&self) -> &'static str {
        "object"
    }
}

/// An object in a bucket, keyed by the location's relative path
pub struct ObjectResource<C> {
    client: Arc<C>,
    bucket: Arc<str>,
    key: String,
    location: StorageLocation,
}

impl<C> ObjectResource<C> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl<C: ObjectClient> Resource for ObjectResource<C> {
    fn location(&self) -> &StorageLocation {
        &self.location
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.client.head(&self.bucket, &self.key).await?.is_some())
    }

    async fn open_read(&self) -> Result<ByteStream> {
        match self.client.get(&self.bucket, &self.key).await? {
            Some(data) => Ok(Box::new(io::Cursor::new(data))),
            None => Err(StoreError::not_found(self.location.as_str())),
        }
    }

    async fn open_write(&self) -> Result<ByteSink> {
        Ok(Box::new(ObjectSink {
            client: Arc::clone(&self.client),
            bucket: Arc::clone(&self.bucket),
            key: self.key.clone(),
            state: SinkState::Buffering(Vec::new()),
        }))
    }

    async fn length(&self) -> Result<u64> {
        self.client
            .head(&self.bucket, &self.key)
            .await?
            .ok_or_else(|| StoreError::not_found(self.location.as_str()))
    }

    async fn delete(&self) -> Result<()> {
        if self.client.delete(&self.bucket, &self.key).await? {
            tracing::info!("Deleted object: {}/{}", self.bucket, self.key);
        } else {
            tracing::debug!("Nothing to delete at {}/{}", self.bucket, self.key);
        }
        Ok(())
    }
}

enum SinkState {
    Buffering(Vec<u8>),
    Uploading(BoxFuture<'static, Result<()>>),
    Closed,
}

/// Buffers writes and uploads the object on shutdown
///
/// Dropping the sink before shutdown discards the buffer, so a failed copy
/// never replaces the previous object.
struct ObjectSink<C> {
    client: Arc<C>,
    bucket: Arc<str>,
    key: String,
    state: SinkState,
}

impl<C: ObjectClient> AsyncWrite for ObjectSink<C> {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().state {
            SinkState::Buffering(data) => {
                data.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            _ => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "object sink is closed",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                SinkState::Buffering(data) => {
                    let data = std::mem::take(data);
                    let client = Arc::clone(&this.client);
                    let bucket = Arc::clone(&this.bucket);
                    let key = this.key.clone();
                    this.state = SinkState::Uploading(Box::pin(async move {
                        client.put(&bucket, &key, data).await
                    }));
                }
                SinkState::Uploading(upload) => {
                    let result = futures::ready!(upload.as_mut().poll(cx));
                    this.state = SinkState::Closed;
                    return Poll::Ready(
                        result.map_err(io::Error::other),
                    );
                }
                SinkState::Closed => return Poll::Ready(Ok(())),
            }
        }
    }
}
