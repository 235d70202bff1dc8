// Local filesystem backend
use super::{ByteSink, ByteStream, Resource, ResourceResolver, StoreConfig};
use crate::error::{Result, StoreError};
use crate::placement::StorageLocation;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::fs;
use tokio::io::AsyncWrite;
use uuid::Uuid;

/// Resolves locations to files under a root directory
///
/// A location `abcd/efgh` (or `/abcd/efgh`) maps to `{root}/abcd/efgh`.
#[derive(Debug, Clone)]
pub struct LocalResolver {
    root: Arc<Path>,
}

impl LocalResolver {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: Arc::from(root.as_ref()),
        }
    }

    /// Resolver over the content directory of a configuration
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.content_path())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it doesn't exist
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await.map_err(|e| StoreError::Io {
            context: format!("Failed to create storage root: {}", self.root.display()),
            source: e,
        })
    }

    fn location_to_path(&self, location: &StorageLocation) -> PathBuf {
        location
            .segments()
            .fold(self.root.to_path_buf(), |path, segment| path.join(segment))
    }
}

impl ResourceResolver for LocalResolver {
    type Resource = LocalResource;

    fn resolve(&self, location: &StorageLocation) -> LocalResource {
        LocalResource {
            root: Arc::clone(&self.root),
            path: self.location_to_path(location),
            location: location.clone(),
        }
    }

    fn kind(&self) -> &'static str {
        "filesystem"
    }
}

/// A file under a [`LocalResolver`] root
#[derive(Debug, Clone)]
pub struct LocalResource {
    root: Arc<Path>,
    path: PathBuf,
    location: StorageLocation,
}

impl LocalResource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, action: &str, source: io::Error) -> StoreError {
        StoreError::io(
            self.location.as_str(),
            format!("Failed to {}: {}", action, self.path.display()),
            source,
        )
    }

    /// Sibling of the target that a sink writes to before it is renamed
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(OsString::from).unwrap_or_default();
        name.push(format!(".tmp-{}", Uuid::new_v4()));
        self.path.with_file_name(name)
    }

    /// Remove parent directories left empty by a delete, stopping at the root
    async fn cleanup_empty_dirs(&self) {
        let mut dir = self.path.parent();
        while let Some(parent) = dir {
            if parent == &*self.root || !parent.starts_with(&self.root) {
                break;
            }
            // Only succeeds if empty
            if fs::remove_dir(parent).await.is_err() {
                break;
            }
            dir = parent.parent();
        }
    }
}

#[async_trait]
impl Resource for LocalResource {
    fn location(&self) -> &StorageLocation {
        &self.location
    }

    async fn exists(&self) -> Result<bool> {
        match fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error("stat file", e)),
        }
    }

    async fn open_read(&self) -> Result<ByteStream> {
        let file = fs::File::open(&self.path)
            .await
            .map_err(|e| self.io_error("open file", e))?;
        Ok(Box::new(file))
    }

    async fn open_write(&self) -> Result<ByteSink> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| StoreError::Io {
                context: format!("Failed to create directory: {}", parent.display()),
                source: e,
            })?;
        }

        let temp = self.temp_path();
        let file = fs::File::create(&temp).await.map_err(|e| StoreError::Io {
            context: format!("Failed to create file: {}", temp.display()),
            source: e,
        })?;
        Ok(Box::new(LocalSink {
            temp,
            target: self.path.clone(),
            state: LocalSinkState::Writing(file),
        }))
    }

    async fn length(&self) -> Result<u64> {
        let meta = fs::metadata(&self.path)
            .await
            .map_err(|e| self.io_error("stat file", e))?;
        Ok(meta.len())
    }

    async fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Nothing to delete at {}", self.location);
                return Ok(());
            }
            Err(e) => return Err(self.io_error("delete file", e)),
        }

        tracing::info!("Deleted file: {}", self.path.display());

        self.cleanup_empty_dirs().await;
        Ok(())
    }
}

enum LocalSinkState {
    Writing(fs::File),
    Committing(BoxFuture<'static, io::Result<()>>),
    Done,
}

/// Writes to a temporary sibling and renames it over the target on shutdown
///
/// The target keeps its previous bytes until the rename. A sink dropped
/// before shutdown completes removes its temporary file.
struct LocalSink {
    temp: PathBuf,
    target: PathBuf,
    state: LocalSinkState,
}

impl AsyncWrite for LocalSink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().state {
            LocalSinkState::Writing(file) => Pin::new(file).poll_write(cx, buf),
            _ => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "file sink is closed",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().state {
            LocalSinkState::Writing(file) => Pin::new(file).poll_flush(cx),
            _ => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                LocalSinkState::Writing(file) => {
                    futures::ready!(Pin::new(file).poll_shutdown(cx))?;
                    // Closes the file before the rename
                    this.state = LocalSinkState::Done;
                    let temp = this.temp.clone();
                    let target = this.target.clone();
                    this.state = LocalSinkState::Committing(Box::pin(async move {
                        fs::rename(&temp, &target).await
                    }));
                }
                LocalSinkState::Committing(rename) => {
                    let result = futures::ready!(rename.as_mut().poll(cx));
                    this.state = LocalSinkState::Done;
                    if result.is_ok() {
                        // Nothing left to clean up
                        this.temp = PathBuf::new();
                    }
                    return Poll::Ready(result);
                }
                LocalSinkState::Done => return Poll::Ready(Ok(())),
            }
        }
    }
}

impl Drop for LocalSink {
    fn drop(&mut self) {
        self.state = LocalSinkState::Done;
        if !self.temp.as_os_str().is_empty() {
            if let Err(e) = std::fs::remove_file(&self.temp) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(
                        "Failed to remove temporary file {}: {}",
                        self.temp.display(),
                        e
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn create_test_resolver() -> (LocalResolver, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let resolver = LocalResolver::new(temp_dir.path().join("content"));
        (resolver, temp_dir)
    }

    fn location(s: &str) -> StorageLocation {
        StorageLocation::new(s).unwrap()
    }

    async fn write(resource: &LocalResource, data: &[u8]) {
        let mut sink = resource.open_write().await.unwrap();
        sink.write_all(data).await.unwrap();
        sink.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (resolver, _temp) = create_test_resolver();
        let resource = resolver.resolve(&location("abcd-efgh"));

        assert!(!resource.exists().await.unwrap());

        write(&resource, b"Hello content world!").await;

        assert!(resource.exists().await.unwrap());
        assert_eq!(resource.length().await.unwrap(), 20);

        let mut buf = Vec::new();
        resource.open_read().await.unwrap().read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"Hello content world!");
    }

    #[tokio::test]
    async fn test_resolve_does_not_touch_disk() {
        let (resolver, _temp) = create_test_resolver();
        let resource = resolver.resolve(&location("/abcd/efgh"));

        assert!(!resolver.root().exists());
        assert!(!resource.path().parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_open_write_creates_parent_dirs() {
        let (resolver, _temp) = create_test_resolver();
        let resource = resolver.resolve(&location("/abcd/efgh"));

        write(&resource, b"nested").await;

        assert!(resource.path().starts_with(resolver.root()));
        assert!(resolver.root().join("abcd").is_dir());
        assert_eq!(resource.length().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_bytes() {
        let (resolver, _temp) = create_test_resolver();
        let resource = resolver.resolve(&location("overwrite"));

        write(&resource, b"a much longer first version").await;
        write(&resource, b"short").await;

        assert_eq!(resource.length().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_unfinished_write_keeps_previous_bytes() {
        let (resolver, _temp) = create_test_resolver();
        let resource = resolver.resolve(&location("/abcd/efgh"));
        write(&resource, b"previous content").await;

        let mut sink = resource.open_write().await.unwrap();
        sink.write_all(b"partial").await.unwrap();
        assert_eq!(resource.length().await.unwrap(), 16);
        drop(sink);

        let mut buf = Vec::new();
        resource.open_read().await.unwrap().read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"previous content");

        // Temporary file is gone too
        let entries: Vec<_> = std::fs::read_dir(resolver.root().join("abcd"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![OsString::from("efgh")]);
    }

    #[tokio::test]
    async fn test_write_after_shutdown_fails() {
        let (resolver, _temp) = create_test_resolver();
        let resource = resolver.resolve(&location("closed"));

        let mut sink = resource.open_write().await.unwrap();
        sink.write_all(b"done").await.unwrap();
        sink.shutdown().await.unwrap();

        assert!(sink.write_all(b"late").await.is_err());
        drop(sink);
        assert_eq!(resource.length().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_open_read_missing_is_not_found() {
        let (resolver, _temp) = create_test_resolver();
        let resource = resolver.resolve(&location("missing"));

        let err = resource.open_read().await.err().unwrap();
        assert!(err.is_not_found());
        assert!(resource.length().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_succeeds() {
        let (resolver, _temp) = create_test_resolver();
        let resource = resolver.resolve(&location("never-written"));

        assert!(resource.delete().await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_cleans_up_empty_dirs() {
        let (resolver, _temp) = create_test_resolver();
        resolver.initialize().await.unwrap();
        let resource = resolver.resolve(&location("ab/cd/abcdef12"));
        let sibling = resolver.resolve(&location("ab/ef/abef0000"));

        write(&resource, b"delete me").await;
        write(&sibling, b"keep me").await;

        resource.delete().await.unwrap();

        assert!(!resource.exists().await.unwrap());
        assert!(!resolver.root().join("ab").join("cd").exists());
        // Still holds the sibling
        assert!(resolver.root().join("ab").exists());
        assert!(resolver.root().exists());
    }

    #[tokio::test]
    async fn test_directory_is_not_a_resource() {
        let (resolver, _temp) = create_test_resolver();
        write(&resolver.resolve(&location("dir/file")), b"x").await;

        assert!(!resolver.resolve(&location("dir")).exists().await.unwrap());
    }

    #[test]
    fn test_from_config() {
        let config = StoreConfig {
            root: PathBuf::from("/tmp/test-store"),
            ..StoreConfig::default()
        };

        let resolver = LocalResolver::from_config(&config);
        assert_eq!(resolver.root(), Path::new("/tmp/test-store/content"));
        assert_eq!(resolver.kind(), "filesystem");
    }
}
