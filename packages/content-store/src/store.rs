// Content store: keeps an entity's content id/length consistent with the
// bytes held by a backend
use crate::entity::MetadataAccessor;
use crate::error::{Result, StoreError};
use crate::fallback::{resolve_readable, Origin};
use crate::placement::PlacementService;
use crate::storage::{ByteStream, Resource, ResourceResolver};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Associates binary content with entities of type `E`, stored through the
/// resolver `R`
///
/// The store keeps no per-entity state, so one instance can serve different
/// entities from many tasks at once. Writes to the *same* entity must be
/// serialized by the caller.
pub struct ContentStore<E, R> {
    resolver: R,
    placement: PlacementService,
    accessor: Arc<dyn MetadataAccessor<E>>,
}

impl<E, R: ResourceResolver> ContentStore<E, R> {
    pub fn new(
        resolver: R,
        placement: PlacementService,
        accessor: Arc<dyn MetadataAccessor<E>>,
    ) -> Self {
        Self {
            resolver,
            placement,
            accessor,
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn placement(&self) -> &PlacementService {
        &self.placement
    }

    /// Store `content` for `entity`, replacing any previous content
    ///
    /// An entity without a content id gets a new one. The id and the length
    /// read back from the backend are written to the entity only once the
    /// content is fully stored; on failure the entity is left untouched.
    pub async fn set_content<S>(&self, entity: &mut E, mut content: S) -> Result<()>
    where
        S: AsyncRead + Unpin + Send,
    {
        let current_id = self.accessor.content_id(entity);
        let placement = self.placement.plan(current_id.as_deref())?;
        let resource = self.resolver.resolve(&placement.location);

        let mut sink = resource.open_write().await?;
        let copied = tokio::io::copy(&mut content, &mut sink)
            .await
            .map_err(|e| StoreError::Io {
                context: format!("Failed to write content to {}", placement.location),
                source: e,
            })?;
        sink.shutdown().await.map_err(|e| StoreError::Io {
            context: format!("Failed to close content at {}", placement.location),
            source: e,
        })?;
        drop(sink);

        let length = resource.length().await?;

        tracing::info!(
            "Stored content {} at {} ({} bytes copied, {} bytes stored)",
            placement.id,
            placement.location,
            copied,
            length
        );

        self.accessor.set_content_id(entity, Some(placement.id));
        self.accessor.set_content_length(entity, length);
        Ok(())
    }

    /// Open the content of `entity` for reading
    ///
    /// Returns `Ok(None)` when the entity has no content id or no content is
    /// stored for it under either the current or the legacy placement.
    pub async fn get_content(&self, entity: &E) -> Result<Option<ByteStream>> {
        let Some(id) = self.accessor.content_id(entity) else {
            return Ok(None);
        };

        let Some(found) = resolve_readable(&self.resolver, &self.placement, &id).await? else {
            tracing::debug!("No content stored for {}", id);
            return Ok(None);
        };

        if found.origin == Origin::Legacy {
            tracing::info!(
                "Reading {} from legacy location {}",
                id,
                found.resource.location()
            );
        }

        match found.resource.open_read().await {
            Ok(stream) => Ok(Some(stream)),
            // Deleted between the existence check and the open
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete the content of `entity` and clear its content id and length
    ///
    /// Deletes at the current location, or at the legacy location when the
    /// current scheme cannot place the id. Safe to call when the content is
    /// already gone, or twice in a row.
    pub async fn unset_content(&self, entity: &mut E) -> Result<()> {
        let Some(id) = self.accessor.content_id(entity) else {
            return Ok(());
        };

        let location = match self.placement.locate(&id) {
            Ok(location) => Some(location),
            Err(e) => {
                tracing::debug!("No current location for {}: {}", id, e);
                self.placement.legacy_location(&id).and_then(|legacy| legacy.ok())
            }
        };

        match location {
            Some(location) => {
                let resource = self.resolver.resolve(&location);
                if resource.exists().await? {
                    resource.delete().await?;
                    tracing::info!("Deleted content {} at {}", id, location);
                } else {
                    tracing::debug!("Content {} already absent at {}", id, location);
                }
            }
            None => tracing::warn!("Content id {} has no storage location, clearing it", id),
        }

        self.accessor.set_content_id(entity, None);
        self.accessor.set_content_length(entity, 0);
        Ok(())
    }

    /// Resource for a raw content id under the current placement
    ///
    /// No legacy fallback and no existence check; call
    /// [`Resource::exists`] on the result.
    pub fn get_resource(&self, id: &str) -> Result<R::Resource> {
        let location = self.placement.locate(id)?;
        Ok(self.resolver.resolve(&location))
    }

    pub fn has_content(&self, entity: &E) -> bool {
        self.accessor.content_id(entity).is_some()
    }

    pub fn content_length(&self, entity: &E) -> u64 {
        self.accessor.content_length(entity)
    }
}

impl<E, R: ResourceResolver> fmt::Debug for ContentStore<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStore")
            .field("backend", &self.resolver.kind())
            .field("placement", &self.placement)
            .finish()
    }
}
