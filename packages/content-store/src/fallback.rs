// Read-side resolution with a legacy placement fallback
//
// The current location is always resolved first. The legacy location is only
// probed when the current one holds nothing, and a failed legacy probe counts
// as absence rather than an error.
use crate::error::Result;
use crate::placement::PlacementService;
use crate::storage::{Resource, ResourceResolver};

/// Which placement scheme a resource was found under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Current,
    Legacy,
}

#[derive(Debug)]
pub struct Found<T> {
    pub resource: T,
    pub origin: Origin,
}

/// Find the existing resource for `id`, trying the current placement and
/// then the legacy one
///
/// An id the current scheme cannot place is a miss there, not an error, as
/// long as the legacy scheme can place it. I/O errors from the current
/// location propagate; `Ok(None)` means neither location holds content.
pub async fn resolve_readable<R: ResourceResolver>(
    resolver: &R,
    placement: &PlacementService,
    id: &str,
) -> Result<Option<Found<R::Resource>>> {
    let current = match placement.locate(id) {
        Ok(current) => {
            let resource = resolver.resolve(&current);
            if resource.exists().await? {
                tracing::debug!("Resolved {} at {}", id, current);
                return Ok(Some(Found {
                    resource,
                    origin: Origin::Current,
                }));
            }
            Ok(current)
        }
        Err(e) => Err(e),
    };

    let legacy = match placement.legacy_location(id) {
        Some(Ok(legacy)) => legacy,
        // Without a usable legacy location, report the current outcome
        None => return current.map(|_| None),
        Some(Err(e)) => {
            tracing::debug!("No legacy location for {}: {}", id, e);
            return current.map(|_| None);
        }
    };

    match &current {
        // Same backend key under both schemes
        Ok(current) if current.relative_path() == legacy.relative_path() => return Ok(None),
        Ok(_) => {}
        Err(e) => tracing::debug!("No current location for {}: {}", id, e),
    }

    let resource = resolver.resolve(&legacy);
    match resource.exists().await {
        Ok(true) => {
            tracing::debug!("Resolved {} at legacy location {}", id, legacy);
            Ok(Some(Found {
                resource,
                origin: Origin::Legacy,
            }))
        }
        Ok(false) => Ok(None),
        Err(e) => {
            tracing::warn!("Legacy probe for {} at {} failed: {}", id, legacy, e);
            Ok(None)
        }
    }
}
