// Registry of the content stores an application has configured
use crate::storage::ResourceResolver;
use crate::store::ContentStore;
use serde::Serialize;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// What a registered store serves and where it keeps content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreInfo {
    pub entity_type: &'static str,
    pub backend: &'static str,
}

struct Entry {
    info: StoreInfo,
    store: Arc<dyn Any + Send + Sync>,
}

/// Stores keyed by entity type and backend
///
/// One store per (entity, resolver) pair; registering the same pair again
/// replaces the earlier store.
#[derive(Default)]
pub struct StoreRegistry {
    stores: HashMap<(TypeId, TypeId), Entry>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E, R>(&mut self, store: Arc<ContentStore<E, R>>)
    where
        E: 'static,
        R: ResourceResolver + 'static,
    {
        let info = StoreInfo {
            entity_type: type_name::<E>(),
            backend: store.resolver().kind(),
        };
        tracing::debug!("Registered {} store for {}", info.backend, info.entity_type);

        let key = (TypeId::of::<E>(), TypeId::of::<R>());
        if self.stores.insert(key, Entry { info, store }).is_some() {
            tracing::warn!("Replaced content store for {}", type_name::<E>());
        }
    }

    pub fn store_for<E, R>(&self) -> Option<Arc<ContentStore<E, R>>>
    where
        E: 'static,
        R: ResourceResolver + 'static,
    {
        let entry = self.stores.get(&(TypeId::of::<E>(), TypeId::of::<R>()))?;
        Arc::clone(&entry.store).downcast::<ContentStore<E, R>>().ok()
    }

    /// Information on every registered store, ordered by entity type
    pub fn content_stores(&self) -> Vec<StoreInfo> {
        let mut infos: Vec<StoreInfo> = self.stores.values().map(|e| e.info.clone()).collect();
        infos.sort_by(|a, b| (a.entity_type, a.backend).cmp(&(b.entity_type, b.backend)));
        infos
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
