// Placement: content id -> storage location
use crate::entity::MetadataAccessor;
use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// A validated key inside a backend namespace
///
/// Locations may carry a leading `/` (the legacy path scheme produces
/// `/abcd/efgh`); backends address the relative form so a location can never
/// escape the backend root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocation(String);

impl StorageLocation {
    pub fn new(location: impl Into<String>) -> Result<Self> {
        let location = location.into();
        let relative = location.trim_start_matches('/');

        if relative.is_empty() {
            return Err(StoreError::conversion(location, "location is empty"));
        }
        if relative.contains('\0') {
            return Err(StoreError::conversion(location, "location contains NUL"));
        }
        if let Some(segment) = relative
            .split('/')
            .find(|segment| segment.is_empty() || *segment == "." || *segment == "..")
        {
            let reason = format!("invalid path segment '{}'", segment);
            return Err(StoreError::conversion(location.as_str(), reason));
        }

        Ok(Self(location))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The location without leading slashes
    pub fn relative_path(&self) -> &str {
        self.0.trim_start_matches('/')
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.relative_path().split('/')
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A deterministic transform from content id to location
pub trait PlacementStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn locate(&self, id: &str) -> Result<StorageLocation>;
}

fn check_token(id: &str, token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(StoreError::conversion(id, "empty id segment"));
    }
    if token == "." || token == ".." {
        return Err(StoreError::conversion(id, "id segment is a relative path"));
    }
    if token.contains(['/', '\\', '\0']) {
        return Err(StoreError::conversion(id, "id contains a path separator"));
    }
    Ok(())
}

/// The id itself is the location: `abcd-efgh` -> `abcd-efgh`
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPlacement;

impl PlacementStrategy for IdentityPlacement {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn locate(&self, id: &str) -> Result<StorageLocation> {
        check_token(id, id)?;
        StorageLocation::new(id)
    }
}

/// Each `-` separated part of the id becomes a directory:
/// `abcd-efgh` -> `/abcd/efgh`
#[derive(Debug, Clone, Copy, Default)]
pub struct PathSegmentPlacement;

impl PlacementStrategy for PathSegmentPlacement {
    fn name(&self) -> &'static str {
        "path"
    }

    fn locate(&self, id: &str) -> Result<StorageLocation> {
        if id.is_empty() {
            return Err(StoreError::conversion(id, "id is empty"));
        }
        for segment in id.split('-') {
            check_token(id, segment)?;
        }
        StorageLocation::new(format!("/{}", id.replace('-', "/")))
    }
}

/// Two levels of fan-out from the id prefix: `abcdef12` -> `ab/cd/abcdef12`
///
/// Avoids having too many entries in a single directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShardedPlacement;

impl PlacementStrategy for ShardedPlacement {
    fn name(&self) -> &'static str {
        "sharded"
    }

    fn locate(&self, id: &str) -> Result<StorageLocation> {
        check_token(id, id)?;
        // Byte offsets of the 3rd and 5th characters
        let mut boundaries = id.char_indices().map(|(i, _)| i).chain([id.len()]);
        let (Some(second), Some(rest)) = (boundaries.nth(2), boundaries.nth(1)) else {
            return Err(StoreError::conversion(
                id,
                "sharded placement needs at least 4 characters",
            ));
        };
        StorageLocation::new(format!("{}/{}/{}", &id[..second], &id[second..rest], id))
    }
}

/// Placement scheme names as they appear in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Identity,
    Path,
    Sharded,
}

impl Scheme {
    pub fn strategy(self) -> Arc<dyn PlacementStrategy> {
        match self {
            Scheme::Identity => Arc::new(IdentityPlacement),
            Scheme::Path => Arc::new(PathSegmentPlacement),
            Scheme::Sharded => Arc::new(ShardedPlacement),
        }
    }
}

impl FromStr for Scheme {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "identity" => Ok(Scheme::Identity),
            "path" => Ok(Scheme::Path),
            "sharded" => Ok(Scheme::Sharded),
            other => Err(StoreError::Config(format!(
                "unknown placement scheme '{}'",
                other
            ))),
        }
    }
}

/// Source of new, globally unique content ids
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random (v4) UUIDs in hyphenated form
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Result of planning where content for an id goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub id: String,
    pub location: StorageLocation,
    /// The id was generated by this plan rather than read from the entity
    pub generated: bool,
}

/// Computes storage locations for entities under the current scheme, and
/// under the legacy scheme for read compatibility
#[derive(Clone)]
pub struct PlacementService {
    current: Arc<dyn PlacementStrategy>,
    legacy: Option<Arc<dyn PlacementStrategy>>,
    ids: Arc<dyn IdGenerator>,
}

impl PlacementService {
    pub fn new(current: Arc<dyn PlacementStrategy>) -> Self {
        Self {
            current,
            legacy: None,
            ids: Arc::new(UuidGenerator),
        }
    }

    pub fn with_legacy(mut self, legacy: Arc<dyn PlacementStrategy>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn current_scheme(&self) -> &'static str {
        self.current.name()
    }

    pub fn legacy_scheme(&self) -> Option<&'static str> {
        self.legacy.as_ref().map(|legacy| legacy.name())
    }

    /// Location of `id` under the current scheme
    pub fn locate(&self, id: &str) -> Result<StorageLocation> {
        self.current.locate(id)
    }

    /// Location of `id` under the legacy scheme, if one is configured
    pub fn legacy_location(&self, id: &str) -> Option<Result<StorageLocation>> {
        self.legacy.as_ref().map(|legacy| legacy.locate(id))
    }

    /// Decide id and location without touching any entity
    pub fn plan(&self, id: Option<&str>) -> Result<Placement> {
        match id {
            Some(id) => Ok(Placement {
                id: id.to_string(),
                location: self.locate(id)?,
                generated: false,
            }),
            None => {
                let id = self.ids.generate();
                let location = self.locate(&id)?;
                Ok(Placement {
                    id,
                    location,
                    generated: true,
                })
            }
        }
    }

    /// Location for an entity's content, assigning a fresh id to the entity
    /// when it has none
    pub fn place<E>(
        &self,
        accessor: &dyn MetadataAccessor<E>,
        entity: &mut E,
    ) -> Result<StorageLocation> {
        let placement = self.plan(accessor.content_id(entity).as_deref())?;
        if placement.generated {
            accessor.set_content_id(entity, Some(placement.id));
        }
        Ok(placement.location)
    }
}

impl Default for PlacementService {
    fn default() -> Self {
        Self::new(Arc::new(IdentityPlacement)).with_legacy(Arc::new(PathSegmentPlacement))
    }
}

impl fmt::Debug for PlacementService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlacementService")
            .field("current", &self.current_scheme())
            .field("legacy", &self.legacy_scheme())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::FieldAccessor;

    struct FixedIds(&'static str);

    impl IdGenerator for FixedIds {
        fn generate(&self) -> String {
            self.0.to_string()
        }
    }

    #[derive(Default)]
    struct Entity {
        id: Option<String>,
        len: u64,
    }

    fn accessor() -> FieldAccessor<Entity> {
        FieldAccessor::new(|e| e.id.clone(), |e, id| e.id = id, |e| e.len, |e, l| e.len = l)
    }

    #[test]
    fn test_identity_placement() {
        let location = IdentityPlacement.locate("abcd-efgh").unwrap();
        assert_eq!(location.as_str(), "abcd-efgh");
        assert_eq!(location.relative_path(), "abcd-efgh");
    }

    #[test]
    fn test_identity_rejects_separators() {
        assert!(IdentityPlacement.locate("").is_err());
        assert!(IdentityPlacement.locate("a/b").is_err());
        assert!(IdentityPlacement.locate("a\\b").is_err());
        assert!(IdentityPlacement.locate("..").is_err());
    }

    #[test]
    fn test_path_segment_placement() {
        let location = PathSegmentPlacement.locate("abcd-efgh").unwrap();
        assert_eq!(location.as_str(), "/abcd/efgh");
        assert_eq!(location.relative_path(), "abcd/efgh");
        assert_eq!(location.segments().collect::<Vec<_>>(), vec!["abcd", "efgh"]);
    }

    #[test]
    fn test_path_segment_rejects_empty_segments() {
        assert!(PathSegmentPlacement.locate("").is_err());
        assert!(PathSegmentPlacement.locate("abcd--efgh").is_err());
        assert!(PathSegmentPlacement.locate("-abcd").is_err());
        assert!(PathSegmentPlacement.locate("abcd-..").is_err());
    }

    #[test]
    fn test_sharded_placement() {
        let location = ShardedPlacement.locate("abcdef12").unwrap();
        assert_eq!(location.as_str(), "ab/cd/abcdef12");

        let err = ShardedPlacement.locate("abc").unwrap_err();
        assert!(matches!(err, StoreError::Conversion { .. }));
    }

    #[test]
    fn test_sharded_placement_counts_characters() {
        let location = ShardedPlacement.locate("aébcdef").unwrap();
        assert_eq!(location.as_str(), "aé/bc/aébcdef");

        assert_eq!(ShardedPlacement.locate("abcd").unwrap().as_str(), "ab/cd/abcd");
        assert!(ShardedPlacement.locate("aéb").is_err());
    }

    #[test]
    fn test_location_validation() {
        assert!(StorageLocation::new("/").is_err());
        assert!(StorageLocation::new("a//b").is_err());
        assert!(StorageLocation::new("a/../b").is_err());
        assert!(StorageLocation::new("a/b").is_ok());
    }

    #[test]
    fn test_location_error_names_segment() {
        match StorageLocation::new("/a/./b").unwrap_err() {
            StoreError::Conversion { id, reason } => {
                assert_eq!(id, "/a/./b");
                assert!(reason.contains("'.'"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_scheme_from_str() {
        assert_eq!("path".parse::<Scheme>().unwrap(), Scheme::Path);
        assert_eq!(Scheme::Sharded.strategy().name(), "sharded");
        assert!(matches!(
            "nested".parse::<Scheme>(),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_uuid_generator_is_unique() {
        let a = UuidGenerator.generate();
        let b = UuidGenerator.generate();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_place_assigns_new_id() {
        let service = PlacementService::default().with_id_generator(Arc::new(FixedIds("12345-67890")));
        let mut entity = Entity::default();

        let location = service.place(&accessor(), &mut entity).unwrap();

        assert_eq!(entity.id.as_deref(), Some("12345-67890"));
        assert_eq!(location.as_str(), "12345-67890");
    }

    #[test]
    fn test_place_reuses_existing_id() {
        let service = PlacementService::new(Arc::new(PathSegmentPlacement))
            .with_id_generator(Arc::new(FixedIds("unused")));
        let mut entity = Entity {
            id: Some("abcd-efgh".to_string()),
            len: 3,
        };

        let location = service.place(&accessor(), &mut entity).unwrap();

        assert_eq!(entity.id.as_deref(), Some("abcd-efgh"));
        assert_eq!(location.as_str(), "/abcd/efgh");
    }

    #[test]
    fn test_place_is_deterministic() {
        let service = PlacementService::default();
        let a = service.plan(Some("abcd-efgh")).unwrap();
        let b = service.plan(Some("abcd-efgh")).unwrap();
        assert_eq!(a, b);
        assert!(!a.generated);
    }

    #[test]
    fn test_place_conversion_error_leaves_entity_alone() {
        let service = PlacementService::new(Arc::new(ShardedPlacement))
            .with_id_generator(Arc::new(FixedIds("ab")));
        let mut entity = Entity::default();

        let err = service.place(&accessor(), &mut entity).unwrap_err();

        assert!(matches!(err, StoreError::Conversion { .. }));
        assert!(entity.id.is_none());
    }

    #[test]
    fn test_legacy_location() {
        let service = PlacementService::default();
        let legacy = service.legacy_location("abcd-efgh").unwrap().unwrap();
        assert_eq!(legacy.as_str(), "/abcd/efgh");

        let without = PlacementService::new(Arc::new(IdentityPlacement));
        assert!(without.legacy_location("abcd-efgh").is_none());
    }
}
