// Access to the content id/length fields an entity carries
//
// The store never owns an entity; it reads and writes these two fields
// through an accessor supplied at construction.

/// Reads and writes the content metadata of an entity type `E`
pub trait MetadataAccessor<E>: Send + Sync {
    fn content_id(&self, entity: &E) -> Option<String>;

    fn set_content_id(&self, entity: &mut E, id: Option<String>);

    fn content_length(&self, entity: &E) -> u64;

    fn set_content_length(&self, entity: &mut E, length: u64);
}

/// Entities that expose their content fields directly
pub trait ContentFields {
    fn content_id(&self) -> Option<&str>;
    fn set_content_id(&mut self, id: Option<String>);
    fn content_length(&self) -> u64;
    fn set_content_length(&mut self, length: u64);
}

/// Accessor for any entity implementing [`ContentFields`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Fields;

impl<E: ContentFields> MetadataAccessor<E> for Fields {
    fn content_id(&self, entity: &E) -> Option<String> {
        entity.content_id().map(str::to_string)
    }

    fn set_content_id(&self, entity: &mut E, id: Option<String>) {
        entity.set_content_id(id)
    }

    fn content_length(&self, entity: &E) -> u64 {
        entity.content_length()
    }

    fn set_content_length(&self, entity: &mut E, length: u64) {
        entity.set_content_length(length)
    }
}

/// Accessor built from plain functions, for entity types the caller
/// cannot (or does not want to) implement [`ContentFields`] on
pub struct FieldAccessor<E> {
    get_id: fn(&E) -> Option<String>,
    set_id: fn(&mut E, Option<String>),
    get_length: fn(&E) -> u64,
    set_length: fn(&mut E, u64),
}

impl<E> FieldAccessor<E> {
    pub fn new(
        get_id: fn(&E) -> Option<String>,
        set_id: fn(&mut E, Option<String>),
        get_length: fn(&E) -> u64,
        set_length: fn(&mut E, u64),
    ) -> Self {
        Self {
            get_id,
            set_id,
            get_length,
            set_length,
        }
    }
}

impl<E> Clone for FieldAccessor<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for FieldAccessor<E> {}

impl<E> MetadataAccessor<E> for FieldAccessor<E> {
    fn content_id(&self, entity: &E) -> Option<String> {
        (self.get_id)(entity)
    }

    fn set_content_id(&self, entity: &mut E, id: Option<String>) {
        (self.set_id)(entity, id)
    }

    fn content_length(&self, entity: &E) -> u64 {
        (self.get_length)(entity)
    }

    fn set_content_length(&self, entity: &mut E, length: u64) {
        (self.set_length)(entity, length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Document {
        blob_id: Option<String>,
        blob_len: u64,
    }

    impl ContentFields for Document {
        fn content_id(&self) -> Option<&str> {
            self.blob_id.as_deref()
        }

        fn set_content_id(&mut self, id: Option<String>) {
            self.blob_id = id;
        }

        fn content_length(&self) -> u64 {
            self.blob_len
        }

        fn set_content_length(&mut self, length: u64) {
            self.blob_len = length;
        }
    }

    struct Row {
        key: Option<String>,
        size: u64,
    }

    #[test]
    fn test_fields_accessor() {
        let mut doc = Document::default();
        let accessor = Fields;

        assert_eq!(MetadataAccessor::<Document>::content_id(&accessor, &doc), None);

        accessor.set_content_id(&mut doc, Some("abcd-efgh".to_string()));
        accessor.set_content_length(&mut doc, 42);

        assert_eq!(accessor.content_id(&doc), Some("abcd-efgh".to_string()));
        assert_eq!(accessor.content_length(&doc), 42);
    }

    #[test]
    fn test_field_accessor_from_functions() {
        let accessor: FieldAccessor<Row> = FieldAccessor::new(
            |r| r.key.clone(),
            |r, id| r.key = id,
            |r| r.size,
            |r, len| r.size = len,
        );
        let mut row = Row {
            key: Some("12345-67890".to_string()),
            size: 7,
        };

        assert_eq!(accessor.content_id(&row), Some("12345-67890".to_string()));

        accessor.set_content_id(&mut row, None);
        accessor.set_content_length(&mut row, 0);

        assert!(row.key.is_none());
        assert_eq!(row.size, 0);
    }
}
