//! The `DataSource` abstraction and its MapView-owned registry.
//!
//! Modeled as a trait per the ownership design: MapView owns
//! DataSources in a vector and the core never introspects concrete
//! types (vector tile, raster, elevation sources all implement the same
//! contract independently).

use crate::error::DataSourceRegistrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilingScheme {
    WebMercator,
}

/// A coarse view of one tile's lifecycle state, reported without
/// exposing the tile's owning cache or GPU resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSnapshot {
    pub tile_key: mapengine_model::TileKey,
    pub state: mapengine_tiles::TileStateKind,
}

pub trait DataSource {
    fn name(&self) -> &str;
    fn ready(&self) -> bool;
    fn style_set_name(&self) -> &str;
    fn tiling_scheme(&self) -> TilingScheme;
    fn get_tile(&self, tile_key: mapengine_model::TileKey) -> Option<TileSnapshot>;
    /// Releases any resources the source is holding (outstanding
    /// requests, handles into the worker pool). Called exactly once,
    /// when the source is removed from the registry.
    fn dispose(&mut self);
}

/// Stable, MapView-assigned identity for a registered `DataSource` —
/// cheaper to carry around than the source's name, and stable across a
/// rename (were renaming ever supported).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataSourceId(pub u32);

struct Entry {
    id: DataSourceId,
    source: Box<dyn DataSource>,
}

/// Enforces the invariant that DataSource names are unique within one
/// MapView. DataSources refer back to the registry only by their own
/// stable name, never by a pointer, so the registry is free to reorder
/// or compact its storage.
#[derive(Default)]
pub struct DataSourceRegistry {
    entries: Vec<Entry>,
    next_id: u32,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(
        &mut self,
        source: Box<dyn DataSource>,
    ) -> Result<DataSourceId, DataSourceRegistrationError> {
        if self.entries.iter().any(|entry| entry.source.name() == source.name()) {
            return Err(DataSourceRegistrationError::DuplicateName {
                name: source.name().to_owned(),
            });
        }
        let id = DataSourceId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, source });
        Ok(id)
    }

    pub fn remove_by_name(
        &mut self,
        name: &str,
    ) -> Result<(), DataSourceRegistrationError> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.source.name() == name)
            .ok_or_else(|| DataSourceRegistrationError::NotFound {
                name: name.to_owned(),
            })?;
        let mut entry = self.entries.remove(position);
        entry.source.dispose();
        Ok(())
    }

    pub fn get(&self, id: DataSourceId) -> Option<&dyn DataSource> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.source.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (DataSourceId, &dyn DataSource)> {
        self.entries.iter().map(|entry| (entry.id, entry.source.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubSource {
        name: String,
        disposed: bool,
    }

    impl DataSource for StubSource {
        fn name(&self) -> &str {
            &self.name
        }
        fn ready(&self) -> bool {
            true
        }
        fn style_set_name(&self) -> &str {
            "default"
        }
        fn tiling_scheme(&self) -> TilingScheme {
            TilingScheme::WebMercator
        }
        fn get_tile(&self, _tile_key: mapengine_model::TileKey) -> Option<TileSnapshot> {
            None
        }
        fn dispose(&mut self) {
            self.disposed = true;
        }
    }

    #[test]
    fn rejects_duplicate_name() {
        let mut registry = DataSourceRegistry::new();
        registry
            .add(Box::new(StubSource { name: "roads".into(), disposed: false }))
            .unwrap();
        let result = registry.add(Box::new(StubSource { name: "roads".into(), disposed: false }));
        assert_eq!(
            result,
            Err(DataSourceRegistrationError::DuplicateName { name: "roads".into() })
        );
    }

    #[test]
    fn remove_disposes_the_source() {
        let mut registry = DataSourceRegistry::new();
        registry
            .add(Box::new(StubSource { name: "roads".into(), disposed: false }))
            .unwrap();
        registry.remove_by_name("roads").unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_missing_name_errors() {
        let mut registry = DataSourceRegistry::new();
        assert_eq!(
            registry.remove_by_name("missing"),
            Err(DataSourceRegistrationError::NotFound { name: "missing".into() })
        );
    }
}
