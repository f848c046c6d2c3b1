use log::{debug, trace};
use worldupgrader_util::math::vector2::Vector2;

use super::{ChunkEntityData, EntityError, EntitySection, EntitySectionIndex};
use crate::storage::{RegionBackedStore, StorageCategory, StorageError};

/// Moves entity sections between the live [`EntitySectionIndex`] and an
/// entity-category [`RegionBackedStore`].
pub struct EntityPersistenceAdapter {
    store: RegionBackedStore,
    index: EntitySectionIndex,
    data_version: i32,
}

impl EntityPersistenceAdapter {
    /// `data_version` is stamped on every section this adapter writes.
    pub fn new(store: RegionBackedStore, index: EntitySectionIndex, data_version: i32) -> Self {
        debug_assert_eq!(store.category(), StorageCategory::Entity);
        Self {
            store,
            index,
            data_version,
        }
    }

    pub fn index(&self) -> &EntitySectionIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut EntitySectionIndex {
        &mut self.index
    }

    pub fn store(&self) -> &RegionBackedStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RegionBackedStore {
        &mut self.store
    }

    /// Reads the persisted section at `coordinate` into the index, replacing any
    /// live copy. A chunk without stored entities loads as an empty section.
    /// Returns the number of loaded entities.
    pub fn load(&mut self, coordinate: Vector2<i32>) -> Result<usize, EntityError> {
        let section = match self.store.read(coordinate)? {
            Some(bytes) => {
                let data = ChunkEntityData::from_bytes(coordinate, &bytes)?;
                EntitySection::new(data.data_version, data.entities)
            }
            None => EntitySection::new(self.data_version, Vec::new()),
        };
        let count = section.entities().len();
        trace!("Loaded {} entities at {}", count, coordinate);
        self.index.insert(coordinate, section);
        Ok(count)
    }

    /// Writes the section at `coordinate` if it was modified. An empty section
    /// removes the stored payload. Returns whether anything was written.
    pub fn flush(&mut self, coordinate: Vector2<i32>) -> Result<bool, EntityError> {
        let section = self
            .index
            .get_mut(&coordinate)
            .ok_or(EntityError::NotLoaded(coordinate))?;
        if !section.is_dirty() {
            return Ok(false);
        }

        if section.entities().is_empty() {
            debug!("Entity section {} is empty, removing it", coordinate);
            self.store.remove(coordinate)?;
        } else {
            let data = ChunkEntityData {
                position: coordinate,
                data_version: self.data_version,
                entities: section.entities().to_vec(),
            };
            self.store.write(coordinate, data.to_bytes()?)?;
        }
        section.data_version = self.data_version;
        section.mark_clean();
        Ok(true)
    }

    /// Flushes every modified section. Returns how many were written.
    pub fn flush_all(&mut self) -> Result<usize, EntityError> {
        let mut written = 0;
        for coordinate in self.index.dirty_sections() {
            if self.flush(coordinate)? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Flushes the section at `coordinate` and drops it from the index.
    pub fn release(&mut self, coordinate: Vector2<i32>) -> Result<Option<EntitySection>, EntityError> {
        if !self.index.contains(&coordinate) {
            return Ok(None);
        }
        self.flush(coordinate)?;
        Ok(self.index.remove(&coordinate))
    }

    /// Commits buffered region writes to disk.
    pub fn save(&mut self) -> Result<(), StorageError> {
        self.store.flush()
    }

    /// Flushes every live section and closes the region files.
    pub fn close(&mut self) -> Result<(), EntityError> {
        self.flush_all()?;
        self.store.close_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use temp_dir::TempDir;
    use worldupgrader_util::math::vector2::Vector2;

    use super::EntityPersistenceAdapter;
    use crate::{
        entity::{tests::entity, EntityError, EntitySection, EntitySectionIndex},
        storage::{RegionBackedStore, StorageCategory},
        WORLD_DATA_VERSION,
    };

    fn adapter(dir: &TempDir) -> EntityPersistenceAdapter {
        let store = RegionBackedStore::new(
            dir.path().join("entities"),
            StorageCategory::Entity,
            NonZeroUsize::new(8).unwrap(),
            Default::default(),
        );
        EntityPersistenceAdapter::new(store, EntitySectionIndex::new(), WORLD_DATA_VERSION)
    }

    #[test]
    fn flush_then_load_into_fresh_index_keeps_identities() {
        let _ = env_logger::try_init();
        let dir = TempDir::new().unwrap();
        let at = Vector2::new(3, 4);
        let entities = vec![
            entity("minecraft:cow", [1, 2, 3, 4]),
            entity("minecraft:zombie", [-5, 6, -7, 8]),
        ];

        let mut adapter = adapter(&dir);
        let mut section = EntitySection::new(3700, entities.clone());
        section.mark_dirty();
        adapter.index_mut().insert(at, section);
        assert!(adapter.flush(at).unwrap());
        let uuids = adapter.index().get(&at).unwrap().uuids();
        adapter.close().unwrap();

        let mut fresh = self::adapter(&dir);
        assert_eq!(fresh.load(at).unwrap(), 2);
        let loaded = fresh.index().get(&at).unwrap();
        assert_eq!(loaded.entities(), entities.as_slice());
        assert_eq!(loaded.uuids(), uuids);
        assert_eq!(loaded.data_version(), WORLD_DATA_VERSION);
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn clean_sections_are_not_written() {
        let dir = TempDir::new().unwrap();
        let at = Vector2::new(-1, -1);
        let mut adapter = adapter(&dir);
        adapter
            .index_mut()
            .insert(at, EntitySection::new(3700, vec![entity("minecraft:pig", [0, 0, 0, 1])]));

        assert!(!adapter.flush(at).unwrap());
        assert!(!adapter.store_mut().has_chunk(at).unwrap());
    }

    #[test]
    fn emptied_section_is_removed_from_storage() {
        let dir = TempDir::new().unwrap();
        let at = Vector2::new(10, 10);
        let mut adapter = adapter(&dir);
        let mut section = EntitySection::new(3700, vec![entity("minecraft:pig", [0, 0, 0, 1])]);
        section.mark_dirty();
        adapter.index_mut().insert(at, section);
        adapter.flush(at).unwrap();
        assert!(adapter.store_mut().has_chunk(at).unwrap());

        adapter.index_mut().get_mut(&at).unwrap().entities_mut().clear();
        assert!(adapter.release(at).unwrap().is_some());
        assert!(!adapter.store_mut().has_chunk(at).unwrap());
        assert!(adapter.index().is_empty());
    }

    #[test]
    fn missing_section_loads_empty_and_unloaded_cannot_flush() {
        let dir = TempDir::new().unwrap();
        let mut adapter = adapter(&dir);
        assert_eq!(adapter.load(Vector2::new(0, 0)).unwrap(), 0);
        assert!(adapter.index().get(&Vector2::new(0, 0)).unwrap().entities().is_empty());
        assert!(matches!(
            adapter.flush(Vector2::new(1, 1)),
            Err(EntityError::NotLoaded(_))
        ));
    }
}
