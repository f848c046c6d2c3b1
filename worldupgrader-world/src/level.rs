use std::{
    fmt,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    entity::{EntityError, EntityPersistenceAdapter, EntitySectionIndex},
    region::RegionFileOptions,
    storage::{RegionBackedStore, StorageCategory, StorageError},
    WORLD_DATA_VERSION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    Overworld,
    Nether,
    End,
}

impl Dimension {
    /// Upgrade order.
    pub const ALL: [Dimension; 3] = [Dimension::Overworld, Dimension::Nether, Dimension::End];

    /// Folder of this dimension below the world root; the overworld lives in the root.
    pub const fn folder_name(self) -> Option<&'static str> {
        match self {
            Dimension::Overworld => None,
            Dimension::Nether => Some("DIM-1"),
            Dimension::End => Some("DIM1"),
        }
    }

    pub const fn min_y(self) -> i32 {
        match self {
            Dimension::Overworld => -64,
            Dimension::Nether | Dimension::End => 0,
        }
    }

    /// Highest block y, inclusive.
    pub const fn max_y(self) -> i32 {
        match self {
            Dimension::Overworld => 319,
            Dimension::Nether | Dimension::End => 255,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dimension::Overworld => "minecraft:overworld",
            Dimension::Nether => "minecraft:the_nether",
            Dimension::End => "minecraft:the_end",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelFolder {
    pub root_folder: PathBuf,
    pub region_folder: PathBuf,
    pub entities_folder: PathBuf,
}

impl LevelFolder {
    pub fn new(world_root: &Path, dimension: Dimension) -> Self {
        let root_folder = match dimension.folder_name() {
            Some(name) => world_root.join(name),
            None => world_root.to_path_buf(),
        };
        Self {
            region_folder: root_folder.join(StorageCategory::Chunk.folder_name()),
            entities_folder: root_folder.join(StorageCategory::Entity.folder_name()),
            root_folder,
        }
    }

    pub fn exists(&self) -> bool {
        self.root_folder.is_dir()
    }
}

/// One dimension of the world: its chunk store and its entity sections.
pub struct Level {
    pub dimension: Dimension,
    pub folder: LevelFolder,
    pub chunks: RegionBackedStore,
    pub entities: EntityPersistenceAdapter,
}

impl Level {
    pub fn open(
        world_root: &Path,
        dimension: Dimension,
        capacity: NonZeroUsize,
        options: RegionFileOptions,
    ) -> Self {
        let folder = LevelFolder::new(world_root, dimension);
        debug!("Opening {} at {:?}", dimension, folder.root_folder);
        let chunks = RegionBackedStore::new(
            folder.region_folder.clone(),
            StorageCategory::Chunk,
            capacity,
            options,
        );
        let entity_store = RegionBackedStore::new(
            folder.entities_folder.clone(),
            StorageCategory::Entity,
            capacity,
            options,
        );
        Self {
            dimension,
            folder,
            chunks,
            entities: EntityPersistenceAdapter::new(
                entity_store,
                EntitySectionIndex::new(),
                WORLD_DATA_VERSION,
            ),
        }
    }

    /// Resizes both handle caches.
    pub fn set_cache_capacity(&mut self, capacity: NonZeroUsize) -> Result<(), StorageError> {
        self.chunks.set_cache_capacity(capacity)?;
        self.entities.store_mut().set_cache_capacity(capacity)
    }

    /// Commits buffered writes of both stores.
    pub fn save(&mut self) -> Result<(), StorageError> {
        self.chunks.flush()?;
        self.entities.save()
    }

    /// Flushes live entity sections and closes every region file. Both stores are
    /// closed even when one of them fails.
    pub fn close(&mut self) -> Result<(), EntityError> {
        let chunks = self.chunks.close_all();
        self.entities.close()?;
        chunks.map_err(EntityError::from)
    }
}
