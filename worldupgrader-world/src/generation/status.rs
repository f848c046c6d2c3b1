use std::{collections::HashMap, fmt};

use log::warn;
use worldupgrader_nbt::Nbt;
use worldupgrader_util::math::vector2::Vector2;

use crate::storage::{RegionBackedStore, StorageError};

/// The steps of the generation pipeline, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChunkStatus {
    Empty,
    StructureStarts,
    StructureReferences,
    Biomes,
    Noise,
    Surface,
    Carvers,
    Features,
    InitializeLight,
    Light,
    Spawn,
    Full,
}

impl ChunkStatus {
    const ALL: [ChunkStatus; 12] = [
        ChunkStatus::Empty,
        ChunkStatus::StructureStarts,
        ChunkStatus::StructureReferences,
        ChunkStatus::Biomes,
        ChunkStatus::Noise,
        ChunkStatus::Surface,
        ChunkStatus::Carvers,
        ChunkStatus::Features,
        ChunkStatus::InitializeLight,
        ChunkStatus::Light,
        ChunkStatus::Spawn,
        ChunkStatus::Full,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ChunkStatus::Empty => "empty",
            ChunkStatus::StructureStarts => "structure_starts",
            ChunkStatus::StructureReferences => "structure_references",
            ChunkStatus::Biomes => "biomes",
            ChunkStatus::Noise => "noise",
            ChunkStatus::Surface => "surface",
            ChunkStatus::Carvers => "carvers",
            ChunkStatus::Features => "features",
            ChunkStatus::InitializeLight => "initialize_light",
            ChunkStatus::Light => "light",
            ChunkStatus::Spawn => "spawn",
            ChunkStatus::Full => "full",
        }
    }

    /// Parses a stored `Status`, with or without the `minecraft:` prefix.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix("minecraft:").unwrap_or(name);
        Self::ALL.into_iter().find(|status| status.name() == name)
    }

    /// How many chunks around itself this step may write into.
    pub const fn write_radius(self) -> i32 {
        match self {
            ChunkStatus::Features => 1,
            _ => 0,
        }
    }

    /// The furthest any step writes outside its own chunk.
    pub fn max_write_radius() -> i32 {
        Self::ALL
            .into_iter()
            .map(ChunkStatus::write_radius)
            .max()
            .unwrap_or_default()
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "minecraft:{}", self.name())
    }
}

/// Read access to how far generation got for each chunk.
pub trait GenerationState {
    /// `None` for chunks that were never generated.
    fn status(&self, chunk: Vector2<i32>) -> Option<ChunkStatus>;
}

/// Generation state held in memory, usually filled by scanning a chunk store.
#[derive(Debug, Default, Clone)]
pub struct ChunkStatusMap {
    statuses: HashMap<Vector2<i32>, ChunkStatus>,
}

impl ChunkStatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chunk: Vector2<i32>, status: ChunkStatus) {
        self.statuses.insert(chunk, status);
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Reads the `Status` of every stored chunk. Chunks whose payload cannot be
    /// parsed, or that carry an unknown status, count as [`ChunkStatus::Empty`].
    pub fn scan(store: &mut RegionBackedStore) -> Result<Self, StorageError> {
        let mut map = Self::new();
        for region in store.regions()? {
            for chunk in store.chunks_in_region(region)? {
                let Some(bytes) = store.read(chunk)? else {
                    continue;
                };
                let status = match Nbt::from_bytes(&bytes) {
                    Ok(nbt) => nbt
                        .get_string("Status")
                        .and_then(|name| ChunkStatus::from_name(name))
                        .unwrap_or(ChunkStatus::Empty),
                    Err(err) => {
                        warn!("Chunk {} is not valid NBT, treating it as empty: {}", chunk, err);
                        ChunkStatus::Empty
                    }
                };
                map.insert(chunk, status);
            }
        }
        Ok(map)
    }
}

impl GenerationState for ChunkStatusMap {
    fn status(&self, chunk: Vector2<i32>) -> Option<ChunkStatus> {
        self.statuses.get(&chunk).copied()
    }
}

impl FromIterator<(Vector2<i32>, ChunkStatus)> for ChunkStatusMap {
    fn from_iter<T: IntoIterator<Item = (Vector2<i32>, ChunkStatus)>>(iter: T) -> Self {
        Self {
            statuses: iter.into_iter().collect(),
        }
    }
}
