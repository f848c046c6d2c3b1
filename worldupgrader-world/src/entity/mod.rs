use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;
use worldupgrader_nbt::{compound::NbtCompound, tag::NbtTag, Nbt};
use worldupgrader_util::math::{position::BlockPos, vector2::Vector2};

use crate::storage::StorageError;

mod adapter;

pub use adapter::EntityPersistenceAdapter;

#[derive(Error, Debug)]
pub enum EntityError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Entity section {coordinate} is not valid NBT: {source}")]
    Nbt {
        coordinate: Vector2<i32>,
        #[source]
        source: worldupgrader_nbt::Error,
    },
    #[error("Entity section stored at {expected} claims to be at {found}")]
    PositionMismatch {
        expected: Vector2<i32>,
        found: Vector2<i32>,
    },
    #[error("No entity section is loaded at {0}")]
    NotLoaded(Vector2<i32>),
}

/// The persisted form of one chunk's entities.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEntityData {
    pub position: Vector2<i32>,
    pub data_version: i32,
    pub entities: Vec<NbtCompound>,
}

impl ChunkEntityData {
    pub fn from_bytes(coordinate: Vector2<i32>, bytes: &[u8]) -> Result<Self, EntityError> {
        let nbt = Nbt::from_bytes(bytes).map_err(|source| EntityError::Nbt { coordinate, source })?;

        let position = match nbt.get_int_array("Position") {
            Some([x, z]) => Vector2::new(*x, *z),
            // Old sections may lack a position; they belong where they are stored
            _ => coordinate,
        };
        if position != coordinate {
            return Err(EntityError::PositionMismatch {
                expected: coordinate,
                found: position,
            });
        }

        let entities = nbt
            .get_list("Entities")
            .unwrap_or_default()
            .iter()
            .filter_map(NbtTag::extract_compound)
            .cloned()
            .collect();

        Ok(Self {
            position,
            data_version: nbt.get_int("DataVersion").unwrap_or_default(),
            entities,
        })
    }

    pub fn to_bytes(&self) -> Result<Bytes, EntityError> {
        let mut root = NbtCompound::new();
        root.put_int("DataVersion", self.data_version);
        root.put(
            "Position",
            NbtTag::IntArray(vec![self.position.x, self.position.z].into_boxed_slice()),
        );
        root.put("Entities", self.entities.clone());
        Nbt::from(root)
            .write()
            .map_err(|source| EntityError::Nbt {
                coordinate: self.position,
                source,
            })
    }
}

/// Identity of an entity compound, from its `UUID` int array.
pub fn entity_uuid(entity: &NbtCompound) -> Option<Uuid> {
    match entity.get_int_array("UUID")? {
        [a, b, c, d] => Some(Uuid::from_u128(
            (*a as u32 as u128) << 96
                | (*b as u32 as u128) << 64
                | (*c as u32 as u128) << 32
                | *d as u32 as u128,
        )),
        _ => None,
    }
}

/// Chunk the entity stands in, from its `Pos` list of doubles.
pub fn entity_chunk(entity: &NbtCompound) -> Option<Vector2<i32>> {
    match entity.get_list("Pos")? {
        [x, y, z] => Some(
            BlockPos::floored(x.extract_double()?, y.extract_double()?, z.extract_double()?)
                .chunk_position(),
        ),
        _ => None,
    }
}

/// The live entities of one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitySection {
    data_version: i32,
    entities: Vec<NbtCompound>,
    dirty: bool,
}

impl EntitySection {
    pub fn new(data_version: i32, entities: Vec<NbtCompound>) -> Self {
        Self {
            data_version,
            entities,
            dirty: false,
        }
    }

    pub fn entities(&self) -> &[NbtCompound] {
        &self.entities
    }

    /// Mutable access marks the section as modified.
    pub fn entities_mut(&mut self) -> &mut Vec<NbtCompound> {
        self.dirty = true;
        &mut self.entities
    }

    pub fn data_version(&self) -> i32 {
        self.data_version
    }

    pub fn uuids(&self) -> Vec<Uuid> {
        self.entities.iter().filter_map(entity_uuid).collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

/// In-memory entity sections keyed by chunk coordinate.
#[derive(Debug, Default)]
pub struct EntitySectionIndex {
    sections: HashMap<Vector2<i32>, EntitySection>,
}

impl EntitySectionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, coordinate: &Vector2<i32>) -> Option<&EntitySection> {
        self.sections.get(coordinate)
    }

    pub fn get_mut(&mut self, coordinate: &Vector2<i32>) -> Option<&mut EntitySection> {
        self.sections.get_mut(coordinate)
    }

    pub fn insert(&mut self, coordinate: Vector2<i32>, section: EntitySection) -> Option<EntitySection> {
        self.sections.insert(coordinate, section)
    }

    pub fn remove(&mut self, coordinate: &Vector2<i32>) -> Option<EntitySection> {
        self.sections.remove(coordinate)
    }

    pub fn contains(&self, coordinate: &Vector2<i32>) -> bool {
        self.sections.contains_key(coordinate)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Coordinates of modified sections, sorted.
    pub fn dirty_sections(&self) -> Vec<Vector2<i32>> {
        let mut dirty: Vec<_> = self
            .sections
            .iter()
            .filter(|(_, section)| section.is_dirty())
            .map(|(coordinate, _)| *coordinate)
            .collect();
        dirty.sort();
        dirty
    }
}
