//! Rewrites a world's chunks and entity sections in the current format once the
//! server is up.
//!
//! What changes between versions is decided by [`UpgradeSet`]s, selected by name
//! from the `upgrade.versions` configuration. The pass itself lives in
//! [`driver`].

use std::collections::BTreeMap;

use log::warn;
use thiserror::Error;
use worldupgrader_nbt::compound::NbtCompound;
use worldupgrader_util::math::vector2::Vector2;
use worldupgrader_world::{entity::EntityError, level::Dimension, storage::StorageError};

use crate::server::{hook::HookPoint, Server, ServerError};

pub mod builtin;
pub mod driver;
pub mod report;

pub use driver::upgrade_world;
pub use report::{LevelReport, UpgradeReport};

#[derive(Error, Debug)]
pub enum UpgradeError {
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error("Chunk {coordinate} of {dimension} is not valid NBT: {source}")]
    Nbt {
        dimension: Dimension,
        coordinate: Vector2<i32>,
        #[source]
        source: worldupgrader_nbt::Error,
    },
    #[error("Entities of {coordinate} in {dimension} changed identity while being rewritten")]
    IdentityChanged {
        dimension: Dimension,
        coordinate: Vector2<i32>,
    },
}

/// Changes a stored chunk.
pub trait ChunkUpgrade {
    fn name(&self) -> &'static str;

    fn applies_to(&self, _dimension: Dimension) -> bool {
        true
    }

    fn upgrade_chunk(&self, position: Vector2<i32>, chunk: &mut NbtCompound);
}

/// Changes one stored entity. `chunk` is the section the entity is stored in.
pub trait EntityUpgrade {
    fn name(&self) -> &'static str;

    fn applies_to(&self, _dimension: Dimension) -> bool {
        true
    }

    fn upgrade_entity(&self, chunk: Vector2<i32>, entity: &mut NbtCompound);
}

/// Named group of upgrades, usually everything one game version needs.
pub struct UpgradeSet {
    name: String,
    chunk_upgrades: Vec<Box<dyn ChunkUpgrade>>,
    entity_upgrades: Vec<Box<dyn EntityUpgrade>>,
}

impl UpgradeSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chunk_upgrades: Vec::new(),
            entity_upgrades: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn with_chunk_upgrade(mut self, upgrade: impl ChunkUpgrade + 'static) -> Self {
        self.chunk_upgrades.push(Box::new(upgrade));
        self
    }

    #[must_use]
    pub fn with_entity_upgrade(mut self, upgrade: impl EntityUpgrade + 'static) -> Self {
        self.entity_upgrades.push(Box::new(upgrade));
        self
    }
}

/// Every upgrade set the driver can select.
#[derive(Default)]
pub struct UpgradeRegistry {
    sets: BTreeMap<String, UpgradeSet>,
}

impl UpgradeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(builtin::data_version_set());
        registry
    }

    /// Adds `set`, replacing a set of the same name.
    pub fn register(&mut self, set: UpgradeSet) {
        if self.sets.contains_key(&set.name) {
            warn!("Replacing upgrade set {}", set.name);
        }
        self.sets.insert(set.name.clone(), set);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sets.contains_key(name)
    }

    /// Merges the named sets in name order. Unknown names are skipped.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> SelectedUpgrades<'_> {
        let mut names: Vec<&str> = names.iter().map(|name| name.as_ref().trim()).collect();
        names.sort_unstable();
        names.dedup();

        let mut selected = SelectedUpgrades::default();
        for name in names.into_iter().filter(|name| !name.is_empty()) {
            let Some(set) = self.sets.get(name) else {
                warn!("Unknown upgrade set {}, ignoring it", name);
                continue;
            };
            selected.sets.push(&set.name);
            selected
                .chunk_upgrades
                .extend(set.chunk_upgrades.iter().map(Box::as_ref));
            selected
                .entity_upgrades
                .extend(set.entity_upgrades.iter().map(Box::as_ref));
        }
        selected
    }
}

/// The upgrades of the configured sets, in application order.
#[derive(Default)]
pub struct SelectedUpgrades<'a> {
    sets: Vec<&'a str>,
    chunk_upgrades: Vec<&'a dyn ChunkUpgrade>,
    entity_upgrades: Vec<&'a dyn EntityUpgrade>,
}

impl<'a> SelectedUpgrades<'a> {
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn set_names(&self) -> Vec<String> {
        self.sets.iter().map(ToString::to_string).collect()
    }

    pub fn upgrade_names(&self) -> Vec<&'static str> {
        self.chunk_upgrades
            .iter()
            .map(|upgrade| upgrade.name())
            .chain(self.entity_upgrades.iter().map(|upgrade| upgrade.name()))
            .collect()
    }

    /// The upgrades that apply to `dimension`.
    pub fn for_dimension(&self, dimension: Dimension) -> SelectedUpgrades<'a> {
        SelectedUpgrades {
            sets: self.sets.clone(),
            chunk_upgrades: self
                .chunk_upgrades
                .iter()
                .copied()
                .filter(|upgrade| upgrade.applies_to(dimension))
                .collect(),
            entity_upgrades: self
                .entity_upgrades
                .iter()
                .copied()
                .filter(|upgrade| upgrade.applies_to(dimension))
                .collect(),
        }
    }

    pub fn upgrade_chunk(&self, position: Vector2<i32>, chunk: &mut NbtCompound) {
        for upgrade in &self.chunk_upgrades {
            upgrade.upgrade_chunk(position, chunk);
        }
    }

    pub fn upgrade_entity(&self, chunk: Vector2<i32>, entity: &mut NbtCompound) {
        for upgrade in &self.entity_upgrades {
            upgrade.upgrade_entity(chunk, entity);
        }
    }
}

/// Runs the upgrade with `registry` once the server finished initializing.
pub fn install(server: &mut Server, registry: UpgradeRegistry) {
    server.register_hook(
        HookPoint::AfterServerInit,
        Box::new(move |server: &mut Server| {
            if let Some(report) = upgrade_world(server, &registry)? {
                report.log();
            }
            Ok(())
        }),
    );
}
