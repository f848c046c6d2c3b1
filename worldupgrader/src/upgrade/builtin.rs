use worldupgrader_nbt::{compound::NbtCompound, tag::NbtTag};
use worldupgrader_util::math::vector2::Vector2;

use super::{ChunkUpgrade, EntityUpgrade, UpgradeSet};

pub const DATA_VERSION_SET: &str = "data_version";

/// Re-serializes every chunk and entity section with the current data version.
pub fn data_version_set() -> UpgradeSet {
    UpgradeSet::new(DATA_VERSION_SET)
        .with_chunk_upgrade(NamespacedStatus)
        .with_entity_upgrade(NamespacedEntityId)
}

fn namespaced(value: Option<&String>) -> Option<String> {
    value
        .filter(|name| !name.contains(':'))
        .map(|name| format!("minecraft:{name}"))
}

/// Older chunks store their generation status without the namespace.
pub struct NamespacedStatus;

impl ChunkUpgrade for NamespacedStatus {
    fn name(&self) -> &'static str {
        "namespaced_status"
    }

    fn upgrade_chunk(&self, _position: Vector2<i32>, chunk: &mut NbtCompound) {
        if let Some(status) = namespaced(chunk.get_string("Status")) {
            chunk.put("Status", status);
        }
    }
}

/// Namespaces entity ids, including those of passengers.
pub struct NamespacedEntityId;

impl EntityUpgrade for NamespacedEntityId {
    fn name(&self) -> &'static str {
        "namespaced_entity_id"
    }

    fn upgrade_entity(&self, chunk: Vector2<i32>, entity: &mut NbtCompound) {
        if let Some(id) = namespaced(entity.get_string("id")) {
            entity.put("id", id);
        }
        if let Some(NbtTag::List(passengers)) = entity.get_mut("Passengers") {
            for passenger in passengers.iter_mut().filter_map(NbtTag::extract_compound_mut) {
                self.upgrade_entity(chunk, passenger);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use worldupgrader_nbt::{compound::NbtCompound, tag::NbtTag};
    use worldupgrader_util::math::vector2::Vector2;

    use super::{NamespacedEntityId, NamespacedStatus};
    use crate::upgrade::{ChunkUpgrade, EntityUpgrade};

    #[test]
    fn bare_status_gets_namespace() {
        let mut chunk = NbtCompound::new();
        chunk.put("Status", "full");
        NamespacedStatus.upgrade_chunk(Vector2::new(0, 0), &mut chunk);
        assert_eq!(chunk.get_string("Status").unwrap(), "minecraft:full");

        NamespacedStatus.upgrade_chunk(Vector2::new(0, 0), &mut chunk);
        assert_eq!(chunk.get_string("Status").unwrap(), "minecraft:full");
    }

    #[test]
    fn passengers_are_upgraded_too() {
        let mut jockey = NbtCompound::new();
        jockey.put("id", "chicken");
        let mut rider = NbtCompound::new();
        rider.put("id", "zombie");
        rider.put("Passengers", vec![jockey]);

        NamespacedEntityId.upgrade_entity(Vector2::new(1, 1), &mut rider);
        assert_eq!(rider.get_string("id").unwrap(), "minecraft:zombie");
        let passenger = rider.get_list("Passengers").unwrap()[0].extract_compound().unwrap();
        assert_eq!(passenger.get_string("id").unwrap(), "minecraft:chicken");
        assert!(matches!(rider.get("Passengers"), Some(NbtTag::List(_))));
    }
}
