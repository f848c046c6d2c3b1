use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};

use log::{debug, info, warn};
use worldupgrader_config::upgrade::UpgradeConfig;
use worldupgrader_nbt::Nbt;
use worldupgrader_world::{
    entity::{entity_chunk, EntityError, EntitySection},
    generation::{ChunkStatusMap, WritableAreaValidator},
    level::{Dimension, Level},
    storage::WriteOutcome,
    WORLD_DATA_VERSION,
};

use super::{LevelReport, SelectedUpgrades, UpgradeError, UpgradeRegistry, UpgradeReport};
use crate::server::{LevelRegistry, Server};

type Validator = WritableAreaValidator<ChunkStatusMap>;

/// Rewrites every chunk and entity section of the server's world with the
/// configured upgrade sets.
///
/// The task queue is drained before and after the pass, so every save has
/// landed when this returns. Region caches run at `upgrade_capacity` during the
/// pass and are put back to `gameplay_capacity` afterwards, also on failure.
/// Returns `None` when upgrades are disabled or no known set is configured.
pub fn upgrade_world(
    server: &mut Server,
    registry: &UpgradeRegistry,
) -> Result<Option<UpgradeReport>, UpgradeError> {
    let config = server.config().advanced.upgrade.clone();
    if !config.enabled {
        info!("Skipping world upgrades because they are disabled");
        return Ok(None);
    }
    let selected = registry.select(&config.versions);
    if selected.is_empty() {
        info!("Skipping world upgrades because no valid versions were specified");
        return Ok(None);
    }
    info!(
        "Upgrading worlds with upgrade sets {}",
        selected.set_names().join(", ")
    );
    debug!("Applying upgrades {}", selected.upgrade_names().join(", "));

    let started = Instant::now();
    server.run_all_pending()?;

    let caches = server.config().advanced.region_cache.clone();
    set_cache_capacity(server, caches.upgrade_capacity)?;
    let pass = upgrade_levels(server, &selected, &config);
    let drained = server.run_all_pending();
    let restored = set_cache_capacity(server, caches.gameplay_capacity);

    let levels = pass?;
    drained?;
    restored?;
    Ok(Some(UpgradeReport {
        sets: selected.set_names(),
        levels,
        elapsed: started.elapsed(),
    }))
}

fn set_cache_capacity(server: &mut Server, capacity: NonZeroUsize) -> Result<(), UpgradeError> {
    for level in server.levels.iter_mut() {
        level.set_cache_capacity(capacity)?;
    }
    Ok(())
}

fn upgrade_levels(
    server: &mut Server,
    selected: &SelectedUpgrades<'_>,
    config: &UpgradeConfig,
) -> Result<Vec<LevelReport>, UpgradeError> {
    let mut reports = Vec::new();
    for dimension in Dimension::ALL {
        let level = server.level_mut(dimension)?;
        if !level.folder.exists() {
            debug!("Skipping {}, its folder does not exist", dimension);
            continue;
        }
        info!("Upgrading {}", dimension);

        let statuses = ChunkStatusMap::scan(&mut level.chunks)?;
        let validator = WritableAreaValidator::new(
            statuses,
            config.writable_radius,
            dimension.min_y(),
            dimension.max_y(),
        );
        let upgrades = selected.for_dimension(dimension);
        let mut report = LevelReport::new(dimension);

        upgrade_entities(level, &validator, &upgrades, &mut report)?;
        upgrade_chunks(
            server,
            dimension,
            &validator,
            &upgrades,
            config.max_pending_chunks,
            &mut report,
        )?;
        reports.push(report);
    }
    Ok(reports)
}

/// Loads every safe entity section, upgrades its entities and writes it back,
/// then reloads it to check no entity changed identity.
fn upgrade_entities(
    level: &mut Level,
    validator: &Validator,
    upgrades: &SelectedUpgrades<'_>,
    report: &mut LevelReport,
) -> Result<(), UpgradeError> {
    let dimension = level.dimension;
    let adapter = &mut level.entities;

    let regions = adapter.store().regions()?;
    for region in regions {
        let chunks = adapter.store_mut().chunks_in_region(region)?;
        for chunk in chunks {
            if !validator.is_writable(chunk) {
                report.deferred_entity_sections.push(chunk);
                continue;
            }

            adapter.load(chunk)?;
            let section = adapter
                .index_mut()
                .get_mut(&chunk)
                .ok_or(EntityError::NotLoaded(chunk))?;
            let before = section.uuids();
            for entity in section.entities_mut() {
                upgrades.upgrade_entity(chunk, entity);
            }
            let entities = section.entities().len();
            let misplaced = section
                .entities()
                .iter()
                .filter_map(entity_chunk)
                .filter(|stands_in| *stands_in != chunk)
                .count();
            if misplaced > 0 {
                warn!(
                    "{} entities stored in section {} of {} stand in another chunk",
                    misplaced, chunk, dimension
                );
            }
            adapter.flush(chunk)?;

            adapter.load(chunk)?;
            let after = adapter
                .index()
                .get(&chunk)
                .map(EntitySection::uuids)
                .unwrap_or_default();
            if before != after {
                return Err(UpgradeError::IdentityChanged {
                    dimension,
                    coordinate: chunk,
                });
            }
            adapter.release(chunk)?;

            report.entity_sections_rewritten += 1;
            report.entities_rewritten += entities;
            report.misplaced_entities += misplaced;
        }
        adapter.save()?;
        debug!("Upgraded entities of region {} in {}", region, dimension);
    }
    Ok(())
}

/// Upgrades every safe chunk and queues its save on the server's task queue.
fn upgrade_chunks(
    server: &mut Server,
    dimension: Dimension,
    validator: &Validator,
    upgrades: &SelectedUpgrades<'_>,
    max_pending: usize,
    report: &mut LevelReport,
) -> Result<(), UpgradeError> {
    let written = Arc::new(AtomicUsize::new(0));

    let regions = server.level_mut(dimension)?.chunks.regions()?;
    for region in regions {
        let chunks = server.level_mut(dimension)?.chunks.chunks_in_region(region)?;
        for chunk in chunks {
            let Some(area) = validator
                .writable_area(chunk)
                .filter(|area| area.contains_chunk(chunk))
            else {
                report.deferred_chunks.push(chunk);
                continue;
            };
            let Some(bytes) = server.level_mut(dimension)?.chunks.read(chunk)? else {
                continue;
            };

            let to_error = |source: worldupgrader_nbt::Error| UpgradeError::Nbt {
                dimension,
                coordinate: chunk,
                source,
            };
            let mut nbt = Nbt::from_bytes(&bytes).map_err(to_error)?;
            upgrades.upgrade_chunk(chunk, &mut nbt);
            nbt.put_int("DataVersion", WORLD_DATA_VERSION);
            let payload = nbt.write().map_err(to_error)?;

            let written = Arc::clone(&written);
            server.enqueue(Box::new(move |levels: &mut LevelRegistry| {
                let outcome = levels
                    .require(dimension)?
                    .chunks
                    .write_within(chunk, payload, Some(&area))?;
                if outcome == WriteOutcome::Written {
                    written.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            }));

            if server.pending_tasks() > max_pending {
                debug!(
                    "{} chunk saves pending, draining the task queue",
                    server.pending_tasks()
                );
                server.run_all_pending()?;
            }
        }

        server.run_all_pending()?;
        server.level_mut(dimension)?.save()?;
        debug!("Upgraded chunks of region {} in {}", region, dimension);
    }

    report.chunks_rewritten = written.load(Ordering::Relaxed);
    if !report.deferred_chunks.is_empty() {
        warn!(
            "{} chunks of {} are not fully generated and were left as they are",
            report.deferred_chunks.len(),
            dimension
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;
    use worldupgrader_config::ServerConfig;
    use worldupgrader_nbt::{compound::NbtCompound, tag::NbtTag, Nbt};
    use worldupgrader_util::math::vector2::Vector2;
    use worldupgrader_world::{
        entity::ChunkEntityData,
        level::Dimension,
        WORLD_DATA_VERSION,
    };

    use super::upgrade_world;
    use crate::{
        server::Server,
        upgrade::{install, UpgradeRegistry},
    };

    const OLD_VERSION: i32 = 3700;

    fn chunk(at: Vector2<i32>, status: &str) -> Bytes {
        let mut chunk = NbtCompound::new();
        chunk.put_int("DataVersion", OLD_VERSION);
        chunk.put_int("xPos", at.x);
        chunk.put_int("zPos", at.z);
        chunk.put("Status", status);
        Nbt::from(chunk).write().unwrap()
    }

    fn cow(uuid: [i32; 4], pos: [f64; 3]) -> NbtCompound {
        let mut cow = NbtCompound::new();
        cow.put("id", "cow");
        cow.put("Pos", NbtTag::List(pos.map(NbtTag::Double).into()));
        cow.put("UUID", NbtTag::IntArray(uuid.to_vec().into_boxed_slice()));
        cow
    }

    /// Overworld with a 5x5 square of fully generated chunks around the origin
    /// and entity sections at its centre and in a corner.
    fn world(config: ServerConfig) -> (TempDir, Server) {
        let _ = env_logger::try_init();
        let dir = TempDir::new().unwrap();
        let mut server = Server::new(config, dir.path());
        let level = server.level_mut(Dimension::Overworld).unwrap();
        for x in -2..=2 {
            for z in -2..=2 {
                let at = Vector2::new(x, z);
                level.chunks.write(at, chunk(at, "full")).unwrap();
            }
        }
        for at in [Vector2::new(0, 0), Vector2::new(2, 2)] {
            let section = ChunkEntityData {
                position: at,
                data_version: OLD_VERSION,
                entities: vec![
                    cow([at.x, 7, at.z, 9], [f64::from(at.x) * 16.0 + 8.0, 70.0, 8.0]),
                ],
            };
            let bytes = section.to_bytes().unwrap();
            level.entities.store_mut().write(at, bytes).unwrap();
        }
        level.save().unwrap();
        (dir, server)
    }

    fn stored_chunk(server: &mut Server, at: Vector2<i32>) -> Nbt {
        let level = server.level_mut(Dimension::Overworld).unwrap();
        Nbt::from_bytes(&level.chunks.read(at).unwrap().unwrap()).unwrap()
    }

    fn stored_entities(server: &mut Server, at: Vector2<i32>) -> ChunkEntityData {
        let level = server.level_mut(Dimension::Overworld).unwrap();
        let bytes = level.entities.store_mut().read(at).unwrap().unwrap();
        ChunkEntityData::from_bytes(at, &bytes).unwrap()
    }

    #[test]
    fn rewrites_safe_chunks_and_defers_the_rest() {
        let (_dir, mut server) = world(ServerConfig::default());
        let report = upgrade_world(&mut server, &UpgradeRegistry::with_builtin())
            .unwrap()
            .unwrap();

        let overworld = report.level(Dimension::Overworld).unwrap();
        assert_eq!(overworld.chunks_rewritten, 9);
        assert_eq!(overworld.deferred_chunks.len(), 16);
        assert_eq!(overworld.entity_sections_rewritten, 1);
        assert_eq!(overworld.deferred_entity_sections, vec![Vector2::new(2, 2)]);
        assert_eq!(overworld.misplaced_entities, 0);
        // Dimensions without a folder are skipped
        assert!(report.level(Dimension::Nether).is_none());
        assert_eq!(report.sets, vec!["data_version"]);

        let centre = stored_chunk(&mut server, Vector2::new(1, -1));
        assert_eq!(centre.get_int("DataVersion"), Some(WORLD_DATA_VERSION));
        assert_eq!(centre.get_string("Status").unwrap(), "minecraft:full");
        assert_eq!(centre.get_int("xPos"), Some(1));
        let edge = stored_chunk(&mut server, Vector2::new(2, 0));
        assert_eq!(edge.get_int("DataVersion"), Some(OLD_VERSION));

        let entities = stored_entities(&mut server, Vector2::new(0, 0));
        assert_eq!(entities.data_version, WORLD_DATA_VERSION);
        assert_eq!(entities.entities[0].get_string("id").unwrap(), "minecraft:cow");
        assert_eq!(entities.entities[0].get_int_array("UUID"), Some(&[0, 7, 0, 9][..]));
        assert_eq!(
            stored_entities(&mut server, Vector2::new(2, 2)).data_version,
            OLD_VERSION
        );
    }

    #[test]
    fn caches_return_to_gameplay_capacity() {
        let config = ServerConfig::default();
        let gameplay = config.advanced.region_cache.gameplay_capacity;
        let (_dir, mut server) = world(config);
        upgrade_world(&mut server, &UpgradeRegistry::with_builtin()).unwrap();

        let level = server.level_mut(Dimension::Overworld).unwrap();
        assert_eq!(level.chunks.cache().capacity(), gameplay);
        assert_eq!(level.entities.store().cache().capacity(), gameplay);
        assert_eq!(server.pending_tasks(), 0);
    }

    #[test]
    fn small_pending_limit_still_saves_everything() {
        let mut config = ServerConfig::default();
        config.advanced.upgrade.max_pending_chunks = 1;
        let (_dir, mut server) = world(config);
        let report = upgrade_world(&mut server, &UpgradeRegistry::with_builtin())
            .unwrap()
            .unwrap();
        assert_eq!(report.chunks_rewritten(), 9);
        assert_eq!(server.pending_tasks(), 0);
    }

    #[test]
    fn disabled_or_unknown_versions_skip_the_pass() {
        let mut config = ServerConfig::default();
        config.advanced.upgrade.enabled = false;
        let (_dir, mut server) = world(config);
        assert!(upgrade_world(&mut server, &UpgradeRegistry::with_builtin())
            .unwrap()
            .is_none());

        let mut config = ServerConfig::default();
        config.advanced.upgrade.versions = vec!["1.21.5".to_string()];
        let (_dir, mut server) = world(config);
        assert!(upgrade_world(&mut server, &UpgradeRegistry::with_builtin())
            .unwrap()
            .is_none());
        let untouched = stored_chunk(&mut server, Vector2::new(0, 0));
        assert_eq!(untouched.get_int("DataVersion"), Some(OLD_VERSION));
    }

    #[test]
    fn hook_upgrades_during_init_and_survives_restart() {
        let (dir, mut server) = world(ServerConfig::default());
        install(&mut server, UpgradeRegistry::with_builtin());
        server.init().unwrap();
        server.prepare_levels().unwrap();
        server.shutdown().unwrap();

        let mut restarted = Server::new(ServerConfig::default(), dir.path());
        let chunk = stored_chunk(&mut restarted, Vector2::new(0, 0));
        assert_eq!(chunk.get_int("DataVersion"), Some(WORLD_DATA_VERSION));
        assert_eq!(
            stored_entities(&mut restarted, Vector2::new(0, 0)).data_version,
            WORLD_DATA_VERSION
        );
    }

    #[test]
    fn misplaced_entity_section_aborts_the_pass() {
        let (_dir, mut server) = world(ServerConfig::default());
        // Entity sections are checked against where they are stored
        let level = server.level_mut(Dimension::Overworld).unwrap();
        let mut misplaced = NbtCompound::new();
        misplaced.put("Position", NbtTag::IntArray(vec![5, 5].into_boxed_slice()));
        level
            .entities
            .store_mut()
            .write(Vector2::new(1, 1), Nbt::from(misplaced).write().unwrap())
            .unwrap();
        level.save().unwrap();

        assert!(upgrade_world(&mut server, &UpgradeRegistry::with_builtin()).is_err());
        let level = server.level_mut(Dimension::Overworld).unwrap();
        assert_eq!(
            level.chunks.cache().capacity(),
            ServerConfig::default().advanced.region_cache.gameplay_capacity
        );
    }
}
