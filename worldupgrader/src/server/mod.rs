use std::path::{Path, PathBuf};

use log::{debug, error, info};
use thiserror::Error;
use worldupgrader_config::ServerConfig;
use worldupgrader_world::{
    entity::EntityError,
    level::{Dimension, Level},
    region::RegionFileOptions,
    storage::StorageError,
};

pub mod executor;
pub mod hook;

use executor::{Task, TaskQueue, TaskSender};
use hook::{HookFailure, HookHost, HookPoint, Hooks};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error(transparent)]
    Hook(#[from] HookFailure),
    #[error("No level is loaded for {0}")]
    MissingLevel(Dimension),
}

pub type ServerTask = Task<LevelRegistry, ServerError>;

/// Every dimension the server has loaded.
pub struct LevelRegistry {
    levels: Vec<Level>,
}

impl LevelRegistry {
    pub fn get(&self, dimension: Dimension) -> Option<&Level> {
        self.levels.iter().find(|level| level.dimension == dimension)
    }

    pub fn get_mut(&mut self, dimension: Dimension) -> Option<&mut Level> {
        self.levels
            .iter_mut()
            .find(|level| level.dimension == dimension)
    }

    /// Like [`Self::get_mut`], for tasks that require the level to exist.
    pub fn require(&mut self, dimension: Dimension) -> Result<&mut Level, ServerError> {
        self.get_mut(dimension)
            .ok_or(ServerError::MissingLevel(dimension))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Level> {
        self.levels.iter_mut()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Initialized,
    Ready,
}

/// Owns the levels, the logic-thread task queue and the bring-up hooks.
pub struct Server {
    config: ServerConfig,
    world_root: PathBuf,
    pub levels: LevelRegistry,
    tasks: TaskQueue<LevelRegistry, ServerError>,
    hooks: Hooks<Server>,
    state: ServerState,
}

impl Server {
    /// Opens one level per dimension below the configured world folder. Region
    /// files are only opened once something touches them.
    #[must_use]
    pub fn new(config: ServerConfig, exec_dir: &Path) -> Self {
        let world_root = config.basic.get_world_path(exec_dir);
        let capacity = config.advanced.region_cache.gameplay_capacity;
        let options = RegionFileOptions::from(&config.advanced.chunk.compression);
        let levels = Dimension::ALL
            .into_iter()
            .map(|dimension| Level::open(&world_root, dimension, capacity, options))
            .collect();
        debug!("Loaded levels from {:?}", world_root);

        Self {
            config,
            world_root,
            levels: LevelRegistry { levels },
            tasks: TaskQueue::new(),
            hooks: Hooks::new(),
            state: ServerState::Created,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn world_root(&self) -> &Path {
        &self.world_root
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn level_mut(&mut self, dimension: Dimension) -> Result<&mut Level, ServerError> {
        self.levels.require(dimension)
    }

    pub fn register_hook(&mut self, point: HookPoint, hook: hook::Hook<Server>) {
        self.hooks.register(point, hook);
    }

    /// Finishes core initialization and runs the [`HookPoint::AfterServerInit`]
    /// hooks. Calling it again does nothing.
    pub fn init(&mut self) -> Result<(), ServerError> {
        if self.state != ServerState::Created {
            return Ok(());
        }
        self.state = ServerState::Initialized;
        let ran = hook::fire(self, HookPoint::AfterServerInit)?;
        debug!("Ran {} hooks after server init", ran);
        Ok(())
    }

    pub fn prepare_levels(&mut self) -> Result<(), ServerError> {
        for level in self.levels.iter_mut() {
            debug!("Preparing {}", level.dimension);
        }
        hook::fire(self, HookPoint::AfterLevelPreparation)?;
        self.state = ServerState::Ready;
        info!("Done preparing levels, server is ready");
        Ok(())
    }

    pub fn enqueue(&self, task: ServerTask) {
        self.tasks.enqueue(task);
    }

    pub fn task_sender(&self) -> TaskSender<LevelRegistry, ServerError> {
        self.tasks.sender()
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.pending()
    }

    /// Runs queued tasks until none are left. Only the owning thread can call this.
    pub fn run_all_pending(&mut self) -> Result<usize, ServerError> {
        self.tasks.run_all_pending(&mut self.levels)
    }

    /// Commits buffered writes of every level.
    pub fn save(&mut self) -> Result<(), ServerError> {
        for level in self.levels.iter_mut() {
            level.save()?;
        }
        Ok(())
    }

    /// Drains the queue, then closes every level. All levels are closed even
    /// when one fails; the first error is returned.
    pub fn shutdown(mut self) -> Result<(), ServerError> {
        info!("Stopping server");
        let drained = self.run_all_pending();
        let mut result = drained.map(|_| ());
        for level in self.levels.iter_mut() {
            if let Err(err) = level.close() {
                error!("Failed to close {}: {}", level.dimension, err);
                if result.is_ok() {
                    result = Err(err.into());
                }
            }
        }
        result
    }
}

impl HookHost for Server {
    fn hooks(&mut self) -> &mut Hooks<Self> {
        &mut self.hooks
    }
}
