use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Capacities of the region file handle caches.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct RegionCacheConfig {
    /// Open handles per store while the server plays normally.
    pub gameplay_capacity: NonZeroUsize,
    /// Open handles per store during a bulk upgrade.
    pub upgrade_capacity: NonZeroUsize,
}

impl Default for RegionCacheConfig {
    fn default() -> Self {
        Self {
            gameplay_capacity: NonZeroUsize::new(256).unwrap_or(NonZeroUsize::MIN),
            upgrade_capacity: NonZeroUsize::new(8).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Largest accepted [`UpgradeConfig::writable_radius`].
pub const MAX_WRITABLE_RADIUS: u32 = 32;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct UpgradeConfig {
    pub enabled: bool,
    /// Names of the upgrade sets to apply, in order.
    pub versions: Vec<String>,
    /// Pending chunk saves that force a drain of the task queue.
    pub max_pending_chunks: usize,
    /// How many chunk rings around a chunk may be opened for writing.
    pub writable_radius: u32,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            versions: vec!["data_version".to_string()],
            max_pending_chunks: 3000,
            writable_radius: 1,
        }
    }
}
