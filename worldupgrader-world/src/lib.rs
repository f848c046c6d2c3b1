//! Persisted world data: Anvil region files behind bounded handle caches, the chunk
//! and entity stores built on them, and the generation state that decides which
//! chunks are safe to rewrite.

pub mod entity;
pub mod generation;
pub mod level;
pub mod region;
pub mod storage;

/// Data version written into every upgraded payload (1.21.5).
pub const WORLD_DATA_VERSION: i32 = 4325;
