use std::{fmt, path::PathBuf};

use thiserror::Error;
use worldupgrader_util::math::vector2::Vector2;

mod cache;
mod compression;
mod file;

pub use cache::RegionFileCache;
pub use compression::{Compression, CompressionError};
pub use file::{RegionFile, RegionFileOptions};

/// The side size of a region in chunks (one region is 32x32 chunks)
pub const REGION_SIZE: usize = 32;

/// The number of bits that identify two chunks in the same region
pub const SUBREGION_BITS: u8 = 5;

pub const SUBREGION_AND: i32 = (1 << SUBREGION_BITS) - 1;

/// The number of chunks in a region
pub const CHUNK_COUNT: usize = REGION_SIZE * REGION_SIZE;

/// The number of bytes in a sector (4 KiB)
pub const SECTOR_BYTES: usize = 4096;

/// Location table plus timestamp table
pub const HEADER_SECTORS: u32 = 2;

/// Set on the compression byte when the payload lives in a `.mcc` file next to the region.
pub const EXTERNAL_FLAG: u8 = 0x80;

#[derive(Error, Debug)]
pub enum RegionError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Region file {path:?} has a truncated header ({len} bytes)")]
    InvalidHeader { path: PathBuf, len: u64 },
    #[error("Corrupt payload for chunk {index} in {path:?}: {reason}")]
    CorruptPayload {
        path: PathBuf,
        index: usize,
        reason: String,
    },
    #[error("Payload of {0} bytes is too large for a region file")]
    PayloadTooLarge(usize),
    #[error("Compression error: {0}")]
    Compression(#[from] CompressionError),
}

/// Position of a region file, one per 32x32 block of chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionCoordinate {
    pub x: i32,
    pub z: i32,
}

impl RegionCoordinate {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub const fn from_chunk(chunk: Vector2<i32>) -> Self {
        // Divide by 32 for the region coordinates
        Self::new(chunk.x >> SUBREGION_BITS, chunk.z >> SUBREGION_BITS)
    }

    /// Index of `chunk` in the location table of its region.
    pub const fn chunk_index(chunk: &Vector2<i32>) -> usize {
        let local_x = chunk.x & SUBREGION_AND;
        let local_z = chunk.z & SUBREGION_AND;
        ((local_z << SUBREGION_BITS) + local_x) as usize
    }

    /// Inverse of [`RegionCoordinate::chunk_index`] for this region.
    pub const fn chunk_at(&self, index: usize) -> Vector2<i32> {
        let index = index as i32;
        Vector2::new(
            (self.x << SUBREGION_BITS) + (index & SUBREGION_AND),
            (self.z << SUBREGION_BITS) + (index >> SUBREGION_BITS),
        )
    }

    pub fn file_name(&self) -> String {
        format!("r.{}.{}.mca", self.x, self.z)
    }

    /// Parses `r.<x>.<z>.mca`; anything else is not a region file.
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let coords = name.strip_prefix("r.")?.strip_suffix(".mca")?;
        let (x, z) = coords.split_once('.')?;
        Some(Self::new(x.parse().ok()?, z.parse().ok()?))
    }
}

impl fmt::Display for RegionCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r.{}.{}", self.x, self.z)
    }
}
