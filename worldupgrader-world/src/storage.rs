use std::{
    fmt, fs, io,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use log::{trace, warn};
use thiserror::Error;
use worldupgrader_util::math::{boundingbox::BlockBox, vector2::Vector2};

use crate::region::{RegionCoordinate, RegionError, RegionFileCache, RegionFileOptions};

/// What a store holds. Categories never share a handle cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageCategory {
    Chunk,
    Entity,
}

impl StorageCategory {
    /// Folder of this category inside a dimension folder.
    pub const fn folder_name(self) -> &'static str {
        match self {
            StorageCategory::Chunk => "region",
            StorageCategory::Entity => "entities",
        }
    }
}

impl fmt::Display for StorageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageCategory::Chunk => f.write_str("chunk"),
            StorageCategory::Entity => f.write_str("entity"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{category} storage failed at chunk {coordinate}: {source}")]
    Chunk {
        category: StorageCategory,
        coordinate: Vector2<i32>,
        #[source]
        source: RegionError,
    },
    #[error("{category} storage failed in region {region}: {source}")]
    Region {
        category: StorageCategory,
        region: RegionCoordinate,
        #[source]
        source: RegionError,
    },
    #[error("{category} storage failed to list {path:?}: {source}")]
    Folder {
        category: StorageCategory,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{category} storage failed to close its region files: {source}")]
    Close {
        category: StorageCategory,
        #[source]
        source: RegionError,
    },
}

/// Result of a guarded write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The chunk lies outside the writable area; storage was left untouched.
    Deferred,
}

/// Chunk-keyed byte storage over the region files of one folder.
pub struct RegionBackedStore {
    category: StorageCategory,
    cache: RegionFileCache,
}

impl RegionBackedStore {
    pub fn new(
        folder: impl Into<PathBuf>,
        category: StorageCategory,
        capacity: NonZeroUsize,
        options: RegionFileOptions,
    ) -> Self {
        Self {
            category,
            cache: RegionFileCache::new(folder, capacity, options),
        }
    }

    pub fn category(&self) -> StorageCategory {
        self.category
    }

    pub fn folder(&self) -> &Path {
        self.cache.folder()
    }

    pub fn cache(&self) -> &RegionFileCache {
        &self.cache
    }

    pub fn set_cache_capacity(&mut self, capacity: NonZeroUsize) -> Result<(), StorageError> {
        self.cache
            .set_capacity(capacity)
            .map_err(|source| self.close_error(source))
    }

    fn chunk_error(&self, coordinate: Vector2<i32>) -> impl FnOnce(RegionError) -> StorageError {
        let category = self.category;
        move |source| StorageError::Chunk {
            category,
            coordinate,
            source,
        }
    }

    fn close_error(&self, source: RegionError) -> StorageError {
        StorageError::Close {
            category: self.category,
            source,
        }
    }

    /// Whether the region file of `region` exists on disk or is already open.
    fn region_exists(&self, region: &RegionCoordinate) -> bool {
        self.cache.is_cached(region) || self.folder().join(region.file_name()).is_file()
    }

    /// Payload of `coordinate`, or `None` if it was never written.
    pub fn read(&mut self, coordinate: Vector2<i32>) -> Result<Option<Bytes>, StorageError> {
        let region = RegionCoordinate::from_chunk(coordinate);
        if !self.region_exists(&region) {
            return Ok(None);
        }
        let on_error = self.chunk_error(coordinate);
        self.cache
            .acquire(region)
            .and_then(|handle| handle.read(&coordinate))
            .map_err(on_error)
    }

    pub fn write(&mut self, coordinate: Vector2<i32>, bytes: Bytes) -> Result<(), StorageError> {
        trace!(
            "Writing {} bytes of {} data at {}",
            bytes.len(),
            self.category,
            coordinate
        );
        let on_error = self.chunk_error(coordinate);
        self.cache
            .acquire(RegionCoordinate::from_chunk(coordinate))
            .and_then(|handle| handle.write(&coordinate, bytes))
            .map_err(on_error)
    }

    /// Writes only when the whole chunk lies inside `area`.
    pub fn write_within(
        &mut self,
        coordinate: Vector2<i32>,
        bytes: Bytes,
        area: Option<&BlockBox>,
    ) -> Result<WriteOutcome, StorageError> {
        match area {
            Some(area) if area.contains_chunk(coordinate) => {
                self.write(coordinate, bytes)?;
                Ok(WriteOutcome::Written)
            }
            _ => {
                warn!(
                    "Refusing to write {} data at {}: outside the writable area",
                    self.category, coordinate
                );
                Ok(WriteOutcome::Deferred)
            }
        }
    }

    /// Drops the payload of `coordinate`. Returns whether one was present.
    pub fn remove(&mut self, coordinate: Vector2<i32>) -> Result<bool, StorageError> {
        let region = RegionCoordinate::from_chunk(coordinate);
        if !self.region_exists(&region) {
            return Ok(false);
        }
        let on_error = self.chunk_error(coordinate);
        self.cache
            .acquire(region)
            .map(|handle| handle.remove(&coordinate))
            .map_err(on_error)
    }

    pub fn has_chunk(&mut self, coordinate: Vector2<i32>) -> Result<bool, StorageError> {
        let region = RegionCoordinate::from_chunk(coordinate);
        if !self.region_exists(&region) {
            return Ok(false);
        }
        let on_error = self.chunk_error(coordinate);
        self.cache
            .acquire(region)
            .map(|handle| handle.contains(&coordinate))
            .map_err(on_error)
    }

    /// Region files present in the folder, sorted by coordinate.
    pub fn regions(&self) -> Result<Vec<RegionCoordinate>, StorageError> {
        let folder = self.folder();
        let entries = match fs::read_dir(folder) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::Folder {
                    category: self.category,
                    path: folder.to_path_buf(),
                    source,
                })
            }
        };

        let mut regions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Folder {
                category: self.category,
                path: folder.to_path_buf(),
                source,
            })?;
            if let Some(region) = entry
                .file_name()
                .to_str()
                .and_then(RegionCoordinate::parse_file_name)
            {
                regions.push(region);
            }
        }
        regions.sort();
        Ok(regions)
    }

    /// Chunks of `region` that hold a payload.
    pub fn chunks_in_region(
        &mut self,
        region: RegionCoordinate,
    ) -> Result<Vec<Vector2<i32>>, StorageError> {
        if !self.region_exists(&region) {
            return Ok(Vec::new());
        }
        let category = self.category;
        self.cache
            .acquire(region)
            .map(|handle| handle.chunks())
            .map_err(|source| StorageError::Region {
                category,
                region,
                source,
            })
    }

    /// Commits buffered writes of every open region file.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.cache
            .flush_all()
            .map_err(|source| self.close_error(source))
    }

    /// Closes every open region file. Called on teardown.
    pub fn close_all(&mut self) -> Result<(), StorageError> {
        self.cache
            .close_all()
            .map_err(|source| self.close_error(source))
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use bytes::Bytes;
    use temp_dir::TempDir;
    use worldupgrader_util::math::{boundingbox::BlockBox, vector2::Vector2};

    use super::{RegionBackedStore, StorageCategory, StorageError, WriteOutcome};
    use crate::region::RegionCoordinate;

    fn store(dir: &TempDir, capacity: usize) -> RegionBackedStore {
        RegionBackedStore::new(
            dir.path().join("region"),
            StorageCategory::Chunk,
            NonZeroUsize::new(capacity).unwrap(),
            Default::default(),
        )
    }

    #[test]
    fn never_written_is_absent() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir, 2);
        assert_eq!(store.read(Vector2::new(10, -10)).unwrap(), None);
        assert!(!store.has_chunk(Vector2::new(10, -10)).unwrap());
        assert!(store.regions().unwrap().is_empty());
        // Absent regions are not opened
        assert_eq!(store.cache().opened(), 0);
    }

    #[test]
    fn write_then_read_returns_written_bytes() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir, 2);
        let chunk = Vector2::new(-40, 70);

        store.write(chunk, Bytes::from_static(b"old")).unwrap();
        store.write(chunk, Bytes::from_static(b"new")).unwrap();
        assert_eq!(store.read(chunk).unwrap().unwrap(), Bytes::from_static(b"new"));

        store.flush().unwrap();
        assert_eq!(store.read(chunk).unwrap().unwrap(), Bytes::from_static(b"new"));
    }

    #[test]
    fn close_all_then_reopen_keeps_everything() {
        let _ = env_logger::try_init();
        let dir = TempDir::new().unwrap();
        // Capacity 1 forces an eviction on every region switch
        let mut store = store(&dir, 1);
        let chunks: Vec<_> = (0..6).map(|i| Vector2::new(i * 20 - 50, i * 33)).collect();
        for (i, chunk) in chunks.iter().enumerate() {
            store.write(*chunk, Bytes::from(vec![i as u8; 64])).unwrap();
        }
        store.close_all().unwrap();
        assert!(store.cache().is_empty());

        let mut reopened = self::store(&dir, 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(
                reopened.read(*chunk).unwrap().unwrap(),
                Bytes::from(vec![i as u8; 64])
            );
        }
        let regions = reopened.regions().unwrap();
        assert_eq!(regions.len(), 6);
        assert!(regions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn write_outside_area_is_rejected_untouched() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir, 2);
        let inside = Vector2::new(0, 0);
        let outside = Vector2::new(5, 0);
        let area = BlockBox::from_chunk_columns(Vector2::new(-1, -1), Vector2::new(1, 1), -63, 319);

        store.write(outside, Bytes::from_static(b"existing")).unwrap();
        assert_eq!(
            store
                .write_within(outside, Bytes::from_static(b"upgraded"), Some(&area))
                .unwrap(),
            WriteOutcome::Deferred
        );
        assert_eq!(
            store
                .write_within(inside, Bytes::from_static(b"upgraded"), None)
                .unwrap(),
            WriteOutcome::Deferred
        );
        assert_eq!(
            store
                .write_within(inside, Bytes::from_static(b"upgraded"), Some(&area))
                .unwrap(),
            WriteOutcome::Written
        );

        assert_eq!(
            store.read(outside).unwrap().unwrap(),
            Bytes::from_static(b"existing")
        );
        assert_eq!(
            store.read(inside).unwrap().unwrap(),
            Bytes::from_static(b"upgraded")
        );
    }

    #[test]
    fn chunks_in_region_lists_present_chunks() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir, 2);
        store.write(Vector2::new(33, 1), Bytes::from_static(b"a")).unwrap();
        store.write(Vector2::new(40, 2), Bytes::from_static(b"b")).unwrap();
        store.write(Vector2::new(0, 0), Bytes::from_static(b"c")).unwrap();
        assert!(store.remove(Vector2::new(40, 2)).unwrap());

        assert_eq!(
            store.chunks_in_region(RegionCoordinate::new(1, 0)).unwrap(),
            vec![Vector2::new(33, 1)]
        );
    }

    #[test]
    fn errors_carry_category_and_coordinate() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("region/r.0.0.mca")).unwrap();
        let mut store = store(&dir, 2);

        let err = store.write(Vector2::new(1, 2), Bytes::new()).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Chunk {
                category: StorageCategory::Chunk,
                coordinate: Vector2 { x: 1, z: 2 },
                ..
            }
        ));
        assert!(err.to_string().starts_with("chunk storage failed at chunk [1, 2]"));
    }
}
