use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use log::{debug, error};
use lru::LruCache;

use super::{RegionCoordinate, RegionError, RegionFile, RegionFileOptions};

/// Bounded set of open region files for one folder.
///
/// The cache is the only place region files are opened from, so it holds at most
/// one handle per region. When an insert would exceed the capacity, the least
/// recently used handle is closed (flushing its writes) before the new one is
/// stored.
pub struct RegionFileCache {
    folder: PathBuf,
    options: RegionFileOptions,
    handles: LruCache<RegionCoordinate, RegionFile>,
    opened: u64,
}

impl RegionFileCache {
    pub fn new(folder: impl Into<PathBuf>, capacity: NonZeroUsize, options: RegionFileOptions) -> Self {
        Self {
            folder: folder.into(),
            options,
            handles: LruCache::new(capacity),
            opened: 0,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.handles.cap()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// How many region files this cache has opened over its lifetime.
    pub fn opened(&self) -> u64 {
        self.opened
    }

    pub fn is_cached(&self, coordinate: &RegionCoordinate) -> bool {
        self.handles.contains(coordinate)
    }

    /// Cached regions, most recently used first.
    pub fn cached(&self) -> Vec<RegionCoordinate> {
        self.handles.iter().map(|(coordinate, _)| *coordinate).collect()
    }

    /// Returns the handle for `coordinate` and marks it most recently used,
    /// opening the file if it is not cached yet.
    pub fn acquire(&mut self, coordinate: RegionCoordinate) -> Result<&mut RegionFile, RegionError> {
        if !self.handles.contains(&coordinate) && self.handles.len() >= self.handles.cap().get() {
            self.evict_lru()?;
        }

        let folder = &self.folder;
        let options = self.options;
        let opened = &mut self.opened;
        self.handles.try_get_or_insert_mut(coordinate, || {
            let handle = RegionFile::open(folder, coordinate, options)?;
            *opened += 1;
            debug!("Caching region {} of {:?}", coordinate, folder);
            Ok(handle)
        })
    }

    fn evict_lru(&mut self) -> Result<(), RegionError> {
        let Some(coordinate) = self.handles.peek_lru().map(|(coordinate, _)| *coordinate) else {
            return Ok(());
        };
        self.close_cached(coordinate)
    }

    /// Flushes the handle of `coordinate` while it is still cached, then removes and
    /// closes it. A handle whose flush fails stays cached with its writes.
    fn close_cached(&mut self, coordinate: RegionCoordinate) -> Result<(), RegionError> {
        if let Some(handle) = self.handles.peek_mut(&coordinate) {
            handle.flush()?;
        }
        if let Some(handle) = self.handles.pop(&coordinate) {
            debug!("Closing region {} of {:?}", coordinate, self.folder);
            handle.close()?;
        }
        Ok(())
    }

    /// Changes the capacity, closing least recently used handles that no longer fit.
    pub fn set_capacity(&mut self, capacity: NonZeroUsize) -> Result<(), RegionError> {
        while self.handles.len() > capacity.get() {
            self.evict_lru()?;
        }
        self.handles.resize(capacity);
        Ok(())
    }

    /// Flushes every cached handle without closing it.
    pub fn flush_all(&mut self) -> Result<(), RegionError> {
        for (_, handle) in self.handles.iter_mut() {
            handle.flush()?;
        }
        Ok(())
    }

    /// Closes every cached handle, oldest first. Handles that fail to flush stay
    /// cached; the first failure is returned.
    pub fn close_all(&mut self) -> Result<(), RegionError> {
        let mut result = Ok(());
        let oldest_first: Vec<_> = self
            .handles
            .iter()
            .rev()
            .map(|(coordinate, _)| *coordinate)
            .collect();
        for coordinate in oldest_first {
            if let Err(err) = self.close_cached(coordinate) {
                error!("Keeping region {} of {:?} open: {}", coordinate, self.folder, err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}

impl Drop for RegionFileCache {
    fn drop(&mut self) {
        if let Err(err) = self.close_all() {
            error!("Failed to close region files of {:?}: {}", self.folder, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use bytes::Bytes;
    use temp_dir::TempDir;
    use worldupgrader_util::math::vector2::Vector2;

    use super::RegionFileCache;
    use crate::region::RegionCoordinate;

    fn cache(dir: &TempDir, capacity: usize) -> RegionFileCache {
        RegionFileCache::new(
            dir.path(),
            NonZeroUsize::new(capacity).unwrap(),
            Default::default(),
        )
    }

    const A: RegionCoordinate = RegionCoordinate::new(0, 0);
    const B: RegionCoordinate = RegionCoordinate::new(1, 0);
    const C: RegionCoordinate = RegionCoordinate::new(0, -1);

    #[test]
    fn least_recently_used_is_evicted() {
        let _ = env_logger::try_init();
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir, 2);

        cache.acquire(A).unwrap();
        cache.acquire(B).unwrap();
        cache.acquire(C).unwrap();
        assert_eq!(cache.cached(), vec![C, B]);
        assert!(!cache.is_cached(&A));

        cache.acquire(A).unwrap();
        assert_eq!(cache.cached(), vec![A, C]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.opened(), 4);
    }

    #[test]
    fn reacquire_promotes_without_reopening() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir, 2);

        cache.acquire(A).unwrap();
        cache.acquire(B).unwrap();
        cache.acquire(A).unwrap();
        assert_eq!(cache.opened(), 2);
        assert_eq!(cache.cached(), vec![A, B]);

        // B is now the oldest
        cache.acquire(C).unwrap();
        assert_eq!(cache.cached(), vec![C, A]);
    }

    #[test]
    fn never_exceeds_capacity() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir, 3);
        for x in -5..5 {
            for z in -2..2 {
                cache.acquire(RegionCoordinate::new(x, z)).unwrap();
                assert!(cache.len() <= 3);
            }
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn eviction_flushes_pending_writes() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir, 1);
        let chunk = Vector2::new(1, 1);

        cache
            .acquire(A)
            .unwrap()
            .write(&chunk, Bytes::from_static(b"evicted"))
            .unwrap();
        cache.acquire(B).unwrap();
        assert!(dir.path().join("r.0.0.mca").exists());

        assert_eq!(
            cache.acquire(A).unwrap().read(&chunk).unwrap().unwrap(),
            Bytes::from_static(b"evicted")
        );
    }

    #[test]
    fn close_all_leaves_nothing_open() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir, 4);
        for (i, region) in [A, B, C].into_iter().enumerate() {
            let chunk = Vector2::new(region.x * 32, region.z * 32 + i as i32);
            cache
                .acquire(region)
                .unwrap()
                .write(&chunk, Bytes::from(vec![i as u8; 10]))
                .unwrap();
        }
        cache.close_all().unwrap();
        assert!(cache.is_empty());

        for (i, region) in [A, B, C].into_iter().enumerate() {
            let chunk = Vector2::new(region.x * 32, region.z * 32 + i as i32);
            let payload = cache.acquire(region).unwrap().read(&chunk).unwrap();
            assert_eq!(payload.unwrap(), Bytes::from(vec![i as u8; 10]));
        }
    }

    #[test]
    fn shrinking_capacity_closes_oldest() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir, 3);
        cache.acquire(A).unwrap();
        cache.acquire(B).unwrap();
        cache.acquire(C).unwrap();

        cache.set_capacity(NonZeroUsize::new(1).unwrap()).unwrap();
        assert_eq!(cache.cached(), vec![C]);
        assert_eq!(cache.capacity().get(), 1);
    }

    #[test]
    fn failed_eviction_keeps_the_dirty_handle() {
        let _ = env_logger::try_init();
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir, 1);
        let chunk = Vector2::new(1, 1);

        cache
            .acquire(A)
            .unwrap()
            .write(&chunk, Bytes::from_static(b"pending"))
            .unwrap();
        // A directory where the payload's external file would go blocks the flush
        let blocker = dir.path().join("c.1.1.mcc");
        std::fs::create_dir(&blocker).unwrap();

        assert!(cache.acquire(B).is_err());
        assert_eq!(cache.cached(), vec![A]);
        assert!(cache.close_all().is_err());
        assert_eq!(cache.cached(), vec![A]);

        std::fs::remove_dir(&blocker).unwrap();
        cache.acquire(B).unwrap();
        assert_eq!(cache.cached(), vec![B]);
        assert_eq!(
            cache.acquire(A).unwrap().read(&chunk).unwrap().unwrap(),
            Bytes::from_static(b"pending")
        );
    }

    #[test]
    fn unreadable_region_propagates_error() {
        let dir = TempDir::new().unwrap();
        // A directory where the region file should be
        std::fs::create_dir(dir.path().join("r.0.0.mca")).unwrap();
        let mut cache = cache(&dir, 2);
        assert!(cache.acquire(A).is_err());
        assert!(cache.is_empty());
    }
}
