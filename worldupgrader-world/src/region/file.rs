use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::{debug, error, trace, warn};
use worldupgrader_config::chunk::ChunkCompression;
use worldupgrader_util::math::vector2::Vector2;

use super::{
    Compression, RegionCoordinate, RegionError, CHUNK_COUNT, EXTERNAL_FLAG, HEADER_SECTORS,
    SECTOR_BYTES,
};

/// Largest sector count a location entry can describe.
const MAX_SECTORS: usize = u8::MAX as usize;

/// How rewritten payloads are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionFileOptions {
    pub compression: Compression,
    pub level: u32,
}

impl Default for RegionFileOptions {
    fn default() -> Self {
        Self {
            compression: Compression::ZLib,
            level: 6,
        }
    }
}

impl From<&ChunkCompression> for RegionFileOptions {
    fn from(value: &ChunkCompression) -> Self {
        Self {
            compression: value.algorithm.into(),
            level: value.level,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    offset: u32,
    sectors: u32,
    timestamp: u32,
}

enum PendingWrite {
    Store {
        raw: Bytes,
        encoded: Vec<u8>,
        compression: Compression,
        timestamp: u32,
    },
    Remove,
}

/// An open Anvil region file.
///
/// Writes are buffered and only reach the disk on [`RegionFile::flush`] or
/// [`RegionFile::close`]. A handle that is dropped with buffered writes flushes them
/// and logs any failure.
pub struct RegionFile {
    coordinate: RegionCoordinate,
    folder: PathBuf,
    path: PathBuf,
    file: Option<File>,
    slots: Box<[Option<Slot>]>,
    pending: BTreeMap<usize, PendingWrite>,
    options: RegionFileOptions,
}

impl RegionFile {
    /// Opens the region file of `coordinate` inside `folder`.
    ///
    /// A missing file is not an error: it is created by the first flush that has
    /// something to write.
    pub fn open(
        folder: &Path,
        coordinate: RegionCoordinate,
        options: RegionFileOptions,
    ) -> Result<Self, RegionError> {
        let path = folder.join(coordinate.file_name());
        let mut region = Self {
            coordinate,
            folder: folder.to_path_buf(),
            path,
            file: None,
            slots: vec![None; CHUNK_COUNT].into_boxed_slice(),
            pending: BTreeMap::new(),
            options,
        };

        let mut file = match OpenOptions::new().read(true).write(true).open(&region.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("Region file {:?} does not exist yet", region.path);
                return Ok(region);
            }
            Err(err) => return Err(err.into()),
        };

        let len = file.metadata()?.len();
        if len > 0 {
            if len < (HEADER_SECTORS as usize * SECTOR_BYTES) as u64 {
                return Err(RegionError::InvalidHeader {
                    path: region.path.clone(),
                    len,
                });
            }
            region.read_header(&mut file, len)?;
        }
        debug!("Opened region file {:?}", region.path);
        region.file = Some(file);
        Ok(region)
    }

    fn read_header(&mut self, file: &mut File, len: u64) -> Result<(), RegionError> {
        let mut header = vec![0; HEADER_SECTORS as usize * SECTOR_BYTES];
        file.read_exact(&mut header)?;
        let (mut location_bytes, mut timestamp_bytes) = header.split_at(SECTOR_BYTES);
        let file_sectors = len.div_ceil(SECTOR_BYTES as u64);

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let location = location_bytes.get_u32();
            let timestamp = timestamp_bytes.get_u32();

            let sectors = location & 0xFF;
            let offset = location >> 8;
            // If the sector offset or count is 0, the chunk is not present
            if offset == 0 || sectors == 0 {
                continue;
            }
            if offset < HEADER_SECTORS || u64::from(offset + sectors) > file_sectors {
                warn!(
                    "Ignoring chunk {} of {:?}: sectors {}..{} lie outside the file",
                    index,
                    self.path,
                    offset,
                    offset + sectors
                );
                continue;
            }
            *slot = Some(Slot {
                offset,
                sectors,
                timestamp,
            });
        }
        Ok(())
    }

    pub fn coordinate(&self) -> RegionCoordinate {
        self.coordinate
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether buffered writes are waiting for a flush.
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn contains(&self, chunk: &Vector2<i32>) -> bool {
        let index = RegionCoordinate::chunk_index(chunk);
        match self.pending.get(&index) {
            Some(PendingWrite::Store { .. }) => true,
            Some(PendingWrite::Remove) => false,
            None => self.slots[index].is_some(),
        }
    }

    /// Every chunk of this region that currently holds a payload, in index order.
    pub fn chunks(&self) -> Vec<Vector2<i32>> {
        (0..CHUNK_COUNT)
            .map(|index| self.coordinate.chunk_at(index))
            .filter(|chunk| self.contains(chunk))
            .collect()
    }

    /// Seconds since the epoch at which `chunk` was last written, if present.
    pub fn timestamp(&self, chunk: &Vector2<i32>) -> Option<u32> {
        let index = RegionCoordinate::chunk_index(chunk);
        match self.pending.get(&index) {
            Some(PendingWrite::Store { timestamp, .. }) => Some(*timestamp),
            Some(PendingWrite::Remove) => None,
            None => self.slots[index].map(|slot| slot.timestamp),
        }
    }

    /// Reads and decompresses the payload of `chunk`. Absent chunks are `None`.
    pub fn read(&mut self, chunk: &Vector2<i32>) -> Result<Option<Bytes>, RegionError> {
        let index = RegionCoordinate::chunk_index(chunk);
        match self.pending.get(&index) {
            Some(PendingWrite::Store { raw, .. }) => return Ok(Some(raw.clone())),
            Some(PendingWrite::Remove) => return Ok(None),
            None => {}
        }
        let (Some(slot), Some(file)) = (self.slots[index], self.file.as_mut()) else {
            return Ok(None);
        };

        trace!(
            "Reading chunk {} of {:?} from sectors {}:{}",
            index,
            self.path,
            slot.offset,
            slot.sectors
        );
        let mut sectors = vec![0; slot.sectors as usize * SECTOR_BYTES];
        file.seek(SeekFrom::Start(slot.offset as u64 * SECTOR_BYTES as u64))?;
        file.read_exact(&mut sectors)?;

        let corrupt = |reason: String| RegionError::CorruptPayload {
            path: self.path.clone(),
            index,
            reason,
        };

        let mut bytes = &sectors[..];
        let length = bytes.get_u32() as usize;
        // The length counts the compression byte
        if length == 0 || length > bytes.remaining() {
            return Err(corrupt(format!(
                "payload length {} does not fit in {} sectors",
                length, slot.sectors
            )));
        }
        let compression_byte = bytes.get_u8();
        let compression = Compression::from_byte(compression_byte & !EXTERNAL_FLAG)?;

        let data = if compression_byte & EXTERNAL_FLAG != 0 {
            let external = self.external_path(chunk);
            fs::read(&external).map_err(|err| {
                corrupt(format!("external payload {:?} unreadable: {}", external, err))
            })?
        } else {
            bytes[..length - 1].to_vec()
        };

        Ok(Some(compression.decompress_data(&data)?.into()))
    }

    /// Buffers a new payload for `chunk`, replacing whatever is stored there.
    pub fn write(&mut self, chunk: &Vector2<i32>, raw: Bytes) -> Result<(), RegionError> {
        let compression = self.options.compression;
        let encoded = compression.compress_data(&raw, self.options.level)?;
        let index = RegionCoordinate::chunk_index(chunk);
        self.pending.insert(
            index,
            PendingWrite::Store {
                raw,
                encoded,
                compression,
                timestamp: now(),
            },
        );
        Ok(())
    }

    /// Buffers the removal of `chunk`. Returns whether a payload was present.
    pub fn remove(&mut self, chunk: &Vector2<i32>) -> bool {
        let present = self.contains(chunk);
        self.pending
            .insert(RegionCoordinate::chunk_index(chunk), PendingWrite::Remove);
        present
    }

    /// Commits buffered writes: payloads first, then the location and timestamp tables.
    pub fn flush(&mut self) -> Result<(), RegionError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if self.file.is_none() {
            fs::create_dir_all(&self.folder)?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?;
            debug!("Created region file {:?}", self.path);
            self.file = Some(file);
        }

        let mut result = Ok(());
        while let Some((index, write)) = self.pending.pop_first() {
            if let Err(err) = self.apply(index, &write) {
                // Stays buffered for the next flush
                self.pending.insert(index, write);
                result = Err(err);
                break;
            }
        }

        // The header must reference every payload committed so far, even after a failure
        let header = self.write_header();
        result.and(header)
    }

    fn apply(&mut self, index: usize, write: &PendingWrite) -> Result<(), RegionError> {
        let chunk = self.coordinate.chunk_at(index);
        match write {
            PendingWrite::Remove => {
                trace!("Removing chunk {} of {:?}", index, self.path);
                remove_if_exists(&self.external_path(&chunk))?;
                self.slots[index] = None;
                Ok(())
            }
            PendingWrite::Store {
                encoded,
                compression,
                timestamp,
                ..
            } => self.commit(index, &chunk, encoded, *compression, *timestamp),
        }
    }

    fn commit(
        &mut self,
        index: usize,
        chunk: &Vector2<i32>,
        encoded: &[u8],
        compression: Compression,
        timestamp: u32,
    ) -> Result<(), RegionError> {
        // 4 bytes for the *length* and 1 byte for the *compression* method
        let inline_sectors = (encoded.len() + 5).div_ceil(SECTOR_BYTES);
        let external = inline_sectors > MAX_SECTORS;
        let external_path = self.external_path(chunk);

        let mut buf = BytesMut::with_capacity(inline_sectors.min(MAX_SECTORS) * SECTOR_BYTES);
        if external {
            if encoded.len() > u32::MAX as usize {
                return Err(RegionError::PayloadTooLarge(encoded.len()));
            }
            debug!(
                "Chunk {} of {:?} needs {} sectors, storing it in {:?}",
                index, self.path, inline_sectors, external_path
            );
            fs::write(&external_path, encoded)?;
            buf.put_u32(1);
            buf.put_u8(compression.id() | EXTERNAL_FLAG);
        } else {
            remove_if_exists(&external_path)?;
            buf.put_u32(encoded.len() as u32 + 1);
            buf.put_u8(compression.id());
            buf.put_slice(encoded);
        }
        let sectors = buf.len().div_ceil(SECTOR_BYTES);
        buf.resize(sectors * SECTOR_BYTES, 0);
        let sectors = sectors as u32;

        let offset = match self.slots[index] {
            Some(old) if old.sectors == sectors => old.offset,
            _ => self.allocate(sectors),
        };
        trace!(
            "Writing chunk {} of {:?} - {}:{}",
            index,
            self.path,
            offset,
            sectors
        );

        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset as u64 * SECTOR_BYTES as u64))?;
        file.write_all(&buf)?;

        self.slots[index] = Some(Slot {
            offset,
            sectors,
            timestamp,
        });
        Ok(())
    }

    /// First run of `sectors` free sectors, or the end of the file.
    fn allocate(&self, sectors: u32) -> u32 {
        let end = self
            .slots
            .iter()
            .flatten()
            .map(|slot| slot.offset + slot.sectors)
            .max()
            .unwrap_or(HEADER_SECTORS)
            .max(HEADER_SECTORS);

        let mut used = vec![false; end as usize];
        for slot in self.slots.iter().flatten() {
            used[slot.offset as usize..(slot.offset + slot.sectors) as usize].fill(true);
        }

        let mut run_start = HEADER_SECTORS;
        for sector in HEADER_SECTORS..end {
            if used[sector as usize] {
                run_start = sector + 1;
            } else if sector + 1 - run_start == sectors {
                return run_start;
            }
        }
        // Either the trailing free run or the end of the file.
        run_start
    }

    fn write_header(&mut self) -> Result<(), RegionError> {
        let mut header = BytesMut::with_capacity(HEADER_SECTORS as usize * SECTOR_BYTES);
        for slot in self.slots.iter() {
            header.put_u32(slot.map_or(0, |slot| (slot.offset << 8) | slot.sectors));
        }
        for slot in self.slots.iter() {
            header.put_u32(slot.map_or(0, |slot| slot.timestamp));
        }

        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header)?;
        file.flush()?;
        trace!("Wrote header of {:?}", self.path);
        Ok(())
    }

    /// Flushes and releases the backing file. Writes that fail to flush are
    /// dropped with the handle, so callers that must keep them flush first.
    pub fn close(mut self) -> Result<(), RegionError> {
        let result = self.flush();
        self.pending.clear();
        self.file = None;
        debug!("Closed region file {:?}", self.path);
        result
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "region file is not open"))
    }

    fn external_path(&self, chunk: &Vector2<i32>) -> PathBuf {
        self.folder.join(format!("c.{}.{}.mcc", chunk.x, chunk.z))
    }

    #[cfg(test)]
    fn sector_offset(&self, chunk: &Vector2<i32>) -> Option<u32> {
        self.slots[RegionCoordinate::chunk_index(chunk)].map(|slot| slot.offset)
    }
}

impl Drop for RegionFile {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        if let Err(err) = self.flush() {
            error!("Failed to flush region file {:?} on drop: {}", self.path, err);
        }
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or_default()
}
