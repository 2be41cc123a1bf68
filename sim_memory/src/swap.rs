//! Swap manager
//!
//! Each admitted process gets one backing file, `<swap_dir>/<pid>.swap`,
//! sized to its declared footprint. Swap-out maps the file and copies the
//! PCB stream into it; swap-in maps it read-only and copies the image back
//! to the heap before the mapping is dropped.
//!
//! The record kept for each file stores the image length and a CRC32 of
//! the last image written, so a file changed behind our back is detected.

use crate::error::SwapError;
use core_types::{Pid, ProcessControlBlock};
use log::{debug, info, trace, warn};
use memmap2::{Mmap, MmapMut};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
struct SwapRecord {
    declared_size: u32,
    image_len: usize,
    checksum: Option<u32>,
}

/// Backing files for suspended processes
pub struct SwapManager {
    dir: PathBuf,
    records: Mutex<HashMap<Pid, SwapRecord>>,
}

impl SwapManager {
    /// Opens a swap directory, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SwapError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            records: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the backing file for `pid`
    pub fn path_for(&self, pid: Pid) -> PathBuf {
        self.dir.join(format!("{}.swap", pid.as_u32()))
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<Pid, SwapRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Creates the zero-filled backing file for a newly admitted process
    pub fn create(&self, pid: Pid, declared_size: u32) -> Result<(), SwapError> {
        let file = File::create(self.path_for(pid))?;
        file.set_len(u64::from(declared_size))?;
        self.records().insert(
            pid,
            SwapRecord {
                declared_size,
                image_len: 0,
                checksum: None,
            },
        );
        trace!("[SWAP] Created swap file for {} ({} bytes)", pid, declared_size);
        Ok(())
    }

    /// Whether a swap record exists for `pid`
    pub fn contains(&self, pid: Pid) -> bool {
        self.records().contains_key(&pid)
    }

    /// Writes the PCB image to its backing file and flushes it
    pub fn swap_out(&self, pcb: &ProcessControlBlock) -> Result<(), SwapError> {
        let image = pcb.to_stream()?;
        self.write_image(pcb.pid, pcb.size, &image)
    }

    /// Writes a raw PCB stream for `pid`
    pub fn write_image(&self, pid: Pid, declared_size: u32, image: &[u8]) -> Result<(), SwapError> {
        let declared_size = self
            .records()
            .get(&pid)
            .map(|record| record.declared_size)
            .unwrap_or(declared_size);
        let file_len = image.len().max(declared_size as usize);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.path_for(pid))?;
        file.set_len(file_len as u64)?;

        // SAFETY: the file is private to this manager and is not resized
        // while the mapping is alive.
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        map[..image.len()].copy_from_slice(image);
        map[image.len()..].fill(0);
        map.flush()?;
        drop(map);

        self.records().insert(
            pid,
            SwapRecord {
                declared_size,
                image_len: image.len(),
                checksum: Some(crc32fast::hash(image)),
            },
        );
        info!("[SWAP] {} swapped out ({} bytes)", pid, image.len());
        Ok(())
    }

    /// Reads back the raw image written by the last swap-out
    pub fn read_image(&self, pid: Pid) -> Result<Vec<u8>, SwapError> {
        let record = *self.records().get(&pid).ok_or(SwapError::NotFound(pid))?;
        let expected = record.checksum.ok_or(SwapError::NotSwapped(pid))?;

        let file = File::open(self.path_for(pid))?;
        // SAFETY: read-only mapping of a file only this manager writes.
        let map = unsafe { Mmap::map(&file)? };
        if map.len() < record.image_len {
            return Err(SwapError::Truncated {
                pid,
                expected: record.image_len,
                actual: map.len(),
            });
        }
        let image = map[..record.image_len].to_vec();
        drop(map);

        let actual = crc32fast::hash(&image);
        if actual != expected {
            return Err(SwapError::ChecksumMismatch {
                pid,
                expected,
                actual,
            });
        }
        Ok(image)
    }

    /// Rebuilds the swapped PCB of `pid`
    pub fn swap_in(&self, pid: Pid) -> Result<ProcessControlBlock, SwapError> {
        let pcb = ProcessControlBlock::from_stream(&self.read_image(pid)?)?;
        info!("[SWAP] {} swapped in", pid);
        Ok(pcb)
    }

    /// Removes the backing file and record; unknown pids are ignored
    pub fn delete(&self, pid: Pid) -> Result<bool, SwapError> {
        let existed = self.records().remove(&pid).is_some();
        match fs::remove_file(self.path_for(pid)) {
            Ok(()) => debug!("[SWAP] Deleted swap file of {}", pid),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!("[SWAP] Could not delete swap file of {}: {}", pid, err);
                return Err(err.into());
            }
        }
        Ok(existed)
    }
}
