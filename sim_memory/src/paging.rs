//! Two-level page tables and physical memory
//!
//! Level-1 tables map a first-level index to a Level-2 table; Level-2 rows
//! bind a physical frame and carry its present, use and modified bits.
//! Level-2 tables are created the first time a walk reaches an unset
//! Level-1 entry, and frames are bound the first time a walk reaches an
//! unset Level-2 row. A bound frame only becomes present on first access,
//! but it counts against the owner's frame quota from the moment it is bound.
//!
//! Two reverse indices (`frame -> (table-2, row)` and `table-2 -> table-1`)
//! answer ownership questions without scanning every table.

use crate::error::MemoryError;
use core_types::{FrameId, MmuGeometry, PageTableId, SecondLevelTableId};
use std::collections::{BTreeMap, HashMap};

/// Size in bytes of a stored value
pub const WORD_SIZE: u32 = 4;

/// One row of a Level-2 table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageEntry {
    pub frame: Option<FrameId>,
    pub present: bool,
    pub used: bool,
    pub modified: bool,
}

#[derive(Debug)]
struct FirstLevelTable {
    entries: Vec<Option<SecondLevelTableId>>,
}

#[derive(Debug)]
struct SecondLevelTable {
    owner: PageTableId,
    entries: Vec<PageEntry>,
}

/// Page tables, frame bindings and the physical memory they describe
#[derive(Debug)]
pub struct Paging {
    geometry: MmuGeometry,
    frames_per_process: u32,
    frame_count: u32,
    memory: Vec<u8>,
    level_1: BTreeMap<PageTableId, FirstLevelTable>,
    level_2: BTreeMap<SecondLevelTableId, SecondLevelTable>,
    frame_index: HashMap<FrameId, (SecondLevelTableId, usize)>,
    next_level_1: u32,
    next_level_2: u32,
}

impl Paging {
    /// Creates an empty paging state over `memory_size` bytes
    pub fn new(geometry: MmuGeometry, memory_size: u32, frames_per_process: u32) -> Self {
        Self {
            geometry,
            frames_per_process,
            frame_count: memory_size / geometry.page_size(),
            memory: vec![0; memory_size as usize],
            level_1: BTreeMap::new(),
            level_2: BTreeMap::new(),
            frame_index: HashMap::new(),
            next_level_1: 0,
            next_level_2: 0,
        }
    }

    pub fn geometry(&self) -> MmuGeometry {
        self.geometry
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    fn rows(&self) -> u32 {
        self.geometry.entries_per_table()
    }

    fn check_index(&self, index: u32) -> Result<usize, MemoryError> {
        let rows = self.rows();
        if index >= rows {
            return Err(MemoryError::IndexOutOfBounds { index, rows });
        }
        Ok(index as usize)
    }

    /// Allocates a fresh Level-1 table with every entry unset
    pub fn create_new_process(&mut self) -> PageTableId {
        let id = PageTableId::new(self.next_level_1);
        self.next_level_1 += 1;
        self.level_1.insert(
            id,
            FirstLevelTable {
                entries: vec![None; self.rows() as usize],
            },
        );
        id
    }

    /// Releases a Level-1 table, its Level-2 tables and their frames
    ///
    /// Returns false if the table did not exist.
    pub fn delete_process(&mut self, table: PageTableId) -> bool {
        let Some(first) = self.level_1.remove(&table) else {
            return false;
        };
        for second_id in first.entries.into_iter().flatten() {
            if let Some(second) = self.level_2.remove(&second_id) {
                for frame in second.entries.iter().filter_map(|entry| entry.frame) {
                    self.frame_index.remove(&frame);
                }
            }
        }
        true
    }

    /// Resolves a Level-1 entry, creating its Level-2 table on first use
    pub fn second_level_page(
        &mut self,
        table: PageTableId,
        index: u32,
    ) -> Result<SecondLevelTableId, MemoryError> {
        let row = self.check_index(index)?;
        let rows = self.rows() as usize;
        let next_id = SecondLevelTableId::new(self.next_level_2);

        let first = self
            .level_1
            .get_mut(&table)
            .ok_or(MemoryError::TableNotFound(table))?;
        if let Some(existing) = first.entries[row] {
            return Ok(existing);
        }

        first.entries[row] = Some(next_id);
        self.next_level_2 += 1;
        self.level_2.insert(
            next_id,
            SecondLevelTable {
                owner: table,
                entries: vec![PageEntry::default(); rows],
            },
        );
        Ok(next_id)
    }

    /// Resolves a Level-2 row, binding the lowest free frame on first use
    pub fn frame(&mut self, table: SecondLevelTableId, index: u32) -> Result<FrameId, MemoryError> {
        let row = self.check_index(index)?;
        let bound = self
            .level_2
            .get(&table)
            .ok_or(MemoryError::SecondLevelTableNotFound(table))?
            .entries[row]
            .frame;
        if let Some(frame) = bound {
            return Ok(frame);
        }

        let owner = self
            .owner_of(table)
            .ok_or(MemoryError::SecondLevelTableNotFound(table))?;
        let held = self.bound_frames(owner);
        if held >= self.frames_per_process {
            return Err(MemoryError::ReplacementUnsupported {
                table: owner,
                held,
            });
        }

        let frame = self.find_free_frame().ok_or(MemoryError::OutOfFrames)?;
        if let Some(second) = self.level_2.get_mut(&table) {
            second.entries[row].frame = Some(frame);
        }
        self.frame_index.insert(frame, (table, row));
        Ok(frame)
    }

    /// Lowest frame not bound to any table
    pub fn find_free_frame(&self) -> Option<FrameId> {
        (0..self.frame_count)
            .map(FrameId::new)
            .find(|frame| !self.frame_index.contains_key(frame))
    }

    /// Level-1 table owning a Level-2 table
    pub fn owner_of(&self, table: SecondLevelTableId) -> Option<PageTableId> {
        self.level_2.get(&table).map(|second| second.owner)
    }

    /// Row that binds `frame`, if any
    pub fn entry_for_frame(&self, frame: FrameId) -> Option<PageEntry> {
        let (table, row) = self.frame_index.get(&frame)?;
        self.level_2.get(table).map(|second| second.entries[*row])
    }

    fn entries_of(&self, table: PageTableId) -> impl Iterator<Item = &PageEntry> + '_ {
        self.level_1
            .get(&table)
            .into_iter()
            .flat_map(|first| first.entries.iter().flatten())
            .filter_map(|id| self.level_2.get(id))
            .flat_map(|second| second.entries.iter())
    }

    /// Number of present frames held by a process
    pub fn present_frames(&self, table: PageTableId) -> u32 {
        self.entries_of(table).filter(|entry| entry.present).count() as u32
    }

    /// Number of frames bound to a process, present or not
    pub fn bound_frames(&self, table: PageTableId) -> u32 {
        self.entries_of(table)
            .filter(|entry| entry.frame.is_some())
            .count() as u32
    }

    pub fn process_count(&self) -> usize {
        self.level_1.len()
    }

    /// Reads the value stored at a physical address
    pub fn read(&mut self, physical_address: u32) -> Result<u32, MemoryError> {
        let start = self.access(physical_address, false)?;
        let bytes = &self.memory[start..start + WORD_SIZE as usize];
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Writes a value at a physical address
    pub fn write(&mut self, physical_address: u32, value: u32) -> Result<(), MemoryError> {
        let start = self.access(physical_address, true)?;
        self.memory[start..start + WORD_SIZE as usize].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Runs the fault path for one access and returns the byte offset to use
    fn access(&mut self, physical_address: u32, write: bool) -> Result<usize, MemoryError> {
        let page_size = self.geometry.page_size();
        let frame = FrameId::new(physical_address / page_size);
        let offset = physical_address % page_size;
        if frame.as_u32() >= self.frame_count || offset + WORD_SIZE > page_size {
            return Err(MemoryError::AddressOutOfRange(physical_address));
        }

        let (table, row) = *self
            .frame_index
            .get(&frame)
            .ok_or(MemoryError::FrameNotFound(frame))?;
        let second = self
            .level_2
            .get(&table)
            .ok_or(MemoryError::FrameNotFound(frame))?;

        // Binding already charged the quota, so a first touch always fits
        if !second.entries[row].present {
            let base = frame.index() * page_size as usize;
            self.memory[base..base + page_size as usize].fill(0);
        }

        if let Some(second) = self.level_2.get_mut(&table) {
            let entry = &mut second.entries[row];
            entry.present = true;
            entry.used = true;
            if write {
                entry.modified = true;
            }
        }
        Ok(physical_address as usize)
    }

    /// One line per live Level-1 table, for debug dumps
    pub fn describe_tables(&self) -> Vec<String> {
        self.level_1
            .iter()
            .map(|(id, first)| {
                let rows: Vec<String> = first
                    .entries
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| match entry {
                        Some(second_id) => {
                            let frames: Vec<String> = self
                                .level_2
                                .get(second_id)
                                .map(|second| {
                                    second
                                        .entries
                                        .iter()
                                        .map(|entry| match entry.frame {
                                            Some(frame) if entry.present => format!("{}*", frame),
                                            Some(frame) => frame.to_string(),
                                            None => "-".to_string(),
                                        })
                                        .collect()
                                })
                                .unwrap_or_default();
                            format!("[{}]->{}({})", index, second_id, frames.join(" "))
                        }
                        None => format!("[{}]->-", index),
                    })
                    .collect();
                format!("Table {}: {}", id, rows.join(" "))
            })
            .collect()
    }
}
