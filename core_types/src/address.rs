//! Logical address decomposition
//!
//! The CPU and Memory units agree on two numbers at startup: the page size
//! and the number of entries per page table. Everything else about an
//! address follows from them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building a geometry
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Page size must be non-zero")]
    ZeroPageSize,

    #[error("Entries per table must be non-zero")]
    ZeroEntriesPerTable,
}

/// MMU geometry shared by the CPU and Memory units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MmuGeometry {
    page_size: u32,
    entries_per_table: u32,
}

impl MmuGeometry {
    /// Creates a geometry, rejecting zero sizes
    pub fn new(page_size: u32, entries_per_table: u32) -> Result<Self, GeometryError> {
        if page_size == 0 {
            return Err(GeometryError::ZeroPageSize);
        }
        if entries_per_table == 0 {
            return Err(GeometryError::ZeroEntriesPerTable);
        }
        Ok(Self {
            page_size,
            entries_per_table,
        })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn entries_per_table(&self) -> u32 {
        self.entries_per_table
    }

    /// Splits a logical address into page, offset and table indices
    pub fn decompose(&self, logical_address: u32) -> LogicalAddress {
        let page_number = logical_address / self.page_size;
        LogicalAddress {
            page_number,
            offset: logical_address - page_number * self.page_size,
            first_level_index: page_number / self.entries_per_table,
            second_level_index: page_number % self.entries_per_table,
        }
    }

    /// Physical address of `offset` inside `frame`
    pub fn physical_address(&self, frame: u32, offset: u32) -> u32 {
        frame * self.page_size + offset
    }
}

/// A decomposed logical address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalAddress {
    pub page_number: u32,
    pub offset: u32,
    pub first_level_index: u32,
    pub second_level_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_reference_address() {
        let geometry = MmuGeometry::new(64, 4).unwrap();
        let address = geometry.decompose(0x083F);
        assert_eq!(
            address,
            LogicalAddress {
                page_number: 32,
                offset: 63,
                first_level_index: 8,
                second_level_index: 0,
            }
        );
    }

    #[test]
    fn test_decompose_first_byte() {
        let geometry = MmuGeometry::new(64, 4).unwrap();
        let address = geometry.decompose(0);
        assert_eq!(address.page_number, 0);
        assert_eq!(address.offset, 0);
        assert_eq!(address.first_level_index, 0);
        assert_eq!(address.second_level_index, 0);
    }

    #[test]
    fn test_decompose_page_boundary() {
        let geometry = MmuGeometry::new(64, 4).unwrap();
        let last = geometry.decompose(255);
        assert_eq!((last.page_number, last.offset), (3, 63));
        assert_eq!((last.first_level_index, last.second_level_index), (0, 3));

        let next = geometry.decompose(256);
        assert_eq!((next.page_number, next.offset), (4, 0));
        assert_eq!((next.first_level_index, next.second_level_index), (1, 0));
    }

    #[test]
    fn test_physical_address() {
        let geometry = MmuGeometry::new(64, 4).unwrap();
        assert_eq!(geometry.physical_address(0, 36), 36);
        assert_eq!(geometry.physical_address(3, 1), 193);
    }

    #[test]
    fn test_zero_geometry_rejected() {
        assert_eq!(MmuGeometry::new(0, 4), Err(GeometryError::ZeroPageSize));
        assert_eq!(
            MmuGeometry::new(64, 0),
            Err(GeometryError::ZeroEntriesPerTable)
        );
    }
}
