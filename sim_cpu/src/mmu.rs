//! Memory management unit
//!
//! Every translation walks both table levels through the Memory unit. The
//! TLB is refreshed with the result but never short-circuits the walk.

use crate::error::CpuError;
use crate::memory::MemoryClient;
use crate::tlb::Tlb;
use core_types::{FrameId, MmuGeometry, PageTableId};
use log::debug;

pub struct Mmu {
    geometry: MmuGeometry,
    tlb: Tlb,
}

impl Mmu {
    pub fn new(geometry: MmuGeometry, tlb_entries: usize) -> Self {
        Self {
            geometry,
            tlb: Tlb::new(tlb_entries),
        }
    }

    /// Asks Memory for its geometry
    pub fn from_memory(memory: &MemoryClient, tlb_entries: usize) -> Result<Self, CpuError> {
        let geometry = MmuGeometry::new(memory.page_size()?, memory.entries_per_table()?)?;
        debug!(
            "[MMU] Page size {}B, {} entries per table",
            geometry.page_size(),
            geometry.entries_per_table()
        );
        Ok(Self::new(geometry, tlb_entries))
    }

    pub fn geometry(&self) -> MmuGeometry {
        self.geometry
    }

    pub fn tlb(&self) -> &Tlb {
        &self.tlb
    }

    pub fn flush(&mut self) {
        self.tlb.flush();
    }

    /// Translates a logical address of the process owning `table`
    pub fn translate(
        &mut self,
        memory: &MemoryClient,
        table: PageTableId,
        logical_address: u32,
    ) -> Result<u32, CpuError> {
        let address = self.geometry.decompose(logical_address);
        let second = memory.second_level_page(table.as_u32(), address.first_level_index)?;
        let frame = memory.frame(second, address.second_level_index)?;
        self.tlb.update(address.page_number, FrameId::new(frame));

        let physical = self.geometry.physical_address(frame, address.offset);
        debug!(
            "[MMU] {} -> page {} frame {} -> {}",
            logical_address, address.page_number, frame, physical
        );
        Ok(physical)
    }
}
