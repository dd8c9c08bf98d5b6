//! Memory model: data and heap address maps plus the value stack.

/// Fixed region map and address decoder.
pub mod map;

use std::collections::BTreeMap;

pub use map::{
    decode_memory_region, MemoryRegion, RegionDescriptor, DATA_END, DATA_START,
    FIXED_MEMORY_REGIONS, HEAP_END, HEAP_START,
};

/// Bytes `ESP` moves per pushed or popped stack slot.
pub const STACK_SLOT_BYTES: i64 = 4;

/// Three independent memory spaces observed by the CPU.
///
/// Unwritten data and heap addresses read as zero. The stack's top is the
/// last element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemoryState {
    /// Data region values by address.
    pub data: BTreeMap<u64, i64>,
    /// Pushed values, bottom first.
    pub stack: Vec<i64>,
    /// Heap region values by address.
    pub heap: BTreeMap<u64, i64>,
}

impl MemoryState {
    /// Reads the value at `addr`, or `None` when the address is unmapped.
    #[must_use]
    pub fn read(&self, addr: u64) -> Option<i64> {
        let space = match decode_memory_region(addr)? {
            MemoryRegion::Data => &self.data,
            MemoryRegion::Heap => &self.heap,
        };
        Some(space.get(&addr).copied().unwrap_or(0))
    }

    /// Writes `value` at `addr`. Returns `false` and leaves memory untouched
    /// when the address is unmapped.
    pub fn write(&mut self, addr: u64, value: i64) -> bool {
        let space = match decode_memory_region(addr) {
            Some(MemoryRegion::Data) => &mut self.data,
            Some(MemoryRegion::Heap) => &mut self.heap,
            None => return false,
        };
        space.insert(addr, value);
        true
    }

    /// Returns `true` when all three spaces are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.stack.is_empty() && self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryState, HEAP_START};

    #[test]
    fn default_memory_is_empty_and_reads_zero() {
        let memory = MemoryState::default();
        assert!(memory.is_empty());
        assert_eq!(memory.read(1000), Some(0));
        assert_eq!(memory.read(HEAP_START), Some(0));
    }

    #[test]
    fn writes_route_to_the_region_owning_the_address() {
        let mut memory = MemoryState::default();
        assert!(memory.write(1000, 5));
        assert!(memory.write(HEAP_START + 4, -7));

        assert_eq!(memory.data.get(&1000), Some(&5));
        assert_eq!(memory.heap.get(&(HEAP_START + 4)), Some(&-7));
        assert_eq!(memory.read(1000), Some(5));
        assert_eq!(memory.read(HEAP_START + 4), Some(-7));
    }

    #[test]
    fn unmapped_addresses_are_rejected_without_side_effects() {
        let mut memory = MemoryState::default();
        assert!(!memory.write(0x1_0000, 1));
        assert_eq!(memory.read(0x1_0000), None);
        assert!(memory.is_empty());
    }
}
