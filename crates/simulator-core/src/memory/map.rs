//! Fixed data-space region map and address decoding helpers.

/// Inclusive start address of the data region.
pub const DATA_START: u64 = 0x0000;
/// Inclusive end address of the data region.
pub const DATA_END: u64 = 0x7FFF;
/// Inclusive start address of the heap region.
pub const HEAP_START: u64 = 0x8000;
/// Inclusive end address of the heap region.
pub const HEAP_END: u64 = 0xFFFF;

/// Canonical fixed-region descriptor for the data-space map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionDescriptor {
    /// Region classification.
    pub region: MemoryRegion,
    /// Inclusive start address.
    pub start: u64,
    /// Inclusive end address.
    pub end: u64,
}

/// Region classification for addressable memory operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MemoryRegion {
    /// Static data (`0x0000..=0x7FFF`).
    Data,
    /// Heap (`0x8000..=0xFFFF`).
    Heap,
}

impl MemoryRegion {
    /// Returns the inclusive bounds for this region.
    #[must_use]
    pub const fn bounds(self) -> (u64, u64) {
        match self {
            Self::Data => (DATA_START, DATA_END),
            Self::Heap => (HEAP_START, HEAP_END),
        }
    }

    /// Returns `true` when `addr` belongs to this region.
    #[must_use]
    pub const fn contains(self, addr: u64) -> bool {
        let (start, end) = self.bounds();
        addr >= start && addr <= end
    }

    /// Returns the canonical descriptor for this region.
    #[must_use]
    pub const fn descriptor(self) -> RegionDescriptor {
        let (start, end) = self.bounds();
        RegionDescriptor {
            region: self,
            start,
            end,
        }
    }
}

/// Region table in ascending address order.
pub const FIXED_MEMORY_REGIONS: [RegionDescriptor; 2] = [
    MemoryRegion::Data.descriptor(),
    MemoryRegion::Heap.descriptor(),
];

/// Decodes an address into its region, or `None` past the end of the space.
#[must_use]
pub const fn decode_memory_region(addr: u64) -> Option<MemoryRegion> {
    if addr <= DATA_END {
        Some(MemoryRegion::Data)
    } else if addr <= HEAP_END {
        Some(MemoryRegion::Heap)
    } else {
        None
    }
}
