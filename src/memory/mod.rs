//! The memory controller
//!
//! The controller is the machine's top-level address decoder. The linear
//! address space is cut into coarse blocks by its high-order bits: with the
//! default geometry (`size = 0xFFFF`, even block numbering) an address `A`
//! decodes as
//!
//! ```text
//! block(A)  = (A >> 12) & 0xE      even block numbers 0x0..0xE, 0x2000 bytes each
//! offset(A) = A & 0x1FFF           offset into the block's sub-map
//! ```
//!
//! Block 0xA is always the memory-mapped I/O region. Data reads and writes
//! are block-decoded; instruction fetch is bank-scoped, operating on the
//! cursor of whichever region is currently banked.

pub mod iomap;
pub mod map;

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Access, MemoryError};
use crate::unit::Unit;

pub use iomap::IoMap;
pub use map::MemoryMap;

/// Block number reserved for memory-mapped I/O.
pub const MMIO_BLOCK: u8 = 0xA;

/// Size in bytes of each default data block.
pub const BLOCK_SIZE: usize = 0x2000;

/// A region registered with the controller: plain memory or the I/O map.
pub enum Region {
    Ram(MemoryMap),
    Io(IoMap),
}

/// Top-level address decoder with banked fetch.
pub struct MemoryController {
    maps: BTreeMap<u8, Region>,
    bank: u8,
    size: u32,
    habit: u32,
    blksize: u8,
    bitmask: u32,
}

impl MemoryController {
    /// An empty controller with the default geometry.
    pub fn new() -> Self {
        Self::with_geometry(0xFFFF, true)
    }

    /// An empty controller over `size + 1` bytes of address space.
    ///
    /// `habit` is `log2(size + 1) - 4`; `even` selects the block mask
    /// (0xE keeps block numbers even, 0xF allows odd blocks too).
    pub fn with_geometry(size: u32, even: bool) -> Self {
        Self {
            maps: BTreeMap::new(),
            bank: 0,
            size,
            habit: (size + 1).ilog2() - 4,
            blksize: if even { 0xE } else { 0xF },
            bitmask: size >> 3,
        }
    }

    /// The default machine: data maps on every even block, MMIO at 0xA.
    pub fn default_machine() -> Self {
        let mut controller = Self::new();
        for block in (0x0u8..=0xE).step_by(2) {
            let region = if block == MMIO_BLOCK {
                Region::Io(IoMap::new())
            } else {
                Region::Ram(MemoryMap::new(BLOCK_SIZE))
            };
            controller.maps.insert(block, region);
        }
        controller
    }

    /// Total bytes of addressable space.
    pub fn len(&self) -> usize {
        self.size as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Block number an address decodes to.
    #[inline(always)]
    pub fn block(&self, addr: u32) -> u8 {
        ((addr >> self.habit) as u8) & self.blksize
    }

    /// Offset within the sub-map an address decodes to.
    #[inline(always)]
    pub fn offset(&self, addr: u32) -> u32 {
        addr & self.bitmask
    }

    // === Registration ===

    /// Register a memory map at `block`.
    ///
    /// A map with neither read nor write capability is rejected here
    /// rather than at first access.
    pub fn add_map(&mut self, block: u8, map: MemoryMap) -> Result<(), MemoryError> {
        if !map.readable() && !map.writable() {
            return Err(MemoryError::Protection {
                access: Access::Read,
                addr: 0,
            });
        }
        debug!(block, size = map.len(), "memory map registered");
        self.maps.insert(block, Region::Ram(map));
        Ok(())
    }

    /// Register the I/O map at `block`.
    pub fn add_io(&mut self, block: u8, io: IoMap) {
        debug!(block, "I/O map registered");
        self.maps.insert(block, Region::Io(io));
    }

    /// Readable/writable capability of every registered block.
    pub fn memory_map(&self) -> Vec<(u8, bool, bool)> {
        self.maps
            .iter()
            .map(|(&block, region)| match region {
                Region::Ram(map) => (block, map.readable(), map.writable()),
                Region::Io(_) => (block, true, true),
            })
            .collect()
    }

    /// The registered I/O map, if any.
    pub fn io(&self) -> Option<&IoMap> {
        self.maps.values().find_map(|region| match region {
            Region::Io(io) => Some(io),
            Region::Ram(_) => None,
        })
    }

    pub fn io_mut(&mut self) -> Option<&mut IoMap> {
        self.maps.values_mut().find_map(|region| match region {
            Region::Io(io) => Some(io),
            Region::Ram(_) => None,
        })
    }

    fn region(&self, block: u8) -> Result<&Region, MemoryError> {
        self.maps.get(&block).ok_or(MemoryError::Unmapped { block })
    }

    fn region_mut(&mut self, block: u8) -> Result<&mut Region, MemoryError> {
        self.maps
            .get_mut(&block)
            .ok_or(MemoryError::Unmapped { block })
    }

    // === Banked fetch path ===

    /// The bank the fetch path currently runs from.
    pub fn bank(&self) -> u8 {
        self.bank
    }

    /// Select the fetch bank.
    pub fn set_bank(&mut self, bank: u8) {
        self.bank = bank;
    }

    /// Place the banked region's fetch cursor.
    pub fn set_cursor(&mut self, addr: u32) -> Result<(), MemoryError> {
        let bank = self.bank;
        match self.region_mut(bank)? {
            Region::Ram(map) => map.set_cursor(addr),
            Region::Io(_) => Err(MemoryError::Protection {
                access: Access::Execute,
                addr,
            }),
        }
    }

    /// The banked region's fetch cursor.
    pub fn cursor(&self) -> Result<u32, MemoryError> {
        match self.region(self.bank)? {
            Region::Ram(map) => Ok(map.cursor()),
            Region::Io(_) => Err(MemoryError::Protection {
                access: Access::Execute,
                addr: 0,
            }),
        }
    }

    /// Fetch one byte from the banked region, advancing its cursor.
    pub fn fetch(&mut self) -> Result<u8, MemoryError> {
        let bank = self.bank;
        match self.region_mut(bank)? {
            Region::Ram(map) => map.fetch(),
            Region::Io(_) => Err(MemoryError::Protection {
                access: Access::Execute,
                addr: 0,
            }),
        }
    }

    /// Fetch a little-endian word from the banked region.
    pub fn fetch16(&mut self) -> Result<u16, MemoryError> {
        let low = self.fetch()?;
        let high = self.fetch()?;
        Ok(low as u16 | (high as u16) << 8)
    }

    // === Address-decoded data path ===

    /// Read the byte at linear address `addr`.
    pub fn read(&mut self, addr: u32) -> Result<u8, MemoryError> {
        let block = self.block(addr);
        let offset = self.offset(addr);
        match self.region_mut(block)? {
            Region::Ram(map) => map.read(offset),
            Region::Io(io) => io.read(offset),
        }
    }

    /// Write a byte at linear address `addr`.
    pub fn write(&mut self, addr: u32, byte: u8) -> Result<(), MemoryError> {
        let block = self.block(addr);
        let offset = self.offset(addr);
        match self.region_mut(block)? {
            Region::Ram(map) => map.write(offset, byte),
            Region::Io(io) => io.write(offset, byte),
        }
    }

    /// Read a little-endian word: `read(A) | read(A + 1) << 8`.
    pub fn read16(&mut self, addr: u32) -> Result<u16, MemoryError> {
        let low = self.read(addr)?;
        let high = self.read(addr + 1)?;
        Ok(low as u16 | (high as u16) << 8)
    }

    /// Write a little-endian word.
    pub fn write16(&mut self, addr: u32, word: u16) -> Result<(), MemoryError> {
        let mut bytes = [0u8; 2];
        word.pack_le(&mut bytes);
        self.write(addr, bytes[0])?;
        self.write(addr + 1, bytes[1])
    }

    /// Read a contiguous run from the sub-map `addr` decodes into.
    pub fn readblock(&mut self, addr: u32, size: usize) -> Result<Vec<u8>, MemoryError> {
        let block = self.block(addr);
        let offset = self.offset(addr);
        match self.region_mut(block)? {
            Region::Ram(map) => map.readblock(offset, size),
            Region::Io(io) => io.readblock(offset, size),
        }
    }

    /// Write a contiguous run into the sub-map `addr` decodes into.
    pub fn writeblock(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        let block = self.block(addr);
        let offset = self.offset(addr);
        match self.region_mut(block)? {
            Region::Ram(map) => map.writeblock(offset, data),
            Region::Io(io) => io.writeblock(offset, data),
        }
    }

    /// Zero a contiguous run in the sub-map `addr` decodes into.
    pub fn clearblock(&mut self, addr: u32, size: usize) -> Result<(), MemoryError> {
        let block = self.block(addr);
        let offset = self.offset(addr);
        match self.region_mut(block)? {
            Region::Ram(map) => map.clearblock(offset, size),
            Region::Io(io) => io.clearblock(offset, size),
        }
    }

    /// Copy `size` bytes from `src` to `dest`. The two runs may live in
    /// different sub-maps.
    pub fn memcopy(&mut self, src: u32, dest: u32, size: usize) -> Result<(), MemoryError> {
        let buf = self.readblock(src, size)?;
        self.writeblock(dest, &buf)
    }

    /// Copy `size` bytes from `src` to `dest`, then zero the source run.
    pub fn memmove(&mut self, src: u32, dest: u32, size: usize) -> Result<(), MemoryError> {
        self.memcopy(src, dest, size)?;
        self.clearblock(src, size)
    }
}

impl Default for MemoryController {
    fn default() -> Self {
        Self::new()
    }
}
