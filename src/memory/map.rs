//! Protected memory regions
//!
//! A `MemoryMap` is a fixed-size byte buffer with three independently
//! clearable protection bits and a private cursor used only by the fetch
//! path. All data access goes through explicit addresses; only `fetch`
//! consumes the cursor.

use crate::error::{Access, MemoryError};

/// A contiguous byte region with read/write/execute protection.
pub struct MemoryMap {
    mem: Vec<u8>,
    readable: bool,
    writable: bool,
    executable: bool,
    cursor: usize,
}

impl MemoryMap {
    /// Create a zero-filled map with all protections open.
    pub fn new(size: usize) -> Self {
        Self {
            mem: vec![0; size],
            readable: true,
            writable: true,
            executable: true,
            cursor: 0,
        }
    }

    /// Size of the region in bytes.
    pub fn len(&self) -> usize {
        self.mem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    /// Zero the whole region and rewind the cursor.
    pub fn clear(&mut self) {
        self.mem.fill(0);
        self.cursor = 0;
    }

    fn check_addr(&self, addr: u32) -> Result<usize, MemoryError> {
        let addr = addr as usize;
        if addr >= self.mem.len() {
            return Err(MemoryError::Bounds { addr: addr as u32 });
        }
        Ok(addr)
    }

    fn check_range(&self, addr: u32, size: usize) -> Result<usize, MemoryError> {
        let addr = addr as usize;
        if addr.saturating_add(size) > self.mem.len() {
            return Err(MemoryError::Bounds { addr: addr as u32 });
        }
        Ok(addr)
    }

    /// Fetch the byte at the cursor and advance. Requires execute permission.
    pub fn fetch(&mut self) -> Result<u8, MemoryError> {
        if !self.executable {
            return Err(MemoryError::Protection {
                access: Access::Execute,
                addr: self.cursor as u32,
            });
        }
        let byte = *self
            .mem
            .get(self.cursor)
            .ok_or(MemoryError::Bounds {
                addr: self.cursor as u32,
            })?;
        self.cursor += 1;
        Ok(byte)
    }

    /// Read the byte at `addr`. Requires read permission.
    pub fn read(&self, addr: u32) -> Result<u8, MemoryError> {
        if !self.readable {
            return Err(MemoryError::Protection {
                access: Access::Read,
                addr,
            });
        }
        Ok(self.mem[self.check_addr(addr)?])
    }

    /// Write `byte` at `addr`. Requires write permission.
    pub fn write(&mut self, addr: u32, byte: u8) -> Result<(), MemoryError> {
        if !self.writable {
            return Err(MemoryError::Protection {
                access: Access::Write,
                addr,
            });
        }
        let addr = self.check_addr(addr)?;
        self.mem[addr] = byte;
        Ok(())
    }

    /// Read `size` bytes starting at `addr`.
    ///
    /// Fails whole: an out-of-range or protected run copies nothing.
    pub fn readblock(&self, addr: u32, size: usize) -> Result<Vec<u8>, MemoryError> {
        if !self.readable {
            return Err(MemoryError::Protection {
                access: Access::Read,
                addr,
            });
        }
        let addr = self.check_range(addr, size)?;
        Ok(self.mem[addr..addr + size].to_vec())
    }

    /// Write `block` starting at `addr`. Fails whole.
    pub fn writeblock(&mut self, addr: u32, block: &[u8]) -> Result<(), MemoryError> {
        if !self.writable {
            return Err(MemoryError::Protection {
                access: Access::Write,
                addr,
            });
        }
        let addr = self.check_range(addr, block.len())?;
        self.mem[addr..addr + block.len()].copy_from_slice(block);
        Ok(())
    }

    /// Zero `size` bytes starting at `addr`. Fails whole.
    pub fn clearblock(&mut self, addr: u32, size: usize) -> Result<(), MemoryError> {
        if !self.writable {
            return Err(MemoryError::Protection {
                access: Access::Write,
                addr,
            });
        }
        let addr = self.check_range(addr, size)?;
        self.mem[addr..addr + size].fill(0);
        Ok(())
    }

    // === Protection ===

    /// Clear the write permission bit.
    pub fn write_protect(&mut self) {
        self.writable = false;
    }

    /// Clear the read permission bit.
    pub fn read_protect(&mut self) {
        self.readable = false;
    }

    /// Clear the execute permission bit.
    pub fn execute_protect(&mut self) {
        self.executable = false;
    }

    pub fn readable(&self) -> bool {
        self.readable
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn executable(&self) -> bool {
        self.executable
    }

    // === Fetch cursor ===

    /// Place the fetch cursor. `addr` may sit one past the end, where the
    /// next fetch reports out of range.
    pub fn set_cursor(&mut self, addr: u32) -> Result<(), MemoryError> {
        if addr as usize > self.mem.len() {
            return Err(MemoryError::Bounds { addr });
        }
        self.cursor = addr as usize;
        Ok(())
    }

    pub fn cursor(&self) -> u32 {
        self.cursor as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Access;

    #[test]
    fn test_read_after_write() {
        let mut map = MemoryMap::new(0x100);
        map.write(0x40, 0xAB).unwrap();
        assert_eq!(map.read(0x40).unwrap(), 0xAB);
    }

    #[test]
    fn test_write_protect() {
        let mut map = MemoryMap::new(0x100);
        map.write_protect();
        assert_eq!(
            map.write(0, 1),
            Err(MemoryError::Protection {
                access: Access::Write,
                addr: 0
            })
        );
        // Reads still work
        assert_eq!(map.read(0).unwrap(), 0);
    }

    #[test]
    fn test_fetch_requires_execute() {
        let mut map = MemoryMap::new(0x10);
        map.writeblock(0, &[0xAA, 0xBB]).unwrap();
        assert_eq!(map.fetch().unwrap(), 0xAA);
        assert_eq!(map.fetch().unwrap(), 0xBB);

        map.execute_protect();
        assert!(matches!(
            map.fetch(),
            Err(MemoryError::Protection {
                access: Access::Execute,
                ..
            })
        ));
    }

    #[test]
    fn test_block_ops_fail_whole() {
        let mut map = MemoryMap::new(0x10);
        // A run that straddles the end writes nothing
        assert!(map.writeblock(0x0E, &[1, 2, 3]).is_err());
        assert_eq!(map.read(0x0E).unwrap(), 0);
        assert!(map.readblock(0x0E, 3).is_err());
        assert!(map.clearblock(0x0E, 3).is_err());
    }

    #[test]
    fn test_cursor_bounds() {
        let mut map = MemoryMap::new(0x10);
        assert!(map.set_cursor(0x10).is_ok());
        assert!(map.fetch().is_err());
        assert!(map.set_cursor(0x11).is_err());
    }
}
