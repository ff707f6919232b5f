//! File-backed storage device
//!
//! A fixed-size byte store persisted to a host file, exposed to programs
//! as an MMIO window: all access goes through device opcodes, never a raw
//! file handle. The backing file is created when absent, reloaded when a
//! run starts, and flushed when it stops.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{CpuError, MemoryError};

/// Persistent storage mapped into the I/O block.
pub struct Storage {
    path: PathBuf,
    data: Vec<u8>,
    io_address: u8,
}

impl Storage {
    /// Open or create the backing file, fixed at `size` bytes, mapped at
    /// `io_address` within the MMIO block.
    pub fn create(path: impl Into<PathBuf>, size: usize, io_address: u8) -> io::Result<Self> {
        let path = path.into();
        let mut data = match fs::read(&path) {
            Ok(existing) => existing,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err),
        };
        data.resize(size, 0);
        fs::write(&path, &data)?;
        debug!(path = %path.display(), size, "storage attached");
        Ok(Self {
            path,
            data,
            io_address,
        })
    }

    /// Size of the store in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn flush(&self) -> io::Result<()> {
        fs::write(&self.path, &self.data)
    }
}

impl Device for Storage {
    fn ports(&self) -> &[u16] {
        &[]
    }

    fn io_address(&self) -> Option<u8> {
        Some(self.io_address)
    }

    fn input(&mut self, port: u16) -> Result<u16, CpuError> {
        Err(CpuError::Device(format!("storage has no port {port}")))
    }

    fn output(&mut self, port: u16, _value: u16) -> Result<(), CpuError> {
        Err(CpuError::Device(format!("storage has no port {port}")))
    }

    fn start(&mut self) {
        let size = self.data.len();
        match fs::read(&self.path) {
            Ok(mut fresh) => {
                fresh.resize(size, 0);
                self.data = fresh;
            }
            Err(err) => warn!(path = %self.path.display(), %err, "storage reload failed"),
        }
    }

    fn stop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(path = %self.path.display(), %err, "storage flush failed");
        }
    }

    fn mem_read(&mut self, addr: u16) -> Result<u8, MemoryError> {
        self.data
            .get(addr as usize)
            .copied()
            .ok_or(MemoryError::Bounds { addr: addr as u32 })
    }

    fn mem_write(&mut self, addr: u16, byte: u8) -> Result<(), MemoryError> {
        match self.data.get_mut(addr as usize) {
            Some(cell) => {
                *cell = byte;
                Ok(())
            }
            None => Err(MemoryError::Bounds { addr: addr as u32 }),
        }
    }
}
