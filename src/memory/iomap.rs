//! Memory-mapped I/O
//!
//! The `IoMap` owns every registered device and answers two kinds of
//! traffic: port I/O from the IN/OUT instructions, and byte reads/writes
//! decoded out of the MMIO block by the memory controller. Within the
//! block, the device key is the offset's high bits (`offset >> 8`) and the
//! device sees the 9-bit sub-address (`offset & 0x1FF`).
//!
//! Bulk block operations never reach devices; I/O is not bulk-copyable.

use std::collections::HashMap;

use tracing::debug;

use crate::device::Device;
use crate::error::{Access, CpuError, MemoryError};

/// Bits of the MMIO offset that select the device.
const DEVICE_SHIFT: u32 = 8;
/// Mask applied to the offset before it is handed to the device.
const SUB_ADDRESS_MASK: u32 = 0x1FF;

/// Decodes MMIO sub-addresses and port numbers to registered devices.
pub struct IoMap {
    devices: Vec<Box<dyn Device>>,
    ports: HashMap<u16, usize>,
    regions: HashMap<u8, usize>,
}

impl IoMap {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            ports: HashMap::new(),
            regions: HashMap::new(),
        }
    }

    /// Register a device, claiming its ports and its MMIO address if any.
    pub fn add_device(&mut self, device: Box<dyn Device>) {
        let index = self.devices.len();
        for &port in device.ports() {
            self.ports.insert(port, index);
        }
        if let Some(io_address) = device.io_address() {
            debug!(io_address, "device mapped into I/O block");
            self.regions.insert(io_address, index);
        }
        self.devices.push(device);
    }

    /// Number of registered devices.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    // === Port I/O ===

    /// Ask the device on `port` for a value. `None` when no device claims
    /// the port; IN is a no-op there.
    pub fn input(&mut self, port: u16) -> Result<Option<u16>, CpuError> {
        match self.ports.get(&port) {
            Some(&index) => self.devices[index].input(port).map(Some),
            None => Ok(None),
        }
    }

    /// Hand `value` to the device on `port`. Silently dropped when no
    /// device claims the port.
    pub fn output(&mut self, port: u16, value: u16) -> Result<(), CpuError> {
        match self.ports.get(&port) {
            Some(&index) => self.devices[index].output(port, value),
            None => Ok(()),
        }
    }

    // === Lifecycle ===

    pub fn start_all(&mut self) {
        for device in &mut self.devices {
            device.start();
        }
    }

    pub fn cycle_all(&mut self) {
        for device in &mut self.devices {
            device.cycle();
        }
    }

    pub fn stop_all(&mut self) {
        for device in &mut self.devices {
            device.stop();
        }
    }

    // === MMIO ===

    fn device_at(&mut self, offset: u32) -> Result<(&mut Box<dyn Device>, u16), MemoryError> {
        let key = (offset >> DEVICE_SHIFT) as u8;
        let sub = (offset & SUB_ADDRESS_MASK) as u16;
        let index = *self
            .regions
            .get(&key)
            .ok_or(MemoryError::NoDevice { addr: key })?;
        Ok((&mut self.devices[index], sub))
    }

    /// Read one byte through the device mapped at `offset`.
    pub fn read(&mut self, offset: u32) -> Result<u8, MemoryError> {
        let (device, sub) = self.device_at(offset)?;
        device.mem_read(sub)
    }

    /// Write one byte through the device mapped at `offset`.
    pub fn write(&mut self, offset: u32, byte: u8) -> Result<(), MemoryError> {
        let (device, sub) = self.device_at(offset)?;
        device.mem_write(sub, byte)
    }

    /// Block reads are not supported on I/O space.
    pub fn readblock(&self, addr: u32, _size: usize) -> Result<Vec<u8>, MemoryError> {
        Err(MemoryError::Protection {
            access: Access::Read,
            addr,
        })
    }

    /// Block writes are not supported on I/O space.
    pub fn writeblock(&mut self, addr: u32, _block: &[u8]) -> Result<(), MemoryError> {
        Err(MemoryError::Protection {
            access: Access::Write,
            addr,
        })
    }

    /// Block clears are not supported on I/O space.
    pub fn clearblock(&mut self, addr: u32, _size: usize) -> Result<(), MemoryError> {
        Err(MemoryError::Protection {
            access: Access::Write,
            addr,
        })
    }
}

impl Default for IoMap {
    fn default() -> Self {
        Self::new()
    }
}
