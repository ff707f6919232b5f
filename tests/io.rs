//! Device tests: port I/O, MMIO, lifecycle hooks

use std::sync::{Arc, RwLock};

use vm16::asm;
use vm16::cpu::{Cpu, Reg};
use vm16::device::Device;
use vm16::error::{CpuError, MemoryError};

/// Test device: collects OUT values, replays a canned IN sequence, counts
/// lifecycle calls, and exposes a small MMIO scratch area.
struct TestDevice {
    ports: Vec<u16>,
    io_address: Option<u8>,
    outputs: Arc<RwLock<Vec<u16>>>,
    inputs: Vec<u16>,
    cycles: Arc<RwLock<usize>>,
    started: Arc<RwLock<bool>>,
    stopped: Arc<RwLock<bool>>,
    cells: [u8; 0x200],
}

impl TestDevice {
    fn new(ports: Vec<u16>) -> Self {
        Self {
            ports,
            io_address: None,
            outputs: Arc::new(RwLock::new(Vec::new())),
            inputs: Vec::new(),
            cycles: Arc::new(RwLock::new(0)),
            started: Arc::new(RwLock::new(false)),
            stopped: Arc::new(RwLock::new(false)),
            cells: [0; 0x200],
        }
    }
}

impl Device for TestDevice {
    fn ports(&self) -> &[u16] {
        &self.ports
    }

    fn io_address(&self) -> Option<u8> {
        self.io_address
    }

    fn input(&mut self, _port: u16) -> Result<u16, CpuError> {
        Ok(self.inputs.remove(0))
    }

    fn output(&mut self, _port: u16, value: u16) -> Result<(), CpuError> {
        self.outputs.write().unwrap().push(value);
        Ok(())
    }

    fn start(&mut self) {
        *self.started.write().unwrap() = true;
    }

    fn cycle(&mut self) {
        *self.cycles.write().unwrap() += 1;
    }

    fn stop(&mut self) {
        *self.stopped.write().unwrap() = true;
    }

    fn mem_read(&mut self, addr: u16) -> Result<u8, MemoryError> {
        Ok(self.cells[addr as usize])
    }

    fn mem_write(&mut self, addr: u16, byte: u8) -> Result<(), MemoryError> {
        self.cells[addr as usize] = byte;
        Ok(())
    }
}

#[test]
fn test_out_reaches_device() {
    // mov ax, 0x41; out 8000, ax; hlt
    let mut cpu = Cpu::new();
    asm::assemble(&mut cpu.mem, "mov ax, h41\nout 8000, ax\nhlt").unwrap();
    let device = TestDevice::new(vec![8000]);
    let outputs = device.outputs.clone();
    cpu.add_device(Box::new(device)).unwrap();
    cpu.run(0, &[]).unwrap();
    assert_eq!(*outputs.read().unwrap(), vec![0x41]);
}

#[test]
fn test_in_reads_device() {
    let mut cpu = Cpu::new();
    asm::assemble(&mut cpu.mem, "in bx, 4000\nhlt").unwrap();
    let mut device = TestDevice::new(vec![4000]);
    device.inputs.push(0x5A);
    cpu.add_device(Box::new(device)).unwrap();
    cpu.run(0, &[]).unwrap();
    assert_eq!(cpu.regs.get(Reg::Bx), 0x5A);
}

#[test]
fn test_unmapped_port_is_a_no_op() {
    let mut cpu = Cpu::new();
    asm::assemble(
        &mut cpu.mem,
        "mov bx, h77\nout 1234, bx\nin bx, 1234\nhlt",
    )
    .unwrap();
    cpu.run(0, &[]).unwrap();
    // IN on a silent port leaves the register alone
    assert_eq!(cpu.regs.get(Reg::Bx), 0x77);
}

#[test]
fn test_lifecycle_hooks() {
    let mut cpu = Cpu::new();
    asm::assemble(&mut cpu.mem, "nop\nnop\nhlt").unwrap();
    let device = TestDevice::new(vec![9999]);
    let cycles = device.cycles.clone();
    let started = device.started.clone();
    let stopped = device.stopped.clone();
    cpu.add_device(Box::new(device)).unwrap();
    cpu.run(0, &[]).unwrap();
    assert!(*started.read().unwrap());
    assert!(*stopped.read().unwrap());
    // One cycle per instruction boundary: nop, nop, hlt
    assert_eq!(*cycles.read().unwrap(), 3);
}

#[test]
fn test_stop_hook_runs_on_error() {
    let mut cpu = Cpu::new();
    asm::assemble(&mut cpu.mem, "div ax, 0\nhlt").unwrap();
    let device = TestDevice::new(vec![9999]);
    let stopped = device.stopped.clone();
    cpu.add_device(Box::new(device)).unwrap();
    assert!(cpu.run(0, &[]).is_err());
    assert!(*stopped.read().unwrap());
}

#[test]
fn test_mmio_through_program() {
    // With DS pointing at the MMIO block, memory operands reach the device
    let mut cpu = Cpu::new();
    asm::assemble(
        &mut cpu.mem,
        "mov ax, h1234\nmov &h10, ax\nmov bx, &h10\nhlt",
    )
    .unwrap();
    let mut device = TestDevice::new(vec![]);
    device.io_address = Some(0);
    cpu.add_device(Box::new(device)).unwrap();
    cpu.set_register(Reg::Ds, 0xA000);
    cpu.run(0, &[Reg::Ds]).unwrap();
    assert_eq!(cpu.regs.get(Reg::Bx), 0x1234);
}

#[test]
fn test_mmio_direct_controller_access() {
    let mut cpu = Cpu::new();
    let mut device = TestDevice::new(vec![]);
    device.io_address = Some(0);
    cpu.add_device(Box::new(device)).unwrap();
    // 0xA000 decodes to the I/O block, sub-address 0
    cpu.mem.write(0xA000, 0xCD).unwrap();
    assert_eq!(cpu.mem.read(0xA000).unwrap(), 0xCD);
    // No device behind key 8
    assert!(matches!(
        cpu.mem.read(0xA800),
        Err(MemoryError::NoDevice { addr: 8 })
    ));
}
