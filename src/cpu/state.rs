//! CPU state and the fetch-decode-dispatch loop
//!
//! The `Cpu` owns the register file, FLAGS, and the memory controller
//! (devices live inside the controller's I/O map). One instruction is:
//!
//! 1. Point the banked fetch cursor at CS + IP.
//! 2. Stop if the breakpoint matches the current linear address.
//! 3. Run every device's `cycle` hook.
//! 4. Fetch the opcode byte and dispatch it.
//! 5. If the handler did not write IP itself, set `IP = cursor - CS`.
//!
//! Interrupts are synchronous: they only arise from the INT opcode, and
//! handlers return through INT 0 (or RET), which pops IP and CS.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::{debug, trace};

use crate::cpu::dispatch::{dispatch_table, OpcodeHandler};
use crate::cpu::registers::{Reg, Registers};
use crate::device::Device;
use crate::error::{CpuError, MemoryError};
use crate::memory::{MemoryController, MMIO_BLOCK};
use crate::unit::Unit;

/// FLAGS bit 0: zero/equal.
pub const ZF: u32 = 0;

/// The CPU core.
pub struct Cpu {
    /// Register file.
    pub regs: Registers,
    /// 8-bit FLAGS register. The core only ever writes bit 0 (ZF).
    pub flags: u8,
    /// Memory controller; also reachable by the assembler.
    pub mem: MemoryController,
    /// Offset of the 256-entry interrupt table (`len(memory) - 512`).
    int_table: u32,
    dispatch: [OpcodeHandler; 256],
    breakpoint: Option<u32>,
    pub(crate) running: bool,
    pub(crate) exit_code: u8,
}

impl Cpu {
    /// Build the default machine: data maps on every even block, the I/O
    /// map on block 0xA, interrupt table at the top of memory.
    pub fn new() -> Self {
        let mem = MemoryController::default_machine();
        let int_table = mem.len() as u32 - 512;
        Self {
            regs: Registers::new(),
            flags: 0,
            mem,
            int_table,
            dispatch: dispatch_table(),
            breakpoint: None,
            running: true,
            exit_code: 0,
        }
    }

    // === Host interface ===

    /// Set a register from the host.
    pub fn set_register(&mut self, reg: Reg, value: u16) {
        self.regs.set(reg, value);
    }

    /// Zero every register not named in `persistent`.
    pub fn clear_registers(&mut self, persistent: &[Reg]) {
        self.regs.clear(persistent);
    }

    /// Register a device: its ports join the port table and, if it claims
    /// an I/O address, its MMIO window joins the I/O block.
    pub fn add_device(&mut self, device: Box<dyn Device>) -> Result<(), CpuError> {
        let io = self
            .mem
            .io_mut()
            .ok_or(MemoryError::Unmapped { block: MMIO_BLOCK })?;
        io.add_device(device);
        Ok(())
    }

    /// Halt the run loop when fetch reaches this linear address.
    pub fn set_breakpoint(&mut self, addr: u32) {
        self.breakpoint = Some(addr);
    }

    pub fn clear_breakpoint(&mut self) {
        self.breakpoint = None;
    }

    /// Whether the run loop would keep going.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Base offset of the interrupt table.
    pub fn int_table(&self) -> u32 {
        self.int_table
    }

    // === FLAGS ===

    #[inline(always)]
    pub fn zf(&self) -> bool {
        self.flags.bit(ZF)
    }

    #[inline(always)]
    pub fn set_zf(&mut self, value: bool) {
        self.flags = self.flags.with_bit(ZF, value);
    }

    // === Addressing ===

    /// Linear address of `seg:offset`. A segment is a plain 16-bit base;
    /// the sum wraps at 16 bits like every register operation.
    #[inline(always)]
    pub fn linear(&self, seg: Reg, offset: u16) -> u32 {
        self.regs.get(seg).wrapping_add(offset) as u32
    }

    // === Stack ===

    /// Push one word: write at SS+SP, then SP += 2.
    pub fn push_word(&mut self, value: u16) -> Result<(), CpuError> {
        let sp = self.regs.get(Reg::Sp);
        let addr = self.linear(Reg::Ss, sp);
        self.mem.write16(addr, value)?;
        self.regs.set(Reg::Sp, sp.wrapping_add(2));
        Ok(())
    }

    /// Pop one word: SP -= 2, then read at SS+SP.
    pub fn pop_word(&mut self) -> Result<u16, CpuError> {
        let sp = self.regs.get(Reg::Sp);
        if sp < 2 {
            return Err(CpuError::StackUnderflow);
        }
        let sp = sp - 2;
        self.regs.set(Reg::Sp, sp);
        let addr = self.linear(Reg::Ss, sp);
        Ok(self.mem.read16(addr)?)
    }

    /// Push a register list in order.
    pub fn push_registers(&mut self, regs: &[Reg]) -> Result<(), CpuError> {
        for &reg in regs {
            let value = self.regs.get(reg);
            self.push_word(value)?;
        }
        Ok(())
    }

    /// Pop into a register list in order.
    pub fn pop_registers(&mut self, regs: &[Reg]) -> Result<(), CpuError> {
        for &reg in regs {
            let value = self.pop_word()?;
            self.regs.set(reg, value);
        }
        Ok(())
    }

    // === Interrupts ===

    /// Enter the handler for `vector`: stash the return CS:IP on the
    /// stack, then continue at the table entry's segment with IP = 0.
    pub fn enter_interrupt(&mut self, vector: u8) -> Result<(), CpuError> {
        let cs = self.regs.get(Reg::Cs);
        let ip = (self.mem.cursor()? as u16).wrapping_sub(cs);
        self.regs.set(Reg::Ip, ip);
        let entry = self.mem.read16(self.int_table + vector as u32 * 2)?;
        if entry == 0 {
            return Err(CpuError::InvalidInterrupt { vector });
        }
        debug!(vector, entry, "interrupt dispatch");
        self.push_registers(&[Reg::Cs, Reg::Ip])?;
        self.regs.set(Reg::Cs, entry);
        self.regs.set(Reg::Ip, 0);
        Ok(())
    }

    /// Return from an interrupt or call: pop IP, then CS.
    pub fn leave_interrupt(&mut self) -> Result<(), CpuError> {
        self.pop_registers(&[Reg::Ip, Reg::Cs])
    }

    // === Execution ===

    /// Move the banked fetch cursor to `target` within CS.
    pub(crate) fn jump_to(&mut self, target: u16) -> Result<(), CpuError> {
        let cs = self.regs.get(Reg::Cs);
        Ok(self.mem.set_cursor(cs.wrapping_add(target) as u32)?)
    }

    /// Execute a single instruction at CS:IP.
    pub fn step(&mut self) -> Result<(), CpuError> {
        let cs = self.regs.get(Reg::Cs);
        let ip = self.regs.get(Reg::Ip);
        self.mem.set_cursor(cs.wrapping_add(ip) as u32)?;

        let opcode = self.mem.fetch()?;
        trace!(opcode, cs, ip, "dispatch");
        let handler = self.dispatch[opcode as usize];
        let wrote_ip = handler(self, opcode)?;
        if !wrote_ip {
            // CS is re-read: a handler may have replaced it (bulk POP).
            let cs = self.regs.get(Reg::Cs);
            let ip = (self.mem.cursor()? as u16).wrapping_sub(cs);
            self.regs.set(Reg::Ip, ip);
        }
        Ok(())
    }

    /// Run from `cs` until HLT, a breakpoint, or an error.
    ///
    /// Registers outside `persistent` are cleared first (hosts typically
    /// persist DS, SS, and SP to pre-stage arguments on the stack).
    /// Device `stop` hooks run however the loop ends. Returns the HLT
    /// exit code.
    pub fn run(&mut self, cs: u16, persistent: &[Reg]) -> Result<u8, CpuError> {
        self.regs.clear(persistent);
        self.regs.set(Reg::Cs, cs);
        self.running = true;
        self.exit_code = 0;

        if let Some(io) = self.mem.io_mut() {
            io.start_all();
        }
        let result = self.run_loop();
        if let Some(io) = self.mem.io_mut() {
            io.stop_all();
        }
        result.map(|_| self.exit_code)
    }

    fn run_loop(&mut self) -> Result<(), CpuError> {
        while self.running {
            let pc = self
                .regs
                .get(Reg::Cs)
                .wrapping_add(self.regs.get(Reg::Ip)) as u32;
            if self.breakpoint == Some(pc) {
                debug!(pc, "breakpoint hit");
                break;
            }
            if let Some(io) = self.mem.io_mut() {
                io.cycle_all();
            }
            self.step()?;
        }
        Ok(())
    }

    // === Program images ===

    /// Write a flat image into memory at `dest`.
    pub fn load_image(&mut self, image: &[u8], dest: u32) -> Result<(), MemoryError> {
        debug!(dest, len = image.len(), "image loaded");
        self.mem.writeblock(dest, image)
    }

    /// Read `len` bytes of memory starting at `src`.
    pub fn save_image(&mut self, src: u32, len: usize) -> Result<Vec<u8>, MemoryError> {
        self.mem.readblock(src, len)
    }

    /// Load an image file, optionally zlib-compressed, into memory.
    pub fn load_image_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        dest: u32,
        compressed: bool,
    ) -> Result<(), CpuError> {
        let mut raw = Vec::new();
        File::open(path)?.read_to_end(&mut raw)?;
        let image = if compressed {
            let mut out = Vec::new();
            ZlibDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
            out
        } else {
            raw
        };
        Ok(self.load_image(&image, dest)?)
    }

    /// Save a region of memory to an image file, optionally compressed.
    pub fn save_image_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        src: u32,
        len: usize,
        compress: bool,
    ) -> Result<(), CpuError> {
        let image = self.save_image(src, len)?;
        let mut file = File::create(path)?;
        if compress {
            let mut encoder = ZlibEncoder::new(&mut file, Compression::default());
            encoder.write_all(&image)?;
            encoder.finish()?;
        } else {
            file.write_all(&image)?;
        }
        Ok(())
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_round_trip() {
        let mut cpu = Cpu::new();
        cpu.regs.set(Reg::Ss, 0x2000);
        cpu.push_word(0x1234).unwrap();
        cpu.push_word(0x5678).unwrap();
        assert_eq!(cpu.regs.get(Reg::Sp), 4);
        assert_eq!(cpu.pop_word().unwrap(), 0x5678);
        assert_eq!(cpu.pop_word().unwrap(), 0x1234);
        assert_eq!(cpu.regs.get(Reg::Sp), 0);
    }

    #[test]
    fn test_stack_underflow() {
        let mut cpu = Cpu::new();
        cpu.regs.set(Reg::Ss, 0x2000);
        assert!(matches!(cpu.pop_word(), Err(CpuError::StackUnderflow)));
    }

    #[test]
    fn test_int_table_location() {
        let cpu = Cpu::new();
        assert_eq!(cpu.int_table(), 0xFE00);
    }
}
