//! Port I/O handlers (IN, OUT)
//!
//! Both instructions carry two raw little-endian words. A port nobody
//! answers on is skipped silently.

use crate::cpu::registers::Reg;
use crate::cpu::state::Cpu;
use crate::error::CpuError;

/// A register-index word must name a real register, not just truncate.
fn decode_register(index: u16) -> Result<Reg, CpuError> {
    u8::try_from(index)
        .ok()
        .and_then(Reg::from_index)
        .ok_or(CpuError::InvalidRegister(index as u8))
}

/// IN reg, port - read a value from a device port into a register.
///
/// Wire order: register-index word, then port word.
pub fn in_port(cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    let index = cpu.mem.fetch16()?;
    let port = cpu.mem.fetch16()?;
    let reg = decode_register(index)?;
    let io = match cpu.mem.io_mut() {
        Some(io) => io,
        None => return Ok(false),
    };
    if let Some(value) = io.input(port)? {
        cpu.regs.set(reg, value);
    }
    Ok(false)
}

/// OUT port, reg - hand a register value to a device port.
///
/// Wire order: port word, then register-index word.
pub fn out_port(cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    let port = cpu.mem.fetch16()?;
    let index = cpu.mem.fetch16()?;
    let reg = decode_register(index)?;
    let value = cpu.regs.get(reg);
    if let Some(io) = cpu.mem.io_mut() {
        io.output(port, value)?;
    }
    Ok(false)
}
