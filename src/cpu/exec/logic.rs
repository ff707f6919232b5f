//! Bitwise handlers (AND, OR, XOR, NOT)

use crate::cpu::dispatch::{AND, NOT, OR, XOR};
use crate::cpu::operand::DestMask;
use crate::cpu::state::Cpu;
use crate::error::CpuError;

/// AND/OR/XOR/NOT - combine the source into a register destination.
///
/// NOT is destructive mask-out: `dst = dst & !src`.
pub fn binary_op(cpu: &mut Cpu, opcode: u8) -> Result<bool, CpuError> {
    let src = cpu.fetch_operand()?;
    let src = cpu.resolve(src)?;
    let dst = cpu.fetch_operand()?;
    let current = cpu.resolve(dst)?;
    let result = match opcode {
        AND => current & src,
        OR => current | src,
        XOR => current ^ src,
        NOT => current & !src,
        _ => return Err(CpuError::InvalidOpcode { opcode }),
    };
    cpu.set_value(dst, result, DestMask::REGISTER)?;
    Ok(false)
}
