//! Data transfer handlers (MOV)

use crate::cpu::operand::DestMask;
use crate::cpu::state::Cpu;
use crate::error::CpuError;

/// MOV - move the source value into a register or memory destination.
///
/// Wire order is source operand first, then destination.
pub fn mov(cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    let src = cpu.fetch_operand()?;
    let value = cpu.resolve(src)?;
    let dst = cpu.fetch_operand()?;
    cpu.set_value(dst, value, DestMask::ANY)?;
    Ok(false)
}
