//! Stack handlers (PUSH, POP, PUSHF, POPF)

use crate::cpu::registers::Reg;
use crate::cpu::state::Cpu;
use crate::error::CpuError;

/// PUSH - push a register; operand 0 pushes the whole pushable set.
pub fn push(cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    let index = cpu.mem.fetch()?;
    if index == 0 {
        cpu.push_registers(&Reg::PUSHABLE)?;
    } else {
        let reg = Reg::from_index(index).ok_or(CpuError::InvalidRegister(index))?;
        let value = cpu.regs.get(reg);
        cpu.push_word(value)?;
    }
    Ok(false)
}

/// POP - pop into a register; operand 0 restores the whole pushable set.
pub fn pop(cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    let index = cpu.mem.fetch()?;
    if index == 0 {
        let mut order = Reg::PUSHABLE;
        order.reverse();
        cpu.pop_registers(&order)?;
    } else {
        let reg = Reg::from_index(index).ok_or(CpuError::InvalidRegister(index))?;
        let value = cpu.pop_word()?;
        cpu.regs.set(reg, value);
    }
    Ok(false)
}

/// PUSHF - push FLAGS.
pub fn pushf(cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    let flags = cpu.flags as u16;
    cpu.push_word(flags)?;
    Ok(false)
}

/// POPF - pop FLAGS.
pub fn popf(cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    cpu.flags = cpu.pop_word()? as u8;
    Ok(false)
}
