//! Arithmetic handlers (ADD, SUB, MUL, DIV, INC, DEC, CMP, TEST)

use crate::cpu::dispatch::{ADD, DEC, DIV, INC, MUL, SUB};
use crate::cpu::operand::DestMask;
use crate::cpu::registers::Reg;
use crate::cpu::state::Cpu;
use crate::error::CpuError;

/// ADD/SUB/MUL/DIV - combine the source into a register destination.
///
/// All results wrap at 16 bits. DIV with a zero source fails.
pub fn binary_op(cpu: &mut Cpu, opcode: u8) -> Result<bool, CpuError> {
    let src = cpu.fetch_operand()?;
    let src = cpu.resolve(src)?;
    let dst = cpu.fetch_operand()?;
    let current = cpu.resolve(dst)?;
    let result = match opcode {
        ADD => current.wrapping_add(src),
        SUB => current.wrapping_sub(src),
        MUL => current.wrapping_mul(src),
        DIV => {
            if src == 0 {
                return Err(CpuError::DivideByZero);
            }
            current / src
        }
        _ => return Err(CpuError::InvalidOpcode { opcode }),
    };
    cpu.set_value(dst, result, DestMask::REGISTER)?;
    Ok(false)
}

/// INC/DEC reg - step a register by one. IP is not a legal operand.
pub fn step_register(cpu: &mut Cpu, opcode: u8) -> Result<bool, CpuError> {
    let index = cpu.mem.fetch()?;
    let reg = Reg::from_index(index).ok_or(CpuError::InvalidRegister(index))?;
    if reg == Reg::Ip {
        return Err(CpuError::IpOperand);
    }
    let value = cpu.regs.get(reg);
    let value = if opcode == INC {
        value.wrapping_add(1)
    } else if opcode == DEC {
        value.wrapping_sub(1)
    } else {
        return Err(CpuError::InvalidOpcode { opcode });
    };
    cpu.regs.set(reg, value);
    Ok(false)
}

/// CMP/TEST a, b - set ZF to whether the operands are equal.
pub fn compare(cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    let a = cpu.fetch_operand()?;
    let a = cpu.resolve(a)?;
    let b = cpu.fetch_operand()?;
    let b = cpu.resolve(b)?;
    cpu.set_zf(a == b);
    Ok(false)
}
