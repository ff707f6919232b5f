//! Control flow handlers (NOP, JMP, Jcc, CALL, INT, RET, HLT)

use crate::cpu::dispatch::JE;
use crate::cpu::registers::Reg;
use crate::cpu::state::Cpu;
use crate::error::CpuError;

/// NOP - no effect.
pub fn nop(_cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    Ok(false)
}

/// JMP addr - continue at `addr` within CS.
///
/// The handler only moves the fetch cursor; the core's IP update after
/// dispatch turns the cursor position back into the new IP.
pub fn jmp(cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    let target = cpu.mem.fetch16()?;
    cpu.jump_to(target)?;
    Ok(false)
}

/// JE/JNE addr - conditional jump on ZF.
pub fn jump_conditional(cpu: &mut Cpu, opcode: u8) -> Result<bool, CpuError> {
    let target = cpu.mem.fetch16()?;
    let want = opcode == JE;
    if cpu.zf() == want {
        cpu.jump_to(target)?;
    }
    Ok(false)
}

/// CALL addr - push CS and the return IP, continue at `addr` within CS.
pub fn call(cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    let target = cpu.mem.fetch16()?;
    let cs = cpu.regs.get(Reg::Cs);
    let return_ip = (cpu.mem.cursor()? as u16).wrapping_sub(cs);
    cpu.regs.set(Reg::Ip, return_ip);
    cpu.push_registers(&[Reg::Cs, Reg::Ip])?;
    cpu.jump_to(target)?;
    Ok(false)
}

/// INT i - dispatch through the interrupt table; INT 0 returns instead.
pub fn int(cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    let vector = cpu.mem.fetch()?;
    if vector == 0 {
        cpu.leave_interrupt()?;
    } else {
        cpu.enter_interrupt(vector)?;
    }
    Ok(true)
}

/// RET - pop IP and CS (return from CALL or interrupt).
pub fn ret(cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    cpu.leave_interrupt()?;
    Ok(true)
}

/// HLT - stop the run loop.
///
/// The exit code is the byte following the opcode; when no byte can be
/// fetched it defaults to 0.
pub fn hlt(cpu: &mut Cpu, _opcode: u8) -> Result<bool, CpuError> {
    cpu.exit_code = cpu.mem.fetch().unwrap_or(0);
    cpu.running = false;
    Ok(true)
}
