//! Disassembler
//!
//! Turns an encoded range back into surface-language lines. Reads go
//! through the address-decoded data path, so the host can inspect any
//! mapped region regardless of the current bank or execute protection.
//!
//! Output is re-assemblable: feeding the lines back through the assembler
//! reproduces the same instruction stream (a byte memory reference folds
//! into the word form, and immediates re-encode at their natural width).

use crate::cpu::dispatch as op;
use crate::cpu::registers::Reg;
use crate::error::CpuError;
use crate::memory::MemoryController;

struct Reader<'a> {
    mem: &'a mut MemoryController,
    cursor: u32,
}

impl Reader<'_> {
    fn byte(&mut self) -> Result<u8, CpuError> {
        let byte = self.mem.read(self.cursor)?;
        self.cursor += 1;
        Ok(byte)
    }

    fn word(&mut self) -> Result<u16, CpuError> {
        let word = self.mem.read16(self.cursor)?;
        self.cursor += 2;
        Ok(word)
    }
}

fn hex(value: u32) -> String {
    format!("h{:x}", value)
}

fn reg_name(index: u16) -> String {
    match Reg::from_index(index as u8) {
        Some(reg) => reg.name().to_string(),
        None => hex(index as u32),
    }
}

/// Decode one typed-nibble operand into its surface form.
fn typed_operand(reader: &mut Reader<'_>) -> Result<String, CpuError> {
    let byte = reader.byte()?;
    let tag = byte >> 4;
    let nib = byte & 0xF;
    match tag {
        0 => Reg::from_index(nib)
            .map(|reg| reg.name().to_string())
            .ok_or(CpuError::InvalidRegister(nib)),
        1 => Ok(hex(nib as u32)),
        2 => {
            let ext = reader.byte()?;
            Ok(hex(nib as u32 | (ext as u32) << 4))
        }
        3 => {
            let ext = reader.word()?;
            Ok(hex(nib as u32 | (ext as u32) << 4))
        }
        4 | 5 => {
            let ext = reader.byte()?;
            Ok(format!("&{}", hex(nib as u32 | (ext as u32) << 4)))
        }
        _ => Err(CpuError::InvalidOperand { tag }),
    }
}

fn two_operand(reader: &mut Reader<'_>, mnemonic: &str) -> Result<String, CpuError> {
    let src = typed_operand(reader)?;
    let dst = typed_operand(reader)?;
    Ok(format!("{} {}, {}", mnemonic, dst, src))
}

/// Disassemble the instructions encoded in `[start, end)`.
pub fn disassemble(
    mem: &mut MemoryController,
    start: u32,
    end: u32,
) -> Result<Vec<String>, CpuError> {
    let mut reader = Reader { mem, cursor: start };
    let mut lines = Vec::new();
    while reader.cursor < end {
        let opcode = reader.byte()?;
        let line = match opcode {
            op::NOP => "nop".to_string(),
            op::PUSHF => "pushf".to_string(),
            op::POPF => "popf".to_string(),
            op::RET => "ret".to_string(),
            op::HLT => {
                let exit_code = reader.byte()?;
                if exit_code == 0 {
                    "hlt".to_string()
                } else {
                    format!("hlt {}", hex(exit_code as u32))
                }
            }
            op::INT => {
                let vector = reader.byte()?;
                if vector == 0 {
                    "int".to_string()
                } else {
                    format!("int {}", hex(vector as u32))
                }
            }
            op::PUSH | op::POP => {
                let mnemonic = if opcode == op::PUSH { "push" } else { "pop" };
                let index = reader.byte()?;
                if index == 0 {
                    mnemonic.to_string()
                } else {
                    format!("{} {}", mnemonic, reg_name(index as u16))
                }
            }
            op::INC | op::DEC => {
                let mnemonic = if opcode == op::INC { "inc" } else { "dec" };
                let index = reader.byte()?;
                format!("{} {}", mnemonic, reg_name(index as u16))
            }
            op::JMP | op::CALL | op::JE | op::JNE => {
                let mnemonic = match opcode {
                    op::JMP => "jmp",
                    op::CALL => "call",
                    op::JE => "je",
                    _ => "jne",
                };
                let target = reader.word()?;
                format!("{} {}", mnemonic, hex(target as u32))
            }
            op::IN => {
                let index = reader.word()?;
                let port = reader.word()?;
                format!("in {}, {}", reg_name(index), hex(port as u32))
            }
            op::OUT => {
                let port = reader.word()?;
                let index = reader.word()?;
                format!("out {}, {}", hex(port as u32), reg_name(index))
            }
            op::MOV => two_operand(&mut reader, "mov")?,
            op::ADD => two_operand(&mut reader, "add")?,
            op::SUB => two_operand(&mut reader, "sub")?,
            op::TEST => two_operand(&mut reader, "test")?,
            op::CMP => two_operand(&mut reader, "cmp")?,
            op::MUL => two_operand(&mut reader, "mul")?,
            op::DIV => two_operand(&mut reader, "div")?,
            op::AND => two_operand(&mut reader, "and")?,
            op::OR => two_operand(&mut reader, "or")?,
            op::XOR => two_operand(&mut reader, "xor")?,
            op::NOT => two_operand(&mut reader, "not")?,
            _ => return Err(CpuError::InvalidOpcode { opcode }),
        };
        lines.push(line);
    }
    Ok(lines)
}
