//! The bytecode assembler
//!
//! Line-oriented translator from the mnemonic surface language to encoded
//! bytes, written straight into a memory controller so a machine can be
//! constructed, fed source, and run without an intermediate file.
//!
//! Each line is `[address] mnemonic [operand[,operand]]`. A leading
//! integer relocates the write cursor, `label NAME` binds a label (with a
//! `!` prefix it also starts a new code segment), `data "text"` emits a
//! zero-terminated string, `set N` emits one raw byte, and a line holding
//! only `.` terminates input. Integers are decimal or `h`-prefixed hex.
//!
//! Mnemonics fall into four encoding families mirroring the opcode set:
//! zero-operand, single-byte-operand, raw-word-operand (jumps and ports),
//! and the typed two-operand family whose operands use the typed-nibble
//! layout of [`crate::cpu::operand`]. Surface order for the two-operand
//! family is `op DST, SRC`; the wire carries the source operand first.

pub mod disasm;

use std::collections::HashMap;

use thiserror::Error;

use crate::cpu::dispatch as op;
use crate::cpu::registers::Reg;
use crate::error::MemoryError;
use crate::memory::MemoryController;

/// Errors raised while assembling source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    #[error("unknown mnemonic '{0}'")]
    UnknownMnemonic(String),

    #[error("malformed operand '{0}'")]
    MalformedOperand(String),

    #[error("'{0}' takes a different number of operands")]
    OperandCount(String),

    #[error("'{0}' requires a register destination")]
    InvalidDestination(String),

    #[error("literal {0:#x} does not fit any operand width")]
    LiteralOutOfRange(u32),

    #[error("label '{0}' was referenced but never bound")]
    UnresolvedLabel(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// How a pending label reference was encoded, so binding can patch it.
#[derive(Debug, Clone, Copy)]
enum FixupKind {
    /// A raw little-endian word (jump family).
    Word,
    /// A 3-byte tag-3 immediate (typed two-operand family).
    Typed,
}

#[derive(Debug, Clone, Copy)]
struct Fixup {
    addr: u32,
    kind: FixupKind,
}

#[derive(Debug, Default)]
struct Label {
    bound: Option<u16>,
    fixups: Vec<Fixup>,
}

/// A parsed surface operand of the typed two-operand family.
enum AsmOperand {
    Reg(Reg),
    Imm(u32),
    Mem(u32),
    Label(String),
}

/// The assembler. Borrows the controller it emits into.
pub struct Assembler<'a> {
    mem: &'a mut MemoryController,
    cursor: u32,
    cseg: u32,
    labels: HashMap<String, Label>,
}

/// Assemble `source` into `mem` from offset 0 and return the end cursor.
pub fn assemble(mem: &mut MemoryController, source: &str) -> Result<u32, AsmError> {
    let mut asm = Assembler::new(mem);
    asm.assemble(source)?;
    Ok(asm.cursor())
}

impl<'a> Assembler<'a> {
    pub fn new(mem: &'a mut MemoryController) -> Self {
        Self {
            mem,
            cursor: 0,
            cseg: 0,
            labels: HashMap::new(),
        }
    }

    /// The write cursor (next emit address).
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Relocate the write cursor.
    pub fn set_cursor(&mut self, addr: u32) {
        self.cursor = addr;
    }

    /// Assemble a whole source text, then check for unresolved labels.
    ///
    /// A line holding only `.` ends the input early.
    pub fn assemble(&mut self, source: &str) -> Result<(), AsmError> {
        for line in source.lines() {
            if line.trim() == "." {
                break;
            }
            self.line(line)?;
        }
        self.finish()
    }

    /// Assemble a single statement line.
    pub fn line(&mut self, line: &str) -> Result<(), AsmError> {
        let mut rest = line.trim();
        if rest.is_empty() {
            return Ok(());
        }

        // A leading integer relocates the write cursor.
        let (first, tail) = split_first(rest);
        if let Some(addr) = parse_int(first) {
            self.cursor = addr;
            rest = tail;
            if rest.is_empty() {
                return Ok(());
            }
        }

        let (mnemonic, operand_field) = split_first(rest);
        let mnemonic = mnemonic.to_ascii_lowercase();
        match mnemonic.as_str() {
            "label" => self.bind_label(operand_field.trim()),
            "data" => self.emit_data(operand_field),
            "set" => {
                let value = parse_int(operand_field.trim())
                    .ok_or_else(|| AsmError::MalformedOperand(operand_field.trim().to_string()))?;
                if value > 0xFF {
                    return Err(AsmError::LiteralOutOfRange(value));
                }
                self.emit(value as u8)
            }
            _ => {
                let operands: Vec<String> = if operand_field.trim().is_empty() {
                    Vec::new()
                } else {
                    operand_field
                        .split(',')
                        .map(|part| part.trim().to_string())
                        .collect()
                };
                self.instruction(&mnemonic, &operands)
            }
        }
    }

    /// Report any label that was referenced but never bound.
    pub fn finish(&self) -> Result<(), AsmError> {
        let mut unbound: Vec<&String> = self
            .labels
            .iter()
            .filter(|(_, label)| label.bound.is_none() && !label.fixups.is_empty())
            .map(|(name, _)| name)
            .collect();
        unbound.sort();
        match unbound.first() {
            Some(name) => Err(AsmError::UnresolvedLabel((*name).clone())),
            None => Ok(()),
        }
    }

    // === Encoding families ===

    fn instruction(&mut self, mnemonic: &str, operands: &[String]) -> Result<(), AsmError> {
        match mnemonic {
            "nop" => self.emit(op::NOP),
            "pushf" => self.emit(op::PUSHF),
            "popf" => self.emit(op::POPF),
            "ret" => self.emit(op::RET),
            "hlt" => {
                self.emit(op::HLT)?;
                let exit_code = match operands.first() {
                    Some(operand) => {
                        let value = parse_int(operand)
                            .ok_or_else(|| AsmError::MalformedOperand(operand.clone()))?;
                        if value > 0xFF {
                            return Err(AsmError::LiteralOutOfRange(value));
                        }
                        value as u8
                    }
                    None => 0,
                };
                self.emit(exit_code)
            }
            "int" => self.byte_operand(op::INT, mnemonic, operands, 0),
            "push" => self.byte_operand(op::PUSH, mnemonic, operands, 0),
            "pop" => self.byte_operand(op::POP, mnemonic, operands, 0),
            "inc" => self.byte_operand(op::INC, mnemonic, operands, Reg::Cx.index()),
            "dec" => self.byte_operand(op::DEC, mnemonic, operands, Reg::Cx.index()),
            "jmp" => self.word_operand(op::JMP, mnemonic, operands),
            "call" => self.word_operand(op::CALL, mnemonic, operands),
            "je" => self.word_operand(op::JE, mnemonic, operands),
            "jne" => self.word_operand(op::JNE, mnemonic, operands),
            "in" => self.port_operands(op::IN, mnemonic, operands),
            "out" => self.port_operands(op::OUT, mnemonic, operands),
            "mov" => self.two_operand(op::MOV, mnemonic, operands),
            "add" => self.two_operand(op::ADD, mnemonic, operands),
            "sub" => self.two_operand(op::SUB, mnemonic, operands),
            "test" => self.two_operand(op::TEST, mnemonic, operands),
            "cmp" => self.two_operand(op::CMP, mnemonic, operands),
            "mul" => self.two_operand(op::MUL, mnemonic, operands),
            "div" => self.two_operand(op::DIV, mnemonic, operands),
            "and" => self.two_operand(op::AND, mnemonic, operands),
            "or" => self.two_operand(op::OR, mnemonic, operands),
            "xor" => self.two_operand(op::XOR, mnemonic, operands),
            "not" => self.two_operand(op::NOT, mnemonic, operands),
            _ => Err(AsmError::UnknownMnemonic(mnemonic.to_string())),
        }
    }

    /// Opcode plus one 8-bit operand (register name or integer), with a
    /// per-mnemonic default when the operand is omitted.
    fn byte_operand(
        &mut self,
        opcode: u8,
        mnemonic: &str,
        operands: &[String],
        default: u8,
    ) -> Result<(), AsmError> {
        if operands.len() > 1 {
            return Err(AsmError::OperandCount(mnemonic.to_string()));
        }
        let value = match operands.first() {
            Some(operand) => {
                let value = self.reg_or_int(operand)?;
                if value > 0xFF {
                    return Err(AsmError::LiteralOutOfRange(value));
                }
                value as u8
            }
            None => default,
        };
        self.emit(opcode)?;
        self.emit(value)
    }

    /// Opcode plus one raw little-endian word (literal or `*label`).
    fn word_operand(
        &mut self,
        opcode: u8,
        mnemonic: &str,
        operands: &[String],
    ) -> Result<(), AsmError> {
        if operands.len() != 1 {
            return Err(AsmError::OperandCount(mnemonic.to_string()));
        }
        self.emit(opcode)?;
        let operand = &operands[0];
        if let Some(name) = operand.strip_prefix('*') {
            let value = self.reference_label(name, FixupKind::Word);
            self.emit16(value)
        } else {
            let value =
                parse_int(operand).ok_or_else(|| AsmError::MalformedOperand(operand.clone()))?;
            if value > 0xFFFF {
                return Err(AsmError::LiteralOutOfRange(value));
            }
            self.emit16(value as u16)
        }
    }

    /// IN/OUT: opcode plus two raw words in surface order.
    fn port_operands(
        &mut self,
        opcode: u8,
        mnemonic: &str,
        operands: &[String],
    ) -> Result<(), AsmError> {
        if operands.len() != 2 {
            return Err(AsmError::OperandCount(mnemonic.to_string()));
        }
        self.emit(opcode)?;
        for operand in operands {
            let value = self.reg_or_int(operand)?;
            if value > 0xFFFF {
                return Err(AsmError::LiteralOutOfRange(value));
            }
            self.emit16(value as u16)?;
        }
        Ok(())
    }

    /// The typed two-operand family. Surface `op DST, SRC`; the source
    /// operand is encoded first.
    fn two_operand(
        &mut self,
        opcode: u8,
        mnemonic: &str,
        operands: &[String],
    ) -> Result<(), AsmError> {
        if operands.len() != 2 {
            return Err(AsmError::OperandCount(mnemonic.to_string()));
        }
        let dst = self.parse_operand(&operands[0])?;
        let src = self.parse_operand(&operands[1])?;

        // TEST/CMP compare without writing; everything else needs a
        // writable destination, and only MOV may target memory.
        let compares = opcode == op::TEST || opcode == op::CMP;
        let dst_ok = match dst {
            AsmOperand::Reg(_) => true,
            AsmOperand::Mem(_) => opcode == op::MOV,
            AsmOperand::Imm(_) | AsmOperand::Label(_) => false,
        };
        if !compares && !dst_ok {
            return Err(AsmError::InvalidDestination(mnemonic.to_string()));
        }

        self.emit(opcode)?;
        self.emit_typed(&src)?;
        self.emit_typed(&dst)
    }

    // === Operands ===

    fn parse_operand(&self, text: &str) -> Result<AsmOperand, AsmError> {
        if let Some(name) = text.strip_prefix('*') {
            if name.is_empty() {
                return Err(AsmError::MalformedOperand(text.to_string()));
            }
            return Ok(AsmOperand::Label(name.to_string()));
        }
        if let Some(expr) = text.strip_prefix('&') {
            let addr =
                parse_int(expr).ok_or_else(|| AsmError::MalformedOperand(text.to_string()))?;
            if addr > 0xFFF {
                return Err(AsmError::LiteralOutOfRange(addr));
            }
            return Ok(AsmOperand::Mem(addr));
        }
        if let Some(reg) = Reg::from_name(text) {
            return Ok(AsmOperand::Reg(reg));
        }
        match parse_int(text) {
            Some(value) => Ok(AsmOperand::Imm(value)),
            None => Err(AsmError::MalformedOperand(text.to_string())),
        }
    }

    /// Emit one typed-nibble operand. Immediate width follows magnitude.
    fn emit_typed(&mut self, operand: &AsmOperand) -> Result<(), AsmError> {
        match operand {
            AsmOperand::Reg(reg) => self.emit(reg.index()),
            AsmOperand::Imm(value) => {
                let value = *value;
                if value < 0x10 {
                    self.emit(0x10 | value as u8)
                } else if value < 0x1000 {
                    self.emit(0x20 | (value & 0xF) as u8)?;
                    self.emit((value >> 4) as u8)
                } else if value < 0x100000 {
                    self.emit(0x30 | (value & 0xF) as u8)?;
                    self.emit16((value >> 4) as u16)
                } else {
                    Err(AsmError::LiteralOutOfRange(value))
                }
            }
            AsmOperand::Mem(addr) => {
                self.emit(0x50 | (*addr & 0xF) as u8)?;
                self.emit((*addr >> 4) as u8)
            }
            AsmOperand::Label(name) => {
                // Always a tag-3 site so a later bind can patch in place.
                let value = self.reference_label(name, FixupKind::Typed);
                self.emit(0x30 | (value & 0xF) as u8)?;
                self.emit16(value >> 4)
            }
        }
    }

    fn reg_or_int(&self, text: &str) -> Result<u32, AsmError> {
        if let Some(reg) = Reg::from_name(text) {
            return Ok(reg.index() as u32);
        }
        parse_int(text).ok_or_else(|| AsmError::MalformedOperand(text.to_string()))
    }

    // === Labels ===

    /// Look a label up for a reference at the current cursor. Unbound
    /// labels record a fixup and resolve to 0 for now.
    fn reference_label(&mut self, name: &str, kind: FixupKind) -> u16 {
        let addr = self.cursor;
        let entry = self.labels.entry(name.to_string()).or_default();
        match entry.bound {
            Some(value) => value,
            None => {
                entry.fixups.push(Fixup { addr, kind });
                0
            }
        }
    }

    /// Bind a label at the current cursor and patch pending references.
    ///
    /// `!name` binds relative to offset 0 and then moves the code segment
    /// origin to the current cursor, so later labels are relative to it.
    fn bind_label(&mut self, name: &str) -> Result<(), AsmError> {
        let (bang, name) = match name.strip_prefix('!') {
            Some(stripped) => (true, stripped),
            None => (false, name),
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(AsmError::MalformedOperand(name.to_string()));
        }
        if bang {
            self.cseg = 0;
        }
        let value = (self.cursor.wrapping_sub(self.cseg) & 0xFFFF) as u16;
        let entry = self.labels.entry(name.to_string()).or_default();
        entry.bound = Some(value);
        let fixups = std::mem::take(&mut entry.fixups);
        for fixup in fixups {
            self.patch(fixup, value)?;
        }
        if bang {
            self.cseg = self.cursor;
        }
        Ok(())
    }

    fn patch(&mut self, fixup: Fixup, value: u16) -> Result<(), AsmError> {
        match fixup.kind {
            FixupKind::Word => Ok(self.mem.write16(fixup.addr, value)?),
            FixupKind::Typed => {
                self.mem.write(fixup.addr, 0x30 | (value & 0xF) as u8)?;
                Ok(self.mem.write16(fixup.addr + 1, value >> 4)?)
            }
        }
    }

    // === Data ===

    /// `data "text"` emits the quoted bytes and a terminating zero.
    /// `\n` and `\x00` escapes are honoured.
    fn emit_data(&mut self, field: &str) -> Result<(), AsmError> {
        let field = field.trim();
        let inner = field
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .ok_or_else(|| AsmError::MalformedOperand(field.to_string()))?;
        let text = inner.replace("\\n", "\n").replace("\\x00", "\0");
        for byte in text.bytes() {
            self.emit(byte)?;
        }
        self.emit(0)
    }

    // === Emission ===

    fn emit(&mut self, byte: u8) -> Result<(), AsmError> {
        self.mem.write(self.cursor, byte)?;
        self.cursor += 1;
        Ok(())
    }

    fn emit16(&mut self, word: u16) -> Result<(), AsmError> {
        self.mem.write16(self.cursor, word)?;
        self.cursor += 2;
        Ok(())
    }
}

/// Parse a decimal or `h`-prefixed hexadecimal integer.
fn parse_int(text: &str) -> Option<u32> {
    if let Some(hex) = text.strip_prefix('h') {
        return u32::from_str_radix(hex, 16).ok();
    }
    text.parse().ok()
}

/// Split off the first whitespace-delimited token.
fn split_first(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(split) => (&text[..split], text[split..].trim_start()),
        None => (text, ""),
    }
}
