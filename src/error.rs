//! Error types for the memory system and the execution core
//!
//! Every error is fatal to the current `run`: the loop unwinds immediately
//! and the host receives the error as a structured value. Assembly errors
//! live with the assembler in [`crate::asm`].

use thiserror::Error;

/// The kind of memory access that was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Execute,
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
            Access::Execute => write!(f, "execute"),
        }
    }
}

/// Errors raised by memory maps, the I/O map, and the memory controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The access violated a protection bit on the target region.
    #[error("attempted to {access} protected memory at {addr:#06x}")]
    Protection { access: Access, addr: u32 },

    /// The address fell outside the target region.
    #[error("address {addr:#06x} is out of range")]
    Bounds { addr: u32 },

    /// No region is registered for the decoded block.
    #[error("no memory is mapped at block {block:#x}")]
    Unmapped { block: u8 },

    /// No device claims the decoded MMIO sub-address.
    #[error("no device is mapped at I/O address {addr:#x}")]
    NoDevice { addr: u8 },
}

/// Errors raised by the CPU core while executing a program.
#[derive(Debug, Error)]
pub enum CpuError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// The fetched opcode byte has no handler.
    #[error("invalid opcode {opcode:#04x}")]
    InvalidOpcode { opcode: u8 },

    /// The fetched operand byte carries an undefined type tag.
    #[error("invalid operand tag {tag:#x}")]
    InvalidOperand { tag: u8 },

    /// An operand named a register index outside the register file.
    #[error("invalid register index {0}")]
    InvalidRegister(u8),

    /// The destination operand type is not permitted for this instruction.
    #[error("operand tag {tag:#x} is not a valid destination here")]
    InvalidDestination { tag: u8 },

    /// INT with a vector whose table entry is zero.
    #[error("interrupt vector {vector:#04x} has no configured handler")]
    InvalidInterrupt { vector: u8 },

    /// Division by zero.
    #[error("division by zero")]
    DivideByZero,

    /// The instruction attempted to use IP where it is not allowed.
    #[error("program attempted to change IP")]
    IpOperand,

    /// Popping with SP below one stack entry.
    #[error("stack underflow")]
    StackUnderflow,

    /// A device rejected or failed an I/O request.
    #[error("device error: {0}")]
    Device(String),

    /// Host file I/O failed while loading or saving an image.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
