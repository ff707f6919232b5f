//! CPU core
//!
//! Fetch-decode-dispatch interpreter over the segmented memory controller:
//! - `registers`: the register file and FLAGS
//! - `operand`: the typed-nibble operand encoding
//! - `dispatch`: opcode numbers and the 256-entry handler table
//! - `exec`: per-family instruction handlers
//! - `state`: the `Cpu` itself and its run loop

pub mod dispatch;
pub mod exec;
pub mod operand;
pub mod registers;
pub mod state;

pub use operand::Operand;
pub use registers::{Reg, Registers};
pub use state::Cpu;
