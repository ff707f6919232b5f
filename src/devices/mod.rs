//! Bundled devices
//!
//! Small peripherals that ship with the machine: a TTY console for basic
//! character I/O and a file-backed storage region for state that survives
//! the host process.

pub mod console;
pub mod storage;

pub use console::Console;
pub use storage::Storage;
