//! TTY console device
//!
//! Character output on port 8000 (the low byte is written to stdout) and
//! blocking single-byte input on port 4000. Terminal mode juggling is left
//! to whatever front-end hosts the machine.

use std::io::{Read, Write};

use crate::device::Device;
use crate::error::CpuError;

/// Port the console writes characters from.
pub const OUTPUT_PORT: u16 = 8000;
/// Port the console reads keys on.
pub const INPUT_PORT: u16 = 4000;

/// A stdin/stdout console.
pub struct Console {
    ports: [u16; 2],
}

impl Console {
    pub fn new() -> Self {
        Self {
            ports: [OUTPUT_PORT, INPUT_PORT],
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Console {
    fn ports(&self) -> &[u16] {
        &self.ports
    }

    fn input(&mut self, port: u16) -> Result<u16, CpuError> {
        if port != INPUT_PORT {
            return Err(CpuError::Device(format!("console cannot input on port {port}")));
        }
        let mut byte = [0u8; 1];
        std::io::stdin()
            .read_exact(&mut byte)
            .map_err(|err| CpuError::Device(err.to_string()))?;
        Ok(byte[0] as u16)
    }

    fn output(&mut self, port: u16, value: u16) -> Result<(), CpuError> {
        if port != OUTPUT_PORT {
            return Err(CpuError::Device(format!("console cannot output on port {port}")));
        }
        let mut stdout = std::io::stdout();
        stdout
            .write_all(&[value as u8])
            .and_then(|_| stdout.flush())
            .map_err(|err| CpuError::Device(err.to_string()))
    }
}
