//! Basic instruction tests (MOV, arithmetic, bitwise)

use vm16::asm;
use vm16::cpu::{Cpu, Reg};
use vm16::error::CpuError;

/// Assemble a program at offset 0 and run it to completion.
fn assemble_and_run(source: &str) -> Cpu {
    let mut cpu = Cpu::new();
    asm::assemble(&mut cpu.mem, source).unwrap();
    cpu.set_register(Reg::Ds, 0x3000);
    cpu.set_register(Reg::Ss, 0x2000);
    cpu.run(0, &[Reg::Ds, Reg::Ss, Reg::Sp]).unwrap();
    cpu
}

#[test]
fn test_arithmetic_round_trip() {
    // mov ax, 0x10; add ax, 0x20; hlt
    let mut cpu = Cpu::new();
    asm::assemble(&mut cpu.mem, "mov ax, h10\nadd ax, h20\nhlt").unwrap();
    let exit_code = cpu.run(0, &[]).unwrap();
    assert_eq!(cpu.regs.get(Reg::Ax), 0x30);
    assert_eq!(exit_code, 0);
}

#[test]
fn test_mov_immediate_widths() {
    // 4-bit, 12-bit, and 20-bit immediates all land in a 16-bit register
    let cpu = assemble_and_run("mov ax, 5\nmov bx, h123\nmov cx, h12345\nhlt");
    assert_eq!(cpu.regs.get(Reg::Ax), 5);
    assert_eq!(cpu.regs.get(Reg::Bx), 0x123);
    // 20-bit immediates truncate into the register model
    assert_eq!(cpu.regs.get(Reg::Cx), 0x2345);
}

#[test]
fn test_mov_register_to_register() {
    let cpu = assemble_and_run("mov ax, h77\nmov bx, ax\nhlt");
    assert_eq!(cpu.regs.get(Reg::Bx), 0x77);
}

#[test]
fn test_mov_memory_round_trip() {
    // Store AX at DS+0x20, read it back into BX
    let mut cpu = assemble_and_run("mov ax, h1234\nmov &h20, ax\nmov bx, &h20\nhlt");
    assert_eq!(cpu.regs.get(Reg::Bx), 0x1234);
    // The word went through DS (0x3000)
    assert_eq!(cpu.mem.read16(0x3020).unwrap(), 0x1234);
}

#[test]
fn test_bitwise_and() {
    let cpu = assemble_and_run("mov ax, hF0\nand ax, h0F\nhlt");
    assert_eq!(cpu.regs.get(Reg::Ax), 0x00);
}

#[test]
fn test_bitwise_xor() {
    let cpu = assemble_and_run("mov ax, hF0\nxor ax, h0F\nhlt");
    assert_eq!(cpu.regs.get(Reg::Ax), 0xFF);
}

#[test]
fn test_bitwise_or_and_not() {
    let cpu = assemble_and_run("mov ax, hF0\nor ax, h0F\nhlt");
    assert_eq!(cpu.regs.get(Reg::Ax), 0xFF);

    // NOT is destructive mask-out: dst & !src
    let cpu = assemble_and_run("mov ax, hFF\nnot ax, h0F\nhlt");
    assert_eq!(cpu.regs.get(Reg::Ax), 0xF0);
}

#[test]
fn test_mul_div() {
    let cpu = assemble_and_run("mov ax, 6\nmul ax, 7\nhlt");
    assert_eq!(cpu.regs.get(Reg::Ax), 42);

    let cpu = assemble_and_run("mov ax, h64\ndiv ax, h0A\nhlt");
    assert_eq!(cpu.regs.get(Reg::Ax), 10);
}

#[test]
fn test_divide_by_zero() {
    let mut cpu = Cpu::new();
    asm::assemble(&mut cpu.mem, "mov ax, 5\ndiv ax, 0\nhlt").unwrap();
    let result = cpu.run(0, &[]);
    assert!(matches!(result, Err(CpuError::DivideByZero)));
}

#[test]
fn test_add_wraps_at_16_bits() {
    let cpu = assemble_and_run("mov ax, hFFFF\nadd ax, 2\nhlt");
    assert_eq!(cpu.regs.get(Reg::Ax), 1);
}

#[test]
fn test_inc_dec() {
    let cpu = assemble_and_run("mov cx, 5\ninc cx\ninc cx\ndec cx\nhlt");
    assert_eq!(cpu.regs.get(Reg::Cx), 6);
}

#[test]
fn test_inc_rejects_ip() {
    let mut cpu = Cpu::new();
    asm::assemble(&mut cpu.mem, "inc ip\nhlt").unwrap();
    assert!(matches!(cpu.run(0, &[]), Err(CpuError::IpOperand)));
}

#[test]
fn test_ip_advances_by_encoded_length() {
    // mov ax, h10 encodes to 4 bytes: opcode, tag-2 immediate, register
    let mut cpu = Cpu::new();
    asm::assemble(&mut cpu.mem, "mov ax, h10\nhlt").unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.regs.get(Reg::Ip), 4);
}

#[test]
fn test_hlt_exit_code() {
    let mut cpu = Cpu::new();
    asm::assemble(&mut cpu.mem, "hlt 7").unwrap();
    assert_eq!(cpu.run(0, &[]).unwrap(), 7);
}

#[test]
fn test_clear_registers_on_run() {
    let mut cpu = Cpu::new();
    asm::assemble(&mut cpu.mem, "hlt").unwrap();
    cpu.set_register(Reg::Ax, 0xBEEF);
    cpu.set_register(Reg::Ds, 0x3000);
    cpu.run(0, &[Reg::Ds]).unwrap();
    // AX was cleared, the persistent DS survived
    assert_eq!(cpu.regs.get(Reg::Ax), 0);
    assert_eq!(cpu.regs.get(Reg::Ds), 0x3000);
}

#[test]
fn test_byte_memory_operands_decode() {
    // Tag-4 (byte at DS+addr) operands are decodable even though the
    // assembler only emits the word form. Hand-encoded:
    //   mov ax, byte[DS+0x20]; hlt
    let mut cpu = Cpu::new();
    cpu.load_image(&[0x02, 0x40, 0x02, 0x01, 0x05, 0x00], 0).unwrap();
    cpu.set_register(Reg::Ds, 0x3000);
    cpu.mem.write(0x3020, 0xAB).unwrap();
    cpu.run(0, &[Reg::Ds]).unwrap();
    assert_eq!(cpu.regs.get(Reg::Ax), 0x00AB);

    //   mov byte[DS+0x20], 0xCD; hlt
    let mut cpu = Cpu::new();
    cpu.load_image(&[0x02, 0x2D, 0x0C, 0x40, 0x02, 0x05, 0x00], 0)
        .unwrap();
    cpu.set_register(Reg::Ds, 0x3000);
    cpu.run(0, &[Reg::Ds]).unwrap();
    assert_eq!(cpu.mem.read(0x3020).unwrap(), 0xCD);
}

#[test]
fn test_invalid_opcode() {
    let mut cpu = Cpu::new();
    cpu.mem.write(0, 0xFF).unwrap();
    let result = cpu.step();
    assert!(matches!(
        result,
        Err(CpuError::InvalidOpcode { opcode: 0xFF })
    ));
}
