use std::fmt;

use crate::core::cpu::instruction::{AritOp, Instruction, Opcode};
use crate::core::memory::MemoryPlane;

pub mod disassembler;
pub mod instruction;

// PSW flag layout, bit 0 = LSB
pub const PSW_OV_BIT: u32 = 15;
pub const PSW_UN_BIT: u32 = 14;
pub const PSW_LE_BIT: u32 = 13;
pub const PSW_EQ_BIT: u32 = 12;
pub const PSW_GR_BIT: u32 = 11;

/// The six registers reachable through a 3-bit ARIT register code.
/// Codes 100 and 101 select nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    A,
    B,
    C,
    D,
    R,
    PSW,
}

impl Reg {
    pub fn from_code(code: u8) -> Option<Reg> {
        match code {
            0b000 => Some(Reg::A),
            0b001 => Some(Reg::B),
            0b010 => Some(Reg::C),
            0b011 => Some(Reg::D),
            0b110 => Some(Reg::R),
            0b111 => Some(Reg::PSW),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Reg::A => "A",
            Reg::B => "B",
            Reg::C => "C",
            Reg::D => "D",
            Reg::R => "R",
            Reg::PSW => "PSW",
        }
    }
}

#[derive(Debug, Default)]
pub struct Registers {
    pub ri: u16,
    pub pc: u16,
    pub a: u16,
    pub b: u16,
    pub c: u16,
    pub d: u16,
    pub r: u16,
    pub psw: u16,
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn get(&self, reg: Reg) -> u16 {
        match reg {
            Reg::A => self.a,
            Reg::B => self.b,
            Reg::C => self.c,
            Reg::D => self.d,
            Reg::R => self.r,
            Reg::PSW => self.psw,
        }
    }

    pub fn set(&mut self, reg: Reg, value: u16) {
        match reg {
            Reg::A => self.a = value,
            Reg::B => self.b = value,
            Reg::C => self.c = value,
            Reg::D => self.d = value,
            Reg::R => self.r = value,
            Reg::PSW => self.psw = value,
        }
    }

    pub fn set_psw_bit(&mut self, bit: u32, value: bool) {
        self.psw &= !(1 << bit);
        self.psw |= (value as u16) << bit;
    }

    pub fn psw_bit(&self, bit: u32) -> bool {
        (self.psw >> bit) & 1 != 0
    }
}

/// Which ARIT field carried an invalid register code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AritField {
    Dst,
    Op1,
    Op2,
}

impl AritField {
    fn name(&self) -> &'static str {
        match self {
            AritField::Dst => "destination",
            AritField::Op1 => "op1",
            AritField::Op2 => "op2",
        }
    }
}

/// Non-fatal CPU diagnostics. A fault never unwinds the emulator; it is
/// reported and, depending on configuration, arms the debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    OutOfBounds { address: u16, pc: u16 },
    BadInstruction { instruction: u16, pc: u16 },
    InvalidAritRegister { field: AritField, code: u8 },
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::OutOfBounds { address, pc } => {
                write!(f, "Memory access out of bounds 0x{address:04X} at 0x{pc:03X}")
            }
            Fault::BadInstruction { instruction, pc } => {
                write!(f, "Bad instruction 0x{instruction:04X} at 0x{pc:03X}")
            }
            Fault::InvalidAritRegister { field, code } => {
                write!(f, "Invalid arit register {} code: {}", field.name(), code)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Continue,
    Halt,
}

type ExecResult = Result<ExecOutcome, Fault>;

pub struct Cpu {
    regs: Registers,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            regs: Registers::new(),
        }
    }

    pub fn regs(&self) -> &Registers {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    pub fn reset(&mut self) {
        self.regs.clear();
    }

    fn guard(&self, memory: &MemoryPlane, address: u16) -> Result<(), Fault> {
        if memory.contains(address) {
            Ok(())
        } else {
            Err(Fault::OutOfBounds {
                address,
                pc: self.regs.pc,
            })
        }
    }

    /// Loads the instruction under PC into RI. PC is left untouched.
    pub fn fetch(&mut self, memory: &MemoryPlane) -> Result<u16, Fault> {
        self.guard(memory, self.regs.pc)?;
        let instruction = memory.get(self.regs.pc);
        self.regs.ri = instruction;
        Ok(instruction)
    }

    /// Post-increments PC. Returns true when PC ran past the end of
    /// memory and was wrapped back to 0; the caller decides whether that
    /// is a fault or a warning.
    pub fn advance(&mut self, memory: &MemoryPlane) -> bool {
        self.regs.pc = self.regs.pc.wrapping_add(1);
        if self.regs.pc as usize >= memory.len() {
            self.regs.pc = 0;
            return true;
        }
        false
    }

    pub fn execute(&mut self, instruction: Instruction, memory: &mut MemoryPlane) -> ExecResult {
        let argument = instruction.argument();

        match Opcode::from_instruction(&instruction) {
            Opcode::NOP => {}

            Opcode::LDA => {
                self.guard(memory, argument)?;
                self.regs.a = memory.get(argument);
            }

            Opcode::STA => {
                self.guard(memory, argument)?;
                memory.set(argument, self.regs.a);
            }

            // Jumps store the return address in R and leave PC one short
            // of the target; the advance step supplies the increment.
            Opcode::JMP => {
                self.guard(memory, argument)?;
                self.regs.r = self.regs.pc.wrapping_add(1);
                self.regs.pc = argument.wrapping_sub(1);
            }

            Opcode::JNZ => {
                self.guard(memory, argument)?;
                if self.regs.a != 0 {
                    self.regs.r = self.regs.pc.wrapping_add(1);
                    self.regs.pc = argument.wrapping_sub(1);
                }
            }

            // Swap-and-advance: jump to R while R picks up the address of
            // the instruction after this one.
            Opcode::RET => {
                self.guard(memory, self.regs.r)?;
                let pc = self.regs.pc;
                self.regs.pc = self.regs.r.wrapping_sub(1);
                self.regs.r = pc.wrapping_add(1);
            }

            Opcode::ARIT => self.do_arit(&instruction)?,

            Opcode::HLT => return Ok(ExecOutcome::Halt),

            Opcode::UNKNOWN => {
                return Err(Fault::BadInstruction {
                    instruction: instruction.0,
                    pc: self.regs.pc,
                });
            }
        }

        Ok(ExecOutcome::Continue)
    }

    fn do_arit(&mut self, instruction: &Instruction) -> Result<(), Fault> {
        let bits_dst = instruction.arit_dst();
        let bits_op1 = instruction.arit_op1();
        let bits_op2 = instruction.arit_op2();

        let dst = Reg::from_code(bits_dst).ok_or(Fault::InvalidAritRegister {
            field: AritField::Dst,
            code: bits_dst,
        })?;
        let op1_reg = Reg::from_code(bits_op1).ok_or(Fault::InvalidAritRegister {
            field: AritField::Op1,
            code: bits_op1,
        })?;

        // With the MSB of OP2 clear the second operand is the literal 0;
        // otherwise the low two bits select one of A, B, C, D.
        let op2_reg = if bits_op2 & 0b100 == 0 {
            None
        } else {
            let reg = Reg::from_code(bits_op2 & 0b011).ok_or(Fault::InvalidAritRegister {
                field: AritField::Op2,
                code: bits_op2,
            })?;
            Some(reg)
        };

        let op1 = self.regs.get(op1_reg);
        let op2 = op2_reg.map_or(0, |reg| self.regs.get(reg));

        match AritOp::from_bits(instruction.arit_opr()) {
            AritOp::SET0 => self.regs.set(dst, 0x0000),
            AritOp::SETF => self.regs.set(dst, 0xFFFF),
            AritOp::NOT => self.regs.set(dst, !op1),
            AritOp::AND => self.regs.set(dst, op1 & op2),
            AritOp::OR => self.regs.set(dst, op1 | op2),
            AritOp::XOR => self.regs.set(dst, op1 ^ op2),
            AritOp::ADD => {
                let sum = op1 as u32 + op2 as u32;
                self.regs.set(dst, sum as u16);
                self.regs.set_psw_bit(PSW_OV_BIT, sum > 0xFFFF);
            }
            AritOp::SUB => {
                self.regs.set(dst, op1.wrapping_sub(op2));
                self.regs.set_psw_bit(PSW_UN_BIT, op2 > op1);
            }
        }

        // Every sub-op refreshes the comparison flags from the sourced
        // operand values, including the ones that ignore op2 in the data
        // path.
        self.regs.set_psw_bit(PSW_LE_BIT, op1 < op2);
        self.regs.set_psw_bit(PSW_EQ_BIT, op1 == op2);
        self.regs.set_psw_bit(PSW_GR_BIT, op1 > op2);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_and_memory(words: Vec<u16>) -> (Cpu, Vec<u16>) {
        (Cpu::new(), words)
    }

    fn exec(cpu: &mut Cpu, backing: &mut [u16], word: u16) -> ExecResult {
        let mut memory = MemoryPlane::new(backing);
        cpu.execute(Instruction(word), &mut memory)
    }

    fn exec_and_advance(cpu: &mut Cpu, backing: &mut [u16], word: u16) -> ExecResult {
        let mut memory = MemoryPlane::new(backing);
        let result = cpu.execute(Instruction(word), &mut memory);
        cpu.advance(&memory);
        result
    }

    /// Encodes an ARIT word from its four 3-bit groups.
    fn arit(opr: u16, dst: u16, op1: u16, op2: u16) -> u16 {
        0x6000 | (opr << 9) | (dst << 6) | (op1 << 3) | op2
    }

    #[test]
    fn fetch_loads_ri_without_moving_pc() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0x1004, 0x2005]);
        let memory = MemoryPlane::new(&mut backing);
        let instruction = cpu.fetch(&memory).unwrap();
        assert_eq!(instruction, 0x1004);
        assert_eq!(cpu.regs().ri, 0x1004);
        assert_eq!(cpu.regs().pc, 0);
    }

    #[test]
    fn fetch_out_of_bounds_is_a_fault() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 4]);
        cpu.regs_mut().pc = 9;
        let memory = MemoryPlane::new(&mut backing);
        assert_eq!(
            cpu.fetch(&memory),
            Err(Fault::OutOfBounds { address: 9, pc: 9 })
        );
    }

    #[test]
    fn lda_and_sta_move_words_through_a() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0, 0, 0, 0, 0x00AA, 0]);
        exec(&mut cpu, &mut backing, 0x1004).unwrap();
        assert_eq!(cpu.regs().a, 0x00AA);
        exec(&mut cpu, &mut backing, 0x2005).unwrap();
        assert_eq!(backing[5], 0x00AA);
        assert_eq!(backing[4], 0x00AA);
    }

    #[test]
    fn lda_out_of_bounds_leaves_a_untouched() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 4]);
        cpu.regs_mut().a = 0x1234;
        let result = exec(&mut cpu, &mut backing, 0x1008);
        assert_eq!(result, Err(Fault::OutOfBounds { address: 8, pc: 0 }));
        assert_eq!(cpu.regs().a, 0x1234);
    }

    #[test]
    fn jmp_links_r_and_lands_on_target_after_advance() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 16]);
        cpu.regs_mut().pc = 3;
        exec_and_advance(&mut cpu, &mut backing, 0x300A).unwrap();
        assert_eq!(cpu.regs().r, 4);
        assert_eq!(cpu.regs().pc, 0x0A);
    }

    #[test]
    fn jmp_to_address_zero_wraps_cleanly() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 16]);
        cpu.regs_mut().pc = 1;
        let mut memory = MemoryPlane::new(&mut backing);
        cpu.execute(Instruction(0x3000), &mut memory).unwrap();
        assert_eq!(cpu.regs().pc, 0xFFFF);
        let looped = cpu.advance(&memory);
        assert!(!looped);
        assert_eq!(cpu.regs().pc, 0);
        assert_eq!(cpu.regs().r, 2);
    }

    #[test]
    fn jnz_branches_only_when_a_is_nonzero() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 16]);
        cpu.regs_mut().pc = 1;
        cpu.regs_mut().r = 0xDEAD;

        // A == 0: fall through
        exec_and_advance(&mut cpu, &mut backing, 0x4005).unwrap();
        assert_eq!(cpu.regs().pc, 2);
        assert_eq!(cpu.regs().r, 0xDEAD);

        // A != 0: taken
        cpu.regs_mut().a = 1;
        exec_and_advance(&mut cpu, &mut backing, 0x4005).unwrap();
        assert_eq!(cpu.regs().pc, 5);
        assert_eq!(cpu.regs().r, 3);
    }

    #[test]
    fn ret_swaps_pc_and_r() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 16]);
        cpu.regs_mut().pc = 7;
        cpu.regs_mut().r = 2;
        exec_and_advance(&mut cpu, &mut backing, 0x5000).unwrap();
        assert_eq!(cpu.regs().pc, 2);
        assert_eq!(cpu.regs().r, 8);
    }

    #[test]
    fn ret_with_invalid_r_faults() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 4]);
        cpu.regs_mut().r = 0x100;
        let result = exec(&mut cpu, &mut backing, 0x5000);
        assert_eq!(
            result,
            Err(Fault::OutOfBounds {
                address: 0x100,
                pc: 0
            })
        );
    }

    #[test]
    fn unknown_opcode_is_a_bad_instruction_fault() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 4]);
        let result = exec(&mut cpu, &mut backing, 0x7000);
        assert_eq!(
            result,
            Err(Fault::BadInstruction {
                instruction: 0x7000,
                pc: 0
            })
        );
    }

    #[test]
    fn hlt_halts() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 4]);
        assert_eq!(
            exec(&mut cpu, &mut backing, 0xF000),
            Ok(ExecOutcome::Halt)
        );
    }

    #[test]
    fn advance_wraps_and_reports_the_loop_around() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 4]);
        cpu.regs_mut().pc = 3;
        let memory = MemoryPlane::new(&mut backing);
        assert!(cpu.advance(&memory));
        assert_eq!(cpu.regs().pc, 0);
    }

    #[test]
    fn arit_set0_setf_and_not() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 4]);
        cpu.regs_mut().b = 0x0F0F;

        exec(&mut cpu, &mut backing, arit(0b001, 0b000, 0b001, 0b000)).unwrap();
        assert_eq!(cpu.regs().a, 0xFFFF);

        exec(&mut cpu, &mut backing, arit(0b010, 0b010, 0b001, 0b000)).unwrap();
        assert_eq!(cpu.regs().c, 0xF0F0);

        exec(&mut cpu, &mut backing, arit(0b000, 0b000, 0b001, 0b000)).unwrap();
        assert_eq!(cpu.regs().a, 0);
    }

    #[test]
    fn arit_add_overflow_sets_ov_and_truncates() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 4]);
        cpu.regs_mut().a = 0xFFFF;
        cpu.regs_mut().b = 0x0003;
        // ADD A, A, B
        exec(&mut cpu, &mut backing, arit(0b110, 0b000, 0b000, 0b101)).unwrap();
        assert_eq!(cpu.regs().a, 0x0002);
        assert!(cpu.regs().psw_bit(PSW_OV_BIT));
        // pre-truncation comparison: 0xFFFF > 3
        assert!(cpu.regs().psw_bit(PSW_GR_BIT));
        assert!(!cpu.regs().psw_bit(PSW_LE_BIT));
        assert!(!cpu.regs().psw_bit(PSW_EQ_BIT));
    }

    #[test]
    fn arit_sub_underflow_sets_un_and_wraps() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 4]);
        cpu.regs_mut().a = 0x0001;
        cpu.regs_mut().b = 0x0003;
        // SUB A, A, B
        exec(&mut cpu, &mut backing, arit(0b111, 0b000, 0b000, 0b101)).unwrap();
        assert_eq!(cpu.regs().a, 0xFFFE);
        assert!(cpu.regs().psw_bit(PSW_UN_BIT));
        assert!(cpu.regs().psw_bit(PSW_LE_BIT));
    }

    #[test]
    fn arit_other_ops_leave_ov_and_un_alone() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 4]);
        cpu.regs_mut().a = 0xFFFF;
        cpu.regs_mut().b = 0x0001;
        exec(&mut cpu, &mut backing, arit(0b110, 0b010, 0b000, 0b101)).unwrap();
        assert!(cpu.regs().psw_bit(PSW_OV_BIT));

        // XOR must not clear the overflow flag
        exec(&mut cpu, &mut backing, arit(0b101, 0b010, 0b000, 0b101)).unwrap();
        assert!(cpu.regs().psw_bit(PSW_OV_BIT));
    }

    #[test]
    fn arit_op2_msb_clear_means_literal_zero() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 4]);
        cpu.regs_mut().a = 0x00FF;
        cpu.regs_mut().b = 0x1234;
        // OP2 code 001 has the MSB clear: operand is 0, not register B
        exec(&mut cpu, &mut backing, arit(0b110, 0b011, 0b000, 0b001)).unwrap();
        assert_eq!(cpu.regs().d, 0x00FF);
        assert!(cpu.regs().psw_bit(PSW_GR_BIT));
    }

    #[test]
    fn arit_comparison_flags_are_mutually_exclusive() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 4]);
        for (a, b) in [(1u16, 2u16), (2, 2), (3, 2)] {
            cpu.regs_mut().a = a;
            cpu.regs_mut().b = b;
            exec(&mut cpu, &mut backing, arit(0b011, 0b010, 0b000, 0b101)).unwrap();
            let set = [PSW_LE_BIT, PSW_EQ_BIT, PSW_GR_BIT]
                .iter()
                .filter(|&&bit| cpu.regs().psw_bit(bit))
                .count();
            assert_eq!(set, 1);
        }
    }

    #[test]
    fn arit_invalid_register_codes_fault_without_writing() {
        let (mut cpu, mut backing) = cpu_and_memory(vec![0; 4]);
        cpu.regs_mut().a = 0x1111;

        // DST code 100
        let result = exec(&mut cpu, &mut backing, arit(0b011, 0b100, 0b000, 0b000));
        assert_eq!(
            result,
            Err(Fault::InvalidAritRegister {
                field: AritField::Dst,
                code: 4
            })
        );

        // OP1 code 101
        let result = exec(&mut cpu, &mut backing, arit(0b011, 0b000, 0b101, 0b000));
        assert_eq!(
            result,
            Err(Fault::InvalidAritRegister {
                field: AritField::Op1,
                code: 5
            })
        );
        assert_eq!(cpu.regs().a, 0x1111);
        assert_eq!(cpu.regs().psw, 0);
    }

    #[test]
    fn register_codes_map_to_the_documented_registers() {
        assert_eq!(Reg::from_code(0b000), Some(Reg::A));
        assert_eq!(Reg::from_code(0b011), Some(Reg::D));
        assert_eq!(Reg::from_code(0b100), None);
        assert_eq!(Reg::from_code(0b101), None);
        assert_eq!(Reg::from_code(0b110), Some(Reg::R));
        assert_eq!(Reg::from_code(0b111), Some(Reg::PSW));
    }
}
