/// A raw 16-bit instruction word: 4 opcode bits followed by the 12-bit
/// argument X. ARIT instructions split X further into four 3-bit groups.
pub struct Instruction(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    NOP,
    LDA,
    STA,
    JMP,
    JNZ,
    RET,
    ARIT,
    HLT,
    UNKNOWN,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AritOp {
    SET0,
    SETF,
    NOT,
    AND,
    OR,
    XOR,
    ADD,
    SUB,
}

impl Instruction {
    #[inline(always)]
    pub fn opcode_bits(&self) -> u8 {
        (self.0 >> 12) as u8
    }
    #[inline(always)]
    pub fn argument(&self) -> u16 {
        self.0 & 0x0FFF
    }
    // ARIT sub-fields: OPR(3) DST(3) OP1(3) OP2(3)
    #[inline(always)]
    pub fn arit_opr(&self) -> u8 {
        ((self.0 >> 9) & 0b111) as u8
    }
    #[inline(always)]
    pub fn arit_dst(&self) -> u8 {
        ((self.0 >> 6) & 0b111) as u8
    }
    #[inline(always)]
    pub fn arit_op1(&self) -> u8 {
        ((self.0 >> 3) & 0b111) as u8
    }
    #[inline(always)]
    pub fn arit_op2(&self) -> u8 {
        (self.0 & 0b111) as u8
    }
}

impl Opcode {
    #[inline(always)]
    pub fn from_instruction(instruction: &Instruction) -> Opcode {
        Opcode::from_bits(instruction.opcode_bits())
    }

    pub fn from_bits(bits: u8) -> Opcode {
        use Opcode::*;
        match bits {
            0b0000 => NOP,
            0b0001 => LDA,
            0b0010 => STA,
            0b0011 => JMP,
            0b0100 => JNZ,
            0b0101 => RET,
            0b0110 => ARIT,
            0b1111 => HLT,
            _ => UNKNOWN,
        }
    }

    pub fn name(&self) -> &'static str {
        use Opcode::*;
        match self {
            NOP => "NOP",
            LDA => "LDA",
            STA => "STA",
            JMP => "JMP",
            JNZ => "JNZ",
            RET => "RET",
            ARIT => "ARIT",
            HLT => "HLT",
            UNKNOWN => "???",
        }
    }
}

impl AritOp {
    /// The three OPR bits cover all eight sub-operations, so this never
    /// fails.
    pub fn from_bits(bits: u8) -> AritOp {
        use AritOp::*;
        match bits & 0b111 {
            0b000 => SET0,
            0b001 => SETF,
            0b010 => NOT,
            0b011 => AND,
            0b100 => OR,
            0b101 => XOR,
            0b110 => ADD,
            _ => SUB,
        }
    }

    pub fn name(&self) -> &'static str {
        use AritOp::*;
        match self {
            SET0 => "SET0",
            SETF => "SETF",
            NOT => "NOT",
            AND => "AND",
            OR => "OR",
            XOR => "XOR",
            ADD => "ADD",
            SUB => "SUB",
        }
    }
}
