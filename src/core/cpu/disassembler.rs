use crate::core::cpu::Reg;
use crate::core::cpu::instruction::{AritOp, Instruction, Opcode};

/// A single decoded instruction rendered for humans. The text carries §
/// color tags and is resolved by the terminal formatter on output.
#[derive(Debug)]
pub struct Disassembled {
    pub address: u16,
    pub opcode: Opcode,
    pub text: String,
}

fn register_name(code: u8) -> &'static str {
    match Reg::from_code(code) {
        Some(reg) => reg.name(),
        None => "?",
    }
}

/// Renders one instruction word. `extended` switches ARIT from the
/// `ARIT <OP>, <DST>, <OP1>, <OP2>` notation to the infix `DST = OP1 * OP2`
/// form.
pub fn disassemble(address: u16, word: u16, extended: bool) -> Disassembled {
    let instruction = Instruction(word);
    let opcode = Opcode::from_instruction(&instruction);
    let argument = instruction.argument();
    let name = opcode.name();

    let text = match opcode {
        Opcode::NOP => format!("§8{}", name),

        Opcode::LDA | Opcode::STA => format!("§6{} [{:X}h]", name, argument),

        Opcode::JMP | Opcode::JNZ => format!("§6{} {:X}h", name, argument),

        Opcode::RET | Opcode::HLT => format!("§6{}", name),

        Opcode::ARIT => {
            let op = AritOp::from_bits(instruction.arit_opr());
            let dst = register_name(instruction.arit_dst());
            let op1 = register_name(instruction.arit_op1());
            let bits_op2 = instruction.arit_op2();
            let op2_zero = bits_op2 & 0b100 == 0;
            let op2 = if op2_zero {
                "0"
            } else {
                register_name(bits_op2 & 0b011)
            };

            if extended {
                let expr = match op {
                    AritOp::SET0 => format!("{dst} = 0"),
                    AritOp::SETF => format!("{dst} = FFFF"),
                    AritOp::NOT => format!("{dst} = ~{op1}"),
                    AritOp::AND => format!("{dst} = {op1} & {op2}"),
                    AritOp::OR => format!("{dst} = {op1} | {op2}"),
                    AritOp::XOR => format!("{dst} = {op1} ^ {op2}"),
                    AritOp::ADD => format!("{dst} = {op1} + {op2}"),
                    AritOp::SUB => format!("{dst} = {op1} - {op2}"),
                };
                format!("§6{} {}", name, expr)
            } else {
                let op2 = if op2_zero { "zero" } else { op2 };
                format!("§6{} {}, {}, {}, {}", name, op.name(), dst, op1, op2)
            }
        }

        Opcode::UNKNOWN => format!(
            "§B{} :: {:X}.{:03X}",
            name,
            instruction.opcode_bits(),
            argument
        ),
    };

    Disassembled {
        address,
        opcode,
        text,
    }
}
