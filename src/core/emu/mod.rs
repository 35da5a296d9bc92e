use std::io;
use std::sync::Arc;

use tracing::{debug, error};

use crate::core::cpu::disassembler;
use crate::core::cpu::instruction::{Instruction, Opcode};
use crate::core::cpu::{
    Cpu, ExecOutcome, Fault, PSW_EQ_BIT, PSW_GR_BIT, PSW_LE_BIT, PSW_OV_BIT, PSW_UN_BIT,
};
use crate::core::config::Config;
use crate::core::debugger::{DebugControl, Debugger};
use crate::core::interrupt::BreakRequest;
use crate::core::memory::MemoryPlane;
use crate::log::Logger;
use crate::prints;

pub const EMU_NAME: &str = "R-Proto";
pub const EMU_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const EMU_BUILD_DATE_TIME: &str = build_time::build_time_utc!();

const LOOP_AROUND_MESSAGE: &str =
    "Program counter looped around to 0. Was program control lost?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Continue,
    Halted,
    Quit,
}

/// The emulated machine plus its debugger. Owns everything except the
/// memory plane, which belongs to the caller of `process`.
pub struct Emulator<'a> {
    cpu: Cpu,
    memory: MemoryPlane<'a>,
    snapshot: Vec<u16>,
    debugger: Debugger,
    extended_notation: bool,
    fault_on_loop_around: bool,
    logger: Option<Logger>,
}

/// Runs a pre-loaded memory image to completion. The slice is the live
/// memory of the emulated machine and is mutated both by the running
/// program and by the debugger's `reset`. Returns 0 on a normal halt.
pub fn process(memory: &mut [u16], config: &Config) -> i32 {
    Emulator::new(memory, config).run()
}

impl<'a> Emulator<'a> {
    pub fn new(memory: &'a mut [u16], config: &Config) -> Self {
        let memory = MemoryPlane::new(memory);
        let snapshot = memory.snapshot();

        Emulator {
            cpu: Cpu::new(),
            memory,
            snapshot,
            debugger: Debugger::new(config),
            extended_notation: config.extended_notation && !config.dummy_mode,
            fault_on_loop_around: config.fault_on_loop_around,
            logger: None,
        }
    }

    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = Some(logger);
    }

    /// The atomic flags shared with the signal handler.
    pub fn break_request(&self) -> Arc<BreakRequest> {
        self.debugger.break_request()
    }

    pub fn run(&mut self) -> i32 {
        prints!("Memory size: 0x{:X} words.\n", self.memory.len());
        prints!("Beginning execution...\n\n");

        loop {
            match self.step_instruction() {
                StepOutcome::Continue => {}
                StepOutcome::Halted | StepOutcome::Quit => break,
            }
        }

        prints!("\nCPU Halted.\n");
        0
    }

    /// One pass of the main loop: fetch, trace, pre-execute hook,
    /// execute, advance. Faults are reported here and never propagate.
    fn step_instruction(&mut self) -> StepOutcome {
        let instruction = match self.cpu.fetch(&self.memory) {
            Ok(word) => word,
            Err(fault) => {
                self.report_fault(fault);
                self.advance_pc();
                return StepOutcome::Continue;
            }
        };

        // The current instruction is always traced before the debugger
        // gets a chance to pause.
        self.print_disassembly_line(self.cpu.regs().pc);

        match self.before_execute() {
            DebugControl::Nothing => {}
            // restart the iteration at the new PC without advancing
            DebugControl::Reset => return StepOutcome::Continue,
            DebugControl::Quit => return StepOutcome::Quit,
        }

        match self.cpu.execute(Instruction(instruction), &mut self.memory) {
            Ok(ExecOutcome::Halt) => return StepOutcome::Halted,
            Ok(ExecOutcome::Continue) => {}
            Err(fault) => self.report_fault(fault),
        }

        self.advance_pc();
        StepOutcome::Continue
    }

    fn advance_pc(&mut self) {
        if self.cpu.advance(&self.memory) {
            if self.fault_on_loop_around {
                self.raise_fault(LOOP_AROUND_MESSAGE);
            } else {
                self.warn(LOOP_AROUND_MESSAGE);
            }
        }
    }

    /// The debugger hook that runs between fetch and execute.
    fn before_execute(&mut self) -> DebugControl {
        self.debugger.poll_break_request();

        let pc = self.cpu.regs().pc;
        let opcode = Opcode::from_instruction(&Instruction(self.cpu.regs().ri));
        self.debugger.check_break_conditions(pc, opcode);

        // a running step sequence executes without pausing
        if self.debugger.steps_left > 0 {
            self.debugger.steps_left -= 1;
            return DebugControl::Nothing;
        }

        if self.debugger.breaking {
            return self.wait_user_command();
        }

        DebugControl::Nothing
    }

    /// Clears the register file and restores memory from the snapshot
    /// taken at initialization. Breakpoints survive a reset.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.memory.restore(&self.snapshot);
        debug!("Registers cleared and memory restored from snapshot");
    }

    fn raise_fault(&mut self, message: &str) {
        prints!("§9[ERR!] CPU FAULT: §R{}\n\n", message);
        if self.debugger.break_on_faults {
            self.debugger.arm();
        }
    }

    fn report_fault(&mut self, fault: Fault) {
        self.raise_fault(&fault.to_string());
    }

    fn warn(&mut self, message: &str) {
        prints!("§B[WRN!] §R{}\n\n", message);
    }

    // ---- command interface ----

    /// Blocks on stdin until a command hands control back to the main
    /// loop.
    fn wait_user_command(&mut self) -> DebugControl {
        if self.debugger.first_break {
            self.debugger.first_break = false;
            prints!("§2You are in step-through mode. ");
            prints!("You can view memory contents, registers and disassembly.\n");
            prints!("Type §3help§2 to view all commands.\n§R");
        }

        loop {
            prints!("§E>> §3");
            let mut line = String::new();
            let read = io::stdin().read_line(&mut line);
            prints!("§R");

            match read {
                // EOF: nothing more will ever arrive, leave the emulator
                Ok(0) => return DebugControl::Quit,
                Ok(_) => {}
                Err(e) => {
                    error!("Failed to read a command line: {e}");
                    return DebugControl::Quit;
                }
            }

            if let Some(control) = self.handle_command_line(&line) {
                return control;
            }
        }
    }

    /// Executes one REPL line. Returns None while the REPL should keep
    /// prompting, or the control value to hand to the main loop.
    fn handle_command_line(&mut self, raw: &str) -> Option<DebugControl> {
        let line = raw.trim_end_matches(['\r', '\n']);

        // an empty line replays the previous non-empty command verbatim
        let line = if line.is_empty() {
            self.debugger.last_command.clone()
        } else {
            self.debugger.last_command = line.to_string();
            line.to_string()
        };

        let mut args = line.split_ascii_whitespace();
        let cmd = args.next()?.to_ascii_lowercase();

        match cmd.as_str() {
            "s" | "step" => self.cmd_step(args.next()),

            "c" | "continue" => {
                prints!("§2Resuming execution...\n§R");
                self.debugger.breaking = false;
                Some(DebugControl::Nothing)
            }

            "r" | "regs" | "registers" => {
                self.dump_registers();
                None
            }

            "d" | "disassembly" => {
                self.cmd_disassembly(args.next(), args.next());
                None
            }

            "m" | "x" | "memory" => {
                self.cmd_memory(args.next(), args.next());
                None
            }

            "b" | "break" => {
                self.cmd_breakpoint(args.next(), args.next());
                None
            }

            "reset" => {
                prints!("Reseting all registers and memory.");
                self.reset();
                prints!(" Done.\n");
                Some(DebugControl::Reset)
            }

            "nobreak" => {
                self.debugger.break_on_faults = false;
                None
            }

            "dobreak" => {
                self.debugger.break_on_faults = true;
                None
            }

            "log" => {
                self.cmd_log(args.next());
                None
            }

            "q" | "quit" => Some(DebugControl::Quit),

            "help" => {
                self.cmd_help();
                None
            }

            _ => {
                prints!("§9Unknown command '{}'. ", cmd);
                prints!("Type 'help' for a list of commands.\n§R");
                None
            }
        }
    }

    /// step [amount]: runs `amount` instructions before the next pause.
    /// The first one executes on return, so only amount-1 are queued.
    fn cmd_step(&mut self, amount: Option<&str>) -> Option<DebugControl> {
        self.debugger.steps_left = 0;

        if let Some(text) = amount {
            match text.parse::<u32>() {
                Ok(n) if n > 0 => self.debugger.steps_left = n - 1,
                _ => {
                    prints!("§9Invalid step count '{}'.\n§R", text);
                    return None;
                }
            }
        }

        Some(DebugControl::Nothing)
    }

    /// disassembly [address] [amount], both hexadecimal.
    fn cmd_disassembly(&mut self, address: Option<&str>, amount: Option<&str>) {
        let mut address_value = self.cpu.regs().pc as u32;
        let mut amount_value: u32 = 1;

        if let Some(text) = address {
            match u32::from_str_radix(text, 16) {
                Ok(a) => address_value = a,
                Err(_) => {
                    prints!("§9Invalid address '{}'.\n§R", text);
                    return;
                }
            }
        }

        if let Some(text) = amount {
            match u32::from_str_radix(text, 16) {
                Ok(n) => amount_value = n,
                Err(_) => {
                    prints!("§9Invalid amount '{}'.\n§R", text);
                    return;
                }
            }
        }

        if address_value as usize >= self.memory.len() {
            prints!(
                "Memory address 0x{:X} out of bounds (0x{:X})\n",
                address_value,
                self.memory.len()
            );
            return;
        }

        for i in 0..amount_value {
            let addr = address_value.saturating_add(i);
            if addr as usize >= self.memory.len() {
                prints!(
                    "§9Instruction address 0x{:X} out of bounds (0x{:X})\n§R",
                    addr,
                    self.memory.len()
                );
                return;
            }
            self.print_disassembly_line(addr as u16);
        }
    }

    /// memory <address> [words], both hexadecimal; eight words per line.
    fn cmd_memory(&mut self, address: Option<&str>, words: Option<&str>) {
        let Some(text) = address else {
            prints!("A source point must be passed to the memory command.\n");
            return;
        };

        let point = match u32::from_str_radix(text, 16) {
            Ok(p) => p,
            Err(_) => {
                prints!("§9Invalid address '{}'.\n§R", text);
                return;
            }
        };

        let mut word_count: u32 = 8;
        if let Some(text) = words {
            match u32::from_str_radix(text, 16) {
                Ok(n) => word_count = n,
                Err(_) => {
                    prints!("§9Invalid word count '{}'.\n§R", text);
                    return;
                }
            }
        }

        for i in 0..word_count {
            let addr = point.saturating_add(i);
            if addr as usize >= self.memory.len() {
                prints!(
                    "§9Memory address 0x{:X} out of bounds (0x{:X})\n§R",
                    addr,
                    self.memory.len()
                );
                return;
            }

            if i % 8 == 0 {
                prints!("§F\n[{:3X}h] §R", addr);
            }
            prints!("{:04X} ", self.memory.get(addr as u16));
        }

        prints!("\n");
    }

    /// break [address] [hits]: address is hexadecimal, hits decimal.
    /// Defaults to the current PC and an unlimited hit count.
    fn cmd_breakpoint(&mut self, address: Option<&str>, hits: Option<&str>) {
        let mut address_value = self.cpu.regs().pc as u32;
        let mut hits_value: i32 = -1;

        if let Some(text) = address {
            match u32::from_str_radix(text, 16) {
                Ok(a) => address_value = a,
                Err(_) => {
                    prints!("§9Invalid address '{}'.\n§R", text);
                    return;
                }
            }
        }

        if let Some(text) = hits {
            match text.parse::<i32>() {
                Ok(h) => hits_value = h,
                Err(_) => {
                    prints!("§9Invalid hit count '{}'.\n§R", text);
                    return;
                }
            }
        }

        if address_value as usize >= self.memory.len() {
            prints!("§9Address out of bounds.\n§R");
            return;
        }

        self.debugger.breakpoints.set(address_value as u16, hits_value);
        prints!("§2Breakpoint set at§3 0x{:03X}.\n§R", address_value);
    }

    /// log <level>: changes the tracing filter at runtime.
    fn cmd_log(&mut self, level: Option<&str>) {
        match (level, &self.logger) {
            (Some(level), Some(logger)) => logger.set_log_level(level),
            (None, _) => prints!("§9A level must be passed to the log command.\n§R"),
            (_, None) => prints!("§9Logging is not available.\n§R"),
        }
    }

    fn dump_registers(&self) {
        let regs = self.cpu.regs();
        prints!("---- Program registers ----\n");
        prints!("PC:  0x{:04x}\n", regs.pc);
        prints!("RI:  0x{:04x}\n", regs.ri);
        prints!("PSW: 0x{:04x}\n", regs.psw);
        prints!(
            "  OV={} UN={} LE={} EQ={} GR={}\n",
            regs.psw_bit(PSW_OV_BIT) as u8,
            regs.psw_bit(PSW_UN_BIT) as u8,
            regs.psw_bit(PSW_LE_BIT) as u8,
            regs.psw_bit(PSW_EQ_BIT) as u8,
            regs.psw_bit(PSW_GR_BIT) as u8
        );
        prints!("R:   0x{:04x}\n", regs.r);
        prints!("\n");
        prints!("A:   0x{:04x}\n", regs.a);
        prints!("B:   0x{:04x}\n", regs.b);
        prints!("C:   0x{:04x}\n", regs.c);
        prints!("D:   0x{:04x}\n", regs.d);
    }

    /// One trace line: address (colored by breakpoint state), the raw
    /// opcode.argument nibbles and the disassembled instruction.
    fn print_disassembly_line(&self, address: u16) {
        if address as usize >= self.memory.len() {
            prints!(
                "§9Instruction address 0x{:X} out of bounds (0x{:X})\n§R",
                address,
                self.memory.len()
            );
            return;
        }

        let word = self.memory.get(address);
        let instruction = Instruction(word);

        let prefix = match self.debugger.breakpoints.get(address) {
            // disabled breakpoints show up dimmed purple, active ones red
            Some(0) => format!("§D{{{:3X}h}}§5 ", address),
            Some(_) => format!("§9{{{:3X}h}}§1 ", address),
            None => format!("§F[{:3X}h]§R ", address),
        };

        let dis = disassembler::disassemble(address, word, self.extended_notation);
        prints!(
            "{}{:X}.{:03X}: {}§R\n",
            prefix,
            instruction.opcode_bits(),
            instruction.argument(),
            dis.text
        );
    }

    fn cmd_help(&self) {
        prints!("Pressing §9CTRL-C§R at any time will interrupt emulation.");
        prints!("\nPressing it in quick succession will §9quit§R the emulator entirely.\n");
        prints!("§6\nhelp:§R prints this help guide.\n");
        prints!("§6\nquit, q:§R quits out of the emulator.\n");
        prints!("\n§6step, s§E [amount]§R");
        prints!("\n    Steps through§E amount§R of instructions and no further.\n");
        prints!("    If no amount is specified, steps a single instruction.\n");
        prints!("§6\ncontinue, c");
        prints!("§R\n    Leaves step-through mode and lets the emulator run freely.\n");
        prints!("    Execution will be stopped upon encountering a fault or the user\n");
        prints!("    pressing CTRL-C.\n");
        prints!("§6\nreset");
        prints!("§R\n    Resets the memory state as it were in the beginning of the emulation\n");
        prints!("    and clears all registers.\n");
        prints!("\n§6break, b§E [address] [hits]§R");
        prints!("\n    Sets or unsets a breakpoint at a memory§E address§R.\n");
        prints!("    If no address is specified, the breakpoint will be set at the current location.\n");
        prints!("    The optional§E hits§R parameter causes the breakpoint to be disabled\n");
        prints!("    automatically after being hit the specified amount of times.\n");
        prints!("§6\nregisters, regs, r");
        prints!("§R\n    View the contents of all CPU registers.\n");
        prints!("\n§6memory, m, x§E <address> [words]§R");
        prints!("\n    Views the contents of the emulator memory at the given§E address§R with an\n");
        prints!("    optional amount of§E words§R to display.\n");
        prints!("\n§6disassembly, d§E [address] [amount]§R");
        prints!("\n    Disassembles the given§E amount§R of instructions at the§E address§R specified.\n");
        prints!("    If no address is specified, prints the current instruction.\n");
        prints!("\n§6log§E <level>§R");
        prints!("\n    Changes the log filter of the emulator at runtime.\n");
        prints!("§6\nnobreak:§R disables emulator pauses on cpu faults.\n");
        prints!("§6\ndobreak:§R reenables emulator pauses on cpu faults.\n");
    }
}
