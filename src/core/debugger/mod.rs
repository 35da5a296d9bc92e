use std::collections::HashMap;
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::cpu::instruction::Opcode;
use crate::core::interrupt::BreakRequest;
use crate::prints;

/// What the REPL told the main loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugControl {
    Nothing,
    Reset,
    Quit,
}

/// Address-keyed breakpoint table. `hits` semantics: 0 disabled but
/// present, positive counts down on every trigger, negative never runs
/// out.
#[derive(Debug, Default)]
pub struct Breakpoints {
    map: HashMap<u16, i32>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a breakpoint, replacing the hit count of an existing one
    /// at the same address.
    pub fn set(&mut self, address: u16, hits: i32) {
        self.map.insert(address, hits);
    }

    pub fn get(&self, address: u16) -> Option<i32> {
        self.map.get(&address).copied()
    }

    pub fn get_mut(&mut self, address: u16) -> Option<&mut i32> {
        self.map.get_mut(&address)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Debugger controller state consulted before every instruction.
pub struct Debugger {
    pub breaking: bool,
    pub steps_left: u32,
    pub break_on_faults: bool,
    pub break_at_halt: bool,
    pub breakpoints: Breakpoints,
    pub last_command: String,
    pub first_break: bool,
    break_request: Arc<BreakRequest>,
}

impl Debugger {
    pub fn new(config: &Config) -> Self {
        let interactive = !config.dummy_mode;
        Debugger {
            breaking: interactive && config.start_in_breaking_mode,
            steps_left: 0,
            break_on_faults: interactive && config.break_at_faults,
            break_at_halt: interactive && config.break_at_halt,
            breakpoints: Breakpoints::new(),
            last_command: String::new(),
            first_break: true,
            break_request: BreakRequest::new(),
        }
    }

    pub fn break_request(&self) -> Arc<BreakRequest> {
        self.break_request.clone()
    }

    /// Puts the debugger into step-through mode, cancelling any pending
    /// step sequence.
    pub fn arm(&mut self) {
        self.breaking = true;
        self.steps_left = 0;
    }

    /// Folds a pending Ctrl-C into break mode. Returns true when one was
    /// pending.
    pub fn poll_break_request(&mut self) -> bool {
        if self.break_request.take() {
            self.arm();
            return true;
        }
        false
    }

    /// The first half of the pre-execute hook: breakpoints at the current
    /// PC, then the break-at-halt policy for the fetched opcode.
    pub fn check_break_conditions(&mut self, pc: u16, opcode: Opcode) {
        if let Some(hits) = self.breakpoints.get_mut(pc)
            && *hits != 0
        {
            if *hits > 0 {
                *hits -= 1;
            }
            let hits = *hits;

            self.arm();
            prints!("§2You've hit a breakpoint at §30x{:03X}.\n§R", pc);
            if hits > 0 {
                prints!("§2This breakpoint has§3 {} §2hits left.\n§R", hits);
            } else if hits == 0 {
                prints!("§2This breakpoint was disabled.\n§R");
            }
        } else if self.break_at_halt && opcode == Opcode::HLT {
            self.arm();
        }
    }
}
