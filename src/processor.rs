use crate::assembler::BinaryWord;
use crate::config;
use crate::display::{Display, Plane};
use crate::error::RuntimeError;
use crate::opcodes::{AluMode, AluOp, Condition, DisplayOp, Family, OpcodeTable, Source};

/// Supplies the two input-port values, sampled once per cycle.
pub trait InputSource {
    fn sample(&mut self, cycle: u64) -> [i32; 2];
}

impl<F> InputSource for F
where
    F: FnMut(u64) -> [i32; 2],
{
    fn sample(&mut self, cycle: u64) -> [i32; 2] {
        self(cycle)
    }
}

/// Input ports held at fixed values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstantInput(pub [i32; 2]);

impl InputSource for ConstantInput {
    fn sample(&mut self, _cycle: u64) -> [i32; 2] {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicrocontrollerState {
    pub w: i32,
    pub memory: Vec<i32>,
    pub program_counter: u32,
    pub call_stack: Vec<u32>,
    pub frame_stack: Vec<u32>,
    pub frame_size: u32,
    pub outputs: [i32; 2],
    pub inputs: [i32; 2],
    pub display: Display,
    pub cycles: u64,
    pub halted: bool,
}

impl MicrocontrollerState {
    pub fn new() -> Self {
        MicrocontrollerState {
            w: 0,
            memory: vec![0; config::MEMORY_SIZE],
            program_counter: 1,
            call_stack: Vec::new(),
            frame_stack: Vec::new(),
            frame_size: 0,
            outputs: [0; 2],
            inputs: [0; 2],
            display: Display::new(),
            cycles: 0,
            halted: false,
        }
    }

    /// Memory offset of the frame currently executing.
    pub fn frame_base(&self) -> u32 {
        self.frame_stack.last().copied().unwrap_or(0)
    }

    fn slot(&self, address: i64) -> Result<usize, RuntimeError> {
        let absolute = address + i64::from(self.frame_base());
        if absolute < 0 || absolute >= self.memory.len() as i64 {
            return Err(RuntimeError::MemoryOutOfBounds { address: absolute, pc: self.program_counter });
        }
        Ok(absolute as usize)
    }

    /// Reads `F[address + frame_base]`.
    pub fn load(&self, address: i64) -> Result<i32, RuntimeError> {
        Ok(self.memory[self.slot(address)?])
    }

    pub fn store(&mut self, address: i64, value: i32) -> Result<(), RuntimeError> {
        let slot = self.slot(address)?;
        self.memory[slot] = value;
        Ok(())
    }
}

impl Default for MicrocontrollerState {
    fn default() -> Self {
        Self::new()
    }
}

fn compute(op: AluOp, w: i32, operand: i32) -> i32 {
    match op {
        AluOp::Add => w.wrapping_add(operand),
        AluOp::Sub => w.wrapping_sub(operand),
        AluOp::Mul => w.wrapping_mul(operand),
        AluOp::Div if operand == 0 => 0,
        AluOp::Div => w.wrapping_div(operand),
        AluOp::Mod if operand == 0 => 0,
        AluOp::Mod => w.wrapping_rem(operand),
        AluOp::Incr => operand.wrapping_add(1),
        AluOp::Decr => operand.wrapping_sub(1),
        AluOp::Rol => (operand as u32).rotate_left(1) as i32,
        AluOp::Ror => (operand as u32).rotate_right(1) as i32,
        AluOp::Nand => !(w & operand),
        AluOp::Nor => !(w | operand),
        AluOp::Xor => w ^ operand,
    }
}

pub struct Processor {
    words: Vec<BinaryWord>,
    opcodes: OpcodeTable,
    state: MicrocontrollerState,
    cycle_limit: u64,
}

impl Processor {
    pub fn new(words: Vec<BinaryWord>) -> Self {
        Processor {
            words,
            opcodes: OpcodeTable::new(),
            state: MicrocontrollerState::new(),
            cycle_limit: config::CYCLE_TIMEOUT,
        }
    }

    pub fn with_cycle_limit(mut self, cycle_limit: u64) -> Self {
        self.cycle_limit = cycle_limit;
        self
    }

    pub fn state(&self) -> &MicrocontrollerState {
        &self.state
    }

    pub fn into_state(self) -> MicrocontrollerState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state.halted
    }

    /// Runs until HALT or until the cycle ceiling is exceeded.
    pub fn run(&mut self, input: &mut dyn InputSource) -> Result<&MicrocontrollerState, RuntimeError> {
        self.run_observed(input, |_| {})
    }

    /// Like `run`, calling `observe` with the state after every cycle.
    pub fn run_observed<F>(&mut self, input: &mut dyn InputSource, mut observe: F) -> Result<&MicrocontrollerState, RuntimeError>
    where
        F: FnMut(&MicrocontrollerState),
    {
        while !self.state.halted {
            if self.state.cycles >= self.cycle_limit {
                return Err(RuntimeError::CycleTimeout { cycles: self.state.cycles });
            }
            self.step(input)?;
            observe(&self.state);
        }
        tracing::info!(cycles = self.state.cycles, w = self.state.w, "program halted");
        Ok(&self.state)
    }

    /// Executes exactly one fetch-decode-execute cycle. Does nothing once halted.
    pub fn step(&mut self, input: &mut dyn InputSource) -> Result<(), RuntimeError> {
        if self.state.halted {
            return Ok(());
        }

        let pc = self.state.program_counter;
        let word = pc
            .checked_sub(1)
            .and_then(|index| self.words.get(index as usize))
            .copied()
            .ok_or(RuntimeError::ProgramCounterOutOfRange { pc })?;
        let opcode = self
            .opcodes
            .decode(word.opcode())
            .ok_or(RuntimeError::UnknownInstruction { opcode: word.opcode(), address: pc })?;
        let family = opcode.family;
        let literal = word.literal();

        self.state.inputs = input.sample(self.state.cycles);
        self.state.cycles += 1;
        tracing::trace!(pc, mnemonic = %opcode.mnemonic, literal, w = self.state.w, "step");

        self.execute(family, literal)
    }

    fn execute(&mut self, family: Family, literal: u32) -> Result<(), RuntimeError> {
        let state = &mut self.state;
        let address = i64::from(literal);
        let next = state.program_counter + 1;

        match family {
            Family::Halt => {
                state.halted = true;
                return Ok(());
            }
            Family::Nop | Family::Pulse => {}
            Family::Var => state.frame_size = state.frame_size.max(literal),
            Family::MovLW => state.w = literal as i32,
            Family::MovWF => {
                let w = state.w;
                state.store(address, w)?;
            }
            Family::MovFW => state.w = state.load(address)?,
            Family::MovLF => {
                let target = i64::from(state.w);
                state.store(target, literal as i32)?;
            }
            Family::Call => {
                let base = state.frame_base() + state.frame_size;
                state.call_stack.push(next);
                state.frame_stack.push(base);
                state.frame_size = 0;
                state.program_counter = literal;
                return Ok(());
            }
            Family::Ret | Family::RetLW | Family::RetFW => {
                match family {
                    Family::RetLW => state.w = literal as i32,
                    Family::RetFW => state.w = state.load(address)?,
                    _ => {}
                }
                let pc = state.program_counter;
                let (Some(target), Some(base)) = (state.call_stack.pop(), state.frame_stack.pop()) else {
                    return Err(RuntimeError::CallStackUnderflow { pc });
                };
                state.frame_size = base.saturating_sub(state.frame_base());
                state.program_counter = target;
                return Ok(());
            }
            Family::Goto => {
                state.program_counter = literal;
                return Ok(());
            }
            Family::Alu { op, mode } => {
                let operand = match mode {
                    AluMode::Immediate => literal as i32,
                    AluMode::ToW | AluMode::ToF => state.load(address)?,
                };
                let result = compute(op, state.w, operand);
                match mode {
                    AluMode::ToF => state.store(address, result)?,
                    _ => state.w = result,
                }
            }
            Family::Compare { condition, source, skip } => {
                let operand = match source {
                    Source::Memory => state.load(address)?,
                    _ => literal as i32,
                };
                let holds = match condition {
                    Condition::Greater => state.w > operand,
                    Condition::Less => state.w < operand,
                    Condition::Equal => state.w == operand,
                };
                state.program_counter += if holds { 1 } else { u32::from(skip) + 2 };
                return Ok(());
            }
            Family::Write { port, source } => {
                state.outputs[port] = match source {
                    Source::Literal => literal as i32,
                    Source::W => state.w,
                    Source::Memory => state.load(address)?,
                };
            }
            Family::Read { port, to_memory } => {
                let value = state.inputs[port];
                if to_memory {
                    state.store(address, value)?;
                } else {
                    state.w = value;
                }
            }
            Family::Display { op: DisplayOp::Save, .. } => {
                let plane = *state.display.active_plane();
                for (offset, row) in plane.iter().enumerate() {
                    state.store(address + offset as i64, *row as i32)?;
                }
            }
            Family::Display { op: DisplayOp::Load, .. } => {
                let mut plane: Plane = [0; config::SCREEN_WIDTH];
                for (offset, row) in plane.iter_mut().enumerate() {
                    *row = state.load(address + offset as i64)? as u32;
                }
                state.display.load_active(plane);
            }
            Family::Display { op, source } => {
                let value = match source {
                    Source::Memory => state.load(address)? as u32,
                    _ => literal,
                };
                state.display.execute(op, value);
            }
        }

        state.program_counter = next;
        Ok(())
    }
}
