//! The register-machine processor core.
//!
//! Private register fields sit behind plain accessors, with a bounded
//! inner loop that returns promptly after a fixed amount of work and
//! `log::warn!`/`log::debug!` calls on conditions that halt or stall
//! execution rather than a panic. [`Processor::cycle`] runs up to
//! `Multiplier` fetch/execute/writeback sub-steps per call, because the
//! controller is driven by an external clock rather than by free-running
//! instruction throughput.

mod execute;
mod fetch;
mod writeback;

use crate::assembler::{Program, RegisterRef};
use crate::config::{Config, DebugMode, DEBUG_OUTPUT_ADDRESS};
use crate::error::ChannelError;
use crate::observer::ProcessorObserver;
use crate::value::{FlagUpdate, Value};

pub(crate) use execute::ExecuteOutcome;
pub(crate) use fetch::FetchOutcome;

/// Whether the processor is accepting `cycle()` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingState {
    Working,
    Stopped,
}

/// The outcome of the most recently completed `cycle()`: whether it ran dry
/// waiting on an external resource, or made it through normally. A tick
/// that stalls on a pending memory read, an unset input channel, or an
/// already-full output channel is `Underloaded`; one that completes its
/// sub-steps, hits `nop`/an out-of-range `ip`, writes back to a memory
/// reference, or hits `brk` is `FullyConsumed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Underloaded,
    FullyConsumed,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct InputLatchFull {
    int: i32,
    float: f32,
    string: String,
    set: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct OutputLatch {
    value: Option<Value>,
    set: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Flags {
    of: bool,
    sf: bool,
    zf: bool,
    cf: bool,
}

impl Flags {
    fn apply(&mut self, update: FlagUpdate) {
        if let Some(of) = update.of {
            self.of = of;
        }
        if let Some(sf) = update.sf {
            self.sf = sf;
        }
        if let Some(zf) = update.zf {
            self.zf = zf;
        }
        if let Some(cf) = update.cf {
            self.cf = cf;
        }
    }

    fn as_bits(self) -> u8 {
        ((self.of as u8) << 3) | ((self.sf as u8) << 2) | ((self.zf as u8) << 1) | (self.cf as u8)
    }

    fn from_bits(bits: u8) -> Flags {
        Flags {
            of: bits & 0b1000 != 0,
            sf: bits & 0b0100 != 0,
            zf: bits & 0b0010 != 0,
            cf: bits & 0b0001 != 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct PendingMemory {
    address: u32,
    last_value: Option<String>,
}

/// The processor's full architectural state, execution-engine internals
/// private, `cycle()`/`load()`/`channel()`/`memory()` the only ways a host
/// mutates it.
#[derive(Debug, Clone)]
pub struct Processor {
    ir: [i32; 8],
    fr: [f32; 8],
    sr: [String; 8],
    inputs: [InputLatchFull; 4],
    outputs: [OutputLatch; 4],
    ip: u32,
    flags: Flags,
    pending: Option<PendingMemory>,
    program: Program,
    config: Config,
    working: WorkingState,
    load_state: LoadState,
}

impl Processor {
    pub fn new(config: Config) -> Self {
        Processor {
            ir: [0; 8],
            fr: [0.0; 8],
            sr: Default::default(),
            inputs: Default::default(),
            outputs: Default::default(),
            ip: 0,
            flags: Flags::default(),
            pending: None,
            program: Program::default(),
            config,
            working: WorkingState::Stopped,
            load_state: LoadState::FullyConsumed,
        }
    }

    /// Replaces the program image and resets all architectural state.
    pub fn load(&mut self, program: Program) {
        self.program = program;
        self.reset();
    }

    /// Zeroes registers/flags/latches and sets `ip = 0`, keeping the
    /// program image and any in-flight memory request untouched: neither
    /// `stop()` nor `reset()` aborts a pending fetch.
    pub fn reset(&mut self) {
        self.ir = [0; 8];
        self.fr = [0.0; 8];
        self.sr = Default::default();
        self.inputs = Default::default();
        self.outputs = Default::default();
        self.ip = 0;
        self.flags = Flags::default();
    }

    pub fn start(&mut self) {
        self.working = WorkingState::Working;
    }

    pub fn stop(&mut self) {
        self.working = WorkingState::Stopped;
    }

    /// Advances at most `Multiplier` fetch/execute/writeback sub-steps,
    /// then flushes any output latches with `set? == true` in ascending
    /// channel order.
    pub fn cycle(&mut self, observer: &mut dyn ProcessorObserver) {
        if self.working == WorkingState::Stopped {
            return;
        }

        self.load_state = LoadState::FullyConsumed;
        let step_limit = self.config.multiplier();
        let mut steps_run = 0u8;

        for _ in 0..step_limit {
            steps_run += 1;
            match self.sub_step(observer) {
                SubStepOutcome::Continue => {}
                SubStepOutcome::EndTick { underloaded } => {
                    if underloaded {
                        self.load_state = LoadState::Underloaded;
                    }
                    break;
                }
            }
            if self.config.debug_mode() == DebugMode::StepByStep {
                self.working = WorkingState::Stopped;
                break;
            }
        }
        log::trace!("cycle ran {steps_run} sub-step(s), ip now {}", self.ip);

        self.flush_outputs(observer);
    }

    fn sub_step(&mut self, observer: &mut dyn ProcessorObserver) -> SubStepOutcome {
        if self.ip as usize >= self.program.len() {
            return SubStepOutcome::EndTick { underloaded: false };
        }

        let opcode = self.program.opcodes[self.ip as usize].clone();
        self.ip += 1;

        if opcode.operation == crate::opcode::Operation::Nop {
            return SubStepOutcome::EndTick { underloaded: false };
        }

        let fetched = match fetch::fetch(self, &opcode, observer) {
            FetchOutcome::Stalled => {
                self.ip -= 1;
                return SubStepOutcome::EndTick { underloaded: true };
            }
            FetchOutcome::Fetched(slots) => slots,
        };

        let outcome = execute::execute(self, &opcode, fetched, observer);

        if self.config.debug_mode() == DebugMode::Verbose {
            let line = format!("{} @ line {}", opcode.operation.mnemonic(), opcode.source_line);
            log::trace!("verbose: {line}");
            observer.memory_write(DEBUG_OUTPUT_ADDRESS, &line);
        }

        match writeback::writeback(self, &opcode, outcome, observer) {
            writeback::WritebackOutcome::WroteMemory => SubStepOutcome::EndTick { underloaded: false },
            writeback::WritebackOutcome::EndsTick => SubStepOutcome::EndTick { underloaded: false },
            writeback::WritebackOutcome::Continue => SubStepOutcome::Continue,
        }
    }

    fn flush_outputs(&mut self, observer: &mut dyn ProcessorObserver) {
        for index in 0..4 {
            if self.outputs[index].set {
                if let Some(value) = &self.outputs[index].value {
                    observer.channel_write(index as u8, &value.stringify_selected());
                }
                self.outputs[index].set = false;
            }
        }
    }

    /// Delivers an input signal: `raw` is parsed as int and float (both
    /// falling back to `0`/`0.0`), stored verbatim as a string too, and
    /// `in[index].set?` is set.
    pub fn channel(&mut self, index: u8, raw: &str) -> Result<(), ChannelError> {
        if index >= 4 {
            log::warn!("channel index {index} is out of range, expected 0..=3");
            return Err(ChannelError::IndexOutOfRange(index));
        }
        let latch = &mut self.inputs[index as usize];
        latch.int = raw.parse::<i32>().unwrap_or(0);
        latch.float = raw.parse::<f32>().unwrap_or(0.0);
        latch.string = raw.to_string();
        latch.set = true;
        Ok(())
    }

    /// Satisfies the outstanding memory read with `raw`. If no read is
    /// pending, or the value already arrived, this simply overwrites the
    /// buffered reply the next fetch will consume -- pairing requests to
    /// replies is the caller's responsibility.
    pub fn memory(&mut self, raw: &str) {
        if let Some(pending) = &mut self.pending {
            pending.last_value = Some(raw.to_string());
        } else {
            self.pending = Some(PendingMemory {
                address: 0,
                last_value: Some(raw.to_string()),
            });
        }
    }

    pub fn working_state(&self) -> WorkingState {
        self.working
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn ip(&self) -> u32 {
        self.ip
    }

    pub fn ir(&self, index: u8) -> i32 {
        self.ir[index as usize]
    }

    pub fn fr(&self, index: u8) -> f32 {
        self.fr[index as usize]
    }

    pub fn sr(&self, index: u8) -> &str {
        &self.sr[index as usize]
    }

    /// An input channel latch's materialized readings and whether it is
    /// currently `set?`; exposed for a debug UI.
    pub fn input_latch(&self, index: u8) -> (i32, f32, &str, bool) {
        let latch = &self.inputs[index as usize];
        (latch.int, latch.float, latch.string.as_str(), latch.set)
    }

    /// An output channel latch's pending value (if any) and whether it is
    /// awaiting flush.
    pub fn output_latch(&self, index: u8) -> (Option<&Value>, bool) {
        let latch = &self.outputs[index as usize];
        (latch.value.as_ref(), latch.set)
    }

    pub fn flags(&self) -> (bool, bool, bool, bool) {
        (self.flags.of, self.flags.sf, self.flags.zf, self.flags.cf)
    }

    pub fn multiplier(&self) -> u8 {
        self.config.multiplier()
    }

    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }
}

enum SubStepOutcome {
    Continue,
    EndTick { underloaded: bool },
}

/// Resolves the memory address an `arg` (reference) denotes: `literal_int`
/// if present, else `ir_registers[arg_register_index]`.
fn resolve_memory_address(processor: &Processor, arg: &crate::assembler::Arg) -> u32 {
    match &arg.literal {
        Some(crate::assembler::Literal::Int(n)) => *n as u32,
        _ => match arg.register {
            Some(RegisterRef::Ir(i)) => processor.ir[i as usize] as u32,
            _ => 0,
        },
    }
}

fn value_from_literal(literal: &crate::assembler::Literal) -> Value {
    match literal {
        crate::assembler::Literal::Int(n) => Value::int(*n as i32),
        crate::assembler::Literal::Float(f) => Value::float(*f),
        crate::assembler::Literal::Str(s) => Value::string(s.clone()),
        crate::assembler::Literal::Label(_) => {
            unreachable!("labels are resolved to Int literals before execution")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::compile;
    use crate::observer::RecordingObserver;

    fn run(program_lines: &[&str]) -> (Processor, RecordingObserver) {
        let program = compile(program_lines).unwrap();
        let mut processor = Processor::new(Config::default());
        processor.load(program);
        processor.start();
        (processor, RecordingObserver::default())
    }

    #[test]
    fn hello_world_echo() {
        let (mut p, mut obs) = run(&["mov ou0 \"hi\""]);
        p.cycle(&mut obs);
        assert_eq!(obs.channel_writes, vec![(0, "hi".to_string())]);
        assert_eq!(p.working_state(), WorkingState::Working);
    }

    #[test]
    fn memory_round_trip() {
        let (mut p, mut obs) = run(&["mov ir0 7", "mov [ir0] 42", "mov ir1 [ir0]"]);

        p.cycle(&mut obs);
        assert_eq!(obs.memory_writes, vec![(7, "42".to_string())]);

        p.cycle(&mut obs);
        assert_eq!(obs.memory_reads, vec![7]);
        assert_eq!(p.load_state(), LoadState::Underloaded);

        p.memory("42");
        p.cycle(&mut obs);
        assert_eq!(p.ir(1), 42);
    }

    #[test]
    fn conditional_branch() {
        let (mut p, mut obs) = run(&[
            "mov ir0 5",
            "cmp ir0 5",
            "je done",
            "mov ou0 \"no\"",
            "done: mov ou0 \"yes\"",
        ]);
        for _ in 0..4 {
            p.cycle(&mut obs);
        }
        assert_eq!(obs.channel_writes, vec![(0, "yes".to_string())]);
    }

    #[test]
    fn input_channel_one_shot() {
        let (mut p, mut obs) = run(&["mov ir0 in1", "mov ir1 in1"]);
        p.channel(1, "9").unwrap();
        p.cycle(&mut obs);
        assert_eq!(p.ir(0), 9);
        assert_eq!(p.load_state(), LoadState::Underloaded);
        assert_eq!(p.ip(), 1);
    }

    #[test]
    fn carry_and_overflow_flags() {
        let (mut p, mut obs) = run(&["mov ir0 0x7FFFFFFF", "add ir0 1"]);
        p.cycle(&mut obs);
        assert_eq!(p.ir(0), i32::MIN);
        let (of, sf, zf, cf) = p.flags();
        assert!(sf);
        assert!(!zf);
        assert!(of);
        assert!(!cf);
    }

    #[test]
    fn channel_out_of_range_is_an_error() {
        let (mut p, _obs) = run(&["nop"]);
        assert!(p.channel(4, "1").is_err());
    }

    #[test]
    fn stopped_processor_ignores_cycle() {
        let program = compile(&["mov ou0 \"hi\""]).unwrap();
        let mut p = Processor::new(Config::default());
        p.load(program);
        let mut obs = RecordingObserver::default();
        p.cycle(&mut obs);
        assert!(obs.channel_writes.is_empty());
    }
}
