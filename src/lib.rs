//! `relaycpu`: an in-world programmable controller -- a single-pass
//! assembler paired with a register-machine processor running under a
//! cooperative, externally clocked cycle model.
//!
//! Two halves, two modules: [`assembler::compile`] turns program text into
//! a [`assembler::Program`] of typed [`assembler::Opcode`]s, and
//! [`processor::Processor`] executes that program one `cycle()` at a time,
//! stalling on unavailable external memory or an undelivered output signal
//! rather than ever blocking the caller.

pub mod assembler;
pub mod config;
pub mod error;
pub mod observer;
pub mod opcode;
pub mod processor;
pub mod value;

pub use assembler::{compile, Program};
pub use config::{Config, DebugMode};
pub use error::{AssembleError, AssembleErrorKind, ChannelError, ConfigError};
pub use observer::{NullObserver, ProcessorObserver, RecordingObserver};
pub use processor::{LoadState, Processor, WorkingState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_hello_world() {
        let program = compile(&["mov ou0 \"hi\""]).unwrap();
        let mut cpu = Processor::new(Config::default());
        cpu.load(program);
        cpu.start();
        let mut obs = RecordingObserver::default();
        cpu.cycle(&mut obs);
        assert_eq!(obs.channel_writes, vec![(0, "hi".to_string())]);
    }
}
