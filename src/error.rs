//! Crate-wide error types: a plain `thiserror` enum per failure surface,
//! one variant per rule, so callers can match on the rule instead of
//! parsing the rendered message.

use thiserror::Error;

/// Every validation rule `assembler::compile` can fail on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleErrorKind {
    #[error("unknown mnemonic '{0}'")]
    UnknownMnemonic(String),
    #[error("unknown register '{0}'")]
    UnknownRegister(String),
    #[error("malformed literal '{0}'")]
    MalformedLiteral(String),
    #[error("label '{0}' reuses a register name")]
    LabelReusesRegisterName(String),
    #[error("label with same name already defined: {0}")]
    DuplicateLabel(String),
    #[error("label '{0}' may not begin with a digit or '-'")]
    InvalidLabelName(String),
    #[error("memory reference must contain an integer literal or an irN register, found '{0}'")]
    InvalidMemoryReferenceInner(String),
    #[error("output channel register 'ou{0}' may not be used inside a memory reference")]
    OutputChannelInMemoryReference(u8),
    #[error("operand {0} kind is not accepted by '{1}': {2}")]
    OperandKindMismatch(usize, &'static str, String),
    #[error("'{0}' takes {1} operand(s), found {2}")]
    WrongOperandCount(&'static str, usize, usize),
    #[error("only one memory-reference operand may be readable per instruction")]
    MultipleReadableMemoryReferences,
    #[error("arg3 may not be a memory reference")]
    Arg3IsMemoryReference,
    #[error("unresolved label '{0}'")]
    UnresolvedLabel(String),
}

/// The first error encountered while assembling, with the 0-based source
/// line index it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct AssembleError {
    pub line: usize,
    pub kind: AssembleErrorKind,
}

impl AssembleError {
    pub fn new(line: usize, kind: AssembleErrorKind) -> Self {
        AssembleError { line, kind }
    }
}

/// Runtime error surfaced directly to a caller by `channel(index >= 4,
/// ...)`. Every other runtime condition is absorbed into processor state
/// instead of raised as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel index {0} is out of range (expected 0..=3)")]
    IndexOutOfRange(u8),
}

/// Raised by [`crate::config::Config::new`] when `multiplier` falls
/// outside `[1, 16]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("multiplier {0} is out of range (expected 1..=16)")]
    MultiplierOutOfRange(u8),
}
