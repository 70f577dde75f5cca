//! Writeback stage: store the execute stage's result into arg1's
//! register/channel/memory slot, and update flags.
//!
//! Every operation's result lands in arg1 (see the comment on
//! [`crate::opcode::Operation::operands`]); operations whose arg1 mask is
//! read-only (`cmp`, `test`) still reach here with a computed value, but
//! it's discarded -- only the flag update is applied.

use super::{resolve_memory_address, ExecuteOutcome, Processor};
use crate::assembler::{Opcode, RegisterRef};
use crate::observer::ProcessorObserver;
use crate::value::Value;

pub(crate) enum WritebackOutcome {
    WroteMemory,
    EndsTick,
    Continue,
}

pub(crate) fn writeback(
    processor: &mut Processor,
    opcode: &Opcode,
    outcome: ExecuteOutcome,
    observer: &mut dyn ProcessorObserver,
) -> WritebackOutcome {
    // `brk` halts the processor from inside execute; nothing further to do
    // this sub-step.
    if processor.working == super::WorkingState::Stopped {
        return WritebackOutcome::EndsTick;
    }

    let (value, flags) = match outcome {
        ExecuteOutcome::NoResult => return WritebackOutcome::Continue,
        ExecuteOutcome::Result { value, flags } => (value, flags),
    };

    if opcode.operation.touches_flags() {
        processor.flags.apply(flags);
    }

    let declared = opcode.operation.operands().get(0);
    let is_writable = declared.map(|d| d.is_writable()).unwrap_or(false);
    if !is_writable {
        // `cmp`/`test`: flags only, arg1's value is discarded.
        return WritebackOutcome::Continue;
    }

    let arg1 = &opcode.arg1;
    if arg1.is_reference {
        let address = resolve_memory_address(processor, arg1);
        observer.memory_write(address, &value.stringify_selected());
        return WritebackOutcome::WroteMemory;
    }

    match arg1.register {
        Some(RegisterRef::Ir(i)) => processor.ir[i as usize] = value.coerce_int(),
        Some(RegisterRef::Fr(i)) => processor.fr[i as usize] = value.coerce_float(),
        Some(RegisterRef::Sr(i)) => processor.sr[i as usize] = value.stringify_selected(),
        Some(RegisterRef::Ou(i)) => write_output_channel(processor, i, value),
        Some(RegisterRef::In(_)) | None => {
            // `inx` never validates as a writable destination; an opcode
            // built outside the assembler could reach here, in which case
            // there's nothing sane to do.
        }
    }

    WritebackOutcome::Continue
}

/// Stores `value` into output latch `index`, preserving every kind it
/// carries and recording the highest-precedence one as the latch's
/// stringify-on-flush kind.
fn write_output_channel(processor: &mut Processor, index: u8, value: Value) {
    let latch = &mut processor.outputs[index as usize];
    latch.value = Some(value);
    latch.set = true;
}
