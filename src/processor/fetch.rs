//! Fetch stage: materialize operand values, enforcing the stall contract.

use super::{resolve_memory_address, value_from_literal, PendingMemory, Processor};
use crate::assembler::{Arg, Opcode, RegisterRef};
use crate::observer::ProcessorObserver;
use crate::value::Value;

pub(crate) enum FetchOutcome {
    Fetched([Option<Value>; 3]),
    Stalled,
}

pub(crate) fn fetch(
    processor: &mut Processor,
    opcode: &Opcode,
    observer: &mut dyn ProcessorObserver,
) -> FetchOutcome {
    let operands = opcode.operation.operands();
    let mut values: [Option<Value>; 3] = [None, None, None];

    for index in 0..3 {
        let Some(declared) = operands.get(index) else {
            break;
        };
        let arg = opcode.arg(index);
        if !arg.is_present() {
            continue;
        }

        // Special-case for arg1: if it's write-only, skip reading it, but
        // still enforce the "can't overwrite an unflushed output channel"
        // rule.
        if index == 0 && declared.is_writable() && !declared.is_readable() {
            if let Some(RegisterRef::Ou(channel)) = arg.register {
                if processor.outputs[channel as usize].set {
                    log::debug!(
                        "line {}: stall, ou{channel} still undelivered from this tick",
                        opcode.source_line
                    );
                    return FetchOutcome::Stalled;
                }
            }
            continue;
        }

        match fetch_operand(processor, arg, observer) {
            Some(value) => values[index] = Some(value),
            None => {
                log::debug!(
                    "line {}: stall on operand {} (memory read pending or input channel unset)",
                    opcode.source_line,
                    index + 1
                );
                return FetchOutcome::Stalled;
            }
        }
    }

    FetchOutcome::Fetched(values)
}

fn fetch_operand(
    processor: &mut Processor,
    arg: &Arg,
    observer: &mut dyn ProcessorObserver,
) -> Option<Value> {
    if arg.is_reference {
        let address = resolve_memory_address(processor, arg);
        return fetch_memory(processor, address, observer);
    }

    if let Some(literal) = &arg.literal {
        return Some(value_from_literal(literal));
    }

    if let Some(register) = arg.register {
        return fetch_register(processor, register);
    }

    None
}

/// Implements the memory stall contract: a matching completed request
/// materializes a value, anything else re-issues `MemoryRead` and stalls.
fn fetch_memory(
    processor: &mut Processor,
    address: u32,
    observer: &mut dyn ProcessorObserver,
) -> Option<Value> {
    match &mut processor.pending {
        Some(pending) if pending.address == address && pending.last_value.is_some() => {
            let raw = pending.last_value.take().unwrap();
            processor.pending = None;
            Some(Value::from_memory_reading(&raw))
        }
        _ => {
            processor.pending = Some(PendingMemory {
                address,
                last_value: None,
            });
            observer.memory_read(address);
            None
        }
    }
}

fn fetch_register(processor: &mut Processor, register: RegisterRef) -> Option<Value> {
    match register {
        RegisterRef::Ir(i) => Some(Value::int(processor.ir[i as usize])),
        RegisterRef::Fr(i) => Some(Value::float(processor.fr[i as usize])),
        RegisterRef::Sr(i) => Some(Value::string(processor.sr[i as usize].clone())),
        RegisterRef::In(i) => {
            let latch = &mut processor.inputs[i as usize];
            if !latch.set {
                return None;
            }
            let value = Value::tri(latch.int, latch.float, latch.string.clone());
            *latch = Default::default();
            Some(value)
        }
        // `oux` never validates as a readable source; reaching this arm
        // means an Opcode was hand-built outside the assembler. Stall
        // rather than panic.
        RegisterRef::Ou(_) => None,
    }
}
