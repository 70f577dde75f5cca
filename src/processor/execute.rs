//! Execute stage: dispatch on [`Operation`], computing a result value and
//! flag inputs from the fetched operands.
//!
//! `jmp*`/`nop`/`brk` never produce a writeback result, so
//! [`ExecuteOutcome::NoResult`] short-circuits the writeback stage for them.

use super::Processor;
use crate::assembler::Opcode;
use crate::observer::ProcessorObserver;
use crate::opcode::Operation;
use crate::value::{bits_to_float, float_to_bits, FlagUpdate, Kind, Value};
use crate::config::DEBUG_OUTPUT_ADDRESS;

pub(crate) enum ExecuteOutcome {
    NoResult,
    Result { value: Value, flags: FlagUpdate },
}

pub(crate) fn execute(
    processor: &mut Processor,
    opcode: &Opcode,
    fetched: [Option<Value>; 3],
    observer: &mut dyn ProcessorObserver,
) -> ExecuteOutcome {
    let [a1, a2, a3] = fetched;

    match opcode.operation {
        Operation::Nop => ExecuteOutcome::NoResult,

        Operation::Brk => {
            processor.working = super::WorkingState::Stopped;
            observer.memory_write(DEBUG_OUTPUT_ADDRESS, "brk");
            ExecuteOutcome::NoResult
        }

        Operation::Jmp => {
            processor.ip = jump_target(&a1);
            ExecuteOutcome::NoResult
        }
        Operation::Je | Operation::Jne | Operation::Jnz | Operation::Jg | Operation::Jge
        | Operation::Jl | Operation::Jle => {
            if jump_condition_holds(opcode.operation, processor) {
                processor.ip = jump_target(&a1);
            }
            ExecuteOutcome::NoResult
        }

        Operation::Mov => {
            let value = a2.expect("mov always has a source operand");
            ExecuteOutcome::Result {
                flags: flags_for(&value),
                value,
            }
        }

        Operation::Add | Operation::Adc => {
            let a1 = a1.expect("binary arithmetic always reads arg1");
            let a2 = a2.expect("binary arithmetic always reads arg2");
            let carry_in = matches!(opcode.operation, Operation::Adc) && processor.flags.cf;
            binary_numeric_or_string(
                &a1,
                &a2,
                true,
                |x, y| (x as u32 as u64) + (y as u32 as u64) + carry_in as u64,
                |x, y| x + y,
                |x, y| format!("{x}{y}"),
            )
        }
        Operation::Sub => {
            let a1 = a1.expect("binary arithmetic always reads arg1");
            let a2 = a2.expect("binary arithmetic always reads arg2");
            binary_numeric_or_string(
                &a1,
                &a2,
                true,
                |x, y| (x as u32 as u64).wrapping_sub(y as u32 as u64),
                |x, y| x - y,
                |x, y| x.replace(y, ""),
            )
        }
        // cmp never writes back (arg1's mask is read-only), so its computed
        // value is discarded by writeback -- only the flags matter.
        Operation::Cmp => {
            let a1 = a1.expect("cmp always reads arg1");
            let a2 = a2.expect("cmp always reads arg2");
            binary_numeric_or_string(
                &a1,
                &a2,
                true,
                |x, y| (x as u32 as u64).wrapping_sub(y as u32 as u64),
                |x, y| x - y,
                |x, y| x.replace(y, ""),
            )
        }
        Operation::Mul => {
            let a1 = a1.expect("mul always reads arg1");
            let a2 = a2.expect("mul always reads arg2");
            binary_numeric_or_string(
                &a1,
                &a2,
                false,
                |x, y| ((x as i64) * (y as i64)) as u64,
                |x, y| x * y,
                |_, _| unreachable!("mul has no string path"),
            )
        }
        Operation::Div => {
            let a1 = a1.expect("div always reads arg1");
            let a2 = a2.expect("div always reads arg2");
            binary_numeric_or_string(
                &a1,
                &a2,
                false,
                |x, y| x.checked_div(y).unwrap_or(0) as u32 as u64,
                |x, y| if y == 0.0 { f32::NAN } else { x / y },
                |_, _| unreachable!("div has no string path"),
            )
        }
        // test never writes back either; same discard-the-value reasoning as cmp.
        Operation::Test => {
            let a1 = a1.expect("test always reads arg1");
            let a2 = a2.expect("test always reads arg2");
            let result = a1.coerce_int() & a2.coerce_int();
            ExecuteOutcome::Result {
                flags: FlagUpdate::from_int_accumulator(result as u32 as u64),
                value: Value::int(result),
            }
        }
        Operation::And => int_binary(&a1, &a2, |x, y| x & y),
        Operation::Or => int_binary(&a1, &a2, |x, y| x | y),
        Operation::Xor => int_binary(&a1, &a2, |x, y| x ^ y),

        Operation::Not => {
            let a1 = a1.expect("not always reads arg1");
            let result = !a1.coerce_int();
            ExecuteOutcome::Result {
                flags: FlagUpdate::from_int_accumulator(result as u32 as u64),
                value: Value::int(result),
            }
        }

        Operation::Inc | Operation::Dec => {
            let a1 = a1.expect("inc/dec always read arg1");
            let delta = if opcode.operation == Operation::Inc { 1 } else { -1 };
            if a1.kind() == Kind::FLOAT {
                let out = a1.as_float() + delta as f32;
                ExecuteOutcome::Result {
                    flags: FlagUpdate::from_float(out),
                    value: Value::float(out),
                }
            } else {
                let acc = (a1.coerce_int() as i64 + delta as i64) as u64;
                ExecuteOutcome::Result {
                    flags: FlagUpdate::from_int_accumulator(acc),
                    value: Value::int(acc as u32 as i32),
                }
            }
        }

        Operation::Shl | Operation::Shr => {
            let a1 = a1.expect("shl/shr always read arg1");
            let a2 = a2.expect("shl/shr always read arg2");
            if a1.kind() == Kind::STRING {
                let out = if opcode.operation == Operation::Shl {
                    drop_left(a1.as_string(), a2.coerce_int().max(0) as usize)
                } else {
                    pad_right(a1.as_string(), a2.coerce_int().max(0) as usize)
                };
                ExecuteOutcome::Result {
                    flags: FlagUpdate::from_string(&out),
                    value: Value::string(out),
                }
            } else {
                let shift = (a2.coerce_int() & 31) as u32;
                let out = if opcode.operation == Operation::Shl {
                    a1.coerce_int().wrapping_shl(shift)
                } else {
                    a1.coerce_int().wrapping_shr(shift)
                };
                ExecuteOutcome::Result {
                    flags: FlagUpdate::from_int_accumulator(out as u32 as u64),
                    value: Value::int(out),
                }
            }
        }

        Operation::Rol | Operation::Ror => {
            let a1 = a1.expect("rol/ror always read arg1");
            let a2 = a2.expect("rol/ror always read arg2");
            if a1.kind() == Kind::STRING {
                let out = if opcode.operation == Operation::Rol {
                    rotate_chars_left(a1.as_string(), a2.coerce_int())
                } else {
                    rotate_chars_right(a1.as_string(), a2.coerce_int())
                };
                ExecuteOutcome::Result {
                    flags: FlagUpdate::from_string(&out),
                    value: Value::string(out),
                }
            } else {
                let shift = (a2.coerce_int() & 31) as u32;
                let out = if opcode.operation == Operation::Rol {
                    a1.coerce_int().rotate_left(shift)
                } else {
                    a1.coerce_int().rotate_right(shift)
                };
                ExecuteOutcome::Result {
                    flags: FlagUpdate::from_int_accumulator(out as u32 as u64),
                    value: Value::int(out),
                }
            }
        }

        Operation::Inr => {
            let bits = (0..4u8).fold(0i32, |acc, i| {
                acc | ((processor.inputs[i as usize].set as i32) << i)
            });
            ExecuteOutcome::Result {
                flags: FlagUpdate::from_int_accumulator(bits as u32 as u64),
                value: Value::int(bits),
            }
        }

        Operation::Flr => {
            let bits = processor.flags.as_bits() as i32;
            ExecuteOutcome::Result {
                flags: FlagUpdate::NONE,
                value: Value::int(bits),
            }
        }
        Operation::Fls => {
            let a1 = a1.expect("fls always reads arg1");
            processor.flags = super::Flags::from_bits(a1.coerce_int() as u8 & 0x0F);
            ExecuteOutcome::NoResult
        }

        Operation::MvI2F => convert(a2, Value::float, |v| v.coerce_float()),
        Operation::MvI2S => convert(a2, Value::string, |v| v.coerce_int().to_string()),
        Operation::MvF2I => convert(a2, Value::int, |v| v.coerce_int()),
        Operation::MvF2S => convert(a2, Value::string, |v| v.stringify_selected()),
        Operation::MvS2I => convert(a2, Value::int, |v| v.coerce_int()),
        Operation::MvS2F => convert(a2, Value::float, |v| v.coerce_float()),
        Operation::LdI2F => convert(a2, Value::float, |v| bits_to_float(v.coerce_int())),
        Operation::LdF2I => convert(a2, Value::int, |v| float_to_bits(v.coerce_float())),

        Operation::Find => {
            let haystack = a2.expect("find always reads arg2");
            let needle = a3.expect("find always reads arg3");
            let index = find_index(haystack.as_string(), needle.as_string());
            ExecuteOutcome::Result {
                flags: FlagUpdate::from_int_accumulator(index as u32 as u64),
                value: Value::int(index),
            }
        }
        Operation::Rmv => {
            let haystack = a2.expect("rmv always reads arg2");
            let needle = a3.expect("rmv always reads arg3");
            let out = if needle.as_string().is_empty() {
                haystack.as_string().to_string()
            } else {
                haystack.as_string().replace(needle.as_string(), "")
            };
            ExecuteOutcome::Result {
                flags: FlagUpdate::from_string(&out),
                value: Value::string(out),
            }
        }
        Operation::Sbs => {
            let source = a1.expect("sbs always reads arg1");
            let offset = a2.expect("sbs always reads arg2").coerce_int().max(0) as usize;
            let length = a3.expect("sbs always reads arg3").coerce_int().max(0) as usize;
            let chars: Vec<char> = source.as_string().chars().collect();
            let start = offset.min(chars.len());
            let end = (start + length).min(chars.len());
            let out: String = chars[start..end].iter().collect();
            ExecuteOutcome::Result {
                flags: FlagUpdate::from_string(&out),
                value: Value::string(out),
            }
        }
        Operation::Rpl => {
            let source = a1.expect("rpl always reads arg1");
            let from = a2.expect("rpl always reads arg2");
            let to = a3.expect("rpl always reads arg3");
            let out = if from.as_string().is_empty() {
                source.as_string().to_string()
            } else {
                source.as_string().replace(from.as_string(), to.as_string())
            };
            ExecuteOutcome::Result {
                flags: FlagUpdate::from_string(&out),
                value: Value::string(out),
            }
        }
        Operation::Chr => {
            let haystack = a2.expect("chr always reads arg2");
            let index = a3.expect("chr always reads arg3").coerce_int();
            let out = haystack
                .as_string()
                .chars()
                .nth(index.max(0) as usize)
                .filter(|_| index >= 0)
                .map(|c| c as i32)
                .unwrap_or(-1);
            ExecuteOutcome::Result {
                flags: FlagUpdate::from_int_accumulator(out as u32 as u64),
                value: Value::int(out),
            }
        }
    }
}

fn jump_target(a1: &Option<Value>) -> u32 {
    a1.as_ref().expect("jumps always read arg1").coerce_int() as u32
}

fn jump_condition_holds(op: Operation, processor: &Processor) -> bool {
    let (of, sf, zf, _cf) = processor.flags();
    match op {
        Operation::Je => zf,
        Operation::Jne | Operation::Jnz => !zf,
        Operation::Jg => !zf && sf == of,
        Operation::Jge => sf == of,
        Operation::Jl => sf != of,
        Operation::Jle => zf || sf != of,
        _ => unreachable!("only conditional jumps reach here"),
    }
}

fn flags_for(value: &Value) -> FlagUpdate {
    match value.selected_kind() {
        Kind::INT => FlagUpdate::from_int_accumulator(value.as_int() as u32 as u64),
        Kind::FLOAT => FlagUpdate::from_float(value.as_float()),
        _ => FlagUpdate::from_string(value.as_string()),
    }
}

/// Computes a binary result whose kind is the union of `a1`/`a2`'s
/// populated kinds, restricted to int/float (and string when
/// `supports_string`); arithmetic propagates the union of its operands' kinds.
fn binary_numeric_or_string(
    a1: &Value,
    a2: &Value,
    supports_string: bool,
    int_op: impl Fn(i32, i32) -> u64,
    float_op: impl Fn(f32, f32) -> f32,
    string_op: impl Fn(&str, &str) -> String,
) -> ExecuteOutcome {
    let mut allowed = Kind::INT | Kind::FLOAT;
    if supports_string {
        allowed |= Kind::STRING;
    }
    let mut kind = (a1.kind() | a2.kind()) & allowed;
    if kind.is_empty() {
        kind = Kind::INT;
    }

    if kind.contains(Kind::STRING) {
        let out = string_op(a1.as_string_coerced().as_str(), a2.as_string_coerced().as_str());
        return ExecuteOutcome::Result {
            flags: FlagUpdate::from_string(&out),
            value: Value::string(out),
        };
    }
    if kind.contains(Kind::FLOAT) {
        let out = float_op(a1.coerce_float(), a2.coerce_float());
        return ExecuteOutcome::Result {
            flags: FlagUpdate::from_float(out),
            value: Value::float(out),
        };
    }
    let acc = int_op(a1.coerce_int(), a2.coerce_int());
    ExecuteOutcome::Result {
        flags: FlagUpdate::from_int_accumulator(acc),
        value: Value::int(acc as u32 as i32),
    }
}

fn int_binary(a1: &Option<Value>, a2: &Option<Value>, op: impl Fn(i32, i32) -> i32) -> ExecuteOutcome {
    let a1 = a1.as_ref().expect("bitwise ops always read arg1");
    let a2 = a2.as_ref().expect("bitwise ops always read arg2");
    let out = op(a1.coerce_int(), a2.coerce_int());
    ExecuteOutcome::Result {
        flags: FlagUpdate::from_int_accumulator(out as u32 as u64),
        value: Value::int(out),
    }
}

fn convert<T>(
    source: Option<Value>,
    wrap: impl Fn(T) -> Value,
    coerce: impl Fn(&Value) -> T,
) -> ExecuteOutcome {
    let source = source.expect("conversions always read their source operand");
    let converted = coerce(&source);
    let value = wrap(converted);
    ExecuteOutcome::Result {
        flags: flags_for(&value),
        value,
    }
}

fn drop_left(s: &str, n: usize) -> String {
    s.chars().skip(n).collect()
}

fn pad_right(s: &str, n: usize) -> String {
    let mut out = s.to_string();
    out.push_str(&" ".repeat(n));
    out
}

fn rotate_chars_left(s: &str, n: i32) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    let n = n.rem_euclid(chars.len() as i32) as usize;
    chars[n..].iter().chain(chars[..n].iter()).collect()
}

fn rotate_chars_right(s: &str, n: i32) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    let len = chars.len();
    let n = n.rem_euclid(len as i32) as usize;
    rotate_chars_left(s, (len - n) as i32)
}

fn find_index(haystack: &str, needle: &str) -> i32 {
    if needle.is_empty() {
        return 0;
    }
    let haystack_chars: Vec<char> = haystack.chars().collect();
    let needle_chars: Vec<char> = needle.chars().collect();
    if needle_chars.len() > haystack_chars.len() {
        return -1;
    }
    for start in 0..=(haystack_chars.len() - needle_chars.len()) {
        if haystack_chars[start..start + needle_chars.len()] == needle_chars[..] {
            return start as i32;
        }
    }
    -1
}
