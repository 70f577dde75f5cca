//! Single-pass-per-line assembler: lexical classification, operand-kind
//! validation against [`crate::opcode::Operation::operands`], and label
//! resolution.
//!
//! Staged as three passes -- classify, then validate-and-build, then
//! resolve -- each a small `Result`-returning function with one
//! early-return per failure rather than an accumulating diagnostics list.

mod ast;
mod lexer;

pub use ast::{Arg, Literal, Opcode, Program, RegisterRef};

use crate::error::{AssembleError, AssembleErrorKind};
use crate::opcode::{OperandKind, Operation};
use std::collections::HashMap;

struct RawLine {
    source_line: usize,
    operation: Operation,
    arg_tokens: Vec<String>,
}

/// Assembles `lines` into a [`Program`], or the first validation error
/// encountered, with its 0-based source line index.
pub fn compile<S: AsRef<str>>(lines: &[S]) -> Result<Program, AssembleError> {
    let (raw_lines, labels) = classify(lines)?;

    let mut opcodes = Vec::with_capacity(raw_lines.len());
    for raw in raw_lines {
        opcodes.push(build_opcode(raw)?);
    }

    resolve_labels(&mut opcodes, &labels)?;

    Ok(Program { opcodes, labels })
}

/// Pass 1: comment stripping, blank/label/instruction classification, and
/// label-table construction. Instruction lines are only tokenized here —
/// argument parsing and kind-checking happen in [`build_opcode`] (pass 2).
fn classify<S: AsRef<str>>(
    lines: &[S],
) -> Result<(Vec<RawLine>, HashMap<String, usize>), AssembleError> {
    let mut raw_lines = Vec::new();
    let mut labels = HashMap::new();

    for (i, line) in lines.iter().enumerate() {
        let source_line = i;
        let content = lexer::strip_comment(line.as_ref()).trim();
        if content.is_empty() {
            continue;
        }

        if let Some(name) = content.strip_suffix(':') {
            if !name.is_empty() && !name.contains(':') && !name.contains(char::is_whitespace) {
                validate_label_name(name, source_line)?;
                if labels.contains_key(name) {
                    return Err(AssembleError::new(
                        source_line,
                        AssembleErrorKind::DuplicateLabel(name.to_string()),
                    ));
                }
                labels.insert(name.to_string(), raw_lines.len());
                continue;
            }
        }

        let tokens = lexer::tokenize(content);
        let mnemonic = &tokens[0];
        let operation = Operation::from_mnemonic(mnemonic).ok_or_else(|| {
            AssembleError::new(
                source_line,
                AssembleErrorKind::UnknownMnemonic(mnemonic.clone()),
            )
        })?;

        let arg_tokens = tokens[1..].to_vec();
        let arity = operation.operands().arity();
        if arg_tokens.len() != arity {
            return Err(AssembleError::new(
                source_line,
                AssembleErrorKind::WrongOperandCount(
                    operation.mnemonic(),
                    arity,
                    arg_tokens.len(),
                ),
            ));
        }

        raw_lines.push(RawLine {
            source_line,
            operation,
            arg_tokens,
        });
    }

    Ok((raw_lines, labels))
}

fn validate_label_name(name: &str, source_line: usize) -> Result<(), AssembleError> {
    let first = name.chars().next().expect("checked non-empty");
    if first.is_ascii_digit() || first == '-' {
        return Err(AssembleError::new(
            source_line,
            AssembleErrorKind::InvalidLabelName(name.to_string()),
        ));
    }
    if RegisterRef::parse(name).is_some() {
        return Err(AssembleError::new(
            source_line,
            AssembleErrorKind::LabelReusesRegisterName(name.to_string()),
        ));
    }
    Ok(())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Pass 2: parse each raw argument token into a typed [`Arg`] and check
/// its apparent kind against the opcode's declared operand mask.
fn build_opcode(raw: RawLine) -> Result<Opcode, AssembleError> {
    let operands = raw.operation.operands();
    let mut args = [Arg::none(), Arg::none(), Arg::none()];

    for (index, token) in raw.arg_tokens.iter().enumerate() {
        let declared = operands
            .get(index)
            .expect("arity was checked against operand count in pass 1");

        if index == 2 && token.starts_with('[') {
            return Err(AssembleError::new(
                raw.source_line,
                AssembleErrorKind::Arg3IsMemoryReference,
            ));
        }

        let (arg, apparent) = parse_argument(token, raw.source_line)?;

        if !declared.admits(apparent) {
            return Err(AssembleError::new(
                raw.source_line,
                AssembleErrorKind::OperandKindMismatch(
                    index + 1,
                    raw.operation.mnemonic(),
                    token.clone(),
                ),
            ));
        }

        args[index] = arg;
    }

    if args[0].is_reference && args[1].is_reference {
        let arg1_kind = operands.get(0).expect("arg1 exists when two refs are present");
        if arg1_kind.is_readable() {
            return Err(AssembleError::new(
                raw.source_line,
                AssembleErrorKind::MultipleReadableMemoryReferences,
            ));
        }
    }

    let [arg1, arg2, arg3] = args;
    Ok(Opcode {
        source_line: raw.source_line,
        operation: raw.operation,
        arg1,
        arg2,
        arg3,
    })
}

/// Parses one argument token into `(Arg, apparent_kind)`.
fn parse_argument(token: &str, source_line: usize) -> Result<(Arg, OperandKind), AssembleError> {
    if let Some(inner) = token.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return parse_memory_reference(inner, source_line);
    }

    if let Some(inner) = token.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        let s = unescape_string(inner);
        return Ok((Arg::literal(Literal::Str(s)), OperandKind::LIT_S));
    }

    if let Some(prefix) = token.get(0..2).map(str::to_ascii_lowercase) {
        if matches!(prefix.as_str(), "ir" | "fr" | "sr" | "in" | "ou")
            && token[2..].chars().all(|c| c.is_ascii_digit())
            && !token[2..].is_empty()
        {
            return match RegisterRef::parse(token) {
                Some(r) => Ok((Arg::register(r), register_kind(r))),
                None => Err(AssembleError::new(
                    source_line,
                    AssembleErrorKind::UnknownRegister(token.to_string()),
                )),
            };
        }
    }

    let looks_numeric = token
        .strip_prefix('-')
        .unwrap_or(token)
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit());

    if looks_numeric {
        return parse_numeric_literal(token, source_line);
    }

    if is_identifier(token) {
        return Ok((Arg::literal(Literal::Label(token.to_string())), OperandKind::LIT_I));
    }

    Err(AssembleError::new(
        source_line,
        AssembleErrorKind::MalformedLiteral(token.to_string()),
    ))
}

fn register_kind(r: RegisterRef) -> OperandKind {
    match r {
        RegisterRef::Ir(_) => OperandKind::IRX,
        RegisterRef::Fr(_) => OperandKind::FRX,
        RegisterRef::Sr(_) => OperandKind::SRX,
        RegisterRef::In(_) => OperandKind::INX,
        RegisterRef::Ou(_) => OperandKind::OUX,
    }
}

fn parse_memory_reference(
    inner: &str,
    source_line: usize,
) -> Result<(Arg, OperandKind), AssembleError> {
    if let Some(RegisterRef::Ou(index)) = RegisterRef::parse(inner) {
        return Err(AssembleError::new(
            source_line,
            AssembleErrorKind::OutputChannelInMemoryReference(index),
        ));
    }

    match RegisterRef::parse(inner) {
        Some(RegisterRef::Ir(i)) => {
            let mut arg = Arg::register(RegisterRef::Ir(i));
            arg.is_reference = true;
            return Ok((arg, OperandKind::MEM_I | OperandKind::MEM_S));
        }
        Some(_) => {
            return Err(AssembleError::new(
                source_line,
                AssembleErrorKind::InvalidMemoryReferenceInner(inner.to_string()),
            ));
        }
        None => {}
    }

    match parse_int_literal(inner) {
        Some(n) => {
            let mut arg = Arg::literal(Literal::Int(n));
            arg.is_reference = true;
            Ok((arg, OperandKind::MEM_I | OperandKind::MEM_S))
        }
        None => Err(AssembleError::new(
            source_line,
            AssembleErrorKind::InvalidMemoryReferenceInner(inner.to_string()),
        )),
    }
}

fn parse_int_literal(token: &str) -> Option<i64> {
    let (neg, rest) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let value = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        rest.parse::<i64>().ok()?
    };
    Some(if neg { -value } else { value })
}

fn parse_numeric_literal(
    token: &str,
    source_line: usize,
) -> Result<(Arg, OperandKind), AssembleError> {
    if token.contains('.') {
        return token
            .parse::<f32>()
            .map(|f| (Arg::literal(Literal::Float(f)), OperandKind::LIT_F))
            .map_err(|_| {
                AssembleError::new(
                    source_line,
                    AssembleErrorKind::MalformedLiteral(token.to_string()),
                )
            });
    }

    parse_int_literal(token)
        .map(|n| (Arg::literal(Literal::Int(n)), OperandKind::LIT_I))
        .ok_or_else(|| {
            AssembleError::new(
                source_line,
                AssembleErrorKind::MalformedLiteral(token.to_string()),
            )
        })
}

fn unescape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Pass 3: replace every `Literal::Label` with the resolved instruction
/// index.
fn resolve_labels(
    opcodes: &mut [Opcode],
    labels: &HashMap<String, usize>,
) -> Result<(), AssembleError> {
    for opcode in opcodes.iter_mut() {
        for arg in [&mut opcode.arg1, &mut opcode.arg2, &mut opcode.arg3] {
            if let Some(Literal::Label(name)) = &arg.literal {
                let index = labels.get(name).ok_or_else(|| {
                    AssembleError::new(
                        opcode.source_line,
                        AssembleErrorKind::UnresolvedLabel(name.clone()),
                    )
                })?;
                arg.literal = Some(Literal::Int(*index as i64));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Operation;

    #[test]
    fn hello_world_echo_assembles() {
        let program = compile(&["mov ou0 \"hi\""]).unwrap();
        assert_eq!(program.opcodes.len(), 1);
        assert_eq!(program.opcodes[0].operation, Operation::Mov);
    }

    #[test]
    fn duplicate_label_is_rejected() {
        let err = compile(&["x:", "x:"]).unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(
            err.kind,
            AssembleErrorKind::DuplicateLabel("x".to_string())
        );
    }

    #[test]
    fn label_may_not_reuse_register_name() {
        let err = compile(&["ir0:"]).unwrap_err();
        assert_eq!(
            err.kind,
            AssembleErrorKind::LabelReusesRegisterName("ir0".to_string())
        );
    }

    #[test]
    fn label_may_not_start_with_digit_or_dash() {
        assert!(matches!(
            compile(&["3x:"]).unwrap_err().kind,
            AssembleErrorKind::InvalidLabelName(_)
        ));
        assert!(matches!(
            compile(&["-x:"]).unwrap_err().kind,
            AssembleErrorKind::InvalidLabelName(_)
        ));
    }

    #[test]
    fn labels_resolve_to_instruction_index() {
        let program = compile(&[
            "mov ir0 5",
            "cmp ir0 5",
            "je done",
            "mov ou0 \"no\"",
            "done: mov ou0 \"yes\"",
        ])
        .unwrap();
        assert_eq!(program.labels.get("done"), Some(&4));
        let je = &program.opcodes[2];
        assert_eq!(je.arg1.literal, Some(Literal::Int(4)));
    }

    #[test]
    fn unresolved_label_is_rejected() {
        let err = compile(&["jmp nowhere"]).unwrap_err();
        assert_eq!(
            err.kind,
            AssembleErrorKind::UnresolvedLabel("nowhere".to_string())
        );
    }

    #[test]
    fn memory_reference_inner_must_be_int_literal_or_ir_register() {
        assert!(compile(&["mov [sr0] 1"]).is_err());
        assert!(compile(&["mov [fr0] 1"]).is_err());
        assert!(compile(&["mov [myLabel] 1"]).is_err());
        assert!(compile(&["mov [7] 1"]).is_ok());
        assert!(compile(&["mov [ir0] 1"]).is_ok());
    }

    #[test]
    fn output_channel_forbidden_inside_memory_reference() {
        let err = compile(&["mov [ou0] 1"]).unwrap_err();
        assert_eq!(
            err.kind,
            AssembleErrorKind::OutputChannelInMemoryReference(0)
        );
    }

    #[test]
    fn arg3_memory_reference_is_rejected() {
        let err = compile(&["sbs sr0 [ir0] 2"]).unwrap_err();
        assert_eq!(err.kind, AssembleErrorKind::Arg3IsMemoryReference);
    }

    #[test]
    fn two_readable_memory_references_are_rejected() {
        // `add` has a read-write arg1: two memory refs means the write
        // target would also be read, which is forbidden.
        let err = compile(&["add [ir0] [ir1]"]).unwrap_err();
        assert_eq!(
            err.kind,
            AssembleErrorKind::MultipleReadableMemoryReferences
        );
    }

    #[test]
    fn mov_write_only_target_permits_a_second_reference_as_source() {
        // arg1 of `mov` is write-only, so only arg2 is a *readable*
        // memory reference -- this is allowed.
        assert!(compile(&["mov [ir0] [ir1]"]).is_ok());
    }

    #[test]
    fn wrong_operand_count_is_rejected() {
        assert!(compile(&["mov ir0"]).is_err());
        assert!(compile(&["nop ir0"]).is_err());
    }

    #[test]
    fn unknown_mnemonic_is_rejected() {
        let err = compile(&["frobnicate ir0"]).unwrap_err();
        assert!(matches!(err.kind, AssembleErrorKind::UnknownMnemonic(_)));
    }

    #[test]
    fn mvf2s_targets_a_string_register() {
        // Regression: mvf2s's destination is an srx register, not frx.
        assert!(compile(&["mvf2s sr0 fr0"]).is_ok());
        assert!(compile(&["mvf2s fr0 fr1"]).is_err());
    }

    #[test]
    fn hex_and_decimal_int_literals_parse() {
        let program = compile(&["mov ir0 0x2A", "mov ir1 42"]).unwrap();
        assert_eq!(program.opcodes[0].arg2.literal, Some(Literal::Int(42)));
        assert_eq!(program.opcodes[1].arg2.literal, Some(Literal::Int(42)));
    }
}
