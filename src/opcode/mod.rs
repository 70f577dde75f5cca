//! Static opcode metadata: for every [`Operation`] a fixed [`Operands`]
//! descriptor enumerating 0..3 operand kind masks, consulted by both the
//! assembler (to validate argument kinds) and the processor (to gate
//! fetch/writeback).
//!
//! The table is a plain `const` array indexed by opcode ordinal, and the
//! "every operand has `r|w` set" assertion is a build-time check via
//! [`assert_operands_well_formed`] rather than a per-lookup runtime check.

use bitflags::bitflags;

bitflags! {
    /// A bitmask over register classes, literal classes, memory-reference
    /// classes and the two access flags `r`/`w`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OperandKind: u16 {
        /// Integer register `irN`.
        const IRX = 1 << 0;
        /// Float register `frN`.
        const FRX = 1 << 1;
        /// String register `srN`.
        const SRX = 1 << 2;
        /// Input channel latch `inN`.
        const INX = 1 << 3;
        /// Output channel latch `ouN`.
        const OUX = 1 << 4;
        /// Integer literal.
        const LIT_I = 1 << 5;
        /// Float literal.
        const LIT_F = 1 << 6;
        /// String literal.
        const LIT_S = 1 << 7;
        /// `[expr]` memory reference yielding an int reading.
        const MEM_I = 1 << 8;
        /// `[expr]` memory reference yielding a float reading.
        const MEM_F = 1 << 9;
        /// `[expr]` memory reference yielding a string reading.
        const MEM_S = 1 << 10;
        /// Operand is read by the operation.
        const READ = 1 << 11;
        /// Operand is written by the operation.
        const WRITE = 1 << 12;

        const ANY_REGISTER = Self::IRX.bits() | Self::FRX.bits() | Self::SRX.bits() | Self::INX.bits() | Self::OUX.bits();
        const ANY_LITERAL = Self::LIT_I.bits() | Self::LIT_F.bits() | Self::LIT_S.bits();
        const ANY_MEM = Self::MEM_I.bits() | Self::MEM_F.bits() | Self::MEM_S.bits();
        const ACCESS_MASK = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl OperandKind {
    pub const fn is_readable(self) -> bool {
        self.intersects(Self::READ)
    }

    pub const fn is_writable(self) -> bool {
        self.intersects(Self::WRITE)
    }

    /// True if `self` permits at least one class also permitted by `other`
    /// (used by the assembler to check an argument's apparent kind against
    /// an opcode's declared operand kind).
    pub const fn admits(self, other: OperandKind) -> bool {
        self.intersection(Self::ANY_REGISTER.union(Self::ANY_LITERAL).union(Self::ANY_MEM))
            .intersects(other)
    }

    pub const fn is_memory_reference(self) -> bool {
        self.intersects(Self::ANY_MEM)
    }
}

/// Up to three operand slots declared by an opcode. `None` entries are
/// trailing: an opcode with two operands has `[Some, Some, None]`.
#[derive(Debug, Clone, Copy)]
pub struct Operands(pub [Option<OperandKind>; 3]);

impl Operands {
    pub const fn none() -> Self {
        Operands([None, None, None])
    }

    pub const fn one(a: OperandKind) -> Self {
        Operands([Some(a), None, None])
    }

    pub const fn two(a: OperandKind, b: OperandKind) -> Self {
        Operands([Some(a), Some(b), None])
    }

    pub const fn three(a: OperandKind, b: OperandKind, c: OperandKind) -> Self {
        Operands([Some(a), Some(b), Some(c)])
    }

    pub fn arity(&self) -> usize {
        self.0.iter().filter(|o| o.is_some()).count()
    }

    pub fn get(&self, index: usize) -> Option<OperandKind> {
        self.0.get(index).copied().flatten()
    }
}

macro_rules! operations {
    ($($variant:ident => $mnemonic:literal),+ $(,)?) => {
        /// One row of the execute-stage catalogue.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Operation {
            $($variant),+
        }

        impl Operation {
            pub const ALL: &'static [Operation] = &[$(Operation::$variant),+];

            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Operation::$variant => $mnemonic),+
                }
            }

            pub fn from_mnemonic(s: &str) -> Option<Operation> {
                match s.to_ascii_lowercase().as_str() {
                    $($mnemonic => Some(Operation::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

operations! {
    Nop => "nop",
    Mov => "mov",
    Add => "add",
    Adc => "adc",
    Sub => "sub",
    Cmp => "cmp",
    Inc => "inc",
    Dec => "dec",
    Mul => "mul",
    Div => "div",
    Shl => "shl",
    Shr => "shr",
    Rol => "rol",
    Ror => "ror",
    And => "and",
    Or => "or",
    Xor => "xor",
    Not => "not",
    Test => "test",
    Inr => "inr",
    Flr => "flr",
    Fls => "fls",
    Jmp => "jmp",
    Je => "je",
    Jne => "jne",
    Jnz => "jnz",
    Jg => "jg",
    Jge => "jge",
    Jl => "jl",
    Jle => "jle",
    MvI2F => "mvi2f",
    MvI2S => "mvi2s",
    MvF2I => "mvf2i",
    MvF2S => "mvf2s",
    MvS2I => "mvs2i",
    MvS2F => "mvs2f",
    LdI2F => "ldi2f",
    LdF2I => "ldf2i",
    Find => "find",
    Rmv => "rmv",
    Sbs => "sbs",
    Rpl => "rpl",
    Chr => "chr",
    Brk => "brk",
}

impl Operation {
    /// Is this a conditional-or-unconditional jump? These never touch
    /// flags; `jmp*` updates `ip` directly during execute.
    pub const fn is_jump(self) -> bool {
        matches!(
            self,
            Operation::Jmp
                | Operation::Je
                | Operation::Jne
                | Operation::Jnz
                | Operation::Jg
                | Operation::Jge
                | Operation::Jl
                | Operation::Jle
        )
    }

    /// Instructions that never touch flags regardless of kind.
    pub const fn touches_flags(self) -> bool {
        !matches!(self, Operation::Nop | Operation::Brk) && !self.is_jump()
    }

    pub fn operands(self) -> Operands {
        use OperandKind as K;
        let rw = K::READ.union(K::WRITE);
        let r = K::READ;
        let w = K::WRITE;

        // Every operation's result lands in arg1 (writeback always targets
        // it); whether arg1 is *also* read first depends on
        // whether the operation folds its previous value into the result
        // (`add ir0 1` reads-then-writes `ir0`) or simply overwrites it
        // (`mov`, the type conversions, `find`/`rmv`/`chr` — none of these
        // reference arg1's prior value in their output). Which register
        // classes are legal at all follows the execute-stage catalogue
        // `mul`/`div` drop string semantics, `shl`/`shr`/`rol`/`ror` drop
        // float, `and`/`or`/`xor`/`not` are int-only.
        // The "only one readable memory-reference operand" rule only bites
        // when arg1 itself admits a *readable* memory reference,
        // so every `rw` mask below includes the mem classes too
        // (`add [ir0] [ir1]` is well-formed syntax, just doubly-readable
        // and therefore rejected at validation, not at the kind-mask
        // stage).
        let int_float_string_rw =
            K::IRX.union(K::FRX).union(K::SRX).union(K::MEM_I).union(K::MEM_S).union(rw);
        let int_float_string_src = K::IRX
            .union(K::FRX)
            .union(K::SRX)
            .union(K::ANY_LITERAL)
            .union(K::MEM_I)
            .union(K::MEM_S)
            .union(K::INX)
            .union(r);
        let int_float_rw = K::IRX.union(K::FRX).union(K::MEM_I).union(rw);
        let int_float_src = K::IRX
            .union(K::FRX)
            .union(K::LIT_I)
            .union(K::LIT_F)
            .union(K::MEM_I)
            .union(K::INX)
            .union(r);
        let int_string_rw = K::IRX.union(K::SRX).union(K::MEM_I).union(K::MEM_S).union(rw);
        let int_string_src = K::IRX
            .union(K::SRX)
            .union(K::LIT_I)
            .union(K::LIT_S)
            .union(K::MEM_I)
            .union(K::MEM_S)
            .union(K::INX)
            .union(r);
        let int_rw = K::IRX.union(K::MEM_I).union(rw);
        let int_src = K::IRX.union(K::LIT_I).union(K::MEM_I).union(K::INX).union(r);
        let any_value_src = int_float_string_src;
        let mov_dst = K::IRX
            .union(K::FRX)
            .union(K::SRX)
            .union(K::OUX)
            .union(w)
            .union(K::MEM_I)
            .union(K::MEM_F)
            .union(K::MEM_S);
        let jump_target = K::IRX.union(K::LIT_I).union(K::MEM_I).union(r);

        match self {
            Operation::Nop | Operation::Brk => Operands::none(),
            Operation::Flr => Operands::one(K::IRX.union(K::FRX).union(w)),
            Operation::Fls => Operands::one(any_value_src),
            Operation::Jmp
            | Operation::Je
            | Operation::Jne
            | Operation::Jnz
            | Operation::Jg
            | Operation::Jge
            | Operation::Jl
            | Operation::Jle => Operands::one(jump_target),
            Operation::Inc | Operation::Dec => Operands::one(K::IRX.union(K::FRX).union(rw)),
            Operation::Not => Operands::one(K::IRX.union(K::MEM_I).union(rw)),
            Operation::Inr => Operands::one(K::IRX.union(K::FRX).union(w)),
            Operation::Mov => Operands::two(mov_dst, any_value_src),
            Operation::Add | Operation::Adc | Operation::Sub => {
                Operands::two(int_float_string_rw, int_float_string_src)
            }
            Operation::Mul | Operation::Div => Operands::two(int_float_rw, int_float_src),
            Operation::Shl | Operation::Shr | Operation::Rol | Operation::Ror => {
                Operands::two(int_string_rw, int_string_src)
            }
            Operation::And | Operation::Or | Operation::Xor => Operands::two(int_rw, int_src),
            Operation::Cmp => Operands::two(int_float_string_src, int_float_string_src),
            Operation::Test => Operands::two(int_src, int_src),
            Operation::MvI2F | Operation::LdI2F => {
                Operands::two(K::FRX.union(w), K::IRX.union(K::ANY_LITERAL).union(r))
            }
            Operation::MvI2S => {
                Operands::two(K::SRX.union(w), K::IRX.union(K::ANY_LITERAL).union(r))
            }
            Operation::MvF2S => {
                Operands::two(K::SRX.union(w), K::FRX.union(K::ANY_LITERAL).union(r))
            }
            Operation::MvF2I | Operation::LdF2I => {
                Operands::two(K::IRX.union(w), K::FRX.union(K::ANY_LITERAL).union(r))
            }
            Operation::MvS2I => {
                Operands::two(K::IRX.union(w), K::SRX.union(K::ANY_LITERAL).union(r))
            }
            Operation::MvS2F => {
                Operands::two(K::FRX.union(w), K::SRX.union(K::ANY_LITERAL).union(r))
            }
            // find: out = index of a3 in a2, written to a1 (never read).
            Operation::Find => Operands::three(
                K::IRX.union(w),
                K::SRX.union(K::LIT_S).union(r),
                K::SRX.union(K::LIT_S).union(r),
            ),
            // rmv: out = a2 with all occurrences of a3 removed, written to a1.
            Operation::Rmv => Operands::three(
                K::SRX.union(w),
                K::SRX.union(K::LIT_S).union(r),
                K::SRX.union(K::LIT_S).union(r),
            ),
            // sbs: out = substring of a1 (read as source) from offset a2,
            // length a3; written back to a1.
            Operation::Sbs => Operands::three(
                K::SRX.union(rw),
                K::IRX.union(K::LIT_I).union(r),
                K::IRX.union(K::LIT_I).union(r),
            ),
            // rpl: out = a1 with all occurrences of a2 replaced by a3.
            Operation::Rpl => Operands::three(
                K::SRX.union(rw),
                K::SRX.union(K::LIT_S).union(r),
                K::SRX.union(K::LIT_S).union(r),
            ),
            // chr: out = a2[a3] as an int, written to a1 (never read).
            Operation::Chr => Operands::three(
                K::IRX.union(w),
                K::SRX.union(K::LIT_S).union(r),
                K::IRX.union(K::LIT_I).union(r),
            ),
        }
    }
}

/// Build-time assertion that every declared operand has `r` or `w` set.
pub fn assert_operands_well_formed() {
    for &op in Operation::ALL {
        let operands = op.operands();
        for slot in operands.0.iter().flatten() {
            assert!(
                slot.intersects(OperandKind::ACCESS_MASK),
                "operation {:?} declares an operand with neither r nor w set",
                op
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operation_has_well_formed_operands() {
        assert_operands_well_formed();
    }

    #[test]
    fn mnemonic_round_trips() {
        for &op in Operation::ALL {
            assert_eq!(Operation::from_mnemonic(op.mnemonic()), Some(op));
        }
    }

    #[test]
    fn arg3_is_never_a_memory_reference() {
        for &op in Operation::ALL {
            if let Some(third) = op.operands().get(2) {
                assert!(!third.is_memory_reference(), "{:?} allows [mem] in arg3", op);
            }
        }
    }
}
