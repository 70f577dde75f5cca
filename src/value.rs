//! The tri-typed value that flows through every register, latch and
//! operand of the processor.
//!
//! A [`Value`] can inhabit `int`, `float` and `string` readings
//! simultaneously: a fetch from an input channel materializes the same raw
//! text as all three interpretations at once, and arithmetic propagates the
//! union of its operands' kinds. [`Kind::select`] picks the single
//! "most meaningful" reading (`Int -> Float -> String`) when a sink needs
//! exactly one.

use bitflags::bitflags;

bitflags! {
    /// Which readings of a [`Value`] are actually populated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Kind: u8 {
        const INT = 0b001;
        const FLOAT = 0b010;
        const STRING = 0b100;
    }
}

/// A value carrying up to all three of `{int32, float32, string}`.
///
/// Fields not covered by `kind` are meaningless and must not be read;
/// constructors guarantee `kind` always reflects exactly the populated
/// fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    kind: Kind,
    int: i32,
    float: f32,
    string: String,
}

impl Value {
    pub fn int(v: i32) -> Self {
        Value {
            kind: Kind::INT,
            int: v,
            float: 0.0,
            string: String::new(),
        }
    }

    pub fn float(v: f32) -> Self {
        Value {
            kind: Kind::FLOAT,
            int: 0,
            float: v,
            string: String::new(),
        }
    }

    pub fn string(v: impl Into<String>) -> Self {
        Value {
            kind: Kind::STRING,
            int: 0,
            float: 0.0,
            string: v.into(),
        }
    }

    /// Builds a value that carries all three readings at once, as produced
    /// by a consuming read of an input channel latch.
    pub fn tri(int: i32, float: f32, string: impl Into<String>) -> Self {
        Value {
            kind: Kind::INT | Kind::FLOAT | Kind::STRING,
            int,
            float,
            string: string.into(),
        }
    }

    /// Builds a value with an arbitrary combination of populated readings,
    /// for the execute stage's "propagate the union of operands' kinds"
    /// rule. Fields not named by `kind` are left at a meaningless default.
    pub fn from_parts(kind: Kind, int: i32, float: f32, string: impl Into<String>) -> Self {
        Value {
            kind,
            int,
            float,
            string: string.into(),
        }
    }

    /// A memory-reference fetch result: `Int|String` if `raw` parses as an
    /// `i32`, otherwise `String` alone -- a materialized memory reading is
    /// always `String`, plus `Int` when it parses, never `Float`.
    pub fn from_memory_reading(raw: &str) -> Self {
        match raw.parse::<i32>() {
            Ok(n) => Value::from_parts(Kind::INT | Kind::STRING, n, 0.0, raw),
            Err(_) => Value::string(raw),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn has(&self, k: Kind) -> bool {
        self.kind.contains(k)
    }

    /// The most meaningful kind this value carries: `Int -> Float -> String`.
    pub fn selected_kind(&self) -> Kind {
        if self.kind.contains(Kind::INT) {
            Kind::INT
        } else if self.kind.contains(Kind::FLOAT) {
            Kind::FLOAT
        } else {
            Kind::STRING
        }
    }

    pub fn as_int(&self) -> i32 {
        self.int
    }

    pub fn as_float(&self) -> f32 {
        self.float
    }

    pub fn as_string(&self) -> &str {
        &self.string
    }

    /// Stringifies the value under whichever kind [`Self::selected_kind`]
    /// picks; used for `ChannelWrite`/`MemoryWrite` payloads and for the
    /// `srx` sink conversion.
    pub fn stringify_selected(&self) -> String {
        match self.selected_kind() {
            Kind::INT => self.int.to_string(),
            Kind::FLOAT => self.float.to_string(),
            _ => self.string.clone(),
        }
    }

    /// The value's string reading, coerced analogously to
    /// [`Self::coerce_int`]/[`Self::coerce_float`] -- used by the string
    /// arithmetic paths (`add`/`sub` concatenation and substring removal)
    /// when an operand wasn't itself a string.
    pub fn as_string_coerced(&self) -> String {
        if self.has(Kind::STRING) {
            self.string.clone()
        } else {
            self.stringify_selected()
        }
    }

    /// The value's integer reading, coerced from whichever kind is
    /// actually populated when `int` itself isn't -- used both by the
    /// execute stage (to read an operand in the kind an operation needs)
    /// and by writeback (to store into an `irx` register regardless of
    /// the source kind), per the `mvf2i`/`mvs2i` conversion rules: a
    /// non-parseable string yields `-1`.
    pub fn coerce_int(&self) -> i32 {
        if self.has(Kind::INT) {
            self.int
        } else if self.has(Kind::FLOAT) {
            self.float as i32
        } else {
            self.string.trim().parse::<i32>().unwrap_or(-1)
        }
    }

    /// The value's float reading, coerced analogously to
    /// [`Self::coerce_int`]; a non-parseable string yields `NaN` (`mvs2f`).
    pub fn coerce_float(&self) -> f32 {
        if self.has(Kind::FLOAT) {
            self.float
        } else if self.has(Kind::INT) {
            self.int as f32
        } else {
            self.string.trim().parse::<f32>().unwrap_or(f32::NAN)
        }
    }
}

/// Computed inputs to the flag register after an instruction produces a
/// result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagUpdate {
    pub of: Option<bool>,
    pub sf: Option<bool>,
    pub zf: Option<bool>,
    pub cf: Option<bool>,
}

impl FlagUpdate {
    pub const NONE: FlagUpdate = FlagUpdate {
        of: None,
        sf: None,
        zf: None,
        cf: None,
    };

    /// Integer-kind output: `SF` = bit 31 of the low 32 bits, `ZF` = low 32
    /// bits zero, `CF` = any bit set in the upper 32 bits of a 64-bit
    /// accumulator, `OF = CF XOR SF`.
    pub fn from_int_accumulator(acc: u64) -> FlagUpdate {
        let low = acc as u32;
        let sf = (low >> 31) & 1 != 0;
        let zf = low == 0;
        let cf = (acc >> 32) != 0;
        let of = cf ^ sf;
        FlagUpdate {
            of: Some(of),
            sf: Some(sf),
            zf: Some(zf),
            cf: Some(cf),
        }
    }

    pub fn from_float(out: f32) -> FlagUpdate {
        FlagUpdate {
            of: None,
            sf: Some(out < 0.0),
            zf: Some(out == 0.0),
            cf: None,
        }
    }

    pub fn from_string(out: &str) -> FlagUpdate {
        FlagUpdate {
            of: None,
            sf: None,
            zf: Some(out.is_empty()),
            cf: None,
        }
    }
}

/// Lossless bit-reinterpretation between an `i32` and the IEEE-754 binary32
/// bit pattern it names, used by `ldi2f`/`ldf2i`.
pub fn bits_to_float(bits: i32) -> f32 {
    f32::from_bits(bits as u32)
}

pub fn float_to_bits(v: f32) -> i32 {
    v.to_bits() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_order_prefers_int_then_float_then_string() {
        let v = Value::tri(7, 1.5, "seven");
        assert_eq!(v.selected_kind(), Kind::INT);
        assert_eq!(v.stringify_selected(), "7");

        let v = Value {
            kind: Kind::FLOAT | Kind::STRING,
            int: 0,
            float: 2.5,
            string: "two and a half".into(),
        };
        assert_eq!(v.selected_kind(), Kind::FLOAT);

        let v = Value::string("only a string");
        assert_eq!(v.selected_kind(), Kind::STRING);
    }

    #[test]
    fn int_flags_carry_and_overflow() {
        // 0x7FFFFFFF + 1 -> 0x80000000, SF=1 ZF=0 OF=1 CF=0.
        let acc = 0x7FFF_FFFFu64 + 1;
        let flags = FlagUpdate::from_int_accumulator(acc);
        assert_eq!(flags.sf, Some(true));
        assert_eq!(flags.zf, Some(false));
        assert_eq!(flags.of, Some(true));
        assert_eq!(flags.cf, Some(false));
    }

    #[test]
    fn bit_reinterpretation_round_trips() {
        let i = -123_456_789_i32;
        assert_eq!(float_to_bits(bits_to_float(i)), i);
    }

    #[quickcheck_macros::quickcheck]
    fn qc_int_to_float_to_int_round_trips(i: i32) -> bool {
        float_to_bits(bits_to_float(i)) == i
    }

    #[quickcheck_macros::quickcheck]
    fn qc_float_to_int_to_float_round_trips(f: f32) -> bool {
        if f.is_nan() {
            return true;
        }
        let bits = float_to_bits(f);
        bits_to_float(bits) == f
    }
}
