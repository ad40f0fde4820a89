//! Pure word operations and their semantics.

use crate::U256;

/// Unary operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnOp {
    /// `x == 0`.
    IsZero,
    /// Bitwise not.
    Not,
}

/// Binary operations. `a` is the operand popped first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    SignExtend,
    Lt,
    Gt,
    SLt,
    SGt,
    Eq,
    And,
    Or,
    Xor,
    /// `BYTE`: byte `a` of `b`, counting from the most significant byte.
    Byte,
    /// `b << a`.
    Shl,
    /// `b >> a`.
    Shr,
    /// Arithmetic `b >> a`.
    Sar,
}

/// Ternary operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TernOp {
    /// `(a + b) % n` without intermediate overflow.
    AddMod,
    /// `(a * b) % n` without intermediate overflow.
    MulMod,
}

impl UnOp {
    /// Returns the mnemonic.
    pub const fn name(self) -> &'static str {
        match self {
            Self::IsZero => "iszero",
            Self::Not => "not",
        }
    }

    /// Evaluates the operation.
    #[inline]
    pub fn eval(self, a: U256) -> U256 {
        match self {
            Self::IsZero => U256::from(a.is_zero()),
            Self::Not => !a,
        }
    }
}

impl BinOp {
    /// Returns the mnemonic.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::UDiv => "udiv",
            Self::SDiv => "sdiv",
            Self::URem => "urem",
            Self::SRem => "srem",
            Self::SignExtend => "signextend",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::SLt => "slt",
            Self::SGt => "sgt",
            Self::Eq => "eq",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Byte => "byte",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::Sar => "sar",
        }
    }

    /// Evaluates the operation.
    pub fn eval(self, a: U256, b: U256) -> U256 {
        match self {
            Self::Add => a.wrapping_add(b),
            Self::Sub => a.wrapping_sub(b),
            Self::Mul => a.wrapping_mul(b),
            Self::UDiv => {
                if b.is_zero() {
                    U256::ZERO
                } else {
                    a / b
                }
            }
            Self::SDiv => sdiv(a, b),
            Self::URem => {
                if b.is_zero() {
                    U256::ZERO
                } else {
                    a % b
                }
            }
            Self::SRem => srem(a, b),
            Self::SignExtend => signextend(a, b),
            Self::Lt => U256::from(a < b),
            Self::Gt => U256::from(a > b),
            Self::SLt => U256::from(slt(a, b)),
            Self::SGt => U256::from(slt(b, a)),
            Self::Eq => U256::from(a == b),
            Self::And => a & b,
            Self::Or => a | b,
            Self::Xor => a ^ b,
            Self::Byte => match shift_amount(a) {
                Some(i) if i < 32 => (b >> (8 * (31 - i))) & U256::from(0xff),
                _ => U256::ZERO,
            },
            Self::Shl => match shift_amount(a) {
                Some(shift) => b << shift,
                None => U256::ZERO,
            },
            Self::Shr => match shift_amount(a) {
                Some(shift) => b >> shift,
                None => U256::ZERO,
            },
            Self::Sar => {
                let negative = is_negative(b);
                match shift_amount(a) {
                    Some(shift) if negative => !((!b) >> shift),
                    Some(shift) => b >> shift,
                    None if negative => U256::MAX,
                    None => U256::ZERO,
                }
            }
        }
    }
}

impl TernOp {
    /// Returns the mnemonic.
    pub const fn name(self) -> &'static str {
        match self {
            Self::AddMod => "addmod",
            Self::MulMod => "mulmod",
        }
    }

    /// Evaluates the operation. A zero modulus yields zero.
    #[inline]
    pub fn eval(self, a: U256, b: U256, n: U256) -> U256 {
        match self {
            Self::AddMod => a.add_mod(b, n),
            Self::MulMod => a.mul_mod(b, n),
        }
    }
}

#[inline]
fn is_negative(x: U256) -> bool {
    x.bit(255)
}

#[inline]
fn abs(x: U256) -> U256 {
    if is_negative(x) {
        x.wrapping_neg()
    } else {
        x
    }
}

/// Returns `x` as a shift amount if it is below 256.
#[inline]
fn shift_amount(x: U256) -> Option<usize> {
    if x < U256::from(256) {
        Some(x.as_limbs()[0] as usize)
    } else {
        None
    }
}

fn sdiv(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    // `MIN / -1` wraps back to `MIN`.
    let q = abs(a) / abs(b);
    if is_negative(a) != is_negative(b) {
        q.wrapping_neg()
    } else {
        q
    }
}

fn srem(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    let r = abs(a) % abs(b);
    if is_negative(a) {
        r.wrapping_neg()
    } else {
        r
    }
}

fn slt(a: U256, b: U256) -> bool {
    match (is_negative(a), is_negative(b)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

fn signextend(ext: U256, x: U256) -> U256 {
    match shift_amount(ext) {
        Some(i) if i < 31 => {
            let bit = i * 8 + 7;
            let mask = (U256::from(1) << bit) - U256::from(1);
            if x.bit(bit) {
                x | !mask
            } else {
                x & mask
            }
        }
        _ => x,
    }
}
