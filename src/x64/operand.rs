//! Instruction operands.
//!
//! Operands are pure value objects with structural equality: registers,
//! width-tagged memory references, integer immediates, label references,
//! and references into the constant pool. Memory addresses are built from
//! ordinary arithmetic on registers (`rax + rcx * 4 - 8`) and normalize to
//! base + index*scale + displacement no matter how the expression was
//! associated.

use std::fmt;
use std::ops::{Add, Mul, Sub};

use crate::core::error::{AsmError, AsmResult};
use crate::core::stream::LabelId;
use crate::x64::literal::ConstId;
use crate::x64::registers::{Reg, RegClass};

/// Memory access width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Size {
    Byte,
    Word,
    Dword,
    Qword,
    Tword,
    Oword,
    Hword,
}

impl Size {
    pub const fn bytes(self) -> u8 {
        match self {
            Size::Byte => 1,
            Size::Word => 2,
            Size::Dword => 4,
            Size::Qword => 8,
            Size::Tword => 10,
            Size::Oword => 16,
            Size::Hword => 32,
        }
    }

    pub fn from_bytes(bytes: u8) -> Option<Size> {
        Some(match bytes {
            1 => Size::Byte,
            2 => Size::Word,
            4 => Size::Dword,
            8 => Size::Qword,
            10 => Size::Tword,
            16 => Size::Oword,
            32 => Size::Hword,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            Size::Byte => "byte",
            Size::Word => "word",
            Size::Dword => "dword",
            Size::Qword => "qword",
            Size::Tword => "tword",
            Size::Oword => "oword",
            Size::Hword => "hword",
        }
    }
}

/// An address expression under construction. Not an operand by itself;
/// wrap it with a width helper (`qword_ptr` and friends) to obtain a
/// memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Addr {
    pub base: Option<Reg>,
    pub index: Option<Reg>,
    pub scale: u8,
    pub disp: i32,
}

impl Addr {
    fn validate_reg(reg: &Reg) -> AsmResult<()> {
        if reg.class != RegClass::Gp || reg.size != 8 {
            return Err(AsmError::InvalidOperand {
                reason: format!("address component {reg} is not a 64-bit general-purpose register"),
            });
        }
        Ok(())
    }

    /// Combine two partial address expressions. Fails when both sides
    /// contribute a base and an index would have to be invented with a
    /// scale other than 1, or when two scaled indices meet.
    fn combine(self, other: Addr) -> AsmResult<Addr> {
        let mut base = self.base;
        let mut index = self.index;
        let mut scale = self.scale;
        for (r, s) in [(other.base, 1u8), (other.index, other.scale)] {
            let Some(r) = r else { continue };
            if base.is_none() && s == 1 {
                base = Some(r);
            } else if index.is_none() {
                index = Some(r);
                scale = s;
            } else if base.is_none() && scale == 1 && s != 1 {
                // promote the existing unscaled index to base
                base = index;
                index = Some(r);
                scale = s;
            } else {
                return Err(AsmError::InvalidOperand {
                    reason: "address has more than two register components".to_string(),
                });
            }
        }
        let disp = self.disp.checked_add(other.disp).ok_or_else(|| AsmError::InvalidOperand {
            reason: "address displacement overflows 32 bits".to_string(),
        })?;
        Ok(Addr {
            base,
            index,
            scale,
            disp,
        })
    }
}

/// Entry points for address arithmetic.
pub fn addr(base: Reg) -> Addr {
    Addr {
        base: Some(base),
        index: None,
        scale: 1,
        disp: 0,
    }
}

/// Scaled index with no base, `scaled(rcx, 4)` for `rcx*4`.
pub fn scaled(index: Reg, scale: u8) -> Addr {
    Addr {
        base: None,
        index: Some(index),
        scale,
        disp: 0,
    }
}

impl Add<Reg> for Addr {
    type Output = Addr;
    fn add(self, rhs: Reg) -> Addr {
        self + addr(rhs)
    }
}

impl Add<Addr> for Addr {
    type Output = Addr;
    fn add(self, rhs: Addr) -> Addr {
        match self.combine(rhs) {
            Ok(a) => a,
            // surfaced again with context when the operand is built
            Err(_) => Addr {
                base: self.base,
                index: Some(Reg::gp(8, 0)),
                scale: 0,
                disp: self.disp,
            },
        }
    }
}

impl Add<i32> for Addr {
    type Output = Addr;
    fn add(self, rhs: i32) -> Addr {
        Addr {
            disp: self.disp.wrapping_add(rhs),
            ..self
        }
    }
}

impl Sub<i32> for Addr {
    type Output = Addr;
    fn sub(self, rhs: i32) -> Addr {
        Addr {
            disp: self.disp.wrapping_sub(rhs),
            ..self
        }
    }
}

impl Add<Reg> for Reg {
    type Output = Addr;
    fn add(self, rhs: Reg) -> Addr {
        addr(self) + addr(rhs)
    }
}

impl Add<i32> for Reg {
    type Output = Addr;
    fn add(self, rhs: i32) -> Addr {
        addr(self) + rhs
    }
}

impl Sub<i32> for Reg {
    type Output = Addr;
    fn sub(self, rhs: i32) -> Addr {
        addr(self) - rhs
    }
}

impl Mul<u8> for Reg {
    type Output = Addr;
    fn mul(self, rhs: u8) -> Addr {
        scaled(self, rhs)
    }
}

impl Add<Addr> for Reg {
    type Output = Addr;
    fn add(self, rhs: Addr) -> Addr {
        addr(self) + rhs
    }
}

/// A memory operand: a validated address expression plus an access width.
/// `size` may be absent when the width is implied by a register operand of
/// the same instruction; form matching fills it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mem {
    pub base: Option<Reg>,
    pub index: Option<Reg>,
    pub scale: u8,
    pub disp: i32,
    pub size: Option<Size>,
    /// RIP-relative reference into the constant pool; exclusive with
    /// base/index.
    pub literal: Option<ConstId>,
}

impl Mem {
    /// Validate and freeze an address expression at the given width.
    pub fn new(a: Addr, size: Option<Size>) -> AsmResult<Mem> {
        if a.scale == 0 {
            return Err(AsmError::InvalidOperand {
                reason: "invalid address expression (more than two registers, or displacement overflow)"
                    .to_string(),
            });
        }
        if let Some(base) = &a.base {
            Addr::validate_reg(base)?;
        }
        if let Some(index) = &a.index {
            Addr::validate_reg(index)?;
            if !matches!(a.scale, 1 | 2 | 4 | 8) {
                return Err(AsmError::InvalidOperand {
                    reason: format!("scale {} is not one of 1, 2, 4, 8", a.scale),
                });
            }
            if index.phys() == Some(4) {
                return Err(AsmError::InvalidOperand {
                    reason: "rsp can not be used as an index register".to_string(),
                });
            }
        }
        if a.base.is_none() && a.index.is_none() {
            return Err(AsmError::InvalidOperand {
                reason: "memory operand has no base or index register".to_string(),
            });
        }
        Ok(Mem {
            base: a.base,
            index: a.index,
            scale: a.scale,
            disp: a.disp,
            size,
            literal: None,
        })
    }

    /// RIP-relative reference to a pool constant. The displacement is
    /// patched during layout.
    pub fn literal(id: ConstId, size: Size) -> Mem {
        Mem {
            base: None,
            index: None,
            scale: 1,
            disp: 0,
            size: Some(size),
            literal: Some(id),
        }
    }

    pub fn with_size(self, size: Size) -> Mem {
        Mem {
            size: Some(size),
            ..self
        }
    }

    /// Registers read when this operand is evaluated.
    pub fn regs(&self) -> impl Iterator<Item = Reg> + '_ {
        self.base.iter().chain(self.index.iter()).copied()
    }
}

impl fmt::Display for Mem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = self.literal {
            return write!(f, "[rel const{}]", id.0);
        }
        f.write_str("[")?;
        let mut wrote = false;
        if let Some(base) = &self.base {
            write!(f, "{base}")?;
            wrote = true;
        }
        if let Some(index) = &self.index {
            if wrote {
                f.write_str(" + ")?;
            }
            write!(f, "{index}")?;
            if self.scale != 1 {
                write!(f, "*{}", self.scale)?;
            }
            wrote = true;
        }
        if self.disp != 0 || !wrote {
            if self.disp < 0 {
                write!(f, " - {}", -(self.disp as i64))?;
            } else if wrote {
                write!(f, " + {}", self.disp)?;
            } else {
                write!(f, "{}", self.disp)?;
            }
        }
        f.write_str("]")
    }
}

macro_rules! ptr_helpers {
    ($($fn_name:ident => $size:ident),+ $(,)?) => {
        $(
            /// Width-tagging helper for memory operands.
            pub fn $fn_name(a: impl Into<Addr>) -> AsmResult<Mem> {
                Mem::new(a.into(), Some(Size::$size))
            }
        )+
    };
}

ptr_helpers!(
    byte_ptr => Byte,
    word_ptr => Word,
    dword_ptr => Dword,
    qword_ptr => Qword,
    oword_ptr => Oword,
    hword_ptr => Hword,
);

/// Untyped memory operand; the access width is taken from the register
/// operand of the instruction it is used with.
pub fn mem(a: impl Into<Addr>) -> AsmResult<Mem> {
    Mem::new(a.into(), None)
}

impl From<Reg> for Addr {
    fn from(r: Reg) -> Addr {
        addr(r)
    }
}

/// Any instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg(Reg),
    Mem(Mem),
    Imm(i64),
    Label(LabelId),
}

impl Operand {
    pub fn reg(&self) -> Option<Reg> {
        match self {
            Operand::Reg(r) => Some(*r),
            _ => None,
        }
    }

    /// Registers read when this operand is evaluated as a source or
    /// address.
    pub fn regs(&self) -> Vec<Reg> {
        match self {
            Operand::Reg(r) => vec![*r],
            Operand::Mem(m) => m.regs().collect(),
            _ => Vec::new(),
        }
    }
}

impl From<Reg> for Operand {
    fn from(r: Reg) -> Operand {
        Operand::Reg(r)
    }
}

impl From<Mem> for Operand {
    fn from(m: Mem) -> Operand {
        Operand::Mem(m)
    }
}

impl From<LabelId> for Operand {
    fn from(l: LabelId) -> Operand {
        Operand::Label(l)
    }
}

macro_rules! imm_from {
    ($($t:ty),+) => {
        $(impl From<$t> for Operand {
            fn from(v: $t) -> Operand {
                Operand::Imm(v as i64)
            }
        })+
    };
}

imm_from!(i8, i16, i32, i64, u8, u16, u32);

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{r}"),
            Operand::Mem(m) => write!(f, "{m}"),
            Operand::Imm(v) => write!(f, "{v}"),
            Operand::Label(l) => write!(f, "label<{}>", l.index()),
        }
    }
}

/// Immediate range predicates. `fits_*` follow x86 semantics: a value fits
/// a narrower immediate field of a wider operation when sign extension
/// reproduces it.
pub fn fits_imm8(v: i64) -> bool {
    (-128..=127).contains(&v)
}

pub fn fits_imm8_ext(v: i64, operand_size: Size) -> bool {
    // unsigned byte operands accept 128..=255 as well
    match operand_size {
        Size::Byte => (-128..=255).contains(&v),
        _ => fits_imm8(v),
    }
}

pub fn fits_imm16(v: i64) -> bool {
    (-32768..=65535).contains(&v)
}

pub fn fits_imm32(v: i64) -> bool {
    (-2147483648..=2147483647).contains(&v)
}

/// imm32 field of a 64-bit operation: sign-extended, so unsigned values
/// above `i32::MAX` must take the imm64 form.
pub fn fits_imm32_sext(v: i64) -> bool {
    v >= i32::MIN as i64 && v <= i32::MAX as i64
}

pub fn fits_imm32_zext(v: i64) -> bool {
    (0..=u32::MAX as i64).contains(&v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x64::registers::{R12, R13, RAX, RBX, RCX, RSP};

    #[test]
    fn address_normalization_is_commutative() {
        let a = qword_ptr(RAX + RCX * 4 + 16).unwrap();
        let b = qword_ptr(RCX * 4 + (RAX + 16)).unwrap();
        let c = qword_ptr(scaled(RCX, 4) + RAX + 16).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.base, Some(RAX));
        assert_eq!(a.index, Some(RCX));
        assert_eq!(a.scale, 4);
        assert_eq!(a.disp, 16);
    }

    #[test]
    fn two_plain_registers_become_base_and_index() {
        let m = qword_ptr(RAX + RBX).unwrap();
        assert_eq!(m.base, Some(RAX));
        assert_eq!(m.index, Some(RBX));
        assert_eq!(m.scale, 1);
    }

    #[test]
    fn negative_displacement() {
        let m = dword_ptr(R13 - 4).unwrap();
        assert_eq!(m.disp, -4);
        assert_eq!(m.base, Some(R13));
    }

    #[test]
    fn rsp_index_rejected() {
        assert!(qword_ptr(RAX + RSP * 2).is_err());
        assert!(qword_ptr(RSP + 8).is_ok());
    }

    #[test]
    fn bad_scale_rejected() {
        assert!(qword_ptr(scaled(RCX, 3)).is_err());
        assert!(qword_ptr(scaled(R12, 8)).is_ok());
    }

    #[test]
    fn narrow_register_rejected_in_address() {
        use crate::x64::registers::EAX;
        assert!(qword_ptr(EAX + 4).is_err());
    }

    #[test]
    fn three_registers_rejected() {
        let e = qword_ptr(RAX + RBX + RCX);
        assert!(e.is_err());
    }

    #[test]
    fn immediate_predicates() {
        assert!(fits_imm8(-128));
        assert!(!fits_imm8(128));
        assert!(fits_imm8_ext(200, Size::Byte));
        assert!(!fits_imm8_ext(200, Size::Dword));
        assert!(fits_imm32_sext(-1));
        assert!(!fits_imm32_zext(-1));
        assert!(!fits_imm32_sext(u32::MAX as i64));
        assert!(fits_imm32_zext(u32::MAX as i64));
    }

    #[test]
    fn display_forms() {
        let m = qword_ptr(RAX + RCX * 8 - 32).unwrap();
        assert_eq!(m.to_string(), "[rax + rcx*8 - 32]");
        assert_eq!(dword_ptr(addr(RBX)).unwrap().to_string(), "[rbx]");
    }
}
