//! x86-64 register model.
//!
//! Registers are a sum type over register class (general-purpose, MMX, XMM,
//! YMM, mask) tagged with an access width. A register is either physical,
//! with a fixed hardware index, or virtual, carrying an allocation-time
//! identifier that the register allocator later replaces with a physical
//! index. Class and width are fixed at creation and never change.

use std::fmt;

/// Register class. XMM and YMM name the same physical file at different
/// access widths but are kept distinct so operand-form matching can tell
/// them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    Gp,
    Mmx,
    Xmm,
    Ymm,
    Mask,
}

impl RegClass {
    /// Allocation bank for this class. XMM and YMM share a bank.
    pub const fn bank(self) -> u8 {
        match self {
            RegClass::Gp => 0,
            RegClass::Mmx => 1,
            RegClass::Xmm | RegClass::Ymm => 2,
            RegClass::Mask => 3,
        }
    }

    /// Number of architectural registers in this class's bank.
    pub const fn phys_count(self) -> u8 {
        match self {
            RegClass::Gp => 16,
            RegClass::Mmx => 8,
            RegClass::Xmm | RegClass::Ymm => 16,
            RegClass::Mask => 8,
        }
    }
}

/// Number of allocation banks.
pub const BANK_COUNT: usize = 4;

/// Physical or virtual register identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegId {
    /// Architectural register index (0-15, or 0-7 for MMX and mask).
    Phys(u8),
    /// Virtual register number, unique within one function.
    Virt(u32),
}

/// A register operand. Structural equality and hashing: two values naming
/// the same register at the same width compare equal, which the allocator
/// and encoder rely on for map lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg {
    pub class: RegClass,
    /// Access width in bytes (1/2/4/8 for GP, 8 for MMX and mask, 16 for
    /// XMM, 32 for YMM).
    pub size: u8,
    pub id: RegId,
}

impl Reg {
    pub const fn gp(size: u8, index: u8) -> Self {
        Reg {
            class: RegClass::Gp,
            size,
            id: RegId::Phys(index),
        }
    }

    pub const fn mmx(index: u8) -> Self {
        Reg {
            class: RegClass::Mmx,
            size: 8,
            id: RegId::Phys(index),
        }
    }

    pub const fn xmm(index: u8) -> Self {
        Reg {
            class: RegClass::Xmm,
            size: 16,
            id: RegId::Phys(index),
        }
    }

    pub const fn ymm(index: u8) -> Self {
        Reg {
            class: RegClass::Ymm,
            size: 32,
            id: RegId::Phys(index),
        }
    }

    pub const fn mask(index: u8) -> Self {
        Reg {
            class: RegClass::Mask,
            size: 8,
            id: RegId::Phys(index),
        }
    }

    pub const fn is_virtual(&self) -> bool {
        matches!(self.id, RegId::Virt(_))
    }

    /// Physical index, if allocated.
    pub fn phys(&self) -> Option<u8> {
        match self.id {
            RegId::Phys(i) => Some(i),
            RegId::Virt(_) => None,
        }
    }

    /// Physical index under the assumption that allocation already ran.
    /// Reaching this with a virtual register is an internal defect.
    pub fn phys_or_panic(&self) -> u8 {
        match self.id {
            RegId::Phys(i) => i,
            RegId::Virt(v) => unreachable!("virtual register v{v} reached the encoder"),
        }
    }

    /// Key used by liveness and interference tracking: physical registers
    /// map to non-negative values, virtual ones to negative values, within
    /// a bank.
    pub fn live_key(&self) -> RegKey {
        let code = match self.id {
            RegId::Phys(i) => i as i64,
            RegId::Virt(v) => -(v as i64) - 1,
        };
        RegKey {
            bank: self.class.bank(),
            code,
        }
    }

    /// Low three bits of the physical index, the ModRM/SIB field value.
    pub fn lcode(&self) -> u8 {
        self.phys_or_panic() & 0b111
    }

    /// Fourth bit of the physical index, carried by REX.R/X/B or the
    /// inverted VEX fields.
    pub fn hcode(&self) -> u8 {
        (self.phys_or_panic() >> 3) & 1
    }

    /// True for 8-bit registers that are only addressable with a REX
    /// prefix present (spl, bpl, sil, dil).
    pub fn needs_rex_for_byte(&self) -> bool {
        self.class == RegClass::Gp
            && self.size == 1
            && matches!(self.id, RegId::Phys(i) if (4..8).contains(&i))
    }

    /// Same register file entry at a different access width.
    pub fn with_size(&self, size: u8) -> Reg {
        debug_assert!(self.class == RegClass::Gp || self.class == RegClass::Xmm || self.class == RegClass::Ymm);
        let class = match (self.class, size) {
            (RegClass::Xmm | RegClass::Ymm, 16) => RegClass::Xmm,
            (RegClass::Xmm | RegClass::Ymm, 32) => RegClass::Ymm,
            (c, _) => c,
        };
        Reg {
            class,
            size,
            id: self.id,
        }
    }
}

/// Bank-qualified identity used in liveness sets and conflict maps.
/// `code >= 0` names a physical register, `code < 0` a virtual one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegKey {
    pub bank: u8,
    pub code: i64,
}

impl RegKey {
    pub fn is_virtual(&self) -> bool {
        self.code < 0
    }

    /// Virtual register number, if virtual.
    pub fn virt(&self) -> Option<u32> {
        if self.code < 0 {
            Some((-(self.code) - 1) as u32)
        } else {
            None
        }
    }
}

const GP64_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];
const GP32_NAMES: [&str; 16] = [
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d",
    "r12d", "r13d", "r14d", "r15d",
];
const GP16_NAMES: [&str; 16] = [
    "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w",
    "r13w", "r14w", "r15w",
];
const GP8_NAMES: [&str; 16] = [
    "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b", "r12b",
    "r13b", "r14b", "r15b",
];

/// Go assembler spelling of a general-purpose register, width-independent.
pub(crate) const GO_GP_NAMES: [&str; 16] = [
    "AX", "CX", "DX", "BX", "SP", "BP", "SI", "DI", "R8", "R9", "R10", "R11", "R12", "R13",
    "R14", "R15",
];

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            RegId::Virt(v) => {
                let prefix = match (self.class, self.size) {
                    (RegClass::Gp, 1) => "b",
                    (RegClass::Gp, 2) => "w",
                    (RegClass::Gp, 4) => "d",
                    (RegClass::Gp, _) => "q",
                    (RegClass::Mmx, _) => "mm",
                    (RegClass::Xmm, _) => "x",
                    (RegClass::Ymm, _) => "y",
                    (RegClass::Mask, _) => "k",
                };
                write!(f, "{prefix}-vreg<{v}>")
            }
            RegId::Phys(i) => {
                let i = i as usize;
                match (self.class, self.size) {
                    (RegClass::Gp, 1) => f.write_str(GP8_NAMES[i]),
                    (RegClass::Gp, 2) => f.write_str(GP16_NAMES[i]),
                    (RegClass::Gp, 4) => f.write_str(GP32_NAMES[i]),
                    (RegClass::Gp, _) => f.write_str(GP64_NAMES[i]),
                    (RegClass::Mmx, _) => write!(f, "mm{i}"),
                    (RegClass::Xmm, _) => write!(f, "xmm{i}"),
                    (RegClass::Ymm, _) => write!(f, "ymm{i}"),
                    (RegClass::Mask, _) => write!(f, "k{i}"),
                }
            }
        }
    }
}

macro_rules! gp_consts {
    ($size:expr, $($name:ident = $idx:expr),+ $(,)?) => {
        $(pub const $name: Reg = Reg::gp($size, $idx);)+
    };
}

gp_consts!(8, RAX = 0, RCX = 1, RDX = 2, RBX = 3, RSP = 4, RBP = 5, RSI = 6, RDI = 7,
    R8 = 8, R9 = 9, R10 = 10, R11 = 11, R12 = 12, R13 = 13, R14 = 14, R15 = 15);
gp_consts!(4, EAX = 0, ECX = 1, EDX = 2, EBX = 3, ESP = 4, EBP = 5, ESI = 6, EDI = 7,
    R8D = 8, R9D = 9, R10D = 10, R11D = 11, R12D = 12, R13D = 13, R14D = 14, R15D = 15);
gp_consts!(2, AX = 0, CX = 1, DX = 2, BX = 3, SP = 4, BP = 5, SI = 6, DI = 7,
    R8W = 8, R9W = 9, R10W = 10, R11W = 11, R12W = 12, R13W = 13, R14W = 14, R15W = 15);
gp_consts!(1, AL = 0, CL = 1, DL = 2, BL = 3, SPL = 4, BPL = 5, SIL = 6, DIL = 7,
    R8B = 8, R9B = 9, R10B = 10, R11B = 11, R12B = 12, R13B = 13, R14B = 14, R15B = 15);

macro_rules! vec_consts {
    ($ctor:ident, $($name:ident = $idx:expr),+ $(,)?) => {
        $(pub const $name: Reg = Reg::$ctor($idx);)+
    };
}

vec_consts!(mmx, MM0 = 0, MM1 = 1, MM2 = 2, MM3 = 3, MM4 = 4, MM5 = 5, MM6 = 6, MM7 = 7);
vec_consts!(xmm, XMM0 = 0, XMM1 = 1, XMM2 = 2, XMM3 = 3, XMM4 = 4, XMM5 = 5, XMM6 = 6,
    XMM7 = 7, XMM8 = 8, XMM9 = 9, XMM10 = 10, XMM11 = 11, XMM12 = 12, XMM13 = 13,
    XMM14 = 14, XMM15 = 15);
vec_consts!(ymm, YMM0 = 0, YMM1 = 1, YMM2 = 2, YMM3 = 3, YMM4 = 4, YMM5 = 5, YMM6 = 6,
    YMM7 = 7, YMM8 = 8, YMM9 = 9, YMM10 = 10, YMM11 = 11, YMM12 = 12, YMM13 = 13,
    YMM14 = 14, YMM15 = 15);
vec_consts!(mask, K0 = 0, K1 = 1, K2 = 2, K3 = 3, K4 = 4, K5 = 5, K6 = 6, K7 = 7);

/// Counter handing out virtual register numbers for one function.
#[derive(Debug, Default)]
pub struct VirtRegAllocator {
    next: u32,
}

impl VirtRegAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&mut self, class: RegClass, size: u8) -> Reg {
        let id = self.next;
        self.next += 1;
        Reg {
            class,
            size,
            id: RegId::Virt(id),
        }
    }

    pub fn gp8(&mut self) -> Reg {
        self.fresh(RegClass::Gp, 1)
    }

    pub fn gp16(&mut self) -> Reg {
        self.fresh(RegClass::Gp, 2)
    }

    pub fn gp32(&mut self) -> Reg {
        self.fresh(RegClass::Gp, 4)
    }

    pub fn gp64(&mut self) -> Reg {
        self.fresh(RegClass::Gp, 8)
    }

    pub fn mmx(&mut self) -> Reg {
        self.fresh(RegClass::Mmx, 8)
    }

    pub fn xmm(&mut self) -> Reg {
        self.fresh(RegClass::Xmm, 16)
    }

    pub fn ymm(&mut self) -> Reg {
        self.fresh(RegClass::Ymm, 32)
    }

    pub fn mask(&mut self) -> Reg {
        self.fresh(RegClass::Mask, 8)
    }

    /// Number of virtual registers created so far.
    pub fn count(&self) -> u32 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_codes() {
        assert_eq!(RAX.lcode(), 0);
        assert_eq!(RAX.hcode(), 0);
        assert_eq!(R8.lcode(), 0);
        assert_eq!(R8.hcode(), 1);
        assert_eq!(R13.lcode(), 5);
        assert_eq!(R13.hcode(), 1);
        assert_eq!(XMM15.lcode(), 7);
        assert_eq!(XMM15.hcode(), 1);
    }

    #[test]
    fn byte_registers_requiring_rex() {
        assert!(SPL.needs_rex_for_byte());
        assert!(DIL.needs_rex_for_byte());
        assert!(!AL.needs_rex_for_byte());
        assert!(!R8B.needs_rex_for_byte());
    }

    #[test]
    fn structural_equality() {
        assert_eq!(RAX, Reg::gp(8, 0));
        assert_ne!(RAX, EAX);
        let mut alloc = VirtRegAllocator::new();
        let a = alloc.gp64();
        let b = alloc.gp64();
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn live_keys_separate_banks() {
        assert_ne!(RAX.live_key(), XMM0.live_key());
        assert_eq!(XMM3.live_key(), YMM3.live_key());
        let mut alloc = VirtRegAllocator::new();
        let v = alloc.gp64();
        assert!(v.live_key().is_virtual());
        assert_eq!(v.live_key().virt(), Some(0));
        assert!(!RAX.live_key().is_virtual());
    }

    #[test]
    fn width_conversion() {
        assert_eq!(RAX.with_size(4), EAX);
        assert_eq!(R9.with_size(1), R9B);
        assert_eq!(XMM5.with_size(32), YMM5);
    }

    #[test]
    fn display_names() {
        assert_eq!(RSP.to_string(), "rsp");
        assert_eq!(R13D.to_string(), "r13d");
        assert_eq!(SIL.to_string(), "sil");
        assert_eq!(YMM9.to_string(), "ymm9");
    }
}
