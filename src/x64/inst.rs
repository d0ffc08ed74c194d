//! Instruction representation and the recipe-driven encoder.
//!
//! Every mnemonic is described by a closed list of operand-signature
//! variants (`Form`). A form declares which operand positions are read and
//! written, the fixed-register constraints of its signature, and one or
//! more byte-level encoding recipes (`Enc`). Dispatch over the supplied
//! operands happens by operand-kind matching in declaration order; among
//! the recipes applicable to the concrete (allocated) operands, the
//! shortest encoding wins.

use crate::x64::encoding::{self, RmTarget};
use crate::core::stream::LabelId;
use crate::x64::isa::Extension;
use crate::x64::literal::ConstId;
use crate::x64::operand::{
    fits_imm16, fits_imm32_sext, fits_imm32_zext, fits_imm8, Mem, Operand, Size,
};
use crate::x64::registers::{Reg, RegClass, RegId};

/// Operand kind accepted by one position of a form signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    R8,
    R16,
    R32,
    R64,
    Mm,
    Xmm,
    Ymm,
    /// 8-bit GP register constrained to cl (virtual registers bind to cl).
    Cl,
    /// XMM register constrained to xmm0 (virtual registers bind to xmm0).
    Xmm0,
    /// Memory operand of any width.
    M,
    M8,
    M16,
    M32,
    M64,
    M128,
    M256,
    /// Immediate for a byte-wide operation: -128..=255.
    Imm8,
    /// Sign-extended 8-bit immediate of a wider operation: -128..=127.
    SImm8,
    Imm16,
    /// Immediate stored in 32 bits: -2^31..=2^32-1.
    Imm32,
    /// 32-bit immediate sign-extended to 64 bits: -2^31..=2^31-1.
    SImm32,
    Imm64,
    /// Branch target label.
    Label,
}

impl OpKind {
    pub fn matches(self, op: &Operand) -> bool {
        match (self, op) {
            (OpKind::R8, Operand::Reg(r)) => r.class == RegClass::Gp && r.size == 1,
            (OpKind::R16, Operand::Reg(r)) => r.class == RegClass::Gp && r.size == 2,
            (OpKind::R32, Operand::Reg(r)) => r.class == RegClass::Gp && r.size == 4,
            (OpKind::R64, Operand::Reg(r)) => r.class == RegClass::Gp && r.size == 8,
            (OpKind::Mm, Operand::Reg(r)) => r.class == RegClass::Mmx,
            (OpKind::Xmm, Operand::Reg(r)) => r.class == RegClass::Xmm,
            (OpKind::Ymm, Operand::Reg(r)) => r.class == RegClass::Ymm,
            (OpKind::Cl, Operand::Reg(r)) => {
                r.class == RegClass::Gp
                    && r.size == 1
                    && matches!(r.id, RegId::Virt(_) | RegId::Phys(1))
            }
            (OpKind::Xmm0, Operand::Reg(r)) => {
                r.class == RegClass::Xmm && matches!(r.id, RegId::Virt(_) | RegId::Phys(0))
            }
            (OpKind::M, Operand::Mem(_)) => true,
            (OpKind::M8, Operand::Mem(m)) => m.size.is_none() || m.size == Some(Size::Byte),
            (OpKind::M16, Operand::Mem(m)) => m.size.is_none() || m.size == Some(Size::Word),
            (OpKind::M32, Operand::Mem(m)) => m.size.is_none() || m.size == Some(Size::Dword),
            (OpKind::M64, Operand::Mem(m)) => m.size.is_none() || m.size == Some(Size::Qword),
            (OpKind::M128, Operand::Mem(m)) => m.size.is_none() || m.size == Some(Size::Oword),
            (OpKind::M256, Operand::Mem(m)) => m.size.is_none() || m.size == Some(Size::Hword),
            (OpKind::Imm8, Operand::Imm(v)) => (-128..=255).contains(v),
            (OpKind::SImm8, Operand::Imm(v)) => fits_imm8(*v),
            (OpKind::Imm16, Operand::Imm(v)) => fits_imm16(*v),
            (OpKind::Imm32, Operand::Imm(v)) => fits_imm32_sext(*v) || fits_imm32_zext(*v),
            (OpKind::SImm32, Operand::Imm(v)) => fits_imm32_sext(*v),
            (OpKind::Imm64, Operand::Imm(_)) => true,
            (OpKind::Label, Operand::Label(_)) => true,
            _ => false,
        }
    }

    /// Memory width this kind implies, used to tag untyped memory
    /// operands at dispatch.
    pub fn mem_size(self) -> Option<Size> {
        Some(match self {
            OpKind::M8 => Size::Byte,
            OpKind::M16 => Size::Word,
            OpKind::M32 => Size::Dword,
            OpKind::M64 => Size::Qword,
            OpKind::M128 => Size::Oword,
            OpKind::M256 => Size::Hword,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            OpKind::R8 => "r8",
            OpKind::R16 => "r16",
            OpKind::R32 => "r32",
            OpKind::R64 => "r64",
            OpKind::Mm => "mm",
            OpKind::Xmm => "xmm",
            OpKind::Ymm => "ymm",
            OpKind::Cl => "cl",
            OpKind::Xmm0 => "xmm0",
            OpKind::M => "m",
            OpKind::M8 => "m8",
            OpKind::M16 => "m16",
            OpKind::M32 => "m32",
            OpKind::M64 => "m64",
            OpKind::M128 => "m128",
            OpKind::M256 => "m256",
            OpKind::Imm8 | OpKind::SImm8 => "imm8",
            OpKind::Imm16 => "imm16",
            OpKind::Imm32 | OpKind::SImm32 => "imm32",
            OpKind::Imm64 => "imm64",
            OpKind::Label => "rel",
        }
    }
}

/// The ModRM reg field source.
#[derive(Debug, Clone, Copy)]
pub enum RegField {
    /// Register operand at this position supplies reg and REX.R.
    Op(u8),
    /// Fixed opcode-extension digit.
    Digit(u8),
}

/// VEX/XOP prefix parameters of an encoding.
#[derive(Debug, Clone, Copy)]
pub struct VexSpec {
    /// 0xC4 for VEX, 0x8F for XOP.
    pub escape: u8,
    /// Opcode map: 1 = 0F, 2 = 0F38, 3 = 0F3A (XOP maps 8-10).
    pub mmmmm: u8,
    pub w: bool,
    /// L bit: 256-bit operation.
    pub l: bool,
    /// Implied legacy prefix: 0 = none, 1 = 66, 2 = F3, 3 = F2.
    pub pp: u8,
}

/// Applicability flags of an encoding recipe.
pub mod flags {
    /// Operand 0 must be the physical accumulator (al/ax/eax/rax).
    pub const ACC_OP0: u16 = 0x01;
    /// Operand 1 must be the physical accumulator.
    pub const ACC_OP1: u16 = 0x02;
    /// Label encoding with an 8-bit displacement.
    pub const REL8: u16 = 0x04;
    /// Label encoding with a 32-bit displacement.
    pub const REL32: u16 = 0x08;
    /// Byte immediate field; applicable only when the immediate operand
    /// fits a signed byte (the 0x83 ALU forms).
    pub const IMM_SX8: u16 = 0x10;
}

/// One byte-level encoding recipe.
#[derive(Debug, Clone, Copy)]
pub struct Enc {
    /// Mandatory legacy prefixes, emitted first (0x66/0xF2/0xF3).
    pub prefixes: &'static [u8],
    /// REX.W.
    pub rex_w: bool,
    pub vex: Option<VexSpec>,
    pub opcode: &'static [u8],
    /// Operand whose low code is added to the final opcode byte.
    pub plus_r: Option<u8>,
    /// ModRM reg and r/m sides; absent for opcode-only forms.
    pub modrm: Option<(RegField, u8)>,
    /// Operand encoded in VEX.vvvv.
    pub vvvv: Option<u8>,
    /// Immediate operand position and field width.
    pub imm: Option<(u8, u8)>,
    /// Register operand encoded in the high nibble of a trailing imm8
    /// (the VEX /is4 forms).
    pub is4: Option<u8>,
    pub flags: u16,
}

impl Enc {
    pub const fn new(opcode: &'static [u8]) -> Enc {
        Enc {
            prefixes: &[],
            rex_w: false,
            vex: None,
            opcode,
            plus_r: None,
            modrm: None,
            vvvv: None,
            imm: None,
            is4: None,
            flags: 0,
        }
    }

    pub const fn w(mut self) -> Enc {
        self.rex_w = true;
        self
    }

    pub const fn prefix(mut self, p: &'static [u8]) -> Enc {
        self.prefixes = p;
        self
    }

    pub const fn modrm_reg(mut self, reg_op: u8, rm_op: u8) -> Enc {
        self.modrm = Some((RegField::Op(reg_op), rm_op));
        self
    }

    pub const fn modrm_digit(mut self, digit: u8, rm_op: u8) -> Enc {
        self.modrm = Some((RegField::Digit(digit), rm_op));
        self
    }

    pub const fn plus(mut self, op: u8) -> Enc {
        self.plus_r = Some(op);
        self
    }

    pub const fn imm_op(mut self, op: u8, width: u8) -> Enc {
        self.imm = Some((op, width));
        self
    }

    pub const fn vex(mut self, mmmmm: u8, pp: u8, l: bool, w: bool) -> Enc {
        self.vex = Some(VexSpec {
            escape: encoding::ESCAPE_VEX,
            mmmmm,
            w,
            l,
            pp,
        });
        self
    }

    pub const fn nds(mut self, op: u8) -> Enc {
        self.vvvv = Some(op);
        self
    }

    pub const fn is4_op(mut self, op: u8) -> Enc {
        self.is4 = Some(op);
        self
    }

    pub const fn flag(mut self, f: u16) -> Enc {
        self.flags |= f;
        self
    }
}

/// One operand-signature variant of a mnemonic.
#[derive(Debug)]
pub struct Form {
    pub sig: &'static [OpKind],
    /// Bit i set: operand i is read.
    pub in_mask: u8,
    /// Bit i set: operand i is written.
    pub out_mask: u8,
    pub encs: &'static [Enc],
    /// Both source operands cancel when identical (XOR r, r): the
    /// instruction reads nothing.
    pub cancelling: bool,
    pub isa: Option<Extension>,
    /// Registers read and written beyond the explicit operands (CPUID,
    /// one-operand MUL/DIV, RDTSC).
    pub implicit_in: &'static [Reg],
    pub implicit_out: &'static [Reg],
}

impl Form {
    pub const fn new(
        sig: &'static [OpKind],
        in_mask: u8,
        out_mask: u8,
        encs: &'static [Enc],
    ) -> Form {
        Form {
            sig,
            in_mask,
            out_mask,
            encs,
            cancelling: false,
            isa: None,
            implicit_in: &[],
            implicit_out: &[],
        }
    }

    pub const fn cancelling(mut self) -> Form {
        self.cancelling = true;
        self
    }

    pub const fn ext(mut self, e: Extension) -> Form {
        self.isa = Some(e);
        self
    }

    pub const fn reads(mut self, regs: &'static [Reg]) -> Form {
        self.implicit_in = regs;
        self
    }

    pub const fn writes(mut self, regs: &'static [Reg]) -> Form {
        self.implicit_out = regs;
        self
    }

    pub fn matches(&self, ops: &[Operand]) -> bool {
        self.sig.len() == ops.len()
            && self.sig.iter().zip(ops).all(|(k, o)| k.matches(o))
    }
}

/// Condition codes for Jcc/SETcc/CMOVcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cond {
    O = 0,
    No = 1,
    B = 2,
    Ae = 3,
    E = 4,
    Ne = 5,
    Be = 6,
    A = 7,
    S = 8,
    Ns = 9,
    P = 10,
    Np = 11,
    L = 12,
    Ge = 13,
    Le = 14,
    G = 15,
}

impl Cond {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            Cond::O => "o",
            Cond::No => "no",
            Cond::B => "b",
            Cond::Ae => "ae",
            Cond::E => "e",
            Cond::Ne => "ne",
            Cond::Be => "be",
            Cond::A => "a",
            Cond::S => "s",
            Cond::Ns => "ns",
            Cond::P => "p",
            Cond::Np => "np",
            Cond::L => "l",
            Cond::Ge => "ge",
            Cond::Le => "le",
            Cond::G => "g",
        }
    }

    /// Plan-9 spelling of the jump with this condition.
    pub const fn go_jump_name(self) -> &'static str {
        match self {
            Cond::O => "JOS",
            Cond::No => "JOC",
            Cond::B => "JCS",
            Cond::Ae => "JCC",
            Cond::E => "JEQ",
            Cond::Ne => "JNE",
            Cond::Be => "JLS",
            Cond::A => "JHI",
            Cond::S => "JMI",
            Cond::Ns => "JPL",
            Cond::P => "JPS",
            Cond::Np => "JPC",
            Cond::L => "JLT",
            Cond::Ge => "JGE",
            Cond::Le => "JLE",
            Cond::G => "JGT",
        }
    }
}

/// Instruction payload beyond the plain operand list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstKind {
    Normal,
    /// JMP or Jcc to a stream label.
    Branch { cond: Option<Cond>, target: LabelId },
    /// CALL to a stream label, always rel32.
    CallLabel { target: LabelId },
    Ret,
    /// Label binding point; encodes to nothing.
    Bind(LabelId),
    /// Alignment padding to the given power-of-two boundary.
    Align(u8),
    /// Argument load pseudo, lowered during ABI binding.
    LoadArg { arg: u8 },
    /// Return pseudo, lowered during ABI binding.
    Return,
    /// Post-lowering Plan-9 argument load: operand 0 receives the stack
    /// slot `offset` bytes above the frame pointer pseudo-register.
    ArgSlotLoad { arg: u8, offset: i32 },
    /// Post-lowering Plan-9 result store: operand 0 is written to the
    /// result slot at `offset` above the frame pointer pseudo-register.
    ResultStore { offset: i32 },
}

/// An instruction in the stream. Immutable after construction except for
/// the operand rewriting the allocator performs.
#[derive(Debug, Clone)]
pub struct Inst {
    pub mnemonic: &'static str,
    pub operands: Vec<Operand>,
    pub form: Option<&'static Form>,
    pub implicit_in: &'static [Reg],
    pub implicit_out: &'static [Reg],
    pub kind: InstKind,
}

impl Inst {
    pub fn normal(
        mnemonic: &'static str,
        operands: Vec<Operand>,
        form: &'static Form,
    ) -> Inst {
        Inst {
            mnemonic,
            operands,
            form: Some(form),
            implicit_in: form.implicit_in,
            implicit_out: form.implicit_out,
            kind: InstKind::Normal,
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.kind, InstKind::Branch { .. })
    }

    /// True when control never falls through to the next instruction.
    pub fn ends_block(&self) -> bool {
        match self.kind {
            InstKind::Branch { cond, .. } => cond.is_none(),
            InstKind::Ret | InstKind::Return => true,
            _ => false,
        }
    }

    /// Registers whose values this instruction reads, including address
    /// components of memory operands and implicit inputs.
    pub fn input_regs(&self) -> Vec<Reg> {
        let mut regs: Vec<Reg> = Vec::new();
        if let Some(form) = self.form {
            if form.cancelling && self.operands.len() == 2 && self.operands[0] == self.operands[1]
            {
                // XOR r, r and friends: no operand value is consumed
            } else {
                for (i, op) in self.operands.iter().enumerate() {
                    if form.in_mask & (1 << i) != 0 {
                        if let Operand::Reg(r) = op {
                            regs.push(*r);
                        }
                    }
                }
            }
        }
        // the return pseudos consume their value operand
        if let InstKind::Return | InstKind::ResultStore { .. } = self.kind {
            if let Some(Operand::Reg(r)) = self.operands.first() {
                regs.push(*r);
            }
        }
        // address registers are read regardless of the value effect
        for op in &self.operands {
            if let Operand::Mem(m) = op {
                regs.extend(m.regs());
            }
        }
        regs.extend_from_slice(self.implicit_in);
        regs
    }

    /// Registers this instruction writes.
    pub fn output_regs(&self) -> Vec<Reg> {
        let mut regs: Vec<Reg> = Vec::new();
        if let Some(form) = self.form {
            for (i, op) in self.operands.iter().enumerate() {
                if form.out_mask & (1 << i) != 0 {
                    if let Operand::Reg(r) = op {
                        regs.push(*r);
                    }
                }
            }
        }
        // the argument-load pseudos define their destination operand
        if let InstKind::LoadArg { .. } | InstKind::ArgSlotLoad { .. } = self.kind {
            if let Some(Operand::Reg(r)) = self.operands.first() {
                regs.push(*r);
            }
        }
        regs.extend_from_slice(self.implicit_out);
        regs
    }

    /// Fixed physical bindings the signature imposes on virtual operands
    /// (shift counts to cl, blend selectors to xmm0).
    pub fn fixed_bindings(&self) -> Vec<(u32, Reg)> {
        let mut out = Vec::new();
        let Some(form) = self.form else {
            return out;
        };
        for (kind, op) in form.sig.iter().zip(&self.operands) {
            if let Operand::Reg(r) = op {
                if let RegId::Virt(v) = r.id {
                    match kind {
                        OpKind::Cl => out.push((v, crate::x64::registers::CL)),
                        OpKind::Xmm0 => out.push((v, crate::x64::registers::XMM0)),
                        _ => {}
                    }
                }
            }
        }
        out
    }

    /// Apply a register substitution to every operand, including memory
    /// address components.
    pub fn rewrite_regs(&mut self, rewrite: &mut dyn FnMut(Reg) -> Reg) {
        for op in &mut self.operands {
            match op {
                Operand::Reg(r) => *r = rewrite(*r),
                Operand::Mem(m) => {
                    if let Some(b) = &mut m.base {
                        *b = rewrite(*b);
                    }
                    if let Some(i) = &mut m.index {
                        *i = rewrite(*i);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Encoded instruction bytes plus an optional pending constant relocation.
#[derive(Debug, Clone)]
pub struct EncodedInst {
    pub bytes: Vec<u8>,
    /// (distance of the field from the end of the encoding, constant,
    /// field width). Measured from the end because trailing immediates
    /// follow the displacement.
    pub reloc: Option<(u8, ConstId, u8)>,
}

fn accumulator_ok(ops: &[Operand], idx: usize) -> bool {
    matches!(ops.get(idx), Some(Operand::Reg(r)) if r.phys() == Some(0))
}

fn enc_applicable(enc: &Enc, ops: &[Operand]) -> bool {
    if enc.flags & flags::ACC_OP0 != 0 && !accumulator_ok(ops, 0) {
        return false;
    }
    if enc.flags & flags::ACC_OP1 != 0 && !accumulator_ok(ops, 1) {
        return false;
    }
    if enc.flags & flags::IMM_SX8 != 0 {
        let fits = enc.imm.map_or(false, |(i, _)| match ops.get(i as usize) {
            Some(Operand::Imm(v)) => fits_imm8(*v),
            _ => false,
        });
        if !fits {
            return false;
        }
    }
    true
}

fn literal_of(ops: &[Operand]) -> Option<ConstId> {
    ops.iter().find_map(|op| match op {
        Operand::Mem(m) => m.literal,
        _ => None,
    })
}

/// Whether any register operand forces a REX prefix to be present
/// (spl/bpl/sil/dil).
fn force_rex(ops: &[Operand]) -> bool {
    ops.iter().any(|op| match op {
        Operand::Reg(r) => r.needs_rex_for_byte(),
        _ => false,
    })
}

fn encode_with(enc: &Enc, ops: &[Operand]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(enc.prefixes);

    // reg field and its extension bit
    let (reg_code, reg_ext) = match enc.modrm {
        Some((RegField::Op(i), _)) => match &ops[i as usize] {
            Operand::Reg(r) => (r.lcode(), r.hcode()),
            other => unreachable!("modrm reg operand {other} is not a register"),
        },
        Some((RegField::Digit(d), _)) => (d, 0),
        None => (0, 0),
    };

    // r/m side
    let rm: Option<RmTarget> = match enc.modrm {
        Some((_, rm_i)) => Some(match &ops[rm_i as usize] {
            Operand::Reg(r) => RmTarget::from_reg(r),
            Operand::Mem(m) => RmTarget::from_mem(m),
            other => unreachable!("modrm r/m operand {other} is not register or memory"),
        }),
        None => enc.plus_r.map(|i| match &ops[i as usize] {
            Operand::Reg(r) => RmTarget::Reg(r.phys_or_panic()),
            other => unreachable!("opcode register operand {other} is not a register"),
        }),
    };

    let vvvv = enc.vvvv.map_or(0, |i| match &ops[i as usize] {
        Operand::Reg(r) => r.phys_or_panic(),
        other => unreachable!("vvvv operand {other} is not a register"),
    });

    match enc.vex {
        Some(v) => {
            let lpp = ((v.l as u8) << 2) | v.pp;
            if v.escape == encoding::ESCAPE_VEX && v.mmmmm == 1 && !v.w {
                encoding::vex2(&mut out, lpp, reg_ext, rm.as_ref(), vvvv, false);
            } else {
                let w_lpp = ((v.w as u8) << 7) | lpp;
                encoding::vex3(&mut out, v.escape, v.mmmmm, w_lpp, reg_ext, rm.as_ref(), vvvv);
            }
        }
        None => {
            let rm_for_rex = rm.unwrap_or(RmTarget::Reg(0));
            if enc.rex_w {
                encoding::rex(&mut out, 1, reg_ext, &rm_for_rex);
            } else {
                encoding::optional_rex(&mut out, reg_ext, &rm_for_rex, force_rex(ops));
            }
        }
    }

    let (last, head) = enc.opcode.split_last().unwrap_or((&0x90, &[]));
    out.extend_from_slice(head);
    match enc.plus_r {
        Some(i) => {
            let lcode = match &ops[i as usize] {
                Operand::Reg(r) => r.lcode(),
                other => unreachable!("opcode register operand {other} is not a register"),
            };
            out.push(last | lcode);
        }
        None => out.push(*last),
    }

    if let Some((_, rm_i)) = enc.modrm {
        let target = match &ops[rm_i as usize] {
            Operand::Reg(r) => RmTarget::from_reg(r),
            Operand::Mem(m) => RmTarget::from_mem(m),
            _ => unreachable!(),
        };
        encoding::modrm_sib_disp(&mut out, reg_code, &target, false, 0);
    }

    if let Some((imm_i, width)) = enc.imm {
        let value = match &ops[imm_i as usize] {
            Operand::Imm(v) => *v,
            other => unreachable!("immediate operand {other} is not an immediate"),
        };
        encoding::immediate(&mut out, value, width);
    }

    if let Some(is4_i) = enc.is4 {
        let code = match &ops[is4_i as usize] {
            Operand::Reg(r) => r.phys_or_panic(),
            other => unreachable!("is4 operand {other} is not a register"),
        };
        out.push(code << 4);
    }

    out
}

/// Encode a non-branch instruction: filter the form's recipes by the
/// concrete operands, encode each candidate, keep the shortest.
pub fn encode_normal(inst: &Inst) -> EncodedInst {
    let form = match inst.form {
        Some(f) => f,
        None => unreachable!("{} has no encodable form", inst.mnemonic),
    };
    let mut best: Option<(Vec<u8>, &Enc)> = None;
    for enc in form.encs {
        if !enc_applicable(enc, &inst.operands) {
            continue;
        }
        let bytes = encode_with(enc, &inst.operands);
        if best.as_ref().map_or(true, |(b, _)| bytes.len() < b.len()) {
            best = Some((bytes, enc));
        }
    }
    let (bytes, chosen) = match best {
        Some(b) => b,
        None => unreachable!("no applicable encoding for {}", inst.mnemonic),
    };
    let reloc = literal_of(&inst.operands).map(|id| {
        // the disp32 field sits before any trailing immediate and is4 byte
        let tail = chosen.imm.map_or(0, |(_, w)| w) + chosen.is4.is_some() as u8;
        (tail + 4, id, 4u8)
    });
    EncodedInst { bytes, reloc }
}

/// Encode a JMP or Jcc with a resolved displacement. `rel8` selects the
/// short form; the caller is responsible for reachability.
pub fn encode_branch(cond: Option<Cond>, disp: i32, rel8: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(6);
    match (cond, rel8) {
        (None, true) => {
            out.push(0xEB);
            out.push(disp as u8);
        }
        (None, false) => {
            out.push(0xE9);
            out.extend_from_slice(&disp.to_le_bytes());
        }
        (Some(c), true) => {
            out.push(0x70 | c.code());
            out.push(disp as u8);
        }
        (Some(c), false) => {
            out.push(0x0F);
            out.push(0x80 | c.code());
            out.extend_from_slice(&disp.to_le_bytes());
        }
    }
    out
}

/// Length of a branch encoding without materializing it.
pub fn branch_len(cond: Option<Cond>, rel8: bool) -> usize {
    match (cond, rel8) {
        (None, true) => 2,
        (None, false) => 5,
        (Some(_), true) => 2,
        (Some(_), false) => 6,
    }
}

/// Helper used by catalog constructors: find the first form whose
/// signature accepts the operands.
pub fn select_form<'f>(forms: &'f [Form], ops: &[Operand]) -> Option<&'f Form> {
    forms.iter().find(|f| f.matches(ops))
}

/// Human-readable list of a mnemonic's signatures for error reporting.
pub fn describe_forms(forms: &[Form]) -> String {
    let mut out = String::new();
    for (i, form) in forms.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('(');
        for (j, kind) in form.sig.iter().enumerate() {
            if j > 0 {
                out.push_str(", ");
            }
            out.push_str(kind.name());
        }
        out.push(')');
    }
    if out.is_empty() {
        out.push_str("(none)");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x64::registers::{EAX, EBX, ECX, R9D, RAX};

    static ADD_R32_R32: Form = Form {
        sig: &[OpKind::R32, OpKind::R32],
        in_mask: 0b11,
        out_mask: 0b01,
        encs: &[Enc::new(&[0x01]).modrm_reg(1, 0)],
        cancelling: false,
        isa: None,
        implicit_in: &[],
        implicit_out: &[],
    };

    #[test]
    fn form_matching() {
        assert!(ADD_R32_R32.matches(&[Operand::Reg(EAX), Operand::Reg(EBX)]));
        assert!(!ADD_R32_R32.matches(&[Operand::Reg(RAX), Operand::Reg(EBX)]));
        assert!(!ADD_R32_R32.matches(&[Operand::Reg(EAX)]));
    }

    #[test]
    fn encode_reg_reg() {
        let inst = Inst::normal(
            "add",
            vec![Operand::Reg(ECX), Operand::Reg(EAX)],
            &ADD_R32_R32,
        );
        // add ecx, eax => 01 C1
        assert_eq!(encode_normal(&inst).bytes, [0x01, 0xC1]);
    }

    #[test]
    fn encode_reg_reg_extended() {
        let inst = Inst::normal(
            "add",
            vec![Operand::Reg(R9D), Operand::Reg(EAX)],
            &ADD_R32_R32,
        );
        // add r9d, eax => 41 01 C1
        assert_eq!(encode_normal(&inst).bytes, [0x41, 0x01, 0xC1]);
    }

    #[test]
    fn branch_bytes() {
        assert_eq!(encode_branch(None, -2, true), vec![0xEB, 0xFE]);
        assert_eq!(
            encode_branch(Some(Cond::Ne), 0x100, false),
            vec![0x0F, 0x85, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(encode_branch(Some(Cond::E), 5, true), vec![0x74, 0x05]);
    }

    #[test]
    fn determinism() {
        let inst = Inst::normal(
            "add",
            vec![Operand::Reg(ECX), Operand::Reg(EAX)],
            &ADD_R32_R32,
        );
        assert_eq!(encode_normal(&inst).bytes, encode_normal(&inst).bytes);
    }
}
