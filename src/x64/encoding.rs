//! Binary encoding primitives.
//!
//! The shared byte-level machinery used by every catalog entry: REX with
//! the omission rule, two- and three-byte VEX, XOP, ModRM/SIB with minimal
//! displacement selection, little-endian immediates, and the multi-byte
//! NOP sequences used for alignment padding. All inputs here are physical
//! register codes; a virtual register reaching this module is an internal
//! defect.

use crate::x64::operand::Mem;
use crate::x64::registers::Reg;

/// The r/m side of a ModRM-encoded instruction, reduced to physical codes.
#[derive(Debug, Clone, Copy)]
pub enum RmTarget {
    /// Register-direct: full physical index (0-15).
    Reg(u8),
    /// Memory: physical base/index codes, scale, displacement.
    Mem {
        base: Option<u8>,
        index: Option<u8>,
        scale: u8,
        disp: i32,
    },
    /// RIP-relative with a 32-bit offset (possibly a relocation
    /// placeholder).
    Rip(i32),
}

impl RmTarget {
    /// Reduce an allocated memory operand. Literal references become
    /// RIP-relative with a zero placeholder offset.
    pub fn from_mem(m: &Mem) -> RmTarget {
        if m.literal.is_some() {
            return RmTarget::Rip(0);
        }
        RmTarget::Mem {
            base: m.base.map(|r| r.phys_or_panic()),
            index: m.index.map(|r| r.phys_or_panic()),
            scale: m.scale,
            disp: m.disp,
        }
    }

    pub fn from_reg(r: &Reg) -> RmTarget {
        RmTarget::Reg(r.phys_or_panic())
    }

    /// REX.B bit: bit 3 of the base (or direct register) code.
    fn b(&self) -> u8 {
        match self {
            RmTarget::Reg(code) => (code >> 3) & 1,
            RmTarget::Mem { base, .. } => base.map_or(0, |b| (b >> 3) & 1),
            RmTarget::Rip(_) => 0,
        }
    }

    /// REX.X bit: bit 3 of the index code.
    fn x(&self) -> u8 {
        match self {
            RmTarget::Mem { index, .. } => index.map_or(0, |i| (i >> 3) & 1),
            _ => 0,
        }
    }
}

/// REX prefix, omitted when all of R, X, B are zero and nothing forces it
/// (8-bit spl/bpl/sil/dil operands force an empty REX).
pub fn optional_rex(out: &mut Vec<u8>, r: u8, rm: &RmTarget, force_rex: bool) {
    debug_assert!(r <= 1, "REX.R must be 0 or 1");
    let b = rm.b();
    let x = rm.x();
    if (r | x | b) != 0 || force_rex {
        out.push(0x40 | (r << 2) | (x << 1) | b);
    }
}

/// Mandatory REX prefix (REX.W forms).
pub fn rex(out: &mut Vec<u8>, w: u8, r: u8, rm: &RmTarget) {
    debug_assert!(w <= 1 && r <= 1);
    out.push(0x40 | (w << 3) | (r << 2) | (rm.x() << 1) | rm.b());
}

/// VEX prefix for instructions eligible for the 2-byte form (W = 0, map =
/// 0F). Falls back to the 3-byte form when X or B is needed. `lpp` packs
/// L (bit 2) and pp (bits 0-1); `vvvv` is the non-inverted second-source
/// code.
pub fn vex2(out: &mut Vec<u8>, lpp: u8, r: u8, rm: Option<&RmTarget>, vvvv: u8, force_vex3: bool) {
    debug_assert!(lpp <= 0b111 && r <= 1 && vvvv <= 0b1111);
    let b = rm.map_or(0, RmTarget::b);
    let x = rm.map_or(0, RmTarget::x);
    if (x | b) == 0 && !force_vex3 {
        out.push(0xC5);
        out.push(0xF8 ^ (r << 7) ^ (vvvv << 3) ^ lpp);
    } else {
        out.push(0xC4);
        out.push(0xE1 ^ (r << 7) ^ (x << 6) ^ (b << 5));
        out.push(0x78 ^ (vvvv << 3) ^ lpp);
    }
}

/// Escape byte starting a 3-byte VEX prefix.
pub const ESCAPE_VEX: u8 = 0xC4;
/// Escape byte starting an XOP prefix.
pub const ESCAPE_XOP: u8 = 0x8F;

/// Full 3-byte VEX or XOP prefix. `w_lpp` packs W (bit 7), L (bit 2) and
/// pp (bits 0-1); `mmmmm` selects the opcode map.
pub fn vex3(out: &mut Vec<u8>, escape: u8, mmmmm: u8, w_lpp: u8, r: u8, rm: Option<&RmTarget>, vvvv: u8) {
    debug_assert!(escape == ESCAPE_VEX || escape == ESCAPE_XOP);
    debug_assert!(mmmmm <= 0b11111 && w_lpp & !0b1000_0111 == 0 && r <= 1 && vvvv <= 0b1111);
    let b = rm.map_or(0, RmTarget::b);
    let x = rm.map_or(0, RmTarget::x);
    out.push(escape);
    out.push(0xE0 ^ (r << 7) ^ (x << 6) ^ (b << 5) ^ mmmmm);
    out.push(0x78 ^ (vvvv << 3) ^ w_lpp);
}

const fn ilog2(scale: u8) -> u8 {
    match scale {
        1 => 0,
        2 => 1,
        4 => 2,
        _ => 3,
    }
}

fn push_disp32(out: &mut Vec<u8>, disp: i32) {
    out.extend_from_slice(&disp.to_le_bytes());
}

/// ModRM byte, optional SIB byte, and minimal displacement.
///
/// `reg` is the 3-bit reg field (register lcode or opcode extension digit).
/// Displacement selection: no displacement when it is zero and the base
/// allows mode 0 (rbp/r13 as base force at least disp8), disp8 when the
/// value fits a signed byte, disp32 otherwise. A SIB byte is emitted when
/// an index is present or the base's low code is 4 (rsp/r12). `min_disp`
/// of 1 or 4 forces at least that displacement width (used when a longer
/// encoding is required for branch relaxation or padding).
pub fn modrm_sib_disp(out: &mut Vec<u8>, reg: u8, rm: &RmTarget, force_sib: bool, min_disp: u8) {
    debug_assert!(reg <= 7, "reg field must fit 3 bits");
    match *rm {
        RmTarget::Reg(code) => {
            out.push(0xC0 | (reg << 3) | (code & 0b111));
        }
        RmTarget::Rip(offset) => {
            // mode = 0, rm = 5: rip + disp32
            out.push(0b0000_0101 | (reg << 3));
            push_disp32(out, offset);
        }
        RmTarget::Mem {
            base,
            index,
            scale,
            disp,
        } => {
            debug_assert!(base.is_some() || index.is_some());
            let base_lcode = base.map(|b| b & 0b111);
            let need_sib = force_sib || index.is_some() || base.is_none() || base_lcode == Some(0b100);
            if !need_sib {
                let lcode = match base_lcode {
                    Some(l) => l,
                    None => unreachable!("no-base address without SIB"),
                };
                if disp == 0 && lcode != 0b101 && min_disp == 0 {
                    out.push((reg << 3) | lcode);
                } else if (i8::MIN as i32..=i8::MAX as i32).contains(&disp) && min_disp <= 1 {
                    out.push(0x40 | (reg << 3) | lcode);
                    out.push(disp as u8);
                } else {
                    out.push(0x80 | (reg << 3) | lcode);
                    push_disp32(out, disp);
                }
            } else {
                debug_assert!(index.map(|i| i & 0b111) != Some(0b100) || index.map(|i| i >> 3) == Some(1),
                    "rsp is not encodable as an index register");
                let index_code = index.map_or(0b100, |i| i & 0b111);
                let scale_code = ilog2(scale);
                let sib_hi = (scale_code << 6) | (index_code << 3);
                match base_lcode {
                    None => {
                        // SIB.base = 5 with mode 0: no base, disp32
                        out.push((reg << 3) | 0b100);
                        out.push(sib_hi | 0b101);
                        push_disp32(out, disp);
                    }
                    Some(lcode) => {
                        if disp == 0 && lcode != 0b101 && min_disp == 0 {
                            out.push((reg << 3) | 0b100);
                            out.push(sib_hi | lcode);
                        } else if (i8::MIN as i32..=i8::MAX as i32).contains(&disp) && min_disp <= 1 {
                            out.push(0x40 | (reg << 3) | 0b100);
                            out.push(sib_hi | lcode);
                            out.push(disp as u8);
                        } else {
                            out.push(0x80 | (reg << 3) | 0b100);
                            out.push(sib_hi | lcode);
                            push_disp32(out, disp);
                        }
                    }
                }
            }
        }
    }
}

/// Immediate field, little-endian at its declared width.
pub fn immediate(out: &mut Vec<u8>, value: i64, width: u8) {
    match width {
        1 => out.push(value as u8),
        2 => out.extend_from_slice(&(value as i16).to_le_bytes()),
        4 => out.extend_from_slice(&(value as i32).to_le_bytes()),
        8 => out.extend_from_slice(&value.to_le_bytes()),
        _ => unreachable!("immediate width {width} is not 1, 2, 4, or 8"),
    }
}

/// Multi-byte NOP of the given length (1-15), used by ALIGN lowering.
pub fn nop(length: usize) -> &'static [u8] {
    const NOPS: [&[u8]; 15] = [
        &[0x90],
        &[0x40, 0x90],
        &[0x0F, 0x1F, 0x00],
        &[0x0F, 0x1F, 0x40, 0x00],
        &[0x0F, 0x1F, 0x44, 0x00, 0x00],
        &[0x66, 0x0F, 0x1F, 0x44, 0x00, 0x00],
        &[0x0F, 0x1F, 0x80, 0x00, 0x00, 0x00, 0x00],
        &[0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
        &[0x66, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
        &[0x66, 0x2E, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
        &[0x66, 0x66, 0x2E, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
        &[0x66, 0x66, 0x66, 0x2E, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
        &[0x66, 0x66, 0x66, 0x66, 0x2E, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
        &[0x66, 0x66, 0x66, 0x66, 0x66, 0x2E, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
        &[0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x2E, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
    ];
    debug_assert!((1..=15).contains(&length));
    NOPS[length - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem(base: Option<u8>, index: Option<u8>, scale: u8, disp: i32) -> RmTarget {
        RmTarget::Mem {
            base,
            index,
            scale,
            disp,
        }
    }

    #[test]
    fn rex_omitted_for_low_registers() {
        let mut out = Vec::new();
        optional_rex(&mut out, 0, &RmTarget::Reg(3), false);
        assert!(out.is_empty());
        optional_rex(&mut out, 0, &RmTarget::Reg(3), true);
        assert_eq!(out, [0x40]);
    }

    #[test]
    fn rex_bits() {
        let mut out = Vec::new();
        rex(&mut out, 1, 1, &mem(Some(13), Some(9), 2, 0));
        // W=1 R=1 X=1 B=1
        assert_eq!(out, [0x4F]);

        let mut out = Vec::new();
        optional_rex(&mut out, 0, &RmTarget::Reg(8), false);
        assert_eq!(out, [0x41]);
    }

    #[test]
    fn vex_two_byte_when_possible() {
        let mut out = Vec::new();
        // VADDPS xmm1, xmm2, xmm3: L=0 pp=0, r=0, vvvv=2
        vex2(&mut out, 0, 0, Some(&RmTarget::Reg(3)), 2, false);
        assert_eq!(out, [0xC5, 0xE8]);
    }

    #[test]
    fn vex_three_byte_when_b_set() {
        let mut out = Vec::new();
        vex2(&mut out, 0, 0, Some(&RmTarget::Reg(11)), 2, false);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], 0xC4);
        // ~R=1 ~X=1 ~B=0 mmmmm=00001
        assert_eq!(out[1], 0xC1);
        assert_eq!(out[2], 0x78 ^ (2 << 3));
    }

    #[test]
    fn vex3_xop_escape() {
        let mut out = Vec::new();
        vex3(
            &mut out,
            ESCAPE_XOP,
            0b01000,
            0x80,
            0,
            Some(&RmTarget::Reg(0)),
            0,
        );
        assert_eq!(out[0], 0x8F);
        assert_eq!(out[1], 0xE0 ^ 0b01000);
        assert_eq!(out[2], 0x78 ^ 0x80);
    }

    #[test]
    fn register_direct_modrm() {
        let mut out = Vec::new();
        modrm_sib_disp(&mut out, 2, &RmTarget::Reg(11), false, 0);
        assert_eq!(out, [0xC0 | (2 << 3) | 3]);
    }

    #[test]
    fn zero_disp_omitted() {
        let mut out = Vec::new();
        modrm_sib_disp(&mut out, 0, &mem(Some(3), None, 1, 0), false, 0);
        assert_eq!(out, [0x03]);
    }

    #[test]
    fn rbp_base_forces_disp8() {
        let mut out = Vec::new();
        modrm_sib_disp(&mut out, 0, &mem(Some(5), None, 1, 0), false, 0);
        assert_eq!(out, [0x45, 0x00]);

        // r13 shares the low code of rbp
        let mut out = Vec::new();
        modrm_sib_disp(&mut out, 0, &mem(Some(13), None, 1, 0), false, 0);
        assert_eq!(out, [0x45, 0x00]);
    }

    #[test]
    fn rsp_base_forces_sib() {
        let mut out = Vec::new();
        modrm_sib_disp(&mut out, 0, &mem(Some(4), None, 1, 0), false, 0);
        assert_eq!(out, [0x04, 0x24]);

        let mut out = Vec::new();
        modrm_sib_disp(&mut out, 0, &mem(Some(12), None, 1, 0), false, 0);
        assert_eq!(out, [0x04, 0x24]);
    }

    #[test]
    fn disp8_selected_when_fits() {
        let mut out = Vec::new();
        modrm_sib_disp(&mut out, 1, &mem(Some(0), None, 1, -16), false, 0);
        assert_eq!(out, [0x48, 0xF0]);
    }

    #[test]
    fn disp32_when_needed() {
        let mut out = Vec::new();
        modrm_sib_disp(&mut out, 0, &mem(Some(0), None, 1, 0x1000), false, 0);
        assert_eq!(out, [0x80, 0x00, 0x10, 0x00, 0x00]);
    }

    #[test]
    fn scaled_index_sib() {
        let mut out = Vec::new();
        // [rbx + rcx*4]
        modrm_sib_disp(&mut out, 0, &mem(Some(3), Some(1), 4, 0), false, 0);
        assert_eq!(out, [0x04, 0x8B]);
    }

    #[test]
    fn index_without_base_uses_disp32() {
        let mut out = Vec::new();
        modrm_sib_disp(&mut out, 0, &mem(None, Some(1), 8, 4), false, 0);
        assert_eq!(out, [0x04, 0xCD, 0x04, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn rip_relative() {
        let mut out = Vec::new();
        modrm_sib_disp(&mut out, 7, &RmTarget::Rip(-4), false, 0);
        assert_eq!(out, [0x3D, 0xFC, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn nop_lengths() {
        for len in 1..=15 {
            assert_eq!(nop(len).len(), len);
        }
    }
}
