//! SSE, AVX, and MMX instruction forms.
//!
//! Legacy-prefixed and VEX-prefixed operations are distinct mnemonics
//! with distinct tables; an AVX form is never substituted for its SSE
//! counterpart. The VEX recipes fall back from the two-byte to the
//! three-byte prefix automatically when an extended register demands it.

use super::{op0, op2, op3, op4};
use crate::x64::inst::OpKind::*;
use crate::x64::inst::{Enc, Form};
use crate::x64::isa::Extension;

pub static MOVD: &[Form] = &[
    Form::new(&[Xmm, R32], 0b10, 0b01, &[Enc::new(&[0x0F, 0x6E]).prefix(&[0x66]).modrm_reg(0, 1)])
        .ext(Extension::Sse2),
    Form::new(&[R32, Xmm], 0b10, 0b01, &[Enc::new(&[0x0F, 0x7E]).prefix(&[0x66]).modrm_reg(1, 0)])
        .ext(Extension::Sse2),
    Form::new(&[Xmm, M32], 0b10, 0b01, &[Enc::new(&[0x0F, 0x6E]).prefix(&[0x66]).modrm_reg(0, 1)])
        .ext(Extension::Sse2),
    Form::new(&[M32, Xmm], 0b10, 0b00, &[Enc::new(&[0x0F, 0x7E]).prefix(&[0x66]).modrm_reg(1, 0)])
        .ext(Extension::Sse2),
];

/// Covers both the MMX and the SSE data paths, like the hardware does.
pub static MOVQ: &[Form] = &[
    Form::new(&[Xmm, R64], 0b10, 0b01, &[Enc::new(&[0x0F, 0x6E]).prefix(&[0x66]).w().modrm_reg(0, 1)])
        .ext(Extension::Sse2),
    Form::new(&[R64, Xmm], 0b10, 0b01, &[Enc::new(&[0x0F, 0x7E]).prefix(&[0x66]).w().modrm_reg(1, 0)])
        .ext(Extension::Sse2),
    Form::new(&[Xmm, Xmm], 0b10, 0b01, &[Enc::new(&[0x0F, 0x7E]).prefix(&[0xF3]).modrm_reg(0, 1)])
        .ext(Extension::Sse2),
    Form::new(&[Xmm, M64], 0b10, 0b01, &[Enc::new(&[0x0F, 0x7E]).prefix(&[0xF3]).modrm_reg(0, 1)])
        .ext(Extension::Sse2),
    Form::new(&[M64, Xmm], 0b10, 0b00, &[Enc::new(&[0x0F, 0xD6]).prefix(&[0x66]).modrm_reg(1, 0)])
        .ext(Extension::Sse2),
    Form::new(&[Mm, Mm], 0b10, 0b01, &[Enc::new(&[0x0F, 0x6F]).modrm_reg(0, 1)]).ext(Extension::Mmx),
    Form::new(&[Mm, M64], 0b10, 0b01, &[Enc::new(&[0x0F, 0x6F]).modrm_reg(0, 1)]).ext(Extension::Mmx),
    Form::new(&[M64, Mm], 0b10, 0b00, &[Enc::new(&[0x0F, 0x7F]).modrm_reg(1, 0)]).ext(Extension::Mmx),
];

macro_rules! sse_mov_table {
    ($table:ident, $load:literal, $store:literal, prefix: $prefix:expr, isa: $ext:ident) => {
        pub static $table: &[Form] = &[
            Form::new(&[Xmm, Xmm], 0b10, 0b01, &[Enc::new(&[0x0F, $load]).prefix($prefix).modrm_reg(0, 1)])
                .ext(Extension::$ext),
            Form::new(&[Xmm, M128], 0b10, 0b01, &[Enc::new(&[0x0F, $load]).prefix($prefix).modrm_reg(0, 1)])
                .ext(Extension::$ext),
            Form::new(&[M128, Xmm], 0b10, 0b00, &[Enc::new(&[0x0F, $store]).prefix($prefix).modrm_reg(1, 0)])
                .ext(Extension::$ext),
        ];
    };
}

sse_mov_table!(MOVAPS, 0x28, 0x29, prefix: &[], isa: Sse);
sse_mov_table!(MOVUPS, 0x10, 0x11, prefix: &[], isa: Sse);
sse_mov_table!(MOVDQA, 0x6F, 0x7F, prefix: &[0x66], isa: Sse2);
sse_mov_table!(MOVDQU, 0x6F, 0x7F, prefix: &[0xF3], isa: Sse2);

macro_rules! sse_scalar_mov_table {
    ($table:ident, $mem:ident, prefix: $prefix:expr, isa: $ext:ident) => {
        pub static $table: &[Form] = &[
            Form::new(&[Xmm, Xmm], 0b10, 0b01, &[Enc::new(&[0x0F, 0x10]).prefix($prefix).modrm_reg(0, 1)])
                .ext(Extension::$ext),
            Form::new(&[Xmm, $mem], 0b10, 0b01, &[Enc::new(&[0x0F, 0x10]).prefix($prefix).modrm_reg(0, 1)])
                .ext(Extension::$ext),
            Form::new(&[$mem, Xmm], 0b10, 0b00, &[Enc::new(&[0x0F, 0x11]).prefix($prefix).modrm_reg(1, 0)])
                .ext(Extension::$ext),
        ];
    };
}

sse_scalar_mov_table!(MOVSS, M32, prefix: &[0xF3], isa: Sse);
sse_scalar_mov_table!(MOVSD, M64, prefix: &[0xF2], isa: Sse2);

macro_rules! sse_arith_table {
    ($table:ident, $op:literal, $mem:ident, prefix: $prefix:expr, isa: $ext:ident $(, $cancel:ident)?) => {
        pub static $table: &[Form] = &[
            Form::new(&[Xmm, Xmm], 0b11, 0b01, &[Enc::new(&[0x0F, $op]).prefix($prefix).modrm_reg(0, 1)])
                .ext(Extension::$ext)$(.$cancel())?,
            Form::new(&[Xmm, $mem], 0b11, 0b01, &[Enc::new(&[0x0F, $op]).prefix($prefix).modrm_reg(0, 1)])
                .ext(Extension::$ext),
        ];
    };
}

sse_arith_table!(ADDPS, 0x58, M128, prefix: &[], isa: Sse);
sse_arith_table!(ADDPD, 0x58, M128, prefix: &[0x66], isa: Sse2);
sse_arith_table!(ADDSS, 0x58, M32, prefix: &[0xF3], isa: Sse);
sse_arith_table!(ADDSD, 0x58, M64, prefix: &[0xF2], isa: Sse2);
sse_arith_table!(MULPS, 0x59, M128, prefix: &[], isa: Sse);
sse_arith_table!(MULSS, 0x59, M32, prefix: &[0xF3], isa: Sse);
sse_arith_table!(SUBPS, 0x5C, M128, prefix: &[], isa: Sse);
sse_arith_table!(SUBSS, 0x5C, M32, prefix: &[0xF3], isa: Sse);
sse_arith_table!(ANDPS, 0x54, M128, prefix: &[], isa: Sse);
sse_arith_table!(ORPS, 0x56, M128, prefix: &[], isa: Sse);
sse_arith_table!(XORPS, 0x57, M128, prefix: &[], isa: Sse, cancelling);
sse_arith_table!(PADDQ, 0xD4, M128, prefix: &[0x66], isa: Sse2);
sse_arith_table!(PSUBD, 0xFA, M128, prefix: &[0x66], isa: Sse2);
sse_arith_table!(PAND, 0xDB, M128, prefix: &[0x66], isa: Sse2);
sse_arith_table!(POR, 0xEB, M128, prefix: &[0x66], isa: Sse2);
sse_arith_table!(PXOR, 0xEF, M128, prefix: &[0x66], isa: Sse2, cancelling);

/// PADDD spans the MMX and SSE banks, dispatched by register class.
pub static PADDD: &[Form] = &[
    Form::new(&[Xmm, Xmm], 0b11, 0b01, &[Enc::new(&[0x0F, 0xFE]).prefix(&[0x66]).modrm_reg(0, 1)])
        .ext(Extension::Sse2),
    Form::new(&[Xmm, M128], 0b11, 0b01, &[Enc::new(&[0x0F, 0xFE]).prefix(&[0x66]).modrm_reg(0, 1)])
        .ext(Extension::Sse2),
    Form::new(&[Mm, Mm], 0b11, 0b01, &[Enc::new(&[0x0F, 0xFE]).modrm_reg(0, 1)]).ext(Extension::Mmx),
    Form::new(&[Mm, M64], 0b11, 0b01, &[Enc::new(&[0x0F, 0xFE]).modrm_reg(0, 1)]).ext(Extension::Mmx),
];

pub static UCOMISS: &[Form] = &[
    Form::new(&[Xmm, Xmm], 0b11, 0b00, &[Enc::new(&[0x0F, 0x2E]).modrm_reg(0, 1)]).ext(Extension::Sse),
    Form::new(&[Xmm, M32], 0b11, 0b00, &[Enc::new(&[0x0F, 0x2E]).modrm_reg(0, 1)]).ext(Extension::Sse),
];

pub static UCOMISD: &[Form] = &[
    Form::new(&[Xmm, Xmm], 0b11, 0b00, &[Enc::new(&[0x0F, 0x2E]).prefix(&[0x66]).modrm_reg(0, 1)])
        .ext(Extension::Sse2),
    Form::new(&[Xmm, M64], 0b11, 0b00, &[Enc::new(&[0x0F, 0x2E]).prefix(&[0x66]).modrm_reg(0, 1)])
        .ext(Extension::Sse2),
];

pub static PSHUFD: &[Form] = &[
    Form::new(
        &[Xmm, Xmm, Imm8],
        0b010,
        0b001,
        &[Enc::new(&[0x0F, 0x70]).prefix(&[0x66]).modrm_reg(0, 1).imm_op(2, 1)],
    )
    .ext(Extension::Sse2),
    Form::new(
        &[Xmm, M128, Imm8],
        0b010,
        0b001,
        &[Enc::new(&[0x0F, 0x70]).prefix(&[0x66]).modrm_reg(0, 1).imm_op(2, 1)],
    )
    .ext(Extension::Sse2),
];

/// The SSE4.1 variable blends read their selector from xmm0; a virtual
/// selector operand is pinned there by the allocator.
macro_rules! blendv_table {
    ($table:ident, $op:literal) => {
        pub static $table: &[Form] = &[
            Form::new(
                &[Xmm, Xmm, Xmm0],
                0b111,
                0b001,
                &[Enc::new(&[0x0F, 0x38, $op]).prefix(&[0x66]).modrm_reg(0, 1)],
            )
            .ext(Extension::Sse4_1),
            Form::new(
                &[Xmm, M128, Xmm0],
                0b111,
                0b001,
                &[Enc::new(&[0x0F, 0x38, $op]).prefix(&[0x66]).modrm_reg(0, 1)],
            )
            .ext(Extension::Sse4_1),
        ];
    };
}

blendv_table!(PBLENDVB, 0x10);
blendv_table!(BLENDVPS, 0x14);
blendv_table!(BLENDVPD, 0x15);

pub static SHA256RNDS2: &[Form] = &[
    Form::new(
        &[Xmm, Xmm, Xmm0],
        0b111,
        0b001,
        &[Enc::new(&[0x0F, 0x38, 0xCB]).modrm_reg(0, 1)],
    )
    .ext(Extension::Sha),
    Form::new(
        &[Xmm, M128, Xmm0],
        0b111,
        0b001,
        &[Enc::new(&[0x0F, 0x38, 0xCB]).modrm_reg(0, 1)],
    )
    .ext(Extension::Sha),
];

macro_rules! vex_mov_table {
    ($table:ident, $load:literal, $store:literal, pp: $pp:literal) => {
        pub static $table: &[Form] = &[
            Form::new(
                &[Xmm, Xmm],
                0b10,
                0b01,
                &[Enc::new(&[$load]).vex(1, $pp, false, false).modrm_reg(0, 1)],
            )
            .ext(Extension::Avx),
            Form::new(
                &[Xmm, M128],
                0b10,
                0b01,
                &[Enc::new(&[$load]).vex(1, $pp, false, false).modrm_reg(0, 1)],
            )
            .ext(Extension::Avx),
            Form::new(
                &[M128, Xmm],
                0b10,
                0b00,
                &[Enc::new(&[$store]).vex(1, $pp, false, false).modrm_reg(1, 0)],
            )
            .ext(Extension::Avx),
            Form::new(
                &[Ymm, Ymm],
                0b10,
                0b01,
                &[Enc::new(&[$load]).vex(1, $pp, true, false).modrm_reg(0, 1)],
            )
            .ext(Extension::Avx),
            Form::new(
                &[Ymm, M256],
                0b10,
                0b01,
                &[Enc::new(&[$load]).vex(1, $pp, true, false).modrm_reg(0, 1)],
            )
            .ext(Extension::Avx),
            Form::new(
                &[M256, Ymm],
                0b10,
                0b00,
                &[Enc::new(&[$store]).vex(1, $pp, true, false).modrm_reg(1, 0)],
            )
            .ext(Extension::Avx),
        ];
    };
}

vex_mov_table!(VMOVAPS, 0x28, 0x29, pp: 0);
vex_mov_table!(VMOVUPS, 0x10, 0x11, pp: 0);
vex_mov_table!(VMOVDQA, 0x6F, 0x7F, pp: 1);
vex_mov_table!(VMOVDQU, 0x6F, 0x7F, pp: 2);

macro_rules! vex_arith_table {
    ($table:ident, $op:literal, pp: $pp:literal, xmm: $xext:ident, ymm: $yext:ident $(, $cancel:ident)?) => {
        pub static $table: &[Form] = &[
            Form::new(
                &[Xmm, Xmm, Xmm],
                0b110,
                0b001,
                &[Enc::new(&[$op]).vex(1, $pp, false, false).nds(1).modrm_reg(0, 2)],
            )
            .ext(Extension::$xext)$(.$cancel())?,
            Form::new(
                &[Xmm, Xmm, M128],
                0b110,
                0b001,
                &[Enc::new(&[$op]).vex(1, $pp, false, false).nds(1).modrm_reg(0, 2)],
            )
            .ext(Extension::$xext),
            Form::new(
                &[Ymm, Ymm, Ymm],
                0b110,
                0b001,
                &[Enc::new(&[$op]).vex(1, $pp, true, false).nds(1).modrm_reg(0, 2)],
            )
            .ext(Extension::$yext)$(.$cancel())?,
            Form::new(
                &[Ymm, Ymm, M256],
                0b110,
                0b001,
                &[Enc::new(&[$op]).vex(1, $pp, true, false).nds(1).modrm_reg(0, 2)],
            )
            .ext(Extension::$yext),
        ];
    };
}

vex_arith_table!(VADDPS, 0x58, pp: 0, xmm: Avx, ymm: Avx);
vex_arith_table!(VADDPD, 0x58, pp: 1, xmm: Avx, ymm: Avx);
vex_arith_table!(VMULPS, 0x59, pp: 0, xmm: Avx, ymm: Avx);
vex_arith_table!(VSUBPS, 0x5C, pp: 0, xmm: Avx, ymm: Avx);
vex_arith_table!(VXORPS, 0x57, pp: 0, xmm: Avx, ymm: Avx, cancelling);
vex_arith_table!(VPADDD, 0xFE, pp: 1, xmm: Avx, ymm: Avx2);
vex_arith_table!(VPAND, 0xDB, pp: 1, xmm: Avx, ymm: Avx2);
vex_arith_table!(VPOR, 0xEB, pp: 1, xmm: Avx, ymm: Avx2);
vex_arith_table!(VPXOR, 0xEF, pp: 1, xmm: Avx, ymm: Avx2, cancelling);

/// The VEX variable blends name their selector in the is4 nibble, so any
/// xmm register may carry it.
macro_rules! vblendv_table {
    ($table:ident, $op:literal) => {
        pub static $table: &[Form] = &[
            Form::new(
                &[Xmm, Xmm, Xmm, Xmm],
                0b1110,
                0b0001,
                &[Enc::new(&[$op]).vex(3, 1, false, false).nds(1).modrm_reg(0, 2).is4_op(3)],
            )
            .ext(Extension::Avx),
            Form::new(
                &[Xmm, Xmm, M128, Xmm],
                0b1110,
                0b0001,
                &[Enc::new(&[$op]).vex(3, 1, false, false).nds(1).modrm_reg(0, 2).is4_op(3)],
            )
            .ext(Extension::Avx),
            Form::new(
                &[Ymm, Ymm, Ymm, Ymm],
                0b1110,
                0b0001,
                &[Enc::new(&[$op]).vex(3, 1, true, false).nds(1).modrm_reg(0, 2).is4_op(3)],
            )
            .ext(Extension::Avx),
        ];
    };
}

vblendv_table!(VBLENDVPS, 0x4A);
vblendv_table!(VBLENDVPD, 0x4B);

pub static VZEROUPPER: &[Form] =
    &[Form::new(&[], 0b0, 0b0, &[Enc::new(&[0x77]).vex(1, 0, false, false)]).ext(Extension::Avx)];

pub static EMMS: &[Form] = &[Form::new(&[], 0b0, 0b0, &[Enc::new(&[0x0F, 0x77])]).ext(Extension::Mmx)];

op2! {
    movd => MOVD, "movd";
    movq => MOVQ, "movq";
    movaps => MOVAPS, "movaps";
    movups => MOVUPS, "movups";
    movdqa => MOVDQA, "movdqa";
    movdqu => MOVDQU, "movdqu";
    movss => MOVSS, "movss";
    movsd => MOVSD, "movsd";
    addps => ADDPS, "addps";
    addpd => ADDPD, "addpd";
    addss => ADDSS, "addss";
    addsd => ADDSD, "addsd";
    mulps => MULPS, "mulps";
    mulss => MULSS, "mulss";
    subps => SUBPS, "subps";
    subss => SUBSS, "subss";
    andps => ANDPS, "andps";
    orps => ORPS, "orps";
    xorps => XORPS, "xorps";
    paddd => PADDD, "paddd";
    paddq => PADDQ, "paddq";
    psubd => PSUBD, "psubd";
    pand => PAND, "pand";
    por => POR, "por";
    pxor => PXOR, "pxor";
    ucomiss => UCOMISS, "ucomiss";
    ucomisd => UCOMISD, "ucomisd";
}

op3! {
    pshufd => PSHUFD, "pshufd";
    pblendvb => PBLENDVB, "pblendvb";
    blendvps => BLENDVPS, "blendvps";
    blendvpd => BLENDVPD, "blendvpd";
    sha256rnds2 => SHA256RNDS2, "sha256rnds2";
}

op3! {
    vaddps => VADDPS, "vaddps";
    vaddpd => VADDPD, "vaddpd";
    vmulps => VMULPS, "vmulps";
    vsubps => VSUBPS, "vsubps";
    vxorps => VXORPS, "vxorps";
    vpaddd => VPADDD, "vpaddd";
    vpand => VPAND, "vpand";
    vpor => VPOR, "vpor";
    vpxor => VPXOR, "vpxor";
}

op2! {
    vmovaps => VMOVAPS, "vmovaps";
    vmovups => VMOVUPS, "vmovups";
    vmovdqa => VMOVDQA, "vmovdqa";
    vmovdqu => VMOVDQU, "vmovdqu";
}

op4! {
    vblendvps => VBLENDVPS, "vblendvps";
    vblendvpd => VBLENDVPD, "vblendvpd";
}

op0! {
    vzeroupper => VZEROUPPER, "vzeroupper";
    emms => EMMS, "emms";
}
