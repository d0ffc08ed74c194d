//! General-purpose instruction forms.
//!
//! Table order is dispatch order. Memory-immediate forms list the byte
//! width first, so a store of an immediate through an untyped address
//! assembles as a byte store; wider stores require a width-tagged operand.

use super::{op1, op2, op3};
use crate::x64::inst::{flags, Enc, Form};
use crate::x64::inst::OpKind::*;
use crate::x64::registers::{AL, AX, EAX, EDX, RAX, RDX};

pub static MOV: &[Form] = &[
    Form::new(&[R8, R8], 0b10, 0b01, &[Enc::new(&[0x88]).modrm_reg(1, 0)]),
    Form::new(&[R16, R16], 0b10, 0b01, &[Enc::new(&[0x89]).prefix(&[0x66]).modrm_reg(1, 0)]),
    Form::new(&[R32, R32], 0b10, 0b01, &[Enc::new(&[0x89]).modrm_reg(1, 0)]),
    Form::new(&[R64, R64], 0b10, 0b01, &[Enc::new(&[0x89]).w().modrm_reg(1, 0)]),
    Form::new(&[R8, M8], 0b10, 0b01, &[Enc::new(&[0x8A]).modrm_reg(0, 1)]),
    Form::new(&[R16, M16], 0b10, 0b01, &[Enc::new(&[0x8B]).prefix(&[0x66]).modrm_reg(0, 1)]),
    Form::new(&[R32, M32], 0b10, 0b01, &[Enc::new(&[0x8B]).modrm_reg(0, 1)]),
    Form::new(&[R64, M64], 0b10, 0b01, &[Enc::new(&[0x8B]).w().modrm_reg(0, 1)]),
    Form::new(&[M8, R8], 0b10, 0b00, &[Enc::new(&[0x88]).modrm_reg(1, 0)]),
    Form::new(&[M16, R16], 0b10, 0b00, &[Enc::new(&[0x89]).prefix(&[0x66]).modrm_reg(1, 0)]),
    Form::new(&[M32, R32], 0b10, 0b00, &[Enc::new(&[0x89]).modrm_reg(1, 0)]),
    Form::new(&[M64, R64], 0b10, 0b00, &[Enc::new(&[0x89]).w().modrm_reg(1, 0)]),
    Form::new(&[R8, Imm8], 0b00, 0b01, &[Enc::new(&[0xB0]).plus(0).imm_op(1, 1)]),
    Form::new(
        &[R16, Imm16],
        0b00,
        0b01,
        &[Enc::new(&[0xB8]).prefix(&[0x66]).plus(0).imm_op(1, 2)],
    ),
    Form::new(&[R32, Imm32], 0b00, 0b01, &[Enc::new(&[0xB8]).plus(0).imm_op(1, 4)]),
    Form::new(&[R64, SImm32], 0b00, 0b01, &[Enc::new(&[0xC7]).w().modrm_digit(0, 0).imm_op(1, 4)]),
    Form::new(&[R64, Imm64], 0b00, 0b01, &[Enc::new(&[0xB8]).w().plus(0).imm_op(1, 8)]),
    Form::new(&[M8, Imm8], 0b00, 0b00, &[Enc::new(&[0xC6]).modrm_digit(0, 0).imm_op(1, 1)]),
    Form::new(
        &[M16, Imm16],
        0b00,
        0b00,
        &[Enc::new(&[0xC7]).prefix(&[0x66]).modrm_digit(0, 0).imm_op(1, 2)],
    ),
    Form::new(&[M32, Imm32], 0b00, 0b00, &[Enc::new(&[0xC7]).modrm_digit(0, 0).imm_op(1, 4)]),
    Form::new(&[M64, SImm32], 0b00, 0b00, &[Enc::new(&[0xC7]).w().modrm_digit(0, 0).imm_op(1, 4)]),
];

macro_rules! alu_table {
    ($table:ident, $base:literal, $digit:literal, out: $out:literal $(, $cancel:ident)?) => {
        pub static $table: &[Form] = &[
            Form::new(&[R8, R8], 0b11, $out, &[Enc::new(&[$base]).modrm_reg(1, 0)])$(.$cancel())?,
            Form::new(
                &[R16, R16],
                0b11,
                $out,
                &[Enc::new(&[$base + 1]).prefix(&[0x66]).modrm_reg(1, 0)],
            )$(.$cancel())?,
            Form::new(&[R32, R32], 0b11, $out, &[Enc::new(&[$base + 1]).modrm_reg(1, 0)])$(.$cancel())?,
            Form::new(&[R64, R64], 0b11, $out, &[Enc::new(&[$base + 1]).w().modrm_reg(1, 0)])$(.$cancel())?,
            Form::new(&[R8, M8], 0b11, $out, &[Enc::new(&[$base + 2]).modrm_reg(0, 1)]),
            Form::new(
                &[R16, M16],
                0b11,
                $out,
                &[Enc::new(&[$base + 3]).prefix(&[0x66]).modrm_reg(0, 1)],
            ),
            Form::new(&[R32, M32], 0b11, $out, &[Enc::new(&[$base + 3]).modrm_reg(0, 1)]),
            Form::new(&[R64, M64], 0b11, $out, &[Enc::new(&[$base + 3]).w().modrm_reg(0, 1)]),
            Form::new(&[M8, R8], 0b11, 0b00, &[Enc::new(&[$base]).modrm_reg(1, 0)]),
            Form::new(
                &[M16, R16],
                0b11,
                0b00,
                &[Enc::new(&[$base + 1]).prefix(&[0x66]).modrm_reg(1, 0)],
            ),
            Form::new(&[M32, R32], 0b11, 0b00, &[Enc::new(&[$base + 1]).modrm_reg(1, 0)]),
            Form::new(&[M64, R64], 0b11, 0b00, &[Enc::new(&[$base + 1]).w().modrm_reg(1, 0)]),
            Form::new(
                &[R8, Imm8],
                0b01,
                $out,
                &[
                    Enc::new(&[0x80]).modrm_digit($digit, 0).imm_op(1, 1),
                    Enc::new(&[$base + 4]).imm_op(1, 1).flag(flags::ACC_OP0),
                ],
            ),
            Form::new(&[M8, Imm8], 0b01, 0b00, &[Enc::new(&[0x80]).modrm_digit($digit, 0).imm_op(1, 1)]),
            Form::new(
                &[R16, Imm16],
                0b01,
                $out,
                &[
                    Enc::new(&[0x81]).prefix(&[0x66]).modrm_digit($digit, 0).imm_op(1, 2),
                    Enc::new(&[0x83])
                        .prefix(&[0x66])
                        .modrm_digit($digit, 0)
                        .imm_op(1, 1)
                        .flag(flags::IMM_SX8),
                    Enc::new(&[$base + 5]).prefix(&[0x66]).imm_op(1, 2).flag(flags::ACC_OP0),
                ],
            ),
            Form::new(
                &[M16, Imm16],
                0b01,
                0b00,
                &[
                    Enc::new(&[0x81]).prefix(&[0x66]).modrm_digit($digit, 0).imm_op(1, 2),
                    Enc::new(&[0x83])
                        .prefix(&[0x66])
                        .modrm_digit($digit, 0)
                        .imm_op(1, 1)
                        .flag(flags::IMM_SX8),
                ],
            ),
            Form::new(
                &[R32, Imm32],
                0b01,
                $out,
                &[
                    Enc::new(&[0x81]).modrm_digit($digit, 0).imm_op(1, 4),
                    Enc::new(&[0x83]).modrm_digit($digit, 0).imm_op(1, 1).flag(flags::IMM_SX8),
                    Enc::new(&[$base + 5]).imm_op(1, 4).flag(flags::ACC_OP0),
                ],
            ),
            Form::new(
                &[M32, Imm32],
                0b01,
                0b00,
                &[
                    Enc::new(&[0x81]).modrm_digit($digit, 0).imm_op(1, 4),
                    Enc::new(&[0x83]).modrm_digit($digit, 0).imm_op(1, 1).flag(flags::IMM_SX8),
                ],
            ),
            Form::new(
                &[R64, SImm32],
                0b01,
                $out,
                &[
                    Enc::new(&[0x81]).w().modrm_digit($digit, 0).imm_op(1, 4),
                    Enc::new(&[0x83]).w().modrm_digit($digit, 0).imm_op(1, 1).flag(flags::IMM_SX8),
                    Enc::new(&[$base + 5]).w().imm_op(1, 4).flag(flags::ACC_OP0),
                ],
            ),
            Form::new(
                &[M64, SImm32],
                0b01,
                0b00,
                &[
                    Enc::new(&[0x81]).w().modrm_digit($digit, 0).imm_op(1, 4),
                    Enc::new(&[0x83]).w().modrm_digit($digit, 0).imm_op(1, 1).flag(flags::IMM_SX8),
                ],
            ),
        ];
    };
}

alu_table!(ADD, 0x00, 0, out: 0b01);
alu_table!(OR, 0x08, 1, out: 0b01);
alu_table!(ADC, 0x10, 2, out: 0b01);
alu_table!(SBB, 0x18, 3, out: 0b01);
alu_table!(AND, 0x20, 4, out: 0b01);
alu_table!(SUB, 0x28, 5, out: 0b01);
alu_table!(XOR, 0x30, 6, out: 0b01, cancelling);
alu_table!(CMP, 0x38, 7, out: 0b00);

pub static TEST: &[Form] = &[
    Form::new(&[R8, R8], 0b11, 0b00, &[Enc::new(&[0x84]).modrm_reg(1, 0)]),
    Form::new(&[R16, R16], 0b11, 0b00, &[Enc::new(&[0x85]).prefix(&[0x66]).modrm_reg(1, 0)]),
    Form::new(&[R32, R32], 0b11, 0b00, &[Enc::new(&[0x85]).modrm_reg(1, 0)]),
    Form::new(&[R64, R64], 0b11, 0b00, &[Enc::new(&[0x85]).w().modrm_reg(1, 0)]),
    Form::new(&[M8, R8], 0b11, 0b00, &[Enc::new(&[0x84]).modrm_reg(1, 0)]),
    Form::new(&[M32, R32], 0b11, 0b00, &[Enc::new(&[0x85]).modrm_reg(1, 0)]),
    Form::new(&[M64, R64], 0b11, 0b00, &[Enc::new(&[0x85]).w().modrm_reg(1, 0)]),
    Form::new(
        &[R8, Imm8],
        0b01,
        0b00,
        &[
            Enc::new(&[0xF6]).modrm_digit(0, 0).imm_op(1, 1),
            Enc::new(&[0xA8]).imm_op(1, 1).flag(flags::ACC_OP0),
        ],
    ),
    Form::new(
        &[R32, Imm32],
        0b01,
        0b00,
        &[
            Enc::new(&[0xF7]).modrm_digit(0, 0).imm_op(1, 4),
            Enc::new(&[0xA9]).imm_op(1, 4).flag(flags::ACC_OP0),
        ],
    ),
    Form::new(
        &[R64, SImm32],
        0b01,
        0b00,
        &[Enc::new(&[0xF7]).w().modrm_digit(0, 0).imm_op(1, 4)],
    ),
];

pub static MOVSX: &[Form] = &[
    Form::new(&[R16, R8], 0b10, 0b01, &[Enc::new(&[0x0F, 0xBE]).prefix(&[0x66]).modrm_reg(0, 1)]),
    Form::new(&[R32, R8], 0b10, 0b01, &[Enc::new(&[0x0F, 0xBE]).modrm_reg(0, 1)]),
    Form::new(&[R64, R8], 0b10, 0b01, &[Enc::new(&[0x0F, 0xBE]).w().modrm_reg(0, 1)]),
    Form::new(&[R32, R16], 0b10, 0b01, &[Enc::new(&[0x0F, 0xBF]).modrm_reg(0, 1)]),
    Form::new(&[R64, R16], 0b10, 0b01, &[Enc::new(&[0x0F, 0xBF]).w().modrm_reg(0, 1)]),
    Form::new(&[R32, M8], 0b10, 0b01, &[Enc::new(&[0x0F, 0xBE]).modrm_reg(0, 1)]),
    Form::new(&[R64, M8], 0b10, 0b01, &[Enc::new(&[0x0F, 0xBE]).w().modrm_reg(0, 1)]),
    Form::new(&[R32, M16], 0b10, 0b01, &[Enc::new(&[0x0F, 0xBF]).modrm_reg(0, 1)]),
    Form::new(&[R64, M16], 0b10, 0b01, &[Enc::new(&[0x0F, 0xBF]).w().modrm_reg(0, 1)]),
];

pub static MOVZX: &[Form] = &[
    Form::new(&[R16, R8], 0b10, 0b01, &[Enc::new(&[0x0F, 0xB6]).prefix(&[0x66]).modrm_reg(0, 1)]),
    Form::new(&[R32, R8], 0b10, 0b01, &[Enc::new(&[0x0F, 0xB6]).modrm_reg(0, 1)]),
    Form::new(&[R64, R8], 0b10, 0b01, &[Enc::new(&[0x0F, 0xB6]).w().modrm_reg(0, 1)]),
    Form::new(&[R32, R16], 0b10, 0b01, &[Enc::new(&[0x0F, 0xB7]).modrm_reg(0, 1)]),
    Form::new(&[R64, R16], 0b10, 0b01, &[Enc::new(&[0x0F, 0xB7]).w().modrm_reg(0, 1)]),
    Form::new(&[R32, M8], 0b10, 0b01, &[Enc::new(&[0x0F, 0xB6]).modrm_reg(0, 1)]),
    Form::new(&[R64, M8], 0b10, 0b01, &[Enc::new(&[0x0F, 0xB6]).w().modrm_reg(0, 1)]),
    Form::new(&[R32, M16], 0b10, 0b01, &[Enc::new(&[0x0F, 0xB7]).modrm_reg(0, 1)]),
    Form::new(&[R64, M16], 0b10, 0b01, &[Enc::new(&[0x0F, 0xB7]).w().modrm_reg(0, 1)]),
];

pub static MOVSXD: &[Form] = &[
    Form::new(&[R64, R32], 0b10, 0b01, &[Enc::new(&[0x63]).w().modrm_reg(0, 1)]),
    Form::new(&[R64, M32], 0b10, 0b01, &[Enc::new(&[0x63]).w().modrm_reg(0, 1)]),
];

pub static LEA: &[Form] = &[
    Form::new(&[R32, M], 0b00, 0b01, &[Enc::new(&[0x8D]).modrm_reg(0, 1)]),
    Form::new(&[R64, M], 0b00, 0b01, &[Enc::new(&[0x8D]).w().modrm_reg(0, 1)]),
];

pub static PUSH: &[Form] = &[
    Form::new(&[R64], 0b01, 0b00, &[Enc::new(&[0x50]).plus(0)]),
    Form::new(&[M64], 0b01, 0b00, &[Enc::new(&[0xFF]).modrm_digit(6, 0)]),
    Form::new(
        &[SImm32],
        0b00,
        0b00,
        &[
            Enc::new(&[0x68]).imm_op(0, 4),
            Enc::new(&[0x6A]).imm_op(0, 1).flag(flags::IMM_SX8),
        ],
    ),
];

pub static POP: &[Form] = &[
    Form::new(&[R64], 0b00, 0b01, &[Enc::new(&[0x58]).plus(0)]),
    Form::new(&[M64], 0b00, 0b00, &[Enc::new(&[0x8F]).modrm_digit(0, 0)]),
];

pub static XCHG: &[Form] = &[
    Form::new(&[R8, R8], 0b11, 0b11, &[Enc::new(&[0x86]).modrm_reg(1, 0)]),
    Form::new(
        &[R16, R16],
        0b11,
        0b11,
        &[
            Enc::new(&[0x87]).prefix(&[0x66]).modrm_reg(1, 0),
            Enc::new(&[0x90]).prefix(&[0x66]).plus(1).flag(flags::ACC_OP0),
            Enc::new(&[0x90]).prefix(&[0x66]).plus(0).flag(flags::ACC_OP1),
        ],
    ),
    Form::new(
        &[R32, R32],
        0b11,
        0b11,
        &[
            Enc::new(&[0x87]).modrm_reg(1, 0),
            Enc::new(&[0x90]).plus(1).flag(flags::ACC_OP0),
            Enc::new(&[0x90]).plus(0).flag(flags::ACC_OP1),
        ],
    ),
    Form::new(
        &[R64, R64],
        0b11,
        0b11,
        &[
            Enc::new(&[0x87]).w().modrm_reg(1, 0),
            Enc::new(&[0x90]).w().plus(1).flag(flags::ACC_OP0),
            Enc::new(&[0x90]).w().plus(0).flag(flags::ACC_OP1),
        ],
    ),
    Form::new(&[R8, M8], 0b11, 0b01, &[Enc::new(&[0x86]).modrm_reg(0, 1)]),
    Form::new(&[M8, R8], 0b11, 0b10, &[Enc::new(&[0x86]).modrm_reg(1, 0)]),
    Form::new(&[R32, M32], 0b11, 0b01, &[Enc::new(&[0x87]).modrm_reg(0, 1)]),
    Form::new(&[M32, R32], 0b11, 0b10, &[Enc::new(&[0x87]).modrm_reg(1, 0)]),
    Form::new(&[R64, M64], 0b11, 0b01, &[Enc::new(&[0x87]).w().modrm_reg(0, 1)]),
    Form::new(&[M64, R64], 0b11, 0b10, &[Enc::new(&[0x87]).w().modrm_reg(1, 0)]),
];

pub static IMUL: &[Form] = &[
    Form::new(&[R32, R32], 0b11, 0b01, &[Enc::new(&[0x0F, 0xAF]).modrm_reg(0, 1)]),
    Form::new(&[R64, R64], 0b11, 0b01, &[Enc::new(&[0x0F, 0xAF]).w().modrm_reg(0, 1)]),
    Form::new(&[R32, M32], 0b11, 0b01, &[Enc::new(&[0x0F, 0xAF]).modrm_reg(0, 1)]),
    Form::new(&[R64, M64], 0b11, 0b01, &[Enc::new(&[0x0F, 0xAF]).w().modrm_reg(0, 1)]),
    Form::new(
        &[R32, R32, Imm32],
        0b010,
        0b001,
        &[
            Enc::new(&[0x69]).modrm_reg(0, 1).imm_op(2, 4),
            Enc::new(&[0x6B]).modrm_reg(0, 1).imm_op(2, 1).flag(flags::IMM_SX8),
        ],
    ),
    Form::new(
        &[R64, R64, SImm32],
        0b010,
        0b001,
        &[
            Enc::new(&[0x69]).w().modrm_reg(0, 1).imm_op(2, 4),
            Enc::new(&[0x6B]).w().modrm_reg(0, 1).imm_op(2, 1).flag(flags::IMM_SX8),
        ],
    ),
    Form::new(&[R32], 0b01, 0b00, &[Enc::new(&[0xF7]).modrm_digit(5, 0)])
        .reads(&[EAX])
        .writes(&[EAX, EDX]),
    Form::new(&[R64], 0b01, 0b00, &[Enc::new(&[0xF7]).w().modrm_digit(5, 0)])
        .reads(&[RAX])
        .writes(&[RAX, RDX]),
];

pub static MUL: &[Form] = &[
    Form::new(&[R8], 0b01, 0b00, &[Enc::new(&[0xF6]).modrm_digit(4, 0)])
        .reads(&[AL])
        .writes(&[AX]),
    Form::new(&[R32], 0b01, 0b00, &[Enc::new(&[0xF7]).modrm_digit(4, 0)])
        .reads(&[EAX])
        .writes(&[EAX, EDX]),
    Form::new(&[R64], 0b01, 0b00, &[Enc::new(&[0xF7]).w().modrm_digit(4, 0)])
        .reads(&[RAX])
        .writes(&[RAX, RDX]),
    Form::new(&[M32], 0b01, 0b00, &[Enc::new(&[0xF7]).modrm_digit(4, 0)])
        .reads(&[EAX])
        .writes(&[EAX, EDX]),
    Form::new(&[M64], 0b01, 0b00, &[Enc::new(&[0xF7]).w().modrm_digit(4, 0)])
        .reads(&[RAX])
        .writes(&[RAX, RDX]),
];

macro_rules! div_table {
    ($table:ident, $digit:literal) => {
        pub static $table: &[Form] = &[
            Form::new(&[R32], 0b01, 0b00, &[Enc::new(&[0xF7]).modrm_digit($digit, 0)])
                .reads(&[EAX, EDX])
                .writes(&[EAX, EDX]),
            Form::new(&[R64], 0b01, 0b00, &[Enc::new(&[0xF7]).w().modrm_digit($digit, 0)])
                .reads(&[RAX, RDX])
                .writes(&[RAX, RDX]),
            Form::new(&[M32], 0b01, 0b00, &[Enc::new(&[0xF7]).modrm_digit($digit, 0)])
                .reads(&[EAX, EDX])
                .writes(&[EAX, EDX]),
            Form::new(&[M64], 0b01, 0b00, &[Enc::new(&[0xF7]).w().modrm_digit($digit, 0)])
                .reads(&[RAX, RDX])
                .writes(&[RAX, RDX]),
        ];
    };
}

div_table!(DIV, 6);
div_table!(IDIV, 7);

macro_rules! unary_table {
    ($table:ident, $op8:literal, $op:literal, $digit:literal, in: $in:literal) => {
        pub static $table: &[Form] = &[
            Form::new(&[R8], $in, 0b01, &[Enc::new(&[$op8]).modrm_digit($digit, 0)]),
            Form::new(&[R16], $in, 0b01, &[Enc::new(&[$op]).prefix(&[0x66]).modrm_digit($digit, 0)]),
            Form::new(&[R32], $in, 0b01, &[Enc::new(&[$op]).modrm_digit($digit, 0)]),
            Form::new(&[R64], $in, 0b01, &[Enc::new(&[$op]).w().modrm_digit($digit, 0)]),
            Form::new(&[M8], $in, 0b00, &[Enc::new(&[$op8]).modrm_digit($digit, 0)]),
            Form::new(&[M16], $in, 0b00, &[Enc::new(&[$op]).prefix(&[0x66]).modrm_digit($digit, 0)]),
            Form::new(&[M32], $in, 0b00, &[Enc::new(&[$op]).modrm_digit($digit, 0)]),
            Form::new(&[M64], $in, 0b00, &[Enc::new(&[$op]).w().modrm_digit($digit, 0)]),
        ];
    };
}

unary_table!(NEG, 0xF6, 0xF7, 3, in: 0b01);
unary_table!(NOT, 0xF6, 0xF7, 2, in: 0b01);
unary_table!(INC, 0xFE, 0xFF, 0, in: 0b01);
unary_table!(DEC, 0xFE, 0xFF, 1, in: 0b01);

macro_rules! shift_table {
    ($table:ident, $digit:literal) => {
        pub static $table: &[Form] = &[
            Form::new(&[R8, Imm8], 0b01, 0b01, &[Enc::new(&[0xC0]).modrm_digit($digit, 0).imm_op(1, 1)]),
            Form::new(&[R8, Cl], 0b11, 0b01, &[Enc::new(&[0xD2]).modrm_digit($digit, 0)]),
            Form::new(
                &[R16, Imm8],
                0b01,
                0b01,
                &[Enc::new(&[0xC1]).prefix(&[0x66]).modrm_digit($digit, 0).imm_op(1, 1)],
            ),
            Form::new(&[R16, Cl], 0b11, 0b01, &[Enc::new(&[0xD3]).prefix(&[0x66]).modrm_digit($digit, 0)]),
            Form::new(&[R32, Imm8], 0b01, 0b01, &[Enc::new(&[0xC1]).modrm_digit($digit, 0).imm_op(1, 1)]),
            Form::new(&[R32, Cl], 0b11, 0b01, &[Enc::new(&[0xD3]).modrm_digit($digit, 0)]),
            Form::new(&[R64, Imm8], 0b01, 0b01, &[Enc::new(&[0xC1]).w().modrm_digit($digit, 0).imm_op(1, 1)]),
            Form::new(&[R64, Cl], 0b11, 0b01, &[Enc::new(&[0xD3]).w().modrm_digit($digit, 0)]),
            Form::new(&[M32, Imm8], 0b01, 0b00, &[Enc::new(&[0xC1]).modrm_digit($digit, 0).imm_op(1, 1)]),
            Form::new(&[M32, Cl], 0b11, 0b00, &[Enc::new(&[0xD3]).modrm_digit($digit, 0)]),
            Form::new(&[M64, Imm8], 0b01, 0b00, &[Enc::new(&[0xC1]).w().modrm_digit($digit, 0).imm_op(1, 1)]),
            Form::new(&[M64, Cl], 0b11, 0b00, &[Enc::new(&[0xD3]).w().modrm_digit($digit, 0)]),
        ];
    };
}

shift_table!(ROL, 0);
shift_table!(ROR, 1);
shift_table!(RCL, 2);
shift_table!(RCR, 3);
shift_table!(SHL, 4);
shift_table!(SHR, 5);
shift_table!(SAR, 7);

macro_rules! dshift_table {
    ($table:ident, $imm_op:literal, $cl_op:literal) => {
        pub static $table: &[Form] = &[
            Form::new(
                &[R32, R32, Imm8],
                0b011,
                0b001,
                &[Enc::new(&[0x0F, $imm_op]).modrm_reg(1, 0).imm_op(2, 1)],
            ),
            Form::new(&[R32, R32, Cl], 0b111, 0b001, &[Enc::new(&[0x0F, $cl_op]).modrm_reg(1, 0)]),
            Form::new(
                &[R64, R64, Imm8],
                0b011,
                0b001,
                &[Enc::new(&[0x0F, $imm_op]).w().modrm_reg(1, 0).imm_op(2, 1)],
            ),
            Form::new(&[R64, R64, Cl], 0b111, 0b001, &[Enc::new(&[0x0F, $cl_op]).w().modrm_reg(1, 0)]),
        ];
    };
}

dshift_table!(SHLD, 0xA4, 0xA5);
dshift_table!(SHRD, 0xAC, 0xAD);

op2! {
    /// Move between registers, memory, and immediates. An untyped memory
    /// destination with an immediate source assembles as a byte store.
    mov => MOV, "mov";
    add => ADD, "add";
    or => OR, "or";
    adc => ADC, "adc";
    sbb => SBB, "sbb";
    and => AND, "and";
    sub => SUB, "sub";
    /// Exclusive or. With identical register operands this is the
    /// canonical zeroing idiom and reads nothing.
    xor => XOR, "xor";
    cmp => CMP, "cmp";
    test => TEST, "test";
    movsx => MOVSX, "movsx";
    movzx => MOVZX, "movzx";
    movsxd => MOVSXD, "movsxd";
    /// Address computation; the memory operand is never dereferenced.
    lea => LEA, "lea";
    xchg => XCHG, "xchg";
    /// Two-operand signed multiply.
    imul => IMUL, "imul";
    rol => ROL, "rol";
    ror => ROR, "ror";
    rcl => RCL, "rcl";
    rcr => RCR, "rcr";
    shl => SHL, "shl";
    sal => SHL, "sal";
    shr => SHR, "shr";
    sar => SAR, "sar";
}

op1! {
    push => PUSH, "push";
    pop => POP, "pop";
    /// Widening signed multiply into the accumulator pair.
    imul1 => IMUL, "imul";
    mul => MUL, "mul";
    div => DIV, "div";
    idiv => IDIV, "idiv";
    neg => NEG, "neg";
    not => NOT, "not";
    inc => INC, "inc";
    dec => DEC, "dec";
}

op3! {
    /// Three-operand signed multiply by an immediate.
    imul3 => IMUL, "imul";
    shld => SHLD, "shld";
    shrd => SHRD, "shrd";
}
