//! Control transfer, conditional data movement, and serializing
//! instructions.
//!
//! Branches to stream labels carry no form table; their displacement is
//! chosen during serialization (short when a bound target is in rel8
//! reach, long otherwise). Everything else here is table-driven like the
//! rest of the catalog.

use super::{op0, op1, op2};
use crate::core::stream::LabelId;
use crate::x64::function::Function;
use crate::x64::inst::OpKind::*;
use crate::x64::inst::{Cond, Enc, Form, Inst, InstKind};
use crate::x64::isa::Extension;
use crate::x64::registers::{EAX, EBX, ECX, EDX};

pub static CALL: &[Form] = &[
    Form::new(&[R64], 0b01, 0b00, &[Enc::new(&[0xFF]).modrm_digit(2, 0)]),
    Form::new(&[M64], 0b01, 0b00, &[Enc::new(&[0xFF]).modrm_digit(2, 0)]),
];

pub static CPUID: &[Form] = &[Form::new(&[], 0b0, 0b0, &[Enc::new(&[0x0F, 0xA2])])
    .reads(&[EAX, ECX])
    .writes(&[EAX, EBX, ECX, EDX])];

pub static RDTSC: &[Form] =
    &[Form::new(&[], 0b0, 0b0, &[Enc::new(&[0x0F, 0x31])]).writes(&[EAX, EDX])];

pub static INT3: &[Form] = &[Form::new(&[], 0b0, 0b0, &[Enc::new(&[0xCC])])];

pub static UD2: &[Form] = &[Form::new(&[], 0b0, 0b0, &[Enc::new(&[0x0F, 0x0B])])];

pub static PAUSE: &[Form] = &[Form::new(&[], 0b0, 0b0, &[Enc::new(&[0xF3, 0x90])])];

macro_rules! setcc_tables {
    ($(($table:ident, $fn_name:ident, $mnem:literal, $cc:literal);)+) => {
        $(
            pub static $table: &[Form] = &[
                Form::new(&[R8], 0b0, 0b01, &[Enc::new(&[0x0F, 0x90 + $cc]).modrm_digit(0, 0)]),
                Form::new(&[M8], 0b0, 0b00, &[Enc::new(&[0x0F, 0x90 + $cc]).modrm_digit(0, 0)]),
            ];
        )+
        op1! { $($fn_name => $table, $mnem;)+ }
    };
}

setcc_tables! {
    (SETO, seto, "seto", 0);
    (SETNO, setno, "setno", 1);
    (SETB, setb, "setb", 2);
    (SETAE, setae, "setae", 3);
    (SETE, sete, "sete", 4);
    (SETNE, setne, "setne", 5);
    (SETBE, setbe, "setbe", 6);
    (SETA, seta, "seta", 7);
    (SETS, sets, "sets", 8);
    (SETNS, setns, "setns", 9);
    (SETP, setp, "setp", 10);
    (SETNP, setnp, "setnp", 11);
    (SETL, setl, "setl", 12);
    (SETGE, setge, "setge", 13);
    (SETLE, setle, "setle", 14);
    (SETG, setg, "setg", 15);
}

macro_rules! cmovcc_tables {
    ($(($table:ident, $fn_name:ident, $mnem:literal, $cc:literal);)+) => {
        $(
            // the destination is also an input: it keeps its value when
            // the condition does not hold
            pub static $table: &[Form] = &[
                Form::new(&[R32, R32], 0b11, 0b01, &[Enc::new(&[0x0F, 0x40 + $cc]).modrm_reg(0, 1)])
                    .ext(Extension::Cmov),
                Form::new(&[R64, R64], 0b11, 0b01, &[Enc::new(&[0x0F, 0x40 + $cc]).w().modrm_reg(0, 1)])
                    .ext(Extension::Cmov),
                Form::new(&[R32, M32], 0b11, 0b01, &[Enc::new(&[0x0F, 0x40 + $cc]).modrm_reg(0, 1)])
                    .ext(Extension::Cmov),
                Form::new(&[R64, M64], 0b11, 0b01, &[Enc::new(&[0x0F, 0x40 + $cc]).w().modrm_reg(0, 1)])
                    .ext(Extension::Cmov),
            ];
        )+
        op2! { $($fn_name => $table, $mnem;)+ }
    };
}

cmovcc_tables! {
    (CMOVO, cmovo, "cmovo", 0);
    (CMOVNO, cmovno, "cmovno", 1);
    (CMOVB, cmovb, "cmovb", 2);
    (CMOVAE, cmovae, "cmovae", 3);
    (CMOVE, cmove, "cmove", 4);
    (CMOVNE, cmovne, "cmovne", 5);
    (CMOVBE, cmovbe, "cmovbe", 6);
    (CMOVA, cmova, "cmova", 7);
    (CMOVS, cmovs, "cmovs", 8);
    (CMOVNS, cmovns, "cmovns", 9);
    (CMOVP, cmovp, "cmovp", 10);
    (CMOVNP, cmovnp, "cmovnp", 11);
    (CMOVL, cmovl, "cmovl", 12);
    (CMOVGE, cmovge, "cmovge", 13);
    (CMOVLE, cmovle, "cmovle", 14);
    (CMOVG, cmovg, "cmovg", 15);
}

macro_rules! jcc_methods {
    ($($fn_name:ident => $mnem:literal, $cond:ident;)+) => {
        impl Function {
            $(
                pub fn $fn_name(&mut self, target: LabelId) {
                    self.emit_branch($mnem, Some(Cond::$cond), target);
                }
            )+
        }
    };
}

jcc_methods! {
    jo => "jo", O;
    jno => "jno", No;
    jb => "jb", B;
    jae => "jae", Ae;
    je => "je", E;
    jne => "jne", Ne;
    jbe => "jbe", Be;
    ja => "ja", A;
    js => "js", S;
    jns => "jns", Ns;
    jp => "jp", P;
    jnp => "jnp", Np;
    jl => "jl", L;
    jge => "jge", Ge;
    jle => "jle", Le;
    jg => "jg", G;
}

impl Function {
    /// Unconditional jump to a stream label.
    pub fn jmp(&mut self, target: LabelId) {
        self.emit_branch("jmp", None, target);
    }

    /// Conditional jump with an explicit condition code.
    pub fn jcc(&mut self, cond: Cond, target: LabelId) {
        self.emit_branch("jcc", Some(cond), target);
    }

    /// Near call to a stream label, always rel32.
    pub fn call(&mut self, target: LabelId) {
        self.stream.append(Inst {
            mnemonic: "call",
            operands: Vec::new(),
            form: None,
            implicit_in: &[],
            implicit_out: &[],
            kind: InstKind::CallLabel { target },
        });
    }
}

op1! {
    /// Indirect near call through a register or memory slot.
    call_indirect => CALL, "call";
}

op0! {
    cpuid => CPUID, "cpuid";
    rdtsc => RDTSC, "rdtsc";
    int3 => INT3, "int3";
    ud2 => UD2, "ud2";
    pause => PAUSE, "pause";
}
