//! The instruction catalog.
//!
//! One static form table per mnemonic. A table lists the operand-signature
//! variants in dispatch order; the first form whose signature accepts the
//! supplied operands wins, and its encoding recipes then compete on length
//! against the concrete operands. The `Function` methods generated here
//! are the public construction API: one method per mnemonic, taking
//! anything convertible to an operand.

pub mod control;
pub mod gp;
pub(crate) mod lowering;
pub mod simd;

macro_rules! op0 {
    ($($(#[$attr:meta])* $fn_name:ident => $table:expr, $mnem:literal;)+) => {
        impl $crate::x64::function::Function {
            $(
                $(#[$attr])*
                pub fn $fn_name(&mut self) -> $crate::core::error::AsmResult<()> {
                    self.emit($mnem, $table, Vec::new())
                }
            )+
        }
    };
}

macro_rules! op1 {
    ($($(#[$attr:meta])* $fn_name:ident => $table:expr, $mnem:literal;)+) => {
        impl $crate::x64::function::Function {
            $(
                $(#[$attr])*
                pub fn $fn_name(
                    &mut self,
                    a: impl Into<$crate::x64::operand::Operand>,
                ) -> $crate::core::error::AsmResult<()> {
                    self.emit($mnem, $table, vec![a.into()])
                }
            )+
        }
    };
}

macro_rules! op2 {
    ($($(#[$attr:meta])* $fn_name:ident => $table:expr, $mnem:literal;)+) => {
        impl $crate::x64::function::Function {
            $(
                $(#[$attr])*
                pub fn $fn_name(
                    &mut self,
                    a: impl Into<$crate::x64::operand::Operand>,
                    b: impl Into<$crate::x64::operand::Operand>,
                ) -> $crate::core::error::AsmResult<()> {
                    self.emit($mnem, $table, vec![a.into(), b.into()])
                }
            )+
        }
    };
}

macro_rules! op3 {
    ($($(#[$attr:meta])* $fn_name:ident => $table:expr, $mnem:literal;)+) => {
        impl $crate::x64::function::Function {
            $(
                $(#[$attr])*
                pub fn $fn_name(
                    &mut self,
                    a: impl Into<$crate::x64::operand::Operand>,
                    b: impl Into<$crate::x64::operand::Operand>,
                    c: impl Into<$crate::x64::operand::Operand>,
                ) -> $crate::core::error::AsmResult<()> {
                    self.emit($mnem, $table, vec![a.into(), b.into(), c.into()])
                }
            )+
        }
    };
}

macro_rules! op4 {
    ($($(#[$attr:meta])* $fn_name:ident => $table:expr, $mnem:literal;)+) => {
        impl $crate::x64::function::Function {
            $(
                $(#[$attr])*
                pub fn $fn_name(
                    &mut self,
                    a: impl Into<$crate::x64::operand::Operand>,
                    b: impl Into<$crate::x64::operand::Operand>,
                    c: impl Into<$crate::x64::operand::Operand>,
                    d: impl Into<$crate::x64::operand::Operand>,
                ) -> $crate::core::error::AsmResult<()> {
                    self.emit($mnem, $table, vec![a.into(), b.into(), c.into(), d.into()])
                }
            )+
        }
    };
}

pub(crate) use {op0, op1, op2, op3, op4};

/// Instruction construction for the spill rewriter, bypassing the public
/// dispatch because the operands are internally generated.
pub(crate) mod spill_forms {
    use crate::x64::inst::{select_form, Form, Inst};
    use crate::x64::operand::{Mem, Operand};
    use crate::x64::registers::{Reg, RegClass};

    fn table_for(class: RegClass) -> (&'static str, &'static [Form]) {
        match class {
            RegClass::Xmm => ("movups", super::simd::MOVUPS),
            RegClass::Ymm => ("vmovups", super::simd::VMOVUPS),
            RegClass::Mmx => ("movq", super::simd::MOVQ),
            _ => ("mov", super::gp::MOV),
        }
    }

    fn make(class: RegClass, ops: Vec<Operand>) -> Inst {
        let (mnemonic, table) = table_for(class);
        match select_form(table, &ops) {
            Some(form) => Inst::normal(mnemonic, ops, form),
            None => unreachable!("no spill move for {class:?}"),
        }
    }

    pub(crate) fn store(slot: Mem, src: Reg) -> Inst {
        make(src.class, vec![Operand::Mem(slot), Operand::Reg(src)])
    }

    pub(crate) fn reload(dst: Reg, slot: Mem) -> Inst {
        make(dst.class, vec![Operand::Reg(dst), Operand::Mem(slot)])
    }
}
