//! Pseudo-instruction expansion.
//!
//! Runs after register allocation, so every operand reaching this module
//! is physical. Argument loads become moves from the ABI argument
//! location, returns bind the value to the result convention, and the
//! prologue/epilogue bracket the body with callee-save pushes and the
//! frame adjustment. Plan-9 frame-pointer slots stay symbolic until
//! serialization because the listing renders them as `name+off(FP)`.

use crate::core::error::{AsmError, AsmResult};
use crate::x64::abi::{Abi, AbiFlavor};
use crate::x64::catalog::{gp, simd};
use crate::x64::function::{ArgLocation, Argument, ValueType};
use crate::x64::inst::{select_form, Form, Inst, InstKind};
use crate::x64::operand::{mem, Operand, Size};
use crate::x64::registers::{Reg, RegClass, EAX, RAX, RSP};

fn make(mnemonic: &'static str, table: &'static [Form], ops: Vec<Operand>) -> AsmResult<Inst> {
    match select_form(table, &ops) {
        Some(form) => Ok(Inst::normal(mnemonic, ops, form)),
        None => {
            let rendered = ops.iter().map(|o| o.to_string()).collect::<Vec<_>>().join(", ");
            Err(AsmError::Finalization {
                reason: format!("cannot lower {mnemonic} {rendered}"),
            })
        }
    }
}

fn ret_inst() -> Inst {
    Inst {
        mnemonic: "ret",
        operands: Vec::new(),
        form: None,
        implicit_in: &[],
        implicit_out: &[],
        kind: InstKind::Ret,
    }
}

pub(crate) fn emit_prologue(
    out: &mut Vec<Inst>,
    _abi: &Abi,
    saved: &[Reg],
    frame_size: i32,
) -> AsmResult<()> {
    for reg in saved {
        out.push(make("push", gp::PUSH, vec![Operand::Reg(reg.with_size(8))])?);
    }
    if frame_size > 0 {
        out.push(make(
            "sub",
            gp::SUB,
            vec![Operand::Reg(RSP), Operand::Imm(frame_size as i64)],
        )?);
    }
    Ok(())
}

pub(crate) fn emit_epilogue(
    out: &mut Vec<Inst>,
    _abi: &Abi,
    saved: &[Reg],
    frame_size: i32,
) -> AsmResult<()> {
    if frame_size > 0 {
        out.push(make(
            "add",
            gp::ADD,
            vec![Operand::Reg(RSP), Operand::Imm(frame_size as i64)],
        )?);
    }
    for reg in saved.iter().rev() {
        out.push(make("pop", gp::POP, vec![Operand::Reg(reg.with_size(8))])?);
    }
    Ok(())
}

fn same_reg(a: Reg, b: Reg) -> bool {
    a.class.bank() == b.class.bank() && a.phys() == b.phys() && a.size == b.size
}

/// Integer load with the widening the argument type calls for. Pushes at
/// most one instruction; a move onto itself is dropped.
fn load_gp(out: &mut Vec<Inst>, dst: Reg, src: Operand, ty: ValueType) -> AsmResult<()> {
    let width = ty.size();
    if dst.size == width {
        if let Operand::Reg(r) = src {
            if same_reg(dst, r) {
                return Ok(());
            }
        }
        out.push(make("mov", gp::MOV, vec![Operand::Reg(dst), src])?);
    } else if ty.is_signed() {
        let (mnemonic, table) = if width == 4 {
            ("movsxd", gp::MOVSXD)
        } else {
            ("movsx", gp::MOVSX)
        };
        out.push(make(mnemonic, table, vec![Operand::Reg(dst), src])?);
    } else if width == 4 {
        // a 32-bit write zero-extends through the full register
        out.push(make("mov", gp::MOV, vec![Operand::Reg(dst.with_size(4)), src])?);
    } else {
        out.push(make("movzx", gp::MOVZX, vec![Operand::Reg(dst), src])?);
    }
    Ok(())
}

fn float_mov(ty: ValueType) -> (&'static str, &'static [Form]) {
    if ty.size() == 4 {
        ("movss", simd::MOVSS)
    } else {
        ("movsd", simd::MOVSD)
    }
}

pub(crate) fn emit_arg_load(
    out: &mut Vec<Inst>,
    abi: &Abi,
    dst: Reg,
    index: u8,
    arg: &Argument,
    loc: ArgLocation,
    frame_size: i32,
    saved_count: usize,
) -> AsmResult<()> {
    match loc {
        ArgLocation::Register(src) => {
            if arg.ty.is_float() {
                if !same_reg(dst, src) {
                    out.push(make(
                        "movaps",
                        simd::MOVAPS,
                        vec![Operand::Reg(dst), Operand::Reg(src)],
                    )?);
                }
            } else {
                load_gp(out, dst, Operand::Reg(src.with_size(arg.ty.size())), arg.ty)?;
            }
        }
        ArgLocation::Stack(offset) => match abi.flavor {
            AbiFlavor::Go => out.push(Inst {
                mnemonic: "mov",
                operands: vec![Operand::Reg(dst)],
                form: None,
                implicit_in: &[],
                implicit_out: &[],
                kind: InstKind::ArgSlotLoad { arg: index, offset },
            }),
            AbiFlavor::Native => {
                let disp = frame_size + 8 * saved_count as i32 + 8 + offset;
                let size = Size::from_bytes(arg.ty.size()).ok_or_else(|| AsmError::Finalization {
                    reason: format!("argument {:?} has no memory width", arg.name),
                })?;
                let slot = mem(RSP + disp)?.with_size(size);
                if arg.ty.is_float() {
                    let (mnemonic, table) = float_mov(arg.ty);
                    out.push(make(mnemonic, table, vec![Operand::Reg(dst), Operand::Mem(slot)])?);
                } else {
                    load_gp(out, dst, Operand::Mem(slot), arg.ty)?;
                }
            }
        },
    }
    Ok(())
}

pub(crate) fn emit_return(
    out: &mut Vec<Inst>,
    abi: &Abi,
    result: Option<ValueType>,
    value: Option<Operand>,
    ret_offset: i32,
    frame_size: i32,
    saved: &[Reg],
) -> AsmResult<()> {
    if let Some(value) = value {
        let ty = result.ok_or_else(|| AsmError::Finalization {
            reason: "return value supplied for a function with no result".to_string(),
        })?;
        match abi.flavor {
            AbiFlavor::Go => {
                let src = match value {
                    Operand::Reg(r) if r.class == RegClass::Gp => {
                        Operand::Reg(r.with_size(ty.size()))
                    }
                    Operand::Reg(r) => Operand::Reg(r),
                    Operand::Imm(v) => Operand::Imm(v),
                    other => {
                        return Err(AsmError::Finalization {
                            reason: format!("cannot return {other} through a stack result slot"),
                        })
                    }
                };
                out.push(Inst {
                    mnemonic: "mov",
                    operands: vec![src],
                    form: None,
                    implicit_in: &[],
                    implicit_out: &[],
                    kind: InstKind::ResultStore { offset: ret_offset },
                });
            }
            AbiFlavor::Native if ty.is_float() => {
                let dst = abi.float_result_register;
                match value {
                    Operand::Reg(r) if same_reg(dst, r) => {}
                    Operand::Reg(r) => out.push(make(
                        "movaps",
                        simd::MOVAPS,
                        vec![Operand::Reg(dst), Operand::Reg(r)],
                    )?),
                    Operand::Mem(m) => {
                        let (mnemonic, table) = float_mov(ty);
                        out.push(make(mnemonic, table, vec![Operand::Reg(dst), Operand::Mem(m)])?);
                    }
                    other => {
                        return Err(AsmError::Finalization {
                            reason: format!("cannot return {other} in a vector register"),
                        })
                    }
                }
            }
            AbiFlavor::Native => match value {
                Operand::Imm(0) => out.push(make(
                    "xor",
                    gp::XOR,
                    vec![Operand::Reg(EAX), Operand::Reg(EAX)],
                )?),
                Operand::Imm(v) => {
                    let dst = if ty.size() == 8 { RAX } else { EAX };
                    out.push(make("mov", gp::MOV, vec![Operand::Reg(dst), Operand::Imm(v)])?);
                }
                Operand::Reg(r) => {
                    let src = if r.class == RegClass::Gp {
                        r.with_size(ty.size())
                    } else {
                        return Err(AsmError::Finalization {
                            reason: format!("cannot return {r} through the integer result register"),
                        });
                    };
                    load_gp(out, RAX, Operand::Reg(src), ty)?;
                }
                Operand::Mem(m) => {
                    let size = Size::from_bytes(ty.size()).ok_or_else(|| AsmError::Finalization {
                        reason: "result type has no memory width".to_string(),
                    })?;
                    let m = if m.size.is_none() { m.with_size(size) } else { m };
                    load_gp(out, RAX, Operand::Mem(m), ty)?;
                }
                other => {
                    return Err(AsmError::Finalization {
                        reason: format!("cannot return {other}"),
                    })
                }
            },
        }
    }
    emit_epilogue(out, abi, saved, frame_size)?;
    out.push(ret_inst());
    Ok(())
}

/// Turn a Plan-9 frame-pointer pseudo into the concrete rsp-relative move
/// for serialization. FP points one pointer above the entry stack pointer,
/// past the frame adjustment if one was emitted.
pub(crate) fn materialize_fp_access(
    inst: &Inst,
    args: &[Argument],
    result: Option<ValueType>,
    frame_size: i32,
) -> AsmResult<Inst> {
    match inst.kind {
        InstKind::ArgSlotLoad { arg, offset } => {
            let dst = match inst.operands.first() {
                Some(Operand::Reg(r)) => *r,
                _ => unreachable!("argument slot load without register destination"),
            };
            let ty = args[arg as usize].ty;
            let disp = frame_size + 8 + offset;
            let size = Size::from_bytes(ty.size()).ok_or_else(|| AsmError::Finalization {
                reason: format!("argument {:?} has no memory width", args[arg as usize].name),
            })?;
            let slot = mem(RSP + disp)?.with_size(size);
            let mut one = Vec::with_capacity(1);
            if ty.is_float() {
                let (mnemonic, table) = float_mov(ty);
                one.push(make(mnemonic, table, vec![Operand::Reg(dst), Operand::Mem(slot)])?);
            } else {
                load_gp(&mut one, dst, Operand::Mem(slot), ty)?;
            }
            match one.pop() {
                Some(inst) => Ok(inst),
                None => unreachable!("memory argument load cannot be elided"),
            }
        }
        InstKind::ResultStore { offset } => {
            let ty = match result {
                Some(t) => t,
                None => unreachable!("result store in a function with no result"),
            };
            let disp = frame_size + 8 + offset;
            let size = Size::from_bytes(ty.size()).ok_or_else(|| AsmError::Finalization {
                reason: "result type has no memory width".to_string(),
            })?;
            let slot = mem(RSP + disp)?.with_size(size);
            let src = match inst.operands.first() {
                Some(op) => *op,
                None => unreachable!("result store without a source operand"),
            };
            match src {
                Operand::Reg(r) if r.class == RegClass::Xmm => {
                    let (mnemonic, table) = float_mov(ty);
                    make(mnemonic, table, vec![Operand::Mem(slot), Operand::Reg(r)])
                }
                src => make("mov", gp::MOV, vec![Operand::Mem(slot), src]),
            }
        }
        _ => unreachable!("{} is not a frame-pointer pseudo", inst.mnemonic),
    }
}
