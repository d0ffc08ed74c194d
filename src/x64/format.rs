//! Assembly listings.
//!
//! A finalized function renders deterministically into one of three
//! dialects: NASM (Intel operand order), GAS (AT&T order with register
//! sigils), or Plan-9 Go assembly (middle-dot symbol mangling, TEXT
//! directive, width-suffixed mnemonics, reversed operands, FP-relative
//! argument slots). The same instruction sequence always produces the
//! same text.

use std::fmt::Write;

use crate::core::error::{AsmError, AsmResult};
use crate::x64::abi::AbiFlavor;
use crate::x64::catalog::lowering;
use crate::x64::function::FinalizedFunction;
use crate::x64::inst::{Cond, Inst, InstKind};
use crate::x64::operand::{Mem, Operand};
use crate::x64::registers::{Reg, RegClass, GO_GP_NAMES};

/// Output dialect of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Nasm,
    Gas,
    Go,
}

impl FinalizedFunction {
    /// Render the function as an assembly listing.
    pub fn format(&self, dialect: Dialect) -> AsmResult<String> {
        match dialect {
            Dialect::Nasm => format_nasm(self),
            Dialect::Gas => format_gas(self),
            Dialect::Go => format_go(self),
        }
    }
}

fn branch_name(cond: Option<Cond>) -> String {
    match cond {
        None => "jmp".to_string(),
        Some(c) => format!("j{}", c.suffix()),
    }
}

/// Materialize Plan-9 frame-pointer pseudos so the native dialects can
/// print a concrete rsp-relative access.
fn concrete<'i>(f: &FinalizedFunction, inst: &'i Inst) -> AsmResult<std::borrow::Cow<'i, Inst>> {
    match inst.kind {
        InstKind::ArgSlotLoad { .. } | InstKind::ResultStore { .. } => Ok(std::borrow::Cow::Owned(
            lowering::materialize_fp_access(inst, &f.args, f.result, f.frame_size)?,
        )),
        _ => Ok(std::borrow::Cow::Borrowed(inst)),
    }
}

// NASM

fn nasm_operand(op: &Operand) -> String {
    match op {
        Operand::Mem(m) => match m.size {
            Some(size) => format!("{} {m}", size.name()),
            None => m.to_string(),
        },
        other => other.to_string(),
    }
}

fn format_nasm(f: &FinalizedFunction) -> AsmResult<String> {
    let mut out = String::new();
    let _ = writeln!(out, "{}:", f.name);
    for inst in f.instructions() {
        match inst.kind {
            InstKind::Bind(id) => {
                let _ = writeln!(out, "{}:", f.labels.name(id));
            }
            InstKind::Align(boundary) => {
                let _ = writeln!(out, "\talign {boundary}");
            }
            InstKind::Branch { cond, target } => {
                let _ = writeln!(out, "\t{} {}", branch_name(cond), f.labels.name(target));
            }
            InstKind::CallLabel { target } => {
                let _ = writeln!(out, "\tcall {}", f.labels.name(target));
            }
            InstKind::Ret => out.push_str("\tret\n"),
            _ => {
                let inst = concrete(f, inst)?;
                if inst.operands.is_empty() {
                    let _ = writeln!(out, "\t{}", inst.mnemonic);
                } else {
                    let ops: Vec<String> = inst.operands.iter().map(nasm_operand).collect();
                    let _ = writeln!(out, "\t{} {}", inst.mnemonic, ops.join(", "));
                }
            }
        }
    }
    Ok(out)
}

// GAS (AT&T)

fn gas_mem(m: &Mem) -> String {
    if let Some(id) = m.literal {
        return format!("const{}(%rip)", id.0);
    }
    let mut out = String::new();
    if m.disp != 0 {
        let _ = write!(out, "{}", m.disp);
    }
    out.push('(');
    if let Some(base) = &m.base {
        let _ = write!(out, "%{base}");
    }
    if let Some(index) = &m.index {
        let _ = write!(out, ",%{index},{}", m.scale);
    }
    out.push(')');
    out
}

fn gas_operand(op: &Operand) -> String {
    match op {
        Operand::Reg(r) => format!("%{r}"),
        Operand::Mem(m) => gas_mem(m),
        Operand::Imm(v) => format!("${v}"),
        Operand::Label(l) => format!("label<{}>", l.index()),
    }
}

fn gas_size_letter(bytes: u8) -> &'static str {
    match bytes {
        1 => "b",
        2 => "w",
        4 => "l",
        _ => "q",
    }
}

/// AT&T mnemonic, with an operand-size suffix where the operands alone
/// would leave the width ambiguous.
fn gas_mnemonic(inst: &Inst) -> String {
    let sizes: Vec<u8> = inst
        .operands
        .iter()
        .filter_map(|op| match op {
            Operand::Reg(r) if r.class == RegClass::Gp => Some(r.size),
            _ => None,
        })
        .collect();
    match inst.mnemonic {
        "movsx" | "movzx" | "movsxd" => {
            let (dst, src) = match (&inst.operands[0], &inst.operands[1]) {
                (Operand::Reg(d), Operand::Reg(s)) => (d.size, s.size),
                (Operand::Reg(d), Operand::Mem(m)) => {
                    (d.size, m.size.map_or(1, |s| s.bytes()))
                }
                _ => (8, 1),
            };
            let base = if inst.mnemonic == "movzx" { "movz" } else { "movs" };
            format!("{base}{}{}", gas_size_letter(src), gas_size_letter(dst))
        }
        mnemonic => {
            let has_mem = inst.operands.iter().any(|op| matches!(op, Operand::Mem(_)));
            if has_mem && sizes.is_empty() {
                let width = inst
                    .operands
                    .iter()
                    .find_map(|op| match op {
                        Operand::Mem(m) => m.size.map(|s| s.bytes()),
                        _ => None,
                    })
                    .unwrap_or(8);
                format!("{mnemonic}{}", gas_size_letter(width))
            } else {
                mnemonic.to_string()
            }
        }
    }
}

fn format_gas(f: &FinalizedFunction) -> AsmResult<String> {
    let mut out = String::new();
    let _ = writeln!(out, "{}:", f.name);
    for inst in f.instructions() {
        match inst.kind {
            InstKind::Bind(id) => {
                let _ = writeln!(out, "{}:", f.labels.name(id));
            }
            InstKind::Align(boundary) => {
                // .p2align takes the exponent
                let _ = writeln!(out, "\t.p2align {}", boundary.trailing_zeros());
            }
            InstKind::Branch { cond, target } => {
                let _ = writeln!(out, "\t{} {}", branch_name(cond), f.labels.name(target));
            }
            InstKind::CallLabel { target } => {
                let _ = writeln!(out, "\tcall {}", f.labels.name(target));
            }
            InstKind::Ret => out.push_str("\tret\n"),
            _ => {
                let inst = concrete(f, inst)?;
                if inst.operands.is_empty() {
                    let _ = writeln!(out, "\t{}", inst.mnemonic);
                } else {
                    // AT&T order: source first
                    let ops: Vec<String> =
                        inst.operands.iter().rev().map(gas_operand).collect();
                    let _ = writeln!(out, "\t{} {}", gas_mnemonic(&inst), ops.join(", "));
                }
            }
        }
    }
    Ok(out)
}

// Plan-9 Go assembly

fn go_label(name: &str) -> String {
    name.replace('.', "_")
}

fn go_width_suffix(bytes: u8) -> &'static str {
    match bytes {
        1 => "B",
        2 => "W",
        4 => "L",
        _ => "Q",
    }
}

fn go_reg(r: &Reg) -> String {
    match r.class {
        RegClass::Gp => GO_GP_NAMES[r.phys_or_panic() as usize].to_string(),
        RegClass::Mmx => format!("M{}", r.phys_or_panic()),
        RegClass::Xmm => format!("X{}", r.phys_or_panic()),
        RegClass::Ymm => format!("Y{}", r.phys_or_panic()),
        RegClass::Mask => format!("K{}", r.phys_or_panic()),
    }
}

fn go_mem(m: &Mem) -> String {
    if let Some(id) = m.literal {
        return format!("const{}<>(SB)", id.0);
    }
    let mut out = String::new();
    if m.disp != 0 {
        let _ = write!(out, "{}", m.disp);
    }
    if let Some(base) = &m.base {
        let _ = write!(out, "({})", go_reg(base));
    }
    if let Some(index) = &m.index {
        let _ = write!(out, "({}*{})", go_reg(index), m.scale);
    }
    out
}

fn go_operand(op: &Operand) -> String {
    match op {
        Operand::Reg(r) => go_reg(r),
        Operand::Mem(m) => go_mem(m),
        Operand::Imm(v) => format!("${v}"),
        Operand::Label(l) => format!("label<{}>", l.index()),
    }
}

/// Plan-9 condition token for the Intel condition-suffix of a SETcc or
/// CMOVcc mnemonic.
fn go_cond_token(intel: &str) -> &'static str {
    match intel {
        "o" => "OS",
        "no" => "OC",
        "b" => "CS",
        "ae" => "CC",
        "e" => "EQ",
        "ne" => "NE",
        "be" => "LS",
        "a" => "HI",
        "s" => "MI",
        "ns" => "PL",
        "p" => "PS",
        "np" => "PC",
        "l" => "LT",
        "ge" => "GE",
        "le" => "LE",
        "g" => "GT",
        _ => "NE",
    }
}

/// Width of a GP operation for the Plan-9 suffix: the first GP register
/// operand decides, then the memory width, then pointer width.
fn go_op_width(inst: &Inst) -> u8 {
    inst.operands
        .iter()
        .find_map(|op| match op {
            Operand::Reg(r) if r.class == RegClass::Gp => Some(r.size),
            _ => None,
        })
        .or_else(|| {
            inst.operands.iter().find_map(|op| match op {
                Operand::Mem(m) => m.size.map(|s| s.bytes()),
                _ => None,
            })
        })
        .unwrap_or(8)
}

const GO_SUFFIXED: &[&str] = &[
    "mov", "add", "or", "adc", "sbb", "and", "sub", "xor", "cmp", "test", "neg", "not", "inc",
    "dec", "rol", "ror", "rcl", "rcr", "shl", "sal", "shr", "sar", "lea", "imul", "mul", "div",
    "idiv", "push", "pop", "xchg",
];

fn go_mnemonic(inst: &Inst) -> String {
    let m = inst.mnemonic;
    if m == "movsx" || m == "movzx" || m == "movsxd" {
        let (dst, src) = match (&inst.operands[0], &inst.operands[1]) {
            (Operand::Reg(d), Operand::Reg(s)) => (d.size, s.size),
            (Operand::Reg(d), Operand::Mem(mem)) => (d.size, mem.size.map_or(1, |s| s.bytes())),
            _ => (8, 4),
        };
        let ext = if m == "movzx" { "ZX" } else { "SX" };
        return format!("MOV{}{}{ext}", go_width_suffix(src), go_width_suffix(dst));
    }
    if let Some(cond) = m.strip_prefix("set") {
        return format!("SET{}", go_cond_token(cond));
    }
    if let Some(cond) = m.strip_prefix("cmov") {
        return format!("CMOV{}{}", go_width_suffix(go_op_width(inst)), go_cond_token(cond));
    }
    if GO_SUFFIXED.contains(&m) {
        return format!("{}{}", m.to_uppercase(), go_width_suffix(go_op_width(inst)));
    }
    m.to_uppercase()
}

fn go_line(mnemonic: &str, operands: &[String]) -> String {
    if operands.is_empty() {
        format!("\t{mnemonic}\n")
    } else {
        format!("\t{mnemonic} {}\n", operands.join(", "))
    }
}

fn format_go(f: &FinalizedFunction) -> AsmResult<String> {
    if f.abi.flavor != AbiFlavor::Go {
        return Err(AsmError::Finalization {
            reason: format!("{} cannot be rendered as a Plan-9 listing", f.abi.name),
        });
    }
    let mut out = String::new();

    let arg_list: Vec<String> = f
        .args
        .iter()
        .map(|a| format!("{} {}", a.name, a.ty.go_name()))
        .collect();
    match f.result {
        Some(ty) => {
            let _ = writeln!(out, "// func {}({}) {}", f.name, arg_list.join(", "), ty.go_name());
        }
        None => {
            let _ = writeln!(out, "// func {}({})", f.name, arg_list.join(", "));
        }
    }
    let result_bytes = f.result.map_or(0, |t| (t.size() as i32 + 7) & !7);
    let _ = writeln!(
        out,
        "TEXT \u{b7}{}(SB),4,${}-{}",
        f.name,
        f.frame_size,
        f.args_size + result_bytes
    );

    for inst in f.instructions() {
        match inst.kind {
            InstKind::Bind(id) => {
                let _ = writeln!(out, "{}:", go_label(f.labels.name(id)));
            }
            InstKind::Align(boundary) => {
                let _ = writeln!(out, "\tPCALIGN ${boundary}");
            }
            InstKind::Branch { cond, target } => {
                let name = match cond {
                    None => "JMP".to_string(),
                    Some(c) => c.go_jump_name().to_string(),
                };
                let _ = writeln!(out, "\t{name} {}", go_label(f.labels.name(target)));
            }
            InstKind::CallLabel { target } => {
                let _ = writeln!(out, "\tCALL {}", go_label(f.labels.name(target)));
            }
            InstKind::Ret => out.push_str("\tRET\n"),
            InstKind::ArgSlotLoad { arg, offset } => {
                let dst = match inst.operands.first() {
                    Some(Operand::Reg(r)) => *r,
                    _ => unreachable!("argument slot load without register destination"),
                };
                let a = &f.args[arg as usize];
                let slot = format!("{}+{}(FP)", a.name, offset);
                let mnemonic = if dst.size == a.ty.size() || !matches!(dst.class, RegClass::Gp) {
                    format!("MOV{}", go_width_suffix(a.ty.size()))
                } else {
                    let ext = if a.ty.is_signed() { "SX" } else { "ZX" };
                    format!(
                        "MOV{}{}{ext}",
                        go_width_suffix(a.ty.size()),
                        go_width_suffix(dst.size)
                    )
                };
                out.push_str(&go_line(&mnemonic, &[slot, go_reg(&dst)]));
            }
            InstKind::ResultStore { offset } => {
                let src = match inst.operands.first() {
                    Some(op) => *op,
                    None => unreachable!("result store without a source operand"),
                };
                let width = f.result.map_or(8, |t| t.size());
                let mnemonic = format!("MOV{}", go_width_suffix(width));
                let slot = format!("ret+{offset}(FP)");
                out.push_str(&go_line(&mnemonic, &[go_operand(&src), slot]));
            }
            _ => {
                // Plan-9 operand order: source first
                let ops: Vec<String> = inst.operands.iter().rev().map(go_operand).collect();
                out.push_str(&go_line(&go_mnemonic(inst), &ops));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x64::registers::{EBX, R9, RBX};

    #[test]
    fn go_register_names_are_width_independent() {
        assert_eq!(go_reg(&RBX), "BX");
        assert_eq!(go_reg(&EBX), "BX");
        assert_eq!(go_reg(&R9), "R9");
    }

    #[test]
    fn go_label_mangling() {
        assert_eq!(go_label("loop.begin"), "loop_begin");
        assert_eq!(go_label("done"), "done");
    }

    #[test]
    fn gas_memory_syntax() {
        use crate::x64::operand::qword_ptr;
        use crate::x64::registers::{RAX, RCX};
        let m = qword_ptr(RAX + RCX * 4 - 8).unwrap();
        assert_eq!(gas_mem(&m), "-8(%rax,%rcx,4)");
    }

    #[test]
    fn condition_tokens() {
        assert_eq!(go_cond_token("e"), "EQ");
        assert_eq!(go_cond_token("b"), "CS");
        assert_eq!(go_cond_token("g"), "GT");
    }
}
