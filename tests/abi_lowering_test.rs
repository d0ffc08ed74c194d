//! Native ABI binding tests.
//!
//! Finalizing against the SysV descriptor must place arguments, widen
//! narrow results into rax with the signedness the type calls for, save
//! and restore callee-saved registers, and spill when a virtual register
//! conflicts with every allocation candidate.

use x64asm::registers::{
    Reg, R10, R11, R12, R13, R14, R15, R8, R9, RAX, RBP, RBX, RCX, RDI, RDX, RSI,
};
use x64asm::{Argument, Dialect, Function, ValueType, SYSTEM_V};

fn listing(f: Function) -> String {
    f.finalize(&SYSTEM_V).unwrap().format(Dialect::Nasm).unwrap()
}

#[test]
fn argument_loaded_and_returned_unchanged() {
    let mut f = Function::new(
        "id",
        vec![Argument::new("n", ValueType::U64)],
        Some(ValueType::U64),
    );
    let n = f.gp64();
    f.load_argument(n, 0).unwrap();
    f.return_value(n);
    // the argument stays in rdi and moves into rax once
    assert_eq!(listing(f), "id:\n\tmov rax, rdi\n\tret\n");
}

#[test]
fn returned_value_survives_an_explicit_rax_write() {
    let mut f = Function::new("keep", vec![], Some(ValueType::U64));
    let v = f.gp64();
    f.mov(v, 42i64).unwrap();
    f.mov(RAX, 7i64).unwrap();
    f.return_value(v);
    // v is live across the rax write, so it must be steered elsewhere
    assert_eq!(
        listing(f),
        "keep:\n\tmov r10, 42\n\tmov rax, 7\n\tmov rax, r10\n\tret\n"
    );
}

#[test]
fn signed_byte_result_sign_extends() {
    let mut f = Function::new(
        "sext",
        vec![Argument::new("x", ValueType::S8)],
        Some(ValueType::S8),
    );
    let v = f.gp8();
    f.load_argument(v, 0).unwrap();
    f.return_value(v);
    let out = listing(f);
    assert!(out.contains("\tmovsx rax, dil\n"), "{out}");
}

#[test]
fn unsigned_byte_result_zero_extends() {
    let mut f = Function::new(
        "zext",
        vec![Argument::new("x", ValueType::U8)],
        Some(ValueType::U8),
    );
    let v = f.gp8();
    f.load_argument(v, 0).unwrap();
    f.return_value(v);
    let out = listing(f);
    assert!(out.contains("\tmovzx rax, dil\n"), "{out}");
}

#[test]
fn dword_results_use_movsxd_or_implicit_zero_extension() {
    let mut f = Function::new(
        "s32",
        vec![Argument::new("x", ValueType::S32)],
        Some(ValueType::S32),
    );
    let v = f.gp32();
    f.load_argument(v, 0).unwrap();
    f.return_value(v);
    let out = listing(f);
    assert!(out.contains("\tmovsxd rax, edi\n"), "{out}");

    let mut f = Function::new(
        "u32",
        vec![Argument::new("x", ValueType::U32)],
        Some(ValueType::U32),
    );
    let v = f.gp32();
    f.load_argument(v, 0).unwrap();
    f.return_value(v);
    let out = listing(f);
    // a 32-bit move already clears the upper half
    assert!(out.contains("\tmov eax, edi\n"), "{out}");
    assert!(!out.contains("movzx"), "{out}");
}

#[test]
fn returning_zero_uses_the_xor_idiom() {
    let mut f = Function::new("nil", vec![], Some(ValueType::U64));
    f.return_value(0);
    let out = listing(f);
    assert!(out.contains("\txor eax, eax\n"), "{out}");
}

#[test]
fn float_argument_already_in_result_register_needs_no_moves() {
    let mut f = Function::new(
        "fid",
        vec![Argument::new("x", ValueType::F32)],
        Some(ValueType::F32),
    );
    let v = f.vxmm();
    f.load_argument(v, 0).unwrap();
    f.return_value(v);
    let out = listing(f);
    assert_eq!(out, "fid:\n\tret\n");
}

#[test]
fn seventh_integer_argument_comes_from_the_stack() {
    let args: Vec<Argument> = (0..7)
        .map(|i| Argument::new(format!("a{i}"), ValueType::U64))
        .collect();
    let mut f = Function::new("stk", args, Some(ValueType::U64));
    let v = f.gp64();
    f.load_argument(v, 6).unwrap();
    f.return_value(v);
    let out = listing(f);
    // return address sits between rsp and the first stack argument
    assert!(out.contains("\tmov rax, qword [rsp + 8]\n"), "{out}");
}

#[test]
fn callee_saved_registers_are_pushed_and_popped() {
    let mut f = Function::new("many", vec![], Some(ValueType::U64));
    let vs: Vec<Reg> = (0..10).map(|_| f.gp64()).collect();
    for (i, &v) in vs.iter().enumerate() {
        f.mov(v, i as i64 + 1).unwrap();
    }
    for &v in &vs[1..] {
        f.add(vs[0], v).unwrap();
    }
    f.return_value(vs[0]);
    let fin = f.finalize(&SYSTEM_V).unwrap();
    assert_eq!(fin.saved_registers, vec![RBX]);
    let out = fin.format(Dialect::Nasm).unwrap();
    assert!(out.contains("\tpush rbx\n"), "{out}");
    assert!(out.contains("\tpop rbx\n"), "{out}");
    assert!(out.find("push rbx").unwrap() < out.find("pop rbx").unwrap());
}

#[test]
fn virtual_conflicting_with_every_candidate_is_spilled() {
    let mut f = Function::new("pressure", vec![], Some(ValueType::U64));
    let v = f.gp64();
    f.mov(v, 1i64).unwrap();
    // touch every allocatable general-purpose register while v is live
    for phys in [
        RAX, RBX, RCX, RDX, RSI, RDI, RBP, R8, R9, R10, R11, R12, R13, R14, R15,
    ] {
        f.mov(phys, 0i64).unwrap();
    }
    f.return_value(v);
    let fin = f.finalize(&SYSTEM_V).unwrap();
    assert_eq!(fin.frame_size, 8);
    let out = fin.format(Dialect::Nasm).unwrap();
    assert!(out.contains("\tsub rsp, 8\n"), "{out}");
    assert!(out.contains("\tadd rsp, 8\n"), "{out}");
    assert!(out.contains("qword [rsp]"), "{out}");
}
