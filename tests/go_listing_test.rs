//! Plan-9 Go assembly listing tests.
//!
//! The Go ABI passes every argument on the stack and treats all registers
//! as caller-saved, so these tests double as allocator tests: physical
//! assignments are taken from the fixed preference order and must be
//! reproducible down to the register names in the listing.

use x64asm::registers::RAX;
use x64asm::{mem, Argument, Dialect, Function, ValueType, GO_ASM};

#[test]
fn constant_return_golden() {
    let mut f = Function::new("answer", vec![], Some(ValueType::U64));
    let v = f.gp64();
    f.mov(v, 42i64).unwrap();
    f.return_value(v);
    let listing = f.finalize(&GO_ASM).unwrap().format(Dialect::Go).unwrap();
    assert_eq!(
        listing,
        "// func answer() uint64\n\
         TEXT \u{b7}answer(SB),4,$0-8\n\
         \tMOVQ $42, AX\n\
         \tMOVQ AX, ret+0(FP)\n\
         \tRET\n"
    );
}

#[test]
fn argument_increment_golden() {
    let mut f = Function::new(
        "inc",
        vec![Argument::new("n", ValueType::U64)],
        Some(ValueType::U64),
    );
    let v = f.gp64();
    f.load_argument(v, 0).unwrap();
    f.add(v, 1).unwrap();
    f.return_value(v);
    let listing = f.finalize(&GO_ASM).unwrap().format(Dialect::Go).unwrap();
    assert_eq!(
        listing,
        "// func inc(n uint64) uint64\n\
         TEXT \u{b7}inc(SB),4,$0-16\n\
         \tMOVQ n+0(FP), AX\n\
         \tADDQ $1, AX\n\
         \tMOVQ AX, ret+8(FP)\n\
         \tRET\n"
    );
}

#[test]
fn virtual_avoids_conflicting_physical() {
    let mut f = Function::new("pick", vec![], Some(ValueType::U64));
    let v = f.gp64();
    f.mov(v, 42i64).unwrap();
    // rax is written while v is live, so v lands in the next candidate
    f.mov(RAX, 7i64).unwrap();
    f.return_value(v);
    let listing = f.finalize(&GO_ASM).unwrap().format(Dialect::Go).unwrap();
    assert!(listing.contains("\tMOVQ $42, BX\n"), "{listing}");
    assert!(listing.contains("\tMOVQ BX, ret+0(FP)\n"), "{listing}");
}

#[test]
fn overlapping_virtuals_get_distinct_registers() {
    let mut f = Function::new("sum2", vec![], Some(ValueType::U64));
    let a = f.gp64();
    let b = f.gp64();
    f.mov(a, 1i64).unwrap();
    f.mov(b, 2i64).unwrap();
    f.add(a, b).unwrap();
    f.return_value(a);
    let listing = f.finalize(&GO_ASM).unwrap().format(Dialect::Go).unwrap();
    assert!(listing.contains("\tMOVQ $1, AX\n"), "{listing}");
    assert!(listing.contains("\tMOVQ $2, BX\n"), "{listing}");
    assert!(listing.contains("\tADDQ BX, AX\n"), "{listing}");
}

#[test]
fn cpuid_clobbers_push_virtual_to_rdi() {
    let mut f = Function::new("brand", vec![], Some(ValueType::U64));
    let v = f.gp64();
    f.mov(v, 7i64).unwrap();
    // implicit writes of eax/ebx/ecx/edx conflict with v
    f.cpuid().unwrap();
    f.return_value(v);
    let listing = f.finalize(&GO_ASM).unwrap().format(Dialect::Go).unwrap();
    assert!(listing.contains("\tMOVQ $7, DI\n"), "{listing}");
    assert!(listing.contains("\tCPUID\n"), "{listing}");
    assert!(listing.contains("\tMOVQ DI, ret+0(FP)\n"), "{listing}");
}

#[test]
fn untyped_store_through_pointer_is_a_byte_store() {
    let mut f = Function::new("clear", vec![Argument::new("p", ValueType::Ptr)], None);
    let p = f.gp64();
    f.load_argument(p, 0).unwrap();
    f.mov(mem(p).unwrap(), 0).unwrap();
    f.return_void();
    let listing = f.finalize(&GO_ASM).unwrap().format(Dialect::Go).unwrap();
    assert!(listing.contains("// func clear(p uintptr)\n"), "{listing}");
    assert!(listing.contains("TEXT \u{b7}clear(SB),4,$0-8\n"), "{listing}");
    assert!(listing.contains("\tMOVB $0, (AX)\n"), "{listing}");
}

#[test]
fn narrow_argument_widens_by_signedness() {
    let mut f = Function::new(
        "widen",
        vec![Argument::new("x", ValueType::S8)],
        Some(ValueType::S64),
    );
    let v = f.gp64();
    f.load_argument(v, 0).unwrap();
    f.return_value(v);
    let listing = f.finalize(&GO_ASM).unwrap().format(Dialect::Go).unwrap();
    assert!(listing.contains("\tMOVBQSX x+0(FP), AX\n"), "{listing}");
}

#[test]
fn loop_labels_are_mangled() {
    let mut f = Function::new("spin", vec![Argument::new("n", ValueType::U64)], None);
    let n = f.gp64();
    f.load_argument(n, 0).unwrap();
    f.loop_("spin", |f, l| {
        f.sub(n, 1)?;
        f.jne(l.begin);
        Ok(())
    })
    .unwrap();
    f.return_void();
    let listing = f.finalize(&GO_ASM).unwrap().format(Dialect::Go).unwrap();
    assert!(listing.contains("spin_begin:\n"), "{listing}");
    assert!(listing.contains("\tSUBQ $1, AX\n"), "{listing}");
    assert!(listing.contains("\tJNE spin_begin\n"), "{listing}");
}
