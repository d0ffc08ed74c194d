//! Byte-level encoding tests.
//!
//! Each case builds a function over physical registers, finalizes it for
//! the SysV ABI (which adds nothing but the final RET when no virtual
//! registers are involved), and compares the encoded bytes against
//! hand-assembled expectations.

use x64asm::registers::{BL, EAX, EBX, R12, R13, R8, RAX, RBP, RBX, RCX, RSP, XMM1, XMM2, XMM3};
use x64asm::{dword_ptr, mem, qword_ptr, AsmResult, Extension, Function, IsaTarget, SYSTEM_V};

fn assemble(build: impl FnOnce(&mut Function) -> AsmResult<()>) -> Vec<u8> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut f = Function::new("t", vec![], None);
    build(&mut f).unwrap();
    f.ret();
    f.finalize(&SYSTEM_V).unwrap().encode().unwrap().code
}

#[test]
fn mov_between_registers() {
    assert_eq!(assemble(|f| f.mov(RAX, RBX)), [0x48, 0x89, 0xD8, 0xC3]);
    assert_eq!(assemble(|f| f.mov(EAX, EBX)), [0x89, 0xD8, 0xC3]);
    // REX.B for an extended destination
    assert_eq!(assemble(|f| f.mov(R8, RAX)), [0x49, 0x89, 0xC0, 0xC3]);
}

#[test]
fn immediate_width_is_minimal() {
    // imm8 with sign extension beats the full imm32 form
    assert_eq!(assemble(|f| f.add(RBX, 1)), [0x48, 0x83, 0xC3, 0x01, 0xC3]);
    assert_eq!(
        assemble(|f| f.add(RBX, 0x100)),
        [0x48, 0x81, 0xC3, 0x00, 0x01, 0x00, 0x00, 0xC3]
    );
}

#[test]
fn accumulator_short_form_wins_when_shorter() {
    // add rax, imm32 has a dedicated no-ModRM encoding
    assert_eq!(
        assemble(|f| f.add(RAX, 0x100)),
        [0x48, 0x05, 0x00, 0x01, 0x00, 0x00, 0xC3]
    );
    // but the sign-extended imm8 form is shorter still
    assert_eq!(assemble(|f| f.add(RAX, 1)), [0x48, 0x83, 0xC0, 0x01, 0xC3]);
}

#[test]
fn xchg_with_accumulator_uses_single_byte_form() {
    assert_eq!(assemble(|f| f.xchg(RAX, RBX)), [0x48, 0x93, 0xC3]);
}

#[test]
fn mov_immediate_forms() {
    // values fitting a sign-extended imm32 use C7, not the 10-byte B8+io
    assert_eq!(
        assemble(|f| f.mov(RAX, 42i64)),
        [0x48, 0xC7, 0xC0, 0x2A, 0x00, 0x00, 0x00, 0xC3]
    );
    assert_eq!(
        assemble(|f| f.mov(RAX, 0x1122334455667788i64)),
        [0x48, 0xB8, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0xC3]
    );
}

#[test]
fn displacement_width_is_minimal() {
    assert_eq!(
        assemble(|f| f.mov(RAX, qword_ptr(RBX)?)),
        [0x48, 0x8B, 0x03, 0xC3]
    );
    assert_eq!(
        assemble(|f| f.mov(RAX, qword_ptr(RBX + 8)?)),
        [0x48, 0x8B, 0x43, 0x08, 0xC3]
    );
    assert_eq!(
        assemble(|f| f.mov(RAX, qword_ptr(RBX + 0x100)?)),
        [0x48, 0x8B, 0x83, 0x00, 0x01, 0x00, 0x00, 0xC3]
    );
}

#[test]
fn special_base_registers() {
    // rbp/r13 as base force a disp8 even at displacement zero
    assert_eq!(
        assemble(|f| f.mov(RAX, qword_ptr(RBP)?)),
        [0x48, 0x8B, 0x45, 0x00, 0xC3]
    );
    assert_eq!(
        assemble(|f| f.mov(RAX, qword_ptr(R13)?)),
        [0x49, 0x8B, 0x45, 0x00, 0xC3]
    );
    // rsp/r12 as base force a SIB byte
    assert_eq!(
        assemble(|f| f.mov(RAX, qword_ptr(RSP)?)),
        [0x48, 0x8B, 0x04, 0x24, 0xC3]
    );
    assert_eq!(
        assemble(|f| f.mov(RAX, qword_ptr(R12)?)),
        [0x49, 0x8B, 0x04, 0x24, 0xC3]
    );
}

#[test]
fn scaled_index_addressing() {
    assert_eq!(
        assemble(|f| f.mov(RAX, qword_ptr(RBX + RCX * 4 + 8)?)),
        [0x48, 0x8B, 0x44, 0x8B, 0x08, 0xC3]
    );
    assert_eq!(
        assemble(|f| f.lea(RAX, mem(RBX + RCX * 4)?)),
        [0x48, 0x8D, 0x04, 0x8B, 0xC3]
    );
}

#[test]
fn untyped_memory_immediate_is_a_byte_store() {
    assert_eq!(
        assemble(|f| f.mov(mem(RBX)?, 0)),
        [0xC6, 0x03, 0x00, 0xC3]
    );
    // a width-tagged destination widens the store
    assert_eq!(
        assemble(|f| f.mov(dword_ptr(RBX)?, 0)),
        [0xC7, 0x03, 0x00, 0x00, 0x00, 0x00, 0xC3]
    );
}

#[test]
fn shift_by_immediate() {
    assert_eq!(assemble(|f| f.shl(RAX, 4)), [0x48, 0xC1, 0xE0, 0x04, 0xC3]);
}

#[test]
fn widening_moves() {
    assert_eq!(assemble(|f| f.movsx(RAX, BL)), [0x48, 0x0F, 0xBE, 0xC3, 0xC3]);
    assert_eq!(assemble(|f| f.movzx(RAX, BL)), [0x48, 0x0F, 0xB6, 0xC3, 0xC3]);
}

#[test]
fn zeroing_idiom() {
    assert_eq!(assemble(|f| f.xor(EAX, EAX)), [0x31, 0xC0, 0xC3]);
}

#[test]
fn vex_two_byte_prefix() {
    let mut f = Function::new("t", vec![], None).with_isa(IsaTarget::baseline().with(Extension::Avx));
    f.vxorps(XMM1, XMM2, XMM3).unwrap();
    f.ret();
    let code = f.finalize(&SYSTEM_V).unwrap().encode().unwrap().code;
    assert_eq!(code, [0xC5, 0xE8, 0x57, 0xCB, 0xC3]);
}

#[test]
fn encoding_is_deterministic() {
    let build = |f: &mut Function| -> AsmResult<()> {
        f.mov(RAX, qword_ptr(RBX + RCX * 8 - 32)?)?;
        f.add(RAX, 1)?;
        f.mov(qword_ptr(RBX + RCX * 8 - 32)?, RAX)?;
        Ok(())
    };
    assert_eq!(assemble(build), assemble(build));
}

#[test]
fn constant_pool_is_appended_and_relocated() {
    let mut f = Function::new("t", vec![], None);
    let one = f.constants().float32(1.0);
    f.movss(XMM1, one).unwrap();
    f.ret();
    let encoded = f.finalize(&SYSTEM_V).unwrap().encode().unwrap();
    // movss xmm1, [rip+disp] is 8 bytes, ret 1; the pool starts at the
    // next 16-byte boundary
    assert_eq!(encoded.pool_offset, Some(16));
    assert_eq!(encoded.relocations.len(), 1);
    assert_eq!(&encoded.code[..4], &[0xF3, 0x0F, 0x10, 0x0D]);
    // RIP-relative displacement: pool minus end-of-instruction
    assert_eq!(&encoded.code[4..8], &8i32.to_le_bytes());
    assert_eq!(&encoded.code[16..20], &1.0f32.to_le_bytes());
}

#[test]
fn is4_selector_survives_pool_relocation() {
    let mut f = Function::new("t", vec![], None).with_isa(IsaTarget::baseline().with(Extension::Avx));
    let ones = f.constants().uint32x4(0x3F80_0000);
    f.vblendvps(XMM1, XMM2, ones, XMM3).unwrap();
    f.ret();
    let encoded = f.finalize(&SYSTEM_V).unwrap().encode().unwrap();
    // the disp32 field ends one byte before the trailing is4 selector
    assert_eq!(encoded.relocations.len(), 1);
    assert_eq!(encoded.relocations[0].offset, 5);
    assert_eq!(encoded.pool_offset, Some(16));
    assert_eq!(
        &encoded.code[..11],
        &[0xC4, 0xE3, 0x69, 0x4A, 0x0D, 0x06, 0x00, 0x00, 0x00, 0x30, 0xC3]
    );
}
