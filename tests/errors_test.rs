//! Error surface tests: construction-time validation, ISA gating, and
//! the scoping errors caught at finalization.

use x64asm::registers::{EBX, RAX, XMM1, XMM2, XMM3};
use x64asm::{mem, Argument, AsmError, Function, ValueType, SYSTEM_V};

#[test]
fn operand_mismatch_names_the_mnemonic_and_operands() {
    let mut f = Function::new("t", vec![], None);
    let err = f.add(RAX, EBX).unwrap_err();
    match err {
        AsmError::NoMatchingForm {
            mnemonic, operands, ..
        } => {
            assert_eq!(mnemonic, "add");
            assert!(operands.contains("rax"), "{operands}");
            assert!(operands.contains("ebx"), "{operands}");
        }
        other => panic!("expected NoMatchingForm, got {other}"),
    }
}

#[test]
fn disabled_extension_is_rejected_at_construction() {
    // the baseline target has no AVX
    let mut f = Function::new("t", vec![], None);
    let err = f.vxorps(XMM1, XMM2, XMM3).unwrap_err();
    match err {
        AsmError::IsaExtensionDisabled {
            mnemonic,
            extension,
        } => {
            assert_eq!(mnemonic, "vxorps");
            assert_eq!(extension, "AVX");
        }
        other => panic!("expected IsaExtensionDisabled, got {other}"),
    }
}

#[test]
fn unbound_label_fails_finalization() {
    let mut f = Function::new("t", vec![], None);
    let missing = f.label("missing").unwrap();
    f.jmp(missing);
    f.ret();
    let err = f.finalize(&SYSTEM_V).unwrap_err();
    assert!(matches!(err, AsmError::UndefinedLabel { .. }), "{err}");
}

#[test]
fn binding_a_label_twice_fails() {
    let mut f = Function::new("t", vec![], None);
    let l = f.label("twice").unwrap();
    f.bind(l).unwrap();
    let err = f.bind(l).unwrap_err();
    assert!(matches!(err, AsmError::DuplicateLabel { .. }), "{err}");
}

#[test]
fn label_names_are_validated() {
    let mut f = Function::new("t", vec![], None);
    assert!(f.label("loop.begin").is_ok());
    assert!(f.label("1bad").is_err());
    assert!(f.label("__reserved").is_err());
    assert!(f.label("trailing.").is_err());
    assert!(f.label("").is_err());
}

#[test]
fn argument_index_out_of_range() {
    let mut f = Function::new("t", vec![Argument::new("x", ValueType::U64)], None);
    let v = f.gp64();
    let err = f.load_argument(v, 1).unwrap_err();
    assert!(matches!(err, AsmError::InvalidOperand { .. }), "{err}");
}

#[test]
fn narrow_destination_for_wide_argument_is_rejected() {
    let mut f = Function::new("t", vec![Argument::new("x", ValueType::U64)], None);
    let v = f.gp32();
    assert!(f.load_argument(v, 0).is_err());
}

#[test]
fn float_argument_requires_a_vector_destination() {
    let mut f = Function::new("t", vec![Argument::new("x", ValueType::F64)], None);
    let v = f.gp64();
    assert!(f.load_argument(v, 0).is_err());
    let x = f.vxmm();
    assert!(f.load_argument(x, 0).is_ok());
}

#[test]
fn invalid_addresses_are_rejected() {
    use x64asm::registers::RSP;
    // rsp can not be an index register
    assert!(mem(RAX + RSP * 2).is_err());
}
