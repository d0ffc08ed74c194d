//! Label, branch, and loop tests, including the end-to-end loop shape:
//! load, add-immediate, store, decrement, conditional back-edge, with a
//! stable physical assignment for every value live across the body.

use x64asm::{dword_ptr, Argument, AsmResult, Dialect, Function, ValueType, SYSTEM_V};

#[test]
fn increment_loop_end_to_end() {
    let mut f = Function::new(
        "incr_all",
        vec![
            Argument::new("ptr", ValueType::Ptr),
            Argument::new("count", ValueType::U64),
        ],
        None,
    );
    let p = f.gp64();
    let n = f.gp64();
    let x = f.gp32();
    f.load_argument(p, 0).unwrap();
    f.load_argument(n, 1).unwrap();
    f.loop_("body", |f, l| -> AsmResult<()> {
        f.mov(x, dword_ptr(p)?)?;
        f.add(x, 1)?;
        f.mov(dword_ptr(p)?, x)?;
        f.sub(n, 1)?;
        f.jne(l.begin);
        Ok(())
    })
    .unwrap();
    f.return_void();

    let fin = f.finalize(&SYSTEM_V).unwrap();
    // arguments stay pinned to their arrival registers, the scratch value
    // takes the first volatile register
    let nasm = fin.format(Dialect::Nasm).unwrap();
    assert_eq!(
        nasm,
        "incr_all:\n\
         body.begin:\n\
         \tmov eax, dword [rdi]\n\
         \tadd eax, 1\n\
         \tmov dword [rdi], eax\n\
         \tsub rsi, 1\n\
         \tjne body.begin\n\
         body.end:\n\
         \tret\n"
    );

    // the back edge is in rel8 reach and encodes short
    let code = fin.encode().unwrap().code;
    assert_eq!(
        code,
        [0x8B, 0x07, 0x83, 0xC0, 0x01, 0x89, 0x07, 0x48, 0x83, 0xEE, 0x01, 0x75, 0xF3, 0xC3]
    );
}

#[test]
fn gas_listing_reverses_operands() {
    let mut f = Function::new(
        "incr",
        vec![Argument::new("ptr", ValueType::Ptr)],
        None,
    );
    let p = f.gp64();
    let x = f.gp32();
    f.load_argument(p, 0).unwrap();
    f.mov(x, dword_ptr(p).unwrap()).unwrap();
    f.add(x, 1).unwrap();
    f.mov(dword_ptr(p).unwrap(), x).unwrap();
    f.return_void();
    let gas = f.finalize(&SYSTEM_V).unwrap().format(Dialect::Gas).unwrap();
    assert!(gas.contains("\tmov (%rdi), %eax\n"), "{gas}");
    assert!(gas.contains("\tadd $1, %eax\n"), "{gas}");
    assert!(gas.contains("\tmov %eax, (%rdi)\n"), "{gas}");
}

#[test]
fn forward_branches_encode_long() {
    let mut f = Function::new("fwd", vec![], None);
    let done = f.label("done").unwrap();
    f.jmp(done);
    f.bind(done).unwrap();
    f.ret();
    let code = f.finalize(&SYSTEM_V).unwrap().encode().unwrap().code;
    assert_eq!(code, [0xE9, 0x00, 0x00, 0x00, 0x00, 0xC3]);
}

#[test]
fn forward_conditional_branch() {
    let mut f = Function::new("fwd", vec![], None);
    let done = f.label("done").unwrap();
    f.je(done);
    f.bind(done).unwrap();
    f.ret();
    let code = f.finalize(&SYSTEM_V).unwrap().encode().unwrap().code;
    assert_eq!(code, [0x0F, 0x84, 0x00, 0x00, 0x00, 0x00, 0xC3]);
}

#[test]
fn label_calls_are_always_rel32() {
    let mut f = Function::new("caller", vec![], None);
    let helper = f.label("helper").unwrap();
    f.call(helper);
    f.ret();
    f.bind(helper).unwrap();
    f.ret();
    let code = f.finalize(&SYSTEM_V).unwrap().encode().unwrap().code;
    assert_eq!(code, [0xE8, 0x01, 0x00, 0x00, 0x00, 0xC3, 0xC3]);
}

#[test]
fn alignment_pads_with_nops() {
    use x64asm::registers::EAX;
    let mut f = Function::new("aligned", vec![], None);
    f.xor(EAX, EAX).unwrap();
    f.align(16).unwrap();
    f.ret();
    let code = f.finalize(&SYSTEM_V).unwrap().encode().unwrap().code;
    assert_eq!(code.len(), 17);
    assert_eq!(&code[..2], &[0x31, 0xC0]);
    assert_eq!(code[16], 0xC3);
}

#[test]
fn nested_scopes_splice_in_order() {
    use x64asm::registers::{EAX, EBX, ECX};
    let mut f = Function::new("scoped", vec![], None);
    f.mov(EAX, 1).unwrap();
    f.scoped(|f| {
        f.mov(EBX, 2)?;
        f.scoped(|f| f.mov(ECX, 3))?;
        f.mov(EBX, 4)
    })
    .unwrap();
    f.mov(EAX, 5).unwrap();
    f.return_void();
    let nasm = f.finalize(&SYSTEM_V).unwrap().format(Dialect::Nasm).unwrap();
    let body: Vec<&str> = nasm.lines().skip(1).collect();
    assert_eq!(
        body,
        [
            "\tmov eax, 1",
            "\tmov ebx, 2",
            "\tmov ecx, 3",
            "\tmov ebx, 4",
            "\tmov eax, 5",
            "\tret",
        ]
    );
}
