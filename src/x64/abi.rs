//! Calling-convention descriptors.
//!
//! Read-only configuration consumed by finalization: which registers carry
//! arguments and results, which survive a call, stack alignment, and the
//! symbol/listing conventions of the target toolchain. The core never
//! mutates an ABI.

use crate::x64::registers::{
    Reg, MM0, MM1, MM2, MM3, MM4, MM5, MM6, MM7, R10, R11, R12, R13, R14, R15, R8, R9, RAX,
    RBP, RBX, RCX, RDI, RDX, RSI, XMM0, XMM1, XMM10, XMM11, XMM12, XMM13, XMM14, XMM15, XMM2,
    XMM3, XMM4, XMM5, XMM6, XMM7, XMM8, XMM9,
};

/// Symbol and directive conventions of the ABI's native assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiFlavor {
    /// SysV or Windows: plain symbol names, register argument passing.
    Native,
    /// Plan-9 toolchain: middle-dot symbol mangling, stack arguments,
    /// TEXT directives with frame and argument sizes.
    Go,
}

/// An ABI descriptor. The register lists drive both argument binding and
/// the allocator's physical-register priority order.
#[derive(Debug)]
pub struct Abi {
    pub name: &'static str,
    /// Registers an argument may arrive in, in binding order.
    pub argument_registers: &'static [Reg],
    /// Registers the callee must preserve.
    pub callee_save_registers: &'static [Reg],
    /// Registers the callee may clobber freely.
    pub volatile_registers: &'static [Reg],
    /// Integer and pointer results.
    pub result_registers: &'static [Reg],
    pub float_result_register: Reg,
    pub stack_alignment: u32,
    pub red_zone: u32,
    pub pointer_size: u8,
    pub flavor: AbiFlavor,
}

impl Abi {
    /// Physical-register candidates for the allocator, most-preferred
    /// first: volatile registers, then argument registers in reverse
    /// binding order, then callee-saved registers.
    pub fn allocation_order(&self) -> Vec<Reg> {
        let mut order: Vec<Reg> = Vec::new();
        order.extend_from_slice(self.volatile_registers);
        order.extend(self.argument_registers.iter().rev());
        order.extend_from_slice(self.callee_save_registers);
        order
    }

    pub fn is_callee_save(&self, reg: &Reg) -> bool {
        self.callee_save_registers
            .iter()
            .any(|r| r.class.bank() == reg.class.bank() && r.phys() == reg.phys())
    }
}

/// SystemV x86-64 (Linux, BSD, macOS).
pub static SYSTEM_V: Abi = Abi {
    name: "SystemV x86-64 ABI",
    argument_registers: &[
        RDI, RSI, RDX, RCX, R8, R9, XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7,
    ],
    callee_save_registers: &[RBX, RBP, R12, R13, R14, R15],
    volatile_registers: &[
        RAX, R10, R11, MM0, MM1, MM2, MM3, MM4, MM5, MM6, MM7, XMM8, XMM9, XMM10, XMM11,
        XMM12, XMM13, XMM14, XMM15,
    ],
    result_registers: &[RAX, RDX],
    float_result_register: XMM0,
    stack_alignment: 16,
    red_zone: 128,
    pointer_size: 8,
    flavor: AbiFlavor::Native,
};

/// Microsoft x64 (Windows).
pub static MICROSOFT_X64: Abi = Abi {
    name: "Microsoft x64 ABI",
    argument_registers: &[RCX, RDX, R8, R9, XMM0, XMM1, XMM2, XMM3],
    callee_save_registers: &[
        RBX, RSI, RDI, RBP, R12, R13, R14, R15, XMM6, XMM7, XMM8, XMM9, XMM10, XMM11, XMM12,
        XMM13, XMM14, XMM15,
    ],
    volatile_registers: &[RAX, R10, R11, MM0, MM1, MM2, MM3, MM4, MM5, MM6, MM7, XMM4, XMM5],
    result_registers: &[RAX],
    float_result_register: XMM0,
    stack_alignment: 16,
    red_zone: 0,
    pointer_size: 8,
    flavor: AbiFlavor::Native,
};

/// Go assembly (Plan-9 toolchain): every register is caller-saved and all
/// arguments travel on the stack.
pub static GO_ASM: Abi = Abi {
    name: "Go/Asm x86-64 ABI",
    argument_registers: &[],
    callee_save_registers: &[],
    volatile_registers: &[
        RAX, RBX, RCX, RDX, RDI, RSI, RBP, R8, R9, R10, R11, R12, R13, R14, R15, MM0, MM1,
        MM2, MM3, MM4, MM5, MM6, MM7, XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7, XMM8,
        XMM9, XMM10, XMM11, XMM12, XMM13, XMM14, XMM15,
    ],
    result_registers: &[RAX],
    float_result_register: XMM0,
    stack_alignment: 8,
    red_zone: 0,
    pointer_size: 8,
    flavor: AbiFlavor::Go,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x64::registers::RegClass;

    #[test]
    fn sysv_allocation_order_prefers_volatile_gp() {
        let order: Vec<Reg> = SYSTEM_V
            .allocation_order()
            .into_iter()
            .filter(|r| r.class == RegClass::Gp)
            .collect();
        // rax first, argument registers in reverse, callee-save last
        assert_eq!(order[0], RAX);
        assert_eq!(order[3], R9);
        assert_eq!(order[8], RDI);
        assert_eq!(*order.last().unwrap(), R15);
    }

    #[test]
    fn go_abi_has_no_register_arguments() {
        assert!(GO_ASM.argument_registers.is_empty());
        assert!(GO_ASM.callee_save_registers.is_empty());
        assert_eq!(GO_ASM.flavor, AbiFlavor::Go);
    }

    #[test]
    fn callee_save_lookup_ignores_width() {
        use crate::x64::registers::EBX;
        assert!(SYSTEM_V.is_callee_save(&EBX));
        assert!(!SYSTEM_V.is_callee_save(&RAX));
    }
}
