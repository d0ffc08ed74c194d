//! x64asm - an embedded x86-64 assembler.
//!
//! Host code builds a function by emitting instructions through typed
//! builder methods on [`Function`]. Operands are registers (physical or
//! virtual), memory references built from address arithmetic, and
//! immediates. Finalizing a function against an ABI runs liveness
//! analysis and register allocation over the virtual registers, lowers
//! argument and return pseudos to the calling convention, and yields a
//! [`FinalizedFunction`] that can be encoded to machine code or rendered
//! as a NASM, GAS, or Plan-9 Go listing.
//!
//! # Example
//!
//! ```
//! use x64asm::{Argument, Dialect, Function, ValueType, GO_ASM};
//!
//! # fn main() -> x64asm::AsmResult<()> {
//! let mut f = Function::new(
//!     "answer",
//!     vec![Argument::new("n", ValueType::U64)],
//!     Some(ValueType::U64),
//! );
//! let n = f.gp64();
//! f.load_argument(n, 0)?;
//! f.add(n, 42i32)?;
//! f.return_value(n);
//!
//! let finalized = f.finalize(&GO_ASM)?;
//! let listing = finalized.format(Dialect::Go)?;
//! assert!(listing.contains("TEXT \u{b7}answer(SB)"));
//! # Ok(())
//! # }
//! ```
//!
//! Instruction selection is table driven: each mnemonic carries an
//! ordered list of operand signatures, and the first signature the
//! operands satisfy decides the form. Among a form's encoding recipes
//! the shortest applicable one wins, so `add rax, 1` assembles with the
//! sign-extended imm8 recipe and accumulator short forms are used when
//! they pay off.

pub mod core;
pub mod x64;

pub use crate::core::error::{AsmError, AsmResult};
pub use crate::core::stream::LabelId;
pub use crate::x64::abi::{Abi, AbiFlavor, GO_ASM, MICROSOFT_X64, SYSTEM_V};
pub use crate::x64::format::Dialect;
pub use crate::x64::function::{
    Argument, EncodedFunction, FinalizedFunction, Function, ValueType,
};
pub use crate::x64::inst::Cond;
pub use crate::x64::isa::{Extension, IsaTarget};
pub use crate::x64::literal::{ConstId, Relocation};
pub use crate::x64::operand::{
    byte_ptr, dword_ptr, hword_ptr, mem, oword_ptr, qword_ptr, word_ptr, Mem, Operand, Size,
};
pub use crate::x64::registers;
