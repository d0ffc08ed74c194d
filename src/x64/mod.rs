//! x86-64 target: registers, operands, the instruction catalog, the
//! encoder, and function finalization.
//!
//! The layering runs bottom-up. [`registers`] and [`operand`] define the
//! operand model, [`inst`] and [`encoding`] turn a matched instruction
//! form into bytes, [`catalog`] holds the per-mnemonic form tables and
//! the typed builder methods, and [`function`] ties a stream of
//! instructions to an ABI through liveness analysis and register
//! allocation. [`format`] renders finalized functions as NASM, GAS, or
//! Plan-9 listings.

pub mod abi;
pub mod catalog;
pub(crate) mod encoding;
pub mod format;
pub mod function;
pub mod inst;
pub mod isa;
pub mod literal;
pub mod operand;
pub mod registers;

pub use abi::{Abi, AbiFlavor, GO_ASM, MICROSOFT_X64, SYSTEM_V};
pub use format::Dialect;
pub use function::{Argument, EncodedFunction, FinalizedFunction, Function, ValueType};
pub use inst::Cond;
pub use isa::{Extension, IsaTarget};
pub use literal::{ConstId, Relocation};
pub use operand::{
    byte_ptr, dword_ptr, hword_ptr, mem, oword_ptr, qword_ptr, word_ptr, Mem, Operand, Size,
};
