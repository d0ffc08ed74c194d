//! Error types for the assembler pipeline.
//!
//! One taxonomy for the whole crate: operand validation and form dispatch
//! fail at the construction call site, scoping and label problems surface
//! when a region closes or at finalization, and allocation failures carry
//! their own variant so callers can tell a register-pressure problem from a
//! malformed program. Encoder invariant violations are internal defects and
//! panic instead of returning an error.

use thiserror::Error;

/// Errors reported by operand construction, instruction emission, register
/// allocation, and finalization.
#[derive(Error, Debug)]
pub enum AsmError {
    /// Operand value that is not a legal x86-64 encoding target.
    #[error("invalid operand: {reason}")]
    InvalidOperand { reason: String },

    /// No operand-form of the mnemonic accepts the supplied operands.
    #[error("no form of {mnemonic} accepts ({operands}); legal forms: {forms}")]
    NoMatchingForm {
        mnemonic: &'static str,
        operands: String,
        forms: String,
    },

    /// The mnemonic needs an ISA extension absent from the target.
    #[error("{mnemonic} requires {extension}, which the target does not enable")]
    IsaExtensionDisabled {
        mnemonic: &'static str,
        extension: &'static str,
    },

    /// A label was bound twice.
    #[error("label {name:?} is defined more than once")]
    DuplicateLabel { name: String },

    /// A referenced label was never bound.
    #[error("label {name:?} is referenced but never defined")]
    UndefinedLabel { name: String },

    /// A nested scope was closed out of order.
    #[error("unbalanced scope exit: {reason}")]
    UnbalancedScope { reason: String },

    /// Register demand that cannot be satisfied, even after spilling.
    #[error("register allocation failed: {reason}")]
    RegisterAllocation { reason: String },

    /// ABI binding or layout failure.
    #[error("finalization failed: {reason}")]
    Finalization { reason: String },
}

/// Result alias used throughout the crate.
pub type AsmResult<T> = Result<T, AsmError>;
