//! Target-independent infrastructure.
//!
//! The pieces here know nothing about x86-64 encodings. [`stream`]
//! provides the scoped instruction stream and label arena, [`liveness`]
//! computes live ranges and conflict sets over abstract register keys,
//! [`regalloc`] colors virtual registers against per-bank allocation
//! orders, and [`error`] carries the crate-wide error type.

pub mod error;
pub mod liveness;
pub mod regalloc;
pub mod stream;

pub use error::{AsmError, AsmResult};
pub use stream::LabelId;
