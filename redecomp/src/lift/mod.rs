//! Translates raw x86-64 bytes into a `FunctionIR`: decoding via `iced-x86`,
//! MSVC prologue recognition, label discovery, per-instruction dispatch and
//! idiom coalescing (`rep movs`/`stos`, zeroing stores, paired vector
//! load/store runs into `memcpy`/`memset`).

mod engine;
mod idioms;
mod options;
mod prologue;
mod registers;

pub use engine::lift_function;
pub use options::{ImportResolver, Options};
