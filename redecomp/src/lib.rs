//! Lifts x86-64 machine code from a PE export into readable C-like
//! pseudocode: PE parsing and forwarder resolution (re-exported from the
//! sibling `pe` crate), a typed IR (`ir`), a constant database for mapping
//! numeric literals back to symbolic names (`constdb`), an `iced-x86`-backed
//! lifting engine (`lift`), a readability-oriented rewrite pipeline
//! (`passes`), and a pretty-printer (`print`).

mod cancel;
mod engine;
mod error;

pub mod constdb;
pub mod ir;
pub mod lift;
pub mod passes;
pub mod print;

pub use cancel::CancellationToken;
pub use engine::{decompile_bytes, decompile_export, EngineSettings, ForwarderHost, Windows32Host};
pub use error::{EngineError, Result};

pub use pe::{ExportInfo, PeError, PeImage};

#[cfg(test)]
mod test;
