use thiserror::Error;

/// Failure modes surfaced while parsing a PE image or resolving an export.
///
/// This is the crate-local error type; callers that fold PE parsing into a
/// larger pipeline convert it with `#[from]` rather than matching on it
/// directly (see `redecomp::EngineError`).
#[derive(Debug, Error)]
pub enum PeError {
    #[error("not a valid PE image: {reason}")]
    BadImageFormat { reason: &'static str },

    #[error("export \"{0}\" not found")]
    ExportNotFound(String),

    #[error("RVA {0:#x} could not be translated to a file offset")]
    RvaUnmapped(u32),

    #[error("RVA 0 is not a valid address")]
    InvalidRva,

    #[error("forwarder target \"{0}\" uses an unsupported ordinal-only form")]
    ForwarderUnsupported(String),

    #[error("truncated image: expected {needed} bytes at offset {offset}, found {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

pub type Result<T> = std::result::Result<T, PeError>;
