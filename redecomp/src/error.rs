use crate::constdb::ConstDbError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Pe(#[from] pe::PeError),
    #[error(transparent)]
    ConstDb(#[from] ConstDbError),
    #[error("forwarder chain exceeded its hop limit or revisited a (module, name) pair")]
    ForwarderCycle,
    #[error("no bytes available to decode: export lands at the end of its section")]
    NoFunctionBytes,
    #[error("decoder could not make progress at IP {ip:#x}")]
    DecodeError { ip: u64 },
    #[error("lifting job was cancelled")]
    Cancelled,
    #[error("failed to read forwarded module: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
