#[derive(Debug, thiserror::Error)]
pub enum ConstDbError {
    #[error(".winmd blob too short: needed {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error(".winmd blob missing the CLI metadata root signature")]
    BadMetadataSignature,
    #[error("unsupported value__ signature type code {0:#x}")]
    UnsupportedUnderlyingType(u8),
    #[error("stream {0:?} not found in .winmd metadata root")]
    StreamNotFound(&'static str),
}

pub type Result<T> = std::result::Result<T, ConstDbError>;
