use thiserror::Error;

/// All errors produced by voxrelay-core.
#[derive(Debug, Error)]
pub enum VoxrelayError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("transport is already connected")]
    AlreadyConnected,

    #[error("device is already paired, QR channel unavailable")]
    AlreadyPaired,

    #[error("invalid recipient {input:?}: {reason}")]
    InvalidRecipient { input: String, reason: String },

    #[error("media download failed: {0}")]
    MediaDownload(String),

    #[error("pairing failed: {0}")]
    Pairing(String),

    #[error("unsupported database dialect: {0}")]
    UnsupportedDialect(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("device secret error: {0}")]
    DeviceSecret(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VoxrelayError>;
