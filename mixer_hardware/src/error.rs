use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("channel disconnected")]
    Disconnected,
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
