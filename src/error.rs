use thiserror::Error;

#[derive(Debug, Error)]
pub enum SipError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SipError>;
