use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("bad payload")]
    BadPayload,

    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("frame too large ({0} bytes)")]
    FrameTooLarge(usize),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
