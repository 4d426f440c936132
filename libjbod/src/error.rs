use thiserror::Error;

use crate::opcode::Command;

/// Coarse classification of a [`JbodError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad arguments, rejected before anything is touched.
    Validation,
    /// The call is not allowed in the current lifecycle state.
    State,
    /// The connection failed or the peer sent something unreadable.
    Transport,
    /// The server answered with a nonzero return code.
    Protocol,
}

#[derive(Debug, Error)]
pub enum JbodError {
    #[error("cache capacity {0} is outside {min}..={max}", min = crate::cache::MIN_ENTRIES, max = crate::cache::MAX_ENTRIES)]
    InvalidCacheCapacity(usize),

    #[error("disk {disk} block {block} is outside the array")]
    BlockOutOfRange { disk: u32, block: u32 },

    #[error("transfer of {0} bytes exceeds the {max} byte limit", max = crate::geometry::MAX_IO_SIZE)]
    TransferTooLarge(usize),

    #[error("range {addr}+{len} runs past the end of the volume")]
    AddressOutOfRange { addr: u32, len: usize },

    #[error("write-block request carries no payload")]
    MissingPayload,

    #[error("block ({disk}, {block}) is already cached")]
    AlreadyCached { disk: u32, block: u32 },

    #[error("cache is full and has no entry to evict")]
    NoEvictableEntry,

    #[error("volume is already mounted")]
    AlreadyMounted,

    #[error("volume is not mounted")]
    NotMounted,

    #[error("cache has already been created")]
    CacheAlreadyCreated,

    #[error("cache has not been created")]
    CacheNotCreated,

    #[error("not connected to a JBOD server")]
    NotConnected,

    #[error("could not connect to {target}")]
    ConnectFailed {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("server rejected {command:?} with return code {code}")]
    Rejected { command: Option<Command>, code: u16 },
}

impl JbodError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCacheCapacity(_)
            | Self::BlockOutOfRange { .. }
            | Self::TransferTooLarge(_)
            | Self::AddressOutOfRange { .. }
            | Self::MissingPayload
            | Self::AlreadyCached { .. } => ErrorKind::Validation,
            Self::AlreadyMounted
            | Self::NotMounted
            | Self::CacheAlreadyCreated
            | Self::CacheNotCreated
            | Self::NoEvictableEntry => ErrorKind::State,
            Self::NotConnected
            | Self::ConnectFailed { .. }
            | Self::ConnectionClosed
            | Self::MalformedFrame(_)
            | Self::Io(_) => ErrorKind::Transport,
            Self::Rejected { .. } => ErrorKind::Protocol,
        }
    }
}

pub type Result<T> = std::result::Result<T, JbodError>;
