use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt collection at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("username {0:?} is already taken")]
    UsernameTaken(String),

    #[error("channel {0:?} already exists")]
    ChannelExists(String),

    #[error("unknown channel {0:?}")]
    UnknownChannel(String),

    #[error("message {0:?} not found")]
    MessageNotFound(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}
