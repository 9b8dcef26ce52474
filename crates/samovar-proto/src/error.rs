use thiserror::Error;

/// Decode failure. The offending frame is dropped and reported; it never
/// terminates the connection on its own.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown verb in frame {0:?}")]
    UnknownVerb(String),

    #[error("malformed {verb} frame: {reason}")]
    Malformed {
        verb: &'static str,
        reason: &'static str,
    },

    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    pub(crate) fn malformed(verb: &'static str, reason: &'static str) -> Self {
        Self::Malformed { verb, reason }
    }
}
