//! Wire codec for the samovar chat protocol.
//!
//! Frames are UTF-8 lines terminated by `\n`. Two families share the
//! framing:
//!
//!   * colon-verb lines (`LOGIN:user:pass`, `MSG:text`, ...) where the
//!     final field may contain colons, so splits use a bounded `splitn`;
//!   * typed JSON messages, any line whose first byte is `{`.
//!
//! A `FILE:filename:size` line is followed by exactly `size` raw bytes on
//! the stream; reading that body is the transport's job, not the codec's.

mod error;
mod frames;

pub use error::ProtocolError;
pub use frames::{ClientFrame, ServerFrame};
