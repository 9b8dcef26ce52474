//! Client-side session: owns the socket, runs one background receive
//! task, and turns inbound frames into typed callbacks for a UI layer.
//!
//! All send methods are fire-and-forget: the returned `bool` only says the
//! local write succeeded. Acknowledgement, if any, arrives later as an
//! event through the receive loop.

mod events;
mod session;

pub use events::ClientEvents;
pub use session::ClientSession;
