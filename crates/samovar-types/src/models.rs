use serde::{Deserialize, Serialize};

/// Stored user record, keyed by username in `users.json`.
/// The password field holds a PHC-format argon2 hash, never plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// A message in the public room. Persisted as an array in `messages.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicMessage {
    pub user: String,
    pub message: String,
    pub timestamp: String,
    #[serde(default)]
    pub is_admin: bool,
    pub id: String,
}

/// A message inside a private thread or a channel. Same shape on the wire
/// and on disk, so one type covers both collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub user: String,
    pub message: String,
    pub timestamp: String,
    pub id: String,
}

/// Channel metadata, keyed by id in `channels.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub created: String,
    /// Set semantics: no duplicates, always contains the owner.
    pub subscribers: Vec<String>,
    pub is_public: bool,
    pub subscribers_can_write: bool,
}

impl Channel {
    pub fn is_subscriber(&self, username: &str) -> bool {
        self.subscribers.iter().any(|s| s == username)
    }

    pub fn can_write(&self, username: &str) -> bool {
        self.is_subscriber(username) && (self.subscribers_can_write || self.owner == username)
    }
}

/// Entry in a `users_list` event. The list carries connected users only,
/// so `online` is informational for clients that cache entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub username: String,
    pub is_admin: bool,
    pub online: bool,
}

/// Canonical key for a private conversation: both participants see the
/// same thread regardless of who writes first.
pub fn thread_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}
