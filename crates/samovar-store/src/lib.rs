//! Persistent store for the five chat collections.
//!
//! Every collection lives in one JSON file under the data directory and is
//! rewritten whole after each mutation. That caps throughput but keeps the
//! on-disk layout trivially inspectable; it is a deliberate trade-off, not
//! a performance target. A write failure is surfaced as [`StorageError`]
//! and the in-memory mutation is kept (at-most-once durability).

pub mod blobs;
mod error;

pub use error::StorageError;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use samovar_types::models::{Channel, PublicMessage, ThreadMessage, UserRecord};

const USERS_FILE: &str = "users.json";
const MESSAGES_FILE: &str = "messages.json";
const PRIVATE_FILE: &str = "private_messages.json";
const CHANNELS_FILE: &str = "channels.json";
const CHANNEL_MSGS_FILE: &str = "channel_messages.json";

#[derive(Default)]
struct Collections {
    users: HashMap<String, UserRecord>,
    messages: Vec<PublicMessage>,
    private: HashMap<String, Vec<ThreadMessage>>,
    channels: HashMap<String, Channel>,
    channel_msgs: HashMap<String, Vec<ThreadMessage>>,
}

pub struct Store {
    dir: PathBuf,
    state: Mutex<Collections>,
}

impl Store {
    /// Load all five collections from `dir`, defaulting each to empty when
    /// its file does not exist yet.
    pub fn load(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|source| StorageError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let state = Collections {
            users: read_collection(&dir.join(USERS_FILE))?,
            messages: read_collection(&dir.join(MESSAGES_FILE))?,
            private: read_collection(&dir.join(PRIVATE_FILE))?,
            channels: read_collection(&dir.join(CHANNELS_FILE))?,
            channel_msgs: read_collection(&dir.join(CHANNEL_MSGS_FILE))?,
        };

        info!("store loaded from {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut Collections) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut state = self.state.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&mut state)
    }

    // -- Users --

    /// Insert a new user. `password_hash` is the already-salted digest;
    /// the store never sees plaintext passwords.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<(), StorageError> {
        self.with_state(|state| {
            if state.users.contains_key(username) {
                return Err(StorageError::UsernameTaken(username.to_string()));
            }
            state.users.insert(
                username.to_string(),
                UserRecord {
                    password: password_hash.to_string(),
                    is_admin: false,
                },
            );
            write_collection(&self.dir.join(USERS_FILE), &state.users)
        })
    }

    pub fn user(&self, username: &str) -> Result<Option<UserRecord>, StorageError> {
        self.with_state(|state| Ok(state.users.get(username).cloned()))
    }

    pub fn is_admin(&self, username: &str) -> Result<bool, StorageError> {
        self.with_state(|state| Ok(state.users.get(username).is_some_and(|u| u.is_admin)))
    }

    /// All registered usernames with their admin flag, sorted by name.
    pub fn users(&self) -> Result<Vec<(String, bool)>, StorageError> {
        self.with_state(|state| {
            let mut out: Vec<_> = state
                .users
                .iter()
                .map(|(name, rec)| (name.clone(), rec.is_admin))
                .collect();
            out.sort();
            Ok(out)
        })
    }

    // -- Public messages --

    pub fn append_public(&self, msg: PublicMessage) -> Result<(), StorageError> {
        self.with_state(|state| {
            state.messages.push(msg);
            write_collection(&self.dir.join(MESSAGES_FILE), &state.messages)
        })
    }

    pub fn public_messages(&self) -> Result<Vec<PublicMessage>, StorageError> {
        self.with_state(|state| Ok(state.messages.clone()))
    }

    /// Remove a public message by id, returning the removed record.
    pub fn delete_public(&self, id: &str) -> Result<PublicMessage, StorageError> {
        self.with_state(|state| {
            let idx = state
                .messages
                .iter()
                .position(|m| m.id == id)
                .ok_or_else(|| StorageError::MessageNotFound(id.to_string()))?;
            let removed = state.messages.remove(idx);
            write_collection(&self.dir.join(MESSAGES_FILE), &state.messages)?;
            Ok(removed)
        })
    }

    // -- Private threads --

    /// Append to a private thread, creating the thread lazily on first use.
    pub fn append_private(&self, thread_key: &str, msg: ThreadMessage) -> Result<(), StorageError> {
        self.with_state(|state| {
            state
                .private
                .entry(thread_key.to_string())
                .or_default()
                .push(msg);
            write_collection(&self.dir.join(PRIVATE_FILE), &state.private)
        })
    }

    pub fn private_thread(&self, thread_key: &str) -> Result<Vec<ThreadMessage>, StorageError> {
        self.with_state(|state| Ok(state.private.get(thread_key).cloned().unwrap_or_default()))
    }

    pub fn delete_private(&self, thread_key: &str, id: &str) -> Result<ThreadMessage, StorageError> {
        self.with_state(|state| {
            let thread = state
                .private
                .get_mut(thread_key)
                .ok_or_else(|| StorageError::MessageNotFound(id.to_string()))?;
            let idx = thread
                .iter()
                .position(|m| m.id == id)
                .ok_or_else(|| StorageError::MessageNotFound(id.to_string()))?;
            let removed = thread.remove(idx);
            write_collection(&self.dir.join(PRIVATE_FILE), &state.private)?;
            Ok(removed)
        })
    }

    // -- Channels --

    /// Insert a channel. The owner is always kept in the subscriber set.
    pub fn create_channel(&self, mut channel: Channel) -> Result<Channel, StorageError> {
        self.with_state(|state| {
            if state.channels.contains_key(&channel.id) {
                return Err(StorageError::ChannelExists(channel.id.clone()));
            }
            if !channel.is_subscriber(&channel.owner) {
                channel.subscribers.push(channel.owner.clone());
            }
            state.channels.insert(channel.id.clone(), channel.clone());
            write_collection(&self.dir.join(CHANNELS_FILE), &state.channels)?;
            Ok(channel)
        })
    }

    /// Add a subscriber. Idempotent: returns `false` when the user was
    /// already subscribed (and skips the disk write).
    pub fn join_channel(&self, channel_id: &str, username: &str) -> Result<bool, StorageError> {
        self.with_state(|state| {
            let channel = state
                .channels
                .get_mut(channel_id)
                .ok_or_else(|| StorageError::UnknownChannel(channel_id.to_string()))?;
            if channel.is_subscriber(username) {
                return Ok(false);
            }
            channel.subscribers.push(username.to_string());
            write_collection(&self.dir.join(CHANNELS_FILE), &state.channels)?;
            Ok(true)
        })
    }

    pub fn channel(&self, channel_id: &str) -> Result<Option<Channel>, StorageError> {
        self.with_state(|state| Ok(state.channels.get(channel_id).cloned()))
    }

    pub fn channels(&self) -> Result<Vec<Channel>, StorageError> {
        self.with_state(|state| {
            let mut out: Vec<_> = state.channels.values().cloned().collect();
            out.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
            Ok(out)
        })
    }

    // -- Channel messages --

    pub fn append_channel_message(
        &self,
        channel_id: &str,
        msg: ThreadMessage,
    ) -> Result<(), StorageError> {
        self.with_state(|state| {
            if !state.channels.contains_key(channel_id) {
                return Err(StorageError::UnknownChannel(channel_id.to_string()));
            }
            state
                .channel_msgs
                .entry(channel_id.to_string())
                .or_default()
                .push(msg);
            write_collection(&self.dir.join(CHANNEL_MSGS_FILE), &state.channel_msgs)
        })
    }

    pub fn channel_messages(&self, channel_id: &str) -> Result<Vec<ThreadMessage>, StorageError> {
        self.with_state(|state| {
            Ok(state
                .channel_msgs
                .get(channel_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    pub fn delete_channel_message(
        &self,
        channel_id: &str,
        id: &str,
    ) -> Result<ThreadMessage, StorageError> {
        self.with_state(|state| {
            let msgs = state
                .channel_msgs
                .get_mut(channel_id)
                .ok_or_else(|| StorageError::MessageNotFound(id.to_string()))?;
            let idx = msgs
                .iter()
                .position(|m| m.id == id)
                .ok_or_else(|| StorageError::MessageNotFound(id.to_string()))?;
            let removed = msgs.remove(idx);
            write_collection(&self.dir.join(CHANNEL_MSGS_FILE), &state.channel_msgs)?;
            Ok(removed)
        })
    }
}

fn read_collection<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StorageError> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).map_err(|source| StorageError::Corrupt {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(source) => Err(StorageError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_collection<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| StorageError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}
