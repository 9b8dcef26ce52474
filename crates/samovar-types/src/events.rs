use serde::{Deserialize, Serialize};

use crate::models::{Channel, PublicMessage, ThreadMessage, UserSummary};

/// Which room a history/delete operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Public,
    Private,
    Channel,
}

/// Typed JSON commands sent from client to server. These ride the same
/// line framing as the colon verbs; any frame starting with `{` is one of
/// these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    LoadMessages {
        chat_type: ChatType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    GetUsers,
    GetChannels,
    CreateChannel {
        name: String,
        description: String,
        is_public: bool,
        subscribers_can_write: bool,
    },
    JoinChannel {
        channel_id: String,
    },
    DeleteMessage {
        message_id: String,
        chat_type: ChatType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
}

/// Typed JSON events sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    MessagesData {
        chat_type: ChatType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        messages: Vec<HistoryEntry>,
    },
    UsersList {
        users: Vec<UserSummary>,
    },
    ChannelsList {
        channels: Vec<Channel>,
    },
    /// Nudge: channel metadata changed, re-request the list.
    ChannelsUpdated,
    MessageDeleted {
        message_id: String,
        chat_type: ChatType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    UserOnline {
        user: String,
    },
    UserOffline {
        user: String,
    },
    Error {
        error: String,
    },
}

/// One record inside a `messages_data` payload. Public-room entries carry
/// `is_admin`; private-thread and channel entries omit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user: String,
    pub message: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    pub id: String,
}

impl From<PublicMessage> for HistoryEntry {
    fn from(m: PublicMessage) -> Self {
        Self {
            user: m.user,
            message: m.message,
            timestamp: m.timestamp,
            is_admin: Some(m.is_admin),
            id: m.id,
        }
    }
}

impl From<ThreadMessage> for HistoryEntry {
    fn from(m: ThreadMessage) -> Self {
        Self {
            user: m.user,
            message: m.message,
            timestamp: m.timestamp,
            is_admin: None,
            id: m.id,
        }
    }
}
