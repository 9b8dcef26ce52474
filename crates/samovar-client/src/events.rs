use samovar_types::events::{ChatType, HistoryEntry};
use samovar_types::models::{Channel, PublicMessage, ThreadMessage, UserSummary};

/// Callbacks invoked by the receive loop. A UI layer implements the ones
/// it cares about; everything defaults to a no-op.
///
/// Callbacks run on the receive task, so implementations should hand work
/// off (e.g. into a channel) rather than block.
pub trait ClientEvents: Send + Sync + 'static {
    /// Connection came up or went down. The `false` transition is
    /// reported exactly once per session.
    fn on_connection_status(&self, _connected: bool) {}

    /// `OK`/`FAIL` from the server, answering the most recent LOGIN or
    /// REGISTER this client sent.
    fn on_auth_result(&self, _ok: bool) {}

    fn on_public_message(&self, _msg: PublicMessage) {}

    /// `peer` is the other participant of the thread the message belongs to.
    fn on_private_message(&self, _peer: String, _msg: ThreadMessage) {}

    fn on_channel_message(&self, _channel_id: String, _msg: ThreadMessage) {}

    /// An attachment finished uploading somewhere on the server.
    fn on_file_notification(&self, _filename: String) {}

    fn on_messages_data(
        &self,
        _chat_type: ChatType,
        _target: Option<String>,
        _messages: Vec<HistoryEntry>,
    ) {
    }

    fn on_users_list(&self, _users: Vec<UserSummary>) {}

    fn on_channels_list(&self, _channels: Vec<Channel>) {}

    /// Channel metadata changed server-side; re-request the list.
    fn on_channels_updated(&self) {}

    fn on_message_deleted(
        &self,
        _message_id: String,
        _chat_type: ChatType,
        _target: Option<String>,
    ) {
    }

    fn on_presence(&self, _user: String, _online: bool) {}

    fn on_error(&self, _error: String) {}
}
