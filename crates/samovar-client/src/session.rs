use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use samovar_proto::{ClientFrame, ServerFrame};
use samovar_types::events::{ChatType, ClientCommand, ServerEvent};

use crate::ClientEvents;

pub struct ClientSession {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    handler: Arc<dyn ClientEvents>,
    connected: Arc<AtomicBool>,
}

impl ClientSession {
    /// Connect and start the background receive loop. Reports
    /// `on_connection_status(true)` before returning.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        handler: Arc<dyn ClientEvents>,
    ) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();

        let connected = Arc::new(AtomicBool::new(true));
        let session = Self {
            writer: Arc::new(Mutex::new(write_half)),
            handler: handler.clone(),
            connected: connected.clone(),
        };

        tokio::spawn(receive_loop(read_half, handler.clone(), connected));

        handler.on_connection_status(true);
        Ok(session)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Shut the socket down locally. The receive loop notices the closed
    /// stream and reports the status change (once).
    pub async fn disconnect(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    // -- outbound operations (fire-and-forget) --

    pub async fn login(&self, username: &str, password: &str) -> bool {
        self.send_frame(&ClientFrame::Login {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await
    }

    pub async fn register(&self, username: &str, password: &str) -> bool {
        self.send_frame(&ClientFrame::Register {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await
    }

    pub async fn send_public_message(&self, text: &str) -> bool {
        self.send_frame(&ClientFrame::Public {
            text: text.to_string(),
        })
        .await
    }

    pub async fn send_private_message(&self, recipient: &str, text: &str) -> bool {
        self.send_frame(&ClientFrame::Private {
            recipient: recipient.to_string(),
            text: text.to_string(),
        })
        .await
    }

    pub async fn send_channel_message(&self, channel_id: &str, text: &str) -> bool {
        self.send_frame(&ClientFrame::ChannelMsg {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
        })
        .await
    }

    /// Upload an attachment: header line, then the raw bytes.
    pub async fn send_file(&self, filename: &str, data: &[u8]) -> bool {
        let header = ClientFrame::File {
            filename: filename.to_string(),
            size: data.len() as u64,
        };
        let mut line = header.encode();
        line.push('\n');
        let mut writer = self.writer.lock().await;
        let wrote = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(data).await?;
            writer.flush().await
        }
        .await;
        wrote.is_ok()
    }

    pub async fn load_messages(&self, chat_type: ChatType, target: Option<&str>) -> bool {
        self.send_command(ClientCommand::LoadMessages {
            chat_type,
            target: target.map(str::to_string),
        })
        .await
    }

    pub async fn create_channel(
        &self,
        name: &str,
        description: &str,
        is_public: bool,
        subscribers_can_write: bool,
    ) -> bool {
        self.send_command(ClientCommand::CreateChannel {
            name: name.to_string(),
            description: description.to_string(),
            is_public,
            subscribers_can_write,
        })
        .await
    }

    pub async fn join_channel(&self, channel_id: &str) -> bool {
        self.send_command(ClientCommand::JoinChannel {
            channel_id: channel_id.to_string(),
        })
        .await
    }

    pub async fn get_channels(&self) -> bool {
        self.send_command(ClientCommand::GetChannels).await
    }

    pub async fn get_users(&self) -> bool {
        self.send_command(ClientCommand::GetUsers).await
    }

    pub async fn delete_message(
        &self,
        message_id: &str,
        chat_type: ChatType,
        target: Option<&str>,
    ) -> bool {
        self.send_command(ClientCommand::DeleteMessage {
            message_id: message_id.to_string(),
            chat_type,
            target: target.map(str::to_string),
        })
        .await
    }

    async fn send_command(&self, cmd: ClientCommand) -> bool {
        self.send_frame(&ClientFrame::Command(cmd)).await
    }

    async fn send_frame(&self, frame: &ClientFrame) -> bool {
        let mut line = frame.encode();
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await.is_ok()
    }
}

async fn receive_loop(
    read_half: OwnedReadHalf,
    handler: Arc<dyn ClientEvents>,
    connected: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let frame = line.trim_end_matches(['\r', '\n']);
        if frame.is_empty() {
            continue;
        }
        match ServerFrame::decode(frame) {
            Ok(frame) => deliver(&handler, frame),
            Err(e) => {
                // Malformed inbound frames are dropped; the connection
                // stays up.
                warn!("undecodable server frame: {e}");
            }
        }
    }
    // Exactly one false transition per session, whether the peer closed
    // or disconnect() shut the socket down locally.
    if connected.swap(false, Ordering::AcqRel) {
        debug!("connection closed");
        handler.on_connection_status(false);
    }
}

fn deliver(handler: &Arc<dyn ClientEvents>, frame: ServerFrame) {
    match frame {
        ServerFrame::Ok => handler.on_auth_result(true),
        ServerFrame::Fail => handler.on_auth_result(false),
        ServerFrame::Public(msg) => handler.on_public_message(msg),
        ServerFrame::Private { peer, message } => handler.on_private_message(peer, message),
        ServerFrame::ChannelMsg {
            channel_id,
            message,
        } => handler.on_channel_message(channel_id, message),
        ServerFrame::File { filename } => handler.on_file_notification(filename),
        ServerFrame::Event(event) => match event {
            ServerEvent::MessagesData {
                chat_type,
                target,
                messages,
            } => handler.on_messages_data(chat_type, target, messages),
            ServerEvent::UsersList { users } => handler.on_users_list(users),
            ServerEvent::ChannelsList { channels } => handler.on_channels_list(channels),
            ServerEvent::ChannelsUpdated => handler.on_channels_updated(),
            ServerEvent::MessageDeleted {
                message_id,
                chat_type,
                target,
            } => handler.on_message_deleted(message_id, chat_type, target),
            ServerEvent::UserOnline { user } => handler.on_presence(user, true),
            ServerEvent::UserOffline { user } => handler.on_presence(user, false),
            ServerEvent::Error { error } => handler.on_error(error),
        },
    }
}
