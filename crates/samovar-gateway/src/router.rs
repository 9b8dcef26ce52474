//! Routing: every decoded frame from an authenticated session lands here.
//!
//! Each handler validates the operation, mutates the store, computes the
//! fan-out set and hands encoded frames to the registry. Handler failures
//! are reported back to the sender as an `error` event; they never
//! terminate the connection. A store write failure is reported the same
//! way while the in-memory mutation is kept.

use tracing::{info, warn};
use uuid::Uuid;

use samovar_proto::{ClientFrame, ServerFrame};
use samovar_store::StorageError;
use samovar_types::events::{ChatType, ClientCommand, ServerEvent};
use samovar_types::ids::{next_message_id, now_timestamp};
use samovar_types::models::{Channel, PublicMessage, ThreadMessage, UserSummary, thread_key};

use crate::Context;

/// Dispatch one authenticated frame. `FILE` frames are handled separately
/// by [`handle_file`] because their body is read off the stream first.
pub async fn dispatch(ctx: &Context, sender: &str, frame: ClientFrame) {
    match frame {
        ClientFrame::Public { text } => handle_public(ctx, sender, text).await,
        ClientFrame::Private { recipient, text } => {
            handle_private(ctx, sender, &recipient, text).await
        }
        ClientFrame::ChannelMsg { channel_id, text } => {
            handle_channel_msg(ctx, sender, &channel_id, text).await
        }
        ClientFrame::Command(cmd) => handle_command(ctx, sender, cmd).await,
        ClientFrame::Login { .. } | ClientFrame::Register { .. } => {
            send_error(ctx, sender, "already authenticated").await;
        }
        ClientFrame::File { .. } => {
            // The connection handler consumes FILE frames before dispatch.
            warn!("FILE frame reached the router for {sender}");
        }
    }
}

async fn handle_public(ctx: &Context, sender: &str, text: String) {
    let is_admin = ctx.store.is_admin(sender).unwrap_or(false);
    let msg = PublicMessage {
        user: sender.to_string(),
        message: text,
        timestamp: now_timestamp(),
        is_admin,
        id: next_message_id(),
    };
    if let Err(e) = ctx.store.append_public(msg.clone()) {
        report_storage(ctx, sender, &e).await;
    }
    ctx.registry.broadcast(ServerFrame::Public(msg), None).await;
}

async fn handle_private(ctx: &Context, sender: &str, recipient: &str, text: String) {
    let msg = ThreadMessage {
        user: sender.to_string(),
        message: text,
        timestamp: now_timestamp(),
        id: next_message_id(),
    };
    let key = thread_key(sender, recipient);
    if let Err(e) = ctx.store.append_private(&key, msg.clone()) {
        report_storage(ctx, sender, &e).await;
    }
    // Echo to the sender, deliver live to the recipient if registered.
    // An offline recipient still gets the message via load_messages later.
    ctx.registry
        .send_to_user(
            sender,
            ServerFrame::Private {
                peer: recipient.to_string(),
                message: msg.clone(),
            },
        )
        .await;
    if recipient != sender {
        ctx.registry
            .send_to_user(
                recipient,
                ServerFrame::Private {
                    peer: sender.to_string(),
                    message: msg,
                },
            )
            .await;
    }
}

async fn handle_channel_msg(ctx: &Context, sender: &str, channel_id: &str, text: String) {
    let channel = match ctx.store.channel(channel_id) {
        Ok(Some(channel)) => channel,
        Ok(None) => {
            send_error(ctx, sender, "unknown channel").await;
            return;
        }
        Err(e) => {
            report_storage(ctx, sender, &e).await;
            return;
        }
    };
    if !channel.can_write(sender) {
        send_error(ctx, sender, "you cannot write to this channel").await;
        return;
    }
    let msg = ThreadMessage {
        user: sender.to_string(),
        message: text,
        timestamp: now_timestamp(),
        id: next_message_id(),
    };
    if let Err(e) = ctx.store.append_channel_message(channel_id, msg.clone()) {
        report_storage(ctx, sender, &e).await;
    }
    ctx.registry
        .send_to_names(
            &channel.subscribers,
            ServerFrame::ChannelMsg {
                channel_id: channel_id.to_string(),
                message: msg,
            },
        )
        .await;
}

/// Store an uploaded attachment and notify everyone.
pub async fn handle_file(ctx: &Context, sender: &str, filename: &str, data: &[u8]) {
    match ctx.blobs.save_attachment(filename, data).await {
        Ok(path) => {
            info!("{sender} uploaded {} ({} bytes)", path.display(), data.len());
            ctx.registry
                .broadcast(
                    ServerFrame::File {
                        filename: filename.to_string(),
                    },
                    None,
                )
                .await;
        }
        Err(e) => report_storage(ctx, sender, &e).await,
    }
}

async fn handle_command(ctx: &Context, sender: &str, cmd: ClientCommand) {
    match cmd {
        ClientCommand::LoadMessages { chat_type, target } => {
            handle_load_messages(ctx, sender, chat_type, target).await
        }
        ClientCommand::GetUsers => handle_get_users(ctx, sender).await,
        ClientCommand::GetChannels => handle_get_channels(ctx, sender).await,
        ClientCommand::CreateChannel {
            name,
            description,
            is_public,
            subscribers_can_write,
        } => {
            handle_create_channel(ctx, sender, name, description, is_public, subscribers_can_write)
                .await
        }
        ClientCommand::JoinChannel { channel_id } => {
            handle_join_channel(ctx, sender, &channel_id).await
        }
        ClientCommand::DeleteMessage {
            message_id,
            chat_type,
            target,
        } => handle_delete_message(ctx, sender, &message_id, chat_type, target).await,
    }
}

async fn handle_load_messages(
    ctx: &Context,
    sender: &str,
    chat_type: ChatType,
    target: Option<String>,
) {
    let messages = match chat_type {
        ChatType::Public => match ctx.store.public_messages() {
            Ok(msgs) => msgs.into_iter().map(Into::into).collect(),
            Err(e) => return report_storage(ctx, sender, &e).await,
        },
        ChatType::Private => {
            let Some(peer) = target.as_deref() else {
                return send_error(ctx, sender, "private history needs a target user").await;
            };
            match ctx.store.private_thread(&thread_key(sender, peer)) {
                Ok(msgs) => msgs.into_iter().map(Into::into).collect(),
                Err(e) => return report_storage(ctx, sender, &e).await,
            }
        }
        ChatType::Channel => {
            let Some(channel_id) = target.as_deref() else {
                return send_error(ctx, sender, "channel history needs a channel id").await;
            };
            match ctx.store.channel(channel_id) {
                Ok(Some(channel)) if channel.is_public || channel.is_subscriber(sender) => {
                    match ctx.store.channel_messages(channel_id) {
                        Ok(msgs) => msgs.into_iter().map(Into::into).collect(),
                        Err(e) => return report_storage(ctx, sender, &e).await,
                    }
                }
                Ok(Some(_)) => return send_error(ctx, sender, "channel is private").await,
                Ok(None) => return send_error(ctx, sender, "unknown channel").await,
                Err(e) => return report_storage(ctx, sender, &e).await,
            }
        }
    };
    ctx.registry
        .send_to_user(
            sender,
            ServerFrame::Event(ServerEvent::MessagesData {
                chat_type,
                target,
                messages,
            }),
        )
        .await;
}

async fn handle_get_users(ctx: &Context, sender: &str) {
    let users = match ctx.store.users() {
        Ok(users) => users,
        Err(e) => return report_storage(ctx, sender, &e).await,
    };
    let online = ctx.registry.online_users().await;
    // Only live sessions are listed; a user who disconnects is absent
    // from the next snapshot.
    let users = users
        .into_iter()
        .filter(|(username, _)| online.contains(username))
        .map(|(username, is_admin)| UserSummary {
            username,
            is_admin,
            online: true,
        })
        .collect();
    ctx.registry
        .send_to_user(sender, ServerFrame::Event(ServerEvent::UsersList { users }))
        .await;
}

async fn handle_get_channels(ctx: &Context, sender: &str) {
    let channels = match ctx.store.channels() {
        Ok(channels) => channels,
        Err(e) => return report_storage(ctx, sender, &e).await,
    };
    // Private channels are only listed to their subscribers.
    let channels = channels
        .into_iter()
        .filter(|c| c.is_public || c.is_subscriber(sender))
        .collect();
    ctx.registry
        .send_to_user(
            sender,
            ServerFrame::Event(ServerEvent::ChannelsList { channels }),
        )
        .await;
}

async fn handle_create_channel(
    ctx: &Context,
    sender: &str,
    name: String,
    description: String,
    is_public: bool,
    subscribers_can_write: bool,
) {
    if name.trim().is_empty() {
        return send_error(ctx, sender, "channel name cannot be empty").await;
    }
    let channel = Channel {
        id: Uuid::new_v4().to_string(),
        name,
        description,
        owner: sender.to_string(),
        created: now_timestamp(),
        subscribers: vec![sender.to_string()],
        is_public,
        subscribers_can_write,
    };
    match ctx.store.create_channel(channel) {
        Ok(created) => {
            info!("{sender} created channel {} ({})", created.name, created.id);
            ctx.registry
                .broadcast(ServerFrame::Event(ServerEvent::ChannelsUpdated), None)
                .await;
        }
        Err(e) => report_storage(ctx, sender, &e).await,
    }
}

async fn handle_join_channel(ctx: &Context, sender: &str, channel_id: &str) {
    match ctx.store.channel(channel_id) {
        Ok(Some(channel)) => {
            if !channel.is_public && !channel.is_subscriber(sender) {
                return send_error(ctx, sender, "channel is private").await;
            }
        }
        Ok(None) => return send_error(ctx, sender, "unknown channel").await,
        Err(e) => return report_storage(ctx, sender, &e).await,
    }
    match ctx.store.join_channel(channel_id, sender) {
        // Joining twice is a no-op, not an error.
        Ok(false) => {}
        Ok(true) => {
            ctx.registry
                .broadcast(ServerFrame::Event(ServerEvent::ChannelsUpdated), None)
                .await;
        }
        Err(e) => report_storage(ctx, sender, &e).await,
    }
}

async fn handle_delete_message(
    ctx: &Context,
    sender: &str,
    message_id: &str,
    chat_type: ChatType,
    target: Option<String>,
) {
    let is_admin = ctx.store.is_admin(sender).unwrap_or(false);
    let may_delete = |author: &str| author == sender || is_admin;

    match chat_type {
        ChatType::Public => {
            let author = match ctx.store.public_messages() {
                Ok(msgs) => msgs.into_iter().find(|m| m.id == message_id).map(|m| m.user),
                Err(e) => return report_storage(ctx, sender, &e).await,
            };
            match author {
                Some(author) if may_delete(&author) => {
                    if let Err(e) = ctx.store.delete_public(message_id) {
                        return report_delete_failure(ctx, sender, e).await;
                    }
                }
                Some(_) => return send_error(ctx, sender, "not your message").await,
                None => return send_error(ctx, sender, "message not found").await,
            }
        }
        ChatType::Private => {
            let Some(peer) = target.as_deref() else {
                return send_error(ctx, sender, "private delete needs a target user").await;
            };
            let key = thread_key(sender, peer);
            let author = match ctx.store.private_thread(&key) {
                Ok(msgs) => msgs.into_iter().find(|m| m.id == message_id).map(|m| m.user),
                Err(e) => return report_storage(ctx, sender, &e).await,
            };
            match author {
                Some(author) if may_delete(&author) => {
                    if let Err(e) = ctx.store.delete_private(&key, message_id) {
                        return report_delete_failure(ctx, sender, e).await;
                    }
                }
                Some(_) => return send_error(ctx, sender, "not your message").await,
                None => return send_error(ctx, sender, "message not found").await,
            }
        }
        ChatType::Channel => {
            let Some(channel_id) = target.as_deref() else {
                return send_error(ctx, sender, "channel delete needs a channel id").await;
            };
            let author = match ctx.store.channel_messages(channel_id) {
                Ok(msgs) => msgs.into_iter().find(|m| m.id == message_id).map(|m| m.user),
                Err(e) => return report_storage(ctx, sender, &e).await,
            };
            match author {
                Some(author) if may_delete(&author) => {
                    if let Err(e) = ctx.store.delete_channel_message(channel_id, message_id) {
                        return report_delete_failure(ctx, sender, e).await;
                    }
                }
                Some(_) => return send_error(ctx, sender, "not your message").await,
                None => return send_error(ctx, sender, "message not found").await,
            }
        }
    }

    let event = ServerFrame::Event(ServerEvent::MessageDeleted {
        message_id: message_id.to_string(),
        chat_type,
        target: target.clone(),
    });
    // Deletion fans out to the same set the original message reached.
    match chat_type {
        ChatType::Public => ctx.registry.broadcast(event, None).await,
        ChatType::Private => {
            ctx.registry.send_to_user(sender, event.clone()).await;
            if let Some(peer) = target.as_deref() {
                if peer != sender {
                    ctx.registry.send_to_user(peer, event).await;
                }
            }
        }
        ChatType::Channel => {
            if let Some(channel_id) = target.as_deref() {
                if let Ok(Some(channel)) = ctx.store.channel(channel_id) {
                    ctx.registry.send_to_names(&channel.subscribers, event).await;
                }
            }
        }
    }
}

pub(crate) async fn send_error(ctx: &Context, sender: &str, error: &str) {
    warn!("{sender}: {error}");
    ctx.registry
        .send_to_user(
            sender,
            ServerFrame::Event(ServerEvent::Error {
                error: error.to_string(),
            }),
        )
        .await;
}

/// The record vanished between lookup and delete, or the rewrite failed.
/// Only the former reads as "not found" to the sender.
async fn report_delete_failure(ctx: &Context, sender: &str, e: StorageError) {
    match e {
        StorageError::MessageNotFound(_) => send_error(ctx, sender, "message not found").await,
        e => report_storage(ctx, sender, &e).await,
    }
}

async fn report_storage(ctx: &Context, sender: &str, e: &StorageError) {
    warn!("storage failure for {sender}: {e}");
    send_error(ctx, sender, &format!("storage failure: {e}")).await;
}
