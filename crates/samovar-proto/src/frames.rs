use samovar_types::events::{ClientCommand, ServerEvent};
use samovar_types::models::{PublicMessage, ThreadMessage};

use crate::ProtocolError;

/// A frame travelling client -> server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Login { username: String, password: String },
    Register { username: String, password: String },
    /// `MSG:text`, a public room message. Text may contain colons.
    Public { text: String },
    /// `PRIVATE:recipient:text`
    Private { recipient: String, text: String },
    /// `CHANNEL:id:MSG:text`
    ChannelMsg { channel_id: String, text: String },
    /// `FILE:filename:size`; `size` raw bytes follow on the stream.
    File { filename: String, size: u64 },
    /// Typed JSON command.
    Command(ClientCommand),
}

impl ClientFrame {
    pub fn encode(&self) -> String {
        match self {
            Self::Login { username, password } => format!("LOGIN:{username}:{password}"),
            Self::Register { username, password } => format!("REGISTER:{username}:{password}"),
            Self::Public { text } => format!("MSG:{text}"),
            Self::Private { recipient, text } => format!("PRIVATE:{recipient}:{text}"),
            Self::ChannelMsg { channel_id, text } => format!("CHANNEL:{channel_id}:MSG:{text}"),
            Self::File { filename, size } => format!("FILE:{filename}:{size}"),
            // Serialization of these derive-only types cannot fail.
            Self::Command(cmd) => serde_json::to_string(cmd).unwrap(),
        }
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        if line.starts_with('{') {
            return Ok(Self::Command(serde_json::from_str(line)?));
        }
        let (verb, rest) = match line.split_once(':') {
            Some(pair) => pair,
            None => return Err(ProtocolError::UnknownVerb(line.to_string())),
        };
        match verb {
            "LOGIN" | "REGISTER" => {
                let (username, password) = rest
                    .split_once(':')
                    .ok_or_else(|| ProtocolError::malformed("LOGIN", "expected user:pass"))?;
                if username.is_empty() {
                    return Err(ProtocolError::malformed("LOGIN", "empty username"));
                }
                let username = username.to_string();
                let password = password.to_string();
                Ok(if verb == "LOGIN" {
                    Self::Login { username, password }
                } else {
                    Self::Register { username, password }
                })
            }
            "MSG" => Ok(Self::Public {
                text: rest.to_string(),
            }),
            "PRIVATE" => {
                let (recipient, text) = rest
                    .split_once(':')
                    .ok_or_else(|| ProtocolError::malformed("PRIVATE", "expected recipient:text"))?;
                if recipient.is_empty() {
                    return Err(ProtocolError::malformed("PRIVATE", "empty recipient"));
                }
                Ok(Self::Private {
                    recipient: recipient.to_string(),
                    text: text.to_string(),
                })
            }
            "CHANNEL" => {
                let mut parts = rest.splitn(3, ':');
                let channel_id = parts
                    .next()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ProtocolError::malformed("CHANNEL", "missing channel id"))?;
                let action = parts
                    .next()
                    .ok_or_else(|| ProtocolError::malformed("CHANNEL", "missing action"))?;
                let payload = parts
                    .next()
                    .ok_or_else(|| ProtocolError::malformed("CHANNEL", "missing payload"))?;
                if action != "MSG" {
                    return Err(ProtocolError::malformed("CHANNEL", "unknown action"));
                }
                Ok(Self::ChannelMsg {
                    channel_id: channel_id.to_string(),
                    text: payload.to_string(),
                })
            }
            "FILE" => {
                let (filename, size) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| ProtocolError::malformed("FILE", "expected filename:size"))?;
                if filename.is_empty() {
                    return Err(ProtocolError::malformed("FILE", "empty filename"));
                }
                let size: u64 = size
                    .parse()
                    .map_err(|_| ProtocolError::malformed("FILE", "size is not a number"))?;
                Ok(Self::File {
                    filename: filename.to_string(),
                    size,
                })
            }
            _ => Err(ProtocolError::UnknownVerb(line.to_string())),
        }
    }
}

/// A frame travelling server -> client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Literal `OK`: login or registration accepted.
    Ok,
    /// Literal `FAIL`: bad credentials, connection closes next.
    Fail,
    /// `MSG:<json>`, a public broadcast.
    Public(PublicMessage),
    /// `PRIVATE:<peer>:<json>`. `peer` is the other participant from the
    /// receiver's point of view, so the client knows which thread to file
    /// the message under.
    Private { peer: String, message: ThreadMessage },
    /// `CHANNEL:<id>:MSG:<json>`, delivered to registered subscribers.
    ChannelMsg {
        channel_id: String,
        message: ThreadMessage,
    },
    /// `FILE:<filename>`: an attachment finished uploading.
    File { filename: String },
    /// Typed JSON event.
    Event(ServerEvent),
}

impl ServerFrame {
    pub fn encode(&self) -> String {
        match self {
            Self::Ok => "OK".to_string(),
            Self::Fail => "FAIL".to_string(),
            Self::Public(msg) => format!("MSG:{}", serde_json::to_string(msg).unwrap()),
            Self::Private { peer, message } => {
                format!("PRIVATE:{peer}:{}", serde_json::to_string(message).unwrap())
            }
            Self::ChannelMsg {
                channel_id,
                message,
            } => format!(
                "CHANNEL:{channel_id}:MSG:{}",
                serde_json::to_string(message).unwrap()
            ),
            Self::File { filename } => format!("FILE:{filename}"),
            Self::Event(event) => serde_json::to_string(event).unwrap(),
        }
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        if line.starts_with('{') {
            return Ok(Self::Event(serde_json::from_str(line)?));
        }
        match line {
            "OK" => return Ok(Self::Ok),
            "FAIL" => return Ok(Self::Fail),
            _ => {}
        }
        let (verb, rest) = match line.split_once(':') {
            Some(pair) => pair,
            None => return Err(ProtocolError::UnknownVerb(line.to_string())),
        };
        match verb {
            "MSG" => Ok(Self::Public(serde_json::from_str(rest)?)),
            "PRIVATE" => {
                let (peer, json) = rest
                    .split_once(':')
                    .ok_or_else(|| ProtocolError::malformed("PRIVATE", "expected peer:json"))?;
                Ok(Self::Private {
                    peer: peer.to_string(),
                    message: serde_json::from_str(json)?,
                })
            }
            "CHANNEL" => {
                let mut parts = rest.splitn(3, ':');
                let channel_id = parts
                    .next()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ProtocolError::malformed("CHANNEL", "missing channel id"))?;
                let action = parts.next();
                let payload = parts.next();
                match (action, payload) {
                    (Some("MSG"), Some(json)) => Ok(Self::ChannelMsg {
                        channel_id: channel_id.to_string(),
                        message: serde_json::from_str(json)?,
                    }),
                    _ => Err(ProtocolError::malformed("CHANNEL", "expected id:MSG:json")),
                }
            }
            "FILE" => Ok(Self::File {
                filename: rest.to_string(),
            }),
            _ => Err(ProtocolError::UnknownVerb(line.to_string())),
        }
    }
}
