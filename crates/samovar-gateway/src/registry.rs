//! Session registry: the one place that maps logged-in usernames to live
//! connections.
//!
//! Each session is an unbounded mpsc sender feeding that connection's
//! writer task. All mutations and fan-out scans run under a single RwLock
//! so concurrent login/logout and broadcast never observe a half-updated
//! map. A failed send means the peer is already on its way out; its own
//! read loop handles the cleanup, so failures here are dropped silently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use samovar_proto::ServerFrame;
use samovar_types::events::ServerEvent;

struct SessionHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<ServerFrame>,
}

#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Install a session for `username`, returning its connection id and
    /// the receiver its writer task drains.
    ///
    /// A second login for the same name evicts the first session: the old
    /// connection gets a final error event, then its channel is dropped so
    /// its writer task exits and the socket closes.
    pub async fn register(&self, username: &str) -> (Uuid, mpsc::UnboundedReceiver<ServerFrame>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sessions = self.inner.write().await;
        if let Some(old) = sessions.insert(username.to_string(), SessionHandle { conn_id, tx }) {
            debug!("evicting older session for {username}");
            let _ = old.tx.send(ServerFrame::Event(ServerEvent::Error {
                error: "signed in from another connection".to_string(),
            }));
        }
        (conn_id, rx)
    }

    /// Remove the session, but only if `conn_id` still owns it. A newer
    /// login for the same name must not be torn down by the old task.
    pub async fn unregister(&self, username: &str, conn_id: Uuid) -> bool {
        let mut sessions = self.inner.write().await;
        match sessions.get(username) {
            Some(handle) if handle.conn_id == conn_id => {
                sessions.remove(username);
                true
            }
            _ => false,
        }
    }

    pub async fn is_online(&self, username: &str) -> bool {
        self.inner.read().await.contains_key(username)
    }

    /// Snapshot of currently registered usernames.
    pub async fn online_users(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    /// Send to one named session. Returns false if it is not registered.
    pub async fn send_to_user(&self, username: &str, frame: ServerFrame) -> bool {
        let sessions = self.inner.read().await;
        match sessions.get(username) {
            Some(handle) => handle.tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Send to every registered session except `exclude`.
    pub async fn broadcast(&self, frame: ServerFrame, exclude: Option<&str>) {
        let sessions = self.inner.read().await;
        for (name, handle) in sessions.iter() {
            if exclude.is_some_and(|ex| ex == name) {
                continue;
            }
            let _ = handle.tx.send(frame.clone());
        }
    }

    /// Send to every registered session whose name is in `names`.
    pub async fn send_to_names(&self, names: &[String], frame: ServerFrame) {
        let sessions = self.inner.read().await;
        for name in names {
            if let Some(handle) = sessions.get(name) {
                let _ = handle.tx.send(frame.clone());
            }
        }
    }
}
