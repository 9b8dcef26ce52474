//! Server-side session layer: the registry of live connections, the
//! per-connection handler, and the router that turns decoded frames into
//! store mutations and fan-out.

pub mod auth;
pub mod connection;
pub mod registry;
pub mod router;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::registry::Registry;
use samovar_store::Store;
use samovar_store::blobs::BlobStore;

/// Shared server context handed to every connection task.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<Store>,
    pub blobs: Arc<BlobStore>,
    pub registry: Registry,
}

/// Accept loop: one spawned task per connection, forever.
pub async fn serve(listener: TcpListener, ctx: Context) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    connection::handle_connection(stream, addr, ctx).await;
                });
            }
            Err(e) => {
                warn!("accept failed: {e}");
            }
        }
    }
}

/// Bind and log, returning the listener so callers can learn the local
/// address before handing it back to [`serve`].
pub async fn bind(addr: &str) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    Ok(listener)
}
