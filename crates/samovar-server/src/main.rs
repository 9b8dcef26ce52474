use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use samovar_gateway::registry::Registry;
use samovar_gateway::{Context, bind, serve};
use samovar_store::Store;
use samovar_store::blobs::BlobStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "samovar=debug".into()),
        )
        .init();

    // Config
    let host = std::env::var("SAMOVAR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("SAMOVAR_PORT")
        .unwrap_or_else(|_| "5555".into())
        .parse()?;
    let data_dir = PathBuf::from(std::env::var("SAMOVAR_DATA_DIR").unwrap_or_else(|_| "data".into()));

    // Shared state
    let store = Arc::new(Store::load(&data_dir)?);
    let blobs = Arc::new(BlobStore::new(&data_dir).await?);
    let registry = Registry::new();

    let ctx = Context {
        store,
        blobs,
        registry,
    };

    let listener = bind(&format!("{host}:{port}")).await?;
    info!("samovar server ready on {host}:{port}");
    serve(listener, ctx).await;

    Ok(())
}
