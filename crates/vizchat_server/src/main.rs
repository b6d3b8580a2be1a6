use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};
use vizchat_core::dataset::DatasetStore;
use vizchat_core::gateway::{GatewayConfig, OpenAiGateway};
use vizchat_server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let cfg = GatewayConfig::from_env()?;
    let state = Arc::new(AppState {
        store: DatasetStore::new(),
        gateway: Arc::new(OpenAiGateway::new(cfg)),
        static_dir: PathBuf::from("client/build"),
    });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!(%addr, "vizchat_server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, vizchat_server::router(state)).await?;
    Ok(())
}
