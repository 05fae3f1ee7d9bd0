use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use plaza_backend::config::AppConfig;
use plaza_backend::{api, build_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("plaza_backend=info,tower_http=info,warn")),
        )
        .init();

    let state = build_state(&config).await?;
    let app = api::router(state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("🚀 Plaza Backend 运行在 http://{}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
