use anyhow::{Context, Result};

use style_compare::{
    app::{build_app, build_router},
    config::{AppConfig, LogFormat},
    logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init(&LogFormat::from_env());

    let config = AppConfig::from_env();
    let bind_address = config.bind_address();

    let app = build_app(&config)?;
    let router = build_router(app.state, app.local_cache_dir);

    let tcp_listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("bind {bind_address}"))?;
    tracing::info!("style compare server listening on http://{bind_address}");

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
