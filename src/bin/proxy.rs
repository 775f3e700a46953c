//! Usergate - forwarding proxy

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usergate::{
    config::Config,
    proxy::{build_proxy_router, ProxyState},
    shutdown::shutdown_signal,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "usergate=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load_with_env(Path::new("config.yml"))?;
    let proxy = config.proxy;

    let state = ProxyState::new(&proxy)?;
    let app = build_proxy_router(state, &proxy.cors_origin)?;

    let addr = format!("{}:{}", proxy.host, proxy.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(upstream = %proxy.upstream_url, "Proxy listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Proxy stopped");
    Ok(())
}
