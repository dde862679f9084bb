use anyhow::Context;
use pagewise::{api, config, logging, processing::DocumentService};
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Ports tried in order when `SERVER_PORT` is unset.
const FALLBACK_PORTS: RangeInclusive<u16> = 4100..=4199;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_config();
    logging::init_tracing();

    let config = config::get_config();
    let service =
        DocumentService::from_config(config).context("Failed to initialize document service")?;
    let app = api::create_router(Arc::new(service));

    let listener = bind_listener(config.server_port, FALLBACK_PORTS)
        .await
        .context("Failed to bind listener")?;
    let port = listener.local_addr()?.port();
    tracing::info!(
        port,
        embedding_model = %config.embedding_model,
        generation_model = %config.generation_model,
        "Pagewise listening on http://0.0.0.0:{port}"
    );
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Bind the configured port, or the first free port of `fallback`.
async fn bind_listener(
    configured: Option<u16>,
    fallback: RangeInclusive<u16>,
) -> std::io::Result<TcpListener> {
    if let Some(port) = configured {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await;
    }

    let (first, last) = (*fallback.start(), *fallback.end());
    for port in fallback {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok(listener),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        format!("No available port found in range {first}-{last}"),
    ))
}
