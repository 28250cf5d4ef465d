//! HTTP entrypoint for the knowledge-base server.

use std::net::Ipv4Addr;
use std::sync::Arc;

use knowledgebase::{api, config, logging, service::ServiceContainer};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();

    let config = config::get_config();
    let service = Arc::new(ServiceContainer::new(config).await);
    let app = api::create_router(service);

    let (listener, port) = bind_listener().await.expect("failed to bind listener");
    tracing::info!("listening on http://0.0.0.0:{port}");
    axum::serve(listener, app).await.unwrap();
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await.map(|listener| (listener, port));
    }
    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => continue,
            Err(err) => return Err(err),
        }
    }
    Err(std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no available port found in range 4100-4199"))
}
