//! Dashboard server: the embedded page, JSON snapshot endpoints and the push channel.
//!
//! Handlers only read through the [`Publisher`]; they never wait on the connection supervisor.

pub mod push;
pub mod routes;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use axum::routing::get;
use axum::Router;
use log::{debug, info};
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;

use crate::error::AppRunError;
use crate::telemetry::publisher::Publisher;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub publisher: Publisher,
    pub device_name: Arc<str>,
}

impl AppState {
    pub fn new(publisher: Publisher, device_name: &str) -> Self {
        AppState { publisher, device_name: Arc::from(device_name) }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/api/data", get(routes::api_data))
        .route("/api/status", get(routes::api_status))
        .route("/ws", get(push::ws_handler))
        .with_state(state)
}

// the address other hosts on the network reach us at. Connecting a udp socket only picks a
// route, nothing is sent.
async fn lan_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).await.ok()?;
    let address = socket.local_addr().ok()?.ip();
    (!address.is_unspecified()).then_some(address)
}

/// A URL a browser (such as a phone on the same network) can open. Binding to the unspecified
/// address listens on every interface, so the LAN address is shown instead.
pub async fn dashboard_url(addr: SocketAddr) -> String {
    if !addr.ip().is_unspecified() {
        return format!("http://{}", addr);
    }

    let host = match lan_address().await {
        Some(address) => address,
        None => {
            debug!("Could not determine the LAN address, showing loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        },
    };
    format!("http://{}", SocketAddr::new(host, addr.port()))
}

/// Serves the dashboard until `cancel` fires.
pub async fn serve(addr: SocketAddr, state: AppState, cancel: CancellationToken) -> Result<(), AppRunError> {
    let listener = TcpListener::bind(addr).await
        .map_err(|source| AppRunError::Bind { addr, source })?;

    info!("{}", "=".repeat(50));
    if addr.ip().is_unspecified() {
        info!("Dashboard listening on all interfaces, port {}", addr.port());
    } else {
        info!("Dashboard listening on {}", addr);
    }
    info!("Open this URL on your phone: {}", dashboard_url(addr).await);
    info!("{}", "=".repeat(50));

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|source| AppRunError::Serve { source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn specific_address_is_shown_as_is() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)), 5000);
        assert_eq!(dashboard_url(addr).await, "http://192.168.1.20:5000");
    }

    #[tokio::test]
    async fn unspecified_address_is_replaced_by_a_reachable_one() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5000);

        let url = dashboard_url(addr).await;

        assert!(!url.contains("0.0.0.0"), "{}", url);
        assert!(url.starts_with("http://"), "{}", url);
        assert!(url.ends_with(":5000"), "{}", url);
    }
}
