use crate::utils::error::{FleetError, Result};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Hands out worker ports in round-robin order.
#[derive(Debug)]
pub struct PortRotation {
    ports: Vec<u16>,
    next: AtomicUsize,
}

impl PortRotation {
    pub fn new(ports: Vec<u16>) -> Self {
        Self {
            ports,
            next: AtomicUsize::new(0),
        }
    }

    pub fn next_port(&self) -> Option<u16> {
        if self.ports.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.ports.len();
        Some(self.ports[index])
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }
}

#[derive(Serialize)]
struct RouteResponse {
    port: Option<u16>,
}

#[derive(Serialize)]
struct PortsResponse {
    ports: Vec<u16>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    workers: usize,
}

async fn route(State(rotation): State<Arc<PortRotation>>) -> Json<RouteResponse> {
    let port = rotation.next_port();
    tracing::debug!("Routed client to port {:?}", port);
    Json(RouteResponse { port })
}

async fn ports(State(rotation): State<Arc<PortRotation>>) -> Json<PortsResponse> {
    Json(PortsResponse {
        ports: rotation.ports().to_vec(),
    })
}

async fn health(State(rotation): State<Arc<PortRotation>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        workers: rotation.ports().len(),
    })
}

pub fn router(rotation: Arc<PortRotation>) -> Router {
    Router::new()
        .route("/route", get(route))
        .route("/ports", get(ports))
        .route("/health", get(health))
        .with_state(rotation)
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| FleetError::ServerError {
            message: format!("Failed to bind {}: {}", addr, e),
        })
}

/// Serve `/route`, `/ports` and `/health` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, ports: Vec<u16>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("🧭 Router listening on {} for {} workers", addr, ports.len());
    }

    let app = router(Arc::new(PortRotation::new(ports)));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| FleetError::ServerError {
            message: e.to_string(),
        })?;

    tracing::info!("Router stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_wraps_around() {
        let rotation = PortRotation::new(vec![20001, 20002, 20003]);
        let handed_out: Vec<_> = (0..5).filter_map(|_| rotation.next_port()).collect();
        assert_eq!(handed_out, vec![20001, 20002, 20003, 20001, 20002]);
    }

    #[test]
    fn test_empty_rotation_has_no_port() {
        assert_eq!(PortRotation::new(Vec::new()).next_port(), None);
    }
}
