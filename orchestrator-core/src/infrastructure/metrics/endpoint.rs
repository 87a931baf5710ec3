// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Endpoint HTTP Server
//!
//! Lightweight HTTP server exposing Prometheus metrics at `/metrics` and a
//! liveness check at `/health`. Binds to localhost only; no authentication
//! or rate limiting is provided, since it is meant to be scraped by a
//! co-located Prometheus agent, not exposed directly.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::infrastructure::config::OrchestratorConfig;
use crate::infrastructure::metrics::service::MetricsService;
use runner_orchestrator_domain::error::OrchestratorError;

pub struct MetricsEndpoint {
    metrics_service: Arc<MetricsService>,
    port: u16,
}

impl MetricsEndpoint {
    pub fn new(metrics_service: Arc<MetricsService>, config: &OrchestratorConfig) -> Self {
        Self { metrics_service, port: config.metrics.port }
    }

    /// Runs the endpoint until the process is terminated. Never returns on
    /// success; each connection is handled on its own spawned task.
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| OrchestratorError::internal(format!("failed to bind metrics endpoint: {e}")))?;

        info!("Prometheus metrics endpoint started on http://{}/metrics", addr);

        loop {
            match listener.accept().await {
                Ok((mut stream, _)) => {
                    let metrics_service = self.metrics_service.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_request(&mut stream, metrics_service).await {
                            error!("error handling metrics request: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("error accepting connection: {}", e);
                }
            }
        }
    }
}

async fn handle_request(
    stream: &mut tokio::net::TcpStream,
    metrics_service: Arc<MetricsService>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buffer = [0; 1024];
    let n = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..n]);

    debug!("received request: {}", request.lines().next().unwrap_or(""));

    if request.starts_with("GET /metrics") {
        match metrics_service.get_metrics() {
            Ok(metrics_text) => {
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: \
                     {}\r\n\r\n{}",
                    metrics_text.len(),
                    metrics_text
                );
                stream.write_all(response.as_bytes()).await?;
                debug!("sent metrics response ({} bytes)", metrics_text.len());
            }
            Err(e) => {
                let body = format!("Error generating metrics: {e}");
                let response = format!(
                    "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain\r\nContent-Length: \
                     {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await?;
                error!("error generating metrics: {}", e);
            }
        }
    } else if request.starts_with("GET /health") {
        let response = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK";
        stream.write_all(response.as_bytes()).await?;
    } else {
        let response = "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 9\r\n\r\nNot Found";
        stream.write_all(response.as_bytes()).await?;
        debug!("sent 404 for: {}", request.lines().next().unwrap_or(""));
    }

    stream.flush().await?;
    Ok(())
}
