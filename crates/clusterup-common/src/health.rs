//! HTTP health client for the control plane's readiness endpoint.
//!
//! The control plane serves its API with a certificate issued by its own CA,
//! so the client trusts only `master/ca.crt` from the staged configuration
//! and never the system roots.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};

/// Per-request timeout for health checks.
pub const HEALTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Status code and body of one health response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: u16,
    pub body: String,
}

impl HealthResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Issues GET requests against a health endpoint.
#[async_trait]
pub trait HealthClient: Send + Sync {
    /// Returns the response, or [`RuntimeError::Transport`] when no response
    /// was obtained.
    async fn get(&self, url: &str) -> RuntimeResult<HealthResponse>;
}

/// Builds a [`HealthClient`] trusting the given CA certificate.
#[async_trait]
pub trait HealthClientFactory: Send + Sync {
    async fn build(&self, ca_cert: &Path) -> RuntimeResult<Arc<dyn HealthClient>>;
}

/// reqwest-backed client with the control plane CA as its only trust anchor.
#[derive(Debug, Clone)]
pub struct HttpsHealthClient {
    client: reqwest::Client,
}

impl HttpsHealthClient {
    /// Loads the PEM CA bundle and builds the client.
    pub async fn from_ca_file(ca_cert: &Path) -> RuntimeResult<Self> {
        let pem = tokio::fs::read(ca_cert)
            .await
            .map_err(|e| RuntimeError::io("read", ca_cert, e))?;
        Self::from_pem(ca_cert, &pem)
    }

    /// Builds the client from an in-memory PEM bundle read from `ca_cert`.
    pub fn from_pem(ca_cert: &Path, pem: &[u8]) -> RuntimeResult<Self> {
        let cert = reqwest::Certificate::from_pem(pem).map_err(|e| RuntimeError::Tls {
            path: ca_cert.to_path_buf(),
            message: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .tls_built_in_root_certs(false)
            .add_root_certificate(cert)
            .timeout(HEALTH_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RuntimeError::Tls {
                path: ca_cert.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthClient for HttpsHealthClient {
    async fn get(&self, url: &str) -> RuntimeResult<HealthResponse> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RuntimeError::transport_from(url, &e))?;
        let status = resp.status().as_u16();
        // A body read failure still leaves us a status to classify.
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(url = %url, error = %e, "Could not read health response body");
                String::new()
            }
        };
        Ok(HealthResponse { status, body })
    }
}

/// Default factory producing [`HttpsHealthClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpsClientFactory;

#[async_trait]
impl HealthClientFactory for HttpsClientFactory {
    async fn build(&self, ca_cert: &Path) -> RuntimeResult<Arc<dyn HealthClient>> {
        Ok(Arc::new(HttpsHealthClient::from_ca_file(ca_cert).await?))
    }
}
