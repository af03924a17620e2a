//! HTTP(S) server hosting the admission endpoints

use crate::admission::{router, AdmissionState};
use crate::error::{Result, WebhookError};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// TLS material for the webhook listener
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Path to certificate file (PEM)
    pub cert_path: Option<PathBuf>,
    /// Path to private key file (PEM)
    pub key_path: Option<PathBuf>,
}

impl TlsConfig {
    /// TLS is enabled once a certificate is configured
    pub fn enabled(&self) -> bool {
        self.cert_path.is_some()
    }
}

/// Webhook server configuration
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Listen address for the admission endpoints
    pub addr: SocketAddr,
    /// TLS configuration
    pub tls: TlsConfig,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 9443)),
            tls: TlsConfig::default(),
        }
    }
}

impl WebhookConfig {
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_tls(mut self, cert_path: PathBuf, key_path: PathBuf) -> Self {
        self.tls = TlsConfig {
            cert_path: Some(cert_path),
            key_path: Some(key_path),
        };
        self
    }
}

/// Serve the admission endpoints until the listener fails
pub async fn run(config: WebhookConfig) -> Result<()> {
    let app = router(Arc::new(AdmissionState::default()));

    if config.tls.enabled() {
        let cert_path = config
            .tls
            .cert_path
            .as_ref()
            .ok_or_else(|| {
                WebhookError::InvalidConfig(
                    "TLS enabled but no certificate path provided".to_string(),
                )
            })?;
        let key_path = config
            .tls
            .key_path
            .as_ref()
            .ok_or_else(|| {
                WebhookError::InvalidConfig("TLS enabled but no key path provided".to_string())
            })?;

        info!(address = %config.addr, "Starting admission webhook with TLS");

        let rustls =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;

        axum_server::bind_rustls(config.addr, rustls)
            .serve(app.into_make_service())
            .await?;
    } else {
        info!(address = %config.addr, "Starting admission webhook without TLS");

        let listener = tokio::net::TcpListener::bind(config.addr).await?;
        axum::serve(listener, app).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WebhookConfig::default();
        assert_eq!(config.addr.port(), 9443);
        assert!(!config.tls.enabled());
    }

    #[test]
    fn test_with_tls() {
        let config = WebhookConfig::default()
            .with_addr("127.0.0.1:8443".parse().unwrap())
            .with_tls("/certs/tls.crt".into(), "/certs/tls.key".into());
        assert!(config.tls.enabled());
        assert_eq!(config.addr.port(), 8443);
    }
}
