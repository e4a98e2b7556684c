//! Plugin server
//!
//! Terraform launches the provider binary, reads one handshake line from its
//! stdout and then speaks gRPC to the advertised address.

use crate::error::{Result, TfplugError};
use crate::grpc::GrpcProvider;
use crate::proto::ProviderServer;
use crate::provider::Provider;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Identity, Server, ServerTlsConfig};

const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";
const PROTOCOL_VERSION: u32 = 6;

#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// PEM certificate and key; plaintext when absent
    pub tls: Option<(PathBuf, PathBuf)>,
    pub max_message_size: usize,
    /// Refuse to start unless launched by Terraform
    pub require_magic_cookie: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            tls: None,
            max_message_size: 256 << 20, // 256MB
            require_magic_cookie: true,
        }
    }
}

impl ServeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tls(mut self, cert_path: PathBuf, key_path: PathBuf) -> Self {
        self.tls = Some((cert_path, key_path));
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn without_magic_cookie(mut self) -> Self {
        self.require_magic_cookie = false;
        self
    }
}

fn check_magic_cookie(cookie: Option<&str>) -> Result<()> {
    match cookie {
        Some(value) if value == MAGIC_COOKIE_VALUE => Ok(()),
        _ => Err(TfplugError::ServerError(
            "this binary is a Terraform plugin and is not meant to be run directly; \
             Terraform starts it when needed"
                .to_string(),
        )),
    }
}

fn handshake_line(port: u16) -> String {
    format!("1|{}|tcp|127.0.0.1:{}|grpc", PROTOCOL_VERSION, port)
}

async fn tls_config(cert_path: &Path, key_path: &Path) -> Result<ServerTlsConfig> {
    // Another crypto provider may already be installed; either one serves
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cert = tokio::fs::read(cert_path).await.map_err(|e| {
        TfplugError::ServerError(format!("reading {}: {}", cert_path.display(), e))
    })?;
    let key = tokio::fs::read(key_path).await.map_err(|e| {
        TfplugError::ServerError(format!("reading {}: {}", key_path.display(), e))
    })?;
    Ok(ServerTlsConfig::new().identity(Identity::from_pem(cert, key)))
}

/// Serves `provider` until Terraform closes the connection or kills the process
pub async fn serve<P: Provider + 'static>(provider: P, config: ServeConfig) -> Result<()> {
    if config.require_magic_cookie {
        check_magic_cookie(std::env::var(MAGIC_COOKIE_KEY).ok().as_deref())?;
    }

    let service = ProviderServer::new(GrpcProvider::new(provider))
        .max_decoding_message_size(config.max_message_size)
        .max_encoding_message_size(config.max_message_size);

    let mut builder = Server::builder();
    if let Some((cert_path, key_path)) = &config.tls {
        builder = builder.tls_config(tls_config(cert_path, key_path).await?)?;
    }

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    println!("{}", handshake_line(port));
    tracing::info!(port, tls = config.tls.is_some(), "provider server listening");

    builder
        .add_service(service)
        .serve_with_incoming(TcpListenerStream::new(listener))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_advertises_protocol_six_over_tcp() {
        assert_eq!(handshake_line(40123), "1|6|tcp|127.0.0.1:40123|grpc");
    }

    #[test]
    fn refuses_to_run_outside_terraform() {
        assert!(check_magic_cookie(None).is_err());
        assert!(check_magic_cookie(Some("wrong")).is_err());
        assert!(check_magic_cookie(Some(MAGIC_COOKIE_VALUE)).is_ok());
    }

    #[test]
    fn builder_sets_options() {
        let config = ServeConfig::new()
            .with_tls("cert.pem".into(), "key.pem".into())
            .with_max_message_size(1024)
            .without_magic_cookie();
        assert_eq!(config.max_message_size, 1024);
        assert!(!config.require_magic_cookie);
        assert_eq!(config.tls.unwrap().0, PathBuf::from("cert.pem"));
    }

    #[tokio::test]
    async fn missing_certificate_is_reported() {
        let err = tls_config(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cert.pem"));
    }
}
