//! Transport layer: TCP, optionally wrapped in TLS.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore, pki_types::ServerName};
use tracing::debug;

use hookrelay_core::config::IrcConfig;

use super::error::ConnError;

/// Byte stream the IRC session runs over.
pub trait IrcStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IrcStream for T {}

pub type BoxedStream = Box<dyn IrcStream>;

/// Opens a fresh transport for each connection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<BoxedStream, ConnError>;

    /// Human-readable endpoint, for logs.
    fn describe(&self) -> String;
}

/// Connects over TCP, with TLS when configured.
pub struct TcpConnector {
    host: String,
    port: u16,
    tls: Option<(TlsConnector, ServerName<'static>)>,
}

impl TcpConnector {
    /// Build a connector. Fails only on settings that can never work.
    pub fn new(config: &IrcConfig) -> Result<Self, ConnError> {
        let host = config.server.trim().to_string();
        if host.is_empty() {
            return Err(ConnError::InvalidConfig("server host is empty".into()));
        }

        let tls = if config.tls {
            let server_name = ServerName::try_from(host.clone()).map_err(|e| {
                ConnError::InvalidConfig(format!("invalid TLS server name {host:?}: {e}"))
            })?;
            Some((TlsConnector::from(Arc::new(client_config()?)), server_name))
        } else {
            None
        };

        Ok(Self {
            host,
            port: config.port,
            tls,
        })
    }
}

fn client_config() -> Result<ClientConfig, ConnError> {
    let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ConnError::InvalidConfig(format!("TLS setup failed: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<BoxedStream, ConnError> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
        tcp.set_nodelay(true)?;
        debug!(host = %self.host, port = self.port, "TCP connected");

        match &self.tls {
            Some((connector, server_name)) => {
                let stream = connector
                    .connect(server_name.clone(), tcp)
                    .await
                    .map_err(|e| ConnError::Tls(e.to_string()))?;
                debug!(host = %self.host, "TLS handshake complete");
                Ok(Box::new(stream))
            }
            None => Ok(Box::new(tcp)),
        }
    }

    fn describe(&self) -> String {
        let scheme = if self.tls.is_some() { "ircs" } else { "irc" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(server: &str, tls: bool) -> IrcConfig {
        IrcConfig {
            server: server.into(),
            tls,
            ..IrcConfig::default()
        }
    }

    #[test]
    fn builds_tls_connector() {
        let connector = TcpConnector::new(&config("irc.libera.chat", true)).unwrap();
        assert_eq!(connector.describe(), "ircs://irc.libera.chat:6697");
    }

    #[test]
    fn plaintext_connector_describes_itself() {
        let mut cfg = config("127.0.0.1", false);
        cfg.port = 6667;
        let connector = TcpConnector::new(&cfg).unwrap();
        assert_eq!(connector.describe(), "irc://127.0.0.1:6667");
    }

    #[test]
    fn rejects_empty_host() {
        assert!(matches!(
            TcpConnector::new(&config("  ", false)),
            Err(ConnError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_invalid_tls_server_name() {
        assert!(matches!(
            TcpConnector::new(&config("bad host name", true)),
            Err(ConnError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn connect_failure_is_an_io_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut cfg = config("127.0.0.1", false);
        cfg.port = port;
        let connector = TcpConnector::new(&cfg).unwrap();
        assert!(matches!(connector.connect().await, Err(ConnError::Io(_))));
    }
}
