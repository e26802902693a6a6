use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project_lite::pin_project;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

#[cfg(feature = "transport-tls")]
use std::sync::Arc;
#[cfg(feature = "transport-tls")]
use tokio_rustls::{client::TlsStream, TlsConnector};

#[cfg(feature = "transport-tls")]
pub type TlsConfig = Option<Arc<rustls::ClientConfig>>;

#[cfg(not(feature = "transport-tls"))]
#[allow(missing_copy_implementations)]
#[derive(Debug, Clone, Default)]
pub struct TlsConfig();

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("IO Error: {0}")]
    IO(#[from] std::io::Error),

    #[error("Invalid broker address \"{0}\", expected host:port")]
    InvalidAddress(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[cfg(feature = "transport-tls")]
    #[error("Invalid host name for TLS: {0}")]
    BadHostName(#[from] rustls::pki_types::InvalidDnsNameError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(feature = "transport-tls")]
pin_project! {
    #[project = TransportProj]
    #[derive(Debug)]
    pub enum Transport {
        Plain {
            #[pin]
            inner: TcpStream,
        },

        Tls {
            #[pin]
            inner: Pin<Box<TlsStream<TcpStream>>>,
        },
    }
}

#[cfg(not(feature = "transport-tls"))]
pin_project! {
    #[project = TransportProj]
    #[derive(Debug)]
    pub enum Transport {
        Plain {
            #[pin]
            inner: TcpStream,
        },
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.project() {
            TransportProj::Plain { inner } => inner.poll_read(cx, buf),

            #[cfg(feature = "transport-tls")]
            TransportProj::Tls { inner } => inner.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::result::Result<usize, std::io::Error>> {
        match self.project() {
            TransportProj::Plain { inner } => inner.poll_write(cx, buf),

            #[cfg(feature = "transport-tls")]
            TransportProj::Tls { inner } => inner.poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::result::Result<(), std::io::Error>> {
        match self.project() {
            TransportProj::Plain { inner } => inner.poll_flush(cx),

            #[cfg(feature = "transport-tls")]
            TransportProj::Tls { inner } => inner.poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::result::Result<(), std::io::Error>> {
        match self.project() {
            TransportProj::Plain { inner } => inner.poll_shutdown(cx),

            #[cfg(feature = "transport-tls")]
            TransportProj::Tls { inner } => inner.poll_shutdown(cx),
        }
    }
}

impl Transport {
    /// Connect to `broker` (`host:port`), bounded by `timeout`.
    pub async fn connect(broker: &str, tls_config: TlsConfig, timeout: Duration) -> Result<Self> {
        tokio::time::timeout(timeout, Self::connect_inner(broker, tls_config))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    async fn connect_inner(broker: &str, tls_config: TlsConfig) -> Result<Self> {
        let tcp_stream = TcpStream::connect(broker).await?;
        tcp_stream.set_nodelay(true)?;
        Self::wrap_tls(tcp_stream, broker, tls_config).await
    }

    #[cfg(feature = "transport-tls")]
    async fn wrap_tls(tcp_stream: TcpStream, broker: &str, tls_config: TlsConfig) -> Result<Self> {
        let Some(config) = tls_config else {
            return Ok(Self::Plain { inner: tcp_stream });
        };

        let host = host_of(broker)?;
        let server_name = rustls::pki_types::ServerName::try_from(host.to_owned())?;

        let connector = TlsConnector::from(config);
        let tls_stream = connector.connect(server_name, tcp_stream).await?;

        Ok(Self::Tls {
            inner: Box::pin(tls_stream),
        })
    }

    #[cfg(not(feature = "transport-tls"))]
    async fn wrap_tls(tcp_stream: TcpStream, _broker: &str, _tls_config: TlsConfig) -> Result<Self> {
        Ok(Self::Plain { inner: tcp_stream })
    }
}

/// Host part of a `host:port` address, IPv6 hosts may be bracketed.
#[cfg_attr(not(feature = "transport-tls"), allow(dead_code))]
fn host_of(broker: &str) -> Result<&str> {
    let (host, port) = broker
        .rsplit_once(':')
        .ok_or_else(|| Error::InvalidAddress(broker.to_owned()))?;

    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(Error::InvalidAddress(broker.to_owned()));
    }

    Ok(host.trim_start_matches('[').trim_end_matches(']'))
}
