//! Command line and environment configuration.

use std::collections::BTreeSet;
#[cfg(feature = "transport-tls")]
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::build_info::DEFAULT_CLIENT_ID;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("At least one bootstrap server is required")]
    NoBootstrapServers,

    #[error("Bootstrap server \"{0}\" is not of the form host:port")]
    InvalidBootstrapServer(String),

    #[error("Topic names to check may not be blank")]
    BlankTopic,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[cfg(feature = "transport-tls")]
    #[error("Cannot read CA file {path:?}: {source}")]
    CaFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[cfg(feature = "transport-tls")]
    #[error("CA file {0:?} contains no certificates")]
    NoCertificates(PathBuf),

    #[cfg(feature = "transport-tls")]
    #[error("Invalid CA certificate: {0}")]
    InvalidCertificate(#[from] rustls::Error),
}

#[derive(Clone, Debug, Parser)]
#[command(
    name = "kafka-partition-checker",
    version,
    about = "Reports Kafka partitions that a consumer group has no committed offset for",
    long_about = None,
)]
pub struct CheckerConfig {
    /// Comma separated host:port list of brokers to bootstrap from
    #[arg(
        long,
        env = "KAFKA_BOOTSTRAP_SERVERS",
        value_delimiter = ',',
        required = true
    )]
    pub bootstrap_servers: Vec<String>,

    /// Comma separated topics to check, all topics if empty
    #[arg(long, env = "KAFKA_TOPICS_TO_CHECK", value_delimiter = ',')]
    pub topics_to_check: Vec<String>,

    /// Milliseconds between two checks
    #[arg(long, env = "CHECK_POLL_INTERVAL_MS", default_value_t = 60_000)]
    pub poll_interval_ms: u64,

    /// Upper bound in milliseconds for every call to the cluster
    #[arg(long, env = "KAFKA_REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    /// Client ID sent to the brokers
    #[arg(long, env = "KAFKA_CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,

    /// PEM file with the CA certificates to verify brokers with, connects in plain text if unset
    #[cfg(feature = "transport-tls")]
    #[arg(long, env = "KAFKA_TLS_CA_FILE")]
    pub tls_ca_file: Option<PathBuf>,

    /// Run a single check and exit, with a non-zero exit code if partitions are missing
    #[arg(long)]
    pub once: bool,
}

impl CheckerConfig {
    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let servers = self.bootstrap_servers();
        if servers.is_empty() {
            return Err(ConfigError::NoBootstrapServers);
        }
        if let Some(server) = servers.iter().find(|s| !is_host_port(s)) {
            return Err(ConfigError::InvalidBootstrapServer(server.clone()));
        }

        if self.topics_to_check.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::BlankTopic);
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Zero("poll interval"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Zero("request timeout"));
        }

        Ok(())
    }

    /// Bootstrap servers with surrounding whitespace and empty entries removed.
    pub fn bootstrap_servers(&self) -> Vec<String> {
        self.bootstrap_servers
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn allow_list(&self) -> BTreeSet<String> {
        self.topics_to_check
            .iter()
            .map(|t| t.trim().to_owned())
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// TLS client configuration trusting the certificates of `tls_ca_file`.
    #[cfg(feature = "transport-tls")]
    pub fn tls_config(&self) -> Result<Option<std::sync::Arc<rustls::ClientConfig>>, ConfigError> {
        let Some(path) = &self.tls_ca_file else {
            return Ok(None);
        };

        let file = std::fs::File::open(path).map_err(|source| ConfigError::CaFile {
            path: path.clone(),
            source,
        })?;
        let mut reader = std::io::BufReader::new(file);

        let mut roots = rustls::RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|source| ConfigError::CaFile {
                path: path.clone(),
                source,
            })?;
            roots.add(cert)?;
        }
        if roots.is_empty() {
            return Err(ConfigError::NoCertificates(path.clone()));
        }

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Some(std::sync::Arc::new(config)))
    }
}

fn is_host_port(server: &str) -> bool {
    match server.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
