use std::sync::Arc;
use std::time::Duration;

use crate::{
    backoff::BackoffConfig,
    build_info::DEFAULT_CLIENT_ID,
    connection::{BrokerConnector, TlsConfig},
    topic::Topic,
};

pub mod admin;
pub mod error;
#[cfg(test)]
pub(crate) mod mock_cluster;

use self::admin::AdminClient;
use error::{Error, ProtocolError, RequestContext, Result};

/// Builder for [`Client`].
pub struct ClientBuilder {
    bootstrap_brokers: Vec<String>,
    client_id: Option<Arc<str>>,
    max_message_size: usize,
    tls_config: TlsConfig,
    backoff_config: BackoffConfig,
    connect_timeout: Duration,
}

impl ClientBuilder {
    /// Create a new [`ClientBuilder`] with the list of bootstrap brokers
    pub fn new(bootstrap_brokers: Vec<String>) -> Self {
        Self {
            bootstrap_brokers,
            client_id: None,
            max_message_size: 100 * 1024 * 1024, // 100MB
            tls_config: TlsConfig::default(),
            backoff_config: Default::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Sets client ID.
    pub fn client_id(mut self, client_id: impl Into<Arc<str>>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set maximum size (in bytes) of message frames that can be received from a broker.
    ///
    /// Setting this too small will result in failures all over the place since metadata requests of large clusters
    /// cannot be handled any longer.
    pub fn max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Setup TLS.
    #[cfg(feature = "transport-tls")]
    pub fn tls_config(mut self, tls_config: Arc<rustls::ClientConfig>) -> Self {
        self.tls_config = Some(tls_config);
        self
    }

    /// Backoff used when retrying failed requests.
    pub fn backoff_config(mut self, backoff_config: BackoffConfig) -> Self {
        self.backoff_config = backoff_config;
        self
    }

    /// Upper bound for establishing a single broker connection.
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Build [`Client`].
    ///
    /// Does not talk to the cluster yet, the first request connects to one of the bootstrap brokers.
    pub fn build(self) -> Client {
        let brokers = Arc::new(BrokerConnector::new(
            self.bootstrap_brokers,
            self.client_id
                .unwrap_or_else(|| Arc::from(DEFAULT_CLIENT_ID)),
            self.tls_config,
            self.max_message_size,
            Arc::new(self.backoff_config),
            self.connect_timeout,
        ));

        Client { brokers }
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder").finish_non_exhaustive()
    }
}

/// Top-level cluster-wide client.
///
/// Answers topic metadata queries and hands out an [`AdminClient`] for consumer group queries.
///
/// Must be constructed using [`ClientBuilder`].
#[derive(Debug)]
pub struct Client {
    brokers: Arc<BrokerConnector>,
}

impl Client {
    /// Returns a client for consumer group operations.
    pub fn admin_client(&self) -> AdminClient {
        AdminClient::new(Arc::clone(&self.brokers))
    }

    /// Fetch the current partitions of `topic`.
    ///
    /// Returns `None` if the cluster doesn't know the topic. The topic is never created as a side effect.
    pub async fn topic_partitions(&self, topic: &str) -> Result<Option<Topic>> {
        let response = self
            .brokers
            .request_metadata(Some(vec![topic.to_owned()]))
            .await?;

        let Some(t) = response.topics.into_iter().find(|t| t.name == topic) else {
            return Ok(None);
        };

        match t.error {
            None => Ok(Some(Topic::from(t))),
            Some(ProtocolError::UnknownTopicOrPartition | ProtocolError::InvalidTopicException) => {
                Ok(None)
            }
            Some(protocol_error) => Err(Error::ServerError {
                protocol_error,
                error_message: None,
                request: RequestContext::Topic(topic.to_owned()),
            }),
        }
    }
}
