use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::prelude::*;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::backoff::{BackoffConfig, ErrorOrThrottle};
use crate::client::admin::maybe_retry;
use crate::client::error::Result as ClientResult;
use crate::connection::topology::BrokerTopology;
use crate::messenger::{Messenger, SyncVersionsError};
use crate::protocol::messages::{MetadataRequest, MetadataRequestTopic, MetadataResponse};
use crate::throttle::maybe_throttle;

pub use self::transport::TlsConfig;

mod topology;
mod transport;

/// A connection to a broker.
pub type MessengerTransport = Messenger<transport::Transport>;

/// A cached, shared broker connection.
pub type BrokerConnection = Arc<MessengerTransport>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Cannot connect to broker {broker}: {source}")]
    Transport {
        broker: String,
        source: transport::Error,
    },

    #[error("Cannot sync API versions with broker {broker}: {source}")]
    SyncVersions {
        broker: String,
        source: SyncVersionsError,
    },

    #[error("Timed out syncing API versions with broker {broker}")]
    SyncVersionsTimeout { broker: String },

    #[error("None of the brokers could be reached: {tried:?}")]
    NoBrokerReachable { tried: Vec<String> },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Generation of a cached broker connection.
///
/// Invalidation requests carry the generation they observed, so a request that failed on an old connection doesn't
/// drop a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerCacheGeneration(usize);

impl BrokerCacheGeneration {
    pub const START: Self = Self(0);

    pub fn get(&self) -> usize {
        self.0
    }

    pub fn bump(&mut self) {
        self.0 += 1;
    }
}

/// A cache of one broker connection.
#[async_trait]
pub trait BrokerCache: Send + Sync {
    type R: Send + Sync;
    type E: std::error::Error + Send + Sync;

    /// Get the cached connection, connecting first if there is none.
    async fn get(&self) -> Result<(Arc<Self::R>, BrokerCacheGeneration), Self::E>;

    /// Drop the cached connection if it still belongs to generation `gen`.
    async fn invalidate(&self, reason: &'static str, gen: BrokerCacheGeneration);
}

/// Builds and caches connections to the brokers of one cluster.
///
/// Knows the bootstrap brokers and, once the first metadata response came in, the cluster topology. Connections are
/// kept per broker ID plus one "arbitrary" connection used for cluster-wide requests like metadata.
#[derive(Debug)]
pub struct BrokerConnector {
    /// Brokers used to bootstrap this pool
    bootstrap_brokers: Vec<String>,

    /// Client ID sent with every request
    client_id: Arc<str>,

    /// Discovered brokers in the cluster, including bootstrap brokers
    pub(crate) topology: BrokerTopology,

    /// The current cached broker connection used for metadata requests
    cached_arbitrary_broker: Mutex<(Option<BrokerConnection>, BrokerCacheGeneration)>,

    /// Connections by broker ID
    connections: parking_lot::Mutex<HashMap<i32, BrokerConnection>>,

    /// The backoff configuration on error
    backoff_config: Arc<BackoffConfig>,

    /// TLS configuration if any
    tls_config: TlsConfig,

    /// Maximum message size for framing protocol
    max_message_size: usize,

    /// Upper bound for establishing a connection including version negotiation
    connect_timeout: Duration,
}

impl BrokerConnector {
    pub fn new(
        bootstrap_brokers: Vec<String>,
        client_id: Arc<str>,
        tls_config: TlsConfig,
        max_message_size: usize,
        backoff_config: Arc<BackoffConfig>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            bootstrap_brokers,
            client_id,
            topology: Default::default(),
            cached_arbitrary_broker: Mutex::new((None, BrokerCacheGeneration::START)),
            connections: Default::default(),
            backoff_config,
            tls_config,
            max_message_size,
            connect_timeout,
        }
    }

    pub fn backoff_config(&self) -> &Arc<BackoffConfig> {
        &self.backoff_config
    }

    /// Request metadata from an arbitrary broker, updating the topology with the result.
    ///
    /// `topics` of `None` requests all topics. Topics are never auto-created.
    pub async fn request_metadata(
        &self,
        topics: Option<Vec<String>>,
    ) -> ClientResult<MetadataResponse> {
        let request = &MetadataRequest {
            topics: topics.map(|t| {
                t.into_iter()
                    .map(|name| MetadataRequestTopic { name })
                    .collect()
            }),
            allow_auto_topic_creation: false,
        };

        let response = maybe_retry(&self.backoff_config, self, "metadata", || async move {
            let (broker, gen) = self
                .get()
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), None)))?;

            let response = broker
                .request(request)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(gen))))?;

            maybe_throttle(response.throttle_time_ms)?;

            Ok(response)
        })
        .await?;

        self.topology.update(&response.brokers);
        Ok(response)
    }

    /// Returns a connection to `broker_id`, `None` if the broker is not part of the known topology.
    pub async fn connect(&self, broker_id: i32) -> Result<Option<BrokerConnection>> {
        if let Some(conn) = self.cached_connection(broker_id) {
            return Ok(Some(conn));
        }

        let Some(broker) = self.topology.get_broker(broker_id) else {
            return Ok(None);
        };

        self.connect_broker(broker_id, &broker.address()).await.map(Some)
    }

    /// Returns a connection to `broker_id` listening on `address`.
    ///
    /// Used for brokers that are announced by a response, e.g. a group coordinator, before the topology knows them.
    pub async fn connect_at(&self, broker_id: i32, address: &str) -> Result<BrokerConnection> {
        if let Some(conn) = self.cached_connection(broker_id) {
            return Ok(conn);
        }

        self.connect_broker(broker_id, address).await
    }

    fn cached_connection(&self, broker_id: i32) -> Option<BrokerConnection> {
        let cached = self.connections.lock().get(&broker_id).cloned();
        cached.filter(|conn| !conn.is_poisoned())
    }

    async fn connect_broker(&self, broker_id: i32, address: &str) -> Result<BrokerConnection> {
        let conn = self.connect_to(address).await?;
        self.connections
            .lock()
            .insert(broker_id, Arc::clone(&conn));

        Ok(conn)
    }

    /// Drop the cached connection to `broker_id`, the next [`connect`](Self::connect) dials again.
    pub fn invalidate_broker(&self, reason: &'static str, broker_id: i32) {
        if self.connections.lock().remove(&broker_id).is_some() {
            info!(broker = broker_id, reason, "Invalidating cached broker connection");
        }
    }

    async fn connect_to(&self, url: &str) -> Result<BrokerConnection> {
        info!(broker = url, "Establishing new connection");

        let transport =
            transport::Transport::connect(url, self.tls_config.clone(), self.connect_timeout)
                .await
                .map_err(|source| Error::Transport {
                    broker: url.to_owned(),
                    source,
                })?;

        let messenger = Messenger::new(
            transport,
            self.max_message_size,
            Arc::clone(&self.client_id),
        );

        tokio::time::timeout(self.connect_timeout, messenger.sync_versions())
            .await
            .map_err(|_| Error::SyncVersionsTimeout {
                broker: url.to_owned(),
            })?
            .map_err(|source| Error::SyncVersions {
                broker: url.to_owned(),
                source,
            })?;

        Ok(Arc::new(messenger))
    }

    /// Connect to any broker, trying the known topology in random order and falling back to the bootstrap list.
    async fn connect_any(&self) -> Result<BrokerConnection> {
        let mut brokers: Vec<String> = if self.topology.is_empty() {
            self.bootstrap_brokers.clone()
        } else {
            self.topology
                .get_brokers()
                .iter()
                .map(|b| b.address())
                .collect()
        };
        brokers.shuffle(&mut thread_rng());

        let mut tried = Vec::with_capacity(brokers.len());
        for broker in brokers {
            match self.connect_to(&broker).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    warn!(e=%e, broker, "Failed to connect to broker");
                    tried.push(broker);
                }
            }
        }

        error!(?tried, "No broker reachable");
        Err(Error::NoBrokerReachable { tried })
    }
}

/// Caches the arbitrary broker used for metadata requests.
#[async_trait]
impl BrokerCache for &BrokerConnector {
    type R = MessengerTransport;
    type E = Error;

    async fn get(&self) -> Result<(Arc<Self::R>, BrokerCacheGeneration)> {
        let mut current_broker = self.cached_arbitrary_broker.lock().await;
        if let Some(broker) = &current_broker.0 {
            if !broker.is_poisoned() {
                return Ok((Arc::clone(broker), current_broker.1));
            }
        }

        let connection = self.connect_any().await?;
        current_broker.0 = Some(Arc::clone(&connection));
        current_broker.1.bump();

        Ok((connection, current_broker.1))
    }

    async fn invalidate(&self, reason: &'static str, gen: BrokerCacheGeneration) {
        let mut guard = self.cached_arbitrary_broker.lock().await;

        if guard.1 != gen {
            // stale request
            debug!(
                reason,
                current_gen = guard.1.get(),
                request_gen = gen.get(),
                "stale invalidation request for arbitrary broker cache",
            );
            return;
        }

        info!(reason, "Invalidating cached arbitrary broker");
        guard.0.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(bootstrap: Vec<String>) -> BrokerConnector {
        BrokerConnector::new(
            bootstrap,
            Arc::from("test"),
            TlsConfig::default(),
            1024,
            Arc::new(BackoffConfig::default()),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn test_generation() {
        let mut gen = BrokerCacheGeneration::START;
        assert_eq!(gen.get(), 0);
        gen.bump();
        assert_eq!(gen.get(), 1);
        assert_ne!(gen, BrokerCacheGeneration::START);
    }

    #[tokio::test]
    async fn test_connect_unknown_broker() {
        let brokers = connector(vec![]);
        assert!(brokers.connect(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_broker_reachable() {
        // nothing listens on the discard port of a reserved documentation address
        let bootstrap = vec![String::from("192.0.2.1:9")];
        let brokers = connector(bootstrap.clone());

        let err = (&brokers).get().await.unwrap_err();
        match err {
            Error::NoBrokerReachable { tried } => assert_eq!(tried, bootstrap),
            e => panic!("unexpected error: {e}"),
        }
    }

    #[tokio::test]
    async fn test_stale_invalidation_is_ignored() {
        let brokers = connector(vec![]);
        (&brokers)
            .invalidate("test", BrokerCacheGeneration(5))
            .await;
        assert_eq!(
            brokers.cached_arbitrary_broker.lock().await.1,
            BrokerCacheGeneration::START
        );
    }
}
