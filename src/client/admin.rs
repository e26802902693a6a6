use std::collections::BTreeMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use super::error::{Error, ProtocolError, RequestContext, RequestError, Result};
use crate::backoff::{Backoff, BackoffConfig, ErrorOrThrottle};
use crate::connection::{BrokerCache, BrokerCacheGeneration, BrokerConnector};
use crate::protocol::messages::{
    CoordinatorType, FindCoordinatorRequest, ListGroupsRequest, ListedGroup, OffsetFetchRequest,
    OffsetFetchResponseTopic,
};
use crate::throttle::maybe_throttle;

type RetryError = ErrorOrThrottle<(Error, Option<BrokerCacheGeneration>)>;

/// Cluster-wide read-only operations on consumer groups.
#[derive(Debug)]
pub struct AdminClient {
    brokers: Arc<BrokerConnector>,

    backoff_config: Arc<BackoffConfig>,

    /// Upper bound for each broker's part of [`list_groups`](Self::list_groups)
    broker_timeout: Option<Duration>,
}

impl AdminClient {
    pub(super) fn new(brokers: Arc<BrokerConnector>) -> Self {
        let backoff_config = Arc::clone(brokers.backoff_config());
        Self {
            brokers,
            backoff_config,
            broker_timeout: None,
        }
    }

    /// Bound the metadata lookup and every broker's part of [`list_groups`](Self::list_groups) by `timeout`.
    ///
    /// A broker that takes longer counts as failed, the groups of the other brokers are still returned.
    pub fn with_broker_timeout(mut self, timeout: Duration) -> Self {
        self.broker_timeout = Some(timeout);
        self
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.broker_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => fut.await,
        }
    }

    /// List the consumer groups of all brokers in the cluster.
    ///
    /// Every broker only knows the groups it coordinates, so the request fans out to all of them. Brokers that fail
    /// are logged and skipped, the call only fails if no broker answered.
    pub async fn list_groups(&self) -> Result<Vec<ListedGroup>> {
        let metadata = self
            .bounded(self.brokers.request_metadata(Some(vec![])))
            .await?;
        let broker_count = metadata.brokers.len();

        let mut tasks = metadata
            .brokers
            .iter()
            .map(|broker| {
                let broker_id = broker.node_id;
                async move { (broker_id, self.bounded(self.list_groups_on(broker_id)).await) }
            })
            .collect::<FuturesUnordered<_>>();

        let mut groups = BTreeMap::new();
        let mut failed = 0;
        let mut last_error = None;
        while let Some((broker_id, result)) = tasks.next().await {
            match result {
                Ok(partial) => {
                    for group in partial {
                        groups.entry(group.group_id.clone()).or_insert(group);
                    }
                }
                Err(e) => {
                    warn!(broker = broker_id, e = %e, "Cannot list groups");
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if failed == broker_count => Err(e),
            _ => Ok(groups.into_values().collect()),
        }
    }

    async fn list_groups_on(&self, broker_id: i32) -> Result<Vec<ListedGroup>> {
        let request = &ListGroupsRequest::default();

        // the broker cache is unused, errors on `broker_id` invalidate its connection directly
        maybe_retry(
            &self.backoff_config,
            self.brokers.as_ref(),
            "list_groups",
            || async move {
                let broker = self
                    .brokers
                    .connect(broker_id)
                    .await
                    .map_err(|e| ErrorOrThrottle::Error((e.into(), None)))?
                    .ok_or_else(|| {
                        ErrorOrThrottle::Error((
                            Error::InvalidResponse(format!(
                                "Broker {broker_id} not found in topology"
                            )),
                            None,
                        ))
                    })?;

                let response = broker
                    .request(request)
                    .await
                    .map_err(|e| self.request_failed("list_groups", broker_id, e))?;

                maybe_throttle(response.throttle_time_ms)?;

                if let Some(protocol_error) = response.error_code {
                    return Err(ErrorOrThrottle::Error((
                        Error::ServerError {
                            protocol_error,
                            error_message: None,
                            request: RequestContext::Broker(broker_id),
                        },
                        None,
                    )));
                }

                Ok(response.groups)
            },
        )
        .await
    }

    /// Fetch the committed offsets of `group` for all topics the group has committed to.
    ///
    /// Looks up the group coordinator first and repeats the lookup when the coordinator moved in between.
    pub async fn group_offsets(&self, group: &str) -> Result<Vec<OffsetFetchResponseTopic>> {
        let find_request = &FindCoordinatorRequest {
            key: group.to_owned(),
            key_type: CoordinatorType::Group,
            tagged_fields: None,
        };
        let fetch_request = &OffsetFetchRequest {
            group_id: group.to_owned(),
            require_stable: false,
            tagged_fields: None,
        };

        maybe_retry(
            &self.backoff_config,
            self.brokers.as_ref(),
            "offset_fetch",
            || async move {
                let (coordinator_id, address) = self.find_coordinator(find_request).await?;

                let coordinator = self
                    .brokers
                    .connect_at(coordinator_id, &address)
                    .await
                    .map_err(|e| ErrorOrThrottle::Error((e.into(), None)))?;

                let response = coordinator
                    .request(fetch_request)
                    .await
                    .map_err(|e| self.request_failed("offset_fetch", coordinator_id, e))?;

                maybe_throttle(response.throttle_time_ms)?;

                if let Some(protocol_error) = response.error_code {
                    return Err(ErrorOrThrottle::Error((
                        Error::ServerError {
                            protocol_error,
                            error_message: None,
                            request: RequestContext::Group(fetch_request.group_id.clone()),
                        },
                        None,
                    )));
                }

                Ok(response.topics)
            },
        )
        .await
    }

    /// One coordinator lookup through the arbitrary broker, yielding the coordinator's ID and address.
    async fn find_coordinator(
        &self,
        request: &FindCoordinatorRequest,
    ) -> Result<(i32, String), RetryError> {
        let (broker, gen) = self
            .brokers
            .as_ref()
            .get()
            .await
            .map_err(|e| ErrorOrThrottle::Error((e.into(), None)))?;

        let response = broker
            .request(request)
            .await
            .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(gen))))?;

        maybe_throttle(Some(response.throttle_time_ms))?;

        if let Some(protocol_error) = response.error_code {
            return Err(ErrorOrThrottle::Error((
                Error::ServerError {
                    protocol_error,
                    error_message: response.error_message,
                    request: RequestContext::Group(request.key.clone()),
                },
                Some(gen),
            )));
        }

        debug!(
            group = request.key.as_str(),
            coordinator = response.node_id,
            "Found group coordinator",
        );

        Ok((
            response.node_id,
            format!("{}:{}", response.host, response.port),
        ))
    }

    fn request_failed(
        &self,
        request_name: &'static str,
        broker_id: i32,
        e: RequestError,
    ) -> RetryError {
        if matches!(e, RequestError::Poisoned(_) | RequestError::IO(_)) {
            self.brokers.invalidate_broker(request_name, broker_id);
        }
        ErrorOrThrottle::Error((e.into(), None))
    }
}

/// Takes a `request_name` and a function yielding a fallible future
/// and handles certain classes of error
pub async fn maybe_retry<B, R, F, T>(
    backoff_config: &BackoffConfig,
    broker_cache: B,
    request_name: &str,
    f: R,
) -> Result<T>
where
    B: BrokerCache,
    R: (Fn() -> F) + Send + Sync,
    F: std::future::Future<Output = Result<T, RetryError>> + Send,
{
    let mut backoff = Backoff::new(backoff_config);

    backoff
        .retry_with_backoff(request_name, || async {
            let (error, cache_gen) = match f().await {
                Ok(v) => {
                    return ControlFlow::Break(Ok(v));
                }
                Err(ErrorOrThrottle::Throttle(t)) => {
                    return ControlFlow::Continue(ErrorOrThrottle::Throttle(t));
                }
                Err(ErrorOrThrottle::Error(e)) => e,
            };

            match error {
                // broken connection
                Error::Request(RequestError::Poisoned(_) | RequestError::IO(_))
                | Error::Connection(_) => {
                    if let Some(cache_gen) = cache_gen {
                        broker_cache
                            .invalidate("admin client: connection broken", cache_gen)
                            .await
                    }
                }

                // coordinator moved or is still loading, leader election etc.
                Error::ServerError { protocol_error, .. }
                    if protocol_error.is_retriable()
                        && protocol_error != ProtocolError::UnknownTopicOrPartition => {}

                // fatal, the caller decides how loud this is
                _ => {
                    debug!(
                        e=%error,
                        request_name,
                        "request encountered fatal error",
                    );
                    return ControlFlow::Break(Err(error));
                }
            }
            ControlFlow::Continue(ErrorOrThrottle::Error(error))
        })
        .await
        .map_err(Error::RetryFailed)?
}
