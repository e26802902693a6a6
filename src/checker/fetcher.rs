use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{CheckError, GroupTopicPartitions, PartitionSet, TopicGroup};
use crate::client::admin::AdminClient;
use crate::client::error::{Error as ClientError, ProtocolError};
use crate::client::Client;
use crate::protocol::messages::{OffsetFetchResponseTopic, NO_COMMITTED_OFFSET};

/// Read access to the cluster state a check needs.
#[async_trait]
pub trait ClusterMetadata: Send + Sync {
    /// Partitions every consumer group has committed offsets for, keyed by `(topic, group)`.
    ///
    /// Groups without committed offsets, and groups that vanish while listing, contribute no entries.
    async fn list_group_partition_assignments(&self) -> Result<GroupTopicPartitions, CheckError>;

    /// Current partitions of `topic`, `None` if the topic does not exist.
    async fn list_topic_partitions(&self, topic: &str) -> Result<Option<PartitionSet>, CheckError>;
}

/// [`ClusterMetadata`] backed by a Kafka cluster.
///
/// Every call to the cluster is bounded by `request_timeout`. Listing groups fans out to all brokers, there the bound
/// applies to each broker separately so an unresponsive broker only hides its own groups.
#[derive(Debug)]
pub struct KafkaMetadataFetcher {
    client: Client,
    admin: AdminClient,
    request_timeout: Duration,
}

impl KafkaMetadataFetcher {
    pub fn new(client: Client, request_timeout: Duration) -> Self {
        let admin = client.admin_client().with_broker_timeout(request_timeout);
        Self {
            client,
            admin,
            request_timeout,
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>> + Send,
    {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| ClientError::Timeout(self.request_timeout))?
    }
}

#[async_trait]
impl ClusterMetadata for KafkaMetadataFetcher {
    async fn list_group_partition_assignments(&self) -> Result<GroupTopicPartitions, CheckError> {
        let groups = self
            .admin
            .list_groups()
            .await
            .map_err(|e| CheckError::metadata_unavailable("listing consumer groups", e))?;

        let mut assignments = GroupTopicPartitions::new();
        for group in groups {
            let group_id = group.group_id.as_str();

            match self.bounded(self.admin.group_offsets(group_id)).await {
                Ok(topics) => collect_committed(group_id, topics, &mut assignments),
                Err(e) if e.protocol_error() == Some(ProtocolError::GroupIdNotFound) => {
                    debug!(group = group_id, "Group vanished, skipping");
                }
                Err(e) => {
                    warn!(group = group_id, e = %e, "Cannot fetch committed offsets, skipping group");
                }
            }
        }

        Ok(assignments)
    }

    async fn list_topic_partitions(&self, topic: &str) -> Result<Option<PartitionSet>, CheckError> {
        let topic_metadata = self
            .bounded(self.client.topic_partitions(topic))
            .await
            .map_err(|e| {
                CheckError::metadata_unavailable(format!("looking up topic \"{topic}\""), e)
            })?;

        Ok(topic_metadata.map(|t| t.partitions))
    }
}

/// Add the committed partitions of `group` to `assignments`.
///
/// Partitions without a commit (offset `-1`) or with a per-partition error don't count.
pub fn collect_committed(
    group: &str,
    topics: Vec<OffsetFetchResponseTopic>,
    assignments: &mut GroupTopicPartitions,
) {
    for topic in topics {
        let committed: PartitionSet = topic
            .partitions
            .iter()
            .filter(|p| p.error_code.is_none() && p.committed_offset != NO_COMMITTED_OFFSET)
            .map(|p| p.partition_index)
            .collect();

        if committed.is_empty() {
            continue;
        }

        assignments
            .entry(TopicGroup::new(topic.name, group))
            .or_default()
            .extend(committed);
    }
}
