//! Consumer group partition checks.
//!
//! Each check ("tick") compares the partitions a group has committed offsets for with the partitions the cluster
//! currently reports for the same topic. Partitions the group never committed are reported as [`Finding`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use thiserror::Error;

use crate::client::error::Error as ClientError;

pub mod fetcher;
pub mod poller;
pub mod reconcile;
pub mod scheduler;
pub mod sink;

pub use fetcher::{ClusterMetadata, KafkaMetadataFetcher};
pub use poller::{Poller, TickOutcome, TickReport};
pub use reconcile::{compare_assignment, Reconciliation};
pub use sink::{ChannelSink, FindingSink, TracingSink};

/// Partition IDs of one topic.
pub type PartitionSet = BTreeSet<i32>;

/// Key of [`GroupTopicPartitions`].
///
/// Ordered by topic first, so all groups of one topic are adjacent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopicGroup {
    pub topic: String,
    pub group: String,
}

impl TopicGroup {
    pub fn new(topic: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
        }
    }
}

/// Partitions every group has committed offsets for, per `(topic, group)`.
pub type GroupTopicPartitions = BTreeMap<TopicGroup, PartitionSet>;

/// A partition that exists on `topic` but `group` has no committed offset for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Finding {
    pub group: String,
    pub topic: String,
    pub partition: i32,
}

impl Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "group {} missing partition {}-{}",
            self.group, self.topic, self.partition
        )
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CheckError {
    #[error("Cluster metadata unavailable while {context}: {source}")]
    MetadataUnavailable {
        context: String,
        source: ClientError,
    },
}

impl CheckError {
    pub fn metadata_unavailable(context: impl Into<String>, source: ClientError) -> Self {
        Self::MetadataUnavailable {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_finding_display() {
        let finding = Finding {
            group: String::from("g1"),
            topic: String::from("topic1"),
            partition: 1,
        };
        assert_eq!(finding.to_string(), "group g1 missing partition topic1-1");
    }

    #[test]
    fn test_topic_major_order() {
        let keys: Vec<_> = [
            TopicGroup::new("b", "g1"),
            TopicGroup::new("a", "g2"),
            TopicGroup::new("a", "g1"),
        ]
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

        assert_eq!(
            keys,
            vec![
                TopicGroup::new("a", "g1"),
                TopicGroup::new("a", "g2"),
                TopicGroup::new("b", "g1"),
            ]
        );
    }

    #[test]
    fn test_check_error_display() {
        let err = CheckError::metadata_unavailable(
            "listing groups",
            ClientError::Timeout(Duration::from_secs(1)),
        );
        assert_eq!(
            err.to_string(),
            "Cluster metadata unavailable while listing groups: Timed out after 1s"
        );
    }
}
