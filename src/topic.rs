use std::collections::BTreeSet;

use crate::protocol::messages::MetadataResponseTopic;

/// A topic as the cluster currently reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub name: String,

    /// IDs of all partitions, including those with a partition-level error like `LEADER_NOT_AVAILABLE`.
    pub partitions: BTreeSet<i32>,
}

impl From<MetadataResponseTopic> for Topic {
    fn from(topic: MetadataResponseTopic) -> Self {
        Self {
            name: topic.name,
            partitions: topic
                .partitions
                .iter()
                .map(|p| p.partition_index)
                .collect(),
        }
    }
}
