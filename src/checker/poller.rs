use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::reconcile::compare_assignment;
use super::{ClusterMetadata, Finding, FindingSink, PartitionSet};

/// Summary of one completed check.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// `(topic, group)` entries compared against the topic's partitions.
    pub checked: usize,

    /// Entries skipped because their topic is not in the allow-list.
    pub skipped_filtered: usize,

    /// Entries skipped because their topic doesn't exist any more.
    pub skipped_absent: usize,

    /// Entries skipped because their topic couldn't be looked up.
    pub skipped_failed: usize,

    /// Missing partitions, ordered by topic, group and partition.
    pub findings: Vec<Finding>,
}

impl TickReport {
    pub fn is_in_sync(&self) -> bool {
        self.findings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickReport),

    /// Groups or offsets couldn't be listed, nothing was checked.
    Aborted,

    /// Another tick was still running.
    Overlapped,
}

#[derive(Debug)]
enum TopicLookup {
    Present(PartitionSet),
    Absent,
    Failed,
}

/// Runs checks against the cluster.
///
/// Holds no state between ticks besides the single-flight guard.
pub struct Poller {
    metadata: Arc<dyn ClusterMetadata>,

    /// Topics to check, empty checks all
    allow_list: BTreeSet<String>,

    sink: Arc<dyn FindingSink>,

    running: Mutex<()>,
}

impl Poller {
    pub fn new(
        metadata: Arc<dyn ClusterMetadata>,
        allow_list: BTreeSet<String>,
        sink: Arc<dyn FindingSink>,
    ) -> Self {
        Self {
            metadata,
            allow_list,
            sink,
            running: Mutex::new(()),
        }
    }

    fn is_allowed(&self, topic: &str) -> bool {
        self.allow_list.is_empty() || self.allow_list.contains(topic)
    }

    /// Run one check.
    ///
    /// Returns [`TickOutcome::Overlapped`] without doing anything if another tick is in progress.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("Previous check still running, skipping tick");
            return TickOutcome::Overlapped;
        };

        let assignments = match self.metadata.list_group_partition_assignments().await {
            Ok(assignments) => assignments,
            Err(e) => {
                error!(e = %e, "Cannot list consumer group offsets, skipping check");
                return TickOutcome::Aborted;
            }
        };

        let mut report = TickReport::default();
        let mut topics: BTreeMap<&str, TopicLookup> = BTreeMap::new();

        for (key, group_partitions) in &assignments {
            let topic = key.topic.as_str();
            let group = key.group.as_str();

            if !self.is_allowed(topic) {
                warn!(topic, group, "Topic not in allow-list, skipping");
                report.skipped_filtered += 1;
                continue;
            }

            let lookup = match topics.entry(topic) {
                Entry::Occupied(o) => o.into_mut(),
                Entry::Vacant(v) => v.insert(self.lookup_topic(topic).await),
            };

            let topic_partitions = match lookup {
                TopicLookup::Present(partitions) => partitions,
                TopicLookup::Absent => {
                    debug!(topic, group, "Topic does not exist, skipping");
                    report.skipped_absent += 1;
                    continue;
                }
                TopicLookup::Failed => {
                    report.skipped_failed += 1;
                    continue;
                }
            };

            info!(group, topic, "checking group {group} on topic {topic}");
            report.checked += 1;

            let reconciliation = compare_assignment(topic_partitions, group_partitions);
            for partition in reconciliation.missing {
                let finding = Finding {
                    group: group.to_owned(),
                    topic: topic.to_owned(),
                    partition,
                };
                self.sink.emit(&finding).await;
                report.findings.push(finding);
            }
        }

        info!(
            checked = report.checked,
            skipped_filtered = report.skipped_filtered,
            skipped_absent = report.skipped_absent,
            skipped_failed = report.skipped_failed,
            findings = report.findings.len(),
            "Check done",
        );

        TickOutcome::Completed(report)
    }

    async fn lookup_topic(&self, topic: &str) -> TopicLookup {
        match self.metadata.list_topic_partitions(topic).await {
            Ok(Some(partitions)) => TopicLookup::Present(partitions),
            Ok(None) => TopicLookup::Absent,
            Err(e) => {
                error!(topic, e = %e, "Cannot look up topic partitions, skipping topic");
                TopicLookup::Failed
            }
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("allow_list", &self.allow_list)
            .finish_non_exhaustive()
    }
}
