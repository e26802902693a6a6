use super::PartitionSet;

/// Outcome of comparing a topic's partitions with a group's committed partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// `missing` is empty.
    pub in_sync: bool,

    /// Partitions of the topic the group has no committed offset for.
    pub missing: PartitionSet,
}

/// Compare partition IDs only. Partitions the group committed but the topic no longer has are ignored.
pub fn compare_assignment(
    topic_partitions: &PartitionSet,
    group_partitions: &PartitionSet,
) -> Reconciliation {
    let missing: PartitionSet = topic_partitions
        .difference(group_partitions)
        .copied()
        .collect();

    Reconciliation {
        in_sync: missing.is_empty(),
        missing,
    }
}
