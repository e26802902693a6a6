use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use parking_lot::RwLock;
use tracing::info;

use crate::protocol::messages::MetadataResponseBroker;

/// Brokers of the cluster as last reported by a metadata response.
#[derive(Debug, Default)]
pub struct BrokerTopology {
    /// Brokers keyed by broker ID
    topology: RwLock<BTreeMap<i32, Broker>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broker {
    /// broker ID from the topology metadata
    pub id: i32,
    host: String,
    port: i32,
}

impl Broker {
    /// `host:port` to connect to.
    pub fn address(&self) -> String {
        self.to_string()
    }
}

impl Display for Broker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl<'a> From<&'a MetadataResponseBroker> for Broker {
    fn from(b: &'a MetadataResponseBroker) -> Self {
        Self {
            id: b.node_id,
            host: b.host.clone(),
            port: b.port,
        }
    }
}

impl BrokerTopology {
    pub fn is_empty(&self) -> bool {
        self.topology.read().is_empty()
    }

    /// Returns the broker for the provided broker ID
    pub fn get_broker(&self, broker_id: i32) -> Option<Broker> {
        self.topology.read().get(&broker_id).cloned()
    }

    /// Returns all brokers ordered by ID
    pub fn get_brokers(&self) -> Vec<Broker> {
        self.topology.read().values().cloned().collect()
    }

    /// Replace the topology with the provided broker metadata.
    ///
    /// An empty broker list is ignored, a metadata response always names at least the broker answering it.
    pub fn update(&self, brokers: &[MetadataResponseBroker]) {
        if brokers.is_empty() {
            return;
        }

        let mut topology = self.topology.write();

        topology.retain(|id, current| {
            let keep = brokers.iter().any(|b| b.node_id == *id);
            if !keep {
                info!(broker = id, current = %current, "Broker removed");
            }
            keep
        });

        for broker in brokers {
            let new = Broker::from(broker);
            match topology.entry(broker.node_id) {
                Entry::Occupied(mut o) => {
                    let current = o.get_mut();
                    if *current != new {
                        info!(
                            broker = broker.node_id,
                            current = %current,
                            new = %new,
                            "Broker update",
                        );
                        *current = new;
                    }
                }
                Entry::Vacant(v) => {
                    info!(broker = broker.node_id, new = %new, "New broker");
                    v.insert(new);
                }
            }
        }
    }
}
