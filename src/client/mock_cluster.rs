//! Brokers faked over TCP, answering the requests the admin client sends.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::{Client, ClientBuilder};
use crate::backoff::BackoffConfig;
use crate::protocol::{
    api_key::ApiKey,
    api_version::ApiVersion,
    error::Error as ProtocolError,
    frame::{AsyncMessageRead, AsyncMessageWrite},
    messages::{
        ApiVersionsResponse, ApiVersionsResponseApiKey, FindCoordinatorResponse,
        ListGroupsResponse, ListedGroup, MetadataResponse, MetadataResponseBroker,
        OffsetFetchResponse, OffsetFetchResponseTopic, OffsetFetchResponseTopicPartition,
        ReadVersionedType, RequestHeader, ResponseHeader, WriteVersionedType,
    },
    primitives::TaggedFields,
    traits::ReadType,
};

const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// What a group's OffsetFetch returns.
#[derive(Debug, Clone)]
pub(crate) enum GroupOffsets {
    /// `(topic, [(partition, offset)])`
    Committed(Vec<(String, Vec<(i32, i64)>)>),

    Failed(ProtocolError),
}

#[derive(Debug)]
struct BrokerSpec {
    id: i32,
    responsive: bool,

    /// Groups this broker coordinates
    groups: Vec<(String, GroupOffsets)>,
}

#[derive(Debug, Default)]
pub(crate) struct MockClusterBuilder {
    brokers: Vec<BrokerSpec>,
}

impl MockClusterBuilder {
    pub(crate) fn broker(mut self, id: i32) -> Self {
        self.brokers.push(BrokerSpec {
            id,
            responsive: true,
            groups: vec![],
        });
        self
    }

    /// A broker that accepts connections but never answers.
    pub(crate) fn unresponsive_broker(mut self, id: i32) -> Self {
        self.brokers.push(BrokerSpec {
            id,
            responsive: false,
            groups: vec![],
        });
        self
    }

    /// Let the last added broker coordinate `group`.
    pub(crate) fn group(mut self, group: &str, offsets: GroupOffsets) -> Self {
        self.brokers
            .last_mut()
            .expect("add a broker first")
            .groups
            .push((group.to_owned(), offsets));
        self
    }

    pub(crate) async fn start(self) -> MockCluster {
        let mut listeners = Vec::with_capacity(self.brokers.len());
        for spec in self.brokers {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listeners.push((spec, listener));
        }

        let mut brokers = Vec::with_capacity(listeners.len());
        for (spec, listener) in &listeners {
            let addr = listener.local_addr().unwrap();
            brokers.push(MockBroker {
                id: spec.id,
                host: addr.ip().to_string(),
                port: i32::from(addr.port()),
                responsive: spec.responsive,
            });
        }

        let mut coordinators = BTreeMap::new();
        let mut listed = BTreeMap::new();
        for (spec, _) in &listeners {
            for (group, offsets) in &spec.groups {
                coordinators.insert(group.clone(), (spec.id, offsets.clone()));
                listed
                    .entry(spec.id)
                    .or_insert_with(Vec::new)
                    .push(group.clone());
            }
        }

        let state = Arc::new(ClusterState {
            brokers,
            coordinators,
            listed,
        });

        let tasks = listeners
            .into_iter()
            .map(|(spec, listener)| {
                tokio::spawn(accept(listener, spec.id, spec.responsive, Arc::clone(&state)))
            })
            .collect();

        MockCluster { state, tasks }
    }
}

#[derive(Debug)]
struct MockBroker {
    id: i32,
    host: String,
    port: i32,
    responsive: bool,
}

impl MockBroker {
    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug)]
struct ClusterState {
    brokers: Vec<MockBroker>,

    /// Coordinator ID and offsets per group
    coordinators: BTreeMap<String, (i32, GroupOffsets)>,

    /// Groups reported by ListGroups per broker ID
    listed: BTreeMap<i32, Vec<String>>,
}

#[derive(Debug)]
pub(crate) struct MockCluster {
    state: Arc<ClusterState>,
    tasks: Vec<JoinHandle<()>>,
}

impl MockCluster {
    pub(crate) fn builder() -> MockClusterBuilder {
        MockClusterBuilder::default()
    }

    /// Addresses of the brokers that answer.
    pub(crate) fn bootstrap_brokers(&self) -> Vec<String> {
        self.state
            .brokers
            .iter()
            .filter(|b| b.responsive)
            .map(|b| b.address())
            .collect()
    }

    /// A client wired the way the binary wires it, with every bound set to `timeout`.
    pub(crate) fn client(&self, timeout: Duration) -> Client {
        ClientBuilder::new(self.bootstrap_brokers())
            .connect_timeout(timeout)
            .backoff_config(BackoffConfig {
                deadline: Some(timeout),
                ..Default::default()
            })
            .build()
    }
}

impl Drop for MockCluster {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn accept(listener: TcpListener, broker_id: i32, responsive: bool, state: Arc<ClusterState>) {
    while let Ok((stream, _)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if responsive {
                serve(stream, broker_id, &state).await;
            } else {
                // hold the connection open without ever answering
                let _stream = stream;
                std::future::pending::<()>().await;
            }
        });
    }
}

async fn serve(mut stream: TcpStream, broker_id: i32, state: &ClusterState) {
    while let Ok(msg) = stream.read_message(MAX_MESSAGE_SIZE).await {
        let mut request = Cursor::new(msg);

        // a v2 header only adds tagged fields after the client ID, which no handler below reads
        let header = RequestHeader::read_versioned(&mut request, ApiVersion(1)).unwrap();
        let version = header.request_api_version;

        let mut buf = Vec::new();
        ResponseHeader {
            correlation_id: header.correlation_id,
            tagged_fields: None,
        }
        .write_versioned(&mut buf, ApiVersion(0))
        .unwrap();

        match header.request_api_key {
            ApiKey::ApiVersions => state.api_versions().write_versioned(&mut buf, version),
            ApiKey::Metadata => state.metadata().write_versioned(&mut buf, version),
            ApiKey::ListGroups => state.list_groups(broker_id).write_versioned(&mut buf, version),
            ApiKey::FindCoordinator => {
                let key = String::read(&mut request).unwrap();
                state.find_coordinator(&key).write_versioned(&mut buf, version)
            }
            ApiKey::OffsetFetch => {
                let group = String::read(&mut request).unwrap();
                state.offset_fetch(&group).write_versioned(&mut buf, version)
            }
            ApiKey::Unknown(key) => panic!("unexpected API key {key}"),
        }
        .unwrap();

        if stream.write_message(&buf).await.is_err() {
            return;
        }
    }
}

impl ClusterState {
    fn api_versions(&self) -> ApiVersionsResponse {
        // non-flexible versions only, so every response uses header v0
        let api_key = |api_key, min, max| ApiVersionsResponseApiKey {
            api_key,
            min_version: ApiVersion(min),
            max_version: ApiVersion(max),
            tagged_fields: Some(TaggedFields::default()),
        };

        ApiVersionsResponse {
            error_code: None,
            api_keys: vec![
                api_key(ApiKey::ApiVersions, 0, 3),
                api_key(ApiKey::Metadata, 0, 4),
                api_key(ApiKey::ListGroups, 0, 2),
                api_key(ApiKey::FindCoordinator, 1, 2),
                api_key(ApiKey::OffsetFetch, 2, 5),
            ],
            throttle_time_ms: Some(0),
            tagged_fields: Some(TaggedFields::default()),
        }
    }

    fn metadata(&self) -> MetadataResponse {
        MetadataResponse {
            throttle_time_ms: Some(0),
            brokers: self
                .brokers
                .iter()
                .map(|b| MetadataResponseBroker {
                    node_id: b.id,
                    host: b.host.clone(),
                    port: b.port,
                    rack: None,
                })
                .collect(),
            cluster_id: Some(String::from("mock")),
            controller_id: self.brokers.first().map(|b| b.id),
            topics: vec![],
        }
    }

    fn list_groups(&self, broker_id: i32) -> ListGroupsResponse {
        ListGroupsResponse {
            throttle_time_ms: Some(0),
            error_code: None,
            groups: self
                .listed
                .get(&broker_id)
                .into_iter()
                .flatten()
                .map(|group| ListedGroup {
                    group_id: group.clone(),
                    protocol_type: String::from("consumer"),
                    group_state: None,
                    tagged_fields: None,
                })
                .collect(),
            tagged_fields: None,
        }
    }

    fn find_coordinator(&self, group: &str) -> FindCoordinatorResponse {
        let coordinator = self
            .coordinators
            .get(group)
            .and_then(|(id, _)| self.brokers.iter().find(|b| b.id == *id));

        match coordinator {
            Some(broker) => FindCoordinatorResponse {
                throttle_time_ms: 0,
                error_code: None,
                error_message: None,
                node_id: broker.id,
                host: broker.host.clone(),
                port: broker.port,
                tagged_fields: None,
            },
            None => FindCoordinatorResponse {
                throttle_time_ms: 0,
                error_code: Some(ProtocolError::CoordinatorNotAvailable),
                error_message: None,
                node_id: -1,
                host: String::new(),
                port: -1,
                tagged_fields: None,
            },
        }
    }

    fn offset_fetch(&self, group: &str) -> OffsetFetchResponse {
        let (topics, error_code) = match self.coordinators.get(group) {
            Some((_, GroupOffsets::Committed(topics))) => (
                topics
                    .iter()
                    .map(|(name, partitions)| OffsetFetchResponseTopic {
                        name: name.clone(),
                        partitions: partitions
                            .iter()
                            .map(|(partition_index, committed_offset)| {
                                OffsetFetchResponseTopicPartition {
                                    partition_index: *partition_index,
                                    committed_offset: *committed_offset,
                                    committed_leader_epoch: Some(0),
                                    metadata: Some(String::new()),
                                    error_code: None,
                                    tagged_fields: None,
                                }
                            })
                            .collect(),
                        tagged_fields: None,
                    })
                    .collect(),
                None,
            ),
            Some((_, GroupOffsets::Failed(e))) => (vec![], Some(*e)),
            None => (vec![], Some(ProtocolError::GroupIdNotFound)),
        };

        OffsetFetchResponse {
            throttle_time_ms: Some(0),
            topics,
            error_code,
            tagged_fields: None,
        }
    }
}
