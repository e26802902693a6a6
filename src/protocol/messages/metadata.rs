use std::io::{Read, Write};

use super::{
    read_versioned_array, write_versioned_array, ReadVersionedError, ReadVersionedType,
    RequestBody, WriteVersionedError, WriteVersionedType,
};
use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error,
    traits::{ReadType, WriteType},
};

#[cfg(test)]
use proptest::prelude::*;

#[derive(Debug)]
pub struct MetadataRequest {
    /// The topics to fetch metadata for.
    ///
    /// Requests data for all topics if `None`. Version 0 cannot express null, it sends an empty array which brokers
    /// treat as "all topics" there.
    pub topics: Option<Vec<MetadataRequestTopic>>,

    /// If this is true, the broker may auto-create topics that we requested which do not already exist, if it is
    /// configured to do so.
    ///
    /// Added in version 4; older brokers always behave as if it was `true`.
    pub allow_auto_topic_creation: bool,
}

impl RequestBody for MetadataRequest {
    type ResponseBody = MetadataResponse;

    const API_KEY: ApiKey = ApiKey::Metadata;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 4);

    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion::new(9);
}

impl<W> WriteVersionedType<W> for MetadataRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        match (&self.topics, v) {
            (None, 0) => {
                write_versioned_array::<_, MetadataRequestTopic>(writer, version, Some(&[][..]))?
            }
            (topics, _) => write_versioned_array(writer, version, topics.as_deref())?,
        }

        if v >= 4 {
            self.allow_auto_topic_creation.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct MetadataRequestTopic {
    /// The topic name.
    pub name: String,
}

impl<W> WriteVersionedType<W> for MetadataRequestTopic
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert!(version.0 <= 4);
        Ok(self.name.write(writer)?)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct MetadataResponse {
    /// The duration in milliseconds for which the request was throttled due to a quota violation, or zero if the
    /// request did not violate any quota.
    ///
    /// Added in version 3.
    pub throttle_time_ms: Option<i32>,

    /// Each broker in the response.
    #[cfg_attr(
        test,
        proptest(strategy = "prop::collection::vec(any::<MetadataResponseBroker>(), 0..2)")
    )]
    pub brokers: Vec<MetadataResponseBroker>,

    /// The cluster ID that responding broker belongs to.
    ///
    /// Added in version 2.
    pub cluster_id: Option<String>,

    /// The ID of the controller broker.
    ///
    /// Added in version 1.
    pub controller_id: Option<i32>,

    /// Each topic in the response.
    #[cfg_attr(
        test,
        proptest(strategy = "prop::collection::vec(any::<MetadataResponseTopic>(), 0..2)")
    )]
    pub topics: Vec<MetadataResponseTopic>,
}

impl<R> ReadVersionedType<R> for MetadataResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        let throttle_time_ms = (v >= 3).then(|| i32::read(reader)).transpose()?;
        let brokers = read_versioned_array(reader, version)?.unwrap_or_default();
        let cluster_id = if v >= 2 {
            ReadType::read(reader)?
        } else {
            None
        };
        let controller_id = (v >= 1).then(|| i32::read(reader)).transpose()?;
        let topics = read_versioned_array(reader, version)?.unwrap_or_default();

        Ok(Self {
            throttle_time_ms,
            brokers,
            cluster_id,
            controller_id,
            topics,
        })
    }
}

// only used by tests
impl<W> WriteVersionedType<W> for MetadataResponse
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        if v >= 3 {
            self.throttle_time_ms.unwrap_or(0).write(writer)?;
        }
        write_versioned_array(writer, version, Some(self.brokers.as_slice()))?;
        if v >= 2 {
            self.cluster_id.write(writer)?;
        }
        if v >= 1 {
            self.controller_id.unwrap_or(-1).write(writer)?;
        }
        write_versioned_array(writer, version, Some(self.topics.as_slice()))?;

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct MetadataResponseBroker {
    /// The broker ID.
    pub node_id: i32,

    /// The broker hostname.
    pub host: String,

    /// The broker port.
    pub port: i32,

    /// The rack of the broker, or null if it has not been assigned to a rack.
    ///
    /// Added in version 1.
    pub rack: Option<String>,
}

impl<R> ReadVersionedType<R> for MetadataResponseBroker
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        Ok(Self {
            node_id: i32::read(reader)?,
            host: String::read(reader)?,
            port: i32::read(reader)?,
            rack: if v >= 1 {
                ReadType::read(reader)?
            } else {
                None
            },
        })
    }
}

impl<W> WriteVersionedType<W> for MetadataResponseBroker
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        self.node_id.write(writer)?;
        self.host.write(writer)?;
        self.port.write(writer)?;
        if v >= 1 {
            self.rack.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct MetadataResponseTopic {
    /// The topic error if any.
    #[cfg_attr(test, proptest(strategy = "any::<i16>().prop_map(Error::new)"))]
    pub error: Option<Error>,

    /// The topic name.
    pub name: String,

    /// True if the topic is internal.
    ///
    /// Added in version 1.
    pub is_internal: Option<bool>,

    /// Each partition in the topic.
    #[cfg_attr(
        test,
        proptest(strategy = "prop::collection::vec(any::<MetadataResponsePartition>(), 0..2)")
    )]
    pub partitions: Vec<MetadataResponsePartition>,
}

impl<R> ReadVersionedType<R> for MetadataResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        Ok(Self {
            error: Error::new(i16::read(reader)?),
            name: String::read(reader)?,
            is_internal: (v >= 1).then(|| bool::read(reader)).transpose()?,
            partitions: read_versioned_array(reader, version)?.unwrap_or_default(),
        })
    }
}

impl<W> WriteVersionedType<W> for MetadataResponseTopic
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        self.error.map(|e| e.code()).unwrap_or(0).write(writer)?;
        self.name.write(writer)?;
        if v >= 1 {
            self.is_internal.unwrap_or_default().write(writer)?;
        }
        write_versioned_array(writer, version, Some(self.partitions.as_slice()))?;

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct MetadataResponsePartition {
    /// The partition error if any.
    #[cfg_attr(test, proptest(strategy = "any::<i16>().prop_map(Error::new)"))]
    pub error: Option<Error>,

    /// The partition index.
    pub partition_index: i32,

    /// The ID of the leader broker.
    pub leader_id: i32,

    /// The set of all nodes that host this partition.
    pub replica_nodes: Vec<i32>,

    /// The set of all nodes that are in sync with the leader for this partition.
    pub isr_nodes: Vec<i32>,
}

impl<R> ReadVersionedType<R> for MetadataResponsePartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert!(version.0 <= 4);

        Ok(Self {
            error: Error::new(i16::read(reader)?),
            partition_index: i32::read(reader)?,
            leader_id: i32::read(reader)?,
            replica_nodes: ReadType::read(reader)?,
            isr_nodes: ReadType::read(reader)?,
        })
    }
}

impl<W> WriteVersionedType<W> for MetadataResponsePartition
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert!(version.0 <= 4);

        self.error.map(|e| e.code()).unwrap_or(0).write(writer)?;
        self.partition_index.write(writer)?;
        self.leader_id.write(writer)?;
        self.replica_nodes.write(writer)?;
        self.isr_nodes.write(writer)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::test_utils::{
        assert_read_versioned, assert_write_versioned, test_roundtrip_versioned,
    };

    test_roundtrip_versioned!(
        MetadataResponse,
        MetadataRequest::API_VERSION_RANGE.min(),
        MetadataRequest::API_VERSION_RANGE.max(),
        test_roundtrip_metadata_response
    );

    #[test]
    fn request_named_topic_v4() {
        let req = MetadataRequest {
            topics: Some(vec![MetadataRequestTopic {
                name: String::from("foo"),
            }]),
            allow_auto_topic_creation: false,
        };

        assert_write_versioned!(
            req,
            4,
            vec![
                0x00, 0x00, 0x00, 0x01, // topics length
                0x00, 0x03, b'f', b'o', b'o', // topic name
                0x00, // allow auto topic creation
            ]
        );
    }

    #[test]
    fn request_all_topics() {
        let req = MetadataRequest {
            topics: None,
            allow_auto_topic_creation: false,
        };

        assert_write_versioned!(req, 0, vec![0x00, 0x00, 0x00, 0x00]);
        assert_write_versioned!(req, 1, vec![0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn response_unknown_topic_v1() {
        let data = vec![
            0x00, 0x00, 0x00, 0x01, // brokers length
            0x00, 0x00, 0x00, 0x01, // node id
            0x00, 0x02, b'k', b'1', // host
            0x00, 0x00, 0x23, 0x84, // port 9092
            0xff, 0xff, // rack
            0x00, 0x00, 0x00, 0x01, // controller id
            0x00, 0x00, 0x00, 0x01, // topics length
            0x00, 0x03, // UnknownTopicOrPartition
            0x00, 0x03, b'f', b'o', b'o', // topic name
            0x00, // is internal
            0x00, 0x00, 0x00, 0x00, // partitions length
        ];

        let want = MetadataResponse {
            throttle_time_ms: None,
            brokers: vec![MetadataResponseBroker {
                node_id: 1,
                host: String::from("k1"),
                port: 9092,
                rack: None,
            }],
            cluster_id: None,
            controller_id: Some(1),
            topics: vec![MetadataResponseTopic {
                error: Some(Error::UnknownTopicOrPartition),
                name: String::from("foo"),
                is_internal: Some(false),
                partitions: vec![],
            }],
        };

        assert_read_versioned!(MetadataResponse, data, 1, want);
    }

    #[test]
    fn response_partitions_v0() {
        let data = vec![
            0x00, 0x00, 0x00, 0x00, // brokers length
            0x00, 0x00, 0x00, 0x01, // topics length
            0x00, 0x00, // no error
            0x00, 0x01, b't', // topic name
            0x00, 0x00, 0x00, 0x02, // partitions length
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, // p0, leader 2
            0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, // replicas [2]
            0x00, 0x00, 0x00, 0x00, // isr []
            0x00, 0x05, 0x00, 0x00, 0x00, 0x01, 0xff, 0xff, 0xff, 0xff, // p1, LeaderNotAvailable
            0x00, 0x00, 0x00, 0x00, // replicas []
            0xff, 0xff, 0xff, 0xff, // isr null
        ];

        let want = MetadataResponse {
            throttle_time_ms: None,
            brokers: vec![],
            cluster_id: None,
            controller_id: None,
            topics: vec![MetadataResponseTopic {
                error: None,
                name: String::from("t"),
                is_internal: None,
                partitions: vec![
                    MetadataResponsePartition {
                        error: None,
                        partition_index: 0,
                        leader_id: 2,
                        replica_nodes: vec![2],
                        isr_nodes: vec![],
                    },
                    MetadataResponsePartition {
                        error: Some(Error::LeaderNotAvailable),
                        partition_index: 1,
                        leader_id: -1,
                        replica_nodes: vec![],
                        isr_nodes: vec![],
                    },
                ],
            }],
        };

        assert_read_versioned!(MetadataResponse, data, 0, want);
    }
}
