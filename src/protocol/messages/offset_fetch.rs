use std::io::{Read, Write};

use super::{
    read_compact_versioned_array, read_versioned_array, write_compact_versioned_array,
    write_versioned_array, ReadVersionedError, ReadVersionedType, RequestBody,
    WriteVersionedError, WriteVersionedType,
};
use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error,
    primitives::{TaggedFields, UnsignedVarint},
    traits::{ReadCompactType, ReadType, WriteCompactType, WriteType},
};

#[cfg(test)]
use proptest::prelude::*;

/// Offset reported for partitions without a committed offset.
pub const NO_COMMITTED_OFFSET: i64 = -1;

/// Fetches the committed offsets of a group.
///
/// Always asks for all topics the group committed to, encoded as a null topic array. Null is only understood from
/// version 2 on.
#[derive(Debug)]
pub struct OffsetFetchRequest {
    /// The group to fetch offsets for.
    pub group_id: String,

    /// Whether broker should hold on returning unstable offsets but set a retriable error code for the partitions.
    ///
    /// Added in version 7.
    pub require_stable: bool,

    /// The tagged fields.
    ///
    /// Added in version 6.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for OffsetFetchRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!((2..=7).contains(&v));

        // null topic array
        if v >= 6 {
            self.group_id.write_compact(writer)?;
            UnsignedVarint(0).write(writer)?;
        } else {
            self.group_id.write(writer)?;
            (-1i32).write(writer)?;
        }

        if v >= 7 {
            self.require_stable.write(writer)?;
        }

        if v >= 6 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

impl RequestBody for OffsetFetchRequest {
    type ResponseBody = OffsetFetchResponse;
    const API_KEY: ApiKey = ApiKey::OffsetFetch;
    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(2, 7);
    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(6);
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct OffsetFetchResponseTopicPartition {
    /// The partition index.
    pub partition_index: i32,

    /// The committed message offset, [`NO_COMMITTED_OFFSET`] if there is none.
    pub committed_offset: i64,

    /// The leader epoch.
    ///
    /// Added in version 5.
    pub committed_leader_epoch: Option<i32>,

    /// The partition metadata.
    pub metadata: Option<String>,

    /// The error code, or 0 if there was no error.
    #[cfg_attr(test, proptest(strategy = "any::<i16>().prop_map(Error::new)"))]
    pub error_code: Option<Error>,

    /// The tagged fields.
    ///
    /// Added in version 6.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for OffsetFetchResponseTopicPartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        let partition_index = i32::read(reader)?;
        let committed_offset = i64::read(reader)?;
        let committed_leader_epoch = (v >= 5).then(|| i32::read(reader)).transpose()?;
        let metadata = if v >= 6 {
            ReadCompactType::read_compact(reader)?
        } else {
            ReadType::read(reader)?
        };
        let error_code = Error::new(i16::read(reader)?);
        let tagged_fields = (v >= 6).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            partition_index,
            committed_offset,
            committed_leader_epoch,
            metadata,
            error_code,
            tagged_fields,
        })
    }
}

impl<W> WriteVersionedType<W> for OffsetFetchResponseTopicPartition
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        self.partition_index.write(writer)?;
        self.committed_offset.write(writer)?;
        if v >= 5 {
            self.committed_leader_epoch.unwrap_or(-1).write(writer)?;
        }
        if v >= 6 {
            self.metadata.write_compact(writer)?;
        } else {
            self.metadata.write(writer)?;
        }
        self.error_code.map(|e| e.code()).unwrap_or(0).write(writer)?;
        if v >= 6 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct OffsetFetchResponseTopic {
    /// The topic name.
    pub name: String,

    /// The responses per partition.
    #[cfg_attr(
        test,
        proptest(
            strategy = "prop::collection::vec(any::<OffsetFetchResponseTopicPartition>(), 0..2)"
        )
    )]
    pub partitions: Vec<OffsetFetchResponseTopicPartition>,

    /// The tagged fields.
    ///
    /// Added in version 6.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for OffsetFetchResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        let (name, partitions) = if v >= 6 {
            (
                String::read_compact(reader)?,
                read_compact_versioned_array(reader, version)?,
            )
        } else {
            (String::read(reader)?, read_versioned_array(reader, version)?)
        };
        let tagged_fields = (v >= 6).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            name,
            partitions: partitions.unwrap_or_default(),
            tagged_fields,
        })
    }
}

impl<W> WriteVersionedType<W> for OffsetFetchResponseTopic
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        if v >= 6 {
            self.name.write_compact(writer)?;
            write_compact_versioned_array(writer, version, Some(self.partitions.as_slice()))?;
            self.tagged_fields.write(writer)?;
        } else {
            self.name.write(writer)?;
            write_versioned_array(writer, version, Some(self.partitions.as_slice()))?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct OffsetFetchResponse {
    /// The duration in milliseconds for which the request was throttled due to a quota violation, or zero if the
    /// request did not violate any quota.
    ///
    /// Added in version 3.
    pub throttle_time_ms: Option<i32>,

    /// The responses per topic.
    #[cfg_attr(
        test,
        proptest(strategy = "prop::collection::vec(any::<OffsetFetchResponseTopic>(), 0..2)")
    )]
    pub topics: Vec<OffsetFetchResponseTopic>,

    /// The top-level error code, or 0 if there was no error.
    ///
    /// Added in version 2.
    #[cfg_attr(test, proptest(strategy = "any::<i16>().prop_map(Error::new)"))]
    pub error_code: Option<Error>,

    /// The tagged fields.
    ///
    /// Added in version 6.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for OffsetFetchResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        let throttle_time_ms = (v >= 3).then(|| i32::read(reader)).transpose()?;
        let topics = if v >= 6 {
            read_compact_versioned_array(reader, version)?
        } else {
            read_versioned_array(reader, version)?
        }
        .unwrap_or_default();
        let error_code = if v >= 2 {
            Error::new(i16::read(reader)?)
        } else {
            None
        };
        let tagged_fields = (v >= 6).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            throttle_time_ms,
            topics,
            error_code,
            tagged_fields,
        })
    }
}

// only used by tests
impl<W> WriteVersionedType<W> for OffsetFetchResponse
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 7);

        if v >= 3 {
            self.throttle_time_ms.unwrap_or(0).write(writer)?;
        }
        if v >= 6 {
            write_compact_versioned_array(writer, version, Some(self.topics.as_slice()))?;
        } else {
            write_versioned_array(writer, version, Some(self.topics.as_slice()))?;
        }
        if v >= 2 {
            self.error_code.map(|e| e.code()).unwrap_or(0).write(writer)?;
        }
        if v >= 6 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}
