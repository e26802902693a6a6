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
    primitives::TaggedFields,
    traits::{ReadCompactType, ReadType, WriteCompactType, WriteType},
};

#[cfg(test)]
use proptest::prelude::*;

#[derive(Debug, Default)]
pub struct ListGroupsRequest {
    /// The states of the groups we want to list. If empty all groups are returned with their state.
    ///
    /// Added in version 4.
    pub states_filter: Vec<String>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for ListGroupsRequest
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

        if v < 4 && !self.states_filter.is_empty() {
            return Err(WriteVersionedError::FieldNotAvailable {
                version,
                field: "states_filter".to_string(),
            });
        }

        if v >= 4 {
            self.states_filter.write_compact(writer)?;
        }

        if v >= 3 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

impl RequestBody for ListGroupsRequest {
    type ResponseBody = ListGroupsResponse;

    const API_KEY: ApiKey = ApiKey::ListGroups;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 4);

    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion::new(3);
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ListedGroup {
    /// The group ID.
    pub group_id: String,

    /// The group protocol type, empty for groups that only store offsets.
    pub protocol_type: String,

    /// The group state name.
    ///
    /// Added in version 4.
    pub group_state: Option<String>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for ListedGroup
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        let (group_id, protocol_type) = if v >= 3 {
            (String::read_compact(reader)?, String::read_compact(reader)?)
        } else {
            (String::read(reader)?, String::read(reader)?)
        };
        let group_state = (v >= 4).then(|| String::read_compact(reader)).transpose()?;
        let tagged_fields = (v >= 3).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            group_id,
            protocol_type,
            group_state,
            tagged_fields,
        })
    }
}

impl<W> WriteVersionedType<W> for ListedGroup
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
            self.group_id.write_compact(writer)?;
            self.protocol_type.write_compact(writer)?;
        } else {
            self.group_id.write(writer)?;
            self.protocol_type.write(writer)?;
        }

        if v >= 4 {
            self.group_state
                .clone()
                .unwrap_or_default()
                .write_compact(writer)?;
        }

        if v >= 3 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ListGroupsResponse {
    /// The duration in milliseconds for which the request was throttled due to a quota violation, or zero if the
    /// request did not violate any quota.
    ///
    /// Added in version 1.
    pub throttle_time_ms: Option<i32>,

    /// The error code, or 0 if there was no error.
    #[cfg_attr(test, proptest(strategy = "any::<i16>().prop_map(Error::new)"))]
    pub error_code: Option<Error>,

    /// Each group in the response.
    #[cfg_attr(
        test,
        proptest(strategy = "prop::collection::vec(any::<ListedGroup>(), 0..2)")
    )]
    pub groups: Vec<ListedGroup>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for ListGroupsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 4);

        let throttle_time_ms = (v >= 1).then(|| i32::read(reader)).transpose()?;
        let error_code = Error::new(i16::read(reader)?);
        let groups = if v >= 3 {
            read_compact_versioned_array(reader, version)?
        } else {
            read_versioned_array(reader, version)?
        }
        .unwrap_or_default();
        let tagged_fields = (v >= 3).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            throttle_time_ms,
            error_code,
            groups,
            tagged_fields,
        })
    }
}

// only used by tests
impl<W> WriteVersionedType<W> for ListGroupsResponse
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

        if v >= 1 {
            self.throttle_time_ms.unwrap_or(0).write(writer)?;
        }
        self.error_code.map(|e| e.code()).unwrap_or(0).write(writer)?;

        if v >= 3 {
            write_compact_versioned_array(writer, version, Some(self.groups.as_slice()))?;
            self.tagged_fields.write(writer)?;
        } else {
            write_versioned_array(writer, version, Some(self.groups.as_slice()))?;
        }

        Ok(())
    }
}
