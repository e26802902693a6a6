use std::io::{Read, Write};

use super::{
    ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorType {
    Group,
    Transaction,
}

impl From<CoordinatorType> for i8 {
    fn from(t: CoordinatorType) -> Self {
        match t {
            CoordinatorType::Group => 0,
            CoordinatorType::Transaction => 1,
        }
    }
}

#[derive(Debug)]
pub struct FindCoordinatorRequest {
    /// The coordinator key, the group ID for group coordinators.
    pub key: String,

    /// The coordinator key type.
    pub key_type: CoordinatorType,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<W> WriteVersionedType<W> for FindCoordinatorRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!((1..=3).contains(&v));

        if v >= 3 {
            self.key.write_compact(writer)?;
        } else {
            self.key.write(writer)?;
        }

        i8::from(self.key_type).write(writer)?;

        if v >= 3 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

impl RequestBody for FindCoordinatorRequest {
    type ResponseBody = FindCoordinatorResponse;

    const API_KEY: ApiKey = ApiKey::FindCoordinator;

    // v0 has no key type, v4 batches keys
    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(1, 3);

    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion::new(3);
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct FindCoordinatorResponse {
    /// The duration in milliseconds for which the request was throttled due to a quota violation, or zero if the
    /// request did not violate any quota.
    pub throttle_time_ms: i32,

    /// The error code, or 0 if there was no error.
    #[cfg_attr(test, proptest(strategy = "any::<i16>().prop_map(Error::new)"))]
    pub error_code: Option<Error>,

    /// The error message, or null if there was no error.
    pub error_message: Option<String>,

    /// The node id.
    pub node_id: i32,

    /// The host name.
    pub host: String,

    /// The port.
    pub port: i32,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for FindCoordinatorResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!((1..=3).contains(&v));

        let throttle_time_ms = i32::read(reader)?;
        let error_code = Error::new(i16::read(reader)?);
        let error_message = if v >= 3 {
            ReadCompactType::read_compact(reader)?
        } else {
            ReadType::read(reader)?
        };
        let node_id = i32::read(reader)?;
        let host = if v >= 3 {
            String::read_compact(reader)?
        } else {
            String::read(reader)?
        };
        let port = i32::read(reader)?;
        let tagged_fields = (v >= 3).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            throttle_time_ms,
            error_code,
            error_message,
            node_id,
            host,
            port,
            tagged_fields,
        })
    }
}

// only used by tests
impl<W> WriteVersionedType<W> for FindCoordinatorResponse
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!((1..=3).contains(&v));

        self.throttle_time_ms.write(writer)?;
        self.error_code.map(|e| e.code()).unwrap_or(0).write(writer)?;
        if v >= 3 {
            self.error_message.write_compact(writer)?;
        } else {
            self.error_message.write(writer)?;
        }
        self.node_id.write(writer)?;
        if v >= 3 {
            self.host.write_compact(writer)?;
        } else {
            self.host.write(writer)?;
        }
        self.port.write(writer)?;
        if v >= 3 {
            self.tagged_fields.write(writer)?;
        }

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
        FindCoordinatorResponse,
        FindCoordinatorRequest::API_VERSION_RANGE.min(),
        FindCoordinatorRequest::API_VERSION_RANGE.max(),
        test_roundtrip_find_coordinator_response
    );

    #[test]
    fn request() {
        let req = FindCoordinatorRequest {
            key: String::from("g1"),
            key_type: CoordinatorType::Group,
            tagged_fields: None,
        };

        assert_write_versioned!(req, 1, vec![0x00, 0x02, b'g', b'1', 0x00]);
        assert_write_versioned!(req, 3, vec![0x03, b'g', b'1', 0x00, 0x00]);
    }

    #[test]
    fn response_v2() {
        let data = vec![
            0x00, 0x00, 0x00, 0x00, // throttle time
            0x00, 0x00, // no error
            0xff, 0xff, // error message
            0x00, 0x00, 0x00, 0x02, // node id
            0x00, 0x02, b'k', b'2', // host
            0x00, 0x00, 0x23, 0x84, // port
        ];

        let want = FindCoordinatorResponse {
            throttle_time_ms: 0,
            error_code: None,
            error_message: None,
            node_id: 2,
            host: String::from("k2"),
            port: 9092,
            tagged_fields: None,
        };

        assert_read_versioned!(FindCoordinatorResponse, data, 2, want);
    }

    #[test]
    fn response_v3_coordinator_not_available() {
        let data = vec![
            0x00, 0x00, 0x00, 0x00, // throttle time
            0x00, 0x0f, // CoordinatorNotAvailable
            0x00, // error message
            0xff, 0xff, 0xff, 0xff, // node id
            0x01, // host
            0xff, 0xff, 0xff, 0xff, // port
            0x00, // tagged fields
        ];

        let want = FindCoordinatorResponse {
            throttle_time_ms: 0,
            error_code: Some(Error::CoordinatorNotAvailable),
            error_message: None,
            node_id: -1,
            host: String::new(),
            port: -1,
            tagged_fields: Some(TaggedFields::default()),
        };

        assert_read_versioned!(FindCoordinatorResponse, data, 3, want);
    }
}
