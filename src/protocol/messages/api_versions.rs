use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error as ApiError,
    primitives::TaggedFields,
    traits::{ReadCompactType, ReadType, WriteCompactType, WriteType},
};

use super::{
    read_compact_versioned_array, read_versioned_array, write_compact_versioned_array,
    write_versioned_array, ReadVersionedError, ReadVersionedType, RequestBody,
    WriteVersionedError, WriteVersionedType,
};

#[cfg(test)]
use proptest::prelude::*;

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ApiVersionsRequest {
    /// The name of the client.
    ///
    /// Added in version 3.
    pub client_software_name: Option<String>,

    /// The version of the client.
    ///
    /// Added in version 3.
    pub client_software_version: Option<String>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for ApiVersionsRequest
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        if v < 3 {
            return Ok(Self {
                client_software_name: None,
                client_software_version: None,
                tagged_fields: None,
            });
        }

        Ok(Self {
            client_software_name: Some(String::read_compact(reader)?),
            client_software_version: Some(String::read_compact(reader)?),
            tagged_fields: Some(TaggedFields::read(reader)?),
        })
    }
}

impl<W> WriteVersionedType<W> for ApiVersionsRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        if v >= 3 {
            // both names are non-nullable on the wire
            self.client_software_name
                .clone()
                .unwrap_or_default()
                .write_compact(writer)?;
            self.client_software_version
                .clone()
                .unwrap_or_default()
                .write_compact(writer)?;
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

impl RequestBody for ApiVersionsRequest {
    type ResponseBody = ApiVersionsResponse;
    const API_KEY: ApiKey = ApiKey::ApiVersions;
    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 3);
    const FIRST_TAGGED_FIELD_IN_REQUEST_VERSION: ApiVersion = ApiVersion(3);

    // The response header stays at v0 for every version, brokers need to be able to answer clients they can't
    // decode a flexible header from yet.
    const FIRST_TAGGED_FIELD_IN_RESPONSE_VERSION: ApiVersion = ApiVersion(i16::MAX);
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ApiVersionsResponseApiKey {
    /// The API index.
    pub api_key: ApiKey,

    /// The minimum supported version, inclusive.
    pub min_version: ApiVersion,

    /// The maximum supported version, inclusive.
    pub max_version: ApiVersion,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl ApiVersionsResponseApiKey {
    /// Advertised range, `None` if the broker sends `min > max`.
    pub fn range(&self) -> Option<ApiVersionRange> {
        (self.min_version <= self.max_version)
            .then(|| ApiVersionRange::new(self.min_version.0, self.max_version.0))
    }
}

impl<R> ReadVersionedType<R> for ApiVersionsResponseApiKey
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        Ok(Self {
            api_key: i16::read(reader)?.into(),
            min_version: ApiVersion(i16::read(reader)?),
            max_version: ApiVersion(i16::read(reader)?),
            tagged_fields: (v >= 3).then(|| TaggedFields::read(reader)).transpose()?,
        })
    }
}

impl<W> WriteVersionedType<W> for ApiVersionsResponseApiKey
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        i16::from(self.api_key).write(writer)?;
        self.min_version.0.write(writer)?;
        self.max_version.0.write(writer)?;

        if v >= 3 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ApiVersionsResponse {
    /// The top-level error code.
    #[cfg_attr(test, proptest(strategy = "any::<i16>().prop_map(ApiError::new)"))]
    pub error_code: Option<ApiError>,

    /// The APIs supported by the broker.
    #[cfg_attr(
        test,
        proptest(strategy = "prop::collection::vec(any::<ApiVersionsResponseApiKey>(), 0..2)")
    )]
    pub api_keys: Vec<ApiVersionsResponseApiKey>,

    /// The duration in milliseconds for which the request was throttled due to a quota violation, or zero if the
    /// request did not violate any quota.
    ///
    /// Added in version 1.
    pub throttle_time_ms: Option<i32>,

    /// The tagged fields.
    ///
    /// Added in version 3.
    pub tagged_fields: Option<TaggedFields>,
}

impl<R> ReadVersionedType<R> for ApiVersionsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        let error_code = ApiError::new(i16::read(reader)?);
        let api_keys = if v >= 3 {
            read_compact_versioned_array(reader, version)?
        } else {
            read_versioned_array(reader, version)?
        }
        .unwrap_or_default();
        let throttle_time_ms = (v >= 1).then(|| i32::read(reader)).transpose()?;
        let tagged_fields = (v >= 3).then(|| TaggedFields::read(reader)).transpose()?;

        Ok(Self {
            error_code,
            api_keys,
            throttle_time_ms,
            tagged_fields,
        })
    }
}

// only used by tests
impl<W> WriteVersionedType<W> for ApiVersionsResponse
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 3);

        self.error_code.map(|e| e.code()).unwrap_or(0).write(writer)?;

        if v >= 3 {
            write_compact_versioned_array(writer, version, Some(self.api_keys.as_slice()))?;
        } else {
            write_versioned_array(writer, version, Some(self.api_keys.as_slice()))?;
        }

        if v >= 1 {
            self.throttle_time_ms.unwrap_or(0).write(writer)?;
        }

        if v >= 3 {
            self.tagged_fields.write(writer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::protocol::messages::test_utils::{
        assert_read_versioned, assert_write_versioned, test_roundtrip_versioned,
    };

    test_roundtrip_versioned!(
        ApiVersionsRequest,
        ApiVersionsRequest::API_VERSION_RANGE.min(),
        ApiVersionsRequest::API_VERSION_RANGE.max(),
        test_roundtrip_api_versions_request
    );

    test_roundtrip_versioned!(
        ApiVersionsResponse,
        ApiVersionsRequest::API_VERSION_RANGE.min(),
        ApiVersionsRequest::API_VERSION_RANGE.max(),
        test_roundtrip_api_versions_response
    );

    #[test]
    fn request_v0_is_empty() {
        let req = ApiVersionsRequest {
            client_software_name: Some(String::from("ignored")),
            client_software_version: None,
            tagged_fields: None,
        };
        assert_write_versioned!(req, 0, Vec::<u8>::new());
    }

    #[test]
    fn request_v3() {
        let req = ApiVersionsRequest {
            client_software_name: Some(String::from("kpc")),
            client_software_version: Some(String::from("0.1")),
            tagged_fields: None,
        };
        assert_write_versioned!(
            req,
            3,
            vec![
                0x04, b'k', b'p', b'c', // client software name
                0x04, b'0', b'.', b'1', // client software version
                0x00, // tagged fields
            ]
        );
    }

    #[test]
    fn response_v1() {
        let data = vec![
            0x00, 0x00, // error code
            0x00, 0x00, 0x00, 0x02, // api keys length
            0x00, 0x03, 0x00, 0x00, 0x00, 0x0c, // Metadata 0..=12
            0x00, 0x2a, 0x00, 0x00, 0x00, 0x02, // DeleteGroups 0..=2
            0x00, 0x00, 0x00, 0x00, // throttle time
        ];

        let want = ApiVersionsResponse {
            error_code: None,
            api_keys: vec![
                ApiVersionsResponseApiKey {
                    api_key: ApiKey::Metadata,
                    min_version: ApiVersion(0),
                    max_version: ApiVersion(12),
                    tagged_fields: None,
                },
                ApiVersionsResponseApiKey {
                    api_key: ApiKey::Unknown(42),
                    min_version: ApiVersion(0),
                    max_version: ApiVersion(2),
                    tagged_fields: None,
                },
            ],
            throttle_time_ms: Some(0),
            tagged_fields: None,
        };

        assert_read_versioned!(ApiVersionsResponse, data, 1, want);
    }

    #[test]
    fn response_unsupported_version() {
        // brokers answer an unsupported request version with a v0 body listing what they do support
        let data = vec![
            0x00, 0x23, // UnsupportedVersion
            0x00, 0x00, 0x00, 0x01, // api keys length
            0x00, 0x12, 0x00, 0x00, 0x00, 0x02, // ApiVersions 0..=2
        ];

        let mut reader = Cursor::new(data);
        let got = ApiVersionsResponse::read_versioned(&mut reader, ApiVersion(0)).unwrap();
        assert_eq!(got.error_code, Some(ApiError::UnsupportedVersion));
        assert_eq!(
            got.api_keys[0].range(),
            Some(ApiVersionRange::new(0, 2))
        );
    }

    #[test]
    fn inverted_range() {
        let key = ApiVersionsResponseApiKey {
            api_key: ApiKey::Metadata,
            min_version: ApiVersion(3),
            max_version: ApiVersion(1),
            tagged_fields: None,
        };
        assert_eq!(key.range(), None);
    }
}
