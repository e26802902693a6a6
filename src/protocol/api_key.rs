//! ApiKey to tag request types.
//!
//! Only the requests issued by the checker get their own variant, every other key a broker advertises is kept as
//! [`ApiKey::Unknown`].
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_api_keys>

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum ApiKey {
    Metadata,
    OffsetFetch,
    FindCoordinator,
    ListGroups,
    ApiVersions,
    Unknown(i16),
}

impl From<i16> for ApiKey {
    fn from(key: i16) -> Self {
        match key {
            3 => Self::Metadata,
            9 => Self::OffsetFetch,
            10 => Self::FindCoordinator,
            16 => Self::ListGroups,
            18 => Self::ApiVersions,
            _ => Self::Unknown(key),
        }
    }
}

impl From<ApiKey> for i16 {
    fn from(key: ApiKey) -> Self {
        match key {
            ApiKey::Metadata => 3,
            ApiKey::OffsetFetch => 9,
            ApiKey::FindCoordinator => 10,
            ApiKey::ListGroups => 16,
            ApiKey::ApiVersions => 18,
            ApiKey::Unknown(code) => code,
        }
    }
}
