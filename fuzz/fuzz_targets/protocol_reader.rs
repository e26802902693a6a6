#![no_main]
use std::io::Cursor;

use kafka_partition_checker::protocol::{
    api_key::ApiKey,
    api_version::ApiVersion,
    messages::{
        ApiVersionsRequest, FindCoordinatorRequest, ListGroupsRequest, MetadataRequest,
        OffsetFetchRequest, ReadVersionedType, RequestBody, ResponseHeader,
    },
    traits::ReadType,
};
use libfuzzer_sys::fuzz_target;

type Error = Box<dyn std::error::Error>;

fuzz_target!(|data: &[u8]| {
    driver(data).ok();
});

/// Input layout: api key (INT16), api version (INT16), response header version (INT16), response.
fn driver(data: &[u8]) -> Result<(), Error> {
    let mut cursor = Cursor::new(data);
    let api_key = ApiKey::from(i16::read(&mut cursor)?);
    let api_version = ApiVersion(i16::read(&mut cursor)?);
    let header_version = ApiVersion(i16::read(&mut cursor)?);

    // readers assert on versions they were never meant to see
    if !(0..=1).contains(&header_version.0) {
        return Ok(());
    }

    match api_key {
        ApiKey::ApiVersions => {
            read_response::<ApiVersionsRequest>(&mut cursor, header_version, api_version)
        }
        ApiKey::Metadata => {
            read_response::<MetadataRequest>(&mut cursor, header_version, api_version)
        }
        ApiKey::ListGroups => {
            read_response::<ListGroupsRequest>(&mut cursor, header_version, api_version)
        }
        ApiKey::FindCoordinator => {
            read_response::<FindCoordinatorRequest>(&mut cursor, header_version, api_version)
        }
        ApiKey::OffsetFetch => {
            read_response::<OffsetFetchRequest>(&mut cursor, header_version, api_version)
        }
        ApiKey::Unknown(_) => Ok(()),
    }
}

fn read_response<'a, T>(
    cursor: &mut Cursor<&'a [u8]>,
    header_version: ApiVersion,
    api_version: ApiVersion,
) -> Result<(), Error>
where
    T: RequestBody,
    T::ResponseBody: ReadVersionedType<Cursor<&'a [u8]>>,
{
    if !T::API_VERSION_RANGE.contains(api_version) {
        return Ok(());
    }

    ResponseHeader::read_versioned(cursor, header_version)?;
    T::ResponseBody::read_versioned(cursor, api_version)?;

    Ok(())
}
