use std::fmt::Debug;
use std::io::Cursor;

use super::{ReadVersionedType, WriteVersionedType};
use crate::protocol::api_version::ApiVersion;

pub(crate) fn encode<T>(msg: &T, version: ApiVersion) -> Vec<u8>
where
    T: WriteVersionedType<Vec<u8>>,
{
    let mut buf = Vec::new();
    msg.write_versioned(&mut buf, version).unwrap();
    buf
}

/// Decode a `T`, failing on trailing bytes.
pub(crate) fn decode<T>(input: impl Into<Vec<u8>>, version: ApiVersion) -> T
where
    T: ReadVersionedType<Cursor<Vec<u8>>>,
{
    let mut reader = Cursor::new(input.into());
    let got = T::read_versioned(&mut reader, version).unwrap();
    assert_eq!(
        reader.position() as usize,
        reader.get_ref().len(),
        "trailing bytes at {version:?}"
    );
    got
}

/// Every version in `min..=max` that can carry `orig` must reach a fixed point after one decode.
///
/// The first decode may lose fields the version doesn't know, so `orig` itself is not compared.
pub(crate) fn assert_stable_encoding<T>(orig: &T, min: ApiVersion, max: ApiVersion)
where
    T: ReadVersionedType<Cursor<Vec<u8>>> + WriteVersionedType<Vec<u8>> + PartialEq + Debug,
{
    for v in min.0..=max.0 {
        let version = ApiVersion(v);

        let mut first = Vec::new();
        if orig.write_versioned(&mut first, version).is_err() {
            continue;
        }
        let restored = T::read_versioned(&mut Cursor::new(first), version).unwrap();

        let second = encode(&restored, version);
        let restored_again: T = decode(second.clone(), version);
        assert_eq!(restored, restored_again, "{version:?}");
        assert_eq!(encode(&restored_again, version), second, "{version:?}");
    }
}

macro_rules! test_roundtrip_versioned {
    ($t:ty, $min:expr, $max:expr, $name:ident) => {
        #[allow(unused_imports)]
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn $name(orig: $t) {
                $crate::protocol::messages::test_utils::assert_stable_encoding(&orig, $min, $max);
            }
        }
    };
}

pub(crate) use test_roundtrip_versioned;

macro_rules! assert_write_versioned {
    ($msg:expr, $version:expr, $want:expr) => {
        assert_eq!(
            $crate::protocol::messages::test_utils::encode(
                &$msg,
                $crate::protocol::api_version::ApiVersion::new($version)
            ),
            $want
        );
    };
}

pub(crate) use assert_write_versioned;

macro_rules! assert_read_versioned {
    ($t:ty, $input:expr, $version:expr, $want:expr) => {
        let got: $t = $crate::protocol::messages::test_utils::decode(
            $input,
            $crate::protocol::api_version::ApiVersion::new($version),
        );
        assert_eq!($want, got);
    };
}

pub(crate) use assert_read_versioned;
