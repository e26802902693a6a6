//! Primitive types.
//!
//! Fixed-width integers, strings and arrays are implemented directly on the native Rust types; the classic and the
//! compact (flexible version) encodings are selected through [`ReadType`]/[`ReadCompactType`] and their write
//! counterparts.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_types>
//! - <https://cwiki.apache.org/confluence/display/KAFKA/KIP-482%3A+The+Kafka+Protocol+should+Support+Optional+Tagged+Fields#KIP482:TheKafkaProtocolshouldSupportOptionalTaggedFields-UnsignedVarints>

use std::io::{Read, Write};

use integer_encoding::{VarIntReader, VarIntWriter};

use super::{
    traits::{ReadCompactType, ReadError, ReadType, WriteCompactType, WriteError, WriteType},
    vec_builder::VecBuilder,
};

impl<R: Read> ReadType<R> for bool {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        Ok(buf[0] != 0)
    }
}

impl<W: Write> WriteType<W> for bool {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&[u8::from(*self)])?;
        Ok(())
    }
}

macro_rules! fixed_width_int {
    ($t:ty, $n:expr) => {
        impl<R: Read> ReadType<R> for $t {
            fn read(reader: &mut R) -> Result<Self, ReadError> {
                let mut buf = [0u8; $n];
                reader.read_exact(&mut buf)?;
                Ok(<$t>::from_be_bytes(buf))
            }
        }

        impl<W: Write> WriteType<W> for $t {
            fn write(&self, writer: &mut W) -> Result<(), WriteError> {
                writer.write_all(&self.to_be_bytes())?;
                Ok(())
            }
        }
    };
}

fixed_width_int!(i8, 1);
fixed_width_int!(i16, 2);
fixed_width_int!(i32, 4);
fixed_width_int!(i64, 8);

/// The UNSIGNED_VARINT type describes an unsigned variable length integer.
///
/// The number is split into groups of 7 bits, lowest group first. The high bit of every byte is set if more groups
/// follow, which is exactly the unsigned LEB128 encoding `integer-encoding` implements for `u64`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct UnsignedVarint(pub u64);

impl<R> ReadType<R> for UnsignedVarint
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self(reader.read_varint()?))
    }
}

impl<W> WriteType<W> for UnsignedVarint
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_varint(self.0)?;
        Ok(())
    }
}

fn read_utf8<R: Read>(reader: &mut R, len: usize) -> Result<String, ReadError> {
    let buf = VecBuilder::new(len).read_exact(reader)?;
    Ok(String::from_utf8(buf.into())?)
}

/// Decode the length prefix of a compact type, `None` meaning null.
fn read_compact_len<R: Read>(reader: &mut R) -> Result<Option<usize>, ReadError> {
    match UnsignedVarint::read(reader)?.0 {
        0 => Ok(None),
        len => Ok(Some(usize::try_from(len - 1)?)),
    }
}

fn write_compact_len<W: Write>(writer: &mut W, len: Option<usize>) -> Result<(), WriteError> {
    let len = match len {
        None => 0,
        Some(len) => u64::try_from(len + 1)?,
    };
    UnsignedVarint(len).write(writer)
}

// STRING
impl<R: Read> ReadType<R> for String {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i16::read(reader)?;
        let len = usize::try_from(len).map_err(|_| ReadError::InvalidLength {
            what: "string",
            len: len.into(),
        })?;
        read_utf8(reader, len)
    }
}

impl<W: Write> WriteType<W> for String {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        i16::try_from(self.len())?.write(writer)?;
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

// NULLABLE_STRING
impl<R: Read> ReadType<R> for Option<String> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        match i16::read(reader)? {
            -1 => Ok(None),
            l if l < -1 => Err(ReadError::InvalidLength {
                what: "nullable string",
                len: l.into(),
            }),
            l => Ok(Some(read_utf8(reader, usize::try_from(l)?)?)),
        }
    }
}

impl<W: Write> WriteType<W> for Option<String> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(s) => s.write(writer),
            None => (-1i16).write(writer),
        }
    }
}

// COMPACT_STRING
impl<R: Read> ReadCompactType<R> for String {
    fn read_compact(reader: &mut R) -> Result<Self, ReadError> {
        match read_compact_len(reader)? {
            None => Err(ReadError::UnexpectedNull {
                what: "compact string",
            }),
            Some(len) => read_utf8(reader, len),
        }
    }
}

impl<W: Write> WriteCompactType<W> for String {
    fn write_compact(&self, writer: &mut W) -> Result<(), WriteError> {
        write_compact_len(writer, Some(self.len()))?;
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

// COMPACT_NULLABLE_STRING
impl<R: Read> ReadCompactType<R> for Option<String> {
    fn read_compact(reader: &mut R) -> Result<Self, ReadError> {
        read_compact_len(reader)?
            .map(|len| read_utf8(reader, len))
            .transpose()
    }
}

impl<W: Write> WriteCompactType<W> for Option<String> {
    fn write_compact(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(s) => s.write_compact(writer),
            None => write_compact_len(writer, None),
        }
    }
}

/// Represents a section containing optional tagged fields.
///
/// We never send any, but brokers may attach them to any flexible structure, so they are read and kept verbatim.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct TaggedFields(pub Vec<(UnsignedVarint, Vec<u8>)>);

impl<R> ReadType<R> for TaggedFields
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = usize::try_from(UnsignedVarint::read(reader)?.0)?;
        let mut res = VecBuilder::new(len);
        for _ in 0..len {
            let tag = UnsignedVarint::read(reader)?;
            let data_len = usize::try_from(UnsignedVarint::read(reader)?.0)?;
            let data = VecBuilder::new(data_len).read_exact(reader)?;
            res.push((tag, data.into()));
        }
        Ok(Self(res.into()))
    }
}

impl<W> WriteType<W> for TaggedFields
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        UnsignedVarint(u64::try_from(self.0.len())?).write(writer)?;
        for (tag, data) in &self.0 {
            tag.write(writer)?;
            UnsignedVarint(u64::try_from(data.len())?).write(writer)?;
            writer.write_all(data)?;
        }
        Ok(())
    }
}

impl<W: Write> WriteType<W> for Option<TaggedFields> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(tagged_fields) => tagged_fields.write(writer),
            None => TaggedFields::default().write(writer),
        }
    }
}

// ARRAY<INT32>, null arrays decode as empty.
impl<R: Read> ReadType<R> for Vec<i32> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i32::read(reader)?;
        if len == -1 {
            return Ok(vec![]);
        }

        let len = usize::try_from(len)?;
        let mut res = VecBuilder::new(len);
        for _ in 0..len {
            res.push(i32::read(reader)?);
        }
        Ok(res.into())
    }
}

impl<W: Write> WriteType<W> for Vec<i32> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        i32::try_from(self.len())?.write(writer)?;
        for elem in self {
            elem.write(writer)?;
        }
        Ok(())
    }
}

// COMPACT_ARRAY<COMPACT_STRING>
impl<W: Write> WriteCompactType<W> for Vec<String> {
    fn write_compact(&self, writer: &mut W) -> Result<(), WriteError> {
        write_compact_len(writer, Some(self.len()))?;
        for elem in self {
            elem.write_compact(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use crate::protocol::test_utils::test_roundtrip;

    use super::*;

    test_roundtrip!(bool, test_bool_roundtrip);

    test_roundtrip!(i8, test_int8_roundtrip);

    test_roundtrip!(i16, test_int16_roundtrip);

    test_roundtrip!(i32, test_int32_roundtrip);

    test_roundtrip!(i64, test_int64_roundtrip);

    test_roundtrip!(UnsignedVarint, test_unsigned_varint_roundtrip);

    test_roundtrip!(String, test_string_roundtrip);

    test_roundtrip!(Option<String>, test_nullable_string_roundtrip);

    test_roundtrip!(TaggedFields, test_tagged_fields_roundtrip);

    test_roundtrip!(Vec<i32>, test_array_roundtrip);

    #[test]
    fn test_boolean_decode() {
        assert!(!bool::read(&mut Cursor::new(vec![0])).unwrap());

        // When reading a boolean value, any non-zero value is considered true.
        for v in [1, 35, 255] {
            assert!(bool::read(&mut Cursor::new(vec![v])).unwrap());
        }
    }

    #[test]
    fn test_unsigned_varint_encoding() {
        for (v, want) in [
            (0u64, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7f]),
            (128, vec![0x80, 0x01]),
            (300, vec![0xac, 0x02]),
        ] {
            let mut buf = vec![];
            UnsignedVarint(v).write(&mut buf).unwrap();
            assert_eq!(buf, want, "{v}");
        }
    }

    #[test]
    fn test_unsigned_varint_read_overflow() {
        let mut buf = Cursor::new(vec![0xffu8; 11]);

        let err = UnsignedVarint::read(&mut buf).unwrap_err();
        assert_matches!(err, ReadError::IO(_));
    }

    #[test]
    fn test_string_blowup_memory() {
        let mut buf = Cursor::new(Vec::<u8>::new());
        i16::MAX.write(&mut buf).unwrap();
        buf.set_position(0);

        let err = String::read(&mut buf).unwrap_err();
        assert_matches!(err, ReadError::IO(_));
    }

    #[test]
    fn test_nullable_string_read_negative_length() {
        let mut buf = Cursor::new(Vec::<u8>::new());
        (-2i16).write(&mut buf).unwrap();
        buf.set_position(0);

        let err = Option::<String>::read(&mut buf).unwrap_err();
        assert_matches!(
            err,
            ReadError::InvalidLength {
                what: "nullable string",
                len: -2
            }
        );
        assert_eq!(err.to_string(), "Invalid length for nullable string: -2");
    }

    #[test]
    fn test_compact_string() {
        let mut buf = vec![];
        "blah".to_string().write_compact(&mut buf).unwrap();
        assert_eq!(buf, [0x05, b'b', b'l', b'a', b'h']);

        let s = String::read_compact(&mut Cursor::new(buf)).unwrap();
        assert_eq!(s, "blah");
    }

    #[test]
    fn test_compact_string_rejects_null() {
        let err = String::read_compact(&mut Cursor::new(vec![0x00])).unwrap_err();
        assert_matches!(err, ReadError::UnexpectedNull { .. });
    }

    #[test]
    fn test_string_invalid_utf8() {
        let err = String::read(&mut Cursor::new(vec![0x00, 0x02, 0xc3, 0x28])).unwrap_err();
        assert_matches!(err, ReadError::Utf8(_));
    }

    #[test]
    fn test_compact_string_array() {
        let mut buf = vec![];
        vec![String::from("a"), String::from("bc")]
            .write_compact(&mut buf)
            .unwrap();
        assert_eq!(buf, [0x03, 0x02, b'a', 0x03, b'b', b'c']);

        let mut buf = vec![];
        Vec::<String>::new().write_compact(&mut buf).unwrap();
        assert_eq!(buf, [0x01]);
    }

    #[test]
    fn test_compact_nullable_string() {
        let got: Option<String> = ReadCompactType::read_compact(&mut Cursor::new(vec![0x00])).unwrap();
        assert_eq!(got, None);

        let mut buf = vec![];
        Some("x".to_string()).write_compact(&mut buf).unwrap();
        let got: Option<String> = ReadCompactType::read_compact(&mut Cursor::new(buf)).unwrap();
        assert_eq!(got.as_deref(), Some("x"));
    }

    #[test]
    fn test_compact_string_blowup_memory() {
        let mut buf = Cursor::new(Vec::<u8>::new());
        UnsignedVarint(u64::from(u32::MAX)).write(&mut buf).unwrap();
        buf.set_position(0);

        let err = String::read_compact(&mut buf).unwrap_err();
        assert_matches!(err, ReadError::IO(_));
    }

    #[test]
    fn test_null_array_reads_empty() {
        let mut buf = vec![];
        (-1i32).write(&mut buf).unwrap();
        assert!(Vec::<i32>::read(&mut Cursor::new(buf)).unwrap().is_empty());
    }

    #[test]
    fn test_tagged_fields_blowup_memory() {
        let mut buf = Cursor::new(Vec::<u8>::new());

        // number of fields
        UnsignedVarint(u64::from(u32::MAX)).write(&mut buf).unwrap();

        // tag
        UnsignedVarint(u64::from(u32::MAX)).write(&mut buf).unwrap();

        // data length
        UnsignedVarint(u64::from(u32::MAX)).write(&mut buf).unwrap();

        buf.set_position(0);

        let err = TaggedFields::read(&mut buf).unwrap_err();
        assert_matches!(err, ReadError::IO(_));
    }
}
