//! Unversioned codecs for wire primitives.
//!
//! Non-flexible message versions use the classic encoding of [`ReadType`]/[`WriteType`], with fixed-width length
//! prefixes. Flexible versions (KIP-482) prefix strings and arrays with an unsigned varint of `len + 1` instead, see
//! [`ReadCompactType`]/[`WriteCompactType`]. A type implements whichever of the two encodings the messages need.

use std::io::{Read, Write};
use std::string::FromUtf8Error;

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReadError {
    #[error("Cannot read data: {0}")]
    IO(#[from] std::io::Error),

    #[error("Overflow converting integer: {0}")]
    Overflow(#[from] std::num::TryFromIntError),

    #[error("Invalid length for {what}: {len}")]
    InvalidLength { what: &'static str, len: i64 },

    #[error("Null where {what} is required")]
    UnexpectedNull { what: &'static str },

    #[error("String is not UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

pub trait ReadType<R>: Sized
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError>;
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WriteError {
    #[error("Cannot write data: {0}")]
    IO(#[from] std::io::Error),

    #[error("Overflow converting integer: {0}")]
    Overflow(#[from] std::num::TryFromIntError),
}

pub trait WriteType<W>
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError>;
}

pub trait ReadCompactType<R>: Sized
where
    R: Read,
{
    fn read_compact(reader: &mut R) -> Result<Self, ReadError>;
}

pub trait WriteCompactType<W>
where
    W: Write,
{
    fn write_compact(&self, writer: &mut W) -> Result<(), WriteError>;
}
