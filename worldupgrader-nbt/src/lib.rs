use std::ops::{Deref, DerefMut};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use compound::NbtCompound;
use tag::NbtTag;
use thiserror::Error;

pub mod compound;
pub mod tag;

pub const END_ID: u8 = 0x00;
pub const BYTE_ID: u8 = 0x01;
pub const SHORT_ID: u8 = 0x02;
pub const INT_ID: u8 = 0x03;
pub const LONG_ID: u8 = 0x04;
pub const FLOAT_ID: u8 = 0x05;
pub const DOUBLE_ID: u8 = 0x06;
pub const BYTE_ARRAY_ID: u8 = 0x07;
pub const STRING_ID: u8 = 0x08;
pub const LIST_ID: u8 = 0x09;
pub const COMPOUND_ID: u8 = 0x0A;
pub const INT_ARRAY_ID: u8 = 0x0B;
pub const LONG_ARRAY_ID: u8 = 0x0C;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("The root tag of the NBT data is not a compound tag. Received tag id: {0}")]
    NoRootCompound(u8),
    #[error("Encountered an unknown NBT tag id {0}.")]
    UnknownTagId(u8),
    #[error("Failed to Cesu 8 Decode")]
    Cesu8DecodingError,
    #[error("NBT reading was cut short: needed {needed} bytes, {remaining} remaining")]
    Incomplete { needed: usize, remaining: usize },
    #[error("Negative length {0}")]
    NegativeLength(i32),
    #[error("Length too large {0}")]
    LargeLength(usize),
    #[error("List declares element tag {expected} but holds tag {found}")]
    MixedList { expected: u8, found: u8 },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fails with [`Error::Incomplete`] unless `buf` holds at least `needed` more bytes.
pub(crate) fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<()> {
    let remaining = buf.remaining();
    if remaining < needed {
        return Err(Error::Incomplete { needed, remaining });
    }
    Ok(())
}

pub(crate) fn read_length(buf: &mut impl Buf) -> Result<usize> {
    ensure_remaining(buf, 4)?;
    let len = buf.get_i32();
    if len < 0 {
        return Err(Error::NegativeLength(len));
    }
    Ok(len as usize)
}

pub(crate) fn write_length(buf: &mut impl BufMut, len: usize) -> Result<()> {
    if len > i32::MAX as usize {
        return Err(Error::LargeLength(len));
    }
    buf.put_i32(len as i32);
    Ok(())
}

pub fn get_nbt_string(buf: &mut impl Buf) -> Result<String> {
    ensure_remaining(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure_remaining(buf, len)?;
    let raw = buf.copy_to_bytes(len);
    let string = cesu8::from_java_cesu8(&raw).map_err(|_| Error::Cesu8DecodingError)?;
    Ok(string.into_owned())
}

pub fn put_nbt_string(buf: &mut impl BufMut, string: &str) -> Result<()> {
    let java_string = cesu8::to_java_cesu8(string);
    let len = java_string.len();
    if len > u16::MAX as usize {
        return Err(Error::LargeLength(len));
    }
    buf.put_u16(len as u16);
    buf.put_slice(&java_string);
    Ok(())
}

/// A named root compound, the unit stored in a chunk or entity payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Nbt {
    pub name: String,
    pub root_tag: NbtCompound,
}

impl Nbt {
    pub fn new(name: String, tag: NbtCompound) -> Self {
        Nbt {
            name,
            root_tag: tag,
        }
    }

    pub fn read(buf: &mut impl Buf) -> Result<Nbt> {
        ensure_remaining(buf, 1)?;
        let tag_type_id = buf.get_u8();
        if tag_type_id != COMPOUND_ID {
            return Err(Error::NoRootCompound(tag_type_id));
        }

        Ok(Nbt {
            name: get_nbt_string(buf)?,
            root_tag: NbtCompound::deserialize_content(buf)?,
        })
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Result<Nbt> {
        Self::read(&mut bytes)
    }

    pub fn write(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u8(COMPOUND_ID);
        put_nbt_string(&mut buf, &self.name)?;
        self.root_tag.serialize_content(&mut buf)?;
        Ok(buf.freeze())
    }
}

impl Deref for Nbt {
    type Target = NbtCompound;

    fn deref(&self) -> &Self::Target {
        &self.root_tag
    }
}

impl DerefMut for Nbt {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.root_tag
    }
}

impl From<NbtCompound> for Nbt {
    fn from(value: NbtCompound) -> Self {
        Nbt::new(String::new(), value)
    }
}

#[cfg(test)]
mod test {
    use crate::compound::NbtCompound;
    use crate::tag::NbtTag;
    use crate::{Error, Nbt, COMPOUND_ID};

    fn sample_chunk() -> NbtCompound {
        let mut section = NbtCompound::new();
        section.put_byte("Y", -4);
        section.put("BlockLight", NbtTag::ByteArray(vec![1, 2, 3].into_boxed_slice()));

        let mut root = NbtCompound::new();
        root.put_int("DataVersion", 3700);
        root.put_int("xPos", -3);
        root.put_int("zPos", 7);
        root.put("Status", "minecraft:full");
        root.put("Heightmap", NbtTag::LongArray(vec![i64::MIN, 0, i64::MAX].into()));
        root.put("sections", NbtTag::List(vec![NbtTag::Compound(section)].into()));
        root.put("Unicode", "Grüße \u{1F600}");
        root
    }

    #[test]
    fn chunk_tree_survives_write_and_read() {
        let nbt = Nbt::new(String::new(), sample_chunk());
        let bytes = nbt.write().unwrap();
        assert_eq!(bytes[0], COMPOUND_ID);

        let read = Nbt::from_bytes(&bytes).unwrap();
        assert_eq!(read, nbt);
        assert_eq!(read.get_string("Unicode").unwrap(), "Grüße \u{1F600}");
    }

    #[test]
    fn truncated_payload_is_incomplete() {
        let bytes = Nbt::from(sample_chunk()).write().unwrap();
        let err = Nbt::from_bytes(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, Error::Incomplete { .. }), "{err}");
    }

    #[test]
    fn non_compound_root_is_rejected() {
        assert_eq!(
            Nbt::from_bytes(&[0x03, 0, 0]).unwrap_err(),
            Error::NoRootCompound(0x03)
        );
    }

    #[test]
    fn mixed_list_cannot_be_written() {
        let mut root = NbtCompound::new();
        root.put("Pos", NbtTag::List(vec![NbtTag::Double(1.0), NbtTag::Int(2)].into()));
        assert!(matches!(
            Nbt::from(root).write(),
            Err(Error::MixedList { .. })
        ));
    }
}
