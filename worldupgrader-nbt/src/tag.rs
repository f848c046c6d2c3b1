use bytes::{Buf, BufMut};

use crate::compound::NbtCompound;
use crate::*;

#[derive(Clone, Debug, PartialEq)]
pub enum NbtTag {
    End,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Box<[u8]>),
    String(String),
    List(Box<[NbtTag]>),
    Compound(NbtCompound),
    IntArray(Box<[i32]>),
    LongArray(Box<[i64]>),
}

impl NbtTag {
    /// Returns the numeric id associated with the data type.
    pub const fn get_type_id(&self) -> u8 {
        match self {
            NbtTag::End => END_ID,
            NbtTag::Byte(_) => BYTE_ID,
            NbtTag::Short(_) => SHORT_ID,
            NbtTag::Int(_) => INT_ID,
            NbtTag::Long(_) => LONG_ID,
            NbtTag::Float(_) => FLOAT_ID,
            NbtTag::Double(_) => DOUBLE_ID,
            NbtTag::ByteArray(_) => BYTE_ARRAY_ID,
            NbtTag::String(_) => STRING_ID,
            NbtTag::List(_) => LIST_ID,
            NbtTag::Compound(_) => COMPOUND_ID,
            NbtTag::IntArray(_) => INT_ARRAY_ID,
            NbtTag::LongArray(_) => LONG_ARRAY_ID,
        }
    }

    pub fn serialize_data(&self, w: &mut impl BufMut) -> Result<()> {
        match self {
            NbtTag::End => {}
            NbtTag::Byte(byte) => w.put_i8(*byte),
            NbtTag::Short(short) => w.put_i16(*short),
            NbtTag::Int(int) => w.put_i32(*int),
            NbtTag::Long(long) => w.put_i64(*long),
            NbtTag::Float(float) => w.put_f32(*float),
            NbtTag::Double(double) => w.put_f64(*double),
            NbtTag::ByteArray(byte_array) => {
                write_length(w, byte_array.len())?;
                w.put_slice(byte_array);
            }
            NbtTag::String(string) => put_nbt_string(w, string)?,
            NbtTag::List(list) => {
                let element_id = list.first().map_or(END_ID, NbtTag::get_type_id);
                w.put_u8(element_id);
                write_length(w, list.len())?;
                for tag in list.iter() {
                    if tag.get_type_id() != element_id {
                        return Err(Error::MixedList {
                            expected: element_id,
                            found: tag.get_type_id(),
                        });
                    }
                    tag.serialize_data(w)?;
                }
            }
            NbtTag::Compound(compound) => compound.serialize_content(w)?,
            NbtTag::IntArray(int_array) => {
                write_length(w, int_array.len())?;
                int_array.iter().for_each(|int| w.put_i32(*int));
            }
            NbtTag::LongArray(long_array) => {
                write_length(w, long_array.len())?;
                long_array.iter().for_each(|long| w.put_i64(*long));
            }
        };
        Ok(())
    }

    pub fn deserialize_data(r: &mut impl Buf, tag_id: u8) -> Result<NbtTag> {
        let tag = match tag_id {
            END_ID => NbtTag::End,
            BYTE_ID => {
                ensure_remaining(r, 1)?;
                NbtTag::Byte(r.get_i8())
            }
            SHORT_ID => {
                ensure_remaining(r, 2)?;
                NbtTag::Short(r.get_i16())
            }
            INT_ID => {
                ensure_remaining(r, 4)?;
                NbtTag::Int(r.get_i32())
            }
            LONG_ID => {
                ensure_remaining(r, 8)?;
                NbtTag::Long(r.get_i64())
            }
            FLOAT_ID => {
                ensure_remaining(r, 4)?;
                NbtTag::Float(r.get_f32())
            }
            DOUBLE_ID => {
                ensure_remaining(r, 8)?;
                NbtTag::Double(r.get_f64())
            }
            BYTE_ARRAY_ID => {
                let len = read_length(r)?;
                ensure_remaining(r, len)?;
                NbtTag::ByteArray(r.copy_to_bytes(len).to_vec().into_boxed_slice())
            }
            STRING_ID => NbtTag::String(get_nbt_string(r)?),
            LIST_ID => {
                ensure_remaining(r, 1)?;
                let element_id = r.get_u8();
                let len = read_length(r)?;
                // Every element takes at least one byte unless the list is of End tags.
                if element_id != END_ID {
                    ensure_remaining(r, len)?;
                }
                let list = (0..len)
                    .map(|_| NbtTag::deserialize_data(r, element_id))
                    .collect::<Result<Vec<_>>>()?;
                NbtTag::List(list.into_boxed_slice())
            }
            COMPOUND_ID => NbtTag::Compound(NbtCompound::deserialize_content(r)?),
            INT_ARRAY_ID => {
                let len = read_length(r)?;
                ensure_remaining(r, len.saturating_mul(4))?;
                NbtTag::IntArray((0..len).map(|_| r.get_i32()).collect())
            }
            LONG_ARRAY_ID => {
                let len = read_length(r)?;
                ensure_remaining(r, len.saturating_mul(8))?;
                NbtTag::LongArray((0..len).map(|_| r.get_i64()).collect())
            }
            _ => return Err(Error::UnknownTagId(tag_id)),
        };
        Ok(tag)
    }

    pub fn extract_byte(&self) -> Option<i8> {
        match self {
            NbtTag::Byte(byte) => Some(*byte),
            _ => None,
        }
    }

    pub fn extract_int(&self) -> Option<i32> {
        match self {
            NbtTag::Int(int) => Some(*int),
            _ => None,
        }
    }

    pub fn extract_long(&self) -> Option<i64> {
        match self {
            NbtTag::Long(long) => Some(*long),
            _ => None,
        }
    }

    pub fn extract_double(&self) -> Option<f64> {
        match self {
            NbtTag::Double(double) => Some(*double),
            _ => None,
        }
    }

    pub fn extract_string(&self) -> Option<&String> {
        match self {
            NbtTag::String(string) => Some(string),
            _ => None,
        }
    }

    pub fn extract_list(&self) -> Option<&[NbtTag]> {
        match self {
            NbtTag::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn extract_compound(&self) -> Option<&NbtCompound> {
        match self {
            NbtTag::Compound(compound) => Some(compound),
            _ => None,
        }
    }

    pub fn extract_compound_mut(&mut self) -> Option<&mut NbtCompound> {
        match self {
            NbtTag::Compound(compound) => Some(compound),
            _ => None,
        }
    }

    pub fn extract_int_array(&self) -> Option<&[i32]> {
        match self {
            NbtTag::IntArray(int_array) => Some(int_array),
            _ => None,
        }
    }
}

impl From<&str> for NbtTag {
    fn from(value: &str) -> Self {
        NbtTag::String(value.to_string())
    }
}

impl From<String> for NbtTag {
    fn from(value: String) -> Self {
        NbtTag::String(value)
    }
}

impl From<i32> for NbtTag {
    fn from(value: i32) -> Self {
        NbtTag::Int(value)
    }
}

impl From<f64> for NbtTag {
    fn from(value: f64) -> Self {
        NbtTag::Double(value)
    }
}

impl From<bool> for NbtTag {
    fn from(value: bool) -> Self {
        NbtTag::Byte(value as i8)
    }
}

impl From<NbtCompound> for NbtTag {
    fn from(value: NbtCompound) -> Self {
        NbtTag::Compound(value)
    }
}

impl From<Vec<NbtCompound>> for NbtTag {
    fn from(value: Vec<NbtCompound>) -> Self {
        NbtTag::List(value.into_iter().map(NbtTag::Compound).collect())
    }
}
