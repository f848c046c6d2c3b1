use bytes::{Buf, BufMut};

use crate::tag::NbtTag;
use crate::{ensure_remaining, get_nbt_string, put_nbt_string, Nbt, Result, END_ID};

/// Named child tags in insertion order. Names are unique.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NbtCompound {
    pub child_tags: Vec<(String, NbtTag)>,
}

impl NbtCompound {
    pub fn new() -> NbtCompound {
        NbtCompound {
            child_tags: Vec::new(),
        }
    }

    pub fn deserialize_content(r: &mut impl Buf) -> Result<NbtCompound> {
        let mut compound = NbtCompound::new();

        loop {
            // A root compound may end at the end of the buffer instead of an End tag.
            if !r.has_remaining() {
                break;
            }
            let tag_id = r.get_u8();
            if tag_id == END_ID {
                break;
            }

            let name = get_nbt_string(r)?;
            let tag = NbtTag::deserialize_data(r, tag_id)?;
            compound.put(&name, tag);
        }

        Ok(compound)
    }

    pub fn serialize_content(&self, w: &mut impl BufMut) -> Result<()> {
        for (name, tag) in &self.child_tags {
            w.put_u8(tag.get_type_id());
            put_nbt_string(w, name)?;
            tag.serialize_data(w)?;
        }
        w.put_u8(END_ID);
        Ok(())
    }

    /// Inserts `value` under `name`, replacing the tag already stored there.
    pub fn put(&mut self, name: &str, value: impl Into<NbtTag>) {
        let value = value.into();
        match self.get_mut(name) {
            Some(existing) => *existing = value,
            None => self.child_tags.push((name.to_string(), value)),
        }
    }

    pub fn put_byte(&mut self, name: &str, value: i8) {
        self.put(name, NbtTag::Byte(value));
    }

    pub fn put_int(&mut self, name: &str, value: i32) {
        self.put(name, NbtTag::Int(value));
    }

    pub fn put_long(&mut self, name: &str, value: i64) {
        self.put(name, NbtTag::Long(value));
    }

    pub fn put_compound(&mut self, name: &str, value: NbtCompound) {
        self.put(name, NbtTag::Compound(value));
    }

    pub fn remove(&mut self, name: &str) -> Option<NbtTag> {
        let index = self.child_tags.iter().position(|(key, _)| key == name)?;
        Some(self.child_tags.remove(index).1)
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&NbtTag> {
        self.child_tags
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut NbtTag> {
        self.child_tags
            .iter_mut()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.child_tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.child_tags.is_empty()
    }

    pub fn get_byte(&self, name: &str) -> Option<i8> {
        self.get(name).and_then(|tag| tag.extract_byte())
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(|tag| tag.extract_int())
    }

    pub fn get_long(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|tag| tag.extract_long())
    }

    pub fn get_string(&self, name: &str) -> Option<&String> {
        self.get(name).and_then(|tag| tag.extract_string())
    }

    pub fn get_list(&self, name: &str) -> Option<&[NbtTag]> {
        self.get(name).and_then(|tag| tag.extract_list())
    }

    pub fn get_compound(&self, name: &str) -> Option<&NbtCompound> {
        self.get(name).and_then(|tag| tag.extract_compound())
    }

    pub fn get_compound_mut(&mut self, name: &str) -> Option<&mut NbtCompound> {
        self.get_mut(name).and_then(|tag| tag.extract_compound_mut())
    }

    pub fn get_int_array(&self, name: &str) -> Option<&[i32]> {
        self.get(name).and_then(|tag| tag.extract_int_array())
    }
}

impl From<Nbt> for NbtCompound {
    fn from(value: Nbt) -> Self {
        value.root_tag
    }
}

impl FromIterator<(String, NbtTag)> for NbtCompound {
    fn from_iter<T: IntoIterator<Item = (String, NbtTag)>>(iter: T) -> Self {
        let mut compound = NbtCompound::new();
        for (key, value) in iter {
            compound.put(&key, value);
        }
        compound
    }
}

impl IntoIterator for NbtCompound {
    type Item = (String, NbtTag);
    type IntoIter = std::vec::IntoIter<(String, NbtTag)>;

    fn into_iter(self) -> Self::IntoIter {
        self.child_tags.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::NbtCompound;
    use crate::tag::NbtTag;

    #[test]
    fn put_replaces_existing_value() {
        let mut compound = NbtCompound::new();
        compound.put_int("DataVersion", 3465);
        compound.put_int("DataVersion", 4325);
        assert_eq!(compound.len(), 1);
        assert_eq!(compound.get_int("DataVersion"), Some(4325));
    }

    #[test]
    fn nested_compound_is_mutable_in_place() {
        let mut inner = NbtCompound::new();
        inner.put("id", "minecraft:pig");
        let mut outer = NbtCompound::new();
        outer.put_compound("entity", inner);

        outer
            .get_compound_mut("entity")
            .unwrap()
            .put("CustomName", "Wilbur");
        let entity = outer.get_compound("entity").unwrap();
        assert_eq!(entity.get_string("CustomName").unwrap(), "Wilbur");
        assert_eq!(outer.remove("entity").map(|tag| tag.get_type_id()), Some(crate::COMPOUND_ID));
        assert!(outer.is_empty());
        assert!(!outer.contains_key("entity"));
        assert_eq!(NbtTag::from(1.5).extract_double(), Some(1.5));
    }
}
