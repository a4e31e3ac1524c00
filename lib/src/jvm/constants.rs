use super::{
    BinaryName, FieldType, MethodDescriptor, Name, RefType, RenderDescriptor, Serialize,
    UnqualifiedName,
};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::WriteBytesExt;
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;

/// Symbolic constant operand of an instruction
///
/// This is what instructions carry until the method is resolved against a [`ConstantPool`].
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),

    /// Class, interface, or array type (for `checkcast`, `new`, `ldc`, ...)
    Class(RefType<BinaryName>),

    Field(FieldRef),
    Method(MethodRef),
}

/// Reference to a field of some class
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
}

/// Reference to a method of some class or interface
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: RefType<BinaryName>,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub is_interface: bool,
}

impl Constant {
    /// Can this be loaded with `ldc2_w` (as opposed to `ldc`/`ldc_w`)?
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// Class file constants pool builder
///
/// The pool is append only. Equal constants are interned to the same index.
#[derive(Debug)]
pub struct ConstantPool {
    entries: OffsetVec<PoolEntry>,

    classes: HashMap<String, ConstantIndex>,
    strings: HashMap<ConstantIndex, ConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
    fieldrefs: HashMap<FieldRef, ConstantIndex>,
    methodrefs: HashMap<MethodRef, ConstantIndex>,
    name_and_types: HashMap<(ConstantIndex, ConstantIndex), ConstantIndex>,
    utf8s: HashMap<String, ConstantIndex>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

impl ConstantPool {
    pub fn new() -> ConstantPool {
        ConstantPool {
            entries: OffsetVec::new_starting_at(Offset(1)),
            classes: HashMap::new(),
            strings: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
            fieldrefs: HashMap::new(),
            methodrefs: HashMap::new(),
            name_and_types: HashMap::new(),
            utf8s: HashMap::new(),
        }
    }

    /// Entries, keyed by their index
    pub fn entries(&self) -> &OffsetVec<PoolEntry> {
        &self.entries
    }

    /// Look up the entry at an index
    pub fn get(&self, index: ConstantIndex) -> Option<&PoolEntry> {
        self.entries.get_offset(Offset(index.0 as usize))
    }

    /// Push an entry into the pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_entry(&mut self, entry: PoolEntry) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let offset = self.entries.offset_len().0;
        if offset + entry.width() > u16::MAX as usize + 1 {
            return Err(ConstantPoolOverflow { entry, offset });
        }
        self.entries.push(entry);
        Ok(ConstantIndex(offset as u16))
    }

    /// Get or insert a constant, returning its index
    pub fn intern(&mut self, constant: &Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        match constant {
            Constant::Integer(integer) => {
                if let Some(idx) = self.integers.get(integer) {
                    return Ok(*idx);
                }
                let idx = self.push_entry(PoolEntry::Integer(*integer))?;
                self.integers.insert(*integer, idx);
                Ok(idx)
            }
            Constant::Float(float) => {
                if let Some(idx) = self.floats.get(&float.to_bits()) {
                    return Ok(*idx);
                }
                let idx = self.push_entry(PoolEntry::Float(*float))?;
                self.floats.insert(float.to_bits(), idx);
                Ok(idx)
            }
            Constant::Long(long) => {
                if let Some(idx) = self.longs.get(long) {
                    return Ok(*idx);
                }
                let idx = self.push_entry(PoolEntry::Long(*long))?;
                self.longs.insert(*long, idx);
                Ok(idx)
            }
            Constant::Double(double) => {
                if let Some(idx) = self.doubles.get(&double.to_bits()) {
                    return Ok(*idx);
                }
                let idx = self.push_entry(PoolEntry::Double(*double))?;
                self.doubles.insert(double.to_bits(), idx);
                Ok(idx)
            }
            Constant::String(string) => {
                let utf8 = self.utf8(string.as_str())?;
                if let Some(idx) = self.strings.get(&utf8) {
                    return Ok(*idx);
                }
                let idx = self.push_entry(PoolEntry::String(utf8))?;
                self.strings.insert(utf8, idx);
                Ok(idx)
            }
            Constant::Class(ref_type) => self.class(ref_type),
            Constant::Field(field) => {
                if let Some(idx) = self.fieldrefs.get(field) {
                    return Ok(*idx);
                }
                let class = self.class(&RefType::Object(field.class.clone()))?;
                let name_and_type =
                    self.name_and_type(field.name.as_str(), &field.descriptor.render())?;
                let idx = self.push_entry(PoolEntry::FieldRef {
                    class,
                    name_and_type,
                })?;
                self.fieldrefs.insert(field.clone(), idx);
                Ok(idx)
            }
            Constant::Method(method) => {
                if let Some(idx) = self.methodrefs.get(method) {
                    return Ok(*idx);
                }
                let class = self.class(&method.class)?;
                let name_and_type =
                    self.name_and_type(method.name.as_str(), &method.descriptor.render())?;
                let idx = self.push_entry(PoolEntry::MethodRef {
                    class,
                    name_and_type,
                    is_interface: method.is_interface,
                })?;
                self.methodrefs.insert(method.clone(), idx);
                Ok(idx)
            }
        }
    }

    /// Get or insert a `CONSTANT_Class_info`
    ///
    /// Reference types are almost always objects, but array types show up too (eg. for a
    /// `checkcast` to an array type).
    pub fn class(&mut self, ref_type: &RefType<BinaryName>) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let class_name = ref_type.class_name();
        if let Some(idx) = self.classes.get(&class_name) {
            return Ok(*idx);
        }
        let name = self.utf8(class_name.as_str())?;
        let idx = self.push_entry(PoolEntry::Class(name))?;
        self.classes.insert(class_name, idx);
        Ok(idx)
    }

    /// Get or insert a utf8 constant
    pub fn utf8<'a, S: Into<Cow<'a, str>>>(
        &mut self,
        utf8: S,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let cow = utf8.into();
        if let Some(idx) = self.utf8s.get::<str>(cow.borrow()) {
            return Ok(*idx);
        }
        let owned = cow.into_owned();
        let idx = self.push_entry(PoolEntry::Utf8(owned.clone()))?;
        self.utf8s.insert(owned, idx);
        Ok(idx)
    }

    fn name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let name = self.utf8(name)?;
        let descriptor = self.utf8(descriptor)?;
        if let Some(idx) = self.name_and_types.get(&(name, descriptor)) {
            return Ok(*idx);
        }
        let idx = self.push_entry(PoolEntry::NameAndType { name, descriptor })?;
        self.name_and_types.insert((name, descriptor), idx);
        Ok(idx)
    }
}

/// Count of `constant_pool_count` (one more than the last index) followed by the entries
impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.entries.offset_len().0 as u16).serialize(writer)?;
        for (_, _, entry) in &self.entries {
            entry.serialize(writer)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ConstantPoolOverflow {
    pub entry: PoolEntry,
    pub offset: usize,
}

/// Entries as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEntry {
    /// Class or an interface
    Class(ConstantIndex),

    FieldRef {
        class: ConstantIndex,
        name_and_type: ConstantIndex,
    },

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ConstantIndex,
        name_and_type: ConstantIndex,
        is_interface: bool,
    },

    String(ConstantIndex),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),

    NameAndType {
        name: ConstantIndex,
        descriptor: ConstantIndex,
    },

    /// Constant "UTF-8" string value (see [`encode_modified_utf8`])
    Utf8(String),
}

impl Serialize for PoolEntry {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            PoolEntry::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            PoolEntry::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            PoolEntry::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            PoolEntry::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            PoolEntry::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            PoolEntry::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            PoolEntry::String(utf8) => {
                8u8.serialize(writer)?;
                utf8.serialize(writer)?;
            }
            PoolEntry::FieldRef {
                class,
                name_and_type,
            } => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            PoolEntry::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if *is_interface { 11u8 } else { 10u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            PoolEntry::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// All 8-byte constants take up two entries in the constant pool: the index following a
/// `CONSTANT_Long_info` or `CONSTANT_Double_info` is valid but unusable.
impl Width for PoolEntry {
    fn width(&self) -> usize {
        match self {
            PoolEntry::Long(_) | PoolEntry::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

/// Modified UTF-8 format used in class files.
///
/// The differences from standard UTF-8 are:
///
///  * the null character `\u0000` is encoded in 2-byte format rather than 1-byte
///  * only the 1-byte, 2-byte, and 3-byte formats are used
///  * supplementary characters are represented in the form of surrogate pairs
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters become a surrogate pair of 3-byte sequences
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x1F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn modified_utf8() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(encode_modified_utf8("Ą"), vec![196, 132]);
        assert_eq!(
            encode_modified_utf8("\u{10000}"),
            vec![237, 160, 128, 237, 176, 128]
        );
    }

    #[test]
    fn wide_entries_take_two_indices() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.intern(&Constant::Integer(7)).unwrap(), ConstantIndex(1));
        assert_eq!(pool.intern(&Constant::Long(7)).unwrap(), ConstantIndex(2));
        assert_eq!(pool.intern(&Constant::Float(1.5)).unwrap(), ConstantIndex(4));
        assert_eq!(pool.intern(&Constant::Integer(7)).unwrap(), ConstantIndex(1));
        assert_eq!(pool.get(ConstantIndex(2)), Some(&PoolEntry::Long(7)));
        assert_eq!(pool.get(ConstantIndex(3)), None);
    }

    #[test]
    fn member_references_share_entries() {
        let mut pool = ConstantPool::new();
        let length = MethodRef {
            class: RefType::Object(BinaryName::STRING),
            name: UnqualifiedName::from_string(String::from("length")).unwrap(),
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::int()),
            },
            is_interface: false,
        };
        let first = pool.intern(&Constant::Method(length.clone())).unwrap();
        let second = pool.intern(&Constant::Method(length)).unwrap();
        assert_eq!(first, second);

        let string_class = pool.class(&RefType::Object(BinaryName::STRING)).unwrap();
        assert!(string_class.0 < first.0);
        assert!(matches!(pool.get(first), Some(PoolEntry::MethodRef { is_interface: false, .. })));

        // class, its name, name, descriptor, name and type, method ref
        assert_eq!(pool.entries().len(), 6);
        let bytes = pool.to_bytes().unwrap();
        assert_eq!(&bytes[..2], &[0, 7]);
    }

    #[test]
    fn array_classes_use_descriptors() {
        let mut pool = ConstantPool::new();
        let ints = RefType::array(FieldType::<BinaryName>::int());
        let idx = pool.class(&ints).unwrap();
        let name = match pool.get(idx) {
            Some(PoolEntry::Class(name)) => *name,
            other => panic!("unexpected entry {:?}", other),
        };
        assert_eq!(pool.get(name), Some(&PoolEntry::Utf8(String::from("[I"))));
    }
}
