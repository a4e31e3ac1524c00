use byteorder::{BigEndian, WriteBytesExt};
use std::io::Result;

/// Serialization into the big-endian layout used by class files
///
/// A dedicated trait (instead of `serde`) fits class file structures better:
///
///   - tags are always `u8`
///   - sequences are usually prefixed with a `u16` length
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;

    /// Serialize into a fresh byte vector
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

macro_rules! big_endian_serialize {
    ($($typ:ty => $method:ident),* $(,)?) => {
        $(
            impl Serialize for $typ {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                    writer.$method::<BigEndian>(*self)
                }
            }
        )*
    };
}

big_endian_serialize! {
    u16 => write_u16,
    u32 => write_u32,
    i16 => write_i16,
    i32 => write_i32,
    i64 => write_i64,
    f32 => write_f32,
    f64 => write_f64,
}

/// Size in `u16` is the first thing serialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}
