//! # Boundary Codec
//!
//! Manual big-endian encoding for compound values the C ABI cannot carry
//! directly: records, enums, options, sequences, and native references.
//!
//! ## Wire Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          BOUNDARY ENCODING                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Integers / floats   fixed width, big-endian                           │
//! │  bool                1 byte, 0 or 1                                    │
//! │  bytes / string      i32 length (BE) + payload                         │
//! │  option              1 byte tag (0 = none, 1 = some) + value           │
//! │  sequence            i32 count (BE) + items                            │
//! │  enum                i32 variant index (1-based) + fields              │
//! │  record              fields in declaration order                       │
//! │  native reference    u64 pointer value                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no schema on the wire. Each compound type implements
//! [`Encode`] and/or [`Decode`] and the two sides agree on the layout.
//!
//! ## Example
//!
//! ```
//! use tether_core::codec::{Reader, Writer};
//!
//! let mut writer = Writer::new();
//! writer.write_str("abc").unwrap();
//! writer.write_u32(7);
//! let bytes = writer.finish();
//!
//! let mut reader = Reader::new(&bytes);
//! assert_eq!(reader.read_string().unwrap(), "abc");
//! assert_eq!(reader.read_u32().unwrap(), 7);
//! reader.finish().unwrap();
//! ```

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Option tag for an absent value
pub const OPTION_NONE: i8 = 0;

/// Option tag for a present value
pub const OPTION_SOME: i8 = 1;

/// A value with a writer
pub trait Encode {
    /// Append this value to the writer
    fn encode(&self, writer: &mut Writer) -> Result<()>;
}

/// A value with a reader
pub trait Decode: Sized {
    /// Read one value from the cursor
    fn decode(reader: &mut Reader<'_>) -> Result<Self>;
}

/// Encode one value into a fresh buffer
pub fn encode_to_vec<T: Encode + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    value.encode(&mut writer)?;
    Ok(writer.finish())
}

/// Decode exactly one value from `bytes`, rejecting trailing data
pub fn decode_from_slice<T: Decode>(bytes: &[u8]) -> Result<T> {
    let mut reader = Reader::new(bytes);
    let value = T::decode(&mut reader)?;
    reader.finish()?;
    Ok(value)
}

/// The error for a variant index a decoder does not know
pub fn unknown_variant(type_name: &str, index: i32) -> Error {
    Error::Decode(format!("unknown {} variant index {}", type_name, index))
}

/// Convert a host length to the `i32` used on the wire
pub(crate) fn wire_len(len: usize) -> Result<i32> {
    i32::try_from(len)
        .map_err(|_| Error::Encode(format!("length {} does not fit in an i32 prefix", len)))
}

// ============================================================================
// PRIMITIVE IMPLEMENTATIONS
// ============================================================================

macro_rules! impl_fixed {
    ($($ty:ty => $write:ident, $read:ident;)*) => {
        $(
            impl Encode for $ty {
                fn encode(&self, writer: &mut Writer) -> Result<()> {
                    writer.$write(*self);
                    Ok(())
                }
            }

            impl Decode for $ty {
                fn decode(reader: &mut Reader<'_>) -> Result<Self> {
                    reader.$read()
                }
            }
        )*
    };
}

impl_fixed! {
    i8 => write_i8, read_i8;
    u8 => write_u8, read_u8;
    i16 => write_i16, read_i16;
    u16 => write_u16, read_u16;
    i32 => write_i32, read_i32;
    u32 => write_u32, read_u32;
    i64 => write_i64, read_i64;
    u64 => write_u64, read_u64;
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
    bool => write_bool, read_bool;
}

impl Encode for str {
    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_str(self)
    }
}

impl Encode for String {
    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_str(self)
    }
}

impl Decode for String {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        reader.read_string()
    }
}

impl Encode for Bytes {
    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_bytes(self)
    }
}

impl Decode for Bytes {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        reader.read_bytes().map(Bytes::from)
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_seq(self)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_seq(self)
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        reader.read_seq()
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_option(self.as_ref())
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        reader.read_option()
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, writer: &mut Writer) -> Result<()> {
        (**self).encode(writer)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use proptest::collection::vec;
    use proptest::prelude::*;

    /// A record holding a string and an embedded native reference
    #[derive(Debug, PartialEq)]
    struct Entry {
        name: String,
        target: u64,
    }

    impl Encode for Entry {
        fn encode(&self, writer: &mut Writer) -> Result<()> {
            writer.write_str(&self.name)?;
            writer.write_pointer(self.target);
            Ok(())
        }
    }

    impl Decode for Entry {
        fn decode(reader: &mut Reader<'_>) -> Result<Self> {
            Ok(Self {
                name: reader.read_string()?,
                target: reader.read_pointer()?,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Shape {
        Point,
        Circle { radius: f64 },
        Label(String, Option<u16>),
    }

    impl Encode for Shape {
        fn encode(&self, writer: &mut Writer) -> Result<()> {
            match self {
                Shape::Point => writer.write_variant(1),
                Shape::Circle { radius } => {
                    writer.write_variant(2);
                    writer.write_f64(*radius);
                }
                Shape::Label(text, size) => {
                    writer.write_variant(3);
                    writer.write_str(text)?;
                    writer.write_option(size.as_ref())?;
                }
            }
            Ok(())
        }
    }

    impl Decode for Shape {
        fn decode(reader: &mut Reader<'_>) -> Result<Self> {
            match reader.read_variant()? {
                1 => Ok(Shape::Point),
                2 => Ok(Shape::Circle {
                    radius: reader.read_f64()?,
                }),
                3 => Ok(Shape::Label(reader.read_string()?, reader.read_option()?)),
                other => Err(unknown_variant("Shape", other)),
            }
        }
    }

    #[test]
    fn test_record_with_pointer_layout() {
        let entry = Entry {
            name: "abc".into(),
            target: 0x1234,
        };
        let bytes = encode_to_vec(&entry).unwrap();

        assert_eq!(
            bytes,
            vec![0, 0, 0, 3, b'a', b'b', b'c', 0, 0, 0, 0, 0, 0, 0x12, 0x34]
        );
        assert_eq!(decode_from_slice::<Entry>(&bytes).unwrap(), entry);
    }

    #[test]
    fn test_enum_every_variant() {
        let shapes = vec![
            Shape::Point,
            Shape::Circle { radius: 2.5 },
            Shape::Label("north".into(), Some(12)),
            Shape::Label(String::new(), None),
        ];

        for shape in shapes {
            let bytes = encode_to_vec(&shape).unwrap();
            assert_eq!(decode_from_slice::<Shape>(&bytes).unwrap(), shape);
        }
    }

    #[test]
    fn test_variant_index_is_one_based() {
        let bytes = encode_to_vec(&Shape::Point).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_unknown_variant_rejected() {
        let err = decode_from_slice::<Shape>(&[0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::Decode(msg) if msg.contains("Shape")));
    }

    #[test]
    fn test_sequence_of_strings() {
        let peers = vec!["alpha".to_string(), "beta".to_string()];
        let bytes = encode_to_vec(&peers).unwrap();
        assert_eq!(&bytes[..4], &[0, 0, 0, 2]);
        assert_eq!(decode_from_slice::<Vec<String>>(&bytes).unwrap(), peers);
    }

    #[test]
    fn test_fixed_width_big_endian() {
        let mut writer = Writer::new();
        writer.write_u16(0x0102);
        writer.write_i64(-2);
        writer.write_bool(true);
        let bytes = writer.finish();

        assert_eq!(&bytes[..2], &[1, 2]);
        assert_eq!(&bytes[2..10], &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(bytes[10], 1);
    }

    #[test]
    fn test_short_buffer_is_decode_error() {
        let mut reader = Reader::new(&[0, 0, 0, 9, b'x']);
        assert!(matches!(reader.read_string(), Err(Error::Decode(_))));

        let mut reader = Reader::new(&[0, 1]);
        assert!(matches!(reader.read_u32(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_negative_length_rejected() {
        let mut reader = Reader::new(&[0xff, 0xff, 0xff, 0xfe]);
        let err = reader.read_bytes().unwrap_err();
        assert!(matches!(err, Error::Decode(msg) if msg.contains("negative")));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut reader = Reader::new(&[0, 0, 0, 2, 0xc3, 0x28]);
        assert!(matches!(reader.read_string(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_invalid_tags_rejected() {
        let mut reader = Reader::new(&[2]);
        assert!(matches!(reader.read_option::<u8>(), Err(Error::Decode(_))));

        let mut reader = Reader::new(&[7]);
        assert!(matches!(reader.read_bool(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let err = decode_from_slice::<u8>(&[1, 2]).unwrap_err();
        assert!(matches!(err, Error::Decode(msg) if msg.contains("trailing")));
    }

    #[test]
    fn test_position_tracks_reads() {
        let mut reader = Reader::new(&[0, 0, 0, 1, b'z', 9]);
        reader.read_string().unwrap();
        assert_eq!(reader.position(), 5);
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_writer_releases_handles_unless_committed() {
        let ptr = testing::new_object("wallet", Vec::new());
        let addr = ptr as usize;
        let handle =
            unsafe { crate::ffi::Handle::wrap(ptr, testing::handle_vtable("wallet")) }.unwrap();

        let mut writer = Writer::new();
        writer.write_handle(handle.for_call().unwrap());
        assert_eq!(testing::object_refs(addr), 2);
        drop(writer);
        assert_eq!(testing::object_refs(addr), 1);

        let mut writer = Writer::new();
        writer.write_handle(handle.for_call().unwrap());
        let bytes = writer.finish();
        assert_eq!(bytes, (addr as u64).to_be_bytes().to_vec());
        assert_eq!(testing::object_refs(addr), 1);

        let mut writer = Writer::new();
        writer.write_handle(handle.for_call().unwrap());
        writer.commit_handles();
        assert_eq!(testing::object_refs(addr), 2);

        unsafe { testing::consume_object(ptr) };
        drop(handle);
        assert_eq!(testing::object_refs(addr), 0);
    }

    fn any_shape() -> impl Strategy<Value = Shape> {
        prop_oneof![
            Just(Shape::Point),
            (-1.0e9f64..1.0e9).prop_map(|radius| Shape::Circle { radius }),
            ("\\PC{0,32}", any::<Option<u16>>())
                .prop_map(|(text, size)| Shape::Label(text, size)),
        ]
    }

    proptest! {
        #[test]
        fn test_any_bytes_and_string_read_back(
            bytes in vec(any::<u8>(), 0..256),
            text in "\\PC{0,64}",
        ) {
            let mut writer = Writer::new();
            writer.write_bytes(&bytes).unwrap();
            writer.write_str(&text).unwrap();
            let encoded = writer.finish();
            prop_assert_eq!(encoded.len(), 8 + bytes.len() + text.len());

            let mut reader = Reader::new(&encoded);
            prop_assert_eq!(reader.read_bytes().unwrap(), bytes);
            prop_assert_eq!(reader.read_string().unwrap(), text);
            reader.finish().unwrap();
        }

        #[test]
        fn test_any_sequence_reads_back(items in vec(any::<i64>(), 0..64)) {
            let encoded = encode_to_vec(&items).unwrap();
            prop_assert_eq!(encoded.len(), 4 + 8 * items.len());
            prop_assert_eq!(decode_from_slice::<Vec<i64>>(&encoded).unwrap(), items);
        }

        #[test]
        fn test_every_enum_variant_reads_back(shapes in vec(any_shape(), 0..16)) {
            let mut writer = Writer::new();
            writer.write_seq(&shapes).unwrap();
            let encoded = writer.finish();

            let mut reader = Reader::new(&encoded);
            prop_assert_eq!(reader.read_seq::<Shape>().unwrap(), shapes);
            reader.finish().unwrap();
        }
    }
}
