//! Encoding and decoding of SERI records
//!
//! A record is a 10 byte header (`SERI`, data region offset, field count), a field table of
//! `(name offset, value offset)` pairs, one tag byte per field and finally the data region. Name
//! and string offsets point into the package [`StringTable`], every other offset is relative to the
//! start of the data region, which is shared by the whole record including nested objects and
//! arrays.
//!
//! | Tag | Value                                                                         |
//! |-----|-------------------------------------------------------------------------------|
//! | `i` | `u32`, or a 1-based slot reference for [`SCALAR_SLOT_KEYS`]                   |
//! | `f` | `f32`                                                                         |
//! | `b` | single byte boolean                                                           |
//! | `s` | the value offset itself is the string table offset                            |
//! | `a` | element tag, pad byte, `u16` count, `count` element offsets                   |
//! | `h` | `u16` field count followed by a nested field table and tag list               |

use std::cell::Cell;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use tracing::{instrument, trace};

use crate::error::{Error, Result};
use crate::string_table::StringTable;
use crate::text;
use crate::value::{Object, Value};

/// Magic every SERI record starts with
pub const MAGIC: &[u8; 4] = b"SERI";

const HEADER_SIZE: usize = 0xA;
const FIELD_SIZE: usize = 4;
const ARRAY_HEADER_SIZE: usize = 4;
// The stored data region offset is counted from the end of the magic
const DATA_REGION_BIAS: usize = 4;
const MAX_DEPTH: usize = 64;

/// Integer fields under these keys reference a slot instead of holding a number
pub const SCALAR_SLOT_KEYS: [&str; 5] = ["bone", "smes", "smat", "tex", "hair_length"];

/// Integer arrays under these keys hold slot references
pub const ARRAY_SLOT_KEYS: [&str; 4] = ["texi", "model", "cloth", "list"];

fn is_scalar_slot(key: &str) -> bool {
    SCALAR_SLOT_KEYS.contains(&key)
}

fn is_array_slot(key: &str) -> bool {
    ARRAY_SLOT_KEYS.contains(&key)
}

fn slot_value(key: &str) -> Error {
    Error::SlotValue {
        key: key.to_owned(),
    }
}

fn to_u16(field: &'static str, value: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::OffsetOverflow {
        field,
        value: value as u64,
    })
}

/// Decode a SERI record, resolving names and strings through `table`
#[instrument(skip_all, err, fields(size = data.len()))]
pub fn decode(data: &[u8], table: &StringTable) -> Result<Object> {
    if data.len() < HEADER_SIZE || &data[..4] != MAGIC {
        return Err(Error::BadMagic {
            container: "SERI",
            offset: 0,
        });
    }

    let data_region = LittleEndian::read_u32(&data[4..8]) as usize;
    let count = LittleEndian::read_u16(&data[8..10]) as usize;

    let decoder = Decoder {
        data,
        table,
        base: DATA_REGION_BIAS + data_region,
        decoded: Cell::new(0),
    };
    decoder.fields(HEADER_SIZE, count, 0)
}

struct Decoder<'a> {
    data: &'a [u8],
    table: &'a StringTable,
    base: usize,
    // Offsets may be shared, so a short record can describe an exponential number of values.
    // Every value written by the encoder takes at least one byte of the record.
    decoded: Cell<usize>,
}

impl Decoder<'_> {
    fn count_value(&self) -> Result<()> {
        let decoded = self.decoded.get() + 1;
        if decoded > self.data.len() {
            return Err(Error::SeriExpansion {
                size: self.data.len(),
                limit: self.data.len(),
            });
        }
        self.decoded.set(decoded);
        Ok(())
    }

    fn bytes(&self, pos: usize, len: usize) -> Result<&[u8]> {
        self.data.get(pos..pos + len).ok_or(Error::OutOfBounds {
            offset: pos as u64,
            len: len as u64,
            limit: self.data.len() as u64,
        })
    }

    fn u8_at(&self, pos: usize) -> Result<u8> {
        Ok(self.bytes(pos, 1)?[0])
    }

    fn u16_at(&self, pos: usize) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.bytes(pos, 2)?))
    }

    fn u32_at(&self, pos: usize) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.bytes(pos, 4)?))
    }

    fn f32_at(&self, pos: usize) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.bytes(pos, 4)?))
    }

    fn string(&self, offset: u16) -> Result<String> {
        Ok(text::decode(self.table.lookup(offset as u32)?))
    }

    fn slot(&self, reference: u32) -> Result<String> {
        let index = reference.checked_sub(1).ok_or(Error::OutOfBounds {
            offset: 0,
            len: 0,
            limit: self.table.slot_count() as u64,
        })?;
        Ok(text::decode(self.table.slot_string(index as usize)?))
    }

    fn fields(&self, table_pos: usize, count: usize, depth: usize) -> Result<Object> {
        if depth > MAX_DEPTH {
            return Err(Error::CustomError(format!(
                "SERI nesting deeper than {MAX_DEPTH} levels"
            )));
        }

        let tags_pos = table_pos + count * FIELD_SIZE;
        let mut object = Object::with_capacity(count);
        for i in 0..count {
            let entry = table_pos + i * FIELD_SIZE;
            let name_offset = self.u16_at(entry)?;
            let value_offset = self.u16_at(entry + 2)?;
            let tag = self.u8_at(tags_pos + i)?;
            self.count_value()?;

            let key = self.string(name_offset)?;
            trace!(key = %key, tag = %(tag as char), value_offset);
            let value = self.value(&key, tag, value_offset, depth)?;
            object.insert(key, value);
        }
        Ok(object)
    }

    fn value(&self, key: &str, tag: u8, offset: u16, depth: usize) -> Result<Value> {
        let pos = self.base + offset as usize;
        Ok(match tag {
            b's' => {
                // The word stored here is never used, the offset itself points into the string table
                let _ = self.u32_at(pos);
                Value::Str(self.string(offset)?)
            }
            b'i' => {
                let v = self.u32_at(pos)?;
                if is_scalar_slot(key) {
                    Value::Str(self.slot(v)?)
                } else {
                    Value::UInt(v)
                }
            }
            b'f' => Value::Float(self.f32_at(pos)?),
            b'b' => Value::Bool(self.u8_at(pos)? != 0),
            b'a' => self.array(key, pos, depth + 1)?,
            b'h' => {
                let count = self.u16_at(pos)? as usize;
                Value::Object(self.fields(pos + 2, count, depth + 1)?)
            }
            t => {
                return Err(Error::UnknownValueTag {
                    tag: t as char,
                    offset: pos,
                })
            }
        })
    }

    fn array(&self, key: &str, pos: usize, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(Error::CustomError(format!(
                "SERI nesting deeper than {MAX_DEPTH} levels"
            )));
        }

        let tag = self.u8_at(pos)?;
        let count = self.u16_at(pos + 2)? as usize;

        let mut values = Vec::with_capacity(count);
        for i in 0..count {
            let offset = self.u16_at(pos + ARRAY_HEADER_SIZE + i * 2)?;
            self.count_value()?;
            values.push(self.element(key, tag, offset, depth)?);
        }
        Ok(Value::Array(values))
    }

    fn element(&self, key: &str, tag: u8, offset: u16, depth: usize) -> Result<Value> {
        let pos = self.base + offset as usize;
        Ok(match tag {
            b'i' => {
                let v = self.u32_at(pos)?;
                if is_array_slot(key) {
                    Value::Str(self.slot(v)?)
                } else {
                    Value::UInt(v)
                }
            }
            b'f' => Value::Float(self.f32_at(pos)?),
            b'b' => Value::Bool(self.u8_at(pos)? != 0),
            b's' => Value::Str(self.string(offset)?),
            b'a' => self.array(key, pos, depth + 1)?,
            b'h' => {
                let count = self.u16_at(pos)? as usize;
                Value::Object(self.fields(pos + 2, count, depth + 1)?)
            }
            t => {
                return Err(Error::UnknownValueTag {
                    tag: t as char,
                    offset: pos,
                })
            }
        })
    }
}

/// Add every key and plain string value of `object` to `table`, depth first
pub fn index_strings(object: &Object, table: &mut StringTable) -> Result<()> {
    for (key, value) in object {
        table.add(&text::encode(key)?);
        index_value(key, value, table)?;
    }
    Ok(())
}

fn index_value(key: &str, value: &Value, table: &mut StringTable) -> Result<()> {
    match value {
        Value::Str(s) if !is_scalar_slot(key) => {
            table.add(&text::encode(s)?);
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Str(s) if !is_array_slot(key) => {
                        table.add(&text::encode(s)?);
                    }
                    Value::Array(_) => index_value(key, item, table)?,
                    Value::Object(o) => index_strings(o, table)?,
                    _ => {}
                }
            }
        }
        Value::Object(o) => index_strings(o, table)?,
        _ => {}
    }
    Ok(())
}

/// Index all strings of `object` into `table` and encode it
///
/// Slot references are not created here, strings stored under slot keys must already have been
/// registered with [`StringTable::push_slot`].
pub fn encode(object: &Object, table: &mut StringTable) -> Result<Vec<u8>> {
    index_strings(object, table)?;
    encode_indexed(object, table)
}

/// Encode `object` against a table which already holds all of its strings
#[instrument(skip_all, err, fields(fields = object.len()))]
pub fn encode_indexed(object: &Object, table: &StringTable) -> Result<Vec<u8>> {
    let count = to_u16("field count", object.len())?;

    let mut encoder = Encoder {
        table,
        data: Vec::new(),
    };
    let (entries, tags) = encoder.fields(object)?;

    let table_size = object.len() * (FIELD_SIZE + 1);
    let mut out = Vec::with_capacity(HEADER_SIZE + table_size + encoder.data.len());
    out.extend_from_slice(MAGIC);
    out.write_u32::<LittleEndian>((HEADER_SIZE + table_size - DATA_REGION_BIAS) as u32)?;
    out.write_u16::<LittleEndian>(count)?;
    for (name, value) in entries {
        out.write_u16::<LittleEndian>(name)?;
        out.write_u16::<LittleEndian>(value)?;
    }
    out.extend_from_slice(&tags);
    out.extend_from_slice(&encoder.data);

    Ok(out)
}

struct Encoder<'a> {
    table: &'a StringTable,
    data: Vec<u8>,
}

impl Encoder<'_> {
    /// Claim the next `len` bytes of the data region
    fn alloc(&mut self, len: usize) -> Result<usize> {
        let offset = self.data.len();
        to_u16("value offset", offset)?;
        self.data.resize(offset + len, 0);
        Ok(offset)
    }

    fn name(&self, key: &str) -> Result<u16> {
        let offset = self.table.find(&text::encode(key)?)?;
        to_u16("name offset", offset as usize)
    }

    fn string(&self, s: &str) -> Result<u16> {
        let offset = self.table.find(&text::encode(s)?)?;
        to_u16("string offset", offset as usize)
    }

    fn slot(&mut self, s: &str) -> Result<usize> {
        let reference = self.table.slot_of(&text::encode(s)?)? + 1;
        let at = self.alloc(4)?;
        LittleEndian::write_u32(&mut self.data[at..], reference as u32);
        Ok(at)
    }

    fn uint(&mut self, v: u32) -> Result<usize> {
        let at = self.alloc(4)?;
        LittleEndian::write_u32(&mut self.data[at..], v);
        Ok(at)
    }

    fn float(&mut self, v: f32) -> Result<usize> {
        let at = self.alloc(4)?;
        LittleEndian::write_f32(&mut self.data[at..], v);
        Ok(at)
    }

    fn boolean(&mut self, v: bool) -> Result<usize> {
        let at = self.alloc(1)?;
        self.data[at] = u8::from(v);
        Ok(at)
    }

    fn fields(&mut self, object: &Object) -> Result<(Vec<(u16, u16)>, Vec<u8>)> {
        let mut entries = Vec::with_capacity(object.len());
        let mut tags = Vec::with_capacity(object.len());

        for (key, value) in object {
            let name = self.name(key)?;
            let (tag, offset) = match value {
                Value::Str(s) if is_scalar_slot(key) => (b'i', self.slot(s)?),
                Value::UInt(_) if is_scalar_slot(key) => return Err(slot_value(key)),
                Value::Str(s) => (b's', self.string(s)? as usize),
                Value::Array(items) => (b'a', self.array(key, items)?),
                Value::Object(o) => (b'h', self.object(o)?),
                Value::UInt(v) => (b'i', self.uint(*v)?),
                Value::Float(v) => (b'f', self.float(*v)?),
                Value::Bool(v) => (b'b', self.boolean(*v)?),
            };
            entries.push((name, to_u16("value offset", offset)?));
            tags.push(tag);
        }

        Ok((entries, tags))
    }

    fn object(&mut self, object: &Object) -> Result<usize> {
        let count = to_u16("field count", object.len())?;
        let at = self.alloc(2 + object.len() * (FIELD_SIZE + 1))?;
        LittleEndian::write_u16(&mut self.data[at..], count);

        let (entries, tags) = self.fields(object)?;
        let mut pos = at + 2;
        for (name, value) in entries {
            LittleEndian::write_u16(&mut self.data[pos..], name);
            LittleEndian::write_u16(&mut self.data[pos + 2..], value);
            pos += FIELD_SIZE;
        }
        self.data[pos..pos + tags.len()].copy_from_slice(&tags);

        Ok(at)
    }

    fn array(&mut self, key: &str, items: &[Value]) -> Result<usize> {
        let tag = match items.first() {
            None => b'i',
            Some(first) => {
                if items
                    .iter()
                    .any(|v| std::mem::discriminant(v) != std::mem::discriminant(first))
                {
                    return Err(Error::MixedArray {
                        key: key.to_owned(),
                    });
                }
                match first {
                    Value::Str(_) if is_array_slot(key) => b'i',
                    v => v.tag(),
                }
            }
        };

        let count = to_u16("array length", items.len())?;
        let at = self.alloc(ARRAY_HEADER_SIZE + items.len() * 2)?;
        self.data[at] = tag;
        LittleEndian::write_u16(&mut self.data[at + 2..], count);

        for (i, item) in items.iter().enumerate() {
            let offset = match item {
                Value::Str(s) if is_array_slot(key) => self.slot(s)?,
                Value::UInt(_) if is_array_slot(key) => return Err(slot_value(key)),
                Value::Str(s) => self.string(s)? as usize,
                Value::Array(inner) => self.array(key, inner)?,
                Value::Object(o) => self.object(o)?,
                Value::UInt(v) => self.uint(*v)?,
                Value::Float(v) => self.float(*v)?,
                Value::Bool(v) => self.boolean(*v)?,
            };
            let offset = to_u16("value offset", offset)?;
            LittleEndian::write_u16(&mut self.data[at + ARRAY_HEADER_SIZE + i * 2..], offset);
        }

        Ok(at)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::error::{Error, NotFoundError, Result};
    use crate::seri::{decode, encode};
    use crate::string_table::StringTable;
    use crate::value::{Object, Value};

    fn object<const N: usize>(fields: [(&str, Value); N]) -> Object {
        fields
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect()
    }

    #[traced_test]
    #[test]
    fn encode_player() -> Result<()> {
        #[rustfmt::skip]
        let expected: Vec<u8> = vec![
            // Header
            b'S', b'E', b'R', b'I',
            0x15, 0x00, 0x00, 0x00,
            0x03, 0x00,
            // Fields
            0x00, 0x00, 0x05, 0x00,
            0x0C, 0x00, 0x00, 0x00,
            0x0F, 0x00, 0x04, 0x00,
            // Tags
            b's', b'i', b'a',
            // Data
            0x64, 0x00, 0x00, 0x00,
            b'i', 0x00, 0x03, 0x00, 0x0E, 0x00, 0x12, 0x00, 0x16, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00,
            0x03, 0x00, 0x00, 0x00,
        ];

        let input = object([
            ("name", "player".into()),
            ("hp", 100u32.into()),
            ("tags", vec![1u32, 2, 3].into()),
        ]);

        let mut table = StringTable::new();
        let actual = encode(&input, &mut table)?;

        assert_eq!(table.as_bytes(), b"name\0player\0hp\0tags\0");
        assert_eq!(actual, expected);
        assert_eq!(decode(&actual, &table)?, input);

        Ok(())
    }

    #[test]
    fn slot_reference_roundtrip() -> Result<()> {
        let input = object([("bone", "spine01".into()), ("weight", 0.25f32.into())]);

        let mut table = StringTable::new();
        table.push_slot(b"root");
        table.push_slot(b"spine01");

        let encoded = encode(&input, &mut table)?;
        // Stored as the 1-based slot number
        assert_eq!(&encoded[20..24], &[0x02, 0x00, 0x00, 0x00]);
        assert_eq!(decode(&encoded, &table)?, input);

        Ok(())
    }

    #[test]
    fn slot_array_roundtrip() -> Result<()> {
        let input = object([
            ("texi", vec!["skin", "eyes"].into()),
            ("list", Value::Array(vec![vec!["eyes"].into()])),
            ("labels", vec!["skin"].into()),
        ]);

        let mut table = StringTable::new();
        table.push_slot(b"eyes");
        table.push_slot(b"skin");

        let encoded = encode(&input, &mut table)?;
        assert_eq!(decode(&encoded, &table)?, input);

        Ok(())
    }

    #[test]
    fn missing_slot_fails() {
        let input = object([("smes", "body".into())]);

        let mut table = StringTable::new();
        assert!(matches!(
            encode(&input, &mut table),
            Err(Error::NotFound(NotFoundError::Slot(_)))
        ));
    }

    #[test]
    fn nested_objects_keep_order() -> Result<()> {
        let material = |name: &str, shine: f32| {
            Value::Object(object([
                ("name", name.into()),
                ("shine", shine.into()),
                ("visible", true.into()),
            ]))
        };

        let input = object([
            ("zorder", 3u32.into()),
            (
                "material",
                Value::Object(object([
                    ("name", "skin".into()),
                    ("params", object([("b", 1u32.into()), ("a", 2u32.into())]).into()),
                ])),
            ),
            (
                "layers",
                Value::Array(vec![material("hair", 0.5), material("eyes", 1.0)]),
            ),
            ("empty", Value::Array(Vec::new())),
        ]);

        let mut table = StringTable::new();
        let encoded = encode(&input, &mut table)?;
        let decoded = decode(&encoded, &table)?;

        assert_eq!(decoded, input);
        assert_eq!(
            decoded.keys().collect::<Vec<_>>(),
            vec!["zorder", "material", "layers", "empty"]
        );
        let params = decoded["material"].as_object().and_then(|m| m["params"].as_object());
        assert_eq!(
            params.map(|p| p.keys().cloned().collect::<Vec<_>>()),
            Some(vec!["b".to_owned(), "a".to_owned()])
        );

        Ok(())
    }

    #[test]
    fn mixed_arrays_are_rejected() {
        let input = object([("tags", Value::Array(vec![1u32.into(), "two".into()]))]);

        let mut table = StringTable::new();
        assert!(matches!(
            encode(&input, &mut table),
            Err(Error::MixedArray { .. })
        ));
    }

    #[test]
    fn oversized_data_region_fails() {
        let input = object([("weights", vec![7u32; 20_000].into())]);

        let mut table = StringTable::new();
        assert!(matches!(
            encode(&input, &mut table),
            Err(Error::OffsetOverflow { .. })
        ));
    }

    #[test]
    fn numbers_under_slot_keys_are_rejected() {
        let mut table = StringTable::new();
        table.push_slot(b"body");

        let scalar = object([("smes", 1u32.into())]);
        assert!(matches!(
            encode(&scalar, &mut table),
            Err(Error::SlotValue { key }) if key == "smes"
        ));

        let array = object([("model", vec![1u32, 2].into())]);
        assert!(matches!(
            encode(&array, &mut table),
            Err(Error::SlotValue { key }) if key == "model"
        ));
    }

    #[test]
    fn string_word_may_lie_past_the_record() -> Result<()> {
        let table = StringTable::from_parts(b"name\0a_rather_long_name\0".to_vec(), Vec::new())?;

        // The string offset is 5, which lands beyond the end of the 15 byte record
        #[rustfmt::skip]
        let input = [
            b'S', b'E', b'R', b'I', 0x0B, 0x00, 0x00, 0x00, 0x01, 0x00,
            0x00, 0x00, 0x05, 0x00,
            b's',
        ];

        assert_eq!(
            decode(&input, &table)?,
            object([("name", "a_rather_long_name".into())])
        );

        Ok(())
    }

    #[test]
    fn shared_arrays_cannot_expand_forever() -> Result<()> {
        const LEVELS: u16 = 20;
        let table = StringTable::from_parts(b"x\0".to_vec(), Vec::new())?;

        let mut input = vec![b'S', b'E', b'R', b'I', 0x0B, 0x00, 0x00, 0x00, 0x01, 0x00];
        input.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, b'a']);
        // Each array holds its successor twice, doubling the values at every level
        for level in 0..=LEVELS {
            let tag = if level == LEVELS { b'i' } else { b'a' };
            let next = (8 * (level + 1)).to_le_bytes();
            input.extend_from_slice(&[tag, 0x00, 0x02, 0x00]);
            input.extend_from_slice(&next);
            input.extend_from_slice(&next);
        }
        input.extend_from_slice(&[0x07, 0x00, 0x00, 0x00]);

        assert!(matches!(
            decode(&input, &table),
            Err(Error::SeriExpansion { .. })
        ));

        Ok(())
    }

    #[test]
    fn decode_invalid_magic() {
        let table = StringTable::new();
        assert!(matches!(
            decode(b"SERO\x06\x00\x00\x00\x00\x00", &table),
            Err(Error::BadMagic { .. })
        ));
    }

    #[test]
    fn decode_unknown_tag() -> Result<()> {
        let table = StringTable::from_parts(b"key\0".to_vec(), Vec::new())?;

        #[rustfmt::skip]
        let input = [
            b'S', b'E', b'R', b'I', 0x0B, 0x00, 0x00, 0x00, 0x01, 0x00,
            0x00, 0x00, 0x00, 0x00,
            b'x',
            0x00, 0x00, 0x00, 0x00,
        ];

        assert!(matches!(
            decode(&input, &table),
            Err(Error::UnknownValueTag { tag: 'x', .. })
        ));

        Ok(())
    }
}
