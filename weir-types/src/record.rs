//! Record layout metadata and the owned record row.
//!
//! A record layout places a nullity bitmap at the head, then one fixed-width
//! slot per field. Variable-length payloads (character/octet) live in a tail
//! section behind the fixed part; their slots store `(offset, length)` into
//! the serialized record. The serialized form is what record stores, exchange
//! partitions and the storage codec move around; the owned [`Record`] is the
//! decoded view operators work with.

use crate::datetime::{Date, TimeOfDay, TimePoint};
use crate::decimal::Triple;
use crate::lob::{LobProvider, LobReference};
use crate::types::{DataType, TypeKind};
use crate::value::{Octet, Text, Value};

/// Field descriptor inside a record layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    /// Logical type of the field.
    pub data_type: DataType,
    /// Whether the field admits NULL. Exchange records are always nullable.
    pub nullable: bool,
}

/// Record layout: field types plus computed value/nullity offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    fields: Vec<FieldMeta>,
    value_offsets: Vec<usize>,
    fixed_size: usize,
}

impl RecordMeta {
    /// Builds a layout over the given field types, all nullable.
    pub fn new(types: impl IntoIterator<Item = DataType>) -> Self {
        Self::with_nullability(types.into_iter().map(|t| FieldMeta { data_type: t, nullable: true }))
    }

    /// Builds a layout from explicit field descriptors.
    pub fn with_nullability(fields: impl IntoIterator<Item = FieldMeta>) -> Self {
        let fields: Vec<FieldMeta> = fields.into_iter().collect();
        let bitmap = (fields.len() + 7) / 8;
        let mut value_offsets = Vec::with_capacity(fields.len());
        let mut offset = bitmap;
        for f in &fields {
            value_offsets.push(offset);
            offset += slot_size(f.data_type.kind());
        }
        Self { fields, value_offsets, fixed_size: offset }
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Field descriptor at `index`.
    pub fn field(&self, index: usize) -> &FieldMeta {
        &self.fields[index]
    }

    /// Logical type of the field at `index`.
    pub fn field_type(&self, index: usize) -> &DataType {
        &self.fields[index].data_type
    }

    /// Byte offset of the field's value slot within the fixed part.
    pub fn value_offset(&self, index: usize) -> usize {
        self.value_offsets[index]
    }

    /// Bit offset of the field's nullity flag.
    pub fn nullity_offset(&self, index: usize) -> usize {
        index
    }

    /// Whether the field at `index` is nullable.
    pub fn nullable(&self, index: usize) -> bool {
        self.fields[index].nullable
    }

    /// Size in bytes of the fixed (bitmap + slots) part.
    pub fn fixed_size(&self) -> usize {
        self.fixed_size
    }

    /// Serializes `record` (appending to `out`) in this layout.
    ///
    /// The record must have one value per field; a non-null value must match
    /// the field kind.
    pub fn encode(&self, record: &Record, out: &mut Vec<u8>) {
        debug_assert_eq!(record.len(), self.field_count());
        let base = out.len();
        out.resize(base + self.fixed_size, 0);
        let mut tail = Vec::new();
        for (i, value) in record.values().iter().enumerate() {
            if value.is_null() {
                out[base + self.nullity_offset(i) / 8] |= 1 << (self.nullity_offset(i) % 8);
                continue;
            }
            let at = base + self.value_offsets[i];
            encode_slot(value, self.fields[i].data_type.kind(), &mut out[at..], self.fixed_size, &mut tail);
        }
        out.extend_from_slice(&tail);
    }

    /// Serializes `record` into a fresh buffer.
    pub fn encode_to_vec(&self, record: &Record) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.fixed_size);
        self.encode(record, &mut out);
        out
    }

    /// Deserializes a record previously produced by [`RecordMeta::encode`].
    pub fn decode(&self, bytes: &[u8]) -> Record {
        let values = (0..self.field_count())
            .map(|i| self.decode_field(bytes, i))
            .collect::<Vec<_>>();
        Record::new(values)
    }

    /// Deserializes a single field of a serialized record.
    pub fn decode_field(&self, bytes: &[u8], index: usize) -> Value {
        let bit = self.nullity_offset(index);
        if bytes[bit / 8] & (1 << (bit % 8)) != 0 {
            return Value::Null;
        }
        let at = self.value_offsets[index];
        decode_slot(&bytes[at..], self.fields[index].data_type.kind(), bytes)
    }

    /// True when the serialized field at `index` is NULL.
    pub fn is_null(&self, bytes: &[u8], index: usize) -> bool {
        let bit = self.nullity_offset(index);
        bytes[bit / 8] & (1 << (bit % 8)) != 0
    }
}

/// Width in bytes of a fixed value slot for the given kind.
const fn slot_size(kind: TypeKind) -> usize {
    match kind {
        TypeKind::Boolean => 1,
        TypeKind::Int1 | TypeKind::Int2 | TypeKind::Int4 => 4,
        TypeKind::Int8 => 8,
        TypeKind::Float4 => 4,
        TypeKind::Float8 => 8,
        // sign(1) + exponent(4) + coefficient(16)
        TypeKind::Decimal => 21,
        // (offset, length) into the varlen tail
        TypeKind::Character | TypeKind::Octet => 8,
        TypeKind::Date => 4,
        TypeKind::TimeOfDay => 8,
        // seconds(8) + subsecond nanos(4)
        TypeKind::TimePoint => 12,
        // provider tag(1) + id(8)
        TypeKind::Blob | TypeKind::Clob => 9,
    }
}

fn encode_slot(value: &Value, kind: TypeKind, slot: &mut [u8], fixed_size: usize, tail: &mut Vec<u8>) {
    match kind {
        TypeKind::Boolean => slot[0] = u8::from(value.to_boolean()),
        TypeKind::Int1 | TypeKind::Int2 | TypeKind::Int4 => {
            slot[..4].copy_from_slice(&value.to_int4().to_le_bytes());
        }
        TypeKind::Int8 => slot[..8].copy_from_slice(&value.to_int8().to_le_bytes()),
        TypeKind::Float4 => slot[..4].copy_from_slice(&value.to_float4().to_le_bytes()),
        TypeKind::Float8 => slot[..8].copy_from_slice(&value.to_float8().to_le_bytes()),
        TypeKind::Decimal => {
            let t = value.to_decimal();
            slot[0] = t.sign() as u8;
            slot[1..5].copy_from_slice(&t.exponent().to_le_bytes());
            slot[5..21].copy_from_slice(&t.coefficient().to_le_bytes());
        }
        TypeKind::Character | TypeKind::Octet => {
            let bytes = match value {
                Value::Character(t) => t.as_bytes(),
                Value::Octet(o) => o.as_bytes(),
                other => panic!("value kind mismatch: expected varlen, got {:?}", other.type_index()),
            };
            let offset = (fixed_size + tail.len()) as u32;
            slot[..4].copy_from_slice(&offset.to_le_bytes());
            slot[4..8].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
            tail.extend_from_slice(bytes);
        }
        TypeKind::Date => slot[..4].copy_from_slice(&value.to_date().0.to_le_bytes()),
        TypeKind::TimeOfDay => slot[..8].copy_from_slice(&value.to_time_of_day().0.to_le_bytes()),
        TypeKind::TimePoint => {
            let tp = value.to_time_point();
            slot[..8].copy_from_slice(&tp.seconds.to_le_bytes());
            slot[8..12].copy_from_slice(&tp.subsecond_nanos.to_le_bytes());
        }
        TypeKind::Blob | TypeKind::Clob => {
            let lob = value.to_lob();
            // provided references hold a caller-side path and must be
            // materialized before a record carrying them is serialized
            debug_assert!(!lob.is_provided(), "provided LOB reference in serialized record");
            slot[0] = match lob.provider {
                LobProvider::Generated => 1,
                _ => 0,
            };
            slot[1..9].copy_from_slice(&lob.id.to_le_bytes());
        }
    }
}

fn decode_slot(slot: &[u8], kind: TypeKind, record: &[u8]) -> Value {
    match kind {
        TypeKind::Boolean => Value::Boolean(slot[0] != 0),
        TypeKind::Int1 | TypeKind::Int2 | TypeKind::Int4 => {
            Value::Int4(i32::from_le_bytes(slot[..4].try_into().expect("slot width")))
        }
        TypeKind::Int8 => Value::Int8(i64::from_le_bytes(slot[..8].try_into().expect("slot width"))),
        TypeKind::Float4 => {
            Value::Float4(f32::from_le_bytes(slot[..4].try_into().expect("slot width")))
        }
        TypeKind::Float8 => {
            Value::Float8(f64::from_le_bytes(slot[..8].try_into().expect("slot width")))
        }
        TypeKind::Decimal => {
            let sign = slot[0] as i8;
            let exponent = i32::from_le_bytes(slot[1..5].try_into().expect("slot width"));
            let coefficient = u128::from_le_bytes(slot[5..21].try_into().expect("slot width"));
            Value::Decimal(Triple::from_parts(sign, coefficient, exponent))
        }
        TypeKind::Character | TypeKind::Octet => {
            let offset = u32::from_le_bytes(slot[..4].try_into().expect("slot width")) as usize;
            let len = u32::from_le_bytes(slot[4..8].try_into().expect("slot width")) as usize;
            let bytes = &record[offset..offset + len];
            if kind == TypeKind::Character {
                Value::Character(Text::from_bytes(bytes))
            } else {
                Value::Octet(Octet::from(bytes))
            }
        }
        TypeKind::Date => Value::Date(Date(i32::from_le_bytes(slot[..4].try_into().expect("slot width")))),
        TypeKind::TimeOfDay => {
            Value::TimeOfDay(TimeOfDay(u64::from_le_bytes(slot[..8].try_into().expect("slot width"))))
        }
        TypeKind::TimePoint => {
            let seconds = i64::from_le_bytes(slot[..8].try_into().expect("slot width"));
            let nanos = u32::from_le_bytes(slot[8..12].try_into().expect("slot width"));
            Value::TimePoint(TimePoint { seconds, subsecond_nanos: nanos })
        }
        TypeKind::Blob | TypeKind::Clob => {
            let id = u64::from_le_bytes(slot[1..9].try_into().expect("slot width"));
            let reference = if slot[0] == 1 {
                LobReference::generated(id)
            } else {
                LobReference::datastore(id)
            };
            if kind == TypeKind::Blob {
                Value::Blob(reference)
            } else {
                Value::Clob(reference)
            }
        }
    }
}

/// An owned row of values addressed through a [`RecordMeta`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    /// Creates a record from its values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Creates an all-NULL record with `n` fields.
    pub fn nulls(n: usize) -> Self {
        Self { values: vec![Value::Null; n] }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The field values in order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of the field at `index`.
    pub fn get(&self, index: usize) -> &Value {
        &self.values[index]
    }

    /// Replaces the value of the field at `index`.
    pub fn set(&mut self, index: usize, value: Value) {
        self.values[index] = value;
    }

    /// True when the field at `index` is NULL.
    pub fn is_null(&self, index: usize) -> bool {
        self.values[index].is_null()
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> RecordMeta {
        RecordMeta::new([
            DataType::Int8,
            DataType::Float8,
            DataType::character_varying(),
            DataType::decimal(),
        ])
    }

    #[test]
    fn offsets_are_stable() {
        let m = meta();
        // 4 fields -> 1 bitmap byte
        assert_eq!(m.value_offset(0), 1);
        assert_eq!(m.value_offset(1), 9);
        assert_eq!(m.value_offset(2), 17);
        assert_eq!(m.value_offset(3), 25);
        assert_eq!(m.fixed_size(), 46);
        assert_eq!(m.nullity_offset(2), 2);
    }

    #[test]
    fn encode_decode_round_trip() {
        let m = meta();
        let r = Record::new(vec![
            Value::Int8(42),
            Value::Float8(1.5),
            Value::Character(Text::from("hello")),
            Value::Decimal(Triple::from_i64(-123)),
        ]);
        let bytes = m.encode_to_vec(&r);
        assert_eq!(m.decode(&bytes), r);
    }

    #[test]
    fn null_bits_round_trip() {
        let m = meta();
        let r = Record::new(vec![
            Value::Null,
            Value::Float8(2.0),
            Value::Null,
            Value::Null,
        ]);
        let bytes = m.encode_to_vec(&r);
        assert!(m.is_null(&bytes, 0));
        assert!(!m.is_null(&bytes, 1));
        assert_eq!(m.decode(&bytes), r);
    }

    #[test]
    fn decode_single_field() {
        let m = meta();
        let r = Record::new(vec![
            Value::Int8(7),
            Value::Null,
            Value::Character(Text::from("xy")),
            Value::Null,
        ]);
        let bytes = m.encode_to_vec(&r);
        assert_eq!(m.decode_field(&bytes, 0), Value::Int8(7));
        assert_eq!(m.decode_field(&bytes, 2), Value::Character(Text::from("xy")));
        assert_eq!(m.decode_field(&bytes, 1), Value::Null);
    }

    #[test]
    fn empty_varlen_fields() {
        let m = RecordMeta::new([DataType::character_varying(), DataType::varbinary(4)]);
        let r = Record::new(vec![
            Value::Character(Text::from("")),
            Value::Octet(Octet::from(vec![])),
        ]);
        let bytes = m.encode_to_vec(&r);
        assert_eq!(m.decode(&bytes), r);
    }
}
