//! Storage codec and table/index definitions.
//!
//! Keys are encoded order-preserving (memcmp over the encoded bytes matches
//! the value order): integers and times flip the sign bit into big-endian,
//! floats use the usual monotone bit transform, strings escape embedded
//! zeros and close with a `00 00` terminator, and decimals are rescaled to
//! the column scale and laid out as a fixed-width signed coefficient. Values
//! (whole rows) travel in the record layout encoding.

use std::sync::Arc;

use weir_storage::KeyValueStore;
use weir_types::decimal::coding::{self, CoefficientBuffer, MAX_COEFFICIENT_BYTES};
use weir_types::decimal::{self, RoundingGuard, RoundingMode};
use weir_types::{DataType, Date, Decimal, Record, RecordMeta, TimeOfDay, TimePoint, Value};

use crate::error::{ExecError, Result, Status};

/// The smallest byte string greater than every string with prefix `bytes`,
/// or `None` when no such string exists (all `0xff`).
pub fn prefix_successor(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut out = bytes.to_vec();
    while let Some(&last) = out.last() {
        if last == 0xff {
            out.pop();
        } else {
            let index = out.len() - 1;
            out[index] += 1;
            return Some(out);
        }
    }
    None
}

/// A secondary index over a table.
#[derive(Debug, Clone)]
pub struct SecondaryIndexDef {
    /// Storage name of the index.
    pub name: String,
    /// Indexed column positions within the table row.
    pub key_columns: Vec<usize>,
}

/// A table: row layout, primary-key columns and secondary indexes.
///
/// The primary entry stores the encoded key columns in the key and the
/// remaining columns in the value; a secondary entry's key is the index key
/// followed by the primary key, and its value repeats the primary key bytes
/// for the pointer fetch.
#[derive(Debug, Clone)]
pub struct TableDef {
    /// Table (and primary index) storage name.
    pub name: String,
    /// Full row layout.
    pub columns: Arc<RecordMeta>,
    /// Primary-key column positions.
    pub primary_key: Vec<usize>,
    /// Secondary indexes.
    pub secondaries: Vec<SecondaryIndexDef>,
    value_columns: Vec<usize>,
    value_meta: Arc<RecordMeta>,
}

impl TableDef {
    /// Creates a table definition without secondary indexes.
    pub fn new(name: impl Into<String>, columns: Arc<RecordMeta>, primary_key: Vec<usize>) -> Self {
        let value_columns: Vec<usize> =
            (0..columns.field_count()).filter(|i| !primary_key.contains(i)).collect();
        let value_meta = Arc::new(RecordMeta::new(
            value_columns.iter().map(|&i| columns.field_type(i).clone()),
        ));
        Self {
            name: name.into(),
            columns,
            primary_key,
            secondaries: Vec::new(),
            value_columns,
            value_meta,
        }
    }

    /// Adds a secondary index.
    #[must_use]
    pub fn with_secondary(mut self, index: SecondaryIndexDef) -> Self {
        self.secondaries.push(index);
        self
    }

    /// Non-key column positions, in row order.
    pub fn value_columns(&self) -> &[usize] {
        &self.value_columns
    }

    /// Types of the primary-key columns, in key order.
    pub fn key_types(&self) -> Vec<&DataType> {
        self.primary_key.iter().map(|&i| self.columns.field_type(i)).collect()
    }

    /// Encodes the primary key of `record`.
    pub fn encode_primary_key(&self, record: &Record) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for &column in &self.primary_key {
            encode_key_field(record.get(column), self.columns.field_type(column), &mut out)?;
        }
        Ok(out)
    }

    /// Encodes a primary key from bound key values (one per key column).
    pub fn encode_key_values(&self, values: &[Value]) -> Result<Vec<u8>> {
        debug_assert_eq!(values.len(), self.primary_key.len());
        let mut out = Vec::new();
        for (value, &column) in values.iter().zip(&self.primary_key) {
            encode_key_field(value, self.columns.field_type(column), &mut out)?;
        }
        Ok(out)
    }

    /// Encodes the key of the given secondary index, excluding the primary
    /// suffix.
    pub fn encode_secondary_key(
        &self,
        index: &SecondaryIndexDef,
        record: &Record,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for &column in &index.key_columns {
            encode_key_field(record.get(column), self.columns.field_type(column), &mut out)?;
        }
        Ok(out)
    }

    /// Encodes a full secondary entry key: index key plus primary key.
    pub fn encode_secondary_entry(
        &self,
        index: &SecondaryIndexDef,
        record: &Record,
        primary_key: &[u8],
    ) -> Result<Vec<u8>> {
        let mut out = self.encode_secondary_key(index, record)?;
        out.extend_from_slice(primary_key);
        Ok(out)
    }

    /// Serializes the non-key columns for the primary value slot.
    pub fn encode_value(&self, record: &Record) -> Vec<u8> {
        let values = Record::new(self.value_columns.iter().map(|&i| record.get(i).clone()).collect());
        self.value_meta.encode_to_vec(&values)
    }

    /// Rebuilds the full row from an encoded primary entry.
    pub fn decode_entry(&self, key: &[u8], value: &[u8]) -> Result<Record> {
        let mut row = Record::nulls(self.columns.field_count());
        let mut pos = 0usize;
        for &column in &self.primary_key {
            let v = decode_key_field(key, &mut pos, self.columns.field_type(column))?;
            row.set(column, v);
        }
        let values = self.value_meta.decode(value);
        for (slot, &column) in self.value_columns.iter().enumerate() {
            row.set(column, values.get(slot).clone());
        }
        Ok(row)
    }

    /// Inserts (or replaces) a full row, maintaining every secondary index.
    pub fn insert(&self, database: &weir_storage::Database, record: &Record) -> Result<()> {
        let primary = database.get_storage(&self.name)?;
        let key = self.encode_primary_key(record)?;
        let value = self.encode_value(record);
        if let Some(old_value) = primary.get(&key)? {
            let old_row = self.decode_entry(&key, &old_value)?;
            self.remove_secondary_entries(database, &old_row, &key)?;
        }
        primary.put(&key, &value)?;
        self.insert_secondary_entries(database, record, &key)?;
        Ok(())
    }

    /// Removes a row by its full record, maintaining secondary indexes.
    pub fn remove(&self, database: &weir_storage::Database, record: &Record) -> Result<()> {
        let primary = database.get_storage(&self.name)?;
        let key = self.encode_primary_key(record)?;
        self.remove_secondary_entries(database, record, &key)?;
        primary.remove(&key)?;
        Ok(())
    }

    /// Creates the primary and secondary storages in `database`.
    pub fn provision(&self, database: &weir_storage::Database) -> Result<()> {
        database.get_or_create_storage(&self.name);
        for index in &self.secondaries {
            database.get_or_create_storage(&index.name);
        }
        Ok(())
    }

    pub(crate) fn insert_secondary_entries(
        &self,
        database: &weir_storage::Database,
        record: &Record,
        primary_key: &[u8],
    ) -> Result<()> {
        for index in &self.secondaries {
            let storage = database.get_storage(&index.name)?;
            let entry = self.encode_secondary_entry(index, record, primary_key)?;
            storage.put(&entry, primary_key)?;
        }
        Ok(())
    }

    pub(crate) fn remove_secondary_entries(
        &self,
        database: &weir_storage::Database,
        record: &Record,
        primary_key: &[u8],
    ) -> Result<()> {
        for index in &self.secondaries {
            let storage = database.get_storage(&index.name)?;
            let entry = self.encode_secondary_entry(index, record, primary_key)?;
            storage.remove(&entry)?;
        }
        Ok(())
    }
}

fn unsupported_key(data_type: &DataType) -> ExecError {
    ExecError::unsupported(format!("type {data_type} is not usable as a key"))
}

/// Appends the order-preserving encoding of one key field.
pub fn encode_key_field(value: &Value, data_type: &DataType, out: &mut Vec<u8>) -> Result<()> {
    if value.is_null() {
        out.push(0x00);
        return Ok(());
    }
    out.push(0x01);
    match data_type {
        DataType::Boolean => out.push(u8::from(value.to_boolean())),
        DataType::Int1 | DataType::Int2 | DataType::Int4 => {
            let bits = (value.to_int4() as u32) ^ 0x8000_0000;
            out.extend_from_slice(&bits.to_be_bytes());
        }
        DataType::Int8 => {
            let bits = (value.to_int8() as u64) ^ 0x8000_0000_0000_0000;
            out.extend_from_slice(&bits.to_be_bytes());
        }
        DataType::Float4 => {
            let raw = value.to_float4().to_bits();
            let bits = if raw & 0x8000_0000 != 0 { !raw } else { raw | 0x8000_0000 };
            out.extend_from_slice(&bits.to_be_bytes());
        }
        DataType::Float8 => {
            let raw = value.to_float8().to_bits();
            let bits = if raw & 0x8000_0000_0000_0000 != 0 {
                !raw
            } else {
                raw | 0x8000_0000_0000_0000
            };
            out.extend_from_slice(&bits.to_be_bytes());
        }
        DataType::Decimal { scale, .. } => {
            encode_decimal_key(value, scale.unwrap_or(0), out)?;
        }
        DataType::Character { .. } | DataType::Octet { .. } => {
            let bytes = match value {
                Value::Character(t) => t.as_bytes(),
                Value::Octet(o) => o.as_bytes(),
                _ => return Err(unsupported_key(data_type)),
            };
            for &b in bytes {
                if b == 0x00 {
                    out.extend_from_slice(&[0x00, 0xff]);
                } else {
                    out.push(b);
                }
            }
            out.extend_from_slice(&[0x00, 0x00]);
        }
        DataType::Date => {
            let bits = (value.to_date().0 as u32) ^ 0x8000_0000;
            out.extend_from_slice(&bits.to_be_bytes());
        }
        DataType::TimeOfDay => {
            out.extend_from_slice(&value.to_time_of_day().0.to_be_bytes());
        }
        DataType::TimePoint => {
            let tp = value.to_time_point();
            let bits = (tp.seconds as u64) ^ 0x8000_0000_0000_0000;
            out.extend_from_slice(&bits.to_be_bytes());
            out.extend_from_slice(&tp.subsecond_nanos.to_be_bytes());
        }
        DataType::Blob | DataType::Clob => return Err(unsupported_key(data_type)),
    }
    Ok(())
}

/// Rescales the decimal to the column scale and writes the fixed-width signed
/// coefficient with the top bit flipped for unsigned ordering.
fn encode_decimal_key(value: &Value, scale: usize, out: &mut Vec<u8>) -> Result<()> {
    decimal::ensure_decimal_context();
    decimal::clear_status();
    let rescaled = {
        let _guard = RoundingGuard::new(RoundingMode::Down);
        Decimal::Finite(value.to_decimal()).rescale(-(scale as i32))
    };
    let triple = rescaled.as_triple().ok_or_else(|| {
        ExecError::new(Status::Internal, "decimal key does not fit the column scale")
    })?;
    let mut buf: CoefficientBuffer = [0; MAX_COEFFICIENT_BYTES];
    let n = coding::encode_coefficient(triple, &mut buf);
    let fill: u8 = if triple.sign() < 0 { 0xff } else { 0x00 };
    let mut fixed = [fill; MAX_COEFFICIENT_BYTES];
    fixed[MAX_COEFFICIENT_BYTES - n..].copy_from_slice(&buf[..n]);
    fixed[0] ^= 0x80;
    out.extend_from_slice(&fixed);
    Ok(())
}

/// Cursor-based decoding of one key field; advances `pos`.
pub fn decode_key_field(bytes: &[u8], pos: &mut usize, data_type: &DataType) -> Result<Value> {
    let truncated = || ExecError::new(Status::IoError, "truncated key encoding");
    let flag = *bytes.get(*pos).ok_or_else(truncated)?;
    *pos += 1;
    if flag == 0x00 {
        return Ok(Value::Null);
    }
    let take = |pos: &mut usize, n: usize| -> Result<Vec<u8>> {
        if *pos + n > bytes.len() {
            return Err(truncated());
        }
        let out = bytes[*pos..*pos + n].to_vec();
        *pos += n;
        Ok(out)
    };
    let value = match data_type {
        DataType::Boolean => Value::Boolean(take(pos, 1)?[0] != 0),
        DataType::Int1 | DataType::Int2 | DataType::Int4 => {
            let raw = u32::from_be_bytes(take(pos, 4)?.try_into().expect("size"));
            Value::Int4((raw ^ 0x8000_0000) as i32)
        }
        DataType::Int8 => {
            let raw = u64::from_be_bytes(take(pos, 8)?.try_into().expect("size"));
            Value::Int8((raw ^ 0x8000_0000_0000_0000) as i64)
        }
        DataType::Float4 => {
            let raw = u32::from_be_bytes(take(pos, 4)?.try_into().expect("size"));
            let bits = if raw & 0x8000_0000 != 0 { raw & !0x8000_0000 } else { !raw };
            Value::Float4(f32::from_bits(bits))
        }
        DataType::Float8 => {
            let raw = u64::from_be_bytes(take(pos, 8)?.try_into().expect("size"));
            let bits = if raw & 0x8000_0000_0000_0000 != 0 {
                raw & !0x8000_0000_0000_0000
            } else {
                !raw
            };
            Value::Float8(f64::from_bits(bits))
        }
        DataType::Decimal { scale, .. } => {
            let mut fixed: Vec<u8> = take(pos, MAX_COEFFICIENT_BYTES)?;
            fixed[0] ^= 0x80;
            if !coding::validate_coefficient(&fixed) {
                return Err(ExecError::new(Status::IoError, "invalid decimal key encoding"));
            }
            let triple = coding::read_decimal(&fixed, scale.unwrap_or(0));
            Value::Decimal(triple.reduce())
        }
        DataType::Character { .. } | DataType::Octet { .. } => {
            let mut decoded = Vec::new();
            loop {
                let b = *bytes.get(*pos).ok_or_else(truncated)?;
                *pos += 1;
                if b != 0x00 {
                    decoded.push(b);
                    continue;
                }
                let marker = *bytes.get(*pos).ok_or_else(truncated)?;
                *pos += 1;
                match marker {
                    0x00 => break,
                    0xff => decoded.push(0x00),
                    _ => return Err(ExecError::new(Status::IoError, "invalid key escape")),
                }
            }
            if data_type.kind() == weir_types::TypeKind::Character {
                Value::Character(weir_types::Text::from_bytes(decoded))
            } else {
                Value::Octet(weir_types::Octet::from(decoded))
            }
        }
        DataType::Date => {
            let raw = u32::from_be_bytes(take(pos, 4)?.try_into().expect("size"));
            Value::Date(Date((raw ^ 0x8000_0000) as i32))
        }
        DataType::TimeOfDay => {
            let raw = u64::from_be_bytes(take(pos, 8)?.try_into().expect("size"));
            Value::TimeOfDay(TimeOfDay(raw))
        }
        DataType::TimePoint => {
            let secs = u64::from_be_bytes(take(pos, 8)?.try_into().expect("size"));
            let nanos = u32::from_be_bytes(take(pos, 4)?.try_into().expect("size"));
            Value::TimePoint(TimePoint {
                seconds: (secs ^ 0x8000_0000_0000_0000) as i64,
                subsecond_nanos: nanos,
            })
        }
        DataType::Blob | DataType::Clob => return Err(unsupported_key(data_type)),
    };
    Ok(value)
}

/// Decodes a full key produced over the given field types.
pub fn decode_key(bytes: &[u8], types: &[&DataType]) -> Result<Vec<Value>> {
    let mut pos = 0usize;
    let mut out = Vec::with_capacity(types.len());
    for t in types {
        out.push(decode_key_field(bytes, &mut pos, t)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use weir_types::{Text, Triple};

    fn encode_one(value: &Value, data_type: &DataType) -> Vec<u8> {
        let mut out = Vec::new();
        encode_key_field(value, data_type, &mut out).unwrap();
        out
    }

    fn round_trip(value: Value, data_type: DataType) {
        let bytes = encode_one(&value, &data_type);
        let mut pos = 0;
        let decoded = decode_key_field(&bytes, &mut pos, &data_type).unwrap();
        assert_eq!(pos, bytes.len());
        assert_eq!(decoded, value);
    }

    #[test]
    fn key_round_trips() {
        round_trip(Value::Null, DataType::Int4);
        round_trip(Value::Int4(-5), DataType::Int4);
        round_trip(Value::Int8(i64::MIN), DataType::Int8);
        round_trip(Value::Float8(-1.5), DataType::Float8);
        round_trip(Value::Character(Text::from("ab\0c")), DataType::character_varying());
        round_trip(Value::Date(Date(-1)), DataType::Date);
        round_trip(
            Value::TimePoint(TimePoint { seconds: -3, subsecond_nanos: 999 }),
            DataType::TimePoint,
        );
        round_trip(Value::Decimal(Triple::from_parts(-1, 12345, -2)), DataType::decimal_ps(10, 2));
    }

    #[test_case(Value::Int4(-10), Value::Int4(3), DataType::Int4; "int sign crossing")]
    #[test_case(Value::Int8(i64::MIN), Value::Int8(i64::MAX), DataType::Int8; "int8 extremes")]
    #[test_case(Value::Float8(-2.5), Value::Float8(-1.0), DataType::Float8; "negative floats")]
    #[test_case(Value::Float8(-0.5), Value::Float8(0.5), DataType::Float8; "float sign crossing")]
    #[test_case(
        Value::Character(Text::from("ab")),
        Value::Character(Text::from("b")),
        DataType::character_varying();
        "strings"
    )]
    #[test_case(
        Value::Decimal(Triple::from_parts(-1, 15, -1)),
        Value::Decimal(Triple::from_parts(1, 5, -1)),
        DataType::decimal_ps(10, 1);
        "decimal sign crossing"
    )]
    fn encoding_preserves_order(smaller: Value, larger: Value, data_type: DataType) {
        let a = encode_one(&smaller, &data_type);
        let b = encode_one(&larger, &data_type);
        assert!(a < b, "expected {smaller} < {larger} in encoded order");
    }

    #[test]
    fn null_sorts_first() {
        let null = encode_one(&Value::Null, &DataType::Int4);
        let value = encode_one(&Value::Int4(i32::MIN), &DataType::Int4);
        assert!(null < value);
    }

    #[test]
    fn string_with_embedded_zero_sorts_after_prefix() {
        let t = DataType::character_varying();
        let a = encode_one(&Value::Character(Text::from("a")), &t);
        let b = encode_one(&Value::Character(Text::from_bytes(*b"a\0b")), &t);
        assert!(a < b);
    }

    #[test]
    fn decimal_key_respects_column_scale() {
        // 1.2 and 1.20 encode identically under scale 2
        let t = DataType::decimal_ps(10, 2);
        let a = encode_one(&Value::Decimal(Triple::from_parts(1, 12, -1)), &t);
        let b = encode_one(&Value::Decimal(Triple::from_parts(1, 120, -2)), &t);
        assert_eq!(a, b);
    }

    #[quickcheck_macros::quickcheck]
    fn int8_key_encoding_preserves_order(a: i64, b: i64) -> bool {
        let ka = encode_one(&Value::Int8(a), &DataType::Int8);
        let kb = encode_one(&Value::Int8(b), &DataType::Int8);
        (a.cmp(&b)) == ka.cmp(&kb)
    }

    #[test]
    fn table_def_encodes_secondary_entries() {
        let meta = Arc::new(RecordMeta::new([DataType::Int8, DataType::Float8]));
        let mut table = TableDef::new("t0", meta, vec![0]);
        table.secondaries.push(SecondaryIndexDef { name: "t0_i1".into(), key_columns: vec![1] });
        let row = Record::new(vec![Value::Int8(1), Value::Float8(2.0)]);
        let pk = table.encode_primary_key(&row).unwrap();
        let entry = table
            .encode_secondary_entry(&table.secondaries[0], &row, &pk)
            .unwrap();
        assert!(entry.len() > pk.len());
        assert!(entry.ends_with(&pk));
    }
}
