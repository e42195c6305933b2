use serde_json::Value as Json;

use crate::error::Result;
use crate::schema::{ColumnDef, DefaultValue};
use crate::types::Value;

/// Encode a row as a length-prefixed JSON array, one element per column, in
/// declared column order. DECIMAL and BLOB values are tagged objects (see
/// `Value::to_json`), everything else is a plain JSON scalar.
pub fn encode_row(values: &[Value]) -> Result<Vec<u8>> {
    let json: Vec<Json> = values.iter().map(|v| v.to_json()).collect();
    let payload = serde_json::to_vec(&Json::Array(json))?;
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a row blob against a column list, padding a short row (missing
/// trailing columns, as happens right after `ALTER TABLE ADD COLUMN`) with
/// each column's default, and truncating a long row (after
/// `ALTER TABLE DROP COLUMN` shrank the schema but old blobs remain on
/// disk) to the current column count.
pub fn decode_row(blob: &[u8], columns: &[ColumnDef]) -> Result<Vec<Value>> {
    let len = u32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]) as usize;
    let payload = &blob[4..4 + len];
    let json: Json = serde_json::from_slice(payload)?;
    let items = json.as_array().cloned().unwrap_or_default();

    let mut out = Vec::with_capacity(columns.len());
    for (i, col) in columns.iter().enumerate() {
        if i < items.len() {
            out.push(Value::from_json(&items[i], col.data_type)?);
        } else {
            out.push(default_for(col));
        }
    }
    Ok(out)
}

fn default_for(col: &ColumnDef) -> Value {
    match &col.default {
        Some(DefaultValue::Integer(v)) => Value::Integer(*v),
        Some(DefaultValue::Real(v)) => Value::Real(*v),
        Some(DefaultValue::Text(v)) => Value::Text(v.clone()),
        Some(DefaultValue::Boolean(v)) => Value::Boolean(*v),
        Some(DefaultValue::Null) | None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn round_trips_plain_values() {
        let columns = vec![
            ColumnDef::new("id", DataType::Integer),
            ColumnDef::new("name", DataType::Text),
        ];
        let values = vec![Value::Integer(7), Value::Text("hi".into())];
        let blob = encode_row(&values).unwrap();
        let decoded = decode_row(&blob, &columns).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn round_trips_blob_and_decimal() {
        use rust_decimal::Decimal;
        let columns = vec![
            ColumnDef::new("amount", DataType::Decimal),
            ColumnDef::new("payload", DataType::Blob),
        ];
        let values = vec![
            Value::Decimal(Decimal::new(12345, 2)),
            Value::Blob(vec![1, 2, 3, 255]),
        ];
        let blob = encode_row(&values).unwrap();
        let decoded = decode_row(&blob, &columns).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn short_row_padded_with_defaults() {
        let columns = vec![
            ColumnDef::new("id", DataType::Integer),
            ColumnDef::new("active", DataType::Boolean).with_default(DefaultValue::Boolean(true)),
        ];
        let blob = encode_row(&[Value::Integer(1)]).unwrap();
        let decoded = decode_row(&blob, &columns).unwrap();
        assert_eq!(decoded, vec![Value::Integer(1), Value::Boolean(true)]);
    }

    #[test]
    fn long_row_truncated_to_column_count() {
        let columns = vec![ColumnDef::new("id", DataType::Integer)];
        let blob = encode_row(&[Value::Integer(1), Value::Text("dropped".into())]).unwrap();
        let decoded = decode_row(&blob, &columns).unwrap();
        assert_eq!(decoded, vec![Value::Integer(1)]);
    }
}
