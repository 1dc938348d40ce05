use serde_json::Value;

use crate::errors::KafkaIngestError;
use crate::record::{FieldValue, StructuredRecord};
use crate::schema::{FieldSchema, FieldType, Schema};

/// A pluggable byte-to-record parser, selected by name and bound to the
/// message sub-schema at construction time.
///
/// Readers are built once per worker and reused for every message that worker
/// decodes, so implementations must be stateless apart from their schema.
pub trait FormatReader: Send + Sync {
    fn read(&self, bytes: &[u8]) -> Result<StructuredRecord, KafkaIngestError>;
}

/// Looks up the reader registered under `name`.
///
/// Known formats: `json`, `csv`, `tsv`.
pub fn reader_for(name: &str, schema: &Schema) -> Result<Box<dyn FormatReader>, KafkaIngestError> {
    match name.to_ascii_lowercase().as_str() {
        "json" => Ok(Box::new(JsonReader { schema: schema.clone() })),
        "csv" => Ok(Box::new(DelimitedReader { schema: schema.clone(), delimiter: b',', name: "csv" })),
        "tsv" => Ok(Box::new(DelimitedReader { schema: schema.clone(), delimiter: b'\t', name: "tsv" })),
        _ => Err(KafkaIngestError::UnsupportedFormat(name.to_string())),
    }
}

fn parse_error(format: &str, reason: impl ToString) -> KafkaIngestError {
    KafkaIngestError::MessageParsing { format: format.to_string(), reason: reason.to_string() }
}

/// Parses each message as a single JSON object; schema fields are read from
/// the object by name, fields absent from the object come out `Null`.
struct JsonReader {
    schema: Schema,
}

impl FormatReader for JsonReader {
    fn read(&self, bytes: &[u8]) -> Result<StructuredRecord, KafkaIngestError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| parse_error("json", e))?;
        let object = value
            .as_object()
            .ok_or_else(|| parse_error("json", "top-level JSON value is not an object"))?;

        let mut builder = StructuredRecord::builder(self.schema.clone());
        for field in self.schema.fields() {
            let field_value = match object.get(&field.name) {
                None | Some(Value::Null) => FieldValue::Null,
                Some(json) => json_to_field_value(field, json)?,
            };
            builder.set(&field.name, field_value)?;
        }
        Ok(builder.build())
    }
}

fn json_to_field_value(field: &FieldSchema, json: &Value) -> Result<FieldValue, KafkaIngestError> {
    let mismatch = || {
        parse_error(
            "json",
            format!("value of field '{}' is not a valid {:?}", field.name, field.field_type),
        )
    };

    match (field.field_type, json) {
        (FieldType::String, Value::String(s)) => Ok(FieldValue::String(s.clone())),
        (FieldType::Bytes, Value::String(s)) => Ok(FieldValue::Bytes(s.clone().into_bytes())),
        (FieldType::Long, Value::Number(n)) => n.as_i64().map(FieldValue::Long).ok_or_else(mismatch),
        (FieldType::Int, Value::Number(n)) => n
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(FieldValue::Int)
            .ok_or_else(mismatch),
        (FieldType::Double, Value::Number(n)) => n.as_f64().map(FieldValue::Double).ok_or_else(mismatch),
        (FieldType::Bool, Value::Bool(b)) => Ok(FieldValue::Bool(*b)),
        _ => Err(mismatch()),
    }
}

/// Parses each message as a single delimited row; columns map onto schema
/// fields positionally, missing trailing columns come out `Null`.
struct DelimitedReader {
    schema: Schema,
    delimiter: u8,
    name: &'static str,
}

impl FormatReader for DelimitedReader {
    fn read(&self, bytes: &[u8]) -> Result<StructuredRecord, KafkaIngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut rows = reader.records();
        let row = rows
            .next()
            .ok_or_else(|| parse_error(self.name, "message contains no row"))?
            .map_err(|e| parse_error(self.name, e))?;

        if row.len() > self.schema.fields().len() {
            return Err(parse_error(
                self.name,
                format!("message has {} columns, schema declares {}", row.len(), self.schema.fields().len()),
            ));
        }

        let mut builder = StructuredRecord::builder(self.schema.clone());
        for (index, field) in self.schema.fields().iter().enumerate() {
            let field_value = match row.get(index) {
                None => FieldValue::Null,
                Some(column) => text_to_field_value(field, column, self.name)?,
            };
            builder.set(&field.name, field_value)?;
        }
        Ok(builder.build())
    }
}

fn text_to_field_value(
    field: &FieldSchema,
    raw: &str,
    format: &'static str,
) -> Result<FieldValue, KafkaIngestError> {
    let mismatch = |e: &dyn std::fmt::Display| {
        parse_error(format, format!("column for field '{}': {}", field.name, e))
    };

    match field.field_type {
        FieldType::String => Ok(FieldValue::String(raw.to_string())),
        FieldType::Bytes => Ok(FieldValue::Bytes(raw.as_bytes().to_vec())),
        FieldType::Int => raw.parse().map(FieldValue::Int).map_err(|e| mismatch(&e)),
        FieldType::Long => raw.parse().map(FieldValue::Long).map_err(|e| mismatch(&e)),
        FieldType::Double => raw.parse().map(FieldValue::Double).map_err(|e| mismatch(&e)),
        FieldType::Bool => raw.parse().map(FieldValue::Bool).map_err(|e| mismatch(&e)),
    }
}
