use serde::{Deserialize, Serialize};

use crate::errors::KafkaIngestError;
use crate::schema::{FieldType, Schema};

/// A value held by a single [`StructuredRecord`] field.
///
/// `Null` is assignable to any field type: a Kafka message key is optional,
/// and a formatted message may simply not carry one of its sub-schema fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bytes(Vec<u8>),
    String(String),
    Int(i32),
    Long(i64),
    Double(f64),
    Bool(bool),
}

impl FieldValue {
    /// Whether this value can be assigned to a field of `field_type`.
    ///
    /// `Int` widens into `Long` fields; every other combination is strict.
    fn assignable_to(&self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (FieldValue::Null, _)
                | (FieldValue::Bytes(_), FieldType::Bytes)
                | (FieldValue::String(_), FieldType::String)
                | (FieldValue::Int(_), FieldType::Int)
                | (FieldValue::Int(_), FieldType::Long)
                | (FieldValue::Long(_), FieldType::Long)
                | (FieldValue::Double(_), FieldType::Double)
                | (FieldValue::Bool(_), FieldType::Bool)
        )
    }
}

/// A named, schema-typed tuple: one per consumed Kafka message.
///
/// Holds exactly one value per schema field, in declaration order; the
/// builder and the `Deserialize` impl both enforce that invariant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredRecord {
    schema: Schema,
    values: Vec<FieldValue>,
}

impl<'de> Deserialize<'de> for StructuredRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Parts {
            schema: Schema,
            values: Vec<FieldValue>,
        }

        let parts = Parts::deserialize(deserializer)?;
        if parts.values.len() != parts.schema.fields().len() {
            return Err(serde::de::Error::invalid_length(
                parts.values.len(),
                &"one value per schema field",
            ));
        }
        Ok(Self { schema: parts.schema, values: parts.values })
    }
}

impl StructuredRecord {
    pub fn builder(schema: Schema) -> RecordBuilder {
        RecordBuilder::new(schema)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    /// Iterates `(field name, value)` pairs in schema declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.schema.fields().iter().map(|f| f.name.as_str()).zip(self.values.iter())
    }
}

/// Assembles a [`StructuredRecord`], enforcing the schema on every assignment.
///
/// Fields never assigned come out as [`FieldValue::Null`].
#[derive(Debug)]
pub struct RecordBuilder {
    schema: Schema,
    values: Vec<FieldValue>,
}

impl RecordBuilder {
    pub fn new(schema: Schema) -> Self {
        let values = vec![FieldValue::Null; schema.fields().len()];
        Self { schema, values }
    }

    /// Assigns `value` to the field named `name`.
    ///
    /// Fails if the field is not declared by the schema, or if the value's
    /// type is incompatible with the field's declared type. An `Int` value
    /// assigned to a `Long` field is widened on the spot.
    pub fn set(&mut self, name: &str, value: FieldValue) -> Result<(), KafkaIngestError> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| KafkaIngestError::UnknownField(name.to_string()))?;

        let field_type = self.schema.fields()[index].field_type;
        if !value.assignable_to(field_type) {
            return Err(KafkaIngestError::FieldTypeMismatch {
                field: name.to_string(),
                expected: field_type,
            });
        }

        self.values[index] = match (value, field_type) {
            (FieldValue::Int(n), FieldType::Long) => FieldValue::Long(n as i64),
            (value, _) => value,
        };
        Ok(())
    }

    pub fn build(self) -> StructuredRecord {
        StructuredRecord { schema: self.schema, values: self.values }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::schema::FieldSchema;
    use crate::utils::is_thread_safe;

    fn sample_schema() -> Schema {
        Schema::new(vec![
            FieldSchema::new("ts", FieldType::Long),
            FieldSchema::new("key", FieldType::Bytes),
            FieldSchema::new("body", FieldType::String),
        ])
    }

    #[test]
    fn set_and_get_round_trip() {
        let mut builder = StructuredRecord::builder(sample_schema());
        builder.set("ts", FieldValue::Long(1234)).unwrap();
        builder.set("body", FieldValue::String("hello".into())).unwrap();
        let record = builder.build();

        assert_eq!(record.get("ts"), Some(&FieldValue::Long(1234)));
        assert_eq!(record.get("body"), Some(&FieldValue::String("hello".into())));
        // Never assigned: defaults to Null.
        assert_eq!(record.get("key"), Some(&FieldValue::Null));
        assert_eq!(record.get("nope"), None);
    }

    #[test]
    fn int_widens_into_long_field() {
        let mut builder = StructuredRecord::builder(sample_schema());
        builder.set("ts", FieldValue::Int(7)).unwrap();
        assert_eq!(builder.build().get("ts"), Some(&FieldValue::Long(7)));
    }

    #[rstest]
    #[case("ts", FieldValue::String("not a long".into()))]
    #[case("body", FieldValue::Long(1))]
    #[case("key", FieldValue::Bool(true))]
    fn incompatible_value_is_rejected(#[case] field: &str, #[case] value: FieldValue) {
        let mut builder = StructuredRecord::builder(sample_schema());
        let err = builder.set(field, value).unwrap_err();
        assert!(matches!(err, KafkaIngestError::FieldTypeMismatch { .. }));
    }

    #[test]
    fn undeclared_field_is_rejected() {
        let mut builder = StructuredRecord::builder(sample_schema());
        let err = builder.set("nope", FieldValue::Long(1)).unwrap_err();
        assert!(matches!(err, KafkaIngestError::UnknownField(f) if f == "nope"));
    }

    #[test]
    fn null_is_assignable_to_any_field() {
        let mut builder = StructuredRecord::builder(sample_schema());
        builder.set("ts", FieldValue::Null).unwrap();
        builder.set("key", FieldValue::Null).unwrap();
        builder.set("body", FieldValue::Null).unwrap();
    }

    #[test]
    fn fields_iterate_in_schema_order() {
        let mut builder = StructuredRecord::builder(sample_schema());
        builder.set("body", FieldValue::String("x".into())).unwrap();
        let record = builder.build();

        let names: Vec<&str> = record.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["ts", "key", "body"]);
    }

    #[test]
    fn serde_round_trip_preserves_the_record() {
        let mut builder = StructuredRecord::builder(sample_schema());
        builder.set("ts", FieldValue::Long(1234)).unwrap();
        builder.set("body", FieldValue::String("hello".into())).unwrap();
        let record = builder.build();

        let json = serde_json::to_string(&record).unwrap();
        let back: StructuredRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    // A record whose values array does not line up with its schema must be
    // rejected at deserialization time, not panic on a later `get`.
    #[rstest]
    #[case(r#"{"schema":{"fields":[{"name":"a","type":"long"}]},"values":[]}"#)]
    #[case(r#"{"schema":{"fields":[]},"values":[{"Long":1}]}"#)]
    fn deserializing_mismatched_value_count_is_rejected(#[case] json: &str) {
        let result: Result<StructuredRecord, _> = serde_json::from_str(json);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("one value per schema field"));
    }

    #[test]
    fn test_types_thread_safety() {
        is_thread_safe::<StructuredRecord>();
    }
}
