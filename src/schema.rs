use serde::{Deserialize, Serialize};

/// Primitive types a [`crate::StructuredRecord`] field can hold.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Bytes,
    String,
    Int,
    Long,
    Double,
    Bool,
}

/// A single named, typed field of a [`Schema`].
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type }
    }
}

/// An ordered set of named fields.
///
/// Field order is meaningful: positional formats (e.g. `csv`) map parsed
/// columns onto fields in declaration order, and the content field of a
/// raw-decoded record is the first field not claimed by a metadata field name.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldSchema>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of `name` within the declared field order.
    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::new(vec![
            FieldSchema::new("ts", FieldType::Long),
            FieldSchema::new("body", FieldType::Bytes),
        ])
    }

    #[test]
    fn field_lookup_by_name() {
        let schema = sample();
        assert_eq!(schema.field("body").unwrap().field_type, FieldType::Bytes);
        assert!(schema.field("nope").is_none());
    }

    #[test]
    fn index_follows_declaration_order() {
        let schema = sample();
        assert_eq!(schema.index_of("ts"), Some(0));
        assert_eq!(schema.index_of("body"), Some(1));
        assert_eq!(schema.index_of("nope"), None);
    }
}
