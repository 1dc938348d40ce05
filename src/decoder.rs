use once_cell::sync::OnceCell;

use crate::config::SourceConfig;
use crate::errors::KafkaIngestError;
use crate::format::{reader_for, FormatReader};
use crate::record::{FieldValue, StructuredRecord};
use crate::schema::Schema;

/// Everything known about one raw Kafka message by the time it is decoded.
///
/// The timestamp is assigned once per processing batch and shared by every
/// message decoded within that batch; it is not the broker's per-message
/// timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
    pub batch_timestamp_ms: i64,
}

/// Turns a [`MessageEnvelope`] into a [`StructuredRecord`], pure given the
/// configuration.
///
/// Each parallel worker of the consumption engine holds its own decoder
/// instance. The derived state (schema, metadata field names, content field
/// or format reader) is computed lazily on the first message and cached for
/// the worker's lifetime; cloning a decoder hands a fresh, uninitialized
/// instance to the next worker, so independent initializations converge on
/// equivalent state.
#[derive(Debug)]
pub struct RecordDecoder {
    config: SourceConfig,
    state: OnceCell<DecoderState>,
}

struct DecoderState {
    schema: Schema,
    time_field: Option<String>,
    key_field: Option<String>,
    partition_field: Option<String>,
    offset_field: Option<String>,
    content: ContentDecoder,
}

impl std::fmt::Debug for DecoderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderState")
            .field("schema", &self.schema)
            .field("time_field", &self.time_field)
            .field("key_field", &self.key_field)
            .field("partition_field", &self.partition_field)
            .field("offset_field", &self.offset_field)
            .finish_non_exhaustive()
    }
}

/// The strategy rendering the message content, selected once at
/// configuration time by the presence of a format name.
enum ContentDecoder {
    /// The sole content field receives the raw message bytes untouched.
    Raw { message_field: String },
    /// Message bytes are parsed against the sub-schema; every parsed field
    /// is copied into the output record by name.
    Formatted { reader: Box<dyn FormatReader> },
}

impl DecoderState {
    fn derive(config: &SourceConfig) -> Result<Self, KafkaIngestError> {
        let content = match &config.format {
            Some(format) => {
                let message_schema =
                    config.message_schema.as_ref().ok_or(KafkaIngestError::MissingMessageSchema)?;
                ContentDecoder::Formatted { reader: reader_for(format, message_schema)? }
            }
            None => {
                let metadata_fields = [
                    config.time_field.as_deref(),
                    config.key_field.as_deref(),
                    config.partition_field.as_deref(),
                    config.offset_field.as_deref(),
                ];
                let message_field = config
                    .schema
                    .fields()
                    .iter()
                    .map(|f| f.name.as_str())
                    .find(|&name| !metadata_fields.contains(&Some(name)))
                    .ok_or(KafkaIngestError::MissingContentField)?;
                ContentDecoder::Raw { message_field: message_field.to_string() }
            }
        };

        Ok(Self {
            schema: config.schema.clone(),
            time_field: config.time_field.clone(),
            key_field: config.key_field.clone(),
            partition_field: config.partition_field.clone(),
            offset_field: config.offset_field.clone(),
            content,
        })
    }
}

impl RecordDecoder {
    pub fn new(config: SourceConfig) -> Self {
        Self { config, state: OnceCell::new() }
    }

    /// Decodes a single message into a record conforming to the output
    /// schema.
    ///
    /// Any failure (format lookup, message parsing, a value incompatible
    /// with its declared field type) is fatal for the message: there is no
    /// skip-and-continue at this layer.
    pub fn decode(&self, envelope: &MessageEnvelope) -> Result<StructuredRecord, KafkaIngestError> {
        let state = self.state.get_or_try_init(|| DecoderState::derive(&self.config))?;

        let mut builder = StructuredRecord::builder(state.schema.clone());
        if let Some(field) = &state.time_field {
            builder.set(field, FieldValue::Long(envelope.batch_timestamp_ms))?;
        }
        if let Some(field) = &state.key_field {
            let key = envelope.key.clone().map(FieldValue::Bytes).unwrap_or(FieldValue::Null);
            builder.set(field, key)?;
        }
        if let Some(field) = &state.partition_field {
            builder.set(field, FieldValue::Int(envelope.partition))?;
        }
        if let Some(field) = &state.offset_field {
            builder.set(field, FieldValue::Long(envelope.offset))?;
        }

        match &state.content {
            ContentDecoder::Raw { message_field } => {
                builder.set(message_field, FieldValue::Bytes(envelope.value.clone()))?;
            }
            ContentDecoder::Formatted { reader } => {
                let parsed = reader.read(&envelope.value)?;
                for (name, value) in parsed.fields() {
                    builder.set(name, value.clone())?;
                }
            }
        }

        Ok(builder.build())
    }

    #[cfg(test)]
    fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }
}

impl Clone for RecordDecoder {
    /// A clone starts with an empty cache: each worker derives its own state.
    fn clone(&self) -> Self {
        Self::new(self.config.clone())
    }
}
