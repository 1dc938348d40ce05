use rdkafka::error::KafkaError;
use thiserror::Error;

use crate::schema::FieldType;

#[derive(Error, Debug)]
pub enum KafkaIngestError {
    #[error("Unable to reach Kafka broker '{broker}': {source}")]
    Connection {
        broker: String,
        #[source]
        source: KafkaError,
    },

    #[error("Failed to build the batched offset request: {0}")]
    OffsetRequest(#[source] KafkaError),

    #[error("Could not find offsets for partitions {0:?}. Please check all brokers were included in the broker list")]
    UnresolvedPartitions(Vec<i32>),

    #[error("Encountered a not (yet) supported message format: '{0}'")]
    UnsupportedFormat(String),

    #[error("A message schema is required when a message format is configured")]
    MissingMessageSchema,

    #[error("Output schema has no field left to carry the message content")]
    MissingContentField,

    #[error("Field '{0}' is not part of the schema")]
    UnknownField(String),

    #[error("Value for field '{field}' is incompatible with its declared type {expected:?}")]
    FieldTypeMismatch { field: String, expected: FieldType },

    #[error("Failed to parse message as '{format}': {reason}")]
    MessageParsing { format: String, reason: String },
}
