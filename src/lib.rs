//! Resolve where consumption of a Kafka topic should start, and decode its
//! raw messages into schema-conformant structured records.
//!
//! This crate is the ingestion front-end of a streaming pipeline. It owns two
//! jobs and nothing else:
//!
//! 1. **Starting offset resolution**: given a broker list, a topic and a
//!    per-partition desired starting position (a concrete offset, or the
//!    symbolic `earliest`/`latest`), discover the effective partition set and
//!    turn every symbolic marker into a concrete offset by querying the
//!    brokers. Resolution fails fast, naming every partition no broker could
//!    answer for.
//! 2. **Message decoding**: convert each raw key/value/partition/offset
//!    envelope into a [`StructuredRecord`], either passing the value bytes
//!    through untouched or parsing them with a named format (`json`, `csv`,
//!    `tsv`) against a message sub-schema.
//!
//! Everything around these two jobs is an external collaborator: parsing and
//! validating the configuration, seeding the continuous consumption engine
//! with the [`ResolvedOffsets`], scheduling and checkpointing that engine,
//! and attaching the [`RecordDecoder`] as its per-message transform.
//!
//! Broker connections exist only for the duration of resolution and are
//! released on every exit path before this crate hands control back.

mod config;
mod connections;
mod decoder;
mod errors;
mod format;
mod offsets;
mod partitions;
mod record;
mod schema;
mod utils;

use tracing::{error, info};

pub use config::{BrokerEndpoint, SourceConfig, StartOffset};
pub use decoder::{MessageEnvelope, RecordDecoder};
pub use errors::KafkaIngestError;
pub use format::{reader_for, FormatReader};
pub use offsets::ResolvedOffsets;
pub use record::{FieldValue, RecordBuilder, StructuredRecord};
pub use schema::{FieldSchema, FieldType, Schema};

use connections::BrokerConnections;

/// Resolves the concrete starting offset of every partition of the topic.
///
/// Opens one query connection per configured broker, determines the
/// effective partition set (explicit configuration, or the union of every
/// broker's topic metadata), resolves each partition's desired offset to a
/// concrete one, and releases the connections, success or failure, before
/// returning.
///
/// # Errors
///
/// * [`KafkaIngestError::Connection`] when a broker cannot be reached or a
///   query fails at the transport level. Not retried here: retrying is the
///   caller's call.
/// * [`KafkaIngestError::UnresolvedPartitions`] when one or more symbolic
///   offsets were answered by no broker; the error names every such
///   partition. This usually means the broker list is incomplete.
pub fn resolve_starting_offsets(
    config: &SourceConfig,
) -> Result<ResolvedOffsets, KafkaIngestError> {
    let connections = BrokerConnections::open(&config.brokers)?;
    let result = resolve_with(&connections, config);
    drop(connections);

    match &result {
        Ok(resolved) => {
            let offsets: Vec<(i32, i64)> = resolved.iter().collect();
            info!(topic = %config.topic, "Using initial offsets {offsets:?}");
        }
        Err(e) => {
            error!(
                topic = %config.topic,
                "Unable to read from Kafka: {e}. Please verify that the hostname/IP and port \
                 of the brokers are correct and that they are running"
            );
        }
    }
    result
}

fn resolve_with(
    connections: &BrokerConnections,
    config: &SourceConfig,
) -> Result<ResolvedOffsets, KafkaIngestError> {
    let partitions = partitions::resolve_partitions(connections, &config.topic, &config.partitions)?;
    let desired = config.initial_offsets(&partitions);
    offsets::resolve_offsets(connections, &config.topic, &desired)
}

/// The values handed to the external streaming engine: the offsets that seed
/// continuous consumption and the transform applied to each consumed message.
#[derive(Debug)]
pub struct StreamHandoff {
    pub offsets: ResolvedOffsets,
    pub decoder: RecordDecoder,
}

impl StreamHandoff {
    /// Runs the whole resolution phase and pairs its result with a decoder
    /// built for the same configuration.
    pub fn prepare(config: &SourceConfig) -> Result<Self, KafkaIngestError> {
        let offsets = resolve_starting_offsets(config)?;
        Ok(Self { offsets, decoder: RecordDecoder::new(config.clone()) })
    }
}
