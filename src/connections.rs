use std::time::Duration;

use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::{ClientConfig, TopicPartitionList};
use tracing::debug;

use crate::config::BrokerEndpoint;
use crate::errors::KafkaIngestError;

/// Every broker round trip of the resolution phase is bounded by this.
pub(crate) const QUERY_TIMEOUT: Duration = Duration::from_secs(20);

const RECEIVE_BUFFER_BYTES: usize = 128 * 1024;

// librdkafka validates these at client creation: `fetch.max.bytes` must be
// >= `message.max.bytes`, and `receive.message.max.bytes` must be >=
// `fetch.max.bytes` + 512.
const MAX_MESSAGE_BYTES: usize = RECEIVE_BUFFER_BYTES / 2;

/// A short-lived query channel to a single broker.
///
/// Only metadata and offset lookups go through it; it never joins a consumer
/// group and never fetches message data.
pub(crate) struct BrokerConnection {
    broker: BrokerEndpoint,
    consumer: BaseConsumer,
}

impl BrokerConnection {
    fn open(broker: &BrokerEndpoint) -> Result<Self, KafkaIngestError> {
        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", broker.address())
            .set("client.id", "kafka_ingest-lookup")
            .set("socket.timeout.ms", QUERY_TIMEOUT.as_millis().to_string())
            .set("receive.message.max.bytes", RECEIVE_BUFFER_BYTES.to_string())
            .set("message.max.bytes", MAX_MESSAGE_BYTES.to_string())
            .set("fetch.max.bytes", MAX_MESSAGE_BYTES.to_string())
            .create()
            .map_err(|e| KafkaIngestError::Connection { broker: broker.address(), source: e })?;

        Ok(Self { broker: broker.clone(), consumer })
    }

    /// The partition ids this broker reports for `topic`.
    pub(crate) fn topic_partitions(&self, topic: &str) -> Result<Vec<i32>, KafkaIngestError> {
        let metadata = self
            .consumer
            .fetch_metadata(Some(topic), QUERY_TIMEOUT)
            .map_err(|e| self.query_failed(e))?;

        Ok(metadata
            .topics()
            .iter()
            .filter(|t| t.name() == topic)
            .flat_map(|t| t.partitions().iter().map(|p| p.id()))
            .collect())
    }

    /// Sends one batched offset lookup and returns the broker's response.
    ///
    /// Entries of `request` carry `Offset::Beginning`/`Offset::End` sentinels;
    /// the response carries `Offset::Offset(..)` for every entry this broker
    /// could answer, and a non-concrete offset for every entry it could not.
    pub(crate) fn lookup_offsets(
        &self,
        request: TopicPartitionList,
    ) -> Result<TopicPartitionList, KafkaIngestError> {
        self.consumer.offsets_for_times(request, QUERY_TIMEOUT).map_err(|e| self.query_failed(e))
    }

    fn query_failed(&self, source: rdkafka::error::KafkaError) -> KafkaIngestError {
        KafkaIngestError::Connection { broker: self.broker.address(), source }
    }
}

/// One open [`BrokerConnection`] per configured broker.
///
/// The set lives only for the resolution phase: it is opened before partition
/// discovery starts and released (by drop) on every exit path, whether
/// resolution succeeded or not, before control returns to the caller.
pub(crate) struct BrokerConnections {
    connections: Vec<BrokerConnection>,
}

impl BrokerConnections {
    pub(crate) fn open(brokers: &[BrokerEndpoint]) -> Result<Self, KafkaIngestError> {
        let mut connections = Vec::with_capacity(brokers.len());
        for broker in brokers {
            connections.push(BrokerConnection::open(broker)?);
        }
        debug!("Opened {} broker connection(s)", connections.len());
        Ok(Self { connections })
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &BrokerConnection> {
        self.connections.iter()
    }
}

impl Drop for BrokerConnections {
    fn drop(&mut self) {
        // librdkafka tears the client down on drop and cannot fail doing so;
        // this hook marks the release point in the logs.
        debug!("Released {} broker connection(s)", self.connections.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Client creation is lazy in librdkafka: no network traffic happens until
    // a query is issued, so opening connections to unroutable endpoints is
    // instantaneous and must succeed.
    #[test]
    fn opening_connections_does_not_contact_brokers() {
        let brokers =
            vec![BrokerEndpoint::new("localhost", 1), BrokerEndpoint::new("localhost", 2)];
        let connections = BrokerConnections::open(&brokers).unwrap();
        assert_eq!(connections.iter().count(), 2);
    }
}
