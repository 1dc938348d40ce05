use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::schema::Schema;

/// Host and port of a single Kafka broker, as supplied by configuration.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// `host:port`, the form librdkafka expects in `bootstrap.servers`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where consumption of a partition should start.
///
/// `Earliest` and `Latest` are symbolic: they must be resolved to a concrete
/// offset via a broker round trip before consumption can begin. `At` is
/// already concrete and is copied through resolution untouched.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    Earliest,
    Latest,
    At(i64),
}

impl Default for StartOffset {
    fn default() -> Self {
        StartOffset::Latest
    }
}

/// Everything this crate consumes from the external configuration layer.
///
/// Validation of the configuration (broker list syntax, schema/metadata field
/// consistency, offset non-negativity) happens in that external layer before
/// this struct is handed over; this crate only performs the checks it is
/// explicitly responsible for (content-field derivation, format lookup).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub brokers: Vec<BrokerEndpoint>,
    pub topic: String,

    /// Explicit partition set; empty means "discover from broker metadata".
    #[serde(default)]
    pub partitions: Vec<i32>,

    /// Per-partition starting offset overrides.
    #[serde(default)]
    pub start_offsets: HashMap<i32, StartOffset>,

    /// Starting offset for every partition without an explicit override.
    #[serde(default)]
    pub default_start_offset: StartOffset,

    /// Message format name; `None` selects raw byte passthrough.
    #[serde(default)]
    pub format: Option<String>,

    /// Schema of the records this source emits.
    pub schema: Schema,

    /// Schema the message bytes are parsed against in formatted mode.
    #[serde(default)]
    pub message_schema: Option<Schema>,

    /// Names of the output schema fields receiving, respectively, the batch
    /// timestamp, the message key, the partition id and the offset.
    #[serde(default)]
    pub time_field: Option<String>,
    #[serde(default)]
    pub key_field: Option<String>,
    #[serde(default)]
    pub partition_field: Option<String>,
    #[serde(default)]
    pub offset_field: Option<String>,
}

impl SourceConfig {
    /// The desired starting offset for every partition in `partitions`:
    /// the explicit override when one is configured, the default otherwise.
    pub fn initial_offsets<'a>(
        &self,
        partitions: impl IntoIterator<Item = &'a i32>,
    ) -> HashMap<i32, StartOffset> {
        partitions
            .into_iter()
            .map(|&p| (p, self.start_offsets.get(&p).copied().unwrap_or(self.default_start_offset)))
            .collect()
    }
}
