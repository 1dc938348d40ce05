use std::collections::{BTreeMap, BTreeSet, HashMap};

use rdkafka::{Offset, TopicPartitionList};

use crate::config::StartOffset;
use crate::connections::BrokerConnections;
use crate::errors::KafkaIngestError;

/// The concrete starting offset of every partition in the effective set.
///
/// Produced once by [`crate::resolve_starting_offsets`] and then owned by the
/// external consumption engine; no symbolic marker ever survives into it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ResolvedOffsets {
    topic: String,
    offsets: BTreeMap<i32, i64>,
}

impl ResolvedOffsets {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn get(&self, partition: i32) -> Option<i64> {
        self.offsets.get(&partition).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Iterates `(partition, offset)` pairs in partition order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i64)> + '_ {
        self.offsets.iter().map(|(&p, &o)| (p, o))
    }

    /// The rdkafka assignment list seeding the continuous consumption engine.
    pub fn to_topic_partition_list(&self) -> TopicPartitionList {
        let mut list = TopicPartitionList::with_capacity(self.offsets.len());
        for (&partition, &offset) in &self.offsets {
            // Offsets here are concrete and non-negative, so this cannot fail.
            list.add_partition_offset(&self.topic, partition, Offset::Offset(offset)).ok();
        }
        list
    }
}

/// Set-based reconciliation of the offset resolution round trips.
///
/// Partitions whose desired offset is already concrete go straight into
/// `resolved`; symbolic ones go into `pending` and migrate over as broker
/// responses come in, first successful response winning. Whatever is left
/// in `pending` at the end is the failure set.
#[derive(Debug)]
struct OffsetResolution {
    resolved: BTreeMap<i32, i64>,
    pending: BTreeSet<i32>,
}

impl OffsetResolution {
    fn begin(desired: &HashMap<i32, StartOffset>) -> Self {
        let mut resolved = BTreeMap::new();
        let mut pending = BTreeSet::new();
        for (&partition, &start) in desired {
            match start {
                StartOffset::At(offset) => {
                    resolved.insert(partition, offset);
                }
                StartOffset::Earliest | StartOffset::Latest => {
                    pending.insert(partition);
                }
            }
        }
        Self { resolved, pending }
    }

    /// Records one broker's successful answer for `partition`.
    ///
    /// Answers for partitions already resolved (or never requested) are
    /// dropped, which is what makes the first successful response win.
    fn record_success(&mut self, partition: i32, offset: i64) {
        if self.pending.remove(&partition) {
            self.resolved.insert(partition, offset);
        }
    }

    fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    fn finish(self, topic: &str) -> Result<ResolvedOffsets, KafkaIngestError> {
        if !self.pending.is_empty() {
            return Err(KafkaIngestError::UnresolvedPartitions(self.pending.into_iter().collect()));
        }
        Ok(ResolvedOffsets { topic: topic.to_string(), offsets: self.resolved })
    }
}

/// Resolves the desired starting offset of every partition to a concrete one.
///
/// Concrete offsets are copied through without any broker traffic. Symbolic
/// ones are gathered into a single batched request which is sent to each
/// connection in turn until every partition has an answer; a partition left
/// unanswered by every connection fails the whole resolution, naming it.
pub(crate) fn resolve_offsets(
    connections: &BrokerConnections,
    topic: &str,
    desired: &HashMap<i32, StartOffset>,
) -> Result<ResolvedOffsets, KafkaIngestError> {
    let mut resolution = OffsetResolution::begin(desired);
    if resolution.is_complete() {
        return resolution.finish(topic);
    }

    let request = symbolic_request(topic, desired)?;
    for connection in connections.iter() {
        let response = connection.lookup_offsets(request.clone())?;
        for element in response.elements() {
            if let Offset::Offset(offset) = element.offset() {
                resolution.record_success(element.partition(), offset);
            }
        }
        // Every replica gets the same batch, but one answer per partition is
        // all that is needed.
        if resolution.is_complete() {
            break;
        }
    }

    resolution.finish(topic)
}

/// One batched lookup covering exactly the symbolic entries of `desired`,
/// each tagged with the sentinel the Kafka list-offsets API understands.
fn symbolic_request(
    topic: &str,
    desired: &HashMap<i32, StartOffset>,
) -> Result<TopicPartitionList, KafkaIngestError> {
    let mut request = TopicPartitionList::new();
    for (&partition, &start) in desired {
        let sentinel = match start {
            StartOffset::Earliest => Offset::Beginning,
            StartOffset::Latest => Offset::End,
            StartOffset::At(_) => continue,
        };
        request
            .add_partition_offset(topic, partition, sentinel)
            .map_err(KafkaIngestError::OffsetRequest)?;
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::config::BrokerEndpoint;
    use crate::connections::BrokerConnections;
    use crate::utils::is_thread_safe;

    fn desired(entries: &[(i32, StartOffset)]) -> HashMap<i32, StartOffset> {
        entries.iter().copied().collect()
    }

    #[test]
    fn concrete_offsets_are_copied_through_unchanged() {
        let resolution =
            OffsetResolution::begin(&desired(&[(0, StartOffset::At(100)), (1, StartOffset::At(0))]));
        assert!(resolution.is_complete());

        let resolved = resolution.finish("t").unwrap();
        assert_eq!(resolved.topic(), "t");
        assert_eq!(resolved.get(0), Some(100));
        assert_eq!(resolved.get(1), Some(0));
    }

    #[test]
    fn first_successful_response_wins() {
        let mut resolution = OffsetResolution::begin(&desired(&[(0, StartOffset::Earliest)]));
        resolution.record_success(0, 100);
        // A later replica disagreeing must not overwrite.
        resolution.record_success(0, 500);

        assert_eq!(resolution.finish("t").unwrap().get(0), Some(100));
    }

    #[test]
    fn responses_for_unrequested_partitions_are_dropped() {
        let mut resolution = OffsetResolution::begin(&desired(&[(0, StartOffset::At(999))]));
        resolution.record_success(0, 100);
        resolution.record_success(7, 100);

        let resolved = resolution.finish("t").unwrap();
        assert_eq!(resolved.get(0), Some(999));
        assert_eq!(resolved.get(7), None);
    }

    #[test]
    fn mixed_symbolic_and_concrete_offsets() {
        // Partition 0 needs the broker; partition 1 is already concrete.
        let mut resolution = OffsetResolution::begin(
            &desired(&[(0, StartOffset::Earliest), (1, StartOffset::At(999))]),
        );
        assert!(!resolution.is_complete());

        resolution.record_success(0, 100);
        let resolved = resolution.finish("t").unwrap();
        assert_eq!(resolved.get(0), Some(100));
        assert_eq!(resolved.get(1), Some(999));
        assert_eq!(resolved.len(), 2);
    }

    #[rstest]
    #[case(&[(5, StartOffset::Latest)], vec![5])]
    #[case(&[(1, StartOffset::Earliest), (3, StartOffset::Latest), (2, StartOffset::At(7))], vec![1, 3])]
    fn unanswered_partitions_fail_resolution_by_name(
        #[case] entries: &[(i32, StartOffset)],
        #[case] expected_missing: Vec<i32>,
    ) {
        let resolution = OffsetResolution::begin(&desired(entries));
        let err = resolution.finish("t").unwrap_err();
        assert!(
            matches!(err, KafkaIngestError::UnresolvedPartitions(missing) if missing == expected_missing)
        );
    }

    #[test]
    fn partially_answered_resolution_names_only_the_missing() {
        let mut resolution = OffsetResolution::begin(
            &desired(&[(0, StartOffset::Earliest), (1, StartOffset::Earliest)]),
        );
        resolution.record_success(1, 42);

        let err = resolution.finish("t").unwrap_err();
        assert!(matches!(err, KafkaIngestError::UnresolvedPartitions(missing) if missing == vec![0]));
    }

    #[test]
    fn symbolic_request_covers_exactly_the_symbolic_entries() {
        let request = symbolic_request(
            "t",
            &desired(&[
                (0, StartOffset::Earliest),
                (1, StartOffset::Latest),
                (2, StartOffset::At(999)),
            ]),
        )
        .unwrap();

        assert_eq!(request.count(), 2);
        let mut entries: Vec<(i32, Offset)> =
            request.elements().iter().map(|e| (e.partition(), e.offset())).collect();
        entries.sort_by_key(|(p, _)| *p);
        assert_eq!(entries, vec![(0, Offset::Beginning), (1, Offset::End)]);
    }

    // The endpoints are unroutable: an all-concrete desired map must resolve
    // without a single lookup, or this test would block on the query timeout.
    #[test]
    fn all_concrete_offsets_require_no_broker_round_trip() {
        let brokers = vec![BrokerEndpoint::new("localhost", 1)];
        let connections = BrokerConnections::open(&brokers).unwrap();

        let resolved = resolve_offsets(
            &connections,
            "t",
            &desired(&[(0, StartOffset::At(10)), (1, StartOffset::At(20))]),
        )
        .unwrap();
        assert_eq!(resolved.get(0), Some(10));
        assert_eq!(resolved.get(1), Some(20));
    }

    #[test]
    fn topic_partition_list_carries_concrete_offsets() {
        let resolution =
            OffsetResolution::begin(&desired(&[(0, StartOffset::At(10)), (1, StartOffset::At(20))]));
        let resolved = resolution.finish("t").unwrap();

        let list = resolved.to_topic_partition_list();
        assert_eq!(list.count(), 2);
        for element in list.elements() {
            match element.partition() {
                0 => assert_eq!(element.offset(), Offset::Offset(10)),
                1 => assert_eq!(element.offset(), Offset::Offset(20)),
                p => panic!("unexpected partition {p}"),
            }
        }
    }

    #[test]
    fn test_types_thread_safety() {
        is_thread_safe::<ResolvedOffsets>();
    }
}
