use std::collections::BTreeSet;

use tracing::debug;

use crate::connections::BrokerConnections;
use crate::errors::KafkaIngestError;

/// Determines the effective partition set for `topic`.
///
/// A non-empty explicit set is returned verbatim, with no broker query at
/// all. An empty one means "unspecified": every connection is asked for the
/// topic's metadata and the reported partition ids are unioned.
///
/// Discovering zero partitions is not an error here; the resolution that
/// follows will simply have nothing to resolve.
pub(crate) fn resolve_partitions(
    connections: &BrokerConnections,
    topic: &str,
    explicit: &[i32],
) -> Result<BTreeSet<i32>, KafkaIngestError> {
    if !explicit.is_empty() {
        return Ok(explicit.iter().copied().collect());
    }

    let mut responses = Vec::new();
    for connection in connections.iter() {
        responses.push(connection.topic_partitions(topic)?);
    }

    let partitions = union_partitions(responses);
    if partitions.is_empty() {
        debug!("No partitions discovered for topic '{topic}'");
    }
    Ok(partitions)
}

/// Union of the partition ids reported by each broker's metadata response.
fn union_partitions(responses: impl IntoIterator<Item = Vec<i32>>) -> BTreeSet<i32> {
    responses.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::config::BrokerEndpoint;

    #[rstest]
    #[case(vec![vec![0, 1], vec![1, 2]], vec![0, 1, 2])]
    #[case(vec![vec![0, 1], vec![]], vec![0, 1])]
    #[case(vec![vec![], vec![]], vec![])]
    #[case(vec![], vec![])]
    fn union_across_broker_responses(#[case] responses: Vec<Vec<i32>>, #[case] expected: Vec<i32>) {
        let expected: BTreeSet<i32> = expected.into_iter().collect();
        assert_eq!(union_partitions(responses), expected);
    }

    // The endpoints are unroutable: if the explicit set did not short-circuit
    // discovery, this test would hang on a metadata query until its timeout.
    #[test]
    fn explicit_partitions_skip_the_broker_query() {
        let brokers = vec![BrokerEndpoint::new("localhost", 1)];
        let connections = BrokerConnections::open(&brokers).unwrap();

        let partitions = resolve_partitions(&connections, "t", &[3, 1, 2]).unwrap();
        assert_eq!(partitions, BTreeSet::from([1, 2, 3]));
    }
}
