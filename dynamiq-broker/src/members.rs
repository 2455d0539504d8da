use dynamiq_core::membership::Membership;
use tracing::info;

use crate::errors::{BrokerError, Result};

/// Order the seed list so this node contacts the servers after it first, wrapping around.
///
/// Seeds are sorted and this node is removed from the list.
pub fn prioritize_seed_servers(self_name: &str, seeds: &[String]) -> Result<Vec<String>> {
    match seeds {
        [] => {
            return Err(BrokerError::Configuration(
                "no seed servers configured".to_string(),
            ))
        }
        [only] if only == self_name => {
            return Err(BrokerError::Configuration(format!(
                "the only seed server is this node: {}",
                self_name
            )))
        }
        [only] => return Ok(vec![only.clone()]),
        _ => {}
    }

    let mut sorted: Vec<String> = seeds.to_vec();
    sorted.sort();
    sorted.dedup();

    // position of this node, or where it would sort when it is not a seed itself
    let split = sorted.partition_point(|seed| seed.as_str() < self_name);
    let (before, rest) = sorted.split_at(split);
    let after = rest.iter().filter(|seed| seed.as_str() != self_name);

    Ok(after.chain(before.iter()).cloned().collect())
}

/// Join the cluster through the prioritized seed list.
///
/// The node registers as `node_name:seed_port`. Returns the name it joined under.
pub async fn join_cluster(
    membership: &dyn Membership,
    node_name: &str,
    seeds: &[String],
    seed_port: u16,
) -> Result<String> {
    let self_name = format!("{}:{}", node_name, seed_port);
    let ordered = prioritize_seed_servers(&self_name, seeds)?;

    let joined = membership.join(&ordered).await?;
    info!(node = %self_name, seeds = joined, "joined cluster");
    for member in membership.members() {
        info!(member = %member.name, addr = %member.addr, "cluster member");
    }
    Ok(self_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynamiq_core::membership::{Peer, StaticMembership};

    fn seeds(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn seeds_after_self_come_first() {
        let ordered = prioritize_seed_servers("b", &seeds(&["c", "a", "b"])).unwrap();
        assert_eq!(ordered, seeds(&["c", "a"]));

        let ordered = prioritize_seed_servers("a", &seeds(&["a", "b", "c"])).unwrap();
        assert_eq!(ordered, seeds(&["b", "c"]));

        let ordered = prioritize_seed_servers("c", &seeds(&["a", "b", "c"])).unwrap();
        assert_eq!(ordered, seeds(&["a", "b"]));
    }

    #[test]
    fn node_outside_the_seed_list_rotates_around_its_sort_position() {
        let ordered = prioritize_seed_servers("bb", &seeds(&["a", "c", "b"])).unwrap();
        assert_eq!(ordered, seeds(&["c", "a", "b"]));
    }

    #[test]
    fn degenerate_seed_lists() {
        assert!(prioritize_seed_servers("a", &[]).is_err());
        assert!(prioritize_seed_servers("a", &seeds(&["a"])).is_err());
        assert_eq!(
            prioritize_seed_servers("a", &seeds(&["z"])).unwrap(),
            seeds(&["z"])
        );
    }

    #[tokio::test]
    async fn join_cluster_registers_under_name_and_port() {
        let membership = StaticMembership::new(Peer::new("node-b:7946", "10.0.0.2"));
        let name = join_cluster(
            &membership,
            "node-b",
            &seeds(&["node-a:7946", "node-b:7946", "node-c:7946"]),
            7946,
        )
        .await
        .unwrap();

        assert_eq!(name, "node-b:7946");
        assert_eq!(membership.members().len(), 3);
    }

    #[tokio::test]
    async fn join_cluster_without_seeds_is_a_configuration_error() {
        let membership = StaticMembership::new(Peer::new("node-a:7946", "10.0.0.1"));

        let err = join_cluster(&membership, "node-a", &[], 7946).await.unwrap_err();
        assert!(matches!(err, BrokerError::Configuration(_)));

        let err = join_cluster(&membership, "node-a", &seeds(&["node-a:7946"]), 7946)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Configuration(_)));
        assert_eq!(membership.members().len(), 1);
    }
}
