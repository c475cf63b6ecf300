//! HA partitioning: when two endpoints share a zone, each checkable is hashed to
//! exactly one endpoint at a time, so only that endpoint runs its checks.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// The endpoint that currently holds check authority for `checkable_name`, given
/// the zone's currently *connected* endpoint names (already sorted by the caller
/// for a stable result). Returns `None` if no endpoint is eligible.
pub fn authority_holder<'a>(checkable_name: &str, connected_endpoints: &[&'a str]) -> Option<&'a str> {
    if connected_endpoints.is_empty() {
        return None;
    }
    let mut hasher = DefaultHasher::new();
    checkable_name.hash(&mut hasher);
    let index = (hasher.finish() as usize) % connected_endpoints.len();
    Some(connected_endpoints[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_for_the_same_input_set() {
        let endpoints = vec!["node-a", "node-b", "node-c"];
        let first = authority_holder("web1!http", &endpoints);
        let second = authority_holder("web1!http", &endpoints);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_set_has_no_authority() {
        assert_eq!(authority_holder("web1!http", &[]), None);
    }

    #[test]
    fn distributes_across_more_than_one_endpoint() {
        let endpoints = vec!["node-a", "node-b"];
        let names = ["web1", "web2", "web3", "web4", "web5", "web6"];
        let assigned: std::collections::HashSet<_> = names
            .iter()
            .filter_map(|n| authority_holder(n, &endpoints))
            .collect();
        assert!(assigned.len() > 1, "expected checks spread across both endpoints");
    }
}
