use crate::client::ServerAddress;

/// Chooses which subset of resolved addresses participates in a call.
pub trait Selector: Send + Sync {
    fn select(&self, addrs: &[ServerAddress], topic: &str) -> Vec<ServerAddress>;
}

/// Every resolved address: publish broadcasts to the whole cluster,
/// subscribe fans in from every member.
pub struct All;

impl Selector for All {
    fn select(&self, addrs: &[ServerAddress], _topic: &str) -> Vec<ServerAddress> {
        addrs.to_vec()
    }
}

/// Hashes the topic onto exactly one member.
///
/// The resolved set is ordered before indexing, so the same topic lands on
/// the same member for as long as membership is unchanged, regardless of the
/// order the resolver reported the addresses in.
pub struct Shard;

impl Selector for Shard {
    fn select(&self, addrs: &[ServerAddress], topic: &str) -> Vec<ServerAddress> {
        if addrs.is_empty() {
            return Vec::new();
        }
        let mut ordered = addrs.to_vec();
        ordered.sort();
        let idx = crc32fast::hash(topic.as_bytes()) as usize % ordered.len();
        vec![ordered[idx].clone()]
    }
}
