//! Round-robin assignment of shards to nodes.

/// Clamp a requested node count to `[1, shard_count]`.
///
/// There is never a reason to provision more nodes than there are shards.
/// With zero shards the result is still 1; callers reject empty inputs
/// before getting here.
pub fn clamp_node_count(requested: usize, shard_count: usize) -> usize {
    requested.min(shard_count).max(1)
}

/// Shard indices assigned to `node_index`: every `i` with
/// `i % node_count == node_index`.
pub fn shards_for_node(shard_count: usize, node_count: usize, node_index: usize) -> Vec<usize> {
    if node_count == 0 {
        return Vec::new();
    }
    (node_index..shard_count).step_by(node_count).collect()
}

/// Full partition of `shard_count` shards over `node_count` nodes.
pub fn partition(shard_count: usize, node_count: usize) -> Vec<Vec<usize>> {
    (0..node_count)
        .map(|node_index| shards_for_node(shard_count, node_count, node_index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_shards_two_nodes() {
        assert_eq!(partition(3, 2), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_partition_covers_every_shard_exactly_once() {
        for shard_count in 1..=12 {
            for node_count in 1..=shard_count {
                let parts = partition(shard_count, node_count);
                assert_eq!(parts.len(), node_count);

                let mut seen = vec![0u32; shard_count];
                for (node_index, shards) in parts.iter().enumerate() {
                    for &shard in shards {
                        assert_eq!(shard % node_count, node_index);
                        seen[shard] += 1;
                    }
                }
                assert!(seen.iter().all(|&count| count == 1));
            }
        }
    }

    #[test]
    fn test_clamp_node_count() {
        assert_eq!(clamp_node_count(0, 5), 1);
        assert_eq!(clamp_node_count(3, 5), 3);
        assert_eq!(clamp_node_count(10, 5), 5);
        assert_eq!(clamp_node_count(4, 0), 1);
    }

    #[test]
    fn test_zero_nodes_gets_nothing() {
        assert!(shards_for_node(4, 0, 0).is_empty());
    }
}
