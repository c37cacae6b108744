const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Stable partition assignment for a partition key (FNV-1a).
pub fn partition_for(partition_key: &str, partitions: u32) -> i32 {
    let hash = partition_key
        .bytes()
        .fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
        });
    (hash % partitions.max(1)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_partition() {
        assert_eq!(partition_for("project-1", 12), partition_for("project-1", 12));
    }

    #[test]
    fn stays_in_range() {
        for key in ["a", "b", "project-1", "a-much-longer-root-context-identifier"] {
            let partition = partition_for(key, 3);
            assert!((0..3).contains(&partition));
        }
    }

    #[test]
    fn single_partition_is_zero() {
        assert_eq!(partition_for("anything", 1), 0);
        assert_eq!(partition_for("anything", 0), 0);
    }
}
