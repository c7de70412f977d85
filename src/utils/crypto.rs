use crate::utils::types::HashPos;

/// Maps arbitrary bytes onto the hash ring. The blake3 digest is truncated
/// to its first 8 bytes, big endian.
pub fn hash(bytes: &[u8]) -> HashPos {
    let digest = blake3::hash(bytes);
    let mut truncated = [0u8; 8];
    truncated.copy_from_slice(&digest.as_bytes()[..8]);
    HashPos::from_be_bytes(truncated)
}

/// Helper constants and arithmetic on ring positions.
pub trait HashRingKey {
    fn finger_count() -> usize;
    fn one() -> Self;
}

impl HashRingKey for HashPos {
    fn finger_count() -> usize {
        HashPos::BITS as usize
    }

    fn one() -> Self {
        1
    }
}

/// Start position of the i-th finger of a node at `pos`, i.e. pos + 2^i
/// with wrap-around.
pub fn finger_start(pos: HashPos, index: usize) -> HashPos {
    pos.overflowing_add(HashPos::one().overflowing_shl(index as u32).0).0
}

/// True iff `id` lies on the clockwise arc (start, end]. A degenerate arc
/// with start == end covers the whole ring.
pub fn in_interval_right_inclusive(id: HashPos, start: HashPos, end: HashPos) -> bool {
    if start == end {
        return true;
    }
    if start < end {
        start < id && id <= end
    } else {
        id > start || id <= end
    }
}

/// True iff `id` lies on the clockwise arc (start, end). A degenerate arc
/// with start == end covers the whole ring, so a node that knows nobody
/// else still accepts its farthest finger as a forwarding hop.
pub fn in_open_interval(id: HashPos, start: HashPos, end: HashPos) -> bool {
    if start == end {
        return true;
    }
    if start < end {
        start < id && id < end
    } else {
        id > start || id < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash(b"127.0.0.1:5601"), hash(b"127.0.0.1:5601"));
        assert_ne!(hash(b"127.0.0.1:5601"), hash(b"127.0.0.1:5602"));
    }

    #[test]
    fn finger_start_wraps() {
        assert_eq!(finger_start(10, 0), 11);
        assert_eq!(finger_start(10, 3), 18);
        assert_eq!(finger_start(HashPos::MAX, 0), 0);
        assert_eq!(finger_start(HashPos::MAX - 1, 2), 2);
    }

    #[test]
    fn right_inclusive_plain_arc() {
        assert!(in_interval_right_inclusive(150, 100, 200));
        assert!(in_interval_right_inclusive(200, 100, 200));
        assert!(!in_interval_right_inclusive(100, 100, 200));
        assert!(!in_interval_right_inclusive(50, 100, 200));
        assert!(!in_interval_right_inclusive(250, 100, 200));
    }

    #[test]
    fn right_inclusive_wrapping_arc() {
        // arc (250, 10] passes through zero
        assert!(in_interval_right_inclusive(5, 250, 10));
        assert!(in_interval_right_inclusive(255, 250, 10));
        assert!(in_interval_right_inclusive(10, 250, 10));
        assert!(!in_interval_right_inclusive(250, 250, 10));
        assert!(!in_interval_right_inclusive(100, 250, 10));
    }

    #[test]
    fn degenerate_arc_is_full_ring() {
        assert!(in_interval_right_inclusive(0, 42, 42));
        assert!(in_interval_right_inclusive(HashPos::MAX, 42, 42));
        assert!(in_open_interval(0, 42, 42));
        assert!(in_open_interval(41, 42, 42));
    }

    #[test]
    fn open_interval_excludes_both_ends() {
        assert!(in_open_interval(150, 100, 200));
        assert!(!in_open_interval(100, 100, 200));
        assert!(!in_open_interval(200, 100, 200));
        assert!(in_open_interval(5, 250, 10));
        assert!(!in_open_interval(10, 250, 10));
        assert!(!in_open_interval(250, 250, 10));
    }

    #[test]
    fn arcs_partition_the_ring() {
        // for start != end, (start, end] and (end, start] cover every id
        // exactly once
        let probes = [0, 1, 99, 100, 101, 199, 200, 201, HashPos::MAX];
        for id in probes {
            let forward = in_interval_right_inclusive(id, 100, 200);
            let backward = in_interval_right_inclusive(id, 200, 100);
            assert!(forward ^ backward, "id {} covered {} times", id, forward as u8 + backward as u8);
        }
    }
}
