//! Fragmentation of encoded access units into MTU-bounded packets

use bytes::Bytes;

/// Default maximum packet payload size in bytes
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1200;

/// Split `data` into contiguous chunks of at most `max_packet_size` bytes
///
/// Chunks are in offset order and cover every byte exactly once. Only the
/// last chunk may be shorter. Empty input, or a zero packet size, yields no
/// chunks. The chunks share `data`'s buffer.
pub fn fragment(data: &Bytes, max_packet_size: usize) -> Vec<Bytes> {
    if data.is_empty() || max_packet_size == 0 {
        return Vec::new();
    }

    let mut packets = Vec::with_capacity(data.len().div_ceil(max_packet_size));
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + max_packet_size).min(data.len());
        packets.push(data.slice(offset..end));
        offset = end;
    }
    packets
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fragment_3000_bytes() {
        let data = Bytes::from((0..3000).map(|i| (i % 256) as u8).collect::<Vec<u8>>());
        let packets = fragment(&data, 1200);

        let sizes: Vec<usize> = packets.iter().map(|p| p.len()).collect();
        assert_eq!(sizes, vec![1200, 1200, 600]);
        assert_eq!(&packets[1][..], &data[1200..2400]);
    }

    #[test]
    fn test_fragment_empty() {
        assert!(fragment(&Bytes::new(), 1200).is_empty());
    }

    #[test]
    fn test_fragment_exact_multiple() {
        let data = Bytes::from(vec![7u8; 2400]);
        let packets = fragment(&data, 1200);
        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|p| p.len() == 1200));
    }

    proptest! {
        #[test]
        fn prop_fragment_reassembles(
            data in proptest::collection::vec(any::<u8>(), 1..5000),
            max in 1usize..2000,
        ) {
            let data = Bytes::from(data);
            let packets = fragment(&data, max);

            prop_assert_eq!(packets.iter().map(|p| p.len()).sum::<usize>(), data.len());
            prop_assert!(packets.iter().all(|p| !p.is_empty() && p.len() <= max));
            // Only the last chunk may be short
            let short = packets.iter().filter(|p| p.len() < max).count();
            prop_assert!(short <= 1);
            if short == 1 {
                prop_assert!(packets.last().unwrap().len() < max);
            }
            prop_assert_eq!(packets.concat(), data.to_vec());
        }
    }
}
