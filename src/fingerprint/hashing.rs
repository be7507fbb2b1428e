use super::{Couple, Peak, frame_to_ms};
use std::collections::BTreeMap;

// Address layout, most significant bit first:
//
//   31        22 21        12 11          0
//   [anchor bin] [target bin] [delta frames]
//
// 10 + 10 bits hold any of the 512 frame bins with headroom; 12 bits of frame
// delta cover the whole target zone. Bit-packing, not hashing, so the mapping
// is reversible and collision-free within the field widths.
pub const ANCHOR_BITS: u32 = 10;
pub const TARGET_BITS: u32 = 10;
pub const DELTA_BITS: u32 = 12;

const ANCHOR_MASK: u32 = (1 << ANCHOR_BITS) - 1;
const TARGET_MASK: u32 = (1 << TARGET_BITS) - 1;
const DELTA_MASK: u32 = (1 << DELTA_BITS) - 1;

/// Target zone, in frames after the anchor (inclusive). ~46 ms to ~5.9 s.
pub const MIN_DELTA_FRAMES: usize = 1;
pub const MAX_DELTA_FRAMES: usize = 128;

/// Maximum pairs generated per anchor.
pub const FAN_OUT: usize = 5;

/// One address occurrence in a query, kept with its own anchor time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryFingerprint {
    pub address: u32,
    pub anchor_time_ms: u32,
}

/// Pack an (anchor, target, delta) triple into an address.
pub fn pack_address(anchor_bin: usize, target_bin: usize, delta_frames: usize) -> u32 {
    ((anchor_bin as u32 & ANCHOR_MASK) << (TARGET_BITS + DELTA_BITS))
        | ((target_bin as u32 & TARGET_MASK) << DELTA_BITS)
        | (delta_frames as u32 & DELTA_MASK)
}

/// Inverse of [`pack_address`]: `(anchor_bin, target_bin, delta_frames)`.
pub fn unpack_address(address: u32) -> (u32, u32, u32) {
    (
        (address >> (TARGET_BITS + DELTA_BITS)) & ANCHOR_MASK,
        (address >> DELTA_BITS) & TARGET_MASK,
        address & DELTA_MASK,
    )
}

/// Fingerprints for indexing: address → couple of the earliest anchor that
/// produced it.
pub fn fingerprint(peaks: &[Peak], sample_rate: u32, track_id: i64) -> BTreeMap<u32, Couple> {
    let mut fingerprints = BTreeMap::new();
    for (address, anchor_frame) in pairs(peaks) {
        fingerprints.entry(address).or_insert(Couple {
            track_id,
            anchor_time_ms: frame_to_ms(anchor_frame, sample_rate),
        });
    }
    fingerprints
}

/// Fingerprints for querying: every occurrence, in anchor order. Repeated
/// addresses are kept since each occurrence is a separate vote.
pub fn query_fingerprints(peaks: &[Peak], sample_rate: u32) -> Vec<QueryFingerprint> {
    pairs(peaks)
        .into_iter()
        .map(|(address, anchor_frame)| QueryFingerprint {
            address,
            anchor_time_ms: frame_to_ms(anchor_frame, sample_rate),
        })
        .collect()
}

/// Pair each anchor with up to `FAN_OUT` later peaks inside the target zone.
fn pairs(peaks: &[Peak]) -> Vec<(u32, usize)> {
    let mut sorted = peaks.to_vec();
    sorted.sort_by_key(|p| (p.frame_index, p.frequency_bin));

    let mut out = Vec::with_capacity(sorted.len() * FAN_OUT);
    for (i, anchor) in sorted.iter().enumerate() {
        let mut taken = 0;
        for target in &sorted[i + 1..] {
            let delta = target.frame_index - anchor.frame_index;
            if delta < MIN_DELTA_FRAMES {
                continue;
            }
            if delta > MAX_DELTA_FRAMES {
                break;
            }
            out.push((
                pack_address(anchor.frequency_bin, target.frequency_bin, delta),
                anchor.frame_index,
            ));
            taken += 1;
            if taken == FAN_OUT {
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::CANONICAL_SAMPLE_RATE;

    fn peak(frame_index: usize, frequency_bin: usize) -> Peak {
        Peak {
            frame_index,
            frequency_bin,
            magnitude: 1.0,
        }
    }

    #[test]
    fn test_pack_unpack() {
        let address = pack_address(57, 300, 9);
        assert_eq!(unpack_address(address), (57, 300, 9));
        assert_eq!(address, (57 << 22) | (300 << 12) | 9);
    }

    #[test]
    fn test_pack_masks_oversized_fields() {
        let address = pack_address(1024 + 3, 2048 + 5, 4096 + 7);
        assert_eq!(unpack_address(address), (3, 5, 7));
    }

    #[test]
    fn test_empty_peaks() {
        assert!(fingerprint(&[], CANONICAL_SAMPLE_RATE, 1).is_empty());
        assert!(query_fingerprints(&[], CANONICAL_SAMPLE_RATE).is_empty());
    }

    #[test]
    fn test_same_frame_peaks_not_paired() {
        let peaks = vec![peak(3, 10), peak(3, 200)];
        assert!(query_fingerprints(&peaks, CANONICAL_SAMPLE_RATE).is_empty());
    }

    #[test]
    fn test_target_zone_upper_bound() {
        let peaks = vec![peak(0, 10), peak(MAX_DELTA_FRAMES, 20), peak(MAX_DELTA_FRAMES + 1, 30)];
        let fps = query_fingerprints(&peaks, CANONICAL_SAMPLE_RATE);
        let triples: Vec<_> = fps.iter().map(|f| unpack_address(f.address)).collect();
        assert!(triples.contains(&(10, 20, MAX_DELTA_FRAMES as u32)));
        assert!(!triples.iter().any(|&(a, t, _)| a == 10 && t == 30));
        // 20 -> 30 is one frame apart
        assert!(triples.contains(&(20, 30, 1)));
    }

    #[test]
    fn test_fan_out_cap() {
        let peaks: Vec<Peak> = (0..20).map(|i| peak(i, 100 + i)).collect();
        let fps = query_fingerprints(&peaks, CANONICAL_SAMPLE_RATE);
        let from_first = fps.iter().filter(|f| f.anchor_time_ms == 0).count();
        assert_eq!(from_first, FAN_OUT);
    }

    #[test]
    fn test_anchor_time_from_earlier_peak() {
        let peaks = vec![peak(10, 40), peak(12, 80)];
        let fps = query_fingerprints(&peaks, CANONICAL_SAMPLE_RATE);
        assert_eq!(fps.len(), 1);
        assert_eq!(fps[0].anchor_time_ms, frame_to_ms(10, CANONICAL_SAMPLE_RATE));
        assert_eq!(unpack_address(fps[0].address), (40, 80, 2));
    }

    #[test]
    fn test_query_keeps_repeated_addresses() {
        // The same 50 -> 60 pattern twice, far apart
        let peaks = vec![peak(0, 50), peak(2, 60), peak(500, 50), peak(502, 60)];
        let fps = query_fingerprints(&peaks, CANONICAL_SAMPLE_RATE);
        let address = pack_address(50, 60, 2);
        assert_eq!(fps.iter().filter(|f| f.address == address).count(), 2);

        let indexed = fingerprint(&peaks, CANONICAL_SAMPLE_RATE, 7);
        assert_eq!(indexed.len(), 1);
        assert_eq!(indexed[&address], Couple { track_id: 7, anchor_time_ms: 0 });
    }

    #[test]
    fn test_order_independent() {
        let peaks: Vec<Peak> = (0..40).map(|i| peak(i / 2, 30 + (i * 37) % 400)).collect();
        let mut shuffled = peaks.clone();
        shuffled.reverse();
        shuffled.swap(3, 17);
        assert_eq!(
            fingerprint(&peaks, CANONICAL_SAMPLE_RATE, 1),
            fingerprint(&shuffled, CANONICAL_SAMPLE_RATE, 1)
        );
        assert_eq!(
            query_fingerprints(&peaks, CANONICAL_SAMPLE_RATE),
            query_fingerprints(&shuffled, CANONICAL_SAMPLE_RATE)
        );
    }
}
