//! Mapping of requested sizes to pool block sizes.
//!
//! Block sizes are powers of two large enough to hold the payload plus the
//! [block header](crate::header). Two ranges get a dedicated class instead,
//! because doubling would waste almost half of every block there:
//!
//! | payload            | block size            |
//! |--------------------|-----------------------|
//! | `257..=388`        | 396                   |
//! | `513..=760`        | 768                   |
//! | anything else      | next power of two of `payload + HEADER_SIZE` |
//!
//! A payload in one of the ranges whose header would not fit in the
//! dedicated class falls back to the power-of-two rule.

use core::ops::RangeInclusive;

use crate::header::HEADER_SIZE;

/// Explicit size classes, as `(payload range, block size)`.
const EXPLICIT_CLASSES: [(RangeInclusive<usize>, usize); 2] = [(257..=396, 396), (513..=768, 768)];

/// Returns the smallest power of two greater than or equal to `k`.
///
/// `next_power_of_two(0)` is `1`. Returns `None` if the result does not fit
/// in `usize`.
#[must_use]
pub const fn next_power_of_two(k: usize) -> Option<usize> {
    if k == 0 {
        return Some(1);
    }
    let mut k = k - 1;
    let mut shift = 1;
    while shift < usize::BITS {
        k |= k >> shift;
        shift <<= 1;
    }
    k.checked_add(1)
}

/// Returns the block size serving a payload of `size` bytes.
///
/// The result is at least `size + HEADER_SIZE`. Returns `None` when no such
/// block size is representable.
#[must_use]
pub fn block_size_for(size: usize) -> Option<usize> {
    let needed = size.checked_add(HEADER_SIZE)?;
    for (range, block_size) in &EXPLICIT_CLASSES {
        if range.contains(&size) && needed <= *block_size {
            return Some(*block_size);
        }
    }
    next_power_of_two(needed)
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_power_of_two() {
        assert_eq!(next_power_of_two(0), Some(1));
        assert_eq!(next_power_of_two(1), Some(1));
        assert_eq!(next_power_of_two(2), Some(2));
        assert_eq!(next_power_of_two(3), Some(4));
        assert_eq!(next_power_of_two(12), Some(16));
        assert_eq!(next_power_of_two(4096), Some(4096));
        assert_eq!(next_power_of_two(4097), Some(8192));
        assert_eq!(next_power_of_two(1 << (usize::BITS - 1)), Some(1 << (usize::BITS - 1)));
        assert_eq!(next_power_of_two((1 << (usize::BITS - 1)) + 1), None);
        assert_eq!(next_power_of_two(usize::MAX), None);
    }

    #[test]
    fn test_next_power_of_two_matches_std() {
        for k in 1..=10_000_usize {
            assert_eq!(next_power_of_two(k), Some(k.next_power_of_two()), "k={k}");
        }
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_block_size_for() {
        let expected = [
            (0, 8),
            (1, 16),
            (8, 16),
            (9, 32),
            (255, 512),
            (256, 512),
            (257, 396),
            (388, 396),
            (389, 512),
            (396, 512),
            (397, 512),
            (504, 512),
            (505, 1024),
            (511, 1024),
            (512, 1024),
            (513, 768),
            (760, 768),
            (761, 1024),
            (768, 1024),
            (769, 1024),
            (4095, 8192),
            (4096, 8192),
        ];
        for (size, block_size) in expected {
            assert_eq!(block_size_for(size), Some(block_size), "size={size}");
        }
    }

    #[test]
    fn test_block_size_holds_header() {
        let sizes = [0, 1, 255, 256, 257, 396, 397, 511, 512, 513, 768, 769, 4095, 4096];
        for size in sizes {
            let block_size = block_size_for(size).unwrap();
            assert!(block_size >= size + HEADER_SIZE, "size={size}");
            assert_eq!(block_size_for(size), Some(block_size), "size={size}");
        }
        for size in 0..=10_000 {
            assert!(block_size_for(size).unwrap() >= size + HEADER_SIZE, "size={size}");
        }
    }

    #[test]
    fn test_block_size_overflow() {
        assert_eq!(block_size_for(usize::MAX), None);
        assert_eq!(block_size_for(usize::MAX - HEADER_SIZE + 1), None);
        assert_eq!(block_size_for(1 << (usize::BITS - 1)), None);
        assert_eq!(
            block_size_for((1 << (usize::BITS - 1)) - HEADER_SIZE),
            Some(1 << (usize::BITS - 1))
        );
    }
}
