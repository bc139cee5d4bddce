//! Matching engine
//!
//! Answers "which of these needles are in the stored set" as a bitmask: one
//! bit per needle, most-significant bit first, 8 needles per byte. The final
//! byte is zero-padded in its unused low bits.

/// Build the membership mask for `needles` against a sorted `haystack`
///
/// The haystack must already be sorted ascending; it is never re-sorted here.
pub fn match_mask(haystack: &[u64], needles: &[u64]) -> Vec<u8> {
    debug_assert!(haystack.windows(2).all(|w| w[0] <= w[1]), "haystack must be sorted");

    needles
        .chunks(8)
        .map(|group| {
            group.iter().enumerate().fold(0u8, |mask, (bit, needle)| {
                if haystack.binary_search(needle).is_ok() {
                    mask | (0x80 >> bit)
                } else {
                    mask
                }
            })
        })
        .collect()
}

/// Read bit `index` of a mask
pub fn mask_bit(mask: &[u8], index: usize) -> bool {
    mask.get(index / 8)
        .map(|byte| byte & (0x80 >> (index % 8)) != 0)
        .unwrap_or(false)
}

/// Indices of the first `count` needles whose bit is set
pub fn matched_indices(mask: &[u8], count: usize) -> Vec<usize> {
    (0..count).filter(|&i| mask_bit(mask, i)).collect()
}
