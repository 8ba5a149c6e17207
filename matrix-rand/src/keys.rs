const GOLDEN: u64 = 0x9E37_79B9_7F4A_7C15;

/// Derive the sub-seed for lane `tag` of stream `key`.
///
/// Splitmix64 finalizer over `key ^ tag * GOLDEN`, so nearby
/// `(key, tag)` pairs land on unrelated seeds. Plain `key + tag`
/// would let different lanes collide (e.g. the noise lane of step
/// `t` and the input lane of step `t + offset`).
pub fn derive_key(key: u64, tag: u64) -> u64 {
    let mut zz = key ^ tag.wrapping_mul(GOLDEN);
    zz = zz.wrapping_add(GOLDEN);
    zz = (zz ^ (zz >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    zz = (zz ^ (zz >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    zz ^ (zz >> 31)
}

/// Two-level derivation: lane `tag`, then step `tt` within the lane.
pub fn derive_step_key(key: u64, tag: u64, tt: usize) -> u64 {
    derive_key(derive_key(key, tag), tt as u64)
}
