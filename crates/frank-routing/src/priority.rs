//! Deterministic priority-band assignment (`spec.md` §4.4, §9). The source
//! had two inconsistent strategies (`mod 900` and `mod 696`); this
//! standardizes on `mod 696`, the spec's chosen resolution.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const BAND_LOW: i32 = 100;
pub const BAND_HIGH: i32 = 795;
const BAND_WIDTH: i32 = 696;

/// `100 + (hash(profile_name) mod 696)`, leaving room for four consecutive
/// rule offsets and a free range above 795 for an operator-owned catch-all.
pub fn priority_band_base(profile_name: &str) -> i32 {
    let mut hasher = DefaultHasher::new();
    profile_name.hash(&mut hasher);
    let h = hasher.finish();
    BAND_LOW + (h % BAND_WIDTH as u64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_is_always_in_band() {
        for name in ["proj-a", "x", "a-very-long-profile-name-123"] {
            let base = priority_band_base(name);
            assert!((BAND_LOW..=BAND_HIGH).contains(&base), "{name} -> {base}");
        }
    }

    #[test]
    fn deterministic_for_same_name() {
        assert_eq!(priority_band_base("proj-a"), priority_band_base("proj-a"));
    }
}
