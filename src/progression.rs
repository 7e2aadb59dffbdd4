//! XP arithmetic shared by the ledger endpoints: display rounding and the
//! mastery-level table.

/// Ascending XP thresholds for mastery levels 1 through 12. An XP total at
/// or below `LEVEL_THRESHOLDS[i]` maps to level `i + 1`.
pub const LEVEL_THRESHOLDS: [i64; 12] = [
    500, 1_500, 3_500, 7_000, 12_500, 20_000, 30_000, 45_000, 65_000, 90_000, 120_000, 160_000,
];

/// XP width of each level beyond the fixed table.
const XP_PER_EXTENDED_LEVEL: i64 = 40_000;

/// Rounds an XP amount to the nearest multiple of 50, half-up.
///
/// Used for display totals only; the ledger itself stores exact amounts.
/// Negative input clamps to 0 (XP totals are never negative).
pub fn round_to_nearest_50(xp: i64) -> i64 {
    if xp <= 0 {
        return 0;
    }
    ((xp + 25) / 50) * 50
}

/// Maps a cumulative XP total to an integer mastery level.
///
/// Levels 1-12 come from [`LEVEL_THRESHOLDS`]; above the last threshold the
/// level grows by one per additional 40000 XP. Total over all non-negative
/// inputs and monotonically non-decreasing.
pub fn calculate_mastery_level(total_xp: i64) -> i32 {
    let xp = total_xp.max(0);

    for (idx, threshold) in LEVEL_THRESHOLDS.iter().enumerate() {
        if xp <= *threshold {
            return (idx + 1) as i32;
        }
    }

    let last = LEVEL_THRESHOLDS[LEVEL_THRESHOLDS.len() - 1];
    let extra = xp - last;
    let extended_levels = (extra + XP_PER_EXTENDED_LEVEL - 1) / XP_PER_EXTENDED_LEVEL;
    LEVEL_THRESHOLDS.len() as i32 + extended_levels as i32
}

/// True when an award moved a pillar total across a badge threshold,
/// i.e. the threshold was not met before and is met now.
pub fn newly_crossed(min_xp: i32, old_total: i32, new_total: i32) -> bool {
    min_xp > old_total && min_xp <= new_total
}
