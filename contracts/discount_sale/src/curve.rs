//! Discount curve: maps a lock's remaining duration to a price discount.
//!
//! Long-term lockers get a steeper discount, capped just under 60% so the
//! contract can never be forced to give tokens away for free.

pub const WEEK: u64 = 7 * 24 * 60 * 60;

/// Discount fractions are expressed over this scale (parts per 100 million).
pub const DISCOUNT_SCALE: i128 = 100_000_000;

/// Hard cap on the discount, reached at a 4-year (208-week) lock.
pub const MAX_DISCOUNT: i128 = 59_999_584;

/// Shortest lock a buyer may hold when buying for themselves.
pub const MIN_LOCK_WEEKS: u64 = 4;

/// Shortest lock a delegated beneficiary may hold. The beneficiary is not
/// the one paying, so a full-length commitment is demanded in exchange.
pub const DELEGATE_MIN_LOCK_WEEKS: u64 = 208;

/// Calibration anchors as (remaining weeks, discount fraction). The curve is
/// linearly interpolated between anchors and flat at the cap beyond the last
/// one. The leading (0, 0) anchor keeps the curve defined and monotone below
/// the minimum purchasable lock.
const ANCHORS: [(u64, i128); 6] = [
    (0, 0),
    (4, 10_000_000),
    (24, 14_900_000),
    (52, 21_800_000),
    (104, 34_500_000),
    (208, MAX_DISCOUNT),
];

/// Whole weeks remaining until `unlock_time`, floored. Zero for an expired
/// lock.
pub fn remaining_weeks(unlock_time: u64, now: u64) -> u64 {
    if unlock_time <= now {
        return 0;
    }
    (unlock_time - now) / WEEK
}

/// Discount fraction over [`DISCOUNT_SCALE`] for a lock with `weeks` whole
/// weeks remaining. Monotone non-decreasing, capped at [`MAX_DISCOUNT`].
pub fn discount_fraction(weeks: u64) -> i128 {
    for pair in ANCHORS.windows(2) {
        let (w0, f0) = pair[0];
        let (w1, f1) = pair[1];
        if weeks < w1 {
            return f0 + (f1 - f0) * ((weeks - w0) as i128) / ((w1 - w0) as i128);
        }
    }
    MAX_DISCOUNT
}

/// Minimum whole weeks a beneficiary's lock must have remaining for a buy.
pub fn min_lock_weeks(delegated: bool) -> u64 {
    if delegated {
        DELEGATE_MIN_LOCK_WEEKS
    } else {
        MIN_LOCK_WEEKS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_table() {
        // Binding anchor points, including the flat cap past 208 weeks.
        for (weeks, expected) in [
            (4, 10_000_000),
            (24, 14_900_000),
            (52, 21_800_000),
            (104, 34_500_000),
            (208, 59_999_584),
            (300, 59_999_584),
            (400, 59_999_584),
        ] {
            assert_eq!(discount_fraction(weeks), expected, "weeks = {}", weeks);
        }
    }

    #[test]
    fn monotone_and_bounded() {
        let mut prev = 0;
        for weeks in 0..=260 {
            let frac = discount_fraction(weeks);
            assert!(frac >= prev, "decreased at week {}", weeks);
            assert!(frac <= MAX_DISCOUNT);
            prev = frac;
        }
        assert_eq!(discount_fraction(0), 0);
    }

    #[test]
    fn remaining_weeks_floors() {
        let now = 1_000 * WEEK;
        assert_eq!(remaining_weeks(now + 4 * WEEK, now), 4);
        assert_eq!(remaining_weeks(now + 4 * WEEK, now + 1), 3);
        assert_eq!(remaining_weeks(now + WEEK - 1, now), 0);
        // Expired locks contribute nothing.
        assert_eq!(remaining_weeks(now, now), 0);
        assert_eq!(remaining_weeks(now - 2 * WEEK, now), 0);
    }

    #[test]
    fn lock_thresholds() {
        assert_eq!(min_lock_weeks(false), 4);
        assert_eq!(min_lock_weeks(true), 208);
    }
}
