//! Calendar availability for a listing.
//!
//! Occupancy is derived from two sources: confirmed bookings, each covering
//! the half-open range `[check_in, check_out)`, and single-day owner blocks.
//! The set is recomputed from a fresh fetch on every use; nothing here is
//! cached or incremental.

use chrono::NaiveDate;
use std::collections::HashSet;

/// Expand confirmed booking ranges and owner blocks into the set of dates
/// that cannot be booked. The checkout day of each booking is excluded, so
/// back-to-back stays can share a turnover day.
pub fn occupied_dates(
    booking_ranges: &[(NaiveDate, NaiveDate)],
    blocks: &[NaiveDate],
) -> HashSet<NaiveDate> {
    let mut occupied = HashSet::new();
    for &(check_in, check_out) in booking_ranges {
        let mut day = check_in;
        while day < check_out {
            occupied.insert(day);
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
    }
    occupied.extend(blocks.iter().copied());
    occupied
}

/// Whether a date should be unselectable in a picker: anything in the past
/// (date-only comparison) or anything already occupied.
pub fn is_date_disabled(date: NaiveDate, today: NaiveDate, occupied: &HashSet<NaiveDate>) -> bool {
    date < today || occupied.contains(&date)
}

/// True iff any night of `[check_in, check_out)` is already occupied.
/// Callers must run this against freshly fetched occupancy right before
/// persisting a booking.
pub fn has_date_conflict(
    check_in: NaiveDate,
    check_out: NaiveDate,
    occupied: &HashSet<NaiveDate>,
) -> bool {
    let mut day = check_in;
    while day < check_out {
        if occupied.contains(&day) {
            return true;
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    false
}

pub fn nights_between(check_in: NaiveDate, check_out: NaiveDate) -> i64 {
    (check_out - check_in).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn booking_covers_every_night_but_not_checkout() {
        let occupied = occupied_dates(&[(d("2025-03-10"), d("2025-03-13"))], &[]);
        assert!(occupied.contains(&d("2025-03-10")));
        assert!(occupied.contains(&d("2025-03-11")));
        assert!(occupied.contains(&d("2025-03-12")));
        assert!(!occupied.contains(&d("2025-03-13")));
        assert_eq!(occupied.len(), 3);
    }

    #[test]
    fn block_contributes_exactly_its_day() {
        let occupied = occupied_dates(&[], &[d("2025-06-01")]);
        assert_eq!(occupied.len(), 1);
        assert!(occupied.contains(&d("2025-06-01")));
    }

    #[test]
    fn bookings_and_blocks_union() {
        let occupied = occupied_dates(
            &[(d("2025-03-10"), d("2025-03-12"))],
            &[d("2025-03-20"), d("2025-03-11")],
        );
        assert_eq!(occupied.len(), 3);
        assert!(occupied.contains(&d("2025-03-20")));
    }

    #[test]
    fn conflict_iff_range_intersects() {
        let occupied: HashSet<_> = [d("2025-03-11")].into_iter().collect();
        assert!(has_date_conflict(d("2025-03-10"), d("2025-03-13"), &occupied));
        assert!(!has_date_conflict(d("2025-03-10"), d("2025-03-13"), &HashSet::new()));
        // Checking out on the occupied day is fine, it is not a night spent.
        assert!(!has_date_conflict(d("2025-03-09"), d("2025-03-11"), &occupied));
        // Checking in on the occupied day is not.
        assert!(has_date_conflict(d("2025-03-11"), d("2025-03-12"), &occupied));
    }

    #[test]
    fn adding_disjoint_occupancy_never_flips_a_clear_range() {
        let mut occupied: HashSet<_> = [d("2025-03-20")].into_iter().collect();
        assert!(!has_date_conflict(d("2025-03-10"), d("2025-03-13"), &occupied));
        occupied.extend(occupied_dates(&[(d("2025-04-01"), d("2025-04-05"))], &[]));
        assert!(!has_date_conflict(d("2025-03-10"), d("2025-03-13"), &occupied));
    }

    #[test]
    fn past_dates_are_disabled_regardless_of_occupancy() {
        let today = d("2025-03-15");
        let occupied: HashSet<_> = [d("2025-03-20")].into_iter().collect();
        assert!(is_date_disabled(d("2025-03-14"), today, &occupied));
        assert!(is_date_disabled(d("2024-12-31"), today, &occupied));
        assert!(is_date_disabled(d("2025-03-20"), today, &occupied));
        assert!(!is_date_disabled(d("2025-03-15"), today, &occupied));
        assert!(!is_date_disabled(d("2025-03-21"), today, &occupied));
    }

    #[test]
    fn nights_match_the_half_open_range() {
        assert_eq!(nights_between(d("2025-03-10"), d("2025-03-13")), 3);
        assert_eq!(nights_between(d("2025-03-10"), d("2025-03-11")), 1);
    }
}
