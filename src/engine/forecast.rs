use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};

use crate::model::*;

// ── Forecast Algorithm ────────────────────────────────────────────

/// Days covered by one forecast, starting at the reference date.
pub const FORECAST_DAYS: usize = 7;

/// Resolve the weekly template plus occasions into seven concrete days of
/// opening hours, index 0 = `reference`.
///
/// Overrides are resolved per concrete date, not per weekday slot: an
/// occasion only affects the calendar date it lands on inside the window,
/// so occasions sharing a weekday can never clobber each other's days.
/// Pure function — no I/O, no clock access.
pub fn resolve_week(
    template: &WeeklyAvailability,
    occasions: &[Occasion],
    reference: NaiveDate,
) -> [OpeningHours; FORECAST_DAYS] {
    let overrides = override_map(occasions, reference);
    std::array::from_fn(|i| {
        let date = reference + Days::new(i as u64);
        let hours = overrides
            .get(&date)
            .copied()
            .unwrap_or_else(|| template.weekday_mask(date.weekday()));
        OpeningHours { date, hours }
    })
}

/// Scan occasions against the window `[reference, reference + 6]` and build
/// the date-indexed override map. Later occasions in input order win when
/// two resolve to the same concrete date.
fn override_map(occasions: &[Occasion], reference: NaiveDate) -> BTreeMap<NaiveDate, HourMask> {
    let window_end = reference + Days::new(FORECAST_DAYS as u64 - 1);
    let mut overrides = BTreeMap::new();

    for occasion in occasions {
        let date = if occasion.yearly_recurring {
            // Materialize in the reference year; a month/day that does not
            // exist this year (Feb 29) simply has no occurrence.
            match NaiveDate::from_ymd_opt(
                reference.year(),
                occasion.close_date.month(),
                occasion.close_date.day(),
            ) {
                Some(d) => d,
                None => continue,
            }
        } else {
            occasion.close_date
        };

        if date < reference || date > window_end {
            continue;
        }
        overrides.insert(date, occasion.hour_mask);
    }

    overrides
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// A Monday, so the template-order tests read naturally.
    fn monday() -> NaiveDate {
        let d = date(2026, 8, 31);
        assert_eq!(d.weekday(), Weekday::Mon);
        d
    }

    fn one_bit_per_day() -> WeeklyAvailability {
        WeeklyAvailability::from_masks(&[
            0b1, 0b10, 0b100, 0b1000, 0b10000, 0b100000, 0b1000000,
        ])
        .unwrap()
    }

    fn exact(close_date: NaiveDate, bits: u64) -> Occasion {
        Occasion {
            close_date,
            hour_mask: HourMask::new(bits),
            yearly_recurring: false,
        }
    }

    fn yearly(close_date: NaiveDate, bits: u64) -> Occasion {
        Occasion {
            close_date,
            hour_mask: HourMask::new(bits),
            yearly_recurring: true,
        }
    }

    #[test]
    fn template_only_monday_start() {
        let forecast = resolve_week(&one_bit_per_day(), &[], monday());
        let hours: Vec<u64> = forecast.iter().map(|o| o.hours.bits()).collect();
        assert_eq!(hours, vec![0b1, 0b10, 0b100, 0b1000, 0b10000, 0b100000, 0b1000000]);
        for (i, entry) in forecast.iter().enumerate() {
            assert_eq!(entry.date, monday() + Days::new(i as u64));
        }
    }

    #[test]
    fn template_only_midweek_start_rotates() {
        let thursday = monday() + Days::new(3);
        assert_eq!(thursday.weekday(), Weekday::Thu);
        let forecast = resolve_week(&one_bit_per_day(), &[], thursday);
        let hours: Vec<u64> = forecast.iter().map(|o| o.hours.bits()).collect();
        assert_eq!(hours, vec![0b1000, 0b10000, 0b100000, 0b1000000, 0b1, 0b10, 0b100]);
    }

    #[test]
    fn resolution_is_idempotent() {
        let occasions = vec![
            exact(monday() + Days::new(2), 0),
            yearly(date(2000, 9, 4), 0b1),
        ];
        let first = resolve_week(&one_bit_per_day(), &occasions, monday());
        let second = resolve_week(&one_bit_per_day(), &occasions, monday());
        assert_eq!(first, second);
    }

    #[test]
    fn exact_date_occasion_overrides_single_day() {
        let target = monday() + Days::new(2);
        let occasions = vec![exact(target, 0)];
        let forecast = resolve_week(&one_bit_per_day(), &occasions, monday());

        assert_eq!(forecast[2].hours, HourMask::CLOSED);
        let template = one_bit_per_day();
        for (i, entry) in forecast.iter().enumerate() {
            if i != 2 {
                assert_eq!(entry.hours, template.weekday_mask(entry.date.weekday()));
            }
        }
    }

    #[test]
    fn occasion_after_window_ignored() {
        let occasions = vec![exact(monday() + Days::new(9), 0)];
        let forecast = resolve_week(&one_bit_per_day(), &occasions, monday());
        assert_eq!(forecast, resolve_week(&one_bit_per_day(), &[], monday()));
    }

    #[test]
    fn occasion_before_window_ignored() {
        let occasions = vec![exact(monday() - Days::new(1), 0)];
        let forecast = resolve_week(&one_bit_per_day(), &occasions, monday());
        assert_eq!(forecast, resolve_week(&one_bit_per_day(), &[], monday()));
    }

    #[test]
    fn yearly_recurring_applies_on_month_day_match() {
        // Sept 3rd in some other year; window contains 2026-09-03 at index 3.
        let occasions = vec![yearly(date(2000, 9, 3), 0)];
        let forecast = resolve_week(&one_bit_per_day(), &occasions, monday());
        assert_eq!(forecast[3].date, date(2026, 9, 3));
        assert_eq!(forecast[3].hours, HourMask::CLOSED);
        for (i, entry) in forecast.iter().enumerate() {
            if i != 3 {
                assert_ne!(entry.hours, HourMask::CLOSED);
            }
        }
    }

    #[test]
    fn yearly_recurring_outside_window_ignored() {
        let occasions = vec![yearly(date(2000, 10, 3), 0)];
        let forecast = resolve_week(&one_bit_per_day(), &occasions, monday());
        assert_eq!(forecast, resolve_week(&one_bit_per_day(), &[], monday()));
    }

    #[test]
    fn yearly_feb29_has_no_occurrence_in_common_year() {
        // 2026 is not a leap year; the occasion simply never materializes.
        let reference = date(2026, 2, 25);
        let occasions = vec![yearly(date(2024, 2, 29), 0)];
        let forecast = resolve_week(&one_bit_per_day(), &occasions, reference);
        assert_eq!(forecast, resolve_week(&one_bit_per_day(), &[], reference));
    }

    #[test]
    fn same_weekday_occasions_resolve_per_date() {
        // Occasion on the window's Monday and another on the following
        // Monday: the second is outside the window and must not bleed into
        // the first Monday's entry (the weekday-clobber defect).
        let occasions = vec![
            exact(monday(), 0b1111),
            exact(monday() + Days::new(7), 0),
        ];
        let forecast = resolve_week(&one_bit_per_day(), &occasions, monday());
        assert_eq!(forecast[0].hours.bits(), 0b1111);
        assert_eq!(forecast[1].hours.bits(), 0b10);
    }

    #[test]
    fn same_date_collision_last_occasion_wins() {
        let target = monday() + Days::new(1);
        let colliding = [
            yearly(date(2000, 9, 1), 0b1),
            exact(target, 0b10),
        ];
        assert_eq!(target, date(2026, 9, 1));

        let forecast = resolve_week(&one_bit_per_day(), &colliding, monday());
        assert_eq!(forecast[1].hours.bits(), 0b10);

        let mut reversed = colliding;
        reversed.reverse();
        let forecast = resolve_week(&one_bit_per_day(), &reversed, monday());
        assert_eq!(forecast[1].hours.bits(), 0b1);
    }

    #[test]
    fn zeroed_template_stays_closed() {
        let forecast = resolve_week(&WeeklyAvailability::closed(), &[], monday());
        assert!(forecast.iter().all(|o| o.hours == HourMask::CLOSED));
    }
}
