use chrono::{Datelike, NaiveDate};

use crate::model::*;

use super::EngineError;

// ── Slot Legality ─────────────────────────────────────────────────

/// Decide whether `slot` on `date` is open for booking. Rules in order,
/// first failure wins:
///
/// 1. Slot index outside `0..64` → `InvalidSlot`.
/// 2. Template bit for the date's weekday clear → `SlotClosed`.
/// 3. Any occasion matching the date (exact, or yearly on month/day) with
///    the bit clear → `SlotClosed`. Occasions only narrow availability —
///    they never re-open a slot the weekly template excludes.
///
/// Re-derived at admission time from template + occasions rather than a
/// stored forecast, so a stale forecast can never admit a closed slot.
pub fn check_slot(
    template: &WeeklyAvailability,
    occasions: &[Occasion],
    date: NaiveDate,
    slot: i64,
) -> Result<(), EngineError> {
    if slot < 0 || slot >= SLOTS_PER_DAY as i64 {
        return Err(EngineError::InvalidSlot(slot));
    }
    let slot = slot as u8;

    if !template.weekday_mask(date.weekday()).is_open(slot) {
        return Err(EngineError::SlotClosed { date, slot });
    }

    for occasion in occasions.iter().filter(|o| o.applies_to(date)) {
        if !occasion.hour_mask.is_open(slot) {
            return Err(EngineError::SlotClosed { date, slot });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Template with every slot open every day.
    fn always_open() -> WeeklyAvailability {
        WeeklyAvailability::from_masks(&[u64::MAX; 7]).unwrap()
    }

    #[test]
    fn slot_below_range_invalid_regardless_of_mask() {
        let result = check_slot(&always_open(), &[], date(2026, 8, 31), -1);
        assert_eq!(result, Err(EngineError::InvalidSlot(-1)));

        let result = check_slot(&always_open(), &[], date(2026, 8, 31), i64::MIN);
        assert_eq!(result, Err(EngineError::InvalidSlot(i64::MIN)));
    }

    #[test]
    fn slot_at_mask_width_invalid_regardless_of_mask() {
        let result = check_slot(&always_open(), &[], date(2026, 8, 31), 64);
        assert_eq!(result, Err(EngineError::InvalidSlot(64)));

        let result = check_slot(&always_open(), &[], date(2026, 8, 31), i64::MAX);
        assert_eq!(result, Err(EngineError::InvalidSlot(i64::MAX)));
    }

    #[test]
    fn open_slot_is_legal() {
        assert_eq!(check_slot(&always_open(), &[], date(2026, 8, 31), 0), Ok(()));
        assert_eq!(check_slot(&always_open(), &[], date(2026, 8, 31), 63), Ok(()));
    }

    #[test]
    fn template_closed_slot_rejected() {
        // Monday open at slot 5 only.
        let mut template = WeeklyAvailability::closed();
        template.set_weekday_mask(Weekday::Mon, HourMask::CLOSED.with_slot(5));
        let mon = date(2026, 8, 31);
        assert_eq!(mon.weekday(), Weekday::Mon);

        assert_eq!(check_slot(&template, &[], mon, 5), Ok(()));
        assert_eq!(
            check_slot(&template, &[], mon, 6),
            Err(EngineError::SlotClosed { date: mon, slot: 6 })
        );
        // Tuesday entirely closed.
        let tue = date(2026, 9, 1);
        assert_eq!(
            check_slot(&template, &[], tue, 5),
            Err(EngineError::SlotClosed { date: tue, slot: 5 })
        );
    }

    #[test]
    fn matching_occasion_closes_open_slot() {
        let d = date(2026, 8, 31);
        let occasions = vec![Occasion {
            close_date: d,
            hour_mask: HourMask::new(u64::MAX).without_slot(7),
            yearly_recurring: false,
        }];
        assert_eq!(
            check_slot(&always_open(), &occasions, d, 7),
            Err(EngineError::SlotClosed { date: d, slot: 7 })
        );
        // Other slots unaffected.
        assert_eq!(check_slot(&always_open(), &occasions, d, 8), Ok(()));
        // Other dates unaffected.
        assert_eq!(check_slot(&always_open(), &occasions, date(2026, 9, 1), 7), Ok(()));
    }

    #[test]
    fn full_day_closure_occasion() {
        let d = date(2026, 12, 25);
        let occasions = vec![Occasion {
            close_date: d,
            hour_mask: HourMask::CLOSED,
            yearly_recurring: false,
        }];
        for slot in [0, 17, 63] {
            assert_eq!(
                check_slot(&always_open(), &occasions, d, slot),
                Err(EngineError::SlotClosed { date: d, slot: slot as u8 })
            );
        }
    }

    #[test]
    fn yearly_occasion_closes_on_month_day_match() {
        let occasions = vec![Occasion {
            close_date: date(2019, 12, 25),
            hour_mask: HourMask::CLOSED,
            yearly_recurring: true,
        }];
        let d = date(2026, 12, 25);
        assert_eq!(
            check_slot(&always_open(), &occasions, d, 10),
            Err(EngineError::SlotClosed { date: d, slot: 10 })
        );
        assert_eq!(check_slot(&always_open(), &occasions, date(2026, 12, 24), 10), Ok(()));
    }

    #[test]
    fn occasion_never_widens_template() {
        // Template closed at slot 3, occasion has it open — still closed.
        let mut template = always_open();
        let mon = date(2026, 8, 31);
        template.set_weekday_mask(Weekday::Mon, HourMask::new(u64::MAX).without_slot(3));
        let occasions = vec![Occasion {
            close_date: mon,
            hour_mask: HourMask::new(u64::MAX),
            yearly_recurring: false,
        }];
        assert_eq!(
            check_slot(&template, &occasions, mon, 3),
            Err(EngineError::SlotClosed { date: mon, slot: 3 })
        );
    }

    #[test]
    fn non_matching_occasion_ignored() {
        let occasions = vec![Occasion {
            close_date: date(2026, 9, 15),
            hour_mask: HourMask::CLOSED,
            yearly_recurring: false,
        }];
        assert_eq!(check_slot(&always_open(), &occasions, date(2026, 9, 14), 12), Ok(()));
    }
}
