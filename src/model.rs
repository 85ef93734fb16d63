use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Number of bookable slots per day — one bit each in an [`HourMask`].
/// A slot is a fixed 30-minute unit; bit 0 is the first slot of the day.
pub const SLOTS_PER_DAY: u8 = 64;

/// Per-day availability as a 64-bit mask. Bit `i` set means slot `i` is
/// open for booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HourMask(u64);

impl HourMask {
    /// All slots closed.
    pub const CLOSED: HourMask = HourMask(0);

    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_open(self, slot: u8) -> bool {
        slot < SLOTS_PER_DAY && (self.0 >> slot) & 1 == 1
    }

    pub const fn with_slot(self, slot: u8) -> Self {
        Self(self.0 | (1 << slot))
    }

    pub const fn without_slot(self, slot: u8) -> Self {
        Self(self.0 & !(1 << slot))
    }
}

/// Index into the Monday-first weekday arrays used throughout the engine.
pub const fn weekday_index(weekday: Weekday) -> usize {
    weekday.num_days_from_monday() as usize
}

/// The recurring weekly template: exactly one mask per weekday,
/// Monday..Sunday. Created zeroed alongside its restaurant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyAvailability {
    masks: [HourMask; 7],
}

impl WeeklyAvailability {
    /// All seven days fully closed — the state of a freshly created restaurant.
    pub const fn closed() -> Self {
        Self {
            masks: [HourMask::CLOSED; 7],
        }
    }

    pub const fn new(masks: [HourMask; 7]) -> Self {
        Self { masks }
    }

    /// Build from raw mask bits. `None` unless exactly seven entries are
    /// given — the caller surfaces that as an `InvalidTemplate` error.
    pub fn from_masks(bits: &[u64]) -> Option<Self> {
        let bits: [u64; 7] = bits.try_into().ok()?;
        Some(Self {
            masks: bits.map(HourMask::new),
        })
    }

    pub fn weekday_mask(&self, weekday: Weekday) -> HourMask {
        self.masks[weekday_index(weekday)]
    }

    pub fn set_weekday_mask(&mut self, weekday: Weekday, mask: HourMask) {
        self.masks[weekday_index(weekday)] = mask;
    }

    /// Raw bits in Monday..Sunday order — the WAL/wire representation.
    pub fn mask_bits(&self) -> [u64; 7] {
        self.masks.map(HourMask::bits)
    }
}

/// A date-specific override of one day's mask. Non-recurring occasions match
/// their `close_date` exactly; yearly-recurring ones match month and
/// day-of-month in any year. Occasions only narrow availability relative to
/// the weekly template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occasion {
    pub close_date: NaiveDate,
    pub hour_mask: HourMask,
    pub yearly_recurring: bool,
}

impl Occasion {
    /// Whether this occasion overrides the given calendar date.
    pub fn applies_to(&self, date: NaiveDate) -> bool {
        if self.yearly_recurring {
            self.close_date.month() == date.month() && self.close_date.day() == date.day()
        } else {
            self.close_date == date
        }
    }
}

/// One admitted booking. Cancellation flips `cancelled` rather than removing
/// the record; capacity counts only non-cancelled records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: Ulid,
    pub date: NaiveDate,
    pub slot: u8,
    pub party_size: u32,
    pub cancelled: bool,
}

/// A resolved (date, mask) pair — produced by the forecast, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpeningHours {
    pub date: NaiveDate,
    pub hours: HourMask,
}

#[derive(Debug, Clone)]
pub struct RestaurantState {
    pub id: Ulid,
    /// Pre-validated owner principal; owner-guarded operations compare it.
    pub account_id: Ulid,
    pub name: String,
    pub max_party_size: u32,
    /// Max non-cancelled bookings per (date, slot).
    pub booking_capacity: u32,
    pub availability: WeeklyAvailability,
    /// Sorted by `close_date`; at most one occasion per date.
    pub occasions: Vec<Occasion>,
    /// Sorted by `(date, slot)`.
    pub bookings: Vec<BookingRecord>,
}

impl RestaurantState {
    pub fn new(
        id: Ulid,
        account_id: Ulid,
        name: String,
        max_party_size: u32,
        booking_capacity: u32,
    ) -> Self {
        Self {
            id,
            account_id,
            name,
            max_party_size,
            booking_capacity,
            availability: WeeklyAvailability::closed(),
            occasions: Vec::new(),
            bookings: Vec::new(),
        }
    }

    /// Insert-or-replace keyed by `close_date`. Returns the replaced occasion.
    pub fn upsert_occasion(&mut self, occasion: Occasion) -> Option<Occasion> {
        match self
            .occasions
            .binary_search_by_key(&occasion.close_date, |o| o.close_date)
        {
            Ok(pos) => Some(std::mem::replace(&mut self.occasions[pos], occasion)),
            Err(pos) => {
                self.occasions.insert(pos, occasion);
                None
            }
        }
    }

    pub fn remove_occasion(&mut self, close_date: NaiveDate) -> Option<Occasion> {
        match self
            .occasions
            .binary_search_by_key(&close_date, |o| o.close_date)
        {
            Ok(pos) => Some(self.occasions.remove(pos)),
            Err(_) => None,
        }
    }

    /// Insert a booking maintaining sort order by `(date, slot)`.
    pub fn insert_booking(&mut self, booking: BookingRecord) {
        let pos = self
            .bookings
            .partition_point(|b| (b.date, b.slot) <= (booking.date, booking.slot));
        self.bookings.insert(pos, booking);
    }

    /// All bookings (cancelled included) for one slot key.
    pub fn bookings_for_slot(&self, date: NaiveDate, slot: u8) -> &[BookingRecord] {
        let lo = self.bookings.partition_point(|b| (b.date, b.slot) < (date, slot));
        let hi = self.bookings.partition_point(|b| (b.date, b.slot) <= (date, slot));
        &self.bookings[lo..hi]
    }

    /// Non-cancelled bookings for one slot key — what capacity is checked against.
    pub fn count_active(&self, date: NaiveDate, slot: u8) -> u32 {
        self.bookings_for_slot(date, slot)
            .iter()
            .filter(|b| !b.cancelled)
            .count() as u32
    }

    /// Mark a booking cancelled. Returns false if unknown or already cancelled.
    pub fn cancel_booking(&mut self, id: Ulid) -> bool {
        match self.bookings.iter_mut().find(|b| b.id == id) {
            Some(b) if !b.cancelled => {
                b.cancelled = true;
                true
            }
            _ => false,
        }
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RestaurantCreated {
        id: Ulid,
        account_id: Ulid,
        name: String,
        max_party_size: u32,
        booking_capacity: u32,
    },
    RestaurantUpdated {
        id: Ulid,
        name: String,
        max_party_size: u32,
        booking_capacity: u32,
    },
    RestaurantDeleted {
        id: Ulid,
    },
    /// Seven mask bits, Monday..Sunday. Replay rebuilds the typed template
    /// through `WeeklyAvailability::from_masks`, so a malformed stored
    /// template is a fatal data-integrity error, not a silent repair.
    TemplateUpdated {
        restaurant_id: Ulid,
        masks: Vec<u64>,
    },
    OccasionUpserted {
        restaurant_id: Ulid,
        close_date: NaiveDate,
        hour_mask: HourMask,
        yearly_recurring: bool,
    },
    OccasionDeleted {
        restaurant_id: Ulid,
        close_date: NaiveDate,
    },
    BookingAdmitted {
        id: Ulid,
        restaurant_id: Ulid,
        date: NaiveDate,
        slot: u8,
        party_size: u32,
    },
    BookingCancelled {
        id: Ulid,
        restaurant_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestaurantInfo {
    pub id: Ulid,
    pub account_id: Ulid,
    pub name: String,
    pub max_party_size: u32,
    pub booking_capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub restaurant_id: Ulid,
    pub date: NaiveDate,
    pub slot: u8,
    pub party_size: u32,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn booking(date: NaiveDate, slot: u8) -> BookingRecord {
        BookingRecord {
            id: Ulid::new(),
            date,
            slot,
            party_size: 2,
            cancelled: false,
        }
    }

    #[test]
    fn mask_bit_helpers() {
        let mask = HourMask::CLOSED.with_slot(0).with_slot(17).with_slot(63);
        assert!(mask.is_open(0));
        assert!(mask.is_open(17));
        assert!(mask.is_open(63));
        assert!(!mask.is_open(1));
        assert_eq!(mask.without_slot(17), HourMask::CLOSED.with_slot(0).with_slot(63));
    }

    #[test]
    fn mask_out_of_range_slot_is_closed() {
        assert!(!HourMask::new(u64::MAX).is_open(64));
        assert!(!HourMask::new(u64::MAX).is_open(200));
    }

    #[test]
    fn weekday_mask_lookup() {
        // One distinct bit per weekday so a wrong index is visible.
        let avail = WeeklyAvailability::from_masks(&[
            0b1, 0b10, 0b100, 0b1000, 0b10000, 0b100000, 0b1000000,
        ])
        .unwrap();
        assert_eq!(avail.weekday_mask(Weekday::Mon).bits(), 0b1);
        assert_eq!(avail.weekday_mask(Weekday::Tue).bits(), 0b10);
        assert_eq!(avail.weekday_mask(Weekday::Wed).bits(), 0b100);
        assert_eq!(avail.weekday_mask(Weekday::Thu).bits(), 0b1000);
        assert_eq!(avail.weekday_mask(Weekday::Fri).bits(), 0b10000);
        assert_eq!(avail.weekday_mask(Weekday::Sat).bits(), 0b100000);
        assert_eq!(avail.weekday_mask(Weekday::Sun).bits(), 0b1000000);
    }

    #[test]
    fn from_masks_rejects_wrong_length() {
        assert!(WeeklyAvailability::from_masks(&[0; 6]).is_none());
        assert!(WeeklyAvailability::from_masks(&[0; 8]).is_none());
        assert!(WeeklyAvailability::from_masks(&[]).is_none());
        assert!(WeeklyAvailability::from_masks(&[0; 7]).is_some());
    }

    #[test]
    fn set_weekday_mask_roundtrip() {
        let mut avail = WeeklyAvailability::closed();
        avail.set_weekday_mask(Weekday::Fri, HourMask::new(0xFF));
        assert_eq!(avail.weekday_mask(Weekday::Fri).bits(), 0xFF);
        assert_eq!(avail.weekday_mask(Weekday::Thu), HourMask::CLOSED);
        assert_eq!(avail.mask_bits(), [0, 0, 0, 0, 0xFF, 0, 0]);
    }

    #[test]
    fn occasion_exact_date_match() {
        let o = Occasion {
            close_date: date(2026, 12, 25),
            hour_mask: HourMask::CLOSED,
            yearly_recurring: false,
        };
        assert!(o.applies_to(date(2026, 12, 25)));
        assert!(!o.applies_to(date(2025, 12, 25)));
        assert!(!o.applies_to(date(2026, 12, 26)));
    }

    #[test]
    fn occasion_yearly_matches_any_year() {
        let o = Occasion {
            close_date: date(2020, 12, 25),
            hour_mask: HourMask::CLOSED,
            yearly_recurring: true,
        };
        assert!(o.applies_to(date(2026, 12, 25)));
        assert!(o.applies_to(date(2031, 12, 25)));
        assert!(!o.applies_to(date(2026, 11, 25)));
        assert!(!o.applies_to(date(2026, 12, 24)));
    }

    #[test]
    fn upsert_occasion_replaces_same_date() {
        let mut rs = RestaurantState::new(Ulid::new(), Ulid::new(), "Test".into(), 8, 4);
        let first = Occasion {
            close_date: date(2026, 9, 1),
            hour_mask: HourMask::new(0b11),
            yearly_recurring: false,
        };
        assert!(rs.upsert_occasion(first).is_none());

        let second = Occasion {
            close_date: date(2026, 9, 1),
            hour_mask: HourMask::CLOSED,
            yearly_recurring: true,
        };
        assert_eq!(rs.upsert_occasion(second), Some(first));
        assert_eq!(rs.occasions.len(), 1);
        assert_eq!(rs.occasions[0], second);
    }

    #[test]
    fn occasions_stay_sorted() {
        let mut rs = RestaurantState::new(Ulid::new(), Ulid::new(), "Test".into(), 8, 4);
        for day in [20, 5, 12] {
            rs.upsert_occasion(Occasion {
                close_date: date(2026, 9, day),
                hour_mask: HourMask::CLOSED,
                yearly_recurring: false,
            });
        }
        let days: Vec<u32> = rs.occasions.iter().map(|o| o.close_date.day()).collect();
        assert_eq!(days, vec![5, 12, 20]);

        assert!(rs.remove_occasion(date(2026, 9, 12)).is_some());
        assert!(rs.remove_occasion(date(2026, 9, 12)).is_none());
        assert_eq!(rs.occasions.len(), 2);
    }

    #[test]
    fn bookings_sorted_and_counted_per_slot() {
        let mut rs = RestaurantState::new(Ulid::new(), Ulid::new(), "Test".into(), 8, 4);
        let d1 = date(2026, 9, 1);
        let d2 = date(2026, 9, 2);
        rs.insert_booking(booking(d2, 3));
        rs.insert_booking(booking(d1, 5));
        rs.insert_booking(booking(d1, 5));
        rs.insert_booking(booking(d1, 2));

        let keys: Vec<(NaiveDate, u8)> = rs.bookings.iter().map(|b| (b.date, b.slot)).collect();
        assert_eq!(keys, vec![(d1, 2), (d1, 5), (d1, 5), (d2, 3)]);

        assert_eq!(rs.count_active(d1, 5), 2);
        assert_eq!(rs.count_active(d1, 2), 1);
        assert_eq!(rs.count_active(d2, 3), 1);
        assert_eq!(rs.count_active(d2, 5), 0);
    }

    #[test]
    fn cancelled_bookings_not_counted() {
        let mut rs = RestaurantState::new(Ulid::new(), Ulid::new(), "Test".into(), 8, 4);
        let d = date(2026, 9, 1);
        let b = booking(d, 4);
        rs.insert_booking(b);
        rs.insert_booking(booking(d, 4));

        assert_eq!(rs.count_active(d, 4), 2);
        assert!(rs.cancel_booking(b.id));
        assert_eq!(rs.count_active(d, 4), 1);
        assert_eq!(rs.bookings_for_slot(d, 4).len(), 2); // row kept

        // Double-cancel and unknown id are no-ops
        assert!(!rs.cancel_booking(b.id));
        assert!(!rs.cancel_booking(Ulid::new()));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingAdmitted {
            id: Ulid::new(),
            restaurant_id: Ulid::new(),
            date: date(2026, 8, 30),
            slot: 21,
            party_size: 4,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn occasion_event_roundtrip() {
        let event = Event::OccasionUpserted {
            restaurant_id: Ulid::new(),
            close_date: date(2026, 12, 25),
            hour_mask: HourMask::new(0b1010),
            yearly_recurring: true,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
