//! Hard caps guarding against resource exhaustion. Exceeding any of these
//! yields `EngineError::LimitExceeded`, never a panic.

use chrono::NaiveDate;

pub const MAX_RESTAURANTS: usize = 10_000;

pub const MAX_NAME_LEN: usize = 256;

pub const MAX_OCCASIONS_PER_RESTAURANT: usize = 4_096;

pub const MAX_BOOKINGS_PER_RESTAURANT: usize = 1_048_576;

/// Upper bound for a restaurant's configured per-slot capacity.
pub const MAX_BOOKING_CAPACITY: u32 = 10_000;

/// Upper bound for a restaurant's configured max party size.
pub const MAX_PARTY_SIZE_LIMIT: u32 = 10_000;

/// Accepted calendar range for booking and occasion dates.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2200;

pub fn date_in_valid_range(date: NaiveDate) -> bool {
    use chrono::Datelike;
    (MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(&date.year())
}
