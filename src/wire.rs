//! Serde DTOs for the external data shapes: the 7-day forecast, the
//! raw/editable weekly template, and booking/occasion requests.
//!
//! Dates cross the wire as epoch milliseconds of the calendar date's UTC
//! midnight; internally everything is a plain `NaiveDate`.

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::{HourMask, OpeningHours, WeeklyAvailability};

/// Epoch milliseconds of this date's UTC midnight.
pub fn date_to_millis(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Inverse of [`date_to_millis`]. Any time-of-day component in `millis` is
/// truncated to the containing UTC date. None for out-of-range timestamps.
pub fn millis_to_date(millis: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}

/// One day of the customer-facing forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub date: i64,
    #[serde(rename = "hoursMask")]
    pub hours_mask: u64,
}

impl From<OpeningHours> for ForecastEntry {
    fn from(oh: OpeningHours) -> Self {
        Self {
            date: date_to_millis(oh.date),
            hours_mask: oh.hours.bits(),
        }
    }
}

/// The owner-editable weekly template, one named mask per weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTemplate {
    pub id: Ulid,
    pub monday_hour_mask: u64,
    pub tuesday_hour_mask: u64,
    pub wednesday_hour_mask: u64,
    pub thursday_hour_mask: u64,
    pub friday_hour_mask: u64,
    pub saturday_hour_mask: u64,
    pub sunday_hour_mask: u64,
}

impl RawTemplate {
    pub fn new(id: Ulid, template: &WeeklyAvailability) -> Self {
        let [mon, tue, wed, thu, fri, sat, sun] = template.mask_bits();
        Self {
            id,
            monday_hour_mask: mon,
            tuesday_hour_mask: tue,
            wednesday_hour_mask: wed,
            thursday_hour_mask: thu,
            friday_hour_mask: fri,
            saturday_hour_mask: sat,
            sunday_hour_mask: sun,
        }
    }

    pub fn into_template(self) -> WeeklyAvailability {
        let masks = [
            self.monday_hour_mask,
            self.tuesday_hour_mask,
            self.wednesday_hour_mask,
            self.thursday_hour_mask,
            self.friday_hour_mask,
            self.saturday_hour_mask,
            self.sunday_hour_mask,
        ];
        // Length is seven by construction.
        WeeklyAvailability::from_masks(&masks).expect("seven weekday masks")
    }
}

/// An incoming booking admission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub restaurant_id: Ulid,
    /// Epoch milliseconds of the requested calendar date.
    pub booking_date: i64,
    /// Slot index; deliberately wide so out-of-range values reach the
    /// legality checker instead of failing deserialization.
    pub time_slot: i64,
    pub party_size: u32,
}

impl BookingRequest {
    pub fn date(&self) -> Option<NaiveDate> {
        millis_to_date(self.booking_date)
    }
}

/// An occasion upsert request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccasionRequest {
    pub restaurant: Ulid,
    /// Epoch milliseconds of the close date.
    pub date: i64,
    #[serde(rename = "hourMask")]
    pub hour_mask: u64,
    #[serde(rename = "yearlyRecurring")]
    pub yearly_recurring: bool,
}

impl OccasionRequest {
    pub fn close_date(&self) -> Option<NaiveDate> {
        millis_to_date(self.date)
    }

    pub fn mask(&self) -> HourMask {
        HourMask::new(self.hour_mask)
    }
}
