use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::forecast::{FORECAST_DAYS, resolve_week};
use super::{Engine, EngineError};

impl Engine {
    /// The customer-facing 7-day forecast, starting today in the system's
    /// local calendar.
    pub async fn forecast(
        &self,
        restaurant_id: Ulid,
    ) -> Result<[OpeningHours; FORECAST_DAYS], EngineError> {
        self.forecast_from(restaurant_id, chrono::Local::now().date_naive())
            .await
    }

    /// Forecast from an explicit reference date — deterministic variant for
    /// callers that already normalized "today".
    pub async fn forecast_from(
        &self,
        restaurant_id: Ulid,
        reference: NaiveDate,
    ) -> Result<[OpeningHours; FORECAST_DAYS], EngineError> {
        let rs = self
            .get_restaurant(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let guard = rs.read().await;
        Ok(resolve_week(&guard.availability, &guard.occasions, reference))
    }

    /// The raw/editable weekly template (the loadTemplate path). Owner-guarded:
    /// only the restaurant's account may read the editable form.
    pub async fn raw_template(
        &self,
        restaurant_id: Ulid,
        owner: Ulid,
    ) -> Result<WeeklyAvailability, EngineError> {
        let rs = self
            .get_restaurant(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let guard = rs.read().await;
        if guard.account_id != owner {
            return Err(EngineError::NotFound(restaurant_id));
        }
        Ok(guard.availability)
    }

    pub async fn list_occasions(&self, restaurant_id: Ulid) -> Result<Vec<Occasion>, EngineError> {
        let rs = self
            .get_restaurant(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let guard = rs.read().await;
        Ok(guard.occasions.clone())
    }

    /// Non-cancelled bookings for one slot key — the countBookings contract.
    /// An out-of-range slot can hold no bookings.
    pub async fn count_bookings(
        &self,
        restaurant_id: Ulid,
        date: NaiveDate,
        slot: i64,
    ) -> Result<u32, EngineError> {
        if slot < 0 || slot >= SLOTS_PER_DAY as i64 {
            return Err(EngineError::InvalidSlot(slot));
        }
        let rs = self
            .get_restaurant(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let guard = rs.read().await;
        Ok(guard.count_active(date, slot as u8))
    }

    pub async fn get_booking(&self, booking_id: Ulid) -> Result<BookingInfo, EngineError> {
        let restaurant_id = self
            .get_restaurant_for_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let rs = self
            .get_restaurant(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let guard = rs.read().await;
        guard
            .bookings
            .iter()
            .find(|b| b.id == booking_id)
            .map(|b| BookingInfo {
                id: b.id,
                restaurant_id,
                date: b.date,
                slot: b.slot,
                party_size: b.party_size,
                cancelled: b.cancelled,
            })
            .ok_or(EngineError::NotFound(booking_id))
    }

    pub async fn list_bookings(&self, restaurant_id: Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        let rs = self
            .get_restaurant(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let guard = rs.read().await;
        Ok(guard
            .bookings
            .iter()
            .map(|b| BookingInfo {
                id: b.id,
                restaurant_id,
                date: b.date,
                slot: b.slot,
                party_size: b.party_size,
                cancelled: b.cancelled,
            })
            .collect())
    }

    pub fn list_restaurants(&self) -> Vec<RestaurantInfo> {
        self.state
            .iter()
            .map(|entry| {
                let rs = entry.value().clone();
                let guard = rs.try_read().expect("list_restaurants: uncontended read");
                RestaurantInfo {
                    id: guard.id,
                    account_id: guard.account_id,
                    name: guard.name.clone(),
                    max_party_size: guard.max_party_size,
                    booking_capacity: guard.booking_capacity,
                }
            })
            .collect()
    }
}
