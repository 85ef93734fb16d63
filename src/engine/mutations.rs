use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::legality::check_slot;
use super::{Engine, EngineError, SlotKey, WalCommand};

/// Owner-guarded operations compare the caller's pre-validated account
/// principal; a mismatch is indistinguishable from a missing restaurant.
fn check_owner(rs: &RestaurantState, owner: Ulid) -> Result<(), EngineError> {
    if rs.account_id != owner {
        return Err(EngineError::NotFound(rs.id));
    }
    Ok(())
}

impl Engine {
    pub async fn create_restaurant(
        &self,
        id: Ulid,
        account_id: Ulid,
        name: String,
        max_party_size: u32,
        booking_capacity: u32,
    ) -> Result<(), EngineError> {
        if self.state.len() >= MAX_RESTAURANTS {
            return Err(EngineError::LimitExceeded("too many restaurants"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("restaurant name too long"));
        }
        if max_party_size > MAX_PARTY_SIZE_LIMIT {
            return Err(EngineError::LimitExceeded("max party size too large"));
        }
        if booking_capacity > MAX_BOOKING_CAPACITY {
            return Err(EngineError::LimitExceeded("booking capacity too large"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::RestaurantCreated {
            id,
            account_id,
            name: name.clone(),
            max_party_size,
            booking_capacity,
        };
        self.wal_append(&event).await?;
        // Template starts zeroed: a new restaurant is closed until its owner
        // publishes opening hours.
        let rs = RestaurantState::new(id, account_id, name, max_party_size, booking_capacity);
        self.state.insert(id, Arc::new(RwLock::new(rs)));
        metrics::gauge!(observability::RESTAURANTS_ACTIVE).set(self.state.len() as f64);
        self.notify.send(id, &event);
        Ok(())
    }

    pub async fn update_restaurant(
        &self,
        id: Ulid,
        owner: Ulid,
        name: String,
        max_party_size: u32,
        booking_capacity: u32,
    ) -> Result<(), EngineError> {
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("restaurant name too long"));
        }
        if max_party_size > MAX_PARTY_SIZE_LIMIT {
            return Err(EngineError::LimitExceeded("max party size too large"));
        }
        if booking_capacity > MAX_BOOKING_CAPACITY {
            return Err(EngineError::LimitExceeded("booking capacity too large"));
        }
        let rs = self.get_restaurant(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        check_owner(&guard, owner)?;

        let event = Event::RestaurantUpdated {
            id,
            name,
            max_party_size,
            booking_capacity,
        };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    pub async fn delete_restaurant(&self, id: Ulid, owner: Ulid) -> Result<(), EngineError> {
        let rs = self.get_restaurant(&id).ok_or(EngineError::NotFound(id))?;
        // Hold the write guard for the whole delete: mutations parked on
        // this lock resume only after the removal, and the booking index is
        // read from the same guard instead of a second lock acquisition.
        let guard = rs.write().await;
        check_owner(&guard, owner)?;

        let event = Event::RestaurantDeleted { id };
        self.wal_append(&event).await?;
        self.state.remove(&id);
        self.unlink_restaurant(&id, &guard.bookings);
        metrics::gauge!(observability::RESTAURANTS_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }

    /// Replace the full weekly template (the saveTemplate path — owners edit
    /// all seven masks at once through the raw form).
    pub async fn update_template(
        &self,
        restaurant_id: Ulid,
        owner: Ulid,
        template: WeeklyAvailability,
    ) -> Result<(), EngineError> {
        let rs = self
            .get_restaurant(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let mut guard = rs.write().await;
        check_owner(&guard, owner)?;

        let event = Event::TemplateUpdated {
            restaurant_id,
            masks: template.mask_bits().to_vec(),
        };
        self.persist_and_apply(restaurant_id, &mut guard, &event).await
    }

    /// Insert-or-replace the occasion for `close_date`. At most one occasion
    /// exists per (restaurant, date).
    pub async fn upsert_occasion(
        &self,
        restaurant_id: Ulid,
        owner: Ulid,
        close_date: NaiveDate,
        hour_mask: HourMask,
        yearly_recurring: bool,
    ) -> Result<(), EngineError> {
        if !date_in_valid_range(close_date) {
            return Err(EngineError::LimitExceeded("occasion date out of range"));
        }
        let rs = self
            .get_restaurant(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let mut guard = rs.write().await;
        check_owner(&guard, owner)?;

        let replacing = guard
            .occasions
            .binary_search_by_key(&close_date, |o| o.close_date)
            .is_ok();
        if !replacing && guard.occasions.len() >= MAX_OCCASIONS_PER_RESTAURANT {
            return Err(EngineError::LimitExceeded("too many occasions on restaurant"));
        }

        let event = Event::OccasionUpserted {
            restaurant_id,
            close_date,
            hour_mask,
            yearly_recurring,
        };
        self.persist_and_apply(restaurant_id, &mut guard, &event).await
    }

    pub async fn delete_occasion(
        &self,
        restaurant_id: Ulid,
        owner: Ulid,
        close_date: NaiveDate,
    ) -> Result<(), EngineError> {
        let rs = self
            .get_restaurant(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let mut guard = rs.write().await;
        check_owner(&guard, owner)?;

        if guard
            .occasions
            .binary_search_by_key(&close_date, |o| o.close_date)
            .is_err()
        {
            return Err(EngineError::OccasionNotFound(close_date));
        }

        let event = Event::OccasionDeleted {
            restaurant_id,
            close_date,
        };
        self.persist_and_apply(restaurant_id, &mut guard, &event).await
    }

    /// Admit a booking, or reject it with the first failing precondition:
    /// party size, then slot legality, then per-slot capacity.
    ///
    /// The capacity check and the insert run under the slot key's admission
    /// mutex — concurrent requests for the same (restaurant, date, slot)
    /// serialize there, so a full slot rejects exactly the attempts beyond
    /// capacity. Unrelated slots are not serialized against each other.
    pub async fn admit_booking(
        &self,
        id: Ulid,
        restaurant_id: Ulid,
        date: NaiveDate,
        slot: i64,
        party_size: u32,
    ) -> Result<(), EngineError> {
        let result = self
            .admit_booking_inner(id, restaurant_id, date, slot, party_size)
            .await;
        metrics::counter!(
            observability::ADMISSIONS_TOTAL,
            "outcome" => observability::admission_outcome(&result)
        )
        .increment(1);
        result
    }

    async fn admit_booking_inner(
        &self,
        id: Ulid,
        restaurant_id: Ulid,
        date: NaiveDate,
        slot: i64,
        party_size: u32,
    ) -> Result<(), EngineError> {
        if !date_in_valid_range(date) {
            return Err(EngineError::LimitExceeded("booking date out of range"));
        }
        if self.booking_to_restaurant.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let rs = self
            .get_restaurant(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;

        {
            let guard = rs.read().await;
            if party_size == 0 || party_size > guard.max_party_size {
                return Err(EngineError::PartySizeRejected {
                    given: party_size,
                    max: guard.max_party_size,
                });
            }
            check_slot(&guard.availability, &guard.occasions, date, slot)?;
            if guard.bookings.len() >= MAX_BOOKINGS_PER_RESTAURANT {
                return Err(EngineError::LimitExceeded("too many bookings on restaurant"));
            }
        }

        // check_slot proved 0 <= slot < 64.
        let slot = slot as u8;
        let key = SlotKey {
            restaurant_id,
            date,
            slot,
        };

        // Serialization point: no other admission for this key may run
        // between the count and the insert.
        let admission_lock = self.slot_lock(key);
        let result = {
            let _serialized = admission_lock.lock().await;
            let mut guard = rs.write().await;
            // Re-check under the write guard: an occasion upserted since the
            // read phase may have closed the slot in the meantime.
            if let Err(e) = check_slot(&guard.availability, &guard.occasions, date, slot as i64) {
                Err(e)
            } else if guard.count_active(date, slot) >= guard.booking_capacity {
                Err(EngineError::CapacityExceeded(guard.booking_capacity))
            } else {
                let event = Event::BookingAdmitted {
                    id,
                    restaurant_id,
                    date,
                    slot,
                    party_size,
                };
                self.persist_and_apply(restaurant_id, &mut guard, &event).await
            }
        };
        drop(admission_lock);
        // Reclaim the entry once no other admission holds or waits on this
        // key, so the table does not grow with every (date, slot) ever tried.
        self.slot_locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Mark a booking cancelled. The record stays; it no longer counts
    /// against slot capacity.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (restaurant_id, mut guard) = self.resolve_booking_write(&id).await?;
        let active = guard.bookings.iter().any(|b| b.id == id && !b.cancelled);
        if !active {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::BookingCancelled { id, restaurant_id };
        self.persist_and_apply(restaurant_id, &mut guard, &event).await?;
        Ok(restaurant_id)
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let restaurant_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in restaurant_ids {
            let entry = match self.state.get(&id) {
                Some(e) => e,
                None => continue,
            };
            let rs = entry.value().clone();
            let guard = rs.try_read().expect("compact: uncontended read");

            events.push(Event::RestaurantCreated {
                id: guard.id,
                account_id: guard.account_id,
                name: guard.name.clone(),
                max_party_size: guard.max_party_size,
                booking_capacity: guard.booking_capacity,
            });
            events.push(Event::TemplateUpdated {
                restaurant_id: guard.id,
                masks: guard.availability.mask_bits().to_vec(),
            });
            for occasion in &guard.occasions {
                events.push(Event::OccasionUpserted {
                    restaurant_id: guard.id,
                    close_date: occasion.close_date,
                    hour_mask: occasion.hour_mask,
                    yearly_recurring: occasion.yearly_recurring,
                });
            }
            for booking in &guard.bookings {
                events.push(Event::BookingAdmitted {
                    id: booking.id,
                    restaurant_id: guard.id,
                    date: booking.date,
                    slot: booking.slot,
                    party_size: booking.party_size,
                });
                if booking.cancelled {
                    events.push(Event::BookingCancelled {
                        id: booking.id,
                        restaurant_id: guard.id,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
