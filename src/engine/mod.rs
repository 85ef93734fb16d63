mod error;
pub mod forecast;
pub mod legality;
mod mutations;
mod queries;

pub use error::EngineError;
pub use forecast::{FORECAST_DAYS, resolve_week};
pub use legality::check_slot;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedRestaurantState = Arc<RwLock<RestaurantState>>;

/// The admission serialization unit: one bookable slot of one restaurant on
/// one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub restaurant_id: Ulid,
    pub date: NaiveDate,
    pub slot: u8,
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

#[derive(Debug)]
pub struct Engine {
    pub state: DashMap<Ulid, SharedRestaurantState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: booking id → restaurant id.
    pub(super) booking_to_restaurant: DashMap<Ulid, Ulid>,
    /// Per-slot admission locks: count-then-insert for one key is serialized
    /// here so two concurrent requests can never both win the last seat.
    pub(super) slot_locks: DashMap<SlotKey, Arc<Mutex<()>>>,
}

/// Apply an event directly to a RestaurantState (no locking — caller holds the lock).
fn apply_to_restaurant(rs: &mut RestaurantState, event: &Event, booking_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::TemplateUpdated { restaurant_id, masks } => {
            match WeeklyAvailability::from_masks(masks) {
                Some(template) => rs.availability = template,
                // Mutations build masks from a typed template and replay
                // validates before applying, so this never fires. Discard
                // rather than guess a repair.
                None => tracing::error!("discarding malformed template for {restaurant_id}"),
            }
        }
        Event::OccasionUpserted {
            close_date,
            hour_mask,
            yearly_recurring,
            ..
        } => {
            rs.upsert_occasion(Occasion {
                close_date: *close_date,
                hour_mask: *hour_mask,
                yearly_recurring: *yearly_recurring,
            });
        }
        Event::OccasionDeleted { close_date, .. } => {
            rs.remove_occasion(*close_date);
        }
        Event::BookingAdmitted {
            id,
            restaurant_id,
            date,
            slot,
            party_size,
        } => {
            rs.insert_booking(BookingRecord {
                id: *id,
                date: *date,
                slot: *slot,
                party_size: *party_size,
                cancelled: false,
            });
            booking_map.insert(*id, *restaurant_id);
        }
        Event::BookingCancelled { id, .. } => {
            // Row is kept; only the flag flips. The index entry stays so the
            // cancelled booking remains addressable.
            rs.cancel_booking(*id);
        }
        Event::RestaurantUpdated {
            name,
            max_party_size,
            booking_capacity,
            ..
        } => {
            rs.name = name.clone();
            rs.max_party_size = *max_party_size;
            rs.booking_capacity = *booking_capacity;
        }
        // RestaurantCreated/Deleted are handled at the DashMap level, not here
        Event::RestaurantCreated { .. } | Event::RestaurantDeleted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            booking_to_restaurant: DashMap::new(),
            slot_locks: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::RestaurantCreated {
                    id,
                    account_id,
                    name,
                    max_party_size,
                    booking_capacity,
                } => {
                    let rs = RestaurantState::new(
                        *id,
                        *account_id,
                        name.clone(),
                        *max_party_size,
                        *booking_capacity,
                    );
                    engine.state.insert(*id, Arc::new(RwLock::new(rs)));
                }
                Event::RestaurantDeleted { id } => {
                    engine.purge_restaurant(id);
                }
                Event::TemplateUpdated { restaurant_id, masks } => {
                    // A stored template without exactly seven weekday masks is
                    // a data-integrity error; refuse to start on it.
                    if WeeklyAvailability::from_masks(masks).is_none() {
                        tracing::error!(
                            "WAL replay: template for {restaurant_id} has {} masks, expected 7",
                            masks.len()
                        );
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            EngineError::InvalidTemplate(masks.len()).to_string(),
                        ));
                    }
                    if let Some(entry) = engine.state.get(restaurant_id) {
                        let rs_arc = entry.clone();
                        let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                        apply_to_restaurant(&mut guard, event, &engine.booking_to_restaurant);
                    }
                }
                other => {
                    if let Some(restaurant_id) = event_restaurant_id(other)
                        && let Some(entry) = engine.state.get(&restaurant_id)
                    {
                        let rs_arc = entry.clone();
                        let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                        apply_to_restaurant(&mut guard, other, &engine.booking_to_restaurant);
                    }
                }
            }
        }

        metrics::gauge!(crate::observability::RESTAURANTS_ACTIVE).set(engine.state.len() as f64);
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_restaurant(&self, id: &Ulid) -> Option<SharedRestaurantState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn get_restaurant_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_restaurant.get(booking_id).map(|e| *e.value())
    }

    /// The admission lock for one slot key. Entries are created lazily and
    /// reclaimed after the admission that used them, or when their
    /// restaurant is removed.
    pub(super) fn slot_lock(&self, key: SlotKey) -> Arc<Mutex<()>> {
        self.slot_locks.entry(key).or_default().clone()
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated 3-line pattern.
    pub(super) async fn persist_and_apply(
        &self,
        restaurant_id: Ulid,
        rs: &mut RestaurantState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_restaurant(rs, event, &self.booking_to_restaurant);
        self.notify.send(restaurant_id, event);
        Ok(())
    }

    /// Drop every index entry that points at a removed restaurant.
    pub(super) fn unlink_restaurant(&self, id: &Ulid, bookings: &[BookingRecord]) {
        for booking in bookings {
            self.booking_to_restaurant.remove(&booking.id);
        }
        self.slot_locks.retain(|key, _| key.restaurant_id != *id);
        self.notify.remove(id);
    }

    /// Replay-only removal: during replay we are the sole owner of the Arc,
    /// so the read lock cannot be contended. The runtime delete path instead
    /// holds the restaurant's write guard for the whole delete — a concurrent
    /// mutation may be parked on that lock across its WAL append.
    pub(super) fn purge_restaurant(&self, id: &Ulid) {
        if let Some((_, rs)) = self.state.remove(id) {
            let guard = rs.try_read().expect("replay: uncontended read");
            self.unlink_restaurant(id, &guard.bookings);
        } else {
            self.unlink_restaurant(id, &[]);
        }
    }

    /// Lookup booking → restaurant, get restaurant, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<RestaurantState>), EngineError> {
        let restaurant_id = self
            .get_restaurant_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let rs = self
            .get_restaurant(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let guard = rs.write_owned().await;
        Ok((restaurant_id, guard))
    }
}

/// Extract the restaurant_id from an event (for non-Create/Delete events).
fn event_restaurant_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::TemplateUpdated { restaurant_id, .. }
        | Event::OccasionUpserted { restaurant_id, .. }
        | Event::OccasionDeleted { restaurant_id, .. }
        | Event::BookingAdmitted { restaurant_id, .. }
        | Event::BookingCancelled { restaurant_id, .. } => Some(*restaurant_id),
        Event::RestaurantUpdated { id, .. } => Some(*id),
        Event::RestaurantCreated { .. } | Event::RestaurantDeleted { .. } => None,
    }
}
