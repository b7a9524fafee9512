use rust_decimal::Decimal;
use tokio::sync::{OwnedRwLockWriteGuard, oneshot};
use tracing::{debug, error, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, validate_stay};
use super::pricing::compute_total;
use super::{Engine, EngineError, WalCommand, apply_to_ledger};

type LedgerGuard = OwnedRwLockWriteGuard<RoomLedger>;

/// Trim a walk-in label; blank means absent.
fn normalize_label(label: Option<&str>) -> Result<Option<String>, EngineError> {
    let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) else {
        return Ok(None);
    };
    if label.chars().count() > MAX_CUSTOM_NAME_LEN {
        return Err(EngineError::LimitExceeded("custom name too long"));
    }
    Ok(Some(label.to_string()))
}

/// Validate a request and derive its stay and total.
fn prepare(request: &BookingRequest) -> Result<(Stay, Option<String>, Decimal), EngineError> {
    let custom_name = normalize_label(request.custom_name.as_deref())?;
    if request.guest_id.is_none() && custom_name.is_none() {
        return Err(EngineError::validation("either guest_id or custom_name is required"));
    }
    let stay = Stay::new(request.room_id, request.start_at, request.end_at)?;
    validate_stay(&stay)?;
    let total = compute_total(&stay, request.nightly_rate)?;
    Ok((stay, custom_name, total))
}

fn ensure_capacity(ledger: &RoomLedger) -> Result<(), EngineError> {
    if ledger.reservations.len() >= MAX_RESERVATIONS_PER_ROOM {
        return Err(EngineError::LimitExceeded("too many reservations on room"));
    }
    Ok(())
}

fn count_conflict(result: Result<(), EngineError>) -> Result<(), EngineError> {
    if result.is_err() {
        metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
    }
    result
}

impl Engine {
    /// Book a room. The conflict check and the journal append run under the
    /// room's write lock, so two requests for one room can never both pass.
    pub async fn create(&self, request: BookingRequest) -> Result<Reservation, EngineError> {
        let (stay, custom_name, total_amount) = prepare(&request)?;

        let reservation = {
            let _gate = self.commit_gate.read().await;
            let mut guard = self.ledger(stay.room_id).write_owned().await;
            ensure_capacity(&guard)?;
            count_conflict(check_no_conflict(&guard, &stay, None))?;

            let reservation = Reservation {
                id: Ulid::new(),
                room_id: stay.room_id,
                guest_id: request.guest_id,
                custom_name,
                start_at: stay.span.start,
                end_at: stay.span.end,
                nightly_rate: request.nightly_rate,
                total_amount,
                amount_paid: Decimal::ZERO,
            };
            let event = Event::ReservationBooked {
                reservation: reservation.clone(),
            };
            self.wal_append(&event).await?;
            apply_to_ledger(&mut guard, &event, &self.reservation_to_room);
            reservation
        };

        info!(
            reservation = %reservation.id,
            room = reservation.room_id,
            total = %reservation.total_amount,
            "reservation booked"
        );
        self.after_commit().await;
        Ok(reservation)
    }

    /// Replace dates, room, rate and labels of a reservation, re-checking
    /// conflicts against every other reservation of the target room.
    pub async fn update(&self, id: Ulid, request: BookingRequest) -> Result<Reservation, EngineError> {
        let (stay, custom_name, total_amount) = prepare(&request)?;

        let reservation = {
            let _gate = self.commit_gate.read().await;
            let (mut source, mut moved_to) = self.lock_for_update(id, stay.room_id).await?;

            let target: &RoomLedger = moved_to.as_deref().unwrap_or(&*source);
            if moved_to.is_some() {
                ensure_capacity(target)?;
            }
            count_conflict(check_no_conflict(target, &stay, Some(id)))?;

            let previous = source.get(id).ok_or(EngineError::NotFound(id))?;
            let previous_room_id = previous.room_id;
            let reservation = Reservation {
                id,
                room_id: stay.room_id,
                guest_id: request.guest_id,
                custom_name,
                start_at: stay.span.start,
                end_at: stay.span.end,
                nightly_rate: request.nightly_rate,
                total_amount,
                amount_paid: previous.amount_paid,
            };
            let event = Event::ReservationChanged {
                previous_room_id,
                reservation: reservation.clone(),
            };
            self.wal_append(&event).await?;
            match moved_to.as_mut() {
                Some(target) => {
                    source.remove(id);
                    apply_to_ledger(target, &event, &self.reservation_to_room);
                }
                None => apply_to_ledger(&mut source, &event, &self.reservation_to_room),
            }
            reservation
        };

        info!(
            reservation = %id,
            room = reservation.room_id,
            total = %reservation.total_amount,
            "reservation changed"
        );
        self.after_commit().await;
        Ok(reservation)
    }

    /// Cancel a reservation. Returns the record as it was before removal.
    pub async fn delete(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let removed = {
            let _gate = self.commit_gate.read().await;
            let mut guard = self.lock_reservation(id).await?;
            let removed = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
            let event = Event::ReservationCancelled {
                id,
                room_id: guard.room_id,
            };
            self.wal_append(&event).await?;
            apply_to_ledger(&mut guard, &event, &self.reservation_to_room);
            removed
        };

        info!(reservation = %id, room = removed.room_id, "reservation cancelled");
        self.after_commit().await;
        Ok(removed)
    }

    /// Overwrite the paid amount. Paying more than the total is accepted.
    pub async fn record_payment(&self, id: Ulid, amount_paid: Decimal) -> Result<Reservation, EngineError> {
        if amount_paid < Decimal::ZERO {
            return Err(EngineError::validation("amount_paid must not be negative"));
        }
        let updated = {
            let _gate = self.commit_gate.read().await;
            let mut guard = self.lock_reservation(id).await?;
            let event = Event::PaymentRecorded {
                id,
                room_id: guard.room_id,
                amount_paid,
            };
            self.wal_append(&event).await?;
            apply_to_ledger(&mut guard, &event, &self.reservation_to_room);
            guard.get(id).cloned().ok_or(EngineError::NotFound(id))?
        };

        info!(reservation = %id, paid = %amount_paid, "payment recorded");
        self.after_commit().await;
        Ok(updated)
    }

    /// Write-lock the reservation's current room and, when it is moving, the
    /// target room too. Locks are taken in ascending room id order.
    async fn lock_for_update(
        &self,
        id: Ulid,
        target_room: RoomId,
    ) -> Result<(LedgerGuard, Option<LedgerGuard>), EngineError> {
        for _ in 0..MAX_RESOLVE_ATTEMPTS {
            let current_room = self.room_for(&id).ok_or(EngineError::NotFound(id))?;
            let (source, moved_to) = if current_room == target_room {
                (self.ledger(current_room).write_owned().await, None)
            } else if current_room < target_room {
                let source = self.ledger(current_room).write_owned().await;
                let target = self.ledger(target_room).write_owned().await;
                (source, Some(target))
            } else {
                let target = self.ledger(target_room).write_owned().await;
                let source = self.ledger(current_room).write_owned().await;
                (source, Some(target))
            };
            if source.get(id).is_some() {
                return Ok((source, moved_to));
            }
        }
        Err(EngineError::NotFound(id))
    }

    async fn after_commit(&self) {
        self.publish_gauges();
        let pending = self.wal_appends_since_compact().await;
        if pending < self.options.compact_threshold {
            return;
        }
        match self.compact_wal().await {
            Ok(()) => debug!(pending, "journal compacted"),
            Err(e) => error!("journal compaction failed: {e}"),
        }
    }

    /// Rewrite the journal as one `ReservationBooked` per live reservation.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;

        let mut ledgers: Vec<(RoomId, super::SharedLedger)> = self
            .rooms
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        ledgers.sort_by_key(|(room_id, _)| *room_id);

        let mut events = Vec::new();
        for (_, ledger) in ledgers {
            let guard = ledger.read().await;
            events.extend(guard.reservations.iter().map(|r| Event::ReservationBooked {
                reservation: r.clone(),
            }));
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::StorageUnavailable("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StorageUnavailable("journal writer dropped response".into()))?
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))
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
