use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError, SharedLedger};

impl Engine {
    fn ledgers(&self) -> Vec<SharedLedger> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    async fn collect(&self, mut keep: impl FnMut(&Reservation) -> bool) -> Vec<Reservation> {
        let mut out = Vec::new();
        for ledger in self.ledgers() {
            let guard = ledger.read().await;
            out.extend(guard.reservations.iter().filter(|r| keep(*r)).cloned());
        }
        out.sort_by(|a, b| a.start_at.cmp(&b.start_at).then(a.id.cmp(&b.id)));
        out
    }

    pub async fn get(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let room_id = self.room_for(&id).ok_or(EngineError::NotFound(id))?;
        let ledger = self.rooms.get(&room_id).map(|e| e.value().clone());
        match ledger {
            Some(ledger) => ledger.read().await.get(id).cloned().ok_or(EngineError::NotFound(id)),
            None => Err(EngineError::NotFound(id)),
        }
    }

    /// All reservations matching `filter`, ordered by check-in.
    pub async fn list(&self, filter: ReservationFilter) -> Vec<Reservation> {
        if let Some(room_id) = filter.room_id {
            let Some(ledger) = self.rooms.get(&room_id).map(|e| e.value().clone()) else {
                return Vec::new();
            };
            let guard = ledger.read().await;
            return guard.reservations.iter().filter(|r| filter.matches(r)).cloned().collect();
        }
        self.collect(|r| filter.matches(r)).await
    }

    /// Reservations in house at `instant` (check-in and check-out inclusive).
    pub async fn active_at(&self, instant: Ms) -> Vec<Reservation> {
        self.collect(|r| r.start_at <= instant && instant <= r.end_at).await
    }

    pub async fn guest_has_reservations(&self, guest_id: GuestId) -> bool {
        for ledger in self.ledgers() {
            if ledger
                .read()
                .await
                .reservations
                .iter()
                .any(|r| r.guest_id == Some(guest_id))
            {
                return true;
            }
        }
        false
    }

    pub fn reservation_count(&self) -> usize {
        self.reservation_to_room.len()
    }
}
