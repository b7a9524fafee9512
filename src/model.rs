use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Unix milliseconds (UTC), the only stored time type.
pub type Ms = i64;

pub type RoomId = u64;
pub type GuestId = u64;

pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A room's occupied span for one reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stay {
    pub room_id: RoomId,
    pub span: Span,
}

impl Stay {
    /// Fails with `InvalidInterval` unless `end > start`.
    pub fn new(room_id: RoomId, start: Ms, end: Ms) -> Result<Self, EngineError> {
        if end <= start {
            return Err(EngineError::InvalidInterval { start, end });
        }
        Ok(Self {
            room_id,
            span: Span { start, end },
        })
    }

    /// Same room and at least one shared instant. Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Stay) -> bool {
        self.room_id == other.room_id && self.span.overlaps(&other.span)
    }

    /// Billable nights: `ceil(elapsed / 24h)`, never less than one.
    pub fn duration_days(&self) -> i64 {
        let elapsed = self.span.duration_ms();
        ((elapsed + DAY_MS - 1) / DAY_MS).max(1)
    }
}

/// A persisted booking of one room for one stay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub room_id: RoomId,
    pub guest_id: Option<GuestId>,
    /// Walk-in label; overrides the guest's name for display.
    pub custom_name: Option<String>,
    pub start_at: Ms,
    pub end_at: Ms,
    #[serde(with = "rust_decimal::serde::str")]
    pub nightly_rate: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount_paid: Decimal,
}

impl Reservation {
    pub fn span(&self) -> Span {
        Span::new(self.start_at, self.end_at)
    }

    pub fn stay(&self) -> Stay {
        Stay {
            room_id: self.room_id,
            span: self.span(),
        }
    }
}

/// Caller-supplied fields for a booking or an edit. `total_amount` is never
/// accepted from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub room_id: RoomId,
    pub guest_id: Option<GuestId>,
    pub custom_name: Option<String>,
    pub start_at: Ms,
    pub end_at: Ms,
    pub nightly_rate: Decimal,
}

/// Reservations of a single room, sorted by `start_at`.
#[derive(Debug, Clone)]
pub struct RoomLedger {
    pub room_id: RoomId,
    pub reservations: Vec<Reservation>,
}

impl RoomLedger {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by start_at.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.start_at <= reservation.start_at);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations whose span overlaps the query window.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.start_at < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.end_at > query.start)
    }
}

/// WAL record format. One event per committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationBooked {
        reservation: Reservation,
    },
    ReservationChanged {
        previous_room_id: RoomId,
        reservation: Reservation,
    },
    PaymentRecorded {
        id: Ulid,
        room_id: RoomId,
        #[serde(with = "rust_decimal::serde::str")]
        amount_paid: Decimal,
    },
    ReservationCancelled {
        id: Ulid,
        room_id: RoomId,
    },
}

/// Optional narrowing for `list`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub room_id: Option<RoomId>,
    /// Keep reservations whose `[start_at, end_at]` touches this window (inclusive).
    pub window: Option<(Ms, Ms)>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        if self.room_id.is_some_and(|room| room != r.room_id) {
            return false;
        }
        match self.window {
            Some((from, to)) => r.start_at <= to && r.end_at >= from,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const H: Ms = 3_600_000;

    fn reservation(room_id: RoomId, start: Ms, end: Ms) -> Reservation {
        Reservation {
            id: Ulid::new(),
            room_id,
            guest_id: Some(1),
            custom_name: None,
            start_at: start,
            end_at: end,
            nightly_rate: dec!(100),
            total_amount: dec!(100),
            amount_paid: Decimal::ZERO,
        }
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn stay_rejects_empty_and_inverted() {
        assert!(matches!(
            Stay::new(1, 500, 500),
            Err(EngineError::InvalidInterval { .. })
        ));
        assert!(matches!(
            Stay::new(1, 500, 100),
            Err(EngineError::InvalidInterval { .. })
        ));
        assert!(Stay::new(1, 100, 101).is_ok());
    }

    #[test]
    fn stay_overlap_requires_same_room() {
        let a = Stay::new(1, 0, 10 * H).unwrap();
        let b = Stay::new(2, 0, 10 * H).unwrap();
        let c = Stay::new(1, 5 * H, 20 * H).unwrap();
        let d = Stay::new(1, 10 * H, 20 * H).unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(!a.overlaps(&d));
        assert!(!d.overlaps(&a));
    }

    #[test]
    fn stay_shared_endpoint_with_containment_overlaps() {
        let outer = Stay::new(1, 0, 48 * H).unwrap();
        let same_start = Stay::new(1, 0, 2 * H).unwrap();
        let same_end = Stay::new(1, 40 * H, 48 * H).unwrap();
        assert!(outer.overlaps(&same_start));
        assert!(outer.overlaps(&same_end));
    }

    #[test]
    fn duration_days_rounds_up() {
        // 13:00 → 12:00 two days later is 47h
        assert_eq!(Stay::new(1, 13 * H, 13 * H + 47 * H).unwrap().duration_days(), 2);
        assert_eq!(Stay::new(1, 0, 24 * H).unwrap().duration_days(), 1);
        assert_eq!(Stay::new(1, 0, 24 * H + 1).unwrap().duration_days(), 2);
        assert_eq!(Stay::new(1, 0, 1).unwrap().duration_days(), 1);
        assert_eq!(Stay::new(1, 0, 3 * H).unwrap().duration_days(), 1);
    }

    #[test]
    fn ledger_keeps_start_order() {
        let mut ledger = RoomLedger::new(1);
        ledger.insert(reservation(1, 300, 400));
        ledger.insert(reservation(1, 100, 200));
        ledger.insert(reservation(1, 200, 300));
        let starts: Vec<Ms> = ledger.reservations.iter().map(|r| r.start_at).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn ledger_remove_preserves_order() {
        let mut ledger = RoomLedger::new(1);
        let rs: Vec<Reservation> = (0..3).map(|i| reservation(1, i * 100, i * 100 + 50)).collect();
        for r in &rs {
            ledger.insert(r.clone());
        }
        assert!(ledger.remove(rs[1].id).is_some());
        assert!(ledger.remove(Ulid::new()).is_none());
        assert_eq!(ledger.reservations.len(), 2);
        assert_eq!(ledger.reservations[0].id, rs[0].id);
        assert_eq!(ledger.reservations[1].id, rs[2].id);
    }

    #[test]
    fn overlapping_skips_adjacent_and_future() {
        let mut ledger = RoomLedger::new(1);
        ledger.insert(reservation(1, 100, 200));
        ledger.insert(reservation(1, 450, 600));
        ledger.insert(reservation(1, 1000, 1100));

        let hits: Vec<_> = ledger.overlapping(&Span::new(200, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start_at, 450);
    }

    #[test]
    fn filter_window_is_inclusive() {
        let r = reservation(3, 100, 200);
        let touching = ReservationFilter {
            room_id: None,
            window: Some((200, 300)),
        };
        let other_room = ReservationFilter {
            room_id: Some(4),
            window: None,
        };
        let before = ReservationFilter {
            room_id: Some(3),
            window: Some((0, 99)),
        };
        assert!(touching.matches(&r));
        assert!(!other_room.matches(&r));
        assert!(!before.matches(&r));
        assert!(ReservationFilter::default().matches(&r));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationBooked {
            reservation: Reservation {
                custom_name: Some("Walk-in".into()),
                nightly_rate: dec!(99.90),
                ..reservation(7, 0, 24 * H)
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
