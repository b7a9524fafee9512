//! Front desk: turns wire requests into store operations and store rows into
//! the joined views the screens need.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::directory::{Guest, GuestDirectory, Room, RoomDirectory};
use crate::engine::{Engine, EngineError};
use crate::grid::{Grid, LabeledStay, build_grid};
use crate::limits::MAX_GRID_DAYS;
use crate::localtime::{LocalZone, days_between, parse_date, week_of};
use crate::model::*;

pub const UNKNOWN_GUEST: &str = "Unknown guest";
pub const UNKNOWN_ROOM: &str = "Unknown room";
/// Local hour at which the daily sheet decides who holds a room.
pub const DAILY_CHECKPOINT_HOUR: u32 = 17;

// ── Wire input ─────────────────────────────────────────────

/// Body of `POST /reservations` and `PUT /reservations/{id}`. Every field is
/// optional here so a missing one becomes a readable 400.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ReservationInput {
    pub room_id: Option<RoomId>,
    pub guest_id: Option<GuestId>,
    pub custom_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub daily_rate: Option<Decimal>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PaymentInput {
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub amount_paid: Option<Decimal>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListQuery {
    pub room_id: Option<RoomId>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct OccupancyQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    /// Any day of the week to show when `from`/`to` are absent.
    pub date: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DailyQuery {
    pub date: Option<String>,
    pub location: Option<String>,
}

// ── Views ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservationView {
    pub id: Ulid,
    pub room_id: RoomId,
    pub room_name: String,
    pub guest_id: Option<GuestId>,
    pub guest_name: Option<String>,
    pub custom_name: Option<String>,
    /// `custom_name` when set, else the guest's name.
    pub display_name: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub daily_rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount_paid: Decimal,
}

impl ReservationView {
    fn new(r: &Reservation, guest: Option<&Guest>, room: Option<&Room>, zone: &LocalZone) -> Self {
        let guest_name = r
            .guest_id
            .map(|_| guest.map_or(UNKNOWN_GUEST.to_string(), |g| g.name.clone()));
        let display_name = r
            .custom_name
            .clone()
            .or_else(|| guest_name.clone())
            .unwrap_or_else(|| UNKNOWN_GUEST.to_string());
        Self {
            id: r.id,
            room_id: r.room_id,
            room_name: room.map_or(UNKNOWN_ROOM.to_string(), |room| room.name.clone()),
            guest_id: r.guest_id,
            guest_name,
            custom_name: r.custom_name.clone(),
            display_name,
            start_date: zone.format(r.start_at),
            end_date: zone.format(r.end_at),
            daily_rate: r.nightly_rate,
            total_amount: r.total_amount,
            amount_paid: r.amount_paid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyEntry {
    pub room_id: RoomId,
    pub room_name: String,
    pub location: Option<String>,
    pub reservation: Option<ReservationView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySheet {
    pub date: NaiveDate,
    pub checkpoint: String,
    pub rooms: Vec<DailyEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyView {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub location: Option<String>,
    /// Every distinct room location, sorted.
    pub locations: Vec<String>,
    #[serde(flatten)]
    pub grid: Grid,
}

/// Whether a guest still has stays on file; the guest service refuses to
/// delete one that does.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuestUsage {
    pub guest_id: GuestId,
    pub has_reservations: bool,
}

// ── Service ────────────────────────────────────────────────

pub struct FrontDesk {
    engine: Arc<Engine>,
    guests: Arc<dyn GuestDirectory>,
    rooms: Arc<dyn RoomDirectory>,
    zone: LocalZone,
}

fn required<T>(field: &str, value: Option<T>) -> Result<T, EngineError> {
    value.ok_or_else(|| EngineError::validation(format!("{field} is required")))
}

/// Trimmed location filter; blank means every location.
fn normalize_location(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|l| !l.is_empty())
}

fn at_location(room: &Room, location: Option<&str>) -> bool {
    location.is_none() || room.location.as_deref() == location
}

pub fn parse_reservation_id(raw: &str) -> Result<Ulid, EngineError> {
    Ulid::from_string(raw.trim())
        .map_err(|_| EngineError::validation(format!("invalid reservation id: {raw:?}")))
}

impl FrontDesk {
    pub fn new(
        engine: Arc<Engine>,
        guests: Arc<dyn GuestDirectory>,
        rooms: Arc<dyn RoomDirectory>,
        zone: LocalZone,
    ) -> Self {
        Self {
            engine,
            guests,
            rooms,
            zone,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn zone(&self) -> LocalZone {
        self.zone
    }

    /// Parse and check references. Returns the request and the room it targets.
    async fn booking_request(&self, input: ReservationInput) -> Result<(BookingRequest, Room), EngineError> {
        let room_id = required("room_id", input.room_id)?;
        let start = required("start_date", input.start_date)?;
        let end = required("end_date", input.end_date)?;
        let nightly_rate = required("daily_rate", input.daily_rate)?;
        let start_at = self.zone.parse("start_date", &start)?;
        let end_at = self.zone.parse("end_date", &end)?;

        let room = self
            .rooms
            .room(room_id)
            .await
            .ok_or_else(|| EngineError::validation(format!("room {room_id} does not exist")))?;
        if let Some(guest_id) = input.guest_id
            && self.guests.guest(guest_id).await.is_none()
        {
            return Err(EngineError::validation(format!("guest {guest_id} does not exist")));
        }

        let request = BookingRequest {
            room_id,
            guest_id: input.guest_id,
            custom_name: input.custom_name,
            start_at,
            end_at,
            nightly_rate,
        };
        Ok((request, room))
    }

    pub async fn create(&self, input: ReservationInput) -> Result<ReservationView, EngineError> {
        let (request, room) = self.booking_request(input).await?;
        let reservation = self
            .engine
            .create(request)
            .await
            .map_err(|e| name_room(e, &room))?;
        Ok(self.view(reservation).await)
    }

    pub async fn update(&self, id: Ulid, input: ReservationInput) -> Result<ReservationView, EngineError> {
        // An unknown id is a 404 even when the body is also wrong.
        self.engine.get(id).await?;
        let (request, room) = self.booking_request(input).await?;
        let reservation = self
            .engine
            .update(id, request)
            .await
            .map_err(|e| name_room(e, &room))?;
        Ok(self.view(reservation).await)
    }

    pub async fn delete(&self, id: Ulid) -> Result<ReservationView, EngineError> {
        let removed = self.engine.delete(id).await?;
        Ok(self.view(removed).await)
    }

    pub async fn record_payment(&self, id: Ulid, input: PaymentInput) -> Result<ReservationView, EngineError> {
        let amount = required("amount_paid", input.amount_paid)?;
        let updated = self.engine.record_payment(id, amount).await?;
        Ok(self.view(updated).await)
    }

    pub async fn get(&self, id: Ulid) -> Result<ReservationView, EngineError> {
        let reservation = self.engine.get(id).await?;
        Ok(self.view(reservation).await)
    }

    pub async fn guest_usage(&self, guest_id: GuestId) -> GuestUsage {
        GuestUsage {
            guest_id,
            has_reservations: self.engine.guest_has_reservations(guest_id).await,
        }
    }

    pub async fn list(&self, query: ListQuery) -> Result<Vec<ReservationView>, EngineError> {
        let from = query.from.as_deref().map(|s| parse_date("from", s)).transpose()?;
        let to = query.to.as_deref().map(|s| parse_date("to", s)).transpose()?;
        let window = match (from, to) {
            (None, None) => None,
            (from, to) => {
                let start = from.map_or(Ms::MIN, |d| self.zone.day_bounds(d, d).0);
                let end = to.map_or(Ms::MAX, |d| self.zone.day_bounds(d, d).1);
                if start > end {
                    return Err(EngineError::validation("from must not be after to"));
                }
                Some((start, end))
            }
        };
        let reservations = self
            .engine
            .list(ReservationFilter {
                room_id: query.room_id,
                window,
            })
            .await;
        Ok(self.join(&reservations).await)
    }

    /// Who holds each room at the checkpoint hour of `date`.
    pub async fn daily(&self, query: DailyQuery) -> Result<DailySheet, EngineError> {
        let date = match query.date.as_deref() {
            Some(s) => parse_date("date", s)?,
            None => self.zone.today(),
        };
        let checkpoint = self.zone.at_hour(date, DAILY_CHECKPOINT_HOUR);
        let rooms = self.rooms_at(query.location.as_deref()).await;

        let active = self.engine.active_at(checkpoint).await;
        let views = self.join(&active).await;
        // Sorted by check-in: on a turnover at the checkpoint the arriving stay wins.
        let mut by_room: HashMap<RoomId, ReservationView> = HashMap::new();
        for view in views {
            by_room.insert(view.room_id, view);
        }

        let rooms = rooms
            .into_iter()
            .map(|room| DailyEntry {
                reservation: by_room.remove(&room.id),
                room_id: room.id,
                room_name: room.name,
                location: room.location,
            })
            .collect();
        Ok(DailySheet {
            date,
            checkpoint: self.zone.format(checkpoint),
            rooms,
        })
    }

    pub async fn occupancy(&self, query: OccupancyQuery) -> Result<OccupancyView, EngineError> {
        let (from, to) = match (query.from.as_deref(), query.to.as_deref()) {
            (Some(from), Some(to)) => (parse_date("from", from)?, parse_date("to", to)?),
            (None, None) => {
                let anchor = match query.date.as_deref() {
                    Some(s) => parse_date("date", s)?,
                    None => self.zone.today(),
                };
                week_of(anchor)
            }
            _ => return Err(EngineError::validation("from and to must be given together")),
        };
        if from > to {
            return Err(EngineError::validation("from must not be after to"));
        }
        if (to - from).num_days() >= MAX_GRID_DAYS as i64 {
            return Err(EngineError::LimitExceeded("grid window too wide"));
        }
        let days = days_between(from, to);

        let all_rooms = self.rooms.rooms().await;
        let locations: Vec<String> = all_rooms
            .iter()
            .filter_map(|r| r.location.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let location = normalize_location(query.location.as_deref());
        let rooms: Vec<Room> = all_rooms
            .into_iter()
            .filter(|r| at_location(r, location))
            .collect();

        let reservations = self
            .engine
            .list(ReservationFilter {
                room_id: None,
                window: Some(self.zone.day_bounds(from, to)),
            })
            .await;
        let stays: Vec<LabeledStay> = self
            .join(&reservations)
            .await
            .into_iter()
            .zip(reservations)
            .map(|(view, reservation)| LabeledStay {
                reservation,
                label: view.display_name,
            })
            .collect();
        debug!(from = %from, to = %to, rooms = rooms.len(), stays = stays.len(), "occupancy grid");

        Ok(OccupancyView {
            from,
            to,
            location: location.map(str::to_string),
            locations,
            grid: build_grid(&rooms, &days, &stays, &self.zone),
        })
    }

    async fn rooms_at(&self, location: Option<&str>) -> Vec<Room> {
        let location = normalize_location(location);
        self.rooms
            .rooms()
            .await
            .into_iter()
            .filter(|r| at_location(r, location))
            .collect()
    }

    async fn view(&self, reservation: Reservation) -> ReservationView {
        let guest = async {
            match reservation.guest_id {
                Some(id) => self.guests.guest(id).await,
                None => None,
            }
        };
        let (guest, room) = futures::join!(guest, self.rooms.room(reservation.room_id));
        ReservationView::new(&reservation, guest.as_ref(), room.as_ref(), &self.zone)
    }

    /// Left join with both directories. Every distinct guest and room is
    /// looked up once, all lookups in flight together.
    async fn join(&self, reservations: &[Reservation]) -> Vec<ReservationView> {
        let guest_ids: BTreeSet<GuestId> = reservations.iter().filter_map(|r| r.guest_id).collect();
        let room_ids: BTreeSet<RoomId> = reservations.iter().map(|r| r.room_id).collect();

        let (guests, rooms) = futures::join!(
            join_all(guest_ids.iter().map(|&id| self.guests.guest(id))),
            join_all(room_ids.iter().map(|&id| self.rooms.room(id))),
        );
        let guests: HashMap<GuestId, Guest> =
            guests.into_iter().flatten().map(|g| (g.id, g)).collect();
        let rooms: HashMap<RoomId, Room> = rooms.into_iter().flatten().map(|r| (r.id, r)).collect();

        if guests.len() < guest_ids.len() || rooms.len() < room_ids.len() {
            warn!(
                missing_guests = guest_ids.len() - guests.len(),
                missing_rooms = room_ids.len() - rooms.len(),
                "reservations reference records missing from the directory"
            );
        }

        reservations
            .iter()
            .map(|r| {
                let guest = r.guest_id.and_then(|id| guests.get(&id));
                ReservationView::new(r, guest, rooms.get(&r.room_id), &self.zone)
            })
            .collect()
    }
}

/// Put the room's display name into a conflict message.
fn name_room(err: EngineError, room: &Room) -> EngineError {
    match err {
        EngineError::Conflict { existing, .. } => EngineError::Conflict {
            room: room.name.clone(),
            existing,
        },
        other => other,
    }
}
