//! Occupancy grid: rooms × days, each cell classified by which stays touch
//! that local calendar day. Pure projection over its inputs.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use ulid::Ulid;

use crate::directory::Room;
use crate::localtime::LocalZone;
use crate::model::{Reservation, RoomId};

/// A reservation together with the name the grid shows for it.
#[derive(Debug, Clone)]
pub struct LabeledStay {
    pub reservation: Reservation,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellStay {
    pub reservation_id: Ulid,
    pub label: String,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Cell {
    Free {
        #[serde(with = "rust_decimal::serde::float")]
        nightly_rate: Decimal,
    },
    /// Interior night: the stay began before this day and ends after it.
    Occupied { stay: CellStay },
    CheckOut { departing: CellStay },
    CheckIn { arriving: CellStay },
    /// Several stays meet on this day: a departure and/or more than one arrival.
    Turnover {
        departing: Option<CellStay>,
        arriving: Vec<CellStay>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCell {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub cell: Cell,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridRow {
    pub room_id: RoomId,
    pub room_name: String,
    pub location: Option<String>,
    pub cells: Vec<DayCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grid {
    pub days: Vec<NaiveDate>,
    pub rows: Vec<GridRow>,
}

struct Placed<'a> {
    stay: &'a LabeledStay,
    first_day: NaiveDate,
    last_day: NaiveDate,
}

impl Placed<'_> {
    fn cell_stay(&self, zone: &LocalZone) -> CellStay {
        let r = &self.stay.reservation;
        CellStay {
            reservation_id: r.id,
            label: self.stay.label.clone(),
            start_date: zone.format(r.start_at),
            end_date: zone.format(r.end_at),
        }
    }
}

/// Days come out ascending without duplicates; rows follow `rooms` order.
pub fn build_grid(
    rooms: &[Room],
    days: &[NaiveDate],
    stays: &[LabeledStay],
    zone: &LocalZone,
) -> Grid {
    let mut days = days.to_vec();
    days.sort();
    days.dedup();

    let mut placed: Vec<Placed<'_>> = stays
        .iter()
        .map(|stay| Placed {
            stay,
            first_day: zone.date_of(stay.reservation.start_at),
            last_day: zone.date_of(stay.reservation.end_at),
        })
        .collect();
    placed.sort_by(|a, b| {
        let (a, b) = (&a.stay.reservation, &b.stay.reservation);
        a.start_at.cmp(&b.start_at).then(a.id.cmp(&b.id))
    });

    let rows = rooms
        .iter()
        .map(|room| {
            let own: Vec<&Placed<'_>> = placed
                .iter()
                .filter(|p| p.stay.reservation.room_id == room.id)
                .collect();
            GridRow {
                room_id: room.id,
                room_name: room.name.clone(),
                location: room.location.clone(),
                cells: days
                    .iter()
                    .map(|&date| DayCell {
                        date,
                        cell: classify(room, date, &own, zone),
                    })
                    .collect(),
            }
        })
        .collect();

    Grid { days, rows }
}

fn classify(room: &Room, day: NaiveDate, own: &[&Placed<'_>], zone: &LocalZone) -> Cell {
    let touching = own.iter().filter(|p| p.first_day <= day && day <= p.last_day);

    let mut departing = None;
    let mut arriving = Vec::new();
    for p in touching {
        if p.first_day < day && day < p.last_day {
            return Cell::Occupied {
                stay: p.cell_stay(zone),
            };
        }
        if p.first_day == day {
            arriving.push(p.cell_stay(zone));
        } else if departing.is_none() {
            departing = Some(p.cell_stay(zone));
        }
    }

    match (departing, arriving.len()) {
        (None, 0) => Cell::Free {
            nightly_rate: room.nightly_rate,
        },
        (Some(departing), 0) => Cell::CheckOut { departing },
        (None, 1) => Cell::CheckIn {
            arriving: arriving.remove(0),
        },
        (departing, _) => Cell::Turnover { departing, arriving },
    }
}
