mod conflict;
mod error;
mod mutations;
mod pricing;
mod queries;

pub use conflict::check_conflict;
pub use error::{EngineError, ErrorKind};
pub use pricing::compute_total;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::MAX_RESOLVE_ATTEMPTS;
use crate::model::*;
use crate::observability;
use crate::wal::Wal;

pub type SharedLedger = Arc<RwLock<RoomLedger>>;

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Upper bound on one journal append before `StorageUnavailable`.
    pub storage_timeout: Duration,
    /// Rewrite the journal once this many records were appended since the last rewrite.
    pub compact_threshold: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(5),
            compact_threshold: 1000,
        }
    }
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

/// Owns the journal. Drains every append already queued, writes them with a
/// single fsync, then answers all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        // A closed sender means the caller gave up (storage timeout) and left its
        // ledger untouched; writing the record now would resurrect it on replay.
        let queued = batch.len();
        batch.retain(|(_, tx)| !tx.is_closed());
        if batch.len() < queued {
            warn!(dropped = queued - batch.len(), "discarding journal appends abandoned by their callers");
        }
        if !batch.is_empty() {
            metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
            let flush_start = std::time::Instant::now();
            let result = flush_batch(&mut wal, &batch);
            metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
                .record(flush_start.elapsed().as_secs_f64());
            for (_, tx) in batch {
                let r = match &result {
                    Ok(()) => Ok(()),
                    Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
                };
                let _ = tx.send(r);
            }
        }

        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after a failed append so stale bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
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

/// The reservation store: one write-locked ledger per room, journaled to a WAL.
pub struct Engine {
    pub(super) rooms: DashMap<RoomId, SharedLedger>,
    /// Reverse lookup: reservation id → room id.
    pub(super) reservation_to_room: DashMap<Ulid, RoomId>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Writers hold it shared; compaction holds it exclusively so the snapshot
    /// and the journal swap see no concurrent appends.
    pub(super) commit_gate: RwLock<()>,
    pub(super) options: EngineOptions,
}

/// Apply an event to the ledger it targets. Caller holds the lock; for a room
/// move the caller has already detached the reservation from its old ledger.
pub(super) fn apply_to_ledger(
    ledger: &mut RoomLedger,
    event: &Event,
    index: &DashMap<Ulid, RoomId>,
) {
    match event {
        Event::ReservationBooked { reservation } => {
            index.insert(reservation.id, reservation.room_id);
            ledger.insert(reservation.clone());
        }
        Event::ReservationChanged { reservation, .. } => {
            ledger.remove(reservation.id);
            index.insert(reservation.id, reservation.room_id);
            ledger.insert(reservation.clone());
        }
        Event::PaymentRecorded { id, amount_paid, .. } => {
            if let Some(r) = ledger.get_mut(*id) {
                r.amount_paid = *amount_paid;
            }
        }
        Event::ReservationCancelled { id, .. } => {
            ledger.remove(*id);
            index.remove(id);
        }
    }
}

impl Engine {
    /// Open the journal at `wal_path`, rebuild state from it and start the
    /// writer task. Must be called inside a tokio runtime.
    pub fn new(wal_path: PathBuf, options: EngineOptions) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if replay.truncated {
            warn!(path = %wal_path.display(), "journal ended with a torn record; tail discarded");
        }
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            reservation_to_room: DashMap::new(),
            wal_tx,
            commit_gate: RwLock::new(()),
            options,
        };

        // Sole owner of every Arc here, so try_write never contends.
        let mut skipped = 0usize;
        for event in &replay.events {
            let target_room = event_room_id(event);
            if let Some(existing) = engine.replay_conflict(event) {
                warn!(
                    room_id = target_room,
                    existing = %existing,
                    "journal record overlaps an earlier stay; skipped on replay"
                );
                skipped += 1;
                continue;
            }
            if let Event::ReservationChanged {
                previous_room_id,
                reservation,
            } = event
                && *previous_room_id != reservation.room_id
            {
                let previous = engine.ledger(*previous_room_id);
                let mut guard = previous.try_write().expect("replay: uncontended write");
                guard.remove(reservation.id);
            }
            let ledger = engine.ledger(target_room);
            let mut guard = ledger.try_write().expect("replay: uncontended write");
            apply_to_ledger(&mut guard, event, &engine.reservation_to_room);
        }

        info!(
            path = %wal_path.display(),
            events = replay.events.len(),
            skipped,
            reservations = engine.reservation_to_room.len(),
            "reservation journal replayed"
        );
        engine.publish_gauges();
        Ok(engine)
    }

    /// The reservation a replayed booking or edit would overlap, if any. An
    /// append that landed after its caller timed out must never double-book.
    fn replay_conflict(&self, event: &Event) -> Option<Ulid> {
        let reservation = match event {
            Event::ReservationBooked { reservation } | Event::ReservationChanged { reservation, .. } => {
                reservation
            }
            _ => return None,
        };
        let ledger = self.rooms.get(&reservation.room_id)?.value().clone();
        let guard = ledger.try_read().ok()?;
        check_conflict(&reservation.stay(), guard.overlapping(&reservation.span()), Some(reservation.id))
            .map(|existing| existing.id)
    }

    /// Hand the event to the group-commit writer and wait for its fsync.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let append = async {
            let (tx, rx) = oneshot::channel();
            self.wal_tx
                .send(WalCommand::Append {
                    event: event.clone(),
                    response: tx,
                })
                .await
                .map_err(|_| EngineError::StorageUnavailable("journal writer shut down".into()))?;
            rx.await
                .map_err(|_| {
                    EngineError::StorageUnavailable("journal writer dropped response".into())
                })?
                .map_err(|e| EngineError::StorageUnavailable(e.to_string()))
        };
        tokio::time::timeout(self.options.storage_timeout, append)
            .await
            .map_err(|_| EngineError::StorageUnavailable("journal append timed out".into()))?
    }

    /// Ledger for a room, created empty on first use.
    pub(super) fn ledger(&self, room_id: RoomId) -> SharedLedger {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| Arc::new(RwLock::new(RoomLedger::new(room_id))))
            .value()
            .clone()
    }

    pub(super) fn room_for(&self, id: &Ulid) -> Option<RoomId> {
        self.reservation_to_room.get(id).map(|e| *e.value())
    }

    /// Lookup reservation → room, then write-lock that room's ledger. Retries
    /// when the reservation moved rooms between the lookup and the lock.
    pub(super) async fn lock_reservation(
        &self,
        id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<RoomLedger>, EngineError> {
        for _ in 0..MAX_RESOLVE_ATTEMPTS {
            let room_id = self.room_for(&id).ok_or(EngineError::NotFound(id))?;
            let guard = self.ledger(room_id).write_owned().await;
            if guard.get(id).is_some() {
                return Ok(guard);
            }
        }
        Err(EngineError::NotFound(id))
    }

    pub(super) fn publish_gauges(&self) {
        metrics::gauge!(observability::RESERVATIONS_ACTIVE)
            .set(self.reservation_to_room.len() as f64);
    }
}

/// The ledger an event is applied to (the destination room for a move).
fn event_room_id(event: &Event) -> RoomId {
    match event {
        Event::ReservationBooked { reservation } | Event::ReservationChanged { reservation, .. } => {
            reservation.room_id
        }
        Event::PaymentRecorded { room_id, .. } | Event::ReservationCancelled { room_id, .. } => {
            *room_id
        }
    }
}
