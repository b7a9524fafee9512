use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub(crate) fn validate_stay(stay: &Stay) -> Result<(), EngineError> {
    use crate::limits::*;
    if stay.span.start < MIN_VALID_TIMESTAMP_MS || stay.span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if stay.span.duration_ms() > MAX_STAY_MS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// First persisted reservation that shares an instant with `candidate`.
///
/// `existing` must already be scoped to the candidate's room; `exclude` skips
/// the reservation being edited. Touching endpoints (checkout == check-in) are
/// not a conflict.
pub fn check_conflict<'a>(
    candidate: &Stay,
    existing: impl IntoIterator<Item = &'a Reservation>,
    exclude: Option<Ulid>,
) -> Option<&'a Reservation> {
    existing
        .into_iter()
        .filter(|r| Some(r.id) != exclude)
        .find(|r| candidate.overlaps(&r.stay()))
}

/// Ledger fast path: only scans reservations the binary search can't rule out.
pub(crate) fn check_no_conflict(
    ledger: &RoomLedger,
    candidate: &Stay,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match check_conflict(candidate, ledger.overlapping(&candidate.span), exclude) {
        Some(existing) => Err(EngineError::Conflict {
            room: format!("#{}", ledger.room_id),
            existing: existing.id,
        }),
        None => Ok(()),
    }
}
