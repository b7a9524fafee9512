use crate::model::{DAY_MS, Ms};

pub const MAX_CUSTOM_NAME_LEN: usize = 120;
pub const MAX_RESERVATIONS_PER_ROOM: usize = 50_000;
/// Longest single stay accepted.
pub const MAX_STAY_MS: Ms = 366 * DAY_MS;
/// Most days one occupancy grid may cover.
pub const MAX_GRID_DAYS: usize = 92;
/// Earliest / latest instants accepted (2000-01-01 .. 2100-01-01 UTC).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
/// Attempts to chase a reservation that moved rooms between lookup and lock.
pub const MAX_RESOLVE_ATTEMPTS: usize = 3;
/// Largest journal record replay will allocate for.
pub const MAX_WAL_RECORD_BYTES: usize = 1 << 20;
