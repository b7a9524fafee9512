//! Wall-clock handling. Instants are stored as UTC milliseconds; the hotel
//! reads and writes them in one fixed local offset.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Timelike, Utc,
};

use crate::engine::EngineError;
use crate::limits::{MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
use crate::model::{DAY_MS, Ms};

/// Canonical wire format for instants.
pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const ACCEPTED_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalZone {
    offset: FixedOffset,
}

impl Default for LocalZone {
    fn default() -> Self {
        Self::utc()
    }
}

impl LocalZone {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Parse `+HH:MM` / `-HH:MM` (or `Z`).
    pub fn from_offset_str(s: &str) -> Result<Self, EngineError> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
            return Ok(Self::utc());
        }
        let invalid = || EngineError::validation(format!("invalid UTC offset: {s:?}"));
        let (sign, rest) = match s.as_bytes().first() {
            Some(b'+') => (1, &s[1..]),
            Some(b'-') => (-1, &s[1..]),
            _ => return Err(invalid()),
        };
        let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if !(0..60).contains(&minutes) {
            return Err(invalid());
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self::new)
            .ok_or_else(invalid)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    fn local(&self, ms: Ms) -> DateTime<FixedOffset> {
        DateTime::from_timestamp_millis(ms)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
            .with_timezone(&self.offset)
    }

    fn to_ms(&self, naive: NaiveDateTime) -> Ms {
        // A fixed offset maps every local time to exactly one instant.
        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_else(|| naive.and_utc().timestamp_millis())
    }

    /// Parse a local wall-clock string. Seconds are truncated to the minute;
    /// date-only strings are rejected.
    pub fn parse(&self, field: &str, s: &str) -> Result<Ms, EngineError> {
        let s = s.trim();
        let naive = ACCEPTED_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "{field} must look like YYYY-MM-DDTHH:mm, got {s:?}"
                ))
            })?;
        let naive = naive.with_second(0).unwrap_or(naive);
        Ok(self.to_ms(naive))
    }

    pub fn format(&self, ms: Ms) -> String {
        self.local(ms).format(WIRE_FORMAT).to_string()
    }

    /// Local calendar day containing `ms`.
    pub fn date_of(&self, ms: Ms) -> NaiveDate {
        self.local(ms).date_naive()
    }

    /// Instant of `hour:00` local on `date`.
    pub fn at_hour(&self, date: NaiveDate, hour: u32) -> Ms {
        let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
        self.to_ms(date.and_time(time))
    }

    /// `[start of from, end of to]` as inclusive instants.
    pub fn day_bounds(&self, from: NaiveDate, to: NaiveDate) -> (Ms, Ms) {
        let start = self.to_ms(from.and_time(NaiveTime::MIN));
        let end = self.to_ms(to.and_time(NaiveTime::MIN) + Duration::days(1)) - 1;
        (start, end)
    }

    pub fn today(&self) -> NaiveDate {
        self.date_of(Utc::now().timestamp_millis())
    }
}

/// Parse a local calendar date. Dates outside the bookable window are
/// rejected so day arithmetic on them cannot overflow.
pub fn parse_date(field: &str, s: &str) -> Result<NaiveDate, EngineError> {
    let date = NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| EngineError::validation(format!("{field} must look like YYYY-MM-DD, got {s:?}")))?;
    let midnight = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    if !(MIN_VALID_TIMESTAMP_MS - DAY_MS..=MAX_VALID_TIMESTAMP_MS).contains(&midnight) {
        return Err(EngineError::validation(format!("{field} is out of range: {s:?}")));
    }
    Ok(date)
}

/// Every day from `from` to `to`, inclusive, ascending.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    from.iter_days().take_while(|d| *d <= to).collect()
}

/// Sunday..Saturday week containing `date`.
pub fn week_of(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = date - Duration::days(date.weekday().num_days_from_sunday() as i64);
    (start, start + Duration::days(6))
}
