//! `Date` values: an epoch-milliseconds double plus a property table.
//!
//! Calendar math delegates to chrono in UTC. The engine does not model host
//! time zones: `toISOString` always renders UTC, and the getters read UTC
//! fields.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::heap::{HeapId, HeapRefs};
use crate::object::PropTable;

#[derive(Debug)]
pub(crate) struct JsDate {
    /// Milliseconds since the epoch; NaN marks an invalid date.
    pub ms: f64,
    pub table: PropTable,
}

impl JsDate {
    pub fn new(ms: f64, table: PropTable) -> Self {
        // Clip to the JS time range; anything outside is an invalid date.
        let ms = if ms.is_finite() && ms.abs() <= 8.64e15 { ms.trunc() } else { f64::NAN };
        Self { ms, table }
    }

    fn datetime(&self) -> Option<DateTime<Utc>> {
        if self.ms.is_nan() {
            return None;
        }
        DateTime::<Utc>::from_timestamp_millis(self.ms as i64)
    }

    /// `toISOString`: UTC with millisecond precision, e.g.
    /// `2024-03-01T12:00:00.000Z`.
    pub fn to_iso_string(&self) -> Option<String> {
        let dt = self.datetime()?;
        Some(format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
            dt.year(),
            dt.month(),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
            dt.timestamp_subsec_millis(),
        ))
    }

    pub fn get_full_year(&self) -> f64 {
        self.datetime().map_or(f64::NAN, |dt| f64::from(dt.year()))
    }

    /// Zero-based month, as JS has it.
    pub fn get_month(&self) -> f64 {
        self.datetime().map_or(f64::NAN, |dt| f64::from(dt.month0()))
    }

    pub fn get_date(&self) -> f64 {
        self.datetime().map_or(f64::NAN, |dt| f64::from(dt.day()))
    }

    pub fn get_day(&self) -> f64 {
        self.datetime().map_or(f64::NAN, |dt| f64::from(dt.weekday().num_days_from_sunday()))
    }

    pub fn get_hours(&self) -> f64 {
        self.datetime().map_or(f64::NAN, |dt| f64::from(dt.hour()))
    }

    pub fn get_minutes(&self) -> f64 {
        self.datetime().map_or(f64::NAN, |dt| f64::from(dt.minute()))
    }

    pub fn get_seconds(&self) -> f64 {
        self.datetime().map_or(f64::NAN, |dt| f64::from(dt.second()))
    }

    pub fn get_milliseconds(&self) -> f64 {
        self.datetime().map_or(f64::NAN, |dt| f64::from(dt.timestamp_subsec_millis()))
    }
}

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_ms() -> f64 {
    Utc::now().timestamp_millis() as f64
}

/// Epoch milliseconds for `new Date(y, m, d, h, min, s, ms)` (UTC fields).
///
/// Out-of-range months and days roll over, matching JS overflow behavior
/// (`new Date(2024, 12, 1)` is January 2025).
pub(crate) fn ms_from_components(parts: &[f64]) -> f64 {
    use chrono::TimeZone;
    if parts.iter().any(|p| !p.is_finite()) {
        return f64::NAN;
    }
    let year = parts[0] as i64;
    let year = if (0..=99).contains(&year) { 1900 + year } else { year };
    let month0 = parts.get(1).copied().unwrap_or(0.0) as i64;
    let day = parts.get(2).copied().unwrap_or(1.0) as i64;
    let hour = parts.get(3).copied().unwrap_or(0.0) as i64;
    let minute = parts.get(4).copied().unwrap_or(0.0) as i64;
    let second = parts.get(5).copied().unwrap_or(0.0) as i64;
    let millis = parts.get(6).copied().unwrap_or(0.0) as i64;
    let year = year + month0.div_euclid(12);
    let month = month0.rem_euclid(12) as u32 + 1;
    let Ok(year) = i32::try_from(year) else { return f64::NAN };
    let month_start = match Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0) {
        chrono::LocalResult::Single(dt) => dt,
        _ => return f64::NAN,
    };
    let ms = month_start.timestamp_millis()
        + (day - 1) * 86_400_000
        + hour * 3_600_000
        + minute * 60_000
        + second * 1000
        + millis;
    ms as f64
}

impl HeapRefs for JsDate {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        self.table.collect_refs(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_rendering() {
        let date = JsDate::new(0.0, PropTable::new(None));
        assert_eq!(date.to_iso_string().as_deref(), Some("1970-01-01T00:00:00.000Z"));
        let date = JsDate::new(1_700_000_000_123.0, PropTable::new(None));
        assert_eq!(date.to_iso_string().as_deref(), Some("2023-11-14T22:13:20.123Z"));
    }

    #[test]
    fn invalid_dates_are_nan() {
        let date = JsDate::new(f64::INFINITY, PropTable::new(None));
        assert!(date.ms.is_nan());
        assert_eq!(date.to_iso_string(), None);
        assert!(date.get_full_year().is_nan());
    }

    #[test]
    fn component_construction() {
        // 2024-03-01 (month is zero-based).
        let ms = ms_from_components(&[2024.0, 2.0, 1.0]);
        let date = JsDate::new(ms, PropTable::new(None));
        assert_eq!(date.to_iso_string().as_deref(), Some("2024-03-01T00:00:00.000Z"));
    }
}
