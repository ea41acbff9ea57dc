//! Calendar helpers for flight departure times.

use crate::error::{Result, SuretyError};
use chrono::NaiveDate;

/// Encodes a UTC calendar date-time as Unix seconds.
pub fn encode_timestamp(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Result<i64> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .map(|dt| dt.and_utc().timestamp())
        .ok_or(SuretyError::InvalidTimestamp {
            year,
            month,
            day,
            hour,
            minute,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_instants() {
        assert_eq!(encode_timestamp(1970, 1, 1, 0, 0).unwrap(), 0);
        assert_eq!(encode_timestamp(2000, 1, 1, 0, 0).unwrap(), 946_684_800);
        assert_eq!(encode_timestamp(2030, 10, 10, 10, 0).unwrap(), 1_917_856_800);
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(matches!(
            encode_timestamp(2030, 2, 30, 10, 0),
            Err(SuretyError::InvalidTimestamp { month: 2, day: 30, .. })
        ));
        assert!(encode_timestamp(2030, 1, 1, 24, 0).is_err());
        assert!(encode_timestamp(2030, 1, 1, 0, 60).is_err());
    }
}
