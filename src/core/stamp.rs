// Record timestamps: (seconds within year, year) pairs with (0, 0) reserved for "unset".
use time::{Date, Duration, Month, OffsetDateTime};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RecordTime {
    pub seconds_in_year: u32,
    pub year: i32,
}

impl RecordTime {
    pub fn new(seconds_in_year: u32, year: i32) -> Self {
        Self {
            seconds_in_year,
            year,
        }
    }

    /// Interpret an on-disk pair; `(0, 0)` means no timestamp was stored.
    pub fn from_pair(seconds_in_year: u32, year: i32) -> Option<Self> {
        if seconds_in_year == 0 && year == 0 {
            return None;
        }
        Some(Self::new(seconds_in_year, year))
    }

    pub fn to_pair(time: Option<Self>) -> (u32, i32) {
        time.map(|t| (t.seconds_in_year, t.year)).unwrap_or((0, 0))
    }

    pub fn from_datetime(datetime: OffsetDateTime) -> Result<Self, Error> {
        let utc = datetime.to_offset(time::UtcOffset::UTC);
        let start = year_start(utc.year())?;
        let seconds = (utc - start).whole_seconds();
        let seconds_in_year = u32::try_from(seconds).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("seconds within year out of range")
                .with_source(err)
        })?;
        Ok(Self::new(seconds_in_year, utc.year()))
    }

    pub fn to_datetime(self) -> Result<OffsetDateTime, Error> {
        let start = year_start(self.year)?;
        start
            .checked_add(Duration::seconds(i64::from(self.seconds_in_year)))
            .ok_or_else(|| Error::new(ErrorKind::Format).with_message("timestamp out of range"))
    }

    pub fn to_rfc3339(self) -> Result<String, Error> {
        use time::format_description::well_known::Rfc3339;
        self.to_datetime()?.format(&Rfc3339).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("timestamp format failed")
                .with_source(err)
        })
    }
}

fn year_start(year: i32) -> Result<OffsetDateTime, Error> {
    let date = Date::from_calendar_date(year, Month::January, 1).map_err(|err| {
        Error::new(ErrorKind::Format)
            .with_message("timestamp year out of range")
            .with_source(err)
    })?;
    Ok(date.midnight().assume_utc())
}

#[cfg(test)]
mod tests {
    use super::RecordTime;
    use crate::core::error::ErrorKind;
    use time::{Date, Month, Time};

    #[test]
    fn zero_pair_is_unset() {
        assert_eq!(RecordTime::from_pair(0, 0), None);
        assert_eq!(RecordTime::to_pair(None), (0, 0));
        assert_eq!(RecordTime::from_pair(0, 2024), Some(RecordTime::new(0, 2024)));
    }

    #[test]
    fn datetime_conversion_round_trips() {
        let date = Date::from_calendar_date(2024, Month::March, 1).expect("date");
        let datetime = date
            .with_time(Time::from_hms(12, 30, 5).expect("time"))
            .assume_utc();
        let stamp = RecordTime::from_datetime(datetime).expect("stamp");
        assert_eq!(stamp.year, 2024);
        // Jan (31) + Feb (29, leap year) days, then 12:30:05.
        assert_eq!(stamp.seconds_in_year, 60 * 86_400 + 12 * 3600 + 30 * 60 + 5);
        assert_eq!(stamp.to_datetime().expect("datetime"), datetime);
    }

    #[test]
    fn rfc3339_rendering() {
        let stamp = RecordTime::new(100, 2024);
        assert_eq!(stamp.to_rfc3339().expect("format"), "2024-01-01T00:01:40Z");
    }

    #[test]
    fn absurd_year_is_rejected() {
        let err = RecordTime::new(0, i32::MAX).to_datetime().expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}
