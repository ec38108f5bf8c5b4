use anyhow::{anyhow, Context};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Timelike};
use chrono_tz::Tz;
use rocket::serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub struct ClassTime(pub DateTime<FixedOffset>);
impl ClassTime {
    pub fn now(tz: Tz) -> Self {
        Self(chrono::Utc::now().with_timezone(&tz).fixed_offset()).trimmed_to_sec()
    }
    pub fn trimmed_to_sec(&self) -> Self {
        self.0.with_nanosecond(0).map(ClassTime).unwrap_or(*self)
    }
    /// Local wall-clock time in `tz`; during the autumn DST overlap the earlier instant wins.
    pub fn from_local(local_dt: NaiveDateTime, tz: Tz) -> anyhow::Result<Self> {
        let dt = tz.from_local_datetime(&local_dt)
            .earliest()
            .ok_or_else(|| anyhow!("{local_dt} does not exist in time zone {tz}"))?;
        Ok(ClassTime(dt.fixed_offset()))
    }
    pub fn to_display_string(self) -> String {
        self.0.format("%a %b %-d, %-I:%M %p").to_string()
    }
    pub(crate) fn to_iso_string(self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
    pub(crate) fn from_iso_string(datetime_str: &str) -> Result<Self, anyhow::Error> {
        let dt = DateTime::parse_from_rfc3339(datetime_str)?;
        Ok(Self(dt))
    }
}

impl<DB: sqlx::Database> sqlx::Type<DB> for ClassTime
where
    str: sqlx::Type<DB>,
{
    fn type_info() -> <DB as sqlx::Database>::TypeInfo {
        // TEXT columns only
        <&str as sqlx::Type<DB>>::type_info()
    }
}
impl<'q, DB: sqlx::Database> sqlx::Encode<'q, DB> for ClassTime
where
    String: sqlx::Encode<'q, DB>,
{
    fn encode_by_ref(&self, buf: &mut <DB as sqlx::Database>::ArgumentBuffer<'q>) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<'q, DB>>::encode(self.to_iso_string(), buf)
    }
}
impl<'r, DB: sqlx::Database> sqlx::Decode<'r, DB> for ClassTime
where
    &'r str: sqlx::Decode<'r, DB>,
{
    fn decode(value: <DB as sqlx::Database>::ValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let value = <&str as sqlx::Decode<DB>>::decode(value)?;
        Ok(ClassTime::from_iso_string(value)?)
    }
}

pub(crate) fn display_time(iso_str: Option<&str>) -> String {
    let Some(s) = iso_str else {
        return "--:--".to_string()
    };
    match ClassTime::from_iso_string(s) {
        Ok(dt) => dt.to_display_string(),
        Err(_) => s.to_string(),
    }
}

/// Parses a schedule time of day such as `6:30 PM`. The widget source prints
/// end times as `- 7:30 PM`, so any leading separator is dropped first.
pub fn parse_time_of_day(s: &str) -> anyhow::Result<NaiveTime> {
    let s = s.trim_start_matches(|c: char| c == '-' || c == '\u{2013}' || c == '\u{2014}' || c.is_whitespace())
        .trim();
    let s = s.to_ascii_uppercase();
    for format in ["%I:%M %p", "%I:%M%p", "%H:%M"] {
        if let Ok(tm) = NaiveTime::parse_from_str(&s, format) {
            return Ok(tm);
        }
    }
    Err(anyhow!("Unrecognized time of day: '{s}'"))
}

/// Absolute start and end of a class held on `date`.
pub fn normalize_times(date: NaiveDate, start: &str, end: &str, tz: Tz) -> anyhow::Result<(ClassTime, ClassTime)> {
    let start_tm = parse_time_of_day(start).context("start time")?;
    let end_tm = parse_time_of_day(end).context("end time")?;
    let start_time = ClassTime::from_local(date.and_time(start_tm), tz)?;
    let end_time = ClassTime::from_local(date.and_time(end_tm), tz)?;
    Ok((start_time, end_time))
}

#[cfg(test)]
mod test {
    use super::*;

    const DENVER: Tz = chrono_tz::America::Denver;

    #[test]
    fn test_strip_end_time_separator() {
        let expected = NaiveTime::from_hms_opt(19, 30, 0).unwrap();
        for s in ["- 7:30 PM", "-7:30 pm", " \u{2013} 7:30 PM", "7:30 PM", "07:30PM", "19:30"] {
            assert_eq!(parse_time_of_day(s).unwrap(), expected, "{s}");
        }
        assert!(parse_time_of_day("- noon").is_err());
        assert!(parse_time_of_day("").is_err());
    }

    #[test]
    fn test_normalize_times_in_fixed_zone() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let (start, end) = normalize_times(date, "6:00 AM", "- 7:00 AM", DENVER).unwrap();
        assert_eq!(start.to_iso_string(), "2025-01-15T06:00:00-07:00");
        assert_eq!(end.to_iso_string(), "2025-01-15T07:00:00-07:00");

        let date = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        let (start, _) = normalize_times(date, "6:00 PM", "7:00 PM", DENVER).unwrap();
        assert_eq!(start.to_iso_string(), "2025-07-15T18:00:00-06:00");
    }

    #[test]
    fn test_dst_gap_and_overlap() {
        // 2:30 AM does not exist on the spring-forward day
        let spring = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert!(normalize_times(spring, "2:30 AM", "3:30 AM", DENVER).is_err());
        // 1:30 AM happens twice on the fall-back day
        let fall = NaiveDate::from_ymd_opt(2025, 11, 2).unwrap();
        let (start, _) = normalize_times(fall, "1:30 AM", "2:30 AM", DENVER).unwrap();
        assert_eq!(start.to_iso_string(), "2025-11-02T01:30:00-06:00");
    }

    #[test]
    fn test_iso_round_trip() {
        for (dtstr, dtstr2) in &[
            ("2025-03-05T14:32:45Z", "2025-03-05T14:32:45Z"),
            ("2025-03-05T14:32:45-07:00", "2025-03-05T14:32:45-07:00"),
            ("2025-03-17T20:45:38.565293063+01:00", "2025-03-17T20:45:38+01:00"),
        ] {
            let dt = ClassTime::from_iso_string(dtstr).unwrap();
            assert_eq!(&dt.to_iso_string(), dtstr2)
        }
    }

    #[test]
    fn test_display_time() {
        assert_eq!(display_time(Some("2025-04-01T18:00:00-06:00")), "Tue Apr 1, 6:00 PM");
        assert_eq!(display_time(Some("soon")), "soon");
        assert_eq!(display_time(None), "--:--");
    }

    #[test]
    fn test_trimmed_to_sec() {
        let dt = ClassTime::now(DENVER).trimmed_to_sec();
        assert_eq!(dt.0.timestamp_subsec_nanos(), 0);
    }
}
