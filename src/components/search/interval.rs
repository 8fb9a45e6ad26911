use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeDelta, Utc};

use crate::errors::{Result, StacrioError};

const OPEN: &str = "..";

fn start_of(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Closed range of instants covered by one side of an interval.
///
/// `2021-07` covers the whole month, a full timestamp only itself.
fn parse_bound(text: &str, interval: &str) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let invalid = || StacrioError::InvalidDatetime(interval.into());
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        let datetime = datetime.with_timezone(&Utc);
        return Ok((datetime, datetime));
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        let datetime = datetime.and_utc();
        return Ok((datetime, datetime));
    }
    let parts = text
        .split('-')
        .map(|part| part.parse::<u32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    let date = |year: Option<u32>, month: Option<u32>, day: u32| {
        let year = i32::try_from(year?).ok()?;
        NaiveDate::from_ymd_opt(year, month?, day)
    };
    let (first, next) = match *parts.as_slice() {
        [year] => (date(Some(year), Some(1), 1), date(year.checked_add(1), Some(1), 1)),
        [year, 12] => (date(Some(year), Some(12), 1), date(year.checked_add(1), Some(1), 1)),
        [year, month] => (
            date(Some(year), Some(month), 1),
            date(Some(year), month.checked_add(1), 1),
        ),
        [year, month, day] => {
            let first = date(Some(year), Some(month), day);
            (first, first.and_then(|first| first.succ_opt()))
        }
        _ => (None, None),
    };
    match (first, next) {
        (Some(first), Some(next)) => Ok((
            start_of(first),
            start_of(next) - TimeDelta::nanoseconds(1),
        )),
        _ => Err(invalid()),
    }
}

fn format_instant(datetime: &DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Closed time interval, either end may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl Interval {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(StacrioError::InvalidDatetime(format!(
                    "{}/{}",
                    format_instant(&start),
                    format_instant(&end)
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn instant(datetime: DateTime<Utc>) -> Self {
        Self {
            start: Some(datetime),
            end: Some(datetime),
        }
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn contains(&self, datetime: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| start <= *datetime)
            && self.end.map_or(true, |end| *datetime <= end)
    }

    /// Whether the closed range `[start, end]` shares an instant with this
    /// interval.
    pub fn overlaps(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |own_start| own_start <= *end)
            && self.end.map_or(true, |own_end| *start <= own_end)
    }

    /// `datetime` parameter of a STAC item search.
    pub fn to_stac(&self) -> String {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) if start == end => format_instant(start),
            (start, end) => format!(
                "{}/{}",
                start.as_ref().map_or(OPEN.into(), format_instant),
                end.as_ref().map_or(OPEN.into(), format_instant)
            ),
        }
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_stac())
    }
}

impl FromStr for Interval {
    type Err = StacrioError;

    /// ISO-8601 style: `start/end` with `..` (or nothing) for an open end,
    /// or a single instant, date, year-month or year.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let side = |text: &str| -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
            let text = text.trim();
            if text.is_empty() || text == OPEN {
                return Ok(None);
            }
            parse_bound(text, s).map(Some)
        };
        match trimmed.split_once('/') {
            Some((start, end)) => {
                let start = side(start)?.map(|(first, _)| first);
                let end = side(end)?.map(|(_, last)| last);
                Self::new(start, end).map_err(|_| StacrioError::InvalidDatetime(s.into()))
            }
            None if trimmed.is_empty() || trimmed == OPEN => {
                Err(StacrioError::InvalidDatetime(s.into()))
            }
            None => {
                let (first, last) = parse_bound(trimmed, s)?;
                Ok(Self {
                    start: Some(first),
                    end: Some(last),
                })
            }
        }
    }
}
