// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::DateParseError;

/// Turns the loosely formatted date labels of the show's listing into
/// timestamps in the show's civil timezone.
///
/// Accepted tokens:
/// - a "today" marker (e.g. `dnes`), resolved to the current instant
/// - `d.m.yyyy`, `d.m.` or `d.m` (day first, year defaults to the current year)
/// - `yyyy.m.d` (year first)
///
/// Any of the dated forms may carry a trailing `HH:MM` time of day, which is
/// kept; otherwise the timestamp is midnight.
///
/// Day-first and year-first sources are told apart by a heuristic: when the
/// trailing component exceeds 31 it must be a year, so the components are
/// read in reverse. A two digit year such as `5.6.20` is therefore read as
/// year 5, day 20. This ambiguity lives in the source format and is not
/// resolved here.
#[derive(Debug, Clone)]
pub struct DateNormalizer {
    timezone: Tz,
    today_markers: Vec<String>,
}

impl DateNormalizer {
    pub fn new(timezone: Tz, today_markers: Vec<String>) -> Self {
        Self {
            timezone,
            today_markers,
        }
    }

    /// The current instant in the show's timezone
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone)
    }

    /// Normalize a token relative to the current instant
    pub fn normalize(&self, token: &str) -> Result<DateTime<Tz>, DateParseError> {
        self.normalize_at(token, self.now())
    }

    /// Normalize a token relative to `now`, which supplies "today" and the
    /// default year
    pub fn normalize_at(
        &self,
        token: &str,
        now: DateTime<Tz>,
    ) -> Result<DateTime<Tz>, DateParseError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(DateParseError::Empty);
        }

        let (date_part, time) = split_time(token)?;

        if self.is_today_marker(date_part) {
            return match time {
                Some(time) => self.localize(token, now.date_naive(), time),
                None => Ok(now),
            };
        }

        let date = parse_calendar_date(token, date_part, now.year())?;
        self.localize(token, date, time.unwrap_or(NaiveTime::MIN))
    }

    fn is_today_marker(&self, word: &str) -> bool {
        self.today_markers
            .iter()
            .any(|marker| marker.eq_ignore_ascii_case(word))
    }

    fn localize(
        &self,
        token: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<DateTime<Tz>, DateParseError> {
        self.timezone
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .ok_or_else(|| DateParseError::InvalidTime {
                token: token.to_string(),
            })
    }
}

/// Split an optional trailing `HH:MM` off the token
fn split_time(token: &str) -> Result<(&str, Option<NaiveTime>), DateParseError> {
    match token.rsplit_once(char::is_whitespace) {
        Some((rest, last)) if last.contains(':') => {
            let time = NaiveTime::parse_from_str(last, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(last, "%H:%M:%S"))
                .map_err(|_| DateParseError::InvalidTime {
                    token: token.to_string(),
                })?;
            Ok((rest.trim(), Some(time)))
        }
        _ => Ok((token, None)),
    }
}

fn parse_calendar_date(
    token: &str,
    date_part: &str,
    current_year: i32,
) -> Result<NaiveDate, DateParseError> {
    // "5. 6. 2020" and "5.6.2020" are the same date
    let compact: String = date_part.chars().filter(|c| !c.is_whitespace()).collect();
    let year = current_year.to_string();
    let mut components: Vec<&str> = compact.split('.').collect();

    match components.len() {
        2 => components.push(&year),
        3 if components[2].is_empty() => components[2] = &year,
        3 => {}
        found => {
            return Err(DateParseError::WrongArity {
                token: token.to_string(),
                found,
            });
        }
    }

    let mut numbers = [0i32; 3];
    for (slot, component) in numbers.iter_mut().zip(&components) {
        *slot = parse_component(token, component)?;
    }

    let [first, month, last] = numbers;
    let (year, day) = if last > 31 { (last, first) } else { (first, last) };

    let invalid = || DateParseError::InvalidDate {
        token: token.to_string(),
    };
    let month = u32::try_from(month).map_err(|_| invalid())?;
    let day = u32::try_from(day).map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

fn parse_component(token: &str, component: &str) -> Result<i32, DateParseError> {
    let non_numeric = || DateParseError::NonNumeric {
        token: token.to_string(),
        component: component.to_string(),
    };

    if component.is_empty() || !component.chars().all(|c| c.is_ascii_digit()) {
        return Err(non_numeric());
    }

    component.parse().map_err(|_| non_numeric())
}
