//! Day/night window arithmetic.
//!
//! Every function takes `now` explicitly and returns fresh values; nothing is
//! cached between calls. A night window belongs to the calendar date on which
//! it starts, so at 03:00 the current night is the one that began yesterday.

use std::fmt;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::domain::TimeWindow;
use crate::{Error, Result};

/// Shortest allowed day or night window.
const MIN_WINDOW: Duration = Duration::hours(1);

/// Upper bound when searching for the end of a DST gap.
const MAX_DST_GAP_MINUTES: i64 = 180;

/// Which half of the day a window covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Day,
    Night,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day => f.write_str("day"),
            Self::Night => f.write_str("night"),
        }
    }
}

/// Computes report windows from two local boundary times.
#[derive(Debug, Clone)]
pub struct TimeWindowCalculator {
    day_boundary: NaiveTime,
    night_boundary: NaiveTime,
    tz: Tz,
}

impl TimeWindowCalculator {
    /// Create a calculator. The day boundary must come before the night
    /// boundary, and both windows must last at least an hour.
    pub fn new(day_boundary: NaiveTime, night_boundary: NaiveTime, tz: Tz) -> Result<Self> {
        if day_boundary >= night_boundary {
            return Err(Error::config(format!(
                "day boundary {} must be earlier than night boundary {}",
                day_boundary, night_boundary
            )));
        }

        let day_length = night_boundary - day_boundary;
        if day_length < MIN_WINDOW || Duration::days(1) - day_length < MIN_WINDOW {
            return Err(Error::config(format!(
                "day window {}..{} leaves a day or night window shorter than an hour",
                day_boundary, night_boundary
            )));
        }

        Ok(Self {
            day_boundary,
            night_boundary,
            tz,
        })
    }

    pub fn day_boundary(&self) -> NaiveTime {
        self.day_boundary
    }

    pub fn night_boundary(&self) -> NaiveTime {
        self.night_boundary
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Calendar date of `now` in the configured zone.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// Resolve a local wall-clock time to an instant.
    ///
    /// Ambiguous times (clocks going back) resolve to the earliest instant;
    /// times inside a gap (clocks going forward) resolve to the end of the gap.
    fn resolve(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let naive = date.and_time(time);
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            LocalResult::None => (1..=MAX_DST_GAP_MINUTES)
                .find_map(|m| {
                    self.tz
                        .from_local_datetime(&(naive + Duration::minutes(m)))
                        .earliest()
                })
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
        }
    }

    /// Day window of the given local date: [date at day, date at night).
    pub fn day_window_on(&self, date: NaiveDate) -> TimeWindow {
        TimeWindow::between(
            self.resolve(date, self.day_boundary),
            self.resolve(date, self.night_boundary),
        )
    }

    /// Night window starting on the given local date:
    /// [date at night, date + 1 at day).
    pub fn night_window_starting(&self, date: NaiveDate) -> TimeWindow {
        TimeWindow::between(
            self.resolve(date, self.night_boundary),
            self.resolve(next_day(date), self.day_boundary),
        )
    }

    /// [today at day boundary, today at night boundary).
    pub fn day_window(&self, now: DateTime<Utc>) -> TimeWindow {
        self.day_window_on(self.local_date(now))
    }

    /// [today at night boundary, tomorrow at day boundary). Crosses midnight.
    pub fn night_window(&self, now: DateTime<Utc>) -> TimeWindow {
        self.night_window_starting(self.local_date(now))
    }

    /// Tomorrow at the day boundary, pushed forward a day at a time until it is
    /// strictly after `now`.
    pub fn next_morning_report_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = next_day(self.local_date(now));
        let mut candidate = self.resolve(date, self.day_boundary);
        while candidate <= now {
            date = next_day(date);
            candidate = self.resolve(date, self.day_boundary);
        }
        candidate
    }

    /// Earliest of today's day boundary, today's night boundary and
    /// tomorrow's day boundary that is strictly after `now`.
    pub fn next_evening_report_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.local_date(now);
        [
            self.resolve(today, self.day_boundary),
            self.resolve(today, self.night_boundary),
            self.resolve(next_day(today), self.day_boundary),
        ]
        .into_iter()
        .find(|candidate| *candidate > now)
        .unwrap_or_else(|| self.next_morning_report_time(now))
    }

    /// The window that contains `now`, and whether it is a day or a night.
    pub fn window_at(&self, now: DateTime<Utc>) -> (Period, TimeWindow) {
        let today = self.local_date(now);
        let day = self.day_window_on(today);

        if now < day.start() {
            (Period::Night, self.night_window_starting(prev_day(today)))
        } else if day.contains(now) {
            (Period::Day, day)
        } else {
            (Period::Night, self.night_window_starting(today))
        }
    }

    /// Most recent window of `period` that ended at or before `now`.
    pub fn last_completed(&self, period: Period, now: DateTime<Utc>) -> TimeWindow {
        let today = self.local_date(now);
        let window_for = |date: NaiveDate| match period {
            Period::Day => self.day_window_on(date),
            Period::Night => self.night_window_starting(date),
        };

        let mut date = match period {
            Period::Day => today,
            Period::Night => prev_day(today),
        };
        let mut window = window_for(date);
        while !window.is_complete_at(now) {
            date = prev_day(date);
            window = window_for(date);
        }
        window
    }
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}

fn prev_day(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc() -> TimeWindowCalculator {
        TimeWindowCalculator::new(hm(8, 0), hm(23, 0), Tz::UTC).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, m, 0).unwrap()
    }

    #[test]
    fn test_rejects_inverted_boundaries() {
        assert!(TimeWindowCalculator::new(hm(23, 0), hm(8, 0), Tz::UTC).is_err());
        assert!(TimeWindowCalculator::new(hm(8, 0), hm(8, 0), Tz::UTC).is_err());
        assert!(TimeWindowCalculator::new(hm(8, 0), hm(8, 30), Tz::UTC).is_err());
        assert!(TimeWindowCalculator::new(hm(0, 30), hm(23, 59), Tz::UTC).is_err());
    }

    #[test]
    fn test_day_and_night_window() {
        let c = calc();
        let now = utc(2024, 1, 1, 12, 0);

        let day = c.day_window(now);
        assert_eq!(day.start(), utc(2024, 1, 1, 8, 0));
        assert_eq!(day.end(), utc(2024, 1, 1, 23, 0));

        let night = c.night_window(now);
        assert_eq!(night.start(), utc(2024, 1, 1, 23, 0));
        assert_eq!(night.end(), utc(2024, 1, 2, 8, 0));
    }

    #[test]
    fn test_next_morning_report_is_tomorrow() {
        let c = calc();
        assert_eq!(
            c.next_morning_report_time(utc(2024, 1, 1, 3, 0)),
            utc(2024, 1, 2, 8, 0)
        );
        assert_eq!(
            c.next_morning_report_time(utc(2024, 1, 1, 23, 30)),
            utc(2024, 1, 2, 8, 0)
        );
    }

    #[test]
    fn test_next_evening_report_picks_earliest_future_boundary() {
        let c = calc();
        assert_eq!(
            c.next_evening_report_time(utc(2024, 1, 1, 7, 0)),
            utc(2024, 1, 1, 8, 0)
        );
        assert_eq!(
            c.next_evening_report_time(utc(2024, 1, 1, 8, 0)),
            utc(2024, 1, 1, 23, 0)
        );
        assert_eq!(
            c.next_evening_report_time(utc(2024, 1, 1, 23, 0)),
            utc(2024, 1, 2, 8, 0)
        );
    }

    #[test]
    fn test_window_at_after_midnight_belongs_to_previous_night() {
        let c = calc();
        let (period, window) = c.window_at(utc(2024, 1, 2, 3, 0));
        assert_eq!(period, Period::Night);
        assert_eq!(window.start(), utc(2024, 1, 1, 23, 0));
        assert_eq!(window.end(), utc(2024, 1, 2, 8, 0));
    }

    #[test]
    fn test_window_at_boundaries() {
        let c = calc();
        assert_eq!(c.window_at(utc(2024, 1, 1, 8, 0)).0, Period::Day);
        assert_eq!(c.window_at(utc(2024, 1, 1, 22, 59)).0, Period::Day);

        let (period, window) = c.window_at(utc(2024, 1, 1, 23, 5));
        assert_eq!(period, Period::Night);
        assert_eq!(window.start(), utc(2024, 1, 1, 23, 0));
    }

    #[test]
    fn test_last_completed_night() {
        let c = calc();

        // Evaluated after midnight but before the day boundary: last night is
        // still running, so the completed one started two dates back.
        let w = c.last_completed(Period::Night, utc(2024, 1, 2, 3, 0));
        assert_eq!(w.start(), utc(2023, 12, 31, 23, 0));
        assert_eq!(w.end(), utc(2024, 1, 1, 8, 0));

        let w = c.last_completed(Period::Night, utc(2024, 1, 2, 8, 0));
        assert_eq!(w.start(), utc(2024, 1, 1, 23, 0));
        assert_eq!(w.end(), utc(2024, 1, 2, 8, 0));

        let w = c.last_completed(Period::Night, utc(2024, 1, 2, 23, 30));
        assert_eq!(w.start(), utc(2024, 1, 1, 23, 0));
    }

    #[test]
    fn test_last_completed_day() {
        let c = calc();
        let w = c.last_completed(Period::Day, utc(2024, 1, 2, 12, 0));
        assert_eq!(w.start(), utc(2024, 1, 1, 8, 0));
        assert_eq!(w.end(), utc(2024, 1, 1, 23, 0));

        let w = c.last_completed(Period::Day, utc(2024, 1, 2, 23, 0));
        assert_eq!(w.start(), utc(2024, 1, 2, 8, 0));
    }

    #[test]
    fn test_windows_in_local_zone() {
        let c = TimeWindowCalculator::new(hm(8, 0), hm(23, 0), chrono_tz::Europe::Moscow).unwrap();
        // 21:30 UTC is 00:30 in Moscow (UTC+3): the night began at 20:00 UTC.
        let (period, window) = c.window_at(utc(2024, 1, 1, 21, 30));
        assert_eq!(period, Period::Night);
        assert_eq!(window.start(), utc(2024, 1, 1, 20, 0));
        assert_eq!(window.end(), utc(2024, 1, 2, 5, 0));
    }

    #[test]
    fn test_night_always_spans_midnight_and_day_never_does() {
        let zones = [Tz::UTC, chrono_tz::Europe::Berlin, chrono_tz::America::New_York];
        let boundaries = [(hm(6, 0), hm(20, 0)), (hm(8, 0), hm(23, 0)), (hm(1, 0), hm(22, 30))];

        for tz in zones {
            for (day, night) in boundaries {
                let c = TimeWindowCalculator::new(day, night, tz).unwrap();
                // Walk a year in 7-hour steps to cover DST changes.
                let mut now = utc(2024, 1, 1, 0, 0);
                while now < utc(2025, 1, 1, 0, 0) {
                    let n = c.night_window(now);
                    let d = c.day_window(now);
                    let n_start = n.start().with_timezone(&tz).date_naive();
                    let n_end = n.end().with_timezone(&tz).date_naive();
                    assert_eq!(n_end, n_start.succ_opt().unwrap(), "night {n} in {tz}");
                    assert_eq!(
                        d.start().with_timezone(&tz).date_naive(),
                        d.end().with_timezone(&tz).date_naive(),
                        "day {d} in {tz}"
                    );
                    assert!(d.end() <= n.start());

                    let (_, current) = c.window_at(now);
                    assert!(current.contains(now), "{now} not in {current} ({tz})");
                    now += Duration::hours(7);
                }
            }
        }
    }

    #[test]
    fn test_dst_gap_resolves_forward() {
        // Europe/Berlin skips 02:00-03:00 on 2024-03-31.
        let c = TimeWindowCalculator::new(hm(2, 30), hm(22, 0), chrono_tz::Europe::Berlin).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let day = c.day_window_on(date);
        // 03:00 CEST == 01:00 UTC
        assert_eq!(day.start(), utc(2024, 3, 31, 1, 0));
    }
}
