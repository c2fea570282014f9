//! Timer primitives: fixed intervals, a daily wall-clock trigger, and the
//! market-hours gate.

use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use wheel_trade_core::{ScheduleConfig, WheelResult};

/// Which local days a [`Trigger::DailyAt`] fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Days {
    All,
    /// Monday through Friday.
    Weekdays,
    Only(Weekday),
}

impl Days {
    #[must_use]
    pub fn includes(self, day: Weekday) -> bool {
        match self {
            Self::All => true,
            Self::Weekdays => !matches!(day, Weekday::Sat | Weekday::Sun),
            Self::Only(only) => day == only,
        }
    }
}

/// When a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Every fixed interval.
    Every(Duration),
    /// At a local wall-clock time on the selected days.
    DailyAt { time: NaiveTime, tz: Tz, days: Days },
}

impl Trigger {
    /// First firing strictly after `now`.
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Self::Every(interval) => {
                now + chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::zero())
            }
            Self::DailyAt { time, tz, days } => {
                let mut date = now.with_timezone(&tz).date_naive();
                // a week plus slack for a DST gap swallowing the wall-clock time
                for _ in 0..10 {
                    if !days.includes(date.weekday()) {
                        date = date + chrono::Days::new(1);
                        continue;
                    }
                    if let Some(at) = tz.from_local_datetime(&date.and_time(time)).earliest() {
                        let at = at.with_timezone(&Utc);
                        if at > now {
                            return at;
                        }
                    }
                    date = date + chrono::Days::new(1);
                }
                now + chrono::Duration::days(7)
            }
        }
    }
}

/// Weekday trading window in the exchange's timezone. No holiday calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketHours {
    pub tz: Tz,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl MarketHours {
    /// # Errors
    ///
    /// Returns a configuration error for a bad timezone or clock time.
    pub fn from_schedule(schedule: &ScheduleConfig) -> WheelResult<Self> {
        Ok(Self {
            tz: schedule.tz()?,
            open: schedule.open_time()?,
            close: schedule.close_time()?,
        })
    }

    #[must_use]
    pub fn is_open(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.tz);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let t = local.time();
        self.open <= t && t <= self.close
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours() -> MarketHours {
        MarketHours {
            tz: chrono_tz::America::New_York,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        }
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn market_open_on_weekday_afternoon() {
        // Wednesday 2025-01-15 12:00 EST
        assert!(hours().is_open(utc("2025-01-15T17:00:00Z")));
    }

    #[test]
    fn market_closed_before_open_and_after_close() {
        assert!(!hours().is_open(utc("2025-01-15T14:29:00Z")));
        assert!(hours().is_open(utc("2025-01-15T14:30:00Z")));
        assert!(hours().is_open(utc("2025-01-15T21:00:00Z")));
        assert!(!hours().is_open(utc("2025-01-15T21:01:00Z")));
    }

    #[test]
    fn market_closed_on_weekends() {
        // Saturday noon EST
        assert!(!hours().is_open(utc("2025-01-18T17:00:00Z")));
    }

    #[test]
    fn window_follows_daylight_saving() {
        // 2025-07-16 09:45 EDT = 13:45 UTC
        assert!(hours().is_open(utc("2025-07-16T13:45:00Z")));
    }

    #[test]
    fn every_adds_the_interval() {
        let now = utc("2025-01-15T17:00:00Z");
        let next = Trigger::Every(Duration::from_secs(3600)).next_after(now);
        assert_eq!(next, utc("2025-01-15T18:00:00Z"));
    }

    #[test]
    fn daily_fires_today_then_tomorrow() {
        let trigger = Trigger::DailyAt {
            time: NaiveTime::from_hms_opt(16, 5, 0).unwrap(),
            tz: chrono_tz::America::New_York,
            days: Days::All,
        };
        let before = utc("2025-01-15T20:00:00Z");
        assert_eq!(trigger.next_after(before), utc("2025-01-15T21:05:00Z"));

        let at = utc("2025-01-15T21:05:00Z");
        assert_eq!(trigger.next_after(at), utc("2025-01-16T21:05:00Z"));
    }

    #[test]
    fn weekday_trigger_skips_the_weekend() {
        let trigger = Trigger::DailyAt {
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            tz: chrono_tz::America::New_York,
            days: Days::Weekdays,
        };
        // Friday 2025-01-17 10:00 EST, past the Friday slot
        let friday = utc("2025-01-17T15:00:00Z");
        assert_eq!(trigger.next_after(friday), utc("2025-01-20T14:00:00Z"));
        // Saturday goes to Monday too
        assert_eq!(trigger.next_after(utc("2025-01-18T12:00:00Z")), utc("2025-01-20T14:00:00Z"));
        // Monday before 09:00 fires the same morning
        assert_eq!(trigger.next_after(utc("2025-01-20T13:00:00Z")), utc("2025-01-20T14:00:00Z"));
    }

    #[test]
    fn weekly_trigger_fires_on_its_day_only() {
        let trigger = Trigger::DailyAt {
            time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            tz: chrono_tz::America::New_York,
            days: Days::Only(Weekday::Sun),
        };
        // Wednesday 2025-01-15 -> Sunday 2025-01-19 18:00 EST
        assert_eq!(trigger.next_after(utc("2025-01-15T17:00:00Z")), utc("2025-01-19T23:00:00Z"));
        // at the slot itself, the next one is a week later
        assert_eq!(trigger.next_after(utc("2025-01-19T23:00:00Z")), utc("2025-01-26T23:00:00Z"));
        // across the March DST change: Sunday 2025-03-09 18:00 EDT
        assert_eq!(trigger.next_after(utc("2025-03-05T12:00:00Z")), utc("2025-03-09T22:00:00Z"));
    }

    #[test]
    fn days_filter() {
        assert!(Days::All.includes(Weekday::Sat));
        assert!(Days::Weekdays.includes(Weekday::Fri));
        assert!(!Days::Weekdays.includes(Weekday::Sun));
        assert!(Days::Only(Weekday::Sun).includes(Weekday::Sun));
        assert!(!Days::Only(Weekday::Sun).includes(Weekday::Mon));
    }
}
