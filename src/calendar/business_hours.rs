//! Business-hours predicate and "next business morning" computation.

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
    Weekday,
};
use chrono_tz::Tz;
use tracing::warn;

use crate::config::CalendarConfig;
use crate::models::ChannelConfig;

use super::holidays::{next_day, HolidayCalendar};

/// Search horizon for the next business day; covers any realistic run of
/// weekends and holidays.
const MAX_LOOKAHEAD_DAYS: usize = 366;

/// Parse a local `HH:MM` string. Returns `None` for empty or malformed input.
#[must_use]
pub fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveTime::parse_from_str(trimmed, "%H:%M").ok()
}

/// Resolve an IANA zone name, falling back to `fallback` when empty or unknown.
#[must_use]
pub fn resolve_timezone(name: &str, fallback: Tz) -> Tz {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return fallback;
    }
    trimmed.parse().unwrap_or_else(|_| {
        warn!(timezone = trimmed, "unknown timezone; using fallback");
        fallback
    })
}

fn default_start() -> NaiveTime {
    NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default()
}

/// Per-zone working-day calendar shared by every channel.
#[derive(Debug, Clone)]
pub struct BusinessCalendar {
    holidays: HolidayCalendar,
    default_tz: Tz,
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self::new(HolidayCalendar::default(), Tz::Asia__Tokyo)
    }
}

impl BusinessCalendar {
    /// Build a calendar from a holiday set and the fallback zone.
    #[must_use]
    pub fn new(holidays: HolidayCalendar, default_tz: Tz) -> Self {
        Self {
            holidays,
            default_tz,
        }
    }

    /// Build a calendar from the `[calendar]` config section.
    #[must_use]
    pub fn from_config(config: &CalendarConfig) -> Self {
        Self::new(
            HolidayCalendar::new(config.extra_holiday_dates()),
            config.default_tz(),
        )
    }

    /// Zone a config's working window is expressed in.
    #[must_use]
    pub fn timezone_for(&self, cfg: &ChannelConfig) -> Tz {
        resolve_timezone(&cfg.timezone, self.default_tz)
    }

    /// Zone of `cfg`, or the default zone when there is no config.
    #[must_use]
    pub fn timezone_or_default(&self, cfg: Option<&ChannelConfig>) -> Tz {
        cfg.map_or(self.default_tz, |c| self.timezone_for(c))
    }

    /// Weekday and not a holiday in `tz`.
    #[must_use]
    pub fn is_business_day(&self, date: NaiveDate, tz: Tz) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
            && !self.holidays.is_holiday(date, tz)
    }

    /// Whether `t` falls inside `cfg`'s working window.
    ///
    /// A config without hours (or with unparseable hours) is never gated.
    /// Weekends and holidays in the config's zone are always outside. When
    /// `start >= end` the window wraps past midnight.
    #[must_use]
    pub fn within_business_hours(&self, cfg: &ChannelConfig, t: DateTime<Utc>) -> bool {
        if !cfg.has_business_hours() {
            return true;
        }
        let (Some(start), Some(end)) = (
            parse_hhmm(&cfg.business_hours_start),
            parse_hhmm(&cfg.business_hours_end),
        ) else {
            warn!(
                channel = %cfg.channel_id,
                start = %cfg.business_hours_start,
                end = %cfg.business_hours_end,
                "unparseable business hours; not gating"
            );
            return true;
        };

        let tz = self.timezone_for(cfg);
        let local = t.with_timezone(&tz);
        if !self.is_business_day(local.date_naive(), tz) {
            return false;
        }

        let minute = minute_of_day(local.time());
        let (start, end) = (minute_of_day(start), minute_of_day(end));
        if start < end {
            minute >= start && minute < end
        } else {
            minute >= start || minute < end
        }
    }

    /// The next instant at the configured start time on a business day.
    ///
    /// Today counts when it is a business day and `t` is strictly before
    /// the start. Missing or malformed settings fall back to 10:00 in the
    /// calendar's default zone. The result stays in the local zone.
    #[must_use]
    pub fn next_business_morning(
        &self,
        t: DateTime<Utc>,
        cfg: Option<&ChannelConfig>,
    ) -> DateTime<Tz> {
        let tz = self.timezone_or_default(cfg);
        let start = cfg
            .and_then(|c| parse_hhmm(&c.business_hours_start))
            .unwrap_or_else(default_start);

        let local = t.with_timezone(&tz);
        let today = local.date_naive();
        if self.is_business_day(today, tz) && local.time() < start {
            return at_local(tz, today.and_time(start));
        }

        let mut day = next_day(today);
        for _ in 0..MAX_LOOKAHEAD_DAYS {
            if self.is_business_day(day, tz) {
                return at_local(tz, day.and_time(start));
            }
            day = next_day(day);
        }
        at_local(tz, day.and_time(start))
    }
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Resolve a local wall-clock time, stepping over DST gaps.
fn at_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}
