//! Public holiday calendar.
//!
//! Japanese national holidays are computed for `Asia/Tokyo` from the
//! statutory rules (fixed dates, Happy Monday system, equinox days,
//! substitute and citizens' holidays). Operator-configured extra dates
//! apply in every zone.

use std::collections::BTreeSet;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use chrono_tz::Tz;

/// Holiday lookup consulted by the business-hours predicate.
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    extra: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    /// Calendar with additional non-business days on top of the locale rules.
    #[must_use]
    pub fn new(extra: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            extra: extra.into_iter().collect(),
        }
    }

    /// Whether `date` (a local calendar day in `tz`) is a holiday.
    #[must_use]
    pub fn is_holiday(&self, date: NaiveDate, tz: Tz) -> bool {
        if self.extra.contains(&date) {
            return true;
        }
        match tz {
            Tz::Asia__Tokyo | Tz::Japan => is_japanese_holiday(date),
            _ => false,
        }
    }
}

/// Whether `date` is a Japanese national holiday, including substitute
/// holidays and citizens' holidays.
#[must_use]
pub fn is_japanese_holiday(date: NaiveDate) -> bool {
    is_statutory_holiday(date) || is_substitute_holiday(date) || is_citizens_holiday(date)
}

/// A holiday falling on Sunday moves to the next day that is not itself a
/// holiday.
fn is_substitute_holiday(date: NaiveDate) -> bool {
    if date.year() < 1973 || is_statutory_holiday(date) {
        return false;
    }
    let mut cursor = date.pred_opt();
    while let Some(day) = cursor {
        if !is_statutory_holiday(day) {
            return false;
        }
        if day.weekday() == Weekday::Sun {
            return true;
        }
        cursor = day.pred_opt();
    }
    false
}

/// An ordinary day sandwiched between two holidays is itself a holiday.
fn is_citizens_holiday(date: NaiveDate) -> bool {
    if date.year() < 1988 || date.weekday() == Weekday::Sun || is_statutory_holiday(date) {
        return false;
    }
    let before = date.pred_opt().is_some_and(is_statutory_holiday);
    let after = date.succ_opt().is_some_and(is_statutory_holiday);
    before && after
}

fn is_statutory_holiday(date: NaiveDate) -> bool {
    let year = date.year();
    let month = date.month();
    let day = date.day();

    match month {
        1 => day == 1 || (year >= 2000 && is_nth_weekday(date, Weekday::Mon, 2)),
        2 => day == 11 || (year >= 2020 && day == 23),
        3 => vernal_equinox_day(year) == Some(day),
        4 => day == 29,
        5 => (3..=5).contains(&day),
        7 => match year {
            2020 => day == 23 || day == 24,
            2021 => day == 22 || day == 23,
            _ => year >= 2003 && is_nth_weekday(date, Weekday::Mon, 3),
        },
        8 => match year {
            2020 => day == 10,
            2021 => day == 8,
            _ => year >= 2016 && day == 11,
        },
        9 => {
            (year >= 2003 && is_nth_weekday(date, Weekday::Mon, 3))
                || autumnal_equinox_day(year) == Some(day)
        }
        10 => match year {
            2020 | 2021 => false,
            _ => year >= 2000 && is_nth_weekday(date, Weekday::Mon, 2),
        },
        11 => day == 3 || day == 23,
        12 => (1989..=2018).contains(&year) && day == 23,
        _ => false,
    }
}

fn is_nth_weekday(date: NaiveDate, weekday: Weekday, n: u8) -> bool {
    NaiveDate::from_weekday_of_month_opt(date.year(), date.month(), weekday, n) == Some(date)
}

/// Day of March for the vernal equinox (valid 1980–2099).
fn vernal_equinox_day(year: i32) -> Option<u32> {
    equinox_day(year, 20.8431)
}

/// Day of September for the autumnal equinox (valid 1980–2099).
fn autumnal_equinox_day(year: i32) -> Option<u32> {
    equinox_day(year, 23.2488)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn equinox_day(year: i32, base: f64) -> Option<u32> {
    if !(1980..=2099).contains(&year) {
        return None;
    }
    let offset = year - 1980;
    let day = (base + 0.242_194 * f64::from(offset)).floor() as i32 - offset / 4;
    u32::try_from(day).ok()
}

/// Next calendar day, saturating at the end of the representable range.
pub(crate) fn next_day(date: NaiveDate) -> NaiveDate {
    date.checked_add_days(Days::new(1)).unwrap_or(date)
}
