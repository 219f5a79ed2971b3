use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Tokyo;
use chrono_tz::Tz;

use review_herald::calendar::{parse_hhmm, resolve_timezone, BusinessCalendar, HolidayCalendar};
use review_herald::models::ChannelConfig;

fn jst(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Tokyo
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("valid time")
        .with_timezone(&Utc)
}

fn config(start: &str, end: &str) -> ChannelConfig {
    let mut cfg = ChannelConfig::new("C".into(), "needs-review".into(), jst(2024, 1, 1, 0, 0));
    cfg.business_hours_start = start.into();
    cfg.business_hours_end = end.into();
    cfg
}

#[test]
fn parse_hhmm_accepts_valid_times_only() {
    assert!(parse_hhmm("09:00").is_some());
    assert!(parse_hhmm(" 18:30 ").is_some());
    assert!(parse_hhmm("").is_none());
    assert!(parse_hhmm("24:00").is_none());
    assert!(parse_hhmm("noon").is_none());
}

#[test]
fn resolve_timezone_falls_back() {
    assert_eq!(resolve_timezone("Europe/Paris", Tokyo), Tz::Europe__Paris);
    assert_eq!(resolve_timezone("", Tokyo), Tokyo);
    assert_eq!(resolve_timezone("Nowhere/Land", Tokyo), Tokyo);
}

#[test]
fn window_is_half_open() {
    let cal = BusinessCalendar::default();
    let cfg = config("10:00", "19:00");
    // Tuesday 2024-08-27.
    assert!(!cal.within_business_hours(&cfg, jst(2024, 8, 27, 9, 59)));
    assert!(cal.within_business_hours(&cfg, jst(2024, 8, 27, 10, 0)));
    assert!(cal.within_business_hours(&cfg, jst(2024, 8, 27, 18, 59)));
    assert!(!cal.within_business_hours(&cfg, jst(2024, 8, 27, 19, 0)));
}

#[test]
fn weekends_and_holidays_are_outside() {
    let cal = BusinessCalendar::default();
    let cfg = config("10:00", "19:00");
    assert!(!cal.within_business_hours(&cfg, jst(2024, 8, 31, 12, 0)));
    assert!(!cal.within_business_hours(&cfg, jst(2024, 9, 1, 12, 0)));
    // Respect for the Aged Day.
    assert!(!cal.within_business_hours(&cfg, jst(2024, 9, 16, 12, 0)));
}

#[test]
fn missing_hours_never_gate() {
    let cal = BusinessCalendar::default();
    let cfg = config("", "");
    assert!(cal.within_business_hours(&cfg, jst(2024, 8, 31, 3, 0)));
}

#[test]
fn wrapping_window_spans_midnight() {
    let cal = BusinessCalendar::default();
    let cfg = config("22:00", "06:00");
    assert!(cal.within_business_hours(&cfg, jst(2024, 8, 27, 23, 0)));
    assert!(cal.within_business_hours(&cfg, jst(2024, 8, 28, 5, 59)));
    assert!(!cal.within_business_hours(&cfg, jst(2024, 8, 28, 12, 0)));
}

#[test]
fn window_uses_config_zone() {
    let cal = BusinessCalendar::default();
    let mut cfg = config("09:00", "17:00");
    cfg.timezone = "Europe/London".into();
    // 2024-08-27 10:00 BST is 09:00 UTC.
    let ten_london = Utc.with_ymd_and_hms(2024, 8, 27, 9, 0, 0).single().expect("utc");
    assert!(cal.within_business_hours(&cfg, ten_london));
    // 10:00 JST is 02:00 BST.
    assert!(!cal.within_business_hours(&cfg, jst(2024, 8, 27, 10, 0)));
}

#[test]
fn next_morning_same_day_before_start() {
    let cal = BusinessCalendar::default();
    let cfg = config("10:00", "19:00");
    let morning = cal.next_business_morning(jst(2024, 8, 28, 7, 0), Some(&cfg));
    assert_eq!(morning.with_timezone(&Utc), jst(2024, 8, 28, 10, 0));
}

#[test]
fn next_morning_skips_weekend() {
    let cal = BusinessCalendar::default();
    let cfg = config("09:00", "18:00");
    // Friday evening resumes Monday.
    let morning = cal.next_business_morning(jst(2024, 8, 30, 20, 0), Some(&cfg));
    assert_eq!(morning.with_timezone(&Utc), jst(2024, 9, 2, 9, 0));
}

#[test]
fn next_morning_skips_holiday_run() {
    let cal = BusinessCalendar::default();
    let cfg = config("09:00", "18:00");
    // Friday 2024-09-13; Monday 09-16 is a holiday.
    let morning = cal.next_business_morning(jst(2024, 9, 13, 19, 0), Some(&cfg));
    assert_eq!(morning.with_timezone(&Utc), jst(2024, 9, 17, 9, 0));
}

#[test]
fn next_morning_without_config_uses_ten_o_clock() {
    let cal = BusinessCalendar::default();
    let morning = cal.next_business_morning(jst(2024, 8, 27, 12, 0), None);
    assert_eq!(morning.with_timezone(&Utc), jst(2024, 8, 28, 10, 0));
}

#[test]
fn extra_holidays_close_the_day() {
    let day = NaiveDate::from_ymd_opt(2024, 8, 28).expect("date");
    let cal = BusinessCalendar::new(HolidayCalendar::new([day]), Tokyo);
    let cfg = config("10:00", "19:00");
    assert!(!cal.within_business_hours(&cfg, jst(2024, 8, 28, 12, 0)));
    let morning = cal.next_business_morning(jst(2024, 8, 27, 20, 0), Some(&cfg));
    assert_eq!(morning.with_timezone(&Utc), jst(2024, 8, 29, 10, 0));
}
