// =============================================================================
// Market-hours calendar — ET weekly session plus US financial holidays
// =============================================================================
//
// Function-for-function translation of the Python original's
// `market_hours.py`: same nth/last-weekday helpers, same Anonymous Gregorian
// Easter algorithm, same rule ordering. `now` is an explicit parameter (never
// `Utc::now()` called internally) so tests can assert on fixed instants.
// =============================================================================

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;

const CRYPTO_KEYWORDS: [&str; 4] = ["BTC", "ETH", "PAXG", "USDT"];

/// True if `symbol`'s market is open at instant `now`, evaluated in
/// `America/New_York` local time (DST-aware via `chrono_tz`).
pub fn is_market_open(symbol: &str, now: DateTime<Utc>) -> bool {
    let upper = symbol.to_uppercase();
    if CRYPTO_KEYWORDS.iter().any(|kw| upper.contains(kw)) {
        return true;
    }

    let now_et = now.with_timezone(&New_York);
    let today = now_et.date_naive();
    let weekday = now_et.weekday();
    let hour = now_et.hour();

    if us_holidays(now_et.year()).contains(&today) {
        return false;
    }

    // Saturday: closed all day.
    if weekday == Weekday::Sat {
        return false;
    }

    // Friday after 17:00 ET: closed (weekend begins).
    if weekday == Weekday::Fri && hour >= 17 {
        return false;
    }

    // Sunday before 18:00 ET: closed (includes the 17:00-18:00 overlap).
    if weekday == Weekday::Sun && hour < 18 {
        return false;
    }

    // Daily break, Monday-Thursday, 17:00-18:00 ET.
    if matches!(
        weekday,
        Weekday::Mon | Weekday::Tue | Weekday::Wed | Weekday::Thu
    ) && (17..18).contains(&hour)
    {
        return false;
    }

    true
}

/// The `n`-th occurrence of `weekday` in `year`/`month` (1-indexed).
fn nth_weekday_of_month(year: i32, month: u32, weekday: Weekday, n: u32) -> NaiveDate {
    let first_day = NaiveDate::from_ymd_opt(year, month, 1).expect("valid y/m");
    let first_weekday = first_day.weekday();
    let days_until = (weekday.num_days_from_monday() + 7 - first_weekday.num_days_from_monday()) % 7;
    let first_occurrence = 1 + days_until;
    first_day
        .with_day(first_occurrence + (n - 1) * 7)
        .expect("nth weekday exists within the month")
}

/// The last occurrence of `weekday` in `year`/`month`.
fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> NaiveDate {
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid y/m");

    let mut days_back = (next_month.weekday().num_days_from_monday() + 7
        - weekday.num_days_from_monday())
        % 7;
    if days_back == 0 {
        days_back = 7;
    }
    next_month - Duration::days(days_back as i64)
}

/// Good Friday (Easter - 2 days) via the Anonymous Gregorian algorithm.
fn good_friday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = ((h + l - 7 * m + 114) % 31) + 1;

    let easter = NaiveDate::from_ymd_opt(year, month as u32, day as u32).expect("valid Easter date");
    easter - Duration::days(2)
}

/// Shift a fixed holiday observed on a weekend to the nearest weekday:
/// Saturday -> Friday, Sunday -> Monday.
fn adjust_for_weekend(d: NaiveDate) -> NaiveDate {
    match d.weekday() {
        Weekday::Sat => d - Duration::days(1),
        Weekday::Sun => d + Duration::days(1),
        _ => d,
    }
}

/// COMEX-equivalent US financial holiday set for `year`.
fn us_holidays(year: i32) -> Vec<NaiveDate> {
    vec![
        adjust_for_weekend(NaiveDate::from_ymd_opt(year, 1, 1).unwrap()),
        adjust_for_weekend(NaiveDate::from_ymd_opt(year, 7, 4).unwrap()),
        adjust_for_weekend(NaiveDate::from_ymd_opt(year, 12, 25).unwrap()),
        nth_weekday_of_month(year, 1, Weekday::Mon, 3), // MLK Day
        nth_weekday_of_month(year, 2, Weekday::Mon, 3), // Presidents' Day
        last_weekday_of_month(year, 5, Weekday::Mon),   // Memorial Day
        nth_weekday_of_month(year, 9, Weekday::Mon, 1), // Labor Day
        nth_weekday_of_month(year, 11, Weekday::Thu, 4), // Thanksgiving
        good_friday(year),
    ]
}

/// Build a `DateTime<Utc>` for an Eastern-time wall-clock instant, for tests.
#[cfg(test)]
fn et(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap();
    New_York
        .from_local_datetime(&naive)
        .single()
        .expect("unambiguous local time")
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_always_open() {
        // Thanksgiving Thursday, would otherwise be closed.
        let ts = et(2024, 11, 28, 10, 0);
        assert!(is_market_open("BTC-USD", ts));
        assert!(is_market_open("PAXG-USD", ts));
    }

    #[test]
    fn saturday_closed() {
        let ts = et(2024, 11, 30, 10, 0); // Saturday
        assert!(!is_market_open("XAU-USD", ts));
    }

    #[test]
    fn thanksgiving_closed() {
        let ts = et(2024, 11, 28, 10, 0); // Thursday, Thanksgiving 2024
        assert!(!is_market_open("XAU-USD", ts));
    }

    #[test]
    fn sunday_before_18_closed_after_open() {
        assert!(!is_market_open("XAU-USD", et(2024, 12, 1, 17, 59)));
        assert!(is_market_open("XAU-USD", et(2024, 12, 1, 18, 30)));
    }

    #[test]
    fn friday_close_boundary() {
        assert!(is_market_open("XAU-USD", et(2024, 11, 29, 16, 59)));
        assert!(!is_market_open("XAU-USD", et(2024, 11, 29, 17, 0)));
    }

    #[test]
    fn daily_break_midweek() {
        assert!(!is_market_open("XAU-USD", et(2024, 11, 27, 17, 30))); // Wednesday
        assert!(is_market_open("XAU-USD", et(2024, 11, 27, 18, 0)));
    }

    #[test]
    fn idempotent_on_symbol_and_instant() {
        let ts = et(2024, 11, 27, 12, 0);
        assert_eq!(is_market_open("XAU-USD", ts), is_market_open("XAU-USD", ts));
    }

    #[test]
    fn good_friday_2024_is_closed() {
        // Good Friday 2024 is March 29.
        assert!(!is_market_open("XAU-USD", et(2024, 3, 29, 10, 0)));
    }
}
