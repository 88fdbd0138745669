//! iCalendar value types: date-times with their zone, durations and text.

use std::fmt;

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;

/// The zone a date-time value was written in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IcalZone {
    /// Trailing `Z`.
    Utc,
    /// No zone at all (including every date value).
    Floating,
    /// A `TZID` parameter, kept verbatim.
    Named(String),
}

impl IcalZone {
    /// Resolves the zone, using `floating` for floating values and for
    /// identifiers chrono-tz does not know.
    pub fn resolve(&self, floating: Tz) -> Tz {
        match self {
            Self::Utc => Tz::UTC,
            Self::Floating => floating,
            Self::Named(name) => resolve_tzid(name).unwrap_or(floating),
        }
    }
}

/// Looks up a `TZID` in the IANA database.
///
/// Tolerates quoting and the leading slash some producers emit.
pub fn resolve_tzid(name: &str) -> Option<Tz> {
    let name = name.trim().trim_matches('"').trim_start_matches('/');
    name.parse::<Tz>().ok()
}

/// A DATE or DATE-TIME value as written in the feed.
///
/// `wall` is the literal wall-clock reading; it only becomes an instant once
/// combined with `zone`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IcalTime {
    /// Wall-clock reading (midnight for dates).
    pub wall: NaiveDateTime,
    /// Whether the value is a DATE.
    pub is_date: bool,
    /// The zone the reading belongs to.
    pub zone: IcalZone,
}

impl IcalTime {
    /// Creates a DATE value.
    pub fn date(date: NaiveDate) -> Self {
        Self {
            wall: date.and_time(NaiveTime::MIN),
            is_date: true,
            zone: IcalZone::Floating,
        }
    }

    /// Creates a DATE-TIME value.
    pub fn date_time(wall: NaiveDateTime, zone: IcalZone) -> Self {
        Self {
            wall,
            is_date: false,
            zone,
        }
    }

    /// Parses a single value.
    ///
    /// `value_type` is the `VALUE` parameter and `tzid` the `TZID` parameter.
    /// PERIOD values are reduced to their start.
    pub fn parse(raw: &str, value_type: Option<&str>, tzid: Option<&str>) -> Option<Self> {
        let raw = raw.trim();
        let raw = raw.split('/').next().unwrap_or(raw);
        let is_date = value_type.is_some_and(|v| v.eq_ignore_ascii_case("DATE")) || raw.len() == 8;

        if is_date {
            let date = NaiveDate::parse_from_str(raw, "%Y%m%d").ok()?;
            return Some(Self::date(date));
        }

        if let Some(utc) = raw.strip_suffix('Z') {
            let wall = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").ok()?;
            return Some(Self::date_time(wall, IcalZone::Utc));
        }

        let wall = NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S").ok()?;
        let zone = match tzid {
            Some(name) if !name.trim().is_empty() => IcalZone::Named(name.to_string()),
            _ => IcalZone::Floating,
        };
        Some(Self::date_time(wall, zone))
    }

    /// The zone name: the TZID, "UTC", or "floating".
    pub fn timezone(&self) -> &str {
        match &self.zone {
            IcalZone::Utc => "UTC",
            IcalZone::Floating => "floating",
            IcalZone::Named(name) => name,
        }
    }

    /// Returns the same value shifted by `duration` of wall-clock time, or
    /// `None` when the result is out of range.
    pub fn add(&self, duration: Duration) -> Option<Self> {
        Some(Self {
            wall: self.wall.checked_add_signed(duration)?,
            is_date: self.is_date,
            zone: self.zone.clone(),
        })
    }

    /// The instant this value denotes.
    pub fn to_utc(&self, floating: Tz) -> DateTime<Utc> {
        localize(self.wall, self.zone.resolve(floating))
    }

    /// The wall-clock reading of this value's instant in another zone.
    pub fn wall_in(&self, zone: &IcalZone, floating: Tz) -> NaiveDateTime {
        if self.is_date || self.zone == *zone {
            return self.wall;
        }
        self.to_utc(floating)
            .with_timezone(&zone.resolve(floating))
            .naive_local()
    }
}

impl fmt::Display for IcalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_date {
            write!(f, "{}", self.wall.format("%Y-%m-%d"))
        } else {
            write!(f, "{}", self.wall.format("%Y-%m-%dT%H:%M:%S"))
        }
    }
}

/// Moves a wall-clock reading into `tz`.
///
/// Ambiguous readings (clocks going back) take the earlier instant. Readings
/// inside a gap (clocks going forward) keep the offset in force before the gap,
/// which lands them past it by the gap's length.
pub fn localize(wall: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&wall) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let before = tz
                .offset_from_utc_datetime(&(wall - Duration::hours(12)))
                .fix();
            let utc = wall - Duration::seconds(i64::from(before.local_minus_utc()));
            Utc.from_utc_datetime(&utc)
        }
    }
}

/// Parses a DURATION value such as `PT1H30M`, `P1D`, `P2W` or `-PT15M`.
///
/// Returns `None` for malformed or out-of-range values.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (negative, rest) = match raw.as_bytes().first()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };
    let rest = rest.strip_prefix('P').or_else(|| rest.strip_prefix('p'))?;

    let mut total = Duration::zero();
    let mut in_time = false;
    let mut digits = String::new();
    let mut saw_component = false;

    for c in rest.chars() {
        match c.to_ascii_uppercase() {
            '0'..='9' => digits.push(c),
            'T' if digits.is_empty() && !in_time => in_time = true,
            unit => {
                let n: i64 = digits.parse().ok()?;
                digits.clear();
                let part = match (unit, in_time) {
                    ('W', false) => Duration::try_weeks(n),
                    ('D', false) => Duration::try_days(n),
                    ('H', true) => Duration::try_hours(n),
                    ('M', true) => Duration::try_minutes(n),
                    ('S', true) => Duration::try_seconds(n),
                    _ => None,
                }?;
                total = total.checked_add(&part)?;
                saw_component = true;
            }
        }
    }

    if !digits.is_empty() || !saw_component {
        return None;
    }
    Some(if negative { -total } else { total })
}

/// Resolves TEXT escapes (`\n`, `\,`, `\;`, `\\`).
pub fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    mod parsing {
        use super::*;

        #[test]
        fn zoned_date_time() {
            let t = IcalTime::parse("20250205T090000", None, Some("Europe/Paris")).unwrap();
            assert_eq!(t.wall, wall("2025-02-05T09:00:00"));
            assert!(!t.is_date);
            assert_eq!(t.timezone(), "Europe/Paris");
            assert_eq!(t.to_string(), "2025-02-05T09:00:00");
        }

        #[test]
        fn utc_and_floating() {
            let utc = IcalTime::parse("20250205T090000Z", None, None).unwrap();
            assert_eq!(utc.zone, IcalZone::Utc);
            assert_eq!(utc.timezone(), "UTC");

            let floating = IcalTime::parse("20250205T090000", None, None).unwrap();
            assert_eq!(floating.zone, IcalZone::Floating);
            assert_eq!(floating.timezone(), "floating");
        }

        #[test]
        fn dates() {
            let t = IcalTime::parse("20250210", Some("DATE"), None).unwrap();
            assert!(t.is_date);
            assert_eq!(t.to_string(), "2025-02-10");

            let t = IcalTime::parse("20250210", None, Some("Europe/Paris")).unwrap();
            assert!(t.is_date);
            assert_eq!(t.zone, IcalZone::Floating);
        }

        #[test]
        fn period_start() {
            let t = IcalTime::parse("19960403T020000Z/19960403T040000Z", Some("PERIOD"), None)
                .unwrap();
            assert_eq!(t.wall, wall("1996-04-03T02:00:00"));
        }

        #[test]
        fn invalid_values() {
            assert!(IcalTime::parse("2025-02-05", None, None).is_none());
            assert!(IcalTime::parse("20251345T090000", None, None).is_none());
            assert!(IcalTime::parse("", None, None).is_none());
        }
    }

    mod instants {
        use super::*;

        #[test]
        fn zoned_wall_clock_moves_into_zone() {
            let t = IcalTime::parse("20250205T090000", None, Some("Europe/Paris")).unwrap();
            assert_eq!(
                t.to_utc(Tz::UTC),
                Utc.with_ymd_and_hms(2025, 2, 5, 8, 0, 0).unwrap()
            );
        }

        #[test]
        fn floating_uses_fallback_zone() {
            let t = IcalTime::parse("20250205T090000", None, None).unwrap();
            assert_eq!(
                t.to_utc(Tz::UTC),
                Utc.with_ymd_and_hms(2025, 2, 5, 9, 0, 0).unwrap()
            );
            assert_eq!(
                t.to_utc(chrono_tz::America::New_York),
                Utc.with_ymd_and_hms(2025, 2, 5, 14, 0, 0).unwrap()
            );
        }

        #[test]
        fn unknown_tzid_is_floating() {
            let t = IcalTime::parse("20250205T090000", None, Some("Mars/Olympus")).unwrap();
            assert_eq!(
                t.to_utc(Tz::UTC),
                Utc.with_ymd_and_hms(2025, 2, 5, 9, 0, 0).unwrap()
            );
        }

        #[test]
        fn tzid_with_leading_slash() {
            assert_eq!(resolve_tzid("/Europe/Berlin"), Some(chrono_tz::Europe::Berlin));
            assert_eq!(resolve_tzid("\"Asia/Tokyo\""), Some(chrono_tz::Asia::Tokyo));
            assert_eq!(resolve_tzid("Not/AZone"), None);
        }

        #[test]
        fn ambiguous_time_takes_earliest() {
            let ny = chrono_tz::America::New_York;
            let instant = localize(wall("2025-11-02T01:30:00"), ny);
            assert_eq!(instant, Utc.with_ymd_and_hms(2025, 11, 2, 5, 30, 0).unwrap());
        }

        #[test]
        fn gap_time_shifts_forward() {
            let ny = chrono_tz::America::New_York;
            let instant = localize(wall("2025-03-09T02:30:00"), ny);
            // 03:30 EDT
            assert_eq!(instant, Utc.with_ymd_and_hms(2025, 3, 9, 7, 30, 0).unwrap());
        }

        #[test]
        fn wall_in_other_zone() {
            let t = IcalTime::parse("20250205T080000Z", None, None).unwrap();
            let paris = IcalZone::Named("Europe/Paris".to_string());
            assert_eq!(t.wall_in(&paris, Tz::UTC), wall("2025-02-05T09:00:00"));
            assert_eq!(t.wall_in(&IcalZone::Utc, Tz::UTC), wall("2025-02-05T08:00:00"));
        }
    }

    mod durations {
        use super::*;

        #[test]
        fn parses_common_forms() {
            assert_eq!(parse_duration("PT1H30M"), Some(Duration::minutes(90)));
            assert_eq!(parse_duration("P1D"), Some(Duration::days(1)));
            assert_eq!(parse_duration("P2W"), Some(Duration::weeks(2)));
            assert_eq!(
                parse_duration("P1DT2H3M4S"),
                Some(Duration::days(1) + Duration::seconds(2 * 3600 + 3 * 60 + 4))
            );
            assert_eq!(parse_duration("-PT15M"), Some(Duration::minutes(-15)));
            assert_eq!(parse_duration("+PT0S"), Some(Duration::zero()));
        }

        #[test]
        fn rejects_garbage() {
            assert_eq!(parse_duration(""), None);
            assert_eq!(parse_duration("P"), None);
            assert_eq!(parse_duration("1H"), None);
            assert_eq!(parse_duration("PT1D"), None);
            assert_eq!(parse_duration("P1H"), None);
            assert_eq!(parse_duration("PT15"), None);
        }

        #[test]
        fn rejects_out_of_range_values() {
            assert_eq!(parse_duration("P999999999999999W"), None);
            assert_eq!(parse_duration("PT99999999999999999999S"), None);
            assert_eq!(parse_duration("P99999999999D99999999999D"), None);
        }

        #[test]
        fn add_overflow_is_none() {
            let t = IcalTime::parse("20250205T100000Z", None, None).unwrap();
            assert_eq!(
                t.add(Duration::minutes(30)).map(|t| t.to_string()).as_deref(),
                Some("2025-02-05T10:30:00")
            );
            assert!(t.add(Duration::days(99_999_999)).is_none());
        }
    }

    #[test]
    fn unescapes_text() {
        assert_eq!(
            unescape_text(r"Room 1\, Floor 2\;\nBring laptop\\charger"),
            "Room 1, Floor 2;\nBring laptop\\charger"
        );
        assert_eq!(unescape_text("plain"), "plain");
        assert_eq!(unescape_text("trailing\\"), "trailing\\");
    }
}
