//! Converting expanded entries into [`EventInput`]s.

use std::collections::BTreeMap;

use chrono::Duration;
use chrono_tz::Tz;
use icsfeed_core::{EventInput, EventTime, ExtendedProps, TimeWindow};
use serde_json::Value;

use super::expander::{IcalExpander, RawEntry, RawProperty};
use super::value::IcalTime;

/// Padding applied on each side of the requested range before expanding.
///
/// The host's range is UTC-normalised while entries are evaluated in their own
/// zones, so a day on each side catches everything a zone shift could move in.
pub const RANGE_PADDING_DAYS: i64 = 1;

/// Properties promoted to first-class fields; never copied into
/// `extended_props`.
pub const PROMOTED_PROPS: [&str; 6] = ["uid", "summary", "url", "location", "organizer", "description"];

/// Properties whose values are TEXT and get unescaped.
const TEXT_PROPS: [&str; 6] = ["COMMENT", "CATEGORIES", "CONTACT", "RESOURCES", "STATUS", "CLASS"];

/// Expands `range` (padded) and converts every match.
///
/// Single events come first, then recurring occurrences, in expander order.
pub fn expand_events(expander: &IcalExpander, range: &TimeWindow, floating: Tz) -> Vec<EventInput> {
    let padded = range.extend(Duration::days(RANGE_PADDING_DAYS));
    let result = expander.between(padded.start, padded.end);

    let singles = result
        .events
        .iter()
        .map(|entry| build_event(entry, entry.start(), entry.end(), floating));
    let occurrences = result
        .occurrences
        .iter()
        .map(|occ| build_event(occ.item, &occ.start, occ.end.as_ref(), floating));

    singles.chain(occurrences).collect()
}

/// Builds one event from an entry and the instance's own start and end.
pub fn build_event(
    entry: &RawEntry,
    start: &IcalTime,
    end: Option<&IcalTime>,
    floating: Tz,
) -> EventInput {
    let end = end
        .filter(|_| specifies_end(entry))
        .map(|end| reconstruct_instant(end, floating));

    EventInput {
        id: entry.uid().map(str::to_string),
        title: entry.summary(),
        url: entry.url().unwrap_or_default().to_string(),
        start: reconstruct_instant(start, floating),
        end,
        all_day: start.is_date,
        extended_props: extended_props(entry),
    }
}

/// Whether the entry states its own end.
///
/// Entries without DTEND or DURATION leave the end to the host.
pub fn specifies_end(entry: &RawEntry) -> bool {
    let component = entry.component();
    component.has_property("DTEND") || component.has_property("DURATION")
}

/// Turns a wall-clock value into an instant by moving it into its zone.
///
/// Dates stay dates.
pub fn reconstruct_instant(time: &IcalTime, floating: Tz) -> EventTime {
    if time.is_date {
        EventTime::from_date(time.wall.date())
    } else {
        EventTime::from_utc(time.to_utc(floating))
    }
}

/// Collects the fixed extended props plus every non-promoted property.
///
/// Keys are property names in lower case (`X-MEETING-ROOM` becomes
/// `x-meeting-room`).
fn extended_props(entry: &RawEntry) -> ExtendedProps {
    let mut props = ExtendedProps::new();
    props.insert("location".to_string(), optional(entry.location()));
    props.insert(
        "organizer".to_string(),
        optional(entry.organizer().map(str::to_string)),
    );
    props.insert("description".to_string(), optional(entry.description()));

    let mut rest: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for prop in entry.component().properties() {
        let name = prop.name.to_ascii_lowercase();
        if PROMOTED_PROPS.contains(&name.as_str()) {
            continue;
        }
        rest.entry(name).or_default().push(property_value(prop));
    }

    for (name, mut values) in rest {
        let value = if values.len() == 1 {
            Value::String(values.remove(0))
        } else {
            Value::Array(values.into_iter().map(Value::String).collect())
        };
        props.insert(name, value);
    }

    props
}

fn property_value(prop: &RawProperty) -> String {
    if prop.name.starts_with("X-") || TEXT_PROPS.contains(&prop.name.as_str()) {
        prop.text()
    } else {
        prop.value.clone()
    }
}

fn optional(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}
