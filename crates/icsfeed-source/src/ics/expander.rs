//! Occurrence expansion.
//!
//! [`IcalExpander`] parses feed text once and then answers "which entries and
//! occurrences overlap this window" as often as needed. Recurrence rules are
//! evaluated with the `rrule` crate; RDATE, EXDATE and RECURRENCE-ID
//! overrides are applied here.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use icalendar::parser::{Component, Property, read_calendar, unfold};
use rrule::RRuleSet;
use tracing::{debug, warn};

use super::value::{IcalTime, IcalZone, localize, parse_duration, resolve_tzid, unescape_text};
use crate::error::{SourceError, SourceResult};

/// Options for [`IcalExpander`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpanderOptions {
    /// Skip entries with unparseable dates instead of failing the feed.
    pub skip_invalid_dates: bool,
    /// Upper bound on rule-generated dates per series and query.
    pub max_iterations: u16,
    /// Zone used for floating values and unknown TZIDs.
    pub floating_zone: Tz,
}

impl ExpanderOptions {
    /// Default cap on rule-generated dates.
    pub const DEFAULT_MAX_ITERATIONS: u16 = 1000;

    /// Sets whether invalid dates are skipped.
    pub fn with_skip_invalid_dates(mut self, skip: bool) -> Self {
        self.skip_invalid_dates = skip;
        self
    }

    /// Sets the iteration cap.
    pub fn with_max_iterations(mut self, max: u16) -> Self {
        self.max_iterations = max;
        self
    }

    /// Sets the floating zone.
    pub fn with_floating_zone(mut self, zone: Tz) -> Self {
        self.floating_zone = zone;
        self
    }
}

impl Default for ExpanderOptions {
    fn default() -> Self {
        Self {
            skip_invalid_dates: false,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            floating_zone: Tz::UTC,
        }
    }
}

/// One property line: upper-cased name, parameters and raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProperty {
    /// Property name, upper-cased.
    pub name: String,
    /// Parameters in source order, names upper-cased.
    pub params: Vec<(String, Option<String>)>,
    /// The value exactly as written (escapes intact).
    pub value: String,
}

impl RawProperty {
    fn from_parsed(prop: &Property<'_>) -> Self {
        Self {
            name: prop.name.to_string().to_ascii_uppercase(),
            params: prop
                .params
                .iter()
                .map(|p| {
                    (
                        p.key.to_string().to_ascii_uppercase(),
                        p.val.as_ref().map(|v| v.to_string()),
                    )
                })
                .collect(),
            value: prop.val.to_string(),
        }
    }

    /// Returns a parameter value.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, val)| val.as_deref())
    }

    /// The value with TEXT escapes resolved.
    pub fn text(&self) -> String {
        unescape_text(&self.value)
    }

    /// Parses the value as a single date or date-time.
    pub fn time(&self) -> Option<IcalTime> {
        IcalTime::parse(&self.value, self.param("VALUE"), self.param("TZID"))
    }

    /// Parses a comma-separated list of dates or date-times, dropping
    /// unparseable items.
    pub fn times(&self) -> Vec<IcalTime> {
        self.value
            .split(',')
            .filter(|v| !v.trim().is_empty())
            .filter_map(|v| IcalTime::parse(v, self.param("VALUE"), self.param("TZID")))
            .collect()
    }
}

/// The properties of one VEVENT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawComponent {
    properties: Vec<RawProperty>,
}

impl RawComponent {
    /// Creates a component from its properties.
    pub fn new(properties: Vec<RawProperty>) -> Self {
        Self { properties }
    }

    /// All properties in source order.
    pub fn properties(&self) -> &[RawProperty] {
        &self.properties
    }

    /// The first property with the given name (case-insensitive).
    pub fn first_property(&self, name: &str) -> Option<&RawProperty> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Every property with the given name (case-insensitive).
    pub fn properties_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RawProperty> {
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    /// Whether a property with the given name is present.
    pub fn has_property(&self, name: &str) -> bool {
        self.first_property(name).is_some()
    }
}

/// A VEVENT: a single entry, a recurring template or an override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    component: RawComponent,
    start: IcalTime,
    end: Option<IcalTime>,
    recurrence_id: Option<IcalTime>,
}

impl RawEntry {
    /// Builds an entry from its properties.
    ///
    /// Fails when DTSTART is missing or invalid, or when DTEND, DURATION or
    /// RECURRENCE-ID is present but invalid.
    pub fn from_component(component: RawComponent) -> Result<Self, String> {
        let start = component
            .first_property("DTSTART")
            .ok_or("missing DTSTART")?
            .time()
            .ok_or("invalid DTSTART")?;

        let end = match component.first_property("DTEND") {
            Some(prop) => Some(prop.time().ok_or("invalid DTEND")?),
            None => match component.first_property("DURATION") {
                Some(prop) => Some(
                    parse_duration(&prop.value)
                        .and_then(|duration| start.add(duration))
                        .ok_or("invalid DURATION")?,
                ),
                None => None,
            },
        };

        let recurrence_id = match component.first_property("RECURRENCE-ID") {
            Some(prop) => Some(prop.time().ok_or("invalid RECURRENCE-ID")?),
            None => None,
        };

        Ok(Self {
            component,
            start,
            end,
            recurrence_id,
        })
    }

    /// The underlying properties.
    pub fn component(&self) -> &RawComponent {
        &self.component
    }

    /// UID.
    pub fn uid(&self) -> Option<&str> {
        self.component.first_property("UID").map(|p| p.value.as_str())
    }

    /// SUMMARY, unescaped.
    pub fn summary(&self) -> Option<String> {
        self.component.first_property("SUMMARY").map(RawProperty::text)
    }

    /// LOCATION, unescaped.
    pub fn location(&self) -> Option<String> {
        self.component.first_property("LOCATION").map(RawProperty::text)
    }

    /// ORGANIZER, as written (usually a `mailto:` URI).
    pub fn organizer(&self) -> Option<&str> {
        self.component
            .first_property("ORGANIZER")
            .map(|p| p.value.as_str())
    }

    /// DESCRIPTION, unescaped.
    pub fn description(&self) -> Option<String> {
        self.component
            .first_property("DESCRIPTION")
            .map(RawProperty::text)
    }

    /// The first URL property.
    pub fn url(&self) -> Option<&str> {
        self.component.first_property("URL").map(|p| p.value.as_str())
    }

    /// DTSTART.
    pub fn start(&self) -> &IcalTime {
        &self.start
    }

    /// DTEND, or DTSTART + DURATION.
    pub fn end(&self) -> Option<&IcalTime> {
        self.end.as_ref()
    }

    /// The end used for overlap checks: the explicit end, else the start
    /// (one day later for all-day entries).
    pub fn effective_end(&self) -> IcalTime {
        match &self.end {
            Some(end) => end.clone(),
            None => self
                .start
                .add(self.duration())
                .unwrap_or_else(|| self.start.clone()),
        }
    }

    /// Wall-clock length of the entry.
    pub fn duration(&self) -> Duration {
        match &self.end {
            Some(end) => end.wall - self.start.wall,
            None if self.start.is_date => Duration::days(1),
            None => Duration::zero(),
        }
    }

    /// RECURRENCE-ID, set on overrides.
    pub fn recurrence_id(&self) -> Option<&IcalTime> {
        self.recurrence_id.as_ref()
    }

    /// Whether the entry carries RRULE or RDATE.
    pub fn is_recurring(&self) -> bool {
        self.component.has_property("RRULE") || self.component.has_property("RDATE")
    }
}

/// One instance of a recurring series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOccurrence<'a> {
    /// The entry the instance was generated from: the series template, or
    /// the override that replaced the instance.
    pub item: &'a RawEntry,
    /// Instance start.
    pub start: IcalTime,
    /// Instance end.
    pub end: Option<IcalTime>,
}

/// The result of [`IcalExpander::between`].
#[derive(Debug, Clone, Default)]
pub struct ExpandResult<'a> {
    /// Non-recurring entries overlapping the window, in source order.
    pub events: Vec<&'a RawEntry>,
    /// Recurring instances overlapping the window, chronological per series.
    pub occurrences: Vec<RawOccurrence<'a>>,
}

#[derive(Debug, Clone)]
struct Series {
    template: RawEntry,
    overrides: Vec<RawEntry>,
}

/// A parsed feed, ready to expand.
#[derive(Debug, Clone)]
pub struct IcalExpander {
    singles: Vec<RawEntry>,
    series: Vec<Series>,
    options: ExpanderOptions,
}

impl IcalExpander {
    /// Parses feed text.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the text is not iCalendar data, or if an
    /// entry has invalid dates and `skip_invalid_dates` is off.
    pub fn new(ics: &str, options: ExpanderOptions) -> SourceResult<Self> {
        let unfolded = unfold(ics);
        let head = unfolded.trim_start_matches('\u{feff}').trim_start();
        if !head
            .get(..15)
            .is_some_and(|h| h.eq_ignore_ascii_case("BEGIN:VCALENDAR"))
        {
            return Err(SourceError::parse("Feed is not an iCalendar document"));
        }
        let calendar = read_calendar(head)
            .map_err(|e| SourceError::parse(format!("Failed to parse ICS content: {}", e)))?;

        let mut vevents = Vec::new();
        collect_vevents(&calendar.components, &mut vevents);

        let mut entries = Vec::with_capacity(vevents.len());
        for vevent in vevents {
            let component =
                RawComponent::new(vevent.properties.iter().map(RawProperty::from_parsed).collect());
            let uid = component
                .first_property("UID")
                .map(|p| p.value.clone())
                .unwrap_or_default();

            match RawEntry::from_component(component) {
                Ok(entry) => entries.push(entry),
                Err(reason) if options.skip_invalid_dates => {
                    warn!(uid = %uid, reason = %reason, "Skipping entry with invalid dates");
                }
                Err(reason) => {
                    return Err(SourceError::parse(format!(
                        "Invalid entry '{}': {}",
                        uid, reason
                    )));
                }
            }
        }

        let expander = Self::from_entries(entries, options);
        debug!(
            singles = expander.singles.len(),
            series = expander.series.len(),
            "Parsed ICS content"
        );
        Ok(expander)
    }

    /// Groups entries into single events and recurring series.
    fn from_entries(entries: Vec<RawEntry>, options: ExpanderOptions) -> Self {
        let mut singles = Vec::new();
        let mut series: Vec<Series> = Vec::new();
        let mut series_by_uid: HashMap<String, usize> = HashMap::new();
        let mut overrides = Vec::new();

        for entry in entries {
            if entry.recurrence_id.is_some() {
                overrides.push(entry);
            } else if entry.is_recurring() {
                if let Some(uid) = entry.uid() {
                    series_by_uid.insert(uid.to_string(), series.len());
                }
                series.push(Series {
                    template: entry,
                    overrides: Vec::new(),
                });
            } else {
                singles.push(entry);
            }
        }

        for entry in overrides {
            let index = entry.uid().and_then(|uid| series_by_uid.get(uid)).copied();
            match index {
                Some(i) => series[i].overrides.push(entry),
                None => singles.push(entry),
            }
        }

        Self {
            singles,
            series,
            options,
        }
    }

    /// The options this expander was built with.
    pub fn options(&self) -> &ExpanderOptions {
        &self.options
    }

    /// Number of non-recurring entries.
    pub fn single_count(&self) -> usize {
        self.singles.len()
    }

    /// Number of recurring series.
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Returns every entry and occurrence overlapping `[after, before]`.
    ///
    /// Both bounds are inclusive.
    pub fn between(&self, after: DateTime<Utc>, before: DateTime<Utc>) -> ExpandResult<'_> {
        let floating = self.options.floating_zone;

        let events = self
            .singles
            .iter()
            .filter(|entry| {
                overlaps(entry.start(), &entry.effective_end(), after, before, floating)
            })
            .collect();

        let mut occurrences = Vec::new();
        for series in &self.series {
            occurrences.extend(self.expand_series(series, after, before));
        }

        ExpandResult {
            events,
            occurrences,
        }
    }

    fn expand_series<'a>(
        &'a self,
        series: &'a Series,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Vec<RawOccurrence<'a>> {
        let floating = self.options.floating_zone;
        let template = &series.template;
        let zone = &template.start.zone;
        let is_date = template.start.is_date;
        let duration = template.duration();
        let key = |time: &IcalTime| occurrence_key(time.wall_in(zone, floating), is_date);

        let mut candidates: BTreeSet<NaiveDateTime> = BTreeSet::new();
        candidates.insert(occurrence_key(template.start.wall, is_date));
        for wall in self.rule_dates(template, after - duration, before) {
            candidates.insert(occurrence_key(wall, is_date));
        }
        for rdate in template.component.properties_named("RDATE").flat_map(|p| p.times()) {
            candidates.insert(key(&rdate));
        }

        let excluded: HashSet<NaiveDateTime> = template
            .component
            .properties_named("EXDATE")
            .flat_map(|p| p.times())
            .map(|t| key(&t))
            .collect();

        let overrides: HashMap<NaiveDateTime, &RawEntry> = series
            .overrides
            .iter()
            .filter_map(|o| o.recurrence_id().map(|rid| (key(rid), o)))
            .collect();
        let mut used = HashSet::new();

        let mut found = Vec::new();
        for wall in candidates.into_iter().filter(|w| !excluded.contains(w)) {
            let occurrence = match overrides.get(&wall).copied() {
                Some(entry) => {
                    used.insert(wall);
                    RawOccurrence {
                        item: entry,
                        start: entry.start.clone(),
                        end: Some(entry.effective_end()),
                    }
                }
                None => {
                    let start = IcalTime {
                        wall,
                        is_date,
                        zone: zone.clone(),
                    };
                    let Some(end) = start.add(duration) else {
                        continue;
                    };
                    RawOccurrence {
                        item: template,
                        start,
                        end: Some(end),
                    }
                }
            };
            found.push(occurrence);
        }

        for (wall, &entry) in &overrides {
            if !used.contains(wall) && !excluded.contains(wall) {
                found.push(RawOccurrence {
                    item: entry,
                    start: entry.start.clone(),
                    end: Some(entry.effective_end()),
                });
            }
        }

        found.retain(|o| {
            let end = o.end.as_ref().unwrap_or(&o.start);
            overlaps(&o.start, end, after, before, floating)
        });
        found.sort_by_key(|o| o.start.to_utc(floating));
        found
    }

    /// Wall-clock starts generated by the template's RRULE within (roughly)
    /// `[after, before]`.
    fn rule_dates(
        &self,
        template: &RawEntry,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Vec<NaiveDateTime> {
        let Some(rule) = template.component.first_property("RRULE") else {
            return Vec::new();
        };
        let start = &template.start;

        let named = match &start.zone {
            IcalZone::Named(name) if !start.is_date => resolve_tzid(name),
            _ => None,
        };
        let dtstart = match named {
            Some(tz) => format!(
                "DTSTART;TZID={}:{}",
                tz.name(),
                start.wall.format("%Y%m%dT%H%M%S")
            ),
            None => format!("DTSTART:{}Z", start.wall.format("%Y%m%dT%H%M%S")),
        };
        let text = format!(
            "{}\nRRULE:{}",
            dtstart,
            normalize_until(&rule.value, named)
        );

        let rrule_set: RRuleSet = match text.parse() {
            Ok(set) => set,
            Err(e) => {
                warn!(
                    uid = template.uid().unwrap_or_default(),
                    rrule = %rule.value,
                    error = %e,
                    "Ignoring invalid recurrence rule"
                );
                return Vec::new();
            }
        };

        // Floating starts are evaluated as if they were UTC, so widen the
        // window by a day to cover any zone offset.
        let tz: rrule::Tz = Utc.into();
        let after = (after - Duration::days(1)).with_timezone(&tz);
        let before = (before + Duration::days(1)).with_timezone(&tz);

        let result = rrule_set
            .after(after)
            .before(before)
            .all(self.options.max_iterations);
        if result.limited {
            debug!(
                uid = template.uid().unwrap_or_default(),
                limit = self.options.max_iterations,
                "Recurrence expansion hit the iteration cap"
            );
        }

        result.dates.iter().map(|dt| dt.naive_local()).collect()
    }
}

/// Collects VEVENTs, descending into VCALENDAR blocks.
fn collect_vevents<'c, 'a>(components: &'c [Component<'a>], out: &mut Vec<&'c Component<'a>>) {
    for component in components {
        let name = component.name.as_ref();
        if name.eq_ignore_ascii_case("VEVENT") {
            out.push(component);
        } else if name.eq_ignore_ascii_case("VCALENDAR") {
            collect_vevents(&component.components, out);
        }
    }
}

/// Identity of an instance within its series.
fn occurrence_key(wall: NaiveDateTime, is_date: bool) -> NaiveDateTime {
    if is_date {
        wall.date().and_time(NaiveTime::MIN)
    } else {
        wall
    }
}

fn overlaps(
    start: &IcalTime,
    end: &IcalTime,
    after: DateTime<Utc>,
    before: DateTime<Utc>,
    floating: Tz,
) -> bool {
    end.to_utc(floating) >= after && start.to_utc(floating) <= before
}

/// Rewrites `UNTIL` to the UTC form the `rrule` crate requires.
///
/// Date-only values cover their whole day; local values are moved into the
/// series zone (or taken as UTC for floating series).
fn normalize_until(rule: &str, zone: Option<Tz>) -> String {
    rule.split(';')
        .map(|part| {
            let Some((key, value)) = part.split_once('=') else {
                return part.to_string();
            };
            if !key.trim().eq_ignore_ascii_case("UNTIL") || value.ends_with('Z') {
                return part.to_string();
            }

            let wall = if value.len() == 8 {
                chrono::NaiveDate::parse_from_str(value, "%Y%m%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(23, 59, 59))
            } else {
                NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()
            };

            match wall {
                Some(wall) => {
                    let utc = match zone {
                        Some(tz) => localize(wall, tz).naive_utc(),
                        None => wall,
                    };
                    format!("UNTIL={}", utc.format("%Y%m%dT%H%M%SZ"))
                }
                None => part.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}
