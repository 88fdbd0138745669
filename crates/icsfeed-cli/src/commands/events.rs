//! The `events` command.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::Write;

use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use icsfeed_core::{EventInput, EventTime, TimeWindow};
use icsfeed_source::ics::IcsEventSource;
use icsfeed_source::{EventSourceDef, FetchArg, SourceInput};
use tracing::debug;

use crate::cli::EventsArgs;
use crate::config::{self, CliConfig};
use crate::error::{CliError, CliResult};
use crate::secret;

/// Fetches the selected feed and prints its events.
pub async fn run(args: &EventsArgs, config: &CliConfig) -> CliResult<()> {
    let input = build_input(args, config)?;
    let floating = match args.floating_timezone.as_deref() {
        Some(name) => config::parse_zone(name),
        None => config.floating_zone(),
    }
    .map_err(CliError::config)?;
    let window = resolve_window(args, config.defaults.days, Local::now().date_naive(), &Local)?;

    let source = IcsEventSource::with_http_config(&config.http.to_transport_config())?
        .with_floating_zone(floating)
        .with_max_iterations(config.defaults.max_iterations);
    let meta = source.parse_meta(&input).ok_or_else(|| {
        CliError::usage(format!(
            "`{}` is not a valid feed url",
            input.url.as_deref().unwrap_or_default()
        ))
    })?;

    debug!(url = %meta.url, start = %window.start, end = %window.end, "Fetching events");
    let mut events = source.fetch(&meta, FetchArg::new(window)).await?.events;
    events.sort_by(|a, b| a.start.cmp(&b.start));

    let mut out = std::io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &events)?;
        writeln!(out)?;
    } else if events.is_empty() {
        writeln!(out, "No events.")?;
    } else {
        for event in &events {
            writeln!(out, "{}", format_event(event, &Local))?;
        }
    }
    Ok(())
}

/// Picks the feed from the command line, falling back to the only configured one.
pub fn build_input(args: &EventsArgs, config: &CliConfig) -> CliResult<SourceInput> {
    match (args.feed.as_deref(), args.url.as_deref()) {
        (Some(name), _) => config
            .find_feed(name)
            .ok_or_else(|| CliError::usage(format!("no feed named `{}` in the configuration", name)))?
            .to_source_input()
            .map_err(CliError::config),
        (None, Some(url)) => {
            let headers = args
                .headers
                .iter()
                .map(|raw| parse_header(raw))
                .collect::<CliResult<BTreeMap<_, _>>>()?;
            Ok(config::source_input(url, &headers))
        }
        (None, None) => match config.feeds.as_slice() {
            [only] => only.to_source_input().map_err(CliError::config),
            [] => Err(CliError::usage("no feeds configured, pass --url URL")),
            _ => Err(CliError::usage("several feeds configured, pass --feed NAME")),
        },
    }
}

/// Parses a `NAME:VALUE` header argument. The value may be a secret reference.
pub fn parse_header(raw: &str) -> CliResult<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| CliError::usage(format!("header `{}` is not NAME:VALUE", raw)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::usage(format!("header `{}` has no name", raw)));
    }
    let value = secret::resolve(value.trim()).map_err(CliError::usage)?;
    Ok((name.to_string(), value))
}

/// Turns `--from`, `--to` and `--days` into a window of whole days in `tz`.
pub fn resolve_window<Z: TimeZone>(
    args: &EventsArgs,
    default_days: u32,
    today: NaiveDate,
    tz: &Z,
) -> CliResult<TimeWindow> {
    let from = args.from.unwrap_or(today);
    let to = match args.to {
        Some(to) => to,
        None => {
            let days = args.days.unwrap_or(default_days);
            if days == 0 {
                return Err(CliError::usage("--days must be at least 1"));
            }
            from.checked_add_days(Days::new(u64::from(days)))
                .ok_or_else(|| CliError::usage("--days is out of range"))?
        }
    };
    if to < from {
        return Err(CliError::usage("--to must not be before --from"));
    }
    Ok(TimeWindow::new(day_start(from, tz), day_start(to, tz)))
}

fn day_start<Z: TimeZone>(date: NaiveDate, tz: &Z) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

/// Formats one event as a table line, with times shown in `tz`.
pub fn format_event<Z>(event: &EventInput, tz: &Z) -> String
where
    Z: TimeZone,
    Z::Offset: Display,
{
    let when = match (&event.start, &event.end) {
        (EventTime::AllDay(start), end) => {
            let last = end
                .as_ref()
                .and_then(EventTime::as_date)
                .and_then(|end| end.pred_opt())
                .filter(|last| last > start);
            match last {
                Some(last) => format!("{}  all day until {}", start, last),
                None => format!("{}  all day", start),
            }
        }
        (EventTime::DateTime(start), end) => {
            let start = start.with_timezone(tz);
            let end = end.map(|e| e.to_utc_datetime().with_timezone(tz));
            match end {
                Some(end) if end.date_naive() == start.date_naive() => {
                    format!("{}-{}", start.format("%Y-%m-%d  %H:%M"), end.format("%H:%M"))
                }
                Some(end) => format!(
                    "{}-{}",
                    start.format("%Y-%m-%d  %H:%M"),
                    end.format("%Y-%m-%d %H:%M")
                ),
                None => start.format("%Y-%m-%d  %H:%M").to_string(),
            }
        }
    };

    let mut line = format!("{:<24}  {}", when, event.effective_title());
    if let Some(location) = event.prop_str("location").filter(|l| !l.is_empty()) {
        line.push_str(&format!(" @ {}", location));
    }
    line
}
