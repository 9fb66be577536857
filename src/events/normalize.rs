//! Resolution of raw harvest records into canonical [`Event`]s.
//!
//! The harvester emits records under several historically-used field
//! namings. Each canonical field has a fixed alias-priority list; the
//! first key present with a usable value wins.

use super::feed::{HarvestDocument, HarvestMeta, RawEvent};
use super::{Event, PLACEHOLDER_URL, UNTITLED_TITLE};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

const TITLE_ALIASES: &[&str] = &["title", "name", "summary"];
const URL_ALIASES: &[&str] = &["url", "link"];
const START_ALIASES: &[&str] = &["start_utc", "start", "startDate", "start_time", "dtstart"];
const END_ALIASES: &[&str] = &["end_utc", "end", "endDate", "end_time", "dtend"];
const CITY_ALIASES: &[&str] = &["city", "town"];
const STATE_ALIASES: &[&str] = &["state", "region"];
const COUNTRY_ALIASES: &[&str] = &["country"];
const VENUE_ALIASES: &[&str] = &["venue", "location", "place"];
const SOURCE_ALIASES: &[&str] = &["source", "feed"];
const DESCRIPTION_ALIASES: &[&str] = &["description", "details"];
const ALL_DAY_ALIASES: &[&str] = &["all_day", "allDay"];

/// Maps a raw harvest document into canonical events.
///
/// Records without a resolvable start are dropped silently; all other
/// records are defaulted field by field. Input order is preserved and no
/// deduplication happens here.
pub fn normalize(document: &HarvestDocument) -> Vec<Event> {
    let fallback_source = fallback_source(&document.meta);

    document
        .events
        .iter()
        .filter_map(|record| normalize_record(record, fallback_source.as_deref()))
        .collect()
}

/// The source label applied to records that carry none: the feed-source
/// names from the metadata block, joined into one display string.
fn fallback_source(meta: &HarvestMeta) -> Option<String> {
    if meta.sources.is_empty() {
        None
    } else {
        Some(meta.sources.join(", "))
    }
}

fn normalize_record(record: &RawEvent, fallback_source: Option<&str>) -> Option<Event> {
    let start = resolve_timestamp(record, START_ALIASES)?;

    Some(Event {
        title: resolve_str(record, TITLE_ALIASES).unwrap_or_else(|| UNTITLED_TITLE.to_owned()),
        url: resolve_str(record, URL_ALIASES).unwrap_or_else(|| PLACEHOLDER_URL.to_owned()),
        start,
        end: resolve_timestamp(record, END_ALIASES),
        city: resolve_str(record, CITY_ALIASES),
        state: resolve_str(record, STATE_ALIASES),
        country: resolve_str(record, COUNTRY_ALIASES),
        venue: resolve_str(record, VENUE_ALIASES),
        source: resolve_str(record, SOURCE_ALIASES).or_else(|| fallback_source.map(str::to_owned)),
        description: resolve_str(record, DESCRIPTION_ALIASES),
        all_day: resolve_bool(record, ALL_DAY_ALIASES),
    })
}

/// Resolves the first alias present with a non-null value. The harvester
/// writes explicit nulls for fields it could not populate, so nulls count
/// as absent.
fn resolve<'a>(record: &'a RawEvent, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|key| record.get(*key).filter(|value| !value.is_null()))
}

/// Resolves the first alias that holds a non-blank string. Blank strings
/// and non-string scalars count as absent.
fn resolve_str(record: &RawEvent, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| {
        record
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    })
}

/// Resolves a timestamp field. The first present alias is authoritative:
/// an unparseable value yields `None` rather than falling through to the
/// next alias.
fn resolve_timestamp(record: &RawEvent, aliases: &[&str]) -> Option<DateTime<Utc>> {
    resolve(record, aliases)
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
}

fn resolve_bool(record: &RawEvent, aliases: &[&str]) -> bool {
    resolve(record, aliases)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Parses the timestamp forms seen in harvest artifacts: RFC 3339 with
/// any offset, naive ISO 8601 (the harvester assumes UTC for naive
/// datetimes), compact iCalendar datetimes, and bare dates at midnight
/// UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Utc));
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y%m%dT%H%M%SZ",
        "%Y%m%dT%H%M%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for format in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> HarvestDocument {
        HarvestDocument::from_value(value)
    }

    fn utc(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    #[test]
    fn start_utc_wins_over_start() {
        let document = doc(json!({
            "events": [{
                "title": "a",
                "start_utc": "2031-05-01T10:00:00+02:00",
                "start": "2031-06-01T10:00:00Z",
            }]
        }));

        let events = normalize(&document);
        assert_eq!(events[0].start, utc("2031-05-01T08:00:00Z"));
    }

    #[test]
    fn records_without_start_are_dropped_silently() {
        let document = doc(json!({
            "events": [
                {"title": "valid", "start": "2031-05-01T10:00:00Z"},
                {"title": "no start"},
                {"title": "also valid", "dtstart": "20310601T100000Z"},
            ]
        }));

        let events = normalize(&document);

        // The malformed sibling is gone, the rest survive in input order.
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "valid");
        assert_eq!(events[1].title, "also valid");
        assert_eq!(events[1].start, utc("2031-06-01T10:00:00Z"));
    }

    #[test]
    fn unparseable_start_does_not_fall_through_to_later_aliases() {
        let document = doc(json!({
            "events": [{
                "title": "a",
                "start_utc": "not a date",
                "start": "2031-05-01T10:00:00Z",
            }]
        }));

        assert!(normalize(&document).is_empty());
    }

    #[test]
    fn nulls_and_blanks_count_as_absent() {
        let document = doc(json!({
            "events": [{
                "title": null,
                "name": "   ",
                "summary": "From summary",
                "start": "2031-05-01T10:00:00Z",
            }]
        }));

        let events = normalize(&document);
        assert_eq!(events[0].title, "From summary");
    }

    #[test]
    fn missing_fields_get_defaults() {
        let document = doc(json!({
            "events": [{"start": "2031-05-01T10:00:00Z"}]
        }));

        let events = normalize(&document);
        assert_eq!(events[0].title, UNTITLED_TITLE);
        assert_eq!(events[0].url, PLACEHOLDER_URL);
        assert_eq!(events[0].source, None);
        assert_eq!(events[0].end, None);
        assert!(!events[0].all_day);
    }

    #[test]
    fn record_source_wins_over_meta_fallback() {
        let document = doc(json!({
            "meta": {"sources": ["ics", "eventbrite_html"]},
            "events": [
                {"start": "2031-05-01T10:00:00Z", "source": "manual"},
                {"start": "2031-05-02T10:00:00Z"},
            ]
        }));

        let events = normalize(&document);
        assert_eq!(events[0].source.as_deref(), Some("manual"));
        assert_eq!(events[1].source.as_deref(), Some("ics, eventbrite_html"));
    }

    #[test]
    fn harvester_shaped_record_maps_fully() {
        let document = doc(json!({
            "events": [{
                "source": "ics",
                "source_url": "https://faire.example/events.ics",
                "title": "Tesla Coil Workshop",
                "description": "Bring your own goggles.",
                "start": "2031-05-01T18:00:00+00:00",
                "end": "2031-05-01T21:00:00+00:00",
                "location": "Armory Hall",
                "all_day": false,
                "uid": "abc@faire.example",
            }]
        }));

        let events = normalize(&document);
        let event = &events[0];
        assert_eq!(event.title, "Tesla Coil Workshop");
        assert_eq!(event.venue.as_deref(), Some("Armory Hall"));
        assert_eq!(event.description.as_deref(), Some("Bring your own goggles."));
        assert_eq!(event.end, Some(utc("2031-05-01T21:00:00Z")));
        assert_eq!(event.source.as_deref(), Some("ics"));
    }

    #[test]
    fn alternate_spellings_resolve() {
        let document = doc(json!({
            "events": [{
                "name": "Aether Regatta",
                "link": "https://faire.example/regatta",
                "startDate": "2031-07-04",
                "end_time": "2031-07-04T22:00:00Z",
                "town": "Lynnhaven",
                "region": "VA",
                "place": "Harbor Pavilion",
                "feed": "tickettailor_html",
                "details": "Row, sail or levitate.",
                "allDay": true,
            }]
        }));

        let events = normalize(&document);
        let event = &events[0];
        assert_eq!(event.title, "Aether Regatta");
        assert_eq!(event.url, "https://faire.example/regatta");
        assert_eq!(event.start, utc("2031-07-04T00:00:00Z"));
        assert_eq!(event.end, Some(utc("2031-07-04T22:00:00Z")));
        assert_eq!(event.city.as_deref(), Some("Lynnhaven"));
        assert_eq!(event.state.as_deref(), Some("VA"));
        assert_eq!(event.venue.as_deref(), Some("Harbor Pavilion"));
        assert_eq!(event.source.as_deref(), Some("tickettailor_html"));
        assert_eq!(event.description.as_deref(), Some("Row, sail or levitate."));
        assert!(event.all_day);
    }

    #[test]
    fn timestamp_forms() {
        for (raw, expected) in [
            ("2031-05-01T10:00:00Z", "2031-05-01T10:00:00Z"),
            ("2031-05-01T10:00:00+02:00", "2031-05-01T08:00:00Z"),
            // Naive datetimes are assumed to be UTC, as the harvester does.
            ("2031-05-01T10:00:00", "2031-05-01T10:00:00Z"),
            ("2031-05-01 10:00:00", "2031-05-01T10:00:00Z"),
            ("20310501T100000Z", "2031-05-01T10:00:00Z"),
            ("2031-05-01", "2031-05-01T00:00:00Z"),
            ("20310501", "2031-05-01T00:00:00Z"),
        ] {
            assert_eq!(parse_timestamp(raw), Some(utc(expected)), "form: {raw}");
        }

        assert_eq!(parse_timestamp("next tuesday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn unparseable_end_drops_the_end_not_the_record() {
        let document = doc(json!({
            "events": [{"start": "2031-05-01T10:00:00Z", "end": "not a date"}]
        }));

        let events = normalize(&document);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].end, None);
    }
}
