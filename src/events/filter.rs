use super::Event;
use chrono::{DateTime, Utc};

/// Retains events starting at or after `now`. The boundary is inclusive,
/// and `now` is passed in by the caller so the result is deterministic.
pub fn upcoming(events: Vec<Event>, now: DateTime<Utc>) -> Vec<Event> {
    events
        .into_iter()
        .filter(|event| event.start >= now)
        .collect()
}

/// Retains events whose searchable text contains the case-folded query as
/// a substring. An empty or whitespace-only query retains everything.
pub fn by_query(events: Vec<Event>, query: &str) -> Vec<Event> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return events;
    }

    events
        .into_iter()
        .filter(|event| search_blob(event).contains(&needle))
        .collect()
}

/// Concatenates the searchable fields into one case-folded blob. Absent
/// fields are skipped, not padded with placeholder text.
fn search_blob(event: &Event) -> String {
    let mut parts = vec![event.title.as_str()];
    parts.extend(
        [
            &event.city,
            &event.state,
            &event.country,
            &event.venue,
            &event.description,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str),
    );

    parts.join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(title: &str) -> Event {
        Event::new(title, "2031-03-15T19:30:00Z".parse().unwrap())
    }

    #[test]
    fn start_boundary_is_inclusive() {
        let start: DateTime<Utc> = "2031-03-15T19:30:00Z".parse().unwrap();
        let events = vec![Event::new("on the dot", start)];

        assert_eq!(upcoming(events.clone(), start).len(), 1);
        assert!(upcoming(events, start + Duration::microseconds(1)).is_empty());
    }

    #[test]
    fn query_is_case_insensitive_substring_containment() {
        let events = vec![event("DevCon Berlin")];

        assert_eq!(by_query(events.clone(), "berlin").len(), 1);
        assert_eq!(by_query(events.clone(), "DEVCON").len(), 1);
        assert_eq!(by_query(events.clone(), "vCon Ber").len(), 1);
        // Non-contiguous words do not match.
        assert!(by_query(events, "dev ber").is_empty());
    }

    #[test]
    fn blank_query_passes_everything() {
        let events = vec![event("a"), event("b")];

        assert_eq!(by_query(events.clone(), "").len(), 2);
        assert_eq!(by_query(events, "   ").len(), 2);
    }

    #[test]
    fn blob_spans_fields_with_single_spaces() {
        let mut berlin = event("DevCon");
        berlin.city = Some("Berlin".into());
        berlin.country = Some("Germany".into());

        // city and country are adjacent in the blob when state is absent.
        assert_eq!(by_query(vec![berlin], "berlin germany").len(), 1);
    }

    #[test]
    fn absent_fields_leak_no_placeholder_text() {
        let events = vec![event("Tesla Faire")];

        assert!(by_query(events.clone(), "none").is_empty());
        assert!(by_query(events, "null").is_empty());
    }

    #[test]
    fn description_is_searchable() {
        let mut faire = event("Tesla Faire");
        faire.description = Some("Lightning demonstrations all night".into());

        assert_eq!(by_query(vec![faire], "lightning").len(), 1);
    }
}
