use super::{Event, EventsByMonth};
use chrono::Local;
use minijinja::value::{StructObject, Value};

impl StructObject for Event {
    fn get_field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "title" => Value::from(self.title.clone()),
            "url" => Value::from(self.url.clone()),
            "date" => {
                let date = self.start.with_timezone(&Local).format("%A, %B %e");

                Value::from(format!("{date}"))
            }
            "time" => {
                if self.all_day {
                    Value::from("All day")
                } else {
                    let start = self.start.with_timezone(&Local);
                    let start_time = start.format("%k:%M");

                    match self.end {
                        Some(end) => {
                            let end = end.with_timezone(&Local);
                            let end_fmt = if start.date_naive() == end.date_naive() {
                                // Single-day event, just format the end time.
                                end.format("%k:%M")
                            } else {
                                // Multi-day event, format end date and time.
                                end.format("%B %e %k:%M")
                            };

                            Value::from(format!("{start_time} - {end_fmt}"))
                        }
                        None => Value::from(format!("{start_time}")),
                    }
                }
            }
            "location" => Value::from(location_line(self)),
            "source" => self.source.clone().map(Value::from).unwrap_or_default(),
            "description" => self
                .description
                .clone()
                .map(Value::from)
                .unwrap_or_default(),
            _ => return None,
        };

        Some(value)
    }
}

/// One display line for wherever the event happens: venue, city, state and
/// country, whichever are present, comma-separated.
fn location_line(event: &Event) -> String {
    let parts: Vec<&str> = [&event.venue, &event.city, &event.state, &event.country]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect();

    parts.join(", ")
}

/// Builds the template value for the month groups. This keeps the HTML
/// templates free of grouping and formatting logic.
pub fn groups_value(groups: &EventsByMonth) -> Value {
    let groups: Vec<Value> = groups
        .iter()
        .map(|(month, events)| {
            minijinja::context! {
                month => month.to_string(),
                events => events
                    .iter()
                    .cloned()
                    .map(Value::from_struct_object)
                    .collect::<Vec<_>>(),
            }
        })
        .collect();

    Value::from(groups)
}
