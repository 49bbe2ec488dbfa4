use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One event as it travels to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    /// One kept event stands for this many submitted events.
    #[serde(rename = "samplerate")]
    pub sample_rate: u32,
    pub data: serde_json::Value,
}

/// Events sent to the transport together.
#[derive(Debug, Clone)]
pub struct Batch {
    pub dataset: Arc<str>,
    pub events: Vec<Event>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialises_with_sink_field_names() {
        let event = Event {
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            sample_rate: 4,
            data: json!({"bytes": 10}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["samplerate"], 4);
        assert_eq!(value["data"]["bytes"], 10);
        assert_eq!(value["time"], "2023-11-14T22:13:20Z");
    }
}
