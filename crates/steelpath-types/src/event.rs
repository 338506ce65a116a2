//! Discrete events delivered to agents.
//!
//! An [`Event`] is a time-stamped instruction for one agent. Events are
//! immutable once scheduled and are delivered exactly once, in
//! [`EventKey`] order.

use serde::{Deserialize, Serialize};

use crate::ids::AgentId;
use crate::time::Timestamp;

/// Total ordering key for scheduled events.
///
/// Events are ordered by delivery time; the scheduling sequence number
/// breaks ties so that two events at the same instant always come out in
/// the order they were scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    /// Simulated instant at which the event becomes due.
    pub time: Timestamp,
    /// Scheduling sequence number, unique within one queue.
    pub sequence: u64,
}

/// A scheduled event addressed to a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Simulated instant at which the event becomes due.
    pub time: Timestamp,
    /// Agent that should handle the event.
    pub target: AgentId,
    /// Event tag, e.g. `MAINTENANCE_START` or `RAW_MATERIAL_DELIVERY`.
    pub event_type: String,
    /// Opaque payload interpreted by the receiving agent.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Sequence number assigned by the queue at scheduling time.
    pub sequence: u64,
}

impl Event {
    /// Return the ordering key of this event.
    pub const fn key(&self) -> EventKey {
        EventKey {
            time: self.time,
            sequence: self.sequence,
        }
    }

    /// Read a numeric field from the payload, if present.
    pub fn payload_f64(&self, field: &str) -> Option<f64> {
        self.payload.get(field).and_then(serde_json::Value::as_f64)
    }

    /// Read an unsigned integer field from the payload, if present.
    pub fn payload_u64(&self, field: &str) -> Option<u64> {
        self.payload.get(field).and_then(serde_json::Value::as_u64)
    }
}

impl core::fmt::Display for Event {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Event(#{} at {} -> {}: {})",
            self.sequence, self.time, self.target, self.event_type
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(day: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn key_orders_by_time_then_sequence() {
        let early_late_seq = EventKey { time: at(1), sequence: 9 };
        let late_early_seq = EventKey { time: at(2), sequence: 0 };
        let same_time_next = EventKey { time: at(1), sequence: 10 };

        assert!(early_late_seq < late_early_seq);
        assert!(early_late_seq < same_time_next);
        assert!(same_time_next < late_early_seq);
    }

    #[test]
    fn payload_accessors() {
        let event = Event {
            time: at(3),
            target: AgentId::from("plant-a"),
            event_type: "MAINTENANCE_START".to_owned(),
            payload: serde_json::json!({ "duration_steps": 3, "cost": 12.5 }),
            sequence: 0,
        };
        assert_eq!(event.payload_u64("duration_steps"), Some(3));
        assert_eq!(event.payload_f64("cost"), Some(12.5));
        assert_eq!(event.payload_u64("missing"), None);
    }

    #[test]
    fn missing_payload_deserializes_as_null() {
        let json = r#"{"time":"2024-01-01T00:00:00","target":"a","event_type":"PING","sequence":4}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert!(event.payload.is_null());
        assert_eq!(event.sequence, 4);
    }
}
