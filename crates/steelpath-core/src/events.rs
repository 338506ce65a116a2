//! Discrete event scheduling and delivery.
//!
//! The [`EventQueue`] holds every pending [`Event`] keyed by
//! [`EventKey`] `(time, sequence)`. The sequence number is assigned when an
//! event is scheduled and never reused, so two events due at the same
//! instant always come out in scheduling order and delivery is a total
//! order independent of how the queue is stored.
//!
//! Agents never touch the queue directly. While handling an event or
//! stepping they write [`ScheduleRequest`]s into an [`Outbox`]; the owner
//! of the phase commits the outbox once the phase is over. A follow-up
//! requested during a drain is therefore delivered on the next drain at the
//! earliest, even if it is already due.

use std::collections::BTreeMap;

use steelpath_types::{
    AgentId, Event, EventKey, FailurePhase, SimulationTime, StepFailure, Timestamp,
};
use tracing::{debug, info, warn};

use crate::agent::{AgentLookup, EventContext};

/// Unrecoverable event queue failures.
#[derive(Debug, thiserror::Error)]
pub enum EventQueueError {
    /// The queue yielded an event that sorts before the one popped just
    /// before it within the same drain.
    #[error("event queue yielded {next:?} after {previous:?}")]
    OutOfOrder {
        /// Key of the event popped first.
        previous: EventKey,
        /// Key of the offending event.
        next: EventKey,
    },

    /// Every sequence number has been handed out.
    #[error("event sequence numbers exhausted after {last}")]
    SequenceExhausted {
        /// Last sequence number that was handed out.
        last: u64,
    },
}

/// A request to schedule an event, not yet sequenced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRequest {
    /// Instant at which the event becomes due.
    pub time: Timestamp,
    /// Agent that should handle the event.
    pub target: AgentId,
    /// Event tag.
    pub event_type: String,
    /// Opaque payload.
    pub payload: serde_json::Value,
}

/// Buffer of scheduling requests made during one phase of a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outbox {
    requests: Vec<ScheduleRequest>,
}

impl Outbox {
    /// Create an empty outbox.
    pub const fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }

    /// Request an event for `target` at `time`.
    pub fn schedule(
        &mut self,
        time: Timestamp,
        target: impl Into<AgentId>,
        event_type: &str,
        payload: serde_json::Value,
    ) {
        self.requests.push(ScheduleRequest {
            time,
            target: target.into(),
            event_type: event_type.to_owned(),
            payload,
        });
    }

    /// Number of buffered requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no requests are buffered.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Borrow the buffered requests in request order.
    pub fn requests(&self) -> &[ScheduleRequest] {
        &self.requests
    }
}

/// Outcome of one [`EventQueue::drain`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Every event removed from the queue, in delivery order.
    pub processed: Vec<Event>,
    /// How many of those had no matching agent.
    pub undeliverable: usize,
    /// Recoverable handler failures.
    pub failures: Vec<StepFailure>,
}

/// Time-ordered, deterministic delivery queue.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    /// Pending events keyed by `(time, sequence)`.
    pending: BTreeMap<EventKey, Event>,

    /// Next sequence number to hand out.
    next_sequence: u64,
}

impl EventQueue {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next_sequence: 0,
        }
    }

    /// Schedule an event and return its sequence number.
    ///
    /// `time` may lie in the past relative to the last drain; such an event
    /// is delivered by the next drain.
    ///
    /// # Errors
    ///
    /// Returns [`EventQueueError::SequenceExhausted`] once no unused
    /// sequence number is left.
    pub fn schedule(
        &mut self,
        time: Timestamp,
        target: impl Into<AgentId>,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<u64, EventQueueError> {
        let sequence = self.next_sequence;
        self.next_sequence = sequence
            .checked_add(1)
            .ok_or(EventQueueError::SequenceExhausted {
                last: sequence.saturating_sub(1),
            })?;

        let event = Event {
            time,
            target: target.into(),
            event_type: event_type.to_owned(),
            payload,
            sequence,
        };
        debug!(%event, "Event scheduled");
        self.pending.insert(event.key(), event);
        Ok(sequence)
    }

    /// Schedule every request in the outbox, in request order.
    ///
    /// # Errors
    ///
    /// Returns [`EventQueueError::SequenceExhausted`] if the sequence runs
    /// out part way; requests before that point stay scheduled.
    pub fn commit(&mut self, outbox: Outbox) -> Result<(), EventQueueError> {
        for request in outbox.requests {
            self.schedule(
                request.time,
                request.target,
                &request.event_type,
                request.payload,
            )?;
        }
        Ok(())
    }

    /// Instant of the earliest pending event, if any.
    pub fn peek_next_time(&self) -> Option<Timestamp> {
        self.pending.keys().next().map(|key| key.time)
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no events are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Iterate over pending events in delivery order.
    pub fn pending(&self) -> impl Iterator<Item = &Event> {
        self.pending.values()
    }

    /// Remove and deliver every event due at or before `now.time`.
    ///
    /// Events are delivered in `(time, sequence)` order to the target's
    /// [`handle_event`](crate::agent::Agent::handle_event). A missing
    /// target is logged and the event still counts as processed. A handler
    /// error is recorded in the report and does not stop the drain. Events
    /// due after `now.time` are left in place.
    ///
    /// # Errors
    ///
    /// Returns [`EventQueueError::OutOfOrder`] if the queue yields events
    /// out of key order. This is an internal invariant violation.
    pub fn drain(
        &mut self,
        now: SimulationTime,
        agents: &mut dyn AgentLookup,
    ) -> Result<DrainReport, EventQueueError> {
        let mut report = DrainReport::default();
        let mut outbox = Outbox::new();
        let mut previous: Option<EventKey> = None;

        while let Some(entry) = self.pending.first_entry() {
            if entry.key().time > now.time {
                break;
            }
            let event = entry.remove();
            let key = event.key();

            if let Some(previous) = previous.filter(|previous| key < *previous) {
                return Err(EventQueueError::OutOfOrder {
                    previous,
                    next: key,
                });
            }
            previous = Some(key);

            debug!(%event, "Processing event");
            if let Some(agent) = agents.agent_mut(&event.target) {
                let mut ctx = EventContext {
                    now,
                    outbox: &mut outbox,
                };
                if let Err(err) = agent.handle_event(&event, &mut ctx) {
                    warn!(
                        agent_id = %event.target,
                        event_type = %event.event_type,
                        error = %err,
                        "Event handler failed"
                    );
                    report.failures.push(StepFailure {
                        phase: FailurePhase::EventDelivery,
                        agent_id: Some(event.target.clone()),
                        market: None,
                        message: format!("{}: {err}", event.event_type),
                    });
                }
            } else {
                warn!(
                    agent_id = %event.target,
                    event_type = %event.event_type,
                    "Target agent not found for event"
                );
                report.undeliverable = report.undeliverable.saturating_add(1);
            }
            report.processed.push(event);
        }

        self.commit(outbox)?;
        Ok(report)
    }

    /// Discard every pending event. Sequence numbers keep counting.
    pub fn clear(&mut self) {
        let discarded = self.pending.len();
        self.pending.clear();
        info!(discarded, "All pending events cleared");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::agent::{Agent, AgentError};

    fn day(d: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn at(d: u32) -> SimulationTime {
        SimulationTime::new(day(d), 0)
    }

    /// Accepts every event; optionally fails on one type or schedules a follow-up.
    struct Recorder {
        id: AgentId,
        fail_on: Option<&'static str>,
        follow_up: Option<&'static str>,
    }

    impl Recorder {
        fn new(id: &str) -> Self {
            Self {
                id: AgentId::from(id),
                fail_on: None,
                follow_up: None,
            }
        }
    }

    impl Agent for Recorder {
        fn id(&self) -> &AgentId {
            &self.id
        }

        fn kind(&self) -> &'static str {
            "Recorder"
        }

        fn handle_event(
            &mut self,
            event: &Event,
            ctx: &mut EventContext<'_>,
        ) -> Result<(), AgentError> {
            if let Some(follow_up) = self.follow_up {
                ctx.outbox
                    .schedule(ctx.now.time, self.id.clone(), follow_up, json!(null));
            }
            if self.fail_on == Some(event.event_type.as_str()) {
                return Err(AgentError::InvalidEvent {
                    event_type: event.event_type.clone(),
                    reason: "refused".to_owned(),
                });
            }
            Ok(())
        }
    }

    fn agents(ids: &[&str]) -> BTreeMap<AgentId, Box<dyn Agent>> {
        ids.iter()
            .map(|id| {
                let agent: Box<dyn Agent> = Box::new(Recorder::new(id));
                (AgentId::from(*id), agent)
            })
            .collect()
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let mut queue = EventQueue::new();
        let a = queue.schedule(day(5), "a", "X", json!(null)).unwrap();
        let b = queue.schedule(day(1), "a", "X", json!(null)).unwrap();
        let c = queue.schedule(day(5), "a", "X", json!(null)).unwrap();
        assert_eq!((a, b, c), (0, 1, 2));
    }

    #[test]
    fn peek_returns_earliest_time() {
        let mut queue = EventQueue::new();
        assert_eq!(queue.peek_next_time(), None);
        queue.schedule(day(10), "plant_A", "RAW_MATERIAL_DELIVERY", json!({"quantity": 1000})).unwrap();
        queue.schedule(day(5), "market_B", "PRICE_UPDATE", json!({"price": 750})).unwrap();
        queue.schedule(day(10), "plant_C", "MAINTENANCE_START", json!(null)).unwrap();
        assert_eq!(queue.peek_next_time(), Some(day(5)));
    }

    #[test]
    fn drain_returns_due_subset_in_time_then_sequence_order() {
        let mut queue = EventQueue::new();
        queue.schedule(day(3), "a", "third-day-first", json!(null)).unwrap();
        queue.schedule(day(1), "a", "first-day", json!(null)).unwrap();
        queue.schedule(day(9), "a", "late", json!(null)).unwrap();
        queue.schedule(day(3), "a", "third-day-second", json!(null)).unwrap();
        queue.schedule(day(2), "a", "second-day", json!(null)).unwrap();

        let mut lookup = agents(&["a"]);
        let report = queue.drain(at(3), &mut lookup).unwrap();

        let types: Vec<&str> = report
            .processed
            .iter()
            .map(|e| e.event_type.as_str())
            .collect();
        assert_eq!(
            types,
            ["first-day", "second-day", "third-day-first", "third-day-second"]
        );
        assert!(report.processed.windows(2).all(|w| w[0].key() < w[1].key()));

        let remaining: Vec<&str> = queue.pending().map(|e| e.event_type.as_str()).collect();
        assert_eq!(remaining, ["late"]);
        assert_eq!(queue.peek_next_time(), Some(day(9)));
    }

    #[test]
    fn drain_never_pops_future_events() {
        let mut queue = EventQueue::new();
        queue.schedule(day(2), "a", "tomorrow", json!(null)).unwrap();
        let mut lookup = agents(&["a"]);
        let report = queue.drain(at(1), &mut lookup).unwrap();
        assert!(report.processed.is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn events_are_delivered_to_their_target() {
        let mut queue = EventQueue::new();
        queue.schedule(day(1), "b", "for-b", json!(null)).unwrap();
        queue.schedule(day(1), "a", "for-a", json!(null)).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut lookup: BTreeMap<AgentId, Box<dyn Agent>> = BTreeMap::new();
        for id in ["a", "b"] {
            lookup.insert(
                AgentId::from(id),
                Box::new(Tagger {
                    id: AgentId::from(id),
                    log: Rc::clone(&log),
                }),
            );
        }
        queue.drain(at(1), &mut lookup).unwrap();

        assert_eq!(
            *log.borrow(),
            [
                ("b".to_owned(), "for-b".to_owned()),
                ("a".to_owned(), "for-a".to_owned()),
            ]
        );
    }

    /// Appends `(receiver, event_type)` to a shared log.
    struct Tagger {
        id: AgentId,
        log: Rc<RefCell<Vec<(String, String)>>>,
    }

    impl Agent for Tagger {
        fn id(&self) -> &AgentId {
            &self.id
        }

        fn kind(&self) -> &'static str {
            "Tagger"
        }

        fn handle_event(
            &mut self,
            event: &Event,
            _ctx: &mut EventContext<'_>,
        ) -> Result<(), AgentError> {
            self.log
                .borrow_mut()
                .push((self.id.to_string(), event.event_type.clone()));
            Ok(())
        }
    }

    #[test]
    fn missing_target_is_skipped_but_processed() {
        let mut queue = EventQueue::new();
        queue.schedule(day(1), "ghost", "BOO", json!(null)).unwrap();
        queue.schedule(day(1), "a", "HELLO", json!(null)).unwrap();

        let mut lookup = agents(&["a"]);
        let report = queue.drain(at(1), &mut lookup).unwrap();
        assert_eq!(report.processed.len(), 2);
        assert_eq!(report.undeliverable, 1);
        assert!(report.failures.is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn handler_failure_is_recorded_and_drain_continues() {
        let mut queue = EventQueue::new();
        queue.schedule(day(1), "a", "BAD", json!(null)).unwrap();
        queue.schedule(day(1), "a", "GOOD", json!(null)).unwrap();

        let mut failing = Recorder::new("a");
        failing.fail_on = Some("BAD");
        let mut lookup: BTreeMap<AgentId, Box<dyn Agent>> = BTreeMap::new();
        lookup.insert(AgentId::from("a"), Box::new(failing));

        let report = queue.drain(at(1), &mut lookup).unwrap();
        assert_eq!(report.processed.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].phase, FailurePhase::EventDelivery);
        assert_eq!(report.failures[0].agent_id, Some(AgentId::from("a")));
    }

    #[test]
    fn follow_ups_are_deferred_to_the_next_drain() {
        let mut queue = EventQueue::new();
        queue.schedule(day(1), "a", "PING", json!(null)).unwrap();

        let mut echo = Recorder::new("a");
        echo.follow_up = Some("PONG");
        let mut lookup: BTreeMap<AgentId, Box<dyn Agent>> = BTreeMap::new();
        lookup.insert(AgentId::from("a"), Box::new(echo));

        let first = queue.drain(at(1), &mut lookup).unwrap();
        assert_eq!(first.processed.len(), 1);
        assert_eq!(queue.len(), 1);

        let second = queue.drain(at(1), &mut lookup).unwrap();
        assert_eq!(second.processed[0].event_type, "PONG");
        assert_eq!(second.processed[0].sequence, 1);
    }

    #[test]
    fn past_events_are_delivered_on_next_drain() {
        let mut queue = EventQueue::new();
        let mut lookup = agents(&["a"]);
        queue.drain(at(5), &mut lookup).unwrap();

        queue.schedule(day(2), "a", "LATE_NOTICE", json!(null)).unwrap();
        let report = queue.drain(at(6), &mut lookup).unwrap();
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.processed[0].time, day(2));
    }

    #[test]
    fn clear_discards_everything_but_keeps_sequence() {
        let mut queue = EventQueue::new();
        queue.schedule(day(1), "a", "X", json!(null)).unwrap();
        queue.schedule(day(2), "a", "Y", json!(null)).unwrap();
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.peek_next_time(), None);
        assert_eq!(queue.schedule(day(1), "a", "Z", json!(null)).unwrap(), 2);
    }

    #[test]
    fn exhausted_sequence_is_never_reused() {
        let mut queue = EventQueue::new();
        queue.next_sequence = u64::MAX - 1;
        assert_eq!(queue.schedule(day(1), "a", "LAST", json!(null)).unwrap(), u64::MAX - 1);

        let err = queue.schedule(day(1), "a", "ONE_TOO_MANY", json!(null)).unwrap_err();
        assert!(matches!(
            err,
            EventQueueError::SequenceExhausted { last } if last == u64::MAX - 1
        ));
        assert!(queue.schedule(day(1), "a", "AGAIN", json!(null)).is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn commit_sequences_in_request_order() {
        let mut queue = EventQueue::new();
        let mut outbox = Outbox::new();
        outbox.schedule(day(4), "a", "FIRST", json!(null));
        outbox.schedule(day(4), "a", "SECOND", json!(null));
        assert_eq!(outbox.len(), 2);
        queue.commit(outbox).unwrap();

        let order: Vec<(&str, u64)> = queue
            .pending()
            .map(|e| (e.event_type.as_str(), e.sequence))
            .collect();
        assert_eq!(order, [("FIRST", 0), ("SECOND", 1)]);
    }
}
