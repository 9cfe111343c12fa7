use ordered_float::OrderedFloat;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::error::{Error, Result};
use crate::state::PatientId;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    /// Spawns the next patient.
    Arrival,
    PreparationDone(PatientId),
    OperationDone(PatientId),
    RecoveryDone(PatientId),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScheduledEvent {
    pub time: OrderedFloat<f64>,
    pub sequence: u64,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn time(&self) -> f64 {
        self.time.into_inner()
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending events ordered by time, ties broken by insertion order.
#[derive(Debug, Default)]
pub struct Calendar {
    events: BinaryHeap<Reverse<ScheduledEvent>>,
    now: f64,
    inserted: u64,
}

impl Calendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time of the most recently popped event.
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn schedule(&mut self, time: f64, event: Event) -> Result<()> {
        if time.is_nan() || time < self.now {
            return Err(Error::Invariant(format!(
                "event {:?} scheduled at {} before current time {}",
                event, time, self.now
            )));
        }
        let sequence = self.inserted;
        self.inserted += 1;
        self.events.push(Reverse(ScheduledEvent {
            time: OrderedFloat(time),
            sequence,
            event,
        }));
        Ok(())
    }

    pub fn peek_time(&self) -> Option<f64> {
        self.events.peek().map(|Reverse(next)| next.time())
    }

    pub fn pop_next(&mut self) -> Option<ScheduledEvent> {
        let Reverse(next) = self.events.pop()?;
        self.now = next.time();
        Some(next)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_time_order() {
        let mut calendar = Calendar::new();
        calendar.schedule(5.0, Event::RecoveryDone(1)).unwrap();
        calendar.schedule(1.5, Event::Arrival).unwrap();
        calendar.schedule(3.0, Event::OperationDone(2)).unwrap();

        let times: Vec<f64> = std::iter::from_fn(|| calendar.pop_next())
            .map(|scheduled| scheduled.time())
            .collect();
        assert_eq!(times, vec![1.5, 3.0, 5.0]);
        assert!(calendar.is_empty());
        assert_eq!(calendar.now(), 5.0);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut calendar = Calendar::new();
        calendar.schedule(2.0, Event::RecoveryDone(3)).unwrap();
        calendar.schedule(2.0, Event::Arrival).unwrap();
        calendar.schedule(2.0, Event::PreparationDone(1)).unwrap();

        let order: Vec<Event> = std::iter::from_fn(|| calendar.pop_next())
            .map(|scheduled| scheduled.event)
            .collect();
        assert_eq!(
            order,
            vec![
                Event::RecoveryDone(3),
                Event::Arrival,
                Event::PreparationDone(1)
            ]
        );
    }

    #[test]
    fn rejects_events_in_the_past() {
        let mut calendar = Calendar::new();
        calendar.schedule(10.0, Event::Arrival).unwrap();
        calendar.pop_next().unwrap();
        assert!(calendar.schedule(9.0, Event::Arrival).is_err());
        assert!(calendar.schedule(f64::NAN, Event::Arrival).is_err());
        assert!(calendar.schedule(10.0, Event::Arrival).is_ok());
        assert_eq!(calendar.len(), 1);
    }

    #[test]
    fn infinite_times_sort_last() {
        let mut calendar = Calendar::new();
        calendar.schedule(f64::INFINITY, Event::Arrival).unwrap();
        calendar.schedule(4.0, Event::OperationDone(1)).unwrap();
        assert_eq!(calendar.peek_time(), Some(4.0));
    }
}
