//! Bounded event history with type, correlation, and time indices
//!
//! Events live in a FIFO ring capped at `max_events`. Each event gets a
//! monotonically increasing sequence number; indices hold sequence numbers,
//! so an index entry resolves to its event in O(1). Eviction drops the
//! oldest event from the ring and every index in the same call.

use crate::types::{Event, EventCounts};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Bounded, indexed history of dispatched events
///
/// Not synchronized on its own; the bus guards it with the same lock as
/// the subscription registry.
#[derive(Debug)]
pub struct EventStore {
    max_events: usize,
    buffer: VecDeque<Event>,

    /// Sequence number the next appended event receives
    next_seq: u64,

    /// event type → sequence numbers, oldest first
    by_type: HashMap<String, VecDeque<u64>>,

    /// correlation id → sequence numbers, oldest first
    by_correlation: HashMap<String, VecDeque<u64>>,

    /// (timestamp, sequence) in time order, insertion order on ties
    by_time: BTreeSet<(DateTime<Utc>, u64)>,
}

impl EventStore {
    /// Create an empty store retaining at most `max_events` events
    pub fn new(max_events: usize) -> Self {
        Self {
            max_events,
            buffer: VecDeque::with_capacity(max_events.min(1024)),
            next_seq: 0,
            by_type: HashMap::new(),
            by_correlation: HashMap::new(),
            by_time: BTreeSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_events
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Sequence number of `buffer[0]`
    fn first_seq(&self) -> u64 {
        self.next_seq - self.buffer.len() as u64
    }

    /// Add an event, evicting the oldest one if over capacity
    pub fn append(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.by_type
            .entry(event.event_type.clone())
            .or_default()
            .push_back(seq);
        self.by_correlation
            .entry(event.correlation_id.clone())
            .or_default()
            .push_back(seq);
        self.by_time.insert((event.timestamp, seq));
        self.buffer.push_back(event);

        while self.buffer.len() > self.max_events {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        let seq = self.first_seq();
        let Some(event) = self.buffer.pop_front() else {
            return;
        };

        remove_front(&mut self.by_type, &event.event_type, seq);
        remove_front(&mut self.by_correlation, &event.correlation_id, seq);
        self.by_time.remove(&(event.timestamp, seq));

        tracing::trace!(event_id = %event.event_id, "Evicted oldest stored event");
    }

    fn resolve<'a>(&'a self, seqs: impl Iterator<Item = &'a u64> + 'a) -> Vec<Event> {
        let first = self.first_seq();
        seqs.filter_map(|seq| {
            let offset = seq.checked_sub(first)?;
            self.buffer.get(offset as usize).cloned()
        })
        .collect()
    }

    /// The `n` most recent events, oldest first
    pub fn get_recent(&self, n: usize) -> Vec<Event> {
        let skip = self.buffer.len().saturating_sub(n);
        self.buffer.iter().skip(skip).cloned().collect()
    }

    /// All retained events of one chain, in insertion order
    pub fn get_by_correlation(&self, correlation_id: &str) -> Vec<Event> {
        match self.by_correlation.get(correlation_id) {
            Some(seqs) => self.resolve(seqs.iter()),
            None => Vec::new(),
        }
    }

    /// All retained events of exactly `event_type`, in insertion order
    pub fn get_by_type(&self, event_type: &str) -> Vec<Event> {
        match self.by_type.get(event_type) {
            Some(seqs) => self.resolve(seqs.iter()),
            None => Vec::new(),
        }
    }

    /// All retained events with `start <= timestamp < end`, in time order
    pub fn get_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Event> {
        if start >= end {
            return Vec::new();
        }
        let seqs = self
            .by_time
            .range((start, 0)..(end, 0))
            .map(|(_, seq)| seq);
        self.resolve(seqs)
    }

    /// Retained event counts per type
    pub fn counts(&self) -> EventCounts {
        let mut counts = EventCounts::default();
        for (event_type, seqs) in &self.by_type {
            counts.types.insert(event_type.clone(), seqs.len() as u64);
            counts.total += seqs.len() as u64;
        }
        counts
    }

    /// Drop every event and index entry
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.by_type.clear();
        self.by_correlation.clear();
        self.by_time.clear();
    }
}

fn remove_front(index: &mut HashMap<String, VecDeque<u64>>, key: &str, seq: u64) {
    if let Some(seqs) = index.get_mut(key) {
        if seqs.front() == Some(&seq) {
            seqs.pop_front();
        } else {
            seqs.retain(|s| *s != seq);
        }
        if seqs.is_empty() {
            index.remove(key);
        }
    }
}
