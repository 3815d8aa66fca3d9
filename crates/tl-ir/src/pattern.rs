//! Patterns and the tracks they reference.

use alloc::vec::Vec;

use crate::event::Event;
use crate::song::AllocError;

/// Index into `Song::tracks`.
pub type TrackId = usize;

/// One channel's worth of events, shareable between patterns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    events: Vec<Event>,
}

impl Track {
    /// Allocate a track of `rows` empty events.
    pub fn new(rows: u16) -> Result<Self, AllocError> {
        let mut events = Vec::new();
        events
            .try_reserve_exact(rows as usize)
            .map_err(|_| AllocError(rows as usize))?;
        events.resize(rows as usize, Event::empty());
        Ok(Self { events })
    }

    /// Number of rows, fixed at allocation.
    pub fn rows(&self) -> u16 {
        self.events.len() as u16
    }

    pub fn event(&self, row: u16) -> Option<&Event> {
        self.events.get(row as usize)
    }

    pub fn event_mut(&mut self, row: u16) -> Option<&mut Event> {
        self.events.get_mut(row as usize)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut [Event] {
        &mut self.events
    }
}

/// A pattern: a row count and one track per channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pattern {
    /// Number of rows (1-256)
    pub rows: u16,
    /// Track index for each channel
    pub tracks: Vec<TrackId>,
}

impl Pattern {
    /// Create a pattern whose channels all point at track 0.
    pub fn new(rows: u16, channels: usize) -> Self {
        Self {
            rows,
            tracks: alloc::vec![0; channels],
        }
    }

    /// Track referenced by `channel`.
    pub fn track(&self, channel: usize) -> Option<TrackId> {
        self.tracks.get(channel).copied()
    }
}
