//! Song structure: the root of the canonical module model.

use alloc::string::String;
use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::event::Event;
use crate::instrument::Instrument;
use crate::pattern::{Pattern, Track, TrackId};
use crate::sample::{Sample, C4_PAL_RATE};

/// A fallible allocation could not reserve room for this many entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cannot allocate {0} entries")]
pub struct AllocError(pub usize);

/// A structural invariant of a decoded song does not hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("order position {position} references missing pattern {pattern}")]
    OrderOutOfRange { position: usize, pattern: u8 },
    #[error("pattern {pattern} channel {channel} references missing track {track}")]
    TrackOutOfRange {
        pattern: usize,
        channel: usize,
        track: TrackId,
    },
    #[error("pattern {pattern} has {tracks} tracks for {channels} channels")]
    ChannelCountMismatch {
        pattern: usize,
        tracks: usize,
        channels: usize,
    },
}

/// A complete song.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Song {
    /// Song title
    pub title: ArrayString<64>,
    /// Author, when the format stores one
    pub author: ArrayString<32>,
    /// Free-form format identification, e.g. "M.K. (Protracker)"
    pub format: String,
    /// Initial tempo in BPM
    pub initial_tempo: u16,
    /// Initial speed (ticks per row)
    pub initial_speed: u8,
    /// Order position to restart from when the song ends
    pub restart: u8,
    /// Maximum volume of events and sub-instruments
    pub volume_base: u8,
    /// Playback rate of C-4
    pub c4_rate: u32,
    /// Playback behaviour flags
    pub quirks: Quirks,
    /// Per-channel settings; their count is the song's channel count
    pub channels: Vec<ChannelSettings>,
    /// Order list
    pub order: Vec<OrderEntry>,
    pub patterns: Vec<Pattern>,
    /// Track table shared by all patterns
    pub tracks: Vec<Track>,
    pub instruments: Vec<Instrument>,
    pub samples: Vec<Sample>,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            title: ArrayString::new(),
            author: ArrayString::new(),
            format: String::new(),
            initial_tempo: 125,
            initial_speed: 6,
            restart: 0,
            volume_base: 0x40,
            c4_rate: C4_PAL_RATE,
            quirks: Quirks::default(),
            channels: Vec::new(),
            order: Vec::new(),
            patterns: Vec::new(),
            tracks: Vec::new(),
            instruments: Vec::new(),
            samples: Vec::new(),
        }
    }
}

impl Song {
    /// Create a new empty song.
    pub fn new(title: &str) -> Self {
        let mut song = Self::default();
        song.set_title(title);
        song
    }

    /// Create a song with a given number of channels, panned Amiga style
    /// (left, right, right, left).
    pub fn with_channels(title: &str, num_channels: usize) -> Self {
        let mut song = Self::new(title);
        song.set_channels(num_channels);
        song
    }

    /// Replace the channel list with `num_channels` Amiga-panned channels.
    pub fn set_channels(&mut self, num_channels: usize) {
        self.channels = (0..num_channels)
            .map(|i| {
                let pan = match i % 4 {
                    0 | 3 => 0x00,
                    _ => 0xff,
                };
                ChannelSettings::with_pan(pan)
            })
            .collect();
    }

    /// Replace the title, truncating to capacity.
    pub fn set_title(&mut self, title: &str) {
        self.title.clear();
        push_truncated(&mut self.title, title);
    }

    /// Replace the author, truncating to capacity.
    pub fn set_author(&mut self, author: &str) {
        self.author.clear();
        push_truncated(&mut self.author, author);
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Append `n` default instruments.
    pub fn alloc_instruments(&mut self, n: usize) -> Result<(), AllocError> {
        self.instruments.try_reserve(n).map_err(|_| AllocError(n))?;
        self.instruments.resize_with(self.instruments.len() + n, Instrument::default);
        Ok(())
    }

    /// Append `n` empty samples.
    pub fn alloc_samples(&mut self, n: usize) -> Result<(), AllocError> {
        self.samples.try_reserve(n).map_err(|_| AllocError(n))?;
        self.samples.resize_with(self.samples.len() + n, Sample::default);
        Ok(())
    }

    /// Append `n` 64-row patterns whose channels reference track 0.
    pub fn alloc_patterns(&mut self, n: usize) -> Result<(), AllocError> {
        self.patterns.try_reserve(n).map_err(|_| AllocError(n))?;
        let channels = self.num_channels();
        self.patterns
            .resize_with(self.patterns.len() + n, || Pattern::new(64, channels));
        Ok(())
    }

    /// Give `pattern` one freshly allocated track per channel.
    pub fn alloc_pattern_tracks(&mut self, pattern: usize, rows: u16) -> Result<(), AllocError> {
        let channels = self.num_channels();
        let mut ids = Vec::new();
        ids.try_reserve_exact(channels).map_err(|_| AllocError(channels))?;
        for _ in 0..channels {
            ids.push(self.add_track(rows)?);
        }
        if let Some(pat) = self.patterns.get_mut(pattern) {
            pat.rows = rows;
            pat.tracks = ids;
        }
        Ok(())
    }

    /// Append a track of `rows` empty events, returning its index.
    pub fn add_track(&mut self, rows: u16) -> Result<TrackId, AllocError> {
        let track = Track::new(rows)?;
        self.tracks.try_reserve(1).map_err(|_| AllocError(1))?;
        self.tracks.push(track);
        Ok(self.tracks.len() - 1)
    }

    /// Grow the track table to `n` entries, filling with empty tracks.
    ///
    /// Existing track indices stay valid.
    pub fn resize_tracks(&mut self, n: usize, rows: u16) -> Result<(), AllocError> {
        let missing = n.saturating_sub(self.tracks.len());
        self.tracks.try_reserve(missing).map_err(|_| AllocError(missing))?;
        while self.tracks.len() < n {
            self.tracks.push(Track::new(rows)?);
        }
        Ok(())
    }

    /// Track played by `channel` in `pattern`.
    pub fn track_for(&self, pattern: usize, channel: usize) -> Option<TrackId> {
        self.patterns.get(pattern)?.track(channel)
    }

    /// Event at (`pattern`, `channel`, `row`).
    pub fn event(&self, pattern: usize, channel: usize, row: u16) -> Option<&Event> {
        let track = self.track_for(pattern, channel)?;
        self.tracks.get(track)?.event(row)
    }

    pub fn event_mut(&mut self, pattern: usize, channel: usize, row: u16) -> Option<&mut Event> {
        let track = self.track_for(pattern, channel)?;
        self.tracks.get_mut(track)?.event_mut(row)
    }

    /// Replace order entries that name a missing pattern with `Skip`.
    ///
    /// Returns how many entries were replaced.
    pub fn sanitize_order(&mut self) -> usize {
        let count = self.patterns.len();
        let mut replaced = 0;
        for entry in &mut self.order {
            if let OrderEntry::Pattern(p) = *entry {
                if p as usize >= count {
                    *entry = OrderEntry::Skip;
                    replaced += 1;
                }
            }
        }
        replaced
    }

    /// Check order and track references.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (position, entry) in self.order.iter().enumerate() {
            if let OrderEntry::Pattern(p) = *entry {
                if p as usize >= self.patterns.len() {
                    return Err(ValidationError::OrderOutOfRange { position, pattern: p });
                }
            }
        }
        for (i, pat) in self.patterns.iter().enumerate() {
            if pat.tracks.len() != self.channels.len() {
                return Err(ValidationError::ChannelCountMismatch {
                    pattern: i,
                    tracks: pat.tracks.len(),
                    channels: self.channels.len(),
                });
            }
            for (channel, &track) in pat.tracks.iter().enumerate() {
                if track >= self.tracks.len() {
                    return Err(ValidationError::TrackOutOfRange {
                        pattern: i,
                        channel,
                        track,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Append as much of `src` as fits, stopping at a character boundary.
pub(crate) fn push_truncated<const N: usize>(dst: &mut ArrayString<N>, src: &str) {
    for c in src.chars() {
        if dst.try_push(c).is_err() {
            break;
        }
    }
}

/// Per-channel settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Initial pan (0-255, 0x80 = center)
    pub initial_pan: u8,
    /// Initial volume (0-64)
    pub initial_vol: u8,
    /// Channel is driven by an FM patch instead of PCM
    pub synth: bool,
    /// Channel is muted
    pub muted: bool,
}

impl ChannelSettings {
    pub fn with_pan(pan: u8) -> Self {
        Self {
            initial_pan: pan,
            ..Self::default()
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            initial_pan: 0x80,
            initial_vol: 64,
            synth: false,
            muted: false,
        }
    }
}

/// Playback behaviour that differs between trackers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Quirks {
    /// Pitch slides work on linear frequency instead of Amiga periods
    pub linear_periods: bool,
    /// Clamp periods to the ProTracker range
    pub amiga_range: bool,
    /// FastTracker-style note and instrument handling
    pub ft2: bool,
    /// Fine slide effects use an extra fine resolution
    pub fine_effects: bool,
    /// Volume and pitch slides also run on the first tick of a row
    pub slide_every_tick: bool,
}

/// An entry in the song order list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderEntry {
    /// Play this pattern
    Pattern(u8),
    /// Skip marker
    Skip,
    /// End of song
    End,
}
