//! Window selection: which part feeds each output channel, and which
//! measures of the score end up in the jingle.

use std::fmt;
use std::ops::Range;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::SelectError;
use crate::note::{Note, Score};

/// Bytes of jingle header stored on the device (note counts per channel)
pub const JINGLE_HEADER_BYTES: usize = 4;
/// Bytes of device storage per programmed note
pub const BYTES_PER_NOTE: usize = 6;

/// Haptic output channel of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Right,
    Left,
}

impl Channel {
    /// Upload order; the first entry is the primary channel
    pub const ALL: [Channel; 2] = [Channel::Right, Channel::Left];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Right => "right",
            Channel::Left => "left",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub part_index: usize,
    /// Multiplier applied to every frequency (2.0 = one octave up)
    pub octave_adjust: f64,
    /// Which chord member this channel plays
    pub chord_index: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            part_index: 0,
            octave_adjust: 1.0,
            chord_index: 0,
        }
    }
}

/// Channel configuration layered over a parsed score.
/// Every mutator validates against the score and leaves the window unchanged on error.
#[derive(Debug, Clone)]
pub struct Window<'a> {
    score: &'a Score,
    right: ChannelConfig,
    left: ChannelConfig,
    measures: Range<usize>,
}

impl<'a> Window<'a> {
    /// Both channels on part 0, covering the whole score
    pub fn new(score: &'a Score) -> Self {
        Self {
            score,
            right: ChannelConfig::default(),
            left: ChannelConfig::default(),
            measures: 0..score.total_measures(),
        }
    }

    pub fn score(&self) -> &'a Score {
        self.score
    }

    pub fn channel(&self, channel: Channel) -> &ChannelConfig {
        match channel {
            Channel::Right => &self.right,
            Channel::Left => &self.left,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelConfig {
        match channel {
            Channel::Right => &mut self.right,
            Channel::Left => &mut self.left,
        }
    }

    pub fn measure_range(&self) -> Range<usize> {
        self.measures.clone()
    }

    pub fn total_measures(&self) -> usize {
        self.score.total_measures()
    }

    pub fn set_part_index(
        &mut self,
        channel: Channel,
        part_index: usize,
    ) -> Result<(), SelectError> {
        let parts = self.score.parts.len();
        if part_index >= parts {
            return Err(SelectError::BadIndex {
                what: "part",
                index: part_index,
                limit: parts,
            });
        }
        self.channel_mut(channel).part_index = part_index;
        Ok(())
    }

    /// Set the half-open measure window `start..end`
    pub fn set_measure_range(&mut self, start: usize, end: usize) -> Result<(), SelectError> {
        let total = self.total_measures();
        if start > end || end > total {
            return Err(SelectError::BadMeasureRange { start, end, total });
        }
        self.measures = start..end;
        Ok(())
    }

    pub fn set_octave_adjust(&mut self, channel: Channel, factor: f64) -> Result<(), SelectError> {
        if !(factor > 0.0 && factor.is_finite()) {
            return Err(SelectError::BadOctaveAdjust(factor));
        }
        self.channel_mut(channel).octave_adjust = factor;
        Ok(())
    }

    /// Chord member to play on `channel`, bounded by the widest chord in its window
    pub fn set_chord_index(
        &mut self,
        channel: Channel,
        chord_index: usize,
    ) -> Result<(), SelectError> {
        let part = self.channel(channel).part_index;
        let width = self.chord_width_in(part, self.measures.clone()).max(1);
        if chord_index >= width {
            return Err(SelectError::BadIndex {
                what: "chord",
                index: chord_index,
                limit: width,
            });
        }
        self.channel_mut(channel).chord_index = chord_index;
        Ok(())
    }

    /// Largest chord in `part` over measures `start..end`.
    /// Out-of-bounds arguments report `InvalidRange` and yield 0.
    pub fn max_chord_width(
        &self,
        part: usize,
        start: usize,
        end: usize,
        diagnostics: &mut Diagnostics,
    ) -> usize {
        let valid = self
            .score
            .parts
            .get(part)
            .is_some_and(|p| start <= end && end <= p.measures.len());
        if !valid {
            diagnostics.report(Diagnostic::InvalidRange { part, start, end });
            return 0;
        }
        self.chord_width_in(part, start..end)
    }

    fn chord_width_in(&self, part: usize, measures: Range<usize>) -> usize {
        self.score
            .parts
            .get(part)
            .and_then(|p| p.measures.get(measures))
            .into_iter()
            .flatten()
            .flat_map(|m| &m.notes)
            .map(Note::chord_width)
            .max()
            .unwrap_or(0)
    }

    /// Notes of `channel`'s part inside the window, in playing order.
    pub fn selected_notes(
        &self,
        channel: Channel,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<&'a Note>, SelectError> {
        let part_index = self.channel(channel).part_index;
        let Some(part) = self.score.parts.get(part_index) else {
            return Err(SelectError::BadPartIndex {
                part: part_index,
                parts: self.score.parts.len(),
            });
        };
        let total = self.total_measures();
        if self.measures.start > self.measures.end || self.measures.end > total {
            return Err(SelectError::BadMeasureRange {
                start: self.measures.start,
                end: self.measures.end,
                total,
            });
        }

        let available = part.measures.len();
        if self.measures.end > available {
            diagnostics.report(Diagnostic::MeasuresUnavailable {
                channel,
                part: part_index,
                requested_end: self.measures.end,
                available,
            });
        }
        let end = self.measures.end.min(available);
        let start = self.measures.start.min(end);

        Ok(part.measures[start..end]
            .iter()
            .flat_map(|m| m.notes.iter())
            .collect())
    }

    /// Device storage the current configuration would take once uploaded.
    /// The right channel sets the note count and the left channel is padded
    /// or truncated to match, so every channel stores that many notes.
    pub fn estimate_storage_bytes(&self) -> Result<usize, SelectError> {
        let mut scratch = Diagnostics::new();
        let notes = self.selected_notes(Channel::Right, &mut scratch)?.len();
        self.selected_notes(Channel::Left, &mut scratch)?;
        Ok(JINGLE_HEADER_BYTES + Channel::ALL.len() * notes * BYTES_PER_NOTE)
    }

    /// Reject configurations that would not fit in `capacity` bytes
    pub fn check_capacity(&self, capacity: usize) -> Result<usize, SelectError> {
        let required = self.estimate_storage_bytes()?;
        if required > capacity {
            return Err(SelectError::CapacityExceeded { required, capacity });
        }
        Ok(required)
    }
}
