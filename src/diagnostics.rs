//! Non-fatal warnings collected alongside parsing, selection and encoding.
//! Presenting them is left to the caller.

use std::fmt;

use crate::window::Channel;

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A chord member declared a length different from the first member
    ChordLengthMismatch {
        part: usize,
        measure: usize,
        kept: f64,
        discarded: f64,
    },
    /// The configured chord index is wider than this note's chord
    ChordIndexOutOfRange {
        channel: Channel,
        note_index: usize,
        chord_index: usize,
        chord_width: usize,
    },
    InvalidRange {
        part: usize,
        start: usize,
        end: usize,
    },
    /// The part ends before the configured measure window does
    MeasuresUnavailable {
        channel: Channel,
        part: usize,
        requested_end: usize,
        available: usize,
    },
    /// Left channel ran out of notes before the primary channel
    ChannelExhausted { channel: Channel, note_index: usize },
    /// Left channel has notes past the end of the primary channel
    ChannelTruncated { channel: Channel, dropped: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ChordLengthMismatch {
                part,
                measure,
                kept,
                discarded,
            } => write!(
                f,
                "part {} measure {}: chord member length {} differs from {}, keeping {}",
                part, measure, discarded, kept, kept
            ),
            Diagnostic::ChordIndexOutOfRange {
                channel,
                note_index,
                chord_index,
                chord_width,
            } => write!(
                f,
                "{} note {}: chord index {} out of range for chord of {}, sending 0 Hz",
                channel, note_index, chord_index, chord_width
            ),
            Diagnostic::InvalidRange { part, start, end } => {
                write!(f, "invalid range: part {} measures {}..{}", part, start, end)
            }
            Diagnostic::MeasuresUnavailable {
                channel,
                part,
                requested_end,
                available,
            } => write!(
                f,
                "{} channel: part {} has {} measures, window asks for {}",
                channel, part, available, requested_end
            ),
            Diagnostic::ChannelExhausted {
                channel,
                note_index,
            } => write!(
                f,
                "{} channel has no note {}, sending silence",
                channel, note_index
            ),
            Diagnostic::ChannelTruncated { channel, dropped } => write!(
                f,
                "{} channel is longer than the primary channel, dropping {} note{}",
                channel,
                dropped,
                if *dropped != 1 { "s" } else { "" }
            ),
        }
    }
}

/// Collector for diagnostics
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        log::debug!("diagnostic: {}", diagnostic);
        self.entries.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
