//! Text protocol spoken by the device's serial console.
//!
//! Every command is one line of space-separated fields. The device echoes
//! the line back, followed by a fixed success message; anything else is a
//! failure.

use std::fmt;
use std::str::FromStr;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{CommandParseError, SelectError};
use crate::note::Note;
use crate::window::{Channel, ChannelConfig, Window};

/// PWM duty cycle (out of 256) used for every note
pub const DUTY_CYCLE: u32 = 128;

pub const JINGLE_ADDED: &str = "\rJingle added successfully.\n\r";
pub const NOTE_UPDATED: &str = "\rNote updated successfully.\n\r";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteCommand {
    pub jingle: u32,
    pub channel: Channel,
    pub index: u32,
    pub duty_cycle: u32,
    /// Hz
    pub frequency: u32,
    pub duration_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Allocate a jingle slot with this many notes per channel
    AddJingle { right_notes: u32, left_notes: u32 },
    Note(NoteCommand),
}

impl Command {
    /// Exact bytes the device answers with on success
    pub fn expected_ack(&self) -> String {
        let suffix = match self {
            Command::AddJingle { .. } => JINGLE_ADDED,
            Command::Note(_) => NOTE_UPDATED,
        };
        format!("{}{}", self, suffix)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::AddJingle {
                right_notes,
                left_notes,
            } => writeln!(f, "jingle add {} {}", right_notes, left_notes),
            Command::Note(note) => write!(f, "{}", note),
        }
    }
}

impl fmt::Display for NoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "jingle note {} {} {} {} {} {}",
            self.jingle, self.channel, self.index, self.duty_cycle, self.frequency, self.duration_ms
        )
    }
}

impl FromStr for NoteCommand {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| CommandParseError {
            line: line.to_string(),
            reason: reason.to_string(),
        };
        let fields: Vec<&str> = line.trim_end_matches('\n').split(' ').collect();
        let [keyword, verb, jingle, channel, index, duty, frequency, duration] = fields[..] else {
            return Err(fail("expected 8 fields"));
        };
        if keyword != "jingle" || verb != "note" {
            return Err(fail("not a note command"));
        }
        let channel = match channel {
            "right" => Channel::Right,
            "left" => Channel::Left,
            _ => return Err(fail("unknown channel")),
        };
        let number = |field: &str| field.parse::<u32>().map_err(|_| fail("bad number"));
        Ok(NoteCommand {
            jingle: number(jingle)?,
            channel,
            index: number(index)?,
            duty_cycle: number(duty)?,
            frequency: number(frequency)?,
            duration_ms: number(duration)?,
        })
    }
}

/// Integer milliseconds for a length in quarter notes
pub fn duration_ms(length: f64, tempo_bpm: f64) -> u32 {
    (length * 60_000.0 / tempo_bpm) as u32
}

/// Build the program-note command for one note on one channel.
/// A chord index past the end of this chord sends 0 Hz and is reported.
pub fn note_command(
    note: &Note,
    channel: Channel,
    config: &ChannelConfig,
    jingle: u32,
    index: u32,
    tempo_bpm: f64,
    diagnostics: &mut Diagnostics,
) -> NoteCommand {
    let frequency = match note.frequencies.get(config.chord_index) {
        Some(hz) => (hz * config.octave_adjust) as u32,
        None => {
            diagnostics.report(Diagnostic::ChordIndexOutOfRange {
                channel,
                note_index: index as usize,
                chord_index: config.chord_index,
                chord_width: note.chord_width(),
            });
            0
        }
    };
    NoteCommand {
        jingle,
        channel,
        index,
        duty_cycle: DUTY_CYCLE,
        frequency,
        duration_ms: duration_ms(note.length, tempo_bpm),
    }
}

/// Full command sequence for the window: one allocation, then each note
/// index programmed on every channel in turn. The right channel decides the
/// note count.
pub fn encode_jingle(
    window: &Window<'_>,
    jingle: u32,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Command>, SelectError> {
    let tempo = window.score().tempo_bpm;
    let right = window.selected_notes(Channel::Right, diagnostics)?;
    let left = window.selected_notes(Channel::Left, diagnostics)?;
    let count = right.len();

    if left.len() > count {
        diagnostics.report(Diagnostic::ChannelTruncated {
            channel: Channel::Left,
            dropped: left.len() - count,
        });
    }

    let mut commands = Vec::with_capacity(1 + 2 * count);
    commands.push(Command::AddJingle {
        right_notes: count as u32,
        left_notes: count as u32,
    });

    for i in 0..count {
        let index = i as u32;
        for (channel, notes) in [(Channel::Right, &right), (Channel::Left, &left)] {
            let command = match notes.get(i) {
                Some(note) => note_command(
                    note,
                    channel,
                    window.channel(channel),
                    jingle,
                    index,
                    tempo,
                    diagnostics,
                ),
                None => {
                    diagnostics.report(Diagnostic::ChannelExhausted {
                        channel,
                        note_index: i,
                    });
                    NoteCommand {
                        jingle,
                        channel,
                        index,
                        duty_cycle: DUTY_CYCLE,
                        frequency: 0,
                        duration_ms: 0,
                    }
                }
            };
            commands.push(Command::Note(command));
        }
    }

    Ok(commands)
}
