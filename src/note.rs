use crate::error::ScoreError;

/// Frequency of C0, the lowest C in scientific pitch notation
pub const C0_FREQ: f64 = 16.35;

/// Diatonic step letter as written in a `<step>` element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Step {
    /// Parse a step letter. Only the first character is significant.
    pub fn from_letter(text: &str) -> Result<Step, ScoreError> {
        match text.trim().chars().next() {
            Some('C') => Ok(Step::C),
            Some('D') => Ok(Step::D),
            Some('E') => Ok(Step::E),
            Some('F') => Ok(Step::F),
            Some('G') => Ok(Step::G),
            Some('A') => Ok(Step::A),
            Some('B') => Ok(Step::B),
            _ => Err(ScoreError::InvalidStep(text.trim().to_string())),
        }
    }

    /// Semitones above C within the same octave
    pub fn semitone(self) -> i32 {
        match self {
            Step::C => 0,
            Step::D => 2,
            Step::E => 4,
            Step::F => 5,
            Step::G => 7,
            Step::A => 9,
            Step::B => 11,
        }
    }
}

/// Equal-tempered frequency in Hz for a step, alteration (semitones) and octave.
pub fn frequency(step: Step, alter: i32, octave: i32) -> f64 {
    let half_steps = octave * 12 + alter + step.semitone();
    C0_FREQ * 2.0_f64.powf(half_steps as f64 / 12.0)
}

/// One sounding event: a single pitch or a chord, all members sharing one length.
/// A frequency of 0 encodes a rest.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub frequencies: Vec<f64>,
    /// Duration in quarter notes
    pub length: f64,
}

impl Note {
    pub fn new(frequency: f64, length: f64) -> Self {
        Self {
            frequencies: vec![frequency],
            length,
        }
    }

    pub fn chord_width(&self) -> usize {
        self.frequencies.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measure {
    pub notes: Vec<Note>,
    /// Raw ticks consumed by the non-chord notes of this measure
    pub xml_duration_sum: u32,
}

/// A staff line, or a voice split off one by a backup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Part {
    pub measures: Vec<Measure>,
}

impl Part {
    pub fn note_count(&self) -> usize {
        self.measures.iter().map(|m| m.notes.len()).sum()
    }
}

/// A fully parsed score
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub parts: Vec<Part>,
    /// Ticks per quarter note, last declared value
    pub divisions: u32,
    pub tempo_bpm: f64,
}

impl Score {
    pub fn new() -> Self {
        Self {
            parts: Vec::new(),
            divisions: 1,
            tempo_bpm: 100.0,
        }
    }

    /// Measure count of the first part. Every part is expected to match it.
    pub fn total_measures(&self) -> usize {
        self.parts.first().map_or(0, |p| p.measures.len())
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::new()
    }
}
