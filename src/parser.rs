//! Score builder: turns a MusicXML token stream into a `Score`.
//!
//! MusicXML writes a second voice on a staff by rewinding time with
//! `<backup>` and emitting more notes. Each rewound span is written into an
//! extra `Part` appended after the declared ones; a stack of open backups
//! tracks how many ticks remain before the cursor returns to the voice that
//! issued it.

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::ScoreError;
use crate::note::{self, Measure, Note, Part, Score, Step};
use crate::token::Token;

/// Deepest nesting of unconsumed backups accepted inside one measure
pub const MAX_BACKUP_DEPTH: usize = 16;

/// An open rewind: ticks still to be replayed and the part to return to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupFrame {
    pub remaining: u32,
    pub return_part: usize,
}

/// Everything the builder mutates while consuming tokens.
#[derive(Debug, Default)]
pub struct ParserState {
    pub score: Score,
    pub current_part: usize,
    pub backups: Vec<BackupFrame>,
    /// Measure boundaries seen since the current declared part opened
    pub measures_in_part: usize,
}

/// Build a score from a token stream, stopping at the first error.
pub fn build_score<I>(tokens: I, diagnostics: &mut Diagnostics) -> Result<Score, ScoreError>
where
    I: IntoIterator<Item = Result<Token, ScoreError>>,
{
    let mut tokens = tokens.into_iter();
    let mut state = ParserState::default();

    while let Some(token) = tokens.next() {
        match token? {
            Token::StartElement(name) => match name.as_str() {
                "note" => state.parse_note(&mut tokens, diagnostics)?,
                "backup" => state.parse_backup(&mut tokens)?,
                "measure" => state.begin_measure()?,
                "divisions" => {
                    let divisions: u32 = read_value(&mut tokens, "divisions")?;
                    if divisions == 0 {
                        return Err(ScoreError::MalformedMarkup(
                            "divisions must be positive".into(),
                        ));
                    }
                    state.score.divisions = divisions;
                }
                "per-minute" => {
                    let tempo: f64 = read_value(&mut tokens, "per-minute")?;
                    if !(tempo > 0.0 && tempo.is_finite()) {
                        return Err(ScoreError::MalformedMarkup(format!(
                            "invalid tempo {}",
                            tempo
                        )));
                    }
                    state.score.tempo_bpm = tempo;
                }
                _ => {}
            },
            Token::EndElement(name) if name == "part" => state.end_part()?,
            Token::EndOfDocument => break,
            _ => {}
        }
    }

    Ok(state.score)
}

/// Pull the next token while inside `element`; running out is malformed.
fn next_token<I>(tokens: &mut I, element: &str) -> Result<Token, ScoreError>
where
    I: Iterator<Item = Result<Token, ScoreError>>,
{
    match tokens.next() {
        Some(Ok(Token::EndOfDocument)) | None => Err(ScoreError::MalformedMarkup(format!(
            "document ended inside <{}>",
            element
        ))),
        Some(token) => token,
    }
}

/// Collect the text of a leaf element up to its closing tag.
fn read_text<I>(tokens: &mut I, element: &str) -> Result<String, ScoreError>
where
    I: Iterator<Item = Result<Token, ScoreError>>,
{
    let mut text = String::new();
    loop {
        match next_token(tokens, element)? {
            Token::Text(t) => text.push_str(&t),
            Token::EndElement(name) if name == element => return Ok(text.trim().to_string()),
            Token::StartElement(name) => {
                return Err(ScoreError::MalformedMarkup(format!(
                    "unexpected <{}> inside <{}>",
                    name, element
                )));
            }
            _ => {}
        }
    }
}

fn read_value<I, T>(tokens: &mut I, element: &str) -> Result<T, ScoreError>
where
    I: Iterator<Item = Result<Token, ScoreError>>,
    T: std::str::FromStr,
{
    let text = read_text(tokens, element)?;
    text.parse().map_err(|_| {
        ScoreError::MalformedMarkup(format!("invalid <{}> value '{}'", element, text))
    })
}

/// Read a `<pitch>` element into a frequency
fn parse_pitch<I>(tokens: &mut I) -> Result<f64, ScoreError>
where
    I: Iterator<Item = Result<Token, ScoreError>>,
{
    let mut step = None;
    let mut alter = 0;
    let mut octave = 0;

    loop {
        match next_token(tokens, "pitch")? {
            Token::StartElement(name) => match name.as_str() {
                "step" => step = Some(Step::from_letter(&read_text(tokens, "step")?)?),
                // Microtonal alters such as "-0.5" snap to the nearest semitone
                "alter" => alter = read_value::<_, f64>(tokens, "alter")?.round() as i32,
                "octave" => octave = read_value(tokens, "octave")?,
                _ => {}
            },
            Token::EndElement(name) if name == "pitch" => break,
            _ => {}
        }
    }

    let step = step.ok_or_else(|| ScoreError::InvalidStep(String::new()))?;
    Ok(note::frequency(step, alter, octave))
}

impl ParserState {
    fn parse_note<I>(
        &mut self,
        tokens: &mut I,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), ScoreError>
    where
        I: Iterator<Item = Result<Token, ScoreError>>,
    {
        // The rewound span has been replayed; resume the voice that issued it
        if let Some(frame) = self.backups.last() {
            if frame.remaining == 0 {
                self.current_part = frame.return_part;
                self.backups.pop();
                log::debug!("backup consumed, back to part {}", self.current_part);
            }
        }

        let mut frequency = 0.0;
        let mut raw_duration: Option<u32> = None;
        let mut is_chord = false;

        loop {
            match next_token(tokens, "note")? {
                Token::StartElement(name) => match name.as_str() {
                    "pitch" => frequency = parse_pitch(tokens)?,
                    "duration" => raw_duration = Some(read_value(tokens, "duration")?),
                    "chord" => is_chord = true,
                    "note" => {
                        return Err(ScoreError::MalformedMarkup("<note> inside <note>".into()));
                    }
                    _ => {}
                },
                Token::EndElement(name) if name == "note" => break,
                _ => {}
            }
        }

        let ticks = raw_duration.unwrap_or(0);
        let length = ticks as f64 / self.score.divisions as f64;
        let part_index = self.current_part;
        let (measure_index, measure) = self.target_measure();

        if is_chord {
            let Some(first) = measure.notes.last_mut() else {
                return Err(ScoreError::OrphanChord { part: part_index });
            };
            first.frequencies.push(frequency);
            if raw_duration.is_some() && first.length.round() != length.round() {
                let kept = first.length;
                diagnostics.report(Diagnostic::ChordLengthMismatch {
                    part: part_index,
                    measure: measure_index,
                    kept,
                    discarded: length,
                });
            }
            return Ok(());
        }

        measure.notes.push(Note::new(frequency, length));
        measure.xml_duration_sum += ticks;

        if let Some(frame) = self.backups.last_mut() {
            if ticks > frame.remaining {
                return Err(ScoreError::BackupUnderflow {
                    remaining: frame.remaining,
                    duration: ticks,
                });
            }
            frame.remaining -= ticks;
        }

        Ok(())
    }

    fn parse_backup<I>(&mut self, tokens: &mut I) -> Result<(), ScoreError>
    where
        I: Iterator<Item = Result<Token, ScoreError>>,
    {
        let mut duration = 0u32;

        loop {
            match next_token(tokens, "backup")? {
                Token::StartElement(name) if name == "duration" => {
                    duration = read_value(tokens, "duration")?;
                }
                Token::EndElement(name) if name == "backup" => break,
                _ => {}
            }
        }

        if duration == 0 {
            return Err(ScoreError::MalformedBackup("zero duration".into()));
        }
        if self.backups.len() >= MAX_BACKUP_DEPTH {
            return Err(ScoreError::MalformedBackup(format!(
                "more than {} nested backups",
                MAX_BACKUP_DEPTH
            )));
        }

        self.backups.push(BackupFrame {
            remaining: duration,
            return_part: self.current_part,
        });
        self.current_part += 1;
        log::debug!(
            "backup of {} ticks, writing voice into part {}",
            duration,
            self.current_part
        );
        Ok(())
    }

    fn begin_measure(&mut self) -> Result<(), ScoreError> {
        self.drain_backups("measure")?;
        self.measures_in_part += 1;
        for part in self.score.parts.iter_mut().skip(self.current_part) {
            part.measures.push(Measure::default());
        }
        Ok(())
    }

    fn end_part(&mut self) -> Result<(), ScoreError> {
        self.drain_backups("end of part")?;
        // Voices allocated by this part sit past it; skip over them
        self.current_part = (self.current_part + 1).max(self.score.parts.len());
        self.measures_in_part = 0;
        Ok(())
    }

    /// Every open backup must be fully consumed at a boundary
    fn drain_backups(&mut self, boundary: &'static str) -> Result<(), ScoreError> {
        while let Some(frame) = self.backups.pop() {
            if frame.remaining != 0 {
                return Err(ScoreError::UnconsumedBackup {
                    boundary,
                    remaining: frame.remaining,
                });
            }
            self.current_part = frame.return_part;
        }
        Ok(())
    }

    /// Last measure of the current part, materializing the part if needed.
    /// A part first written after some measures have passed (a late voice, or
    /// a declared part whose opening measures hold no notes) is padded so its
    /// measures line up with the others.
    fn target_measure(&mut self) -> (usize, &mut Measure) {
        let fill = self.measures_in_part.max(1);

        let parts = &mut self.score.parts;
        while parts.len() <= self.current_part {
            parts.push(Part::default());
        }
        let part = &mut parts[self.current_part];
        if part.measures.is_empty() {
            part.measures.resize_with(fill, Measure::default);
        }
        let measure_index = part.measures.len() - 1;
        (measure_index, &mut part.measures[measure_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::XmlTokens;

    fn parse(src: &str) -> Result<Score, ScoreError> {
        parse_with(src, &mut Diagnostics::new())
    }

    fn parse_with(src: &str, diagnostics: &mut Diagnostics) -> Result<Score, ScoreError> {
        build_score(XmlTokens::new(src.as_bytes()), diagnostics)
    }

    fn pitched(step: &str, octave: i32, duration: u32) -> String {
        format!(
            "<note><pitch><step>{}</step><octave>{}</octave></pitch><duration>{}</duration></note>",
            step, octave, duration
        )
    }

    fn chord(step: &str, octave: i32) -> String {
        format!(
            "<note><chord/><pitch><step>{}</step><octave>{}</octave></pitch></note>",
            step, octave
        )
    }

    fn backup(duration: u32) -> String {
        format!("<backup><duration>{}</duration></backup>", duration)
    }

    /// Single-part score at divisions=4, one string per measure
    fn single_part(measures: &[String]) -> String {
        let body: String = measures
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let attributes = if i == 0 {
                    "<attributes><divisions>4</divisions></attributes>"
                } else {
                    ""
                };
                format!("<measure number=\"{}\">{}{}</measure>", i + 1, attributes, m)
            })
            .collect();
        format!(
            "<?xml version=\"1.0\"?><score-partwise><part-list/><part id=\"P1\">{}</part></score-partwise>",
            body
        )
    }

    fn hz(step: Step, octave: i32) -> Vec<f64> {
        vec![note::frequency(step, 0, octave)]
    }

    #[test]
    fn test_two_sequential_notes() {
        let src = single_part(&[pitched("C", 4, 4) + &pitched("D", 4, 4)]);
        let score = parse(&src).unwrap();
        assert_eq!(score.parts.len(), 1);
        assert_eq!(score.parts[0].measures.len(), 1);
        let measure = &score.parts[0].measures[0];
        assert_eq!(measure.notes.len(), 2);
        assert_eq!(measure.notes[0].length, 1.0);
        assert_eq!(measure.notes[1].length, 1.0);
        assert_eq!(measure.notes[0].frequencies, hz(Step::C, 4));
        assert_eq!(measure.xml_duration_sum, 8);
    }

    #[test]
    fn test_chord_joins_previous_note() {
        let src = single_part(&[pitched("C", 4, 4) + &chord("E", 4)]);
        let score = parse(&src).unwrap();
        let notes = &score.parts[0].measures[0].notes;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].chord_width(), 2);
        assert_eq!(notes[0].length, 1.0);
        assert_eq!(score.parts[0].measures[0].xml_duration_sum, 4);
    }

    #[test]
    fn test_orphan_chord_fails() {
        let src = single_part(&[chord("E", 4)]);
        assert!(matches!(parse(&src), Err(ScoreError::OrphanChord { part: 0 })));
    }

    #[test]
    fn test_chord_length_mismatch_is_reported() {
        let long_member =
            "<note><chord/><pitch><step>G</step><octave>4</octave></pitch><duration>8</duration></note>";
        let src = single_part(&[pitched("C", 4, 4) + long_member]);
        let mut diagnostics = Diagnostics::new();
        let score = parse_with(&src, &mut diagnostics).unwrap();
        assert_eq!(score.parts[0].measures[0].notes[0].length, 1.0);
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics.iter().next(),
            Some(Diagnostic::ChordLengthMismatch { kept, discarded, .. })
                if *kept == 1.0 && *discarded == 2.0
        ));
    }

    #[test]
    fn test_consumed_backup_creates_voice_part() {
        let src = single_part(&[
            format!("{}{}{}", pitched("C", 4, 4), backup(4), pitched("E", 3, 4)),
            pitched("D", 4, 4),
        ]);
        let score = parse(&src).unwrap();
        assert_eq!(score.parts.len(), 2);
        assert_eq!(score.parts[0].measures.len(), 2);
        assert_eq!(score.parts[1].measures.len(), 2);
        assert_eq!(score.parts[1].measures[0].notes.len(), 1);
        assert_eq!(score.parts[1].measures[0].notes[0].frequencies, hz(Step::E, 3));
        assert_eq!(score.parts[0].measures[1].notes[0].frequencies, hz(Step::D, 4));
        assert!(score.parts[1].measures[1].notes.is_empty());
    }

    #[test]
    fn test_note_after_consumed_backup_returns_to_voice() {
        let src = single_part(&[format!(
            "{}{}{}{}",
            pitched("C", 4, 4),
            backup(4),
            pitched("E", 3, 4),
            pitched("G", 4, 4)
        )]);
        let score = parse(&src).unwrap();
        assert_eq!(score.parts[0].measures[0].notes.len(), 2);
        assert_eq!(score.parts[1].measures[0].notes.len(), 1);
    }

    #[test]
    fn test_unconsumed_backup_fails_at_measure() {
        let src = single_part(&[
            format!("{}{}{}", pitched("C", 4, 4), backup(4), pitched("E", 3, 3)),
            pitched("D", 4, 4),
        ]);
        assert!(matches!(
            parse(&src),
            Err(ScoreError::UnconsumedBackup { remaining: 1, boundary: "measure" })
        ));
    }

    #[test]
    fn test_unconsumed_backup_fails_at_part_end() {
        let src = single_part(&[format!("{}{}", pitched("C", 4, 4), backup(4))]);
        assert!(matches!(
            parse(&src),
            Err(ScoreError::UnconsumedBackup { remaining: 4, boundary: "end of part" })
        ));
    }

    #[test]
    fn test_backup_underflow() {
        let src = single_part(&[format!(
            "{}{}{}",
            pitched("C", 4, 8),
            backup(4),
            pitched("E", 3, 8)
        )]);
        assert!(matches!(
            parse(&src),
            Err(ScoreError::BackupUnderflow { remaining: 4, duration: 8 })
        ));
    }

    #[test]
    fn test_zero_backup_is_malformed() {
        let src = single_part(&[format!("{}{}", pitched("C", 4, 4), backup(0))]);
        assert!(matches!(parse(&src), Err(ScoreError::MalformedBackup(_))));
    }

    #[test]
    fn test_backup_depth_is_bounded() {
        let mut body = pitched("C", 4, 4);
        for _ in 0..=MAX_BACKUP_DEPTH {
            body += &backup(4);
        }
        let src = single_part(&[body]);
        assert!(matches!(parse(&src), Err(ScoreError::MalformedBackup(_))));
    }

    #[test]
    fn test_invalid_step() {
        let src = single_part(&[pitched("H", 4, 4)]);
        assert!(matches!(parse(&src), Err(ScoreError::InvalidStep(s)) if s == "H"));
    }

    #[test]
    fn test_alter_shifts_pitch() {
        let src = single_part(&[
            "<note><pitch><step>F</step><alter>1</alter><octave>4</octave></pitch><duration>4</duration></note>"
                .to_string(),
        ]);
        let score = parse(&src).unwrap();
        assert_eq!(
            score.parts[0].measures[0].notes[0].frequencies,
            vec![note::frequency(Step::F, 1, 4)]
        );
    }

    #[test]
    fn test_rest_is_zero_frequency() {
        let src = single_part(&["<note><rest/><duration>8</duration></note>".to_string()]);
        let score = parse(&src).unwrap();
        let rest = &score.parts[0].measures[0].notes[0];
        assert_eq!(rest.frequencies, vec![0.0]);
        assert_eq!(rest.length, 2.0);
    }

    #[test]
    fn test_tempo_and_divisions() {
        let src = "<part><measure><divisions>8</divisions>\
                   <direction><metronome><beat-unit>quarter</beat-unit><per-minute>90</per-minute></metronome></direction>\
                   <note><pitch><step>A</step><octave>4</octave></pitch><duration>4</duration></note>\
                   </measure></part>";
        let score = parse(src).unwrap();
        assert_eq!(score.divisions, 8);
        assert_eq!(score.tempo_bpm, 90.0);
        assert_eq!(score.parts[0].measures[0].notes[0].length, 0.5);
    }

    #[test]
    fn test_zero_divisions_is_malformed() {
        let src = "<part><measure><divisions>0</divisions></measure></part>";
        assert!(matches!(parse(src), Err(ScoreError::MalformedMarkup(_))));
    }

    #[test]
    fn test_document_ending_inside_note_is_malformed() {
        let tokens = vec![
            Ok(Token::StartElement("note".into())),
            Ok(Token::StartElement("duration".into())),
            Ok(Token::Text("4".into())),
            Ok(Token::EndElement("duration".into())),
            Ok(Token::EndOfDocument),
        ];
        let result = build_score(tokens, &mut Diagnostics::new());
        assert!(matches!(result, Err(ScoreError::MalformedMarkup(_))));
    }

    #[test]
    fn test_second_part_follows_voices_of_first() {
        let src = format!(
            "<score-partwise>\
             <part id=\"P1\"><measure><divisions>4</divisions>{}{}{}</measure><measure>{}</measure></part>\
             <part id=\"P2\"><measure>{}</measure><measure>{}</measure></part>\
             </score-partwise>",
            pitched("C", 4, 4),
            backup(4),
            pitched("E", 3, 4),
            pitched("D", 4, 4),
            pitched("G", 2, 4),
            pitched("A", 2, 4)
        );
        let score = parse(&src).unwrap();
        assert_eq!(score.parts.len(), 3);
        for part in &score.parts {
            assert_eq!(part.measures.len(), 2);
        }
        assert_eq!(score.parts[2].measures[0].notes[0].frequencies, hz(Step::G, 2));
        assert_eq!(score.parts[2].measures[1].notes[0].frequencies, hz(Step::A, 2));
    }

    #[test]
    fn test_late_voice_is_padded_to_measure() {
        let src = single_part(&[
            pitched("C", 4, 4),
            format!("{}{}{}", pitched("D", 4, 4), backup(4), pitched("F", 3, 4)),
        ]);
        let score = parse(&src).unwrap();
        assert_eq!(score.parts[1].measures.len(), 2);
        assert!(score.parts[1].measures[0].notes.is_empty());
        assert_eq!(score.parts[1].measures[1].notes[0].frequencies, hz(Step::F, 3));
    }

    #[test]
    fn test_declared_part_with_empty_opening_measures_is_aligned() {
        let src = format!(
            "<score-partwise>\
             <part id=\"P1\"><measure><divisions>4</divisions>{}</measure>\
             <measure>{}</measure><measure>{}</measure></part>\
             <part id=\"P2\"><measure/><measure>{}</measure><measure>{}</measure></part>\
             </score-partwise>",
            pitched("C", 4, 4),
            pitched("D", 4, 4),
            pitched("E", 4, 4),
            pitched("G", 2, 4),
            pitched("A", 2, 4)
        );
        let score = parse(&src).unwrap();
        assert_eq!(score.parts.len(), 2);
        assert_eq!(score.parts[0].measures.len(), 3);
        assert_eq!(score.parts[1].measures.len(), 3);
        assert!(score.parts[1].measures[0].notes.is_empty());
        assert_eq!(score.parts[1].measures[1].notes[0].frequencies, hz(Step::G, 2));
        assert_eq!(score.parts[1].measures[2].notes[0].frequencies, hz(Step::A, 2));
    }

    #[test]
    fn test_unrecognized_elements_are_transparent() {
        let src = single_part(&[
            "<print/><barline><bar-style>light</bar-style></barline>".to_string()
                + &pitched("C", 4, 4),
        ]);
        let score = parse(&src).unwrap();
        assert_eq!(score.parts[0].measures[0].notes.len(), 1);
    }
}
