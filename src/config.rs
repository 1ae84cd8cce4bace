//! Jingle settings loaded from a `.jingle` file and/or command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, SelectError};
use crate::window::{Channel, Window};

/// Per-channel selection; `None` keeps the window default
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSettings {
    pub part: Option<usize>,
    pub octave: Option<f64>,
    pub chord: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JingleSettings {
    pub right: ChannelSettings,
    pub left: ChannelSettings,
    pub measure_start: Option<usize>,
    /// Exclusive
    pub measure_end: Option<usize>,
    pub jingle: u32,
    pub port: Option<PathBuf>,
    pub timeout: Duration,
    /// Device storage available to the jingle, in bytes
    pub capacity: usize,
}

impl Default for JingleSettings {
    fn default() -> Self {
        Self {
            right: ChannelSettings::default(),
            left: ChannelSettings::default(),
            measure_start: None,
            measure_end: None,
            jingle: 0,
            port: None,
            timeout: Duration::from_millis(2000),
            capacity: 4096,
        }
    }
}

fn parse_kv(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once(':')?;
    Some((key.trim(), value.trim()))
}

/// Load settings from a `.jingle` file.
///
/// Format (one per line, optional comments with #):
/// ```text
/// # melody on the right pad, bass an octave up on the left
/// right_part: 0
/// left_part: 1
/// left_octave: 2.0
/// measure_start: 0
/// measure_end: 8
/// jingle: 0
/// port: /dev/ttyACM0
/// ```
pub fn load(path: &Path) -> Result<JingleSettings, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<JingleSettings, ConfigError> {
    let mut settings = JingleSettings::default();

    for (line_idx, line) in content.lines().enumerate() {
        let line_num = line_idx + 1;
        let Some((key, value)) = parse_kv(line) else {
            continue;
        };
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            line: line_num,
        };
        match key {
            "right_part" => settings.right.part = Some(value.parse().map_err(|_| invalid())?),
            "left_part" => settings.left.part = Some(value.parse().map_err(|_| invalid())?),
            "right_octave" => settings.right.octave = Some(value.parse().map_err(|_| invalid())?),
            "left_octave" => settings.left.octave = Some(value.parse().map_err(|_| invalid())?),
            "right_chord" => settings.right.chord = Some(value.parse().map_err(|_| invalid())?),
            "left_chord" => settings.left.chord = Some(value.parse().map_err(|_| invalid())?),
            "measure_start" => settings.measure_start = Some(value.parse().map_err(|_| invalid())?),
            "measure_end" => settings.measure_end = Some(value.parse().map_err(|_| invalid())?),
            "jingle" => settings.jingle = value.parse().map_err(|_| invalid())?,
            "port" => {
                if value.is_empty() {
                    return Err(invalid());
                }
                settings.port = Some(PathBuf::from(value));
            }
            "timeout_ms" => {
                settings.timeout = Duration::from_millis(value.parse().map_err(|_| invalid())?)
            }
            "capacity" => settings.capacity = value.parse().map_err(|_| invalid())?,
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                    line: line_num,
                });
            }
        }
    }

    Ok(settings)
}

impl JingleSettings {
    pub fn channel(&self, channel: Channel) -> &ChannelSettings {
        match channel {
            Channel::Right => &self.right,
            Channel::Left => &self.left,
        }
    }

    /// Push these settings through the window's validating setters.
    /// Parts and range go first since chord bounds depend on them.
    pub fn apply(&self, window: &mut Window<'_>) -> Result<(), SelectError> {
        for channel in Channel::ALL {
            if let Some(part) = self.channel(channel).part {
                window.set_part_index(channel, part)?;
            }
        }

        let start = self.measure_start.unwrap_or(0);
        let end = self.measure_end.unwrap_or_else(|| window.total_measures());
        window.set_measure_range(start, end)?;

        for channel in Channel::ALL {
            let settings = self.channel(channel);
            if let Some(octave) = settings.octave {
                window.set_octave_adjust(channel, octave)?;
            }
            if let Some(chord) = settings.chord {
                window.set_chord_index(channel, chord)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::{Measure, Note, Part, Score};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_parse_all_keys() {
        let input = "\
# two-pad jingle
right_part: 0
left_part: 1
right_octave: 0.5
left_octave: 2
right_chord: 1
left_chord: 0
measure_start: 2
measure_end: 6

jingle: 3
port: /dev/ttyACM0
timeout_ms: 750
capacity: 1024";
        let settings = parse(input).unwrap();
        assert_eq!(settings.right.part, Some(0));
        assert_eq!(settings.left.part, Some(1));
        assert_eq!(settings.right.octave, Some(0.5));
        assert_eq!(settings.left.octave, Some(2.0));
        assert_eq!(settings.right.chord, Some(1));
        assert_eq!(settings.measure_start, Some(2));
        assert_eq!(settings.measure_end, Some(6));
        assert_eq!(settings.jingle, 3);
        assert_eq!(settings.port, Some(PathBuf::from("/dev/ttyACM0")));
        assert_eq!(settings.timeout, Duration::from_millis(750));
        assert_eq!(settings.capacity, 1024);
    }

    #[test]
    fn test_defaults() {
        let settings = parse("# nothing set\n").unwrap();
        assert_eq!(settings, JingleSettings::default());
    }

    #[test]
    fn test_unknown_key_reports_line() {
        let err = parse("jingle: 1\nvolume: 3").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { key, line: 2 } if key == "volume"));
    }

    #[test]
    fn test_invalid_value_reports_line() {
        let err = parse("right_part: first").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key, value, line: 1 }
                if key == "right_part" && value == "first"
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("theme.jingle");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "left_part: 1").unwrap();
        writeln!(file, "measure_end: 4").unwrap();

        let settings = load(&path).unwrap();
        assert_eq!(settings.left.part, Some(1));
        assert_eq!(settings.measure_end, Some(4));

        let missing = load(&dir.path().join("missing.jingle")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn test_apply_validates_against_score() {
        let part = Part {
            measures: vec![
                Measure {
                    notes: vec![Note {
                        frequencies: vec![262.0, 330.0],
                        length: 1.0,
                    }],
                    xml_duration_sum: 1,
                };
                4
            ],
        };
        let score = Score {
            parts: vec![part.clone(), part],
            divisions: 1,
            tempo_bpm: 100.0,
        };

        let mut window = Window::new(&score);
        let settings =
            parse("left_part: 1\nleft_chord: 1\nmeasure_start: 1\nleft_octave: 2").unwrap();
        settings.apply(&mut window).unwrap();
        assert_eq!(window.measure_range(), 1..4);
        assert_eq!(window.channel(Channel::Left).part_index, 1);
        assert_eq!(window.channel(Channel::Left).chord_index, 1);
        assert_eq!(window.channel(Channel::Left).octave_adjust, 2.0);

        let bad = parse("measure_end: 9").unwrap();
        assert!(matches!(
            bad.apply(&mut window),
            Err(SelectError::BadMeasureRange { end: 9, total: 4, .. })
        ));
    }
}
