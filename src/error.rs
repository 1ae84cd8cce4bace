use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning a token stream into a `Score`.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("cannot read {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed markup: {0}")]
    MalformedMarkup(String),

    #[error("malformed backup: {0}")]
    MalformedBackup(String),

    #[error("{boundary} reached with {remaining} ticks of backup still unconsumed")]
    UnconsumedBackup {
        boundary: &'static str,
        remaining: u32,
    },

    #[error("note duration {duration} exceeds remaining backup duration {remaining}")]
    BackupUnderflow { remaining: u32, duration: u32 },

    #[error("chord note in part {part} has no preceding note in its measure")]
    OrphanChord { part: usize },

    #[error("invalid pitch step '{0}'")]
    InvalidStep(String),
}

/// Errors raised by the window selector when a configuration does not fit the score.
#[derive(Debug, Error, PartialEq)]
pub enum SelectError {
    #[error("{what} index {index} out of range (limit {limit})")]
    BadIndex {
        what: &'static str,
        index: usize,
        limit: usize,
    },

    #[error("part index {part} out of range ({parts} parts)")]
    BadPartIndex { part: usize, parts: usize },

    #[error("measure range {start}..{end} out of range ({total} measures)")]
    BadMeasureRange {
        start: usize,
        end: usize,
        total: usize,
    },

    #[error("octave adjust must be a positive number, got {0}")]
    BadOctaveAdjust(f64),

    #[error("jingle needs {required} bytes but the device holds {capacity}")]
    CapacityExceeded { required: usize, capacity: usize },
}

/// Failures of the serial link underneath the protocol.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serial I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("timed out waiting for {expected:?}, received {received:?}")]
    Timeout { expected: String, received: String },

    #[error("unexpected response: expected {expected:?}, received {received:?}")]
    Mismatch { expected: String, received: String },

    #[error("device closed the connection")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("command {command:?} failed: {source}")]
    Protocol {
        command: String,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Selection(#[from] SelectError),
}

#[derive(Debug, Error, PartialEq)]
#[error("cannot parse command {line:?}: {reason}")]
pub struct CommandParseError {
    pub line: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown key '{key}' at line {line}")]
    UnknownKey { key: String, line: usize },

    #[error("invalid value '{value}' for '{key}' at line {line}")]
    InvalidValue {
        key: String,
        value: String,
        line: usize,
    },
}
