//! Audition an encoded jingle through the default audio output.
//!
//! Plays exactly what the device would receive: each channel's program-note
//! commands rendered as a square wave at the commanded duty cycle, right
//! channel on the right speaker.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use crate::protocol::{Command, NoteCommand};
use crate::status::StatusLine;
use crate::window::Channel;

const VOLUME: f32 = 0.15;

/// One channel's note list, stepped sample by sample
struct Voice {
    notes: Vec<NoteCommand>,
    current: usize,
    samples_left: usize,
    phase: f64,
}

impl Voice {
    fn new(commands: &[Command], channel: Channel) -> Self {
        let notes = commands
            .iter()
            .filter_map(|c| match c {
                Command::Note(n) if n.channel == channel => Some(*n),
                _ => None,
            })
            .collect();
        Self {
            notes,
            current: 0,
            samples_left: 0,
            phase: 0.0,
        }
    }

    fn samples_for(note: &NoteCommand, sample_rate: f64) -> usize {
        (note.duration_ms as f64 * sample_rate / 1000.0) as usize
    }

    /// Next output sample, or `None` once every note has played
    fn next_sample(&mut self, sample_rate: f64) -> Option<f32> {
        while self.samples_left == 0 {
            let note = self.notes.get(self.current)?;
            self.samples_left = Self::samples_for(note, sample_rate);
            self.phase = 0.0;
            if self.samples_left == 0 {
                self.current += 1;
            }
        }

        let note = &self.notes[self.current];
        self.samples_left -= 1;
        if self.samples_left == 0 {
            self.current += 1;
        }

        if note.frequency == 0 {
            return Some(0.0);
        }
        let duty = note.duty_cycle as f64 / 256.0;
        let value = if self.phase < duty { VOLUME } else { -VOLUME };
        self.phase = (self.phase + note.frequency as f64 / sample_rate).fract();
        Some(value)
    }

    fn total_ms(&self) -> u64 {
        self.notes.iter().map(|n| n.duration_ms as u64).sum()
    }
}

/// Play the note commands and block until they finish
pub fn play(commands: &[Command]) -> Result<(), String> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("no output audio device available")?;

    let config = device
        .default_output_config()
        .map_err(|e| format!("failed to get default output config: {}", e))?;

    let sample_rate = config.sample_rate() as f64;
    let channels = config.channels() as usize;

    let mut right = Voice::new(commands, Channel::Right);
    let mut left = Voice::new(commands, Channel::Left);
    let total_notes = right.notes.len();
    let total_ms = right.total_ms().max(left.total_ms());

    // Index of the right-channel note being played, for the status line
    let position = Arc::new(AtomicUsize::new(0));
    let callback_position = Arc::clone(&position);
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let mut finished = false;

    let stream = device
        .build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let r = right.next_sample(sample_rate);
                    let l = left.next_sample(sample_rate);
                    if r.is_none() && l.is_none() && !finished {
                        finished = true;
                        let _ = done_tx.send(());
                    }
                    let (r, l) = (r.unwrap_or(0.0), l.unwrap_or(0.0));
                    match frame.len() {
                        1 => frame[0] = (r + l) * 0.5,
                        _ => {
                            frame[0] = l;
                            frame[1] = r;
                            for extra in frame.iter_mut().skip(2) {
                                *extra = 0.0;
                            }
                        }
                    }
                }
                callback_position.store(right.current, Ordering::Relaxed);
            },
            move |err| {
                log::error!("audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| format!("failed to build output stream: {}", e))?;

    stream
        .play()
        .map_err(|e| format!("failed to play stream: {}", e))?;

    let mut status = StatusLine::new();
    let deadline = std::time::Instant::now() + Duration::from_millis(total_ms + 1000);
    loop {
        match done_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if std::time::Instant::now() > deadline {
                    log::warn!("preview did not finish in time, stopping");
                    break;
                }
            }
        }
        let note = position.load(Ordering::Relaxed).min(total_notes);
        status.update(&format!("  note {}/{}", note, total_notes));
    }
    status.update(&format!("  note {}/{}", total_notes, total_notes));
    status.finish();

    // Brief silence at the end so the last note rings out
    std::thread::sleep(Duration::from_millis(100));
    drop(stream);
    Ok(())
}
