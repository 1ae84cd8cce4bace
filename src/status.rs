use std::io::{self, IsTerminal, Write};

use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};

/// A single terminal line rewritten in place for progress output.
/// Does nothing when stdout is not a terminal.
pub struct StatusLine {
    stdout: io::Stdout,
    enabled: bool,
    dirty: bool,
}

impl StatusLine {
    pub fn new() -> Self {
        let stdout = io::stdout();
        let enabled = stdout.is_terminal();
        Self {
            stdout,
            enabled,
            dirty: false,
        }
    }

    pub fn update(&mut self, text: &str) {
        if !self.enabled {
            return;
        }
        let _ = queue!(self.stdout, MoveToColumn(0), Clear(ClearType::CurrentLine));
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.flush();
        self.dirty = true;
    }

    /// Leave the last status on screen and move to a fresh line
    pub fn finish(&mut self) {
        if self.dirty {
            let _ = writeln!(self.stdout);
            self.dirty = false;
        }
    }
}

impl Drop for StatusLine {
    fn drop(&mut self) {
        self.finish();
    }
}
