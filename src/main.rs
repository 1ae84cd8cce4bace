mod config;
mod diagnostics;
mod error;
mod note;
mod parser;
mod preview;
mod protocol;
mod status;
mod token;
mod transport;
mod upload;
mod window;

use clap::{Args, Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};

use config::JingleSettings;
use diagnostics::Diagnostics;
use note::Score;
use status::StatusLine;
use transport::{DryRunTransport, SerialTransport};
use window::{Channel, Window};

#[derive(Parser)]
#[command(name = "scjingle", about = "Convert MusicXML scores into controller jingles")]
#[command(version)]
struct Cli {
    /// Log protocol traffic and parser decisions
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a MusicXML file and display its parts, measures and notes
    Parse {
        /// Path to an uncompressed MusicXML file
        file: PathBuf,
    },

    /// Show measure count, chord widths and storage use for a selection
    Info {
        file: PathBuf,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Program the selection into the controller as a jingle
    Upload {
        file: PathBuf,

        #[command(flatten)]
        window: WindowArgs,

        /// Serial device of the controller, e.g. /dev/ttyACM0
        #[arg(long)]
        port: Option<PathBuf>,

        /// Jingle slot to write
        #[arg(long)]
        jingle: Option<u32>,

        /// Milliseconds to wait for each acknowledgement
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Storage available for the jingle, in bytes
        #[arg(long)]
        capacity: Option<usize>,

        /// Print the commands instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Play the selection through speakers as the controller would
    Preview {
        file: PathBuf,

        #[command(flatten)]
        window: WindowArgs,
    },
}

/// Channel and measure selection, layered over an optional settings file
#[derive(Args)]
struct WindowArgs {
    /// Settings file with `key: value` lines
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    right_part: Option<usize>,
    #[arg(long)]
    left_part: Option<usize>,

    /// First measure (0-based)
    #[arg(long)]
    start: Option<usize>,
    /// Measure after the last one included
    #[arg(long)]
    end: Option<usize>,

    /// Frequency multiplier for the right channel (2.0 = octave up)
    #[arg(long)]
    right_octave: Option<f64>,
    #[arg(long)]
    left_octave: Option<f64>,

    /// Chord member played on the right channel
    #[arg(long)]
    right_chord: Option<usize>,
    #[arg(long)]
    left_chord: Option<usize>,
}

impl WindowArgs {
    fn settings(&self) -> JingleSettings {
        let mut settings = match &self.config {
            Some(path) => config::load(path).unwrap_or_else(|e| fail("Config error", e)),
            None => JingleSettings::default(),
        };
        let overrides = [
            (&mut settings.right, self.right_part, self.right_octave, self.right_chord),
            (&mut settings.left, self.left_part, self.left_octave, self.left_chord),
        ];
        for (channel, part, octave, chord) in overrides {
            channel.part = part.or(channel.part);
            channel.octave = octave.or(channel.octave);
            channel.chord = chord.or(channel.chord);
        }
        settings.measure_start = self.start.or(settings.measure_start);
        settings.measure_end = self.end.or(settings.measure_end);
        settings
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Parse { file } => {
            let score = load_score(&file);
            print_score(&score);
        }
        Command::Info { file, window } => {
            let score = load_score(&file);
            let settings = window.settings();
            let window = select(&score, &settings);
            print_info(&window, &settings);
        }
        Command::Upload {
            file,
            window,
            port,
            jingle,
            timeout_ms,
            capacity,
            dry_run,
        } => {
            let score = load_score(&file);
            let mut settings = window.settings();
            settings.port = port.or(settings.port);
            settings.jingle = jingle.unwrap_or(settings.jingle);
            if let Some(ms) = timeout_ms {
                settings.timeout = std::time::Duration::from_millis(ms);
            }
            settings.capacity = capacity.unwrap_or(settings.capacity);
            let window = select(&score, &settings);
            run_upload(&window, &settings, dry_run);
        }
        Command::Preview { file, window } => {
            let score = load_score(&file);
            let settings = window.settings();
            let window = select(&score, &settings);
            let mut diagnostics = Diagnostics::new();
            let commands = protocol::encode_jingle(&window, settings.jingle, &mut diagnostics)
                .unwrap_or_else(|e| fail("Selection error", e));
            println!(
                "Previewing {} notes at {} BPM",
                commands.len() / 2,
                score.tempo_bpm
            );
            report_warnings(&diagnostics);
            if let Err(e) = preview::play(&commands) {
                eprintln!("Playback error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn fail(context: &str, error: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context, error);
    std::process::exit(1);
}

fn load_score(path: &Path) -> Score {
    let mut diagnostics = Diagnostics::new();
    let result = token::open(path).and_then(|tokens| parser::build_score(tokens, &mut diagnostics));
    let score = result.unwrap_or_else(|e| fail("Parse error", e));
    report_warnings(&diagnostics);
    score
}

fn report_warnings(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        eprintln!("warning: {}", diagnostic);
    }
}

fn select<'a>(score: &'a Score, settings: &JingleSettings) -> Window<'a> {
    let mut window = Window::new(score);
    settings
        .apply(&mut window)
        .unwrap_or_else(|e| fail("Selection error", e));
    window
}

fn run_upload(window: &Window<'_>, settings: &JingleSettings, dry_run: bool) {
    let mut diagnostics = Diagnostics::new();
    let mut status = StatusLine::new();

    let result = if dry_run {
        let mut transport = DryRunTransport::new(io::stdout());
        upload::upload_jingle(
            window,
            settings.jingle,
            settings.capacity,
            &mut transport,
            &mut diagnostics,
            |_, _| {},
        )
    } else {
        let port = settings
            .port
            .as_deref()
            .unwrap_or_else(|| fail("Upload error", "no serial port given (--port or `port:`)"));
        let mut transport = SerialTransport::open(port, settings.timeout)
            .unwrap_or_else(|e| fail("Serial error", e));
        upload::upload_jingle(
            window,
            settings.jingle,
            settings.capacity,
            &mut transport,
            &mut diagnostics,
            |sent, total| status.update(&format!("  sent {}/{} commands", sent, total)),
        )
    };
    status.finish();
    report_warnings(&diagnostics);

    match result {
        Ok(sent) => println!(
            "Jingle {} written: {} commands, {} warning(s)",
            settings.jingle,
            sent,
            diagnostics.len()
        ),
        Err(e) => fail("Upload failed", e),
    }
}

fn print_info(window: &Window<'_>, settings: &JingleSettings) {
    let score = window.score();
    let range = window.measure_range();
    let mut diagnostics = Diagnostics::new();

    println!("Tempo: {} BPM", score.tempo_bpm);
    println!("Parts: {}", score.parts.len());
    println!("Measures: {} (selected {}..{})", window.total_measures(), range.start, range.end);
    for channel in Channel::ALL {
        let config = window.channel(channel);
        let width =
            window.max_chord_width(config.part_index, range.start, range.end, &mut diagnostics);
        let notes = window
            .selected_notes(channel, &mut diagnostics)
            .map(|n| n.len())
            .unwrap_or_else(|e| fail("Selection error", e));
        println!(
            "  {:<5} part {}, {} notes, widest chord {}, chord index {}, octave x{}",
            channel, config.part_index, notes, width, config.chord_index, config.octave_adjust
        );
    }
    match window.estimate_storage_bytes() {
        Ok(bytes) => println!(
            "Storage: {} of {} bytes{}",
            bytes,
            settings.capacity,
            if bytes > settings.capacity { " (too large)" } else { "" }
        ),
        Err(e) => fail("Selection error", e),
    }
    report_warnings(&diagnostics);
}

fn print_score(score: &Score) {
    println!("Tempo: {} BPM", score.tempo_bpm);
    println!("Divisions: {}", score.divisions);
    println!("Parts: {}", score.parts.len());
    println!();
    for (part_idx, part) in score.parts.iter().enumerate() {
        println!(
            "--- Part {} ({} measures, {} notes) ---",
            part_idx,
            part.measures.len(),
            part.note_count()
        );
        for (measure_idx, measure) in part.measures.iter().enumerate() {
            let notes: Vec<String> = measure
                .notes
                .iter()
                .map(|n| {
                    let freqs: Vec<String> =
                        n.frequencies.iter().map(|f| format!("{:.1}", f)).collect();
                    format!("[{}]x{}", freqs.join(" "), n.length)
                })
                .collect();
            println!("  {:>3} | {}", measure_idx, notes.join(" "));
        }
        println!();
    }
}
