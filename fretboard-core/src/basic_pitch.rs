//! Note events from Spotify's pretrained Basic Pitch model, via its CLI.
//!
//! The waveform is written to a scratch WAV, `basic-pitch` is run with
//! `--save-note-events`, and the resulting CSV is parsed back. The CSV columns
//! are `start_time_s,end_time_s,pitch_midi,velocity` followed by optional
//! pitch-bend values, which are ignored.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::audio::Waveform;
use crate::error::{Error, Result};
use crate::pitch::{NoteEvent, PitchDetector};

const INPUT_STEM: &str = "input";

#[derive(Debug, Clone)]
pub struct BasicPitchCli {
    binary: PathBuf,
}

impl Default for BasicPitchCli {
    fn default() -> Self {
        Self::new("basic-pitch")
    }
}

impl BasicPitchCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    fn run(&self, input: &Path, out_dir: &Path) -> Result<()> {
        debug!(binary = %self.binary.display(), "running basic-pitch");
        let output = Command::new(&self.binary)
            .arg(out_dir)
            .arg(input)
            .arg("--save-note-events")
            .output()
            .map_err(|e| Error::inference(&format!("running {}", self.binary.display()), e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Inference(format!(
                "basic-pitch exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl PitchDetector for BasicPitchCli {
    fn detect(&self, waveform: &Waveform) -> Result<Vec<NoteEvent>> {
        let workdir =
            tempfile::tempdir().map_err(|e| Error::inference("creating scratch directory", e))?;
        let input = workdir.path().join(format!("{INPUT_STEM}.wav"));
        let out_dir = workdir.path().join("out");
        std::fs::create_dir(&out_dir)
            .map_err(|e| Error::inference("creating output directory", e))?;
        waveform
            .write_wav(&input)
            .map_err(|e| Error::inference("writing model input", e))?;

        self.run(&input, &out_dir)?;

        let csv_path = out_dir.join(format!("{INPUT_STEM}_basic_pitch.csv"));
        let csv = std::fs::read_to_string(&csv_path)
            .map_err(|e| Error::inference(&format!("reading {}", csv_path.display()), e))?;
        parse_note_events(&csv)
    }
}

/// Parses a Basic Pitch note-events CSV.
///
/// Lines that do not start with a number (the header) are skipped.
pub fn parse_note_events(csv: &str) -> Result<Vec<NoteEvent>> {
    csv.lines()
        .map(str::trim)
        .filter(|line| line.starts_with(|c: char| c.is_ascii_digit() || c == '.'))
        .enumerate()
        .map(|(row, line)| {
            parse_row(line).ok_or_else(|| {
                Error::Inference(format!("malformed note event row {}: {line}", row + 1))
            })
        })
        .collect()
}

fn parse_row(line: &str) -> Option<NoteEvent> {
    let mut fields = line.split(',').map(str::trim);
    let start_time = fields.next()?.parse().ok()?;
    let end_time = fields.next()?.parse().ok()?;
    let pitch: f64 = fields.next()?.parse().ok()?;
    let velocity: f64 = fields.next()?.parse().ok()?;
    if !(0.0..=127.0).contains(&pitch) {
        return None;
    }
    Some(NoteEvent {
        start_time,
        end_time,
        pitch: pitch.round() as u8,
        amplitude: (velocity / 127.0).clamp(0.0, 1.0),
    })
}
