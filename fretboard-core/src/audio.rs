//! # Audio Acquisition Module
//!
//! This module fetches the audio track behind a media URL and turns it into a
//! mono waveform for the pitch detectors. Downloading and container decoding
//! are handed to `yt-dlp` (which drives `ffmpeg`); this side only reads the
//! resulting WAV with `hound`.
//!
//! ## Features
//! - Scratch directory per download, removed when the audio is dropped
//! - Title and uploader taken from the yt-dlp info JSON
//! - Downmix, resampling fallback and trimming to the requested window

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};

/// Sample rate every waveform is converted to before detection.
pub const SAMPLE_RATE: u32 = 22_050;

/// Used when the source does not report a title or uploader.
pub const UNKNOWN: &str = "Unknown";

/// Mono audio samples in -1..1.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Keeps `[start_secs, start_secs + duration_secs)`, clamped to the clip.
    pub fn trim(mut self, start_secs: u32, duration_secs: u32) -> Self {
        let rate = self.sample_rate as usize;
        let start = (start_secs as usize * rate).min(self.samples.len());
        let end = start
            .saturating_add(duration_secs as usize * rate)
            .min(self.samples.len());
        self.samples.truncate(end);
        self.samples.drain(..start);
        self
    }

    /// Linear-interpolation resampling.
    pub fn resample(self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate || self.samples.is_empty() {
            return Self { sample_rate: target_rate, ..self };
        }
        let ratio = f64::from(self.sample_rate) / f64::from(target_rate);
        let out_len = (self.samples.len() as f64 / ratio).floor() as usize;
        let last = self.samples.len() - 1;
        let samples = (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = (pos.floor() as usize).min(last);
                let next = (idx + 1).min(last);
                let frac = (pos - idx as f64) as f32;
                self.samples[idx] * (1.0 - frac) + self.samples[next] * frac
            })
            .collect();
        Self { samples, sample_rate: target_rate }
    }

    /// Reads a WAV file, averaging channels down to mono.
    pub fn read_wav(path: &Path) -> std::result::Result<Self, hound::Error> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 * scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let channels = usize::from(spec.channels.max(1));
        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        Ok(Self::new(samples, spec.sample_rate))
    }

    /// Writes the waveform as a 32-bit float mono WAV.
    pub fn write_wav(&self, path: &Path) -> std::result::Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()
    }
}

/// Decoded audio plus the attribution of its source.
///
/// Any scratch files backing the audio live as long as this value.
#[derive(Debug)]
pub struct DownloadedAudio {
    pub waveform: Waveform,
    pub title: String,
    pub artist: String,
    workdir: Option<TempDir>,
}

impl DownloadedAudio {
    pub fn new(waveform: Waveform, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            waveform,
            title: title.into(),
            artist: artist.into(),
            workdir: None,
        }
    }

    /// Ties the lifetime of `workdir` to this audio.
    pub fn with_workdir(mut self, workdir: TempDir) -> Self {
        self.workdir = Some(workdir);
        self
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_ref().map(TempDir::path)
    }
}

/// Something that can fetch the audio behind a URL.
pub trait AudioSource: Send + Sync {
    /// Fetches `duration` seconds of audio starting `start_time` seconds in.
    ///
    /// # Arguments
    /// * `url` - Page or media URL understood by the source
    /// * `start_time` - Offset into the track, in seconds
    /// * `duration` - Length of the window to keep, in seconds
    ///
    /// # Returns
    /// The trimmed mono waveform at [`SAMPLE_RATE`] with its title and artist,
    /// or a download error
    fn fetch(&self, url: &Url, start_time: u32, duration: u32) -> Result<DownloadedAudio>;
}

#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    uploader: Option<String>,
}

/// Audio acquisition through the `yt-dlp` command line tool.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    sample_rate: u32,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            sample_rate: SAMPLE_RATE,
        }
    }

    fn command(&self, url: &Url, output_template: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["--format", "bestaudio/best", "--extract-audio", "--audio-format", "wav"])
            .arg("--postprocessor-args")
            .arg(format!("ExtractAudio:-ac 1 -ar {}", self.sample_rate))
            .args(["--no-playlist", "--quiet", "--no-warnings"])
            // Print the info JSON and still download.
            .args(["--dump-json", "--no-simulate"])
            .arg("--output")
            .arg(output_template)
            .arg(url.as_str());
        cmd
    }
}

/// Picks the title and uploader out of yt-dlp's stdout.
fn parse_info(stdout: &str) -> (String, String) {
    let info = stdout
        .lines()
        .rev()
        .find(|line| line.trim_start().starts_with('{'))
        .and_then(|line| serde_json::from_str::<InfoJson>(line).ok());
    match info {
        Some(info) => (
            info.title.unwrap_or_else(|| UNKNOWN.to_string()),
            info.uploader.unwrap_or_else(|| UNKNOWN.to_string()),
        ),
        None => {
            warn!("yt-dlp printed no info JSON");
            (UNKNOWN.to_string(), UNKNOWN.to_string())
        }
    }
}

/// Finds the extracted WAV in `dir`.
fn find_wav(dir: &Path) -> Result<PathBuf> {
    let expected = dir.join("audio.wav");
    if expected.is_file() {
        return Ok(expected);
    }
    std::fs::read_dir(dir)
        .map_err(|e| Error::download("reading download directory", e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .find(|path| path.extension().is_some_and(|ext| ext == "wav"))
        .ok_or_else(|| Error::Download("yt-dlp produced no WAV file".to_string()))
}

impl AudioSource for YtDlp {
    fn fetch(&self, url: &Url, start_time: u32, duration: u32) -> Result<DownloadedAudio> {
        let workdir = tempfile::Builder::new()
            .prefix("fretboard-")
            .tempdir()
            .map_err(|e| Error::download("creating scratch directory", e))?;
        let template = workdir.path().join("audio.%(ext)s");

        debug!(binary = %self.binary.display(), %url, "running yt-dlp");
        let output = self
            .command(url, &template)
            .output()
            .map_err(|e| Error::download(&format!("running {}", self.binary.display()), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Download(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let (title, artist) = parse_info(&String::from_utf8_lossy(&output.stdout));
        let wav = find_wav(workdir.path())?;
        let waveform = Waveform::read_wav(&wav)
            .map_err(|e| Error::download("decoding audio", e))?
            .resample(self.sample_rate)
            .trim(start_time, duration);

        info!(
            title = %title,
            seconds = waveform.duration_secs(),
            "audio ready"
        );
        Ok(DownloadedAudio::new(waveform, title, artist).with_workdir(workdir))
    }
}
