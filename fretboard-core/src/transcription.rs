//! # Transcription Module
//!
//! Ties the collaborators together: validate the request, fetch the audio,
//! detect notes and place each one on the fretboard.
//!
//! The pipeline:
//! 1. Rejects over-long or non-http(s) requests before touching the network
//! 2. Fetches the clip through an [`AudioSource`]
//! 3. Runs a [`PitchDetector`] over the waveform
//! 4. Maps every note onto the tuning, dropping the ones with no position
//! 5. Orders the notes by onset
//!
//! Scratch audio is released when the downloaded clip goes out of scope,
//! whichever step fails.

use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::audio::AudioSource;
use crate::error::{Error, Result};
use crate::pitch::{NoteEvent, PitchDetector};
use crate::tuning::{self, Tuning, STANDARD_TUNING};

/// Longest clip, in seconds, a request may ask for.
pub const MAX_DURATION_SECS: u32 = 60;

fn default_duration() -> u32 {
    30
}

/// What the caller wants transcribed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    pub url: Url,
    /// Offset into the source, in seconds.
    #[serde(default)]
    pub start_time: u32,
    /// Clip length, in seconds.
    #[serde(default = "default_duration")]
    pub duration: u32,
}

impl TranscriptionRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            start_time: 0,
            duration: default_duration(),
        }
    }

    /// Checks the request before any work is done.
    pub fn validate(&self, max_duration: u32) -> Result<()> {
        if self.duration > max_duration {
            return Err(Error::DurationExceeded {
                requested: self.duration,
                max: max_duration,
            });
        }
        match self.url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(Error::InvalidUrl(other.to_string())),
        }
    }
}

/// A detected note placed on the fretboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscribedNote {
    pub string: u8,
    pub fret: u8,
    /// Onset in seconds.
    pub beat: f64,
    pub frequency: f64,
    pub confidence: f64,
}

/// The transcription of one clip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcription {
    pub video_title: String,
    pub video_artist: String,
    pub notes: Vec<TranscribedNote>,
    pub total_notes: usize,
    pub duration: f64,
}

/// Places note events on `tuning`, ordered by onset.
///
/// Events with no playable position are left out.
pub fn notes_from_events(events: &[NoteEvent], tuning: &Tuning) -> Vec<TranscribedNote> {
    let mut notes: Vec<TranscribedNote> = events
        .iter()
        .filter_map(|event| {
            let frequency = event.frequency();
            let position = tuning.position_for(frequency)?;
            Some(TranscribedNote {
                string: position.string,
                fret: position.fret,
                beat: event.start_time,
                frequency,
                confidence: event.amplitude,
            })
        })
        .collect();
    notes.sort_by(|a, b| a.beat.total_cmp(&b.beat));
    notes
}

/// Anything that can serve a transcription request.
pub trait Transcribe: Send + Sync {
    fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcription>;
}

/// The download, detect and map pipeline.
pub struct Pipeline<S, D> {
    source: S,
    detector: D,
    tuning: &'static Tuning,
    max_duration: u32,
}

impl<S: AudioSource, D: PitchDetector> Pipeline<S, D> {
    pub fn new(source: S, detector: D) -> Self {
        Self {
            source,
            detector,
            tuning: &STANDARD_TUNING,
            max_duration: MAX_DURATION_SECS,
        }
    }

    pub fn with_tuning(mut self, tuning: &'static Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_max_duration(mut self, max_duration: u32) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn max_duration(&self) -> u32 {
        self.max_duration
    }
}

impl<S: AudioSource, D: PitchDetector> Transcribe for Pipeline<S, D> {
    fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcription> {
        request.validate(self.max_duration)?;
        info!(url = %request.url, "Starting transcription");

        let audio = self
            .source
            .fetch(&request.url, request.start_time, request.duration)?;
        info!("Audio downloaded: {}", audio.title);

        let events = self.detector.detect(&audio.waveform)?;
        let notes = notes_from_events(&events, self.tuning);
        if let Some(first) = events.first() {
            info!(
                first_note = %tuning::note_name(first.pitch),
                detected = events.len(),
                "pitch detection finished"
            );
        }
        info!("Transcription complete: {} notes found", notes.len());

        Ok(Transcription {
            video_title: audio.title,
            video_artist: audio.artist,
            total_notes: notes.len(),
            notes,
            duration: f64::from(request.duration),
        })
    }
}
