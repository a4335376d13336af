// fretboard-core/src/lib.rs

//! The core logic for the guitar transcription service.
//! This crate is responsible for audio acquisition, pitch detection,
//! and mapping detected notes onto guitar string and fret positions.
//! It is completely headless and contains no HTTP code.

pub mod audio;
pub mod basic_pitch;
pub mod error;
pub mod fft;
pub mod fretboard;
pub mod pitch;
pub mod transcription;
pub mod tuning;

pub use error::{Error, Result};
pub use fretboard::{map_frequency_to_position, Position};
pub use transcription::{
    Pipeline, Transcribe, TranscribedNote, Transcription, TranscriptionRequest,
};
pub use url::Url;
