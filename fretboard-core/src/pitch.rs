//! # Pitch Detection Module
//!
//! Turns a waveform into note events. The [`PitchDetector`] trait is the seam
//! the transcription pipeline talks to; [`YinDetector`] is the in-process
//! implementation and [`crate::basic_pitch::BasicPitchCli`] delegates to the
//! pretrained Basic Pitch model.
//!
//! ## YIN detector
//! - Noise gate on frame RMS
//! - Cumulative mean normalized difference with a clarity check
//! - Parabolic interpolation for sub-sample accuracy
//! - Spectrum refinement around the YIN estimate
//! - Frames snapped to MIDI pitch and grouped into notes

use serde::Serialize;
use tracing::debug;

use crate::audio::Waveform;
use crate::error::Result;
use crate::fft::SpectrumAnalyzer;
use crate::tuning::{self, calculate_cents_deviation, frequency_to_midi};

/// A note reported by a pitch-detection collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteEvent {
    /// Onset in seconds from the start of the clip.
    pub start_time: f64,
    /// Release in seconds from the start of the clip.
    pub end_time: f64,
    /// MIDI pitch.
    pub pitch: u8,
    /// Loudness in 0..1.
    pub amplitude: f64,
}

impl NoteEvent {
    pub fn frequency(&self) -> f64 {
        tuning::midi_to_frequency(self.pitch)
    }
}

/// Something that can turn audio into note events.
pub trait PitchDetector: Send + Sync {
    fn detect(&self, waveform: &Waveform) -> Result<Vec<NoteEvent>>;
}

/// Frame-by-frame YIN pitch tracker.
#[derive(Debug, Clone)]
pub struct YinDetector {
    /// Samples per analysis frame.
    pub frame_size: usize,
    /// Samples between successive frames.
    pub hop_size: usize,
    /// Minimum frame RMS for a frame to be analysed.
    pub amplitude_threshold: f32,
    /// Lowest frequency searched for, bounds the lag range.
    pub min_frequency: f32,
    /// Shortest run of equal-pitch frames reported as a note.
    pub min_note_frames: usize,
}

impl Default for YinDetector {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
            amplitude_threshold: 0.01,
            min_frequency: 60.0,
            min_note_frames: 3,
        }
    }
}

const CLARITY_THRESHOLD: f32 = 0.1;

/// Pitch and level of one analysed frame.
#[derive(Debug, Clone, Copy)]
struct Frame {
    pitch: u8,
    rms: f32,
}

impl YinDetector {
    /// Estimates the fundamental of one frame with the YIN algorithm.
    ///
    /// # Arguments
    /// * `frame` - Audio samples; the first half is compared against lagged copies
    /// * `sample_rate` - Rate of `frame` in Hz
    ///
    /// # Returns
    /// * `Some(frequency)` - Fundamental in Hz
    /// * `None` - Frame is below the noise gate or has no clear period
    pub fn detect_frequency(&self, frame: &[f32], sample_rate: u32) -> Option<f32> {
        let window = frame.len() / 2;
        let longest_period = (sample_rate as f32 / self.min_frequency).ceil() as usize;
        let max_tau = (longest_period + 2).min(window);
        if max_tau < 3 || rms(frame) < self.amplitude_threshold {
            return None;
        }

        let mut yin = vec![0.0_f32; max_tau];
        for tau in 1..max_tau {
            yin[tau] = (0..window)
                .map(|i| {
                    let delta = frame[i] - frame[i + tau];
                    delta * delta
                })
                .sum();
        }

        // Cumulative mean normalized difference.
        yin[0] = 1.0;
        let mut running_sum = 0.0;
        for tau in 1..max_tau {
            running_sum += yin[tau];
            yin[tau] = if running_sum > 0.0 {
                yin[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }

        // First dip close to the global minimum, walked down to its bottom.
        let min_val = yin[1..].iter().copied().fold(f32::INFINITY, f32::min);
        let threshold = min_val + 0.05;
        let mut period =
            (2..max_tau).find(|&tau| yin[tau] < threshold && yin[tau] < yin[tau - 1])?;
        while period + 1 < max_tau && yin[period + 1] < yin[period] {
            period += 1;
        }

        if yin[period] > CLARITY_THRESHOLD || period + 1 >= max_tau {
            return None;
        }

        let offset = parabolic_offset(yin[period - 1], yin[period], yin[period + 1]);
        let period_float = period as f32 + offset.unwrap_or(0.0);

        let frequency = sample_rate as f32 / period_float;
        (frequency.is_finite() && frequency > 20.0).then_some(frequency)
    }

    fn analyse_frame(
        &self,
        frame: &[f32],
        sample_rate: u32,
        analyzer: &SpectrumAnalyzer,
    ) -> Option<Frame> {
        let rough = self.detect_frequency(frame, sample_rate)?;
        let refined = analyzer
            .magnitudes(frame)
            .map(|mags| refine_from_spectrum(&mags, rough, sample_rate))
            // The spectrum peak can jump to a neighbouring partial.
            .filter(|&f| calculate_cents_deviation(f64::from(f), f64::from(rough)).abs() < 50.0)
            .unwrap_or(rough);

        let midi = frequency_to_midi(f64::from(refined)).round();
        (0.0..=127.0).contains(&midi).then(|| Frame {
            pitch: midi as u8,
            rms: rms(frame),
        })
    }

    /// Groups runs of equal pitch into note events.
    fn segment(&self, frames: &[Option<Frame>], sample_rate: u32) -> Vec<NoteEvent> {
        let hop_secs = self.hop_size as f64 / f64::from(sample_rate);
        let mut events = Vec::new();
        let mut run_start = 0;

        while run_start < frames.len() {
            let Some(first) = frames[run_start] else {
                run_start += 1;
                continue;
            };
            let run_len = frames[run_start..]
                .iter()
                .take_while(|f| f.is_some_and(|f| f.pitch == first.pitch))
                .count();

            if run_len >= self.min_note_frames {
                let mean_rms = frames[run_start..run_start + run_len]
                    .iter()
                    .flatten()
                    .map(|f| f64::from(f.rms))
                    .sum::<f64>()
                    / run_len as f64;
                events.push(NoteEvent {
                    start_time: run_start as f64 * hop_secs,
                    end_time: (run_start + run_len) as f64 * hop_secs,
                    pitch: first.pitch,
                    // A full-scale sine has an RMS of 1/sqrt(2).
                    amplitude: (mean_rms * std::f64::consts::SQRT_2).min(1.0),
                });
            }
            run_start += run_len;
        }
        events
    }
}

impl PitchDetector for YinDetector {
    fn detect(&self, waveform: &Waveform) -> Result<Vec<NoteEvent>> {
        let analyzer = SpectrumAnalyzer::new(self.frame_size);
        let frames: Vec<Option<Frame>> = waveform
            .samples
            .windows(self.frame_size)
            .step_by(self.hop_size.max(1))
            .map(|frame| self.analyse_frame(frame, waveform.sample_rate, &analyzer))
            .collect();

        let events = self.segment(&frames, waveform.sample_rate);
        debug!(frames = frames.len(), notes = events.len(), "YIN detection finished");
        Ok(events)
    }
}

fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// Vertex of the parabola through three equally spaced points, relative to
/// the middle one.
fn parabolic_offset(y1: f32, y2: f32, y3: f32) -> Option<f32> {
    let curvature = y1 - 2.0 * y2 + y3;
    (curvature.abs() > f32::EPSILON).then(|| (y1 - y3) / (2.0 * curvature))
}

/// Moves a time-domain estimate onto the strongest nearby spectrum peak.
///
/// The peak is searched within two bins of `rough` and located between bins
/// by a parabola through the log magnitudes.
///
/// # Arguments
/// * `magnitudes` - Magnitude spectrum from DC up to Nyquist
/// * `rough` - Estimate to refine, in Hz
/// * `sample_rate` - Rate of the analysed frame in Hz
///
/// # Returns
/// The refined frequency, or `rough` when no usable peak is found
fn refine_from_spectrum(magnitudes: &[f32], rough: f32, sample_rate: u32) -> f32 {
    if rough <= 0.0 || magnitudes.len() < 3 {
        return rough;
    }
    let bin_hz = sample_rate as f32 / (2 * magnitudes.len()) as f32;
    let centre = rough / bin_hz;
    // Keep a neighbour on each side of the peak.
    let low = (centre - 2.0).max(1.0) as usize;
    let high = ((centre + 2.0) as usize).min(magnitudes.len() - 2);

    let Some(peak) = (low..=high).max_by(|&a, &b| magnitudes[a].total_cmp(&magnitudes[b])) else {
        return rough;
    };
    let [y1, y2, y3] = [peak - 1, peak, peak + 1].map(|bin| magnitudes[bin].ln());
    if !(y1.is_finite() && y2.is_finite() && y3.is_finite()) {
        return rough;
    }
    parabolic_offset(y1, y2, y3)
        .map(|offset| (peak as f32 + offset) * bin_hz)
        .filter(|f| f.is_finite() && *f > 0.0)
        .unwrap_or(rough)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 22_050;

    fn sine(freq: f32, secs: f32, amplitude: f32) -> Vec<f32> {
        let n = (secs * RATE as f32) as usize;
        (0..n)
            .map(|i| i as f32 / RATE as f32)
            .map(|t| amplitude * (2.0 * std::f32::consts::PI * freq * t).sin())
            .collect()
    }

    #[test]
    fn yin_finds_the_fundamental() {
        let detector = YinDetector::default();
        for freq in [82.41_f32, 110.0, 220.0, 440.0] {
            let frame = sine(freq, 0.2, 0.5);
            let detected = detector
                .detect_frequency(&frame[..detector.frame_size], RATE)
                .unwrap();
            assert!((detected - freq).abs() / freq < 0.01, "{freq} Hz detected as {detected}");
        }
    }

    #[test]
    fn silence_is_gated() {
        let detector = YinDetector::default();
        assert_eq!(detector.detect_frequency(&[0.0; 2048], RATE), None);
        let quiet = sine(220.0, 0.1, 0.001);
        assert_eq!(detector.detect_frequency(&quiet[..2048], RATE), None);
    }

    #[test]
    fn steady_tone_becomes_one_note() {
        let waveform = Waveform::new(sine(220.0, 1.0, 0.5), RATE);
        let events = YinDetector::default().detect(&waveform).unwrap();
        assert_eq!(events.len(), 1, "{events:?}");
        let note = &events[0];
        assert_eq!(note.pitch, 57);
        assert!(note.start_time < 0.05);
        assert!(note.end_time > 0.8);
        assert!((note.amplitude - 0.5).abs() < 0.05);
    }

    #[test]
    fn two_tones_become_two_notes_in_order() {
        let mut samples = sine(110.0, 0.5, 0.5);
        samples.extend(sine(146.83, 0.5, 0.5));
        let events = YinDetector::default()
            .detect(&Waveform::new(samples, RATE))
            .unwrap();
        let pitches: Vec<u8> = events.iter().map(|e| e.pitch).collect();
        assert_eq!(pitches.first(), Some(&45));
        assert_eq!(pitches.last(), Some(&50));
        assert!(events.windows(2).all(|w| w[0].start_time <= w[1].start_time));
    }

    #[test]
    fn short_runs_are_dropped() {
        let detector = YinDetector { min_note_frames: 3, ..Default::default() };
        let frame = Some(Frame { pitch: 60, rms: 0.3 });
        let frames = [frame, frame, None, frame, frame, frame];
        let events = detector.segment(&frames, RATE);
        assert_eq!(events.len(), 1);
        let hop = detector.hop_size as f64 / RATE as f64;
        assert!((events[0].start_time - 3.0 * hop).abs() < 1e-12);
        assert!((events[0].end_time - 6.0 * hop).abs() < 1e-12);
    }

    #[test]
    fn spectrum_refinement_sharpens_a_rough_estimate() {
        let frame = sine(440.0, 0.1, 0.5);
        let mags = SpectrumAnalyzer::new(2048).magnitudes(&frame[..2048]).unwrap();
        let refined = refine_from_spectrum(&mags, 430.0, RATE);
        assert!((refined - 440.0).abs() < 2.0, "refined to {refined}");
        assert_eq!(refine_from_spectrum(&mags, 0.0, RATE), 0.0);
        assert_eq!(refine_from_spectrum(&mags[..2], 430.0, RATE), 430.0);
    }

    #[test]
    fn parabola_vertex() {
        assert_eq!(parabolic_offset(1.0, 0.0, 1.0), Some(0.0));
        assert_eq!(parabolic_offset(2.0, 1.0, 2.0), Some(0.0));
        assert!(parabolic_offset(1.0, 1.0, 1.0).is_none());
        // y = (x - 0.25)^2 sampled at -1, 0, 1.
        let offset = parabolic_offset(1.5625, 0.0625, 0.5625).unwrap();
        assert!((offset - 0.25).abs() < 1e-6);
    }

    #[test]
    fn event_frequency_uses_equal_temperament() {
        let event = NoteEvent { start_time: 0.0, end_time: 1.0, pitch: 69, amplitude: 0.5 };
        assert_eq!(event.frequency(), 440.0);
    }

    #[test]
    fn too_short_waveform_has_no_notes() {
        let waveform = Waveform::new(vec![0.3; 100], RATE);
        assert!(YinDetector::default().detect(&waveform).unwrap().is_empty());
    }
}
