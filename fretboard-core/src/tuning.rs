//! # Guitar Tuning Module
//!
//! This module holds the open-string tables the fretboard mapper works against,
//! together with the equal temperament helpers used to move between MIDI pitch,
//! frequency and note names.
//!
//! ## Features
//! - Standard (E A D G B E) and drop-D six-string tunings
//! - MIDI pitch to frequency conversion with A4 = 440 Hz
//! - Scientific pitch note names for log output
//! - Cent deviation calculations for grading detected pitches

use once_cell::sync::Lazy;

/// Number of strings on the instruments this crate maps onto.
pub const STRING_COUNT: usize = 6;

/// Reference pitch for equal temperament: MIDI 69 is A4.
pub const A4_MIDI: u8 = 69;
pub const A4_FREQUENCY: f64 = 440.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A single string of the instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct GuitarString {
    /// String identifier, 1 is the highest-pitched string.
    pub number: u8,
    /// Display name as printed next to a tab staff (`e B G D A E`).
    pub name: &'static str,
    /// Fundamental frequency of the unfretted string in Hz.
    pub open_frequency: f64,
}

/// An immutable set of open-string frequencies.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    name: &'static str,
    strings: Vec<GuitarString>,
}

impl Tuning {
    /// Builds a tuning from `(display name, open frequency)` pairs, string 1 first.
    fn from_table(name: &'static str, table: [(&'static str, f64); STRING_COUNT]) -> Self {
        let strings = table
            .into_iter()
            .zip(1u8..)
            .map(|((string_name, open_frequency), number)| GuitarString {
                number,
                name: string_name,
                open_frequency,
            })
            .collect();
        Self { name, strings }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Strings in identifier order, string 1 first.
    pub fn strings(&self) -> &[GuitarString] {
        &self.strings
    }

    pub fn string(&self, number: u8) -> Option<&GuitarString> {
        self.strings.iter().find(|s| s.number == number)
    }

    pub fn open_frequency(&self, number: u8) -> Option<f64> {
        self.string(number).map(|s| s.open_frequency)
    }
}

/// Standard tuning in Hz, built once on first use.
pub static STANDARD_TUNING: Lazy<Tuning> = Lazy::new(|| {
    Tuning::from_table(
        "standard",
        [
            ("e", 329.63), // E4
            ("B", 246.94), // B3
            ("G", 196.00), // G3
            ("D", 146.83), // D3
            ("A", 110.00), // A2
            ("E", 82.41),  // E2
        ],
    )
});

/// Standard tuning with the low E string dropped a whole tone to D2.
pub static DROP_D_TUNING: Lazy<Tuning> = Lazy::new(|| {
    Tuning::from_table(
        "drop-d",
        [
            ("e", 329.63),
            ("B", 246.94),
            ("G", 196.00),
            ("D", 146.83),
            ("A", 110.00),
            ("D", 73.42), // D2
        ],
    )
});

/// Converts a MIDI pitch to its equal temperament frequency.
///
/// `440 * 2^((pitch - 69) / 12)`
pub fn midi_to_frequency(pitch: u8) -> f64 {
    A4_FREQUENCY * 2.0_f64.powf((f64::from(pitch) - f64::from(A4_MIDI)) / 12.0)
}

/// Converts a frequency to a fractional MIDI pitch.
///
/// Rounding the result gives the nearest equal temperament note.
pub fn frequency_to_midi(freq: f64) -> f64 {
    f64::from(A4_MIDI) + 12.0 * (freq / A4_FREQUENCY).log2()
}

/// Gets the scientific pitch name of a MIDI note (60 is "C4").
pub fn note_name(pitch: u8) -> String {
    let octave = i32::from(pitch / 12) - 1;
    format!("{}{}", NOTE_NAMES[usize::from(pitch % 12)], octave)
}

/// Calculates the deviation from a target frequency in cents.
///
/// 100 cents = 1 semitone; positive values are sharp, negative values flat.
pub fn calculate_cents_deviation(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn standard_tuning_table() {
        let strings = STANDARD_TUNING.strings();
        assert_eq!(strings.len(), STRING_COUNT);
        assert_eq!(STANDARD_TUNING.open_frequency(1), Some(329.63));
        assert_eq!(STANDARD_TUNING.open_frequency(5), Some(110.00));
        assert_eq!(STANDARD_TUNING.open_frequency(6), Some(82.41));
        assert_eq!(STANDARD_TUNING.open_frequency(7), None);
        let names: Vec<_> = strings.iter().map(|s| s.name).collect();
        assert_eq!(names, ["e", "B", "G", "D", "A", "E"]);
    }

    #[test]
    fn drop_d_only_changes_the_low_string() {
        for number in 1..=5 {
            assert_eq!(
                DROP_D_TUNING.open_frequency(number),
                STANDARD_TUNING.open_frequency(number)
            );
        }
        assert_eq!(DROP_D_TUNING.open_frequency(6), Some(73.42));
        assert_eq!(DROP_D_TUNING.string(6).map(|s| s.name), Some("D"));
    }

    #[test]
    fn midi_conversion() {
        assert_relative_eq!(midi_to_frequency(69), 440.0);
        assert_relative_eq!(midi_to_frequency(57), 220.0, epsilon = 1e-9);
        assert_relative_eq!(midi_to_frequency(40), 82.4069, epsilon = 1e-3);
        assert_relative_eq!(frequency_to_midi(110.0), 45.0, epsilon = 1e-9);
    }

    #[test]
    fn note_names() {
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(40), "E2");
        assert_eq!(note_name(61), "C#4");
    }

    #[test]
    fn cents() {
        assert_relative_eq!(calculate_cents_deviation(880.0, 440.0), 1200.0);
        assert_relative_eq!(calculate_cents_deviation(440.0, 440.0), 0.0);
        assert!(calculate_cents_deviation(430.0, 440.0) < 0.0);
    }
}
