//! # Fretboard Mapping Module
//!
//! Maps a detected frequency onto a playable string and fret.
//!
//! Every string proposes the fret nearest to the frequency. Proposals off the
//! neck or more than [`TOLERANCE_HZ`] away from the fretted pitch are dropped,
//! and the lowest remaining fret wins. Equal frets resolve to the string that
//! comes first in the tuning table.

use serde::Serialize;

use crate::tuning::{Tuning, STANDARD_TUNING};

/// Lowest frequency considered part of the guitar's practical range.
pub const MIN_FREQUENCY: f64 = 80.0;
/// Highest frequency considered part of the guitar's practical range.
pub const MAX_FREQUENCY: f64 = 1000.0;
/// Highest fret on the neck.
pub const MAX_FRET: u8 = 24;
/// Maximum distance between the input and the fretted pitch.
pub const TOLERANCE_HZ: f64 = 10.0;

/// A playable location on the neck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    /// String identifier (1-6).
    pub string: u8,
    /// Fret number (0 is the open string).
    pub fret: u8,
}

impl Position {
    /// Exact frequency this position produces on `tuning`.
    pub fn frequency(&self, tuning: &Tuning) -> Option<f64> {
        tuning
            .open_frequency(self.string)
            .map(|open| fret_frequency(open, self.fret))
    }
}

/// Frequency of `fret` on a string whose open pitch is `open_frequency`.
pub fn fret_frequency(open_frequency: f64, fret: u8) -> f64 {
    open_frequency * 2.0_f64.powf(f64::from(fret) / 12.0)
}

impl Tuning {
    /// All positions within tolerance of `frequency`, in string order.
    pub fn candidates(&self, frequency: f64) -> Vec<Position> {
        // NaN fails the range check as well.
        if !(MIN_FREQUENCY..=MAX_FREQUENCY).contains(&frequency) {
            return Vec::new();
        }

        self.strings()
            .iter()
            .filter_map(|string| {
                let fret = (12.0 * (frequency / string.open_frequency).log2()).round_ties_even();
                if !(0.0..=f64::from(MAX_FRET)).contains(&fret) {
                    return None;
                }
                let fret = fret as u8;
                let error = (frequency - fret_frequency(string.open_frequency, fret)).abs();
                (error < TOLERANCE_HZ).then_some(Position { string: string.number, fret })
            })
            .collect()
    }

    /// The easiest position to play `frequency` at, if any.
    pub fn position_for(&self, frequency: f64) -> Option<Position> {
        // `min_by_key` keeps the first of equal minima.
        self.candidates(frequency)
            .into_iter()
            .min_by_key(|position| position.fret)
    }
}

/// Maps a frequency onto standard tuning.
///
/// Frequencies outside 80..=1000 Hz, and those more than 10 Hz away from every
/// reachable fret, have no position. When several strings can play the note,
/// the one needing the lowest fret wins.
///
/// # Arguments
/// * `frequency` - Detected frequency in Hz
///
/// # Returns
/// * `Some(Position)` - String (1 is high E) and fret 0..=24
/// * `None` - No playable position within tolerance
pub fn map_frequency_to_position(frequency: f64) -> Option<Position> {
    STANDARD_TUNING.position_for(frequency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::DROP_D_TUNING;
    use approx::assert_relative_eq;

    fn pos(string: u8, fret: u8) -> Option<Position> {
        Some(Position { string, fret })
    }

    #[test]
    fn rejects_frequencies_outside_guitar_range() {
        for freq in [0.0, 20.0, 79.99, 1000.01, 2000.0, -110.0] {
            assert_eq!(map_frequency_to_position(freq), None, "{freq} Hz");
        }
        assert_eq!(map_frequency_to_position(f64::NAN), None);
        assert_eq!(map_frequency_to_position(f64::INFINITY), None);
    }

    #[test]
    fn open_strings_map_to_fret_zero() {
        for string in STANDARD_TUNING.strings() {
            assert_eq!(
                map_frequency_to_position(string.open_frequency),
                pos(string.number, 0),
                "string {}",
                string.name
            );
        }
    }

    #[test]
    fn known_frequencies() {
        assert_eq!(map_frequency_to_position(110.00), pos(5, 0));
        assert_eq!(map_frequency_to_position(82.41), pos(6, 0));
    }

    #[test]
    fn octave_above_open_a_prefers_the_lower_fret() {
        // A3 is playable at the 12th fret of the A string, but the G string
        // reaches it at the 2nd fret.
        let candidates = STANDARD_TUNING.candidates(220.0);
        assert!(candidates.contains(&Position { string: 5, fret: 12 }));
        assert!(candidates.contains(&Position { string: 3, fret: 2 }));
        assert_eq!(map_frequency_to_position(220.0), pos(3, 2));
    }

    #[test]
    fn lowest_fret_wins_among_candidates() {
        // E3 sits on three strings.
        let freq = 164.81;
        let candidates = STANDARD_TUNING.candidates(freq);
        assert_eq!(
            candidates,
            vec![
                Position { string: 4, fret: 2 },
                Position { string: 5, fret: 7 },
                Position { string: 6, fret: 12 },
            ]
        );
        assert_eq!(map_frequency_to_position(freq), pos(4, 2));
    }

    #[test]
    fn off_pitch_frequencies_have_no_match() {
        // Nearest frets sit about 12 Hz below.
        assert!(STANDARD_TUNING.candidates(1000.0).is_empty());
        assert_eq!(map_frequency_to_position(1000.0), None);
    }

    #[test]
    fn frets_past_the_neck_are_discarded() {
        // A5 would need fret 26 on the G string.
        assert_eq!(
            STANDARD_TUNING.candidates(880.0),
            vec![Position { string: 1, fret: 17 }, Position { string: 2, fret: 22 }]
        );
        assert_eq!(map_frequency_to_position(880.0), pos(1, 17));
    }

    #[test]
    fn mapping_is_deterministic() {
        for freq in [82.41, 110.0, 196.0, 220.0, 440.0, 659.26, 987.77] {
            assert_eq!(map_frequency_to_position(freq), map_frequency_to_position(freq));
        }
    }

    #[test]
    fn position_frequency_round_trips_through_tuning() {
        let position = Position { string: 5, fret: 12 };
        assert_relative_eq!(position.frequency(&STANDARD_TUNING).unwrap(), 220.0, epsilon = 1e-9);
        assert_eq!(Position { string: 9, fret: 0 }.frequency(&STANDARD_TUNING), None);
    }

    #[test]
    fn drop_d_moves_low_e_up_two_frets() {
        assert_eq!(DROP_D_TUNING.position_for(82.41), pos(6, 2));
        assert_eq!(DROP_D_TUNING.position_for(110.0), pos(5, 0));
        // D2 itself is below the mapped range.
        assert_eq!(DROP_D_TUNING.position_for(73.42), None);
    }
}
