//! Conversions between frequencies and MIDI note numbers, in twelve-tone equal temperament
//! tuned to A4 = 440 Hz (MIDI note 69).

use crate::prelude::*;

/// Frequency of the tuning reference, A4.
pub const A4_HZ: f64 = 440.0;

/// MIDI note number of the tuning reference, A4.
pub const A4_NOTE: f64 = 69.0;

/// The fractional MIDI note number of a frequency: `69 + 12 * log2(f / 440)`.
#[inline]
pub fn frequency_to_note(hz: f64) -> f64 {
    A4_NOTE + 12.0 * (hz / A4_HZ).log2()
}

/// The frequency of a (possibly fractional) MIDI note number.
#[inline]
pub fn note_to_frequency(note: f64) -> f64 {
    A4_HZ * ((note - A4_NOTE) / 12.0).exp2()
}

/// The MIDI key closest to a frequency, clamped to the `0..=127` key range.
///
/// Returns `None` for frequencies that are not positive and finite.
pub fn nearest_note(hz: f64) -> Option<u7> {
    if !(hz.is_finite() && hz > 0.0) {
        return None;
    }
    let note = frequency_to_note(hz).round().max(0.0).min(127.0);
    Some(u7::new(note as u8))
}

/// How far `hz` is from the exact pitch of `note`, in cents (hundredths of a semitone).
#[inline]
pub fn cents_from_note(hz: f64, note: u7) -> f64 {
    1200.0 * (hz / note_to_frequency(f64::from(note.as_int()))).log2()
}
