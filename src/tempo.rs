//! Conversion of MIDI ticks into wall-clock time.

use crate::{event::TempoEvent, prelude::*, smf::Header};

/// A tick-to-seconds conversion that honours every tempo change of a file.
///
/// Only metrical (ticks per quarter note) files are supported. SMPTE timecode divisions are
/// rejected with `UnsupportedTiming` instead of producing zero-length ticks.
#[derive(Clone, Debug, PartialEq)]
pub struct TempoMap {
    ticks_per_quarter_note: u16,
    /// Tempo segments sorted by tick: `(start tick, seconds elapsed at start tick, seconds per
    /// tick)`.
    segments: Vec<(u64, f64, f64)>,
}
impl TempoMap {
    /// The tempo assumed before the first Set Tempo event.
    pub const DEFAULT_BPM: f64 = 120.0;

    const DEFAULT_MICROS_PER_QUARTER_NOTE: u32 = 500_000;

    pub fn new(header: &Header, tempos: &[TempoEvent]) -> Result<TempoMap> {
        let tpqn = header.ticks_per_quarter_note();
        ensure!(tpqn > 0, ErrorKind::UnsupportedTiming);
        let tick_secs = |micros: u32| f64::from(micros) / 1_000_000.0 / f64::from(tpqn);

        let mut changes = tempos.to_vec();
        changes.sort_by_key(|tempo| tempo.tick);

        let mut segments = vec![(0, 0.0, tick_secs(Self::DEFAULT_MICROS_PER_QUARTER_NOTE))];
        for tempo in changes {
            let (start, elapsed, per_tick) = segments[segments.len() - 1];
            let at = elapsed + (tempo.tick - start) as f64 * per_tick;
            let segment = (tempo.tick, at, tick_secs(tempo.micros_per_quarter_note));
            if tempo.tick == start {
                //Later changes at the same tick win
                let last = segments.len() - 1;
                segments[last] = segment;
            } else {
                segments.push(segment);
            }
        }
        Ok(TempoMap {
            ticks_per_quarter_note: tpqn,
            segments,
        })
    }

    #[inline]
    pub fn ticks_per_quarter_note(&self) -> u16 {
        self.ticks_per_quarter_note
    }

    /// Seconds elapsed from tick 0 up to `tick`.
    pub fn seconds_at(&self, tick: u64) -> f64 {
        let idx = match self
            .segments
            .binary_search_by_key(&tick, |&(start, _, _)| start)
        {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let (start, elapsed, per_tick) = self.segments[idx];
        elapsed + (tick - start) as f64 * per_tick
    }

    /// Length in seconds of a span of `ticks` starting at `start`.
    #[inline]
    pub fn duration_seconds(&self, start: u64, ticks: u64) -> f64 {
        self.seconds_at(start + ticks) - self.seconds_at(start)
    }
}
