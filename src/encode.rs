//! Writing note lists as Standard Midi Files.

use crate::{
    event::{MetaMessage, MidiMessage, PitchBend},
    pitch,
    pool::ChannelPool,
    prelude::*,
    primitive::{Format, Timing},
    smf::Header,
};

/// Registered Parameter Number controllers.
const CC_DATA_ENTRY_MSB: u8 = 0x06;
const CC_DATA_ENTRY_LSB: u8 = 0x26;
const CC_RPN_LSB: u8 = 0x64;
const CC_RPN_MSB: u8 = 0x65;

/// How long a note lasts.
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NoteLength {
    /// Wall-clock length, converted to beats through the export tempo.
    Seconds(f64),
    /// Length in beats (quarter notes).
    Beats(f64),
}

/// The pitch of a note.
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Pitch {
    /// A frequency. It is written as the closest MIDI key, plus a pitch bend for the remaining
    /// deviation when pitch bending is enabled.
    Hz(f64),
    /// A MIDI key number. Values above 127 are clamped.
    Note(u8),
}

/// A note to be written by the encoder.
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoteRecord {
    /// Start of the note in beats (quarter notes). Only differences between notes matter: the
    /// earliest note of a list is written at tick 0.
    pub start_beats: f64,
    pub length: NoteLength,
    pub pitch: Pitch,
    /// Clamped to `1..=127` when written.
    pub velocity: u8,
    /// An explicit channel. When `None` the channel comes from the round-robin pool if pitch
    /// bending is enabled, and from `EncodeOptions::channel` otherwise.
    pub channel: Option<u4>,
}
impl NoteRecord {
    pub fn new(start_beats: f64, length: NoteLength, pitch: Pitch, velocity: u8) -> NoteRecord {
        NoteRecord {
            start_beats,
            length,
            pitch,
            velocity,
            channel: None,
        }
    }

    /// Pin this note to a channel.
    pub fn on_channel(self, channel: u4) -> NoteRecord {
        NoteRecord {
            channel: Some(channel),
            ..self
        }
    }
}

/// Configuration of the encoder.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncodeOptions {
    /// Ticks per quarter note, in `1..=32767`.
    pub ticks_per_quarter_note: u16,
    /// Export tempo in beats per minute. Also used to convert `NoteLength::Seconds` to ticks.
    pub tempo_bpm: f64,
    /// Channel of every note without an explicit channel, when pitch bending is disabled.
    pub channel: u4,
    /// Pitch bend range in semitones. `Some` enables one pitch bend per note, with notes spread
    /// over the channel pool, and writes the range to every pooled channel.
    pub pitch_bend: Option<u8>,
    /// Omit repeated status bytes of consecutive channel events.
    pub running_status: bool,
    /// Written as a Track Name meta event when set.
    pub track_name: Option<String>,
}
impl EncodeOptions {
    /// Options writing every note on channel 0, without pitch bends.
    pub fn new(tempo_bpm: f64, ticks_per_quarter_note: u16) -> EncodeOptions {
        EncodeOptions {
            ticks_per_quarter_note,
            tempo_bpm,
            channel: u4::new(0),
            pitch_bend: None,
            running_status: false,
            track_name: None,
        }
    }

    pub fn with_pitch_bend(self, range_semitones: u8) -> EncodeOptions {
        EncodeOptions {
            pitch_bend: Some(range_semitones),
            ..self
        }
    }

    pub fn with_channel(self, channel: u4) -> EncodeOptions {
        EncodeOptions { channel, ..self }
    }

    pub fn with_running_status(self, running_status: bool) -> EncodeOptions {
        EncodeOptions {
            running_status,
            ..self
        }
    }

    pub fn with_track_name(self, name: impl Into<String>) -> EncodeOptions {
        EncodeOptions {
            track_name: Some(name.into()),
            ..self
        }
    }

    /// Microseconds per quarter note of the export tempo.
    fn micros_per_quarter_note(&self) -> Result<u24> {
        ensure!(
            self.tempo_bpm.is_finite() && self.tempo_bpm > 0.0,
            ErrorKind::InvalidInput("tempo must be positive")
        );
        let micros = (60_000_000.0 / self.tempo_bpm).round();
        ensure!(
            micros >= 1.0 && micros <= f64::from(u24::max_value().as_int()),
            ErrorKind::InvalidInput("tempo does not fit in a set tempo event")
        );
        Ok(u24::new(micros as u32))
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.ticks_per_quarter_note > 0 && u15::try_from(self.ticks_per_quarter_note).is_some(),
            ErrorKind::InvalidInput("ticks per quarter note must be in 1..=32767")
        );
        if let Some(range) = self.pitch_bend {
            ensure!(
                range > 0 && u7::try_from(range).is_some(),
                ErrorKind::InvalidInput("pitch bend range must be in 1..=127 semitones")
            );
        }
        Ok(())
    }
}

/// A channel message at an absolute tick, waiting to be sorted and written.
#[derive(Copy, Clone, Debug)]
struct TimedMessage {
    tick: u64,
    channel: u4,
    message: MidiMessage,
}
impl TimedMessage {
    /// Order of messages sharing a tick: bends land before the note they shape, and a note
    /// never ends before a note starting at the same tick.
    fn priority(&self) -> u8 {
        match self.message {
            MidiMessage::PitchBend { .. } => 0,
            MidiMessage::NoteOn { .. } => 1,
            MidiMessage::NoteOff { .. } => 2,
            _ => 3,
        }
    }
}

/// Encode notes as a format 0 file, on channel 0 and without pitch bends.
///
/// Shorthand for [`encode_with`](fn.encode_with.html) with
/// [`EncodeOptions::new`](struct.EncodeOptions.html#method.new).
pub fn encode(notes: &[NoteRecord], tempo_bpm: f64, ticks_per_quarter_note: u16) -> Result<Vec<u8>> {
    encode_with(notes, &EncodeOptions::new(tempo_bpm, ticks_per_quarter_note))
}

/// Encode notes as the bytes of a single-track, format 0 Standard Midi File.
///
/// An empty note list is refused with `NothingToExport`.
pub fn encode_with(notes: &[NoteRecord], options: &EncodeOptions) -> Result<Vec<u8>> {
    ensure!(!notes.is_empty(), ErrorKind::NothingToExport);
    options.validate()?;
    let tempo = options.micros_per_quarter_note()?;
    let mut pool = ChannelPool::new();
    let events = note_events(notes, options, &mut pool)?;
    ensure!(!events.is_empty(), ErrorKind::NothingToExport);

    let tpqn = options.ticks_per_quarter_note;
    let mut out = ByteWriter::with_capacity(64 + events.len() * 4);
    Header::new(Format::SingleTrack, 1, Timing::Metrical(u15::new(tpqn))).write(&mut out);
    out.write_fixed_text("MTrk");
    let len_at = out.position();
    out.write_uint(4, 0);
    let body_start = out.position();

    if let Some(name) = &options.track_name {
        out.write_vlq(0)?;
        MetaMessage::TrackName(name.clone()).write(&mut out)?;
    }
    out.write_vlq(0)?;
    MetaMessage::Tempo(tempo).write(&mut out)?;

    let mut running_status = None;
    let mut write_message =
        |out: &mut ByteWriter, delta: u64, channel: u4, message: MidiMessage| -> Result<()> {
            let delta = u32::try_from(delta)
                .map_err(|_| ErrorKind::InvalidInput("delta time exceeds 28 bits"))?;
            out.write_vlq(delta)?;
            if !options.running_status {
                running_status = None;
            }
            message.write(channel, &mut running_status, out);
            Ok(())
        };

    if let Some(range) = options.pitch_bend {
        for &channel in pool.channels() {
            for &(controller, value) in &[
                (CC_RPN_MSB, 0),
                (CC_RPN_LSB, 0),
                (CC_DATA_ENTRY_MSB, range),
                (CC_DATA_ENTRY_LSB, 0),
                (CC_RPN_MSB, 0x7F),
                (CC_RPN_LSB, 0x7F),
            ] {
                let message = MidiMessage::Controller {
                    controller: u7::new(controller),
                    value: u7::new(value),
                };
                write_message(&mut out, 0, channel, message)?;
            }
        }
    }

    let mut last_tick = 0;
    for ev in &events {
        write_message(&mut out, ev.tick - last_tick, ev.channel, ev.message)?;
        last_tick = ev.tick;
    }

    out.write_vlq(0)?;
    MetaMessage::EndOfTrack.write(&mut out)?;

    let len = u32::try_from(out.position() - body_start)
        .map_err(|_| ErrorKind::InvalidInput("midi chunk size exceeds 32 bit range"))?;
    out.patch_u32(len_at, len)?;
    debug!(
        "encoded {} notes into {} events ({} bytes)",
        notes.len(),
        events.len(),
        out.position()
    );
    Ok(out.into_inner())
}

/// Turn notes into tick-sorted channel messages.
fn note_events(
    notes: &[NoteRecord],
    options: &EncodeOptions,
    pool: &mut ChannelPool,
) -> Result<Vec<TimedMessage>> {
    let tpqn = f64::from(options.ticks_per_quarter_note);
    let beats_per_second = options.tempo_bpm / 60.0;
    let min_start = notes
        .iter()
        .map(|note| note.start_beats)
        .filter(|start| start.is_finite())
        .fold(f64::INFINITY, f64::min);

    let mut events = Vec::with_capacity(notes.len() * 3);
    for note in notes {
        let start = ((note.start_beats - min_start) * tpqn).round();
        if !(start.is_finite() && start >= 0.0) {
            debug!("dropping note starting at {} beats", note.start_beats);
            continue;
        }
        let beats = match note.length {
            NoteLength::Seconds(secs) => secs * beats_per_second,
            NoteLength::Beats(beats) => beats,
        };
        //`max` also maps NaN to 0
        let duration = (beats * tpqn).round().max(0.0);
        let (key, cents) = match note.pitch {
            Pitch::Hz(hz) => match pitch::nearest_note(hz) {
                Some(key) => (key, pitch::cents_from_note(hz, key)),
                None => {
                    warn!("dropping note with invalid frequency {} Hz", hz);
                    continue;
                }
            },
            Pitch::Note(key) => (u7::new(key.min(127)), 0.0),
        };
        let vel = u7::new(note.velocity.max(1).min(127));
        let channel = match (note.channel, options.pitch_bend) {
            (Some(channel), _) => channel,
            (None, Some(_)) => pool.next_round_robin(),
            (None, None) => options.channel,
        };

        let start = start as u64;
        let end = start.saturating_add(duration as u64);
        if let Some(range) = options.pitch_bend {
            events.push(TimedMessage {
                tick: start,
                channel,
                message: MidiMessage::PitchBend {
                    bend: PitchBend::from_cents(cents, range),
                },
            });
        }
        events.push(TimedMessage {
            tick: start,
            channel,
            message: MidiMessage::NoteOn { key, vel },
        });
        events.push(TimedMessage {
            tick: end,
            channel,
            message: MidiMessage::NoteOff {
                key,
                vel: u7::new(0),
            },
        });
    }
    events.sort_by_key(|ev| (ev.tick, ev.priority()));
    Ok(events)
}
