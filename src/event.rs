//! All sort of events and their parsers.

use crate::prelude::*;

/// A decoded SMF event positioned at an absolute tick.
///
/// `tick` is the running sum of delta times since the start of the event's track.
/// `duration` is only ever set on `NoteOn` events, once the matching `NoteOff` has been decoded.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawEvent {
    /// Absolute position of the event within its track, in MIDI ticks.
    pub tick: u64,
    /// The event itself.
    pub body: EventBody,
    /// Length of the note in ticks, for `NoteOn` events that were closed by a `NoteOff`.
    pub duration: Option<u64>,
}
impl RawEvent {
    #[inline]
    pub fn new(tick: u64, body: EventBody) -> RawEvent {
        RawEvent {
            tick,
            body,
            duration: None,
        }
    }

    /// The flat event type of this event.
    pub fn event_type(&self) -> EventType {
        match &self.body {
            EventBody::Channel { message, .. } => message.event_type(),
            EventBody::Meta(_) => EventType::Meta,
        }
    }

    /// The channel of a channel voice event, `None` for meta events.
    #[inline]
    pub fn channel(&self) -> Option<u4> {
        match &self.body {
            EventBody::Channel { channel, .. } => Some(*channel),
            EventBody::Meta(_) => None,
        }
    }

    /// The channel voice message, `None` for meta events.
    #[inline]
    pub fn message(&self) -> Option<&MidiMessage> {
        match &self.body {
            EventBody::Channel { message, .. } => Some(message),
            EventBody::Meta(_) => None,
        }
    }

    /// The meta message, `None` for channel voice events.
    #[inline]
    pub fn meta(&self) -> Option<&MetaMessage> {
        match &self.body {
            EventBody::Meta(meta) => Some(meta),
            EventBody::Channel { .. } => None,
        }
    }

    /// Whether this is a `NoteOn` that has not been closed by a `NoteOff` (yet).
    #[inline]
    pub fn is_open_note(&self) -> bool {
        self.event_type() == EventType::NoteOn && self.duration.is_none()
    }
}

/// The payload of a [`RawEvent`](struct.RawEvent.html).
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventBody {
    /// A message associated to a MIDI channel carrying musical data.
    Channel {
        /// The MIDI channel that this event is associated with.
        channel: u4,
        /// The MIDI message type and associated data.
        message: MidiMessage,
    },
    /// A meta-message, giving extra information for correct playback, like tempo, song name,
    /// lyrics, etc...
    Meta(MetaMessage),
}

/// The kind of a decoded event, without its data.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventType {
    /// `MidiMessage::NoteOff`, including NoteOns decoded with a velocity of 0.
    NoteOff,
    /// `MidiMessage::NoteOn`.
    NoteOn,
    /// `MidiMessage::Aftertouch`, the pressure on a single key.
    NoteAftertouch,
    /// `MidiMessage::Controller`.
    Controller,
    /// `MidiMessage::ProgramChange`.
    ProgramChange,
    /// `MidiMessage::ChannelAftertouch`.
    ChannelAftertouch,
    /// `MidiMessage::PitchBend`.
    PitchBend,
    /// Any recognized meta event.
    Meta,
}

/// A tempo change, as found in a Set Tempo meta event.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TempoEvent {
    /// Absolute tick of the tempo change within its track.
    pub tick: u64,
    /// Length of a quarter note, in microseconds.
    pub micros_per_quarter_note: u32,
}
impl TempoEvent {
    /// Beats (quarter notes) per minute.
    #[inline]
    pub fn bpm(&self) -> f64 {
        60_000_000.0 / f64::from(self.micros_per_quarter_note)
    }
}

/// Represents a MIDI message, usually associated to a MIDI channel.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MidiMessage {
    /// Stop playing a note.
    NoteOff {
        /// The MIDI key to stop playing.
        key: u7,
        /// The velocity with which to stop playing it.
        vel: u7,
    },
    /// Start playing a note.
    NoteOn {
        /// The key to start playing.
        key: u7,
        /// The velocity (strength) with which to press it.
        ///
        /// Decoded `NoteOn` messages never have a velocity of 0: by convention those are
        /// `NoteOff`s and are decoded as such.
        vel: u7,
    },
    /// Modify the velocity of a note after it has been played.
    Aftertouch {
        /// The key for which to modify its velocity.
        key: u7,
        /// The new velocity for the key.
        vel: u7,
    },
    /// Modify the value of a MIDI controller.
    Controller {
        /// The controller to modify.
        ///
        /// See the MIDI spec for the meaning of each index.
        controller: u7,
        /// The value to set it to.
        value: u7,
    },
    /// Change the program (also known as instrument) for a channel.
    ProgramChange {
        /// The new program (instrument) to use for the channel.
        program: u7,
    },
    /// Change the note velocity of a whole channel at once, without starting new notes.
    ChannelAftertouch {
        /// The new velocity for all notes currently playing in the channel.
        vel: u7,
    },
    /// Set the pitch bend value for the entire channel.
    PitchBend {
        /// The new pitch-bend value.
        bend: PitchBend,
    },
}
impl MidiMessage {
    /// Midi messages have a known length.
    pub(crate) fn msg_length(status: u8) -> usize {
        const LENGTH_BY_STATUS: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 2, 2, 2, 2, 1, 1, 2, 0];
        LENGTH_BY_STATUS[(status >> 4) as usize] as usize
    }

    /// Read the data bytes following a channel status byte.
    ///
    /// Panics if the `status` is not a MIDI message status (0x80..=0xEF).
    pub(crate) fn read(status: u8, raw: &mut ByteReader) -> Result<(u4, MidiMessage)> {
        let mut data = [u7::new(0); 2];
        for byte in data.iter_mut().take(Self::msg_length(status)) {
            *byte = u7::read_data(raw)?;
        }
        let channel = u4::from(status);
        let msg = match status >> 4 {
            0x8 => MidiMessage::NoteOff {
                key: data[0],
                vel: data[1],
            },
            0x9 => MidiMessage::NoteOn {
                key: data[0],
                vel: data[1],
            },
            0xA => MidiMessage::Aftertouch {
                key: data[0],
                vel: data[1],
            },
            0xB => MidiMessage::Controller {
                controller: data[0],
                value: data[1],
            },
            0xC => MidiMessage::ProgramChange { program: data[0] },
            0xD => MidiMessage::ChannelAftertouch { vel: data[0] },
            0xE => {
                //Note the little-endian order, contrasting with the default big-endian order of
                //Standard Midi Files
                let lsb = u16::from(data[0].as_int());
                let msb = u16::from(data[1].as_int());
                MidiMessage::PitchBend {
                    bend: PitchBend(u14::from(msb << 7 | lsb)),
                }
            }
            _ => panic!("parsed midi message before checking that status is in range"),
        };
        Ok((channel, msg))
    }

    /// Get the raw status nibble for this MIDI message type.
    pub(crate) fn status_nibble(&self) -> u8 {
        match self {
            MidiMessage::NoteOff { .. } => 0x8,
            MidiMessage::NoteOn { .. } => 0x9,
            MidiMessage::Aftertouch { .. } => 0xA,
            MidiMessage::Controller { .. } => 0xB,
            MidiMessage::ProgramChange { .. } => 0xC,
            MidiMessage::ChannelAftertouch { .. } => 0xD,
            MidiMessage::PitchBend { .. } => 0xE,
        }
    }

    /// The flat event type of this message.
    pub fn event_type(&self) -> EventType {
        match self {
            MidiMessage::NoteOff { .. } => EventType::NoteOff,
            MidiMessage::NoteOn { .. } => EventType::NoteOn,
            MidiMessage::Aftertouch { .. } => EventType::NoteAftertouch,
            MidiMessage::Controller { .. } => EventType::Controller,
            MidiMessage::ProgramChange { .. } => EventType::ProgramChange,
            MidiMessage::ChannelAftertouch { .. } => EventType::ChannelAftertouch,
            MidiMessage::PitchBend { .. } => EventType::PitchBend,
        }
    }

    /// Write a status byte (unless it matches `running_status`) followed by the data bytes.
    ///
    /// Pass `None` as running status on every call to always write the status explicitly.
    pub(crate) fn write(
        &self,
        channel: u4,
        running_status: &mut Option<u8>,
        out: &mut ByteWriter,
    ) {
        let status = self.status_nibble() << 4 | channel.as_int();
        if Some(status) != *running_status {
            out.write_bytes(&[status]);
        }
        *running_status = Some(status);
        match self {
            MidiMessage::NoteOff { key, vel }
            | MidiMessage::NoteOn { key, vel }
            | MidiMessage::Aftertouch { key, vel } => out.write_bytes(&[key.as_int(), vel.as_int()]),
            MidiMessage::Controller { controller, value } => {
                out.write_bytes(&[controller.as_int(), value.as_int()])
            }
            MidiMessage::ProgramChange { program } => out.write_bytes(&[program.as_int()]),
            MidiMessage::ChannelAftertouch { vel } => out.write_bytes(&[vel.as_int()]),
            MidiMessage::PitchBend { bend } => {
                let raw = bend.0.as_int();
                out.write_bytes(&[(raw & 0x7F) as u8, (raw >> 7) as u8])
            }
        }
    }
}

/// The value of a pitch bend, represented as 14 bits.
///
/// A value of `0x0000` indicates full bend downwards.
/// A value of `0x2000` (8192) indicates no bend.
/// A value of `0x3FFF` indicates full bend upwards.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PitchBend(pub u14);
impl PitchBend {
    /// The minimum value of `0x0000`, indicating full bend downwards.
    #[inline]
    pub const fn min_raw_value() -> PitchBend {
        PitchBend(u14::new(0x0000))
    }

    /// The middle value of `0x2000`, indicating no bend.
    #[inline]
    pub const fn mid_raw_value() -> PitchBend {
        PitchBend(u14::new(0x2000))
    }

    /// The maximum value of `0x3FFF`, indicating full bend upwards.
    #[inline]
    pub const fn max_raw_value() -> PitchBend {
        PitchBend(u14::new(0x3FFF))
    }

    /// Create a `PitchBend` value from an int in the range `[-0x2000, 0x1FFF]`.
    ///
    /// Integers outside this range will be clamped.
    #[inline]
    pub fn from_int(int: i16) -> PitchBend {
        PitchBend(u14::new((int.max(-0x2000).min(0x1FFF) + 0x2000) as u16))
    }

    /// The bend that shifts a note by `cents`, for a synthesizer whose bend range is
    /// `range_semitones` in each direction.
    ///
    /// One bend unit is worth `range_semitones * 100 / 8191` cents. Deviations beyond the range
    /// are clamped to full bend. A zero range always yields the centre value.
    pub fn from_cents(cents: f64, range_semitones: u8) -> PitchBend {
        if range_semitones == 0 || !cents.is_finite() {
            return PitchBend::mid_raw_value();
        }
        let cents_per_unit = f64::from(range_semitones) * 100.0 / 8191.0;
        let raw = (8192.0 + cents / cents_per_unit).round().max(0.0).min(16383.0);
        PitchBend(u14::new(raw as u16))
    }

    /// Returns an int in the range `[-0x2000, 0x1FFF]`.
    #[inline]
    pub fn as_int(self) -> i16 {
        self.0.as_int() as i16 - 0x2000
    }

    /// The deviation this bend applies, in cents, for a bend range of `range_semitones`.
    #[inline]
    pub fn as_cents(self, range_semitones: u8) -> f64 {
        f64::from(self.as_int()) * f64::from(range_semitones) * 100.0 / 8191.0
    }
}

/// A "meta message", as defined by the SMF spec.
/// These events carry metadata about the track, such as tempo, time signature, copyright, etc...
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MetaMessage {
    /// For `Format::Sequential` MIDI file types, `SequenceNumber` can be empty, and defaults to
    /// the track index.
    SequenceNumber(Option<u16>),
    /// Arbitrary text associated to an instant.
    Text(String),
    /// A copyright notice.
    Copyright(String),
    /// Information about the name of the track.
    TrackName(String),
    /// Information about the name of the current instrument.
    InstrumentName(String),
    /// Arbitrary lyric information associated to an instant.
    Lyric(String),
    /// Arbitrary marker text associated to an instant.
    Marker(String),
    /// Arbitrary cue point text associated to an instant.
    CuePoint(String),
    /// The MIDI channel that subsequent meta and SysEx events refer to.
    ChannelPrefix(u4),
    /// Obligatory at track end.
    EndOfTrack,
    /// Amount of microseconds per beat (quarter note).
    Tempo(u24),
    /// Raw hour, minute, second, frame and subframe bytes. SMPTE times are not resolved.
    SmpteOffset([u8; 5]),
    /// In order of the MIDI specification, numerator, denominator, MIDI clocks per click, 32nd
    /// notes per quarter
    TimeSignature(u8, u8, u8, u8),
    /// As in the MIDI specification, negative numbers indicate number of flats and positive
    /// numbers indicate number of sharps.
    /// `false` indicates a major scale, `true` indicates a minor scale.
    KeySignature(i8, bool),
    /// Arbitrary data intended for the sequencer.
    SequencerSpecific(Vec<u8>),
}
impl MetaMessage {
    /// Reads a meta message, not including the `0xFF` status.
    ///
    /// The whole payload is consumed according to its declared length. Unknown meta types, and
    /// known types whose payload is too short to interpret, yield `None`.
    pub(crate) fn read(raw: &mut ByteReader) -> Result<Option<MetaMessage>> {
        let type_byte = raw.read_u8()?;
        let len = raw.read_vlq()?.as_int() as usize;
        let mut data = raw.split_off(len)?;
        Ok(Some(match type_byte {
            0x00 => MetaMessage::SequenceNumber({
                if len >= 2 {
                    Some(data.read_u16()?)
                } else {
                    None
                }
            }),
            0x01 => MetaMessage::Text(data.read_fixed_text(len)?),
            0x02 => MetaMessage::Copyright(data.read_fixed_text(len)?),
            0x03 => MetaMessage::TrackName(data.read_fixed_text(len)?),
            0x04 => MetaMessage::InstrumentName(data.read_fixed_text(len)?),
            0x05 => MetaMessage::Lyric(data.read_fixed_text(len)?),
            0x06 => MetaMessage::Marker(data.read_fixed_text(len)?),
            0x07 => MetaMessage::CuePoint(data.read_fixed_text(len)?),
            0x20 if len >= 1 => MetaMessage::ChannelPrefix(u4::from(data.read_u8()?)),
            0x2F => MetaMessage::EndOfTrack,
            0x51 if len >= 3 => MetaMessage::Tempo(u24::from(data.read_uint(3)?)),
            0x54 if len >= 5 => {
                let mut smpte = [0; 5];
                smpte.copy_from_slice(data.read_bytes(5)?);
                MetaMessage::SmpteOffset(smpte)
            }
            0x58 if len >= 4 => MetaMessage::TimeSignature(
                data.read_u8()?,
                data.read_u8()?,
                data.read_u8()?,
                data.read_u8()?,
            ),
            0x59 if len >= 2 => {
                MetaMessage::KeySignature(data.read_u8()? as i8, data.read_u8()? != 0)
            }
            0x7F => MetaMessage::SequencerSpecific(data.read_bytes(len)?.to_vec()),
            _ => {
                trace!("skipping meta event 0x{:02X} ({} bytes)", type_byte, len);
                return Ok(None);
            }
        }))
    }

    /// Writes a meta message, including the `0xFF` status but not the delta time before it.
    ///
    /// Fails with `InvalidInput` if the payload is too long for a variable-length quantity.
    pub fn write(&self, out: &mut ByteWriter) -> Result<()> {
        let mut write_msg = |type_byte: u8, data: &[u8]| -> Result<()> {
            let len = u32::try_from(data.len())
                .map_err(|_| ErrorKind::InvalidInput("meta message exceeds 28 bits"))?;
            out.write_bytes(&[0xFF, type_byte]);
            out.write_vlq(len)?;
            out.write_bytes(data);
            Ok(())
        };
        match self {
            MetaMessage::SequenceNumber(seq_num) => match seq_num {
                None => write_msg(0x00, &[]),
                Some(seq_num) => write_msg(0x00, &seq_num.to_be_bytes()[..]),
            },
            MetaMessage::Text(text) => write_msg(0x01, text.as_bytes()),
            MetaMessage::Copyright(text) => write_msg(0x02, text.as_bytes()),
            MetaMessage::TrackName(text) => write_msg(0x03, text.as_bytes()),
            MetaMessage::InstrumentName(text) => write_msg(0x04, text.as_bytes()),
            MetaMessage::Lyric(text) => write_msg(0x05, text.as_bytes()),
            MetaMessage::Marker(text) => write_msg(0x06, text.as_bytes()),
            MetaMessage::CuePoint(text) => write_msg(0x07, text.as_bytes()),
            MetaMessage::ChannelPrefix(chan) => write_msg(0x20, &[chan.as_int()]),
            MetaMessage::EndOfTrack => write_msg(0x2F, &[]),
            MetaMessage::Tempo(microsperbeat) => {
                write_msg(0x51, &microsperbeat.as_int().to_be_bytes()[1..])
            }
            MetaMessage::SmpteOffset(smpte) => write_msg(0x54, &smpte[..]),
            MetaMessage::TimeSignature(num, den, ticksperclick, thirtysecondsperquarter) => {
                write_msg(
                    0x58,
                    &[*num, *den, *ticksperclick, *thirtysecondsperquarter],
                )
            }
            MetaMessage::KeySignature(sharps, minor) => {
                write_msg(0x59, &[*sharps as u8, *minor as u8])
            }
            MetaMessage::SequencerSpecific(data) => write_msg(0x7F, data),
        }
    }
}
