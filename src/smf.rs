//! Specific to the SMF packaging of MIDI streams.

use crate::{
    event::{EventBody, MetaMessage, MidiMessage, RawEvent, TempoEvent},
    pitch,
    prelude::*,
    primitive::{Format, Timing},
    tempo::TempoMap,
};
use std::collections::HashMap;

/// Length of the header chunk body.
const HEADER_LEN: u32 = 6;

/// The smallest buffer that can hold a header chunk and the tag of a track chunk.
const MIN_FILE_LEN: usize = 18;

/// Files smaller than this are always decoded on the calling thread.
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 16 * 1024;

/// The result of decoding a Standard Midi File.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Decoded {
    pub header: Header,
    /// Every channel voice and recognized meta event, in file order.
    ///
    /// Tracks are concatenated one after another, and the tick of each event is relative to the
    /// start of its own track. Use [`by_tick`](#method.by_tick) to interleave tracks.
    pub events: Vec<RawEvent>,
    /// Every Set Tempo event, in file order.
    pub tempos: Vec<TempoEvent>,
}
impl Decoded {
    /// Every `NoteOn` that was closed by a matching `NoteOff`, in file order.
    pub fn notes(&self) -> impl Iterator<Item = Note> + '_ {
        self.events.iter().filter_map(|ev| match (&ev.body, ev.duration) {
            (
                EventBody::Channel {
                    channel,
                    message: MidiMessage::NoteOn { key, vel },
                },
                Some(duration),
            ) => Some(Note {
                tick: ev.tick,
                duration,
                channel: *channel,
                key: *key,
                velocity: *vel,
            }),
            _ => None,
        })
    }

    /// The governing tempo in beats per minute: the first tempo change, or 120 if the file sets
    /// none.
    pub fn tempo(&self) -> f64 {
        self.tempos
            .first()
            .map(TempoEvent::bpm)
            .unwrap_or(TempoMap::DEFAULT_BPM)
    }

    /// All events sorted by tick, keeping file order between events at the same tick.
    ///
    /// This is the order in which a multi-track file should be played back.
    pub fn by_tick(&self) -> Vec<&RawEvent> {
        let mut events = self.events.iter().collect::<Vec<_>>();
        events.sort_by_key(|ev| ev.tick);
        events
    }

    /// Build a tick-to-seconds conversion from the tempo changes in this file.
    ///
    /// Fails with `UnsupportedTiming` for SMPTE timecode files.
    pub fn tempo_map(&self) -> Result<TempoMap> {
        TempoMap::new(&self.header, &self.tempos)
    }
}

/// A note reconstructed from a paired `NoteOn`/`NoteOff`.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Note {
    pub tick: u64,
    pub duration: u64,
    pub channel: u4,
    pub key: u7,
    pub velocity: u7,
}
impl Note {
    /// The equal-temperament frequency of this note's key, in Hz.
    #[inline]
    pub fn frequency(&self) -> f64 {
        pitch::note_to_frequency(f64::from(self.key.as_int()))
    }
}

/// Decode a complete Standard Midi File.
///
/// The whole file is decoded before returning: either every track decodes, or an error is
/// returned and nothing else.
pub fn decode(raw: &[u8]) -> Result<Decoded> {
    ensure!(
        raw.len() >= MIN_FILE_LEN,
        Error::at(0, ErrorKind::InvalidFormat("file too short to be a midi file"))
    );
    ensure!(
        &raw[..4] == b"MThd",
        Error::at(0, ErrorKind::InvalidFormat("missing MThd header tag"))
    );
    let mut reader = ByteReader::new(raw);
    let header = Header::read(&mut reader)?;
    debug!(
        "smf header: format {}, {} tracks, {:?}",
        header.format.as_int(),
        header.track_count,
        header.timing
    );
    let chunks = track_chunks(&mut reader, header.track_count)?;
    let mut events = Vec::new();
    let mut tempos = Vec::new();
    for (track_events, track_tempos) in decode_tracks(chunks, raw.len())? {
        events.extend(track_events);
        tempos.extend(track_tempos);
    }
    Ok(Decoded {
        header,
        events,
        tempos,
    })
}

/// Walk the chunks after the header, collecting the bodies of the declared amount of tracks.
fn track_chunks<'a>(raw: &mut ByteReader<'a>, track_count: u16) -> Result<Vec<ByteReader<'a>>> {
    let mut tracks = Vec::with_capacity(track_count as usize);
    while tracks.len() < track_count as usize {
        if raw.is_empty() {
            if cfg!(feature = "strict") {
                bail!(Error::at(
                    raw.position(),
                    ErrorKind::Malformed("file has less tracks than declared")
                ));
            }
            warn!(
                "file declares {} tracks but only contains {}",
                track_count,
                tracks.len()
            );
            break;
        }
        let at = raw.position();
        let id = raw
            .read_bytes(4)
            .map_err(|_| Error::at(at, ErrorKind::TruncatedInput("chunk tag")))?;
        let len = raw
            .read_u32()
            .map_err(|_| Error::at(at, ErrorKind::TruncatedInput("chunk length")))?;
        let body = raw.split_off(len as usize)?;
        match id {
            b"MTrk" => tracks.push(body),
            b"MThd" if cfg!(feature = "strict") => {
                bail!(Error::at(at, ErrorKind::Malformed("found duplicate header")))
            }
            _ if cfg!(feature = "strict") => {
                bail!(Error::at(at, ErrorKind::Malformed("unknown chunk type")))
            }
            //Alien chunks are skipped
            _ => trace!("skipping {} byte chunk {:?} at byte {}", len, id, at),
        }
    }
    if !raw.is_empty() {
        debug!("ignoring {} bytes after the last track", raw.remaining());
    }
    Ok(tracks)
}

type TrackOutput = (Vec<RawEvent>, Vec<TempoEvent>);

fn decode_tracks(chunks: Vec<ByteReader>, file_len: usize) -> Result<Vec<TrackOutput>> {
    //Attempt to use multiple threads if possible and enabled
    #[cfg(feature = "parallel")]
    {
        if file_len >= PARALLEL_THRESHOLD && chunks.len() > 1 {
            use rayon::prelude::*;

            return chunks
                .into_par_iter()
                .map(|chunk| TrackDecoder::from_reader(chunk).decode_all())
                .collect();
        }
    }
    //Fall back to single-threaded
    let _ = file_len;
    chunks
        .into_iter()
        .map(|chunk| TrackDecoder::from_reader(chunk).decode_all())
        .collect()
}

/// A MIDI file header.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    pub format: Format,
    /// The amount of tracks declared by the header.
    pub track_count: u16,
    pub timing: Timing,
}
impl Header {
    pub fn new(format: Format, track_count: u16, timing: Timing) -> Header {
        Header {
            format,
            track_count,
            timing,
        }
    }

    /// Ticks per quarter note, or `0` if the file uses SMPTE timecode.
    #[inline]
    pub fn ticks_per_quarter_note(&self) -> u16 {
        self.timing.ticks_per_quarter_note()
    }

    /// Read the whole header chunk, tag included.
    fn read(raw: &mut ByteReader) -> Result<Header> {
        let at = raw.position();
        ensure!(
            raw.read_bytes(4)? == b"MThd",
            Error::at(at, ErrorKind::InvalidFormat("missing MThd header tag"))
        );
        let len_at = raw.position();
        let len = raw.read_u32()?;
        ensure!(
            len == HEADER_LEN,
            Error::at(len_at, ErrorKind::InvalidHeaderLength(len))
        );
        let format = Format::read(raw)?;
        let track_count = raw.read_u16()?;
        let timing = Timing::read(raw)?;
        Ok(Header::new(format, track_count, timing))
    }

    /// Write the whole header chunk, tag included.
    pub(crate) fn write(&self, out: &mut ByteWriter) {
        out.write_fixed_text("MThd");
        out.write_uint(4, HEADER_LEN);
        out.write_uint(2, u32::from(self.format.as_int()));
        out.write_uint(2, u32::from(self.track_count));
        out.write_uint(2, u32::from(self.timing.encode()));
    }
}

/// Decoding state for a single track chunk.
///
/// Holds everything carried from one event to the next: the running status, the absolute tick
/// counter and the `NoteOn`s still waiting for their `NoteOff`. Each call to
/// [`step`](#method.step) decodes exactly one event.
#[derive(Clone, Debug)]
pub struct TrackDecoder<'a> {
    raw: ByteReader<'a>,
    tick: u64,
    running_status: Option<u8>,
    events: Vec<RawEvent>,
    tempos: Vec<TempoEvent>,
    /// Indices into `events` of open `NoteOn`s, most recent last.
    open_notes: HashMap<(u4, u7), Vec<usize>>,
}
impl<'a> TrackDecoder<'a> {
    /// Start decoding the body of a track chunk (the bytes after the chunk length).
    pub fn new(raw: &'a [u8]) -> TrackDecoder<'a> {
        TrackDecoder::from_reader(ByteReader::new(raw))
    }

    pub(crate) fn from_reader(raw: ByteReader<'a>) -> TrackDecoder<'a> {
        TrackDecoder {
            raw,
            tick: 0,
            running_status: None,
            events: Vec::with_capacity(raw.remaining() / 3),
            tempos: Vec::new(),
            open_notes: HashMap::new(),
        }
    }

    /// The absolute tick of the last decoded event.
    #[inline]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Get the current running status of the track.
    #[inline]
    pub fn running_status(&self) -> Option<u8> {
        self.running_status
    }

    /// The events decoded so far.
    #[inline]
    pub fn events(&self) -> &[RawEvent] {
        &self.events
    }

    /// The tempo changes decoded so far.
    #[inline]
    pub fn tempos(&self) -> &[TempoEvent] {
        &self.tempos
    }

    /// Decode the next event.
    ///
    /// Returns `false` once the track body is exhausted. In case of failure the decoder might be
    /// left in the middle of an event and should be dropped.
    pub fn step(&mut self) -> Result<bool> {
        if self.raw.is_empty() {
            return Ok(false);
        }
        let delta = self.raw.read_vlq()?;
        self.tick += u64::from(delta.as_int());
        let at = self.raw.position();
        let mut status = self.raw.read_u8()?;
        if status < 0x80 {
            //Running status!
            let data_byte = status;
            status = self
                .running_status
                .ok_or_else(|| Error::at(at, ErrorKind::UnknownEventType(data_byte)))?;
            self.raw.rewind(1);
        }
        match status {
            0x80..=0xEF => {
                self.running_status = Some(status);
                let (channel, message) = MidiMessage::read(status, &mut self.raw)?;
                let message = match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
                        MidiMessage::NoteOff { key, vel }
                    }
                    message => message,
                };
                self.push_channel(channel, message);
            }
            0xFF => {
                if cfg!(feature = "strict") {
                    self.running_status = None;
                }
                if let Some(meta) = MetaMessage::read(&mut self.raw)? {
                    self.push_meta(meta);
                }
            }
            0xF0 | 0xF7 => {
                if cfg!(feature = "strict") {
                    self.running_status = None;
                }
                let len = self.raw.read_vlq()?.as_int();
                self.raw.split_off(len as usize)?;
                trace!("skipping sysex event ({} bytes) at byte {}", len, at);
            }
            _ => bail!(Error::at(at, ErrorKind::UnknownEventType(status))),
        }
        Ok(true)
    }

    fn push_channel(&mut self, channel: u4, message: MidiMessage) {
        let idx = self.events.len();
        match message {
            MidiMessage::NoteOn { key, .. } => {
                self.open_notes.entry((channel, key)).or_default().push(idx);
            }
            MidiMessage::NoteOff { key, .. } => {
                let (events, tick) = (&self.events, self.tick);
                let closed = self.open_notes.get_mut(&(channel, key)).and_then(|open| {
                    //A NoteOn on this very tick starts the next note, unless it is the only one
                    let pos = open
                        .iter()
                        .rposition(|&on| events[on].tick < tick)
                        .or_else(|| open.len().checked_sub(1))?;
                    Some(open.remove(pos))
                });
                match closed {
                    Some(on) => {
                        let note_on = &mut self.events[on];
                        note_on.duration = Some(self.tick - note_on.tick);
                    }
                    None => trace!(
                        "note off without note on (channel {}, key {}) at tick {}",
                        channel,
                        key,
                        self.tick
                    ),
                }
            }
            _ => {}
        }
        self.events.push(RawEvent::new(
            self.tick,
            EventBody::Channel { channel, message },
        ));
    }

    fn push_meta(&mut self, meta: MetaMessage) {
        if let MetaMessage::Tempo(micros) = meta {
            if micros.as_int() > 0 {
                self.tempos.push(TempoEvent {
                    tick: self.tick,
                    micros_per_quarter_note: micros.as_int(),
                });
            } else {
                warn!("ignoring zero tempo at tick {}", self.tick);
            }
        }
        self.events.push(RawEvent::new(self.tick, EventBody::Meta(meta)));
    }

    /// Decode every remaining event and hand out the results.
    pub fn decode_all(mut self) -> Result<(Vec<RawEvent>, Vec<TempoEvent>)> {
        while self.step()? {}
        Ok(self.finish())
    }

    /// Stop decoding and hand out the events and tempo changes decoded so far.
    pub fn finish(self) -> (Vec<RawEvent>, Vec<TempoEvent>) {
        let open = self.open_notes.values().map(Vec::len).sum::<usize>();
        if open > 0 {
            warn!("{} notes left open at the end of the track", open);
        }
        (self.events, self.tempos)
    }
}
