//! # Overview
//!
//! `smfcodec` reads Standard Midi Files (SMF, `.mid`) into a flat list of timed events with
//! note durations already reconstructed, and writes lists of notes back out as single-track
//! SMF files, optionally with an independent pitch bend per note.
//!
//! Decoding is as simple as:
//!
//! ```rust
//! # let bytes = smfcodec::encode(
//! #     &[smfcodec::NoteRecord::new(0.0, smfcodec::NoteLength::Beats(1.0), smfcodec::Pitch::Note(60), 100)],
//! #     120.0,
//! #     480,
//! # ).unwrap();
//! let decoded = smfcodec::decode(&bytes).unwrap();
//!
//! for note in decoded.notes() {
//!     println!("key {} at tick {} for {} ticks", note.key, note.tick, note.duration);
//! }
//! ```
//!
//! The [`decode`](fn.decode.html) function returns a [`Decoded`](struct.Decoded.html) value
//! holding the header, every channel and meta event in file order, and the tempo changes.
//!
//! # Writing Standard Midi Files
//!
//! The encoder takes [`NoteRecord`](struct.NoteRecord.html)s positioned in beats and produces
//! the bytes of a complete format 0 file:
//!
//! ```rust
//! use smfcodec::{encode_with, EncodeOptions, NoteLength, NoteRecord, Pitch};
//!
//! let notes = [
//!     NoteRecord::new(0.0, NoteLength::Seconds(0.5), Pitch::Hz(440.0), 100),
//!     NoteRecord::new(1.0, NoteLength::Seconds(0.5), Pitch::Hz(452.0), 100),
//! ];
//! let options = EncodeOptions::new(120.0, 480).with_pitch_bend(2);
//! let bytes = encode_with(&notes, &options).unwrap();
//! assert_eq!(&bytes[..4], b"MThd");
//! ```
//!
//! When pitch bending is enabled every note gets its own channel from a round-robin pool, so
//! that simultaneous notes can be bent independently.
//! For live output the same pool is available as [`ChannelPool`](struct.ChannelPool.html).
//!
//! # About features
//!
//! - The `parallel` feature (enabled by default)
//!
//!   Decodes track chunks on the `rayon` thread pool. Tiny files are always decoded on the
//!   calling thread. The output is identical either way.
//!
//! - The `strict` feature
//!
//!   By default the decoder tolerates files that are slightly off-standard: data bytes with the
//!   top bit set are masked, unknown chunks are skipped and a file holding fewer tracks than
//!   declared is accepted. With `strict` these raise `ErrorKind::Malformed` errors instead.
//!
//! - The `serde` feature derives `Serialize` and `Deserialize` on the public data types.
//!
//! - The `cli` feature builds the `smfinfo` command line tool.

macro_rules! bail {
    ($err:expr) => {{
        return Err($err.into());
    }};
}
macro_rules! ensure {
    ($cond:expr, $err:expr) => {{
        if !$cond {
            bail!($err)
        }
    }};
}

/// All of the errors this crate produces.
mod error;

mod prelude {
    pub(crate) use crate::{
        cursor::{ByteReader, ByteWriter},
        error::{Error, ErrorKind, Result},
        primitive::{u14, u15, u24, u28, u4, u7},
    };
    pub(crate) use core::{convert::TryFrom, fmt};
    pub(crate) use log::{debug, trace, warn};
}

pub mod cursor;
mod encode;
mod event;
pub mod pitch;
mod pool;
mod primitive;
mod smf;
mod tempo;

pub use crate::{
    encode::{encode, encode_with, EncodeOptions, NoteLength, NoteRecord, Pitch},
    error::{Error, ErrorKind, Result},
    event::{EventBody, EventType, MetaMessage, MidiMessage, PitchBend, RawEvent, TempoEvent},
    pool::{ChannelLease, ChannelPool, ReleaseToken, SharedChannelPool, PERCUSSION_CHANNEL},
    primitive::{Format, Fps, Timing},
    smf::{decode, Decoded, Header, Note, TrackDecoder},
    tempo::TempoMap,
};

/// Exotically-sized integers used by the MIDI standard.
pub mod num {
    pub use crate::primitive::{u14, u15, u24, u28, u4, u7};
}

#[cfg(test)]
mod test;
