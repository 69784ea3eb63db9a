use crate::{
    cursor::{ByteReader, ByteWriter},
    decode, encode, encode_with,
    num::{u14, u24, u4, u7},
    pitch, ChannelPool, Decoded, EncodeOptions, ErrorKind, EventBody, EventType, Format, Fps,
    MetaMessage, MidiMessage, NoteLength, NoteRecord, Pitch, PitchBend, SharedChannelPool,
    TempoMap, Timing, TrackDecoder, PERCUSSION_CHANNEL,
};

/// End of Track, with a zero delta.
const EOT: [u8; 4] = [0x00, 0xFF, 0x2F, 0x00];

/// Build a track body out of raw bytes, closed by an End of Track event.
macro_rules! track {
    ($($byte:expr),* $(,)?) => {{
        let mut body: Vec<u8> = vec![$($byte),*];
        body.extend_from_slice(&EOT);
        body
    }};
}

/// Wrap track bodies into a complete file.
fn smf<T: AsRef<[u8]>>(format: u16, division: u16, tracks: &[T]) -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(b"MThd");
    raw.extend_from_slice(&6u32.to_be_bytes());
    raw.extend_from_slice(&format.to_be_bytes());
    raw.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    raw.extend_from_slice(&division.to_be_bytes());
    for track in tracks {
        let track = track.as_ref();
        raw.extend_from_slice(b"MTrk");
        raw.extend_from_slice(&(track.len() as u32).to_be_bytes());
        raw.extend_from_slice(track);
    }
    raw
}

/// `(tick, duration, channel, key, velocity)` of every paired note.
fn notes(decoded: &Decoded) -> Vec<(u64, u64, u8, u8, u8)> {
    decoded
        .notes()
        .map(|note| {
            (
                note.tick,
                note.duration,
                note.channel.as_int(),
                note.key.as_int(),
                note.velocity.as_int(),
            )
        })
        .collect()
}

/// `(tick, channel, message)` of every channel event.
fn messages(decoded: &Decoded) -> Vec<(u64, u8, MidiMessage)> {
    decoded
        .events
        .iter()
        .filter_map(|ev| match ev.body {
            EventBody::Channel { channel, message } => Some((ev.tick, channel.as_int(), message)),
            EventBody::Meta(_) => None,
        })
        .collect()
}

fn note_on(key: u8, vel: u8) -> MidiMessage {
    MidiMessage::NoteOn {
        key: u7::new(key),
        vel: u7::new(vel),
    }
}

fn note_off(key: u8) -> MidiMessage {
    MidiMessage::NoteOff {
        key: u7::new(key),
        vel: u7::new(0),
    }
}

fn beat_note(start: f64, key: u8) -> NoteRecord {
    NoteRecord::new(start, NoteLength::Beats(1.0), Pitch::Note(key), 100)
}

mod cursor {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn vlq_groups() {
        let cases: &[(u32, &[u8])] = &[
            (0, &[0x00]),
            (0x40, &[0x40]),
            (0x7F, &[0x7F]),
            (0x80, &[0x81, 0x00]),
            (0x2000, &[0xC0, 0x00]),
            (0x3FFF, &[0xFF, 0x7F]),
            (0x4000, &[0x81, 0x80, 0x00]),
            (0x1F_FFFF, &[0xFF, 0xFF, 0x7F]),
            (0x20_0000, &[0x81, 0x80, 0x80, 0x00]),
            (0x0FFF_FFFF, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];
        for &(value, bytes) in cases {
            let mut out = ByteWriter::new();
            out.write_vlq(value).unwrap();
            assert_eq!(out.as_slice(), bytes, "writing {:#x}", value);
            let mut raw = ByteReader::new(bytes);
            assert_eq!(raw.read_vlq().unwrap().as_int(), value);
            assert!(raw.is_empty());
        }
    }

    #[test]
    fn vlq_too_wide() {
        let mut out = ByteWriter::new();
        let err = out.write_vlq(0x1000_0000).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput("variable-length quantity exceeds 28 bits"));
        assert_eq!(out.position(), 0);

        let mut raw = ByteReader::new(&[0x00, 0x81, 0x80, 0x80, 0x80, 0x00]);
        raw.read_u8().unwrap();
        let err = raw.read_vlq().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedVlq);
        assert_eq!(err.offset(), Some(1));
    }

    #[test]
    fn vlq_truncated() {
        let mut raw = ByteReader::new(&[0x81, 0x80]);
        assert!(matches!(
            raw.read_vlq().unwrap_err().kind(),
            ErrorKind::TruncatedInput(_)
        ));
    }

    #[test]
    fn integers_and_text() {
        let mut raw = ByteReader::new(b"MTrk\x07\xA1\x20\x00\x00\x01\xE0\x12\x34");
        assert_eq!(raw.read_fixed_text(4).unwrap(), "MTrk");
        assert_eq!(raw.read_uint(3).unwrap(), 500_000);
        assert_eq!(raw.read_u32().unwrap(), 480);
        assert_eq!(raw.peek_u8(), Some(0x12));
        assert_eq!(raw.read_u16().unwrap(), 0x1234);
        assert_eq!(raw.position(), 13);
        raw.rewind(2);
        assert_eq!(raw.read_u8().unwrap(), 0x12);
        let err = raw.read_u16().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TruncatedInput(_)));
        assert_eq!(err.offset(), Some(12));
    }

    #[test]
    fn sub_readers_keep_offsets() {
        let mut raw = ByteReader::new(&[1, 2, 3, 4, 5, 6]);
        raw.read_u16().unwrap();
        let mut sub = raw.split_off(3).unwrap();
        assert_eq!(raw.unread(), &[6u8]);
        assert_eq!(sub.position(), 2);
        sub.read_bytes(3).unwrap();
        let err = sub.read_u8().unwrap_err();
        assert_eq!(err.offset(), Some(5));
        assert!(raw.split_off(2).is_err());
    }

    #[test]
    fn writer_patches_lengths() {
        let mut out = ByteWriter::with_capacity(16);
        out.write_fixed_text("MTrk");
        let len_at = out.position();
        out.write_uint(4, 0);
        out.write_uint(3, 500_000);
        out.patch_u32(len_at, 3).unwrap();
        assert_eq!(out.into_inner(), b"MTrk\x00\x00\x00\x03\x07\xA1\x20".to_vec());
    }
}

mod decode {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn running_status() {
        let body = track![
            0x00, 0x90, 60, 100, //
            0x60, 62, 100, //
            0x60, 0x80, 60, 0, //
            0x00, 62, 0,
        ];
        let decoded = decode(&smf(0, 96, &[&body])).unwrap();
        assert_eq!(
            messages(&decoded),
            vec![
                (0, 0, note_on(60, 100)),
                (96, 0, note_on(62, 100)),
                (192, 0, MidiMessage::NoteOff {
                    key: u7::new(60),
                    vel: u7::new(0)
                }),
                (192, 0, note_off(62)),
            ]
        );
        assert_eq!(
            notes(&decoded),
            vec![(0, 192, 0, 60, 100), (96, 96, 0, 62, 100)]
        );
        assert_eq!(decoded.events.last().unwrap().tick, 192);
        assert_eq!(decoded.events.last().unwrap().event_type(), EventType::Meta);
    }

    #[test]
    fn zero_velocity_note_on_closes() {
        let body = track![0x00, 0x93, 64, 90, 0x30, 64, 0];
        let decoded = decode(&smf(0, 96, &[&body])).unwrap();
        assert_eq!(decoded.events[1].event_type(), EventType::NoteOff);
        assert_eq!(decoded.events[1].channel(), Some(u4::new(3)));
        assert_eq!(notes(&decoded), vec![(0, 48, 3, 64, 90)]);
    }

    #[test]
    fn most_recent_note_on_is_closed_first() {
        let body = track![
            0x00, 0x90, 60, 100, //
            0x0A, 0x90, 60, 80, //
            0x0A, 0x80, 60, 0, //
            0x0A, 0x80, 60, 0,
        ];
        let decoded = decode(&smf(0, 96, &[&body])).unwrap();
        assert_eq!(decoded.events[0].duration, Some(30));
        assert_eq!(decoded.events[1].duration, Some(10));
    }

    #[test]
    fn note_on_at_the_same_tick_is_not_closed() {
        //A repeated key: the next NoteOn comes before the NoteOff ending the previous note
        let body = track![
            0x00, 0x90, 60, 100, //
            0x60, 0x90, 60, 90, //
            0x00, 0x80, 60, 0, //
            0x60, 0x80, 60, 0, //
            0x00, 0x90, 62, 80, //
            0x00, 0x80, 62, 0,
        ];
        let decoded = decode(&smf(0, 96, &[&body])).unwrap();
        assert_eq!(
            notes(&decoded),
            vec![
                (0, 96, 0, 60, 100),
                (96, 96, 0, 60, 90),
                (192, 0, 0, 62, 80)
            ]
        );
    }

    #[test]
    fn unmatched_events_are_kept() {
        let body = track![
            0x00, 0x80, 50, 0, //
            0x00, 0x91, 60, 100, //
            0x10, 0x81, 61, 0,
        ];
        let decoded = decode(&smf(0, 96, &[&body])).unwrap();
        assert_eq!(decoded.events.len(), 4);
        assert!(decoded.events[1].is_open_note());
        assert_eq!(decoded.events[0].duration, None);
        assert!(notes(&decoded).is_empty());
    }

    #[test]
    fn pairing_is_per_channel() {
        let body = track![
            0x00, 0x90, 60, 100, //
            0x00, 0x91, 60, 100, //
            0x08, 0x81, 60, 0, //
            0x08, 0x80, 60, 0,
        ];
        let decoded = decode(&smf(0, 96, &[&body])).unwrap();
        assert_eq!(
            notes(&decoded),
            vec![(0, 16, 0, 60, 100), (0, 8, 1, 60, 100)]
        );
    }

    #[test]
    fn other_channel_messages() {
        let body = track![
            0x00, 0xB2, 7, 100, //
            0x00, 0xC2, 5, //
            0x00, 0xD2, 40, //
            0x00, 0xE2, 0x00, 0x40, //
            0x00, 0xA2, 60, 20,
        ];
        let decoded = decode(&smf(0, 96, &[&body])).unwrap();
        let kinds = decoded
            .events
            .iter()
            .map(|ev| ev.event_type())
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                EventType::Controller,
                EventType::ProgramChange,
                EventType::ChannelAftertouch,
                EventType::PitchBend,
                EventType::NoteAftertouch,
                EventType::Meta,
            ]
        );
        assert_eq!(
            decoded.events[3].message(),
            Some(&MidiMessage::PitchBend {
                bend: PitchBend::mid_raw_value()
            })
        );
    }

    #[test]
    fn tempo_changes() {
        let body = track![
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, //
            0x83, 0x60, 0xFF, 0x51, 0x03, 0x0F, 0x42, 0x40,
        ];
        let decoded = decode(&smf(0, 480, &[&body])).unwrap();
        let tempos = decoded
            .tempos
            .iter()
            .map(|tempo| (tempo.tick, tempo.micros_per_quarter_note))
            .collect::<Vec<_>>();
        assert_eq!(tempos, vec![(0, 500_000), (480, 1_000_000)]);
        assert_eq!(decoded.tempo(), 120.0);
        assert_eq!(decoded.tempos[1].bpm(), 60.0);
        let map = decoded.tempo_map().unwrap();
        assert!((map.seconds_at(960) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn zero_tempo_is_ignored() {
        let body = track![0x00, 0xFF, 0x51, 0x03, 0x00, 0x00, 0x00];
        let decoded = decode(&smf(0, 480, &[&body])).unwrap();
        assert!(decoded.tempos.is_empty());
        assert_eq!(decoded.tempo(), TempoMap::DEFAULT_BPM);
        assert_eq!(decoded.events.len(), 2);
    }

    #[test]
    fn meta_messages() {
        let body = track![
            0x00, 0xFF, 0x03, 0x04, b'l', b'e', b'a', b'd', //
            0x00, 0xFF, 0x58, 0x04, 4, 2, 24, 8, //
            0x00, 0xFF, 0x59, 0x02, 0xFE, 1, //
            0x00, 0xFF, 0x60, 0x02, 0xAA, 0xBB,
        ];
        let decoded = decode(&smf(0, 96, &[&body])).unwrap();
        let metas = decoded
            .events
            .iter()
            .filter_map(|ev| ev.meta().cloned())
            .collect::<Vec<_>>();
        assert_eq!(
            metas,
            vec![
                MetaMessage::TrackName("lead".to_string()),
                MetaMessage::TimeSignature(4, 2, 24, 8),
                MetaMessage::KeySignature(-2, true),
                MetaMessage::EndOfTrack,
            ]
        );
    }

    #[test]
    fn every_meta_kind_is_written_back() {
        let metas = vec![
            MetaMessage::SequenceNumber(None),
            MetaMessage::SequenceNumber(Some(513)),
            MetaMessage::Text("text".to_string()),
            MetaMessage::Copyright("(c) nobody".to_string()),
            MetaMessage::TrackName("lead".to_string()),
            MetaMessage::InstrumentName("flute".to_string()),
            MetaMessage::Lyric("la".to_string()),
            MetaMessage::Marker("chorus".to_string()),
            MetaMessage::CuePoint("door slams".to_string()),
            MetaMessage::ChannelPrefix(u4::new(7)),
            MetaMessage::Tempo(u24::new(428_571)),
            MetaMessage::SmpteOffset([1, 2, 3, 4, 5]),
            MetaMessage::TimeSignature(6, 3, 36, 8),
            MetaMessage::KeySignature(3, false),
            MetaMessage::SequencerSpecific(vec![0x00, 0x21, 0x09]),
            MetaMessage::EndOfTrack,
        ];
        let mut out = ByteWriter::new();
        for meta in &metas {
            out.write_vlq(0).unwrap();
            meta.write(&mut out).unwrap();
        }
        let decoded = decode(&smf(0, 96, &[out.as_slice()])).unwrap();
        let got = decoded
            .events
            .iter()
            .filter_map(|ev| ev.meta().cloned())
            .collect::<Vec<_>>();
        assert_eq!(got, metas);
        assert_eq!(decoded.tempos[0].micros_per_quarter_note, 428_571);
    }

    #[test]
    fn sysex_is_skipped() {
        let body = track![
            0x00, 0xF0, 0x03, 0x7E, 0x09, 0xF7, //
            0x00, 0xF7, 0x01, 0xF7, //
            0x00, 0x90, 60, 100, //
            0x10, 0x80, 60, 0,
        ];
        let decoded = decode(&smf(0, 96, &[&body])).unwrap();
        assert_eq!(decoded.events.len(), 3);
        assert_eq!(notes(&decoded), vec![(0, 16, 0, 60, 100)]);
    }

    #[test]
    fn tracks_are_concatenated() {
        let first = track![0x00, 0x90, 60, 100, 0x60, 0x80, 60, 0];
        let second = track![0x30, 0x91, 62, 100, 0x60, 0x81, 62, 0];
        let decoded = decode(&smf(1, 96, &[&first, &second])).unwrap();
        assert_eq!(decoded.header.format, Format::Parallel);
        assert_eq!(decoded.header.track_count, 2);
        let ticks = decoded.events.iter().map(|ev| ev.tick).collect::<Vec<_>>();
        assert_eq!(ticks, vec![0, 96, 96, 48, 144, 144]);
        assert_eq!(
            notes(&decoded),
            vec![(0, 96, 0, 60, 100), (48, 96, 1, 62, 100)]
        );
        let ticks = decoded
            .by_tick()
            .iter()
            .map(|ev| (ev.tick, ev.event_type()))
            .collect::<Vec<_>>();
        assert_eq!(
            ticks,
            vec![
                (0, EventType::NoteOn),
                (48, EventType::NoteOn),
                (96, EventType::NoteOff),
                (96, EventType::Meta),
                (144, EventType::NoteOff),
                (144, EventType::Meta),
            ]
        );
    }

    #[test]
    fn notes_do_not_pair_across_tracks() {
        let first = track![0x00, 0x90, 60, 100];
        let second = track![0x10, 0x80, 60, 0];
        let decoded = decode(&smf(1, 96, &[&first, &second])).unwrap();
        assert!(decoded.events[0].is_open_note());
        assert!(notes(&decoded).is_empty());
    }

    #[test]
    fn smpte_timing() {
        let body = track![];
        let decoded = decode(&smf(0, 0xE728, &[&body])).unwrap();
        assert_eq!(decoded.header.timing, Timing::Timecode(Fps::Fps25, 40));
        assert_eq!(decoded.header.ticks_per_quarter_note(), 0);
        assert_eq!(
            decoded.tempo_map().unwrap_err().kind(),
            ErrorKind::UnsupportedTiming
        );
    }

    #[test]
    fn unusual_smpte_rates() {
        let decoded = decode(&smf(0, 0x8100, &[track![]])).unwrap();
        assert_eq!(decoded.header.timing, Timing::Timecode(Fps::Other(127), 0));
        assert_eq!(decoded.header.ticks_per_quarter_note(), 0);
        assert_eq!(
            decoded.tempo_map().unwrap_err().kind(),
            ErrorKind::UnsupportedTiming
        );

        //The frame byte is written back as found
        let mut out = ByteWriter::new();
        decoded.header.write(&mut out);
        assert_eq!(&out.as_slice()[12..], &[0x81, 0x00]);
        let decoded = decode(&smf(0, 0x8000, &[track![]])).unwrap();
        assert_eq!(decoded.header.timing, Timing::Timecode(Fps::Other(128), 0));
    }

    #[test]
    fn invalid_files() {
        let err = decode(b"MThd\x00\x00\x00\x06").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidFormat(_)));
        assert_eq!(err.offset(), Some(0));

        let mut riff = smf(0, 96, &[&track![]]);
        riff[..4].copy_from_slice(b"RIFF");
        assert!(matches!(
            decode(&riff).unwrap_err().kind(),
            ErrorKind::InvalidFormat(_)
        ));

        let mut bad_format = smf(0, 96, &[&track![]]);
        bad_format[9] = 3;
        assert!(matches!(
            decode(&bad_format).unwrap_err().kind(),
            ErrorKind::InvalidFormat(_)
        ));
    }

    #[test]
    fn invalid_header_length() {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"MThd\x00\x00\x00\x07");
        raw.extend_from_slice(&[0, 0, 0, 1, 0, 96, 0]);
        raw.extend_from_slice(b"MTrk\x00\x00\x00\x00");
        let err = decode(&raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHeaderLength(7));
        assert_eq!(err.offset(), Some(4));
    }

    #[test]
    fn unknown_status() {
        //Data byte with no running status, right at the start of the track body
        let err = decode(&smf(0, 96, &[&[0x00u8, 0x3C, 0x40]])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownEventType(0x3C));
        assert_eq!(err.offset(), Some(23));

        let err = decode(&smf(0, 96, &[&track![0x00, 0xF4]])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownEventType(0xF4));
    }

    #[test]
    fn truncated_input() {
        let err = decode(&smf(0, 96, &[&[0x00u8, 0x90, 0x3C]])).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TruncatedInput(_)));

        let mut raw = smf(0, 96, &[&track![]]);
        raw[21] = 100;
        let err = decode(&raw).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TruncatedInput(_)));

        let err = decode(&smf(0, 96, &[&[0x81u8, 0x80, 0x80, 0x80, 0x00]])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedVlq);
        assert_eq!(err.offset(), Some(22));
    }

    #[test]
    fn large_files_decode_the_same() {
        //Enough tracks to cross the parallel decoding threshold
        let mut body = Vec::new();
        for i in 0..1000u32 {
            let key = (i % 128) as u8;
            body.extend_from_slice(&[0x00, 0x90, key, 100, 0x10, 0x80, key, 0]);
        }
        body.extend_from_slice(&EOT);
        let tracks = vec![&body[..]; 4];
        let decoded = decode(&smf(1, 96, &tracks)).unwrap();
        assert_eq!(decoded.events.len(), 4 * 2001);
        assert_eq!(decoded.notes().count(), 4000);
        assert!(decoded.notes().all(|note| note.duration == 16));
        assert_eq!(decoded.events[2001].tick, 0);
    }

    #[test]
    fn track_decoder_steps() {
        let body = track![0x00, 0x90, 60, 100, 0x20, 60, 0];
        let mut track = TrackDecoder::new(&body);
        assert!(track.step().unwrap());
        assert_eq!(track.running_status(), Some(0x90));
        assert!(track.step().unwrap());
        assert_eq!(track.tick(), 32);
        assert_eq!(track.events()[0].duration, Some(32));
        assert!(track.step().unwrap());
        assert!(!track.step().unwrap());
        let (events, tempos) = track.finish();
        assert_eq!(events.len(), 3);
        assert!(tempos.is_empty());
    }

    #[cfg(not(feature = "strict"))]
    mod lenient {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn running_status_survives_meta() {
            let body = track![0x00, 0x90, 60, 100, 0x00, 0xFF, 0x01, 0x00, 0x10, 60, 0];
            let decoded = decode(&smf(0, 96, &[&body])).unwrap();
            assert_eq!(decoded.events[1].meta(), Some(&MetaMessage::Text(String::new())));
            assert_eq!(notes(&decoded), vec![(0, 16, 0, 60, 100)]);
        }

        #[test]
        fn data_bytes_are_masked() {
            let body = track![0x00, 0x90, 0xBC, 100];
            let decoded = decode(&smf(0, 96, &[&body])).unwrap();
            assert_eq!(decoded.events[0].message(), Some(&note_on(60, 100)));
        }

        #[test]
        fn alien_chunks_are_skipped() {
            let body = track![0x00, 0x90, 60, 100, 0x10, 0x80, 60, 0];
            let mut raw = smf::<&[u8]>(0, 96, &[]);
            raw[11] = 1;
            raw.extend_from_slice(b"XFIH\x00\x00\x00\x02\x01\x02");
            raw.extend_from_slice(b"MTrk");
            raw.extend_from_slice(&(body.len() as u32).to_be_bytes());
            raw.extend_from_slice(&body);
            let decoded = decode(&raw).unwrap();
            assert_eq!(notes(&decoded), vec![(0, 16, 0, 60, 100)]);
        }

        #[test]
        fn missing_tracks_are_tolerated() {
            let mut raw = smf(1, 96, &[&track![0x00, 0x90, 60, 100]]);
            raw[11] = 3;
            let decoded = decode(&raw).unwrap();
            assert_eq!(decoded.header.track_count, 3);
            assert_eq!(decoded.events.len(), 2);
        }
    }

    #[cfg(feature = "strict")]
    mod strict {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn data_bytes_are_checked() {
            let body = track![0x00, 0x90, 0xBC, 100];
            let err = decode(&smf(0, 96, &[&body])).unwrap_err();
            assert!(matches!(err.kind(), ErrorKind::Malformed(_)));
        }

        #[test]
        fn meta_clears_running_status() {
            let body = track![0x00, 0x90, 60, 100, 0x00, 0xFF, 0x01, 0x00, 0x10, 60, 0];
            let err = decode(&smf(0, 96, &[&body])).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnknownEventType(60));
        }

        #[test]
        fn missing_tracks_are_errors() {
            let mut raw = smf(1, 96, &[&track![]]);
            raw[11] = 2;
            let err = decode(&raw).unwrap_err();
            assert!(matches!(err.kind(), ErrorKind::Malformed(_)));
        }
    }
}

mod encoder {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nothing_to_export() {
        assert_eq!(
            encode(&[], 120.0, 480).unwrap_err().kind(),
            ErrorKind::NothingToExport
        );
        let unplayable = [NoteRecord::new(0.0, NoteLength::Beats(1.0), Pitch::Hz(-1.0), 100)];
        assert_eq!(
            encode(&unplayable, 120.0, 480).unwrap_err().kind(),
            ErrorKind::NothingToExport
        );
    }

    #[test]
    fn single_note_bytes() {
        let raw = encode(&[beat_note(0.0, 60)], 120.0, 480).unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x01\xE0");
        expected.extend_from_slice(b"MTrk\x00\x00\x00\x14");
        expected.extend_from_slice(&[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]);
        expected.extend_from_slice(&[0x00, 0x90, 0x3C, 0x64]);
        expected.extend_from_slice(&[0x83, 0x60, 0x80, 0x3C, 0x00]);
        expected.extend_from_slice(&EOT);
        assert_eq!(raw, expected);
    }

    #[test]
    fn running_status_output() {
        let chord = [beat_note(0.0, 60), beat_note(0.0, 64)];
        let options = EncodeOptions::new(120.0, 480).with_running_status(true);
        let raw = encode_with(&chord, &options).unwrap();
        let body = [
            &[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20][..],
            &[0x00, 0x90, 60, 100, 0x00, 64, 100],
            &[0x83, 0x60, 0x80, 60, 0, 0x00, 64, 0],
            &EOT,
        ]
        .concat();
        assert_eq!(&raw[14..18], b"MTrk");
        assert_eq!(&raw[18..22], &(body.len() as u32).to_be_bytes());
        assert_eq!(&raw[22..], &body[..]);

        let explicit = decode(&encode(&chord, 120.0, 480).unwrap()).unwrap();
        assert_eq!(decode(&raw).unwrap(), explicit);
    }

    #[test]
    fn header_fields() {
        let raw = encode(&[beat_note(0.0, 60)], 100.0, 96).unwrap();
        let decoded = decode(&raw).unwrap();
        assert_eq!(decoded.header.format, Format::SingleTrack);
        assert_eq!(decoded.header.track_count, 1);
        assert_eq!(decoded.header.ticks_per_quarter_note(), 96);
        assert_eq!(decoded.tempos[0].micros_per_quarter_note, 600_000);
        assert_eq!(decoded.events.last().unwrap().meta(), Some(&MetaMessage::EndOfTrack));
    }

    #[test]
    fn lengths_and_starts() {
        let notes_in = [
            NoteRecord::new(2.5, NoteLength::Seconds(1.0), Pitch::Note(60), 90),
            NoteRecord::new(2.0, NoteLength::Beats(0.25), Pitch::Note(62), 90),
            NoteRecord::new(3.0, NoteLength::Seconds(0.0), Pitch::Note(64), 90),
        ];
        let decoded = decode(&encode(&notes_in, 90.0, 96).unwrap()).unwrap();
        //90 bpm: one second is one and a half beats
        let mut got = notes(&decoded);
        got.sort();
        assert_eq!(
            got,
            vec![(0, 24, 0, 62, 90), (48, 144, 0, 60, 90), (96, 0, 0, 64, 90)]
        );
    }

    #[test]
    fn velocity_is_clamped() {
        let notes_in = [
            NoteRecord::new(0.0, NoteLength::Beats(1.0), Pitch::Note(60), 0),
            NoteRecord::new(0.0, NoteLength::Beats(1.0), Pitch::Note(62), 200),
            NoteRecord::new(0.0, NoteLength::Beats(1.0), Pitch::Note(200), 50),
        ];
        let decoded = decode(&encode(&notes_in, 120.0, 480).unwrap()).unwrap();
        assert_eq!(
            notes(&decoded),
            vec![
                (0, 480, 0, 60, 1),
                (0, 480, 0, 62, 127),
                (0, 480, 0, 127, 50)
            ]
        );
    }

    #[test]
    fn unusable_notes_are_dropped() {
        let notes_in = [
            NoteRecord::new(f64::NAN, NoteLength::Beats(1.0), Pitch::Note(60), 100),
            NoteRecord::new(1.0, NoteLength::Beats(1.0), Pitch::Hz(0.0), 100),
            NoteRecord::new(1.0, NoteLength::Beats(1.0), Pitch::Note(67), 100),
        ];
        let decoded = decode(&encode(&notes_in, 120.0, 480).unwrap()).unwrap();
        assert_eq!(notes(&decoded), vec![(0, 480, 0, 67, 100)]);
    }

    #[test]
    fn same_tick_order() {
        let notes_in = [beat_note(1.0, 62), beat_note(0.0, 60)];
        let decoded = decode(&encode(&notes_in, 120.0, 480).unwrap()).unwrap();
        assert_eq!(
            messages(&decoded),
            vec![
                (0, 0, note_on(60, 100)),
                (480, 0, note_on(62, 100)),
                (480, 0, note_off(60)),
                (960, 0, note_off(62)),
            ]
        );
    }

    #[test]
    fn repeated_notes() {
        let notes_in = [beat_note(0.0, 60), beat_note(1.0, 60), beat_note(2.0, 60)];
        let decoded = decode(&encode(&notes_in, 120.0, 480).unwrap()).unwrap();
        assert_eq!(
            notes(&decoded),
            vec![
                (0, 480, 0, 60, 100),
                (480, 480, 0, 60, 100),
                (960, 480, 0, 60, 100)
            ]
        );
    }

    #[test]
    fn fixed_and_explicit_channels() {
        let notes_in = [
            beat_note(0.0, 60),
            beat_note(1.0, 62).on_channel(u4::new(5)),
        ];
        let options = EncodeOptions::new(120.0, 480).with_channel(u4::new(2));
        let decoded = decode(&encode_with(&notes_in, &options).unwrap()).unwrap();
        assert_eq!(
            notes(&decoded),
            vec![(0, 480, 2, 60, 100), (480, 480, 5, 62, 100)]
        );
    }

    #[test]
    fn track_name() {
        let options = EncodeOptions::new(120.0, 480).with_track_name("lead");
        let decoded = decode(&encode_with(&[beat_note(0.0, 60)], &options).unwrap()).unwrap();
        assert_eq!(
            decoded.events[0].meta(),
            Some(&MetaMessage::TrackName("lead".to_string()))
        );
        assert_eq!(decoded.events[1].meta(), Some(&MetaMessage::Tempo(u24::new(500_000))));
    }

    #[test]
    fn invalid_options() {
        let notes_in = [beat_note(0.0, 60)];
        for options in &[
            EncodeOptions::new(120.0, 0),
            EncodeOptions::new(120.0, 0x8000),
            EncodeOptions::new(0.0, 480),
            EncodeOptions::new(f64::NAN, 480),
            EncodeOptions::new(-60.0, 480),
            //Sixty million microseconds do not fit in 24 bits
            EncodeOptions::new(1.0, 480),
            EncodeOptions::new(120.0, 480).with_pitch_bend(0),
            EncodeOptions::new(120.0, 480).with_pitch_bend(128),
        ] {
            let err = encode_with(&notes_in, options).unwrap_err();
            assert!(
                matches!(err.kind(), ErrorKind::InvalidInput(_)),
                "{:?} gave {}",
                options,
                err
            );
        }
    }

    #[test]
    fn tuned_notes_are_not_bent() {
        let notes_in = [NoteRecord::new(0.0, NoteLength::Beats(1.0), Pitch::Hz(440.0), 100)];
        let options = EncodeOptions::new(120.0, 480).with_pitch_bend(2);
        let decoded = decode(&encode_with(&notes_in, &options).unwrap()).unwrap();
        let bends = messages(&decoded)
            .into_iter()
            .filter_map(|(tick, channel, msg)| match msg {
                MidiMessage::PitchBend { bend } => Some((tick, channel, bend.0.as_int())),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(bends, vec![(0, 0, 8192)]);
        assert_eq!(notes(&decoded), vec![(0, 480, 0, 69, 100)]);
    }

    #[test]
    fn sharp_notes_are_bent_up() {
        let hz = 440.0 * (45.0f64 / 1200.0).exp2();
        let notes_in = [NoteRecord::new(0.0, NoteLength::Beats(1.0), Pitch::Hz(hz), 100)];
        let options = EncodeOptions::new(120.0, 480).with_pitch_bend(2);
        let decoded = decode(&encode_with(&notes_in, &options).unwrap()).unwrap();
        let channel_events = messages(&decoded);
        let tail = &channel_events[channel_events.len() - 3..];
        assert_eq!(
            tail[0],
            (
                0,
                0,
                MidiMessage::PitchBend {
                    bend: PitchBend(u14::new(10035))
                }
            )
        );
        assert_eq!(tail[1], (0, 0, note_on(69, 100)));
        assert_eq!(tail[2], (480, 0, note_off(69)));
    }

    #[test]
    fn bend_range_is_announced() {
        let options = EncodeOptions::new(120.0, 480).with_pitch_bend(12);
        let decoded = decode(&encode_with(&[beat_note(0.0, 60)], &options).unwrap()).unwrap();
        let controllers = messages(&decoded)
            .into_iter()
            .filter_map(|(tick, channel, msg)| match msg {
                MidiMessage::Controller { controller, value } => {
                    assert_eq!(tick, 0);
                    Some((channel, controller.as_int(), value.as_int()))
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(controllers.len(), 15 * 6);
        assert_eq!(
            &controllers[..6],
            &[
                (0, 101, 0),
                (0, 100, 0),
                (0, 6, 12),
                (0, 38, 0),
                (0, 101, 127),
                (0, 100, 127)
            ]
        );
        let channels = controllers
            .chunks(6)
            .map(|rpn| rpn[0].0)
            .collect::<Vec<_>>();
        assert_eq!(channels, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn bent_notes_rotate_channels() {
        let notes_in = (0..17)
            .map(|i| beat_note(f64::from(i), 60))
            .collect::<Vec<_>>();
        let options = EncodeOptions::new(120.0, 480).with_pitch_bend(2);
        let decoded = decode(&encode_with(&notes_in, &options).unwrap()).unwrap();
        let channels = decoded
            .notes()
            .map(|note| note.channel.as_int())
            .collect::<Vec<_>>();
        assert_eq!(
            channels,
            vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14, 15, 0, 1]
        );
        assert!(decoded.notes().all(|note| note.duration == 480));
    }
}

mod pool {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_robin_skips_percussion() {
        let mut pool = ChannelPool::new();
        assert_eq!(pool.channels().len(), 15);
        let picked = (0..16).map(|_| pool.next_round_robin()).collect::<Vec<_>>();
        assert!(!picked.contains(&PERCUSSION_CHANNEL));
        assert_eq!(picked[15], picked[0]);
        assert_eq!(picked[9], u4::new(10));
    }

    #[test]
    fn leases_run_out() {
        let mut pool = ChannelPool::new();
        let leases = (0..15).map(|_| pool.acquire().unwrap()).collect::<Vec<_>>();
        assert_eq!(pool.in_use(), 15);
        assert_eq!(pool.acquire(), None);
        assert!(pool.release(leases[3].token));
        let lease = pool.acquire().unwrap();
        assert_eq!(lease.channel, leases[3].channel);
    }

    #[test]
    fn release_is_idempotent() {
        let mut pool = ChannelPool::new();
        let early = pool.acquire().unwrap();
        assert!(pool.release(early.token));
        assert!(!pool.release(early.token));
        assert_eq!(pool.in_use(), 0);

        //A late release must not free a channel that was leased again since
        let mut pool = ChannelPool::new();
        let first = pool.acquire().unwrap();
        pool.reset();
        let second = pool.acquire().unwrap();
        assert_eq!(first.channel, second.channel);
        assert!(!pool.release(first.token));
        assert_eq!(pool.in_use(), 1);
        assert!(pool.release(second.token));
    }

    #[test]
    fn shared_between_threads() {
        let pool = SharedChannelPool::new();
        let lease = pool.acquire().unwrap();
        let remote = pool.clone();
        std::thread::spawn(move || assert!(remote.release(lease.token)))
            .join()
            .unwrap();
        assert_eq!(pool.in_use(), 0);
        pool.acquire().unwrap();
        pool.reset();
        assert_eq!(pool.in_use(), 0);
    }
}

mod timing {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::Header;

    fn header(tpqn: u16) -> Header {
        Header::new(Format::SingleTrack, 1, Timing::Metrical(tpqn.into()))
    }

    #[test]
    fn default_tempo() {
        let map = TempoMap::new(&header(480), &[]).unwrap();
        assert_eq!(map.ticks_per_quarter_note(), 480);
        assert!((map.seconds_at(480) - 0.5).abs() < 1e-9);
        assert!((map.duration_seconds(960, 240) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn tempo_segments() {
        let tempos = [
            crate::TempoEvent {
                tick: 960,
                micros_per_quarter_note: 1_000_000,
            },
            crate::TempoEvent {
                tick: 0,
                micros_per_quarter_note: 250_000,
            },
        ];
        let map = TempoMap::new(&header(480), &tempos).unwrap();
        assert!((map.seconds_at(960) - 0.5).abs() < 1e-9);
        assert!((map.seconds_at(1440) - 1.5).abs() < 1e-9);
        assert!((map.duration_seconds(480, 960) - 1.25).abs() < 1e-9);
    }

    #[test]
    fn smpte_is_rejected() {
        let smpte = Header::new(Format::SingleTrack, 1, Timing::Timecode(Fps::Fps30, 80));
        assert_eq!(
            TempoMap::new(&smpte, &[]).unwrap_err().kind(),
            ErrorKind::UnsupportedTiming
        );
    }

    #[test]
    fn frequencies() {
        assert_eq!(pitch::frequency_to_note(440.0), 69.0);
        assert!((pitch::note_to_frequency(60.0) - 261.625_565).abs() < 1e-5);
        assert_eq!(pitch::nearest_note(261.63), Some(u7::new(60)));
        assert_eq!(pitch::nearest_note(0.0), None);
        assert_eq!(pitch::nearest_note(f64::INFINITY), None);
        assert_eq!(pitch::nearest_note(100_000.0), Some(u7::new(127)));
        assert!((pitch::cents_from_note(466.163_76, u7::new(69)) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn bend_values() {
        assert_eq!(PitchBend::from_cents(0.0, 2).0.as_int(), 8192);
        assert_eq!(PitchBend::from_cents(200.0, 2).0.as_int(), 16383);
        assert_eq!(PitchBend::from_cents(-200.0, 2).0.as_int(), 1);
        assert_eq!(PitchBend::from_cents(-5000.0, 2).0.as_int(), 0);
        assert_eq!(PitchBend::from_cents(50.0, 0), PitchBend::mid_raw_value());
        assert!((PitchBend::from_cents(30.0, 2).as_cents(2) - 30.0).abs() < 0.02);
    }
}
