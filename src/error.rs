use core::fmt;
use thiserror::Error as ThisError;

/// Represents an error while decoding an SMF file or encoding a note list.
///
/// This type wraps an [`ErrorKind`] together with the byte offset at which the problem was
/// found. Encoder errors and errors that are not tied to a position in the input carry no offset.
///
/// Every error is terminal for the call that produced it: no partial event list or byte buffer
/// is ever returned alongside an error.
#[derive(Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    offset: Option<usize>,
}
impl Error {
    /// Create a new error with the given `ErrorKind` and no offset information.
    #[inline]
    pub fn new(kind: ErrorKind) -> Error {
        Error { kind, offset: None }
    }

    /// Create a new error that occurred at the given byte offset of the input.
    #[inline]
    pub fn at(offset: usize, kind: ErrorKind) -> Error {
        Error {
            kind,
            offset: Some(offset),
        }
    }

    /// More information about the error itself.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The byte offset into the decoded buffer where the error was detected, if any.
    #[inline]
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }
}
impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Error {
        Error::new(kind)
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} (at byte {})", self.kind, offset),
            None => fmt::Display::fmt(&self.kind, f),
        }
    }
}
impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
impl std::error::Error for Error {
    #[inline]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// The type of error that occurred while decoding or encoding.
///
/// Decoder errors are fatal: the file is not a MIDI file or is corrupted beyond the point where
/// events could be recovered. The `&'static str` payloads are non-normative descriptions of which
/// part of the format was violated.
#[derive(Copy, Clone, PartialEq, Eq, Debug, ThisError)]
pub enum ErrorKind {
    /// Missing or incorrect magic bytes, a buffer too short to hold a header, or a header field
    /// with an impossible value.
    #[error("invalid midi: {0}")]
    InvalidFormat(&'static str),

    /// The header chunk declared a length other than 6.
    #[error("invalid midi: header chunk length is {0}, expected 6")]
    InvalidHeaderLength(u32),

    /// A status byte that no Standard Midi File event starts with.
    #[error("invalid midi: unknown event status 0x{0:02X}")]
    UnknownEventType(u8),

    /// The input ended in the middle of a chunk, event or value.
    #[error("invalid midi: unexpected end of input while reading {0}")]
    TruncatedInput(&'static str),

    /// A variable-length quantity longer than 4 bytes.
    #[error("invalid midi: variable-length quantity longer than 4 bytes")]
    MalformedVlq,

    /// Non-fatal corruption, only raised when the `strict` feature is enabled.
    #[error("malformed midi: {0}")]
    Malformed(&'static str),

    /// SMPTE timecode divisions cannot be converted from ticks to time.
    #[error("unsupported timing: smpte timecode divisions cannot be converted to seconds")]
    UnsupportedTiming,

    /// An encoder argument is out of the range representable in a MIDI file.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// The encoder was handed an empty note list, or none of its notes could be written.
    #[error("nothing to export: no playable notes")]
    NothingToExport,
}
impl ErrorKind {
    /// Whether this error came from the decoder rejecting its input.
    #[inline]
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidFormat(_)
                | ErrorKind::InvalidHeaderLength(_)
                | ErrorKind::UnknownEventType(_)
                | ErrorKind::TruncatedInput(_)
                | ErrorKind::MalformedVlq
                | ErrorKind::Malformed(_)
        )
    }
}

/// The result type used by the codec.
pub type Result<T> = StdResult<T, Error>;
pub(crate) use core::result::Result as StdResult;
