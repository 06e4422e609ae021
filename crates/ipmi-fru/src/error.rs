//! The structured error model.
//!
//! Every fallible entry point returns `Result<T, Error>`. `Error` bundles a
//! [`ErrorKind`], the [`ErrorSource`] area (or caller/general) it was
//! detected in, and an optional index of the offending field or record,
//! mirroring the `{code, src, index}` triple of the C `fru_errno_t`.

use std::cell::Cell;
use std::fmt;

use crate::model::AreaTag;

/// The kind of failure, grouped the way the original library groups them:
/// input shape, size, format, content, and state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A hex digit pair contained a non-hex character.
    NonHex,
    /// A text field contained a non-printable byte.
    NonPrint,
    /// A hex string had an odd number of digits.
    NotEven,
    /// A field's value doesn't fit the selected encoding.
    Range,
    /// An encoding code was out of range.
    BadEnc,
    /// No encoding in the `Auto` chain accepted the input.
    AutoEnc,
    /// A buffer or file was too small to hold what it claims to.
    TooSmall,
    /// An encoded quantity (field, area, file) exceeded its size limit.
    TooBig,
    /// A declared size didn't match the data actually present.
    SizeMismatch,
    /// The file header's version nibble wasn't 1.
    HeaderVersion,
    /// The file header checksum did not sum to zero.
    HeaderChecksum,
    /// An area offset in the file header pointed past the end of the file.
    HeaderBadPointer,
    /// An MR record's data checksum did not sum to zero.
    DataChecksum,
    /// An info area's version nibble wasn't 1.
    AreaVersion,
    /// An info area's checksum did not sum to zero.
    AreaChecksum,
    /// An info area ran out of bytes before a `0xC1` terminator was seen.
    NoTerminator,
    /// Two areas claimed the same on-disk offset.
    DuplicateArea,
    /// An area type value was outside the five known tags.
    BadAreaType,
    /// The requested operation doesn't support this area type.
    AreaNotSupported,
    /// The requested mandatory field or custom field doesn't exist.
    NoField,
    /// The requested multirecord record doesn't exist.
    NoRecord,
    /// The area or record has no data to act on (e.g. an empty MR list).
    NoData,
    /// A record's content failed validation (malformed payload).
    BadData,
    /// A Management Access record's subtype or length was invalid.
    MgmtRecordBad,
    /// An MR record type isn't supported by this operation.
    MRNotSupported,
    /// A board manufacturing date was out of the representable range.
    BoardDate,
    /// The `Fru` instance hasn't been initialized.
    Init,
    /// The area is already enabled (in `order`).
    AreaEnabled,
    /// The area is already disabled (absent from the present prefix).
    AreaDisabled,
    /// A requested insertion position was invalid.
    BadPosition,
    /// A list that was required to be empty was not.
    NotEmpty,
    /// A generic, OS-level failure (I/O, allocation).
    Generic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NonHex => "input contains non-hex characters",
            ErrorKind::NonPrint => "field data contains non-printable bytes",
            ErrorKind::NotEven => "not an even number of hex digits",
            ErrorKind::Range => "field data exceeds the range for the requested encoding",
            ErrorKind::BadEnc => "invalid encoding for a field",
            ErrorKind::AutoEnc => "unable to auto-detect an encoding",
            ErrorKind::TooSmall => "buffer or file is too small",
            ErrorKind::TooBig => "data or file is too big",
            ErrorKind::SizeMismatch => "data size mismatch",
            ErrorKind::HeaderVersion => "bad file header version",
            ErrorKind::HeaderChecksum => "bad file header checksum",
            ErrorKind::HeaderBadPointer => "area pointer beyond the end of file",
            ErrorKind::DataChecksum => "bad record data checksum",
            ErrorKind::AreaVersion => "bad area version",
            ErrorKind::AreaChecksum => "bad area checksum",
            ErrorKind::NoTerminator => "unterminated area",
            ErrorKind::DuplicateArea => "duplicate area in area order",
            ErrorKind::BadAreaType => "bad area type",
            ErrorKind::AreaNotSupported => "unsupported area type for this operation",
            ErrorKind::NoField => "no such field",
            ErrorKind::NoRecord => "no such record",
            ErrorKind::NoData => "no data",
            ErrorKind::BadData => "malformed data",
            ErrorKind::MgmtRecordBad => "bad management record subtype or length",
            ErrorKind::MRNotSupported => "unsupported record type",
            ErrorKind::BoardDate => "board manufacturing date is out of range",
            ErrorKind::Init => "uninitialized FRU structure",
            ErrorKind::AreaEnabled => "area is already enabled",
            ErrorKind::AreaDisabled => "area is already disabled",
            ErrorKind::BadPosition => "invalid area position",
            ErrorKind::NotEmpty => "list is not empty",
            ErrorKind::Generic => "generic error",
        };
        f.write_str(s)
    }
}

/// Where an error was detected: a specific area, a non-area-specific
/// library call, or the calling code's own bad arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    Area(AreaTag),
    /// Not about any specific area (e.g. the file header).
    General,
    /// The calling code passed bad arguments.
    Caller,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSource::Area(area) => write!(f, "{area}"),
            ErrorSource::General => f.write_str("general"),
            ErrorSource::Caller => f.write_str("caller"),
        }
    }
}

impl std::error::Error for ErrorSource {}

/// A single structured library failure.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("{kind} ({source}{index})", index = self.index_suffix())]
pub struct Error {
    pub kind: ErrorKind,
    pub source: ErrorSource,
    /// Index of the offending field or record; `None` when not applicable.
    pub index: Option<usize>,
}

impl Error {
    pub fn new(kind: ErrorKind, source: ErrorSource) -> Self {
        let err = Self {
            kind,
            source,
            index: None,
        };
        set_last_error(err);
        err
    }

    pub fn with_index(kind: ErrorKind, source: ErrorSource, index: usize) -> Self {
        let err = Self {
            kind,
            source,
            index: Some(index),
        };
        set_last_error(err);
        err
    }

    fn index_suffix(&self) -> String {
        match self.index {
            Some(i) => format!(", index {i}"),
            None => String::new(),
        }
    }
}

thread_local! {
    static LAST_ERROR: Cell<Option<Error>> = const { Cell::new(None) };
}

fn set_last_error(err: Error) {
    LAST_ERROR.with(|cell| cell.set(Some(err)));
}

/// Thread-local compatibility shim for callers migrating from the C API's
/// `fru_errno`/`fru_strerr` discipline. The `Result`-returning API above is
/// the primary way to observe failures; this is a secondary read-out.
pub fn last_error() -> Option<Error> {
    LAST_ERROR.with(|cell| cell.get())
}

/// Clears the thread-local last-error slot. Equivalent to `fru_clearerr()`.
pub fn clear_error() {
    LAST_ERROR.with(|cell| cell.set(None));
}

pub type Result<T> = std::result::Result<T, Error>;
