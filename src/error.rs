//! Error types returned by this crate.

use std::fmt;
use std::num::TryFromIntError;

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while building, laying out, encoding or
/// patching a PE image.
///
/// Misuse errors (duplicate symbols, configuration after layout, bad
/// alignment) and format-overflow errors (section too large, too many
/// exports) are both folded into [`Error::Malformed`] with a descriptive
/// message, in the same spirit as goblin's own `error::Error::Malformed`:
/// callers of this crate abort compilation on any variant, so the message
/// carries the diagnostic weight rather than the variant tag.
#[derive(Debug)]
pub enum Error {
    /// A structural or protocol invariant was violated: a non-power-of-two
    /// alignment, a section or table that grew past a format limit, a
    /// `.reloc` block that isn't 4096-aligned, and so on. The message
    /// explains which invariant.
    Malformed(String),
    /// A relocation referenced a symbol that was never defined by the time
    /// [`crate::pe::patch::Patcher::relocate_output_file`] ran.
    UndefinedSymbol(String),
    /// The same symbol name was registered twice via `add_object_data`.
    DuplicateSymbol(String),
    /// An operation that only makes sense before layout (`add_section`,
    /// `add_object_data`, `add_export_symbol`, the `set_*` configuration
    /// calls) was invoked after the builder entered the `LAID_OUT`/`SEALED`
    /// state.
    AlreadyLaidOut,
    /// Propagated I/O failure from the caller-supplied output stream.
    Io(std::io::Error),
    /// Propagated failure from a `scroll` read/write of a fixed-layout
    /// structure (e.g. [`crate::pe::clr::Cor20Header`]).
    Scroll(scroll::Error),
    /// A size or count did not fit the target integer width (e.g. a
    /// section exceeding 4 GiB, or an export count overflowing `u16`).
    TryFromInt(TryFromIntError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Malformed(msg) => write!(f, "malformed PE build state: {msg}"),
            Error::UndefinedSymbol(name) => {
                write!(f, "relocation targets undefined symbol: {name}")
            }
            Error::DuplicateSymbol(name) => write!(f, "duplicate symbol definition: {name}"),
            Error::AlreadyLaidOut => {
                write!(f, "configuration call issued after layout has begun")
            }
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Scroll(err) => write!(f, "scroll error: {err}"),
            Error::TryFromInt(err) => write!(f, "integer conversion overflow: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Scroll(err) => Some(err),
            Error::TryFromInt(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        Error::Scroll(err)
    }
}

impl From<TryFromIntError> for Error {
    fn from(err: TryFromIntError) -> Self {
        Error::TryFromInt(err)
    }
}
