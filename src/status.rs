//! Error and status values. Every fallible operation in this crate returns a [Result], and the
//! outcome of a whole operation can be condensed into a [Status] for reporting.

use core::fmt;

/// The maximum length of a status description, in bytes.
pub const DESCRIPTION_CAPACITY: usize = 100;

/// A bounded, human-readable description of an operation's outcome.
pub type Description = heapless::String<DESCRIPTION_CAPACITY>;

/// The class of failure an [Error] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A RAM cell did not read back the value that was just written to it.
    MemoryAccessFault,
    /// The module was busy or unresponsive when an access requiring a specific ready state was
    /// attempted.
    PeripheralNotReady,
    /// A caller-supplied address range was malformed or out of bounds.
    InvalidAddress,
    /// A caller-supplied count exceeded a platform limit, a feedback write did not verify, or there
    /// was too little data to compute a result from.
    InvalidData,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::MemoryAccessFault => "memory access fault",
            ErrorKind::PeripheralNotReady => "peripheral not ready",
            ErrorKind::InvalidAddress => "invalid address",
            ErrorKind::InvalidData => "invalid data",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub description: Description,
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Creates an error with a fixed description. Descriptions longer than
    /// [DESCRIPTION_CAPACITY] are truncated.
    pub fn new(kind: ErrorKind, description: &str) -> Error {
        Error::with_details(kind, format_args!("{description}"))
    }

    /// Creates an error with a formatted description, e.g. one carrying the offending values.
    /// Descriptions longer than [DESCRIPTION_CAPACITY] are truncated.
    pub fn with_details(kind: ErrorKind, details: fmt::Arguments<'_>) -> Error {
        let mut description = Description::new();
        // Truncation is the only way writing can fail, and a truncated description is still
        // useful.
        let _ = fmt::Write::write_fmt(&mut Truncating(&mut description), details);
        Error { kind, description }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// A [fmt::Write] adapter that fills a [Description] up to its capacity and drops the rest.
struct Truncating<'a>(&'a mut Description);

impl fmt::Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                return Err(fmt::Error);
            }
        }
        Ok(())
    }
}

/// The kind of a [Status]. [StatusKind::None] means the operation fully succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    None,
    MemoryAccessFault,
    PeripheralNotReady,
    InvalidAddress,
    InvalidData,
}

impl From<ErrorKind> for StatusKind {
    fn from(kind: ErrorKind) -> StatusKind {
        match kind {
            ErrorKind::MemoryAccessFault => StatusKind::MemoryAccessFault,
            ErrorKind::PeripheralNotReady => StatusKind::PeripheralNotReady,
            ErrorKind::InvalidAddress => StatusKind::InvalidAddress,
            ErrorKind::InvalidData => StatusKind::InvalidData,
        }
    }
}

/// The reportable outcome of an operation: either success (kind [StatusKind::None], described as
/// "SUCCESS"), or the kind and description of the failure that ended it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub kind: StatusKind,
    pub description: Description,
}

impl Status {
    pub fn success() -> Status {
        let mut description = Description::new();
        // Always fits.
        let _ = description.push_str("SUCCESS");
        Status {
            kind: StatusKind::None,
            description,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == StatusKind::None
    }
}

impl From<Error> for Status {
    fn from(error: Error) -> Status {
        Status {
            kind: error.kind.into(),
            description: error.description,
        }
    }
}

impl<T> From<Result<T>> for Status {
    fn from(result: Result<T>) -> Status {
        match result {
            Ok(_) => Status::success(),
            Err(error) => error.into(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_status_is_described() {
        let status = Status::success();
        assert!(status.is_success());
        assert_eq!("SUCCESS", status.description.as_str());
    }

    // A failed result keeps its kind and description when condensed into a status.
    #[test]
    fn status_from_error() {
        let result: Result<()> = Err(Error::with_details(
            ErrorKind::MemoryAccessFault,
            format_args!("FAIL - wrote 0x{:x}, read 0x{:x}", 0xAAu32, 0xA8u32),
        ));
        let status = Status::from(result);
        assert_eq!(StatusKind::MemoryAccessFault, status.kind);
        assert_eq!("FAIL - wrote 0xaa, read 0xa8", status.to_string());
        assert!(!status.is_success());
    }

    #[test]
    fn long_descriptions_are_truncated() {
        let long = "x".repeat(DESCRIPTION_CAPACITY + 20);
        let error = Error::new(ErrorKind::InvalidData, &long);
        assert_eq!(DESCRIPTION_CAPACITY, error.description.len());
    }
}
