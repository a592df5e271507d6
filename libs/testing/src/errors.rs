use std::io;

use thiserror::Error;

/// Errors reported by a [`ScriptedTransport`](crate::ScriptedTransport) that was driven off its script.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ScriptError {
    /// A request didn't match the next scripted step.
    #[error("Expected request {:02X?}, got {:02X?}", expected, actual)]
    Unexpected {
        /// The scripted request, empty if unsolicited data was due instead.
        expected: Vec<u8>,

        /// The request actually written.
        actual: Vec<u8>,
    },

    /// A request was written after the script ran out.
    #[error("Script exhausted, got {:02X?}", actual)]
    Exhausted {
        /// The request actually written.
        actual: Vec<u8>,
    },

    /// The test finished with steps left over.
    #[error("{} scripted steps never played", remaining)]
    Unfinished {
        /// Number of steps left.
        remaining: usize,
    },
}

impl From<ScriptError> for io::Error {
    fn from(error: ScriptError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, error)
    }
}
