use core::{error, fmt};
use fmt::Display;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    SnapshotSizeDifferentThanExpected { expected: usize, actual: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SnapshotSizeDifferentThanExpected { expected, actual } => write!(
                f,
                "snapshot size is different from the expected layout: expected {expected} bytes, got {actual} bytes"
            ),
        }
    }
}

impl error::Error for Error {}
