use std::sync::{Mutex, PoisonError};

/// Maximum number of error messages a job keeps.
pub const MAX_ERRORS: usize = 20;

/// Stored in the last slot once more than [`MAX_ERRORS`] errors were seen.
pub const TRUNCATION_SENTINEL: &str = "more than 20 errors were encountered. \
     the first 19 of them were stored and shown, while the others were discarded";

/// Bounded, append-only log of a job's error messages.
///
/// The first 19 errors are kept verbatim. From the 20th on, the last slot
/// holds the newest error until the ring overflows, after which it holds
/// [`TRUNCATION_SENTINEL`].
#[derive(Debug, Default)]
pub struct ErrorRing {
    entries: Mutex<Vec<String>>,
}

impl ErrorRing {
    /// Creates an empty ring.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Records a message.
    pub fn push(&self, message: String) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= MAX_ERRORS {
            entries[MAX_ERRORS - 1] = TRUNCATION_SENTINEL.to_string();
        } else {
            entries.push(message);
        }
    }

    /// Copies the current messages.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no error was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
