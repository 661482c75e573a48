//! Rolling history of classified errors for diagnostics
//!
//! A capacity-bounded FIFO buffer of the most recent classified errors, one
//! instance per process shared by every retry executor. Used by diagnostics
//! commands and alerting, never for control flow. Memory bounds are enforced
//! by construction, so this component has no failure modes of its own.

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::error::{ClassifiedError, ErrorKind};

/// Default buffer capacity.
pub const DEFAULT_MAX_ERRORS: usize = 100;

/// Window used for the `recent_count` field of [`ErrorSummary`].
const SUMMARY_RECENT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Aggregate view of the collected errors.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorSummary {
    /// Errors currently held in the buffer
    pub total: usize,
    /// Counts grouped by taxonomy kind, in no particular order
    pub by_kind: HashMap<ErrorKind, usize>,
    /// Errors classified within the last five minutes
    pub recent_count: usize,
}

/// Bounded rolling buffer of recently observed classified errors.
///
/// Insertion order is preserved; once capacity is exceeded the oldest
/// entries are evicted first.
pub struct ErrorCollector {
    max_errors: usize,
    entries: Mutex<VecDeque<ClassifiedError>>,
}

impl Default for ErrorCollector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ERRORS)
    }
}

impl ErrorCollector {
    pub fn new(max_errors: usize) -> Self {
        Self {
            max_errors,
            entries: Mutex::new(VecDeque::with_capacity(max_errors)),
        }
    }

    /// Append an error, evicting from the head once over capacity.
    pub fn add(&self, error: ClassifiedError) {
        let mut entries = self.entries.lock();
        entries.push_back(error);
        while entries.len() > self.max_errors {
            entries.pop_front();
        }
    }

    /// Errors classified within the last `window`.
    ///
    /// Entries without a timestamp cannot be placed in time and are excluded
    /// here; they still count in [`summary`](Self::summary) totals.
    pub fn recent_errors(&self, window: Duration) -> Vec<ClassifiedError> {
        let now = Utc::now();
        self.entries
            .lock()
            .iter()
            .filter(|error| {
                error.details.timestamp.is_some_and(|ts| {
                    now.signed_duration_since(ts)
                        .to_std()
                        .map(|age| age < window)
                        // a timestamp in the future is trivially recent
                        .unwrap_or(true)
                })
            })
            .cloned()
            .collect()
    }

    /// All held errors of the given kind, oldest first.
    pub fn errors_by_kind(&self, kind: ErrorKind) -> Vec<ClassifiedError> {
        self.entries
            .lock()
            .iter()
            .filter(|error| error.kind == kind)
            .cloned()
            .collect()
    }

    /// Aggregate counts for diagnostics and alerting.
    pub fn summary(&self) -> ErrorSummary {
        let now = Utc::now();
        let entries = self.entries.lock();
        let mut by_kind: HashMap<ErrorKind, usize> = HashMap::new();
        let mut recent_count = 0;
        for error in entries.iter() {
            *by_kind.entry(error.kind).or_default() += 1;
            let recent = error.details.timestamp.is_some_and(|ts| {
                now.signed_duration_since(ts)
                    .to_std()
                    .map(|age| age < SUMMARY_RECENT_WINDOW)
                    .unwrap_or(true)
            });
            if recent {
                recent_count += 1;
            }
        }
        ErrorSummary {
            total: entries.len(),
            by_kind,
            recent_count,
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
