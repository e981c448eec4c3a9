use std::path::PathBuf;
use std::sync::Arc;

/// Events emitted during a run for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Leftover intermediate files from an interrupted run were removed
    IntermediatesCleanedUp { count: usize },

    /// A listing page is being fetched
    FetchingListing { page: usize, url: String },

    /// A listing page has been parsed
    ListingParsed {
        page: usize,
        candidates: usize,
        /// Whether the whole page predates the catalog horizon
        stale: bool,
    },

    /// Discovery finished
    DiscoveryCompleted { pages: usize, new_entries: usize },

    /// An entry is about to be processed
    EntryStarting {
        /// Index of this entry in the processing queue
        index: usize,
        /// Total number of entries to process
        total: usize,
        title: String,
    },

    /// The entry's audio already exists; download and transcode skipped
    EntryAlreadyPresent { title: String },

    /// The entry's audio was produced and the entry cataloged
    EntryCompleted { title: String },

    /// The entry could not be downloaded and stays eligible for the next run
    EntryFailed { title: String, error: String },

    /// The feed file has been written
    FeedWritten { path: PathBuf, items: usize },

    /// The run completed
    RunCompleted {
        processed_count: usize,
        existing_count: usize,
        failed_count: usize,
    },
}

/// Trait for reporting progress events during a run.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingReporter {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressReporter for CollectingReporter {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn noop_reporter_handles_all_events() {
        let reporter = NoopReporter;

        reporter.report(ProgressEvent::IntermediatesCleanedUp { count: 2 });
        reporter.report(ProgressEvent::FetchingListing {
            page: 0,
            url: "http://example.com/?offset=0".to_string(),
        });
        reporter.report(ProgressEvent::ListingParsed {
            page: 0,
            candidates: 10,
            stale: false,
        });
        reporter.report(ProgressEvent::DiscoveryCompleted {
            pages: 2,
            new_entries: 5,
        });
        reporter.report(ProgressEvent::EntryStarting {
            index: 0,
            total: 5,
            title: "Episode 1".to_string(),
        });
        reporter.report(ProgressEvent::EntryAlreadyPresent {
            title: "Episode 1".to_string(),
        });
        reporter.report(ProgressEvent::EntryCompleted {
            title: "Episode 2".to_string(),
        });
        reporter.report(ProgressEvent::EntryFailed {
            title: "Episode 3".to_string(),
            error: "no video".to_string(),
        });
        reporter.report(ProgressEvent::FeedWritten {
            path: PathBuf::from("/tmp/feed.rss"),
            items: 3,
        });
        reporter.report(ProgressEvent::RunCompleted {
            processed_count: 1,
            existing_count: 1,
            failed_count: 1,
        });
    }

    #[test]
    fn shared_reporter_is_usable_through_arc() {
        let collecting = Arc::new(CollectingReporter::default());
        let shared: SharedProgressReporter = collecting.clone();

        shared.report(ProgressEvent::IntermediatesCleanedUp { count: 1 });

        assert_eq!(collecting.events.lock().unwrap().len(), 1);
    }
}
