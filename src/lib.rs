pub mod catalog;
pub mod config;
pub mod date;
pub mod entry;
pub mod error;
pub mod extract;
pub mod feed;
pub mod http;
pub mod media;
pub mod progress;
pub mod run;
pub mod sync;

// Re-export main types for convenience
pub use catalog::{Catalog, CatalogOptions};
pub use config::{FeedConfig, ShowConfig, ToolsConfig, load_config};
pub use date::DateNormalizer;
pub use entry::{Category, Entry, EntryRecord};
pub use error::{
    CatalogError, ConfigError, DateParseError, DownloadError, ExtractError, FeedError, FetchError,
    MediaError, ProbeError, RunError, SyncError, TranscodeError,
};
pub use extract::EntryExtractor;
pub use feed::{FeedPublisher, write_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use media::{
    CommandDownloader, Downloader, DurationProbe, FfmpegTranscoder, FfprobeDuration,
    MediaPipeline, PipelineReport,
};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use run::{RunOptions, RunSummary, run};
pub use sync::{SyncEngine, SyncOptions};
