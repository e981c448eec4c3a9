use std::path::PathBuf;
use thiserror::Error;

/// A date token that could not be normalized into a calendar date
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateParseError {
    #[error("Empty date token")]
    Empty,

    #[error("Date token '{token}' has {found} components, expected 2 or 3")]
    WrongArity { token: String, found: usize },

    #[error("Date token '{token}' has non-numeric component '{component}'")]
    NonNumeric { token: String, component: String },

    #[error("Date token '{token}' has an invalid time of day")]
    InvalidTime { token: String },

    #[error("Date token '{token}' does not name a calendar date")]
    InvalidDate { token: String },
}

/// Errors raised while turning listing markup into entries
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Link '{href}' does not match the show's path pattern")]
    LinkMismatch { href: String },

    #[error("Listing item {link} has no {field}")]
    MissingField { link: String, field: &'static str },

    #[error("Listing item {link} has an unusable date: {source}")]
    InvalidDate {
        link: String,
        #[source]
        source: DateParseError,
    },

    #[error("Invalid link {href}: {source}")]
    InvalidUrl {
        href: String,
        #[source]
        source: url::ParseError,
    },
}

/// Errors that can occur when fetching remote documents
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to fetch {url}: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },
}

/// The external downloader did not produce the intermediate video file
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Failed to launch downloader {program}: {source}")]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Downloader exited with {status} for {url}")]
    ExitStatus { url: String, status: String },

    #[error("Downloader produced no file at {path}")]
    MissingOutput { path: PathBuf },
}

/// The external transcoder failed; fatal for the whole run
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Failed to launch transcoder {program}: {source}")]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcoder exited with {status} converting {input}")]
    ExitStatus { input: PathBuf, status: String },

    #[error("Transcoder produced no file at {path}")]
    MissingOutput { path: PathBuf },
}

/// Errors that stop the media pipeline
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Failed to create media directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move finished audio into place at {path}: {source}")]
    FinalizeFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur when probing audio metadata
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to launch prober {program}: {source}")]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Prober exited with {status} for {path}")]
    ExitStatus { path: PathBuf, status: String },

    #[error("Failed to parse probe output for {path}: {reason}")]
    ParseFailed { path: PathBuf, reason: String },
}

/// Errors that can occur when loading or saving the catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog JSON in {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Catalog {path} holds a record with an invalid date '{date}'")]
    InvalidRecordDate { path: PathBuf, date: String },

    #[error("Failed to serialize catalog: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),

    #[error("Failed to write catalog file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur when rendering or writing the podcast feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to write feed file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize feed: {0}")]
    SerializeFailed(#[from] rss::Error),

    #[error("Cannot derive a public URL for {path}: {reason}")]
    PublicUrl { path: PathBuf, reason: String },
}

/// Errors that can occur when loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that stop catalog discovery
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Listing page at offset {offset} could not be fetched: {source}")]
    ListingFetch {
        offset: usize,
        #[source]
        source: FetchError,
    },
}

/// Fatal errors that abort a run before the catalog is saved
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Failed to prepare destination directory {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
