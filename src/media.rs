// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Turning discovered entries into audio files.
//!
//! Downloading, transcoding and probing are delegated to external programs
//! behind small traits so the pipeline can be driven by mocks in tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::ToolsConfig;
use crate::entry::Entry;
use crate::error::{DownloadError, MediaError, ProbeError, TranscodeError};
use crate::extract::EntryExtractor;
use crate::http::{HttpClient, fetch_document};
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Extension of the downloaded video, removed once transcoded
pub const INTERMEDIATE_EXTENSION: &str = "mp4";

/// Extension of the published audio
pub const AUDIO_EXTENSION: &str = "mp3";

/// Suffix of audio still being written by the transcoder
const PARTIAL_EXTENSION: &str = "partial";

/// Fetches an episode's video to a local file
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str, output: &Path) -> Result<(), DownloadError>;
}

/// Converts a downloaded video into audio
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError>;
}

/// Reads the playing time of an audio file
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn duration(&self, path: &Path) -> Result<Duration, ProbeError>;
}

/// Downloader backed by an external program such as yt-dlp.
///
/// Invoked as `<program> <args...> <url> -o <output>`.
#[derive(Debug, Clone)]
pub struct CommandDownloader {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandDownloader {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Downloader for CommandDownloader {
    async fn download(&self, url: &str, output: &Path) -> Result<(), DownloadError> {
        debug!(
            program = %self.program.display(),
            %url,
            output = %output.display(),
            "Running downloader"
        );

        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .arg("-o")
            .arg(output)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DownloadError::SpawnFailed {
                program: self.program.clone(),
                source: e,
            })?;

        if !result.status.success() {
            debug!(stderr = %String::from_utf8_lossy(&result.stderr), "Downloader failed");
            return Err(DownloadError::ExitStatus {
                url: url.to_string(),
                status: result.status.to_string(),
            });
        }

        Ok(())
    }
}

/// Transcoder backed by ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        info!(input = %input.display(), output = %output.display(), "Transcoding");

        let result = Command::new(&self.program)
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(input)
            .arg("-vn")
            .args(["-f", AUDIO_EXTENSION])
            .arg(output)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| TranscodeError::SpawnFailed {
                program: self.program.clone(),
                source: e,
            })?;

        if !result.status.success() {
            warn!(stderr = %String::from_utf8_lossy(&result.stderr), "Transcoder failed");
            return Err(TranscodeError::ExitStatus {
                input: input.to_path_buf(),
                status: result.status.to_string(),
            });
        }

        Ok(())
    }
}

/// Duration probe backed by ffprobe
#[derive(Debug, Clone)]
pub struct FfprobeDuration {
    program: PathBuf,
}

impl FfprobeDuration {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Parses `ffprobe -show_entries format=duration -of json` output
    fn parse_output(path: &Path, output: &str) -> Result<Duration, ProbeError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
        }

        let parse_failed = |reason: String| ProbeError::ParseFailed {
            path: path.to_path_buf(),
            reason,
        };

        let probe: ProbeOutput = serde_json::from_str(output)
            .map_err(|e| parse_failed(format!("Failed to parse ffprobe output: {e}")))?;

        let seconds = probe
            .format
            .duration
            .ok_or_else(|| parse_failed("no duration reported".to_string()))?
            .trim()
            .parse::<f64>()
            .map_err(|e| parse_failed(format!("invalid duration: {e}")))?;

        Duration::try_from_secs_f64(seconds).map_err(|e| parse_failed(e.to_string()))
    }
}

#[async_trait]
impl DurationProbe for FfprobeDuration {
    async fn duration(&self, path: &Path) -> Result<Duration, ProbeError> {
        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ProbeError::SpawnFailed {
                program: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(ProbeError::ExitStatus {
                path: path.to_path_buf(),
                status: output.status.to_string(),
            });
        }

        Self::parse_output(path, &String::from_utf8_lossy(&output.stdout))
    }
}

/// What happened to one entry in the pipeline
#[derive(Debug)]
enum EntryOutcome {
    Processed,
    AlreadyPresent,
    Failed(DownloadError),
}

/// Counts from one pass of the pipeline
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Entries downloaded, transcoded and cataloged
    pub processed: usize,
    /// Entries whose audio already existed
    pub already_present: usize,
    /// Entries skipped because the download produced nothing
    pub failed: usize,
    /// Title and error of each skipped entry
    pub failed_entries: Vec<(String, String)>,
    /// Entries cataloged without their long description
    pub enrichment_failed: usize,
}

/// Downloads, transcodes and catalogs new entries
pub struct MediaPipeline {
    dest_dir: PathBuf,
    downloader: Box<dyn Downloader>,
    transcoder: Box<dyn Transcoder>,
    enrich_details: bool,
}

impl MediaPipeline {
    pub fn new(
        dest_dir: impl Into<PathBuf>,
        downloader: Box<dyn Downloader>,
        transcoder: Box<dyn Transcoder>,
        enrich_details: bool,
    ) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            downloader,
            transcoder,
            enrich_details,
        }
    }

    /// Pipeline using the configured external programs
    pub fn from_tools(
        dest_dir: impl Into<PathBuf>,
        tools: &ToolsConfig,
        enrich_details: bool,
    ) -> Self {
        Self::new(
            dest_dir,
            Box::new(CommandDownloader::new(
                &tools.downloader,
                tools.downloader_args.clone(),
            )),
            Box::new(FfmpegTranscoder::new(&tools.transcoder)),
            enrich_details,
        )
    }

    /// Process entries in order, inserting each one whose audio exists
    /// afterwards into the catalog.
    ///
    /// A failed download skips the entry so the next run retries it. A failed
    /// transcode stops the pass; entries cataloged before it stay in
    /// `catalog` and the caller decides whether to persist them.
    pub async fn process<C: HttpClient + ?Sized>(
        &self,
        entries: Vec<Entry>,
        catalog: &mut Catalog,
        client: &C,
        extractor: &EntryExtractor,
        reporter: &SharedProgressReporter,
    ) -> Result<PipelineReport, MediaError> {
        let total = entries.len();
        let mut report = PipelineReport::default();

        for (index, mut entry) in entries.into_iter().enumerate() {
            let title = entry.feed_title();
            info!("{}/{}: {}", index + 1, total, entry);
            reporter.report(ProgressEvent::EntryStarting {
                index,
                total,
                title: title.clone(),
            });

            match self.produce_audio(&entry).await? {
                EntryOutcome::Failed(error) => {
                    warn!(
                        identity = %entry.identity,
                        error = %error,
                        stage = "download",
                        "Skipping entry"
                    );
                    reporter.report(ProgressEvent::EntryFailed {
                        title: title.clone(),
                        error: error.to_string(),
                    });
                    report.failed += 1;
                    report.failed_entries.push((title, error.to_string()));
                    continue;
                }
                EntryOutcome::AlreadyPresent => {
                    reporter.report(ProgressEvent::EntryAlreadyPresent {
                        title: title.clone(),
                    });
                    report.already_present += 1;
                }
                EntryOutcome::Processed => {
                    reporter.report(ProgressEvent::EntryCompleted {
                        title: title.clone(),
                    });
                    report.processed += 1;
                }
            }

            if self.enrich_details
                && entry.detail.is_none()
                && !self.enrich(&mut entry, client, extractor).await
            {
                report.enrichment_failed += 1;
            }

            catalog.insert(entry);
        }

        Ok(report)
    }

    async fn produce_audio(&self, entry: &Entry) -> Result<EntryOutcome, MediaError> {
        let audio = entry.media_path(&self.dest_dir, AUDIO_EXTENSION);
        if audio.is_file() {
            info!(path = %audio.display(), "Audio already exists");
            return Ok(EntryOutcome::AlreadyPresent);
        }

        let intermediate = entry.media_path(&self.dest_dir, INTERMEDIATE_EXTENSION);
        if let Some(bucket) = intermediate.parent() {
            tokio::fs::create_dir_all(bucket)
                .await
                .map_err(|e| MediaError::CreateDirectoryFailed {
                    path: bucket.to_path_buf(),
                    source: e,
                })?;
        }

        // The file on disk decides success, not the downloader's exit status
        let downloaded = self.downloader.download(&entry.identity, &intermediate).await;
        if !intermediate.is_file() {
            let error = downloaded.err().unwrap_or(DownloadError::MissingOutput {
                path: intermediate.clone(),
            });
            return Ok(EntryOutcome::Failed(error));
        }
        if let Err(e) = downloaded {
            warn!(
                error = %e,
                path = %intermediate.display(),
                "Downloader reported an error but produced a file"
            );
        }

        // Only complete audio may ever sit at the final path
        let partial = partial_path(&audio);
        if let Err(e) = self.transcoder.transcode(&intermediate, &partial).await {
            remove_partial(&partial).await;
            return Err(e.into());
        }
        if !partial.is_file() {
            return Err(TranscodeError::MissingOutput { path: partial }.into());
        }
        tokio::fs::rename(&partial, &audio)
            .await
            .map_err(|e| MediaError::FinalizeFailed {
                path: audio.clone(),
                source: e,
            })?;

        info!(path = %intermediate.display(), "Removing intermediate");
        if let Err(e) = tokio::fs::remove_file(&intermediate).await {
            warn!(error = %e, path = %intermediate.display(), "Failed to remove intermediate");
        }

        Ok(EntryOutcome::Processed)
    }

    /// Fill in the long description from the entry's own page.
    /// Returns false when the page could not be fetched.
    async fn enrich<C: HttpClient + ?Sized>(
        &self,
        entry: &mut Entry,
        client: &C,
        extractor: &EntryExtractor,
    ) -> bool {
        match fetch_document(client, &entry.identity).await {
            Ok(markup) => {
                entry.detail = extractor.parse_detail(&markup);
                if entry.detail.is_none() {
                    debug!(identity = %entry.identity, "Detail page has no description");
                }
                true
            }
            Err(e) => {
                warn!(
                    identity = %entry.identity,
                    error = %e,
                    stage = "enrich",
                    "Cataloging without detail"
                );
                false
            }
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    path.with_file_name(name)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial audio"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial audio"),
    }
}

/// Remove intermediate video and partial audio files left behind by an
/// interrupted run.
///
/// Looks in `root` and in its immediate subdirectories, the year-month
/// buckets. Returns how many files were removed.
pub fn cleanup_intermediates(root: &Path) -> usize {
    let mut directories = vec![root.to_path_buf()];
    if let Ok(read_dir) = std::fs::read_dir(root) {
        directories.extend(
            read_dir
                .filter_map(Result::ok)
                .map(|dir_entry| dir_entry.path())
                .filter(|path| path.is_dir()),
        );
    }

    let mut removed = 0;
    for directory in directories {
        let Ok(read_dir) = std::fs::read_dir(&directory) else {
            continue;
        };

        for path in read_dir.filter_map(Result::ok).map(|e| e.path()) {
            let is_intermediate = path.is_file()
                && path.extension().is_some_and(|ext| {
                    ext.eq_ignore_ascii_case(INTERMEDIATE_EXTENSION)
                        || ext.eq_ignore_ascii_case(PARTIAL_EXTENSION)
                });
            if !is_intermediate {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "Removed leftover intermediate");
                    removed += 1;
                }
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove leftover intermediate"
                ),
            }
        }
    }

    removed
}
