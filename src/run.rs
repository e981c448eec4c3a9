// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::ShowConfig;
use crate::entry::Entry;
use crate::error::RunError;
use crate::feed::{COVER_FILENAME, FeedPublisher, write_feed};
use crate::http::HttpClient;
use crate::media::{MediaPipeline, cleanup_intermediates};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::sync::SyncEngine;

/// Options for a single run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Maximum number of new entries to process
    pub limit: Option<usize>,
    /// Discover and list new entries without downloading or saving
    pub dry_run: bool,
}

/// Result of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// New entries found by discovery, before the limit
    pub discovered: usize,
    /// Entries downloaded, transcoded and cataloged
    pub processed: usize,
    /// Entries cataloged whose audio already existed
    pub already_present: usize,
    /// Entries skipped because their download failed
    pub download_failed: usize,
    /// Entries cataloged without a long description
    pub enrichment_failed: usize,
    /// Title and error of each skipped entry
    pub failed_entries: Vec<(String, String)>,
    /// Items in the written feed
    pub feed_items: usize,
    /// Entries a dry run would have processed
    pub pending: Vec<Entry>,
}

/// Mirror the show once: discover new entries, produce their audio,
/// then save the catalog and rewrite the feed.
///
/// Download failures only skip entries. A transcode failure aborts the
/// run before anything is saved. A dry run stops after discovery and
/// leaves the filesystem untouched.
pub async fn run<C: HttpClient + ?Sized>(
    config: &ShowConfig,
    client: &C,
    pipeline: &MediaPipeline,
    publisher: &FeedPublisher,
    options: &RunOptions,
    reporter: SharedProgressReporter,
) -> Result<RunSummary, RunError> {
    let mut catalog = Catalog::load(&config.catalog_path(), config.catalog_options())?;
    let engine = SyncEngine::from_config(config)?;

    let mut new_entries = engine.discover_new(client, &catalog, &reporter).await?;
    let mut summary = RunSummary {
        discovered: new_entries.len(),
        ..Default::default()
    };

    if let Some(limit) = options.limit
        && new_entries.len() > limit
    {
        info!(
            limit,
            discovered = new_entries.len(),
            "Processing only the oldest entries this run"
        );
        new_entries.truncate(limit);
    }

    if options.dry_run {
        for entry in &new_entries {
            info!(%entry, "Would process");
        }
        summary.pending = new_entries;
        return Ok(summary);
    }

    prepare_destination(config)?;

    let removed = cleanup_intermediates(&config.dest_dir);
    if removed > 0 {
        reporter.report(ProgressEvent::IntermediatesCleanedUp { count: removed });
    }

    let report = pipeline
        .process(new_entries, &mut catalog, client, engine.extractor(), &reporter)
        .await?;

    summary.processed = report.processed;
    summary.already_present = report.already_present;
    summary.download_failed = report.failed;
    summary.enrichment_failed = report.enrichment_failed;
    summary.failed_entries = report.failed_entries;

    catalog.save()?;

    let channel = publisher.render(&catalog).await?;
    let feed_path = config.feed_path();
    write_feed(&channel, &feed_path)?;
    summary.feed_items = channel.items().len();
    reporter.report(ProgressEvent::FeedWritten {
        path: feed_path,
        items: summary.feed_items,
    });

    info!(
        discovered = summary.discovered,
        processed = summary.processed,
        already_present = summary.already_present,
        download_failed = summary.download_failed,
        enrichment_failed = summary.enrichment_failed,
        cataloged = catalog.len(),
        "Run complete"
    );

    reporter.report(ProgressEvent::RunCompleted {
        processed_count: summary.processed,
        existing_count: summary.already_present,
        failed_count: summary.download_failed,
    });

    Ok(summary)
}

/// Create the media root and put the cover image in place
fn prepare_destination(config: &ShowConfig) -> Result<(), RunError> {
    std::fs::create_dir_all(&config.dest_dir).map_err(|e| RunError::Destination {
        path: config.dest_dir.clone(),
        source: e,
    })?;

    if let Some(cover) = &config.cover_image {
        copy_cover(cover, &config.dest_dir.join(COVER_FILENAME));
    }

    Ok(())
}

fn copy_cover(source: &Path, target: &Path) {
    if target.exists() {
        return;
    }

    match std::fs::copy(source, target) {
        Ok(_) => info!(path = %target.display(), "Copied cover image"),
        Err(e) => warn!(source = %source.display(), error = %e, "Failed to copy cover image"),
    }
}
