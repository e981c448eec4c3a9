// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::entry::{Entry, EntryRecord};
use crate::error::CatalogError;

/// Parameters that shape a catalog's horizon
#[derive(Debug, Clone)]
pub struct CatalogOptions {
    /// Civil timezone the persisted dates are read in
    pub timezone: Tz,
    /// The catalog is never considered complete before this instant
    pub start_date: DateTime<Tz>,
    /// How far behind the newest entry the horizon trails
    pub lookback: Duration,
}

/// The persisted set of already processed entries of one show.
///
/// Entries are keyed by identity; inserting a known identity is a no-op.
/// The whole file is rewritten on save.
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
    options: CatalogOptions,
    entries: HashMap<String, Entry>,
}

impl Catalog {
    /// Create an empty catalog that will be saved to `path`
    pub fn new(path: impl Into<PathBuf>, options: CatalogOptions) -> Self {
        Self {
            path: path.into(),
            options,
            entries: HashMap::new(),
        }
    }

    /// Load the catalog from `path`.
    ///
    /// A missing file is a first run and yields an empty catalog. A file
    /// that exists but cannot be read or parsed is an error: continuing
    /// with an empty catalog would re-download and re-publish everything.
    pub fn load(path: &Path, options: CatalogOptions) -> Result<Self, CatalogError> {
        let mut catalog = Self::new(path, options);

        let exists = path.try_exists().map_err(|e| CatalogError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        if !exists {
            info!(path = %path.display(), "No catalog yet, starting empty");
            return Ok(catalog);
        }

        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let records: Vec<EntryRecord> =
            serde_json::from_str(&content).map_err(|e| CatalogError::JsonParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        for record in records {
            let date = record.date.clone();
            let entry = record.into_entry(catalog.options.timezone).ok_or_else(|| {
                CatalogError::InvalidRecordDate {
                    path: path.to_path_buf(),
                    date,
                }
            })?;
            catalog.insert(entry);
        }

        info!(
            path = %path.display(),
            entries = catalog.len(),
            horizon = %catalog.horizon().format("%Y-%m-%d %H:%M:%S"),
            "Loaded catalog"
        );

        Ok(catalog)
    }

    /// Write every entry to the catalog file.
    ///
    /// The JSON goes to a `.partial` sibling first and is renamed over the
    /// previous file, so an interrupted save leaves the old catalog intact.
    pub fn save(&self) -> Result<(), CatalogError> {
        let records: Vec<EntryRecord> = self
            .entries_by_date()
            .into_iter()
            .map(EntryRecord::from_entry)
            .collect();
        let json = serde_json::to_string_pretty(&records)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::WriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let partial_path = partial_path(&self.path);
        std::fs::write(&partial_path, json).map_err(|e| CatalogError::WriteFailed {
            path: partial_path.clone(),
            source: e,
        })?;
        std::fs::rename(&partial_path, &self.path).map_err(|e| CatalogError::WriteFailed {
            path: self.path.clone(),
            source: e,
        })?;

        debug!(path = %self.path.display(), entries = records.len(), "Saved catalog");
        Ok(())
    }

    /// Earliest publication time for which the catalog is considered
    /// complete: the newest entry minus the lookback window, but never
    /// before the start date.
    pub fn horizon(&self) -> DateTime<Tz> {
        let floor = self.options.start_date;

        self.entries
            .values()
            .map(|entry| entry.published_at)
            .max()
            .map(|latest| latest - self.options.lookback)
            .filter(|candidate| *candidate > floor)
            .unwrap_or(floor)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    /// Insert an entry unless its identity is already present.
    /// Returns whether the entry was added.
    pub fn insert(&mut self, entry: Entry) -> bool {
        match self.entries.entry(entry.identity.clone()) {
            MapEntry::Occupied(_) => false,
            MapEntry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    pub fn get(&self, identity: &str) -> Option<&Entry> {
        self.entries.get(identity)
    }

    /// All entries, oldest first (ties broken by identity)
    pub fn entries_by_date(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}
