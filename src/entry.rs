use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Format of the `date` field in persisted catalog records
pub const RECORD_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Maximum length of a slug
const MAX_SLUG_LENGTH: usize = 100;

/// Sub-series of the show. Used for feed titles and filtering, never identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    #[default]
    #[serde(rename = "DVTV")]
    Main,
    #[serde(rename = "DVTV Apel")]
    Apel,
    #[serde(rename = "DVTV Forum")]
    Forum,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Main, Category::Apel, Category::Forum];

    /// Human readable label, also the persisted form
    pub fn label(self) -> &'static str {
        match self {
            Category::Main => "DVTV",
            Category::Apel => "DVTV Apel",
            Category::Forum => "DVTV Forum",
        }
    }

    /// Path segment marking the sub-series in a canonical link
    fn path_marker(self) -> Option<&'static str> {
        match self {
            Category::Main => None,
            Category::Apel => Some("apel"),
            Category::Forum => Some("forum"),
        }
    }

    /// Match a taxonomy label such as "DVTV Forum"
    pub fn from_label(label: &str) -> Option<Category> {
        let label = label.trim();
        Category::ALL
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(label))
    }

    /// Look for a sub-series marker in a link path.
    ///
    /// Only a whole path segment counts (`/dvtv/forum/...`); a slug that
    /// merely starts with the marker word is a regular episode.
    pub fn from_path(path: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|category| {
            category.path_marker().is_some_and(|marker| {
                path.split('/').any(|segment| segment.eq_ignore_ascii_case(marker))
            })
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One episode of the show, keyed by its canonical link
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Canonical remote link, the sole identity key
    pub identity: String,
    pub slug: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub detail: Option<String>,
    pub category: Category,
    pub published_at: DateTime<Tz>,
}

impl Entry {
    /// Year-month bucket directory name, e.g. "2020-06"
    pub fn bucket(&self) -> String {
        self.published_at.format("%Y-%m").to_string()
    }

    /// Media filename stem: "YYYY-MM-DD-slug"
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.published_at.format("%Y-%m-%d"), self.slug)
    }

    /// Deterministic media path below `root` for the given extension
    pub fn media_path(&self, root: &Path, extension: &str) -> PathBuf {
        root.join(self.bucket())
            .join(format!("{}.{}", self.file_stem(), extension))
    }

    /// Title used in the feed
    pub fn feed_title(&self) -> String {
        match self.title.as_deref() {
            Some(title) if !title.is_empty() => format!("{}: {}", self.category, title),
            _ => self.category.label().to_string(),
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} ({})",
            self.published_at.format("%d. %m. %Y %H:%M"),
            self.category,
            self.title.as_deref().unwrap_or("untitled"),
            self.identity
        )
    }
}

/// Serializable form of an [`Entry`] in the catalog file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRecord {
    pub link: String,
    pub slug: String,
    /// Civil time in the show's timezone, [`RECORD_DATE_FORMAT`]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default)]
    pub category: Category,
}

impl EntryRecord {
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            link: entry.identity.clone(),
            slug: entry.slug.clone(),
            date: entry.published_at.format(RECORD_DATE_FORMAT).to_string(),
            title: entry.title.clone(),
            summary: entry.summary.clone(),
            detail: entry.detail.clone(),
            category: entry.category,
        }
    }

    /// Rebuild the entry, reading `date` as civil time in `timezone`.
    /// Returns `None` when the date is malformed.
    pub fn into_entry(self, timezone: Tz) -> Option<Entry> {
        let naive = NaiveDateTime::parse_from_str(&self.date, RECORD_DATE_FORMAT).ok()?;
        let published_at = timezone.from_local_datetime(&naive).earliest()?;

        Some(Entry {
            identity: self.link,
            slug: self.slug,
            title: self.title,
            summary: self.summary,
            detail: self.detail,
            category: self.category,
            published_at,
        })
    }
}

/// Check if a character is allowed in a slug (whitelist approach)
fn is_valid_slug_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_')
}

/// Make a filesystem-safe slug out of a link path fragment
pub fn sanitize_slug(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| if is_valid_slug_char(c) { c } else { '-' })
        .collect();

    let collapsed = collapse_separators(&sanitized);
    let trimmed = collapsed.trim_matches('-');

    if trimmed.len() > MAX_SLUG_LENGTH {
        truncate_at_boundary(trimmed, MAX_SLUG_LENGTH)
    } else {
        trimmed.to_string()
    }
}

/// Collapse runs of dashes into a single dash
fn collapse_separators(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last_was_separator = false;

    for c in s.chars() {
        if c == '-' {
            if !last_was_separator {
                result.push('-');
                last_was_separator = true;
            }
        } else {
            result.push(c);
            last_was_separator = false;
        }
    }

    result
}

/// Truncate at a dash boundary if one lies in the back half
fn truncate_at_boundary(s: &str, max_len: usize) -> String {
    let truncated: String = s.chars().take(max_len).collect();
    if let Some(pos) = truncated.rfind('-')
        && pos > max_len / 2
    {
        return truncated[..pos].to_string();
    }

    truncated.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Prague;

    fn make_entry(title: Option<&str>, category: Category) -> Entry {
        Entry {
            identity: "https://video.aktualne.cz/dvtv/rozhovor/r~abc/".to_string(),
            slug: "rozhovor".to_string(),
            title: title.map(String::from),
            summary: None,
            detail: Some("Long description".to_string()),
            category,
            published_at: Prague.with_ymd_and_hms(2020, 6, 5, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn media_path_uses_month_bucket_and_date_prefix() {
        let entry = make_entry(Some("Rozhovor"), Category::Main);
        let path = entry.media_path(Path::new("/srv/podcasts"), "mp3");

        assert_eq!(
            path,
            PathBuf::from("/srv/podcasts/2020-06/2020-06-05-rozhovor.mp3")
        );
    }

    #[test]
    fn feed_title_prefixes_category() {
        assert_eq!(
            make_entry(Some("Rozhovor"), Category::Apel).feed_title(),
            "DVTV Apel: Rozhovor"
        );
        assert_eq!(
            make_entry(Some("Rozhovor"), Category::Main).feed_title(),
            "DVTV: Rozhovor"
        );
        assert_eq!(make_entry(None, Category::Forum).feed_title(), "DVTV Forum");
    }

    #[test]
    fn category_from_label_is_case_insensitive() {
        assert_eq!(Category::from_label(" dvtv forum "), Some(Category::Forum));
        assert_eq!(Category::from_label("DVTV Apel"), Some(Category::Apel));
        assert_eq!(Category::from_label("Sport"), None);
    }

    #[test]
    fn category_from_path_finds_markers() {
        assert_eq!(
            Category::from_path("/dvtv/forum/nekdo-rekl/r~1/"),
            Some(Category::Forum)
        );
        assert_eq!(
            Category::from_path("/dvtv/Apel/pomozte/r~2/"),
            Some(Category::Apel)
        );
        assert_eq!(Category::from_path("/dvtv/rozhovor-s-hostem/r~3/"), None);
    }

    #[test]
    fn category_from_path_ignores_marker_inside_words() {
        assert_eq!(Category::from_path("/dvtv/platforma-jednani/r~4/"), None);
        assert_eq!(Category::from_path("/dvtv/forum-2000-rozhovor/r~5/"), None);
        assert_eq!(Category::from_path("/dvtv/dvtv-apel-pomozte/r~6/"), None);
    }

    #[test]
    fn record_round_trip_preserves_all_fields() {
        let entry = make_entry(Some("Rozhovor"), Category::Forum);
        let record = EntryRecord::from_entry(&entry);

        assert_eq!(record.date, "2020-06-05 00:00:00");
        assert_eq!(record.into_entry(Prague), Some(entry));
    }

    #[test]
    fn record_with_bad_date_is_rejected() {
        let mut record = EntryRecord::from_entry(&make_entry(None, Category::Main));
        record.date = "yesterday".to_string();
        assert!(record.into_entry(Prague).is_none());
    }

    #[test]
    fn category_serializes_as_label() {
        let json = serde_json::to_string(&Category::Apel).unwrap();
        assert_eq!(json, "\"DVTV Apel\"");
    }

    #[test]
    fn sanitize_replaces_special_chars_with_dash() {
        assert_eq!(sanitize_slug("a:b/c\\d"), "a-b-c-d");
    }

    #[test]
    fn sanitize_handles_unicode_chars() {
        assert_eq!(sanitize_slug("příliš-žluťoučký"), "p-li-lu-ou-k");
    }

    #[test]
    fn sanitize_trims_and_collapses_dashes() {
        assert_eq!(sanitize_slug("--a---b--"), "a-b");
    }

    #[test]
    fn sanitize_truncates_long_slugs_at_boundary() {
        let long = "word-".repeat(40);
        let slug = sanitize_slug(&long);

        assert!(slug.len() <= MAX_SLUG_LENGTH);
        assert!(!slug.ends_with('-'));
    }
}
