//! Filename derivation and the storage-adapter boundary.
//!
//! `StorageAdapter` is the external collaborator contract; everything else
//! in this module (slugify, tail-trim) is pure, so it's tested directly
//! rather than through a fake adapter.

use async_trait::async_trait;
use log::warn;

use crate::error::{DataImportError, ErrorKind};

const FILENAME_TAIL_LIMIT: usize = 248;

/// One media class a CMS host classifies extensions into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaClass {
    Image,
    Media,
    File,
}

/// External collaborator: one instance per media class, supplied by the
/// host CMS. A narrow, async, host-supplied boundary — the adapter owns
/// where and how bytes land, this crate only calls through it.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Root of this adapter's storage, on disk or in an object store.
    fn storage_path(&self) -> &str;

    /// Directory new files of this class are written under.
    async fn get_target_dir(&self) -> String;

    /// Given a desired file name and target directory, return an absolute
    /// path unique within that directory (suffixing a collision counter if
    /// needed).
    async fn get_unique_file_name(&self, name: &str, target_dir: &str) -> String;

    /// Write the raw bytes to `relative_path` (relative to `storage_path`),
    /// returning the path that was actually written (normally the same
    /// path, echoed back for symmetry with a real object-store adapter).
    async fn save_raw(&self, bytes: &[u8], relative_path: &str) -> anyhow::Result<String>;
}

/// Selects a `StorageAdapter` by extension class. Returns `None` when no
/// adapter is registered for the extension.
pub trait StorageAdapterSelector: Send + Sync {
    fn classify(&self, extension: &str) -> Option<MediaClass>;
    fn adapter(&self, class: MediaClass) -> Option<&(dyn StorageAdapter)>;

    fn adapter_for_extension(&self, extension: &str) -> Option<&(dyn StorageAdapter)> {
        self.classify(extension).and_then(|class| self.adapter(class))
    }
}

/// Strip a single trailing `.<ext>` from the last URL path segment, keeping
/// any query-string tail intact.
fn strip_extension_keep_query(last_segment: &str, ext: &str) -> String {
    let (path_part, query_part) = match last_segment.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (last_segment, None),
    };

    let dotted = format!(".{}", ext);
    let trimmed_path = path_part.strip_suffix(&dotted).unwrap_or(path_part);

    match query_part {
        Some(q) => format!("{}?{}", trimmed_path, q),
        None => trimmed_path.to_string(),
    }
}

/// Slugify keeping only "required" changes: alphanumerics and a small set
/// of already-url-safe punctuation pass through untouched; everything else
/// becomes `-`. Runs of `-` collapse to one.
fn slugify_minimal(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
            out.push(c.to_ascii_lowercase());
            last_was_dash = false;
        } else if c == '-' {
            if !last_was_dash {
                out.push('-');
                last_was_dash = true;
            }
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }

    out
}

/// Keep the last `FILENAME_TAIL_LIMIT` characters (CDN URLs discriminate
/// more in their tail than their head) and strip one leading/trailing `-`.
fn trim_tail(slug: &str) -> String {
    let char_count = slug.chars().count();
    let tail: String = if char_count > FILENAME_TAIL_LIMIT {
        slug.chars().skip(char_count - FILENAME_TAIL_LIMIT).collect()
    } else {
        slug.to_string()
    };

    let tail = tail.strip_prefix('-').unwrap_or(&tail);
    let tail = tail.strip_suffix('-').unwrap_or(tail);
    tail.to_string()
}

/// Build the slug-safe, length-capped filename for a fetched asset.
pub fn build_filename(url: &str, extension: &str) -> String {
    let path_and_query = url::Url::parse(url)
        .map(|u| {
            let mut s = u.path().to_string();
            if let Some(q) = u.query() {
                s.push('?');
                s.push_str(q);
            }
            s
        })
        .unwrap_or_else(|_| url.to_string());

    let last_segment = path_and_query.rsplit('/').next().unwrap_or(&path_and_query);
    let stripped = strip_extension_keep_query(last_segment, extension);
    let slug = slugify_minimal(&stripped);
    let trimmed = trim_tail(&slug);
    let trimmed = if trimmed.is_empty() { "asset".to_string() } else { trimmed };

    format!("{}.{}", trimmed, extension)
}

/// Derive a name, ask the adapter for somewhere unique to put it, write the
/// bytes, and return the path relative to the adapter's storage root.
/// Returns `Ok(None)` when no adapter is registered for the extension.
pub async fn store(
    selector: &dyn StorageAdapterSelector,
    url: &str,
    extension: &str,
    bytes: &[u8],
) -> Result<Option<String>, DataImportError> {
    let Some(adapter) = selector.adapter_for_extension(extension) else {
        warn!("no storage adapter registered for extension '{}', skipping rewrite for {}", extension, url);
        return Ok(None);
    };

    let filename = build_filename(url, extension);
    let target_dir = adapter.get_target_dir().await;
    let unique_path = adapter.get_unique_file_name(&filename, &target_dir).await;

    let relative_path = unique_path
        .strip_prefix(adapter.storage_path())
        .unwrap_or(&unique_path)
        .trim_start_matches('/')
        .to_string();

    let stored = adapter
        .save_raw(bytes, &relative_path)
        .await
        .map_err(|e| DataImportError::with_source(ErrorKind::Storage, "failed to write media to storage", e))?;

    Ok(Some(stored))
}
