//! On-disk cache layout and the serial merge of shard deltas.
//!
//! ```text
//! <root>/total_cache.json                      canonical store
//! <root>/merge_record.json                     { "last_merged_date": "YYYY-MM-DD" }
//! <root>/chunk/<YYYY-MM-DD>/<shard-id>_cache.json   shard deltas
//! ```
//!
//! Only the coordinator calls [`CacheStore::merge_pending`] and
//! [`CacheStore::clean`]; shards only ever write their own delta file.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use livecheck_core::TimepointSet;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::store::HashCache;

const TOTAL_CACHE_FILE: &str = "total_cache.json";
const MERGE_RECORD_FILE: &str = "merge_record.json";
const DELTA_DIR: &str = "chunk";
const DELTA_SUFFIX: &str = "_cache.json";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// High-water mark of merged delta dates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_merged_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub merged_dates: Vec<NaiveDate>,
    pub files: usize,
    pub entries: usize,
    pub last_merged_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub urls: usize,
    pub entries: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub last_merged_date: Option<NaiveDate>,
    pub pending_dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    timepoints: TimepointSet,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>, timepoints: TimepointSet) -> Self {
        Self {
            root: root.into(),
            timepoints,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn total_cache_path(&self) -> PathBuf {
        self.root.join(TOTAL_CACHE_FILE)
    }

    pub fn merge_record_path(&self) -> PathBuf {
        self.root.join(MERGE_RECORD_FILE)
    }

    pub fn delta_dir(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(DELTA_DIR)
            .join(date.format(DATE_FORMAT).to_string())
    }

    /// Path of a shard's delta. Callers writing to it go through
    /// [`CacheStore::write_delta`], which rejects ids that would escape the
    /// dated directory.
    pub fn delta_path(&self, date: NaiveDate, shard_id: &str) -> PathBuf {
        self.delta_dir(date).join(format!("{shard_id}{DELTA_SUFFIX}"))
    }

    pub fn timepoints(&self) -> &TimepointSet {
        &self.timepoints
    }

    /// An empty cache using this store's timepoint set.
    pub fn empty_cache(&self) -> HashCache {
        HashCache::new(self.timepoints.clone())
    }

    /// Loads the canonical store; a missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the file exists but cannot be read or parsed.
    pub fn load_canonical(&self) -> Result<HashCache, CacheError> {
        self.load_cache_file(&self.total_cache_path())
    }

    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be serialized or written.
    pub fn write_canonical(&self, cache: &HashCache) -> Result<(), CacheError> {
        write_atomic(&self.total_cache_path(), cache.to_json_pretty()?.as_bytes())
    }

    /// Writes one shard's delta under the dated delta directory. An existing
    /// delta for the same date and shard (an earlier timepoint) is folded in
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if an existing delta cannot be read, or the
    /// delta cannot be serialized or written.
    pub fn write_delta(
        &self,
        date: NaiveDate,
        shard_id: &str,
        delta: &HashCache,
    ) -> Result<PathBuf, CacheError> {
        validate_shard_id(shard_id)?;
        let path = self.delta_path(date, shard_id);
        let mut combined = self.load_cache_file(&path)?;
        combined.merge(delta)?;
        write_atomic(&path, combined.to_json_pretty()?.as_bytes())?;
        tracing::info!(
            path = %path.display(),
            entries = delta.len(),
            total = combined.len(),
            "cache delta written"
        );
        Ok(path)
    }

    /// # Errors
    ///
    /// Returns [`CacheError`] if the record exists but cannot be read or
    /// parsed.
    pub fn load_merge_record(&self) -> Result<MergeRecord, CacheError> {
        let path = self.merge_record_path();
        match read_optional(&path)? {
            Some(text) => {
                serde_json::from_str(&text).map_err(|source| CacheError::Json { path, source })
            }
            None => Ok(MergeRecord::default()),
        }
    }

    fn write_merge_record(&self, record: &MergeRecord) -> Result<(), CacheError> {
        let text = serde_json::to_string_pretty(record)?;
        write_atomic(&self.merge_record_path(), text.as_bytes())
    }

    /// Dated delta directories, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the delta directory cannot be listed.
    pub fn delta_dates(&self) -> Result<Vec<NaiveDate>, CacheError> {
        let dir = self.root.join(DELTA_DIR);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(dir, e)),
        };
        let mut dates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&dir, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            match NaiveDate::parse_from_str(&name, DATE_FORMAT) {
                Ok(date) => dates.push(date),
                Err(_) => tracing::debug!(dir = %name, "ignoring non-date delta directory"),
            }
        }
        dates.sort_unstable();
        Ok(dates)
    }

    /// Delta dates at or after the high-water mark. The mark's own date is
    /// included so a shard that finished after an earlier same-day merge is
    /// still picked up.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the merge record or delta directory cannot
    /// be read.
    pub fn pending_dates(&self) -> Result<Vec<NaiveDate>, CacheError> {
        let record = self.load_merge_record()?;
        let dates = self.delta_dates()?;
        Ok(match record.last_merged_date {
            Some(mark) => dates.into_iter().filter(|d| *d >= mark).collect(),
            None => dates,
        })
    }

    /// Merges every pending delta into the canonical store, then writes the
    /// sorted store and advances the high-water mark. Writes nothing when no
    /// delta is pending.
    ///
    /// The mark's own date stays pending, so while its delta directory exists
    /// every call re-reads those deltas and rewrites the canonical store.
    /// Upsert makes that re-merge a no-op on content; [`CacheStore::clean`]
    /// only removes older dates, so the cost is bounded by one day of deltas.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on any read, parse, or write failure. A delta
    /// that fails to load leaves the canonical store and merge record as
    /// they were.
    pub fn merge_pending(&self) -> Result<MergeReport, CacheError> {
        let pending = self.pending_dates()?;
        let record = self.load_merge_record()?;
        if pending.is_empty() {
            tracing::info!("no pending cache deltas");
            return Ok(MergeReport {
                last_merged_date: record.last_merged_date,
                ..MergeReport::default()
            });
        }

        let mut canonical = self.load_canonical()?;
        let mut report = MergeReport::default();
        for date in &pending {
            for path in self.delta_files(*date)? {
                let delta = self.load_cache_file(&path)?;
                let applied = canonical.merge(&delta)?;
                tracing::debug!(path = %path.display(), applied, "delta merged");
                report.files += 1;
                report.entries += applied;
            }
            report.merged_dates.push(*date);
        }

        self.write_canonical(&canonical)?;
        let mark = pending.iter().max().copied().max(record.last_merged_date);
        self.write_merge_record(&MergeRecord {
            last_merged_date: mark,
        })?;
        report.last_merged_date = mark;

        tracing::info!(
            dates = report.merged_dates.len(),
            files = report.files,
            entries = report.entries,
            urls = canonical.url_count(),
            last_merged_date = ?mark,
            "cache merge complete"
        );
        Ok(report)
    }

    /// Removes delta directories strictly older than the high-water mark.
    /// Returns the removed dates.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the record cannot be read or a directory
    /// cannot be removed.
    pub fn clean(&self) -> Result<Vec<NaiveDate>, CacheError> {
        let Some(mark) = self.load_merge_record()?.last_merged_date else {
            tracing::info!("nothing merged yet, no deltas removed");
            return Ok(Vec::new());
        };
        let mut removed = Vec::new();
        for date in self.delta_dates()? {
            if date >= mark {
                continue;
            }
            let dir = self.delta_dir(date);
            std::fs::remove_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
            tracing::info!(dir = %dir.display(), "merged delta directory removed");
            removed.push(date);
        }
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns [`CacheError`] if the store, record or delta directory cannot
    /// be read.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let canonical = self.load_canonical()?;
        let range = canonical.date_range();
        Ok(CacheStats {
            urls: canonical.url_count(),
            entries: canonical.len(),
            first_date: range.map(|(lo, _)| lo),
            last_date: range.map(|(_, hi)| hi),
            last_merged_date: self.load_merge_record()?.last_merged_date,
            pending_dates: self.pending_dates()?,
        })
    }

    /// Delta files for `date` in name order.
    fn delta_files(&self, date: NaiveDate) -> Result<Vec<PathBuf>, CacheError> {
        let dir = self.delta_dir(date);
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| CacheError::io(&dir, e))? {
            let path = entry.map_err(|e| CacheError::io(&dir, e))?.path();
            let is_delta = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(DELTA_SUFFIX));
            if is_delta && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn load_cache_file(&self, path: &Path) -> Result<HashCache, CacheError> {
        match read_optional(path)? {
            Some(text) => {
                HashCache::from_json(&text, self.timepoints.clone()).map_err(|e| match e {
                    CacheError::Serialize(source) => CacheError::Json {
                        path: path.to_path_buf(),
                        source,
                    },
                    other => other,
                })
            }
            None => Ok(self.empty_cache()),
        }
    }
}

/// Shard ids become file names under `chunk/<date>/`, so they must not be
/// empty, contain a path separator, or refer to a parent directory.
///
/// # Errors
///
/// Returns [`CacheError::InvalidShardId`] for any other shape.
pub fn validate_shard_id(id: &str) -> Result<(), CacheError> {
    let bad = id.trim().is_empty()
        || id.contains(['/', '\\'])
        || id.contains("..")
        || id == ".";
    if bad {
        return Err(CacheError::InvalidShardId { id: id.to_owned() });
    }
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>, CacheError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

/// Writes `bytes` to a temporary sibling of `path`, then renames it over
/// `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| CacheError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| CacheError::io(tmp.path(), e))?;
    tmp.write_all(b"\n").map_err(|e| CacheError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| CacheError::io(path, e.error))?;
    Ok(())
}
