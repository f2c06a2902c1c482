//! In-memory hash cache: url → date → timepoint → hash entry.
//!
//! Entries are kept in `BTreeMap`s keyed by URL, date and the timepoint's
//! canonical position, so iteration and serialization are always in
//! canonical order no matter how entries were inserted.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use livecheck_core::{FrameHashSample, HashTriple, PerceptualHash, TimepointSet};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// One cached sample. Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub phash: PerceptualHash,
    pub ahash: PerceptualHash,
    pub dhash: PerceptualHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CacheEntry {
    pub fn new(hashes: HashTriple, error: Option<String>) -> Self {
        Self {
            phash: hashes.phash,
            ahash: hashes.ahash,
            dhash: hashes.dhash,
            error,
        }
    }

    pub fn hashes(&self) -> HashTriple {
        HashTriple {
            phash: self.phash,
            ahash: self.ahash,
            dhash: self.dhash,
        }
    }
}

type Slots = BTreeMap<usize, CacheEntry>;
type Dates = BTreeMap<NaiveDate, Slots>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashCache {
    timepoints: TimepointSet,
    urls: BTreeMap<String, Dates>,
}

impl HashCache {
    pub fn new(timepoints: TimepointSet) -> Self {
        Self {
            timepoints,
            urls: BTreeMap::new(),
        }
    }

    pub fn timepoints(&self) -> &TimepointSet {
        &self.timepoints
    }

    /// Inserts or overwrites the entry for `(url, date, label)`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::UnknownTimepoint`] if `label` is not part of
    /// this cache's timepoint set.
    pub fn upsert(
        &mut self,
        url: &str,
        date: NaiveDate,
        label: &str,
        entry: CacheEntry,
    ) -> Result<(), CacheError> {
        let slot = self
            .timepoints
            .position(label)
            .ok_or_else(|| CacheError::UnknownTimepoint {
                label: label.to_owned(),
            })?;
        self.urls
            .entry(url.to_owned())
            .or_default()
            .entry(date)
            .or_default()
            .insert(slot, entry);
        Ok(())
    }

    /// Records a stage 3 sample.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::MissingHashes`] for a sample without hashes and
    /// [`CacheError::UnknownTimepoint`] for a foreign label.
    pub fn upsert_sample(&mut self, sample: &FrameHashSample) -> Result<(), CacheError> {
        let hashes = sample.hashes.ok_or_else(|| CacheError::MissingHashes {
            url: sample.url.clone(),
        })?;
        self.upsert(
            &sample.url,
            sample.sample_date,
            &sample.timepoint,
            CacheEntry::new(hashes, sample.error.clone()),
        )
    }

    pub fn get(&self, url: &str, date: NaiveDate, label: &str) -> Option<&CacheEntry> {
        let slot = self.timepoints.position(label)?;
        self.urls.get(url)?.get(&date)?.get(&slot)
    }

    /// Upserts every entry of `delta`; keys absent from `delta` are left
    /// alone. Returns the number of entries applied.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::UnknownTimepoint`] if `delta` uses a label this
    /// cache does not know.
    pub fn merge(&mut self, delta: &HashCache) -> Result<usize, CacheError> {
        let mut applied = 0;
        for (url, date, label, entry) in delta.entries() {
            self.upsert(url, date, label, entry.clone())?;
            applied += 1;
        }
        Ok(applied)
    }

    /// All entries in canonical order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, NaiveDate, &str, &CacheEntry)> + '_ {
        self.urls.iter().flat_map(move |(url, dates)| {
            dates.iter().flat_map(move |(date, slots)| {
                slots.iter().map(move |(slot, entry)| {
                    (
                        url.as_str(),
                        *date,
                        self.timepoints.labels()[*slot].as_str(),
                        entry,
                    )
                })
            })
        })
    }

    /// Every cached sample for `url`, oldest first.
    pub fn history(&self, url: &str) -> Vec<FrameHashSample> {
        let Some(dates) = self.urls.get(url) else {
            return Vec::new();
        };
        dates
            .iter()
            .flat_map(|(date, slots)| {
                slots.iter().map(move |(slot, entry)| FrameHashSample {
                    url: url.to_owned(),
                    timepoint: self.timepoints.labels()[*slot].clone(),
                    sample_date: *date,
                    hashes: Some(entry.hashes()),
                    error: entry.error.clone(),
                })
            })
            .collect()
    }

    pub fn url_count(&self) -> usize {
        self.urls.len()
    }

    pub fn len(&self) -> usize {
        self.urls
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Earliest and latest sample dates.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = self.urls.values().flat_map(BTreeMap::keys);
        let first = *dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(*d), hi.max(*d))))
    }

    /// Canonical pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialize`] if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, CacheError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses cache JSON, dropping entries that cannot be used: unparseable
    /// dates, labels outside `timepoints`, and missing or malformed hashes.
    /// Each dropped entry is logged.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialize`] if the text is not a JSON object of
    /// the expected nesting.
    pub fn from_json(text: &str, timepoints: TimepointSet) -> Result<Self, CacheError> {
        let raw: BTreeMap<String, BTreeMap<String, BTreeMap<String, RawEntry>>> =
            serde_json::from_str(text)?;
        let mut cache = HashCache::new(timepoints);
        let mut dropped = 0usize;

        for (url, dates) in raw {
            for (date_key, slots) in dates {
                let Ok(date) = NaiveDate::parse_from_str(&date_key, "%Y-%m-%d") else {
                    tracing::warn!(url = %url, date = %date_key, "dropping cache date: not YYYY-MM-DD");
                    dropped += slots.len();
                    continue;
                };
                for (label, raw_entry) in slots {
                    let Some(entry) = raw_entry.into_entry() else {
                        tracing::warn!(url = %url, %date, label = %label, "dropping cache entry without usable hashes");
                        dropped += 1;
                        continue;
                    };
                    if let Err(e) = cache.upsert(&url, date, &label, entry) {
                        tracing::warn!(url = %url, %date, error = %e, "dropping cache entry");
                        dropped += 1;
                    }
                }
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, kept = cache.len(), "cache loaded with dropped entries");
        }
        Ok(cache)
    }
}

/// Loosely typed entry as found on disk; legacy files carry `null` hashes.
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    phash: Option<String>,
    #[serde(default)]
    ahash: Option<String>,
    #[serde(default)]
    dhash: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl RawEntry {
    fn into_entry(self) -> Option<CacheEntry> {
        Some(CacheEntry {
            phash: self.phash?.parse().ok()?,
            ahash: self.ahash?.parse().ok()?,
            dhash: self.dhash?.parse().ok()?,
            error: self.error.filter(|e| !e.is_empty()),
        })
    }
}

impl Serialize for HashCache {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.urls.len()))?;
        for (url, dates) in &self.urls {
            map.serialize_entry(
                url,
                &DatesView {
                    dates,
                    timepoints: &self.timepoints,
                },
            )?;
        }
        map.end()
    }
}

struct DatesView<'a> {
    dates: &'a Dates,
    timepoints: &'a TimepointSet,
}

impl Serialize for DatesView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.dates.len()))?;
        for (date, slots) in self.dates {
            map.serialize_entry(
                &date.format("%Y-%m-%d").to_string(),
                &SlotsView {
                    slots,
                    timepoints: self.timepoints,
                },
            )?;
        }
        map.end()
    }
}

struct SlotsView<'a> {
    slots: &'a Slots,
    timepoints: &'a TimepointSet,
}

impl Serialize for SlotsView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let labels = self.timepoints.labels();
        let mut map = serializer.serialize_map(Some(self.slots.len()))?;
        for (slot, entry) in self.slots {
            map.serialize_entry(&labels[*slot], entry)?;
        }
        map.end()
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
