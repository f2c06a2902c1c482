//! The fixed, ordered set of daily sampling slots.
//!
//! Labels are opaque strings; when a label is four digits (`HHMM`) it is also
//! interpreted as a time of day so the current slot can be picked from the
//! clock. The order given at construction is the canonical serialization
//! order for cache entries.

use chrono::{NaiveTime, Timelike};

use crate::ConfigError;

pub const DEFAULT_TIMEPOINTS: [&str; 3] = ["0811", "1612", "2113"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimepointSet {
    labels: Vec<String>,
}

impl TimepointSet {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTimepoints`] if `labels` is empty,
    /// contains a blank label, or contains duplicates.
    pub fn new<I, S>(labels: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels
            .into_iter()
            .map(|l| l.into().trim().to_owned())
            .collect();
        if labels.is_empty() {
            return Err(ConfigError::InvalidTimepoints(
                "at least one label is required".to_owned(),
            ));
        }
        if labels.iter().any(String::is_empty) {
            return Err(ConfigError::InvalidTimepoints(
                "labels must not be blank".to_owned(),
            ));
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(ConfigError::InvalidTimepoints(format!(
                    "duplicate label \"{label}\""
                )));
            }
        }
        Ok(Self { labels })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Canonical position of `label`, if it belongs to the set.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.position(label).is_some()
    }

    /// The slot closest to `now` on a 24-hour circle.
    ///
    /// Falls back to the first label when no label parses as `HHMM`.
    pub fn label_for(&self, now: NaiveTime) -> &str {
        let now_min = i64::from(now.hour() * 60 + now.minute());
        self.labels
            .iter()
            .filter_map(|l| parse_hhmm(l).map(|m| (l, m)))
            .min_by_key(|(_, m)| {
                let diff = (now_min - m).abs();
                diff.min(24 * 60 - diff)
            })
            .map_or(self.labels[0].as_str(), |(l, _)| l.as_str())
    }
}

impl Default for TimepointSet {
    fn default() -> Self {
        Self {
            labels: DEFAULT_TIMEPOINTS.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

fn parse_hhmm(label: &str) -> Option<i64> {
    if label.len() != 4 || !label.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i64 = label[..2].parse().ok()?;
    let minutes: i64 = label[2..].parse().ok()?;
    (hours < 24 && minutes < 60).then_some(hours * 60 + minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn default_has_three_daily_slots_in_order() {
        let set = TimepointSet::default();
        assert_eq!(set.labels(), ["0811", "1612", "2113"]);
        assert_eq!(set.position("1612"), Some(1));
        assert!(!set.contains("0900"));
    }

    #[test]
    fn rejects_empty_and_duplicate_labels() {
        assert!(TimepointSet::new(Vec::<String>::new()).is_err());
        assert!(TimepointSet::new(["a", "a"]).is_err());
        assert!(TimepointSet::new(["a", " "]).is_err());
    }

    #[test]
    fn preserves_given_order_even_when_not_sorted() {
        let set = TimepointSet::new(["night", "morning"]).unwrap();
        assert_eq!(set.position("night"), Some(0));
        assert_eq!(set.position("morning"), Some(1));
    }

    #[test]
    fn label_for_picks_nearest_slot() {
        let set = TimepointSet::default();
        assert_eq!(set.label_for(at(8, 30)), "0811");
        assert_eq!(set.label_for(at(15, 0)), "1612");
        assert_eq!(set.label_for(at(22, 0)), "2113");
    }

    #[test]
    fn label_for_wraps_around_midnight() {
        let set = TimepointSet::default();
        // 01:00 is 3h47m after 21:13 and 7h11m before 08:11.
        assert_eq!(set.label_for(at(1, 0)), "2113");
    }

    #[test]
    fn label_for_non_clock_labels_uses_first() {
        let set = TimepointSet::new(["am", "pm"]).unwrap();
        assert_eq!(set.label_for(at(20, 0)), "am");
    }
}
