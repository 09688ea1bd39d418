//! Event grouping.
//!
//! Tiles that belong to the same flood event share a date range encoded in
//! their file name, for example
//! `WD_MERGE_2024-01-01---2024-01-05_duration_12.tif`. The grouping key is
//! derived by an [`EventKeyStrategy`]; [`DateRangeKey`] implements the naming
//! scheme above and falls back to the file stem for anything else.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// File name of the global composite, excluded from event inputs.
pub const COMPOSITE_FILE_NAME: &str = "flood_ALL_events.tif";

/// Grouping key for one flood event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey(String);

impl EventKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the per-event output raster, `flood_<key>.tif`.
    pub fn output_file_name(&self) -> String {
        format!("flood_{}.tif", self.0)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps a tile identifier (usually a file name) to its event key.
pub trait EventKeyStrategy: Send + Sync {
    fn key_for(&self, identifier: &str) -> EventKey;
}

/// `<prefix>_<YYYY-MM-DD>---<YYYY-MM-DD>_<suffix>` -> `<start>__<end>`.
///
/// Both dates must exist on the calendar. A name such as
/// `WD_MERGE_2024-02-30---2024-03-01_x.tif` does not match and keys on its
/// file stem instead, so it never merges with a real event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRangeKey {
    pub prefix: String,
}

impl Default for DateRangeKey {
    fn default() -> Self {
        Self {
            prefix: "WD_MERGE".to_string(),
        }
    }
}

impl DateRangeKey {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Extract the two dates from the first occurrence of the naming scheme
    /// anywhere in `name`.
    pub fn parse_dates(&self, name: &str) -> Option<(NaiveDate, NaiveDate)> {
        name.match_indices(self.prefix.as_str())
            .find_map(|(i, _)| Self::dates_after(name.get(i + self.prefix.len()..)?))
    }

    fn dates_after(rest: &str) -> Option<(NaiveDate, NaiveDate)> {
        let rest = rest.strip_prefix('_')?;

        let start = rest.get(..10)?;
        let rest = rest.get(10..)?.strip_prefix("---")?;
        let end = rest.get(..10)?;
        rest.get(10..)?.strip_prefix('_')?;

        let start = parse_date(start)?;
        let end = parse_date(end)?;
        Some((start, end))
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

impl EventKeyStrategy for DateRangeKey {
    fn key_for(&self, identifier: &str) -> EventKey {
        let name = Path::new(identifier)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(identifier);

        match self.parse_dates(name) {
            Some((start, end)) => EventKey(format!(
                "{}__{}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            )),
            None => EventKey(file_stem(identifier)),
        }
    }
}

fn file_stem(identifier: &str) -> String {
    Path::new(identifier)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(identifier)
        .to_string()
}

/// All source files of one event, sorted by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub key: EventKey,
    pub sources: Vec<PathBuf>,
}

impl Event {
    pub fn output_file_name(&self) -> String {
        self.key.output_file_name()
    }
}

/// Group files by event key. Iteration order of the map is deterministic.
pub fn group_by_event<I, P>(paths: I, strategy: &dyn EventKeyStrategy) -> BTreeMap<EventKey, Event>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut events: BTreeMap<EventKey, Event> = BTreeMap::new();

    for path in paths {
        let path = path.into();
        let identifier = path.to_string_lossy();
        let key = strategy.key_for(&identifier);

        events
            .entry(key.clone())
            .or_insert_with(|| Event {
                key,
                sources: Vec::new(),
            })
            .sources
            .push(path);
    }

    for event in events.values_mut() {
        event.sources.sort();
    }

    events
}
