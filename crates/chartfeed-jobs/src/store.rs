//! Durable bar storage.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chartfeed_types::{Bar, SeriesKey};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Errors raised by a [`BarStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to create a directory.
    #[error("Failed to create directory '{path}': {source}")]
    CreateDir {
        /// The path that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to read a file.
    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to write a file.
    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        /// The path that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A series file could not be parsed.
    #[error("Failed to parse series file '{path}': {source}")]
    ParseJson {
        /// The path that could not be parsed.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Failed to serialize a series.
    #[error("Failed to serialize series: {0}")]
    SerializeJson(#[from] serde_json::Error),
}

/// Durable store of bar series keyed by `(exchange, symbol, interval, timestamp)`.
pub trait BarStore: Send + Sync + std::fmt::Debug {
    /// Returns the bars of `series` in `[start, end]`, sorted ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the series cannot be read.
    fn read_range(
        &self,
        series: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, StoreError>;

    /// Inserts or overwrites bars by timestamp, returning how many were given.
    ///
    /// Writing the same bars twice leaves the store unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the series cannot be written.
    fn upsert(&self, series: &SeriesKey, bars: &[Bar]) -> Result<usize, StoreError>;
}

/// [`BarStore`] keeping one JSON file per series.
///
/// Files live at `{base}/{exchange}/{symbol}/{interval}.json` and are replaced
/// atomically on every upsert.
#[derive(Debug, Clone)]
pub struct FileBarStore {
    base_path: PathBuf,
}

impl FileBarStore {
    /// Creates a store rooted at `base_path`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(base_path: PathBuf) -> Result<Self, StoreError> {
        create_dir(&base_path)?;
        Ok(Self { base_path })
    }

    /// Returns the default data directory.
    ///
    /// - Linux: `~/.local/share/chartfeed/bars/`
    /// - macOS: `~/Library/Application Support/chartfeed/bars/`
    /// - Windows: `C:\Users\<User>\AppData\Roaming\chartfeed\bars\`
    #[must_use]
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "chartfeed")
            .map_or_else(dirs_fallback, |dirs| dirs.data_dir().to_path_buf())
            .join("bars")
    }

    /// Creates a store at the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_default_path() -> Result<Self, StoreError> {
        Self::new(Self::default_path())
    }

    /// Returns the base path.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Returns the file holding `series`.
    #[must_use]
    pub fn series_path(&self, series: &SeriesKey) -> PathBuf {
        self.base_path
            .join(sanitize(&series.exchange))
            .join(sanitize(&series.symbol))
            .join(format!("{}.json", series.interval))
    }

    fn load(&self, path: &Path) -> Result<BTreeMap<i64, Bar>, StoreError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(path).map_err(|e| StoreError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let bars: Vec<Bar> = serde_json::from_str(&content).map_err(|e| StoreError::ParseJson {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(bars.into_iter().map(|b| (b.unix_seconds(), b)).collect())
    }
}

impl BarStore for FileBarStore {
    fn read_range(
        &self,
        series: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        let rows = self.load(&self.series_path(series))?;
        Ok(rows
            .range(start.timestamp()..=end.timestamp())
            .map(|(_, bar)| *bar)
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .collect())
    }

    fn upsert(&self, series: &SeriesKey, bars: &[Bar]) -> Result<usize, StoreError> {
        let path = self.series_path(series);
        let dir = path.parent().unwrap_or(&self.base_path).to_path_buf();
        create_dir(&dir)?;

        let mut rows = self.load(&path)?;
        for bar in bars {
            rows.insert(bar.unix_seconds(), *bar);
        }
        let merged: Vec<&Bar> = rows.values().collect();
        let json = serde_json::to_string(&merged)?;

        let write_err = |e: std::io::Error| StoreError::WriteFile {
            path: path.clone(),
            source: e,
        };
        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        debug!(series = %series, written = bars.len(), total = rows.len(), "series upserted");
        Ok(bars.len())
    }
}

fn create_dir(path: &Path) -> Result<(), StoreError> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| StoreError::CreateDir {
        path: path.to_path_buf(),
        source: e,
    })
}

fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".chartfeed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chartfeed_types::Interval;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn bar(secs: i64, close: f64) -> Bar {
        Bar::new(Utc.timestamp_opt(secs, 0).unwrap(), 1.0, 2.0, 0.5, close, 1.0)
    }

    fn series() -> SeriesKey {
        SeriesKey::new("NYSE", "BRK/B", Interval::Minute1)
    }

    #[test]
    fn test_upsert_overwrites_by_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBarStore::new(temp_dir.path().to_path_buf()).unwrap();

        store.upsert(&series(), &[bar(60, 1.0), bar(0, 1.0)]).unwrap();
        store.upsert(&series(), &[bar(60, 9.0), bar(120, 1.0)]).unwrap();
        store.upsert(&series(), &[bar(60, 9.0), bar(120, 1.0)]).unwrap();

        let all = store
            .read_range(&series(), Utc.timestamp_opt(0, 0).unwrap(), Utc.timestamp_opt(600, 0).unwrap())
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_relative_eq!(all[1].close, 9.0);
        assert!(all.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_read_range_bounds_and_missing_series() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBarStore::new(temp_dir.path().to_path_buf()).unwrap();
        store
            .upsert(&series(), &[bar(0, 1.0), bar(60, 1.0), bar(120, 1.0)])
            .unwrap();

        let some = store
            .read_range(&series(), Utc.timestamp_opt(60, 0).unwrap(), Utc.timestamp_opt(120, 0).unwrap())
            .unwrap();
        assert_eq!(some.len(), 2);

        let other = SeriesKey::new("NYSE", "IBM", Interval::Minute1);
        let none = store
            .read_range(&other, Utc.timestamp_opt(0, 0).unwrap(), Utc.timestamp_opt(120, 0).unwrap())
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_series_path_is_sanitized() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBarStore::new(temp_dir.path().to_path_buf()).unwrap();
        let path = store.series_path(&series());
        assert!(path.starts_with(temp_dir.path()));
        assert!(path.ends_with("NYSE/BRK_B/1m.json"));

        let sneaky = SeriesKey::new("..", "x", Interval::Hour1);
        assert!(store.series_path(&sneaky).starts_with(temp_dir.path().join("_")));
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBarStore::new(temp_dir.path().to_path_buf()).unwrap();
        let path = store.series_path(&series());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();

        let err = store
            .read_range(&series(), Utc.timestamp_opt(0, 0).unwrap(), Utc.timestamp_opt(1, 0).unwrap())
            .unwrap_err();
        assert!(matches!(err, StoreError::ParseJson { .. }));
    }
}
