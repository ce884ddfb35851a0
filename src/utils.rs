use chrono::{DateTime, SecondsFormat, Utc};
use dirs::data_dir;
use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::StoreError;

static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let base = data_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    base.join("sydney-events")
});

pub fn data_root() -> PathBuf {
    DATA_ROOT.clone()
}

pub fn database_path() -> PathBuf {
    data_root().join("events.sqlite")
}

pub fn config_path() -> PathBuf {
    data_root().join("config.json")
}

pub fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if parent.as_os_str().is_empty() {
            return;
        }
        if let Err(err) = fs::create_dir_all(parent) {
            tracing::warn!(?parent, %err, "failed to create parent directory");
        }
    }
}

/// Fixed-width UTC timestamps so stored values sort lexically.
pub fn to_rfc3339(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn from_rfc3339(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidTimestamp {
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_fixed_width_and_round_trip() {
        let whole = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let text = to_rfc3339(&whole);
        assert_eq!(text, "2026-03-01T09:30:00.000000Z");
        assert_eq!(from_rfc3339(&text).unwrap(), whole);
    }

    #[test]
    fn bad_timestamp_is_a_store_error() {
        assert!(matches!(
            from_rfc3339("yesterday"),
            Err(StoreError::InvalidTimestamp { .. })
        ));
    }
}
