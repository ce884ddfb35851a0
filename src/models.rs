use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    New,
    Updated,
    Inactive,
    Imported,
}

impl EventStatus {
    pub const ALL: [EventStatus; 4] = [
        EventStatus::New,
        EventStatus::Updated,
        EventStatus::Inactive,
        EventStatus::Imported,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::New => "new",
            EventStatus::Updated => "updated",
            EventStatus::Inactive => "inactive",
            EventStatus::Imported => "imported",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EventStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| StoreError::InvalidStatus {
                value: value.to_string(),
            })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Venue {
    pub name: String,
    pub address: String,
}

/// One parsed listing entry, not yet reconciled against the store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub original_url: String,
    pub title: String,
    pub venue: Venue,
    pub description: String,
    pub category: Vec<String>,
    pub image_url: String,
    pub city: String,
    pub source_site: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String, // sha256(original_url), first 16 hex chars
    pub original_url: String,
    pub title: String,
    pub venue: Venue,
    pub description: String,
    pub category: Vec<String>,
    pub image_url: String,
    pub city: String,
    pub source_site: String,
    pub status: EventStatus,
    pub date: DateTime<Utc>,
    pub last_scraped_time: DateTime<Utc>,
    pub imported_by: Option<String>,
    pub imported_at: Option<DateTime<Utc>>,
    pub import_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventRecord {
    /// Builds the record stored on first observation of a candidate.
    pub fn first_seen(candidate: Candidate, now: DateTime<Utc>) -> Self {
        Self {
            id: record_id(&candidate.original_url),
            original_url: candidate.original_url,
            title: candidate.title,
            venue: candidate.venue,
            description: candidate.description,
            category: candidate.category,
            image_url: candidate.image_url,
            city: candidate.city,
            source_site: candidate.source_site,
            status: EventStatus::New,
            date: now,
            last_scraped_time: now,
            imported_by: None,
            imported_at: None,
            import_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn venue_name(&self) -> &str {
        &self.venue.name
    }
}

pub fn record_id(original_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(original_url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in EventStatus::ALL {
            assert_eq!(status.as_str().parse::<EventStatus>().unwrap(), status);
        }
        assert!("archived".parse::<EventStatus>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&EventStatus::Imported).unwrap();
        assert_eq!(json, "\"imported\"");
    }

    #[test]
    fn record_id_is_stable_and_short() {
        let a = record_id("https://www.eventbrite.com.au/e/jazz-night-123");
        let b = record_id("https://www.eventbrite.com.au/e/jazz-night-123");
        let c = record_id("https://www.eventbrite.com.au/e/jazz-night-124");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
