//! Merges a crawl's candidates into the store and tracks each record's
//! lifecycle status.
//!
//! A record moves `new` → `updated` when its title or venue changes between
//! observations and to `inactive` when a crawl no longer lists it. `imported`
//! is set from outside and survives absence sweeps.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{EventPatch, EventStore, RecordFilter};
use crate::error::StoreError;
use crate::models::{Candidate, EventRecord, EventStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Added,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    #[serde(skip)]
    pub seen: HashSet<String>,
}

impl BatchOutcome {
    fn record(&mut self, change: Change) {
        match change {
            Change::Added => self.added += 1,
            Change::Updated => self.updated += 1,
            Change::Unchanged => self.unchanged += 1,
        }
    }
}

pub struct Reconciler<'a, S: EventStore> {
    store: &'a S,
}

impl<'a, S: EventStore> Reconciler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn reconcile_batch(&self, candidates: Vec<Candidate>) -> Result<BatchOutcome, StoreError> {
        self.reconcile_batch_at(candidates, Utc::now())
    }

    pub fn reconcile_batch_at(
        &self,
        candidates: Vec<Candidate>,
        now: DateTime<Utc>,
    ) -> Result<BatchOutcome, StoreError> {
        let mut outcome = BatchOutcome::default();
        for candidate in dedup_by_key(candidates) {
            let key = candidate.original_url.clone();
            let change = self.reconcile_one(candidate, now)?;
            outcome.record(change);
            outcome.seen.insert(key);
        }
        Ok(outcome)
    }

    fn reconcile_one(&self, candidate: Candidate, now: DateTime<Utc>) -> Result<Change, StoreError> {
        let existing = match self.store.find_by_key(&candidate.original_url)? {
            Some(existing) => existing,
            None => {
                tracing::debug!(title = %candidate.title, url = %candidate.original_url, "added");
                self.store
                    .insert(&EventRecord::first_seen(candidate, now))?;
                return Ok(Change::Added);
            }
        };

        if existing.title == candidate.title && existing.venue_name() == candidate.venue.name {
            self.store
                .update_fields(&candidate.original_url, &EventPatch::scraped_at(now))?;
            return Ok(Change::Unchanged);
        }

        if existing.status == EventStatus::Imported {
            // Content changes reset the curation flag; the absence sweep never does.
            tracing::warn!(
                url = %candidate.original_url,
                "content changed on an imported event, status reset to updated"
            );
        }
        tracing::debug!(title = %candidate.title, url = %candidate.original_url, "updated");
        let patch = EventPatch::payload(&candidate)
            .with_status(EventStatus::Updated)
            .with_scraped_at(now);
        self.store.update_fields(&candidate.original_url, &patch)?;
        Ok(Change::Updated)
    }

    pub fn mark_absent_inactive(&self, seen: &HashSet<String>) -> Result<usize, StoreError> {
        self.mark_absent_inactive_at(seen, Utc::now())
    }

    /// Demotes every record outside `seen` to `inactive`, except `imported`
    /// ones. Returns how many records changed status.
    pub fn mark_absent_inactive_at(
        &self,
        seen: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let filter = RecordFilter {
            key_not_in: seen.clone(),
            status_not_in: vec![EventStatus::Imported, EventStatus::Inactive],
        };
        let patch = EventPatch::status(EventStatus::Inactive).touched_at(now);
        self.store.update_many_where(&filter, &patch)
    }
}

/// Collapses repeated keys: the last occurrence wins, at the position of the first.
fn dedup_by_key(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match positions.get(&candidate.original_url) {
            Some(&index) => out[index] = candidate,
            None => {
                positions.insert(candidate.original_url.clone(), out.len());
                out.push(candidate);
            }
        }
    }
    out
}
