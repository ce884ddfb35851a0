use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};

use crate::error::StoreError;
use crate::models::{Candidate, EventRecord, EventStatus, Venue};
use crate::utils::{self, from_rfc3339, to_rfc3339};

const COLUMNS: &str = "id, original_url, title, venue_name, venue_address, description, category,
     image_url, city, source_site, status, event_date, last_scraped_utc, imported_by,
     imported_at_utc, import_notes, created_at_utc, updated_at_utc";

const DEFAULT_IMPORT_NOTES: &str = "Standard Import";

/// Keyed document store the reconciler writes through.
pub trait EventStore {
    fn find_by_key(&self, original_url: &str) -> Result<Option<EventRecord>, StoreError>;
    fn insert(&self, record: &EventRecord) -> Result<(), StoreError>;
    /// Returns false when no record has the key.
    fn update_fields(&self, original_url: &str, patch: &EventPatch) -> Result<bool, StoreError>;
    fn update_many_where(
        &self,
        filter: &RecordFilter,
        patch: &EventPatch,
    ) -> Result<usize, StoreError>;
}

/// Typed field map; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub venue: Option<Venue>,
    pub description: Option<String>,
    pub category: Option<Vec<String>>,
    pub image_url: Option<String>,
    pub city: Option<String>,
    pub source_site: Option<String>,
    pub status: Option<EventStatus>,
    pub last_scraped_time: Option<DateTime<Utc>>,
    pub imported_by: Option<String>,
    pub imported_at: Option<DateTime<Utc>>,
    pub import_notes: Option<String>,
    /// Stamp for `updated_at`; the wall clock when unset.
    pub updated_at: Option<DateTime<Utc>>,
}

impl EventPatch {
    /// The full descriptive payload of a candidate.
    pub fn payload(candidate: &Candidate) -> Self {
        Self {
            title: Some(candidate.title.clone()),
            venue: Some(candidate.venue.clone()),
            description: Some(candidate.description.clone()),
            category: Some(candidate.category.clone()),
            image_url: Some(candidate.image_url.clone()),
            city: Some(candidate.city.clone()),
            source_site: Some(candidate.source_site.clone()),
            ..Self::default()
        }
    }

    pub fn status(status: EventStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn scraped_at(now: DateTime<Utc>) -> Self {
        Self {
            last_scraped_time: Some(now),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_scraped_at(mut self, now: DateTime<Utc>) -> Self {
        self.last_scraped_time = Some(now);
        self.updated_at = Some(now);
        self
    }

    pub fn touched_at(mut self, now: DateTime<Utc>) -> Self {
        self.updated_at = Some(now);
        self
    }

    fn assignments(&self) -> Result<Vec<(&'static str, Box<dyn ToSql>)>, StoreError> {
        let mut out: Vec<(&'static str, Box<dyn ToSql>)> = Vec::new();
        if let Some(title) = &self.title {
            out.push(("title", Box::new(title.clone())));
        }
        if let Some(venue) = &self.venue {
            out.push(("venue_name", Box::new(venue.name.clone())));
            out.push(("venue_address", Box::new(venue.address.clone())));
        }
        if let Some(description) = &self.description {
            out.push(("description", Box::new(description.clone())));
        }
        if let Some(category) = &self.category {
            out.push(("category", Box::new(serde_json::to_string(category)?)));
        }
        if let Some(image_url) = &self.image_url {
            out.push(("image_url", Box::new(image_url.clone())));
        }
        if let Some(city) = &self.city {
            out.push(("city", Box::new(city.clone())));
        }
        if let Some(source_site) = &self.source_site {
            out.push(("source_site", Box::new(source_site.clone())));
        }
        if let Some(status) = self.status {
            out.push(("status", Box::new(status.as_str())));
        }
        if let Some(at) = &self.last_scraped_time {
            out.push(("last_scraped_utc", Box::new(to_rfc3339(at))));
        }
        if let Some(by) = &self.imported_by {
            out.push(("imported_by", Box::new(by.clone())));
        }
        if let Some(at) = &self.imported_at {
            out.push(("imported_at_utc", Box::new(to_rfc3339(at))));
        }
        if let Some(notes) = &self.import_notes {
            out.push(("import_notes", Box::new(notes.clone())));
        }
        Ok(out)
    }
}

/// Predicate for bulk updates: a record matches when its key is outside
/// `key_not_in` and its status is outside `status_not_in`.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub key_not_in: HashSet<String>,
    pub status_not_in: Vec<EventStatus>,
}

impl RecordFilter {
    pub fn matches(&self, original_url: &str, status: EventStatus) -> bool {
        !self.key_not_in.contains(original_url) && !self.status_not_in.contains(&status)
    }
}

/// Listing filters for the dashboard view.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub city: Option<String>,
    /// Empty means every status.
    pub statuses: Vec<EventStatus>,
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    /// Exclusive.
    pub to: Option<DateTime<Utc>>,
}

impl EventQuery {
    /// What the public page shows: fresh and curated events only.
    pub fn public(city: &str) -> Self {
        Self {
            city: Some(city.to_string()),
            statuses: vec![EventStatus::New, EventStatus::Imported],
            ..Self::default()
        }
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                original_url TEXT PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                venue_name TEXT NOT NULL,
                venue_address TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                image_url TEXT NOT NULL,
                city TEXT NOT NULL,
                source_site TEXT NOT NULL,
                status TEXT NOT NULL,
                event_date TEXT NOT NULL,
                last_scraped_utc TEXT NOT NULL,
                imported_by TEXT,
                imported_at_utc TEXT,
                import_notes TEXT,
                created_at_utc TEXT NOT NULL,
                updated_at_utc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS events_status ON events(status);
            CREATE INDEX IF NOT EXISTS events_date ON events(event_date);",
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<EventRecord>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM events WHERE id = ?1");
        self.conn
            .query_row(&sql, params![id], |row| Ok(map_row(row)))
            .optional()?
            .transpose()
    }

    /// Resolves either a natural key or a short record id.
    pub fn resolve(&self, key_or_id: &str) -> Result<Option<EventRecord>, StoreError> {
        match self.find_by_key(key_or_id)? {
            Some(record) => Ok(Some(record)),
            None => self.find_by_id(key_or_id),
        }
    }

    pub fn query(&self, query: &EventQuery) -> Result<Vec<EventRecord>, StoreError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(city) = &query.city {
            clauses.push("city = ?".to_string());
            values.push(Box::new(city.clone()));
        }
        if !query.statuses.is_empty() {
            let marks = vec!["?"; query.statuses.len()].join(", ");
            clauses.push(format!("status IN ({marks})"));
            for status in &query.statuses {
                values.push(Box::new(status.as_str()));
            }
        }
        if let Some(from) = &query.from {
            clauses.push("event_date >= ?".to_string());
            values.push(Box::new(to_rfc3339(from)));
        }
        if let Some(to) = &query.to {
            clauses.push("event_date < ?".to_string());
            values.push(Box::new(to_rfc3339(to)));
        }

        let mut sql = format!("SELECT {COLUMNS} FROM events");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY event_date ASC, original_url ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| Ok(map_row(row)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }

        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = RegexBuilder::new(&regex::escape(search.trim()))
                .case_insensitive(true)
                .build()
                .map_err(|err| StoreError::InvalidSearch {
                    message: err.to_string(),
                })?;
            out.retain(|record| {
                pattern.is_match(&record.title)
                    || pattern.is_match(&record.venue.name)
                    || pattern.is_match(&record.description)
            });
        }
        Ok(out)
    }

    /// Applies the external curation override. `imported` is never written
    /// by reconciliation.
    pub fn mark_imported(
        &self,
        key_or_id: &str,
        imported_by: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<EventRecord, StoreError> {
        let record = self.resolve(key_or_id)?.ok_or_else(|| StoreError::NotFound {
            key: key_or_id.to_string(),
        })?;
        let patch = EventPatch {
            imported_by: Some(imported_by.to_string()),
            imported_at: Some(now),
            import_notes: Some(
                notes
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or(DEFAULT_IMPORT_NOTES)
                    .to_string(),
            ),
            ..EventPatch::status(EventStatus::Imported).touched_at(now)
        };
        self.update_fields(&record.original_url, &patch)?;
        self.find_by_key(&record.original_url)?
            .ok_or(StoreError::NotFound {
                key: record.original_url,
            })
    }
}

impl EventStore for Store {
    fn find_by_key(&self, original_url: &str) -> Result<Option<EventRecord>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM events WHERE original_url = ?1");
        self.conn
            .query_row(&sql, params![original_url], |row| Ok(map_row(row)))
            .optional()?
            .transpose()
    }

    fn insert(&self, record: &EventRecord) -> Result<(), StoreError> {
        let category = serde_json::to_string(&record.category)?;
        self.conn.execute(
            "INSERT INTO events (id, original_url, title, venue_name, venue_address, description,
                category, image_url, city, source_site, status, event_date, last_scraped_utc,
                imported_by, imported_at_utc, import_notes, created_at_utc, updated_at_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                record.id,
                record.original_url,
                record.title,
                record.venue.name,
                record.venue.address,
                record.description,
                category,
                record.image_url,
                record.city,
                record.source_site,
                record.status.as_str(),
                to_rfc3339(&record.date),
                to_rfc3339(&record.last_scraped_time),
                record.imported_by,
                record.imported_at.as_ref().map(to_rfc3339),
                record.import_notes,
                to_rfc3339(&record.created_at),
                to_rfc3339(&record.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_fields(&self, original_url: &str, patch: &EventPatch) -> Result<bool, StoreError> {
        Ok(apply_patch(&self.conn, original_url, patch)? > 0)
    }

    fn update_many_where(
        &self,
        filter: &RecordFilter,
        patch: &EventPatch,
    ) -> Result<usize, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let targets = {
            let mut stmt = tx.prepare("SELECT original_url, status FROM events")?;
            let mut rows = stmt.query([])?;
            let mut targets = Vec::new();
            while let Some(row) = rows.next()? {
                let key: String = row.get(0)?;
                let status: String = row.get(1)?;
                if filter.matches(&key, status.parse()?) {
                    targets.push(key);
                }
            }
            targets
        };

        let mut changed = 0;
        for key in &targets {
            changed += apply_patch(&tx, key, patch)?;
        }
        tx.commit()?;
        Ok(changed)
    }
}

fn apply_patch(
    conn: &Connection,
    original_url: &str,
    patch: &EventPatch,
) -> Result<usize, StoreError> {
    let mut assignments = patch.assignments()?;
    let updated_at = patch.updated_at.unwrap_or_else(Utc::now);
    assignments.push(("updated_at_utc", Box::new(to_rfc3339(&updated_at))));

    let set_clause = assignments
        .iter()
        .map(|(column, _)| format!("{column} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE events SET {set_clause} WHERE original_url = ?");

    let mut values: Vec<Box<dyn ToSql>> = assignments.into_iter().map(|(_, v)| v).collect();
    values.push(Box::new(original_url.to_string()));
    Ok(conn.execute(&sql, params_from_iter(values.iter()))?)
}

fn map_row(row: &Row<'_>) -> Result<EventRecord, StoreError> {
    let category: String = row.get(6)?;
    let status: String = row.get(10)?;
    let event_date: String = row.get(11)?;
    let last_scraped: String = row.get(12)?;
    let imported_at: Option<String> = row.get(14)?;
    let created_at: String = row.get(16)?;
    let updated_at: String = row.get(17)?;

    Ok(EventRecord {
        id: row.get(0)?,
        original_url: row.get(1)?,
        title: row.get(2)?,
        venue: Venue {
            name: row.get(3)?,
            address: row.get(4)?,
        },
        description: row.get(5)?,
        category: serde_json::from_str(&category)?,
        image_url: row.get(7)?,
        city: row.get(8)?,
        source_site: row.get(9)?,
        status: status.parse()?,
        date: from_rfc3339(&event_date)?,
        last_scraped_time: from_rfc3339(&last_scraped)?,
        imported_by: row.get(13)?,
        imported_at: imported_at.as_deref().map(from_rfc3339).transpose()?,
        import_notes: row.get(15)?,
        created_at: from_rfc3339(&created_at)?,
        updated_at: from_rfc3339(&updated_at)?,
    })
}
