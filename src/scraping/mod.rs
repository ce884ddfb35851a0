pub mod base;
pub mod eventbrite_html;

use crate::config::AppConfig;
use crate::error::FetchError;
use crate::models::Candidate;

pub trait ListingSource {
    fn source_id(&self) -> &'static str;
    fn source_name(&self) -> &'static str;
    fn url(&self) -> &str;
    fn fetch(&self) -> Result<ParsedPage, FetchError>;
}

/// Candidates extracted from one page plus the entries that failed to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub candidates: Vec<Candidate>,
    pub skipped: usize,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Result of running every source of one crawl.
#[derive(Debug, Default)]
pub struct CrawlBatch {
    pub candidates: Vec<Candidate>,
    pub skipped: usize,
    pub failures: Vec<(String, FetchError)>,
}

impl CrawlBatch {
    /// True when every source answered, so the seen keys cover the full crawl.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn active_sources(config: &AppConfig) -> Vec<Box<dyn ListingSource>> {
    vec![Box::new(eventbrite_html::EventbriteSydney::from_config(
        config,
    ))]
}

pub fn list_sources(config: &AppConfig) -> Vec<SourceInfo> {
    active_sources(config)
        .into_iter()
        .map(|source| SourceInfo {
            id: source.source_id().to_string(),
            name: source.source_name().to_string(),
            url: source.url().to_string(),
        })
        .collect()
}

pub fn find_source(config: &AppConfig, id: &str) -> Result<Box<dyn ListingSource>, FetchError> {
    active_sources(config)
        .into_iter()
        .find(|source| source.source_id() == id)
        .ok_or_else(|| FetchError::UnknownSource(id.to_string()))
}

/// Fetches every source. Fails only when no source could be reached.
pub fn crawl(sources: &[Box<dyn ListingSource>]) -> Result<CrawlBatch, FetchError> {
    let mut batch = CrawlBatch::default();

    for source in sources {
        let source_id = source.source_id().to_string();
        match source.fetch() {
            Ok(page) => {
                tracing::info!(
                    source = %source_id,
                    found = page.candidates.len(),
                    skipped = page.skipped,
                    "source fetched"
                );
                batch.candidates.extend(page.candidates);
                batch.skipped += page.skipped;
            }
            Err(err) => {
                tracing::warn!(source = %source_id, %err, "source fetch failed");
                batch.failures.push((source_id, err));
            }
        }
    }

    if !sources.is_empty() && batch.failures.len() == sources.len() {
        let joined = batch
            .failures
            .iter()
            .map(|(id, err)| format!("{id}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(FetchError::AllSourcesFailed(joined));
    }

    Ok(batch)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::models::Venue;

    pub fn candidate(url: &str, title: &str, venue: &str) -> Candidate {
        Candidate {
            original_url: url.to_string(),
            title: title.to_string(),
            venue: Venue {
                name: venue.to_string(),
                address: "Sydney, NSW, Australia".to_string(),
            },
            description: format!("Join us for {title} in Sydney."),
            category: vec!["General".to_string(), "Social".to_string()],
            image_url: "https://images.example.com/a.jpg".to_string(),
            city: "Sydney".to_string(),
            source_site: "Eventbrite".to_string(),
        }
    }

    /// Serves a fixed page, or a fetch failure when `page` is `None`.
    pub struct StaticSource {
        pub id: &'static str,
        pub page: Option<ParsedPage>,
    }

    impl ListingSource for StaticSource {
        fn source_id(&self) -> &'static str {
            self.id
        }

        fn source_name(&self) -> &'static str {
            "Static"
        }

        fn url(&self) -> &str {
            "https://static.test/"
        }

        fn fetch(&self) -> Result<ParsedPage, FetchError> {
            self.page.clone().ok_or_else(|| FetchError::Status {
                url: self.url().to_string(),
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{candidate, StaticSource};
    use super::*;

    fn page(urls: &[&str]) -> Option<ParsedPage> {
        Some(ParsedPage {
            candidates: urls.iter().map(|u| candidate(u, "Show", "Venue")).collect(),
            skipped: 1,
        })
    }

    #[test]
    fn crawl_merges_sources() {
        let sources: Vec<Box<dyn ListingSource>> = vec![
            Box::new(StaticSource { id: "a", page: page(&["https://a.test/1"]) }),
            Box::new(StaticSource { id: "b", page: page(&["https://b.test/1", "https://b.test/2"]) }),
        ];
        let batch = crawl(&sources).unwrap();
        assert_eq!(batch.candidates.len(), 3);
        assert_eq!(batch.skipped, 2);
        assert!(batch.is_complete());
    }

    #[test]
    fn crawl_with_one_failed_source_is_partial() {
        let sources: Vec<Box<dyn ListingSource>> = vec![
            Box::new(StaticSource { id: "a", page: page(&["https://a.test/1"]) }),
            Box::new(StaticSource { id: "down", page: None }),
        ];
        let batch = crawl(&sources).unwrap();
        assert_eq!(batch.candidates.len(), 1);
        assert!(!batch.is_complete());
        assert_eq!(batch.failures[0].0, "down");
    }

    #[test]
    fn crawl_fails_when_every_source_fails() {
        let sources: Vec<Box<dyn ListingSource>> =
            vec![Box::new(StaticSource { id: "down", page: None })];
        assert!(matches!(
            crawl(&sources),
            Err(FetchError::AllSourcesFailed(_))
        ));
    }

    #[test]
    fn registry_lists_eventbrite() {
        let config = AppConfig::default();
        let sources = list_sources(&config);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].id, "eventbrite_sydney");
        assert!(find_source(&config, "eventbrite_sydney").is_ok());
        assert!(matches!(
            find_source(&config, "nowhere"),
            Err(FetchError::UnknownSource(_))
        ));
    }
}
