use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::base;
use super::{ListingSource, ParsedPage};
use crate::config::{AppConfig, CandidateDefaults};
use crate::error::{FetchError, ParseError};
use crate::models::{Candidate, Venue};

const SOURCE_ID: &str = "eventbrite_sydney";
const SOURCE_NAME: &str = "Eventbrite Sydney";

// Titles and venue lines, in document order.
static HEADING_OR_PARAGRAPH: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3, p").expect("eventbrite heading selector"));

pub struct EventbriteSydney {
    url: String,
    origin: String,
    user_agent: String,
    timeout_secs: u64,
    defaults: CandidateDefaults,
}

impl ListingSource for EventbriteSydney {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn fetch(&self) -> Result<ParsedPage, FetchError> {
        let client = base::http_client(&self.user_agent, self.timeout_secs)?;
        let html = base::fetch_html(&client, &self.url)?;
        Ok(self.parse_document(&html))
    }
}

impl EventbriteSydney {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            url: config.source_url.clone(),
            origin: config.site_origin.clone(),
            user_agent: config.user_agent.clone(),
            timeout_secs: config.fetch_timeout_secs,
            defaults: config.defaults.clone(),
        }
    }

    pub(crate) fn parse_document(&self, html: &str) -> ParsedPage {
        let document = Html::parse_document(html);
        let nodes: Vec<ElementRef<'_>> = document.select(&HEADING_OR_PARAGRAPH).collect();
        let mut page = ParsedPage::default();

        for (index, node) in nodes.iter().enumerate() {
            if node.value().name() != "h3" {
                continue;
            }
            let venue = nodes[index + 1..]
                .iter()
                .find(|next| next.value().name() == "p")
                .map(|p| base::inner_text(*p))
                .filter(|text| !text.is_empty());

            match self.parse_listing(*node, venue) {
                Ok(Some(candidate)) => page.candidates.push(candidate),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(source = SOURCE_ID, %err, "skipping listing");
                    page.skipped += 1;
                }
            }
        }

        page
    }

    /// `Ok(None)` for headings outside a listing link, which are page chrome.
    fn parse_listing(
        &self,
        heading: ElementRef<'_>,
        venue: Option<String>,
    ) -> Result<Option<Candidate>, ParseError> {
        let href = match base::ancestor_named(heading, "a").and_then(|a| a.value().attr("href")) {
            Some(href) => href,
            None => return Ok(None),
        };
        let trimmed = base::strip_query(href.trim());
        if trimmed.is_empty() {
            return Err(ParseError::InvalidLink {
                href: href.to_string(),
            });
        }
        let original_url =
            base::absolute_url(&self.origin, trimmed).ok_or_else(|| ParseError::InvalidLink {
                href: href.to_string(),
            })?;

        let title = base::inner_text(heading);
        if title.is_empty() {
            return Err(ParseError::EmptyTitle);
        }

        let defaults = &self.defaults;
        Ok(Some(Candidate {
            original_url,
            description: defaults.describe(&title),
            title,
            venue: Venue {
                name: venue.unwrap_or_else(|| defaults.venue_name.clone()),
                address: defaults.venue_address.clone(),
            },
            category: defaults.category.clone(),
            image_url: defaults.image_url.clone(),
            city: defaults.city.clone(),
            source_site: defaults.source_site.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
    <html><body>
      <h3>Popular in Sydney</h3>
      <ul class="search-results">
        <li><section class="event-card">
          <a class="event-card-link" href="https://www.eventbrite.com.au/e/harbour-jazz-night-tickets-1001?aff=ebdssbdestsearch">
            <h3>  Harbour Jazz
                Night </h3>
          </a>
          <p class="event-card-venue">The Basement</p>
        </section></li>
        <li><section class="event-card">
          <a class="event-card-link" href="/e/rooftop-cinema-tickets-1002">
            <div class="title"><h3>Rooftop Cinema</h3></div>
          </a>
          <p>  Royal Botanic   Garden </p>
        </section></li>
        <li><section class="event-card">
          <a class="event-card-link" href="/e/empty-1003"><h3>   </h3></a>
          <p>Nowhere</p>
        </section></li>
        <li><section class="event-card">
          <a class="event-card-link" href=""><h3>Broken Link</h3></a>
          <p>Somewhere</p>
        </section></li>
        <li><section class="event-card">
          <a class="event-card-link" href="/e/late-night-comedy-1005?ref=home">
            <h3>Late Night Comedy</h3>
          </a>
        </section></li>
      </ul>
    </body></html>
    "#;

    fn source() -> EventbriteSydney {
        EventbriteSydney::from_config(&AppConfig::default())
    }

    #[test]
    fn parses_eventbrite_listings() {
        let page = source().parse_document(SAMPLE_HTML);
        assert_eq!(page.candidates.len(), 3);
        assert_eq!(page.skipped, 2);

        let first = &page.candidates[0];
        assert_eq!(first.title, "Harbour Jazz Night");
        assert_eq!(
            first.original_url,
            "https://www.eventbrite.com.au/e/harbour-jazz-night-tickets-1001"
        );
        assert_eq!(first.venue.name, "The Basement");
        assert_eq!(first.venue.address, "Sydney, NSW, Australia");
        assert_eq!(
            first.description,
            "Join us for Harbour Jazz Night in Sydney. Experience the best local events."
        );
        assert_eq!(first.category, vec!["General".to_string(), "Social".to_string()]);
        assert_eq!(first.source_site, "Eventbrite");

        let second = &page.candidates[1];
        assert_eq!(
            second.original_url,
            "https://www.eventbrite.com.au/e/rooftop-cinema-tickets-1002"
        );
        assert_eq!(second.venue.name, "Royal Botanic Garden");

        let last = &page.candidates[2];
        assert_eq!(last.title, "Late Night Comedy");
        assert_eq!(
            last.original_url,
            "https://www.eventbrite.com.au/e/late-night-comedy-1005"
        );
        assert_eq!(last.venue.name, "Sydney CBD");
    }

    #[test]
    fn empty_page_yields_no_candidates() {
        let page = source().parse_document("<html><body><p>No events</p></body></html>");
        assert!(page.candidates.is_empty());
        assert_eq!(page.skipped, 0);
    }

    #[test]
    fn inline_markup_does_not_split_titles() {
        let page = source().parse_document(
            r#"<a href="/e/jazzfest-1"><h3>Jazz<span>Fest</span> 2026<!-- -->!</h3></a>
               <p>Darling<!-- --> Harbour</p>"#,
        );
        assert_eq!(page.candidates.len(), 1);
        assert_eq!(page.candidates[0].title, "JazzFest 2026!");
        assert_eq!(page.candidates[0].venue.name, "Darling Harbour");
    }

    #[test]
    fn configured_defaults_flow_into_candidates() {
        let mut config = AppConfig::default();
        config.defaults.city = "Newcastle".to_string();
        config.defaults.venue_name = "Civic Park".to_string();
        let page = EventbriteSydney::from_config(&config)
            .parse_document(r#"<a href="/e/x-1"><h3>Market Day</h3></a>"#);
        assert_eq!(page.candidates.len(), 1);
        assert_eq!(page.candidates[0].city, "Newcastle");
        assert_eq!(page.candidates[0].venue.name, "Civic Park");
        assert!(page.candidates[0].description.contains("in Newcastle"));
    }
}
