use std::time::Duration;

use reqwest::blocking::Client;
use scraper::ElementRef;

use crate::error::FetchError;

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text nodes are concatenated as-is; inline markup never adds spaces.
pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
}

/// Nearest enclosing element with the given tag name.
pub fn ancestor_named<'a>(element: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == name)
}

/// Drops the query string; tracking parameters would otherwise split one
/// listing into many keys.
pub fn strip_query(href: &str) -> &str {
    href.split('?').next().unwrap_or(href)
}

pub fn absolute_url(origin: &str, href: &str) -> Option<String> {
    if href.starts_with("http") {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(origin).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

pub fn http_client(user_agent: &str, timeout_secs: u64) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent)
        .build()
        .map_err(FetchError::Client)
}

pub fn fetch_html(client: &Client, url: &str) -> Result<String, FetchError> {
    let response = client.get(url).send().map_err(|source| FetchError::Request {
        url: url.to_string(),
        source,
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }
    response.text().map_err(|source| FetchError::Body {
        url: url.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Harbour \n\t Jazz  Night "), "Harbour Jazz Night");
        assert_eq!(clean_text(" \n "), "");
    }

    #[test]
    fn inner_text_joins_inline_markup_without_spaces() {
        let html = scraper::Html::parse_fragment("<h3> Jazz<b>Fest</b> <i>2026</i><!-- -->! </h3>");
        let selector = scraper::Selector::parse("h3").unwrap();
        let heading = html.select(&selector).next().unwrap();
        assert_eq!(inner_text(heading), "JazzFest 2026!");
    }

    #[test]
    fn strip_query_keeps_path() {
        assert_eq!(
            strip_query("https://www.eventbrite.com.au/e/jazz-123?aff=ebdssbdestsearch"),
            "https://www.eventbrite.com.au/e/jazz-123"
        );
        assert_eq!(strip_query("/e/jazz-123"), "/e/jazz-123");
    }

    #[test]
    fn absolute_url_joins_relative_paths() {
        let origin = "https://www.eventbrite.com.au";
        assert_eq!(
            absolute_url(origin, "/e/jazz-123").as_deref(),
            Some("https://www.eventbrite.com.au/e/jazz-123")
        );
        assert_eq!(
            absolute_url(origin, "https://other.test/x").as_deref(),
            Some("https://other.test/x")
        );
        assert_eq!(absolute_url("not a url", "/e/1"), None);
    }
}
