use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use thiserror::Error;
use uuid::Uuid;

use crate::util::{validate_url, UrlValidationError};

use super::article::Article;

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_ARTICLE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("article URL rejected: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    #[error("network error fetching article: {0}")]
    Network(#[from] reqwest::Error),
    #[error("article endpoint returned HTTP {0}")]
    HttpStatus(u16),
    #[error("article response exceeded {MAX_ARTICLE_BYTES} bytes")]
    ResponseTooLarge,
    /// The extracted article's URL host does not match the source's
    /// canonical domain. Per the design this is not a general web
    /// crawler: one URL per novelty event, never a different host.
    #[error("extracted URL host {actual} does not match canonical domain {expected}")]
    InvalidDomain { expected: String, actual: String },
}

/// Fetch `url` and parse it with a newspaper-style local extractor,
/// producing an [`Article`] with every field listed in the data model.
///
/// No Rust crate offers a `newspaper3k`-equivalent, so this walks Open
/// Graph / standard `<meta>` tags, `<title>`, and the largest text-bearing
/// container for the body, the same heuristics this crate's existing
/// `content` module already applies for reader-mode rendering.
pub async fn extract(
    http: &reqwest::Client,
    url: &str,
    source_name: &str,
    canonical_domain: &str,
) -> Result<Article, ExtractionError> {
    let validated = validate_url(url)?;

    let response = http.get(validated.clone()).timeout(FETCH_TIMEOUT).send().await?;
    if !response.status().is_success() {
        return Err(ExtractionError::HttpStatus(response.status().as_u16()));
    }
    if let Some(len) = response.content_length() {
        if len as usize > MAX_ARTICLE_BYTES {
            return Err(ExtractionError::ResponseTooLarge);
        }
    }
    let final_url = response.url().clone();
    let body = response.text().await?;
    if body.len() > MAX_ARTICLE_BYTES {
        return Err(ExtractionError::ResponseTooLarge);
    }

    let final_host = final_url.host_str().unwrap_or_default();
    if !host_matches_domain(final_host, canonical_domain) {
        return Err(ExtractionError::InvalidDomain {
            expected: canonical_domain.to_string(),
            actual: final_host.to_string(),
        });
    }

    let document = Html::parse_document(&body);
    Ok(Article {
        id: Uuid::new_v4(),
        title: extract_title(&document),
        authors: extract_authors(&document),
        publication_date: extract_publication_date(&document),
        source: source_name.to_string(),
        url: final_url.to_string(),
        summary: extract_summary(&document),
        content: extract_content(&document),
        tags: extract_meta_list(&document, "article:tag"),
        categories: extract_meta_list(&document, "article:section"),
        images: extract_images(&document, &final_url),
    })
}

fn host_matches_domain(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

fn select_one<'a>(document: &'a Html, selector: &str) -> Option<scraper::ElementRef<'a>> {
    Selector::parse(selector).ok().and_then(|s| document.select(&s).next())
}

fn meta_content(document: &Html, attr: &str, value: &str) -> Option<String> {
    let selector = format!(r#"meta[{attr}="{value}"]"#);
    select_one(document, &selector).and_then(|el| el.value().attr("content").map(str::to_string))
}

fn extract_title(document: &Html) -> String {
    meta_content(document, "property", "og:title")
        .or_else(|| select_one(document, "title").map(|el| el.text().collect::<String>()))
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn extract_summary(document: &Html) -> String {
    meta_content(document, "property", "og:description")
        .or_else(|| meta_content(document, "name", "description"))
        .unwrap_or_default()
}

fn extract_authors(document: &Html) -> Vec<String> {
    meta_content(document, "name", "author")
        .map(|author| vec![author])
        .unwrap_or_default()
}

fn extract_publication_date(document: &Html) -> Option<DateTime<Utc>> {
    let raw = meta_content(document, "property", "article:published_time")
        .or_else(|| select_one(document, "time[datetime]").and_then(|el| el.value().attr("datetime").map(str::to_string)))?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn extract_meta_list(document: &Html, property: &str) -> BTreeSet<String> {
    let Ok(selector) = Selector::parse(&format!(r#"meta[property="{property}"]"#)) else {
        return BTreeSet::new();
    };
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::to_string)
        .collect()
}

fn extract_images(document: &Html, base: &url::Url) -> BTreeSet<String> {
    let mut images = BTreeSet::new();
    if let Some(og_image) = meta_content(document, "property", "og:image") {
        images.insert(og_image);
    }
    if let Ok(selector) = Selector::parse("article img[src]") {
        for el in document.select(&selector) {
            if let Some(src) = el.value().attr("src") {
                if let Ok(resolved) = base.join(src) {
                    images.insert(resolved.to_string());
                }
            }
        }
    }
    images
}

/// Finds the largest text-bearing container on the page — the heuristic
/// this crate uses in place of a real readability algorithm. Falls back to
/// `<article>` then `<body>` when no single paragraph-bearing container
/// stands out.
fn extract_content(document: &Html) -> String {
    let Ok(article_selector) = Selector::parse("article") else {
        return String::new();
    };
    if let Some(article) = document.select(&article_selector).next() {
        let text: String = article.text().collect::<Vec<_>>().join(" ");
        if !text.trim().is_empty() {
            return collapse_whitespace(&text);
        }
    }

    let Ok(paragraph_selector) = Selector::parse("p") else {
        return String::new();
    };
    let text = document
        .select(&paragraph_selector)
        .map(|p| p.text().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n\n");
    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
