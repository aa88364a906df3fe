//! An article page.
//!
//! The body is required; the publish date and view counter are optional
//! extras. When the selectors miss, the rendered page source is parsed with
//! `scraper` and searched with a few text patterns before giving up.

use crate::browser::Browser;
use crate::errors::{FetchError, ItemError, ParseError};
use crate::gate::FetchGate;
use crate::utils::parse_count;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

pub const BODY: &[&str] = &[
    ".note-common-styles__textnote-body",
    ".o-noteContentText",
    "article .o-noteEmbedContainer",
    ".m-textContent",
    "article .note-body",
];

pub const DATE: &[&str] = &[
    ".o-noteContentHeader__date time",
    ".o-noteContentHeader time",
    ".m-article__date time",
    ".note-common-styles__date time",
    "time",
    "[datetime]",
    ".o-noteContentData__date",
];

pub const VIEWS: &[&str] = &[
    ".o-noteContentData__item--views",
    ".o-noteContentData__viewCount",
    ".o-noteContentStats__count",
    ".m-noteContent__viewCount",
    ".viewCount",
];

static SOURCE_BODY: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["article", "main", "body"]
        .iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
});

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\d{4}[年/\-]\s*\d{1,2}[月/\-]\s*\d{1,2}日?",
        r"\d{1,2}月\s*\d{1,2}日,?\s*\d{4}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static VIEW_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"閲覧数[：:]\s*([\d.,]+[kKmM]?)",
        r"(?i)views?[：:]\s*([\d.,]+[km]?)",
        r"(?i)([\d.,]+[km]?)\s*(?:views|閲覧)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

/// What an article page adds to its list row.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleDetail {
    pub body: String,
    pub published_at: Option<String>,
    pub views: Option<u64>,
}

pub async fn read_detail<B: Browser>(
    gate: &FetchGate<'_, B>,
    url: &str,
) -> Result<ArticleDetail, ItemError> {
    gate.navigate(url).await?;

    let body = first_text(gate, BODY).await?;
    let published_at = read_date(gate).await?;
    let views = first_text(gate, VIEWS)
        .await?
        .map(|text| parse_count(&text))
        .filter(|&v| v > 0);

    let source = if body.is_none() || published_at.is_none() || views.is_none() {
        Some(gate.page_source().await?)
    } else {
        None
    };
    let page_text = source.as_deref().map(visible_text);

    let body = match body {
        Some(body) => body,
        None => {
            debug!(%url, "Body selectors missed; falling back to page source");
            source
                .as_deref()
                .and_then(body_text_from_source)
                .ok_or(ParseError::MissingBody)?
        }
    };
    let published_at = published_at.or_else(|| page_text.as_deref().and_then(date_from_text));
    let views = views.or_else(|| page_text.as_deref().and_then(views_from_text));

    Ok(ArticleDetail {
        body,
        published_at,
        views,
    })
}

async fn first_text<B: Browser>(
    gate: &FetchGate<'_, B>,
    selectors: &[&str],
) -> Result<Option<String>, FetchError> {
    let Some(element) = gate.find_first_of(selectors).await? else {
        return Ok(None);
    };
    let text = gate.text(&element).await?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

/// Visible date text, or the `datetime` attribute when the element is empty.
async fn read_date<B: Browser>(gate: &FetchGate<'_, B>) -> Result<Option<String>, FetchError> {
    let Some(element) = gate.find_first_of(DATE).await? else {
        return Ok(None);
    };
    let text = gate.text(&element).await?;
    if !text.trim().is_empty() {
        return Ok(Some(text.trim().to_string()));
    }
    Ok(gate
        .attribute(&element, "datetime")
        .await?
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty()))
}

fn collapse<'a>(fragments: impl Iterator<Item = &'a str>) -> String {
    fragments.flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// Text of the first non-empty `article`, `main` or `body` element.
pub fn body_text_from_source(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    SOURCE_BODY.iter().find_map(|selector| {
        document
            .select(selector)
            .map(|element| collapse(element.text()))
            .find(|text| !text.is_empty())
    })
}

fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    collapse(document.root_element().text())
}

pub fn date_from_text(text: &str) -> Option<String> {
    DATE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.find(text))
        .map(|m| m.as_str().to_string())
}

pub fn views_from_text(text: &str) -> Option<u64> {
    VIEW_PATTERNS
        .iter()
        .filter_map(|pattern| pattern.captures(text))
        .filter_map(|caps| caps.get(1))
        .map(|m| parse_count(m.as_str()))
        .find(|&v| v > 0)
}
