//! The article stats list (`/sitesettings/stats`).
//!
//! One table row per article: a title link, the publish date and three
//! counters. Rows without a usable link are parse failures; absent counters
//! read as zero.

use super::child_text;
use crate::browser::Browser;
use crate::config::Period;
use crate::errors::{FetchError, ItemError, ParseError};
use crate::gate::FetchGate;
use crate::models::ArticleRecord;
use crate::utils::parse_count;
use tracing::debug;
use url::Url;

pub const ROW: &str = ".o-statsContent__table tbody tr";

pub const TITLE_LINK: &[&str] = &[".o-statsContent__tableTitle a", "td a"];
pub const VIEWS: &[&str] = &[".o-statsContent__tableStat--type_view"];
pub const COMMENTS: &[&str] = &[".o-statsContent__tableStat--type_comment"];
pub const LIKES: &[&str] = &[".o-statsContent__tableStat--type_suki"];
pub const DATE: &[&str] = &[".o-statsContent__tableDate", "time"];

pub const NEXT_PAGE: &[&str] = &[
    ".pagination-next:not(.disabled)",
    ".next-page:not(.disabled)",
    "button[aria-label=\"次のページ\"]",
];

pub const PERIOD_TAB: &str = "ul[aria-label=\"表示期間切り替え\"] button";

/// Result of trying to switch the dashboard to a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodSelection {
    AlreadyActive,
    Clicked,
    /// No tab with the period's label is on the page.
    Unavailable,
}

pub async fn read_rows<B: Browser>(gate: &FetchGate<'_, B>) -> Result<Vec<B::Element>, FetchError> {
    gate.find_all(ROW).await
}

/// The title-link href of every row, as a fingerprint of what the table
/// currently shows.
pub async fn row_hrefs<B: Browser>(
    gate: &FetchGate<'_, B>,
    rows: &[B::Element],
) -> Result<Vec<Option<String>>, FetchError> {
    let mut hrefs = Vec::with_capacity(rows.len());
    for row in rows {
        let href = match gate.find_within_first_of(row, TITLE_LINK).await? {
            Some(link) => gate.attribute(&link, "href").await?,
            None => None,
        };
        hrefs.push(href);
    }
    Ok(hrefs)
}

/// Turn one table row into a record. Relative links are resolved against
/// `base`.
pub async fn parse_row<B: Browser>(
    gate: &FetchGate<'_, B>,
    row: &B::Element,
    base: &Url,
) -> Result<ArticleRecord, ItemError> {
    let link = gate
        .find_within_first_of(row, TITLE_LINK)
        .await?
        .ok_or(ParseError::MissingTitleLink)?;

    let title = gate.text(&link).await?.trim().to_string();
    if title.is_empty() {
        return Err(ParseError::MissingTitleLink.into());
    }

    let href = gate
        .attribute(&link, "href")
        .await?
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .ok_or(ParseError::MissingUrl)?;
    let url = base.join(&href).map_err(|e| ParseError::InvalidUrl {
        url: href.clone(),
        reason: e.to_string(),
    })?;

    let mut record = ArticleRecord::new(url.as_str(), title)?;
    record.views = counter(gate, row, VIEWS).await?;
    record.likes = counter(gate, row, LIKES).await?;
    record.comments = counter(gate, row, COMMENTS).await?;
    if let Some(date) = child_text(gate, row, DATE).await? {
        record.set_published_at(date);
    }

    debug!(id = %record.id, views = record.views, "Parsed row");
    Ok(record)
}

async fn counter<B: Browser>(
    gate: &FetchGate<'_, B>,
    row: &B::Element,
    selectors: &[&str],
) -> Result<u64, FetchError> {
    Ok(child_text(gate, row, selectors)
        .await?
        .map(|text| parse_count(&text))
        .unwrap_or(0))
}

/// The enabled "next page" control, if the list continues.
pub async fn next_page_control<B: Browser>(
    gate: &FetchGate<'_, B>,
) -> Result<Option<B::Element>, FetchError> {
    let Some(button) = gate.find_first_of(NEXT_PAGE).await? else {
        return Ok(None);
    };
    let disabled = gate.attribute(&button, "disabled").await?.is_some()
        || gate.attribute(&button, "aria-disabled").await?.as_deref() == Some("true");
    Ok((!disabled).then_some(button))
}

pub async fn select_period<B: Browser>(
    gate: &FetchGate<'_, B>,
    period: Period,
) -> Result<PeriodSelection, FetchError> {
    for tab in gate.find_all(PERIOD_TAB).await? {
        if gate.text(&tab).await?.trim() != period.label() {
            continue;
        }
        let class = gate.attribute(&tab, "class").await?.unwrap_or_default();
        if class.split_whitespace().any(|c| c == "is-active") {
            return Ok(PeriodSelection::AlreadyActive);
        }
        gate.click(&tab, "period tab").await?;
        return Ok(PeriodSelection::Clicked);
    }
    Ok(PeriodSelection::Unavailable)
}
