//! Readers for the three kinds of page the pipeline visits.
//!
//! Each submodule owns the selectors for one page and the functions that turn
//! what is on it into typed values:
//!
//! | Module | Page | Produces |
//! |--------|------|----------|
//! | [`login`] | `/login` | [`login::LoginForm`], logged-in checks |
//! | [`list`] | `/sitesettings/stats` | [`crate::models::ArticleRecord`] per row |
//! | [`detail`] | an article | [`detail::ArticleDetail`] |
//!
//! Selectors are ordered lists; the first one that matches wins. The site's
//! markup has changed more than once, so older variants are kept behind the
//! current ones.
//!
//! All browser access goes through a [`FetchGate`].

use crate::browser::Browser;
use crate::errors::FetchError;
use crate::gate::FetchGate;

pub mod detail;
pub mod list;
pub mod login;

/// Trimmed text of the first descendant of `parent` matching any of
/// `selectors`; `None` when nothing matches or the text is blank.
pub(crate) async fn child_text<B: Browser>(
    gate: &FetchGate<'_, B>,
    parent: &B::Element,
    selectors: &[&str],
) -> Result<Option<String>, FetchError> {
    let Some(element) = gate.find_within_first_of(parent, selectors).await? else {
        return Ok(None);
    };
    let text = gate.text(&element).await?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}
