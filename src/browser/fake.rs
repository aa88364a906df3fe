//! A scripted stand-in for the dashboard, for tests.
//!
//! [`FakeSite`] describes what the site serves (login behaviour, list pages,
//! article pages, injected failures); [`FakeBrowser`] answers the page
//! readers' selectors from it and records what was done to it in a shared
//! [`FakeState`] the test can inspect after the browser has been moved into
//! a pipeline.

use super::Browser;
use crate::errors::BrowserError;
use crate::pages::{detail, list, login};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

pub const BASE: &str = "https://note.test";
pub const LOGIN_URL: &str = "https://note.test/login";
pub const STATS_URL: &str = "https://note.test/sitesettings/stats";
pub const HOME_URL: &str = "https://note.test/";

pub const REJECTION: &str = "メールアドレスまたはパスワードが正しくありません";

pub fn article_url(key: &str) -> String {
    format!("{BASE}/writer/n/{key}")
}

pub fn site_profile() -> crate::config::SiteProfile {
    crate::config::SiteProfile {
        base_url: BASE.to_string(),
        ..Default::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeRow {
    pub title: Option<String>,
    pub href: Option<String>,
    pub views: Option<String>,
    pub likes: Option<String>,
    pub comments: Option<String>,
    pub date: Option<String>,
}

impl FakeRow {
    /// A well-formed row linking to [`article_url`]`(key)` with a relative href.
    pub fn article(key: &str, views: u64) -> Self {
        Self {
            title: Some(format!("Article {key}")),
            href: Some(format!("/writer/n/{key}")),
            views: Some(views.to_string()),
            likes: Some("1".to_string()),
            comments: Some("0".to_string()),
            date: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeDetail {
    pub body: Option<String>,
    pub date: Option<String>,
    pub views: Option<String>,
    /// Page source served when readers fall back to parsing HTML.
    pub source: Option<String>,
}

impl FakeDetail {
    pub fn with_body(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginBehaviour {
    #[default]
    Accept,
    /// Stay on the form and show an error message.
    Reject,
    /// Stay on the form without any feedback.
    NeverConfirm,
    /// The login page has no form at all.
    NoForm,
}

#[derive(Debug, Clone)]
pub struct FakeSite {
    pub login: LoginBehaviour,
    pub pages: Vec<Vec<FakeRow>>,
    pub details: HashMap<String, FakeDetail>,
    /// Label and active flag of each period tab on the stats page.
    pub period_tabs: Vec<(String, bool)>,
    /// Navigations to these URLs fail transiently this many times first.
    pub flaky: HashMap<String, u32>,
    /// Navigations to these URLs never complete.
    pub hanging: HashSet<String>,
    /// Row lookups after opening the stats page that still see an empty table.
    pub load_lag: u32,
    /// Row lookups after a "next" click that still see the previous page.
    pub turn_lag: u32,
}

impl Default for FakeSite {
    fn default() -> Self {
        Self {
            login: LoginBehaviour::Accept,
            pages: Vec::new(),
            details: HashMap::new(),
            period_tabs: vec![
                ("全期間".to_string(), false),
                ("月".to_string(), false),
                ("週".to_string(), true),
            ],
            flaky: HashMap::new(),
            hanging: HashSet::new(),
            load_lag: 0,
            turn_lag: 0,
        }
    }
}

impl FakeSite {
    pub fn with_pages(pages: Vec<Vec<FakeRow>>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    /// `pages` list pages of `per_page` rows each, keys `n0`, `n1`, ...,
    /// with an article page behind every row.
    pub fn with_articles(pages: usize, per_page: usize) -> Self {
        let mut site = Self::default();
        for page in 0..pages {
            let rows = (0..per_page)
                .map(|i| {
                    let n = page * per_page + i;
                    let key = format!("n{n}");
                    let served = FakeDetail::with_body(&format!("body of {key}"));
                    site.details.insert(article_url(&key), served);
                    FakeRow::article(&key, (n as u64 + 1) * 10)
                })
                .collect();
            site.pages.push(rows);
        }
        site
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Views,
    Likes,
    Comments,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeElement {
    EmailField,
    PasswordField,
    SubmitButton,
    LoggedInMarker,
    LoginError,
    Row { page: usize, row: usize },
    TitleLink { page: usize, row: usize },
    Cell { page: usize, row: usize, cell: Cell },
    NextPage,
    PeriodTab(usize),
    Body(String),
    Date(String),
    Views(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Location {
    #[default]
    Blank,
    Login,
    Home,
    Stats(usize),
    Article(String),
    Other(String),
}

/// Everything observable about a [`FakeBrowser`].
#[derive(Debug, Default)]
pub struct FakeState {
    pub location: Location,
    pub logged_in: bool,
    pub submitted: bool,
    pub navigations: Vec<String>,
    /// Field and value of every fill, in order.
    pub fills: Vec<(String, String)>,
    pub period_clicked: Option<String>,
    pub failures_served: HashMap<String, u32>,
    /// List page the stats table currently displays.
    pub rendered: Option<usize>,
    pub render_lag_left: u32,
    pub closed: bool,
}

pub struct FakeBrowser {
    site: FakeSite,
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self::new(FakeSite::default())
    }
}

impl FakeBrowser {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site,
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    pub fn state(&self) -> Arc<Mutex<FakeState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn row(&self, page: usize, row: usize) -> Option<&FakeRow> {
        self.site.pages.get(page)?.get(row)
    }

    fn detail(&self, url: &str) -> Option<&FakeDetail> {
        self.site.details.get(url)
    }

    fn period_label(&self, tab: usize) -> Option<String> {
        self.site.period_tabs.get(tab).map(|(label, _)| label.clone())
    }

    fn not_found(selector: &str) -> BrowserError {
        BrowserError::NotFound(selector.to_string())
    }
}

impl Browser for FakeBrowser {
    type Element = FakeElement;

    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.lock().navigations.push(url.to_string());

        if self.site.hanging.contains(url) {
            std::future::pending::<()>().await;
        }

        let mut state = self.lock();
        if let Some(&failures) = self.site.flaky.get(url) {
            let served = state.failures_served.entry(url.to_string()).or_insert(0);
            if *served < failures {
                *served += 1;
                return Err(BrowserError::Navigation(format!("net::ERR_CONNECTION_RESET at {url}")));
            }
        }

        if url == STATS_URL {
            state.rendered = None;
            state.render_lag_left = self.site.load_lag;
        }
        state.location = if url == LOGIN_URL {
            Location::Login
        } else if url == STATS_URL {
            Location::Stats(0)
        } else if url == "about:blank" {
            Location::Blank
        } else if self.site.details.contains_key(url) {
            Location::Article(url.to_string())
        } else {
            Location::Other(url.to_string())
        };
        Ok(())
    }

    async fn find_element(&self, selector: &str) -> Result<FakeElement, BrowserError> {
        let state = self.lock();
        let found = match &state.location {
            Location::Login if self.site.login != LoginBehaviour::NoForm => {
                if login::EMAIL_FIELD.contains(&selector) {
                    Some(FakeElement::EmailField)
                } else if login::PASSWORD_FIELD.contains(&selector) {
                    Some(FakeElement::PasswordField)
                } else if login::SUBMIT_BUTTON.contains(&selector) {
                    Some(FakeElement::SubmitButton)
                } else if login::LOGIN_ERROR.contains(&selector)
                    && state.submitted
                    && self.site.login == LoginBehaviour::Reject
                {
                    Some(FakeElement::LoginError)
                } else {
                    None
                }
            }
            Location::Stats(page) if list::NEXT_PAGE.contains(&selector) => {
                (page + 1 < self.site.pages.len()).then_some(FakeElement::NextPage)
            }
            Location::Article(url) => {
                let served = self.detail(url);
                if detail::BODY.contains(&selector) && served.is_some_and(|d| d.body.is_some()) {
                    Some(FakeElement::Body(url.clone()))
                } else if detail::DATE.contains(&selector)
                    && served.is_some_and(|d| d.date.is_some())
                {
                    Some(FakeElement::Date(url.clone()))
                } else if detail::VIEWS.contains(&selector)
                    && served.is_some_and(|d| d.views.is_some())
                {
                    Some(FakeElement::Views(url.clone()))
                } else {
                    None
                }
            }
            _ => None,
        };

        let found = found.or_else(|| {
            (state.logged_in
                && state.location != Location::Login
                && login::LOGGED_IN_MARKER.contains(&selector))
            .then_some(FakeElement::LoggedInMarker)
        });
        found.ok_or_else(|| Self::not_found(selector))
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<FakeElement>, BrowserError> {
        let mut state = self.lock();
        let Location::Stats(page) = state.location else {
            return Ok(Vec::new());
        };
        if selector == list::ROW {
            if state.render_lag_left > 0 {
                state.render_lag_left -= 1;
            } else {
                state.rendered = Some(page);
            }
            let Some(shown) = state.rendered else {
                return Ok(Vec::new());
            };
            let rows = self.site.pages.get(shown).map_or(0, Vec::len);
            Ok((0..rows).map(|row| FakeElement::Row { page: shown, row }).collect())
        } else if selector == list::PERIOD_TAB {
            Ok((0..self.site.period_tabs.len()).map(FakeElement::PeriodTab).collect())
        } else {
            Ok(Vec::new())
        }
    }

    async fn find_within(
        &self,
        parent: &FakeElement,
        selector: &str,
    ) -> Result<FakeElement, BrowserError> {
        let FakeElement::Row { page, row } = *parent else {
            return Err(Self::not_found(selector));
        };
        let data = self.row(page, row).ok_or_else(|| BrowserError::StaleElement("row".into()))?;
        let at = |cell| FakeElement::Cell { page, row, cell };

        let found = if list::TITLE_LINK.contains(&selector) {
            data.title.as_ref().map(|_| FakeElement::TitleLink { page, row })
        } else if list::VIEWS.contains(&selector) {
            data.views.as_ref().map(|_| at(Cell::Views))
        } else if list::LIKES.contains(&selector) {
            data.likes.as_ref().map(|_| at(Cell::Likes))
        } else if list::COMMENTS.contains(&selector) {
            data.comments.as_ref().map(|_| at(Cell::Comments))
        } else if list::DATE.contains(&selector) {
            data.date.as_ref().map(|_| at(Cell::Date))
        } else {
            None
        };
        found.ok_or_else(|| Self::not_found(selector))
    }

    async fn read_text(&self, element: &FakeElement) -> Result<String, BrowserError> {
        let text = match element {
            FakeElement::TitleLink { page, row } => {
                self.row(*page, *row).and_then(|r| r.title.clone())
            }
            FakeElement::Cell { page, row, cell } => self.row(*page, *row).and_then(|r| match cell {
                Cell::Views => r.views.clone(),
                Cell::Likes => r.likes.clone(),
                Cell::Comments => r.comments.clone(),
                Cell::Date => r.date.clone(),
            }),
            FakeElement::PeriodTab(i) => self.period_label(*i),
            FakeElement::Body(url) => self.detail(url).and_then(|d| d.body.clone()),
            FakeElement::Date(url) => self.detail(url).and_then(|d| d.date.clone()),
            FakeElement::Views(url) => self.detail(url).and_then(|d| d.views.clone()),
            FakeElement::LoginError => Some(REJECTION.to_string()),
            _ => None,
        };
        Ok(text.unwrap_or_default())
    }

    async fn read_attribute(
        &self,
        element: &FakeElement,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        Ok(match (element, name) {
            (FakeElement::TitleLink { page, row }, "href") => {
                self.row(*page, *row).and_then(|r| r.href.clone())
            }
            (FakeElement::PeriodTab(i), "class") => self
                .site
                .period_tabs
                .get(*i)
                .map(|(_, active)| (if *active { "btn is-active" } else { "btn" }).to_string()),
            _ => None,
        })
    }

    async fn click(&self, element: &FakeElement) -> Result<(), BrowserError> {
        let mut state = self.lock();
        match element {
            FakeElement::SubmitButton => {
                state.submitted = true;
                if self.site.login == LoginBehaviour::Accept {
                    state.logged_in = true;
                    state.location = Location::Home;
                }
            }
            FakeElement::NextPage => {
                if let Location::Stats(page) = state.location {
                    state.location = Location::Stats(page + 1);
                    state.render_lag_left = self.site.turn_lag;
                }
            }
            FakeElement::PeriodTab(i) => {
                state.period_clicked = self.period_label(*i);
            }
            _ => {}
        }
        Ok(())
    }

    async fn fill_field(&self, element: &FakeElement, value: &str) -> Result<(), BrowserError> {
        let field = match element {
            FakeElement::EmailField => "email",
            FakeElement::PasswordField => "password",
            _ => return Err(BrowserError::Rejected("element is not an input".into())),
        };
        self.lock().fills.push((field.to_string(), value.to_string()));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(match &self.lock().location {
            Location::Blank => "about:blank".to_string(),
            Location::Login => LOGIN_URL.to_string(),
            Location::Home => HOME_URL.to_string(),
            Location::Stats(_) => STATS_URL.to_string(),
            Location::Article(url) | Location::Other(url) => url.clone(),
        })
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        let location = self.lock().location.clone();
        Ok(match location {
            Location::Article(url) => self
                .detail(&url)
                .and_then(|d| d.source.clone())
                .unwrap_or_else(|| "<html><body></body></html>".to_string()),
            _ => "<html><body></body></html>".to_string(),
        })
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.lock().closed = true;
        Ok(())
    }
}
