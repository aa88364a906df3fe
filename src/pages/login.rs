//! The login page.

use crate::browser::Browser;
use crate::errors::{AuthError, FetchError};
use crate::gate::FetchGate;
use tracing::debug;

pub const EMAIL_FIELD: &[&str] = &[
    "input[type=\"email\"]",
    "input[name=\"email\"]",
    "input[placeholder=\"メールアドレス\"]",
    ".o-login__mail input[type=\"email\"]",
    ".o-login input[type=\"email\"]",
];

pub const PASSWORD_FIELD: &[&str] = &[
    "input[type=\"password\"]",
    "input[name=\"password\"]",
    "input[placeholder=\"パスワード\"]",
    ".o-login__mail input[type=\"password\"]",
    ".o-login input[type=\"password\"]",
];

pub const SUBMIT_BUTTON: &[&str] = &[
    "button[type=\"submit\"]",
    "button.n-button--primary",
    ".o-login__button button",
    "button.a-button[data-type=\"primary\"]",
];

/// Present only for a signed-in session.
pub const LOGGED_IN_MARKER: &[&str] = &[
    ".o-navbarPrimary__userIcon",
    "a[href=\"/sitesettings/stats\"]",
    "a[href*=\"/notes/new\"]",
];

pub const LOGIN_ERROR: &[&str] = &[
    ".o-login__error",
    ".m-formError",
    "[role=\"alert\"]",
];

/// Handles to the three controls of the login form.
#[derive(Debug)]
pub struct LoginForm<E> {
    pub email: E,
    pub password: E,
    pub submit: E,
}

pub async fn locate_form<B: Browser>(
    gate: &FetchGate<'_, B>,
) -> Result<LoginForm<B::Element>, AuthError> {
    let email = required(gate, EMAIL_FIELD, "email field").await?;
    let password = required(gate, PASSWORD_FIELD, "password field").await?;
    let submit = required(gate, SUBMIT_BUTTON, "submit button").await?;
    Ok(LoginForm {
        email,
        password,
        submit,
    })
}

async fn required<B: Browser>(
    gate: &FetchGate<'_, B>,
    selectors: &[&str],
    field: &'static str,
) -> Result<B::Element, AuthError> {
    match gate.find_first_of(selectors).await {
        Ok(Some(element)) => Ok(element),
        Ok(None) => Err(AuthError::FormNotFound {
            field,
            detail: format!("none of {} selector(s) matched", selectors.len()),
        }),
        Err(e) => Err(AuthError::FormNotFound {
            field,
            detail: e.to_string(),
        }),
    }
}

pub async fn is_logged_in<B: Browser>(gate: &FetchGate<'_, B>) -> Result<bool, FetchError> {
    Ok(gate.find_first_of(LOGGED_IN_MARKER).await?.is_some())
}

/// The rejection message shown under the form, if any.
pub async fn error_message<B: Browser>(
    gate: &FetchGate<'_, B>,
) -> Result<Option<String>, FetchError> {
    let Some(element) = gate.find_first_of(LOGIN_ERROR).await? else {
        return Ok(None);
    };
    let text = gate.text(&element).await?;
    let text = text.trim();
    debug!(message = text, "Login error shown");
    if text.is_empty() {
        Ok(Some("the site rejected the credentials".to_string()))
    } else {
        Ok(Some(text.to_string()))
    }
}
