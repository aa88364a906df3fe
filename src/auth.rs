//! Signing in to the dashboard.
//!
//! [`Authenticator::login`] fills and submits the login form, then polls for
//! either a logged-in marker or an error message until the configured
//! timeout. A successful session is cached per username, so calling `login`
//! again in the same run does nothing.
//!
//! Any failure leaves a `login_failed` diagnostic capture and resets the tab
//! to `about:blank` so no half-authenticated page is carried into the next
//! stage.

use crate::browser::Browser;
use crate::config::{Credentials, PipelineConfig, SiteProfile};
use crate::errors::{AuthError, FetchError};
use crate::gate::FetchGate;
use crate::pages::login;
use chrono::{DateTime, Utc};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub username: String,
    pub authenticated_at: DateTime<Utc>,
    /// Where the site sent us after the form was accepted.
    pub landing_url: Option<String>,
}

pub struct Authenticator<'a> {
    site: &'a SiteProfile,
    config: &'a PipelineConfig,
    session: Option<Session>,
}

fn form_error(field: &'static str) -> impl Fn(FetchError) -> AuthError {
    move |e| AuthError::FormNotFound {
        field,
        detail: e.to_string(),
    }
}

impl<'a> Authenticator<'a> {
    pub fn new(site: &'a SiteProfile, config: &'a PipelineConfig) -> Self {
        Self {
            site,
            config,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[instrument(level = "info", skip_all, fields(username = %credentials.username))]
    pub async fn login<B: Browser>(
        &mut self,
        gate: &FetchGate<'_, B>,
        credentials: &Credentials,
    ) -> Result<Session, AuthError> {
        if let Some(session) = &self.session {
            if session.username == credentials.username {
                debug!("Already authenticated");
                return Ok(session.clone());
            }
        }
        if credentials.is_blank() {
            return Err(AuthError::InvalidCredentials(
                "username and password are required".to_string(),
            ));
        }

        match self.attempt(gate, credentials).await {
            Ok(session) => {
                info!(landing_url = ?session.landing_url, "Login succeeded");
                self.session = Some(session.clone());
                Ok(session)
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                gate.capture("login_failed", "login", 1, &e).await;
                if let Err(reset) = gate.navigate("about:blank").await {
                    warn!(error = %reset, "Could not reset the tab after a failed login");
                }
                Err(e)
            }
        }
    }

    async fn attempt<B: Browser>(
        &self,
        gate: &FetchGate<'_, B>,
        credentials: &Credentials,
    ) -> Result<Session, AuthError> {
        let login_url = self
            .site
            .login_url()
            .map_err(|e| AuthError::FormNotFound {
                field: "login page",
                detail: e.to_string(),
            })?;
        gate.navigate(login_url.as_str())
            .await
            .map_err(form_error("login page"))?;

        let form = login::locate_form(gate).await?;
        gate.fill(&form.email, "email", &credentials.username)
            .await
            .map_err(form_error("email field"))?;
        gate.fill(&form.password, "password", &credentials.password)
            .await
            .map_err(form_error("password field"))?;
        gate.click(&form.submit, "login button")
            .await
            .map_err(form_error("submit button"))?;

        self.await_confirmation(gate).await?;

        Ok(Session {
            username: credentials.username.clone(),
            authenticated_at: Utc::now(),
            landing_url: gate.current_url().await.ok(),
        })
    }

    /// Poll until the page shows a logged-in marker, an error message, or
    /// the timeout runs out.
    async fn await_confirmation<B: Browser>(
        &self,
        gate: &FetchGate<'_, B>,
    ) -> Result<(), AuthError> {
        let started = Instant::now();
        loop {
            match login::is_logged_in(gate).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => debug!(error = %e, "Logged-in check failed"),
            }
            if let Ok(Some(message)) = login::error_message(gate).await {
                return Err(AuthError::InvalidCredentials(message));
            }

            let waited = started.elapsed();
            if waited >= self.config.timeout {
                return Err(AuthError::VerificationTimeout { waited });
            }
            sleep(self.config.verify_poll).await;
        }
    }
}
