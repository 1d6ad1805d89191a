use async_trait::async_trait;

use crate::browser::{Page, Session};
use crate::captcha::CaptchaResolver;
use crate::config::Config;
use crate::error::{Result, VtopError};

/// States of one login session. Three independent sources of nondeterminism
/// feed the transitions: the challenge image may or may not appear, a
/// presented challenge may be solved wrongly, and a secondary out-of-band
/// challenge may or may not be required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Start,
    CredentialsFilled,
    ChallengePresented,
    Submitted,
    InvalidChallenge,
    SecondaryChallengePending,
    LoggedIn,
    Failed,
}

/// Resumption signal for the secondary, human-only challenge.
///
/// The controller suspends in `SecondaryChallengePending` until `resolve`
/// returns; a console front end blocks on stdin, a service front end can
/// await a webhook instead. The state machine does not care which.
#[async_trait]
pub trait SecondaryChallengeHandler: Send + Sync {
    async fn resolve(&self) -> Result<()>;
}

/// Blocks on an operator pressing Enter in the controlling terminal.
pub struct ConsoleHandler;

#[async_trait]
impl SecondaryChallengeHandler for ConsoleHandler {
    async fn resolve(&self) -> Result<()> {
        eprintln!("A secondary verification is pending. Complete it in the browser, then press Enter.");
        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| ())
        })
        .await
        .map_err(|e| VtopError::ChallengeSolve(format!("operator input interrupted: {e}")))??;
        Ok(())
    }
}

/// Drives credential submission, challenge solving, and retry-on-failure
/// over a single [`Session`].
pub struct LoginController {
    config: Config,
    resolver: CaptchaResolver,
    secondary: Box<dyn SecondaryChallengeHandler>,
}

impl LoginController {
    pub fn new(
        config: Config,
        resolver: CaptchaResolver,
        secondary: Box<dyn SecondaryChallengeHandler>,
    ) -> Self {
        Self {
            config,
            resolver,
            secondary,
        }
    }

    /// Runs the full login flow. On success the session is authenticated
    /// and any post-login overlay has been dismissed. On retry exhaustion
    /// the session is closed before [`VtopError::LoginExhausted`] surfaces,
    /// so callers never scrape through a dead handle.
    pub async fn login(&self, session: &mut Session) -> Result<()> {
        let max = self.config.max_login_attempts;

        {
            let page = session.page();
            page.goto(&self.config.entry_url).await?;
            page.click(&self.config.selectors.student_login_link).await?;
            self.config.pacing.pause().await;
        }

        for attempt in 1..=max {
            tracing::info!(attempt, max, "login attempt");
            let outcome = self.attempt_once(session.page()).await;
            match outcome {
                Ok(LoginState::LoggedIn) => {
                    self.dismiss_popup(session.page()).await?;
                    tracing::info!("login successful");
                    return Ok(());
                }
                Ok(state) => {
                    tracing::warn!(state = ?state, "login attempt unsuccessful, retrying");
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(error = %e, "challenge solve failed, retrying");
                }
                Err(e) => {
                    if let Err(close_err) = session.close().await {
                        tracing::warn!(error = %close_err, "session close failed");
                    }
                    return Err(e);
                }
            }
        }

        tracing::error!(attempts = max, "login retries exhausted");
        if let Err(e) = session.close().await {
            tracing::warn!(error = %e, "session close failed");
        }
        Err(VtopError::LoginExhausted { attempts: max })
    }

    /// One pass through the state machine:
    /// `Start -> CredentialsFilled -> ChallengePresented? -> Submitted ->
    /// {LoggedIn | InvalidChallenge | SecondaryChallengePending -> LoggedIn?}`.
    async fn attempt_once(&self, page: &dyn Page) -> Result<LoginState> {
        let sel = &self.config.selectors;
        let waits = &self.config.timeouts;

        if !page.wait_visible(&sel.username_field, waits.page_settle).await? {
            return Err(VtopError::LoginUnavailable {
                timeout: waits.page_settle,
            });
        }

        page.fill(&sel.username_field, &self.config.credentials.username)
            .await?;
        page.fill(&sel.password_field, &self.config.credentials.password)
            .await?;
        tracing::debug!(state = ?LoginState::CredentialsFilled, "credentials filled");

        // Challenge absence is a valid branch, decided by an explicit
        // bounded probe rather than a caught timeout.
        if page
            .wait_visible(&sel.challenge_image, waits.challenge_probe)
            .await?
        {
            tracing::debug!(state = ?LoginState::ChallengePresented, "challenge presented");
            let uri = page
                .attr(&sel.challenge_image, "src")
                .await?
                .ok_or_else(|| {
                    VtopError::ChallengeSolve("challenge image has no src attribute".to_string())
                })?;
            let solution = self.resolver.solve(&uri).await?;
            tracing::debug!(solution = %solution, "challenge solved");
            page.fill(&sel.challenge_input, &solution).await?;
        } else {
            tracing::debug!("no challenge presented, proceeding to submit");
        }

        page.click(&sel.submit_button).await?;
        tracing::debug!(state = ?LoginState::Submitted, "credentials submitted");
        self.config.pacing.pause().await;

        if self.left_login_page(page).await? {
            return Ok(LoginState::LoggedIn);
        }

        // Still on the login page. An explicit invalid-challenge signal
        // means a fresh challenge is expected on the next attempt.
        if page.wait_visible(&sel.alert_region, waits.alert_probe).await? {
            if let Some(text) = page.text(&sel.alert_region).await? {
                if text.contains(&sel.invalid_challenge_text) {
                    tracing::warn!("portal rejected the challenge solution");
                    return Ok(LoginState::InvalidChallenge);
                }
            }
        }

        // No rejection signal: a secondary, human-only challenge may be
        // holding up the flow.
        if page
            .wait_visible(&sel.secondary_challenge, waits.challenge_probe)
            .await?
        {
            tracing::info!(
                state = ?LoginState::SecondaryChallengePending,
                "suspending for operator resolution"
            );
            self.secondary.resolve().await?;
            if self.left_login_page(page).await? {
                return Ok(LoginState::LoggedIn);
            }
        }

        Ok(LoginState::Failed)
    }

    async fn left_login_page(&self, page: &dyn Page) -> Result<bool> {
        let url = page.current_url().await?;
        Ok(!url.to_lowercase().contains("login"))
    }

    /// The post-login informational overlay is dismissed when present;
    /// its absence is tolerated.
    async fn dismiss_popup(&self, page: &dyn Page) -> Result<()> {
        let sel = &self.config.selectors;
        if page
            .wait_visible(&sel.popup_dismiss, self.config.timeouts.popup_dismiss)
            .await?
        {
            page.click(&sel.popup_dismiss).await?;
            tracing::debug!("post-login overlay dismissed");
        } else {
            tracing::debug!("no post-login overlay found");
        }
        Ok(())
    }
}
