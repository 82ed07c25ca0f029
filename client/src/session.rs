//! Session lifecycle.
//!
//! [`SessionController`] owns the authenticated/unauthenticated state machine and is
//! the only writer to the [`SessionStore`]. Build one at startup, wrap it in an `Arc`
//! and hand clones to whatever needs the current session.

use std::sync::{Mutex, MutexGuard};

use reqwest::StatusCode;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::api::{request_error, ApiClient};
use crate::errors::{FetchError, SessionError, SessionResult, StoreError};
use crate::store::{SessionStore, StoredSession};
use crate::user::{Profile, ProfileResponse, Reputation, ReputationResponse};

/// Everything an authenticated session holds. The three parts always travel together.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedSession {
    pub bearer: String,
    pub profile: Profile,
    pub reputation: Reputation,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated(AuthenticatedSession),
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated(_))
    }

    pub fn bearer(&self) -> Option<&str> {
        match self {
            Session::Authenticated(auth) => Some(&auth.bearer),
            Session::Anonymous => None,
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        match self {
            Session::Authenticated(auth) => Some(&auth.profile),
            Session::Anonymous => None,
        }
    }

    pub fn reputation(&self) -> Option<&Reputation> {
        match self {
            Session::Authenticated(auth) => Some(&auth.reputation),
            Session::Anonymous => None,
        }
    }
}

/// What persisted state turned out to be on load
#[derive(Debug, PartialEq)]
enum Restored {
    Session(Session),
    /// Some but not all of the fields were present, e.g. a profile without a bearer
    Corrupted,
}

fn restore(stored: StoredSession) -> Restored {
    match stored {
        StoredSession {
            bearer: Some(bearer),
            profile: Some(profile),
            reputation: Some(reputation),
        } => Restored::Session(Session::Authenticated(AuthenticatedSession {
            bearer,
            profile,
            reputation,
        })),
        stored if stored.is_empty() => Restored::Session(Session::Anonymous),
        stored => {
            warn!(
                has_bearer = stored.bearer.is_some(),
                has_profile = stored.profile.is_some(),
                has_reputation = stored.reputation.is_some(),
                "Persisted session is incomplete"
            );
            Restored::Corrupted
        }
    }
}

/// Result of [`SessionController::validate_on_startup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// There was no bearer to check
    NoSession,
    /// The backend accepted the bearer; the reputation snapshot was refreshed
    Valid,
    /// The bearer was rejected (or could not be checked) and the session was dropped
    Invalidated,
}

/// Result of [`SessionController::login_if_anonymous`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginAttempt {
    Committed,
    /// The cancel flag was set; nothing changed
    Cancelled,
    /// A session was already in place; it was left alone
    Superseded,
}

pub struct SessionController {
    api: ApiClient,
    store: SessionStore,
    state: Mutex<Session>,
    authenticated: watch::Sender<bool>,
}

impl SessionController {
    /// Restore whatever session the store holds. Incomplete persisted state is wiped.
    pub fn new(api: ApiClient, store: SessionStore) -> Self {
        let restored = restore(store.load());
        let session = match &restored {
            Restored::Session(session) => session.clone(),
            Restored::Corrupted => Session::Anonymous,
        };

        let (authenticated, _) = watch::channel(session.is_authenticated());
        let controller = Self {
            api,
            store,
            state: Mutex::new(session),
            authenticated,
        };

        if restored == Restored::Corrupted {
            controller.logout();
        }

        controller
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Swap in a new in-memory session and notify subscribers
    fn set(&self, state: &mut Session, session: Session) {
        let authenticated = session.is_authenticated();
        *state = session;
        self.authenticated.send_replace(authenticated);
    }

    pub fn session(&self) -> Session {
        self.lock().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().is_authenticated()
    }

    pub fn bearer(&self) -> Option<String> {
        self.lock().bearer().map(str::to_string)
    }

    pub fn profile(&self) -> Option<Profile> {
        self.lock().profile().cloned()
    }

    pub fn reputation(&self) -> Option<Reputation> {
        self.lock().reputation().cloned()
    }

    /// Watch the authenticated flag. The receiver sees every login and logout.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    /// Enter the authenticated state, replacing any existing session wholesale.
    ///
    /// The session is persisted before it becomes visible in memory; if the write
    /// fails nothing changes.
    pub fn login(
        &self,
        bearer: String,
        profile: Profile,
        reputation: Reputation,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        self.login_locked(&mut state, bearer, profile, reputation)
    }

    fn login_locked(
        &self,
        state: &mut Session,
        bearer: String,
        profile: Profile,
        reputation: Reputation,
    ) -> Result<(), StoreError> {
        self.store.save(&bearer, &profile, &reputation)?;

        info!(fid = profile.fid, username = %profile.username, "Logged in");
        self.set(
            state,
            Session::Authenticated(AuthenticatedSession {
                bearer,
                profile,
                reputation,
            }),
        );

        Ok(())
    }

    /// Log in unless `cancelled` is set or a session already exists.
    ///
    /// Both checks happen under the same lock as the write, so nothing can log in
    /// or cancel between the check and the commit.
    pub fn login_if_anonymous(
        &self,
        bearer: String,
        profile: Profile,
        reputation: Reputation,
        cancelled: &watch::Receiver<bool>,
    ) -> Result<LoginAttempt, StoreError> {
        let mut state = self.lock();
        if *cancelled.borrow() {
            return Ok(LoginAttempt::Cancelled);
        }
        if state.is_authenticated() {
            return Ok(LoginAttempt::Superseded);
        }

        self.login_locked(&mut state, bearer, profile, reputation)?;
        Ok(LoginAttempt::Committed)
    }

    /// Run `f` while holding the session lock, ordering it against every login and logout
    pub(crate) fn while_locked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _state = self.lock();
        f()
    }

    /// Drop the session. Always succeeds; a storage failure is only logged.
    pub fn logout(&self) {
        let mut state = self.lock();
        self.logout_locked(&mut state);
    }

    fn logout_locked(&self, state: &mut Session) {
        if let Err(err) = self.store.clear() {
            warn!("Failed to clear persisted session: {}", err);
        }

        if state.is_authenticated() {
            info!("Logged out");
        }
        self.set(state, Session::Anonymous);
    }

    /// Log in with a bearer token obtained out-of-band.
    ///
    /// Fetches the profile and reputation with that token; on failure the current
    /// state is left untouched and nothing is persisted.
    #[instrument(skip_all)]
    pub async fn token_login(&self, token: &str) -> SessionResult<()> {
        let response: ProfileResponse = self
            .api
            .get_json("/profile", Some(token))
            .await
            .map_err(|err| {
                warn!("Token login rejected: {}", err);
                SessionError::TokenLogin(err)
            })?;

        let (profile, reputation) = response.into_parts();
        self.login(token.to_string(), profile, reputation)?;

        Ok(())
    }

    /// Token login from a URL or query string carrying a `token` parameter.
    ///
    /// Returns `Ok(false)` without doing anything when there is no token or the
    /// session is already authenticated.
    pub async fn token_login_from_url(&self, input: &str) -> SessionResult<bool> {
        let Some(token) = token_from_url(input) else {
            return Ok(false);
        };
        if self.is_authenticated() {
            return Ok(false);
        }

        self.token_login(&token).await?;
        Ok(true)
    }

    /// Check the held bearer against the backend.
    ///
    /// A rejected bearer, or any failure to reach the backend, logs the session out.
    /// On success only the reputation snapshot is replaced.
    #[instrument(skip_all)]
    pub async fn validate_on_startup(&self) -> Validation {
        let Some(bearer) = self.bearer() else {
            return Validation::NoSession;
        };

        match self.fetch_reputation(&bearer).await {
            Ok(reputation) => {
                self.refresh_reputation(&bearer, reputation);
                Validation::Valid
            }
            Err(err) => {
                let err = SessionError::SessionInvalid(err);
                warn!("{}", err);

                let mut state = self.lock();
                // Only drop the session that was actually checked
                if state.bearer() == Some(bearer.as_str()) {
                    self.logout_locked(&mut state);
                }
                Validation::Invalidated
            }
        }
    }

    /// Fetch the reputation snapshot for a bearer via `GET /auth/check`.
    ///
    /// Only a 200 counts as accepting the bearer; any other status is an error.
    pub async fn fetch_reputation(&self, bearer: &str) -> Result<Reputation, FetchError> {
        let response = self.api.get("/auth/check", Some(bearer)).await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(request_error(status, &body).into());
        }

        let body = response.bytes().await?;
        let response: ReputationResponse = serde_json::from_slice(&body)?;
        Ok(response.into())
    }

    fn refresh_reputation(&self, bearer: &str, reputation: Reputation) {
        let mut state = self.lock();
        let Session::Authenticated(current) = &*state else {
            return;
        };
        if current.bearer != bearer {
            // Someone logged in with a different token while we were checking
            return;
        }

        let refreshed = AuthenticatedSession {
            reputation,
            ..current.clone()
        };
        if let Err(err) = self
            .store
            .save(&refreshed.bearer, &refreshed.profile, &refreshed.reputation)
        {
            warn!("Failed to persist refreshed reputation: {}", err);
            return;
        }

        self.set(&mut state, Session::Authenticated(refreshed));
    }

    /// Re-read the persisted session, picking up changes made outside this controller.
    ///
    /// Incomplete persisted state (for instance a profile whose bearer was removed)
    /// forces a logout.
    pub fn reload(&self) {
        let mut state = self.lock();
        match restore(self.store.load()) {
            Restored::Session(session) => {
                if *state != session {
                    info!(
                        authenticated = session.is_authenticated(),
                        "Persisted session changed"
                    );
                    self.set(&mut state, session);
                }
            }
            Restored::Corrupted => self.logout_locked(&mut state),
        }
    }
}

/// Pull a non-empty `token` parameter out of a URL or a bare query string
pub fn token_from_url(input: &str) -> Option<String> {
    let input = input.trim();
    let query = match input.split_once('?') {
        Some((_, query)) => query,
        None if input.contains('=') => input,
        None => return None,
    };
    let query = query.split('#').next().unwrap_or_default();

    let params: Vec<(String, String)> = serde_urlencoded::from_str(query).ok()?;
    params
        .into_iter()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
