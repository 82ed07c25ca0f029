use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{request_error, ApiClient};
use crate::errors::{FetchError, SessionError};
use crate::session::{LoginAttempt, SessionController};
use crate::user::{Profile, Reputation};

/// Result of asking once whether a ticket has been redeemed
#[derive(Debug)]
pub enum PollOutcome {
    /// The user has not finished signing in yet
    Pending,
    Redeemed { bearer: String, profile: Profile },
    Failed(FetchError),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedeemedBody {
    auth_token: String,
    profile: Profile,
}

/// Poll the ticket once.
///
/// 200 means redeemed, 204 means pending, anything else is a failure carrying the
/// response body.
pub async fn poll_once(api: &ApiClient, ticket_id: &str) -> PollOutcome {
    let response = match api.get_raw(&format!("/auth/{ticket_id}"), None).await {
        Ok(response) => response,
        Err(err) => return PollOutcome::Failed(err),
    };

    match response.status() {
        StatusCode::OK => {
            let body = match response.bytes().await {
                Ok(body) => body,
                Err(err) => return PollOutcome::Failed(err.into()),
            };
            match serde_json::from_slice::<RedeemedBody>(&body) {
                Ok(redeemed) => PollOutcome::Redeemed {
                    bearer: redeemed.auth_token,
                    profile: redeemed.profile,
                },
                Err(err) => PollOutcome::Failed(err.into()),
            }
        }
        StatusCode::NO_CONTENT => PollOutcome::Pending,
        status => {
            let body = response.text().await.unwrap_or_default();
            PollOutcome::Failed(request_error(status, &body).into())
        }
    }
}

/// How a polling task ended
#[derive(Debug)]
pub enum PollResult {
    /// The ticket was redeemed and the session committed
    LoggedIn(Profile),
    Failed(SessionError),
    /// Stopped through [`PollHandle::cancel`] or by dropping the handle
    Cancelled,
    /// The session became authenticated some other way
    Superseded,
}

/// Handle to a running polling task.
///
/// Dropping the handle cancels the task.
pub struct PollHandle {
    controller: Arc<SessionController>,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<PollResult>>,
}

impl PollHandle {
    /// Stop polling. Any request still in flight is abandoned and its response is
    /// never applied.
    ///
    /// The flag is raised under the session lock, so once this returns the task can
    /// no longer commit a login.
    pub fn cancel(&self) {
        self.controller.while_locked(|| self.cancel.send_replace(true));
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Wait for the task to end
    pub async fn finished(mut self) -> PollResult {
        let Some(task) = self.task.take() else {
            return PollResult::Cancelled;
        };

        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => PollResult::Cancelled,
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Poll `ticket_id` every `interval` until it is redeemed, fails, or polling is
/// cancelled. Ticks never overlap: the interval is measured from the end of the
/// previous one.
pub fn start_polling(
    controller: Arc<SessionController>,
    ticket_id: String,
    interval: Duration,
) -> PollHandle {
    let (cancel, cancelled) = watch::channel(false);
    let task = tokio::spawn(poll_loop(
        controller.clone(),
        ticket_id,
        interval,
        cancelled,
    ));

    PollHandle {
        controller,
        cancel,
        task: Some(task),
    }
}

enum Step {
    Continue,
    Commit {
        bearer: String,
        profile: Profile,
        reputation: Reputation,
    },
    Fail(SessionError),
}

async fn tick(controller: &SessionController, ticket_id: &str, interval: Duration) -> Step {
    tokio::time::sleep(interval).await;

    match poll_once(controller.api(), ticket_id).await {
        PollOutcome::Pending => Step::Continue,
        PollOutcome::Failed(err) => Step::Fail(SessionError::Poll(err)),
        PollOutcome::Redeemed { bearer, profile } => {
            match controller.fetch_reputation(&bearer).await {
                Ok(reputation) => Step::Commit {
                    bearer,
                    profile,
                    reputation,
                },
                Err(err) => Step::Fail(SessionError::Poll(err)),
            }
        }
    }
}

async fn poll_loop(
    controller: Arc<SessionController>,
    ticket_id: String,
    interval: Duration,
    mut cancelled: watch::Receiver<bool>,
) -> PollResult {
    let mut authenticated = controller.subscribe();
    if controller.is_authenticated() {
        return PollResult::Superseded;
    }

    loop {
        // Whichever branch wins, the others are dropped along with any request
        // they had in flight.
        let step = tokio::select! {
            biased;
            _ = cancelled.wait_for(|c| *c) => {
                debug!(ticket = %ticket_id, "Polling cancelled");
                return PollResult::Cancelled;
            }
            _ = authenticated.wait_for(|a| *a) => {
                debug!(ticket = %ticket_id, "Session authenticated elsewhere, polling stopped");
                return PollResult::Superseded;
            }
            step = tick(&controller, &ticket_id, interval) => step,
        };

        match step {
            Step::Continue => {
                debug!(ticket = %ticket_id, "Sign-in still pending");
            }
            Step::Fail(err) => {
                warn!(ticket = %ticket_id, "Polling stopped: {}", err);
                return PollResult::Failed(err);
            }
            Step::Commit {
                bearer,
                profile,
                reputation,
            } => {
                let attempt = controller.login_if_anonymous(
                    bearer,
                    profile.clone(),
                    reputation,
                    &cancelled,
                );

                return match attempt {
                    Ok(LoginAttempt::Committed) => {
                        info!(ticket = %ticket_id, "Sign-in ticket redeemed");
                        PollResult::LoggedIn(profile)
                    }
                    Ok(LoginAttempt::Cancelled) => PollResult::Cancelled,
                    Ok(LoginAttempt::Superseded) => PollResult::Superseded,
                    Err(err) => PollResult::Failed(err.into()),
                };
            }
        }
    }
}
