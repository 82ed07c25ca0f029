//! Mock Votecaster backend.
//!
//! Serves the endpoints the session client talks to (`/auth`, `/auth/:id`,
//! `/auth/check`, `/profile` and unmuting under `/profile/mutedUsers`) out of an
//! in-memory table of tickets and accounts.
//! Tests drive the handshake by redeeming or failing tickets through [`BackendState`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

/// A Farcaster account known to the mock backend
#[derive(Debug, Clone)]
pub struct FixtureAccount {
    pub fid: u64,
    pub username: String,
    pub display_name: String,
    pub bio: String,
    pub pfp_url: String,
    pub custody: String,
    pub addresses: Vec<String>,
    pub reputation: u32,
    pub reputation_data: Value,
    pub muted_users: Vec<String>,
}

impl FixtureAccount {
    /// A plausible account with a small amount of activity
    pub fn sample(fid: u64, username: &str) -> Self {
        Self {
            fid,
            username: username.to_string(),
            display_name: format!("Fixture {username}"),
            bio: "This is a test user from the fixture server".to_string(),
            pfp_url: format!("https://example.test/avatars/{fid}.png"),
            custody: format!("0x{fid:040x}"),
            addresses: vec![format!("0x{:040x}", fid + 1)],
            reputation: 12,
            reputation_data: json!({
                "activityCounts": {
                    "followersCount": 42,
                    "electionsCreated": 3,
                    "castedVotes": 17,
                    "participationAchievement": 5,
                    "communitiesCount": 1
                },
                "boosters": {
                    "hasVotecasterNFTPass": false,
                    "isVocdoniFarcasterFollower": true
                },
                "points": {
                    "ownerPoints": 30,
                    "voterPoints": 70,
                    "totalPoints": 100
                },
                "totalReputation": 12
            }),
            muted_users: vec![],
        }
    }

    /// Profile shape returned by `GET /auth/:id`
    pub fn profile_json(&self) -> Value {
        json!({
            "fid": self.fid,
            "username": self.username,
            "displayName": self.display_name,
            "bio": self.bio,
            "pfpUrl": self.pfp_url,
            "custody": self.custody,
            "verifications": self.addresses,
        })
    }

    /// Backend user record returned inside `GET /profile`
    pub fn user_json(&self) -> Value {
        json!({
            "userID": self.fid,
            "electionCount": 3,
            "castedVotes": 17,
            "username": self.username,
            "displayname": self.display_name,
            "bio": self.bio,
            "avatar": self.pfp_url,
            "custodyAddress": self.custody,
            "addresses": self.addresses,
            "signers": [],
            "followers": 42,
            "lastUpdated": "2024-06-01T12:00:00Z"
        })
    }
}

#[derive(Debug, Clone)]
enum TicketStatus {
    Pending,
    /// Redeemed with a bearer token and the profile captured at sign-in
    Redeemed { token: String, profile: Value },
    Failed(String),
}

#[derive(Debug)]
struct Ticket {
    polls: u32,
    status: TicketStatus,
}

#[derive(Default)]
struct Backend {
    tickets: HashMap<String, Ticket>,
    /// Bearer token -> account
    accounts: HashMap<String, FixtureAccount>,
    issued: usize,
    last_ticket: Option<String>,
    auto_redeem_after: Option<u32>,
    poll_delay: Duration,
    /// Answer every `GET /auth/check` with this status and an empty body
    check_status: Option<StatusCode>,
}

/// Shared, cloneable handle to the mock backend's state
#[derive(Clone, Default)]
pub struct BackendState {
    inner: Arc<Mutex<Backend>>,
}

impl BackendState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redeem every ticket automatically once it has been polled `polls` times
    pub fn with_auto_redeem(self, polls: u32) -> Self {
        self.lock().auto_redeem_after = Some(polls);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        // A poisoned fixture is still usable for assertions
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Build the axum router serving this backend
    pub fn router(&self) -> Router {
        Router::new()
            .route("/auth", get(auth_link))
            .route("/auth/check", get(auth_check))
            .route("/auth/:id", get(auth_verify))
            .route("/profile", get(profile))
            .route("/profile/mutedUsers/:username", delete(unmute_user))
            .with_state(self.clone())
    }

    /// Make `token` a valid bearer for `account`
    pub fn register_account(&self, token: &str, account: FixtureAccount) {
        self.lock().accounts.insert(token.to_string(), account);
    }

    /// Invalidate a bearer token, as an expired session would be
    pub fn revoke(&self, token: &str) {
        self.lock().accounts.remove(token);
    }

    /// Change the reputation reported for a bearer token
    pub fn set_reputation(&self, token: &str, reputation: u32, data: Value) {
        if let Some(account) = self.lock().accounts.get_mut(token) {
            account.reputation = reputation;
            account.reputation_data = data;
        }
    }

    /// Mark a ticket as completed by the user with the given bearer token.
    /// The token must already be registered.
    pub fn redeem(&self, ticket_id: &str, token: &str) {
        let mut backend = self.lock();
        let Some(profile) = backend.accounts.get(token).map(FixtureAccount::profile_json)
        else {
            warn!("Backend: cannot redeem ticket {ticket_id} with unknown token");
            return;
        };
        if let Some(ticket) = backend.tickets.get_mut(ticket_id) {
            ticket.status = TicketStatus::Redeemed {
                token: token.to_string(),
                profile,
            };
        }
    }

    /// Redeem a ticket for `account` with a token the other endpoints never accept,
    /// as when the session is revoked right after sign-in
    pub fn redeem_unregistered(&self, ticket_id: &str, token: &str, account: &FixtureAccount) {
        if let Some(ticket) = self.lock().tickets.get_mut(ticket_id) {
            ticket.status = TicketStatus::Redeemed {
                token: token.to_string(),
                profile: account.profile_json(),
            };
        }
    }

    /// Add `username` to the muted users of the account behind `token`
    pub fn mute(&self, token: &str, username: &str) {
        if let Some(account) = self.lock().accounts.get_mut(token) {
            account.muted_users.push(username.to_string());
        }
    }

    pub fn muted_users(&self, token: &str) -> Vec<String> {
        self.lock()
            .accounts
            .get(token)
            .map(|account| account.muted_users.clone())
            .unwrap_or_default()
    }

    /// Make every following poll of the ticket fail with `message`
    pub fn fail_ticket(&self, ticket_id: &str, message: &str) {
        if let Some(ticket) = self.lock().tickets.get_mut(ticket_id) {
            ticket.status = TicketStatus::Failed(message.to_string());
        }
    }

    /// Delay every `GET /auth/:id` response by `delay`
    pub fn set_poll_delay(&self, delay: Duration) {
        self.lock().poll_delay = delay;
    }

    /// Make `GET /auth/check` answer with `status` and no body, whatever the bearer
    pub fn set_check_status(&self, status: u16) {
        self.lock().check_status = StatusCode::from_u16(status).ok();
    }

    /// Number of tickets issued through `GET /auth`
    pub fn issued_tickets(&self) -> usize {
        self.lock().issued
    }

    pub fn last_ticket_id(&self) -> Option<String> {
        self.lock().last_ticket.clone()
    }

    /// Number of times a ticket has been polled
    pub fn poll_count(&self, ticket_id: &str) -> u32 {
        self.lock()
            .tickets
            .get(ticket_id)
            .map(|t| t.polls)
            .unwrap_or_default()
    }

    fn account_for(&self, headers: &HeaderMap) -> Option<FixtureAccount> {
        let token = bearer_token(headers)?;
        self.lock().accounts.get(token).cloned()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

// Handler implementations

async fn auth_link(State(state): State<BackendState>) -> impl IntoResponse {
    let id = Uuid::new_v4().to_string();
    let url = format!("https://warpcast.com/~/sign-in-with-farcaster?channelToken={id}");

    let mut backend = state.lock();
    backend.tickets.insert(
        id.clone(),
        Ticket {
            polls: 0,
            status: TicketStatus::Pending,
        },
    );
    backend.issued += 1;
    backend.last_ticket = Some(id.clone());
    info!("Backend: issued authentication ticket {id}");

    Json(json!({ "id": id, "url": url }))
}

async fn auth_verify(State(state): State<BackendState>, Path(id): Path<String>) -> Response {
    let delay = state.lock().poll_delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut backend = state.lock();
    let auto_redeem_after = backend.auto_redeem_after;

    let Some(ticket) = backend.tickets.get_mut(&id) else {
        return (StatusCode::NOT_FOUND, "authentication id not found\n").into_response();
    };
    ticket.polls += 1;

    let auto_token = match (&ticket.status, auto_redeem_after) {
        (TicketStatus::Pending, Some(after)) if ticket.polls >= after => {
            let account = FixtureAccount::sample(1000, "fixture-user");
            let token = format!("fixture-token-{id}");
            ticket.status = TicketStatus::Redeemed {
                token: token.clone(),
                profile: account.profile_json(),
            };
            Some((token, account))
        }
        _ => None,
    };
    let status = ticket.status.clone();

    if let Some((token, account)) = auto_token {
        backend.accounts.entry(token).or_insert(account);
    }

    match status {
        TicketStatus::Pending => StatusCode::NO_CONTENT.into_response(),
        TicketStatus::Failed(message) => {
            (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
        TicketStatus::Redeemed { token, profile } => Json(json!({
            "authToken": token,
            "profile": profile,
        }))
        .into_response(),
    }
}

async fn auth_check(State(state): State<BackendState>, headers: HeaderMap) -> Response {
    if let Some(status) = state.lock().check_status {
        return status.into_response();
    }

    match state.account_for(&headers) {
        Some(account) => Json(json!({
            "reputation": account.reputation,
            "reputationData": account.reputation_data,
        }))
        .into_response(),
        None => (StatusCode::UNAUTHORIZED, "Invalid token\n").into_response(),
    }
}

async fn profile(State(state): State<BackendState>, headers: HeaderMap) -> Response {
    match state.account_for(&headers) {
        Some(account) => Json(json!({
            "user": account.user_json(),
            "reputation": account.reputation,
            "reputationData": account.reputation_data,
            "mutedUsers": account.muted_users,
            "warpcastApiEnabled": false,
        }))
        .into_response(),
        None => (StatusCode::UNAUTHORIZED, "Invalid token\n").into_response(),
    }
}

async fn unmute_user(
    State(state): State<BackendState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, "Invalid token\n").into_response();
    };

    let mut backend = state.lock();
    let Some(account) = backend.accounts.get_mut(token) else {
        return (StatusCode::UNAUTHORIZED, "Invalid token\n").into_response();
    };

    let before = account.muted_users.len();
    account.muted_users.retain(|muted| muted != &username);
    if account.muted_users.len() == before {
        return (StatusCode::NOT_FOUND, "user not muted\n").into_response();
    }

    info!("Backend: unmuted {username}");
    (StatusCode::OK, "ok").into_response()
}
