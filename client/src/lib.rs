//! Session and sign-in core for the Votecaster client.
//!
//! - [`store`]: durable storage for the bearer, profile and reputation entries
//! - [`api`]: backend HTTP client that attaches the bearer and normalizes failures
//! - [`auth`]: the QR sign-in handshake and the bearer poller
//! - [`session`]: the session lifecycle controller

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod session;
pub mod store;
pub mod user;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use errors::{FetchError, RequestError, SessionError, SessionResult, StoreError};
pub use session::{AuthenticatedSession, LoginAttempt, Session, SessionController, Validation};
pub use store::{FileStore, KeyValueStore, MemoryStore, SessionStore};
pub use user::{Profile, Reputation, ReputationData};
