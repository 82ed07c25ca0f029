//! Sign in with Farcaster.
//!
//! The backend hands out a one-time ticket (`GET /auth`) whose URL the user opens on
//! their phone. Meanwhile the client polls `GET /auth/{id}` until the ticket is
//! redeemed, then commits the session through the [`SessionController`].
//!
//! [`SessionController`]: crate::session::SessionController

pub mod handshake;
pub mod poller;
pub mod prompt;

pub use handshake::{begin, HandshakeTicket};
pub use poller::{poll_once, start_polling, PollHandle, PollOutcome, PollResult};
pub use prompt::LoginPrompt;
