use std::sync::Arc;
use std::time::Duration;

use crate::auth::handshake::{begin, HandshakeTicket};
use crate::auth::poller::{start_polling, PollHandle, PollResult};
use crate::errors::SessionResult;
use crate::session::SessionController;

/// An open "Sign in with Farcaster" prompt.
///
/// Owns at most one handshake ticket and the polling task for it. Closing (or
/// dropping) the prompt discards the ticket and cancels polling.
pub struct LoginPrompt {
    controller: Arc<SessionController>,
    interval: Duration,
    ticket: Option<HandshakeTicket>,
    poller: Option<PollHandle>,
}

impl LoginPrompt {
    pub fn open(controller: Arc<SessionController>, interval: Duration) -> Self {
        Self {
            controller,
            interval,
            ticket: None,
            poller: None,
        }
    }

    /// The prompt's ticket, requested from the backend on first use only.
    ///
    /// If the request fails the prompt stays ticketless and calling this again retries.
    pub async fn ticket(&mut self) -> SessionResult<&HandshakeTicket> {
        let ticket = match self.ticket.take() {
            Some(ticket) => ticket,
            None => begin(self.controller.api()).await?,
        };

        Ok(&*self.ticket.insert(ticket))
    }

    /// Get the ticket and start polling for it, unless the session is already
    /// authenticated or polling is already running.
    pub async fn start(&mut self) -> SessionResult<&HandshakeTicket> {
        let ticket = self.ticket().await?.clone();

        if self.poller.is_none() && !self.controller.is_authenticated() {
            self.poller = Some(start_polling(
                self.controller.clone(),
                ticket.id.clone(),
                self.interval,
            ));
        }

        Ok(&*self.ticket.insert(ticket))
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|poller| !poller.is_finished())
    }

    /// Wait for the polling task to end. `None` if polling was never started.
    ///
    /// The task is owned by the returned future from here on, so dropping that future
    /// before it resolves cancels polling.
    pub async fn wait(&mut self) -> Option<PollResult> {
        let poller = self.poller.take()?;
        Some(poller.finished().await)
    }

    /// Close the prompt, stopping any polling immediately
    pub fn close(self) {
        if let Some(poller) = &self.poller {
            poller.cancel();
        }
    }
}
