use serde::Deserialize;
use tracing::{error, info, instrument};

use crate::api::ApiClient;
use crate::errors::{SessionError, SessionResult};

/// One-time sign-in ticket. Lives only as long as the prompt that requested it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HandshakeTicket {
    pub id: String,
    /// Where the user completes the sign-in (shown as a QR code or opened directly)
    pub url: String,
}

/// Ask the backend for a new sign-in ticket. No retry on failure.
#[instrument(skip_all)]
pub async fn begin(api: &ApiClient) -> SessionResult<HandshakeTicket> {
    match api.get_json::<HandshakeTicket>("/auth", None).await {
        Ok(ticket) => {
            info!(ticket = %ticket.id, "Obtained sign-in ticket");
            Ok(ticket)
        }
        Err(err) => {
            error!("Error fetching auth url: {}", err);
            Err(SessionError::HandshakeInit(err))
        }
    }
}
