//! Reports the install attribution token once per start.

use crate::{AttributionTokenSource, IdentityProvider};
use adcider_outbox::AttributionOutbox;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct AttributionReporter {
    identity: Arc<dyn IdentityProvider>,
    tokens: Arc<dyn AttributionTokenSource>,
    outbox: AttributionOutbox,
}

impl AttributionReporter {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        tokens: Arc<dyn AttributionTokenSource>,
        outbox: AttributionOutbox,
    ) -> Self {
        Self {
            identity,
            tokens,
            outbox,
        }
    }

    /// Fetch the token and queue it as a token-only fragment.
    ///
    /// Returns whether a token was queued.
    pub async fn start(&self) -> bool {
        info!("Starting attribution reporter");
        let uid = self.identity.installation_id();
        debug!(uid = %uid, "Resolved installation uid");

        let token = match self.tokens.fetch_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                info!("No attribution token available");
                return false;
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch attribution token");
                return false;
            }
        };

        info!("Attribution token fetched successfully");
        if let Err(e) = self.outbox.queue(uid, Some(token), Vec::new()).await {
            error!(error = %e, "Failed to queue attribution token");
            return false;
        }
        true
    }
}
