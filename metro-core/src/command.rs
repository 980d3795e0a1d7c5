//! Sending control actions on behalf of an authenticated session.

use crate::correlator::Correlator;
use crate::error::MetroError;
use crate::frame::Frame;
use crate::message::{Action, MessageType};
use crate::network::FrameTransport;
use crate::state::Session;

#[derive(Debug, Clone, Default)]
pub struct CommandDispatcher {
    correlator: Correlator,
}

impl CommandDispatcher {
    pub fn new(correlator: Correlator) -> Self {
        Self { correlator }
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Send `CMD` with the session token and wait for `ACK` or `ERR`.
    ///
    /// Nothing is written when the session holds no token.
    pub async fn issue<T>(
        &self,
        session: &Session,
        transport: &mut T,
        action: &Action,
    ) -> Result<(), MetroError>
    where
        T: FrameTransport + ?Sized,
    {
        let token = session.token().ok_or(MetroError::NotAuthenticated)?;
        let request = Frame::command(token.as_str(), action.as_str())?;

        let reply = self
            .correlator
            .request(transport, request, &[MessageType::Ack, MessageType::Err])
            .await
            .inspect_err(|e| tracing::warn!(%action, error = %e, "command failed"))?;

        if reply.is(MessageType::Ack) {
            tracing::info!(%action, "command acknowledged");
            Ok(())
        } else {
            let err = reply.rejection();
            tracing::warn!(%action, error = %err, "command rejected");
            Err(err)
        }
    }
}
