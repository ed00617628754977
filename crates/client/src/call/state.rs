//! Call session states

/// Lifecycle state of one [`super::CallSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// No negotiation started
    Idle,
    /// Acquiring media before the first offer/answer
    Requesting,
    /// Offer sent; waiting for the answer
    OfferSent,
    /// Remote offer applied; answer not yet sent
    OfferReceived,
    /// Answer sent; waiting for the transport to come up
    AnswerSent,
    /// Media flowing
    Connected,
    /// Offer/answer cycle re-running on a live session
    Renegotiating,
    /// Ended by a participant; terminal
    Ended,
    /// Ended by a transport or negotiation failure; terminal
    Failed,
}

impl CallState {
    /// Whether the session can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed)
    }

    /// Whether an offer/answer cycle is in flight
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self,
            CallState::Requesting
                | CallState::OfferSent
                | CallState::OfferReceived
                | CallState::AnswerSent
                | CallState::Renegotiating
        )
    }
}
