//! Driver presence (online/offline) with optimistic toggling.
//!
//! A toggle flips the displayed status immediately and sends `updateStatus`. The server's
//! acknowledgement always wins, whatever was displayed. After every (re)connect the
//! client asks for the status again with `getStatus`.

use crate::channel::OutboundMessage;
use crate::model::{PresenceStatus, SessionIdentity};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceState {
    confirmed: PresenceStatus,
    pending: Option<PresenceStatus>,
}

impl PresenceState {
    pub fn new(confirmed: PresenceStatus) -> Self {
        Self {
            confirmed,
            pending: None,
        }
    }

    /// What the UI should show.
    pub fn displayed(&self) -> PresenceStatus {
        self.pending.unwrap_or(self.confirmed)
    }

    pub fn confirmed(&self) -> PresenceStatus {
        self.confirmed
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Flips the displayed status and returns the message that requests it.
    pub fn toggle(&mut self, identity: &SessionIdentity) -> OutboundMessage {
        let wanted = self.displayed().toggled();
        self.pending = Some(wanted);
        OutboundMessage::UpdateStatus {
            user_id: identity.user_id,
            status: wanted,
        }
    }

    /// The request could not be delivered; fall back to the last confirmed status.
    pub fn revert(&mut self) {
        self.pending = None;
    }

    /// Applies a server acknowledgement. Returns whether the displayed status changed.
    pub fn on_ack(&mut self, status: PresenceStatus) -> bool {
        let before = self.displayed();
        self.confirmed = status;
        self.pending = None;
        debug!(%status, changed = before != status, "Presence acknowledged");
        before != status
    }

    /// Message to send after the channel (re)opens.
    pub fn resync(identity: &SessionIdentity) -> OutboundMessage {
        OutboundMessage::GetStatus {
            user_id: identity.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> SessionIdentity {
        SessionIdentity {
            user_id: 7,
            username: None,
        }
    }

    #[test]
    fn test_toggle_is_optimistic() {
        let mut presence = PresenceState::default();
        let msg = presence.toggle(&me());
        assert_eq!(presence.displayed(), PresenceStatus::Online);
        assert_eq!(presence.confirmed(), PresenceStatus::Offline);
        assert_eq!(
            msg,
            OutboundMessage::UpdateStatus {
                user_id: 7,
                status: PresenceStatus::Online
            }
        );
    }

    #[test]
    fn test_server_ack_wins() {
        let mut presence = PresenceState::default();
        presence.toggle(&me());
        // server refused to put us online
        assert!(presence.on_ack(PresenceStatus::Offline));
        assert_eq!(presence.displayed(), PresenceStatus::Offline);
        assert!(!presence.is_pending());
    }

    #[test]
    fn test_revert_restores_confirmed() {
        let mut presence = PresenceState::new(PresenceStatus::Online);
        presence.toggle(&me());
        presence.revert();
        assert_eq!(presence.displayed(), PresenceStatus::Online);
    }
}
