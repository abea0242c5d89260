use serde::Serialize;
use tracing::debug;

use super::intent::{is_affirmative, is_negative};
use super::keywords::{contains_any, ASSISTANT_PHOTO_TRIGGERS, PHOTO_DECLINES, USER_PHOTO_TRIGGERS};
use crate::session::Role;

/// Where the photo side-flow currently is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoState {
    #[default]
    None,
    /// A photo was asked for or offered; waiting for the user to pick one or
    /// decline. Capture is paused.
    ChoosingSource,
    /// The image turn is being sent; capture stays paused
    Sending,
}

/// What a call into `PhotoFlow` changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoTransition {
    Opened,
    Accepted,
    Declined,
    Sent,
}

/// Photo side-flow: `none → choosing_source → sending → none`
#[derive(Debug, Default)]
pub struct PhotoFlow {
    state: PhotoState,
}

impl PhotoFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PhotoState {
        self.state
    }

    /// Capture must not reach the AI while the photo side-flow is open
    pub fn capture_paused(&self) -> bool {
        self.state != PhotoState::None
    }

    /// Feed a committed message or a transcript fragment
    pub fn observe(&mut self, role: Role, text: &str) -> Option<PhotoTransition> {
        let lower = text.to_lowercase();
        match (self.state, role) {
            (PhotoState::None, Role::Assistant) if contains_any(&lower, ASSISTANT_PHOTO_TRIGGERS) => {
                self.open()
            }
            (PhotoState::None, Role::User) if contains_any(&lower, USER_PHOTO_TRIGGERS) => self.open(),
            (PhotoState::ChoosingSource, Role::User) => {
                if is_negative(text) || contains_any(&lower, PHOTO_DECLINES) {
                    debug!("Photo declined: {}", text);
                    self.state = PhotoState::None;
                    Some(PhotoTransition::Declined)
                } else if is_affirmative(text) {
                    self.accept()
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn open(&mut self) -> Option<PhotoTransition> {
        debug!("Photo side-flow opened");
        self.state = PhotoState::ChoosingSource;
        Some(PhotoTransition::Opened)
    }

    /// The user picked a photo; only valid while choosing
    pub fn accept(&mut self) -> Option<PhotoTransition> {
        if self.state != PhotoState::ChoosingSource {
            return None;
        }
        self.state = PhotoState::Sending;
        Some(PhotoTransition::Accepted)
    }

    /// The image turn went out
    pub fn sent(&mut self) -> Option<PhotoTransition> {
        if self.state != PhotoState::Sending {
            return None;
        }
        self.state = PhotoState::None;
        Some(PhotoTransition::Sent)
    }

    /// Abandon the flow from any state
    pub fn cancel(&mut self) {
        self.state = PhotoState::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_request_then_accept_then_send() {
        let mut flow = PhotoFlow::new();
        assert_eq!(
            flow.observe(Role::Assistant, "Would you like to show me a picture?"),
            Some(PhotoTransition::Opened)
        );
        assert!(flow.capture_paused());

        assert_eq!(flow.observe(Role::User, "Yeah sure"), Some(PhotoTransition::Accepted));
        assert!(flow.capture_paused());

        assert_eq!(flow.sent(), Some(PhotoTransition::Sent));
        assert_eq!(flow.state(), PhotoState::None);
        assert!(!flow.capture_paused());
    }

    #[test]
    fn user_offer_opens_and_decline_closes() {
        let mut flow = PhotoFlow::new();
        assert_eq!(
            flow.observe(Role::User, "I could upload one"),
            Some(PhotoTransition::Opened)
        );
        assert_eq!(
            flow.observe(Role::User, "Actually no thanks"),
            Some(PhotoTransition::Declined)
        );
        assert_eq!(flow.state(), PhotoState::None);
        assert!(!flow.capture_paused());
    }

    #[test]
    fn unrelated_chatter_leaves_state_alone() {
        let mut flow = PhotoFlow::new();
        assert_eq!(flow.observe(Role::Assistant, "What kind of plant is it?"), None);

        flow.observe(Role::Assistant, "I'd like to see it");
        assert_eq!(flow.observe(Role::User, "It's on the windowsill"), None);
        assert_eq!(flow.state(), PhotoState::ChoosingSource);
    }

    #[test]
    fn sent_without_accept_is_ignored() {
        let mut flow = PhotoFlow::new();
        assert_eq!(flow.sent(), None);
        assert_eq!(flow.accept(), None);
    }
}
