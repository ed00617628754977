//! Participant roster
//!
//! Tracks who is in the room from the relay's `existing-users` /
//! `user-joined` / `user-left` events and picks the default call target.

use watchroom_protocol::UserInfo;

/// One other participant in the room
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    /// Signaling peer id
    pub id: String,

    /// Display name
    pub name: String,
}

/// Room participant list, excluding ourselves
#[derive(Debug, Default)]
pub struct Roster {
    local_id: Option<String>,
    participants: Vec<Participant>,
}

impl Roster {
    /// Empty roster
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt the announced local identity, so snapshots can exclude us
    pub fn set_local_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.participants.retain(|p| p.id != id);
        self.local_id = Some(id);
    }

    /// Apply the `existing-users` snapshot
    pub fn apply_snapshot(&mut self, users: &[UserInfo]) {
        self.participants = users
            .iter()
            .filter(|u| Some(&u.id) != self.local_id.as_ref())
            .map(|u| Participant {
                id: u.id.clone(),
                name: u.name.clone(),
            })
            .collect();
    }

    /// Apply a `user-joined` event
    pub fn apply_joined(&mut self, user: &UserInfo) {
        if Some(&user.id) == self.local_id.as_ref() {
            return;
        }
        if self.participants.iter().any(|p| p.id == user.id) {
            return;
        }
        self.participants.push(Participant {
            id: user.id.clone(),
            name: user.name.clone(),
        });
    }

    /// Apply a `user-left` event; returns whether the peer was present
    pub fn apply_left(&mut self, id: &str) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.id != id);
        self.participants.len() != before
    }

    /// All known other participants
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Number of other participants
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Whether we are alone
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Default call target: the first other participant
    pub fn other_peer(&self) -> Option<String> {
        self.participants.first().map(|p| p.id.clone())
    }
}
