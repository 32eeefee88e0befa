//! Role projection: history as a chat-completion message sequence.
//!
//! Each (identity, mode) pair has its own parity table: the speaker expected
//! at even and odd positions and how that speaker is seen from the requesting
//! side. A turn whose role matches the expected speaker takes the slot's
//! perspective; an anomalous turn takes the opposite one. Nothing else about
//! who spoke is consulted.
//!
//! ```text
//!   identity   mode            even (expected → view)     odd (expected → view)
//!   counselor  client_first    client    → counterpart    counselor → own
//!   client     client_first    client    → own            counselor → counterpart
//!   counselor  counselor_first counselor → own            client    → counterpart
//!   client     counselor_first counselor → counterpart    client    → own
//! ```

use serde::{Deserialize, Serialize};

use super::{Mode, Role, Turn};
use crate::transport::ChatMessage;

/// How a past turn looks to the party about to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    /// The requester's own earlier output (`assistant`).
    Own,
    /// The other party's output (`user`).
    Counterpart,
}

impl Perspective {
    fn flip(self) -> Self {
        match self {
            Self::Own => Self::Counterpart,
            Self::Counterpart => Self::Own,
        }
    }
}

/// Expected speaker at one index parity and the view it projects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParitySlot {
    pub expected: Role,
    pub perspective: Perspective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParityTable {
    pub even: ParitySlot,
    pub odd: ParitySlot,
}

const fn slot(expected: Role, perspective: Perspective) -> ParitySlot {
    ParitySlot {
        expected,
        perspective,
    }
}

/// Parity table for a requesting identity under a session mode.
pub const fn parity_table(identity: Role, mode: Mode) -> ParityTable {
    use Perspective::{Counterpart, Own};
    match (identity, mode) {
        (Role::Counselor, Mode::ClientFirst) => ParityTable {
            even: slot(Role::Client, Counterpart),
            odd: slot(Role::Counselor, Own),
        },
        (Role::Client, Mode::ClientFirst) => ParityTable {
            even: slot(Role::Client, Own),
            odd: slot(Role::Counselor, Counterpart),
        },
        (Role::Counselor, Mode::CounselorFirst) => ParityTable {
            even: slot(Role::Counselor, Own),
            odd: slot(Role::Client, Counterpart),
        },
        (Role::Client, Mode::CounselorFirst) => ParityTable {
            even: slot(Role::Counselor, Counterpart),
            odd: slot(Role::Client, Own),
        },
    }
}

/// Perspective of the turn at `index` spoken by `role`.
pub fn perspective_at(index: usize, role: Role, identity: Role, mode: Mode) -> Perspective {
    let table = parity_table(identity, mode);
    let slot = if index % 2 == 0 { table.even } else { table.odd };
    if role == slot.expected {
        slot.perspective
    } else {
        slot.perspective.flip()
    }
}

/// Project `turns` for `identity`. Output order and length match the input.
pub fn project(turns: &[Turn], identity: Role, mode: Mode) -> Vec<ChatMessage> {
    turns
        .iter()
        .enumerate()
        .map(|(index, turn)| match perspective_at(index, turn.role, identity, mode) {
            Perspective::Own => ChatMessage::assistant(turn.content.clone()),
            Perspective::Counterpart => ChatMessage::user(turn.content.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MessageRole;

    fn well_formed(mode: Mode, len: usize) -> Vec<Turn> {
        let mut role = mode.opener();
        (0..len)
            .map(|i| {
                let turn = Turn::new(role, format!("turn {i}"));
                role = role.counterpart();
                turn
            })
            .collect()
    }

    fn roles(messages: &[ChatMessage]) -> Vec<MessageRole> {
        messages.iter().map(|m| m.role).collect()
    }

    // ── Parity tables ──────────────────────────────────────────────

    #[test]
    fn test_parity_fixed_table_indices_0_to_9() {
        use MessageRole::{Assistant as A, User as U};
        let cases = [
            (Role::Counselor, Mode::ClientFirst, [U, A, U, A, U, A, U, A, U, A]),
            (Role::Client, Mode::ClientFirst, [A, U, A, U, A, U, A, U, A, U]),
            (Role::Counselor, Mode::CounselorFirst, [A, U, A, U, A, U, A, U, A, U]),
            (Role::Client, Mode::CounselorFirst, [U, A, U, A, U, A, U, A, U, A]),
        ];
        for (identity, mode, expected) in cases {
            let turns = well_formed(mode, 10);
            let projected = project(&turns, identity, mode);
            assert_eq!(projected.len(), turns.len());
            assert_eq!(roles(&projected), expected, "{identity} / {mode}");
        }
    }

    #[test]
    fn test_projection_preserves_order_and_content() {
        let turns = well_formed(Mode::ClientFirst, 5);
        let projected = project(&turns, Role::Counselor, Mode::ClientFirst);
        for (turn, msg) in turns.iter().zip(&projected) {
            assert_eq!(turn.content, msg.content);
        }
    }

    #[test]
    fn test_anomalous_history_does_not_panic() {
        // Two client turns in a row: the second sits in a counselor slot.
        let turns = vec![
            Turn::new(Role::Client, "a"),
            Turn::new(Role::Client, "b"),
            Turn::new(Role::Counselor, "c"),
        ];
        let projected = project(&turns, Role::Counselor, Mode::ClientFirst);
        assert_eq!(projected.len(), 3);
        assert_eq!(
            roles(&projected),
            [MessageRole::User, MessageRole::User, MessageRole::Assistant]
        );
    }

    #[test]
    fn test_empty_history() {
        assert!(project(&[], Role::Client, Mode::CounselorFirst).is_empty());
    }

    #[test]
    fn test_perspective_depends_only_on_parity_identity_mode() {
        for mode in [Mode::ClientFirst, Mode::CounselorFirst] {
            for identity in [Role::Client, Role::Counselor] {
                let turns = well_formed(mode, 10);
                for (i, turn) in turns.iter().enumerate() {
                    let first = perspective_at(i, turn.role, identity, mode);
                    let again = perspective_at(i % 2, turn.role, identity, mode);
                    assert_eq!(first, again);
                }
            }
        }
    }
}
