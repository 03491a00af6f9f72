use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

pub static SESSION_COLLECTION_NAME: &str = "tutoring_sessions";

/// Booking lifecycle. Legal transitions:
///
/// ```text
/// pending ---> confirmed ---> completed
///    \
///     `-> cancelled
/// ```
///
/// `completed` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn can_transition(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// Whether a session in this status still counts against the slot's
    /// seat capacity. Completed sessions consumed their seat; cancelled
    /// ones gave it back.
    pub fn holds_seat(self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::Confirmed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Confirmed => write!(f, "confirmed"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TutoringSession {
    #[serde(
        default = "Uuid::new_v4",
        rename = "_id",
        with = "bson::serde_helpers::uuid_1_as_binary"
    )]
    pub id: Uuid,

    pub student_id: Uuid,
    pub student_name: String,
    pub student_account: String,

    pub teacher_id: Uuid,
    pub teacher_name: String,

    pub subject: String,
    #[serde(default)]
    pub course_id: Option<Uuid>,
    #[serde(default)]
    pub course_name: Option<String>,

    pub slot_id: Uuid,
    pub date: NaiveDate,
    pub time: String,
    pub duration_mins: u32,

    pub status: SessionStatus,
    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::SessionStatus::*;

    const ALL: [super::SessionStatus; 4] = [Pending, Confirmed, Completed, Cancelled];

    #[test]
    fn only_the_three_legal_edges_are_accepted() {
        let legal = [(Pending, Confirmed), (Pending, Cancelled), (Confirmed, Completed)];

        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn terminal_states_reject_every_move() {
        for terminal in [Completed, Cancelled] {
            assert!(terminal.is_terminal());
            for to in ALL {
                assert!(!terminal.can_transition(to));
            }
        }
    }

    #[test]
    fn seat_is_held_until_a_terminal_state() {
        assert!(Pending.holds_seat());
        assert!(Confirmed.holds_seat());
        assert!(!Completed.holds_seat());
        assert!(!Cancelled.holds_seat());
    }
}
