use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

use crate::data::user::User;

pub static ROSTER_COLLECTION_NAME: &str = "course_rosters";

/// Denormalized copy of one enrolled student, embedded in a course's roster
/// document. The authoritative record stays on the user document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RosterEntry {
    pub id: Uuid,
    pub name: String,
    pub account: String,
    pub email: String,
    #[serde(default)]
    pub student_no: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
}

impl RosterEntry {
    pub fn for_user(user: &User) -> RosterEntry {
        RosterEntry {
            id: user.id,
            name: user.name.clone(),
            account: user.username.clone(),
            email: user.email.clone(),
            student_no: user.student_no.clone(),
            grade: user.grade.clone(),
        }
    }
}

/// Per-course student list, keyed by the composite course key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseRoster {
    #[serde(rename = "_id")]
    pub course_key: String,
    #[serde(default)]
    pub students: Vec<RosterEntry>,
}

/// The set differences an enrollment change decomposes into.
///
/// `refresh` is the union of old and new: denormalized student fields are
/// rewritten in every touched roster so stale display data gets corrected
/// even where membership didn't change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentSync {
    pub added: Vec<Uuid>,
    pub removed: Vec<Uuid>,
    pub refresh: Vec<Uuid>,
}

impl EnrollmentSync {
    pub fn plan(old: &[Uuid], new: &[Uuid]) -> EnrollmentSync {
        let old_set: HashSet<Uuid> = old.iter().copied().collect();
        let new_set: HashSet<Uuid> = new.iter().copied().collect();

        let mut added = vec![];
        let mut seen = HashSet::new();
        for id in new {
            if !old_set.contains(id) && seen.insert(*id) {
                added.push(*id);
            }
        }

        let mut removed = vec![];
        let mut seen = HashSet::new();
        for id in old {
            if !new_set.contains(id) && seen.insert(*id) {
                removed.push(*id);
            }
        }

        let mut refresh = vec![];
        let mut seen = HashSet::new();
        for id in old.iter().chain(new.iter()) {
            if seen.insert(*id) {
                refresh.push(*id);
            }
        }

        EnrollmentSync {
            added,
            removed,
            refresh,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.refresh.is_empty()
    }
}

/// Which per-document updates went through. Partial synchronization is an
/// accepted outcome: a failure on one roster document must not abort the
/// rest, and already-applied writes are not rolled back.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SyncOutcome {
    pub applied: Vec<String>,
    pub failed: Vec<String>,
}

impl SyncOutcome {
    pub fn applied(&mut self, key: impl ToString) {
        self.applied.push(key.to_string());
    }

    pub fn failed(&mut self, key: impl ToString) {
        self.failed.push(key.to_string());
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn plan_splits_into_set_differences() {
        let all = ids(4);
        let old = vec![all[0], all[1], all[2]];
        let new = vec![all[1], all[2], all[3]];

        let plan = EnrollmentSync::plan(&old, &new);
        assert_eq!(plan.added, vec![all[3]]);
        assert_eq!(plan.removed, vec![all[0]]);
        assert_eq!(plan.refresh, vec![all[0], all[1], all[2], all[3]]);
    }

    #[test]
    fn plan_ignores_order_and_duplicates() {
        let all = ids(3);
        let old = vec![all[0], all[1], all[1]];
        let new = vec![all[1], all[0], all[2], all[2]];

        let plan = EnrollmentSync::plan(&old, &new);
        assert_eq!(plan.added, vec![all[2]]);
        assert!(plan.removed.is_empty());
    }

    #[test]
    fn plan_of_identical_lists_only_refreshes() {
        let courses = ids(2);
        let plan = EnrollmentSync::plan(&courses, &courses);
        assert!(plan.added.is_empty());
        assert!(plan.removed.is_empty());
        assert_eq!(plan.refresh, courses);
    }

    #[test]
    fn plan_of_empty_lists_is_noop() {
        assert!(EnrollmentSync::plan(&[], &[]).is_noop());
    }

    /// Applying the same plan twice must leave the roster unchanged: adds are
    /// guarded by an id-existence check, removes by id match.
    #[test]
    fn plan_application_is_idempotent() {
        let all = ids(3);
        let old = vec![all[0], all[1]];
        let new = vec![all[1], all[2]];

        // In-memory model of the guarded update operators sync_enrollment
        // issues per roster document.
        fn apply(plan: &EnrollmentSync, member_of: &mut HashSet<Uuid>, student: Uuid) {
            for course in &plan.added {
                if member_of.contains(course) {
                    continue; // guarded push: entry already present
                }
                member_of.insert(*course);
                let _ = student;
            }
            for course in &plan.removed {
                member_of.remove(course);
            }
        }

        let student = Uuid::new_v4();
        let plan = EnrollmentSync::plan(&old, &new);

        let mut once: HashSet<Uuid> = old.iter().copied().collect();
        apply(&plan, &mut once, student);

        let mut twice: HashSet<Uuid> = old.iter().copied().collect();
        apply(&plan, &mut twice, student);
        apply(&plan, &mut twice, student);

        assert_eq!(once, twice);
        assert_eq!(once, [all[1], all[2]].into_iter().collect());
    }

    #[test]
    fn outcome_tracks_partial_failure() {
        let mut outcome = SyncOutcome::default();
        outcome.applied("數學基礎(M101)");
        outcome.failed("英文進階(E201)");
        assert!(!outcome.is_complete());
        assert_eq!(outcome.applied.len(), 1);
    }
}
