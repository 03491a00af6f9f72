use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

use crate::data::course::StudentCourse;

pub static SLOT_COLLECTION_NAME: &str = "time_slots";

/// Group slots are unbounded; their capacity is pinned to this sentinel so
/// the `current_students < max_students` check stays uniform.
pub const GROUP_CAPACITY_SENTINEL: u32 = 999;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TutoringType {
    Individual,
    Group,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TutoringMethod {
    Online,
    Physical,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Full,
    Cancelled,
}

/// A bookable tutoring time window published by a teacher.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimeSlot {
    #[serde(
        default = "Uuid::new_v4",
        rename = "_id",
        with = "bson::serde_helpers::uuid_1_as_binary"
    )]
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub teacher_name: String,

    pub date: NaiveDate,
    /// Start of the window, "HH:MM".
    pub time: String,
    pub duration_mins: u32,

    pub tutoring_type: TutoringType,
    pub max_students: u32,
    #[serde(default)]
    pub current_students: u32,
    pub status: SlotStatus,

    // At most one of the two restriction kinds is set by the write path;
    // the evaluator still defines precedence for documents where the
    // invariant doesn't hold.
    #[serde(default)]
    pub subject_restriction: Option<String>,
    #[serde(default)]
    pub course_restrictions: Vec<Uuid>,

    pub method: TutoringMethod,
    #[serde(default)]
    pub location: Option<String>,
}

impl TimeSlot {
    /// Whether a booking attempt may proceed at all. The storage layer
    /// re-checks this atomically; this is the advisory pre-check.
    pub fn is_bookable(&self) -> bool {
        self.status == SlotStatus::Available && self.current_students < self.max_students
    }

    /// The subset of the student's enrolled courses that satisfies this
    /// slot's restriction.
    ///
    /// A student with no enrolled courses qualifies for nothing. A non-empty
    /// course-id restriction takes precedence over a subject restriction;
    /// with neither set, every enrolled course qualifies.
    pub fn eligible_courses(&self, student_courses: &[StudentCourse]) -> Vec<StudentCourse> {
        if student_courses.is_empty() {
            return vec![];
        }

        if !self.course_restrictions.is_empty() {
            return student_courses
                .iter()
                .filter(|c| self.course_restrictions.contains(&c.id))
                .cloned()
                .collect();
        }

        if let Some(subject) = &self.subject_restriction {
            return student_courses
                .iter()
                .filter(|c| &c.subject == subject)
                .cloned()
                .collect();
        }

        student_courses.to_vec()
    }

    pub fn is_eligible(&self, student_courses: &[StudentCourse]) -> bool {
        !self.eligible_courses(student_courses).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> TimeSlot {
        TimeSlot {
            id: Uuid::new_v4(),
            teacher_id: Uuid::new_v4(),
            teacher_name: "王老師".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
            time: "19:00".to_string(),
            duration_mins: 60,
            tutoring_type: TutoringType::Individual,
            max_students: 1,
            current_students: 0,
            status: SlotStatus::Available,
            subject_restriction: None,
            course_restrictions: vec![],
            method: TutoringMethod::Online,
            location: None,
        }
    }

    fn course(subject: &str) -> StudentCourse {
        StudentCourse {
            id: Uuid::new_v4(),
            name: format!("{}課程", subject),
            code: "C1".to_string(),
            subject: subject.to_string(),
            grade: None,
        }
    }

    #[test]
    fn no_enrolled_courses_means_not_eligible() {
        let unrestricted = slot();
        assert!(!unrestricted.is_eligible(&[]));
        assert!(unrestricted.eligible_courses(&[]).is_empty());
    }

    #[test]
    fn course_restriction_needs_a_matching_id() {
        let mut s = slot();
        s.course_restrictions = vec![Uuid::new_v4()];

        let enrolled = vec![course("數學"), course("英文")];
        assert!(!s.is_eligible(&enrolled));

        s.course_restrictions.push(enrolled[1].id);
        let eligible = s.eligible_courses(&enrolled);
        assert!(s.is_eligible(&enrolled));
        assert_eq!(eligible, vec![enrolled[1].clone()]);
    }

    #[test]
    fn subject_restriction_selects_exactly_matching_subjects() {
        let mut s = slot();
        s.subject_restriction = Some("數學".to_string());

        let enrolled = vec![course("數學"), course("英文"), course("數學")];
        let eligible = s.eligible_courses(&enrolled);

        assert!(s.is_eligible(&enrolled));
        assert_eq!(eligible, vec![enrolled[0].clone(), enrolled[2].clone()]);
    }

    #[test]
    fn subject_restriction_without_match_is_not_eligible() {
        let mut s = slot();
        s.subject_restriction = Some("物理".to_string());
        assert!(!s.is_eligible(&[course("數學")]));
    }

    #[test]
    fn unrestricted_slot_accepts_all_enrolled_courses() {
        let s = slot();
        let enrolled = vec![course("數學"), course("英文")];
        assert_eq!(s.eligible_courses(&enrolled), enrolled);
    }

    /// The write path clears one restriction when the other is set, but
    /// stored documents may predate that; course ids win.
    #[test]
    fn course_restriction_takes_precedence_over_subject() {
        let mut s = slot();
        s.subject_restriction = Some("數學".to_string());

        let enrolled = vec![course("數學"), course("英文")];
        s.course_restrictions = vec![enrolled[1].id];

        assert_eq!(s.eligible_courses(&enrolled), vec![enrolled[1].clone()]);
    }

    #[test]
    fn bookable_requires_available_status_and_a_free_seat() {
        let mut s = slot();
        assert!(s.is_bookable());

        s.current_students = 1;
        assert!(!s.is_bookable());

        s.current_students = 0;
        s.status = SlotStatus::Cancelled;
        assert!(!s.is_bookable());
    }

    #[test]
    fn group_sentinel_keeps_group_slots_bookable() {
        let mut s = slot();
        s.tutoring_type = TutoringType::Group;
        s.max_students = GROUP_CAPACITY_SENTINEL;
        s.current_students = 120;
        assert!(s.is_bookable());
    }
}
