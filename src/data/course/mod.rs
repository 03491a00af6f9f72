use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

pub static COURSE_COLLECTION_NAME: &str = "courses";

/// Course lifecycle status. Serialized with the labels existing documents
/// already carry.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub enum CourseStatus {
    #[serde(rename = "未開課")]
    NotStarted,
    #[serde(rename = "報名中")]
    Enrolling,
    #[serde(rename = "開課中")]
    InProgress,
    #[serde(rename = "已額滿")]
    Full,
    #[serde(rename = "已結束")]
    Finished,
    #[serde(rename = "已封存")]
    Archived,
}

impl Default for CourseStatus {
    fn default() -> Self {
        CourseStatus::NotStarted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Course {
    #[serde(
        default = "Uuid::new_v4",
        rename = "_id",
        with = "bson::serde_helpers::uuid_1_as_binary"
    )]
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub subject: String,
    #[serde(default)]
    pub grades: Vec<String>,
    #[serde(default)]
    pub teacher_ids: Vec<Uuid>,
    /// Free-form schedule description ("週三 19:00-21:00" and the like).
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub status: CourseStatus,
    #[serde(default)]
    pub archived: bool,
}

impl Course {
    /// The `"name(code)"` string rosters and teacher `courses` arrays key on.
    ///
    /// Once any roster or grade document references this key it is identity:
    /// renaming a course orphans every dependent document, and no re-keying
    /// migration exists. Derive the key here and nowhere else.
    pub fn composite_key(&self) -> String {
        format!("{}({})", self.name, self.code)
    }
}

/// A student's view of one enrolled course, derived by intersecting the
/// user's `enrolled_courses` ids with the course collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StudentCourse {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub subject: String,
    pub grade: Option<String>,
}

impl From<&Course> for StudentCourse {
    fn from(course: &Course) -> Self {
        StudentCourse {
            id: course.id,
            name: course.name.clone(),
            code: course.code.clone(),
            subject: course.subject.clone(),
            grade: course.grades.first().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(name: &str, code: &str) -> Course {
        Course {
            id: Uuid::new_v4(),
            name: name.to_string(),
            code: code.to_string(),
            subject: "數學".to_string(),
            grades: vec!["高一".to_string(), "高二".to_string()],
            teacher_ids: vec![],
            schedule: None,
            status: CourseStatus::Enrolling,
            archived: false,
        }
    }

    #[test]
    fn composite_key_is_name_then_code() {
        assert_eq!(course("數學基礎", "M101").composite_key(), "數學基礎(M101)");
    }

    #[test]
    fn status_round_trips_through_original_labels() {
        let json = serde_json::to_string(&CourseStatus::Enrolling).unwrap();
        assert_eq!(json, "\"報名中\"");

        let status: CourseStatus = serde_json::from_str("\"已額滿\"").unwrap();
        assert_eq!(status, CourseStatus::Full);
    }

    #[test]
    fn student_course_takes_first_grade_tag() {
        let c = course("數學基礎", "M101");
        let view = StudentCourse::from(&c);
        assert_eq!(view.grade.as_deref(), Some("高一"));
        assert_eq!(view.subject, "數學");
    }
}
