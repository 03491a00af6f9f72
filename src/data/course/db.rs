use bson::{doc, Bson};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::Database;
use rocket::futures::StreamExt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::filter;
use crate::data::roster::{EnrollmentSync, SyncOutcome};
use crate::data::user::{User, USER_COLLECTION_NAME};
use crate::middleware::paging::PageState;
use crate::resp::problem::Problem;

use super::{Course, CourseStatus, StudentCourse, COURSE_COLLECTION_NAME};

pub mod problem {
    use crate::resp::problem::{ErrorCode, Problem};
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::from_code(ErrorCode::NotFound, "Course doesn't exist.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn duplicate_key(key: impl ToString) -> Problem {
        Problem::from_code(ErrorCode::Validation, "Course name and code already in use.")
            .insert_str("course_key", key)
            .clone()
    }

    #[inline]
    pub fn bad_code(detail: impl ToString) -> Problem {
        Problem::from_code(ErrorCode::Validation, "Bad course code.")
            .detail(detail)
            .clone()
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CourseCreateData {
    pub name: String,
    pub code: String,
    pub subject: String,
    #[serde(default)]
    pub grades: Vec<String>,
    #[serde(default)]
    pub teacher_ids: Vec<Uuid>,
    #[serde(default)]
    pub schedule: Option<String>,
}

impl CourseCreateData {
    pub fn validate(&self) -> Result<(), Problem> {
        use crate::resp::problem::problems::missing_field;

        if self.name.is_empty() {
            return Err(missing_field("name"));
        }
        if self.code.is_empty() {
            return Err(missing_field("code"));
        }
        if self.subject.is_empty() {
            return Err(missing_field("subject"));
        }
        // The composite key wraps the code in parentheses; parentheses inside
        // either part would make the key ambiguous for every dependent
        // document.
        if self.name.contains(['(', ')']) || self.code.contains(['(', ')']) {
            return Err(problem::bad_code(
                "Course names and codes can't contain parentheses.",
            ));
        }

        Ok(())
    }

    pub fn into_course(self) -> Course {
        Course {
            id: Uuid::new_v4(),
            name: self.name,
            code: self.code,
            subject: self.subject,
            grades: self.grades,
            teacher_ids: self.teacher_ids,
            schedule: self.schedule,
            status: CourseStatus::NotStarted,
            archived: false,
        }
    }
}

pub trait CourseDbExt {
    async fn create_course(&self, data: CourseCreateData) -> Result<Course, Problem>;

    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, Problem>;

    async fn list_courses(&self, page: PageState) -> Result<Vec<Course>, Problem>;

    /// The student's enrolled-course view: their `enrolled_courses` ids
    /// intersected with the course collection. Ids that no longer resolve are
    /// dropped from the view, not treated as errors.
    async fn student_courses(&self, student: &User) -> Result<Vec<StudentCourse>, Problem>;

    async fn archive_course(&self, id: Uuid) -> Result<Option<Course>, Problem>;

    /// Replaces a course's assigned-teacher list, mirroring the change into
    /// each affected teacher's `courses` array (composite keys). Removed
    /// teachers have the key pulled, added teachers get it appended iff
    /// absent. Per-teacher failures are logged and skipped.
    async fn sync_course_teachers(
        &self,
        course_id: Uuid,
        new_teacher_ids: &[Uuid],
    ) -> Result<(Course, SyncOutcome), Problem>;

    /// Delete-side mirror: pulls the course key from every currently
    /// assigned teacher and clears the assignment list.
    async fn remove_course_from_teachers(&self, course_id: Uuid) -> Result<SyncOutcome, Problem>;
}

impl CourseDbExt for Database {
    async fn create_course(&self, data: CourseCreateData) -> Result<Course, Problem> {
        data.validate()?;

        let existing = self
            .collection::<Course>(COURSE_COLLECTION_NAME)
            .find_one(
                doc! { "name": data.name.as_str(), "code": data.code.as_str() },
                None,
            )
            .await
            .map_err(Problem::from)?;
        if let Some(existing) = existing {
            return Err(problem::duplicate_key(existing.composite_key()));
        }

        let course = data.into_course();

        self.collection(COURSE_COLLECTION_NAME)
            .insert_one(
                bson::to_document(&course).expect("Course must be serializable to BSON"),
                None,
            )
            .await
            .map_err(Problem::from)?;

        Ok(course)
    }

    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, Problem> {
        self.collection(COURSE_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn list_courses(&self, page: PageState) -> Result<Vec<Course>, Problem> {
        let options = FindOptions::builder()
            .sort(doc! { "name": 1 })
            .skip(page.skip())
            .limit(page.limit())
            .build();

        let mut cursor = self
            .collection::<Course>(COURSE_COLLECTION_NAME)
            .find(doc! { "archived": false }, options)
            .await
            .map_err(Problem::from)?;

        let mut courses = vec![];
        while let Some(result) = cursor.next().await {
            match result {
                Ok(course) => courses.push(course),
                Err(_) => tracing::warn!("Unable to deserialize Course document."),
            }
        }

        Ok(courses)
    }

    async fn student_courses(&self, student: &User) -> Result<Vec<StudentCourse>, Problem> {
        if student.enrolled_courses.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<Bson> = student
            .enrolled_courses
            .iter()
            .map(|it| filter::uuid_bson(*it))
            .collect();

        let mut cursor = self
            .collection::<Course>(COURSE_COLLECTION_NAME)
            .find(doc! { "_id": { "$in": ids }, "archived": false }, None)
            .await
            .map_err(Problem::from)?;

        let mut courses = vec![];
        while let Some(result) = cursor.next().await {
            match result {
                Ok(course) => courses.push(StudentCourse::from(&course)),
                Err(_) => tracing::warn!("Unable to deserialize Course document."),
            }
        }

        Ok(courses)
    }

    async fn archive_course(&self, id: Uuid) -> Result<Option<Course>, Problem> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.collection::<Course>(COURSE_COLLECTION_NAME)
            .find_one_and_update(
                filter::by_id(id),
                doc! { "$set": {
                    "archived": true,
                    "status": bson::to_bson(&CourseStatus::Archived)?,
                } },
                options,
            )
            .await
            .map_err(Problem::from)
    }

    async fn sync_course_teachers(
        &self,
        course_id: Uuid,
        new_teacher_ids: &[Uuid],
    ) -> Result<(Course, SyncOutcome), Problem> {
        let course = self
            .get_course(course_id)
            .await?
            .ok_or_else(|| problem::not_found(course_id))?;
        let key = course.composite_key();

        let plan = EnrollmentSync::plan(&course.teacher_ids, new_teacher_ids);

        let ids: Vec<String> = new_teacher_ids.iter().map(|it| it.to_string()).collect();
        self.collection::<Course>(COURSE_COLLECTION_NAME)
            .update_one(
                filter::by_id(course_id),
                doc! { "$set": { "teacher_ids": ids } },
                None,
            )
            .await
            .map_err(Problem::from)?;

        let users = self.collection::<User>(USER_COLLECTION_NAME);
        let mut outcome = SyncOutcome::default();

        for teacher in &plan.removed {
            let update = users
                .update_one(
                    filter::by_id(*teacher),
                    doc! { "$pull": { "courses": key.as_str() } },
                    None,
                )
                .await;
            match update {
                Ok(_) => outcome.applied(teacher),
                Err(e) => {
                    tracing::warn!("Unable to unassign course '{}' from {}: {}", key, teacher, e);
                    outcome.failed(teacher);
                }
            }
        }

        for teacher in &plan.added {
            let mut guard = filter::by_id(*teacher);
            guard.insert("courses", doc! { "$ne": key.as_str() });
            let update = users
                .update_one(guard, doc! { "$push": { "courses": key.as_str() } }, None)
                .await;
            match update {
                Ok(_) => outcome.applied(teacher),
                Err(e) => {
                    tracing::warn!("Unable to assign course '{}' to {}: {}", key, teacher, e);
                    outcome.failed(teacher);
                }
            }
        }

        Ok((course, outcome))
    }

    async fn remove_course_from_teachers(&self, course_id: Uuid) -> Result<SyncOutcome, Problem> {
        let course = self
            .get_course(course_id)
            .await?
            .ok_or_else(|| problem::not_found(course_id))?;
        let key = course.composite_key();

        let users = self.collection::<User>(USER_COLLECTION_NAME);
        let mut outcome = SyncOutcome::default();

        for teacher in &course.teacher_ids {
            let update = users
                .update_one(
                    filter::by_id(*teacher),
                    doc! { "$pull": { "courses": key.as_str() } },
                    None,
                )
                .await;
            match update {
                Ok(_) => outcome.applied(teacher),
                Err(e) => {
                    tracing::warn!("Unable to unassign course '{}' from {}: {}", key, teacher, e);
                    outcome.failed(teacher);
                }
            }
        }

        self.collection::<Course>(COURSE_COLLECTION_NAME)
            .update_one(
                filter::by_id(course_id),
                doc! { "$set": { "teacher_ids": [] } },
                None,
            )
            .await
            .map_err(Problem::from)?;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_data() -> CourseCreateData {
        CourseCreateData {
            name: "數學基礎".to_string(),
            code: "M101".to_string(),
            subject: "數學".to_string(),
            grades: vec![],
            teacher_ids: vec![],
            schedule: None,
        }
    }

    #[test]
    fn create_data_rejects_parentheses() {
        let mut data = create_data();
        data.code = "M(101)".to_string();
        assert!(data.validate().is_err());

        let mut data = create_data();
        data.name = "數學(基礎)".to_string();
        assert!(data.validate().is_err());
    }

    #[test]
    fn create_data_requires_subject() {
        let mut data = create_data();
        data.subject = String::new();
        assert!(data.validate().is_err());
    }

    #[test]
    fn new_courses_start_not_started_with_zero_teachers() {
        let course = create_data().into_course();
        assert_eq!(course.status, CourseStatus::NotStarted);
        assert!(!course.archived);
        assert!(course.teacher_ids.is_empty());
    }

    /// Reassigning [A] -> [B] must plan to pull the key from A and push it
    /// to B; the mirror updates follow the plan verbatim.
    #[test]
    fn reassignment_plan_swaps_teachers() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let plan = EnrollmentSync::plan(&[a], &[b]);
        assert_eq!(plan.added, vec![b]);
        assert_eq!(plan.removed, vec![a]);
    }
}
