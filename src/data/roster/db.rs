use std::collections::HashMap;

use bson::doc;
use mongodb::options::UpdateOptions;
use mongodb::Database;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::course::db::CourseDbExt;
use crate::data::user::db::UserDbExt;
use crate::data::user::User;
use crate::resp::problem::Problem;

use super::{CourseRoster, EnrollmentSync, RosterEntry, SyncOutcome, ROSTER_COLLECTION_NAME};

/// Optional overrides for the denormalized student fields, as submitted with
/// an enrollment-change request. Anything left unset falls back to the user
/// document.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct StudentInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub student_no: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
}

impl StudentInfo {
    pub fn apply(&self, entry: &mut RosterEntry) {
        if let Some(name) = &self.name {
            entry.name = name.clone();
        }
        if let Some(account) = &self.account {
            entry.account = account.clone();
        }
        if let Some(email) = &self.email {
            entry.email = email.clone();
        }
        if self.student_no.is_some() {
            entry.student_no = self.student_no.clone();
        }
        if self.grade.is_some() {
            entry.grade = self.grade.clone();
        }
    }
}

pub trait RosterDbExt {
    async fn get_roster(&self, course_key: &str) -> Result<Option<CourseRoster>, Problem>;

    /// Applies an enrollment change across every denormalized location:
    /// the authoritative `enrolled_courses` list on the user document, and
    /// each touched course's roster document (idempotent add, pull on
    /// remove, field refresh across the union).
    ///
    /// One roster failing never aborts the rest, and applied writes are not
    /// rolled back; the returned [`SyncOutcome`] says which course keys went
    /// through.
    async fn sync_enrollment(
        &self,
        student: &User,
        old_course_ids: &[Uuid],
        new_course_ids: &[Uuid],
        info: Option<StudentInfo>,
    ) -> Result<SyncOutcome, Problem>;
}

impl RosterDbExt for Database {
    async fn get_roster(&self, course_key: &str) -> Result<Option<CourseRoster>, Problem> {
        self.collection(ROSTER_COLLECTION_NAME)
            .find_one(doc! { "_id": course_key }, None)
            .await
            .map_err(Problem::from)
    }

    async fn sync_enrollment(
        &self,
        student: &User,
        old_course_ids: &[Uuid],
        new_course_ids: &[Uuid],
        info: Option<StudentInfo>,
    ) -> Result<SyncOutcome, Problem> {
        let mut entry = RosterEntry::for_user(student);
        if let Some(info) = &info {
            info.apply(&mut entry);
        }

        let plan = EnrollmentSync::plan(old_course_ids, new_course_ids);
        let mut outcome = SyncOutcome::default();

        if self
            .set_enrolled_courses(student.id, new_course_ids)
            .await
            .is_err()
        {
            // The rosters are still worth correcting.
            tracing::warn!(
                "Unable to update enrolled_courses for student {}.",
                student.id
            );
            outcome.failed("user");
        }

        // The union is resolved once; every added/removed id is in it.
        let mut keys: HashMap<Uuid, String> = HashMap::new();
        for course_id in &plan.refresh {
            match self.get_course(*course_id).await {
                Ok(Some(course)) => {
                    keys.insert(*course_id, course.composite_key());
                }
                Ok(None) => {
                    tracing::warn!("Course {} doesn't exist; skipping roster sync.", course_id);
                    outcome.failed(course_id);
                }
                Err(e) => {
                    tracing::warn!("Unable to load course {}: {}", course_id, e);
                    outcome.failed(course_id);
                }
            }
        }

        let rosters = self.collection::<CourseRoster>(ROSTER_COLLECTION_NAME);
        let student_id = student.id.to_string();

        for course_id in &plan.added {
            let Some(key) = keys.get(course_id) else {
                continue;
            };

            let result = async {
                // A missing roster document is created empty first; pushing
                // with an upsert would collide on `_id` whenever the guard
                // filters the existing document out.
                rosters
                    .update_one(
                        doc! { "_id": key.as_str() },
                        doc! { "$setOnInsert": { "students": [] } },
                        UpdateOptions::builder().upsert(true).build(),
                    )
                    .await?;

                rosters
                    .update_one(
                        doc! { "_id": key.as_str(), "students.id": { "$ne": student_id.as_str() } },
                        doc! { "$push": { "students": bson::to_bson(&entry)? } },
                        None,
                    )
                    .await?;

                Ok::<(), Problem>(())
            }
            .await;

            match result {
                Ok(()) => outcome.applied(key),
                Err(e) => {
                    tracing::warn!("Unable to add {} to roster '{}': {}", student_id, key, e);
                    outcome.failed(key);
                }
            }
        }

        for course_id in &plan.removed {
            let Some(key) = keys.get(course_id) else {
                continue;
            };

            let result = rosters
                .update_one(
                    doc! { "_id": key.as_str() },
                    doc! { "$pull": { "students": { "id": student_id.as_str() } } },
                    None,
                )
                .await;

            match result {
                Ok(_) => outcome.applied(key),
                Err(e) => {
                    tracing::warn!("Unable to remove {} from roster '{}': {}", student_id, key, e);
                    outcome.failed(key);
                }
            }
        }

        // Refresh the denormalized fields wherever an entry for the student
        // still exists, so stale display data is corrected even for courses
        // whose membership didn't change.
        for course_id in &plan.refresh {
            let Some(key) = keys.get(course_id) else {
                continue;
            };

            let result = rosters
                .update_one(
                    doc! { "_id": key.as_str(), "students.id": student_id.as_str() },
                    doc! { "$set": {
                        "students.$.name": entry.name.as_str(),
                        "students.$.account": entry.account.as_str(),
                        "students.$.email": entry.email.as_str(),
                        "students.$.student_no": bson::to_bson(&entry.student_no)?,
                        "students.$.grade": bson::to_bson(&entry.grade)?,
                    } },
                    None,
                )
                .await;

            if let Err(e) = result {
                tracing::warn!("Unable to refresh {} on roster '{}': {}", student_id, key, e);
                outcome.failed(key);
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_only_replace_provided_fields() {
        let mut entry = RosterEntry {
            id: Uuid::new_v4(),
            name: "王小明".to_string(),
            account: "xiaoming".to_string(),
            email: "xiaoming@example.com".to_string(),
            student_no: Some("S-042".to_string()),
            grade: None,
        };

        let info = StudentInfo {
            grade: Some("高二".to_string()),
            ..Default::default()
        };
        info.apply(&mut entry);

        assert_eq!(entry.name, "王小明");
        assert_eq!(entry.grade.as_deref(), Some("高二"));
        assert_eq!(entry.student_no.as_deref(), Some("S-042"));
    }
}
