use mongodb::Database;
use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::course::db::{problem as course_problem, CourseDbExt};
use crate::data::roster::db::{RosterDbExt, StudentInfo};
use crate::data::roster::{CourseRoster, SyncOutcome};
use crate::data::user::db::{problem as user_problem, UserDbExt};
use crate::resp::jwt::{auth_problem, UserRoleToken};
use crate::resp::problem::Problem;
use crate::role::Role;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RosterSaveData {
    pub student_id: Uuid,
    #[serde(default)]
    pub old_courses: Vec<Uuid>,
    pub new_courses: Vec<Uuid>,
    #[serde(default)]
    pub student_info: Option<StudentInfo>,
}

/// Persist an enrollment change: the student's authoritative course list
/// plus every affected course roster. Partial failures come back in the
/// outcome instead of aborting the sync.
#[utoipa::path(
    request_body = RosterSaveData,
    responses(
        (status = 200, description = "Which course keys were synced", body = SyncOutcome),
        (status = 404, description = "Student doesn't exist", body = Problem),
    ),
    security(
        ("jwt" = [])
    )
)]
#[post("/course-student-list/save", format = "application/json", data = "<save>")]
#[tracing::instrument]
pub async fn roster_save(
    save: Json<RosterSaveData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<SyncOutcome>, Problem> {
    if auth.role < Role::Teacher {
        return Err(auth_problem("Only teachers can change enrollments."));
    }

    let save = save.into_inner();

    let student = db
        .get_user(save.student_id)
        .await?
        .ok_or_else(|| user_problem::not_found(save.student_id))?;

    let outcome = db
        .sync_enrollment(
            &student,
            &save.old_courses,
            &save.new_courses,
            save.student_info,
        )
        .await?;

    Ok(Json(outcome))
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RosterQuery {
    pub course_id: Uuid,
}

/// A course's denormalized student list. Courses without one yet get an
/// empty roster, not an error.
#[utoipa::path(
    request_body = RosterQuery,
    responses(
        (status = 200, description = "The course roster", body = CourseRoster),
        (status = 404, description = "Course doesn't exist", body = Problem),
    ),
    security(
        ("jwt" = [])
    )
)]
#[post("/course-student-list/get", format = "application/json", data = "<query>")]
#[tracing::instrument]
pub async fn roster_get(
    query: Json<RosterQuery>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<CourseRoster>, Problem> {
    if auth.role < Role::Teacher {
        return Err(auth_problem("Only teachers can view rosters."));
    }

    let course = db
        .get_course(query.course_id)
        .await?
        .ok_or_else(|| course_problem::not_found(query.course_id))?;
    let key = course.composite_key();

    let roster = db.get_roster(&key).await?.unwrap_or(CourseRoster {
        course_key: key,
        students: vec![],
    });

    Ok(Json(roster))
}
