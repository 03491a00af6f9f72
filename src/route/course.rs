use mongodb::Database;
use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::course::db::{problem as course_problem, CourseCreateData, CourseDbExt};
use crate::data::course::{Course, StudentCourse};
use crate::data::roster::SyncOutcome;
use crate::data::user::db::{problem as user_problem, UserDbExt};
use crate::middleware::paging::PageState;
use crate::resp::jwt::{auth_problem, UserRoleToken};
use crate::resp::problem::Problem;
use crate::role::Role;

#[utoipa::path(request_body = CourseCreateData)]
#[post("/courses", format = "application/json", data = "<course>")]
#[tracing::instrument]
pub async fn course_create(
    course: Json<CourseCreateData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<Course>, Problem> {
    if auth.role < Role::Admin {
        return Err(auth_problem("Only admins can create courses."));
    }

    Ok(Json(db.create_course(course.into_inner()).await?))
}

/// List non-archived courses, paged.
#[utoipa::path(
    responses(
        (status = 200, description = "List of courses", body = Vec<Course>),
    )
)]
#[get("/courses")]
#[tracing::instrument]
pub async fn course_list(
    auth: UserRoleToken,
    page: PageState,
    db: &State<Database>,
) -> Result<Json<Vec<Course>>, Problem> {
    if auth.role < Role::Student {
        return Err(auth_problem("Permission level too low."));
    }

    Ok(Json(db.list_courses(page).await?))
}

/// The calling student's enrolled-course view.
#[utoipa::path(
    responses(
        (status = 200, description = "Enrolled courses", body = Vec<StudentCourse>),
    ),
    security(
        ("jwt" = [])
    )
)]
#[get("/courses/enrolled")]
#[tracing::instrument]
pub async fn course_enrolled(
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<Vec<StudentCourse>>, Problem> {
    let user = db
        .get_user(auth.user)
        .await?
        .ok_or_else(|| user_problem::not_found(auth.user))?;

    Ok(Json(db.student_courses(&user).await?))
}

#[utoipa::path(
    params(
        ("id", description = "course ID")
    )
)]
#[get("/courses/<id>")]
#[tracing::instrument]
pub async fn course_get(
    id: Uuid,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Option<Json<Course>>, Problem> {
    if auth.role < Role::Student {
        return Err(auth_problem("Permission level too low."));
    }

    Ok(db.get_course(id).await?.map(Json))
}

/// Archiving keeps the document around for rosters that reference its key,
/// but unassigns every teacher first.
#[utoipa::path(
    params(
        ("id", description = "course ID")
    ),
    security(
        ("jwt" = [])
    )
)]
#[delete("/courses/<id>")]
#[tracing::instrument]
pub async fn course_archive(
    id: Uuid,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<Course>, Problem> {
    if auth.role < Role::Admin {
        return Err(auth_problem("Only admins can archive courses."));
    }

    let outcome = db.remove_course_from_teachers(id).await?;
    if !outcome.is_complete() {
        tracing::warn!(
            "Course {} archived with {} teacher(s) left unsynced.",
            id,
            outcome.failed.len()
        );
    }

    let course = db
        .archive_course(id)
        .await?
        .ok_or_else(|| course_problem::not_found(id))?;

    Ok(Json(course))
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateTeachersData {
    pub course_id: Uuid,
    pub teacher_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CourseIdData {
    pub course_id: Uuid,
}

/// Replace a course's assigned teachers; each affected teacher's own
/// `courses` array is mirrored to match.
#[utoipa::path(
    request_body = UpdateTeachersData,
    responses(
        (status = 200, description = "Per-teacher sync outcome", body = SyncOutcome),
        (status = 404, description = "Course doesn't exist", body = Problem),
    ),
    security(
        ("jwt" = [])
    )
)]
#[post("/courses/update-teachers", format = "application/json", data = "<update>")]
#[tracing::instrument]
pub async fn course_update_teachers(
    update: Json<UpdateTeachersData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<SyncOutcome>, Problem> {
    if auth.role < Role::Admin {
        return Err(auth_problem("Only admins can assign teachers."));
    }

    let update = update.into_inner();
    let (_, outcome) = db
        .sync_course_teachers(update.course_id, &update.teacher_ids)
        .await?;

    Ok(Json(outcome))
}

#[utoipa::path(
    request_body = CourseIdData,
    security(
        ("jwt" = [])
    )
)]
#[post(
    "/courses/remove-from-teachers",
    format = "application/json",
    data = "<remove>"
)]
#[tracing::instrument]
pub async fn course_remove_from_teachers(
    remove: Json<CourseIdData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<SyncOutcome>, Problem> {
    if auth.role < Role::Admin {
        return Err(auth_problem("Only admins can unassign teachers."));
    }

    Ok(Json(
        db.remove_course_from_teachers(remove.course_id).await?,
    ))
}
