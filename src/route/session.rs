use mongodb::Database;
use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::session::db::{problem as session_problem, BookingData, SessionDbExt};
use crate::data::session::{SessionStatus, TutoringSession};
use crate::middleware::paging::PageState;
use crate::resp::jwt::{auth_problem, UserRoleToken};
use crate::resp::problem::problems::forbidden;
use crate::resp::problem::Problem;
use crate::role::Role;

#[utoipa::path(
    request_body = BookingData,
    responses(
        (status = 200, description = "The booked session", body = TutoringSession),
        (status = 403, description = "Student not eligible for the slot", body = Problem),
        (status = 404, description = "Slot doesn't exist", body = Problem),
        (status = 409, description = "Slot has no open seats", body = Problem),
    ),
    security(
        ("jwt" = [])
    )
)]
#[post("/tutoring-sessions/book", format = "application/json", data = "<booking>")]
#[tracing::instrument]
pub async fn session_book(
    booking: Json<BookingData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<TutoringSession>, Problem> {
    if auth.role < Role::Student {
        return Err(auth_problem("Permission level too low."));
    }

    Ok(Json(db.book_session(booking.into_inner(), &auth).await?))
}

/// Students see their own sessions, teachers the ones they give, admins
/// everything (paged).
#[utoipa::path(
    responses(
        (status = 200, description = "Sessions visible to the caller", body = Vec<TutoringSession>),
    ),
    security(
        ("jwt" = [])
    )
)]
#[post("/tutoring-sessions/list")]
#[tracing::instrument]
pub async fn session_list(
    auth: UserRoleToken,
    page: PageState,
    db: &State<Database>,
) -> Result<Json<Vec<TutoringSession>>, Problem> {
    let sessions = match auth.role {
        Role::Admin => db.list_all_sessions(page).await?,
        Role::Teacher => db.list_sessions_for_teacher(auth.user).await?,
        Role::Student => db.list_sessions_for_student(auth.user).await?,
        Role::None => return Err(auth_problem("Permission level too low.")),
    };

    Ok(Json(sessions))
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StatusChangeData {
    pub session_id: Uuid,
    pub new_status: SessionStatus,
}

/// Apply one lifecycle edge to a session. Teachers drive their own
/// sessions; a student may only cancel their own booking.
#[utoipa::path(
    request_body = StatusChangeData,
    responses(
        (status = 200, description = "The updated session", body = TutoringSession),
        (status = 404, description = "Session doesn't exist", body = Problem),
        (status = 409, description = "Illegal status change", body = Problem),
    ),
    security(
        ("jwt" = [])
    )
)]
#[post(
    "/tutoring-sessions/update-status",
    format = "application/json",
    data = "<change>"
)]
#[tracing::instrument]
pub async fn session_update_status(
    change: Json<StatusChangeData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<TutoringSession>, Problem> {
    let change = change.into_inner();

    let session = db
        .get_session(change.session_id)
        .await?
        .ok_or_else(|| session_problem::not_found(change.session_id))?;

    let permitted = auth.role >= Role::Admin
        || (auth.role == Role::Teacher && session.teacher_id == auth.user)
        || (session.student_id == auth.user && change.new_status == SessionStatus::Cancelled);
    if !permitted {
        return Err(forbidden("Session not owned by user."));
    }

    Ok(Json(
        db.transition_session(&session, change.new_status).await?,
    ))
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SessionIdData {
    pub session_id: Uuid,
}

#[utoipa::path(request_body = SessionIdData)]
#[post(
    "/tutoring-sessions/delete",
    format = "application/json",
    data = "<delete>"
)]
#[tracing::instrument]
pub async fn session_delete(
    delete: Json<SessionIdData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<String>, Problem> {
    if auth.role < Role::Teacher {
        return Err(auth_problem("Only teachers can delete sessions."));
    }

    let session = db
        .get_session(delete.session_id)
        .await?
        .ok_or_else(|| session_problem::not_found(delete.session_id))?;

    if auth.role < Role::Admin && session.teacher_id != auth.user {
        return Err(forbidden("Session not owned by user."));
    }

    let removed = db
        .delete_session(session.id)
        .await?
        .ok_or_else(|| session_problem::not_found(session.id))?;

    Ok(Json(removed.id.to_string()))
}
