use chrono::{NaiveDate, Utc};
use mongodb::Database;
use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::course::db::CourseDbExt;
use crate::data::course::StudentCourse;
use crate::data::slot::db::{problem as slot_problem, SlotCreateData, SlotDbExt};
use crate::data::slot::TimeSlot;
use crate::data::user::db::{problem as user_problem, UserDbExt};
use crate::resp::jwt::{auth_problem, UserRoleToken};
use crate::resp::problem::Problem;
use crate::role::Role;

#[utoipa::path(
    request_body = SlotCreateData,
    responses(
        (status = 200, description = "The created slot", body = TimeSlot),
        (status = 400, description = "Bad slot data", body = Problem),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(
        ("jwt" = [])
    )
)]
#[post("/time-slots/create", format = "application/json", data = "<slot>")]
#[tracing::instrument]
pub async fn slot_create(
    slot: Json<SlotCreateData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<TimeSlot>, Problem> {
    if auth.role < Role::Teacher {
        return Err(auth_problem("Only teachers can publish time slots."));
    }

    let created = db
        .create_slot(slot.into_inner(), auth.user, &auth.name)
        .await?;

    Ok(Json(created))
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SlotListQuery {
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Teachers get their own slots; students get every teacher's open slots
/// (today onward unless a date is given). The caller's role comes from the
/// verified token, never the body.
#[utoipa::path(
    request_body = SlotListQuery,
    responses(
        (status = 200, description = "Matching slots", body = Vec<TimeSlot>),
    ),
    security(
        ("jwt" = [])
    )
)]
#[post("/time-slots/list", format = "application/json", data = "<query>")]
#[tracing::instrument]
pub async fn slot_list(
    query: Json<SlotListQuery>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<Vec<TimeSlot>>, Problem> {
    if auth.role < Role::Student {
        return Err(auth_problem("Permission level too low."));
    }

    let slots = if auth.role == Role::Teacher {
        db.list_slots_for_teacher(auth.user, query.date).await?
    } else {
        db.list_open_slots(query.date, Utc::now().date_naive())
            .await?
    };

    Ok(Json(slots))
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SlotUpdateData {
    pub slot_id: Uuid,
    #[serde(flatten)]
    pub slot: SlotCreateData,
}

#[utoipa::path(request_body = SlotUpdateData)]
#[post("/time-slots/update", format = "application/json", data = "<update>")]
#[tracing::instrument]
pub async fn slot_update(
    update: Json<SlotUpdateData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<TimeSlot>, Problem> {
    if auth.role < Role::Teacher {
        return Err(auth_problem("Only teachers can edit time slots."));
    }

    // Admins may edit anyone's slot; teachers only their own.
    let scope = match auth.role {
        Role::Admin => None,
        _ => Some(auth.user),
    };

    let update = update.into_inner();
    let updated = db
        .update_slot(update.slot_id, update.slot, scope)
        .await?
        .ok_or_else(|| slot_problem::not_found(update.slot_id))?;

    Ok(Json(updated))
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SlotIdData {
    pub slot_id: Uuid,
}

/// Deleting a slot cancels it; existing sessions keep their records.
#[utoipa::path(request_body = SlotIdData)]
#[post("/time-slots/delete", format = "application/json", data = "<delete>")]
#[tracing::instrument]
pub async fn slot_delete(
    delete: Json<SlotIdData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<TimeSlot>, Problem> {
    if auth.role < Role::Teacher {
        return Err(auth_problem("Only teachers can cancel time slots."));
    }

    let scope = match auth.role {
        Role::Admin => None,
        _ => Some(auth.user),
    };

    let cancelled = db
        .cancel_slot(delete.slot_id, scope)
        .await?
        .ok_or_else(|| slot_problem::not_found(delete.slot_id))?;

    Ok(Json(cancelled))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EligibilityResponse {
    pub eligible: bool,
    pub courses: Vec<StudentCourse>,
}

/// Which of the calling student's courses qualify for a slot.
#[utoipa::path(
    request_body = SlotIdData,
    responses(
        (status = 200, description = "Eligibility and qualifying courses", body = EligibilityResponse),
        (status = 404, description = "Slot doesn't exist", body = Problem),
    ),
    security(
        ("jwt" = [])
    )
)]
#[post(
    "/time-slots/eligible-courses",
    format = "application/json",
    data = "<query>"
)]
#[tracing::instrument]
pub async fn slot_eligible_courses(
    query: Json<SlotIdData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<EligibilityResponse>, Problem> {
    if auth.role < Role::Student {
        return Err(auth_problem("Permission level too low."));
    }

    let slot = db
        .get_slot(query.slot_id)
        .await?
        .ok_or_else(|| slot_problem::not_found(query.slot_id))?;

    let user = db
        .get_user(auth.user)
        .await?
        .ok_or_else(|| user_problem::not_found(auth.user))?;

    let enrolled = db.student_courses(&user).await?;
    let courses = slot.eligible_courses(&enrolled);

    Ok(Json(EligibilityResponse {
        eligible: !courses.is_empty(),
        courses,
    }))
}
