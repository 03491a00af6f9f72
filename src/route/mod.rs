use std::collections::BTreeMap;

use rocket::{Build, Rocket, Route};

pub mod course;
pub mod roster;
pub mod session;
pub mod slot;
pub mod users;

use course::*;
use roster::*;
use session::*;
use slot::*;
use users::*;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    data::{
        course as cd,
        roster as rd,
        roster::db::StudentInfo,
        session as sd,
        session::db::BookingData,
        slot as td,
        slot::db::SlotCreateData,
        user::db::{UserCreatedResponse, UserLoginData, UserSignupData},
        user::UserResponse,
    },
    resp::{
        jwt::doc::JWTAuth,
        problem::{ErrorCode, Problem},
    },
    role::Role,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        user_get,
        user_create,
        user_delete,
        user_set_role,
        login_submit,
        course_create,
        course_list,
        course_enrolled,
        course_get,
        course_archive,
        course_update_teachers,
        course_remove_from_teachers,
        slot_create,
        slot_list,
        slot_update,
        slot_delete,
        slot_eligible_courses,
        session_book,
        session_list,
        session_update_status,
        session_delete,
        roster_save,
        roster_get
    ),
    components(schemas(
        Role,
        ErrorCode,
        cd::Course,
        cd::CourseStatus,
        cd::StudentCourse,
        cd::db::CourseCreateData,
        td::TimeSlot,
        td::TutoringType,
        td::TutoringMethod,
        td::SlotStatus,
        SlotCreateData,
        SlotListQuery,
        SlotUpdateData,
        SlotIdData,
        EligibilityResponse,
        sd::TutoringSession,
        sd::SessionStatus,
        BookingData,
        StatusChangeData,
        SessionIdData,
        rd::RosterEntry,
        rd::CourseRoster,
        rd::SyncOutcome,
        StudentInfo,
        RosterSaveData,
        RosterQuery,
        UpdateTeachersData,
        CourseIdData,
        RoleChangeData,
        UserResponse,
        UserCreatedResponse,
        UserLoginData,
        UserSignupData,
        Problem
    )),
    modifiers(&JWTAuth, &V1_PREFIX)
)]
pub struct ApiDocV1;

pub struct PathPrefix(pub &'static str);
static V1_PREFIX: PathPrefix = PathPrefix("/api/v1");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

pub fn api_v1() -> Vec<Route> {
    routes![
        user_get,
        user_create,
        user_delete,
        user_set_role,
        login_submit,
        course_create,
        course_list,
        course_enrolled,
        course_get,
        course_archive,
        course_update_teachers,
        course_remove_from_teachers,
        slot_create,
        slot_list,
        slot_update,
        slot_delete,
        slot_eligible_courses,
        session_book,
        session_list,
        session_update_status,
        session_delete,
        roster_save,
        roster_get
    ]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/api/v1", api_v1()).mount(
        "/",
        SwaggerUi::new("/swagger/<_..>").url("/api/v1/openapi.json", ApiDocV1::openapi()),
    )
}
