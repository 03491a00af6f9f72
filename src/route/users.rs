use mongodb::Database;
use rocket::form::Form;
use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::data::user::db::problem as user_problem;
use crate::data::user::db::{UserCreatedResponse, UserDbExt, UserLoginData, UserSignupData};
use crate::data::user::{PasswordHash, User, UserResponse};
use crate::resp::jwt::{auth_problem, UserRoleToken, AUTH_COOKIE_NAME};
use crate::resp::problem::Problem;
use crate::role::Role;

#[utoipa::path(
    params(
        ("id", description = "user ID")
    ),
    responses(
        (status = 200, description = "Information about the user", body = UserResponse),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(
        ("jwt" = [])
    )
)]
#[get("/user/<id>")]
#[tracing::instrument]
pub async fn user_get(
    id: Uuid,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Option<Json<UserResponse>>, Problem> {
    if auth.role < Role::Student {
        return Err(auth_problem("Only members can view other users."));
    }

    Ok(db.get_user(id).await?.map(|it| Json(UserResponse::from(it))))
}

#[utoipa::path(request_body = UserSignupData)]
#[post("/user", data = "<create_user>")]
#[tracing::instrument]
pub async fn user_create<'a>(
    create_user: Form<UserSignupData>,
    cookies: &'a CookieJar<'_>,
    db: &State<Database>,
    c: &State<Config>,
) -> Result<Json<UserCreatedResponse>, Problem> {
    create_user.validate()?;

    let (token, user) = db
        .create_user(create_user.into_inner(), &c.admin_usernames)
        .await?;
    cookies.add(token.cookie()?);

    Ok(Json(UserCreatedResponse::from(user)))
}

#[utoipa::path(request_body = UserLoginData)]
#[post("/login", data = "<login_user>")]
#[tracing::instrument]
pub async fn login_submit<'a>(
    login_user: Form<UserLoginData>,
    cookies: &'a CookieJar<'_>,
    db: &State<Database>,
) -> Result<User, Problem> {
    let is_email = login_user.is_email();

    login_user.validate(is_email)?;

    let document = match is_email {
        true => db.find_user_by_email(login_user.identifier.clone()).await,
        false => {
            db.find_user_by_username(login_user.identifier.clone())
                .await
        }
    }?;

    let user = document.ok_or_else(|| user_problem::bad_login(is_email))?;

    if user.pw_hash != PasswordHash::new(login_user.password.clone()) {
        return Err(user_problem::bad_login(is_email));
    }

    let urt = UserRoleToken::new(&user);
    cookies.add(urt.cookie()?);

    Ok(user)
}

#[utoipa::path(
    params(
        ("id", description = "user ID")
    ),
    security(
        ("jwt" = [])
    )
)]
#[delete("/user/<id>")]
#[tracing::instrument]
pub async fn user_delete<'a>(
    id: Uuid,
    auth: UserRoleToken,
    cookies: &'a CookieJar<'_>,
    db: &State<Database>,
) -> Result<String, Problem> {
    if auth.user != id && auth.role < Role::Admin {
        return Err(auth_problem("Only admins can delete other users."));
    }

    let removed = db.delete_user(id).await?;

    if let Some(removed) = removed {
        if auth.user == id {
            cookies.remove(AUTH_COOKIE_NAME);
        }
        Ok(removed.id.to_string())
    } else {
        Err(user_problem::not_found(id))
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RoleChangeData {
    pub role: Role,
}

/// Role assignment is an admin action; signup always produces students.
#[utoipa::path(request_body = RoleChangeData)]
#[post("/user/<id>/role", format = "application/json", data = "<change>")]
#[tracing::instrument]
pub async fn user_set_role(
    id: Uuid,
    change: Json<RoleChangeData>,
    auth: UserRoleToken,
    db: &State<Database>,
) -> Result<Json<UserResponse>, Problem> {
    if auth.role < Role::Admin {
        return Err(auth_problem("Only admins can change user roles."));
    }

    let user = db
        .set_user_role(id, change.role)
        .await?
        .ok_or_else(|| user_problem::not_found(id))?;

    Ok(Json(UserResponse::from(User {
        user_role: change.role,
        ..user
    })))
}
