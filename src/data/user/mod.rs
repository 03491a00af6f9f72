use crypto::bcrypt::bcrypt;
use rocket::http::ContentType;
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

use crate::role::Role;

pub static USER_COLLECTION_NAME: &str = "users";

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PasswordHash([u8; 24]);

impl PasswordHash {
    pub fn new(password: impl AsRef<str>) -> PasswordHash {
        let mut pw_hash: [u8; 24] = [0; 24];

        let mut sha = Sha256::new();
        sha2::Digest::update(&mut sha, password.as_ref().as_bytes());

        bcrypt(
            15,
            &crate::SECURITY.salt,
            sha.finalize().as_slice(),
            &mut pw_hash,
        );

        PasswordHash(pw_hash)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub email: String,
    pub username: String,
    /// Display name shown on rosters and tutoring sessions.
    pub name: String,
    pub pw_hash: PasswordHash,
    pub user_role: Role,

    // Student profile fields
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub student_no: Option<String>,
    /// Authoritative list of course ids the student is enrolled in. Roster
    /// documents are derived from this, never the other way around.
    #[serde(default)]
    pub enrolled_courses: Vec<Uuid>,

    /// Composite course keys of the courses this user teaches. Maintained by
    /// the teacher-assignment synchronizer.
    #[serde(default)]
    pub courses: Vec<String>,
}

impl User {
    pub fn new(
        email: impl ToString,
        username: impl ToString,
        name: impl ToString,
        password: impl ToString,
    ) -> User {
        let pw_hash = PasswordHash::new(password.to_string());

        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, username.to_string().as_bytes());
        tracing::info!("Creating a new user with UUID: {}", id.to_string());

        User {
            id,
            email: email.to_string(),
            username: username.to_string(),
            name: name.to_string(),
            pw_hash,
            user_role: Role::Student,
            grade: None,
            student_no: None,
            enrolled_courses: vec![],
            courses: vec![],
        }
    }

    pub fn response_json(&self) -> String {
        json!({
            "id": self.id,
            "username": self.username.clone(),
            "name": self.name.clone(),
            "user_role": self.user_role,
        })
        .to_string()
    }
}

impl<'r> Responder<'r, 'static> for User {
    fn respond_to(self, _: &Request) -> response::Result<'static> {
        let body: String = self.response_json();

        Response::build()
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

/// User shape returned to other users; leaves out credentials and email.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub user_role: Role,
    pub grade: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            username: user.username,
            name: user.name,
            user_role: user.user_role,
            grade: user.grade,
        }
    }
}
