use bson::doc;
use mongodb::Database;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::Problem;
use crate::role::Role;

use super::{PasswordHash, User, USER_COLLECTION_NAME};

pub mod problem {
    use crate::resp::problem::{ErrorCode, Problem};
    use uuid::Uuid;

    #[inline]
    pub fn bad_email(email: impl ToString, detail: impl ToString) -> Problem {
        Problem::from_code(ErrorCode::Validation, "Bad email.")
            .insert_str("email", email)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_username(username: impl ToString, detail: impl ToString) -> Problem {
        Problem::from_code(ErrorCode::Validation, "Bad username.")
            .insert_str("username", username)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_password(detail: impl ToString) -> Problem {
        Problem::from_code(ErrorCode::Validation, "Bad password.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::from_code(ErrorCode::NotFound, "User doesn't exist.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn bad_login(is_email: bool) -> Problem {
        Problem::from_code(
            ErrorCode::Unauthorized,
            if is_email {
                "Bad email or password."
            } else {
                "Bad username or password."
            },
        )
    }
}

pub mod filter {
    use bson::{doc, Document};
    use uuid::Uuid;

    use crate::data::filter::by_id as by_uuid;

    #[inline]
    pub fn by_id(id: Uuid) -> Document {
        by_uuid(id)
    }

    #[inline]
    pub fn by_email(email: String) -> Document {
        doc! { "email": email }
    }

    #[inline]
    pub fn by_username(username: String) -> Document {
        doc! { "username": username }
    }
}

#[derive(Clone, FromForm, ToSchema)]
pub struct UserSignupData {
    #[schema(format = "email")]
    pub email: String,
    pub username: String,
    pub name: String,
    #[schema(format = Password)]
    pub password: String,
}

impl UserSignupData {
    pub fn id(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, self.username.as_bytes())
    }
}

impl std::fmt::Debug for UserSignupData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserSignupData:{}", self.username)
    }
}

impl UserSignupData {
    pub fn validate(&self) -> Result<(), Problem> {
        if !self.email.contains('@') {
            return Err(problem::bad_email(
                self.email.to_string(),
                "Not a valid e-mail address.",
            ));
        }

        if self.username.len() < 5 {
            return Err(problem::bad_username(
                self.username.to_string(),
                "Username must be at least 5 characters (bytes) long.",
            ));
        }

        if self.username.len() > 32 {
            return Err(problem::bad_username(
                self.username.to_string(),
                "Username can't be longer than 32 (bytes) characters.",
            ));
        }

        if self.name.is_empty() {
            return Err(Problem::from_code(
                crate::resp::problem::ErrorCode::MissingField,
                "Display name is required.",
            ));
        }

        if self.password.len() <= 8 {
            return Err(problem::bad_password(
                "Password must be at least 8 characters (bytes) long.",
            ));
        }

        if self.password.len() > 1024 {
            return Err(problem::bad_password(
                "Passwords longer than 1024 characters aren't supported.",
            ));
        }

        Ok(())
    }
}

impl From<UserSignupData> for User {
    fn from(data: UserSignupData) -> Self {
        User::new(data.email, data.username, data.name, data.password)
    }
}

#[derive(Clone, FromForm, ToSchema)]
pub struct UserLoginData {
    /// Username or e-mail address.
    pub identifier: String,
    #[schema(format = Password)]
    pub password: String,
}

impl std::fmt::Debug for UserLoginData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserLoginData:{}", self.identifier)
    }
}

impl UserLoginData {
    pub fn is_email(&self) -> bool {
        self.identifier.contains('@')
    }

    pub fn validate(&self, is_email: bool) -> Result<(), Problem> {
        if self.identifier.len() < 5
            || self.identifier.len() > 64
            || self.password.len() < 8
            || self.password.len() > 1024
        {
            return Err(problem::bad_login(is_email));
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserCreatedResponse {
    pub id: Uuid,
    pub username: String,
    pub user_role: Role,
}

impl From<User> for UserCreatedResponse {
    fn from(user: User) -> Self {
        UserCreatedResponse {
            id: user.id,
            username: user.username,
            user_role: user.user_role,
        }
    }
}

pub trait UserDbExt {
    async fn create_user(
        &self,
        create_user: UserSignupData,
        admin_names: impl AsRef<[String]>,
    ) -> Result<(UserRoleToken, User), Problem>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Problem>;

    async fn find_user_by_email(&self, email: impl AsRef<str>) -> Result<Option<User>, Problem>;
    async fn find_user_by_username(
        &self,
        username: impl AsRef<str>,
    ) -> Result<Option<User>, Problem>;

    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, Problem>;

    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<Option<User>, Problem>;

    /// Rewrites the authoritative enrollment list on the user document.
    async fn set_enrolled_courses(&self, id: Uuid, course_ids: &[Uuid]) -> Result<(), Problem>;
}

impl UserDbExt for Database {
    async fn create_user(
        &self,
        create_user: UserSignupData,
        admin_names: impl AsRef<[String]>,
    ) -> Result<(UserRoleToken, User), Problem> {
        let existing_email = self.find_user_by_email(&create_user.email).await?;

        if let Some(existing) = existing_email {
            let create_hash = PasswordHash::new(create_user.password.as_str());
            return if existing.pw_hash == create_hash {
                let urt = UserRoleToken::new(&existing);
                Ok((urt, existing))
            } else {
                Err(problem::bad_email(
                    create_user.email.to_string(),
                    "Email already registered.",
                ))
            };
        }

        if self
            .find_user_by_username(&create_user.username)
            .await?
            .is_some()
        {
            return Err(problem::bad_username(
                create_user.username.to_string(),
                "Username already used.",
            ));
        }

        let mut user = User::from(create_user);

        if admin_names.as_ref().contains(&user.username) {
            user.user_role = Role::Admin;
        }

        let urt = UserRoleToken::new(&user);

        self.collection(USER_COLLECTION_NAME)
            .insert_one(
                bson::to_document(&user).expect("User must be serializable to BSON"),
                None,
            )
            .await
            .map_err(Problem::from)?;

        Ok((urt, user))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Problem> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn find_user_by_email(&self, email: impl AsRef<str>) -> Result<Option<User>, Problem> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(filter::by_email(email.as_ref().to_string()), None)
            .await
            .map_err(Problem::from)
    }

    async fn find_user_by_username(
        &self,
        username: impl AsRef<str>,
    ) -> Result<Option<User>, Problem> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(filter::by_username(username.as_ref().to_string()), None)
            .await
            .map_err(Problem::from)
    }

    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, Problem> {
        self.collection(USER_COLLECTION_NAME)
            .find_one_and_delete(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<Option<User>, Problem> {
        self.collection::<User>(USER_COLLECTION_NAME)
            .find_one_and_update(
                filter::by_id(id),
                doc! { "$set": { "user_role": bson::to_bson(&role)? } },
                None,
            )
            .await
            .map_err(Problem::from)
    }

    async fn set_enrolled_courses(&self, id: Uuid, course_ids: &[Uuid]) -> Result<(), Problem> {
        let ids: Vec<String> = course_ids.iter().map(|it| it.to_string()).collect();
        self.collection::<User>(USER_COLLECTION_NAME)
            .update_one(
                filter::by_id(id),
                doc! { "$set": { "enrolled_courses": ids } },
                None,
            )
            .await
            .map_err(Problem::from)?;
        Ok(())
    }
}
