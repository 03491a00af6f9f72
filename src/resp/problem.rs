use std::io::Cursor;

use rocket::http::ContentType;
use rocket::http::Status;
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};
use utoipa::ToSchema;

/// Machine-readable failure category carried in every problem body as
/// `code`. Clients branch on this, never on the human-readable title.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MissingField,
    Validation,
    NotFound,
    Forbidden,
    Unauthorized,
    SlotFull,
    InvalidTransition,
    Storage,
}

impl ErrorCode {
    pub fn status(self) -> Status {
        match self {
            ErrorCode::MissingField | ErrorCode::Validation => Status::BadRequest,
            ErrorCode::NotFound => Status::NotFound,
            ErrorCode::Forbidden => Status::Forbidden,
            ErrorCode::Unauthorized => Status::Unauthorized,
            ErrorCode::SlotFull | ErrorCode::InvalidTransition => Status::Conflict,
            ErrorCode::Storage => Status::InternalServerError,
        }
    }
}

/// Implements [RFC7807](https://tools.ietf.org/html/rfc7807).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Problem {
    #[serde(skip)]
    pub status: Status,
    pub type_uri: String,
    pub title: String,

    pub detail: Option<String>,
    pub instance_uri: Option<String>,

    pub body: Map<String, Value>,
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            status: Status::InternalServerError,
            type_uri: "about:blank".to_string(),
            title: "Problem".to_string(),
            detail: None,
            instance_uri: None,
            body: Map::new(),
        }
    }
}

impl Problem {
    pub fn new(status: Status, type_uri: impl ToString, title: impl ToString) -> Problem {
        Problem {
            status,
            type_uri: type_uri.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn new_untyped(status: Status, title: impl ToString) -> Problem {
        Problem {
            status,
            type_uri: "about:blank".to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    /// Preferred constructor: status and the `code` body entry both derive
    /// from the [`ErrorCode`].
    pub fn from_code(code: ErrorCode, title: impl ToString) -> Problem {
        Problem::new_untyped(code.status(), title)
            .insert("code", code)
            .to_owned()
    }

    pub fn detail(&mut self, value: impl ToString) -> &mut Problem {
        self.detail = Some(value.to_string());
        self
    }

    pub fn instance_uri(&mut self, value: String) -> &mut Problem {
        self.instance_uri = Some(value);
        self
    }

    pub fn insert<V: Serialize>(&mut self, key: impl ToString, value: V) -> &mut Problem {
        self.body.insert(
            key.to_string(),
            serde_json::to_value(value).expect("data must be JSON serializable"),
        );
        self
    }

    pub fn insert_str(&mut self, key: impl ToString, value: impl ToString) -> &mut Problem {
        self.body
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    /// The `code` body entry, if one was attached.
    pub fn code(&self) -> Option<ErrorCode> {
        self.body
            .get("code")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.title)
    }
}

impl std::error::Error for Problem {}

impl<'r> Responder<'r, 'static> for Problem {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let mut body = self.body.clone();

        // Following are required by rfc7807
        body.insert(String::from("type"), serde_json::Value::from(self.type_uri));
        body.insert(String::from("title"), serde_json::Value::from(self.title));

        // Optional parameters as specified by rfc7807
        if let Some(detail) = self.detail {
            body.insert(String::from("detail"), serde_json::Value::from(detail));
        }
        body.insert(
            String::from("status"),
            serde_json::Value::from(self.status.code),
        );
        if let Some(instance) = self.instance_uri {
            body.insert(String::from("instance"), serde_json::Value::from(instance));
        }

        let body_string = serde_json::to_string(&body)
            .expect("JSON map keys and values must be JSON serializable");

        Response::build()
            .status(self.status)
            .header(ContentType::new("application", "problem+json"))
            .raw_header("Content-Language", "en")
            .sized_body(body_string.len(), Cursor::new(body_string))
            .ok()
    }
}

pub mod problems {
    use crate::resp::problem::{ErrorCode, Problem};

    #[inline]
    pub fn parse_problem() -> Problem {
        Problem::from_code(
            ErrorCode::Validation,
            "There was a problem parsing part of the request.",
        )
    }

    #[inline]
    pub fn missing_field(field: impl ToString) -> Problem {
        Problem::from_code(ErrorCode::MissingField, "Required field is missing.")
            .insert_str("field", field)
            .to_owned()
    }

    #[inline]
    pub fn forbidden(detail: impl ToString) -> Problem {
        Problem::from_code(ErrorCode::Forbidden, "Operation not permitted.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn storage_problem(title: impl ToString) -> Problem {
        Problem::from_code(ErrorCode::Storage, title)
    }
}

impl From<mongodb::error::Error> for Problem {
    fn from(e: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;
        use problems::storage_problem;

        fn mongodb_problem() -> Problem {
            storage_problem("MongoDB failed while processing request.")
        }

        fn access_problem() -> Problem {
            storage_problem("Server was unable to access MongoDB.")
        }

        fn bad_db_request() -> Problem {
            storage_problem("MongoDB was unable to process bad server request.")
        }

        fn bson_problem() -> Problem {
            storage_problem("There was a problem with handling MongoDB bson.")
        }

        match e.kind.as_ref() {
            ErrorKind::InvalidArgument { .. } => bad_db_request(),
            ErrorKind::Authentication { .. } => access_problem(),
            ErrorKind::BsonDeserialization(_) => bson_problem(),
            ErrorKind::BsonSerialization(_) => bson_problem(),
            ErrorKind::BulkWrite(_) => bad_db_request(),
            ErrorKind::Command(_) => bad_db_request(),
            ErrorKind::DnsResolve { .. } => access_problem(),
            ErrorKind::Internal { .. } => mongodb_problem(),
            ErrorKind::Io(_) => mongodb_problem()
                .detail("An IO error occurred. Submitted data might not be properly stored.")
                .clone(),
            ErrorKind::ConnectionPoolCleared { .. } => mongodb_problem(),
            ErrorKind::InvalidResponse { .. } => mongodb_problem(),
            ErrorKind::ServerSelection { .. } => access_problem(),
            ErrorKind::SessionsNotSupported => mongodb_problem(),
            ErrorKind::InvalidTlsConfig { .. } => access_problem(),
            ErrorKind::Write(_) => mongodb_problem()
                .detail("A write error occurred. Submitted data might not be properly stored.")
                .clone(),
            ErrorKind::Transaction { .. } => mongodb_problem(),
            ErrorKind::IncompatibleServer { .. } => access_problem(),
            _ => mongodb_problem(),
        }
    }
}

impl From<bson::de::Error> for Problem {
    fn from(_: bson::de::Error) -> Self {
        problems::storage_problem("An error occurred while processing BSON data.")
    }
}

impl From<bson::ser::Error> for Problem {
    fn from(_: bson::ser::Error) -> Self {
        problems::storage_problem("An error occurred while producing BSON data.")
    }
}

impl From<serde_json::Error> for Problem {
    fn from(_: serde_json::Error) -> Self {
        problems::storage_problem("An error occurred while processing JSON data.")
    }
}

impl From<jsonwebtoken::errors::Error> for Problem {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.into_kind() {
            ErrorKind::ExpiredSignature => {
                Problem::from_code(ErrorCode::Unauthorized, "Expired JWT signature.")
            }
            _ => Problem::from_code(ErrorCode::Unauthorized, "Error while handling JWT."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_sets_matching_status() {
        let p = Problem::from_code(ErrorCode::SlotFull, "No seats left.");
        assert_eq!(p.status, Status::Conflict);
        assert_eq!(p.code(), Some(ErrorCode::SlotFull));
    }

    #[test]
    fn code_serializes_snake_case() {
        let value = serde_json::to_value(ErrorCode::InvalidTransition).unwrap();
        assert_eq!(value, serde_json::json!("invalid_transition"));
        let value = serde_json::to_value(ErrorCode::MissingField).unwrap();
        assert_eq!(value, serde_json::json!("missing_field"));
    }

    #[test]
    fn storage_errors_map_to_storage_code() {
        let p = problems::storage_problem("MongoDB failed while processing request.");
        assert_eq!(p.status, Status::InternalServerError);
        assert_eq!(p.code(), Some(ErrorCode::Storage));
    }
}
