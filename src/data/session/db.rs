use bson::{doc, Document};
use chrono::Utc;
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::Database;
use rocket::futures::StreamExt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::course::db::CourseDbExt;
use crate::data::filter;
use crate::data::slot::db::{problem as slot_problem, SlotDbExt};
use crate::data::slot::SlotStatus;
use crate::data::user::db::UserDbExt;
use crate::middleware::paging::PageState;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::Problem;

use super::{SessionStatus, TutoringSession, SESSION_COLLECTION_NAME};

pub mod problem {
    use crate::data::session::SessionStatus;
    use crate::resp::problem::{ErrorCode, Problem};
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::from_code(ErrorCode::NotFound, "Tutoring session doesn't exist.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn not_eligible(slot: Uuid) -> Problem {
        Problem::from_code(
            ErrorCode::Forbidden,
            "None of the student's courses qualify for this time slot.",
        )
        .insert("slot_id", slot.to_string())
        .clone()
    }

    #[inline]
    pub fn invalid_transition(from: SessionStatus, to: SessionStatus) -> Problem {
        Problem::from_code(ErrorCode::InvalidTransition, "Illegal status change.")
            .insert("from", from.to_string())
            .insert("to", to.to_string())
            .clone()
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BookingData {
    pub slot_id: Uuid,
    /// Which of the student's eligible courses the session is for. Optional
    /// for subject-restricted and unrestricted slots.
    #[serde(default)]
    pub course_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub trait SessionDbExt {
    /// Books a tutoring session for the calling student: checks eligibility
    /// against their enrolled courses, atomically takes a seat on the slot,
    /// then records the `pending` session. The seat is given back if the
    /// session insert fails.
    async fn book_session(
        &self,
        data: BookingData,
        auth: &UserRoleToken,
    ) -> Result<TutoringSession, Problem>;

    async fn get_session(&self, id: Uuid) -> Result<Option<TutoringSession>, Problem>;

    async fn list_sessions_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<TutoringSession>, Problem>;

    async fn list_sessions_for_teacher(
        &self,
        teacher_id: Uuid,
    ) -> Result<Vec<TutoringSession>, Problem>;

    async fn list_all_sessions(&self, page: PageState) -> Result<Vec<TutoringSession>, Problem>;

    /// Applies one state-machine edge to an already-loaded session. The
    /// stored status is compare-and-set against the loaded one, so a racing
    /// transition loses cleanly instead of being overwritten. Cancellation
    /// gives the slot seat back.
    async fn transition_session(
        &self,
        session: &TutoringSession,
        new_status: SessionStatus,
    ) -> Result<TutoringSession, Problem>;

    /// Removes a session outright (teacher action); a still seat-holding
    /// session releases its slot seat.
    async fn delete_session(&self, id: Uuid) -> Result<Option<TutoringSession>, Problem>;
}

impl SessionDbExt for Database {
    async fn book_session(
        &self,
        data: BookingData,
        auth: &UserRoleToken,
    ) -> Result<TutoringSession, Problem> {
        let slot = self
            .get_slot(data.slot_id)
            .await?
            .ok_or_else(|| slot_problem::not_found(data.slot_id))?;

        if slot.status != SlotStatus::Available {
            return Err(slot_problem::not_open(slot.id));
        }
        if !slot.is_bookable() {
            return Err(slot_problem::slot_full(slot.id));
        }

        let student = self
            .get_user(auth.user)
            .await?
            .ok_or_else(|| crate::data::user::db::problem::not_found(auth.user))?;

        let enrolled = self.student_courses(&student).await?;
        let eligible = slot.eligible_courses(&enrolled);
        if eligible.is_empty() {
            return Err(problem::not_eligible(slot.id));
        }

        let chosen = match data.course_id {
            Some(course_id) => Some(
                eligible
                    .iter()
                    .find(|c| c.id == course_id)
                    .ok_or_else(|| problem::not_eligible(slot.id))?
                    .clone(),
            ),
            None => None,
        };

        let subject = slot
            .subject_restriction
            .clone()
            .or_else(|| chosen.as_ref().map(|c| c.subject.clone()))
            .unwrap_or_else(|| eligible[0].subject.clone());

        let reserved = self.reserve_seat(slot.id).await?;
        let slot = reserved.ok_or_else(|| slot_problem::slot_full(slot.id))?;

        let now = Utc::now();
        let session = TutoringSession {
            id: Uuid::new_v4(),
            student_id: student.id,
            student_name: student.name.clone(),
            student_account: student.username.clone(),
            teacher_id: slot.teacher_id,
            teacher_name: slot.teacher_name.clone(),
            subject,
            course_id: chosen.as_ref().map(|c| c.id),
            course_name: chosen.map(|c| c.name),
            slot_id: slot.id,
            date: slot.date,
            time: slot.time.clone(),
            duration_mins: slot.duration_mins,
            status: SessionStatus::Pending,
            notes: data.notes,
            created: now,
            updated: now,
        };

        let inserted = self
            .collection(SESSION_COLLECTION_NAME)
            .insert_one(
                bson::to_document(&session)
                    .expect("TutoringSession must be serializable to BSON"),
                None,
            )
            .await;

        if let Err(e) = inserted {
            // Give the seat back; the reservation would otherwise leak.
            if let Err(release) = self.release_seat(slot.id).await {
                tracing::warn!(
                    "Unable to release seat on {} after failed booking: {}",
                    slot.id,
                    release
                );
            }
            return Err(Problem::from(e));
        }

        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<TutoringSession>, Problem> {
        self.collection(SESSION_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn list_sessions_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<TutoringSession>, Problem> {
        drain_sessions(self, doc! { "student_id": student_id.to_string() }, None).await
    }

    async fn list_sessions_for_teacher(
        &self,
        teacher_id: Uuid,
    ) -> Result<Vec<TutoringSession>, Problem> {
        drain_sessions(self, doc! { "teacher_id": teacher_id.to_string() }, None).await
    }

    async fn list_all_sessions(&self, page: PageState) -> Result<Vec<TutoringSession>, Problem> {
        drain_sessions(self, doc! {}, Some(page)).await
    }

    async fn transition_session(
        &self,
        session: &TutoringSession,
        new_status: SessionStatus,
    ) -> Result<TutoringSession, Problem> {
        if !session.status.can_transition(new_status) {
            return Err(problem::invalid_transition(session.status, new_status));
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let mut query = filter::by_id(session.id);
        query.insert("status", session.status.to_string());

        let updated = self
            .collection::<TutoringSession>(SESSION_COLLECTION_NAME)
            .find_one_and_update(
                query,
                doc! { "$set": {
                    "status": new_status.to_string(),
                    "updated": bson::to_bson(&Utc::now())?,
                } },
                options,
            )
            .await
            .map_err(Problem::from)?;

        // A concurrent transition got there first; report against the status
        // that actually held.
        let updated = match updated {
            Some(it) => it,
            None => {
                let current = self
                    .get_session(session.id)
                    .await?
                    .ok_or_else(|| problem::not_found(session.id))?;
                return Err(problem::invalid_transition(current.status, new_status));
            }
        };

        if new_status == SessionStatus::Cancelled {
            match self.release_seat(updated.slot_id).await {
                Ok(Some(_)) => {}
                Ok(None) => tracing::warn!(
                    "Slot {} had no seats to release for cancelled session {}.",
                    updated.slot_id,
                    updated.id
                ),
                Err(e) => tracing::warn!(
                    "Unable to release seat on {} for cancelled session {}: {}",
                    updated.slot_id,
                    updated.id,
                    e
                ),
            }
        }

        Ok(updated)
    }

    async fn delete_session(&self, id: Uuid) -> Result<Option<TutoringSession>, Problem> {
        let removed: Option<TutoringSession> = self
            .collection(SESSION_COLLECTION_NAME)
            .find_one_and_delete(filter::by_id(id), None)
            .await
            .map_err(Problem::from)?;

        if let Some(session) = &removed {
            if session.status.holds_seat() {
                if let Err(e) = self.release_seat(session.slot_id).await {
                    tracing::warn!(
                        "Unable to release seat on {} for deleted session {}: {}",
                        session.slot_id,
                        session.id,
                        e
                    );
                }
            }
        }

        Ok(removed)
    }
}

async fn drain_sessions(
    db: &Database,
    query: Document,
    page: Option<PageState>,
) -> Result<Vec<TutoringSession>, Problem> {
    let mut options = FindOptions::builder()
        .sort(doc! { "date": -1, "time": -1 })
        .build();
    if let Some(page) = page {
        options.skip = Some(page.skip());
        options.limit = Some(page.limit());
    }

    let mut cursor = db
        .collection::<TutoringSession>(SESSION_COLLECTION_NAME)
        .find(query, options)
        .await
        .map_err(Problem::from)?;

    let mut sessions = vec![];
    while let Some(result) = cursor.next().await {
        match result {
            Ok(session) => sessions.push(session),
            Err(_) => tracing::warn!("Unable to deserialize TutoringSession document."),
        }
    }

    Ok(sessions)
}
