use bson::{doc, Document};
use chrono::{NaiveDate, NaiveTime};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::Database;
use rocket::futures::StreamExt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::filter;
use crate::resp::problem::Problem;

use super::{
    SlotStatus, TimeSlot, TutoringMethod, TutoringType, GROUP_CAPACITY_SENTINEL,
    SLOT_COLLECTION_NAME,
};

pub mod problem {
    use crate::resp::problem::{ErrorCode, Problem};
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::from_code(ErrorCode::NotFound, "Time slot doesn't exist.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn not_open(id: Uuid) -> Problem {
        Problem::from_code(ErrorCode::Validation, "Time slot isn't open for booking.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn slot_full(id: Uuid) -> Problem {
        Problem::from_code(ErrorCode::SlotFull, "Time slot has no open seats.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn bad_slot(detail: impl ToString) -> Problem {
        Problem::from_code(ErrorCode::Validation, "Bad time slot data.")
            .detail(detail)
            .clone()
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SlotCreateData {
    pub date: NaiveDate,
    pub time: String,
    pub duration_mins: u32,
    pub tutoring_type: TutoringType,
    /// Ignored for group slots; those are pinned to the capacity sentinel.
    #[serde(default)]
    pub max_students: Option<u32>,
    #[serde(default)]
    pub subject_restriction: Option<String>,
    #[serde(default)]
    pub course_restrictions: Vec<Uuid>,
    pub method: TutoringMethod,
    #[serde(default)]
    pub location: Option<String>,
}

impl SlotCreateData {
    pub fn validate(&self) -> Result<(), Problem> {
        use crate::resp::problem::problems::missing_field;

        if NaiveTime::parse_from_str(&self.time, "%H:%M").is_err() {
            return Err(problem::bad_slot("Time must be formatted as HH:MM."));
        }

        if self.duration_mins == 0 {
            return Err(problem::bad_slot("Duration must be positive."));
        }

        if self.tutoring_type == TutoringType::Individual && self.max_students == Some(0) {
            return Err(problem::bad_slot(
                "Individual slots must seat at least one student.",
            ));
        }

        if self.method == TutoringMethod::Physical
            && self.location.as_deref().unwrap_or("").is_empty()
        {
            return Err(missing_field("location"));
        }

        Ok(())
    }

    pub fn into_slot(self, teacher_id: Uuid, teacher_name: impl ToString) -> TimeSlot {
        let max_students = match self.tutoring_type {
            TutoringType::Group => GROUP_CAPACITY_SENTINEL,
            TutoringType::Individual => self.max_students.unwrap_or(1),
        };

        // Selecting a course restriction clears any subject restriction.
        let subject_restriction = if self.course_restrictions.is_empty() {
            self.subject_restriction
        } else {
            None
        };

        TimeSlot {
            id: Uuid::new_v4(),
            teacher_id,
            teacher_name: teacher_name.to_string(),
            date: self.date,
            time: self.time,
            duration_mins: self.duration_mins,
            tutoring_type: self.tutoring_type,
            max_students,
            current_students: 0,
            status: SlotStatus::Available,
            subject_restriction,
            course_restrictions: self.course_restrictions,
            method: self.method,
            location: self.location,
        }
    }
}

/// Matches the slot only while a seat can still be taken; the `$inc` rides
/// on the same single-document operation, so two concurrent reservations of
/// a last seat can never both match.
pub(crate) fn reserve_filter(id: Uuid) -> Document {
    let mut f = filter::by_id(id);
    f.insert("status", "available");
    f.insert("$expr", doc! { "$lt": ["$current_students", "$max_students"] });
    f
}

pub(crate) fn release_filter(id: Uuid) -> Document {
    let mut f = filter::by_id(id);
    f.insert("current_students", doc! { "$gt": 0 });
    f
}

pub trait SlotDbExt {
    async fn create_slot(
        &self,
        data: SlotCreateData,
        teacher_id: Uuid,
        teacher_name: &str,
    ) -> Result<TimeSlot, Problem>;

    async fn get_slot(&self, id: Uuid) -> Result<Option<TimeSlot>, Problem>;

    /// A teacher's own slots, any status, newest date first.
    async fn list_slots_for_teacher(
        &self,
        teacher_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<TimeSlot>, Problem>;

    /// Every teacher's available slots; exact date match when one is given,
    /// otherwise everything from `today` on.
    async fn list_open_slots(
        &self,
        date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Vec<TimeSlot>, Problem>;

    /// Rewrites the mutable fields of a slot. `teacher_scope` restricts the
    /// update to slots owned by that teacher; capacity can't be lowered
    /// below the seats already taken.
    async fn update_slot(
        &self,
        id: Uuid,
        data: SlotCreateData,
        teacher_scope: Option<Uuid>,
    ) -> Result<Option<TimeSlot>, Problem>;

    async fn cancel_slot(
        &self,
        id: Uuid,
        teacher_scope: Option<Uuid>,
    ) -> Result<Option<TimeSlot>, Problem>;

    /// Atomically takes one seat. Returns the post-image, or `None` when the
    /// slot is missing, not available, or already at capacity. Fills the
    /// last seat flip the slot to `full` explicitly.
    async fn reserve_seat(&self, id: Uuid) -> Result<Option<TimeSlot>, Problem>;

    /// Atomically gives one seat back and reopens a full slot.
    async fn release_seat(&self, id: Uuid) -> Result<Option<TimeSlot>, Problem>;
}

impl SlotDbExt for Database {
    async fn create_slot(
        &self,
        data: SlotCreateData,
        teacher_id: Uuid,
        teacher_name: &str,
    ) -> Result<TimeSlot, Problem> {
        data.validate()?;

        let slot = data.into_slot(teacher_id, teacher_name);

        self.collection(SLOT_COLLECTION_NAME)
            .insert_one(
                bson::to_document(&slot).expect("TimeSlot must be serializable to BSON"),
                None,
            )
            .await
            .map_err(Problem::from)?;

        Ok(slot)
    }

    async fn get_slot(&self, id: Uuid) -> Result<Option<TimeSlot>, Problem> {
        self.collection(SLOT_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn list_slots_for_teacher(
        &self,
        teacher_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<TimeSlot>, Problem> {
        let mut query = doc! { "teacher_id": teacher_id.to_string() };
        if let Some(date) = date {
            query.insert("date", date.to_string());
        }

        drain_slots(self, query).await
    }

    async fn list_open_slots(
        &self,
        date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Vec<TimeSlot>, Problem> {
        let mut query = doc! { "status": "available" };
        match date {
            Some(date) => query.insert("date", date.to_string()),
            None => query.insert("date", doc! { "$gte": today.to_string() }),
        };

        drain_slots(self, query).await
    }

    async fn update_slot(
        &self,
        id: Uuid,
        data: SlotCreateData,
        teacher_scope: Option<Uuid>,
    ) -> Result<Option<TimeSlot>, Problem> {
        data.validate()?;

        let max_students = match data.tutoring_type {
            TutoringType::Group => GROUP_CAPACITY_SENTINEL,
            TutoringType::Individual => data.max_students.unwrap_or(1),
        };
        let subject_restriction = if data.course_restrictions.is_empty() {
            data.subject_restriction.clone()
        } else {
            None
        };

        let mut query = filter::by_id(id);
        if let Some(teacher) = teacher_scope {
            query.insert("teacher_id", teacher.to_string());
        }
        // Capacity can't drop below seats already taken.
        query.insert("current_students", doc! { "$lte": max_students });

        let course_restrictions: Vec<String> = data
            .course_restrictions
            .iter()
            .map(|it| it.to_string())
            .collect();

        let update = doc! { "$set": {
            "date": data.date.to_string(),
            "time": data.time.as_str(),
            "duration_mins": data.duration_mins,
            "tutoring_type": bson::to_bson(&data.tutoring_type)?,
            "max_students": max_students,
            "subject_restriction": bson::to_bson(&subject_restriction)?,
            "course_restrictions": course_restrictions,
            "method": bson::to_bson(&data.method)?,
            "location": bson::to_bson(&data.location)?,
        } };

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .collection::<TimeSlot>(SLOT_COLLECTION_NAME)
            .find_one_and_update(query, update, options)
            .await
            .map_err(Problem::from)?;

        if updated.is_some() {
            return Ok(updated);
        }

        // Distinguish a missing slot from one the filter rejected.
        match self.get_slot(id).await? {
            None => Ok(None),
            Some(existing) => {
                if teacher_scope.is_some_and(|t| existing.teacher_id != t) {
                    Err(crate::resp::problem::problems::forbidden(
                        "Time slot not owned by user.",
                    ))
                } else {
                    Err(problem::bad_slot(
                        "Seat capacity can't drop below seats already taken.",
                    ))
                }
            }
        }
    }

    async fn cancel_slot(
        &self,
        id: Uuid,
        teacher_scope: Option<Uuid>,
    ) -> Result<Option<TimeSlot>, Problem> {
        let mut query = filter::by_id(id);
        if let Some(teacher) = teacher_scope {
            query.insert("teacher_id", teacher.to_string());
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.collection::<TimeSlot>(SLOT_COLLECTION_NAME)
            .find_one_and_update(query, doc! { "$set": { "status": "cancelled" } }, options)
            .await
            .map_err(Problem::from)
    }

    async fn reserve_seat(&self, id: Uuid) -> Result<Option<TimeSlot>, Problem> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let reserved = self
            .collection::<TimeSlot>(SLOT_COLLECTION_NAME)
            .find_one_and_update(
                reserve_filter(id),
                doc! { "$inc": { "current_students": 1 } },
                options,
            )
            .await
            .map_err(Problem::from)?;

        if let Some(slot) = &reserved {
            if slot.current_students >= slot.max_students {
                let flip = self
                    .collection::<TimeSlot>(SLOT_COLLECTION_NAME)
                    .update_one(
                        doc! {
                            "_id": filter::uuid_bson(id),
                            "status": "available",
                            "$expr": { "$gte": ["$current_students", "$max_students"] },
                        },
                        doc! { "$set": { "status": "full" } },
                        None,
                    )
                    .await;
                if let Err(e) = flip {
                    // The seat is held either way; the status flag is display
                    // state and self-corrects on the next transition.
                    tracing::warn!("Unable to mark slot {} as full: {}", id, e);
                }
            }
        }

        Ok(reserved)
    }

    async fn release_seat(&self, id: Uuid) -> Result<Option<TimeSlot>, Problem> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let released = self
            .collection::<TimeSlot>(SLOT_COLLECTION_NAME)
            .find_one_and_update(
                release_filter(id),
                doc! { "$inc": { "current_students": -1 } },
                options,
            )
            .await
            .map_err(Problem::from)?;

        if let Some(slot) = &released {
            if slot.status == SlotStatus::Full && slot.current_students < slot.max_students {
                let flip = self
                    .collection::<TimeSlot>(SLOT_COLLECTION_NAME)
                    .update_one(
                        doc! {
                            "_id": filter::uuid_bson(id),
                            "status": "full",
                            "$expr": { "$lt": ["$current_students", "$max_students"] },
                        },
                        doc! { "$set": { "status": "available" } },
                        None,
                    )
                    .await;
                if let Err(e) = flip {
                    tracing::warn!("Unable to reopen slot {}: {}", id, e);
                }
            }
        }

        Ok(released)
    }
}

async fn drain_slots(db: &Database, query: Document) -> Result<Vec<TimeSlot>, Problem> {
    let options = FindOptions::builder()
        .sort(doc! { "date": 1, "time": 1 })
        .build();

    let mut cursor = db
        .collection::<TimeSlot>(SLOT_COLLECTION_NAME)
        .find(query, options)
        .await
        .map_err(Problem::from)?;

    let mut slots = vec![];
    while let Some(result) = cursor.next().await {
        match result {
            Ok(slot) => slots.push(slot),
            Err(_) => tracing::warn!("Unable to deserialize TimeSlot document."),
        }
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_data() -> SlotCreateData {
        SlotCreateData {
            date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
            time: "19:00".to_string(),
            duration_mins: 60,
            tutoring_type: TutoringType::Individual,
            max_students: Some(1),
            subject_restriction: None,
            course_restrictions: vec![],
            method: TutoringMethod::Online,
            location: None,
        }
    }

    #[test]
    fn reserve_filter_only_matches_open_seats() {
        let id = Uuid::new_v4();
        let f = reserve_filter(id);

        assert!(f.contains_key("_id"));
        assert_eq!(f.get_str("status").unwrap(), "available");
        assert_eq!(
            f.get_document("$expr").unwrap(),
            &doc! { "$lt": ["$current_students", "$max_students"] }
        );
    }

    #[test]
    fn release_filter_never_drops_below_zero() {
        let f = release_filter(Uuid::new_v4());
        assert_eq!(
            f.get_document("current_students").unwrap(),
            &doc! { "$gt": 0 }
        );
    }

    #[test]
    fn physical_slots_require_a_location() {
        let mut data = create_data();
        data.method = TutoringMethod::Physical;
        assert!(data.validate().is_err());

        data.location = Some("台北市信義區".to_string());
        assert!(data.validate().is_ok());
    }

    #[test]
    fn time_must_be_hh_mm() {
        let mut data = create_data();
        data.time = "7pm".to_string();
        assert!(data.validate().is_err());
    }

    #[test]
    fn group_slots_are_pinned_to_the_sentinel() {
        let mut data = create_data();
        data.tutoring_type = TutoringType::Group;
        data.max_students = Some(5);

        let slot = data.into_slot(Uuid::new_v4(), "王老師");
        assert_eq!(slot.max_students, GROUP_CAPACITY_SENTINEL);
    }

    #[test]
    fn new_slots_start_available_and_empty() {
        let slot = create_data().into_slot(Uuid::new_v4(), "王老師");
        assert_eq!(slot.current_students, 0);
        assert_eq!(slot.status, SlotStatus::Available);
    }

    #[test]
    fn choosing_course_restrictions_clears_the_subject() {
        let mut data = create_data();
        data.subject_restriction = Some("數學".to_string());
        data.course_restrictions = vec![Uuid::new_v4()];

        let slot = data.into_slot(Uuid::new_v4(), "王老師");
        assert_eq!(slot.subject_restriction, None);
        assert_eq!(slot.course_restrictions.len(), 1);
    }
}
