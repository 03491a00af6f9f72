pub mod course;
pub mod roster;
pub mod session;
pub mod slot;
pub mod user;

/// Filters for documents whose `_id` is a UUID stored as BSON binary.
pub mod filter {
    use bson::spec::BinarySubtype;
    use bson::{doc, Binary, Bson, Document};
    use uuid::Uuid;

    pub fn uuid_bson(id: Uuid) -> Bson {
        Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: id.as_bytes().to_vec(),
        })
    }

    #[inline]
    pub fn by_id(id: Uuid) -> Document {
        doc! { "_id": uuid_bson(id) }
    }
}
