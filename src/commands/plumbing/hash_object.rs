use crate::areas::repository::Repository;
use crate::artifacts::core::errors::BitResult;
use crate::artifacts::objects::object::with_header;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use std::io::Write;
use std::path::Path;

impl Repository {
    /// Blob id of a file, storing the blob when `write` is set
    pub fn hash_object(&self, path: impl AsRef<Path>, write: bool) -> BitResult<ObjectId> {
        let data = self.workspace().read_file(path.as_ref())?;

        let oid = if write {
            self.database().put(ObjectType::Blob, &data)?
        } else {
            ObjectId::hash_of(&with_header(ObjectType::Blob, &data))
        };

        writeln!(self.writer(), "{oid}")?;

        Ok(oid)
    }
}
