use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::core::errors::{BitError, BitResult};
use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::artifacts::objects::object::ObjectBox;
use crate::artifacts::objects::object_id::ObjectId;
use std::io::Write;

impl Repository {
    /// Print the content of an object named by id, id prefix or revision
    pub fn cat_file(&self, name: &str) -> BitResult<ObjectBox> {
        let oid = self.object_by_name(name)?;
        let object = self.database().parse_object(&oid)?;

        write!(self.writer(), "{}", object.display())?;

        Ok(object)
    }

    fn object_by_name(&self, name: &str) -> anyhow::Result<ObjectId> {
        let is_hex = name.len() >= 4 && name.chars().all(|c| c.is_ascii_hexdigit());

        if is_hex && name.len() == OBJECT_ID_LENGTH {
            let oid = ObjectId::try_parse(name.to_lowercase())?;
            if !self.database().has(&oid) {
                return Err(BitError::ObjectMissing(oid).into());
            }
            return Ok(oid);
        }
        if is_hex && let [oid] = self.database().find_objects_by_prefix(name)?.as_slice() {
            return Ok(oid.clone());
        }

        Revision::try_parse(name)?.resolve(self)
    }
}
