use crate::areas::repository::Repository;
use crate::artifacts::branch::TAGS_PREFIX;
use crate::artifacts::branch::branch_name::TagName;
use crate::artifacts::core::errors::{BitError, BitResult};
use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use std::io::Write;

impl Repository {
    /// Tag the HEAD commit
    ///
    /// With a message an annotated tag object is stored and the ref points at
    /// it; without one the tag is lightweight. An existing tag is only moved
    /// with `force`. Returns the id the tag ref now holds.
    pub fn tag(&self, name: &str, message: Option<&str>, force: bool) -> BitResult<ObjectId> {
        let tag_name = TagName::try_parse(name.to_string())?;
        let ref_name = tag_name.to_ref_name();

        let head = self.refs().read_head()?.ok_or_else(|| {
            BitError::NotFound(format!("cannot tag '{tag_name}': HEAD has no commit yet"))
        })?;
        let existing = self.refs().resolve(&ref_name)?;
        if existing.is_some() && !force {
            return Err(BitError::AlreadyExists(format!("tag '{tag_name}'")));
        }

        let tag_oid = match message {
            Some(message) => {
                let config = self.config()?;
                let tagger =
                    Author::load(config.user.name.as_deref(), config.user.email.as_deref())?;
                let mut message = message.trim_end().to_string();
                message.push('\n');

                self.database().store(&Tag::new(
                    head.clone(),
                    ObjectType::Commit,
                    tag_name.to_string(),
                    tagger,
                    message,
                ))?
            }
            None => head.clone(),
        };

        match &existing {
            Some(old) if old == &tag_oid => {}
            Some(old) => {
                self.refs().update(&ref_name, Some(old), &tag_oid)?;
                writeln!(self.writer(), "Updated tag '{tag_name}' (was {})", old.to_short_oid())?;
            }
            None => self.refs().create(&ref_name, &tag_oid)?,
        }
        tracing::info!(tag = %tag_name, oid = %tag_oid, annotated = message.is_some(), "tag written");

        Ok(tag_oid)
    }

    /// Tag names in order, with the id each ref holds
    pub fn list_tags(&self) -> BitResult<Vec<(String, ObjectId)>> {
        let tags = self
            .refs()
            .list(TAGS_PREFIX)?
            .into_iter()
            .map(|(name, oid)| (name.short_name().to_string(), oid))
            .collect::<Vec<_>>();

        for (name, _) in &tags {
            writeln!(self.writer(), "{name}")?;
        }

        Ok(tags)
    }

    pub fn delete_tag(&self, name: &str) -> BitResult<ObjectId> {
        let tag_name = TagName::try_parse(name.to_string())?;
        let old = self.refs().delete(&tag_name.to_ref_name(), None)?;

        writeln!(
            self.writer(),
            "Deleted tag '{tag_name}' (was {})",
            old.to_short_oid()
        )?;

        Ok(old)
    }
}
