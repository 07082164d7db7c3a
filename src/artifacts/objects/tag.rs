//! Annotated tag object
//!
//! ```text
//! tag <size>\0
//! object <target-sha>
//! type <target-type>
//! tag <name>
//! tagger <name> <email> <timestamp> <timezone>
//!
//! <message>
//! ```

use crate::artifacts::core::errors::BitError;
use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::object::{Object, Packable, Unpackable, with_header};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use derive_new::new;
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Tag {
    target: ObjectId,
    target_type: ObjectType,
    name: String,
    tagger: Author,
    message: String,
}

impl Tag {
    pub fn target(&self) -> &ObjectId {
        &self.target
    }

    pub fn target_type(&self) -> ObjectType {
        self.target_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tagger(&self) -> &Author {
        &self.tagger
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn render(&self) -> String {
        format!(
            "object {}\ntype {}\ntag {}\ntagger {}\n\n{}",
            self.target,
            self.target_type,
            self.name,
            self.tagger.display(),
            self.message
        )
    }
}

impl Packable for Tag {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        Ok(with_header(self.object_type(), self.render().as_bytes()))
    }
}

impl Unpackable for Tag {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let content = reader
            .bytes()
            .collect::<Result<Vec<u8>, std::io::Error>>()?;
        let content = String::from_utf8(content)
            .map_err(|_| BitError::Corrupt("tag is not valid UTF-8".to_string()))?;

        let (headers, message) = content.split_once("\n\n").unwrap_or((content.as_str(), ""));

        let mut target = None;
        let mut target_type = None;
        let mut name = None;
        let mut tagger = None;

        for line in headers.lines() {
            match line.split_once(' ') {
                Some(("object", oid)) => target = Some(ObjectId::try_from(oid)?),
                Some(("type", kind)) => target_type = Some(ObjectType::try_from(kind)?),
                Some(("tag", tag_name)) => name = Some(tag_name.to_string()),
                Some(("tagger", identity)) => tagger = Some(Author::try_from(identity)?),
                _ => {}
            }
        }

        let missing = |field: &str| BitError::Corrupt(format!("tag is missing its {field}"));

        Ok(Tag {
            target: target.ok_or_else(|| missing("object"))?,
            target_type: target_type.ok_or_else(|| missing("type"))?,
            name: name.ok_or_else(|| missing("name"))?,
            tagger: tagger.ok_or_else(|| missing("tagger"))?,
            message: message.to_string(),
        })
    }
}

impl Object for Tag {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn display(&self) -> String {
        self.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn annotated_tag_reparses() {
        let tagger = Author::try_from("Tag Ger <tg@example.com> 1700000000 -0500").unwrap();
        let tag = Tag::new(
            ObjectId::hash_of(b"blob 0\0"),
            ObjectType::Commit,
            "v1.0".to_string(),
            tagger,
            "release\n".to_string(),
        );

        let mut reader = std::io::Cursor::new(tag.serialize().unwrap());
        ObjectType::parse_header(&mut reader).unwrap();

        assert_eq!(Tag::deserialize(reader).unwrap(), tag);
    }
}
