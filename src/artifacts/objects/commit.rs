//! Git commit object
//!
//! Commits represent snapshots of the repository at specific points in time.
//! They contain:
//! - A tree object ID (directory snapshot)
//! - Parent commit ID(s) (none for a root commit, two or more for a merge)
//! - Author and committer information
//! - Commit message
//!
//! ## Format
//!
//! On disk:
//! ```text
//! commit <size>\0
//! tree <tree-sha>
//! parent <parent-sha>
//! author <name> <email> <timestamp> <timezone>
//! committer <name> <email> <timestamp> <timezone>
//!
//! <commit message>
//! ```

use crate::artifacts::core::errors::BitError;
use crate::artifacts::objects::object::{Object, Packable, Unpackable, with_header};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::io::BufRead;

/// Author, committer or tagger identity
///
/// Contains name, email, and timestamp with timezone information.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Author {
    name: String,
    email: String,
    timestamp: chrono::DateTime<chrono::FixedOffset>,
}

impl Author {
    /// Create a new author with the current timestamp
    pub fn new(name: String, email: String) -> Self {
        Author {
            name,
            email,
            timestamp: chrono::Local::now().fixed_offset(),
        }
    }

    pub fn new_with_timestamp(
        name: String,
        email: String,
        timestamp: chrono::DateTime<chrono::FixedOffset>,
    ) -> Self {
        Author {
            name,
            email,
            timestamp,
        }
    }

    /// Format author name and email for display
    ///
    /// # Returns
    ///
    /// String in format "Name <email@example.com>"
    pub fn display_name(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    /// Format complete author info including timestamp
    ///
    /// # Returns
    ///
    /// String in format "Name <email> timestamp timezone"
    pub fn display(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp.timestamp(),
            self.timestamp.format("%z")
        )
    }

    /// Identity from `GIT_AUTHOR_NAME`/`GIT_AUTHOR_EMAIL`, falling back to the
    /// given configured values
    ///
    /// `GIT_AUTHOR_DATE` (RFC 2822 or `%Y-%m-%d %H:%M:%S %z`) pins the timestamp
    /// when set.
    pub fn load(fallback_name: Option<&str>, fallback_email: Option<&str>) -> anyhow::Result<Self> {
        let name = std::env::var("GIT_AUTHOR_NAME")
            .ok()
            .or_else(|| fallback_name.map(str::to_string))
            .context("author name is not configured: set GIT_AUTHOR_NAME or [user] name")?;
        let email = std::env::var("GIT_AUTHOR_EMAIL")
            .ok()
            .or_else(|| fallback_email.map(str::to_string))
            .context("author email is not configured: set GIT_AUTHOR_EMAIL or [user] email")?;
        let timestamp = std::env::var("GIT_AUTHOR_DATE").ok().and_then(|date_str| {
            chrono::DateTime::parse_from_rfc2822(&date_str)
                .or_else(|_| chrono::DateTime::parse_from_str(&date_str, "%Y-%m-%d %H:%M:%S %z"))
                .ok()
        });

        match timestamp {
            Some(ts) => Ok(Author::new_with_timestamp(name, email, ts)),
            None => Ok(Author::new(name, email)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.timestamp
    }
}

impl TryFrom<&str> for Author {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let invalid = || BitError::Corrupt(format!("invalid identity line '{value}'"));

        // "name <email> timestamp timezone", split from the right
        let parts: Vec<&str> = value.rsplitn(3, ' ').collect();
        if parts.len() < 3 {
            return Err(invalid().into());
        }

        let timezone = parts[0];
        let timestamp = parts[1].parse::<i64>().map_err(|_| invalid())?;
        let name_email_part = parts[2];

        let email_start = name_email_part.find('<').ok_or_else(invalid)?;
        let email_end = name_email_part.rfind('>').ok_or_else(invalid)?;
        if email_end < email_start {
            return Err(invalid().into());
        }

        let name = name_email_part[..email_start].trim().to_string();
        let email = name_email_part[email_start + 1..email_end].to_string();

        let offset = parse_timezone(timezone).ok_or_else(invalid)?;
        let datetime = chrono::DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(invalid)?
            .with_timezone(&offset);

        Ok(Author {
            name,
            email,
            timestamp: datetime,
        })
    }
}

/// Parse a `+hhmm` / `-hhmm` offset
fn parse_timezone(timezone: &str) -> Option<chrono::FixedOffset> {
    if timezone.len() != 5 {
        return None;
    }
    let sign = match &timezone[..1] {
        "+" => 1,
        "-" => -1,
        _ => return None,
    };
    let hours = timezone[1..3].parse::<i32>().ok()?;
    let minutes = timezone[3..5].parse::<i32>().ok()?;

    chrono::FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Slim representation of a commit
///
/// Contains only what history walks need (merge base search, reachability).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SlimCommit {
    pub oid: ObjectId,
    pub parents: Vec<ObjectId>,
    /// Commit timestamp, used to order the walk
    pub timestamp: chrono::DateTime<chrono::FixedOffset>,
}

impl PartialOrd for SlimCommit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SlimCommit {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.oid.cmp(&other.oid))
    }
}

/// Git commit object
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    /// Parent commit IDs (empty for initial commit, multiple for merge commits)
    parents: Vec<ObjectId>,
    tree_oid: ObjectId,
    author: Author,
    committer: Author,
    message: String,
}

impl Commit {
    /// Create a new commit whose committer is the author
    pub fn new(
        parents: Vec<ObjectId>,
        tree_oid: ObjectId,
        author: Author,
        message: String,
    ) -> Self {
        Commit {
            parents,
            tree_oid,
            committer: author.clone(),
            author,
            message,
        }
    }

    /// First line of the commit message
    pub fn short_message(&self) -> String {
        self.message.lines().next().unwrap_or("").to_string()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    pub fn parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn committer(&self) -> &Author {
        &self.committer
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.committer.timestamp()
    }

    fn render(&self) -> String {
        let mut lines = vec![];

        lines.push(format!("tree {}", self.tree_oid.as_ref()));
        for parent in &self.parents {
            lines.push(format!("parent {}", parent.as_ref()));
        }
        lines.push(format!("author {}", self.author.display()));
        lines.push(format!("committer {}", self.committer.display()));
        lines.push(String::new());
        lines.push(self.message.to_string());

        lines.join("\n")
    }
}

impl Packable for Commit {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        Ok(with_header(self.object_type(), self.render().as_bytes()))
    }
}

impl Unpackable for Commit {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let content = reader
            .bytes()
            .collect::<Result<Vec<u8>, std::io::Error>>()?;
        let content = String::from_utf8(content)
            .map_err(|_| BitError::Corrupt("commit is not valid UTF-8".to_string()))?;

        let (headers, message) = content.split_once("\n\n").unwrap_or((content.as_str(), ""));

        let mut tree_oid = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        // unknown headers (encoding, gpgsig and its continuation lines) are skipped
        for line in headers.lines() {
            match line.split_once(' ') {
                Some(("tree", oid)) => tree_oid = Some(ObjectId::try_from(oid)?),
                Some(("parent", oid)) => parents.push(ObjectId::try_from(oid)?),
                Some(("author", identity)) => author = Some(Author::try_from(identity)?),
                Some(("committer", identity)) => committer = Some(Author::try_from(identity)?),
                _ => {}
            }
        }

        let missing = |field: &str| BitError::Corrupt(format!("commit is missing its {field}"));
        let author = author.ok_or_else(|| missing("author"))?;

        Ok(Commit {
            parents,
            tree_oid: tree_oid.ok_or_else(|| missing("tree"))?,
            committer: committer.unwrap_or_else(|| author.clone()),
            author,
            message: message.to_string(),
        })
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    fn display(&self) -> String {
        self.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn author() -> Author {
        Author::try_from("Jane Doe <jane@example.com> 1700000000 +0200").unwrap()
    }

    #[test]
    fn identity_line_keeps_the_utc_instant() {
        let author = author();
        assert_eq!(author.timestamp().timestamp(), 1_700_000_000);
        assert_eq!(author.display(), "Jane Doe <jane@example.com> 1700000000 +0200");
    }

    #[test]
    fn commit_reparses_to_the_same_object() {
        let tree = ObjectId::hash_of(b"tree 0\0");
        let parent = ObjectId::hash_of(b"blob 0\0");
        let commit = Commit::new(vec![parent], tree, author(), "subject\n\nbody\n".to_string());

        let bytes = commit.serialize().unwrap();
        let mut reader = std::io::Cursor::new(bytes.clone());
        ObjectType::parse_header(&mut reader).unwrap();
        let parsed = Commit::deserialize(reader).unwrap();

        assert_eq!(parsed, commit);
        assert_eq!(parsed.serialize().unwrap(), bytes);
        assert_eq!(parsed.short_message(), "subject");
    }

    #[test]
    fn commit_without_tree_is_corrupt() {
        let raw = "author A <a@b> 1 +0000\ncommitter A <a@b> 1 +0000\n\nmsg";
        let error = Commit::deserialize(std::io::Cursor::new(raw)).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<BitError>(),
            Some(BitError::Corrupt(_))
        ));
    }
}
