use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};

#[derive(Debug)]
pub struct ConflictMessage {
    pub header: String,
    pub footer: &'static str,
}

impl ConflictMessage {
    /// Message for a conflict raised while running `operation` (checkout, merge)
    pub fn for_operation(conflict_type: &ConflictType, operation: &str) -> Self {
        match conflict_type {
            ConflictType::StaleFile => Self {
                header: format!(
                    "Your local changes to the following files would be overwritten by {operation}:"
                ),
                footer: "Please commit your changes or stash them before you switch branches.",
            },
            ConflictType::StaleDirectory => Self {
                header: "Updating the following directories would lose untracked files in them:"
                    .to_string(),
                footer: "",
            },
            ConflictType::UntrackedOverwritten => Self {
                header: format!(
                    "The following untracked working tree files would be overwritten by {operation}:"
                ),
                footer: "Please move or remove them before you switch branches.",
            },
            ConflictType::UntrackedRemoved => Self {
                header: format!(
                    "The following untracked working tree files would be removed by {operation}:"
                ),
                footer: "Please move or remove them before you switch branches.",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConflictType {
    StaleFile,
    StaleDirectory,
    UntrackedOverwritten,
    UntrackedRemoved,
}

impl ConflictType {
    pub fn get_conflict_type(
        stat: Option<&EntryMetadata>,
        entry: Option<&IndexEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> ConflictType {
        if entry.is_some() {
            ConflictType::StaleFile
        } else if let Some(stat) = stat
            && stat.mode.is_tree()
        {
            ConflictType::StaleDirectory
        } else if new_entry.is_some() {
            ConflictType::UntrackedOverwritten
        } else {
            ConflictType::UntrackedRemoved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::object_id::ObjectId;
    use pretty_assertions::assert_eq;

    #[test]
    fn tracked_paths_are_stale_files() {
        let entry = IndexEntry::default();
        assert_eq!(
            ConflictType::get_conflict_type(None, Some(&entry), None),
            ConflictType::StaleFile
        );
    }

    #[test]
    fn untracked_paths_depend_on_the_target() {
        let new_entry = DatabaseEntry::new(ObjectId::zero(), EntryMode::File(FileMode::Regular));
        let dir_stat = EntryMetadata {
            mode: EntryMode::Directory,
            ..Default::default()
        };

        assert_eq!(
            ConflictType::get_conflict_type(Some(&dir_stat), None, Some(&new_entry)),
            ConflictType::StaleDirectory
        );
        assert_eq!(
            ConflictType::get_conflict_type(None, None, Some(&new_entry)),
            ConflictType::UntrackedOverwritten
        );
        assert_eq!(
            ConflictType::get_conflict_type(None, None, None),
            ConflictType::UntrackedRemoved
        );
    }

    #[test]
    fn messages_name_the_operation() {
        let message = ConflictMessage::for_operation(&ConflictType::StaleFile, "merge");
        assert!(message.header.ends_with("overwritten by merge:"));
    }
}
