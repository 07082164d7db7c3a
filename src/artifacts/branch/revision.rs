use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{SymRefName, validate_name};
use crate::artifacts::branch::{
    ANCESTOR_REGEX, HEAD_REF_NAME, HEADS_PREFIX, PARENT_REGEX, REF_ALIASES, REFS_PREFIX,
    REMOTES_PREFIX, TAGS_PREFIX,
};
use crate::artifacts::core::errors::BitError;
use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;

/// Shortest abbreviated object id accepted
const MIN_OID_PREFIX: usize = 4;

/// Represents a revision specification that can be used to identify commits.
///
/// Supports multiple formats:
/// - Ref names: `main`, `feature/new-feature`, `v1.0`, `origin/main`, `refs/heads/main`, `HEAD`
/// - Aliases: `@` (resolves to `HEAD`)
/// - Full or abbreviated OIDs (4-40 hex characters), tried when no ref matches
/// - Parent notation: `<revision>^` (e.g., `main^`, `HEAD^`, `abc123^`)
/// - Ancestor notation: `<revision>~<n>` (e.g., `main~3`, `HEAD~5`, `abc123~2`)
///
/// Short names are looked up in `refs/heads/`, `refs/tags/` and `refs/remotes/`
/// in that order. Tags are peeled to the commit they point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    /// A ref name, or something that may turn out to be an abbreviated OID
    Ref(String),
    /// The Nth ancestor of a revision (e.g., HEAD~3)
    Ancestor(Box<Revision>, usize),
    /// The parent of a revision (e.g., HEAD^)
    Parent(Box<Revision>),
}

impl Revision {
    pub fn resolve(&self, repository: &Repository) -> anyhow::Result<ObjectId> {
        self.resolve_in(repository.database(), repository.refs())
    }

    pub fn resolve_in(&self, database: &Database, refs: &Refs) -> anyhow::Result<ObjectId> {
        match self {
            Revision::Ref(name) => Self::resolve_name(name, database, refs),
            Revision::Parent(base_revision) => {
                Self::resolve_commit_parent(&base_revision.resolve_in(database, refs)?, database)
            }
            Revision::Ancestor(base_revision, generations) => {
                let mut oid = base_revision.resolve_in(database, refs)?;
                for _ in 0..*generations {
                    oid = Self::resolve_commit_parent(&oid, database)?;
                }

                Ok(oid)
            }
        }
    }

    fn resolve_name(name: &str, database: &Database, refs: &Refs) -> anyhow::Result<ObjectId> {
        if name == HEAD_REF_NAME {
            let oid = refs.read_head()?.ok_or_else(|| {
                BitError::NotFound("HEAD does not point at a commit yet".to_string())
            })?;
            return database.peel_to_commit(&oid);
        }

        let mut candidates = Vec::new();
        if name.starts_with(REFS_PREFIX) {
            candidates.push(name.to_string());
        }
        candidates.extend([
            format!("{HEADS_PREFIX}{name}"),
            format!("{TAGS_PREFIX}{name}"),
            format!("{REMOTES_PREFIX}{name}"),
            format!("{REMOTES_PREFIX}{name}/{HEAD_REF_NAME}"),
        ]);

        for candidate in candidates {
            if let Some(oid) = refs.resolve(&SymRefName::new(candidate))? {
                return database.peel_to_commit(&oid);
            }
        }

        if Self::looks_like_oid(name) {
            return Self::resolve_oid(name, database);
        }

        Err(BitError::NotFound(format!("revision '{name}'")).into())
    }

    fn resolve_commit_parent(oid: &ObjectId, database: &Database) -> anyhow::Result<ObjectId> {
        let commit = database.load_commit(oid)?;

        commit.parent().cloned().ok_or_else(|| {
            BitError::NotFound(format!("commit {} has no parent", oid.to_short_oid())).into()
        })
    }

    fn resolve_oid(oid_str: &str, database: &Database) -> anyhow::Result<ObjectId> {
        if oid_str.len() == OBJECT_ID_LENGTH {
            let oid = ObjectId::try_parse(oid_str.to_string())?;
            if !database.has(&oid) {
                return Err(BitError::NotFound(format!("revision '{oid_str}'")).into());
            }
            return database.peel_to_commit(&oid);
        }

        let matches = database.find_objects_by_prefix(oid_str)?;

        // only commits and tags are candidates for a revision
        let candidates = matches
            .into_iter()
            .filter(|oid| {
                database
                    .get_object_type(oid)
                    .is_ok_and(|t| matches!(t, ObjectType::Commit | ObjectType::Tag))
            })
            .collect::<Vec<_>>();

        match candidates.as_slice() {
            [] => Err(BitError::NotFound(format!(
                "ambiguous argument '{oid_str}': unknown revision or path not in the working tree"
            ))
            .into()),
            [oid] => database.peel_to_commit(oid),
            _ => {
                let mut error_msg = format!(
                    "short SHA1 {oid_str} is ambiguous\nhint: The candidates are:"
                );
                for oid in &candidates {
                    let object_type = database.get_object_type(oid)?;
                    error_msg.push_str(&format!("\nhint:   {} {object_type}", oid.to_short_oid()));
                }
                Err(BitError::NotFound(error_msg).into())
            }
        }
    }

    pub fn try_parse(revision: &str) -> anyhow::Result<Revision> {
        let parent_regex = regex::Regex::new(PARENT_REGEX)
            .with_context(|| format!("invalid parent regex: {PARENT_REGEX}"))?;
        let ancestor_regex = regex::Regex::new(ANCESTOR_REGEX)
            .with_context(|| format!("invalid ancestor regex: {ANCESTOR_REGEX}"))?;

        if let Some(caps) = parent_regex.captures(revision) {
            let base_revision = Self::try_parse(&caps[1])?;

            Ok(Revision::Parent(Box::new(base_revision)))
        } else if let Some(caps) = ancestor_regex.captures(revision) {
            let generations: usize = caps[2]
                .parse()
                .with_context(|| format!("failed to parse generations in revision: {revision}"))?;
            let base_revision = Self::try_parse(&caps[1])?;

            Ok(Revision::Ancestor(Box::new(base_revision), generations))
        } else {
            let resolved_name = *REF_ALIASES.get(revision).unwrap_or(&revision);
            if resolved_name != HEAD_REF_NAME {
                validate_name(resolved_name, "revision")?;
            }
            Ok(Revision::Ref(resolved_name.to_string()))
        }
    }

    fn looks_like_oid(s: &str) -> bool {
        (MIN_OID_PREFIX..=OBJECT_ID_LENGTH).contains(&s.len())
            && s.chars().all(|c| c.is_ascii_hexdigit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::commit::{Author, Commit};
    use crate::artifacts::objects::tag::Tag;
    use crate::artifacts::objects::tree::Tree;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    fn name(revision: &Revision) -> &str {
        match revision {
            Revision::Ref(name) => name,
            Revision::Parent(base) | Revision::Ancestor(base, _) => name(base),
        }
    }

    #[rstest]
    #[case("main", "main")]
    #[case("@", "HEAD")]
    #[case("HEAD", "HEAD")]
    #[case("feature/my-feature", "feature/my-feature")]
    #[case("refs/tags/v1.0", "refs/tags/v1.0")]
    #[case("a1b2c3d", "a1b2c3d")]
    fn plain_names_parse_as_refs(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(Revision::try_parse(input).unwrap(), Revision::Ref(expected.to_string()));
    }

    #[test]
    fn suffixes_nest_outermost_last() {
        let parsed = Revision::try_parse("main~3^").unwrap();

        assert_eq!(
            parsed,
            Revision::Parent(Box::new(Revision::Ancestor(
                Box::new(Revision::Ref("main".into())),
                3
            )))
        );
    }

    #[rstest]
    #[case("")]
    #[case("invalid name")]
    #[case("invalid:name")]
    #[case(".invalid")]
    #[case("/invalid")]
    #[case("invalid/")]
    #[case("branch.lock")]
    #[case("feature..name")]
    #[case(".invalid^")]
    #[case(".invalid~5")]
    #[case("invalid@{name")]
    fn malformed_revisions_are_rejected(#[case] input: &str) {
        assert!(Revision::try_parse(input).is_err());
    }

    fn valid_branch_name_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9_/-]*[a-zA-Z0-9]")
            .unwrap()
            .prop_filter("Must not contain invalid patterns", |s| {
                !s.contains("//") && s.len() < 256
            })
    }

    proptest! {
        #[test]
        fn ancestor_suffix_keeps_the_base_name(
            base in valid_branch_name_strategy(),
            generations in 0usize..100
        ) {
            let parsed = Revision::try_parse(&format!("{base}~{generations}")).unwrap();
            prop_assert!(matches!(parsed, Revision::Ancestor(_, g) if g == generations));
            prop_assert_eq!(name(&parsed), base.as_str());
        }

        #[test]
        fn repeated_parent_suffixes_nest(base in valid_branch_name_strategy(), count in 1usize..5) {
            let mut parsed = Revision::try_parse(&format!("{base}{}", "^".repeat(count))).unwrap();
            for _ in 0..count {
                match parsed {
                    Revision::Parent(inner) => parsed = *inner,
                    other => {
                        return Err(TestCaseError::fail(format!("expected a parent, got {other:?}")));
                    }
                }
            }
            prop_assert_eq!(parsed, Revision::Ref(base));
        }

        #[test]
        fn hex_strings_parse_as_refs(oid in "[0-9a-f]{4,40}") {
            prop_assert_eq!(Revision::try_parse(&oid).unwrap(), Revision::Ref(oid.clone()));
        }
    }

    struct History {
        _dir: TempDir,
        database: Database,
        refs: Refs,
        commits: Vec<ObjectId>,
    }

    fn history(length: usize) -> History {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());
        let refs = Refs::new(dir.path().to_path_buf().into_boxed_path());
        let master = crate::artifacts::branch::branch_name::BranchName::try_parse("master".into())
            .unwrap();
        refs.initialize(&master).unwrap();

        let tree = database.store(&Tree::default()).unwrap();
        let author = Author::new("A U Thor".into(), "author@example.com".into());
        let mut commits: Vec<ObjectId> = Vec::new();
        for i in 0..length {
            let parents = commits.last().cloned().into_iter().collect();
            let commit = Commit::new(parents, tree.clone(), author.clone(), format!("c{i}"));
            commits.push(database.store(&commit).unwrap());
        }
        if let Some(tip) = commits.last() {
            refs.update(&SymRefName::head(), None, tip).unwrap();
        }

        History {
            _dir: dir,
            database,
            refs,
            commits,
        }
    }

    #[test]
    fn head_ancestors_walk_first_parents() {
        let h = history(4);

        let resolve = |rev: &str| Revision::try_parse(rev).unwrap().resolve_in(&h.database, &h.refs);
        assert_eq!(resolve("HEAD").unwrap(), h.commits[3]);
        assert_eq!(resolve("master^").unwrap(), h.commits[2]);
        assert_eq!(resolve("@~3").unwrap(), h.commits[0]);

        let error = resolve("HEAD~4").unwrap_err();
        assert!(matches!(error.downcast_ref::<BitError>(), Some(BitError::NotFound(_))));
    }

    #[test]
    fn abbreviated_ids_and_tags_resolve_to_commits() {
        let h = history(2);
        let first = &h.commits[0];

        let by_prefix = Revision::try_parse(&first.as_ref()[..8]).unwrap();
        assert_eq!(by_prefix.resolve_in(&h.database, &h.refs).unwrap(), *first);

        let tag = Tag::new(
            first.clone(),
            ObjectType::Commit,
            "v1".into(),
            Author::new("A U Thor".into(), "author@example.com".into()),
            "first\n".into(),
        );
        let tag_oid = h.database.store(&tag).unwrap();
        h.refs
            .create(&SymRefName::new("refs/tags/v1".into()), &tag_oid)
            .unwrap();

        let by_tag = Revision::try_parse("v1").unwrap();
        assert_eq!(by_tag.resolve_in(&h.database, &h.refs).unwrap(), *first);
    }

    #[test]
    fn unknown_names_are_not_found() {
        let h = history(1);

        let error = Revision::try_parse("nope")
            .unwrap()
            .resolve_in(&h.database, &h.refs)
            .unwrap_err();
        assert!(matches!(error.downcast_ref::<BitError>(), Some(BitError::NotFound(_))));
    }
}
