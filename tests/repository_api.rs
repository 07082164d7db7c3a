use assert_fs::TempDir;
use bit::artifacts::branch::branch_name::SymRefName;
use bit::artifacts::objects::object::ObjectBox;
use bit::{BitError, Repository, ResetMode};
use common::file::{read, write, write_generated_files};
use common::{commit_all, head_of, init_repository, staged_tree};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::PathBuf;

mod common;

const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

fn branch_tip(repository: &Repository, branch: &str) -> Option<String> {
    repository
        .refs()
        .resolve(&SymRefName::new(format!("refs/heads/{branch}")))
        .unwrap()
        .map(|oid| oid.to_string())
}

#[tokio::test]
async fn init_creates_an_unborn_default_branch() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;

    assert!(dir.path().join(".git/objects").is_dir());
    assert!(dir.path().join(".git/refs/heads").is_dir());
    assert!(dir.path().join(".git/config.toml").is_file());
    assert_eq!(
        std::fs::read_to_string(dir.path().join(".git/HEAD")).unwrap(),
        "ref: refs/heads/master\n"
    );
    assert_eq!(repository.current_branch().unwrap(), Some("master".to_string()));
    assert_eq!(head_of(&repository), None);
}

#[tokio::test]
async fn opening_a_plain_directory_is_not_found() {
    let dir = TempDir::new().unwrap();

    let error = Repository::open(dir.path()).unwrap_err();
    assert!(matches!(error, BitError::NotFound(_)));
}

#[tokio::test]
async fn first_commit_of_an_empty_repository_is_a_root_commit() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;

    let oid = repository.commit("init").await.unwrap();

    let commit = repository.database().load_commit(&oid).unwrap();
    assert!(commit.parents().is_empty());
    assert_eq!(commit.tree_oid().to_string(), EMPTY_TREE);
    assert_eq!(commit.short_message(), "init");
    assert_eq!(branch_tip(&repository, "master"), Some(oid.to_string()));
}

#[tokio::test]
async fn commits_chain_onto_the_current_branch() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;

    write(dir.path(), "a.txt", "one\n");
    let first = commit_all(&repository, "first").await;
    write(dir.path(), "a.txt", "two\n");
    let second = commit_all(&repository, "second").await;

    let commit = repository.database().load_commit(&second).unwrap();
    assert_eq!(commit.parents(), &[first]);
    assert_eq!(commit.author().name(), common::AUTHOR_NAME);
}

#[rstest]
#[case("")]
#[case("   \n")]
#[tokio::test]
async fn blank_commit_messages_are_refused(#[case] message: &str) {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;

    let error = repository.commit(message).await.unwrap_err();
    assert!(matches!(error, BitError::InvalidName(_)));
}

#[tokio::test]
async fn add_all_reports_what_changed() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;
    write(dir.path(), "keep.txt", "keep\n");
    write(dir.path(), "edit.txt", "before\n");
    write(dir.path(), "drop.txt", "drop\n");
    commit_all(&repository, "base").await;

    write(dir.path(), "edit.txt", "after\n");
    std::fs::remove_file(dir.path().join("drop.txt")).unwrap();
    write(dir.path(), "new/file.txt", "new\n");

    let diff = repository.add_all().await.unwrap();
    assert_eq!(diff.added, vec![PathBuf::from("new/file.txt")]);
    assert_eq!(diff.modified, vec![PathBuf::from("edit.txt")]);
    assert_eq!(diff.deleted, vec![PathBuf::from("drop.txt")]);
}

#[tokio::test]
async fn hard_reset_then_staging_reproduces_the_target_tree() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;
    let files = write_generated_files(dir.path(), 4);
    write(dir.path(), "nested/deep/file.txt", "deep\n");
    let target = commit_all(&repository, "target").await;
    let target_tree = repository.database().load_commit(&target).unwrap().tree_oid().clone();

    write(dir.path(), "nested/deep/file.txt", "changed\n");
    std::fs::remove_file(&files[0].path).unwrap();
    write(dir.path(), "extra.txt", "extra\n");
    commit_all(&repository, "later").await;
    write(dir.path(), "nested/deep/file.txt", "uncommitted\n");

    repository.reset_to(&target.to_string(), ResetMode::Hard).await.unwrap();
    repository.add_all().await.unwrap();

    assert_eq!(staged_tree(&repository).await, target_tree);
    assert_eq!(read(dir.path(), "nested/deep/file.txt"), "deep\n");
    assert!(!dir.path().join("extra.txt").exists());
    assert_eq!(head_of(&repository), Some(target));
}

#[tokio::test]
async fn soft_and_mixed_resets_keep_the_working_tree() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;
    write(dir.path(), "a.txt", "one\n");
    let first = commit_all(&repository, "first").await;
    write(dir.path(), "b.txt", "two\n");
    let second = commit_all(&repository, "second").await;
    let second_tree = repository.database().load_commit(&second).unwrap().tree_oid().clone();
    let first_tree = repository.database().load_commit(&first).unwrap().tree_oid().clone();

    repository.reset_to("HEAD~1", ResetMode::Soft).await.unwrap();
    assert_eq!(head_of(&repository), Some(first.clone()));
    assert_eq!(staged_tree(&repository).await, second_tree);

    repository.reset(ResetMode::Mixed).await.unwrap();
    assert_eq!(staged_tree(&repository).await, first_tree);
    assert_eq!(read(dir.path(), "b.txt"), "two\n");
}

#[tokio::test]
async fn branches_are_isolated() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;
    write(dir.path(), "shared.txt", "shared\n");
    let base = commit_all(&repository, "base").await;

    repository.create_branch("feature").unwrap();
    repository.checkout_branch("feature").await.unwrap();
    assert_eq!(repository.current_branch().unwrap(), Some("feature".to_string()));

    write(dir.path(), "feature.txt", "feature\n");
    let feature = commit_all(&repository, "feature work").await;

    repository.checkout_branch("master").await.unwrap();
    assert_eq!(branch_tip(&repository, "master"), Some(base.to_string()));
    assert_eq!(branch_tip(&repository, "feature"), Some(feature.to_string()));
    assert!(!dir.path().join("feature.txt").exists());
    assert_eq!(read(dir.path(), "shared.txt"), "shared\n");
}

#[tokio::test]
async fn creating_a_branch_twice_fails() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;
    repository.commit("init").await.unwrap();

    repository.create_branch("topic").unwrap();
    let error = repository.create_branch("topic").unwrap_err();

    assert!(matches!(error, BitError::AlreadyExists(_)));
}

#[rstest]
#[case("bad..name")]
#[case("has space")]
#[case("HEAD")]
#[case("trailing.lock")]
#[tokio::test]
async fn invalid_branch_names_are_refused(#[case] name: &str) {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;
    repository.commit("init").await.unwrap();

    let error = repository.create_branch(name).unwrap_err();
    assert!(matches!(error, BitError::InvalidName(_)));
}

#[tokio::test]
async fn checkout_refuses_to_overwrite_local_changes_unless_forced() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;
    write(dir.path(), "file.txt", "base\n");
    commit_all(&repository, "base").await;
    repository.create_branch("other").unwrap();
    repository.checkout_branch("other").await.unwrap();
    write(dir.path(), "file.txt", "other\n");
    commit_all(&repository, "other").await;
    repository.checkout_branch("master").await.unwrap();

    write(dir.path(), "file.txt", "local edit\n");
    let error = repository.checkout_branch("other").await.unwrap_err();
    assert!(matches!(error, BitError::Conflict(_)));
    assert_eq!(repository.current_branch().unwrap(), Some("master".to_string()));
    assert_eq!(read(dir.path(), "file.txt"), "local edit\n");

    repository.checkout("other", true).await.unwrap();
    assert_eq!(repository.current_branch().unwrap(), Some("other".to_string()));
    assert_eq!(read(dir.path(), "file.txt"), "other\n");
}

/// `refs/remotes/origin/feature` changes `file.txt`; no local `feature` exists
async fn repository_with_remote_only_branch(dir: &std::path::Path) -> Repository {
    let repository = init_repository(dir).await;
    write(dir, "file.txt", "base\n");
    commit_all(&repository, "base").await;
    repository.create_branch("feature").unwrap();
    repository.checkout_branch("feature").await.unwrap();
    write(dir, "file.txt", "feature\n");
    let feature = commit_all(&repository, "feature").await;
    repository.checkout_branch("master").await.unwrap();

    let local = SymRefName::new("refs/heads/feature".to_string());
    repository.refs().delete(&local, Some(&feature)).unwrap();
    repository
        .refs()
        .create(&SymRefName::new("refs/remotes/origin/feature".to_string()), &feature)
        .unwrap();

    repository
}

#[tokio::test]
async fn checking_out_a_remote_branch_creates_a_tracking_branch() {
    let dir = TempDir::new().unwrap();
    let repository = repository_with_remote_only_branch(dir.path()).await;

    repository.checkout_branch("feature").await.unwrap();

    assert_eq!(repository.current_branch().unwrap(), Some("feature".to_string()));
    assert_eq!(read(dir.path(), "file.txt"), "feature\n");
    let config = repository.config().unwrap();
    assert_eq!(config.branch["feature"].remote, "origin");
}

#[tokio::test]
async fn a_refused_checkout_does_not_create_the_tracking_branch() {
    let dir = TempDir::new().unwrap();
    let repository = repository_with_remote_only_branch(dir.path()).await;
    write(dir.path(), "file.txt", "local edit\n");

    let error = repository.checkout_branch("feature").await.unwrap_err();

    assert!(matches!(error, BitError::Conflict(_)));
    assert_eq!(branch_tip(&repository, "feature"), None);
    assert!(!repository.config().unwrap().branch.contains_key("feature"));
    assert_eq!(repository.current_branch().unwrap(), Some("master".to_string()));
    assert_eq!(read(dir.path(), "file.txt"), "local edit\n");
}

#[tokio::test]
async fn clean_removes_empty_untracked_directories() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;
    write(dir.path(), "tracked.txt", "tracked\n");
    commit_all(&repository, "base").await;
    std::fs::create_dir_all(dir.path().join("empty/nested")).unwrap();

    assert_eq!(repository.clean(false).await.unwrap(), vec![PathBuf::from("empty")]);
    assert!(dir.path().join("empty/nested").is_dir());

    repository.clean(true).await.unwrap();
    assert!(!dir.path().join("empty").exists());
}

#[tokio::test]
async fn checking_out_a_revision_detaches_head() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;
    write(dir.path(), "a.txt", "one\n");
    let first = commit_all(&repository, "first").await;
    write(dir.path(), "a.txt", "two\n");
    commit_all(&repository, "second").await;

    let oid = repository.checkout("HEAD^", false).await.unwrap();

    assert_eq!(oid, first);
    assert_eq!(repository.current_branch().unwrap(), None);
    assert_eq!(read(dir.path(), "a.txt"), "one\n");
}

#[tokio::test]
async fn clean_is_a_dry_run_unless_forced() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;
    write(dir.path(), ".gitignore", "*.log\n");
    write(dir.path(), "tracked.txt", "tracked\n");
    commit_all(&repository, "base").await;

    write(dir.path(), "scratch.txt", "scratch\n");
    write(dir.path(), "build/out.bin", "out\n");
    write(dir.path(), "debug.log", "log\n");
    let expected = vec![PathBuf::from("build"), PathBuf::from("scratch.txt")];

    let reported = repository.clean(false).await.unwrap();
    assert_eq!(reported, expected);
    assert!(dir.path().join("scratch.txt").exists());
    assert!(dir.path().join("build/out.bin").exists());

    let removed = repository.clean(true).await.unwrap();
    assert_eq!(removed, expected);
    assert!(!dir.path().join("scratch.txt").exists());
    assert!(!dir.path().join("build").exists());
    assert!(dir.path().join("debug.log").exists());
    assert!(dir.path().join("tracked.txt").exists());
}

#[tokio::test]
async fn tags_exist_once_unless_forced() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;
    let head = repository.commit("init").await.unwrap();

    let lightweight = repository.tag("v1", None, false).unwrap();
    assert_eq!(lightweight, head);

    let error = repository.tag("v1", Some("again"), false).unwrap_err();
    assert!(matches!(error, BitError::AlreadyExists(_)));

    let annotated = repository.tag("v1", Some("release one"), true).unwrap();
    match repository.database().parse_object(&annotated).unwrap() {
        ObjectBox::Tag(tag) => {
            assert_eq!(tag.target(), &head);
            assert_eq!(tag.name(), "v1");
            assert_eq!(tag.message(), "release one\n");
        }
        other => panic!("expected a tag object, got {:?}", other.object_type()),
    }

    repository.tag("v2", None, false).unwrap();
    let names = repository
        .list_tags()
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["v1".to_string(), "v2".to_string()]);

    assert_eq!(repository.delete_tag("v1").unwrap(), annotated);
    assert!(matches!(
        repository.delete_tag("v1").unwrap_err(),
        BitError::NotFound(_)
    ));
}

#[tokio::test]
async fn tagging_an_unborn_branch_is_not_found() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;

    let error = repository.tag("v1", None, false).unwrap_err();
    assert!(matches!(error, BitError::NotFound(_)));
}

#[tokio::test]
async fn hash_object_matches_cat_file() {
    let dir = TempDir::new().unwrap();
    let repository = init_repository(dir.path()).await;
    write(dir.path(), "hello.txt", "hello\n");

    let oid = repository.hash_object("hello.txt", false).unwrap();
    assert_eq!(oid.to_string(), "ce013625030ba8dba906f756967f9e9ca394464a");
    assert!(!repository.database().has(&oid));

    repository.hash_object("hello.txt", true).unwrap();
    match repository.cat_file(&oid.to_string()[..8]).unwrap() {
        ObjectBox::Blob(blob) => assert_eq!(blob.content().as_ref(), b"hello\n"),
        other => panic!("expected a blob, got {:?}", other.object_type()),
    }
}
