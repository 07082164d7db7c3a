use assert_fs::TempDir;
use bit::artifacts::branch::branch_name::SymRefName;
use bit::artifacts::transport::daemon::Daemon;
use bit::{BitError, Credentials, Repository};
use common::file::{read, write};
use common::{commit_all, configure_author, head_of, init_repository};
use pretty_assertions::assert_eq;
use std::path::Path;

mod common;

fn resolve(repository: &Repository, name: &str) -> Option<String> {
    repository
        .refs()
        .resolve(&SymRefName::new(name.to_string()))
        .unwrap()
        .map(|oid| oid.to_string())
}

/// An `origin` repository with one commit on `master`
async fn origin_in(root: &Path) -> Repository {
    let dir = root.join("origin");
    std::fs::create_dir_all(&dir).unwrap();
    let repository = init_repository(&dir).await;
    write(&dir, "README.md", "# origin\n");
    write(&dir, "src/lib.rs", "pub fn answer() -> u32 { 42 }\n");
    commit_all(&repository, "initial").await;

    repository
}

async fn clone_of(root: &Path, name: &str) -> Repository {
    let repository = Repository::clone(
        &root.join("origin").display().to_string(),
        root.join(name),
        &Credentials::NoAuth,
    )
    .await
    .unwrap();
    configure_author(&repository);

    repository
}

#[tokio::test]
async fn clone_checks_out_the_remote_head() {
    let root = TempDir::new().unwrap();
    let origin = origin_in(root.path()).await;
    let head = head_of(&origin).unwrap().to_string();

    let clone = clone_of(root.path(), "clone").await;

    assert_eq!(read(&root.path().join("clone"), "src/lib.rs"), "pub fn answer() -> u32 { 42 }\n");
    assert_eq!(clone.current_branch().unwrap(), Some("master".to_string()));
    assert_eq!(resolve(&clone, "refs/heads/master"), Some(head.clone()));
    assert_eq!(resolve(&clone, "refs/remotes/origin/master"), Some(head));

    let config = clone.config().unwrap();
    let upstream = &config.branch["master"];
    assert_eq!(upstream.remote, "origin");
    assert_eq!(upstream.merge, "refs/heads/master");
}

#[tokio::test]
async fn cloning_an_empty_repository_leaves_an_unborn_branch() {
    let root = TempDir::new().unwrap();
    init_repository(&root.path().join("origin")).await;

    let clone = clone_of(root.path(), "clone").await;

    assert_eq!(head_of(&clone), None);
    assert_eq!(clone.current_branch().unwrap(), Some("master".to_string()));
}

#[tokio::test]
async fn clone_refuses_a_non_empty_destination() {
    let root = TempDir::new().unwrap();
    origin_in(root.path()).await;
    write(&root.path().join("taken"), "file.txt", "mine\n");

    let error = Repository::clone(
        &root.path().join("origin").display().to_string(),
        root.path().join("taken"),
        &Credentials::NoAuth,
    )
    .await
    .unwrap_err();

    assert!(matches!(error, BitError::AlreadyExists(_)));
    assert_eq!(read(&root.path().join("taken"), "file.txt"), "mine\n");
}

#[tokio::test]
async fn cloning_a_missing_repository_leaves_nothing_behind() {
    let root = TempDir::new().unwrap();

    let error = Repository::clone(
        &root.path().join("nowhere").display().to_string(),
        root.path().join("clone"),
        &Credentials::NoAuth,
    )
    .await
    .unwrap_err();

    assert!(matches!(error, BitError::NotFound(_)));
    assert!(!root.path().join("clone").exists());
}

#[tokio::test]
async fn fetch_only_moves_tracking_refs_and_pull_merges_them() {
    let root = TempDir::new().unwrap();
    let origin = origin_in(root.path()).await;
    let clone = clone_of(root.path(), "clone").await;
    let before = head_of(&clone).unwrap().to_string();

    write(&root.path().join("origin"), "CHANGELOG.md", "- first release\n");
    let update = commit_all(&origin, "changelog").await.to_string();
    origin.tag("v1.0", Some("first release"), false).unwrap();

    let fetched = clone.fetch().await.unwrap();
    assert!(
        fetched
            .updated_refs
            .iter()
            .any(|(name, oid)| name == "refs/remotes/origin/master" && oid.to_string() == update)
    );
    assert_eq!(resolve(&clone, "refs/remotes/origin/master"), Some(update.clone()));
    assert_eq!(resolve(&clone, "refs/heads/master"), Some(before));
    assert!(resolve(&clone, "refs/tags/v1.0").is_some());
    assert!(!root.path().join("clone/CHANGELOG.md").exists());

    let pulled = clone.pull().await.unwrap();
    assert_eq!(pulled.to_string(), update);
    assert_eq!(read(&root.path().join("clone"), "CHANGELOG.md"), "- first release\n");
}

#[tokio::test]
async fn pushing_to_a_diverged_remote_needs_force() {
    let root = TempDir::new().unwrap();
    let origin = origin_in(root.path()).await;
    let alice = clone_of(root.path(), "alice").await;
    let bob = clone_of(root.path(), "bob").await;

    write(&root.path().join("alice"), "alice.txt", "alice\n");
    let alice_head = commit_all(&alice, "alice").await;
    alice.push(false).await.unwrap();
    assert_eq!(head_of(&origin), Some(alice_head.clone()));
    assert_eq!(
        resolve(&alice, "refs/remotes/origin/master"),
        Some(alice_head.to_string())
    );

    write(&root.path().join("bob"), "bob.txt", "bob\n");
    let bob_head = commit_all(&bob, "bob").await;

    let error = bob.push(false).await.unwrap_err();
    assert!(matches!(error, BitError::Rejected(_)));
    assert_eq!(head_of(&origin), Some(alice_head));

    bob.push(true).await.unwrap();
    assert_eq!(head_of(&origin), Some(bob_head));
}

#[tokio::test]
async fn pushing_with_nothing_new_is_a_no_op() {
    let root = TempDir::new().unwrap();
    let origin = origin_in(root.path()).await;
    let clone = clone_of(root.path(), "clone").await;
    let before = head_of(&origin);

    clone.push(false).await.unwrap();

    assert_eq!(head_of(&origin), before);
}

#[tokio::test]
async fn tags_are_pushed_once() {
    let root = TempDir::new().unwrap();
    let origin = origin_in(root.path()).await;
    let alice = clone_of(root.path(), "alice").await;
    let bob = clone_of(root.path(), "bob").await;

    let tag = alice.tag("v1", Some("first"), false).unwrap();
    alice.push_tag("v1").await.unwrap();
    assert_eq!(resolve(&origin, "refs/tags/v1"), Some(tag.to_string()));

    bob.tag("v1", None, false).unwrap();
    let error = bob.push_tag("v1").await.unwrap_err();
    assert!(matches!(error, BitError::Rejected(_)));
    assert_eq!(resolve(&origin, "refs/tags/v1"), Some(tag.to_string()));

    let error = bob.push_tag("missing").await.unwrap_err();
    assert!(matches!(error, BitError::NotFound(_)));
}

#[tokio::test]
async fn the_daemon_serves_clones_to_token_holders() {
    let root = TempDir::new().unwrap();
    let origin = origin_in(root.path()).await;
    let work = TempDir::new().unwrap();

    let listener = Daemon::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(Daemon::new(root.path().to_path_buf(), Some("s3cret".to_string())).run(listener));
    let url = format!("bit://127.0.0.1:{port}/origin");

    let error = Repository::clone(&url, work.path().join("denied"), &Credentials::Token("nope".into()))
        .await
        .unwrap_err();
    assert!(matches!(error, BitError::TransportFailure(_)));
    assert!(!work.path().join("denied").exists());

    let clone = Repository::clone(&url, work.path().join("clone"), &Credentials::Token("s3cret".into()))
        .await
        .unwrap();
    configure_author(&clone);
    assert_eq!(head_of(&clone), head_of(&origin));
    assert_eq!(read(&work.path().join("clone"), "README.md"), "# origin\n");

    write(&work.path().join("clone"), "daemon.txt", "over tcp\n");
    let pushed = commit_all(&clone, "over the daemon").await;
    clone.push(false).await.unwrap();
    assert_eq!(head_of(&origin), Some(pushed));
}
