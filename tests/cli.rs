use assert_fs::TempDir;
use common::command::{bit_commit, run_bit_command};
use common::file::{read, write};
use predicates::prelude::*;

mod common;

fn init_with_commit(dir: &std::path::Path) {
    run_bit_command(dir, &["init"]).assert().success();
    write(dir, "hello.txt", "hello\n");
    run_bit_command(dir, &["add", "."]).assert().success();
    bit_commit(dir, "first").assert().success();
}

#[test]
fn init_reports_the_new_repository() {
    let dir = TempDir::new().unwrap();

    run_bit_command(dir.path(), &["init"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Initialized empty Git repository in"));

    run_bit_command(dir.path(), &["init"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Reinitialized existing Git repository in"));
}

#[test]
fn commands_outside_a_repository_fail() {
    let dir = TempDir::new().unwrap();

    run_bit_command(dir.path(), &["commit", "-m", "nothing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn first_commit_is_reported_as_root() {
    let dir = TempDir::new().unwrap();
    run_bit_command(dir.path(), &["init"]).assert().success();
    write(dir.path(), "hello.txt", "hello\n");
    run_bit_command(dir.path(), &["add"]).assert().success();

    bit_commit(dir.path(), "first")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^\[master \(root-commit\) [0-9a-f]{7}\] first\n$").unwrap());
}

#[test]
fn branches_are_listed_and_duplicates_refused() {
    let dir = TempDir::new().unwrap();
    init_with_commit(dir.path());

    run_bit_command(dir.path(), &["branch", "topic"]).assert().success();
    run_bit_command(dir.path(), &["branch", "topic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    run_bit_command(dir.path(), &["branch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* master").and(predicate::str::contains("topic")));

    run_bit_command(dir.path(), &["checkout", "topic"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Switched to branch 'topic'"));
}

#[test]
fn tags_can_be_created_listed_and_deleted() {
    let dir = TempDir::new().unwrap();
    init_with_commit(dir.path());

    run_bit_command(dir.path(), &["tag", "v1", "-m", "first release"])
        .env("GIT_AUTHOR_NAME", common::AUTHOR_NAME)
        .env("GIT_AUTHOR_EMAIL", common::AUTHOR_EMAIL)
        .assert()
        .success();
    run_bit_command(dir.path(), &["tag"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v1"));
    run_bit_command(dir.path(), &["tag", "v1"]).assert().failure();
    run_bit_command(dir.path(), &["tag", "-d", "v1"]).assert().success();
    run_bit_command(dir.path(), &["tag"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v1").not());
}

#[test]
fn clean_needs_force_to_delete() {
    let dir = TempDir::new().unwrap();
    init_with_commit(dir.path());
    write(dir.path(), "scratch.txt", "scratch\n");

    run_bit_command(dir.path(), &["clean"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would remove scratch.txt"));
    assert!(dir.path().join("scratch.txt").exists());

    run_bit_command(dir.path(), &["clean", "-f"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removing scratch.txt"));
    assert!(!dir.path().join("scratch.txt").exists());
}

#[test]
fn hard_reset_restores_the_working_tree() {
    let dir = TempDir::new().unwrap();
    init_with_commit(dir.path());
    write(dir.path(), "hello.txt", "edited\n");

    run_bit_command(dir.path(), &["reset", "--hard"])
        .assert()
        .success()
        .stdout(predicate::str::contains("HEAD is now at"));

    assert_eq!(read(dir.path(), "hello.txt"), "hello\n");
}

#[test]
fn plumbing_prints_objects() {
    let dir = TempDir::new().unwrap();
    init_with_commit(dir.path());

    run_bit_command(dir.path(), &["hash-object", "hello.txt"])
        .assert()
        .success()
        .stdout("ce013625030ba8dba906f756967f9e9ca394464a\n");

    run_bit_command(dir.path(), &["cat-file", "-p", "HEAD"])
        .assert()
        .success()
        .stdout(
            predicate::str::starts_with("tree ")
                .and(predicate::str::contains("author fake_user <fake_email@email.com>"))
                .and(predicate::str::contains("first")),
        );
}

#[test]
fn clone_derives_the_directory_from_the_url() {
    let dir = TempDir::new().unwrap();
    let origin = dir.path().join("project.git");
    std::fs::create_dir_all(&origin).unwrap();
    init_with_commit(&origin);

    run_bit_command(dir.path(), &["clone", "project.git"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cloning into"));

    assert_eq!(read(&dir.path().join("project"), "hello.txt"), "hello\n");
}
