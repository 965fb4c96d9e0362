//! Integration tests for reading changes with git2 and writing them with the git CLI.

mod common;

use common::{TestRepo, git_available};

use groupcommit::error::RepoError;
use groupcommit::git::{ChangeKind, DiffSource, Git2DiffSource, GitCliGateway, RepositoryGateway};

fn paths(items: &[&str]) -> Vec<String> {
    items.iter().map(|p| p.to_string()).collect()
}

fn base_repo() -> TestRepo {
    let repo = TestRepo::new();
    repo.commit_files(
        &[("src/lib.rs", "pub fn one() {}\n"), ("README.md", "# demo\n")],
        "Initial commit",
    );
    repo
}

#[tokio::test]
async fn test_lists_every_kind_of_change_sorted() {
    let repo = base_repo();
    repo.write("src/lib.rs", "pub fn one() -> u8 { 1 }\n");
    repo.remove("README.md");
    repo.write("src/new.rs", "pub fn two() {}\n");
    repo.write("notes/todo.txt", "later\n");

    let source = Git2DiffSource::discover(repo.path()).unwrap();
    let files = source.list_changed_files().await.unwrap();

    assert_eq!(
        files,
        paths(&["README.md", "notes/todo.txt", "src/lib.rs", "src/new.rs"])
    );
}

#[tokio::test]
async fn test_diffs_follow_requested_order_and_skip_clean_paths() {
    let repo = base_repo();
    repo.write("src/lib.rs", "pub fn one() -> u8 { 1 }\n");
    repo.remove("README.md");
    repo.write("staged.rs", "pub struct Staged;\n");
    repo.add("staged.rs");

    let source = Git2DiffSource::discover(repo.path()).unwrap();
    let diffs = source
        .get_diffs(&paths(&["staged.rs", "unchanged.rs", "README.md", "src/lib.rs"]))
        .await
        .unwrap();

    let summary: Vec<(&str, ChangeKind)> = diffs.iter().map(|d| (d.path.as_str(), d.kind)).collect();
    assert_eq!(
        summary,
        vec![
            ("staged.rs", ChangeKind::Added),
            ("README.md", ChangeKind::Deleted),
            ("src/lib.rs", ChangeKind::Modified),
        ]
    );
    assert!(diffs[0].content.contains("+pub struct Staged;"));
    assert!(diffs[1].content.contains("-# demo"));
    assert!(diffs[2].content.contains("+pub fn one() -> u8 { 1 }"));
    assert!(diffs.iter().all(|d| !d.truncated));
}

#[tokio::test]
async fn test_discover_from_subdirectory() {
    let repo = base_repo();
    repo.write("src/lib.rs", "changed\n");

    let source = Git2DiffSource::discover(&repo.path().join("src")).unwrap();
    assert_eq!(
        source.root().canonicalize().unwrap(),
        repo.path().canonicalize().unwrap()
    );
    assert_eq!(source.list_changed_files().await.unwrap(), paths(&["src/lib.rs"]));
}

#[tokio::test]
async fn test_discover_outside_repository_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = Git2DiffSource::discover(dir.path()).unwrap_err();
    assert!(matches!(err, RepoError::OpenRepository(_)));
}

#[tokio::test]
async fn test_revert_removes_staged_new_file() {
    let repo = base_repo();
    repo.write("staged.rs", "pub struct Staged;\n");
    repo.add("staged.rs");
    repo.write("README.md", "# changed\n");

    let source = Git2DiffSource::discover(repo.path()).unwrap();
    source.revert("staged.rs").await.unwrap();
    source.revert("README.md").await.unwrap();

    assert!(!repo.path().join("staged.rs").exists());
    assert_eq!(repo.read("README.md"), "# demo\n");
    assert!(source.list_changed_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_gateway_stages_and_commits_only_given_paths() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let repo = base_repo();
    repo.write("src/lib.rs", "pub fn one() -> u8 { 1 }\n");
    repo.write("README.md", "# demo\n\nMore.\n");

    let gateway = GitCliGateway::new(repo.path()).unwrap();
    gateway.stage(&paths(&["src/lib.rs"])).await.unwrap();
    let sha = gateway.commit("Return one", &paths(&["src/lib.rs"])).await.unwrap();

    let head = repo.repo.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(sha, head.id().to_string());
    assert_eq!(repo.head_paths(), paths(&["src/lib.rs"]));

    let source = Git2DiffSource::discover(repo.path()).unwrap();
    assert_eq!(source.list_changed_files().await.unwrap(), paths(&["README.md"]));
}

#[tokio::test]
async fn test_gateway_stages_deletions() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let repo = base_repo();
    repo.remove("README.md");

    let gateway = GitCliGateway::new(repo.path()).unwrap();
    gateway.stage(&paths(&["README.md"])).await.unwrap();
    gateway.commit("Drop readme", &paths(&["README.md"])).await.unwrap();

    let head = repo.repo.head().unwrap().peel_to_commit().unwrap();
    assert!(head.tree().unwrap().get_name("README.md").is_none());
}

#[tokio::test]
async fn test_gateway_rejects_empty_message_and_empty_index() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let repo = base_repo();
    repo.write("README.md", "# changed\n");
    let gateway = GitCliGateway::new(repo.path()).unwrap();

    assert!(matches!(
        gateway.commit("  ", &paths(&["README.md"])).await,
        Err(RepoError::EmptyMessage)
    ));
    assert!(matches!(
        gateway.stage(&[]).await,
        Err(RepoError::NoPaths)
    ));
    assert!(matches!(
        gateway.commit("No paths", &[]).await,
        Err(RepoError::NoPaths)
    ));
    assert!(matches!(
        gateway.commit("Nothing staged", &paths(&["README.md"])).await,
        Err(RepoError::NothingToCommit)
    ));
}

#[tokio::test]
async fn test_gateway_unstage_keeps_working_tree() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let repo = base_repo();
    repo.write("README.md", "# changed\n");
    let gateway = GitCliGateway::new(repo.path()).unwrap();

    gateway.stage(&paths(&["README.md"])).await.unwrap();
    gateway.unstage(&paths(&["README.md"])).await.unwrap();

    assert_eq!(repo.read("README.md"), "# changed\n");
    assert!(matches!(
        gateway.commit("Should not commit", &paths(&["README.md"])).await,
        Err(RepoError::NothingToCommit)
    ));
}

#[tokio::test]
async fn test_gateway_unstage_before_first_commit() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let repo = TestRepo::new();
    repo.write("first.rs", "fn main() {}\n");
    let gateway = GitCliGateway::new(repo.path()).unwrap();

    gateway.stage(&paths(&["first.rs"])).await.unwrap();
    gateway.unstage(&paths(&["first.rs"])).await.unwrap();

    let index = repo.repo.index().unwrap();
    assert!(index.get_path(std::path::Path::new("first.rs"), 0).is_none());
    assert!(repo.path().join("first.rs").exists());
}

#[tokio::test]
async fn test_gateway_commit_leaves_other_staged_files_in_the_index() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let repo = base_repo();
    repo.write("src/lib.rs", "pub fn one() -> u8 { 1 }\n");
    repo.write("README.md", "# staged elsewhere\n");
    repo.add("README.md");

    let gateway = GitCliGateway::new(repo.path()).unwrap();
    gateway.stage(&paths(&["src/lib.rs"])).await.unwrap();
    gateway
        .commit("Return one", &paths(&["src/lib.rs"]))
        .await
        .unwrap();

    assert_eq!(repo.head_paths(), paths(&["src/lib.rs"]));
    let mut index = repo.repo.index().unwrap();
    index.read(true).unwrap();
    let head_tree = repo.repo.head().unwrap().peel_to_tree().unwrap();
    let staged = repo
        .repo
        .diff_tree_to_index(Some(&head_tree), Some(&index), None)
        .unwrap();
    assert_eq!(staged.deltas().len(), 1);
    assert_eq!(
        staged.deltas().next().unwrap().new_file().path(),
        Some(std::path::Path::new("README.md"))
    );
}

#[tokio::test]
async fn test_gateway_commit_of_unchanged_path_is_nothing_to_commit() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let repo = base_repo();
    repo.write("README.md", "# staged elsewhere\n");
    repo.add("README.md");

    let gateway = GitCliGateway::new(repo.path()).unwrap();
    gateway.stage(&paths(&["src/lib.rs"])).await.unwrap();
    assert!(matches!(
        gateway.commit("Nothing here", &paths(&["src/lib.rs"])).await,
        Err(RepoError::NothingToCommit)
    ));
    assert_eq!(repo.log_messages(), vec!["Initial commit"]);
}

#[tokio::test]
async fn test_worktree_rename_reports_its_source_path() {
    let repo = base_repo();
    std::fs::rename(repo.path().join("src/lib.rs"), repo.path().join("src/core.rs")).unwrap();

    let source = Git2DiffSource::discover(repo.path()).unwrap();
    let listed = source.list_changed_files().await.unwrap();
    let diffs = source.get_diffs(&listed).await.unwrap();

    assert_eq!(listed, paths(&["src/core.rs"]));
    assert_eq!(diffs[0].kind, ChangeKind::Renamed);
    assert_eq!(diffs[0].old_path.as_deref(), Some("src/lib.rs"));
}

#[tokio::test]
async fn test_gateway_first_commit_with_paths() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let repo = TestRepo::new();
    repo.write("first.rs", "fn main() {}\n");
    repo.write("later.rs", "fn later() {}\n");
    let gateway = GitCliGateway::new(repo.path()).unwrap();

    gateway.stage(&paths(&["first.rs"])).await.unwrap();
    gateway
        .commit("First", &paths(&["first.rs"]))
        .await
        .unwrap();

    assert_eq!(repo.log_messages(), vec!["First"]);
    assert_eq!(repo.head_paths(), paths(&["first.rs"]));
}
