//! End-to-end runner scenarios over the in-memory schema admin.

use assert_matches::assert_matches;
use catena_client::memory::{AdminEvent, MemoryAdmin, FAIL_MARKER};
use catena_core::{Direction, Migration, MigrationDir, MigrationRunner, RunnerError, SchemaOp};

fn migration(id: &str, prev: Option<&str>, up: &str, down: &str) -> Migration {
    Migration {
        id: id.into(),
        prev_id: prev.map(Into::into),
        description: Some(id.to_string()),
        up: SchemaOp::Ddl(vec![up.to_string()]),
        down: SchemaOp::Ddl(vec![down.to_string()]),
    }
}

fn users_posts_set() -> Vec<Migration> {
    vec![
        migration("1_users", None, "CREATE TABLE users (id INT64)", "DROP TABLE users"),
        migration("2_posts", Some("1_users"), "CREATE TABLE posts (id INT64)", "DROP TABLE posts"),
        migration("3_index", Some("2_posts"), "CREATE INDEX posts_by_id ON posts (id)", "DROP INDEX posts_by_id"),
    ]
}

fn ddl_event(statement: &str) -> AdminEvent {
    AdminEvent::Ddl(vec![statement.to_string()])
}

fn status_event(id: &str, applied: bool) -> AdminEvent {
    AdminEvent::Status { id: id.to_string(), applied }
}

#[tokio::test]
async fn full_lifecycle_interleaves_ddl_and_status_writes() {
    let mut runner = MigrationRunner::new(users_posts_set(), MemoryAdmin::new());

    let report = runner.migrate(None).await.unwrap();
    assert_eq!(report.direction, Direction::Up);
    assert_eq!(report.executed.len(), 3);

    let report = runner.rollback(&"1_users".into()).await.unwrap();
    assert_eq!(report.direction, Direction::Down);
    assert_eq!(report.executed.len(), 3);

    let statuses = runner.client().statuses();
    assert!(!statuses["1_users"] && !statuses["2_posts"] && !statuses["3_index"]);

    // Each status write lands right after its step, never batched at the end.
    assert_eq!(
        runner.client().events(),
        vec![
            ddl_event("CREATE TABLE users (id INT64)"),
            status_event("1_users", true),
            ddl_event("CREATE TABLE posts (id INT64)"),
            status_event("2_posts", true),
            ddl_event("CREATE INDEX posts_by_id ON posts (id)"),
            status_event("3_index", true),
            ddl_event("DROP INDEX posts_by_id"),
            status_event("3_index", false),
            ddl_event("DROP TABLE posts"),
            status_event("2_posts", false),
            ddl_event("DROP TABLE users"),
            status_event("1_users", false),
        ],
    );
}

#[tokio::test]
async fn failed_step_halts_the_run_and_keeps_earlier_progress() {
    let mut set = users_posts_set();
    set[1].up = SchemaOp::Ddl(vec![format!("{FAIL_MARKER} CREATE TABLE posts (id INT64)")]);

    let mut runner = MigrationRunner::new(set, MemoryAdmin::new());
    let err = runner.migrate(None).await.unwrap_err();

    assert_matches!(err, RunnerError::OperationFailed { id, direction: Direction::Up, .. } => {
        assert_eq!(id.as_str(), "2_posts");
    });

    // Step 1 completed and was recorded; the failing step and everything
    // after it never ran.
    let statuses = runner.client().statuses();
    assert_eq!(statuses.get("1_users"), Some(&true));
    assert_ne!(statuses.get("2_posts"), Some(&true));
    assert_ne!(statuses.get("3_index"), Some(&true));
    assert_eq!(
        runner.client().events(),
        vec![ddl_event("CREATE TABLE users (id INT64)"), status_event("1_users", true)],
    );
}

#[tokio::test]
async fn rerunning_after_a_fix_resumes_from_the_first_pending_migration() {
    let mut set = users_posts_set();
    set[1].up = SchemaOp::Ddl(vec![format!("{FAIL_MARKER} CREATE TABLE posts (id INT64)")]);

    let mut runner = MigrationRunner::new(set, MemoryAdmin::new());
    runner.migrate(None).await.unwrap_err();

    // Same database, corrected manifest set, fresh invocation.
    let admin = runner.into_client();
    let mut runner = MigrationRunner::new(users_posts_set(), admin);
    let report = runner.migrate(None).await.unwrap();

    assert_eq!(report.executed.len(), 2);
    assert_eq!(report.executed[0].as_str(), "2_posts");
    let statuses = runner.client().statuses();
    assert!(statuses["1_users"] && statuses["2_posts"] && statuses["3_index"]);

    // The already-applied first migration did not run twice.
    let creates: Vec<AdminEvent> =
        runner.client().events().into_iter().filter(|event| *event == ddl_event("CREATE TABLE users (id INT64)")).collect();
    assert_eq!(creates.len(), 1);
}

#[tokio::test]
async fn failed_rollback_step_halts_with_the_tail_already_reverted() {
    let mut set = users_posts_set();
    set[1].down = SchemaOp::Ddl(vec![format!("{FAIL_MARKER} DROP TABLE posts")]);

    let admin = MemoryAdmin::with_statuses([
        ("1_users".to_string(), true),
        ("2_posts".to_string(), true),
        ("3_index".to_string(), true),
    ]);
    let mut runner = MigrationRunner::new(set, admin);
    let err = runner.rollback(&"1_users".into()).await.unwrap_err();

    assert_matches!(err, RunnerError::OperationFailed { id, direction: Direction::Down, .. } => {
        assert_eq!(id.as_str(), "2_posts");
    });

    // The tail was reverted and recorded; the rest is untouched and the
    // record is still a valid prefix, so a later rollback can resume.
    let statuses = runner.client().statuses();
    assert!(statuses["1_users"] && statuses["2_posts"]);
    assert!(!statuses["3_index"]);
    runner.validate().await.unwrap();
}

#[tokio::test]
async fn generated_directory_migrates_cleanly() {
    let dir = tempfile::TempDir::new().unwrap();
    let source = MigrationDir::new(dir.path());
    source.generate("create users").unwrap();
    source.generate("create posts").unwrap();

    let mut runner = MigrationRunner::new(source.load().unwrap(), MemoryAdmin::new());
    let report = runner.migrate(None).await.unwrap();

    assert_eq!(report.executed.len(), 2);
    // Skeletons carry no statements yet, so only status writes reach the
    // database.
    assert!(runner.client().applied_batches().is_empty());
    assert_eq!(runner.client().events().len(), 2);

    let rows = runner.status().await.unwrap();
    assert!(rows.iter().all(|row| row.applied));
}
