//! Migration tests
//!
//! Migrations run once per cell, before the first value is handed out. The
//! value alone decides whether a migration runs.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use durable_cell::{
    BoxError, CellErrorCode, CellState, DurableCell, FnMigration, MemoryFileSystem, Migration,
};

use common::{memory_path, stored_i64, I64Codec};

/// Migration bumping values below `floor` up to it, recording calls
struct FloorMigration {
    name: String,
    floor: i64,
    log: Arc<Mutex<Vec<String>>>,
    fail_clean_up: bool,
}

impl FloorMigration {
    fn new(name: &str, floor: i64, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            floor,
            log: Arc::clone(log),
            fail_clean_up: false,
        }
    }

    fn failing_clean_up(mut self) -> Self {
        self.fail_clean_up = true;
        self
    }

    fn record(&self, step: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, step));
    }
}

impl Migration<i64> for FloorMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_migrate(&self, current: &i64) -> Result<bool, BoxError> {
        self.record("should");
        Ok(*current < self.floor)
    }

    fn migrate(&self, _current: i64) -> Result<i64, BoxError> {
        self.record("migrate");
        Ok(self.floor)
    }

    fn clean_up(&self) -> Result<(), BoxError> {
        self.record("clean_up");
        if self.fail_clean_up {
            return Err(format!("{} could not remove legacy data", self.name).into());
        }
        Ok(())
    }
}

fn migrated_cell(
    fs: &MemoryFileSystem,
    path: &std::path::Path,
    migrations: Vec<FloorMigration>,
) -> DurableCell<i64> {
    DurableCell::builder(I64Codec)
        .path(path)
        .file_system(fs.clone())
        .migrations(migrations)
        .build()
        .unwrap()
}

/// A migration that does not apply leaves the file byte-for-byte unchanged.
#[tokio::test]
async fn test_skipped_migration_changes_nothing() {
    let fs = MemoryFileSystem::new();
    let path = memory_path("migration-skip");
    fs.put(&path, "  50\n");
    let log = Arc::new(Mutex::new(Vec::new()));

    let cell = migrated_cell(&fs, &path, vec![FloorMigration::new("floor", 10, &log)]);
    assert_eq!(cell.current().await.unwrap(), 50);

    assert_eq!(fs.contents(&path).unwrap(), b"  50\n");
    assert_eq!(fs.rename_count(), 0);
    assert_eq!(*log.lock().unwrap(), vec!["floor:should"]);
    assert_eq!(cell.metrics().migrations_applied, 0);
}

/// Migrations run in order, commit once, then clean up.
#[tokio::test]
async fn test_migrations_commit_once_then_clean_up() {
    let fs = MemoryFileSystem::new();
    let path = memory_path("migration-apply");
    fs.put(&path, "1");
    let log = Arc::new(Mutex::new(Vec::new()));

    let cell = migrated_cell(
        &fs,
        &path,
        vec![
            FloorMigration::new("v2", 10, &log),
            FloorMigration::new("v3", 20, &log),
        ],
    );

    assert_eq!(cell.current().await.unwrap(), 20);
    assert_eq!(stored_i64(&fs, &path), Some(20));
    assert_eq!(fs.rename_count(), 1);
    assert_eq!(cell.state(), CellState::Ready { version: 0 });
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "v2:should",
            "v2:migrate",
            "v3:should",
            "v3:migrate",
            "v2:clean_up",
            "v3:clean_up",
        ]
    );
    assert_eq!(cell.metrics().migrations_applied, 2);
}

/// Clean-up sees the migrated value already on disk.
#[tokio::test]
async fn test_clean_up_runs_after_commit() {
    let fs = MemoryFileSystem::new();
    let path = memory_path("migration-clean-up-order");
    let saw_committed = Arc::new(AtomicBool::new(false));

    let observer = fs.clone();
    let observed_path = path.clone();
    let flag = Arc::clone(&saw_committed);
    let migration = FnMigration::new(
        "seed",
        |v: &i64| *v == 0,
        |_: i64| Ok::<_, BoxError>(100),
    )
    .with_clean_up(move || {
        flag.store(
            stored_i64(&observer, &observed_path) == Some(100),
            Ordering::SeqCst,
        );
        Ok(())
    });

    let cell = DurableCell::builder(I64Codec)
        .path(&path)
        .file_system(fs.clone())
        .migration(migration)
        .build()
        .unwrap();

    assert_eq!(cell.current().await.unwrap(), 100);
    assert!(saw_committed.load(Ordering::SeqCst));
}

/// A reopened cell does not re-run a migration already visible in the value.
#[tokio::test]
async fn test_migration_is_value_idempotent_across_reopen() {
    let fs = MemoryFileSystem::new();
    let path = memory_path("migration-reopen");
    let log = Arc::new(Mutex::new(Vec::new()));

    let cell = migrated_cell(&fs, &path, vec![FloorMigration::new("floor", 5, &log)]);
    assert_eq!(cell.current().await.unwrap(), 5);
    cell.close().await.unwrap();
    assert_eq!(fs.rename_count(), 1);

    log.lock().unwrap().clear();
    let reopened = migrated_cell(&fs, &path, vec![FloorMigration::new("floor", 5, &log)]);
    assert_eq!(reopened.current().await.unwrap(), 5);
    assert_eq!(fs.rename_count(), 1);
    assert_eq!(*log.lock().unwrap(), vec!["floor:should"]);
}

/// A migration that runs but changes nothing writes nothing and still cleans up.
#[tokio::test]
async fn test_noop_migration_cleans_up_without_commit() {
    let fs = MemoryFileSystem::new();
    let path = memory_path("migration-noop");
    let cleaned = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cleaned);

    let cell = DurableCell::builder(I64Codec)
        .path(&path)
        .file_system(fs.clone())
        .migration(
            FnMigration::new("identity", |_: &i64| true, |v: i64| Ok::<_, BoxError>(v))
                .with_clean_up(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .build()
        .unwrap();

    assert_eq!(cell.current().await.unwrap(), 0);
    assert_eq!(fs.rename_count(), 0);
    assert!(fs.files().is_empty());
    assert_eq!(cleaned.load(Ordering::SeqCst), 1);
}

/// A failing migration is fatal; nothing is written or cleaned up.
#[tokio::test]
async fn test_failing_migration_is_terminal() {
    let fs = MemoryFileSystem::new();
    let path = memory_path("migration-fails");
    fs.put(&path, "3");
    let cleaned = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cleaned);

    let cell = DurableCell::builder(I64Codec)
        .path(&path)
        .file_system(fs.clone())
        .migration(
            FnMigration::new(
                "strict",
                |_: &i64| true,
                |_: i64| Err::<i64, BoxError>("unsupported layout".into()),
            )
            .with_clean_up(move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }),
        )
        .build()
        .unwrap();

    let err = cell.current().await.unwrap_err();
    let cause = err.cause().unwrap();
    assert_eq!(cause.code(), CellErrorCode::CollaboratorFailed);
    assert!(cause.message().contains("strict"));
    assert_eq!(stored_i64(&fs, &path), Some(3));
    assert!(!cleaned.load(Ordering::SeqCst));
}

/// Every clean-up runs; the first failure makes the cell final.
#[tokio::test]
async fn test_clean_up_failures_are_aggregated() {
    let fs = MemoryFileSystem::new();
    let path = memory_path("migration-clean-up-fails");
    let log = Arc::new(Mutex::new(Vec::new()));

    let cell = migrated_cell(
        &fs,
        &path,
        vec![
            FloorMigration::new("a", 1, &log).failing_clean_up(),
            FloorMigration::new("b", 2, &log).failing_clean_up(),
        ],
    );

    let err = cell.current().await.unwrap_err();
    let cause = err.cause().unwrap();
    assert_eq!(cause.code(), CellErrorCode::CollaboratorFailed);
    assert!(cause.message().contains("'a'"));

    let log = log.lock().unwrap();
    assert!(log.contains(&"a:clean_up".to_string()));
    assert!(log.contains(&"b:clean_up".to_string()));

    // The migrated value was committed before clean-up ran
    assert_eq!(stored_i64(&fs, &path), Some(2));
}

/// A panicking migration makes the cell final instead of killing its worker.
#[tokio::test]
async fn test_panicking_migration_is_terminal() {
    let fs = MemoryFileSystem::new();
    let path = memory_path("migration-panics");
    fs.put(&path, "3");

    let cell = DurableCell::builder(I64Codec)
        .path(&path)
        .file_system(fs.clone())
        .migration(FnMigration::new(
            "explosive",
            |_: &i64| true,
            |_: i64| -> Result<i64, BoxError> { panic!("layout unreadable") },
        ))
        .build()
        .unwrap();

    let err = cell.current().await.unwrap_err();
    let cause = err.cause().unwrap();
    assert_eq!(cause.code(), CellErrorCode::CollaboratorFailed);
    assert!(cause.message().contains("panicked: layout unreadable"));
    assert_eq!(
        cell.state(),
        CellState::Final {
            code: CellErrorCode::CollaboratorFailed
        }
    );
    assert_eq!(stored_i64(&fs, &path), Some(3));

    // The worker is still alive and answers with the same terminal error
    assert!(cell.set(9).await.unwrap_err().is_terminal());
}
