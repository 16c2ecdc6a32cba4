mod common;

use binlog_rollback::binlog::{JsonLinesSource, StreamPosition};
use binlog_rollback::checkpoint::{Checkpoint, CheckpointManager};
use binlog_rollback::pipeline::FileSink;
use binlog_rollback::RollbackGenerator;
use common::*;
use std::time::Duration;
use tempfile::TempDir;

const T0: i64 = 1_688_608_800;

#[tokio::test]
async fn test_checkpoint_persistence() {
    let temp_dir = TempDir::new().unwrap();
    let checkpoint_path = temp_dir.path().join("test_checkpoint.json");

    let manager = CheckpointManager::new(&checkpoint_path);

    let checkpoint = Checkpoint::new(at(1234), 10);
    manager.save(&checkpoint).await.unwrap();

    let loaded = manager.load().await.unwrap().expect("Checkpoint should exist");
    assert_eq!(loaded.position, at(1234));
    assert_eq!(loaded.statement_count, 10);

    let checkpoint2 = Checkpoint::new(StreamPosition::new("mysql-bin.000125", 4), 20);
    manager.save(&checkpoint2).await.unwrap();

    let loaded2 = manager.load().await.unwrap().expect("Checkpoint should exist");
    assert_eq!(loaded2.position.file, "mysql-bin.000125");
    assert_eq!(loaded2.statement_count, 20);
}

#[tokio::test]
async fn test_repeated_checkpoint_writes() {
    let temp_dir = TempDir::new().unwrap();
    let manager = CheckpointManager::new(temp_dir.path().join("repeated_checkpoint.json"));

    for i in 0..10 {
        manager.save(&Checkpoint::new(at(i * 100), i)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let final_checkpoint = manager.load().await.unwrap().expect("Should have checkpoint");
    assert_eq!(final_checkpoint.position, at(900));
    assert_eq!(final_checkpoint.statement_count, 9);
    assert!(!temp_dir.path().join("repeated_checkpoint.tmp").exists());
}

#[tokio::test]
async fn test_second_run_resumes_after_checkpoint() {
    let temp_dir = TempDir::new().unwrap();
    let events_path = temp_dir.path().join("events.jsonl");
    let out_dir = temp_dir.path().join("out");

    let mut settings = test_settings(T0, T0 + 30, 1);
    settings.events_path = events_path.clone();
    settings.output_dir = out_dir.clone();
    settings.checkpoint_file = Some(temp_dir.path().join("rollback_checkpoint.json"));
    settings.resume_from_checkpoint = true;

    tokio::fs::write(
        &events_path,
        format!(
            "{}\n{}\n",
            jsonl_delete("t1", T0 + 10, 100, 1),
            jsonl_delete("t1", T0 + 20, 200, 2)
        ),
    )
    .await
    .unwrap();

    // First run: no checkpoint yet, starts from the configured position.
    let report = RollbackGenerator::new(settings.clone())
        .run(
            JsonLinesSource::new(&events_path, None),
            &settings.replication,
            FileSink::new(&out_dir, "run1"),
        )
        .await
        .unwrap();
    assert_eq!(report.statements_emitted, 2);
    assert_eq!(report.final_position, at(200));

    let saved = CheckpointManager::new(settings.checkpoint_file.as_ref().unwrap())
        .load()
        .await
        .unwrap()
        .expect("checkpoint written after run");
    assert_eq!(saved.position, at(200));
    assert_eq!(saved.statement_count, 2);

    // New events arrive; the second run only sees what follows the checkpoint.
    let mut content = tokio::fs::read_to_string(&events_path).await.unwrap();
    content.push_str(&jsonl_delete("t1", T0 + 25, 300, 3));
    content.push('\n');
    tokio::fs::write(&events_path, content).await.unwrap();

    let report = RollbackGenerator::new(settings.clone())
        .run(
            JsonLinesSource::new(&events_path, None),
            &settings.replication,
            FileSink::new(&out_dir, "run2"),
        )
        .await
        .unwrap();
    assert_eq!(report.statements_emitted, 1);
    assert_eq!(report.final_position, at(300));

    let first = tokio::fs::read_to_string(out_dir.join("hcy_t1_recover_run1.sql"))
        .await
        .unwrap();
    assert!(first.contains("INSERT INTO `hcy`.`t1` (`id`,`name`) VALUES (1,'a');"));
    assert!(first.contains("INSERT INTO `hcy`.`t1` (`id`,`name`) VALUES (2,'a');"));

    let second = tokio::fs::read_to_string(out_dir.join("hcy_t1_recover_run2.sql"))
        .await
        .unwrap();
    assert!(second.contains("INSERT INTO `hcy`.`t1` (`id`,`name`) VALUES (3,'a');"));
    assert!(!second.contains("VALUES (1,'a')"));
}
