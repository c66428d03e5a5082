use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;

use save_rewind::backup::{notices, BackupEngine, Event, EventSink};
use save_rewind::Config;

fn test_config(root: &Path, retention_count: usize, compress: bool) -> Config {
    Config {
        saves_folder: root.join("saves"),
        backup_folder: root.join("backups"),
        retention_count,
        compress,
        save_extension: ".save".to_string(),
        debounce_window: Duration::from_millis(100),
        hash_retries: 2,
        hash_retry_delay: Duration::from_millis(10),
        reconcile_throttle: Duration::from_millis(1),
        poll_interval: Duration::from_millis(50),
    }
}

fn engine_with_events(config: &Config) -> (BackupEngine, broadcast::Receiver<Event>) {
    let events = EventSink::new(128);
    let rx = events.subscribe();
    (BackupEngine::new(config, events), rx)
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn backup_files(folder: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(folder)
        .map(|entries| {
            entries
                .map(|entry| entry.unwrap().file_name().into_string().unwrap())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

fn write_save(config: &Config, name: &str, content: &str) -> PathBuf {
    std::fs::create_dir_all(&config.saves_folder).unwrap();
    let path = config.saves_folder.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn unchanged_content_creates_no_second_backup() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path(), 5, false);
    let (mut engine, mut rx) = engine_with_events(&config);
    let save = write_save(&config, "Slot1.save", "v1");

    engine.check_and_create_backup(&save).await;
    assert_eq!(backup_files(&config.backup_folder).len(), 1);
    drain(&mut rx);

    engine.check_and_create_backup(&save).await;

    assert_eq!(backup_files(&config.backup_folder).len(), 1);
    assert!(drain(&mut rx).iter().any(|event| matches!(
        event,
        Event::Status { message } if message.contains("unchanged")
    )));
}

#[tokio::test]
async fn changed_content_creates_exactly_one_new_backup() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path(), 5, false);
    let (mut engine, mut rx) = engine_with_events(&config);
    let save = write_save(&config, "Slot1.save", "v1");

    engine.check_and_create_backup(&save).await;
    drain(&mut rx);

    // Encoded names have one-second resolution; space the versions out.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    std::fs::write(&save, "v2").unwrap();
    engine.check_and_create_backup(&save).await;

    assert_eq!(backup_files(&config.backup_folder).len(), 2);
    let events = drain(&mut rx);
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, Event::BackupCreated { .. }))
            .count(),
        1
    );
    // The hash table was updated: an immediate re-check skips.
    engine.check_and_create_backup(&save).await;
    assert_eq!(backup_files(&config.backup_folder).len(), 2);
}

#[tokio::test]
async fn first_backup_for_a_file_is_announced_as_initial() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path(), 5, false);
    let (mut engine, mut rx) = engine_with_events(&config);
    let save = write_save(&config, "Slot1.save", "v1");

    engine.check_and_create_backup(&save).await;

    let events = drain(&mut rx);
    assert!(events.iter().any(|event| matches!(
        event,
        Event::Notice { title, .. } if title == notices::INITIAL_BACKUP_CREATED
    )));
}

#[tokio::test]
async fn raw_backup_preserves_content_and_decodes_to_original() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path(), 5, false);
    let (mut engine, _rx) = engine_with_events(&config);
    let save = write_save(&config, "Slot1.save", "precious bytes");

    engine.check_and_create_backup(&save).await;

    let names = backup_files(&config.backup_folder);
    assert_eq!(names.len(), 1);
    assert_eq!(
        engine.codec().decode(&names[0]),
        Some("Slot1.save".to_string())
    );
    let content = std::fs::read_to_string(config.backup_folder.join(&names[0])).unwrap();
    assert_eq!(content, "precious bytes");
}

#[tokio::test]
async fn zip_backup_is_a_single_entry_archive_named_after_the_original() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path(), 5, true);
    let (mut engine, _rx) = engine_with_events(&config);
    let save = write_save(&config, "Slot1.save", "compressed payload");

    engine.check_and_create_backup(&save).await;

    let names = backup_files(&config.backup_folder);
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with(".zip"), "{}", names[0]);

    let file = std::fs::File::open(config.backup_folder.join(&names[0])).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    assert_eq!(archive.len(), 1);
    let mut entry = archive.by_index(0).unwrap();
    assert_eq!(entry.name(), "Slot1.save");
    let mut content = String::new();
    std::io::Read::read_to_string(&mut entry, &mut content).unwrap();
    assert_eq!(content, "compressed payload");
}

#[tokio::test]
async fn unreadable_file_reports_read_failure_and_creates_nothing() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path(), 5, false);
    let (mut engine, mut rx) = engine_with_events(&config);

    engine
        .check_and_create_backup(&config.saves_folder.join("ghost.save"))
        .await;

    assert!(backup_files(&config.backup_folder).is_empty());
    assert!(drain(&mut rx).iter().any(|event| matches!(
        event,
        Event::Notice { title, .. } if title == notices::FILE_READ_FAILURE
    )));
}

// The end-to-end retention scenario: three versions under retention 2
// leave the two newest backups on disk.
#[tokio::test]
async fn retention_keeps_newest_backups_and_prunes_the_oldest() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path(), 2, false);
    let (mut engine, mut rx) = engine_with_events(&config);
    let save = write_save(&config, "Slot1.save", "v1");

    engine.check_and_create_backup(&save).await;
    let first = backup_files(&config.backup_folder);
    assert_eq!(first.len(), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    std::fs::write(&save, "v2").unwrap();
    engine.check_and_create_backup(&save).await;
    assert_eq!(backup_files(&config.backup_folder).len(), 2);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    std::fs::write(&save, "v3").unwrap();
    engine.check_and_create_backup(&save).await;

    let remaining = backup_files(&config.backup_folder);
    assert_eq!(remaining.len(), 2);
    assert!(
        !remaining.contains(&first[0]),
        "oldest backup {} should have been pruned",
        first[0]
    );

    let events = drain(&mut rx);
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, Event::BackupPruned { .. }))
            .count(),
        1
    );
}
