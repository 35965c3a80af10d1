use super::*;
use crate::sync::memory_store::MemoryStore;
use crate::sync::retry::{Backoff, RetryPolicy};
use tempfile::{TempDir, tempdir};

fn tree(files: &[(&str, &str)]) -> TempDir {
    let dir = tempdir().unwrap();
    for (name, body) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }
    dir
}

fn options(root: &TempDir, prefix: &str, delete: bool) -> SyncOptions {
    let mut options = SyncOptions::new(root.path(), prefix);
    options.delete = delete;
    options.transfer.retry = RetryPolicy::new(3, Backoff::none());
    options
}

fn put_keys(store: &MemoryStore) -> Vec<String> {
    let mut keys: Vec<String> = store.puts().into_iter().map(|put| put.key).collect();
    keys.sort();
    keys
}

#[tokio::test]
async fn uploads_everything_to_empty_bucket() {
    let root = tree(&[("a.txt", "alpha"), ("b.jpg", "jpeg")]);
    let store = Arc::new(MemoryStore::default());
    let mut engine = SyncEngine::new(store.clone(), options(&root, "site/", false));

    let report = engine.run().await.unwrap();

    assert_eq!(engine.phase(), Phase::Done);
    assert_eq!(report.local, 2);
    assert_eq!(report.remote, 0);
    assert_eq!(report.missing, 2);
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.found, 0);
    assert_eq!(put_keys(&store), vec!["site/a.txt", "site/b.jpg"]);

    let puts = store.puts();
    let jpeg = puts.iter().find(|put| put.key == "site/b.jpg").unwrap();
    assert_eq!(jpeg.content_type, "image/jpeg");
    assert_eq!(jpeg.acl, "private");
    assert!(store.delete_calls().is_empty());
}

#[tokio::test]
async fn only_missing_files_are_uploaded() {
    let root = tree(&[("a.txt", "alpha"), ("css/site.css", "body{}")]);
    let store = Arc::new(MemoryStore::with_objects(["site/a.txt"]));
    let mut engine = SyncEngine::new(store.clone(), options(&root, "site/", false));

    let report = engine.run().await.unwrap();

    assert_eq!(report.missing, 1);
    assert_eq!(report.found, 1);
    assert_eq!(put_keys(&store), vec!["site/css/site.css"]);
}

#[tokio::test]
async fn stale_objects_are_deleted_in_one_batch() {
    let root = tree(&[("a.txt", "alpha")]);
    let store = Arc::new(MemoryStore::with_objects(["site/a.txt", "site/stale.bin"]));
    let mut engine = SyncEngine::new(store.clone(), options(&root, "site/", true));

    let report = engine.run().await.unwrap();

    assert_eq!(report.missing, 0);
    assert_eq!(report.deleted, 1);
    assert!(store.puts().is_empty());
    assert_eq!(store.delete_calls(), vec![vec!["site/stale.bin".to_string()]]);
    assert_eq!(store.objects(), vec!["site/a.txt"]);
}

#[tokio::test]
async fn stale_objects_survive_without_delete_flag() {
    let root = tree(&[("a.txt", "alpha")]);
    let store = Arc::new(MemoryStore::with_objects(["site/a.txt", "site/stale.bin"]));
    let mut engine = SyncEngine::new(store.clone(), options(&root, "site/", false));

    let report = engine.run().await.unwrap();

    assert_eq!(report.deleted, 0);
    assert!(store.delete_calls().is_empty());
    assert_eq!(store.objects().len(), 2);
}

#[tokio::test]
async fn objects_outside_prefix_are_untouched() {
    let root = tree(&[("a.txt", "alpha")]);
    let store = Arc::new(MemoryStore::with_objects(["other/x.txt", "site/old.txt"]));
    let mut engine = SyncEngine::new(store.clone(), options(&root, "site/", true));

    engine.run().await.unwrap();

    assert_eq!(store.objects(), vec!["other/x.txt", "site/a.txt"]);
}

#[tokio::test]
async fn second_run_has_nothing_to_do() {
    let root = tree(&[("a.txt", "alpha"), ("img/logo.png", "png")]);
    let store = Arc::new(MemoryStore::with_objects(["site/stale.bin"]));

    SyncEngine::new(store.clone(), options(&root, "site/", true))
        .run()
        .await
        .unwrap();
    let puts_after_first = store.puts().len();

    let report = SyncEngine::new(store.clone(), options(&root, "site/", true))
        .run()
        .await
        .unwrap();

    assert_eq!(report.missing, 0);
    assert_eq!(report.deleted, 0);
    assert_eq!(report.found, 2);
    assert_eq!(store.puts().len(), puts_after_first);
    assert_eq!(store.delete_calls().len(), 1);
}

#[tokio::test]
async fn paginated_listing_is_fully_consumed() {
    let root = tree(&[("a.txt", "alpha"), ("b.txt", "beta"), ("c.txt", "gamma")]);
    let store = Arc::new(
        MemoryStore::with_objects(["site/a.txt", "site/b.txt", "site/c.txt"]).with_page_size(1),
    );
    let mut engine = SyncEngine::new(store.clone(), options(&root, "site/", false));

    let report = engine.run().await.unwrap();

    assert_eq!(report.remote, 3);
    assert_eq!(report.missing, 0);
    assert_eq!(store.list_calls(), 3);
}

#[tokio::test]
async fn listing_failure_stops_before_any_write() {
    let root = tree(&[("a.txt", "alpha")]);
    let store = Arc::new(
        MemoryStore::with_objects(["site/x", "site/y"])
            .with_page_size(1)
            .fail_list_on_page(2),
    );
    let mut engine = SyncEngine::new(store.clone(), options(&root, "site/", true));

    let err = engine.run().await.expect_err("listing fails");

    assert!(matches!(err, SyncError::List(_)));
    assert_eq!(err.phase(), Phase::Listing);
    assert_eq!(engine.phase(), Phase::Failed);
    assert!(store.puts().is_empty());
    assert!(store.delete_calls().is_empty());
}

#[tokio::test]
async fn upload_failure_skips_delete_phase() {
    let root = tree(&[("a.txt", "alpha")]);
    let store = Arc::new(
        MemoryStore::with_objects(["site/stale.bin"]).fail_puts("site/a.txt", u32::MAX),
    );
    let mut engine = SyncEngine::new(store.clone(), options(&root, "site/", true));

    let err = engine.run().await.expect_err("upload never succeeds");

    assert_eq!(err.phase(), Phase::Uploading);
    assert_eq!(engine.phase(), Phase::Failed);
    assert_eq!(store.put_attempts("site/a.txt"), 3);
    assert!(store.delete_calls().is_empty());
    assert_eq!(store.objects(), vec!["site/stale.bin"]);
}

#[tokio::test]
async fn delete_failure_is_reported_after_uploads() {
    let root = tree(&[("a.txt", "alpha")]);
    let store = Arc::new(MemoryStore::with_objects(["site/stale.bin"]).fail_deletes(u32::MAX));
    let mut engine = SyncEngine::new(store.clone(), options(&root, "site/", true));

    let err = engine.run().await.expect_err("delete never succeeds");

    assert!(matches!(err, SyncError::Delete(_)));
    assert_eq!(err.phase(), Phase::Deleting);
    assert_eq!(put_keys(&store), vec!["site/a.txt"]);
    assert_eq!(store.delete_calls().len(), 3);
}

#[tokio::test]
async fn missing_local_root_fails_the_listing_phase() {
    let root = tempdir().unwrap();
    let mut options = SyncOptions::new(root.path().join("absent"), "");
    options.transfer.retry = RetryPolicy::new(1, Backoff::none());
    let store = Arc::new(MemoryStore::default());
    let mut engine = SyncEngine::new(store.clone(), options);

    let err = engine.run().await.expect_err("root does not exist");

    assert!(matches!(err, SyncError::Scan(_)));
    assert_eq!(engine.phase(), Phase::Failed);
    assert_eq!(store.list_calls(), 0);
}

#[tokio::test]
async fn empty_prefix_mirrors_to_bucket_root() {
    let root = tree(&[("index.html", "<html>")]);
    let store = Arc::new(MemoryStore::default());
    let mut engine = SyncEngine::new(store.clone(), options(&root, "", false));

    engine.run().await.unwrap();

    let puts = store.puts();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].key, "index.html");
    assert_eq!(puts[0].content_type, "text/html");
    assert_eq!(puts[0].body, b"<html>");
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_file_is_repaired_uploaded_and_restored() {
    use std::os::unix::fs::PermissionsExt;

    let root = tree(&[("secret.txt", "hidden")]);
    let path = root.path().join("secret.txt");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o000)).unwrap();

    let store = Arc::new(MemoryStore::default());
    let mut options = options(&root, "site/", false);
    options.transfer.acl = "public-read".to_string();
    options.transfer.repair_permissions = true;
    let mut engine = SyncEngine::new(store.clone(), options);

    let report = engine.run().await.unwrap();

    assert_eq!(report.uploaded, 1);
    let puts = store.puts();
    assert_eq!(puts[0].acl, "private");
    assert_eq!(puts[0].mode, 0o600);
    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o7777;
    assert_eq!(mode, 0o000);
}
