use super::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::anyhow;

static TEST_STATE_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

#[test]
fn open_without_file_yields_empty_record() {
    let root = test_state_root();
    let store = StateStore::open(root.join("offline-upgrade.json"));

    assert!(store.state().is_empty());
    assert!(!store.path().exists());
}

#[test]
fn open_with_malformed_file_yields_empty_record() {
    let root = test_state_root();
    fs::create_dir_all(&root).expect("must create root");
    let path = root.join("offline-upgrade.json");
    fs::write(&path, "{\"download_status\": \"compl").expect("must write fixture");

    let store = StateStore::open(&path);
    assert!(store.state().is_empty());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn open_with_unknown_status_value_yields_empty_record() {
    let root = test_state_root();
    fs::create_dir_all(&root).expect("must create root");
    let path = root.join("offline-upgrade.json");
    fs::write(&path, r#"{"upgrade_status": "halfway"}"#).expect("must write fixture");

    let store = StateStore::open(&path);
    assert!(store.state().is_empty());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn reads_record_written_with_null_fields() {
    let root = test_state_root();
    fs::create_dir_all(&root).expect("must create root");
    let path = root.join("offline-upgrade.json");
    fs::write(
        &path,
        r#"{
  "destdir": null,
  "download_status": "complete",
  "enable_disable_repos": [["updates-testing", "enable"]],
  "install_packages": {"fedora": ["bash-5.2.26-3.fc40.x86_64"]},
  "target_releasever": "40",
  "upgrade_status": "ready"
}"#,
    )
    .expect("must write fixture");

    let store = StateStore::open(&path);
    let state = store.state();
    assert_eq!(state.download_status, Some(DownloadStatus::Complete));
    assert_eq!(state.upgrade_status, Some(UpgradeStatus::Ready));
    assert_eq!(state.target_releasever.as_deref(), Some("40"));
    assert_eq!(
        state.enable_disable_repos,
        Some(vec![RepoToggle::enable("updates-testing")])
    );
    assert_eq!(state.install_packages_count(), 1);
    assert!(state.is_ready_for_upgrade());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn mutate_persists_once_and_creates_parent_dirs() {
    let root = test_state_root();
    let path = root.join("nested").join("offline-upgrade.json");
    let mut store = StateStore::open(&path);

    store
        .mutate(|state| {
            state.download_status = Some(DownloadStatus::Downloading);
            state.target_releasever = Some("40".to_string());
            state.exclude = Some(vec!["kernel*".to_string()]);
            Ok(())
        })
        .expect("must persist mutation");

    let content = fs::read_to_string(&path).expect("must read state file");
    assert!(content.contains("\"download_status\": \"downloading\""));
    assert!(content.contains("\"upgrade_status\": null"));

    let reloaded = StateStore::open(&path);
    assert_eq!(reloaded.state(), store.state());
    assert_eq!(
        reloaded.state().exclude.as_deref(),
        Some(&["kernel*".to_string()][..])
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn failed_mutation_leaves_file_and_memory_untouched() {
    let root = test_state_root();
    let path = root.join("offline-upgrade.json");
    let mut store = StateStore::open(&path);
    store
        .mutate(|state| {
            state.upgrade_status = Some(UpgradeStatus::Ready);
            state.destdir = Some("/tmp/offline-upgrade".to_string());
            Ok(())
        })
        .expect("must seed state");
    let before = fs::read(&path).expect("must read seeded state");
    let before_state = store.state().clone();

    let err = store
        .mutate(|state| {
            state.upgrade_status = Some(UpgradeStatus::Incomplete);
            state.destdir = None;
            Err::<(), _>(anyhow!("resolver exploded"))
        })
        .expect_err("mutation must fail");
    assert!(err.to_string().contains("resolver exploded"));

    assert_eq!(fs::read(&path).expect("must read state"), before);
    assert_eq!(store.state(), &before_state);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn dropped_mutation_guard_discards_draft() {
    let root = test_state_root();
    let path = root.join("offline-upgrade.json");
    let mut store = StateStore::open(&path);

    {
        let mut mutation = store.begin();
        mutation.download_status = Some(DownloadStatus::Complete);
        assert_eq!(mutation.download_status, Some(DownloadStatus::Complete));
    }

    assert!(store.state().is_empty());
    assert!(!path.exists());

    let mut mutation = store.begin();
    mutation.download_status = Some(DownloadStatus::Complete);
    mutation.commit().expect("must commit");
    assert_eq!(
        store.state().download_status,
        Some(DownloadStatus::Complete)
    );
    assert!(path.exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn reset_removes_file_and_is_idempotent() {
    let root = test_state_root();
    let path = root.join("offline-upgrade.json");
    let mut store = StateStore::open(&path);
    store
        .mutate(|state| {
            let mut packages = BTreeMap::new();
            packages.insert("fedora".to_string(), vec!["bash-5.2.26-3.fc40.x86_64".to_string()]);
            state.install_packages = Some(packages);
            Ok(())
        })
        .expect("must seed state");

    store.reset().expect("must reset");
    assert!(!path.exists());
    assert!(store.state().is_empty());

    store.reset().expect("second reset must succeed");
    assert!(store.load().is_empty());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn persist_replaces_previous_content_without_leftover_temp_files() {
    let root = test_state_root();
    let path = root.join("offline-upgrade.json");
    let mut store = StateStore::open(&path);
    store
        .mutate(|state| {
            state.best = Some(true);
            Ok(())
        })
        .expect("must persist first");
    store
        .mutate(|state| {
            state.best = Some(false);
            Ok(())
        })
        .expect("must persist second");

    let entries = fs::read_dir(&root)
        .expect("must list root")
        .map(|entry| entry.expect("entry").file_name())
        .collect::<Vec<_>>();
    assert_eq!(entries, vec![std::ffi::OsString::from("offline-upgrade.json")]);
    assert_eq!(StateStore::open(&path).state().best, Some(false));

    let _ = fs::remove_dir_all(&root);
}

fn test_state_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let counter = TEST_STATE_ROOT_COUNTER.fetch_add(1, Ordering::SeqCst);
    path.push(format!(
        "offline-upgrade-state-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        counter
    ));
    path
}
