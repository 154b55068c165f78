//! Restart and crash-recovery scenarios: clean-shutdown rebuild,
//! crash-mid-commit re-drive, and expiration-driven garbage collection.

use tempfile::TempDir;
use uuid::Uuid;
use warcrepo::{ArtifactData, RepoConfig, RepositoryArtifactMetadata, WarcRepository};
use warcrepo_store::{RepositoryJournal, StorageLayout};

fn quiet_config(dir: &TempDir) -> RepoConfig {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut config = RepoConfig::new(dir.path());
    config.gc_interval_ms = 3_600_000;
    config
}

fn response(uri: &str, body: &[u8]) -> ArtifactData {
    ArtifactData::new(
        "c1",
        "a1",
        uri,
        "HTTP/1.1 200 OK",
        vec![("key1".to_string(), "val1".to_string())],
        body.to_vec(),
    )
}

#[test]
fn rebuild_after_clean_shutdown_preserves_repository_state() {
    let dir = TempDir::new().unwrap();
    let committed_id;
    let uncommitted_id;
    let deleted_id;
    {
        let repo = WarcRepository::open(quiet_config(&dir)).unwrap();

        let committed = repo.add_artifact(response("http://h/keep", b"kept body")).unwrap();
        repo.commit_artifact("c1", committed.id())
            .unwrap()
            .wait()
            .unwrap()
            .unwrap();
        committed_id = committed.id();

        let uncommitted = repo
            .add_artifact(response("http://h/pending", b"pending"))
            .unwrap();
        uncommitted_id = uncommitted.id();

        let doomed = repo.add_artifact(response("http://h/gone", b"doomed")).unwrap();
        repo.commit_artifact("c1", doomed.id())
            .unwrap()
            .wait()
            .unwrap()
            .unwrap();
        repo.delete_artifact("c1", doomed.id()).unwrap();
        deleted_id = doomed.id();

        repo.shutdown();
    }

    let repo = WarcRepository::open(quiet_config(&dir)).unwrap();
    repo.drain_commits();

    // The committed artifact survives with the same flags and content
    let kept = repo.get_artifact("c1", "a1", "http://h/keep").unwrap();
    assert_eq!(kept.id(), committed_id);
    assert!(kept.committed());
    let mut data = repo.get_artifact_data("c1", committed_id).unwrap();
    assert_eq!(
        data.take_payload().unwrap().into_bytes().unwrap(),
        b"kept body"
    );

    // The uncommitted artifact is recovered, still uncommitted
    let pending = repo
        .get_artifact_version("c1", "a1", "http://h/pending", 1, true)
        .unwrap();
    assert_eq!(pending.id(), uncommitted_id);
    assert!(!pending.committed());
    assert!(repo.get_artifact("c1", "a1", "http://h/pending").is_none());

    // The deleted artifact stays gone
    assert!(repo.index().get_artifact(deleted_id).is_none());
    assert!(repo.get_artifact("c1", "a1", "http://h/gone").is_none());

    repo.shutdown();
}

#[test]
fn crash_after_commit_journal_entry_redrives_the_copy() {
    let dir = TempDir::new().unwrap();
    let id: Uuid;
    {
        let repo = WarcRepository::open(quiet_config(&dir)).unwrap();
        let artifact = repo
            .add_artifact(response("http://h/crashed", b"crash payload"))
            .unwrap();
        id = artifact.id();

        // Crash window: the commit journal entry exists, the copy never ran
        let layout = StorageLayout::new(vec![dir.path().to_path_buf()]);
        let journal = RepositoryJournal::new();
        journal
            .append(
                &layout.journal_path(dir.path(), "c1", "a1"),
                &RepositoryArtifactMetadata::committed(id),
            )
            .unwrap();
        repo.shutdown();
    }

    let repo = WarcRepository::open(quiet_config(&dir)).unwrap();
    repo.drain_commits();

    let recovered = repo.get_artifact("c1", "a1", "http://h/crashed").unwrap();
    assert_eq!(recovered.id(), id);
    assert!(recovered.committed());
    let tmp_dir = dir.path().join("tmp").join("warcs");
    assert!(
        !recovered.storage_url().to_path().starts_with(&tmp_dir),
        "re-driven copy must move the artifact out of temp"
    );

    let mut data = repo.get_artifact_data("c1", id).unwrap();
    assert_eq!(
        data.take_payload().unwrap().into_bytes().unwrap(),
        b"crash payload"
    );
    repo.shutdown();
}

#[test]
fn expired_uncommitted_artifact_is_reclaimed() {
    let dir = TempDir::new().unwrap();
    let id: Uuid;
    {
        let repo = WarcRepository::open(quiet_config(&dir)).unwrap();
        let artifact = repo
            .add_artifact(response("http://h/stale", b"never acknowledged"))
            .unwrap();
        id = artifact.id();
        repo.shutdown();
    }

    let mut config = quiet_config(&dir);
    config.uncommitted_artifact_expiration_ms = 0;
    let repo = WarcRepository::open(config).unwrap();

    // Reload classified the artifact as expired: not in the index
    assert!(repo.index().get_artifact(id).is_none());

    // GC unlinks the temp WARC that held it
    repo.store().garbage_collect_temp_warcs().unwrap();
    let tmp_dir = dir.path().join("tmp").join("warcs");
    let remaining: Vec<_> = std::fs::read_dir(&tmp_dir).unwrap().collect();
    assert!(remaining.is_empty(), "expired temp WARC should be unlinked");

    repo.shutdown();
}

#[test]
fn commit_future_deadline_leaves_commit_running() {
    let dir = TempDir::new().unwrap();
    let repo = WarcRepository::open(quiet_config(&dir)).unwrap();

    let artifact = repo.add_artifact(response("http://h/slow", b"body")).unwrap();
    let future = repo.commit_artifact("c1", artifact.id()).unwrap();

    // Even if the deadline races the copy, the commit still completes
    let _ = future.wait_timeout(std::time::Duration::from_millis(1));
    repo.drain_commits();

    let done = future.wait().unwrap().unwrap();
    assert!(done.committed());
    repo.shutdown();
}

#[test]
fn index_and_store_agree_at_quiescence() {
    let dir = TempDir::new().unwrap();
    let repo = WarcRepository::open(quiet_config(&dir)).unwrap();

    let mut ids = Vec::new();
    for i in 0..5 {
        let artifact = repo
            .add_artifact(response(&format!("http://h/{}", i), b"body"))
            .unwrap();
        repo.commit_artifact("c1", artifact.id()).unwrap();
        ids.push(artifact.id());
    }
    repo.drain_commits();

    for id in ids {
        let indexed = repo.index().get_artifact(id).unwrap();
        let data = repo.get_artifact_data("c1", id).unwrap();
        assert_eq!(Some(indexed.storage_url()), data.storage_url());
    }
    repo.shutdown();
}
